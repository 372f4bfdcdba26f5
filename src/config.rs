//! Command-line and environment configuration for the compiler driver.

use std::path::PathBuf;

use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Environment variable naming the C toolchain driver used to link.
pub const CC_ENV: &str = "LAMBDA_CC";
/// Environment variable holding the log level (`error` .. `trace`, or `off`).
pub const LOG_ENV: &str = "LAMBDA_LOG";

pub const USAGE: &str = "usage: lambda [-S | --emit-llvm] [-v] -o <output> <source>";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("missing output path (-o <output>)")]
    MissingOutput,
    #[error("missing source path")]
    MissingInput,
    #[error("`{0}` expects a value")]
    MissingValue(String),
    #[error("unexpected extra argument `{0}`")]
    ExtraArgument(String),
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("invalid LAMBDA_LOG value `{0}`")]
    InvalidLogLevel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Emit {
    #[default]
    Executable,
    /// Native assembly for the host (`-S`).
    Assembly,
    /// Textual LLVM IR (`--emit-llvm`).
    LlvmIr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub input: PathBuf,
    pub output: PathBuf,
    pub emit: Emit,
    /// Explicit toolchain driver; looked up on `PATH` when absent.
    pub cc: Option<PathBuf>,
    pub log_level: LevelFilter,
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Build(Options),
    Help,
}

impl Options {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            emit: Emit::default(),
            cc: None,
            log_level: LevelFilter::WARN,
        }
    }
}

/// Parse the process arguments (without the program name) and environment.
pub fn from_env() -> Result<Command, UsageError> {
    parse_args(std::env::args().skip(1), |key| std::env::var(key).ok())
}

/// Parse `args` with `env` standing in for the process environment.
pub fn parse_args<I, S, F>(args: I, env: F) -> Result<Command, UsageError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    F: Fn(&str) -> Option<String>,
{
    let mut output = None;
    let mut input = None;
    let mut emit = Emit::default();
    let mut verbose = false;

    let mut args = args.into_iter().map(Into::into);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-o" => {
                let value = args.next().ok_or_else(|| UsageError::MissingValue(arg.clone()))?;
                output = Some(PathBuf::from(value));
            }
            "-S" => emit = Emit::Assembly,
            "--emit-llvm" => emit = Emit::LlvmIr,
            "-v" | "--verbose" => verbose = true,
            other if other.starts_with('-') && other.len() > 1 => {
                return Err(UsageError::UnknownOption(other.to_string()))
            }
            _ => {
                if input.is_some() {
                    return Err(UsageError::ExtraArgument(arg));
                }
                input = Some(PathBuf::from(arg));
            }
        }
    }

    let log_level = if verbose {
        LevelFilter::DEBUG
    } else {
        match env(LOG_ENV) {
            Some(value) if !value.trim().is_empty() => value
                .trim()
                .parse::<LevelFilter>()
                .map_err(|_| UsageError::InvalidLogLevel(value.clone()))?,
            _ => LevelFilter::WARN,
        }
    };
    let cc = env(CC_ENV)
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from);

    Ok(Command::Build(Options {
        input: input.ok_or(UsageError::MissingInput)?,
        output: output.ok_or(UsageError::MissingOutput)?,
        emit,
        cc,
        log_level,
    }))
}
