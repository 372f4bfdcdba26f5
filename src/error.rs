use std::fmt;
use std::path::PathBuf;

use inkwell::builder::BuilderError;
use thiserror::Error;

/// Result alias used by every pipeline stage.
pub type CompileResult<T> = Result<T, CompileError>;

/// Line/column location in the source text, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Advance past `text`, tracking newlines.
    pub fn advance(self, text: &str) -> Self {
        let mut pos = self;
        for ch in text.chars() {
            if ch == '\n' {
                pos.line += 1;
                pos.column = 1;
            } else {
                pos.column += 1;
            }
        }
        pos
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Errors raised while turning a source file into an executable.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("lex error at {pos}: {message}")]
    Lex { pos: Pos, message: String },

    #[error("parse error at {pos}: expected {expected}, found {found}")]
    Parse {
        pos: Pos,
        expected: String,
        found: String,
    },

    #[error("resolve error at {pos}: {message}")]
    Resolve { pos: Pos, message: String },

    #[error("codegen error: {0}")]
    Codegen(String),

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn lex(pos: Pos, message: impl Into<String>) -> Self {
        Self::Lex {
            pos,
            message: message.into(),
        }
    }

    pub fn parse(pos: Pos, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::Parse {
            pos,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn resolve(pos: Pos, message: impl Into<String>) -> Self {
        Self::Resolve {
            pos,
            message: message.into(),
        }
    }

    pub fn codegen(message: impl Into<String>) -> Self {
        Self::Codegen(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short classification string used for logging.
    pub fn stage(&self) -> &'static str {
        match self {
            CompileError::Lex { .. } => "lex",
            CompileError::Parse { .. } => "parse",
            CompileError::Resolve { .. } => "resolve",
            CompileError::Codegen(_) | CompileError::Io { .. } => "codegen",
        }
    }

    /// Source location, when the failing stage has one.
    pub fn pos(&self) -> Option<Pos> {
        match self {
            CompileError::Lex { pos, .. }
            | CompileError::Parse { pos, .. }
            | CompileError::Resolve { pos, .. } => Some(*pos),
            CompileError::Codegen(_) | CompileError::Io { .. } => None,
        }
    }
}

impl From<BuilderError> for CompileError {
    fn from(err: BuilderError) -> Self {
        Self::Codegen(format!("llvm builder: {err:?}"))
    }
}
