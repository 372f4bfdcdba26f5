use std::process::ExitCode;

use anyhow::Context;

use lambda::config::{self, Command, USAGE};

fn main() -> ExitCode {
    let options = match config::from_env() {
        Ok(Command::Build(options)) => options,
        Ok(Command::Help) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("lambda: {err}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_max_level(options.log_level)
        .init();

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("lambda: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(options: &lambda::Options) -> anyhow::Result<()> {
    lambda::build(options).with_context(|| format!("compiling {}", options.input.display()))?;
    Ok(())
}
