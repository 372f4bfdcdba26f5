use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use lambda::config::CC_ENV;
use lambda::{build, Options};
use tempfile::TempDir;

/// Set to skip end-to-end tests on hosts without a C toolchain.
pub const SKIP_ENV: &str = "LAMBDA_SKIP_E2E";

/// Scratch directory removed when dropped.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("lambda-test-")
            .tempdir()
            .context("creating scratch directory")?;
        Ok(Self { dir })
    }

    pub fn write_source(&self, src: &str) -> Result<PathBuf> {
        self.write("prog.lambda", src)
    }

    pub fn write(&self, name: &str, src: &str) -> Result<PathBuf> {
        let path = self.path(name);
        fs::write(&path, src)?;
        Ok(path)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn configured_cc() -> Option<PathBuf> {
    std::env::var_os(CC_ENV).map(PathBuf::from)
}

/// Whether executables can be linked here. Without a toolchain the test
/// fails, unless `LAMBDA_SKIP_E2E` is set, in which case the skip is reported.
pub fn toolchain_available() -> bool {
    if lambda::link::find_driver(configured_cc().as_deref().map(Path::new)).is_ok() {
        return true;
    }
    if std::env::var_os(SKIP_ENV).is_some() {
        eprintln!("skipping: no C toolchain found and {SKIP_ENV} is set");
        return false;
    }
    panic!("no C toolchain (cc, gcc or clang) found; set {SKIP_ENV}=1 to skip end-to-end tests");
}

/// Compile `src`, run the produced binary and return its stdout.
#[allow(dead_code)]
pub fn compile_and_run(src: &str) -> Result<String> {
    let scratch = Scratch::new()?;
    let input = scratch.write_source(src)?;
    let output = scratch.path("prog");
    let mut options = Options::new(&input, &output);
    options.cc = configured_cc();
    build(&options)?;

    let run = Command::new(&output).output().context("running compiled program")?;
    if !run.status.success() {
        bail!("program exited with {}", run.status);
    }
    Ok(String::from_utf8(run.stdout)?)
}
