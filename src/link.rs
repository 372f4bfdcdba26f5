//! Link the generated object file into an executable using the host C
//! toolchain driver, which also supplies libc and the process startup code.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{CompileError, CompileResult};

/// Drivers tried, in order, when none is configured.
const DRIVERS: [&str; 3] = ["cc", "gcc", "clang"];

/// Locate the toolchain driver: an explicit path or name wins, otherwise the
/// first of `cc`, `gcc`, `clang` found on `PATH`.
pub fn find_driver(explicit: Option<&Path>) -> CompileResult<PathBuf> {
    if let Some(path) = explicit {
        return which::which(path).map_err(|err| {
            CompileError::codegen(format!(
                "configured toolchain `{}` not found: {err}",
                path.display()
            ))
        });
    }
    DRIVERS
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| {
            CompileError::codegen(format!(
                "no C toolchain found on PATH (tried {})",
                DRIVERS.join(", ")
            ))
        })
}

/// Link `obj` against libc into the executable `out_exe`.
pub fn link_exe(driver: &Path, obj: &Path, out_exe: &Path) -> CompileResult<()> {
    debug!(driver = %driver.display(), obj = %obj.display(), out = %out_exe.display(), "linking");
    let output = Command::new(driver)
        .arg(obj)
        .arg("-o")
        .arg(out_exe)
        .output()
        .map_err(|err| CompileError::io(driver, err))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, "toolchain failed");
        return Err(CompileError::codegen(format!(
            "{} failed ({}): {}",
            driver.display(),
            output.status,
            stderr.trim()
        )));
    }

    #[cfg(unix)]
    {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        let mut perm = fs::metadata(out_exe)
            .map_err(|err| CompileError::io(out_exe, err))?
            .permissions();
        perm.set_mode(0o755);
        fs::set_permissions(out_exe, perm).map_err(|err| CompileError::io(out_exe, err))?;
    }

    Ok(())
}
