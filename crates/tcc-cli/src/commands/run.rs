use std::path::Path;
use std::process::{Command, ExitCode};

use anyhow::Context;
use tempfile::Builder;

use super::build::build_to;

/// `tcc run <input> [--output exe]` — builds (to `--output`, or a temp
/// path when omitted) and immediately executes the result, propagating its
/// exit status.
pub fn run(input: &Path, output: Option<&Path>, debug: bool) -> anyhow::Result<ExitCode> {
    let temp_exe;
    let exe_path = match output {
        Some(path) => path,
        None => {
            temp_exe = Builder::new()
                .prefix("tcc-run-")
                .tempfile()
                .context("creating temporary executable path")?
                .into_temp_path();
            &*temp_exe
        }
    };

    build_to(input, exe_path, debug)?;
    mark_executable(exe_path)?;

    let status = Command::new(exe_path)
        .status()
        .with_context(|| format!("executing {}", exe_path.display()))?;

    match status.code() {
        Some(code) => Ok(ExitCode::from(code as u8)),
        None => Ok(ExitCode::FAILURE),
    }
}

/// `ld` truncates and rewrites an existing output file in place without
/// touching its mode, so a path reserved via `tempfile` (created `0600`,
/// no execute bit) would otherwise fail to run. Explicit `--output` paths
/// that don't exist yet get a fresh, executable file from `ld` itself, but
/// setting the bit here unconditionally is harmless either way.
#[cfg(unix)]
fn mark_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .with_context(|| format!("reading metadata for {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
        .with_context(|| format!("marking {} executable", path.display()))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
