use std::path::Path;
use std::process::{Command, ExitCode};

use anyhow::{bail, Context};
use tempfile::Builder;

use super::compile_source;

/// `tcc build <input> <output>` — compiles to NASM text, assembles it with
/// `nasm` and links it with `ld` into a native ELF executable. Neither tool
/// is reimplemented; this is a thin subprocess driver, matching the
/// original CLI's temp-file build recipe.
pub fn run(input: &Path, output: &Path, debug: bool) -> anyhow::Result<ExitCode> {
    build_to(input, output, debug)?;
    tracing::info!(path = %output.display(), "built executable");
    Ok(ExitCode::SUCCESS)
}

/// Shared by `build` and `run`: compiles `input` and links the result at
/// `output`, without forcing an `ExitCode` return so `run` can reuse it
/// before executing the binary.
pub(crate) fn build_to(input: &Path, output: &Path, debug: bool) -> anyhow::Result<()> {
    let asm = compile_source(input, debug)?;

    let asm_file = Builder::new()
        .suffix(".asm")
        .tempfile()
        .context("creating temporary assembly file")?;
    std::fs::write(asm_file.path(), &asm).context("writing temporary assembly file")?;

    let obj_file = Builder::new()
        .suffix(".o")
        .tempfile()
        .context("creating temporary object file")?;

    assemble(asm_file.path(), obj_file.path())?;
    link(obj_file.path(), output)?;
    Ok(())
}

fn assemble(asm_path: &Path, obj_path: &Path) -> anyhow::Result<()> {
    let status = Command::new("nasm")
        .args(["-f", "elf64", "-o"])
        .arg(obj_path)
        .arg(asm_path)
        .status()
        .context("running nasm (is it installed and on PATH?)")?;
    if !status.success() {
        bail!("nasm exited with {status}");
    }
    Ok(())
}

fn link(obj_path: &Path, output: &Path) -> anyhow::Result<()> {
    let status = Command::new("ld")
        .arg(obj_path)
        .arg("-o")
        .arg(output)
        .status()
        .context("running ld (is it installed and on PATH?)")?;
    if !status.success() {
        bail!("ld exited with {status}");
    }
    Ok(())
}
