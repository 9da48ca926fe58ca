use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;

use super::compile_source;

/// `tcc compile <input> [output]` — writes NASM text to `output`, or to
/// stdout when no output path is given.
pub fn run(input: &Path, output: Option<&Path>, debug: bool) -> anyhow::Result<ExitCode> {
    let asm = compile_source(input, debug)?;

    match output {
        Some(path) => {
            std::fs::write(path, &asm)
                .with_context(|| format!("writing assembly to {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote assembly");
        }
        None => print!("{asm}"),
    }

    Ok(ExitCode::SUCCESS)
}
