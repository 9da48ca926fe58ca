pub mod build;
pub mod compile;
pub mod run;

use std::path::Path;

use anyhow::Context;
use tcc_core::CompileOptions;

/// Reads `path` and compiles it, threading the CLI's `--debug` flag through
/// as `Some(true)`; omitting it defers to the `DEBUG` environment variable,
/// matching the core's documented contract.
pub(crate) fn compile_source(path: &Path, debug: bool) -> anyhow::Result<String> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading source file {}", path.display()))?;
    let opts = CompileOptions {
        debug: if debug { Some(true) } else { None },
    };
    tcc_core::compile_with_options(&source, opts)
        .with_context(|| format!("compiling {}", path.display()))
}
