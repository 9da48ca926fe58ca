//! Compiler core for TinyCompiled (TC), a small assembly-like language
//! that compiles to NASM x86-64 Linux assembly text.
//!
//! The pipeline is three pure stages, each a plain function over the
//! previous stage's output:
//!
//! ```text
//! source text -> lexer::tokenize -> parser::Parser::parse -> codegen::generate
//! ```
//!
//! # Example
//!
//! ```
//! let asm = tcc_core::compile("VAR x, 7\nPRINT x\nHALT\n").unwrap();
//! assert!(asm.contains("global _start"));
//! ```

pub mod ast;
pub mod codegen;
pub mod lexer;
pub mod parser;
pub mod token;

use thiserror::Error;

pub use ast::Program;
pub use codegen::GenError;
pub use lexer::LexError;
pub use parser::ParseError;

/// Aggregates the three pipeline stages' errors behind one type, mirroring
/// the shape of the assembler crate this workspace grew out of.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("generation error: {0}")]
    Gen(#[from] GenError),
}

/// Options for a single `compile_with_options` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// `None` defers to the `DEBUG` environment variable; `Some(_)`
    /// overrides it. Never changes the returned assembly text — only
    /// whether the token stream and syntax tree are logged at `debug`
    /// level before code generation.
    pub debug: Option<bool>,
}

/// Compiles TC source into NASM x86-64 Linux assembly text, using
/// `CompileOptions::default()`.
pub fn compile(source: &str) -> Result<String, CompileError> {
    compile_with_options(source, CompileOptions::default())
}

/// Compiles TC source into NASM x86-64 Linux assembly text.
pub fn compile_with_options(
    source: &str,
    opts: CompileOptions,
) -> Result<String, CompileError> {
    let debug = opts.debug.unwrap_or_else(env_debug_flag);

    let tokens = lexer::tokenize(source);
    if debug {
        tracing::debug!(token_count = tokens.len(), "lexed tokens");
        tracing::debug!(?tokens, "token stream");
    }

    let program = parser::Parser::parse(tokens)?;
    if debug {
        tracing::debug!(
            statement_count = program.statements.len(),
            "parsed program"
        );
        tracing::debug!(?program, "syntax tree");
    }

    let asm = codegen::generate(&program)?;
    tracing::debug!(bytes = asm.len(), "generated nasm text");
    Ok(asm)
}

fn env_debug_flag() -> bool {
    std::env::var("DEBUG")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_is_pure_and_deterministic() {
        let src = "VAR x, 7\nPRINT x\nHALT\n";
        assert_eq!(compile(src).unwrap(), compile(src).unwrap());
    }

    #[test]
    fn explicit_debug_flag_does_not_change_output() {
        let src = "VAR x, 7\nPRINT x\nHALT\n";
        let plain = compile(src).unwrap();
        let debug = compile_with_options(src, CompileOptions { debug: Some(true) }).unwrap();
        assert_eq!(plain, debug);
    }

    #[test]
    fn parse_errors_surface_through_compile_error() {
        let err = compile("LOAD R1\n").unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
    }
}
