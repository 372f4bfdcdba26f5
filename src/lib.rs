//! Crate root: wires together the compilation pipeline.
//!
//! text -> `lexer` -> `parser` -> `resolve` -> `codegen` -> `link`
//!
//! Each stage consumes the previous stage's output in full and fails with a
//! [`CompileError`] naming the stage; nothing is written on failure.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod lexer;
pub mod link;
pub mod parser;
pub mod resolve;
pub mod runtime;

use std::fs;
use std::path::{Path, PathBuf};

use inkwell::context::Context as LlvmContext;
use inkwell::targets::TargetTriple;
use tracing::{debug, info, warn};

pub use ast::Program;
pub use codegen::Codegen;
pub use config::{Emit, Options};
pub use error::{CompileError, CompileResult, Pos};
pub use lexer::{tokenize, Token, TokenKind};
pub use resolve::{resolve, ResolvedProgram};

/// Parse source text into a program AST.
pub fn parse(src: &str) -> CompileResult<Program> {
    parser::Parser::parse(src)
}

/// Run the front end and build a verified module for the host, then hand
/// it to `f`.
fn with_module<T>(
    src: &str,
    f: impl FnOnce(&Codegen<'_>, &TargetTriple) -> CompileResult<T>,
) -> CompileResult<T> {
    let program = parse(src)?;
    let resolved = resolve(&program)?;
    let ctx = LlvmContext::create();
    let triple = codegen::host_triple();
    let mut cg = Codegen::new(&ctx, &triple);
    cg.emit_program(&resolved)?;
    f(&cg, &triple)
}

/// Compile source text to textual LLVM IR.
pub fn compile_to_ir(src: &str) -> CompileResult<String> {
    with_module(src, |cg, _| Ok(cg.print_ir()))
}

/// Compile source text to native assembly for the host.
pub fn compile_to_assembly(src: &str) -> CompileResult<String> {
    with_module(src, |cg, triple| cg.assembly(triple))
}

/// Compile `options.input` and write the requested artifact to
/// `options.output`, returning its path.
pub fn build(options: &Options) -> CompileResult<PathBuf> {
    let src = fs::read_to_string(&options.input)
        .map_err(|err| CompileError::io(&options.input, err))?;
    check_output_path(&options.input, &options.output)?;

    with_module(&src, |cg, triple| match options.emit {
        Emit::LlvmIr => cg.write_ir(&options.output),
        Emit::Assembly => cg.write_assembly(triple, &options.output),
        Emit::Executable => {
            let driver = link::find_driver(options.cc.as_deref())?;
            // private scratch object, removed when dropped
            let object = tempfile::Builder::new()
                .prefix("lambda-")
                .suffix(".o")
                .tempfile()
                .map_err(|err| CompileError::io(std::env::temp_dir(), err))?;
            cg.write_object(triple, object.path())?;

            let linked = link::link_exe(&driver, object.path(), &options.output);
            if linked.is_err() {
                remove_if_present(&options.output);
            }
            linked
        }
    })
    .inspect_err(|err| {
        warn!(stage = err.stage(), input = %options.input.display(), "compilation failed");
    })?;

    info!(output = %options.output.display(), "built artifact");
    Ok(options.output.clone())
}

/// Refuse to write the artifact over the source file.
fn check_output_path(input: &Path, output: &Path) -> CompileResult<()> {
    let same = match (fs::canonicalize(input), fs::canonicalize(output)) {
        (Ok(input), Ok(output)) => input == output,
        _ => false,
    };
    if same {
        return Err(CompileError::codegen(format!(
            "output `{}` is the source file",
            output.display()
        )));
    }
    Ok(())
}

fn remove_if_present(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %err, "could not remove file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_keep_their_stage() {
        assert_eq!(compile_to_assembly("func main() { @ }").unwrap_err().stage(), "lex");
        assert_eq!(compile_to_assembly("func main() {").unwrap_err().stage(), "parse");
        assert_eq!(compile_to_assembly("func f() { }").unwrap_err().stage(), "resolve");
        assert_eq!(
            compile_to_assembly("func nope();\nfunc main() { }")
                .unwrap_err()
                .stage(),
            "codegen"
        );
    }

    #[test]
    fn ir_names_the_user_entry() {
        let ir = compile_to_ir("func main() { }").unwrap();
        assert!(ir.contains("@lambda_fn_main"), "{ir}");
    }

    #[test]
    fn output_may_not_overwrite_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("prog.s");
        fs::write(&src, "func main() { }").unwrap();

        let mut options = Options::new(&src, dir.path().join(".").join("prog.s"));
        options.emit = Emit::Assembly;
        let err = build(&options).unwrap_err();
        assert!(err.to_string().contains("is the source file"), "{err}");
        assert_eq!(fs::read_to_string(&src).unwrap(), "func main() { }");
    }

    #[test]
    fn missing_input_is_an_io_error() {
        let options = Options::new("/nonexistent/prog.lambda", "/nonexistent/prog");
        assert!(matches!(build(&options), Err(CompileError::Io { .. })));
    }
}
