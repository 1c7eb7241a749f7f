//! DSL front-end: lexer, parser, semantic analyzer, and code generator (C2–C4).
//!
//! ```text
//! source text -> lexer::tokenize -> parser::parse -> analyzer::analyze -> codegen::generate
//! ```

pub mod analyzer;
pub mod ast;
pub mod codegen;
pub mod lexer;
pub mod parser;

use crate::diagnostics::Diagnostic;
use codegen::CompiledWorkflow;

/// Run the full front-end pipeline on one `.sr` source file.
///
/// Returns the compiled workflow alongside every diagnostic collected along
/// the way (parser recoveries plus analyzer errors/warnings) even when
/// `is_valid` is false on the analysis result — callers that only want a
/// valid program should check `analysis.is_valid` before trusting `compiled`.
pub struct CompileOutcome {
    pub compiled: CompiledWorkflow,
    pub is_valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

pub fn compile_source(source: &str, file: &str) -> Result<CompileOutcome, parser::DslSyntaxError> {
    let parsed = parser::parse(source, file)?;
    let analysis = analyzer::analyze(&parsed.file, file);

    let mut errors = parsed.diagnostics;
    errors.extend(analysis.errors);

    Ok(CompileOutcome {
        compiled: codegen::generate(&parsed.file),
        is_valid: analysis.is_valid && errors.iter().all(|d| d.severity != crate::diagnostics::Severity::Error),
        errors,
        warnings: analysis.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_minimal_program() {
        let src = "streetrace v1\nflow main:\n    x = 1\n    return x\n";
        let outcome = compile_source(src, "test.sr").unwrap();
        assert!(outcome.is_valid);
        assert!(outcome.compiled.flow("main").is_some());
    }

    #[test]
    fn surfaces_analyzer_errors_without_failing_the_pipeline() {
        let src = "streetrace v1\nflow main:\n    return missing\n";
        let outcome = compile_source(src, "test.sr").unwrap();
        assert!(!outcome.is_valid);
        assert!(!outcome.errors.is_empty());
    }
}
