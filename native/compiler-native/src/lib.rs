//! # Single-file reactive component compiler
//!
//! A component is one optional `<script>` block plus a markup body with
//! `{expression}` holes. Compilation is a one-way pipeline:
//!
//! 1. **Build** (`parse`): split script from markup, parse the markup, and
//!    produce the structured IR of elements, text and expressions.
//! 2. **Analyze** (`semantic`): build the script's scope tree, classify which
//!    component-level variables are reactive, split out `$:` reactive
//!    declarations with their dependency and assignee sets, and collect the
//!    names the markup reads.
//! 3. **Generate** (`codegen`, `rewrite`): emit one function returning
//!    `{ construct, refresh, teardown }`, with every tracked mutation in the
//!    script rewritten to call `lifecycle.refresh([...])`.
//!
//! There is no runtime diffing. A mutation site announces exactly which
//! names changed and `refresh` runs only the statements guarded on them.
//!
//! ## Known limits
//!
//! - Dynamic attributes are set once in `construct` and never refreshed.
//! - Reactive declarations that depend on each other in a cycle recurse
//!   through `refresh` until the host runs out of stack.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::Serialize;

pub mod codegen;
pub mod error;
pub mod ir;
pub mod options;
pub mod parse;
pub mod rewrite;
pub mod scope;
pub mod semantic;
pub mod visitor;


pub use codegen::{generate, EmittedProgram};
pub use error::{CompileError, Result};
pub use ir::ComponentIR;
pub use options::{CompileOptions, RewritePolicy};
pub use parse::build;
pub use semantic::{analyze, SemanticFacts};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    /// Rendered program text.
    pub code: String,
    pub ast: ComponentIR,
    pub facts: SemanticFacts,
    pub program: EmittedProgram,
}

/// Compiles one component source into program text.
pub fn compile(source: &str, options: &CompileOptions) -> Result<CompileResult> {
    let ast = parse::build(source, &options.file_path)?;
    let facts = semantic::analyze(&ast);
    let program = codegen::generate(&ast, &facts, options);
    let code = program.render();

    tracing::debug!(
        file = %options.file_path,
        bytes = code.len(),
        "compiled"
    );

    Ok(CompileResult {
        code,
        ast,
        facts,
        program,
    })
}

/// Node entry point. `options_json` takes the camelCase form of
/// [`CompileOptions`].
#[cfg(feature = "napi")]
#[napi]
pub fn compile_native(source: String, options_json: Option<String>) -> napi::Result<String> {
    let options: CompileOptions = match options_json {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| napi::Error::from_reason(format!("Invalid options: {}", e)))?,
        None => CompileOptions::default(),
    };
    compile(&source, &options)
        .map(|result| result.code)
        .map_err(|e| napi::Error::from_reason(format!("[{}] {}", e.code(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_reports_builder_errors() {
        let err = compile(
            "<script>let a;</script><script>let b;</script>",
            &CompileOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, CompileError::MultipleScriptBlocks { count: 2 });
        assert_eq!(err.code(), error::ERR_MULTIPLE_SCRIPTS);
    }

    #[test]
    fn compile_names_the_component() {
        let options = CompileOptions::new("Counter.svelte").with_component_name("Counter");
        let result = compile("<p>hi</p>", &options).unwrap();
        assert!(result.code.starts_with("export default function Counter() {"));
        assert_eq!(result.ast.file_path, "Counter.svelte");
    }

    #[test]
    fn script_syntax_errors_abort() {
        let err = compile("<script>let = ;</script><p>x</p>", &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::ScriptSyntax { .. }));
    }
}
