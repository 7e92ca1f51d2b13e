//! Code generator.
//!
//! Walks the markup tree once and emits the three lifecycle bodies of the
//! component: `construct(target)` builds and attaches every node,
//! `refresh(changed)` re-evaluates the expressions that read a changed name,
//! and `teardown(target)` detaches everything in reverse.

use oxc_allocator::Allocator;
use oxc_ast::ast::{Expression, Statement};
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use serde::Serialize;

use crate::ir::{AttributeIR, AttributeValue, ComponentIR, ElementNode, ExpressionNode, TextNode};
use crate::options::CompileOptions;
use crate::parse::script_source_type;
use crate::rewrite::{refresh_call, rewrite_script, LIFECYCLE_BINDING};
use crate::scope::free_names;
use crate::semantic::{ReactiveDeclaration, SemanticFacts};
use crate::visitor::{walk_element, TemplateVisitor};

/// Parameter of `construct` and `teardown`: the container to attach to.
pub const TARGET_PARAM: &str = "target";
/// Parameter of `refresh`: the names that just changed.
pub const CHANGED_PARAM: &str = "changed";

const TEXT_PREFIX: &str = "txt";
const EXPRESSION_PREFIX: &str = "exp";
const INDENT: &str = "  ";

// ═══════════════════════════════════════════════════════════════════════════════
// PRINTING HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// JS string literal for `value`.
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

/// `changed.includes("a") || changed.includes("b")`
pub fn changed_guard(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("{}.includes({})", CHANGED_PARAM, js_string(n)))
        .collect::<Vec<_>>()
        .join(" || ")
}

/// Reprints expression text through the code printer. Falls back to the
/// original text when it does not come back as a single expression.
///
/// A comma sequence is parenthesized so it stays a single argument or
/// right-hand side where it is spliced in.
pub fn print_expression(code: &str) -> String {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, script_source_type()).parse();
    let sequence = match ret.program.body.as_slice() {
        [Statement::ExpressionStatement(stmt)] if ret.errors.is_empty() => matches!(
            stmt.expression.without_parentheses(),
            Expression::SequenceExpression(_)
        ),
        _ => return code.trim().to_string(),
    };
    let printed = Codegen::new().build(&ret.program).code;
    let printed = printed.trim();
    let printed = printed.strip_suffix(';').unwrap_or(printed);
    if sequence {
        format!("({})", printed)
    } else {
        printed.to_string()
    }
}

/// Reprints statement text through the code printer.
pub fn print_statement(code: &str) -> String {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, script_source_type()).parse();
    if !ret.errors.is_empty() {
        return code.trim().to_string();
    }
    Codegen::new().build(&ret.program).code.trim().to_string()
}

fn handle_prefix(tag: &str) -> String {
    let prefix: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if prefix.is_empty() || prefix.starts_with(|c: char| c.is_ascii_digit()) {
        format!("el_{}", prefix)
    } else {
        prefix
    }
}

/// Hands out handle names. One counter is shared by every kind so a name is
/// never reused within a component.
#[derive(Debug, Default)]
struct Mangler {
    counter: usize,
}

impl Mangler {
    fn mangle(&mut self, prefix: &str) -> String {
        let name = format!("{}_{}", prefix, self.counter);
        self.counter += 1;
        name
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EMITTED PROGRAM
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmittedProgram {
    pub name: Option<String>,
    /// Handle variables in allocation order, then hoisted reactive assignees.
    pub declarations: Vec<String>,
    /// The rewritten script body.
    pub script: String,
    pub construct: Vec<String>,
    pub refresh: Vec<String>,
    pub teardown: Vec<String>,
}

fn push_lines(out: &mut String, depth: usize, text: &str) {
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        for _ in 0..depth {
            out.push_str(INDENT);
        }
        out.push_str(line);
        out.push('\n');
    }
}

impl EmittedProgram {
    pub fn render(&self) -> String {
        let mut out = String::new();
        match &self.name {
            Some(name) => out.push_str(&format!("export default function {}() {{\n", name)),
            None => out.push_str("export default function () {\n"),
        }

        for name in &self.declarations {
            push_lines(&mut out, 1, &format!("let {};", name));
        }
        push_lines(&mut out, 1, &self.script);

        push_lines(&mut out, 1, &format!("const {} = {{", LIFECYCLE_BINDING));
        let sections: [(&str, &str, &[String]); 3] = [
            ("construct", TARGET_PARAM, self.construct.as_slice()),
            ("refresh", CHANGED_PARAM, self.refresh.as_slice()),
            ("teardown", TARGET_PARAM, self.teardown.as_slice()),
        ];
        for (method, param, body) in sections {
            push_lines(&mut out, 2, &format!("{}({}) {{", method, param));
            for stmt in body {
                push_lines(&mut out, 3, stmt);
            }
            push_lines(&mut out, 2, "},");
        }
        push_lines(&mut out, 1, "};");
        push_lines(&mut out, 1, &format!("return {};", LIFECYCLE_BINDING));
        out.push_str("}\n");
        out
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKUP EMITTER
// ═══════════════════════════════════════════════════════════════════════════════

struct MarkupEmitter<'f> {
    facts: &'f SemanticFacts,
    mangler: Mangler,
    /// Handle of the node currently being filled; the bottom is the target.
    parents: Vec<String>,
    handles: Vec<String>,
    construct: Vec<String>,
    refresh: Vec<String>,
    teardown: Vec<String>,
}

impl<'f> MarkupEmitter<'f> {
    fn new(facts: &'f SemanticFacts) -> Self {
        Self {
            facts,
            mangler: Mangler::default(),
            parents: vec![TARGET_PARAM.to_string()],
            handles: Vec::new(),
            construct: Vec::new(),
            refresh: Vec::new(),
            teardown: Vec::new(),
        }
    }

    fn parent(&self) -> &str {
        self.parents.last().map_or(TARGET_PARAM, String::as_str)
    }

    fn allocate(&mut self, prefix: &str) -> String {
        let handle = self.mangler.mangle(prefix);
        self.handles.push(handle.clone());
        handle
    }

    fn append(&mut self, handle: &str) {
        let parent = self.parent().to_string();
        self.construct.push(format!("{}.appendChild({});", parent, handle));
    }

    /// Teardown is collected in pre-order and reversed once the walk is done,
    /// so children and later siblings detach first.
    fn detach(&mut self, handle: &str) {
        let parent = self.parent().to_string();
        self.teardown.push(format!("{}.removeChild({});", parent, handle));
    }
}

impl TemplateVisitor for MarkupEmitter<'_> {
    fn visit_element(&mut self, element: &ElementNode) {
        let handle = self.allocate(&handle_prefix(&element.tag));
        self.construct.push(format!(
            "{} = document.createElement({});",
            handle,
            js_string(&element.tag)
        ));

        self.detach(&handle);

        self.parents.push(handle.clone());
        walk_element(self, element);
        self.parents.pop();

        self.append(&handle);
    }

    fn visit_attribute(&mut self, attribute: &AttributeIR) {
        let handle = self.parent().to_string();
        match &attribute.value {
            AttributeValue::Static(value) => self.construct.push(format!(
                "{}.setAttribute({}, {});",
                handle,
                js_string(&attribute.name),
                js_string(value)
            )),
            // Set once; dynamic attributes are not re-evaluated on refresh.
            AttributeValue::Dynamic(expr) => self.construct.push(format!(
                "{}.setAttribute({}, {});",
                handle,
                js_string(&attribute.name),
                print_expression(&expr.code)
            )),
            AttributeValue::Event { event, handler } => {
                let handler = print_expression(&handler.code);
                let event = js_string(event);
                self.construct.push(format!(
                    "{}.addEventListener({}, {});",
                    handle, event, handler
                ));
                self.teardown.push(format!(
                    "{}.removeEventListener({}, {});",
                    handle, event, handler
                ));
            }
        }
    }

    fn visit_text(&mut self, text: &TextNode) {
        let handle = self.allocate(TEXT_PREFIX);
        self.construct.push(format!(
            "{} = document.createTextNode({});",
            handle,
            js_string(&text.value)
        ));
        self.append(&handle);
        self.detach(&handle);
    }

    fn visit_expression(&mut self, expression: &ExpressionNode) {
        let handle = self.allocate(EXPRESSION_PREFIX);
        let printed = print_expression(&expression.expression.code);
        self.construct.push(format!(
            "{} = document.createTextNode({});",
            handle, printed
        ));
        self.append(&handle);
        self.detach(&handle);

        let reads: Vec<String> = free_names(&expression.expression.code)
            .into_iter()
            .filter(|name| self.facts.reactive.contains(name))
            .collect();
        if !reads.is_empty() {
            self.refresh.push(format!(
                "if ({}) {}.textContent = {};",
                changed_guard(&reads),
                handle,
                printed
            ));
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GENERATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Statement run for a reactive declaration, followed by the notification
/// for its assignees when it has any.
fn declaration_body(decl: &ReactiveDeclaration) -> String {
    let stmt = print_statement(&decl.code);
    if decl.assignees.is_empty() {
        stmt
    } else {
        format!("{}\n{};", stmt, refresh_call(&decl.assignees))
    }
}

pub fn generate(component: &ComponentIR, facts: &SemanticFacts, options: &CompileOptions) -> EmittedProgram {
    let mut emitter = MarkupEmitter::new(facts);
    emitter.visit_template(&component.template);
    let MarkupEmitter {
        handles,
        mut construct,
        mut refresh,
        mut teardown,
        ..
    } = emitter;
    teardown.reverse();

    // Runs after the markup so notifications find every handle in place.
    for decl in &facts.responsive {
        let body = declaration_body(decl);
        construct.push(body.clone());
        if !decl.dependencies.is_empty() {
            refresh.push(format!(
                "if ({}) {{\n{}\n}}",
                changed_guard(&decl.dependencies),
                indent(&body)
            ));
        }
    }

    let script = rewrite_script(component.script_source(), facts, options.rewrite_policy);

    let mut declarations = handles;
    declarations.extend(facts.hoisted.iter().cloned());

    tracing::debug!(
        file = %component.file_path,
        declarations = declarations.len(),
        construct = construct.len(),
        refresh = refresh.len(),
        teardown = teardown.len(),
        "program generated"
    );

    EmittedProgram {
        name: options.component_name.clone(),
        declarations,
        script,
        construct,
        refresh,
        teardown,
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", INDENT, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::build;
    use crate::semantic::analyze;

    fn emit(source: &str) -> EmittedProgram {
        let component = build(source, "test.svelte").unwrap();
        let facts = analyze(&component);
        generate(&component, &facts, &CompileOptions::default())
    }

    #[test]
    fn mangler_shares_one_counter() {
        let mut mangler = Mangler::default();
        assert_eq!(mangler.mangle("button"), "button_0");
        assert_eq!(mangler.mangle("txt"), "txt_1");
        assert_eq!(mangler.mangle("exp"), "exp_2");
    }

    #[test]
    fn handle_prefix_is_a_valid_identifier() {
        assert_eq!(handle_prefix("div"), "div");
        assert_eq!(handle_prefix("my-widget"), "my_widget");
        assert_eq!(handle_prefix("h1"), "h1");
    }

    #[test]
    fn guard_joins_with_or() {
        assert_eq!(
            changed_guard(&["a".to_string(), "b".to_string()]),
            r#"changed.includes("a") || changed.includes("b")"#
        );
    }

    #[test]
    fn printing_normalizes_expressions() {
        assert_eq!(print_expression("counter*double"), "counter * double");
        assert_eq!(print_expression("{ a: 1 }"), "{ a: 1 }");
    }

    #[test]
    fn sequences_stay_one_value() {
        assert_eq!(print_expression("(a, a + 1)"), "(a, a + 1)");

        let program = emit(
            "<script>let a = 0; const inc = () => a++;</script><p>{(a, a + 1)}</p>",
        );
        assert!(program
            .construct
            .contains(&"exp_1 = document.createTextNode((a, a + 1));".to_string()));
        assert_eq!(
            program.refresh,
            vec![r#"if (changed.includes("a")) exp_1.textContent = (a, a + 1);"#]
        );
    }

    #[test]
    fn static_and_dynamic_attributes_are_set_once() {
        let program = emit(
            r#"<script>let cls = "a"; const swap = () => cls = "b";</script><p class="x" title={cls}>hi</p>"#,
        );
        assert!(program
            .construct
            .contains(&r#"p_0.setAttribute("class", "x");"#.to_string()));
        assert!(program
            .construct
            .contains(&r#"p_0.setAttribute("title", cls);"#.to_string()));
        assert!(program.refresh.iter().all(|s| !s.contains("setAttribute")));
    }

    #[test]
    fn mixed_text_becomes_a_container() {
        let program = emit("<script>let n = 0; const inc = () => n++;</script><p>Count: {n}!</p>");
        assert_eq!(
            program.declarations,
            vec!["p_0", "div_1", "txt_2", "exp_3", "txt_4"]
        );
        assert_eq!(
            program.refresh,
            vec![r#"if (changed.includes("n")) exp_3.textContent = n;"#]
        );
    }

    #[test]
    fn text_is_json_escaped() {
        let program = emit(r#"<p>say "hi"</p>"#);
        assert!(program
            .construct
            .contains(&r#"txt_1 = document.createTextNode("say \"hi\"");"#.to_string()));
    }

    #[test]
    fn render_produces_one_function_with_three_entry_points() {
        let out = emit("<script>let n = 0;</script><p>{n}</p>").render();
        assert!(out.starts_with("export default function () {\n"));
        assert!(out.contains("  let p_0;\n"));
        assert!(out.contains("  let n = 0;\n"));
        assert!(out.contains("    construct(target) {\n"));
        assert!(out.contains("    refresh(changed) {\n"));
        assert!(out.contains("    teardown(target) {\n"));
        assert!(out.trim_end().ends_with("return lifecycle;\n}"));
    }
}
