//! Rewrites component-level mutations so they announce themselves.
//!
//! `counter++` becomes `(counter++, lifecycle.refresh(["counter"]))`. Reactive
//! declarations are dropped from the script here; the generator emits them
//! inside the lifecycle object instead.

use oxc_allocator::{Allocator, Box as oxc_box, CloneIn};
use oxc_ast::ast::*;
use oxc_ast::AstBuilder;
use oxc_ast_visit::walk_mut::{
    walk_arrow_function_expression, walk_block_statement, walk_catch_clause, walk_expression,
    walk_for_in_statement, walk_for_of_statement, walk_for_statement, walk_function,
};
use oxc_ast_visit::VisitMut;
use oxc_codegen::Codegen;
use oxc_span::SPAN;
use oxc_syntax::scope::ScopeFlags;
use std::collections::BTreeSet;

use crate::codegen::js_string;
use crate::options::RewritePolicy;
use crate::parse::parse_program;
use crate::scope::{assignment_target_names, update_target_names, ScopeCursor};
use crate::semantic::{is_reactive_label, SemanticFacts};

/// Object the emitted component binds its lifecycle to.
pub const LIFECYCLE_BINDING: &str = "lifecycle";
/// Lifecycle entry point a mutation notifies.
pub const REFRESH_METHOD: &str = "refresh";

/// Source text of `lifecycle.refresh([...])` for the given names.
pub fn refresh_call(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| js_string(n)).collect();
    format!("{}.{}([{}])", LIFECYCLE_BINDING, REFRESH_METHOD, quoted.join(", "))
}

struct ScriptRewriter<'a, 't> {
    allocator: &'a Allocator,
    ast: AstBuilder<'a>,
    cursor: ScopeCursor<'t>,
    facts: &'t SemanticFacts,
    tracked: &'t BTreeSet<String>,
    rewritten: usize,
}

impl<'a, 't> ScriptRewriter<'a, 't> {
    fn new(allocator: &'a Allocator, facts: &'t SemanticFacts, policy: RewritePolicy) -> Self {
        let tracked = match policy {
            RewritePolicy::Reactive => &facts.reactive,
            RewritePolicy::Referred => &facts.referred,
        };
        Self {
            allocator,
            ast: AstBuilder::new(allocator),
            cursor: ScopeCursor::new(&facts.scopes),
            facts,
            tracked,
            rewritten: 0,
        }
    }

    fn notify_targets(&self, names: Vec<String>) -> Vec<String> {
        names
            .into_iter()
            .filter(|name| self.tracked.contains(name))
            .filter(|name| self.facts.is_root_binding(&self.cursor, name))
            .collect()
    }

    fn refresh_expression(&self, names: &[String]) -> Expression<'a> {
        let mut elements = self.ast.vec();
        for name in names {
            let value = self.allocator.alloc_str(name);
            elements.push(ArrayExpressionElement::from(
                self.ast.expression_string_literal(SPAN, value, None),
            ));
        }
        let mut args = self.ast.vec();
        args.push(Argument::from(self.ast.expression_array(SPAN, elements)));

        let callee = Expression::from(self.ast.member_expression_static(
            SPAN,
            self.ast.expression_identifier(SPAN, LIFECYCLE_BINDING),
            self.ast.identifier_name(SPAN, REFRESH_METHOD),
            false,
        ));
        self.ast.expression_call(
            SPAN,
            callee,
            None::<oxc_box<TSTypeParameterInstantiation>>,
            args,
            false,
        )
    }
}

impl<'a> VisitMut<'a> for ScriptRewriter<'a, '_> {
    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        walk_expression(self, expr);

        let targets = match expr {
            Expression::UpdateExpression(update) => update_target_names(&update.argument),
            Expression::AssignmentExpression(assign) => assignment_target_names(&assign.left),
            _ => return,
        };
        let names = self.notify_targets(targets);
        if names.is_empty() {
            return;
        }

        tracing::trace!(names = ?names, "rewriting mutation");
        let mutation = expr.clone_in(self.allocator);
        let mut sequence = self.ast.vec();
        sequence.push(mutation);
        sequence.push(self.refresh_expression(&names));
        *expr = self.ast.expression_sequence(SPAN, sequence);
        self.rewritten += 1;
    }

    fn visit_function(&mut self, func: &mut Function<'a>, flags: ScopeFlags) {
        let entered = self.cursor.enter(func.span);
        walk_function(self, func, flags);
        self.cursor.leave(entered);
    }

    fn visit_arrow_function_expression(&mut self, arrow: &mut ArrowFunctionExpression<'a>) {
        let entered = self.cursor.enter(arrow.span);
        walk_arrow_function_expression(self, arrow);
        self.cursor.leave(entered);
    }

    fn visit_block_statement(&mut self, block: &mut BlockStatement<'a>) {
        let entered = self.cursor.enter(block.span);
        walk_block_statement(self, block);
        self.cursor.leave(entered);
    }

    fn visit_for_statement(&mut self, stmt: &mut ForStatement<'a>) {
        let entered = self.cursor.enter(stmt.span);
        walk_for_statement(self, stmt);
        self.cursor.leave(entered);
    }

    fn visit_for_in_statement(&mut self, stmt: &mut ForInStatement<'a>) {
        let entered = self.cursor.enter(stmt.span);
        walk_for_in_statement(self, stmt);
        self.cursor.leave(entered);
    }

    fn visit_for_of_statement(&mut self, stmt: &mut ForOfStatement<'a>) {
        let entered = self.cursor.enter(stmt.span);
        walk_for_of_statement(self, stmt);
        self.cursor.leave(entered);
    }

    fn visit_catch_clause(&mut self, clause: &mut CatchClause<'a>) {
        let entered = self.cursor.enter(clause.span);
        walk_catch_clause(self, clause);
        self.cursor.leave(entered);
    }
}

/// Returns the script with reactive declarations removed and every tracked
/// component-level mutation rewritten to notify `lifecycle.refresh`.
pub fn rewrite_script(source: &str, facts: &SemanticFacts, policy: RewritePolicy) -> String {
    if source.trim().is_empty() {
        return String::new();
    }

    let allocator = Allocator::default();
    let mut program = parse_program(&allocator, source);
    let ast = AstBuilder::new(&allocator);

    let mut body = ast.vec();
    for stmt in program.body.into_iter() {
        if !is_reactive_label(&stmt) {
            body.push(stmt);
        }
    }
    program.body = body;

    let mut rewriter = ScriptRewriter::new(&allocator, facts, policy);
    rewriter.visit_program(&mut program);
    tracing::debug!(
        policy = policy.as_str(),
        rewritten = rewriter.rewritten,
        "script rewritten"
    );

    Codegen::new().build(&program).code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::build;
    use crate::semantic::analyze;

    fn rewrite(source: &str, policy: RewritePolicy) -> String {
        let component = build(source, "test.svelte").unwrap();
        let facts = analyze(&component);
        rewrite_script(component.script_source(), &facts, policy)
    }

    #[test]
    fn refresh_call_quotes_names() {
        assert_eq!(
            refresh_call(&["a".to_string(), "b".to_string()]),
            r#"lifecycle.refresh(["a", "b"])"#
        );
    }

    #[test]
    fn root_updates_announce_themselves() {
        let out = rewrite(
            "<script>let counter = 0; function inc() { counter++; }</script><p>{counter}</p>",
            RewritePolicy::Reactive,
        );
        assert!(out.contains("counter++"), "{out}");
        assert!(out.contains("lifecycle.refresh([\"counter\"])"), "{out}");
    }

    #[test]
    fn shadowed_names_are_left_alone() {
        let out = rewrite(
            "<script>let counter = 0; const inc = () => counter++;\
             function other(counter) { counter = 5; }</script>",
            RewritePolicy::Reactive,
        );
        assert_eq!(out.matches("lifecycle.refresh").count(), 1, "{out}");
    }

    #[test]
    fn member_mutations_notify_the_root_object() {
        let out = rewrite(
            "<script>let counter = { a: { b: { c: 0 } } }; const inc = () => counter.a.b.c++;</script>",
            RewritePolicy::Reactive,
        );
        assert!(out.contains("counter.a.b.c++"), "{out}");
        assert!(out.contains("lifecycle.refresh([\"counter\"])"), "{out}");
    }

    #[test]
    fn reactive_declarations_are_removed() {
        let out = rewrite(
            "<script>let n = 0; const inc = () => n++; $: double = n * 2;</script>",
            RewritePolicy::Reactive,
        );
        assert!(!out.contains("double"), "{out}");
        assert!(!out.contains("$:"), "{out}");
    }

    #[test]
    fn referred_policy_only_tracks_markup_names() {
        let source = "<script>let shown = 0; let hidden = 0;\
                      const inc = () => { shown++; hidden++; };</script><p>{shown}</p>";
        let out = rewrite(source, RewritePolicy::Referred);
        assert!(out.contains("lifecycle.refresh([\"shown\"])"), "{out}");
        assert!(!out.contains("lifecycle.refresh([\"hidden\"])"), "{out}");

        let out = rewrite(source, RewritePolicy::Reactive);
        assert!(out.contains("lifecycle.refresh([\"hidden\"])"), "{out}");
    }

    #[test]
    fn empty_script_stays_empty() {
        assert_eq!(rewrite("<p>hi</p>", RewritePolicy::Reactive), "");
    }
}
