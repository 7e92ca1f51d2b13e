//! Semantic analysis: scopes, reactivity and the names the markup reads.

use oxc_allocator::{Allocator, Box as oxc_box};
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::ScopeFlags;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::ir::{AttributeIR, AttributeValue, ComponentIR, ExpressionNode, TemplateIR};
use crate::parse::parse_program;
use crate::scope::{
    assignment_target_names, expression_free_names, free_names, target_root, update_target_names,
    ScopeCursor, ScopeId, ScopeTree,
};
use crate::visitor::TemplateVisitor;

/// Label that marks a reactive declaration: `$: total = count + 1`.
pub const REACTIVE_LABEL: &str = "$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeclarationStyle {
    /// `$: name = expr`
    Assignment,
    /// Any other labeled statement.
    Statement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactiveDeclaration {
    pub style: DeclarationStyle,
    /// Names this declaration writes that are, or became, reactive.
    pub assignees: Vec<String>,
    /// Reactive names it reads.
    pub dependencies: Vec<String>,
    /// Source text of the labeled statement body.
    pub code: String,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticFacts {
    pub globals: BTreeSet<String>,
    pub reactive: BTreeSet<String>,
    pub referred: BTreeSet<String>,
    pub assignees: BTreeSet<String>,
    /// Assignees the script never declared, in first-seen order. The
    /// generator declares them next to the handles.
    pub hoisted: Vec<String>,
    pub responsive: Vec<ReactiveDeclaration>,
    pub scopes: ScopeTree,
}

impl SemanticFacts {
    /// Whether `name`, looked up from `scope`, is a component-level variable.
    pub fn is_root_binding(&self, cursor: &ScopeCursor<'_>, name: &str) -> bool {
        match cursor.resolve(name) {
            Some(owner) => owner == ScopeId::ROOT,
            None => self.hoisted.iter().any(|h| h == name),
        }
    }
}

pub(crate) fn is_reactive_label(stmt: &Statement<'_>) -> bool {
    matches!(stmt, Statement::LabeledStatement(labeled) if labeled.label.name == REACTIVE_LABEL)
}

/// `name = expr` with a non-member left-hand side.
fn as_plain_assignment<'s, 'a>(stmt: &'s Statement<'a>) -> Option<&'s AssignmentExpression<'a>> {
    let Statement::ExpressionStatement(expr_stmt) = stmt else {
        return None;
    };
    let Expression::AssignmentExpression(assign) = &expr_stmt.expression else {
        return None;
    };
    if assign.operator != AssignmentOperator::Assign {
        return None;
    }
    match &assign.left {
        AssignmentTarget::StaticMemberExpression(_)
        | AssignmentTarget::ComputedMemberExpression(_)
        | AssignmentTarget::PrivateFieldExpression(_) => None,
        _ => Some(assign),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROOT MUTATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Finds update and assignment targets owned by the root scope.
struct MutationCollector<'t> {
    cursor: ScopeCursor<'t>,
    found: Vec<String>,
}

impl MutationCollector<'_> {
    fn record(&mut self, names: Vec<String>) {
        for name in names {
            if self.cursor.resolve(&name) == Some(ScopeId::ROOT) && !self.found.contains(&name) {
                self.found.push(name);
            }
        }
    }
}

impl<'a> Visit<'a> for MutationCollector<'_> {
    fn visit_update_expression(&mut self, expr: &UpdateExpression<'a>) {
        self.record(update_target_names(&expr.argument));
        walk::walk_update_expression(self, expr);
    }

    fn visit_assignment_expression(&mut self, expr: &AssignmentExpression<'a>) {
        self.record(assignment_target_names(&expr.left));
        walk::walk_assignment_expression(self, expr);
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        let entered = self.cursor.enter(func.span);
        walk::walk_function(self, func, flags);
        self.cursor.leave(entered);
    }

    fn visit_arrow_function_expression(&mut self, arrow: &ArrowFunctionExpression<'a>) {
        let entered = self.cursor.enter(arrow.span);
        walk::walk_arrow_function_expression(self, arrow);
        self.cursor.leave(entered);
    }

    fn visit_block_statement(&mut self, block: &BlockStatement<'a>) {
        let entered = self.cursor.enter(block.span);
        walk::walk_block_statement(self, block);
        self.cursor.leave(entered);
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        let entered = self.cursor.enter(stmt.span);
        walk::walk_for_statement(self, stmt);
        self.cursor.leave(entered);
    }

    fn visit_for_in_statement(&mut self, stmt: &ForInStatement<'a>) {
        let entered = self.cursor.enter(stmt.span);
        walk::walk_for_in_statement(self, stmt);
        self.cursor.leave(entered);
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        let entered = self.cursor.enter(stmt.span);
        walk::walk_for_of_statement(self, stmt);
        self.cursor.leave(entered);
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause<'a>) {
        let entered = self.cursor.enter(clause.span);
        walk::walk_catch_clause(self, clause);
        self.cursor.leave(entered);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENT-STYLE DECLARATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Reads and writes of component globals inside one labeled statement,
/// resolved against a scope tree built for that statement alone.
struct StatementEffects<'t, 'g> {
    cursor: ScopeCursor<'t>,
    globals: &'g BTreeSet<String>,
    writes: Vec<String>,
    reads: Vec<String>,
    /// Identifiers a mutation writes through; they are not reads.
    written: Vec<Span>,
    /// Inside a destructuring target.
    in_target: bool,
}

impl StatementEffects<'_, '_> {
    fn is_global(&self, name: &str) -> bool {
        self.cursor.resolve(name).is_none() && self.globals.contains(name)
    }

    fn skip_target(&mut self, target: &SimpleAssignmentTarget<'_>) {
        if let Some(root) = target_root(target) {
            self.written.push(root.span);
        }
    }

    fn record_writes(&mut self, names: Vec<String>) {
        for name in names {
            if self.is_global(&name) && !self.writes.contains(&name) {
                self.writes.push(name);
            }
        }
    }
}

impl<'a> Visit<'a> for StatementEffects<'_, '_> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if self.in_target || self.written.contains(&ident.span) {
            return;
        }
        let name = ident.name.as_str();
        if self.is_global(name) && !self.reads.iter().any(|r| r == name) {
            self.reads.push(name.to_string());
        }
    }

    fn visit_update_expression(&mut self, expr: &UpdateExpression<'a>) {
        self.record_writes(update_target_names(&expr.argument));
        self.skip_target(&expr.argument);
        walk::walk_update_expression(self, expr);
    }

    fn visit_assignment_expression(&mut self, expr: &AssignmentExpression<'a>) {
        self.record_writes(assignment_target_names(&expr.left));
        match expr.left.as_simple_assignment_target() {
            Some(target) => {
                // Index and computed keys in `x[i] = v` are still reads.
                self.skip_target(target);
                self.visit_assignment_target(&expr.left);
            }
            None => {
                let outer = std::mem::replace(&mut self.in_target, true);
                self.visit_assignment_target(&expr.left);
                self.in_target = outer;
            }
        }
        self.visit_expression(&expr.right);
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        let entered = self.cursor.enter(func.span);
        walk::walk_function(self, func, flags);
        self.cursor.leave(entered);
    }

    fn visit_arrow_function_expression(&mut self, arrow: &ArrowFunctionExpression<'a>) {
        let entered = self.cursor.enter(arrow.span);
        walk::walk_arrow_function_expression(self, arrow);
        self.cursor.leave(entered);
    }

    fn visit_block_statement(&mut self, block: &BlockStatement<'a>) {
        let entered = self.cursor.enter(block.span);
        walk::walk_block_statement(self, block);
        self.cursor.leave(entered);
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        let entered = self.cursor.enter(stmt.span);
        walk::walk_for_statement(self, stmt);
        self.cursor.leave(entered);
    }

    fn visit_for_in_statement(&mut self, stmt: &ForInStatement<'a>) {
        let entered = self.cursor.enter(stmt.span);
        walk::walk_for_in_statement(self, stmt);
        self.cursor.leave(entered);
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        let entered = self.cursor.enter(stmt.span);
        walk::walk_for_of_statement(self, stmt);
        self.cursor.leave(entered);
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause<'a>) {
        let entered = self.cursor.enter(clause.span);
        walk::walk_catch_clause(self, clause);
        self.cursor.leave(entered);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKUP REFERENCES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct ReferredCollector {
    names: BTreeSet<String>,
}

impl TemplateVisitor for ReferredCollector {
    fn visit_attribute(&mut self, attribute: &AttributeIR) {
        match &attribute.value {
            AttributeValue::Static(_) => {}
            AttributeValue::Dynamic(expr) => self.names.extend(free_names(&expr.code)),
            AttributeValue::Event { handler, .. } => self.names.extend(free_names(&handler.code)),
        }
    }

    fn visit_expression(&mut self, expression: &ExpressionNode) {
        self.names.extend(free_names(&expression.expression.code));
    }
}

pub fn referred_names(template: &TemplateIR) -> BTreeSet<String> {
    let mut collector = ReferredCollector::default();
    collector.visit_template(template);
    collector.names
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYZER
// ═══════════════════════════════════════════════════════════════════════════════

struct Analyzer<'s> {
    source: &'s str,
    globals: BTreeSet<String>,
    reactive: BTreeSet<String>,
    hoisted: Vec<String>,
}

impl<'s> Analyzer<'s> {
    fn mark_reactive(&mut self, name: &str, reason: &str) {
        if self.reactive.insert(name.to_string()) {
            tracing::trace!(name, reason, "reactive");
        }
    }

    fn declaration(&self, style: DeclarationStyle, body: &Statement<'_>) -> ReactiveDeclaration {
        let span: Span = body.span();
        ReactiveDeclaration {
            style,
            assignees: Vec::new(),
            dependencies: Vec::new(),
            code: self
                .source
                .get(span.start as usize..span.end as usize)
                .unwrap_or_default()
                .to_string(),
            start: span.start,
            end: span.end,
        }
    }

    fn assignment_declaration(&mut self, body: &Statement<'_>, assign: &AssignmentExpression<'_>) -> ReactiveDeclaration {
        let mut decl = self.declaration(DeclarationStyle::Assignment, body);

        // Dependencies are read before the left-hand names join the set.
        decl.dependencies = expression_free_names(&assign.right)
            .into_iter()
            .filter(|name| self.reactive.contains(name))
            .collect();

        for name in assignment_target_names(&assign.left) {
            self.mark_reactive(&name, "reactive assignment");
            if self.globals.insert(name.clone()) {
                self.hoisted.push(name.clone());
            }
            decl.assignees.push(name);
        }
        decl
    }

    fn statement_declaration(&mut self, body: &Statement<'_>) -> ReactiveDeclaration {
        let mut decl = self.declaration(DeclarationStyle::Statement, body);
        let local = ScopeTree::build(std::slice::from_ref(body));
        let mut effects = StatementEffects {
            cursor: ScopeCursor::new(&local),
            globals: &self.globals,
            writes: Vec::new(),
            reads: Vec::new(),
            written: Vec::new(),
            in_target: false,
        };
        effects.visit_statement(body);
        let StatementEffects { writes, reads, .. } = effects;

        for name in &writes {
            self.mark_reactive(name, "reactive statement");
        }
        decl.dependencies = reads;
        decl.assignees = writes;
        decl
    }
}

/// Runs scope and reactivity analysis over a built component.
pub fn analyze(component: &ComponentIR) -> SemanticFacts {
    let source = component.script_source();
    let allocator = Allocator::default();
    let program = parse_program(&allocator, source);

    let mut ordinary: Vec<Statement> = Vec::new();
    let mut labeled: Vec<oxc_box<LabeledStatement>> = Vec::new();
    for stmt in program.body {
        match stmt {
            Statement::LabeledStatement(l) if l.label.name == REACTIVE_LABEL => labeled.push(l),
            other => ordinary.push(other),
        }
    }

    let scopes = ScopeTree::build(&ordinary);
    let globals: BTreeSet<String> = scopes.root().declarations.keys().cloned().collect();

    let mut mutations = MutationCollector {
        cursor: ScopeCursor::new(&scopes),
        found: Vec::new(),
    };
    for stmt in &ordinary {
        mutations.visit_statement(stmt);
    }
    let found = mutations.found;

    let mut analyzer = Analyzer {
        source,
        globals,
        reactive: BTreeSet::new(),
        hoisted: Vec::new(),
    };
    for name in &found {
        analyzer.mark_reactive(name, "root mutation");
    }

    let mut responsive = Vec::with_capacity(labeled.len());
    for l in &labeled {
        if let Some(assign) = as_plain_assignment(&l.body) {
            let decl = analyzer.assignment_declaration(&l.body, assign);
            responsive.push(decl);
        }
    }
    for l in &labeled {
        if as_plain_assignment(&l.body).is_none() {
            let decl = analyzer.statement_declaration(&l.body);
            responsive.push(decl);
        }
    }
    for decl in &mut responsive {
        decl.dependencies.retain(|d| analyzer.reactive.contains(d));
    }

    let assignees = responsive
        .iter()
        .flat_map(|d| d.assignees.iter().cloned())
        .collect();
    let referred = referred_names(&component.template);

    tracing::debug!(
        file = %component.file_path,
        globals = analyzer.globals.len(),
        reactive = analyzer.reactive.len(),
        referred = referred.len(),
        declarations = responsive.len(),
        "semantic analysis complete"
    );

    SemanticFacts {
        globals: analyzer.globals,
        reactive: analyzer.reactive,
        referred,
        assignees,
        hoisted: analyzer.hoisted,
        responsive,
        scopes,
    }
}
