//! Lexical scopes of a component script.
//!
//! Scopes live in an arena and point at their parent by index. The node that
//! owns a scope is remembered by its source span so any later walk over a
//! tree parsed from the same text can find its way back into the arena.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::Span;
use oxc_syntax::scope::ScopeFlags;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::parse::script_source_type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ScopeId(pub usize);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeKind {
    Root,
    Function,
    Block,
    For,
    Catch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeclarationKind {
    Var,
    Let,
    Const,
    Function,
    Class,
    Param,
    CatchParam,
    Import,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeclarationSite {
    pub kind: DeclarationKind,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub declarations: BTreeMap<String, DeclarationSite>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    #[serde(skip)]
    node_scopes: HashMap<Span, ScopeId>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                id: ScopeId::ROOT,
                kind: ScopeKind::Root,
                parent: None,
                declarations: BTreeMap::new(),
            }],
            node_scopes: HashMap::new(),
        }
    }

    /// Builds the scope tree for a statement list.
    pub fn build<'a>(statements: &[Statement<'a>]) -> Self {
        let mut builder = ScopeBuilder::new();
        for stmt in statements {
            builder.visit_statement(stmt);
        }
        builder.tree
    }

    pub fn root(&self) -> &Scope {
        &self.scopes[ScopeId::ROOT.0]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Scope owned by the node spanning `span`, if that node opens one.
    pub fn scope_of(&self, span: Span) -> Option<ScopeId> {
        self.node_scopes.get(&span).copied()
    }

    /// Walks parent links from `from` and returns the first scope declaring `name`.
    pub fn find_owner(&self, from: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = &self.scopes[id.0];
            if scope.declarations.contains_key(name) {
                return Some(id);
            }
            current = scope.parent;
        }
        None
    }

    fn push(&mut self, kind: ScopeKind, parent: ScopeId, owner: Span) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            id,
            kind,
            parent: Some(parent),
            declarations: BTreeMap::new(),
        });
        self.node_scopes.insert(owner, id);
        id
    }

    fn declare(&mut self, scope: ScopeId, name: String, decl: DeclarationSite) {
        self.scopes[scope.0].declarations.entry(name).or_insert(decl);
    }

    /// Nearest enclosing scope that `var` declarations hoist into.
    fn hoist_target(&self, from: ScopeId) -> ScopeId {
        let mut current = from;
        loop {
            let scope = &self.scopes[current.0];
            match (scope.kind, scope.parent) {
                (ScopeKind::Root | ScopeKind::Function, _) | (_, None) => return current,
                (_, Some(parent)) => current = parent,
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

struct ScopeBuilder {
    tree: ScopeTree,
    stack: Vec<ScopeId>,
    /// Name of a function expression about to be visited; it binds inside its own scope.
    pending_function_name: Option<(String, Span)>,
}

impl ScopeBuilder {
    fn new() -> Self {
        Self {
            tree: ScopeTree::new(),
            stack: vec![ScopeId::ROOT],
            pending_function_name: None,
        }
    }

    fn current(&self) -> ScopeId {
        self.stack.last().copied().unwrap_or(ScopeId::ROOT)
    }

    fn enter(&mut self, kind: ScopeKind, owner: Span) {
        let id = self.tree.push(kind, self.current(), owner);
        self.stack.push(id);
    }

    fn leave(&mut self) {
        self.stack.pop();
    }

    fn declare_in(&mut self, scope: ScopeId, names: Vec<(String, Span)>, kind: DeclarationKind) {
        for (name, span) in names {
            self.tree.declare(
                scope,
                name,
                DeclarationSite {
                    kind,
                    start: span.start,
                    end: span.end,
                },
            );
        }
    }

    fn declare(&mut self, names: Vec<(String, Span)>, kind: DeclarationKind) {
        let scope = self.current();
        self.declare_in(scope, names, kind);
    }
}

impl<'a> Visit<'a> for ScopeBuilder {
    fn visit_statement(&mut self, stmt: &Statement<'a>) {
        match stmt {
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    self.declare(vec![(id.name.to_string(), id.span)], DeclarationKind::Function);
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    self.declare(vec![(id.name.to_string(), id.span)], DeclarationKind::Class);
                }
            }
            Statement::ExportNamedDeclaration(export) => match &export.declaration {
                Some(Declaration::FunctionDeclaration(func)) => {
                    if let Some(id) = &func.id {
                        self.declare(vec![(id.name.to_string(), id.span)], DeclarationKind::Function);
                    }
                }
                Some(Declaration::ClassDeclaration(class)) => {
                    if let Some(id) = &class.id {
                        self.declare(vec![(id.name.to_string(), id.span)], DeclarationKind::Class);
                    }
                }
                _ => {}
            },
            _ => {}
        }
        walk::walk_statement(self, stmt);
    }

    fn visit_expression(&mut self, expr: &Expression<'a>) {
        if let Expression::FunctionExpression(func) = expr {
            self.pending_function_name = func.id.as_ref().map(|id| (id.name.to_string(), id.span));
        }
        walk::walk_expression(self, expr);
    }

    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration<'a>) {
        let (kind, target) = match decl.kind {
            VariableDeclarationKind::Var => {
                (DeclarationKind::Var, self.tree.hoist_target(self.current()))
            }
            VariableDeclarationKind::Const => (DeclarationKind::Const, self.current()),
            _ => (DeclarationKind::Let, self.current()),
        };
        for declarator in &decl.declarations {
            let names = pattern_names(&declarator.id);
            self.declare_in(target, names, kind);
        }
        walk::walk_variable_declaration(self, decl);
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        let own_name = self.pending_function_name.take();
        self.enter(ScopeKind::Function, func.span);
        if let Some(name) = own_name {
            self.declare(vec![name], DeclarationKind::Function);
        }
        let params = parameter_names(&func.params);
        self.declare(params, DeclarationKind::Param);
        walk::walk_function(self, func, flags);
        self.leave();
    }

    fn visit_arrow_function_expression(&mut self, arrow: &ArrowFunctionExpression<'a>) {
        self.pending_function_name = None;
        self.enter(ScopeKind::Function, arrow.span);
        let params = parameter_names(&arrow.params);
        self.declare(params, DeclarationKind::Param);
        walk::walk_arrow_function_expression(self, arrow);
        self.leave();
    }

    fn visit_block_statement(&mut self, block: &BlockStatement<'a>) {
        self.enter(ScopeKind::Block, block.span);
        walk::walk_block_statement(self, block);
        self.leave();
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        self.enter(ScopeKind::For, stmt.span);
        walk::walk_for_statement(self, stmt);
        self.leave();
    }

    fn visit_for_in_statement(&mut self, stmt: &ForInStatement<'a>) {
        self.enter(ScopeKind::For, stmt.span);
        walk::walk_for_in_statement(self, stmt);
        self.leave();
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        self.enter(ScopeKind::For, stmt.span);
        walk::walk_for_of_statement(self, stmt);
        self.leave();
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause<'a>) {
        self.enter(ScopeKind::Catch, clause.span);
        if let Some(param) = &clause.param {
            let names = pattern_names(&param.pattern);
            self.declare(names, DeclarationKind::CatchParam);
        }
        walk::walk_catch_clause(self, clause);
        self.leave();
    }

    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        let mut collector = BindingNameCollector::default();
        collector.visit_import_declaration(decl);
        self.declare_in(ScopeId::ROOT, collector.names, DeclarationKind::Import);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE CURSOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Tracks the current scope while a later pass walks a tree the scope tree
/// was built from.
pub struct ScopeCursor<'t> {
    tree: &'t ScopeTree,
    stack: Vec<ScopeId>,
}

impl<'t> ScopeCursor<'t> {
    pub fn new(tree: &'t ScopeTree) -> Self {
        Self {
            tree,
            stack: vec![ScopeId::ROOT],
        }
    }

    pub fn current(&self) -> ScopeId {
        self.stack.last().copied().unwrap_or(ScopeId::ROOT)
    }

    /// Enters the scope owned by the node at `span`. Returns whether a scope
    /// was entered; pass that back to [`ScopeCursor::leave`].
    pub fn enter(&mut self, span: Span) -> bool {
        match self.tree.scope_of(span) {
            Some(id) => {
                self.stack.push(id);
                true
            }
            None => false,
        }
    }

    pub fn leave(&mut self, entered: bool) {
        if entered {
            self.stack.pop();
        }
    }

    pub fn resolve(&self, name: &str) -> Option<ScopeId> {
        self.tree.find_owner(self.current(), name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAME COLLECTORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collects the names a binding pattern introduces. Default-value
/// expressions are not entered.
#[derive(Default)]
struct BindingNameCollector {
    names: Vec<(String, Span)>,
}

impl<'a> Visit<'a> for BindingNameCollector {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.names.push((ident.name.to_string(), ident.span));
    }

    fn visit_expression(&mut self, _expr: &Expression<'a>) {}
}

pub fn pattern_names(pattern: &BindingPattern<'_>) -> Vec<(String, Span)> {
    let mut collector = BindingNameCollector::default();
    collector.visit_binding_pattern(pattern);
    collector.names
}

fn parameter_names(params: &FormalParameters<'_>) -> Vec<(String, Span)> {
    let mut collector = BindingNameCollector::default();
    collector.visit_formal_parameters(params);
    collector.names
}

/// Collects the variables a mutation writes. A member target such as
/// `counter.a.b` counts as a write to its root object `counter`.
#[derive(Default)]
pub struct TargetCollector {
    pub names: Vec<String>,
}

impl TargetCollector {
    fn push(&mut self, name: &str) {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
    }
}

impl<'a> Visit<'a> for TargetCollector {
    fn visit_simple_assignment_target(&mut self, target: &SimpleAssignmentTarget<'a>) {
        match target {
            SimpleAssignmentTarget::AssignmentTargetIdentifier(_)
            | SimpleAssignmentTarget::StaticMemberExpression(_)
            | SimpleAssignmentTarget::ComputedMemberExpression(_)
            | SimpleAssignmentTarget::PrivateFieldExpression(_) => {
                if let Some(root) = target_root(target) {
                    self.push(&root.name);
                }
            }
            _ => walk::walk_simple_assignment_target(self, target),
        }
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.push(&ident.name);
    }

    fn visit_expression(&mut self, _expr: &Expression<'a>) {}
}

fn root_identifier<'e, 'a>(expr: &'e Expression<'a>) -> Option<&'e IdentifierReference<'a>> {
    let mut current = expr;
    loop {
        current = match current {
            Expression::Identifier(id) => return Some(&**id),
            Expression::StaticMemberExpression(member) => &member.object,
            Expression::ComputedMemberExpression(member) => &member.object,
            Expression::PrivateFieldExpression(member) => &member.object,
            Expression::ParenthesizedExpression(paren) => &paren.expression,
            _ => return None,
        };
    }
}

/// The identifier a simple mutation target writes through: `x` for `x`,
/// `x.a[i]` and `x.#p`.
pub fn target_root<'e, 'a>(target: &'e SimpleAssignmentTarget<'a>) -> Option<&'e IdentifierReference<'a>> {
    match target {
        SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => Some(&**id),
        SimpleAssignmentTarget::StaticMemberExpression(member) => root_identifier(&member.object),
        SimpleAssignmentTarget::ComputedMemberExpression(member) => root_identifier(&member.object),
        SimpleAssignmentTarget::PrivateFieldExpression(member) => root_identifier(&member.object),
        _ => None,
    }
}

pub fn assignment_target_names(target: &AssignmentTarget<'_>) -> Vec<String> {
    let mut collector = TargetCollector::default();
    collector.visit_assignment_target(target);
    collector.names
}

pub fn update_target_names(target: &SimpleAssignmentTarget<'_>) -> Vec<String> {
    let mut collector = TargetCollector::default();
    collector.visit_simple_assignment_target(target);
    collector.names
}

/// Identifier references minus the names bound inside the same expression,
/// in first-occurrence order.
#[derive(Default)]
pub struct FreeNameCollector {
    references: Vec<String>,
    bindings: HashSet<String>,
}

impl FreeNameCollector {
    pub fn finish(self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.references
            .into_iter()
            .filter(|name| !self.bindings.contains(name))
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }
}

impl<'a> Visit<'a> for FreeNameCollector {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.references.push(ident.name.to_string());
    }

    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.bindings.insert(ident.name.to_string());
    }
}

pub fn expression_free_names(expr: &Expression<'_>) -> Vec<String> {
    let mut collector = FreeNameCollector::default();
    collector.visit_expression(expr);
    collector.finish()
}

/// Free names of an expression given as source text. Text that does not
/// parse yields no names; the builder rejects such text before analysis.
pub fn free_names(code: &str) -> Vec<String> {
    let allocator = Allocator::default();
    match Parser::new(&allocator, code, script_source_type()).parse_expression() {
        Ok(expr) => expression_free_names(&expr),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_program;

    fn tree_for(source: &str) -> ScopeTree {
        let allocator = Allocator::default();
        let program = parse_program(&allocator, source);
        ScopeTree::build(&program.body)
    }

    #[test]
    fn root_declarations_cover_every_form() {
        let tree = tree_for(
            "import { a } from 'x'; let b = 1; const { c, d: [e] } = o; var f; function g() {} class H {}",
        );
        let names: Vec<&str> = tree.root().declarations.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["H", "a", "b", "c", "e", "f", "g"]);
        assert_eq!(tree.root().declarations["a"].kind, DeclarationKind::Import);
        assert_eq!(tree.root().declarations["g"].kind, DeclarationKind::Function);
    }

    #[test]
    fn var_hoists_past_blocks_but_not_functions() {
        let tree = tree_for("{ var a = 1; let b = 2; } function f() { if (x) { var c; } }");
        assert!(tree.root().declarations.contains_key("a"));
        assert!(!tree.root().declarations.contains_key("b"));
        assert!(!tree.root().declarations.contains_key("c"));

        let function_scope = tree
            .scopes()
            .iter()
            .find(|s| s.kind == ScopeKind::Function)
            .unwrap();
        assert!(function_scope.declarations.contains_key("c"));
    }

    #[test]
    fn find_owner_walks_up_to_the_declaring_scope() {
        let allocator = Allocator::default();
        let program = parse_program(&allocator, "let n = 0; function f(n) { m = n; }");
        let tree = ScopeTree::build(&program.body);

        let Statement::FunctionDeclaration(func) = &program.body[1] else {
            panic!("expected function");
        };
        let inner = tree.scope_of(func.span).unwrap();
        assert_eq!(tree.find_owner(inner, "n"), Some(inner));
        assert_eq!(tree.find_owner(ScopeId::ROOT, "n"), Some(ScopeId::ROOT));
        assert_eq!(tree.find_owner(inner, "m"), None);
    }

    #[test]
    fn params_and_catch_bindings_are_local() {
        let tree = tree_for("const f = (a, { b }) => a; try {} catch (err) {}");
        let root = tree.root();
        assert!(root.declarations.contains_key("f"));
        assert!(!root.declarations.contains_key("a"));
        assert!(!root.declarations.contains_key("err"));
        assert!(tree
            .scopes()
            .iter()
            .any(|s| s.kind == ScopeKind::Catch && s.declarations.contains_key("err")));
        assert!(tree
            .scopes()
            .iter()
            .any(|s| s.kind == ScopeKind::Function && s.declarations.contains_key("b")));
    }

    #[test]
    fn member_targets_resolve_to_their_root() {
        let allocator = Allocator::default();
        let program = parse_program(&allocator, "counter.a.b.c++; [x, y] = [y, x];");
        let Statement::ExpressionStatement(first) = &program.body[0] else {
            panic!("expected expression statement");
        };
        let Expression::UpdateExpression(update) = &first.expression else {
            panic!("expected update");
        };
        assert_eq!(update_target_names(&update.argument), vec!["counter"]);

        let Statement::ExpressionStatement(second) = &program.body[1] else {
            panic!("expected expression statement");
        };
        let Expression::AssignmentExpression(assign) = &second.expression else {
            panic!("expected assignment");
        };
        assert_eq!(assignment_target_names(&assign.left), vec!["x", "y"]);
    }

    #[test]
    fn free_names_skip_locally_bound_params() {
        assert_eq!(free_names("items.map((item) => item * factor)"), vec!["items", "factor"]);
        assert_eq!(free_names("counter * double"), vec!["counter", "double"]);
        assert!(free_names("a +").is_empty());
    }
}
