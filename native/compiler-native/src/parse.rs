//! Template builder.
//!
//! Splits a component source into its script block and markup body, parses
//! the markup with html5ever and turns the resulting DOM into the structured
//! IR: elements, literal text, and `{expression}` fragments.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};

use crate::error::{BraceSite, CompileError, Result};
use crate::ir::{
    AttributeIR, AttributeValue, ComponentIR, ExpressionIR, ScriptIR, TemplateIR, TemplateNode,
};

lazy_static! {
    static ref SCRIPT_REGEX: Regex =
        Regex::new(r"(?is)<script\b([^>]*)>([\s\S]*?)</script>").unwrap();
    static ref STYLE_REGEX: Regex = Regex::new(r"(?is)<style\b[^>]*>[\s\S]*?</style>").unwrap();
    static ref ATTR_REGEX: Regex =
        Regex::new(r#"(?i)([a-z0-9:_-]+)(?:=(?:"([^"]*)"|'([^']*)'|([^>\s]+)))?"#).unwrap();
    static ref EXPR_PLACEHOLDER_RE: Regex = Regex::new(r"__MS_EXPR_(\d+)__").unwrap();
}

/// Prefix that turns an attribute into an event binding.
pub const EVENT_PREFIX: &str = "on:";

/// Tag of the element synthesized around text that mixes literals and expressions.
pub const MIXED_TEXT_TAG: &str = "div";

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPT HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn script_source_type() -> SourceType {
    SourceType::default().with_module(true)
}

/// Parses script text into `allocator`. Syntax errors are ignored here; the
/// builder has already rejected scripts that do not parse.
pub fn parse_program<'a>(allocator: &'a Allocator, source: &'a str) -> Program<'a> {
    Parser::new(allocator, source, script_source_type()).parse().program
}

fn check_script(source: &str) -> Result<()> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, script_source_type()).parse();
    if ret.errors.is_empty() {
        return Ok(());
    }
    let message = ret
        .errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    Err(CompileError::ScriptSyntax { message })
}

/// Rejects expression text the expression parser cannot accept.
pub fn check_expression(code: &str) -> Result<()> {
    let allocator = Allocator::default();
    match Parser::new(&allocator, code, script_source_type()).parse_expression() {
        Ok(_) => Ok(()),
        Err(errors) => Err(CompileError::InvalidExpression {
            code: code.to_string(),
            message: errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        }),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE SPLITTING
// ═══════════════════════════════════════════════════════════════════════════════

fn extract_script(source: &str) -> Result<Option<ScriptIR>> {
    let blocks: Vec<Captures> = SCRIPT_REGEX.captures_iter(source).collect();
    if blocks.len() > 1 {
        return Err(CompileError::MultipleScriptBlocks {
            count: blocks.len(),
        });
    }
    let Some(caps) = blocks.into_iter().next() else {
        return Ok(None);
    };

    let mut attributes = BTreeMap::new();
    let attr_text = caps.get(1).map_or("", |m| m.as_str());
    for attr in ATTR_REGEX.captures_iter(attr_text) {
        let name = attr[1].to_string();
        let value = attr
            .get(2)
            .or_else(|| attr.get(3))
            .or_else(|| attr.get(4))
            .map_or_else(String::new, |m| m.as_str().to_string());
        attributes.insert(name, value);
    }

    let raw = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
    check_script(&raw)?;
    Ok(Some(ScriptIR { raw, attributes }))
}

fn strip_blocks(source: &str) -> String {
    let without_scripts = SCRIPT_REGEX.replace_all(source, "");
    STYLE_REGEX.replace_all(&without_scripts, "").to_string()
}

/// Given `chars[start] == '{'`, returns the index one past the brace that
/// balances it. Quoted strings and template literals inside the expression
/// are skipped so their braces do not count.
fn find_balanced_brace_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    let mut in_string: Option<char> = None;
    let mut template_depth: Vec<usize> = Vec::new();

    while i < chars.len() {
        let c = chars[i];

        if c == '\\' && (in_string.is_some() || !template_depth.is_empty()) {
            i += 2;
            continue;
        }

        if let Some(quote) = in_string {
            if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }

        // Inside a template literal but outside any `${`.
        if template_depth.last() == Some(&depth) {
            if c == '`' {
                template_depth.pop();
            } else if c == '$' && chars.get(i + 1) == Some(&'{') {
                depth += 1;
                i += 2;
                continue;
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => in_string = Some(c),
            '`' => template_depth.push(depth),
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Replaces every balanced `{...}` region with a placeholder so html5ever
/// never tokenizes expression text. The map holds the original text,
/// braces included.
fn normalize_all_expressions(markup: &str) -> (String, HashMap<String, String>) {
    let chars: Vec<char> = markup.chars().collect();
    let mut normalized = String::with_capacity(markup.len());
    let mut expressions = HashMap::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '{' {
            if let Some(end) = find_balanced_brace_end(&chars, i) {
                let placeholder = format!("__MS_EXPR_{}__", expressions.len());
                expressions.insert(placeholder.clone(), chars[i..end].iter().collect());
                normalized.push_str(&placeholder);
                i = end;
                continue;
            }
        }
        normalized.push(chars[i]);
        i += 1;
    }

    (normalized, expressions)
}

fn restore_expressions(text: &str, expressions: &HashMap<String, String>) -> String {
    EXPR_PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures| {
            expressions
                .get(&caps[0])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT FRAGMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Literal(String),
    /// Expression code with the braces removed.
    Expression(String),
}

/// Splits text into alternating literal and `{expression}` fragments.
pub fn split_fragments(text: &str, site: BraceSite) -> Result<Vec<Fragment>> {
    let chars: Vec<char> = text.chars().collect();
    let mut fragments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' => {
                let end = find_balanced_brace_end(&chars, i).ok_or_else(|| {
                    CompileError::UnmatchedOpenBrace {
                        site,
                        text: text.to_string(),
                    }
                })?;
                let inner: String = chars[i + 1..end - 1].iter().collect();
                if inner.trim().is_empty() {
                    return Err(CompileError::EmptyExpression {
                        site,
                        text: text.to_string(),
                    });
                }
                if !literal.is_empty() {
                    fragments.push(Fragment::Literal(std::mem::take(&mut literal)));
                }
                fragments.push(Fragment::Expression(inner.trim().to_string()));
                i = end;
            }
            '}' => {
                return Err(CompileError::UnmatchedCloseBrace {
                    site,
                    text: text.to_string(),
                })
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    if !literal.is_empty() {
        fragments.push(Fragment::Literal(literal));
    }
    Ok(fragments)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

struct TemplateBuilder<'m> {
    placeholders: &'m HashMap<String, String>,
    expressions: Vec<ExpressionIR>,
}

impl<'m> TemplateBuilder<'m> {
    fn new(placeholders: &'m HashMap<String, String>) -> Self {
        Self {
            placeholders,
            expressions: Vec::new(),
        }
    }

    fn register(&mut self, code: &str) -> Result<ExpressionIR> {
        check_expression(code)?;
        let expr = ExpressionIR {
            id: format!("expr_{}", self.expressions.len()),
            code: code.to_string(),
        };
        self.expressions.push(expr.clone());
        Ok(expr)
    }

    /// Flattens the html/head/body wrappers html5ever inserts.
    fn collect_body_content(&mut self, handle: &Handle, nodes: &mut Vec<TemplateNode>) -> Result<()> {
        match &handle.data {
            NodeData::Document => {
                for child in handle.children.borrow().iter() {
                    self.collect_body_content(child, nodes)?;
                }
            }
            NodeData::Element { name, .. }
                if matches!(&*name.local, "html" | "head" | "body") =>
            {
                for child in handle.children.borrow().iter() {
                    self.collect_body_content(child, nodes)?;
                }
            }
            _ => {
                if let Some(node) = self.build_node(handle)? {
                    nodes.push(node);
                }
            }
        }
        Ok(())
    }

    fn build_node(&mut self, handle: &Handle) -> Result<Option<TemplateNode>> {
        match &handle.data {
            NodeData::Element { name, attrs, .. } => {
                let tag = name.local.to_string();
                let mut attributes = Vec::new();
                for attr in attrs.borrow().iter() {
                    let name = attr.name.local.to_string();
                    let value = restore_expressions(&attr.value, self.placeholders);
                    attributes.push(self.build_attribute(name, &value)?);
                }

                let mut children = Vec::new();
                for child in handle.children.borrow().iter() {
                    if let Some(node) = self.build_node(child)? {
                        children.push(node);
                    }
                }
                Ok(Some(TemplateNode::element(tag, attributes, children)))
            }
            NodeData::Text { contents } => {
                let text = restore_expressions(&contents.borrow(), self.placeholders);
                self.build_text(text.trim())
            }
            NodeData::Document
            | NodeData::Doctype { .. }
            | NodeData::Comment { .. }
            | NodeData::ProcessingInstruction { .. } => Ok(None),
        }
    }

    fn build_text(&mut self, text: &str) -> Result<Option<TemplateNode>> {
        if text.is_empty() {
            return Ok(None);
        }

        let fragments = split_fragments(text, BraceSite::Text)?;
        match fragments.as_slice() {
            [Fragment::Literal(value)] => Ok(Some(TemplateNode::text(value.clone()))),
            [Fragment::Expression(code)] => {
                let expr = self.register(code)?;
                Ok(Some(TemplateNode::expression(expr)))
            }
            _ => {
                let mut children = Vec::with_capacity(fragments.len());
                for fragment in &fragments {
                    children.push(match fragment {
                        Fragment::Literal(value) => TemplateNode::text(value.clone()),
                        Fragment::Expression(code) => TemplateNode::expression(self.register(code)?),
                    });
                }
                Ok(Some(TemplateNode::element(MIXED_TEXT_TAG, Vec::new(), children)))
            }
        }
    }

    fn build_attribute(&mut self, name: String, value: &str) -> Result<AttributeIR> {
        if let Some(event) = name.strip_prefix(EVENT_PREFIX) {
            let code = match classify_attribute_value(value)? {
                AttributeText::Expression(code) => code,
                AttributeText::Literal(code) if !code.trim().is_empty() => code.trim(),
                AttributeText::Literal(_) => {
                    return Err(CompileError::EmptyExpression {
                        site: BraceSite::AttributeValue,
                        text: value.to_string(),
                    })
                }
            };
            let handler = self.register(code)?;
            return Ok(AttributeIR {
                value: AttributeValue::Event {
                    event: event.to_string(),
                    handler,
                },
                name,
            });
        }

        let value = match classify_attribute_value(value)? {
            AttributeText::Expression(code) => AttributeValue::Dynamic(self.register(code)?),
            AttributeText::Literal(text) => AttributeValue::Static(text.to_string()),
        };
        Ok(AttributeIR { name, value })
    }
}

enum AttributeText<'v> {
    Literal(&'v str),
    Expression(&'v str),
}

fn classify_attribute_value(value: &str) -> Result<AttributeText<'_>> {
    let value = value.trim();
    let opens = value.starts_with('{');
    let closes = value.ends_with('}');
    match (opens, closes) {
        (true, true) if value.len() >= 2 => {
            let inner = value[1..value.len() - 1].trim();
            if inner.is_empty() {
                Err(CompileError::EmptyExpression {
                    site: BraceSite::AttributeValue,
                    text: value.to_string(),
                })
            } else {
                Ok(AttributeText::Expression(inner))
            }
        }
        (true, _) => Err(CompileError::UnmatchedOpenBrace {
            site: BraceSite::AttributeValue,
            text: value.to_string(),
        }),
        (false, true) => Err(CompileError::UnmatchedCloseBrace {
            site: BraceSite::AttributeValue,
            text: value.to_string(),
        }),
        (false, false) => Ok(AttributeText::Literal(value)),
    }
}

/// Builds the structured component IR from one source file.
pub fn build(source: &str, file_path: &str) -> Result<ComponentIR> {
    let script = extract_script(source)?;
    let markup = strip_blocks(source);
    let (normalized, placeholders) = normalize_all_expressions(&markup);

    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut normalized.as_bytes())
        .map_err(|e| CompileError::MarkupParse {
            message: e.to_string(),
        })?;

    let mut builder = TemplateBuilder::new(&placeholders);
    let mut nodes = Vec::new();
    builder.collect_body_content(&dom.document, &mut nodes)?;

    tracing::debug!(
        file = file_path,
        nodes = nodes.len(),
        expressions = builder.expressions.len(),
        has_script = script.is_some(),
        "template built"
    );

    Ok(ComponentIR {
        file_path: file_path.to_string(),
        template: TemplateIR {
            nodes,
            expressions: builder.expressions,
        },
        script,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_end_skips_strings_and_templates() {
        let chars: Vec<char> = "{ '}' + `${a}}` } tail".chars().collect();
        assert_eq!(find_balanced_brace_end(&chars, 0), Some(17));

        let chars: Vec<char> = "{ {a: 1}.a }".chars().collect();
        assert_eq!(find_balanced_brace_end(&chars, 0), Some(chars.len()));

        let chars: Vec<char> = "{ open".chars().collect();
        assert_eq!(find_balanced_brace_end(&chars, 0), None);
    }

    #[test]
    fn normalize_replaces_balanced_regions_only() {
        let (normalized, map) = normalize_all_expressions("<p>{a < b} and {c</p>");
        assert_eq!(normalized, "<p>__MS_EXPR_0__ and {c</p>");
        assert_eq!(map["__MS_EXPR_0__"], "{a < b}");
        assert_eq!(restore_expressions(&normalized, &map), "<p>{a < b} and {c</p>");
    }

    #[test]
    fn split_alternates_literals_and_expressions() {
        let fragments = split_fragments("Hi {name}, you are {age}", BraceSite::Text).unwrap();
        assert_eq!(
            fragments,
            vec![
                Fragment::Literal("Hi ".into()),
                Fragment::Expression("name".into()),
                Fragment::Literal(", you are ".into()),
                Fragment::Expression("age".into()),
            ]
        );
    }

    #[test]
    fn split_rejects_bad_braces() {
        assert!(matches!(
            split_fragments("a {b", BraceSite::Text),
            Err(CompileError::UnmatchedOpenBrace { .. })
        ));
        assert!(matches!(
            split_fragments("a } b", BraceSite::Text),
            Err(CompileError::UnmatchedCloseBrace { .. })
        ));
        assert!(matches!(
            split_fragments("a { } b", BraceSite::Text),
            Err(CompileError::EmptyExpression { .. })
        ));
    }

    #[test]
    fn attribute_values_are_classified() {
        assert!(matches!(
            classify_attribute_value("foo").unwrap(),
            AttributeText::Literal("foo")
        ));
        assert!(matches!(
            classify_attribute_value("{ a + 1 }").unwrap(),
            AttributeText::Expression("a + 1")
        ));
        assert!(matches!(
            classify_attribute_value(" { x } ").unwrap(),
            AttributeText::Expression("x")
        ));
        assert!(matches!(
            classify_attribute_value("{}"),
            Err(CompileError::EmptyExpression { .. })
        ));
        assert!(matches!(
            classify_attribute_value("{a"),
            Err(CompileError::UnmatchedOpenBrace { .. })
        ));
        assert!(matches!(
            classify_attribute_value("a}"),
            Err(CompileError::UnmatchedCloseBrace { .. })
        ));
    }

    #[test]
    fn padded_attribute_values_are_trimmed() {
        let component = build(r#"<p title=" {x} " class=" big ">hi</p>"#, "test.svelte").unwrap();
        let TemplateNode::Element(p) = &component.template.nodes[0] else {
            panic!("expected an element, got {:?}", component.template.nodes);
        };
        assert!(matches!(
            &p.attributes[0].value,
            AttributeValue::Dynamic(expr) if expr.code == "x"
        ));
        assert!(matches!(
            &p.attributes[1].value,
            AttributeValue::Static(value) if value == "big"
        ));
    }

    #[test]
    fn script_attributes_are_recorded() {
        let script = extract_script(r#"<script lang="js">let a = 1;</script><p>x</p>"#)
            .unwrap()
            .unwrap();
        assert_eq!(script.raw, "let a = 1;");
        assert_eq!(script.attributes["lang"], "js");
    }

    #[test]
    fn check_expression_reports_syntax_errors() {
        assert!(check_expression("a + b").is_ok());
        assert!(matches!(
            check_expression("a +"),
            Err(CompileError::InvalidExpression { .. })
        ));
    }
}
