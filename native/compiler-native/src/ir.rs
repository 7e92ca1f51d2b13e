//! Structured component AST produced by the template builder.
//!
//! Expressions are kept as source text plus a stable id. Passes that need a
//! tree re-parse the text into their own arena, so the IR carries no
//! lifetimes and can be dumped as JSON as-is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionIR {
    pub id: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TemplateNode {
    Element(ElementNode),
    Text(TextNode),
    Expression(ExpressionNode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<AttributeIR>,
    pub children: Vec<TemplateNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionNode {
    pub expression: ExpressionIR,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum AttributeValue {
    Static(String),
    Dynamic(ExpressionIR),
    /// `on:<event>` binding; `event` has the prefix stripped.
    Event { event: String, handler: ExpressionIR },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeIR {
    pub name: String,
    pub value: AttributeValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateIR {
    pub nodes: Vec<TemplateNode>,
    /// Every expression in the markup, in the order the builder met them.
    pub expressions: Vec<ExpressionIR>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptIR {
    pub raw: String,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentIR {
    pub file_path: String,
    pub template: TemplateIR,
    pub script: Option<ScriptIR>,
}

impl ComponentIR {
    /// Script body, or an empty string when the component has no script block.
    pub fn script_source(&self) -> &str {
        self.script.as_ref().map(|s| s.raw.as_str()).unwrap_or("")
    }
}

impl TemplateNode {
    pub fn element(tag: impl Into<String>, attributes: Vec<AttributeIR>, children: Vec<TemplateNode>) -> Self {
        TemplateNode::Element(ElementNode {
            tag: tag.into(),
            attributes,
            children,
        })
    }

    pub fn text(value: impl Into<String>) -> Self {
        TemplateNode::Text(TextNode { value: value.into() })
    }

    pub fn expression(expression: ExpressionIR) -> Self {
        TemplateNode::Expression(ExpressionNode { expression })
    }
}
