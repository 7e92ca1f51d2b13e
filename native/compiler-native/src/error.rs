use serde::Serialize;
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_MULTIPLE_SCRIPTS: &str = "MS-ERR-SCRIPT-001";
pub const ERR_SCRIPT_SYNTAX: &str = "MS-ERR-SCRIPT-002";
pub const ERR_UNMATCHED_OPEN: &str = "MS-ERR-BRACE-001";
pub const ERR_UNMATCHED_CLOSE: &str = "MS-ERR-BRACE-002";
pub const ERR_EMPTY_EXPRESSION: &str = "MS-ERR-EXPR-001";
pub const ERR_INVALID_EXPRESSION: &str = "MS-ERR-EXPR-002";
pub const ERR_MARKUP: &str = "MS-ERR-MARKUP-001";

/// Where a brace problem was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BraceSite {
    Text,
    AttributeValue,
}

impl fmt::Display for BraceSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BraceSite::Text => f.write_str("text"),
            BraceSite::AttributeValue => f.write_str("attribute value"),
        }
    }
}

/// Every failure the compiler can report. All of them originate while the
/// source is being split and built; analysis and code generation are total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CompileError {
    #[error("expected at most one <script> block, found {count}")]
    MultipleScriptBlocks { count: usize },

    #[error("unmatched '{{' in {site}: `{text}`")]
    UnmatchedOpenBrace { site: BraceSite, text: String },

    #[error("unmatched '}}' in {site}: `{text}`")]
    UnmatchedCloseBrace { site: BraceSite, text: String },

    #[error("empty expression in {site}: `{text}`")]
    EmptyExpression { site: BraceSite, text: String },

    #[error("invalid expression `{code}`: {message}")]
    InvalidExpression { code: String, message: String },

    #[error("script failed to parse: {message}")]
    ScriptSyntax { message: String },

    #[error("markup failed to parse: {message}")]
    MarkupParse { message: String },
}

impl CompileError {
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::MultipleScriptBlocks { .. } => ERR_MULTIPLE_SCRIPTS,
            CompileError::UnmatchedOpenBrace { .. } => ERR_UNMATCHED_OPEN,
            CompileError::UnmatchedCloseBrace { .. } => ERR_UNMATCHED_CLOSE,
            CompileError::EmptyExpression { .. } => ERR_EMPTY_EXPRESSION,
            CompileError::InvalidExpression { .. } => ERR_INVALID_EXPRESSION,
            CompileError::ScriptSyntax { .. } => ERR_SCRIPT_SYNTAX,
            CompileError::MarkupParse { .. } => ERR_MARKUP,
        }
    }
}

pub type Result<T, E = CompileError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_fragment() {
        let err = CompileError::UnmatchedOpenBrace {
            site: BraceSite::Text,
            text: "Hello {name".into(),
        };
        assert_eq!(err.to_string(), "unmatched '{' in text: `Hello {name`");
        assert_eq!(err.code(), ERR_UNMATCHED_OPEN);

        let err = CompileError::EmptyExpression {
            site: BraceSite::AttributeValue,
            text: "{}".into(),
        };
        assert_eq!(err.to_string(), "empty expression in attribute value: `{}`");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let err = CompileError::MultipleScriptBlocks { count: 2 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "multiple-script-blocks");
        assert_eq!(json["count"], 2);
    }
}
