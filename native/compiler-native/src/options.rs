use serde::{Deserialize, Serialize};

/// Which root-scope mutations get rewritten to announce themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewritePolicy {
    /// Mutations of names classified reactive.
    #[default]
    Reactive,
    /// Mutations of names the markup reads.
    Referred,
}

impl RewritePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            RewritePolicy::Reactive => "reactive",
            RewritePolicy::Referred => "referred",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    pub file_path: String,
    /// Name given to the emitted component function; anonymous when absent.
    pub component_name: Option<String>,
    pub rewrite_policy: RewritePolicy,
}

impl CompileOptions {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    pub fn with_component_name(mut self, name: impl Into<String>) -> Self {
        self.component_name = Some(name.into());
        self
    }

    pub fn with_rewrite_policy(mut self, policy: RewritePolicy) -> Self {
        self.rewrite_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_partial_json() {
        let opts: CompileOptions =
            serde_json::from_str(r#"{"componentName":"Counter","rewritePolicy":"referred"}"#)
                .unwrap();
        assert_eq!(opts.component_name.as_deref(), Some("Counter"));
        assert_eq!(opts.rewrite_policy, RewritePolicy::Referred);
        assert!(opts.file_path.is_empty());
    }

    #[test]
    fn reactive_policy_is_default() {
        assert_eq!(CompileOptions::default().rewrite_policy, RewritePolicy::Reactive);
    }
}
