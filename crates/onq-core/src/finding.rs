use serde::{Deserialize, Serialize};

use crate::Variant;

/// Diagnostic severity. Matched exhaustively everywhere; there is no
/// "unknown" level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Error,
    Warning,
    Info,
}

/// Which pipeline stage produced a finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Schema,
    Schematron,
    Rules,
    Scoring,
}

/// The universal diagnostic unit. Findings are immutable once created and
/// never merged or deduplicated across stages; callers receive the raw
/// concatenation of every stage's output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Best-effort source line, always >= 1.
    pub line: u32,
    pub level: Level,
    /// Free-text category, e.g. "structural-schema" or "custom-rule".
    pub domain: String,
    pub source_stage: Stage,
    pub message: String,
    pub document_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_path: Option<String>,
    /// Literal test expression whose failure produced this finding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub namespace: Variant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_used: Option<String>,
}

impl Finding {
    pub fn new(
        level: Level,
        domain: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
        document_name: impl Into<String>,
    ) -> Self {
        Finding {
            line: 1,
            level,
            domain: domain.into(),
            source_stage: stage,
            message: message.into(),
            document_name: document_name.into(),
            rule_id: None,
            context_path: None,
            check_expression: None,
            explanation: None,
            namespace: Variant::None,
            artifact_used: None,
        }
    }

    pub fn error(domain: impl Into<String>, stage: Stage, message: impl Into<String>, doc: impl Into<String>) -> Self {
        Finding::new(Level::Error, domain, stage, message, doc)
    }

    pub fn warning(domain: impl Into<String>, stage: Stage, message: impl Into<String>, doc: impl Into<String>) -> Self {
        Finding::new(Level::Warning, domain, stage, message, doc)
    }

    pub fn info(domain: impl Into<String>, stage: Stage, message: impl Into<String>, doc: impl Into<String>) -> Self {
        Finding::new(Level::Info, domain, stage, message, doc)
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = line.max(1);
        self
    }

    pub fn in_namespace(mut self, variant: Variant) -> Self {
        self.namespace = variant;
        self
    }

    pub fn with_rule_id(mut self, id: impl Into<String>) -> Self {
        self.rule_id = Some(id.into());
        self
    }

    pub fn with_context_path(mut self, path: impl Into<String>) -> Self {
        self.context_path = Some(path.into());
        self
    }

    pub fn with_check_expression(mut self, expr: impl Into<String>) -> Self {
        self.check_expression = Some(expr.into());
        self
    }

    pub fn with_explanation(mut self, text: impl Into<String>) -> Self {
        self.explanation = Some(text.into());
        self
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact_used = Some(artifact.into());
        self
    }
}
