//! Sharp edges: registered hazards with detection patterns.
//!
//! A sharp edge pairs a known hazard with a workaround and an ordered list of
//! detection patterns. Patterns come in three kinds, each carrying a fixed
//! severity when it matches:
//!
//! | Kind      | Matched against | Severity |
//! |-----------|-----------------|----------|
//! | `code`    | proposed code   | high     |
//! | `context` | context mapping | medium   |
//! | `intent`  | stated intent   | low      |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Whether an edge is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStatus {
    #[default]
    Active,
    /// Never evaluated again
    Retired,
}

/// Warning severity, ordered low < medium < high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Discriminant of a detection pattern.
///
/// Declaration order is the fixed evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Code,
    Context,
    Intent,
}

impl PatternKind {
    /// Severity carried by a match of this kind.
    pub fn severity(self) -> Severity {
        match self {
            PatternKind::Code => Severity::High,
            PatternKind::Context => Severity::Medium,
            PatternKind::Intent => Severity::Low,
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternKind::Code => write!(f, "code"),
            PatternKind::Context => write!(f, "context"),
            PatternKind::Intent => write!(f, "intent"),
        }
    }
}

/// What a context predicate expects of its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Expectation {
    /// Value equals (case-insensitive)
    Equals(String),
    /// Value equals any of these (case-insensitive)
    OneOf(Vec<String>),
    /// Key is present with any value
    Present,
}

/// A single key/value predicate over the context mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPredicate {
    pub key: String,
    pub expect: Expectation,
}

impl ContextPredicate {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expect: Expectation::Equals(value.into()),
        }
    }

    pub fn one_of(key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            expect: Expectation::OneOf(values),
        }
    }

    pub fn present(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expect: Expectation::Present,
        }
    }
}

/// How a sharp edge is recognised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionPattern {
    /// Regular expression over proposed code
    Code { regex: String },
    /// All predicates must hold against the context mapping
    Context { predicates: Vec<ContextPredicate> },
    /// Any keyword or phrase present in the intent
    Intent { terms: Vec<String> },
}

impl DetectionPattern {
    pub fn code(regex: impl Into<String>) -> Self {
        DetectionPattern::Code {
            regex: regex.into(),
        }
    }

    pub fn context(predicates: Vec<ContextPredicate>) -> Self {
        DetectionPattern::Context { predicates }
    }

    pub fn intent<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DetectionPattern::Intent {
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kind(&self) -> PatternKind {
        match self {
            DetectionPattern::Code { .. } => PatternKind::Code,
            DetectionPattern::Context { .. } => PatternKind::Context,
            DetectionPattern::Intent { .. } => PatternKind::Intent,
        }
    }
}

/// A registered hazard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharpEdge {
    pub id: String,
    pub description: String,
    pub detection_patterns: Vec<DetectionPattern>,
    pub workaround: String,
    /// Free-form hint from whoever registered the edge; output severity is
    /// always derived from the matching pattern kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_hint: Option<Severity>,
    #[serde(default)]
    pub status: EdgeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// Set when one of the patterns failed to compile
    #[serde(default)]
    pub needs_review: bool,
}

impl SharpEdge {
    pub fn new(description: impl Into<String>, workaround: impl Into<String>) -> Self {
        Self::with_id(Ulid::new().to_string(), description, workaround)
    }

    pub fn with_id(
        id: impl Into<String>,
        description: impl Into<String>,
        workaround: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            detection_patterns: Vec::new(),
            workaround: workaround.into(),
            severity_hint: None,
            status: EdgeStatus::Active,
            last_triggered_at: None,
            needs_review: false,
        }
    }

    pub fn with_pattern(mut self, pattern: DetectionPattern) -> Self {
        self.detection_patterns.push(pattern);
        self
    }

    pub fn with_severity_hint(mut self, hint: Severity) -> Self {
        self.severity_hint = Some(hint);
        self
    }

    pub fn with_last_triggered_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_triggered_at = Some(at);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == EdgeStatus::Active
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A transient warning emitted by edge detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub edge_id: String,
    pub description: String,
    pub workaround: String,
    pub pattern_kind: PatternKind,
    /// Position of the matching pattern in the edge's pattern list
    pub pattern_index: usize,
    pub severity: Severity,
}
