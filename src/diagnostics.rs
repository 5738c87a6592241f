//! Non-fatal findings collected while resolving a document.
//!
//! Every condition except an unreadable top-level document degrades to a
//! diagnostic. They are gathered per run and handed back with the graph.

use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A pointer that does not lead to any definition.
    MalformedReference,
    /// An external document could not be read.
    FetchFailed,
    /// Two different payloads imported under the same definition name.
    DuplicateDefinition,
    /// A property name seen twice while building one node.
    DuplicateProperty,
    /// A property schema without `type`, `format`, `$ref` or `items`.
    MissingType,
    /// A `format` with no entry in the format table.
    UnmappedFormat,
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::MalformedReference | DiagnosticKind::FetchFailed => Severity::Error,
            _ => Severity::Warning,
        }
    }

    /// Stable short code used in text output.
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticKind::MalformedReference => "E001",
            DiagnosticKind::FetchFailed => "E002",
            DiagnosticKind::DuplicateDefinition => "W001",
            DiagnosticKind::DuplicateProperty => "W002",
            DiagnosticKind::MissingType => "W003",
            DiagnosticKind::UnmappedFormat => "W004",
        }
    }
}

/// A single diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub code: String,
    /// Pointer or resource name the finding is about.
    pub location: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.location, self.message)
    }
}

/// Collector with per-key deduplication.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    seen: HashSet<(DiagnosticKind, String)>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding. Identical `(kind, location, message)` triples are
    /// only kept once.
    pub fn push(
        &mut self,
        kind: DiagnosticKind,
        location: impl Into<String>,
        message: impl Into<String>,
    ) {
        let location = location.into();
        let message = message.into();
        let key = format!("{}\u{0}{}", location, message);
        self.push_keyed(kind, key, location, message);
    }

    /// Record a finding at most once per `(kind, key)`, whatever its location.
    pub fn push_once(
        &mut self,
        kind: DiagnosticKind,
        key: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.push_keyed(kind, key.into(), location.into(), message.into());
    }

    fn push_keyed(&mut self, kind: DiagnosticKind, key: String, location: String, message: String) {
        if !self.seen.insert((kind, key)) {
            return;
        }
        warn!(code = kind.code(), %location, "{}", message);
        self.items.push(Diagnostic {
            severity: kind.severity(),
            kind,
            code: kind.code().to_string(),
            location,
            message,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.items.iter().filter(|d| d.kind == kind).count()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    /// Hand over everything collected so far and start afresh.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.seen.clear();
        std::mem::take(&mut self.items)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.seen.clear();
    }
}
