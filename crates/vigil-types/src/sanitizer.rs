//! Sanitizer configuration value types.
//!
//! This module only holds configuration; the recursive redaction transform
//! itself (which needs compiled regexes and glob matchers) lives in
//! `vigil-core::sanitizer`.

/// How a field matcher compares against a key or dot-path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatcherKind {
    Exact,
    Prefix,
    Suffix,
    Contains,
    Regex,
}

/// A single field matcher. Literal strings in [`SanitizerConfig::fields`]
/// are sugar for `FieldMatcher { kind: Exact, .. }` with `*`/`**` glob
/// detection applied first.
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    pub kind: MatcherKind,
    pub value: String,
    pub case_sensitive: bool,
}

impl FieldMatcher {
    pub fn new(kind: MatcherKind, value: impl Into<String>) -> Self {
        Self { kind, value: value.into(), case_sensitive: false }
    }

    pub fn exact(value: impl Into<String>) -> Self {
        Self::new(MatcherKind::Exact, value)
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    /// A matcher value containing `*` is interpreted as a glob on the
    /// dot-path rather than a literal/prefix/suffix/contains comparison.
    pub fn is_glob(&self) -> bool {
        self.value.contains('*')
    }
}

/// Replacement strategy for a string pattern rule: a fixed string, or (in
/// `vigil-core`) a function pointer supplied by the caller. The config type
/// only models the fixed-string case plus an "use pattern's own
/// replacement" marker; callback replacement is layered on in
/// `vigil-core::sanitizer::CompiledPattern`, which is not `Clone`/`Debug`
/// friendly and therefore deliberately kept out of this plain-data crate.
#[derive(Debug, Clone)]
pub enum PatternReplacement {
    /// Use the sanitizer's configured default replacement string.
    Default,
    /// Use this fixed replacement string.
    Fixed(String),
}

/// A named string-pattern rule: a regex plus how to replace each match.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub name: String,
    pub regex: String,
    pub replacement: PatternReplacement,
}

impl PatternRule {
    pub fn new(name: impl Into<String>, regex: impl Into<String>) -> Self {
        Self { name: name.into(), regex: regex.into(), replacement: PatternReplacement::Default }
    }

    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = PatternReplacement::Fixed(replacement.into());
        self
    }
}

/// Sanitizer configuration: which fields/patterns to redact, and with what.
#[derive(Debug, Clone)]
pub struct SanitizerConfig {
    pub enabled: bool,
    /// Literal field names (leaf key or full dot-path), lowercased at match
    /// time unless the individual matcher is case-sensitive.
    pub fields: Vec<FieldMatcher>,
    pub patterns: Vec<PatternRule>,
    pub replacement: String,
    pub max_depth: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fields: Vec::new(),
            patterns: Vec::new(),
            replacement: "[REDACTED]".to_string(),
            max_depth: 10,
        }
    }
}

impl SanitizerConfig {
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }
}
