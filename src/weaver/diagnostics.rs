//! Diagnostics channel of a weave pass.
//!
//! The weaver never aborts a pass because a single member could not be woven. Instead it
//! records what happened here and moves on to the next member. Hosts (build tasks, tests,
//! tooling) own the [`Diagnostics`] instance and decide how to surface it.
//!
//! # Key Components
//!
//! - [`Diagnostics`] - Thread-safe, append-only container for diagnostic entries
//! - [`Diagnostic`] - Individual entry with severity, category and member context
//! - [`DiagnosticSeverity`] - Severity level (Info, Warning, Error)
//! - [`DiagnosticCategory`] - Weaver stage that produced the entry
//!
//! # Usage Examples
//!
//! ```rust
//! use dotweave::weaver::diagnostics::{Diagnostics, DiagnosticCategory};
//! use std::sync::Arc;
//!
//! let diagnostics = Arc::new(Diagnostics::new());
//!
//! diagnostics.warning(
//!     DiagnosticCategory::Setup,
//!     "DotNetAspects.Interception.MethodInterceptionAspect not found, nothing to weave",
//! );
//!
//! if !diagnostics.has_errors() {
//!     println!("{}", diagnostics.summary());
//! }
//! ```
//!
//! # Thread Safety
//!
//! All types in this module are [`Send`] and [`Sync`]. The container uses `boxcar::Vec`,
//! which supports lock-free concurrent appends, so the post-weave verification pass can
//! report from its worker threads without coordination.

use std::fmt::{self, Write};

use crate::metadata::token::Token;

/// Severity level of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    /// Progress information, e.g. a member that was woven.
    Info,

    /// Something was skipped or ignored, the module is still consistent.
    ///
    /// Examples: no aspect library referenced, additional aspects on a member that only
    /// honors the first one.
    Warning,

    /// A member could not be woven, or the whole pass could not start.
    Error,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Info => write!(f, "INFO"),
            DiagnosticSeverity::Warning => write!(f, "WARN"),
            DiagnosticSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// Weaver stage a diagnostic originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    /// Resolution of the well-known aspect and reflection references.
    Setup,

    /// Attribute scanning and aspect ordering.
    Discovery,

    /// Method body cloning.
    Clone,

    /// Full call interception.
    Interception,

    /// Entry/success/exception/exit wrapping.
    Boundary,

    /// Property accessor interception.
    Location,

    /// Post-weave structural verification.
    Verification,

    /// Weaver configuration.
    Config,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticCategory::Setup => "Setup",
            DiagnosticCategory::Discovery => "Discovery",
            DiagnosticCategory::Clone => "Clone",
            DiagnosticCategory::Interception => "Interception",
            DiagnosticCategory::Boundary => "Boundary",
            DiagnosticCategory::Location => "Location",
            DiagnosticCategory::Verification => "Verification",
            DiagnosticCategory::Config => "Config",
        };
        f.write_str(name)
    }
}

/// A single diagnostic entry.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level of this diagnostic.
    pub severity: DiagnosticSeverity,

    /// Stage that reported this diagnostic.
    pub category: DiagnosticCategory,

    /// Human-readable description.
    pub message: String,

    /// Fully qualified member the diagnostic is about, e.g. `Demo.Calculator::Add`.
    pub member: Option<String>,

    /// Metadata token of that member.
    pub token: Option<Token>,
}

impl Diagnostic {
    /// Creates a new diagnostic entry.
    ///
    /// # Arguments
    ///
    /// * `severity` - Severity level of the diagnostic
    /// * `category` - Stage that produced the diagnostic
    /// * `message` - Human-readable description
    pub fn new(
        severity: DiagnosticSeverity,
        category: DiagnosticCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            member: None,
            token: None,
        }
    }

    /// Attaches the member name to the diagnostic.
    #[must_use]
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    /// Attaches the member token to the diagnostic.
    #[must_use]
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: ", self.severity, self.category)?;

        if let Some(member) = &self.member {
            write!(f, "{member}: ")?;
        }

        f.write_str(&self.message)?;

        if let Some(token) = self.token {
            write!(f, " (token: {token})")?;
        }

        Ok(())
    }
}

/// Thread-safe container for collecting diagnostic entries.
///
/// # Example
///
/// ```rust
/// use dotweave::weaver::diagnostics::{Diagnostics, DiagnosticCategory};
/// use std::sync::Arc;
///
/// let diagnostics = Arc::new(Diagnostics::new());
///
/// let worker = Arc::clone(&diagnostics);
/// std::thread::spawn(move || {
///     worker.error(DiagnosticCategory::Verification, "branch target IL_0007 missing");
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(diagnostics.error_count(), 1);
/// ```
#[derive(Debug)]
pub struct Diagnostics {
    entries: boxcar::Vec<Diagnostic>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Creates a new empty diagnostics container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
        }
    }

    /// Adds an informational diagnostic.
    pub fn info(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticSeverity::Info, category, message));
    }

    /// Adds a warning diagnostic.
    pub fn warning(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(
            DiagnosticSeverity::Warning,
            category,
            message,
        ));
    }

    /// Adds an error diagnostic.
    pub fn error(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(
            DiagnosticSeverity::Error,
            category,
            message,
        ));
    }

    /// Adds a diagnostic entry directly.
    ///
    /// Use this for entries that carry member context.
    pub fn push(&self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Returns true if any diagnostics have been collected.
    pub fn has_any(&self) -> bool {
        self.entries.count() > 0
    }

    /// Returns true if any error-level diagnostics have been collected.
    pub fn has_errors(&self) -> bool {
        self.iter().any(|d| d.severity == DiagnosticSeverity::Error)
    }

    /// Returns true if any warning-level diagnostics have been collected.
    pub fn has_warnings(&self) -> bool {
        self.iter().any(|d| d.severity == DiagnosticSeverity::Warning)
    }

    /// Returns the total number of diagnostics.
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Returns the number of error-level diagnostics.
    pub fn error_count(&self) -> usize {
        self.count_severity(DiagnosticSeverity::Error)
    }

    /// Returns the number of warning-level diagnostics.
    pub fn warning_count(&self) -> usize {
        self.count_severity(DiagnosticSeverity::Warning)
    }

    /// Returns the number of info-level diagnostics.
    pub fn info_count(&self) -> usize {
        self.count_severity(DiagnosticSeverity::Info)
    }

    fn count_severity(&self, severity: DiagnosticSeverity) -> usize {
        self.iter().filter(|d| d.severity == severity).count()
    }

    /// Returns an iterator over all diagnostics in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().map(|(_, d)| d)
    }

    /// Returns all errors as a vector.
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.iter()
            .filter(|d| d.severity == DiagnosticSeverity::Error)
            .collect()
    }

    /// Returns all warnings as a vector.
    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.iter()
            .filter(|d| d.severity == DiagnosticSeverity::Warning)
            .collect()
    }

    /// Returns diagnostics filtered by category.
    pub fn by_category(&self, category: DiagnosticCategory) -> Vec<&Diagnostic> {
        self.iter().filter(|d| d.category == category).collect()
    }

    /// Returns diagnostics attached to the given member name.
    pub fn for_member(&self, member: &str) -> Vec<&Diagnostic> {
        self.iter()
            .filter(|d| d.member.as_deref() == Some(member))
            .collect()
    }

    /// Formats a summary of all diagnostics for display.
    pub fn summary(&self) -> String {
        let mut output = String::new();

        let error_count = self.error_count();
        let warning_count = self.warning_count();
        let info_count = self.info_count();

        let _ = writeln!(
            output,
            "Diagnostics: {} error(s), {} warning(s), {} info(s)",
            error_count, warning_count, info_count
        );

        if error_count > 0 {
            output.push_str("\nErrors:\n");
            for diag in self.errors() {
                let _ = writeln!(output, "  {diag}");
            }
        }

        if warning_count > 0 {
            output.push_str("\nWarnings:\n");
            for diag in self.warnings() {
                let _ = writeln!(output, "  {diag}");
            }
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
