//! Error types for the MinZ compiler

use thiserror::Error;
use serde::{Serialize, Deserialize};

/// A source location attached to most diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// 1-based line number
    pub line: usize,
    /// 1-based column number
    pub col: usize,
}

impl Span {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// MinZ compiler errors
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Syntax error surfaced verbatim from the parser
    #[error("lexical error at {span}: {message}")]
    LexicalError { span: Span, message: String },

    /// A name was declared twice in a scope where shadowing is not permitted
    #[error("redefinition of `{name}` at {span} (first defined at {first_span})")]
    Redefinition {
        name: String,
        span: Span,
        first_span: Span,
    },

    /// A name could not be resolved in any enclosing scope, module, or built-in
    #[error("undefined reference to `{name}` at {span}")]
    UndefinedReference { name: String, span: Span },

    /// An expression's type did not match what its context required
    #[error("type mismatch at {span}: expected {expected}, got {got}")]
    TypeMismatch {
        span: Span,
        expected: String,
        got: String,
    },

    /// A call site passed the wrong number of arguments
    #[error("arity mismatch at {span}: `{name}` expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        span: Span,
        expected: usize,
        got: usize,
    },

    /// A cast between incompatible types
    #[error("invalid cast at {span}: cannot cast {from} to {to}")]
    InvalidCast {
        span: Span,
        from: String,
        to: String,
    },

    /// A struct or type definition refers to itself without indirection
    #[error("recursive type `{name}` at {span} has no indirection")]
    RecursiveType { name: String, span: Span },

    /// Module imports form a cycle
    #[error("cyclic import: {}", .cycle.join(" -> "))]
    CyclicImport { cycle: Vec<String> },

    /// A call site matched more than one overload equally well
    #[error("ambiguous overload for `{name}` at {span}: candidates {candidates:?}")]
    AmbiguousOverload {
        name: String,
        span: Span,
        candidates: Vec<String>,
    },

    /// `case` arms produced incompatible result types
    #[error("pattern arm type mismatch at {span}: expected {expected}, got {got}")]
    PatternArmType {
        span: Span,
        expected: String,
        got: String,
    },

    /// A template directive failed to expand
    #[error("template expansion failed at {span}: {message}")]
    TemplateExpansion { span: Span, message: String },

    /// CTIE aborted a call because it exceeded its instruction or recursion budget
    #[error("compile-time execution budget exceeded for `{function}`")]
    CTIEBudgetExceeded { function: String },

    /// CTIE hit a runtime trap while interpreting a pure call
    #[error("compile-time execution trap in `{function}`: {message}")]
    CTIETrap { function: String, message: String },

    /// A function requested SMC but could not satisfy the eligibility rules
    #[error("`{function}` is not eligible for self-modifying-code calling convention: {reason}")]
    SMCIneligible { function: String, reason: String },

    /// The register allocator could not satisfy a function's register pressure
    #[error("register allocation failed for `{function}`: {reason}")]
    RegisterAllocationFailure { function: String, reason: String },

    /// A requested backend/target combination, or a feature unsupported on a backend
    #[error("backend `{backend}` does not support: {feature}")]
    BackendUnsupported { backend: String, feature: String },

    /// Filesystem or I/O failure
    #[error("I/O error: {0}")]
    IOError(String),

    /// A compiler invariant was violated; this indicates a compiler bug, not user error
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IOError(e.to_string())
    }
}

/// Error severity classification, used to decide whether compilation can continue
/// and whether the overall process exit code should be non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Fatal error; the current compilation cannot produce output.
    Fatal,
    /// Recoverable; compilation continues, the affected construct is skipped or
    /// left unoptimized.
    Recoverable,
    /// Informational; does not affect compilation or the exit code.
    Warning,
}

impl Error {
    /// Construct an `InternalInvariant` error from any displayable message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::InternalInvariant(msg.into())
    }

    /// Classify error severity, matching the propagation rules of the compiler's
    /// diagnostic model: I/O and internal invariants are fatal, CTIE failures are
    /// recoverable, most semantic errors are fatal to the enclosing function but
    /// do not abort the whole compilation.
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::IOError(_) => ErrorSeverity::Fatal,
            Error::InternalInvariant(_) => ErrorSeverity::Fatal,
            Error::RegisterAllocationFailure { .. } => ErrorSeverity::Fatal,
            Error::BackendUnsupported { .. } => ErrorSeverity::Fatal,

            Error::CTIEBudgetExceeded { .. } => ErrorSeverity::Recoverable,
            Error::CTIETrap { .. } => ErrorSeverity::Recoverable,
            Error::SMCIneligible { .. } => ErrorSeverity::Recoverable,

            _ => ErrorSeverity::Fatal,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Error::LexicalError { span, .. }
            | Error::Redefinition { span, .. }
            | Error::UndefinedReference { span, .. }
            | Error::TypeMismatch { span, .. }
            | Error::ArityMismatch { span, .. }
            | Error::InvalidCast { span, .. }
            | Error::RecursiveType { span, .. }
            | Error::AmbiguousOverload { span, .. }
            | Error::PatternArmType { span, .. }
            | Error::TemplateExpansion { span, .. } => Some(*span),
            _ => None,
        }
    }
}

/// A single reported diagnostic: an error plus its classified severity.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub error: Error,
    pub severity: ErrorSeverity,
    pub file: String,
}

impl Diagnostic {
    pub fn new(error: Error, file: impl Into<String>) -> Self {
        let severity = error.classify();
        Self {
            error,
            severity,
            file: file.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.file, severity_tag(self.severity), self.error)
    }
}

fn severity_tag(s: ErrorSeverity) -> &'static str {
    match s {
        ErrorSeverity::Fatal => "error",
        ErrorSeverity::Recoverable => "warning",
        ErrorSeverity::Warning => "note",
    }
}

/// Collects diagnostics across a single compilation. Not global: one sink per
/// `Compiler::compile` invocation.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn report(&mut self, error: Error, file: impl Into<String>) {
        self.push(Diagnostic::new(error, file));
    }

    pub fn has_fatal(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == ErrorSeverity::Fatal)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Result type for MinZ compiler operations
pub type Result<T> = std::result::Result<T, Error>;
