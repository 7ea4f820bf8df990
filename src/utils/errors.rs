//! Error types for the offload analysis.
//!
//! Errors are grouped by the phase that produces them. Detection misses are
//! usually swallowed by the detector itself and only surface here when a
//! caller asks for strict behavior; consistency errors are always fatal.

use thiserror::Error;
use std::fmt;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum OffloadError {
    /// Malformed or unevaluable arithmetic expression
    #[error("Expression error: {0}")]
    Expression(#[from] ExprError),

    /// Region could not be detected from the supplied facts
    #[error("Region detection error: {0}")]
    Detection(#[from] DetectionError),

    /// Detector and dependency analyzer disagree, or the caller broke a precondition
    #[error("Internal consistency violation: {0}")]
    Consistency(#[from] ConsistencyError),

    /// Error raised by the runtime decision procedure
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Facts or plan (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error while parsing or evaluating an integer expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ExprError {
    /// The error message
    pub message: String,
    /// The offending input
    pub input: String,
    /// The kind of expression error
    pub kind: ExprErrorKind,
}

impl ExprError {
    pub fn new(kind: ExprErrorKind, message: impl Into<String>, input: impl Into<String>) -> Self {
        Self { message: message.into(), input: input.into(), kind }
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in `{}`", self.message, self.input)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprErrorKind {
    /// Nothing left to parse
    Empty,
    /// A terminal that is not an integer literal
    InvalidTerminal,
    /// Parentheses do not balance
    UnbalancedParens,
    /// Division by zero during evaluation
    DivisionByZero,
    /// Arithmetic overflowed i64
    Overflow,
}

/// Error while turning analysis facts into a region summary.
#[derive(Error, Debug, Clone)]
pub struct DetectionError {
    /// The error message
    pub message: String,
    /// Function being analyzed
    pub function: String,
    /// The kind of detection error
    pub kind: DetectionErrorKind,
}

impl DetectionError {
    pub fn new(kind: DetectionErrorKind, function: impl Into<String>, message: impl Into<String>) -> Self {
        Self { message: message.into(), function: function.into(), kind }
    }
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (in function '{}')", self.message, self.function)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionErrorKind {
    /// Iteration domain is not `Stmt[..] : constraints`
    MalformedDomain,
    /// Access relation is not `Stmt[..] -> Array[..]`
    MalformedAccess,
    /// Subscript count differs from the declared dimensionality
    DimensionMismatch,
}

/// A violated invariant between pipeline phases.
#[derive(Error, Debug, Clone)]
pub struct ConsistencyError {
    /// The error message
    pub message: String,
    /// The kind of violation
    pub kind: ConsistencyErrorKind,
}

impl ConsistencyError {
    pub fn new(kind: ConsistencyErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.invariant(), self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyErrorKind {
    /// Module-wide detection produced nothing
    NoRegionsFound,
    /// Region calls come from more than one function
    MultipleParents,
    /// Call chain references a region missing from the summary map
    UnknownRegion,
    /// Call site passes a different number of arguments than the region declares
    ArgumentCountMismatch,
}

impl ConsistencyErrorKind {
    /// Human readable name of the invariant that failed.
    pub fn invariant(&self) -> &'static str {
        match self {
            ConsistencyErrorKind::NoRegionsFound => "at least one region must be detected",
            ConsistencyErrorKind::MultipleParents => "all region calls must share one parent function",
            ConsistencyErrorKind::UnknownRegion => "every chained call must have a region summary",
            ConsistencyErrorKind::ArgumentCountMismatch => "call arity must match the region signature",
        }
    }
}

/// Error raised while deciding or preparing a device.
#[derive(Error, Debug, Clone)]
pub struct RuntimeError {
    /// The error message
    pub message: String,
    /// The kind of runtime error
    pub kind: RuntimeErrorKind,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// Waited too long for a device's kernels to compile
    CompilationTimeout,
    /// The backend reported a compile failure
    CompilationFailed,
    /// Execution was requested on a device that is not available
    DeviceUnavailable,
    /// Target string did not name a device class
    UnknownTarget,
    /// A chained call names a region with no summary
    UnknownRegion,
    /// A transfer size expression did not evaluate with the call's scalars
    UnresolvedSize,
}

/// Result type alias.
pub type OffloadResult<T> = Result<T, OffloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistency_error_names_invariant() {
        let err = ConsistencyError::new(ConsistencyErrorKind::MultipleParents, "scop_a called from main and helper");
        let text = OffloadError::from(err).to_string();
        assert!(text.contains("share one parent function"));
        assert!(text.contains("scop_a"));
    }

    #[test]
    fn test_expr_error_display() {
        let err = ExprError::new(ExprErrorKind::InvalidTerminal, "not an integer", "n + 1");
        assert_eq!(err.to_string(), "not an integer in `n + 1`");
    }
}
