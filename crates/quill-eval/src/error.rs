//! Error types for the Quill runtime.
//!
//! `return` is not an error: statement execution reports it through
//! [`crate::Outcome`], so nothing here can swallow a normal return.

use quill_types::{Diagnostic, ErrorCode, IdentifierError, Span};
use thiserror::Error;

/// Every failure the runtime can report. None are recovered internally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Static type error, raised before the offending node is evaluated.
    #[error("{span}: type error [{code}]: {message}")]
    Type {
        code: ErrorCode,
        message: String,
        span: Span,
    },
    /// A name was not where scope analysis said it would be.
    #[error("name resolution failed: {message}")]
    Name { message: String },
    /// Uninitialized reads, call-boundary mismatches, limits, internal
    /// consistency failures.
    #[error("runtime error [{code}]: {message}")]
    Runtime {
        code: ErrorCode,
        message: String,
        span: Option<Span>,
    },
    /// Misuse of the module registry or the global table.
    #[error("declaration error [{code}]: {message}")]
    Declaration { code: ErrorCode, message: String },
    /// A host-level value of the wrong kind was requested.
    #[error("type mismatch: expected {expected}, found {found}")]
    HostTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

impl EvalError {
    pub fn type_error(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self::Type {
            code,
            message: message.into(),
            span,
        }
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::Name {
            message: message.into(),
        }
    }

    pub fn runtime(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Runtime {
            code,
            message: message.into(),
            span: None,
        }
    }

    pub fn runtime_at(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self::Runtime {
            code,
            message: message.into(),
            span: Some(span),
        }
    }

    /// The runtime disagrees with itself: a checked node failed to evaluate
    /// the way the checker promised.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::runtime(ErrorCode::INTERNAL, message)
    }

    pub fn declaration(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Declaration {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Type { code, .. } | Self::Runtime { code, .. } | Self::Declaration { code, .. } => {
                *code
            }
            Self::Name { .. } => ErrorCode::UNRESOLVED_NAME,
            Self::HostTypeMismatch { .. } => ErrorCode::HOST_TYPE_MISMATCH,
            Self::Identifier(_) => ErrorCode::INVALID_IDENTIFIER,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Type { span, .. } => Some(*span),
            Self::Runtime { span, .. } => *span,
            _ => None,
        }
    }

    /// Structured form for the embedding host.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let message = match self {
            Self::Type { message, .. }
            | Self::Name { message }
            | Self::Runtime { message, .. }
            | Self::Declaration { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Diagnostic::new(self.code(), message, self.span())
    }
}

/// Result alias for runtime operations.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::ErrorCategory;

    #[test]
    fn test_codes_follow_variant() {
        let e = EvalError::name("`m::x` not found");
        assert_eq!(e.code(), ErrorCode::UNRESOLVED_NAME);
        let e = EvalError::internal("boom");
        assert_eq!(e.code(), ErrorCode::INTERNAL);
        assert!(e.span().is_none());
        let e = EvalError::from(IdentifierError::Separator("x".into()));
        assert_eq!(e.code(), ErrorCode::INVALID_IDENTIFIER);
    }

    #[test]
    fn test_type_error_display_carries_location() {
        let e = EvalError::type_error(
            ErrorCode::TYPE_MISMATCH,
            "mismatched types",
            Span::point(2, 4),
        );
        assert_eq!(e.to_string(), "2:4: type error [E201]: mismatched types");
    }

    #[test]
    fn test_to_diagnostic() {
        let e = EvalError::runtime_at(
            ErrorCode::UNINITIALIZED_LOCAL,
            "read from uninitialized local `x`",
            Span::point(7, 1),
        );
        let d = e.to_diagnostic();
        assert_eq!(d.category, ErrorCategory::Runtime);
        assert_eq!(d.message, "read from uninitialized local `x`");
        assert_eq!(d.span, Some(Span::point(7, 1)));

        let e = EvalError::HostTypeMismatch {
            expected: "i32",
            found: "str",
        };
        assert_eq!(e.to_diagnostic().message, "type mismatch: expected i32, found str");
    }
}
