use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Type,
    Name,
    Scope,
    Runtime,
    Declaration,
}

/// Numeric error code (E200–E899).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Type errors (E200–E299) ──
    pub const UNSUPPORTED_OPERATION: Self = Self(200);
    pub const TYPE_MISMATCH: Self = Self(201);
    pub const WRONG_ARG_COUNT: Self = Self(202);
    pub const EXPECTED_TYPE: Self = Self(203);
    pub const MISSING_RETURN: Self = Self(204);
    pub const NOT_CALLABLE: Self = Self(205);
    pub const UNKNOWN_ATTRIBUTE: Self = Self(206);

    // ── Name resolution errors (E300–E399) ──
    pub const UNRESOLVED_NAME: Self = Self(300);

    // ── Scope errors (E500–E599) ──
    pub const VARIABLE_ALREADY_DECLARED: Self = Self(500);
    pub const UNDECLARED_LOCAL: Self = Self(501);
    pub const STATIC_ASSIGNMENT: Self = Self(502);

    // ── Runtime errors (E700–E799) ──
    pub const UNINITIALIZED_LOCAL: Self = Self(700);
    pub const CALL_MISMATCH: Self = Self(701);
    pub const INTERNAL: Self = Self(702);
    pub const LIMIT_EXCEEDED: Self = Self(703);
    pub const HOST_TYPE_MISMATCH: Self = Self(704);
    pub const INDEX_OUT_OF_RANGE: Self = Self(705);

    // ── Declaration errors (E800–E899) ──
    pub const DUPLICATE_MODULE: Self = Self(800);
    pub const DUPLICATE_GLOBAL: Self = Self(801);
    pub const UNKNOWN_MODULE: Self = Self(802);
    pub const UNDECLARED_GLOBAL: Self = Self(803);
    pub const INVALID_IDENTIFIER: Self = Self(804);
    pub const GLOBAL_TYPE_MISMATCH: Self = Self(805);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            200..=299 => ErrorCategory::Type,
            300..=399 => ErrorCategory::Name,
            500..=599 => ErrorCategory::Scope,
            800..=899 => ErrorCategory::Declaration,
            _ => ErrorCategory::Runtime,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type => write!(f, "type"),
            Self::Name => write!(f, "name"),
            Self::Scope => write!(f, "scope"),
            Self::Runtime => write!(f, "runtime"),
            Self::Declaration => write!(f, "declaration"),
        }
    }
}

/// A structured error record handed to the embedding host.
///
/// The host decides how to present it; nothing in the runtime parses
/// the message text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Error code (e.g., E201).
    pub code: ErrorCode,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    /// Human-readable error message.
    pub message: String,
    /// Source location, when the failing node is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            code,
            category: code.category(),
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(span) = self.span {
            write!(f, "{span}: ")?;
        }
        write!(f, "{} [{}] {}", self.code, self.category, self.message)
    }
}
