//! Shared types for the Quill runtime.
//!
//! This crate defines the AST node types handed over by the parser and the
//! scope analysis pass, fully-qualified identifiers, source spans, and the
//! structured diagnostic record used when reporting errors to a host.

mod error;
mod fqn;
mod span;
pub mod ast;

pub use error::{Diagnostic, ErrorCategory, ErrorCode};
pub use fqn::{Identifier, IdentifierError};
pub use span::Span;
