//! Fully-qualified names of global bindings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SEPARATOR: &str = "::";

/// Fully-qualified name of a global binding: `module_path::attr`.
///
/// The module path may be made of several `.`-separated segments
/// (e.g. `a.b.c::attr`). Two identifiers are equal iff both components
/// are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier {
    module_path: String,
    attr: String,
}

/// Rejected textual form of an [`Identifier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("invalid identifier `{0}`: expected exactly one `::` separator")]
    Separator(String),
    #[error("invalid identifier `{0}`: empty module path or attribute")]
    Empty(String),
}

impl Identifier {
    /// Build an identifier from its two components.
    ///
    /// # Panics
    ///
    /// If either component is empty or contains `::`. Use
    /// [`Identifier::try_new`] for names that come from program text.
    pub fn new(module_path: impl Into<String>, attr: impl Into<String>) -> Self {
        match Self::try_new(module_path, attr) {
            Ok(id) => id,
            Err(err) => panic!("{err}"),
        }
    }

    /// Build an identifier, rejecting components that would not survive a
    /// round trip through the textual form.
    pub fn try_new(
        module_path: impl Into<String>,
        attr: impl Into<String>,
    ) -> Result<Self, IdentifierError> {
        let module_path = module_path.into();
        let attr = attr.into();
        if module_path.contains(SEPARATOR) || attr.contains(SEPARATOR) {
            return Err(IdentifierError::Separator(format!(
                "{module_path}{SEPARATOR}{attr}"
            )));
        }
        if module_path.is_empty() || attr.is_empty() {
            return Err(IdentifierError::Empty(format!("{module_path}{SEPARATOR}{attr}")));
        }
        Ok(Self { module_path, attr })
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// The `module_path::attr` form.
    pub fn full_name(&self) -> String {
        format!("{}{SEPARATOR}{}", self.module_path, self.attr)
    }

    /// Flattened form usable as a C symbol: `a.b::f` becomes `a_b_f`.
    pub fn c_name(&self) -> String {
        self.full_name().replace('.', "_").replace(SEPARATOR, "_")
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.matches(SEPARATOR).count() != 1 {
            return Err(IdentifierError::Separator(s.to_string()));
        }
        match s.split_once(SEPARATOR) {
            Some((module_path, attr)) => Self::try_new(module_path, attr),
            None => Err(IdentifierError::Separator(s.to_string())),
        }
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.full_name()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.module_path, self.attr)
    }
}
