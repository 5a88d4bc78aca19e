//! Validated SQL identifiers
//!
//! Table and column names enter the system exactly once, when they are read
//! back from the database catalog or supplied by the user. They are validated
//! here and from then on treated as a closed set: SQL rendering only quotes
//! them, it never re-checks them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Result, SalvageError};

/// A table or column name that passed validation.
///
/// Names are kept exactly as the catalog reports them (case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ident(String);

impl Ident {
    /// Validate a name. Empty names and names containing NUL are rejected.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains('\0') {
            return Err(SalvageError::InvalidIdentifier(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the identifier wrapped in `quote`, doubling any embedded quote.
    pub fn quoted(&self, quote: char) -> String {
        let mut out = String::with_capacity(self.0.len() + 2);
        out.push(quote);
        for ch in self.0.chars() {
            if ch == quote {
                out.push(quote);
            }
            out.push(ch);
        }
        out.push(quote);
        out
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Ident {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Ident {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl TryFrom<String> for Ident {
    type Error = SalvageError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Ident> for String {
    fn from(value: Ident) -> Self {
        value.0
    }
}
