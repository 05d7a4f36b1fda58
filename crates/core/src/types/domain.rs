//! Tenant subdomain type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Subdomain`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SubdomainError {
    /// The input string is empty.
    #[error("subdomain cannot be empty")]
    Empty,
    /// The input string is too long for a DNS label.
    #[error("subdomain must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains a character outside `[a-z0-9-]`.
    #[error("subdomain contains invalid character '{0}'")]
    InvalidCharacter(char),
    /// The label starts or ends with a hyphen.
    #[error("subdomain cannot start or end with a hyphen")]
    EdgeHyphen,
}

/// A tenant subdomain label, e.g. `acme` in `acme.shopfront.app`.
///
/// ## Constraints
///
/// - Length: 1-63 characters (single DNS label)
/// - Only ASCII letters, digits and hyphens; stored lowercase
/// - Must not start or end with a hyphen
///
/// ## Examples
///
/// ```
/// use shopfront_core::Subdomain;
///
/// assert_eq!(Subdomain::parse("Acme").unwrap().as_str(), "acme");
/// assert!(Subdomain::parse("acme-shop").is_ok());
///
/// assert!(Subdomain::parse("").is_err());
/// assert!(Subdomain::parse("acme.shop").is_err());
/// assert!(Subdomain::parse("-acme").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Subdomain(String);

impl Subdomain {
    /// Maximum length of a DNS label.
    pub const MAX_LENGTH: usize = 63;

    /// Parse a `Subdomain` from a string, normalising it to lowercase.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, longer than 63 characters,
    /// contains characters other than letters, digits and hyphens, or starts
    /// or ends with a hyphen.
    pub fn parse(s: &str) -> Result<Self, SubdomainError> {
        if s.is_empty() {
            return Err(SubdomainError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(SubdomainError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if let Some(bad) = s.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '-') {
            return Err(SubdomainError::InvalidCharacter(bad));
        }

        if s.starts_with('-') || s.ends_with('-') {
            return Err(SubdomainError::EdgeHyphen);
        }

        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Returns the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the canonical platform domain for this tenant.
    ///
    /// ```
    /// use shopfront_core::Subdomain;
    ///
    /// let sub = Subdomain::parse("acme").unwrap();
    /// assert_eq!(sub.canonical_domain("shopfront.app"), "acme.shopfront.app");
    /// ```
    #[must_use]
    pub fn canonical_domain(&self, platform_root: &str) -> String {
        format!("{}.{platform_root}", self.0)
    }

    /// Consumes the `Subdomain` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Subdomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Subdomain {
    type Err = SubdomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Subdomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
