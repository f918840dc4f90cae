//! Version constraint expressions

use crate::{BundleError, Result};
use semver::Version;
use std::fmt;
use std::str::FromStr;

/// Parsed constraint expression
///
/// | form     | matches                                 |
/// |----------|-----------------------------------------|
/// | `X.Y.Z`  | exactly `X.Y.Z`                         |
/// | `>=X.Y.Z`| anything at or above `X.Y.Z`            |
/// | `^X.Y.Z` | same major, at or above `X.Y.Z`         |
/// | `~X.Y.Z` | same major.minor, at or above `X.Y.Z`   |
/// | `*`      | anything (also the empty expression)    |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Exact(Version),
    AtLeast(Version),
    Caret(Version),
    Tilde(Version),
    Any,
}

impl Constraint {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() || expr == "*" {
            return Ok(Constraint::Any);
        }

        let constraint = if let Some(rest) = expr.strip_prefix(">=") {
            Constraint::AtLeast(parse_version(expr, rest)?)
        } else if let Some(rest) = expr.strip_prefix('^') {
            Constraint::Caret(parse_version(expr, rest)?)
        } else if let Some(rest) = expr.strip_prefix('~') {
            Constraint::Tilde(parse_version(expr, rest)?)
        } else {
            Constraint::Exact(parse_version(expr, expr)?)
        };
        Ok(constraint)
    }

    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Constraint::Exact(v) => version == v,
            Constraint::AtLeast(v) => version >= v,
            Constraint::Caret(v) => version.major == v.major && version >= v,
            Constraint::Tilde(v) => {
                version.major == v.major && version.minor == v.minor && version >= v
            }
            Constraint::Any => true,
        }
    }
}

fn parse_version(expr: &str, text: &str) -> Result<Version> {
    Version::parse(text.trim()).map_err(|e| BundleError::InvalidConstraint {
        constraint: expr.to_string(),
        reason: e.to_string(),
    })
}

impl FromStr for Constraint {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Exact(v) => write!(f, "{}", v),
            Constraint::AtLeast(v) => write!(f, ">={}", v),
            Constraint::Caret(v) => write!(f, "^{}", v),
            Constraint::Tilde(v) => write!(f, "~{}", v),
            Constraint::Any => f.write_str("*"),
        }
    }
}
