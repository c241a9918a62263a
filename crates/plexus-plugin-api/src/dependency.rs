//! Dependency declarations between plugins
//!
//! A dependency is written as a short token:
//!
//! ```text
//! ['?'] id [ op version ]        op = "=" | "==" | ">" | ">=" | "<" | "<="
//! ```
//!
//! A leading `?` marks the dependency optional. `=` and `==` are synonyms.

use crate::version::compare_versions;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Version comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintOp {
    /// `=` or `==`
    Eq,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl ConstraintOp {
    /// Parse an operator token
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" | "==" => Some(Self::Eq),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            _ => None,
        }
    }

    /// Operator as written in a dependency token
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for ConstraintOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check `version <op> constraint_version` using [`compare_versions`]
pub fn satisfies_constraint(version: &str, op: ConstraintOp, constraint_version: &str) -> bool {
    op.accepts(compare_versions(version, constraint_version))
}

/// Operator plus version, e.g. `>=2.0.0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionConstraint {
    /// Comparison operator
    pub op: ConstraintOp,

    /// Version the candidate is compared against
    pub version: String,
}

impl VersionConstraint {
    /// Create a new constraint
    pub fn new(op: ConstraintOp, version: impl Into<String>) -> Self {
        Self {
            op,
            version: version.into(),
        }
    }

    /// Whether `version` satisfies this constraint
    pub fn is_satisfied_by(&self, version: &str) -> bool {
        satisfies_constraint(version, self.op, &self.version)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.version)
    }
}

/// Dependency token could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed dependency '{token}': {reason}")]
pub struct MalformedDependency {
    /// Token as given
    pub token: String,

    /// What was wrong with it
    pub reason: String,
}

impl MalformedDependency {
    fn new(token: &str, reason: impl Into<String>) -> Self {
        Self {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parsed dependency on another plugin
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DependencySpec {
    /// Id of the plugin depended upon
    pub target: String,

    /// Optional version requirement on the target
    pub constraint: Option<VersionConstraint>,

    /// Whether a missing target is tolerated
    pub optional: bool,
}

impl DependencySpec {
    /// Required dependency without a version constraint
    pub fn required(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            constraint: None,
            optional: false,
        }
    }

    /// Optional dependency without a version constraint
    pub fn optional(target: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::required(target)
        }
    }

    /// Attach a version constraint
    pub fn with_constraint(mut self, op: ConstraintOp, version: impl Into<String>) -> Self {
        self.constraint = Some(VersionConstraint::new(op, version));
        self
    }

    /// Parse a dependency token such as `?metrics>=1.2`
    pub fn parse(token: &str) -> Result<Self, MalformedDependency> {
        let trimmed = token.trim();
        let (optional, rest) = match trimmed.strip_prefix('?') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let op_start = rest.find(is_operator_char).unwrap_or(rest.len());
        let target = rest[..op_start].trim();

        if target.is_empty() {
            return Err(MalformedDependency::new(token, "missing plugin id"));
        }
        if let Some(c) = target.chars().find(|c| c.is_whitespace() || *c == '?') {
            return Err(MalformedDependency::new(
                token,
                format!("invalid character {c:?} in plugin id"),
            ));
        }

        let tail = &rest[op_start..];
        if tail.is_empty() {
            return Ok(Self {
                target: target.to_string(),
                constraint: None,
                optional,
            });
        }

        let op_end = tail
            .find(|c: char| !is_operator_char(c))
            .unwrap_or(tail.len());
        let op = ConstraintOp::parse(&tail[..op_end]).ok_or_else(|| {
            MalformedDependency::new(token, format!("unknown operator '{}'", &tail[..op_end]))
        })?;

        let version = tail[op_end..].trim();
        if version.is_empty() {
            return Err(MalformedDependency::new(token, "missing version after operator"));
        }
        if !version.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(MalformedDependency::new(
                token,
                format!("version '{version}' must start with a digit"),
            ));
        }
        if version
            .chars()
            .any(|c| c.is_whitespace() || is_operator_char(c))
        {
            return Err(MalformedDependency::new(
                token,
                format!("invalid version '{version}'"),
            ));
        }

        Ok(Self {
            target: target.to_string(),
            constraint: Some(VersionConstraint::new(op, version)),
            optional,
        })
    }

    /// Whether `version` of the target satisfies this dependency
    pub fn accepts(&self, version: &str) -> bool {
        self.constraint
            .as_ref()
            .map_or(true, |c| c.is_satisfied_by(version))
    }
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '=' | '<' | '>')
}

impl FromStr for DependencySpec {
    type Err = MalformedDependency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DependencySpec {
    type Error = MalformedDependency;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DependencySpec> for String {
    fn from(spec: DependencySpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            f.write_str("?")?;
        }
        f.write_str(&self.target)?;
        if let Some(constraint) = &self.constraint {
            write!(f, "{constraint}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let dep = DependencySpec::parse("auth").unwrap();
        assert_eq!(dep, DependencySpec::required("auth"));
    }

    #[test]
    fn test_parse_optional_with_constraint() {
        let dep = DependencySpec::parse("?metrics>=1.2").unwrap();
        assert!(dep.optional);
        assert_eq!(dep.target, "metrics");
        assert_eq!(
            dep.constraint,
            Some(VersionConstraint::new(ConstraintOp::Ge, "1.2"))
        );
    }

    #[test]
    fn test_parse_all_operators() {
        for (token, op) in [
            ("a=1", ConstraintOp::Eq),
            ("a==1", ConstraintOp::Eq),
            ("a>1", ConstraintOp::Gt),
            ("a>=1", ConstraintOp::Ge),
            ("a<1", ConstraintOp::Lt),
            ("a<=1", ConstraintOp::Le),
        ] {
            let dep = DependencySpec::parse(token).unwrap();
            assert_eq!(dep.constraint.unwrap().op, op, "token {token}");
        }
    }

    #[test]
    fn test_parse_tolerates_spaces_around_operator() {
        let dep = DependencySpec::parse(" core >= 2.0.0 ").unwrap();
        assert_eq!(dep.target, "core");
        assert_eq!(dep.constraint.unwrap().version, "2.0.0");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for token in ["", "?", ">=1.0", "a=>1", "a===1", "a>=", "a>=x1", "??a", "a b", "a>=1 2"] {
            assert!(DependencySpec::parse(token).is_err(), "token {token:?}");
        }
    }

    #[test]
    fn test_display_roundtrip() {
        let dep = DependencySpec::optional("cache").with_constraint(ConstraintOp::Lt, "3.0");
        assert_eq!(dep.to_string(), "?cache<3.0");
        assert_eq!(DependencySpec::parse(&dep.to_string()).unwrap(), dep);
    }

    #[test]
    fn test_satisfies_constraint_boundaries() {
        assert!(satisfies_constraint("2.0.0", ConstraintOp::Ge, "2.0"));
        assert!(satisfies_constraint("2.0.0", ConstraintOp::Le, "2.0"));
        assert!(!satisfies_constraint("2.0.0", ConstraintOp::Gt, "2.0"));
        assert!(!satisfies_constraint("2.0.0", ConstraintOp::Lt, "2.0"));
        assert!(satisfies_constraint("2.0.0-rc1", ConstraintOp::Eq, "2.0.0"));
        assert!(!satisfies_constraint("1.5.0", ConstraintOp::Ge, "2.0.0"));
    }

    #[test]
    fn test_serde_uses_token_form() {
        let deps: Vec<DependencySpec> = serde_json::from_str(r#"["a", "?b>1"]"#).unwrap();
        assert_eq!(deps[1].to_string(), "?b>1");
        assert_eq!(serde_json::to_string(&deps).unwrap(), r#"["a","?b>1"]"#);
        assert!(serde_json::from_str::<Vec<DependencySpec>>(r#"["a=>1"]"#).is_err());
    }
}
