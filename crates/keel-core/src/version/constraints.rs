//! Version constraint parsing and satisfaction checks.
//!
//! Dependency requirements are written the way package managers write them
//! (`^1.0.0`, `>=1.2.0 <2.0.0`, `1.x || 2.x`, `1.0.0 - 1.4.0`). They are
//! normalized into `semver::VersionReq` alternatives before matching.

use semver::{Version, VersionReq};

use crate::error::KeelError;

/// Version constraint types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Empty requirement, `*` or `latest`
    Any,

    /// One or more alternatives joined by `||`
    Semver(Vec<VersionReq>),
}

impl VersionConstraint {
    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &str) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Semver(alternatives) => {
                let Ok(version) = Version::parse(version.trim().trim_start_matches('v')) else {
                    return false;
                };
                alternatives.iter().any(|req| req.matches(&version))
            }
        }
    }
}

/// Version constraint parser
pub struct VersionResolver;

impl VersionResolver {
    /// Parse a version constraint
    pub fn parse_constraint(input: &str) -> anyhow::Result<VersionConstraint> {
        let input = input.trim();
        if input.is_empty() || input == "*" || input == "latest" {
            return Ok(VersionConstraint::Any);
        }

        let mut alternatives = Vec::new();
        for alternative in input.split("||") {
            let normalized = normalize_range(alternative);
            if normalized.is_empty() {
                return Ok(VersionConstraint::Any);
            }
            let req = VersionReq::parse(&normalized)
                .map_err(|e| anyhow::anyhow!("Invalid version constraint '{}': {}", input, e))?;
            alternatives.push(req);
        }
        Ok(VersionConstraint::Semver(alternatives))
    }
}

/// Whether `version` satisfies `range`.
///
/// An empty range or an exact string match always satisfies; anything that
/// fails to parse does not.
pub fn satisfies_version(version: &str, range: &str) -> bool {
    if range.trim().is_empty() || version == range {
        return true;
    }
    match VersionResolver::parse_constraint(range) {
        Ok(constraint) => constraint.satisfies(version),
        Err(_) => false,
    }
}

/// Turn one package-manager style alternative into `semver` syntax.
fn normalize_range(alternative: &str) -> String {
    let tokens: Vec<&str> = alternative.split_whitespace().collect();

    // Hyphen range: `1.0.0 - 2.0.0`
    if let [low, "-", high] = tokens.as_slice() {
        return format!(">={}, <={}", strip_v(low), strip_v(high));
    }

    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in tokens {
        if token.chars().all(|c| "<>=~^".contains(c)) {
            pending_op = Some(token);
            continue;
        }
        let comparator = match pending_op.take() {
            Some(op) => format!("{}{}", op, strip_v(token)),
            None => bare_comparator(token),
        };
        comparators.push(comparator);
    }
    comparators.join(", ")
}

/// A version without an operator means "exactly this" for full versions and
/// "this minor line" for `major.minor`.
fn bare_comparator(token: &str) -> String {
    let token = strip_v(token);
    if !token.starts_with(|c: char| c.is_ascii_digit()) {
        return token.to_string();
    }
    let is_wildcard = token.contains(['*', 'x', 'X']);
    match token.split('.').count() {
        3 if !is_wildcard => format!("={}", token),
        2 if !is_wildcard => format!("~{}", token),
        _ => token.to_string(),
    }
}

fn strip_v(token: &str) -> &str {
    token.strip_prefix('v').unwrap_or(token)
}

/// Convert a project version into the `uint64[3]` tuple used on chain.
pub fn to_semver_triple(version: &Version) -> [u64; 3] {
    [version.major, version.minor, version.patch]
}

/// Reject a project version lower than the one already deployed.
pub fn ensure_monotonic(current: &Version, requested: &Version) -> Result<(), KeelError> {
    if requested < current {
        return Err(KeelError::VersionRegression {
            current: current.to_string(),
            requested: requested.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_range_and_exact_match_satisfy() {
        assert!(satisfies_version("1.2.0", ""));
        assert!(satisfies_version("not-semver", "not-semver"));
        assert!(satisfies_version("1.2.0", "*"));
    }

    #[test]
    fn test_caret_range() {
        assert!(satisfies_version("1.2.0", "^1.0.0"));
        assert!(!satisfies_version("2.0.0", "^1.0.0"));
    }

    #[test]
    fn test_bare_full_version_is_exact() {
        assert!(satisfies_version("1.0.0", "1.0.0"));
        assert!(!satisfies_version("1.2.0", "1.0.0"));
    }

    #[test]
    fn test_bare_minor_is_tilde() {
        assert!(satisfies_version("1.2.9", "1.2"));
        assert!(!satisfies_version("1.3.0", "1.2"));
    }

    #[test]
    fn test_space_separated_comparators() {
        assert!(satisfies_version("1.5.0", ">=1.2.0 <2.0.0"));
        assert!(!satisfies_version("2.0.0", ">=1.2.0 <2.0.0"));
        assert!(satisfies_version("1.5.0", ">= 1.2.0 < 2.0.0"));
    }

    #[test]
    fn test_alternatives_and_hyphen() {
        assert!(satisfies_version("2.1.0", "^1.0.0 || ^2.0.0"));
        assert!(!satisfies_version("3.0.0", "^1.0.0 || ^2.0.0"));
        assert!(satisfies_version("1.4.0", "1.0.0 - 1.4.0"));
        assert!(!satisfies_version("1.4.1", "1.0.0 - 1.4.0"));
    }

    #[test]
    fn test_wildcards() {
        assert!(satisfies_version("1.9.3", "1.x"));
        assert!(satisfies_version("1.2.3", "1.2.*"));
        assert!(!satisfies_version("1.3.0", "1.2.*"));
    }

    #[test]
    fn test_unparsable_never_satisfies() {
        assert!(!satisfies_version("1.0.0", "banana"));
        assert!(!satisfies_version("banana", "^1.0.0"));
    }

    #[test]
    fn test_parse_constraint_rejects_garbage() {
        assert!(VersionResolver::parse_constraint("not a range").is_err());
        assert_eq!(
            VersionResolver::parse_constraint("latest").unwrap(),
            VersionConstraint::Any
        );
    }

    #[test]
    fn test_ensure_monotonic() {
        let current = Version::parse("1.1.0").unwrap();
        assert!(ensure_monotonic(&current, &Version::parse("1.1.0").unwrap()).is_ok());
        assert!(ensure_monotonic(&current, &Version::parse("1.2.0").unwrap()).is_ok());
        let err = ensure_monotonic(&current, &Version::parse("1.0.9").unwrap()).unwrap_err();
        assert!(matches!(err, KeelError::VersionRegression { .. }));
    }

    #[test]
    fn test_to_semver_triple() {
        let version = Version::parse("1.4.2").unwrap();
        assert_eq!(to_semver_triple(&version), [1, 4, 2]);
    }
}
