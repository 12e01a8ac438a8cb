//! Deciding whether a candidate version is newer than the one we hold.

use std::cmp::Ordering;

use semver::Version;

/// Outcome of comparing a candidate with the current latest version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Newness {
    /// Nothing recorded yet.
    First,
    Newer,
    /// Same or older.
    NotNewer,
    /// Semantic versioning is on and the candidate does not parse.
    Unparsable { reason: String },
}

/// Parse a semantic version, tolerating a leading `v`.
pub fn parse(version: &str) -> Result<Version, semver::Error> {
    let trimmed = version.trim();
    Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed))
}

#[must_use]
pub fn compare(candidate: &str, current: &str, semantic: bool) -> Newness {
    if !semantic {
        return if current.is_empty() {
            Newness::First
        } else if candidate == current {
            Newness::NotNewer
        } else {
            Newness::Newer
        };
    }
    let candidate = match parse(candidate) {
        Ok(v) => v,
        Err(err) => {
            return Newness::Unparsable {
                reason: format!("failed converting {candidate:?} to a semantic version: {err}"),
            };
        }
    };
    if current.is_empty() {
        return Newness::First;
    }
    // A current version that doesn't parse can't be compared; take the
    // parsable candidate.
    match parse(current) {
        Ok(current) if candidate.cmp(&current) != Ordering::Greater => Newness::NotNewer,
        _ => Newness::Newer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_ordering() {
        assert_eq!(compare("1.2.4", "1.2.3", true), Newness::Newer);
        assert_eq!(compare("v1.10.0", "1.9.9", true), Newness::Newer);
        assert_eq!(compare("1.2.3", "1.2.3", true), Newness::NotNewer);
        assert_eq!(compare("1.2.2", "1.2.3", true), Newness::NotNewer);
        assert_eq!(compare("2.0.0-rc.1", "1.9.0", true), Newness::Newer);
        assert_eq!(compare("2.0.0-rc.1", "2.0.0", true), Newness::NotNewer);
    }

    #[test]
    fn first_observation() {
        assert_eq!(compare("1.0.0", "", true), Newness::First);
        assert_eq!(compare("anything", "", false), Newness::First);
    }

    #[test]
    fn unparsable_candidate_is_rejected_when_semantic() {
        assert!(matches!(compare("1.2", "1.0.0", true), Newness::Unparsable { .. }));
        assert!(matches!(compare("latest", "", true), Newness::Unparsable { .. }));
    }

    #[test]
    fn unparsable_current_is_replaced() {
        assert_eq!(compare("1.0.0", "nightly", true), Newness::Newer);
    }

    #[test]
    fn non_semantic_means_any_change() {
        assert_eq!(compare("b", "a", false), Newness::Newer);
        assert_eq!(compare("a", "b", false), Newness::Newer);
        assert_eq!(compare("a", "a", false), Newness::NotNewer);
    }
}
