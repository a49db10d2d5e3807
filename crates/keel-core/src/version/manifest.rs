//! Schema version tags stored in manifest and snapshot files.

use crate::error::KeelError;

/// Schema version written into new manifests and snapshots.
pub const MANIFEST_VERSION: &str = "2.2";

/// Check a stored schema tag against [`MANIFEST_VERSION`].
///
/// The major component must match. A differing minor component is rejected
/// unless the stored tag omits it, which marks an older but migratable file.
pub fn check_manifest_version(found: &str) -> Result<(), KeelError> {
    let unsupported = || KeelError::UnsupportedManifestVersion {
        found: found.to_string(),
        supported: MANIFEST_VERSION.to_string(),
    };

    let (expected_major, expected_minor) = split_tag(MANIFEST_VERSION);
    let (major, minor) = split_tag(found.trim());

    if major.is_empty() || major != expected_major {
        return Err(unsupported());
    }
    match minor {
        None => Ok(()),
        Some(minor) if Some(minor) == expected_minor => Ok(()),
        Some(_) => Err(unsupported()),
    }
}

fn split_tag(tag: &str) -> (&str, Option<&str>) {
    match tag.split_once('.') {
        Some((major, minor)) => (major, Some(minor)),
        None => (tag, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_version_accepted() {
        assert!(check_manifest_version(MANIFEST_VERSION).is_ok());
    }

    #[test]
    fn test_missing_minor_is_migratable() {
        assert!(check_manifest_version("2").is_ok());
    }

    #[test]
    fn test_major_mismatch_rejected() {
        let err = check_manifest_version("1.2").unwrap_err();
        assert!(matches!(err, KeelError::UnsupportedManifestVersion { .. }));
        assert!(check_manifest_version("3").is_err());
    }

    #[test]
    fn test_minor_mismatch_rejected() {
        assert!(check_manifest_version("2.1").is_err());
        assert!(check_manifest_version("2.3").is_err());
    }

    #[test]
    fn test_empty_tag_rejected() {
        assert!(check_manifest_version("").is_err());
    }
}
