//! Versioning of data written by this crate (local cache and export files).

use crate::errors::{PriceError, PriceResult};

/// Current schema version for the local cache and export documents
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Validate that a stored version is compatible with the current schema.
///
/// The major version must match. Within 0.x, a newer minor version is also
/// rejected, since 0.x minors may break the format.
pub fn validate_version(found: &str) -> PriceResult<()> {
    let mismatch = || PriceError::VersionMismatch {
        found: found.to_string(),
        expected: SCHEMA_VERSION.to_string(),
    };

    let found_parts: Vec<u32> = found.split('.').filter_map(|p| p.trim().parse().ok()).collect();
    let current_parts: Vec<u32> =
        SCHEMA_VERSION.split('.').filter_map(|p| p.parse().ok()).collect();

    if found_parts.is_empty() || current_parts.is_empty() {
        return Err(mismatch());
    }

    if found_parts[0] != current_parts[0] {
        return Err(mismatch());
    }

    if current_parts[0] == 0
        && found_parts.len() > 1
        && current_parts.len() > 1
        && found_parts[1] > current_parts[1]
    {
        return Err(mismatch());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_validation() {
        assert!(validate_version(SCHEMA_VERSION).is_ok());
        assert!(validate_version("1.0").is_ok());
        assert!(validate_version("1.4.2").is_ok());

        assert!(validate_version("2.0.0").is_err());
        assert!(validate_version("0.9.0").is_err());
        assert!(validate_version("latest").is_err());
    }
}
