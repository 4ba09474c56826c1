//! Input checks shared by all providers

use crate::error::{Error, Result};

const MAX_CLUSTER_NAME: usize = 50;

/// Cluster names become prefixes of cloud resource names and hostnames, so
/// they must be valid DNS labels with room for the suffixes we append.
pub fn validate_cluster_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_CLUSTER_NAME {
        return Err(Error::validation(
            "cluster name",
            format!("'{}' must be 1-{} characters", name, MAX_CLUSTER_NAME),
        ));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let starts_ok = name.starts_with(|c: char| c.is_ascii_alphanumeric());
    let ends_ok = name.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !(valid_chars && starts_ok && ends_ok) {
        return Err(Error::validation(
            "cluster name",
            format!(
                "'{}' must contain only lowercase letters, digits and '-', and start and end with a letter or digit",
                name
            ),
        ));
    }
    Ok(())
}

/// Reject `value` unless the provider lists it
pub fn ensure_member(kind: &'static str, value: &str, valid: &[String]) -> Result<()> {
    if valid.iter().any(|v| v == value) {
        Ok(())
    } else {
        Err(Error::validation(
            kind,
            format!("'{}' is not one of [{}]", value, valid.join(", ")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_names() {
        assert!(validate_cluster_name("demo").is_ok());
        assert!(validate_cluster_name("demo-01").is_ok());
        assert!(validate_cluster_name("").is_err());
        assert!(validate_cluster_name("Demo").is_err());
        assert!(validate_cluster_name("-demo").is_err());
        assert!(validate_cluster_name("demo-").is_err());
        assert!(validate_cluster_name("demo_1").is_err());
        assert!(validate_cluster_name(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_ensure_member() {
        let regions = vec!["LON1".to_string(), "NYC1".to_string()];
        assert!(ensure_member("region", "LON1", &regions).is_ok());
        let err = ensure_member("region", "MARS1", &regions).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid region: 'MARS1' is not one of [LON1, NYC1]"
        );
    }
}
