//! Host API version parsing and compatibility checks.

use std::fmt;
use std::str::FromStr;

use crate::error::{PluginError, PluginResult};
use crate::plugin::PluginDescriptor;

/// The API version this host exposes to plugins.
pub const HOST_API_VERSION: &str = "1.0.0";

/// A three-part dotted API version.
///
/// Ordering is lexicographic over `(major, minor, patch)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
}

impl ApiVersion {
    /// Build a version from its three components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether this version sits inside the given bounds.
    ///
    /// Absent or empty bounds are unconstrained.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidVersionFormat`] if a bound fails to
    /// parse.
    pub fn is_compatible(&self, min: Option<&str>, max: Option<&str>) -> PluginResult<bool> {
        if let Some(min) = min.filter(|s| !s.is_empty()) {
            let min: Self = min.parse()?;
            if *self < min {
                return Ok(false);
            }
        }

        if let Some(max) = max.filter(|s| !s.is_empty()) {
            let max: Self = max.parse()?;
            if *self > max {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

impl FromStr for ApiVersion {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PluginError::InvalidVersionFormat(s.to_string());

        let mut parts = s.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
            patch: patch.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Validate a plugin's declared API version bounds against the host version.
///
/// A descriptor with no declared bounds always passes.
///
/// # Errors
///
/// Returns [`PluginError::InvalidVersionFormat`] if the host version or a
/// declared bound fails to parse, and [`PluginError::IncompatibleVersion`]
/// if the host version falls outside the declared range.
pub fn validate_compatibility(
    host_version: &str,
    descriptor: &PluginDescriptor,
) -> PluginResult<()> {
    let min = descriptor
        .min_api_version
        .as_deref()
        .filter(|s| !s.is_empty());
    let max = descriptor
        .max_api_version
        .as_deref()
        .filter(|s| !s.is_empty());

    if min.is_none() && max.is_none() {
        return Ok(());
    }

    let host: ApiVersion = host_version.parse()?;
    if host.is_compatible(min, max)? {
        return Ok(());
    }

    Err(PluginError::IncompatibleVersion {
        plugin_id: descriptor.id.clone(),
        required: format!("{}-{}", min.unwrap_or_default(), max.unwrap_or_default()),
        actual: host_version.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    fn descriptor(min: Option<&str>, max: Option<&str>) -> PluginDescriptor {
        PluginDescriptor {
            id: "subject".to_string(),
            min_api_version: min.map(String::from),
            max_api_version: max.map(String::from),
            ..PluginDescriptor::default()
        }
    }

    #[test]
    fn test_parse_three_parts() {
        let v: ApiVersion = "1.2.3".parse().unwrap();
        assert_eq!(v, ApiVersion::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "1", "1.2", "1.2.3.4", "a.b.c", "1.2.x", "1..3", "-1.0.0"] {
            let err = raw.parse::<ApiVersion>().unwrap_err();
            assert!(
                matches!(err, PluginError::InvalidVersionFormat(ref s) if s == raw),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let a: ApiVersion = "1.2.3".parse().unwrap();
        let b: ApiVersion = "1.3.0".parse().unwrap();
        let c: ApiVersion = "2.0.0".parse().unwrap();

        assert_eq!(a.cmp(&b), Ordering::Less);
        assert!(a < b && b < c);
        assert!(c > a);
        assert_eq!(a, "1.2.3".parse().unwrap());
    }

    #[test]
    fn test_is_compatible_within_bounds() {
        let v: ApiVersion = "1.5.0".parse().unwrap();
        assert!(v.is_compatible(Some("1.0.0"), Some("2.0.0")).unwrap());

        let v: ApiVersion = "2.1.0".parse().unwrap();
        assert!(!v.is_compatible(Some("1.0.0"), Some("2.0.0")).unwrap());

        let v: ApiVersion = "0.9.9".parse().unwrap();
        assert!(!v.is_compatible(Some("1.0.0"), None).unwrap());
    }

    #[test]
    fn test_is_compatible_bounds_inclusive() {
        let v: ApiVersion = "1.0.0".parse().unwrap();
        assert!(v.is_compatible(Some("1.0.0"), Some("1.0.0")).unwrap());
    }

    #[test]
    fn test_empty_bound_is_unconstrained() {
        let v: ApiVersion = "9.9.9".parse().unwrap();
        assert!(v.is_compatible(Some(""), Some("")).unwrap());
        assert!(v.is_compatible(None, None).unwrap());
    }

    #[test]
    fn test_invalid_bound_errors() {
        let v: ApiVersion = "1.0.0".parse().unwrap();
        let err = v.is_compatible(Some("not-a-version"), None).unwrap_err();
        assert!(matches!(err, PluginError::InvalidVersionFormat(_)));
    }

    #[test]
    fn test_validate_no_bounds_passes() {
        validate_compatibility("1.0.0", &descriptor(None, None)).unwrap();
    }

    #[test]
    fn test_validate_host_below_minimum_fails() {
        let err = validate_compatibility("1.0.0", &descriptor(Some("2.0.0"), None)).unwrap_err();
        match err {
            PluginError::IncompatibleVersion {
                plugin_id,
                required,
                actual,
            } => {
                assert_eq!(plugin_id, "subject");
                assert_eq!(required, "2.0.0-");
                assert_eq!(actual, "1.0.0");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_host_within_range_passes() {
        validate_compatibility("1.5.0", &descriptor(Some("1.0.0"), Some("2.0.0"))).unwrap();
    }

    #[test]
    fn test_validate_bad_host_version_fails() {
        let err = validate_compatibility("dev", &descriptor(Some("1.0.0"), None)).unwrap_err();
        assert!(matches!(err, PluginError::InvalidVersionFormat(ref s) if s == "dev"));
    }
}
