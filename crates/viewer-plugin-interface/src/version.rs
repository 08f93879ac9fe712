//! Interface version protocol.
//!
//! Catalog entries may declare the minimum interface version their
//! implementation was written against; the host checks it before registering.

use semver::Version;

/// Current interface crate version.
pub const INTERFACE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if a viewer's minimum interface version is compatible with the host.
///
/// # Compatibility rules
///
/// - Same major version required
/// - Host version must be >= the viewer's minimum version
///
/// # Returns
///
/// * `Ok(true)` - Versions are compatible
/// * `Ok(false)` - Versions are incompatible
/// * `Err(msg)` - Version string parsing failed
///
/// # Example
///
/// ```
/// use viewer_plugin_interface::is_version_compatible;
///
/// assert!(is_version_compatible("0.1.0", "0.2.0").unwrap());
/// assert!(!is_version_compatible("0.3.0", "0.2.0").unwrap());
/// assert!(!is_version_compatible("1.0.0", "0.9.0").unwrap());
/// ```
pub fn is_version_compatible(viewer_min_version: &str, host_version: &str) -> Result<bool, String> {
    let viewer_min = Version::parse(viewer_min_version)
        .map_err(|e| format!("Invalid viewer version '{}': {}", viewer_min_version, e))?;
    let host = Version::parse(host_version)
        .map_err(|e| format!("Invalid host version '{}': {}", host_version, e))?;

    Ok(host.major == viewer_min.major && host >= viewer_min)
}
