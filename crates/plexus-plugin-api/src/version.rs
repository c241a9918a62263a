//! Lenient version comparison
//!
//! Versions are compared on their leading numeric part only: everything from
//! the first character that is neither a digit nor a dot is ignored, so
//! pre-release and build suffixes never influence ordering. `1.0.0` and
//! `1.0.0-SNAPSHOT` are the same version here, and `1.0` equals `1.0.0`.

use std::cmp::Ordering;

/// Compare two version strings
///
/// # Example
///
/// ```
/// use plexus_plugin_api::version::compare_versions;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_versions("1.0.0", "1.0.0-rc1"), Ordering::Equal);
/// assert_eq!(compare_versions("2.0.0", "1.9.9"), Ordering::Greater);
/// ```
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).copied().unwrap_or("0");
        let r = right.get(i).copied().unwrap_or("0");
        match compare_segment(l, r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    Ordering::Equal
}

/// Numeric prefix of a version (`"2.1.0-beta"` -> `"2.1.0"`)
pub fn numeric_prefix(version: &str) -> &str {
    let end = version
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(version.len());
    &version[..end]
}

fn segments(version: &str) -> Vec<&str> {
    let prefix = numeric_prefix(version);
    if prefix.is_empty() {
        return Vec::new();
    }
    prefix.split('.').collect()
}

// Segments are compared as decimal strings so arbitrarily long components
// never overflow.
fn compare_segment(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
