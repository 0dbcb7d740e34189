//! Version parsing for interpreters and installed packages.
//!
//! Two shapes of version show up during provisioning:
//!
//! * [`PythonVersion`]: a `<major>.<minor>` pair scraped from the free-form
//!   output of `python --version`. Anything that does not contain such a pair
//!   is unparseable, and the caller rejects that candidate instead of failing.
//! * [`PackageVersion`]: the dotted release number reported by
//!   `pip list`. Only the leading numeric components are compared; pre-release
//!   and local suffixes (`rc1`, `+cpu`) are ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

static MAJOR_MINOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\.(\d+)").expect("static regex is valid"));

/// A `<major>.<minor>` interpreter version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
}

impl PythonVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Scrape the first `<major>.<minor>` pair out of `output`.
    ///
    /// Returns `None` when nothing version-like is present, or when the
    /// numbers overflow `u32`.
    pub fn parse(output: &str) -> Option<Self> {
        let caps = MAJOR_MINOR.captures(output)?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        Some(Self { major, minor })
    }

    /// `true` when `self` is at least `minimum`.
    ///
    /// Equivalent to `major > min.major || (major == min.major && minor >= min.minor)`.
    pub fn satisfies(&self, minimum: PythonVersion) -> bool {
        self.major > minimum.major || (self.major == minimum.major && self.minor >= minimum.minor)
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A dotted numeric package release, e.g. `1.12.3`.
#[derive(Debug, Clone, Eq)]
pub struct PackageVersion {
    parts: Vec<u64>,
}

impl PackageVersion {
    /// A version from explicit release components, e.g. `&[1, 0, 0]`.
    pub fn new(parts: &[u64]) -> Self {
        Self {
            parts: parts.to_vec(),
        }
    }

    /// Parse the leading dotted numeric release of `s`.
    ///
    /// `"1.2.3rc1"` parses as `1.2.3`; `"2!1.0"` (epochs) and strings that
    /// start with a non-digit return `None`.
    ///
    /// Pre-releases are not ordered below their release: `1.0.0rc1` compares
    /// equal to `1.0.0`.
    pub fn parse(s: &str) -> Option<Self> {
        if s.contains('!') {
            return None;
        }
        let mut parts = Vec::new();
        for segment in s.trim().split('.') {
            let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                break;
            }
            parts.push(digits.parse().ok()?);
            if digits.len() != segment.len() {
                // suffix such as `0rc1` or `3+local` ends the release part
                break;
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(Self { parts })
        }
    }

    fn component(&self, i: usize) -> u64 {
        self.parts.get(i).copied().unwrap_or(0)
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        f.write_str(&joined.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cpython_banner() {
        assert_eq!(
            PythonVersion::parse("Python 3.13.1\n"),
            Some(PythonVersion::new(3, 13))
        );
    }

    #[test]
    fn parses_python2_stderr_banner() {
        assert_eq!(
            PythonVersion::parse("Python 2.7.18"),
            Some(PythonVersion::new(2, 7))
        );
    }

    #[test]
    fn unparseable_banner_is_none() {
        assert_eq!(PythonVersion::parse("command not understood"), None);
        assert_eq!(PythonVersion::parse(""), None);
    }

    #[test]
    fn minimum_version_check() {
        let min = PythonVersion::new(3, 8);
        assert!(PythonVersion::new(3, 13).satisfies(min));
        assert!(PythonVersion::new(3, 8).satisfies(min));
        assert!(PythonVersion::new(4, 0).satisfies(min));
        assert!(!PythonVersion::new(3, 7).satisfies(min));
        assert!(!PythonVersion::new(2, 9).satisfies(min));
    }

    #[test]
    fn package_version_ignores_suffixes() {
        let v = PackageVersion::parse("1.2.3rc1").unwrap();
        assert_eq!(v.to_string(), "1.2.3");
        assert_eq!(PackageVersion::parse("1.26.0+cpu").unwrap().to_string(), "1.26.0");
        assert!(PackageVersion::parse("dev").is_none());
    }

    #[test]
    fn package_version_rejects_epochs() {
        assert!(PackageVersion::parse("2!1.0").is_none());
        assert!(PackageVersion::parse("1!0.5.0").is_none());
    }

    #[test]
    fn pre_release_meets_its_release_minimum() {
        let minimum = PackageVersion::new(&[1, 0, 0]);
        assert!(PackageVersion::parse("1.0.0rc1").unwrap() >= minimum);
        assert!(PackageVersion::parse("0.9.9rc1").unwrap() < minimum);
    }

    #[test]
    fn package_version_pads_missing_components() {
        let a = PackageVersion::parse("1.0").unwrap();
        let b = PackageVersion::parse("1.0.0").unwrap();
        assert_eq!(a, b);
        assert!(PackageVersion::parse("1.10.0").unwrap() > PackageVersion::parse("1.9.9").unwrap());
        assert!(PackageVersion::parse("0.9").unwrap() < PackageVersion::parse("1.0.0").unwrap());
    }
}
