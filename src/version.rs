//! Lenient version numbers for external binaries.
//!
//! Optimizer tools print versions in wildly different shapes: `1.5.5`,
//! `jpegtran version 9e`, `pngcrush 1.8.13, uses libpng...`. We only need
//! enough structure to compare against a worker's declared minimum, so a
//! version is the first dotted run of numbers found in the probe output.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A dotted numeric version. Trailing zero components are normalized away
/// so `1.7` and `1.7.0` compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(Vec<u64>);

impl Version {
    pub fn new(parts: impl Into<Vec<u64>>) -> Self {
        let mut parts = parts.into();
        while parts.len() > 1 && parts.last() == Some(&0) {
            parts.pop();
        }
        Version(parts)
    }

    /// Extract the first dotted number from arbitrary tool output.
    /// Returns `None` when no digit appears at all.
    pub fn extract(text: &str) -> Option<Version> {
        let start = text.find(|c: char| c.is_ascii_digit())?;
        let rest = &text[start..];
        let end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        rest[..end].parse().ok()
    }

    pub fn parts(&self) -> &[u64] {
        &self.0
    }
}

impl FromStr for Version {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .trim_matches('.')
            .split('.')
            .map(str::parse)
            .collect::<Result<Vec<u64>, _>>()?;
        Ok(Version::new(parts))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Missing components count as zero: 1.7 < 1.7.1 but 1.7 == 1.7.0.
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_versions() {
        assert_eq!("1.5.5".parse::<Version>().unwrap().parts(), &[1, 5, 5]);
        assert_eq!("2".parse::<Version>().unwrap().parts(), &[2]);
    }

    #[test]
    fn extracts_from_tool_banners() {
        let v = Version::extract("pngcrush 1.8.13, uses libpng 1.6.37").unwrap();
        assert_eq!(v.parts(), &[1, 8, 13]);

        let v = Version::extract("version: 7.94").unwrap();
        assert_eq!(v.parts(), &[7, 94]);

        // Suffixes after the dotted run are ignored.
        let v = Version::extract("1.4.7-1ubuntu2").unwrap();
        assert_eq!(v.parts(), &[1, 4, 7]);
    }

    #[test]
    fn extract_without_digits_is_none() {
        assert_eq!(Version::extract("no numbers here"), None);
    }

    #[test]
    fn trailing_zeros_do_not_matter() {
        let a: Version = "1.7".parse().unwrap();
        let b: Version = "1.7.0".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ordering_is_componentwise() {
        let parse = |s: &str| s.parse::<Version>().unwrap();
        assert!(parse("1.7") < parse("1.7.1"));
        assert!(parse("2.0") > parse("1.9.9"));
        assert!(parse("0.7.6") < parse("0.10"));
    }
}
