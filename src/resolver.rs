//! Locating and vetting the external optimizer binaries.
//!
//! Each worker names the binary it drives; the resolver turns that name
//! into an absolute path plus a probed version, checking an optional
//! `bin_dir` (vendored binaries, test stubs) before PATH. Results, hits
//! and misses alike, are memoized for the life of the resolver so a
//! missing tool is diagnosed once per process, not once per image.
//!
//! The engine owns its resolver; there is no ambient global. Tests that
//! need a clean slate call [`Resolver::reset`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::version::Version;

/// A resolved binary: where it lives, what it reports as its version, and
/// how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin {
    pub path: PathBuf,
    /// `None` when the binary refused the version probe or printed nothing
    /// parseable. Workers without a declared minimum accept that.
    pub version: Option<Version>,
    pub source: BinSource,
}

/// Where a binary was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinSource {
    /// The configured `bin_dir` override.
    BinDir,
    /// Ordinary PATH search.
    PathEnv,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("`{0}` not found in bin dir or PATH")]
    BinaryNotFound(String),
    #[error("`{name}` version {found} does not satisfy {requirement}")]
    BadVersion {
        name: String,
        found: String,
        requirement: String,
    },
    #[error("failed to probe `{name}`: {message}")]
    Probe { name: String, message: String },
}

/// Arguments used to coax a version string out of a binary. Most tools
/// answer `--version`; the exceptions are listed here.
fn probe_args(name: &str) -> &'static [&'static str] {
    match name {
        "pngcrush" => &["-version"],
        "jpegtran" => &["-version"],
        "advpng" => &["--version"],
        _ => &["--version"],
    }
}

pub struct Resolver {
    bin_dir: Option<PathBuf>,
    cache: Mutex<HashMap<String, Result<Bin, ResolveError>>>,
}

impl Resolver {
    pub fn new(bin_dir: Option<PathBuf>) -> Self {
        Resolver {
            bin_dir,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `name` to a binary, memoized. Failures are cached too.
    pub fn resolve(&self, name: &str) -> Result<Bin, ResolveError> {
        if let Some(cached) = self.cache.lock().unwrap().get(name) {
            return cached.clone();
        }
        let result = self.locate_and_probe(name);
        self.cache
            .lock()
            .unwrap()
            .insert(name.to_string(), result.clone());
        result
    }

    /// Resolve and enforce a minimum version and optional known-broken
    /// ranges (inclusive bounds).
    pub fn require(
        &self,
        name: &str,
        min: Option<&Version>,
        broken: &[(Version, Version)],
    ) -> Result<Bin, ResolveError> {
        let bin = self.resolve(name)?;
        let requirement_failed = |requirement: String| ResolveError::BadVersion {
            name: name.to_string(),
            found: bin
                .version
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            requirement,
        };
        if let Some(min) = min {
            match &bin.version {
                Some(found) if found >= min => {}
                _ => return Err(requirement_failed(format!(">= {min}"))),
            }
        }
        if let Some(found) = &bin.version {
            for (low, high) in broken {
                if found >= low && found <= high {
                    return Err(requirement_failed(format!(
                        "outside known-broken range {low}..={high}"
                    )));
                }
            }
        }
        Ok(bin)
    }

    /// Forget every cached result.
    pub fn reset(&self) {
        self.cache.lock().unwrap().clear();
    }

    fn locate_and_probe(&self, name: &str) -> Result<Bin, ResolveError> {
        let (path, source) = self
            .locate(name)
            .ok_or_else(|| ResolveError::BinaryNotFound(name.to_string()))?;
        let version = probe_version(name, &path);
        debug!(
            bin = name,
            path = %path.display(),
            version = version.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            "resolved binary"
        );
        Ok(Bin {
            path,
            version,
            source,
        })
    }

    fn locate(&self, name: &str) -> Option<(PathBuf, BinSource)> {
        if let Some(dir) = &self.bin_dir {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some((candidate, BinSource::BinDir));
            }
        }
        which::which(name).ok().map(|p| (p, BinSource::PathEnv))
    }
}

/// Run the binary's version probe and parse whatever it prints. Tools
/// disagree about stdout vs stderr and about exit codes, so both streams
/// are scanned and the status is ignored.
fn probe_version(name: &str, path: &Path) -> Option<Version> {
    let output = Command::new(path).args(probe_args(name)).output().ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Version::extract(&stdout).or_else(|| {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Version::extract(&stderr)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Drop a stub executable into `dir` that prints `banner` and exits.
    fn stub_bin(dir: &Path, name: &str, banner: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\necho \"{banner}\"\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    #[test]
    fn missing_binary_is_an_error() {
        let resolver = Resolver::new(None);
        let err = resolver.resolve("definitely-not-a-real-optimizer").unwrap_err();
        assert!(matches!(err, ResolveError::BinaryNotFound(_)));
    }

    #[test]
    fn bin_dir_wins_over_path() {
        let tmp = TempDir::new().unwrap();
        // `sh` certainly exists on PATH; the stub must shadow it.
        stub_bin(tmp.path(), "sh", "stub 1.0");

        let resolver = Resolver::new(Some(tmp.path().to_path_buf()));
        let bin = resolver.resolve("sh").unwrap();
        assert_eq!(bin.source, BinSource::BinDir);
        assert_eq!(bin.path, tmp.path().join("sh"));
    }

    #[test]
    fn probes_and_parses_the_version() {
        let tmp = TempDir::new().unwrap();
        stub_bin(tmp.path(), "optipng", "OptiPNG version 0.7.7");

        let resolver = Resolver::new(Some(tmp.path().to_path_buf()));
        let bin = resolver.resolve("optipng").unwrap();
        assert_eq!(bin.version, Some("0.7.7".parse().unwrap()));
    }

    #[test]
    fn results_are_memoized_until_reset() {
        let tmp = TempDir::new().unwrap();
        let path = stub_bin(tmp.path(), "gifsicle", "LCDF Gifsicle 1.94");
        let resolver = Resolver::new(Some(tmp.path().to_path_buf()));

        assert!(resolver.resolve("gifsicle").is_ok());

        // The binary vanishes; the cached result must survive.
        fs::remove_file(&path).unwrap();
        assert!(resolver.resolve("gifsicle").is_ok());

        resolver.reset();
        assert!(matches!(
            resolver.resolve("gifsicle"),
            Err(ResolveError::BinaryNotFound(_))
        ));
    }

    #[test]
    fn require_enforces_minimum_version() {
        let tmp = TempDir::new().unwrap();
        stub_bin(tmp.path(), "pngquant", "2.5.0 (January 2015)");
        let resolver = Resolver::new(Some(tmp.path().to_path_buf()));

        assert!(resolver
            .require("pngquant", Some(&"2.0".parse().unwrap()), &[])
            .is_ok());

        let err = resolver
            .require("pngquant", Some(&"3.0".parse().unwrap()), &[])
            .unwrap_err();
        assert!(matches!(err, ResolveError::BadVersion { .. }));
    }

    #[test]
    fn require_rejects_unknown_version_when_minimum_declared() {
        let tmp = TempDir::new().unwrap();
        stub_bin(tmp.path(), "svgo", "no digits at all");
        let resolver = Resolver::new(Some(tmp.path().to_path_buf()));

        let err = resolver
            .require("svgo", Some(&"1.0".parse().unwrap()), &[])
            .unwrap_err();
        assert!(matches!(err, ResolveError::BadVersion { found, .. } if found == "unknown"));
    }

    #[test]
    fn require_rejects_known_broken_ranges() {
        let tmp = TempDir::new().unwrap();
        stub_bin(tmp.path(), "advpng", "advancecomp v1.18");
        let resolver = Resolver::new(Some(tmp.path().to_path_buf()));

        let broken = [("1.18".parse().unwrap(), "1.18".parse().unwrap())];
        let err = resolver.require("advpng", None, &broken).unwrap_err();
        assert!(matches!(err, ResolveError::BadVersion { .. }));

        // Outside the range is fine.
        assert!(resolver
            .require("advpng", None, &[("9.0".parse().unwrap(), "9.1".parse().unwrap())])
            .is_ok());
    }
}
