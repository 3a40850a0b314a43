//! Image format detection by content sniffing.
//!
//! The file extension is never consulted: a `.png` that actually contains
//! JPEG data is optimized as a JPEG. Detection reads the leading bytes of
//! the file and classifies by magic numbers (or, for SVG, by a textual
//! probe of the leading chunk).
//!
//! Malformed input never produces an error. A file whose magic matches but
//! whose header is clearly truncated (a bare `\xFF\xD8`, a PNG signature
//! with nothing after it) logs one warning and classifies as unrecognized,
//! so callers skip the file instead of feeding garbage to the optimizers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// How many leading bytes are inspected. Binary magics need a few dozen;
/// SVG needs room for an XML prolog and DOCTYPE before the `<svg` tag.
const SNIFF_LEN: usize = 512;

/// A recognized image container, independent of file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Jpeg,
    Png,
    Gif,
    Svg,
    Webp,
}

impl Format {
    /// All recognized formats, in a stable order.
    pub const ALL: [Format; 5] = [
        Format::Jpeg,
        Format::Png,
        Format::Gif,
        Format::Svg,
        Format::Webp,
    ];

    /// Canonical file extension for the format (without the dot).
    pub fn ext(self) -> &'static str {
        match self {
            Format::Jpeg => "jpg",
            Format::Png => "png",
            Format::Gif => "gif",
            Format::Svg => "svg",
            Format::Webp => "webp",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ext())
    }
}

/// Classify a file by its leading bytes. Unreadable files log a warning and
/// classify as unrecognized rather than erroring: the probe is advisory and
/// the caller decides what a skipped file means.
pub fn detect_path(path: &Path) -> Option<Format> {
    let mut buf = [0u8; SNIFF_LEN];
    let len = match read_prefix(path, &mut buf) {
        Ok(len) => len,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not read file for format detection");
            return None;
        }
    };
    detect_bytes(&buf[..len])
}

fn read_prefix(path: &Path, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut file = File::open(path)?;
    let mut len = 0;
    // Loop because a single read may return short on pipes/odd filesystems.
    while len < buf.len() {
        let n = file.read(&mut buf[len..])?;
        if n == 0 {
            break;
        }
        len += n;
    }
    Ok(len)
}

/// Classify a byte buffer. Same contract as [`detect_path`]: truncated
/// headers warn once and return `None`.
pub fn detect_bytes(bytes: &[u8]) -> Option<Format> {
    if let Some(found) = match_jpeg(bytes) {
        return found;
    }
    if let Some(found) = match_png(bytes) {
        return found;
    }
    if let Some(found) = match_gif(bytes) {
        return found;
    }
    if let Some(found) = match_webp(bytes) {
        return found;
    }
    match_svg(bytes)
}

// Each matcher returns:
//   None             - magic absent, try the next format
//   Some(Some(f))    - recognized
//   Some(None)       - magic present but header truncated/corrupt (warned)

fn match_jpeg(bytes: &[u8]) -> Option<Option<Format>> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    // A real JPEG continues with a marker byte right after SOI.
    if bytes.len() < 3 || bytes[2] != 0xFF {
        warn!("JPEG start-of-image marker with no segment data, skipping");
        return Some(None);
    }
    Some(Some(Format::Jpeg))
}

fn match_png(bytes: &[u8]) -> Option<Option<Format>> {
    const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
    if !bytes.starts_with(&SIGNATURE[..bytes.len().min(SIGNATURE.len())]) || bytes.is_empty() {
        return None;
    }
    if bytes.len() < SIGNATURE.len() {
        return None;
    }
    // The first chunk must be IHDR: 4-byte length, 4-byte type.
    if bytes.len() < 16 || &bytes[12..16] != b"IHDR" {
        warn!("PNG signature with truncated or corrupt header, skipping");
        return Some(None);
    }
    Some(Some(Format::Png))
}

fn match_gif(bytes: &[u8]) -> Option<Option<Format>> {
    if !bytes.starts_with(b"GIF") {
        return None;
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(Some(Format::Gif));
    }
    warn!("GIF magic with unknown version block, skipping");
    Some(None)
}

fn match_webp(bytes: &[u8]) -> Option<Option<Format>> {
    if !bytes.starts_with(b"RIFF") {
        return None;
    }
    if bytes.len() < 12 {
        warn!("RIFF header too short to carry a WebP chunk, skipping");
        return Some(None);
    }
    if &bytes[8..12] == b"WEBP" {
        Some(Some(Format::Webp))
    } else {
        // A RIFF container of some other kind (WAV, AVI): not an image,
        // not corrupt either.
        None
    }
}

fn match_svg(bytes: &[u8]) -> Option<Format> {
    // SVG is text; tolerate a UTF-8 BOM, leading whitespace, an XML prolog
    // and comments/DOCTYPE before the root element.
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with("<svg") {
        return Some(Format::Svg);
    }
    if (trimmed.starts_with("<?xml") || trimmed.starts_with("<!DOCTYPE svg"))
        && trimmed.contains("<svg")
    {
        return Some(Format::Svg);
    }
    None
}
