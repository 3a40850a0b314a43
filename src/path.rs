//! Filesystem plumbing shared by the handler and the engine.
//!
//! Temp files are always allocated next to the file they derive from (same
//! directory, same extension) so that cross-filesystem renames never come
//! up and optimizer tools that sniff extensions keep working. Allocation
//! creates the file exclusively, which makes concurrent allocation for the
//! same image collision-free.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Allocate a fresh temp file next to `src` with `src`'s extension.
///
/// The file is created empty and exclusively; the caller owns it and is
/// responsible for unlinking it.
pub fn temp_path_for(src: &Path) -> io::Result<PathBuf> {
    let dir = src.parent().filter(|p| !p.as_os_str().is_empty());
    temp_path_in(dir.unwrap_or_else(|| Path::new(".")), src)
}

/// Allocate a fresh temp file in `dir` with `src`'s extension.
pub fn temp_path_in(dir: &Path, src: &Path) -> io::Result<PathBuf> {
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let prefix = format!("{stem}.tmp.");
    let suffix = src.extension().map(|ext| format!(".{}", ext.to_string_lossy()));
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix);
    if let Some(ref suffix) = suffix {
        builder.suffix(suffix);
    }
    let (_, path) = builder.tempfile_in(dir)?.keep().map_err(|e| e.error)?;
    Ok(path)
}

/// Atomically replace `dst` with the contents of `with`.
///
/// A staging file is materialized in `dst`'s directory from `dst` itself
/// (so it inherits mode and, where the OS allows, ownership), rewritten
/// with `with`'s bytes, then renamed over `dst`. The rename is atomic
/// within one filesystem; on any failure the staging file is removed and
/// `dst` is left untouched.
pub fn atomic_replace(dst: &Path, with: &Path) -> io::Result<()> {
    let staged = temp_path_for(dst)?;
    let result = (|| {
        fs::copy(dst, &staged)?;
        write_over(&staged, with)?;
        fs::rename(&staged, dst)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&staged);
    }
    result
}

/// Truncate `dst` and fill it with `src`'s bytes, leaving `dst`'s own
/// metadata (mode, owner) alone.
fn write_over(dst: &Path, src: &Path) -> io::Result<()> {
    let mut reader = fs::File::open(src)?;
    let mut writer = fs::OpenOptions::new().write(true).truncate(true).open(dst)?;
    io::copy(&mut reader, &mut writer)?;
    writer.flush()
}

/// Copy bytes and permissions. Not atomic; `dst` is truncated if present.
pub fn copy_preserving(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst)?;
    Ok(())
}
