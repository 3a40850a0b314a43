//! Per-image optimization state machine.
//!
//! One Handler shepherds one image through its worker chain. It alternates
//! between two sibling temp files so a pipeline of any length allocates at
//! most two temps, and the original file is never written:
//!
//! ```text
//!   step    outcome   src   dst    result
//!   start             O     -      -
//!   1       fail      O     A      -        (A allocated, kept for reuse)
//!   2       ok        A     -      A        (first success: src moves off O)
//!   3       fail      A     B      A        (B allocated)
//!   4       ok        B     A      B        (roles swap)
//!   5       ok        A     B      A        (and swap again)
//! ```
//!
//! `result` always names the file holding the latest successful output and
//! is never the same file as `dst`, so a worker scribbling into `dst` can
//! never corrupt the best result so far. Temps are owned: `finish` unlinks
//! the non-result temp and hands the result to the caller, and `Drop`
//! unlinks whatever is still owned, so a panic or an early return cannot
//! leak files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::path;

pub struct Handler {
    original: PathBuf,
    src: PathBuf,
    dst: Option<PathBuf>,
    result: Option<PathBuf>,
}

impl Handler {
    pub fn new(original: &Path) -> Handler {
        Handler {
            original: original.to_path_buf(),
            src: original.to_path_buf(),
            dst: None,
            result: None,
        }
    }

    /// Current source for the next step: the original until a worker
    /// succeeds, the latest successful temp afterwards.
    pub fn src(&self) -> &Path {
        &self.src
    }

    /// Latest successful output, if any worker succeeded yet.
    pub fn result(&self) -> Option<&Path> {
        self.result.as_deref()
    }

    /// Run one worker step. Allocates the destination temp if none is
    /// banked, invokes `step(src, dst)`, and advances the state on success.
    pub fn process<F>(&mut self, step: F) -> io::Result<bool>
    where
        F: FnOnce(&Path, &Path) -> bool,
    {
        let dst = match self.dst.take() {
            Some(dst) => dst,
            None => path::temp_path_for(&self.original)?,
        };

        let improved = step(&self.src, &dst);
        if !improved {
            // Keep the allocation banked for the next step.
            self.dst = Some(dst);
            return Ok(false);
        }

        if self.src == self.original {
            // First success: the chain detaches from the original. The
            // second temp is allocated lazily by the next step.
            self.result = Some(dst.clone());
            self.src = dst;
        } else {
            // The former source is stale now; recycle it as the next dst.
            let stale = std::mem::replace(&mut self.src, dst.clone());
            self.result = Some(dst);
            self.dst = Some(stale);
        }
        Ok(true)
    }

    /// Unlink the non-result temp, if any. Idempotent.
    pub fn cleanup(&mut self) {
        if let Some(dst) = self.dst.take() {
            let _ = fs::remove_file(dst);
        }
    }

    /// Release everything except the result, which the caller now owns.
    pub fn finish(mut self) -> Option<PathBuf> {
        self.cleanup();
        self.result.take()
    }
}

impl Drop for Handler {
    fn drop(&mut self) {
        // Reached with temps still owned only on panic or early abandon.
        if let Some(dst) = self.dst.take() {
            let _ = fs::remove_file(dst);
        }
        if let Some(result) = self.result.take() {
            let _ = fs::remove_file(result);
        }
    }
}
