//! Shared test fixtures: sniffable sample images and scripted workers.
//!
//! The samples are not decodable images, just byte blobs with honest magic
//! numbers and a padded tail, which is all the engine looks at. Mock
//! workers operate on that tail so tests can script "shrinks", "refuses",
//! "copies unchanged", and "blows up" without any external binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::format::Format;
use crate::worker::{Options, Worker, WorkerError};

/// PNG signature plus an IHDR chunk with a nonzero trailer, so stripping
/// trailing zero padding can never eat into the header.
pub fn sample_png_bytes(padding: usize) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&[0; 13]);
    bytes.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
    bytes.extend(std::iter::repeat(0u8).take(padding));
    bytes
}

/// Header length of [`sample_png_bytes`]: everything before the padding.
pub const SAMPLE_PNG_HEADER_LEN: usize = 33;

/// Write a padded sample PNG into `dir` under a unique name.
pub fn sample_png(dir: &Path, padding: usize) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = dir.join(format!("sample-{n}.png"));
    fs::write(&path, sample_png_bytes(padding)).unwrap();
    path
}

enum Behavior {
    /// Drop trailing zero padding; refuses when there is none (so a
    /// second application is a no-op, like a real optimizer).
    StripPadding,
    /// Drop exactly one trailing byte while more than the header remains.
    TrimOneByte,
    /// Claim success but copy the bytes unchanged.
    Copy,
    /// Report "no improvement" without writing anything.
    Refuse,
    /// Fail with an IO error.
    Error,
}

/// A scripted [`Worker`] that records every `(src, dst)` pair it sees.
pub struct MockWorker {
    name: &'static str,
    formats: [Format; 1],
    run_order: i32,
    behavior: Behavior,
    options: Options,
    pub calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl MockWorker {
    fn new(name: &'static str, format: Format, behavior: Behavior) -> Self {
        MockWorker {
            name,
            formats: [format],
            run_order: 0,
            behavior,
            options: Options::empty(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn shrinker(name: &'static str, format: Format) -> Self {
        Self::new(name, format, Behavior::StripPadding)
    }

    pub fn trimmer(name: &'static str, format: Format) -> Self {
        Self::new(name, format, Behavior::TrimOneByte)
    }

    pub fn copier(name: &'static str, format: Format) -> Self {
        Self::new(name, format, Behavior::Copy)
    }

    pub fn refuser(name: &'static str, format: Format) -> Self {
        Self::new(name, format, Behavior::Refuse)
    }

    pub fn erroring(name: &'static str, format: Format) -> Self {
        Self::new(name, format, Behavior::Error)
    }

    pub fn run_order(mut self, order: i32) -> Self {
        self.run_order = order;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Worker for MockWorker {
    fn name(&self) -> &'static str {
        self.name
    }

    fn formats(&self) -> &[Format] {
        &self.formats
    }

    fn run_order(&self) -> i32 {
        self.run_order
    }

    fn used_bins(&self) -> &[&'static str] {
        &[]
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn optimize(&self, src: &Path, dst: &Path) -> Result<bool, WorkerError> {
        self.calls
            .lock()
            .unwrap()
            .push((src.to_path_buf(), dst.to_path_buf()));

        match self.behavior {
            Behavior::StripPadding => {
                let bytes = fs::read(src)?;
                let stripped = bytes.len() - bytes.iter().rev().take_while(|&&b| b == 0).count();
                if stripped == bytes.len() {
                    return Ok(false);
                }
                fs::write(dst, &bytes[..stripped])?;
                Ok(true)
            }
            Behavior::TrimOneByte => {
                let bytes = fs::read(src)?;
                if bytes.len() <= SAMPLE_PNG_HEADER_LEN - 1 {
                    return Ok(false);
                }
                fs::write(dst, &bytes[..bytes.len() - 1])?;
                Ok(true)
            }
            Behavior::Copy => {
                fs::copy(src, dst)?;
                Ok(true)
            }
            Behavior::Refuse => Ok(false),
            Behavior::Error => Err(WorkerError::Io(std::io::Error::other("scripted failure"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn shrinker_strips_padding_then_refuses() {
        let tmp = TempDir::new().unwrap();
        let src = sample_png(tmp.path(), 64);
        let dst = tmp.path().join("out.png");

        let worker = MockWorker::shrinker("s", Format::Png);
        assert!(worker.optimize(&src, &dst).unwrap());
        assert_eq!(
            fs::metadata(&dst).unwrap().len() as usize,
            SAMPLE_PNG_HEADER_LEN
        );

        // The stripped output is already at its fixpoint.
        let again = tmp.path().join("out2.png");
        assert!(!worker.optimize(&dst, &again).unwrap());

        assert_eq!(worker.call_count(), 2);
        assert_eq!(worker.calls.lock().unwrap()[0].0, src);
    }

    #[test]
    fn sample_png_bytes_sniff_as_png() {
        assert_eq!(
            crate::format::detect_bytes(&sample_png_bytes(16)),
            Some(Format::Png)
        );
    }
}
