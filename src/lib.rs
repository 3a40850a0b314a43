//! # image-optim
//!
//! Lossless image size reduction by orchestrating external optimizer
//! binaries (jpegoptim, jpegtran, pngquant, oxipng, optipng, pngcrush,
//! advpng, gifsicle, svgo, cwebp). For each image the engine runs every
//! applicable tool in a fixed order through a shared two-temp-file
//! pipeline and keeps the smallest result, returning it only when it is
//! strictly smaller than the original. The engine never decodes or
//! re-encodes pixels itself; lossless-ness is the contract of the tools it
//! drives, with every lossy mode gated behind explicit options.
//!
//! # Architecture
//!
//! ```text
//! input path -> format probe -> workers for format, ordered
//!            -> Handler loop (src/dst temp alternation)
//!            -> strictly smaller? Optimized : None
//! ```
//!
//! Batches run image-parallel, worker-sequential: different images spread
//! over a bounded thread pool, while the workers for one image always run
//! one after another in `(run_order, discovery order)`.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Worker selection, the optimize / replace / data entry points |
//! | [`worker`] | The `Worker` trait, option schemas, and the built-in adapters |
//! | [`handler`] | Per-image double-buffer state machine owning the temp files |
//! | [`pool`] | Bounded parallel driver with cooperative cancellation |
//! | [`resolver`] | Binary lookup, version probing, per-process memoization |
//! | [`format`] | Magic-byte format detection |
//! | [`config`] | Layered configuration (defaults, file, inline) |
//! | [`path`] | Sibling temp allocation, atomic replace |
//! | [`output`] | CLI report formatting |
//!
//! # Quick Start
//!
//! ```no_run
//! use image_optim::{Config, ImageOptim};
//! use std::path::Path;
//!
//! let engine = ImageOptim::new(&Config::default())?;
//! if let Some(optimized) = engine.optimize_replace(Path::new("logo.png"))? {
//!     println!("saved {} bytes", optimized.saved()?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The crate-level functions ([`optimize_image`] and friends) do the same
//! through a process-wide engine built once from default configuration,
//! for callers that do not need to tune anything.

pub mod config;
pub mod engine;
pub mod format;
pub mod handler;
pub mod output;
pub mod path;
pub mod pool;
pub mod resolver;
pub mod version;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::{Config, ConfigError};
pub use engine::{Error, ImageOptim, Optimized};
pub use format::Format;
pub use pool::CancelFlag;
pub use worker::{Worker, WorkerError};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

/// Process-wide engine used by the crate-level convenience functions.
/// Built lazily from `Config::default()`; [`reset_default_engine`] drops
/// it so tests (or a config change) can start over.
static DEFAULT_ENGINE: OnceLock<Mutex<Option<Arc<ImageOptim>>>> = OnceLock::new();

fn default_engine() -> Result<Arc<ImageOptim>, Error> {
    let cell = DEFAULT_ENGINE.get_or_init(|| Mutex::new(None));
    let mut slot = cell.lock().unwrap();
    if let Some(engine) = slot.as_ref() {
        return Ok(engine.clone());
    }
    let engine = Arc::new(ImageOptim::new(&Config::default())?);
    *slot = Some(engine.clone());
    Ok(engine)
}

/// Drop the process-wide engine so the next call rebuilds it (and re-runs
/// binary resolution).
pub fn reset_default_engine() {
    if let Some(cell) = DEFAULT_ENGINE.get() {
        *cell.lock().unwrap() = None;
    }
}

/// Optimize one image into a temp file the caller owns. See
/// [`ImageOptim::optimize`].
pub fn optimize_image(path: impl AsRef<Path>) -> Result<Option<Optimized>, Error> {
    default_engine()?.optimize(path.as_ref())
}

/// Optimize one image in place. See [`ImageOptim::optimize_replace`].
pub fn optimize_image_replace(path: impl AsRef<Path>) -> Result<Option<Optimized>, Error> {
    default_engine()?.optimize_replace(path.as_ref())
}

/// Optimize in-memory image bytes. See [`ImageOptim::optimize_data`].
pub fn optimize_image_data(data: &[u8]) -> Result<Option<Vec<u8>>, Error> {
    default_engine()?.optimize_data(data)
}

/// Optimize many images concurrently; input-order pairs. See
/// [`ImageOptim::optimize_many`].
pub fn optimize_images<I>(
    paths: I,
) -> Result<Vec<(PathBuf, Result<Option<Optimized>, Error>)>, Error>
where
    I: IntoIterator,
    I::Item: Into<PathBuf>,
    I::IntoIter: Send,
{
    Ok(default_engine()?.optimize_many(paths))
}

/// Batch in-place replacement. See [`ImageOptim::optimize_many_replace`].
pub fn optimize_images_replace<I>(
    paths: I,
) -> Result<Vec<(PathBuf, Result<Option<Optimized>, Error>)>, Error>
where
    I: IntoIterator,
    I::Item: Into<PathBuf>,
    I::IntoIter: Send,
{
    Ok(default_engine()?.optimize_many_replace(paths))
}

/// Optimize many in-memory images. See [`ImageOptim::optimize_many_data`].
pub fn optimize_images_data<I>(
    blobs: I,
) -> Result<Vec<(Vec<u8>, Result<Option<Vec<u8>>, Error>)>, Error>
where
    I: IntoIterator<Item = Vec<u8>>,
    I::IntoIter: Send,
{
    Ok(default_engine()?.optimize_many_data(blobs))
}

/// [`optimize_images`] with a per-input callback. See
/// [`ImageOptim::optimize_many_with`] for the delivery contract.
pub fn optimize_images_with<I, R>(
    paths: I,
    callback: impl FnMut(&Path, &Result<Option<Optimized>, Error>) -> R,
) -> Result<Vec<R>, Error>
where
    I: IntoIterator,
    I::Item: Into<PathBuf>,
    I::IntoIter: Send,
{
    Ok(default_engine()?.optimize_many_with(paths, callback))
}

/// [`optimize_images_replace`] with a per-input callback.
pub fn optimize_images_replace_with<I, R>(
    paths: I,
    callback: impl FnMut(&Path, &Result<Option<Optimized>, Error>) -> R,
) -> Result<Vec<R>, Error>
where
    I: IntoIterator,
    I::Item: Into<PathBuf>,
    I::IntoIter: Send,
{
    Ok(default_engine()?.optimize_many_replace_with(paths, callback))
}

/// [`optimize_images_data`] with a per-input callback.
pub fn optimize_images_data_with<I, R>(
    blobs: I,
    callback: impl FnMut(&[u8], &Result<Option<Vec<u8>>, Error>) -> R,
) -> Result<Vec<R>, Error>
where
    I: IntoIterator<Item = Vec<u8>>,
    I::IntoIter: Send,
{
    Ok(default_engine()?.optimize_many_data_with(blobs, callback))
}
