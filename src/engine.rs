//! The optimization engine: format dispatch, ordered worker application,
//! and the optimize / replace / data entry points.
//!
//! An [`ImageOptim`] is built once from a [`Config`]: worker options are
//! validated, binaries are resolved and version-checked, and the surviving
//! workers are frozen into a single list sorted by `(run_order, discovery
//! index)`. Per image, the engine probes the format, picks the matching
//! workers, and threads them through a [`Handler`]; the result is returned
//! only when it is strictly smaller than the original.
//!
//! Failure policy, in one place: configuration problems fail eagerly at
//! construction; a missing binary demotes its worker to a logged skip
//! (unless the user explicitly asked for it); a worker that errors
//! mid-image is logged and counted as "no improvement"; an IO error is
//! fatal for that image only and becomes that input's result in batch
//! mode. The engine never re-encodes pixels itself, so whatever survives
//! to the output is byte-for-byte what a worker produced.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::config::{Config, ConfigError};
use crate::format::{self, Format};
use crate::handler::Handler;
use crate::path;
use crate::pool::{self, CancelFlag};
use crate::resolver::Resolver;
use crate::version::Version;
use crate::worker::{self, BuildCtx, Options, Worker};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cancelled before this input started")]
    Cancelled,
}

/// A successfully reduced image: where the smaller bytes live, which file
/// they came from, and how big that file was beforehand.
///
/// Invariant: `size()` is strictly less than `original_size`; the engine
/// returns `None` instead of an equal-size "win".
#[derive(Debug)]
pub struct Optimized {
    /// The optimized bytes. For [`ImageOptim::optimize`] this is a temp
    /// file the caller now owns; for [`ImageOptim::optimize_replace`] it
    /// is the original location.
    pub path: PathBuf,
    /// The input the optimization started from.
    pub original: PathBuf,
    /// Byte size of the original before any replacement.
    pub original_size: u64,
}

impl Optimized {
    pub fn size(&self) -> std::io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Bytes saved relative to the original.
    pub fn saved(&self) -> std::io::Result<u64> {
        Ok(self.original_size.saturating_sub(self.size()?))
    }
}

pub struct ImageOptim {
    /// All usable workers, sorted by `(run_order, discovery index)`.
    workers: Vec<Arc<dyn Worker>>,
    threads: usize,
    cancel: CancelFlag,
}

impl ImageOptim {
    /// Build an engine from composed configuration. Validates eagerly:
    /// unknown workers or options error here, not mid-batch.
    pub fn new(config: &Config) -> Result<ImageOptim, ConfigError> {
        let classes = worker::classes();
        config.check_worker_names(classes.iter().map(|c| c.name))?;

        let resolver = Resolver::new(config.bin_dir.clone());
        let default_timeout = config.timeout_duration();
        let mut workers: Vec<Arc<dyn Worker>> = Vec::new();

        for class in &classes {
            let settings = config.worker_settings(class.name);
            if !settings.enabled {
                continue;
            }
            let options = Options::build(class.name, &(class.defs)(), &settings.options)?;
            let min = class.min_version.and_then(|v| v.parse::<Version>().ok());
            let broken: Vec<(Version, Version)> = class
                .broken_versions
                .iter()
                .filter_map(|(low, high)| Some((low.parse().ok()?, high.parse().ok()?)))
                .collect();

            match resolver.require(class.bin, min.as_ref(), &broken) {
                Ok(bin) => {
                    let instance = (class.build)(BuildCtx {
                        bin: bin.path,
                        options,
                        default_timeout,
                    });
                    workers.push(Arc::from(instance));
                }
                Err(source) if settings.explicit => {
                    return Err(ConfigError::WorkerUnavailable {
                        worker: class.name.to_string(),
                        source,
                    });
                }
                Err(source) => {
                    warn!(worker = class.name, error = %source, "worker skipped");
                }
            }
        }

        Ok(ImageOptim::assemble(workers, config.threads))
    }

    /// Build an engine from an explicit worker list. This is the seam for
    /// custom workers and for tests; ordering rules are identical to
    /// [`ImageOptim::new`].
    pub fn with_workers(workers: Vec<Box<dyn Worker>>) -> ImageOptim {
        ImageOptim::assemble(workers.into_iter().map(Arc::from).collect(), None)
    }

    fn assemble(mut workers: Vec<Arc<dyn Worker>>, threads: Option<usize>) -> ImageOptim {
        // Stable sort: equal run orders keep discovery order.
        workers.sort_by_key(|w| w.run_order());
        ImageOptim {
            workers,
            threads: threads.unwrap_or_else(pool::default_threads),
            cancel: CancelFlag::new(),
        }
    }

    /// Override the batch pool width.
    pub fn with_threads(mut self, threads: usize) -> ImageOptim {
        self.threads = threads.max(1);
        self
    }

    /// The cooperative cancellation signal shared by all batch calls on
    /// this engine. Cancelling lets started images finish and records the
    /// rest as [`Error::Cancelled`].
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Workers that would run for one image of the given format, in
    /// application order.
    pub fn workers_for(&self, format: Format) -> Vec<Arc<dyn Worker>> {
        self.workers
            .iter()
            .filter(|w| w.formats().contains(&format))
            .cloned()
            .collect()
    }

    /// Optimize one image into a sibling temp file the caller owns.
    ///
    /// Returns `None` when the file is not a recognized image, no worker
    /// handles its format, or no worker managed to shrink it. The input
    /// file is never modified.
    pub fn optimize(&self, input: &Path) -> Result<Option<Optimized>, Error> {
        let Some(detected) = format::detect_path(input) else {
            return Ok(None);
        };
        let workers = self.workers_for(detected);
        if workers.is_empty() {
            warn!(path = %input.display(), format = %detected, "no worker available for format");
            return Ok(None);
        }

        let original_size = fs::metadata(input)?.len();
        let mut handler = Handler::new(input);
        for current in &workers {
            handler.process(|src, dst| match current.optimize(src, dst) {
                Ok(improved) => improved,
                Err(err) => {
                    warn!(worker = current.name(), path = %input.display(), error = %err, "worker failed");
                    false
                }
            })?;
        }

        let Some(result) = handler.finish() else {
            return Ok(None);
        };
        let size = match fs::metadata(&result) {
            Ok(meta) => meta.len(),
            Err(err) => {
                let _ = fs::remove_file(&result);
                return Err(err.into());
            }
        };
        if size < original_size {
            Ok(Some(Optimized {
                path: result,
                original: input.to_path_buf(),
                original_size,
            }))
        } else {
            let _ = fs::remove_file(&result);
            Ok(None)
        }
    }

    /// Optimize one image and atomically replace it in place.
    ///
    /// On success the returned [`Optimized::path`] is the original
    /// location and `original_size` the pre-replacement size. On `None`
    /// the file is untouched and no temp files remain.
    pub fn optimize_replace(&self, input: &Path) -> Result<Option<Optimized>, Error> {
        let Some(optimized) = self.optimize(input)? else {
            return Ok(None);
        };
        let replaced = path::atomic_replace(input, &optimized.path);
        let _ = fs::remove_file(&optimized.path);
        replaced?;
        Ok(Some(Optimized {
            path: input.to_path_buf(),
            original: input.to_path_buf(),
            original_size: optimized.original_size,
        }))
    }

    /// Optimize an in-memory image. Returns the smaller bytes, or `None`
    /// when the input is unrecognized or already as small as we can get
    /// it. No temp file outlives the call.
    pub fn optimize_data(&self, data: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let Some(detected) = format::detect_bytes(data) else {
            return Ok(None);
        };
        let stand_in = PathBuf::from(format!("blob.{}", detected.ext()));
        let carrier = path::temp_path_in(&env::temp_dir(), &stand_in)?;
        let outcome = (|| {
            fs::write(&carrier, data)?;
            match self.optimize(&carrier)? {
                Some(optimized) => {
                    let bytes = fs::read(&optimized.path);
                    let _ = fs::remove_file(&optimized.path);
                    Ok(Some(bytes?))
                }
                None => Ok(None),
            }
        })();
        let _ = fs::remove_file(&carrier);
        outcome
    }

    /// Optimize many images concurrently. Pairs come back in input order;
    /// see [`crate::pool`] for the full delivery contract.
    pub fn optimize_many<I>(&self, inputs: I) -> Vec<(PathBuf, Result<Option<Optimized>, Error>)>
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
        I::IntoIter: Send,
    {
        let inputs = inputs.into_iter().map(Into::into);
        pool::run(self.threads, inputs, |input: &PathBuf| {
            self.checked(|| self.optimize(input))
        })
    }

    /// [`ImageOptim::optimize_many`] with a callback invoked once per
    /// input, in completion order, on the calling thread. The returned
    /// values are in input order.
    pub fn optimize_many_with<I, R>(
        &self,
        inputs: I,
        mut callback: impl FnMut(&Path, &Result<Option<Optimized>, Error>) -> R,
    ) -> Vec<R>
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
        I::IntoIter: Send,
    {
        let inputs = inputs.into_iter().map(Into::into);
        pool::run_with(
            self.threads,
            inputs,
            |input: &PathBuf| self.checked(|| self.optimize(input)),
            |input, result| callback(&input, &result),
        )
    }

    /// Batch in-place replacement; same contract as [`ImageOptim::optimize_many`].
    pub fn optimize_many_replace<I>(
        &self,
        inputs: I,
    ) -> Vec<(PathBuf, Result<Option<Optimized>, Error>)>
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
        I::IntoIter: Send,
    {
        let inputs = inputs.into_iter().map(Into::into);
        pool::run(self.threads, inputs, |input: &PathBuf| {
            self.checked(|| self.optimize_replace(input))
        })
    }

    /// Batch in-place replacement with a callback; same contract as
    /// [`ImageOptim::optimize_many_with`].
    pub fn optimize_many_replace_with<I, R>(
        &self,
        inputs: I,
        mut callback: impl FnMut(&Path, &Result<Option<Optimized>, Error>) -> R,
    ) -> Vec<R>
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
        I::IntoIter: Send,
    {
        let inputs = inputs.into_iter().map(Into::into);
        pool::run_with(
            self.threads,
            inputs,
            |input: &PathBuf| self.checked(|| self.optimize_replace(input)),
            |input, result| callback(&input, &result),
        )
    }

    /// Optimize many in-memory images; pairs in input order.
    pub fn optimize_many_data<I>(&self, blobs: I) -> Vec<(Vec<u8>, Result<Option<Vec<u8>>, Error>)>
    where
        I: IntoIterator<Item = Vec<u8>>,
        I::IntoIter: Send,
    {
        pool::run(self.threads, blobs, |blob: &Vec<u8>| {
            self.checked(|| self.optimize_data(blob))
        })
    }

    /// Batch in-memory optimization with a callback; same contract as
    /// [`ImageOptim::optimize_many_with`].
    pub fn optimize_many_data_with<I, R>(
        &self,
        blobs: I,
        mut callback: impl FnMut(&[u8], &Result<Option<Vec<u8>>, Error>) -> R,
    ) -> Vec<R>
    where
        I: IntoIterator<Item = Vec<u8>>,
        I::IntoIter: Send,
    {
        pool::run_with(
            self.threads,
            blobs,
            |blob: &Vec<u8>| self.checked(|| self.optimize_data(blob)),
            |blob, result| callback(&blob, &result),
        )
    }

    fn checked<T>(&self, op: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        op()
    }
}
