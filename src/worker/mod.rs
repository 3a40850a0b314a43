//! Workers: adapters around external optimizer binaries.
//!
//! A worker wraps exactly one binary behind the uniform contract
//! `optimize(src, dst) -> bool`: true means `dst` now holds a valid image
//! that improves on `src` by the worker's own criterion (for every shipped
//! worker: strictly smaller). Workers hold no per-call state; concurrent
//! calls with distinct `(src, dst)` pairs do not interfere.
//!
//! The registry is the static [`classes`] list. A [`WorkerClass`] is the
//! declarative side (name, binary, formats, run order, option schema,
//! version requirements); [`WorkerClass::build`] produces the instance
//! once the binary is resolved and the options are validated. Effective
//! application order is `run_order` ascending, ties broken by position in
//! the registry list (stable).

pub mod options;

mod gif;
mod jpeg;
mod png;
mod svg;
mod webp;

pub use options::{OptionDef, OptionKind, Options};

use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::config;
use crate::format::Format;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("`{bin}` exceeded {timeout:?} and was killed")]
    Timeout { bin: String, timeout: Duration },
}

/// The uniform worker contract consumed by the engine.
pub trait Worker: Send + Sync {
    /// Stable identifier; also the config key.
    fn name(&self) -> &'static str;

    /// Formats this instance handles. Fixed at construction (it may have
    /// depended on options, but it never changes afterwards).
    fn formats(&self) -> &[Format];

    /// Application priority; lower runs earlier.
    fn run_order(&self) -> i32 {
        0
    }

    /// Binaries this worker shells out to.
    fn used_bins(&self) -> &[&'static str];

    /// The validated option map the instance was built with.
    fn options(&self) -> &Options;

    /// Try to write an improved version of `src` to `dst`.
    ///
    /// `Ok(false)` means the tool ran but produced no improvement; `Err`
    /// means the invocation itself broke (spawn failure, timeout). The
    /// engine treats both as "no improvement" and keeps going.
    fn optimize(&self, src: &Path, dst: &Path) -> Result<bool, WorkerError>;
}

/// Declarative side of a worker, registered in [`classes`].
#[derive(Clone, Copy)]
pub struct WorkerClass {
    pub name: &'static str,
    /// Primary binary, resolved before construction.
    pub bin: &'static str,
    /// Nominal formats, for documentation; the instance's `formats()` is
    /// authoritative.
    pub formats: &'static [Format],
    /// Application priority. The engine sorts by the instance's
    /// `run_order()`; every adapter reads this constant back, and the
    /// registry test holds the two together.
    pub run_order: i32,
    pub min_version: Option<&'static str>,
    /// Inclusive version ranges known to corrupt output.
    pub broken_versions: &'static [(&'static str, &'static str)],
    pub defs: fn() -> Vec<OptionDef>,
    pub build: fn(BuildCtx) -> Box<dyn Worker>,
}

/// Everything a worker needs at construction time.
pub struct BuildCtx {
    pub bin: PathBuf,
    pub options: Options,
    /// Engine-wide timeout; the worker's own `timeout` option wins.
    pub default_timeout: Option<Duration>,
}

impl BuildCtx {
    pub(crate) fn invoker(&self) -> Invoker {
        let own = config::duration_from_secs(Some(self.options.get_float("timeout")));
        Invoker::new(self.bin.clone(), own.or(self.default_timeout))
    }
}

/// All built-in worker classes, in discovery order.
pub fn classes() -> Vec<WorkerClass> {
    vec![
        jpeg::JPEGOPTIM,
        jpeg::JPEGTRAN,
        png::PNGQUANT,
        png::OXIPNG,
        png::OPTIPNG,
        png::PNGCRUSH,
        png::ADVPNG,
        gif::GIFSICLE,
        svg::SVGO,
        webp::CWEBP,
    ]
}

/// Options every worker accepts, appended to each class's own schema.
pub(crate) fn with_common_defs(mut defs: Vec<OptionDef>) -> Vec<OptionDef> {
    defs.push(OptionDef::float(
        "timeout",
        0.0,
        "wall-clock budget for one invocation in seconds, 0 for no limit",
    ));
    defs
}

/// True when `dst` exists, is non-empty, and is strictly smaller than
/// `src`: the success criterion shared by all shipped workers.
pub(crate) fn wrote_smaller(src: &Path, dst: &Path) -> Result<bool, WorkerError> {
    let src_len = fs::metadata(src)?.len();
    let dst_len = match fs::metadata(dst) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(false),
    };
    Ok(dst_len > 0 && dst_len < src_len)
}

/// Shared child-process runner: spawns the binary with stdio detached
/// from the terminal, drains its output, and optionally enforces a
/// wall-clock budget by killing the child.
pub(crate) struct Invoker {
    bin: PathBuf,
    timeout: Option<Duration>,
}

impl Invoker {
    pub fn new(bin: PathBuf, timeout: Option<Duration>) -> Self {
        Invoker { bin, timeout }
    }

    /// Run to completion; `Ok(true)` iff the exit status was success.
    /// A nonzero exit is logged at debug level, not an error: several
    /// tools use it to signal "no improvement possible".
    pub fn run(&self, args: &[OsString]) -> Result<bool, WorkerError> {
        let started = Instant::now();
        let mut child = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes on the side so a chatty tool can't deadlock
        // against a full pipe buffer while we wait.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.timeout {
            None => child.wait()?,
            Some(timeout) => {
                let deadline = started + timeout;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(WorkerError::Timeout {
                            bin: self.bin.display().to_string(),
                            timeout,
                        });
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        };

        let _ = stdout.join();
        let stderr = stderr.join().unwrap_or_default();
        if !status.success() {
            debug!(
                bin = %self.bin.display(),
                status = %status,
                stderr = %String::from_utf8_lossy(&stderr),
                elapsed = ?started.elapsed(),
                "tool exited without success"
            );
        }
        Ok(status.success())
    }
}

fn drain(pipe: Option<impl Read + Send + 'static>) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}
