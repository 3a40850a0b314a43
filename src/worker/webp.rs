//! WebP worker: cwebp.
//!
//! cwebp always re-encodes, so by default it runs in `-lossless` mode,
//! which is pixel-exact for the still images this crate handles. The
//! lossy path exists but is gated behind `allow_lossy`.

use std::ffi::OsString;
use std::path::Path;

use super::options::{OptionDef, Options};
use super::{with_common_defs, wrote_smaller, BuildCtx, Invoker, Worker, WorkerClass, WorkerError};
use crate::format::Format;

pub(crate) const CWEBP: WorkerClass = WorkerClass {
    name: "cwebp",
    bin: "cwebp",
    formats: &[Format::Webp],
    run_order: 0,
    min_version: None,
    broken_versions: &[],
    defs: cwebp_defs,
    build: cwebp_build,
};

fn cwebp_defs() -> Vec<OptionDef> {
    with_common_defs(vec![
        OptionDef::bool("allow_lossy", false, "permit lossy re-encoding"),
        OptionDef::int(
            "quality",
            75,
            Some(0),
            Some(100),
            "quality used only when allow_lossy is set",
        ),
        OptionDef::int(
            "method",
            6,
            Some(0),
            Some(6),
            "compression method, higher is slower and smaller",
        ),
    ])
}

fn cwebp_build(ctx: BuildCtx) -> Box<dyn Worker> {
    Box::new(Cwebp {
        invoker: ctx.invoker(),
        options: ctx.options,
    })
}

pub struct Cwebp {
    invoker: Invoker,
    options: Options,
}

impl Worker for Cwebp {
    fn name(&self) -> &'static str {
        "cwebp"
    }

    fn formats(&self) -> &[Format] {
        &[Format::Webp]
    }

    fn run_order(&self) -> i32 {
        CWEBP.run_order
    }

    fn used_bins(&self) -> &[&'static str] {
        &["cwebp"]
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn optimize(&self, src: &Path, dst: &Path) -> Result<bool, WorkerError> {
        let mut args: Vec<OsString> = vec![
            "-quiet".into(),
            "-m".into(),
            self.options.get_int("method").to_string().into(),
        ];
        if self.options.get_bool("allow_lossy") {
            args.push("-q".into());
            args.push(self.options.get_int("quality").to_string().into());
        } else {
            args.push("-lossless".into());
        }
        args.push(src.into());
        args.push("-o".into());
        args.push(dst.into());

        let ok = self.invoker.run(&args)?;
        Ok(ok && wrote_smaller(src, dst)?)
    }
}
