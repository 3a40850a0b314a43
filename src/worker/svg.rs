//! SVG worker: svgo.

use std::ffi::OsString;
use std::path::Path;

use super::options::{OptionDef, Options};
use super::{with_common_defs, wrote_smaller, BuildCtx, Invoker, Worker, WorkerClass, WorkerError};
use crate::format::Format;

pub(crate) const SVGO: WorkerClass = WorkerClass {
    name: "svgo",
    bin: "svgo",
    formats: &[Format::Svg],
    run_order: 0,
    min_version: None,
    broken_versions: &[],
    defs: svgo_defs,
    build: svgo_build,
};

fn svgo_defs() -> Vec<OptionDef> {
    with_common_defs(vec![
        OptionDef::list("disable_plugins", &[], "svgo plugins to disable"),
        OptionDef::list("enable_plugins", &[], "svgo plugins to enable"),
    ])
}

fn svgo_build(ctx: BuildCtx) -> Box<dyn Worker> {
    Box::new(Svgo {
        invoker: ctx.invoker(),
        options: ctx.options,
    })
}

pub struct Svgo {
    invoker: Invoker,
    options: Options,
}

impl Worker for Svgo {
    fn name(&self) -> &'static str {
        "svgo"
    }

    fn formats(&self) -> &[Format] {
        &[Format::Svg]
    }

    fn run_order(&self) -> i32 {
        SVGO.run_order
    }

    fn used_bins(&self) -> &[&'static str] {
        &["svgo"]
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn optimize(&self, src: &Path, dst: &Path) -> Result<bool, WorkerError> {
        let mut args: Vec<OsString> = Vec::new();
        for plugin in self.options.get_list("disable_plugins") {
            args.push(format!("--disable={plugin}").into());
        }
        for plugin in self.options.get_list("enable_plugins") {
            args.push(format!("--enable={plugin}").into());
        }
        args.push("-i".into());
        args.push(src.into());
        args.push("-o".into());
        args.push(dst.into());

        let ok = self.invoker.run(&args)?;
        Ok(ok && wrote_smaller(src, dst)?)
    }
}
