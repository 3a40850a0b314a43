//! GIF worker: gifsicle.

use std::ffi::OsString;
use std::path::Path;

use super::options::{OptionDef, Options};
use super::{with_common_defs, wrote_smaller, BuildCtx, Invoker, Worker, WorkerClass, WorkerError};
use crate::format::Format;

pub(crate) const GIFSICLE: WorkerClass = WorkerClass {
    name: "gifsicle",
    bin: "gifsicle",
    formats: &[Format::Gif],
    run_order: 0,
    min_version: None,
    broken_versions: &[],
    defs: gifsicle_defs,
    build: gifsicle_build,
};

fn gifsicle_defs() -> Vec<OptionDef> {
    with_common_defs(vec![
        OptionDef::int("level", 3, Some(1), Some(3), "-O optimization level"),
        OptionDef::enumerated(
            "interlace",
            "keep",
            &["keep", "on", "off"],
            "force interlacing on or off, or keep as-is",
        ),
        OptionDef::bool(
            "careful",
            false,
            "write larger but maximally compatible output",
        ),
    ])
}

fn gifsicle_build(ctx: BuildCtx) -> Box<dyn Worker> {
    Box::new(Gifsicle {
        invoker: ctx.invoker(),
        options: ctx.options,
    })
}

pub struct Gifsicle {
    invoker: Invoker,
    options: Options,
}

impl Worker for Gifsicle {
    fn name(&self) -> &'static str {
        "gifsicle"
    }

    fn formats(&self) -> &[Format] {
        &[Format::Gif]
    }

    fn run_order(&self) -> i32 {
        GIFSICLE.run_order
    }

    fn used_bins(&self) -> &[&'static str] {
        &["gifsicle"]
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn optimize(&self, src: &Path, dst: &Path) -> Result<bool, WorkerError> {
        let mut args: Vec<OsString> = vec![
            "--no-warnings".into(),
            format!("-O{}", self.options.get_int("level")).into(),
        ];
        match self.options.get_str("interlace") {
            "on" => args.push("--interlace".into()),
            "off" => args.push("--no-interlace".into()),
            _ => {}
        }
        if self.options.get_bool("careful") {
            args.push("--careful".into());
        }
        args.push("--output".into());
        args.push(dst.into());
        args.push(src.into());

        let ok = self.invoker.run(&args)?;
        Ok(ok && wrote_smaller(src, dst)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn interlace_mode_is_validated() {
        let map = match json!({"interlace": "maybe"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(Options::build("gifsicle", &gifsicle_defs(), &map).is_err());
    }
}
