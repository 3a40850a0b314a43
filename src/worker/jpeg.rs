//! JPEG workers: jpegoptim and jpegtran.

use std::ffi::OsString;
use std::path::Path;

use super::options::{OptionDef, Options};
use super::{with_common_defs, wrote_smaller, BuildCtx, Invoker, Worker, WorkerClass, WorkerError};
use crate::format::Format;
use crate::path;

pub(crate) const JPEGOPTIM: WorkerClass = WorkerClass {
    name: "jpegoptim",
    bin: "jpegoptim",
    formats: &[Format::Jpeg],
    run_order: 0,
    min_version: None,
    broken_versions: &[],
    defs: jpegoptim_defs,
    build: jpegoptim_build,
};

fn jpegoptim_defs() -> Vec<OptionDef> {
    with_common_defs(vec![
        OptionDef::enumerated(
            "strip",
            "all",
            &["all", "comments", "exif", "iptc", "icc", "none"],
            "which metadata to strip",
        ),
        OptionDef::bool("allow_lossy", false, "permit recompression below max_quality"),
        OptionDef::int(
            "max_quality",
            100,
            Some(0),
            Some(100),
            "quality ceiling applied only when allow_lossy is set",
        ),
    ])
}

fn jpegoptim_build(ctx: BuildCtx) -> Box<dyn Worker> {
    Box::new(Jpegoptim {
        invoker: ctx.invoker(),
        options: ctx.options,
    })
}

/// jpegoptim rewrites files in place, so the source is copied to `dst`
/// first and the tool runs on the copy.
pub struct Jpegoptim {
    invoker: Invoker,
    options: Options,
}

impl Worker for Jpegoptim {
    fn name(&self) -> &'static str {
        "jpegoptim"
    }

    fn formats(&self) -> &[Format] {
        &[Format::Jpeg]
    }

    fn run_order(&self) -> i32 {
        JPEGOPTIM.run_order
    }

    fn used_bins(&self) -> &[&'static str] {
        &["jpegoptim"]
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn optimize(&self, src: &Path, dst: &Path) -> Result<bool, WorkerError> {
        path::copy_preserving(src, dst)?;

        let mut args: Vec<OsString> = vec!["-q".into()];
        match self.options.get_str("strip") {
            "none" => {}
            "all" => args.push("--strip-all".into()),
            section => args.push(format!("--strip-{section}").into()),
        }
        if self.options.get_bool("allow_lossy") {
            args.push(format!("--max={}", self.options.get_int("max_quality")).into());
        }
        args.push(dst.into());

        let ok = self.invoker.run(&args)?;
        Ok(ok && wrote_smaller(src, dst)?)
    }
}

pub(crate) const JPEGTRAN: WorkerClass = WorkerClass {
    name: "jpegtran",
    bin: "jpegtran",
    formats: &[Format::Jpeg],
    run_order: 5,
    min_version: None,
    broken_versions: &[],
    defs: jpegtran_defs,
    build: jpegtran_build,
};

fn jpegtran_defs() -> Vec<OptionDef> {
    with_common_defs(vec![
        OptionDef::bool("copy_chunks", false, "keep comments and EXIF markers"),
        OptionDef::bool("progressive", true, "write a progressive scan script"),
    ])
}

fn jpegtran_build(ctx: BuildCtx) -> Box<dyn Worker> {
    Box::new(Jpegtran {
        invoker: ctx.invoker(),
        options: ctx.options,
    })
}

/// Pure lossless Huffman re-pack; runs after jpegoptim to squeeze out
/// whatever the entropy coder left on the table.
pub struct Jpegtran {
    invoker: Invoker,
    options: Options,
}

impl Worker for Jpegtran {
    fn name(&self) -> &'static str {
        "jpegtran"
    }

    fn formats(&self) -> &[Format] {
        &[Format::Jpeg]
    }

    fn run_order(&self) -> i32 {
        JPEGTRAN.run_order
    }

    fn used_bins(&self) -> &[&'static str] {
        &["jpegtran"]
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn optimize(&self, src: &Path, dst: &Path) -> Result<bool, WorkerError> {
        let mut args: Vec<OsString> = vec![
            "-optimize".into(),
            "-copy".into(),
            if self.options.get_bool("copy_chunks") {
                "all".into()
            } else {
                "none".into()
            },
        ];
        if self.options.get_bool("progressive") {
            args.push("-progressive".into());
        }
        args.push("-outfile".into());
        args.push(dst.into());
        args.push(src.into());

        let ok = self.invoker.run(&args)?;
        Ok(ok && wrote_smaller(src, dst)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::options::Options;
    use serde_json::json;

    fn build_options(defs: fn() -> Vec<OptionDef>, supplied: serde_json::Value) -> Options {
        let map = match supplied {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        };
        Options::build("test", &defs(), &map).unwrap()
    }

    #[test]
    fn jpegoptim_defaults_are_lossless() {
        let options = build_options(jpegoptim_defs, json!({}));
        assert!(!options.get_bool("allow_lossy"));
        assert_eq!(options.get_str("strip"), "all");
    }

    #[test]
    fn jpegoptim_rejects_unknown_strip_section() {
        let map = match json!({"strip": "thumbnails"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(Options::build("jpegoptim", &jpegoptim_defs(), &map).is_err());
    }

    #[test]
    fn jpegtran_defaults_drop_metadata_and_go_progressive() {
        let options = build_options(jpegtran_defs, json!({}));
        assert!(!options.get_bool("copy_chunks"));
        assert!(options.get_bool("progressive"));
    }
}
