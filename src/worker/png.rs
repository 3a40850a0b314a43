//! PNG workers: pngquant, oxipng, optipng, pngcrush, advpng.
//!
//! Run order matters more here than anywhere else. pngquant goes first
//! because palette reduction changes the data the DEFLATE optimizers then
//! chew on; advpng goes last because its zopfli pass is only worth doing
//! on the final chunk layout.

use std::ffi::OsString;
use std::path::Path;

use super::options::{OptionDef, Options};
use super::{with_common_defs, wrote_smaller, BuildCtx, Invoker, Worker, WorkerClass, WorkerError};
use crate::format::Format;
use crate::path;

pub(crate) const PNGQUANT: WorkerClass = WorkerClass {
    name: "pngquant",
    bin: "pngquant",
    formats: &[Format::Png],
    run_order: -5,
    min_version: Some("2.0"),
    broken_versions: &[],
    defs: pngquant_defs,
    build: pngquant_build,
};

fn pngquant_defs() -> Vec<OptionDef> {
    with_common_defs(vec![
        OptionDef::bool(
            "allow_lossy",
            false,
            "permit quantization below the lossless floor",
        ),
        OptionDef::int(
            "quality",
            100,
            Some(0),
            Some(100),
            "minimum acceptable quality when allow_lossy is set",
        ),
        OptionDef::int("speed", 3, Some(1), Some(11), "speed/quality trade-off"),
    ])
}

fn pngquant_build(ctx: BuildCtx) -> Box<dyn Worker> {
    let min_quality = if ctx.options.get_bool("allow_lossy") {
        ctx.options.get_int("quality")
    } else {
        // Without allow_lossy only a perfect remap may pass, which still
        // wins on images that already fit a 256-color palette.
        100
    };
    Box::new(Pngquant {
        invoker: ctx.invoker(),
        min_quality,
        options: ctx.options,
    })
}

pub struct Pngquant {
    invoker: Invoker,
    min_quality: i64,
    options: Options,
}

impl Worker for Pngquant {
    fn name(&self) -> &'static str {
        "pngquant"
    }

    fn formats(&self) -> &[Format] {
        &[Format::Png]
    }

    fn run_order(&self) -> i32 {
        PNGQUANT.run_order
    }

    fn used_bins(&self) -> &[&'static str] {
        &["pngquant"]
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn optimize(&self, src: &Path, dst: &Path) -> Result<bool, WorkerError> {
        let args: Vec<OsString> = vec![
            format!("--quality={}-100", self.min_quality).into(),
            format!("--speed={}", self.options.get_int("speed")).into(),
            "--skip-if-larger".into(),
            "--force".into(),
            "--output".into(),
            dst.into(),
            src.into(),
        ];
        // Exit 99 means the quality floor was not met; that is a normal
        // "no improvement", not a failure.
        let ok = self.invoker.run(&args)?;
        Ok(ok && wrote_smaller(src, dst)?)
    }
}

pub(crate) const OXIPNG: WorkerClass = WorkerClass {
    name: "oxipng",
    bin: "oxipng",
    formats: &[Format::Png],
    run_order: 0,
    min_version: None,
    broken_versions: &[],
    defs: oxipng_defs,
    build: oxipng_build,
};

fn oxipng_defs() -> Vec<OptionDef> {
    with_common_defs(vec![
        OptionDef::int("level", 3, Some(0), Some(6), "optimization level"),
        OptionDef::enumerated(
            "strip",
            "safe",
            &["safe", "all", "none"],
            "which ancillary chunks to strip",
        ),
    ])
}

fn oxipng_build(ctx: BuildCtx) -> Box<dyn Worker> {
    Box::new(Oxipng {
        invoker: ctx.invoker(),
        options: ctx.options,
    })
}

pub struct Oxipng {
    invoker: Invoker,
    options: Options,
}

impl Worker for Oxipng {
    fn name(&self) -> &'static str {
        "oxipng"
    }

    fn formats(&self) -> &[Format] {
        &[Format::Png]
    }

    fn run_order(&self) -> i32 {
        OXIPNG.run_order
    }

    fn used_bins(&self) -> &[&'static str] {
        &["oxipng"]
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn optimize(&self, src: &Path, dst: &Path) -> Result<bool, WorkerError> {
        let mut args: Vec<OsString> = vec![
            "-q".into(),
            "--force".into(),
            "-o".into(),
            self.options.get_int("level").to_string().into(),
        ];
        match self.options.get_str("strip") {
            "none" => {}
            mode => {
                args.push("--strip".into());
                args.push(mode.into());
            }
        }
        args.push("--out".into());
        args.push(dst.into());
        args.push(src.into());

        let ok = self.invoker.run(&args)?;
        Ok(ok && wrote_smaller(src, dst)?)
    }
}

pub(crate) const OPTIPNG: WorkerClass = WorkerClass {
    name: "optipng",
    bin: "optipng",
    formats: &[Format::Png],
    run_order: 0,
    min_version: None,
    broken_versions: &[],
    defs: optipng_defs,
    build: optipng_build,
};

fn optipng_defs() -> Vec<OptionDef> {
    with_common_defs(vec![
        OptionDef::int("level", 6, Some(0), Some(7), "optimization level"),
        OptionDef::bool("strip", true, "strip all ancillary chunks"),
        OptionDef::bool("interlace", false, "write interlaced output"),
    ])
}

fn optipng_build(ctx: BuildCtx) -> Box<dyn Worker> {
    Box::new(Optipng {
        invoker: ctx.invoker(),
        options: ctx.options,
    })
}

pub struct Optipng {
    invoker: Invoker,
    options: Options,
}

impl Worker for Optipng {
    fn name(&self) -> &'static str {
        "optipng"
    }

    fn formats(&self) -> &[Format] {
        &[Format::Png]
    }

    fn run_order(&self) -> i32 {
        OPTIPNG.run_order
    }

    fn used_bins(&self) -> &[&'static str] {
        &["optipng"]
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn optimize(&self, src: &Path, dst: &Path) -> Result<bool, WorkerError> {
        let mut args: Vec<OsString> = vec![
            "-quiet".into(),
            "-clobber".into(),
            "-o".into(),
            self.options.get_int("level").to_string().into(),
            "-i".into(),
            if self.options.get_bool("interlace") {
                "1".into()
            } else {
                "0".into()
            },
        ];
        if self.options.get_bool("strip") {
            args.push("-strip".into());
            args.push("all".into());
        }
        args.push("-out".into());
        args.push(dst.into());
        args.push(src.into());

        let ok = self.invoker.run(&args)?;
        Ok(ok && wrote_smaller(src, dst)?)
    }
}

pub(crate) const PNGCRUSH: WorkerClass = WorkerClass {
    name: "pngcrush",
    bin: "pngcrush",
    formats: &[Format::Png],
    run_order: 1,
    min_version: None,
    broken_versions: &[],
    defs: pngcrush_defs,
    build: pngcrush_build,
};

fn pngcrush_defs() -> Vec<OptionDef> {
    with_common_defs(vec![
        OptionDef::list("chunks", &["alla"], "chunk groups passed to -rem"),
        OptionDef::bool("fix", false, "fix otherwise fatal conditions"),
        OptionDef::bool("brute", false, "try all 148 filter/strategy combinations"),
        OptionDef::bool("blacken", true, "zero fully-transparent pixels"),
    ])
}

fn pngcrush_build(ctx: BuildCtx) -> Box<dyn Worker> {
    Box::new(Pngcrush {
        invoker: ctx.invoker(),
        options: ctx.options,
    })
}

pub struct Pngcrush {
    invoker: Invoker,
    options: Options,
}

impl Worker for Pngcrush {
    fn name(&self) -> &'static str {
        "pngcrush"
    }

    fn formats(&self) -> &[Format] {
        &[Format::Png]
    }

    fn run_order(&self) -> i32 {
        PNGCRUSH.run_order
    }

    fn used_bins(&self) -> &[&'static str] {
        &["pngcrush"]
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn optimize(&self, src: &Path, dst: &Path) -> Result<bool, WorkerError> {
        let mut args: Vec<OsString> = vec!["-q".into(), "-reduce".into()];
        for chunk in self.options.get_list("chunks") {
            args.push("-rem".into());
            args.push(chunk.into());
        }
        if self.options.get_bool("fix") {
            args.push("-fix".into());
        }
        if self.options.get_bool("brute") {
            args.push("-brute".into());
        }
        if self.options.get_bool("blacken") {
            args.push("-blacken".into());
        }
        args.push(src.into());
        args.push(dst.into());

        let ok = self.invoker.run(&args)?;
        Ok(ok && wrote_smaller(src, dst)?)
    }
}

pub(crate) const ADVPNG: WorkerClass = WorkerClass {
    name: "advpng",
    bin: "advpng",
    formats: &[Format::Png],
    run_order: 10,
    min_version: None,
    broken_versions: &[],
    defs: advpng_defs,
    build: advpng_build,
};

fn advpng_defs() -> Vec<OptionDef> {
    with_common_defs(vec![OptionDef::int(
        "level",
        4,
        Some(0),
        Some(4),
        "compression level, 4 uses zopfli",
    )])
}

fn advpng_build(ctx: BuildCtx) -> Box<dyn Worker> {
    Box::new(Advpng {
        invoker: ctx.invoker(),
        options: ctx.options,
    })
}

/// advpng recompresses in place, so the source is copied to `dst` first.
pub struct Advpng {
    invoker: Invoker,
    options: Options,
}

impl Worker for Advpng {
    fn name(&self) -> &'static str {
        "advpng"
    }

    fn formats(&self) -> &[Format] {
        &[Format::Png]
    }

    fn run_order(&self) -> i32 {
        ADVPNG.run_order
    }

    fn used_bins(&self) -> &[&'static str] {
        &["advpng"]
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn optimize(&self, src: &Path, dst: &Path) -> Result<bool, WorkerError> {
        path::copy_preserving(src, dst)?;
        let args: Vec<OsString> = vec![
            "-z".into(),
            format!("-{}", self.options.get_int("level")).into(),
            "-q".into(),
            dst.into(),
        ];
        let ok = self.invoker.run(&args)?;
        Ok(ok && wrote_smaller(src, dst)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(defs: fn() -> Vec<OptionDef>, supplied: serde_json::Value) -> Options {
        let map = match supplied {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        };
        Options::build("test", &defs(), &map).unwrap()
    }

    #[test]
    fn pngquant_identity_survives_construction() {
        let ctx = BuildCtx {
            bin: "pngquant".into(),
            options: build(pngquant_defs, json!({"quality": 60})),
            default_timeout: None,
        };
        let worker = pngquant_build(ctx);
        assert_eq!(worker.name(), "pngquant");
        assert_eq!(worker.run_order(), -5);
        assert_eq!(worker.formats(), &[Format::Png]);
    }

    #[test]
    fn pngquant_allow_lossy_uses_configured_quality() {
        let options = build(pngquant_defs, json!({"allow_lossy": true, "quality": 60}));
        assert!(options.get_bool("allow_lossy"));
        assert_eq!(options.get_int("quality"), 60);
    }

    #[test]
    fn png_workers_cover_the_expected_order() {
        let mut orders: Vec<(i32, &str)> = [PNGQUANT, OXIPNG, OPTIPNG, PNGCRUSH, ADVPNG]
            .iter()
            .map(|c| (c.run_order, c.name))
            .collect();
        orders.sort();
        let names: Vec<&str> = orders.into_iter().map(|(_, n)| n).collect();
        assert_eq!(names, ["pngquant", "optipng", "oxipng", "pngcrush", "advpng"]);
    }

    #[test]
    fn advpng_level_is_clamped() {
        let options = build(advpng_defs, json!({"level": 9}));
        assert_eq!(options.get_int("level"), 4);
    }
}
