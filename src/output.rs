//! CLI report formatting.
//!
//! Split into `format_*` functions (return strings, unit testable) and a
//! `print_*` wrapper that writes to stdout.

use std::path::Path;

use crate::engine::{Error, Optimized};

/// One line per input: percentage saved, byte delta, path.
pub fn format_result(input: &Path, result: &Result<Option<Optimized>, Error>) -> String {
    match result {
        Ok(Some(optimized)) => {
            let size = optimized.size().unwrap_or(optimized.original_size);
            let saved = optimized.original_size.saturating_sub(size);
            let percent = if optimized.original_size > 0 {
                saved as f64 * 100.0 / optimized.original_size as f64
            } else {
                0.0
            };
            format!(
                "{percent:>6.2}%  {before} -> {after}  {path}",
                before = optimized.original_size,
                after = size,
                path = input.display()
            )
        }
        Ok(None) => format!("------  {}", input.display()),
        Err(err) => format!("!!      {}: {err}", input.display()),
    }
}

/// Totals across a batch: optimized count, skipped count, failures, and
/// bytes saved.
pub fn format_summary(results: &[(std::path::PathBuf, Result<Option<Optimized>, Error>)]) -> String {
    let mut optimized = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    let mut saved = 0u64;
    for (_, result) in results {
        match result {
            Ok(Some(o)) => {
                optimized += 1;
                saved += o.saved().unwrap_or(0);
            }
            Ok(None) => skipped += 1,
            Err(_) => failed += 1,
        }
    }
    let mut line = format!("Total: {optimized} optimized, {skipped} unchanged");
    if failed > 0 {
        line.push_str(&format!(", {failed} failed"));
    }
    line.push_str(&format!(", {saved} bytes saved"));
    line
}

pub fn print_report(results: &[(std::path::PathBuf, Result<Option<Optimized>, Error>)]) {
    for (input, result) in results {
        println!("{}", format_result(input, result));
    }
    println!("{}", format_summary(results));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn unchanged_line_has_placeholder_percent() {
        let line = format_result(Path::new("a.png"), &Ok(None));
        assert!(line.starts_with("------"));
        assert!(line.ends_with("a.png"));
    }

    #[test]
    fn error_line_carries_the_message() {
        let result = Err(Error::Cancelled);
        let line = format_result(Path::new("b.jpg"), &result);
        assert!(line.contains("b.jpg"));
        assert!(line.contains("cancelled"));
    }

    #[test]
    fn summary_counts_outcomes() {
        let results = vec![
            (PathBuf::from("a.png"), Ok(None)),
            (PathBuf::from("b.png"), Err(Error::Cancelled)),
        ];
        let summary = format_summary(&results);
        assert!(summary.contains("0 optimized"));
        assert!(summary.contains("1 unchanged"));
        assert!(summary.contains("1 failed"));
    }
}
