//! Report sinks fed by the chain processor.
//!
//! Per search term a reporter sees `begin_search`, then for each chain
//! `begin_chain`, `mark_user_class`, one `link` per class and `end_chain`,
//! then `end_search`. `finish` is called once after the last term.

mod json;
mod text;
mod viz;

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::ReporterKind;

pub use json::JsonReporter;
pub use text::TextReporter;
pub use viz::VizReporter;

/// Owning archive label for a codebase class.
pub const USER_JAR: &str = "user";

pub trait Reporter: Send {
    fn name(&self) -> &'static str;

    fn begin_search(&mut self, term: &str, matched: &[String]) -> Result<()>;

    fn begin_chain(&mut self) -> Result<()>;

    fn mark_user_class(&mut self, class: &str) -> Result<()>;

    fn link(&mut self, class: &str, jars: &[String]) -> Result<()>;

    fn end_chain(&mut self) -> Result<()>;

    fn end_search(&mut self, term: &str, matched: &[String]) -> Result<()>;

    fn finish(&mut self) -> Result<()>;
}

pub fn create_reporter(kind: ReporterKind, output_dir: &Path) -> Result<Box<dyn Reporter>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
    Ok(match kind {
        ReporterKind::Json => Box::new(JsonReporter::new(output_dir)),
        ReporterKind::Text => Box::new(TextReporter::new(output_dir)),
        ReporterKind::Viz => Box::new(VizReporter::new(output_dir)),
    })
}

/// Turns a search term into something safe to use as a directory name.
pub(crate) fn term_slug(term: &str) -> String {
    let slug: String = term
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if slug.is_empty() || slug.chars().all(|c| c == '.') {
        "term".to_string()
    } else {
        slug
    }
}
