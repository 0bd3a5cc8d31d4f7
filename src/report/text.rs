use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use super::Reporter;

pub const TEXT_REPORT_FILE: &str = "report.txt";

/// Indented chain listing, written to `report.txt` and logged.
pub struct TextReporter {
    path: PathBuf,
    out: String,
    depth: usize,
}

impl TextReporter {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            path: output_dir.join(TEXT_REPORT_FILE),
            out: String::new(),
            depth: 0,
        }
    }
}

impl Reporter for TextReporter {
    fn name(&self) -> &'static str {
        "text"
    }

    fn begin_search(&mut self, term: &str, matched: &[String]) -> Result<()> {
        writeln!(self.out, "Search Results: {term}")?;
        writeln!(self.out, "Jars Matched")?;
        for jar in matched {
            writeln!(self.out, "{jar}")?;
        }
        writeln!(self.out)?;
        writeln!(self.out, "Class Chains")?;
        Ok(())
    }

    fn begin_chain(&mut self) -> Result<()> {
        self.depth = 0;
        Ok(())
    }

    fn mark_user_class(&mut self, _class: &str) -> Result<()> {
        Ok(())
    }

    fn link(&mut self, class: &str, _jars: &[String]) -> Result<()> {
        if self.depth > 0 {
            write!(self.out, "{}|_", " ".repeat(self.depth * 2))?;
        }
        writeln!(self.out, "{class}")?;
        self.depth += 1;
        Ok(())
    }

    fn end_chain(&mut self) -> Result<()> {
        writeln!(self.out)?;
        Ok(())
    }

    fn end_search(&mut self, _term: &str, _matched: &[String]) -> Result<()> {
        writeln!(self.out)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        info!("\n{}", self.out);
        std::fs::write(&self.path, &self.out)
            .with_context(|| format!("Failed to write text report: {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_dir;

    #[test]
    fn chains_are_indented_per_hop() -> Result<()> {
        let dir = temp_dir("text_report");
        std::fs::create_dir_all(&dir)?;
        let mut reporter = TextReporter::new(&dir);
        let matched = vec!["widgets.jar".to_string()];

        reporter.begin_search("widgets", &matched)?;
        reporter.begin_chain()?;
        reporter.mark_user_class("App")?;
        reporter.link("App", &[])?;
        reporter.link("lib.Mid", &[])?;
        reporter.link("lib.Widget", &[])?;
        reporter.end_chain()?;
        reporter.end_search("widgets", &matched)?;
        reporter.finish()?;

        let text = std::fs::read_to_string(dir.join(TEXT_REPORT_FILE))?;
        assert!(text.contains("Jars Matched\nwidgets.jar\n"));
        assert!(text.contains("App\n  |_lib.Mid\n    |_lib.Widget\n"));

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }
}
