use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::Reporter;

pub const JSON_REPORT_FILE: &str = "dependency-relationships.json";

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchEntry {
    search_term: String,
    jars: Vec<String>,
    chains: Vec<ChainEntry>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainEntry {
    user_class: Option<String>,
    chain: Vec<LinkEntry>,
}

#[derive(Debug, Serialize)]
struct LinkEntry {
    class: String,
    jars: Vec<String>,
}

/// Collects every search and writes one JSON document on `finish`.
pub struct JsonReporter {
    path: PathBuf,
    searches: Vec<SearchEntry>,
    current: Option<SearchEntry>,
    chain: Option<ChainEntry>,
}

impl JsonReporter {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            path: output_dir.join(JSON_REPORT_FILE),
            searches: Vec::new(),
            current: None,
            chain: None,
        }
    }
}

impl Reporter for JsonReporter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn begin_search(&mut self, term: &str, matched: &[String]) -> Result<()> {
        self.current = Some(SearchEntry {
            search_term: term.to_string(),
            jars: matched.to_vec(),
            chains: Vec::new(),
        });
        Ok(())
    }

    fn begin_chain(&mut self) -> Result<()> {
        self.chain = Some(ChainEntry::default());
        Ok(())
    }

    fn mark_user_class(&mut self, class: &str) -> Result<()> {
        if let Some(chain) = self.chain.as_mut() {
            chain.user_class = Some(class.to_string());
        }
        Ok(())
    }

    fn link(&mut self, class: &str, jars: &[String]) -> Result<()> {
        let chain = self.chain.as_mut().context("link outside of a chain")?;
        chain.chain.push(LinkEntry {
            class: class.to_string(),
            jars: jars.to_vec(),
        });
        Ok(())
    }

    fn end_chain(&mut self) -> Result<()> {
        let chain = self.chain.take().context("chain ended twice")?;
        let search = self.current.as_mut().context("chain outside of a search")?;
        search.chains.push(chain);
        Ok(())
    }

    fn end_search(&mut self, _term: &str, matched: &[String]) -> Result<()> {
        let mut search = self.current.take().context("search ended twice")?;
        search.jars = matched.to_vec();
        self.searches.push(search);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.searches)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write JSON report: {}", self.path.display()))?;
        Ok(())
    }
}
