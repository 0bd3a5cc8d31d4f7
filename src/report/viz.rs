use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::{Reporter, term_slug};
use crate::model::archive_file_name;

pub const VIZ_DATA_FILE: &str = "visualization-data.js";
pub const VIZ_INDEX_FILE: &str = "index.html";
const TERM_PAGE_FILE: &str = "graph.html";

const USER_CLUSTER: u32 = 1;
const USER_CLUSTER_LABEL: &str = "user classes";

const STYLE: &str = ".col-container{display:flex;width:100%}.col{flex:1;padding:16px}";

const TERM_PAGE: &str = r#"<html>
<head><title>TPLA Graph</title><script src="visualization-data.js"></script></head>
<body>
<h3 id="title"></h3>
<table border="1" id="nodes"><tr><th>id</th><th>cluster</th><th>class</th><th>jar</th></tr></table>
<h4>edges</h4>
<ul id="edges"></ul>
<script>
var byId = {};
data.nodes.forEach(function (n) {
  byId[n.id] = n;
  var row = document.getElementById("nodes").insertRow();
  [n.id, n.cluster, n.name, n.jar].forEach(function (v) { row.insertCell().textContent = v; });
});
data.edges.forEach(function (e) {
  var li = document.createElement("li");
  li.textContent = byId[e.source].name + " -> " + byId[e.target].name;
  document.getElementById("edges").appendChild(li);
});
document.getElementById("title").textContent = data.searchTerm;
</script>
</body>
</html>
"#;

#[derive(Debug, Serialize)]
struct VizNode {
    id: u32,
    cluster: u32,
    name: String,
    jar: String,
}

#[derive(Debug, Serialize)]
struct VizEdge {
    source: u32,
    target: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VizData<'a> {
    search_term: &'a str,
    edges: &'a [VizEdge],
    nodes: Vec<&'a VizNode>,
}

/// Per-term node/edge data for a graph page, plus an index of all terms.
///
/// Nodes are deduplicated by class name and clustered by their set of
/// owning archives; user classes share one cluster. Each term gets its own
/// directory; a term whose slug is already taken gets a numeric suffix.
pub struct VizReporter {
    output_dir: PathBuf,
    index: String,
    slugs: HashSet<String>,
    slug: String,
    term: String,
    matched: Vec<String>,
    user_classes: Vec<String>,
    nodes: HashMap<String, VizNode>,
    clusters: HashMap<BTreeSet<String>, u32>,
    edges: Vec<VizEdge>,
    written_edges: HashSet<(u32, u32)>,
    previous: Option<u32>,
}

impl VizReporter {
    pub fn new(output_dir: &Path) -> Self {
        let mut index = String::new();
        index.push_str("<html><title>TPLA Results</title><head><style>");
        index.push_str(STYLE);
        index.push_str("</style></head><body>");
        index.push_str("<font color=\"#1d67e5\"><h3>Results</h3></font>");

        Self {
            output_dir: output_dir.to_path_buf(),
            index,
            slugs: HashSet::new(),
            slug: String::new(),
            term: String::new(),
            matched: Vec::new(),
            user_classes: Vec::new(),
            nodes: HashMap::new(),
            clusters: HashMap::new(),
            edges: Vec::new(),
            written_edges: HashSet::new(),
            previous: None,
        }
    }

    fn claim_slug(&mut self, term: &str) -> String {
        let base = term_slug(term);
        let mut slug = base.clone();
        let mut n = 1;
        while !self.slugs.insert(slug.clone()) {
            n += 1;
            slug = format!("{base}-{n}");
        }
        slug
    }

    fn next_id(&self) -> u32 {
        self.nodes.len() as u32 + 1
    }

    fn cluster_for(&mut self, jars: &[String]) -> u32 {
        let key: BTreeSet<String> = jars.iter().cloned().collect();
        let next = self.clusters.len() as u32 + USER_CLUSTER + 1;
        *self.clusters.entry(key).or_insert(next)
    }

    fn reset(&mut self) {
        self.user_classes.clear();
        self.nodes.clear();
        self.clusters.clear();
        self.edges.clear();
        self.written_edges.clear();
        self.previous = None;
    }

    fn write_term(&self) -> Result<()> {
        let dir = self.output_dir.join(&self.slug);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let mut nodes: Vec<&VizNode> = self.nodes.values().collect();
        nodes.sort_by_key(|n| n.id);
        let data = VizData {
            search_term: &self.term,
            edges: &self.edges,
            nodes,
        };
        let script = format!("var data = {};\n", serde_json::to_string_pretty(&data)?);

        let data_path = dir.join(VIZ_DATA_FILE);
        std::fs::write(&data_path, script)
            .with_context(|| format!("Failed to write {}", data_path.display()))?;
        let page_path = dir.join(TERM_PAGE_FILE);
        std::fs::write(&page_path, TERM_PAGE)
            .with_context(|| format!("Failed to write {}", page_path.display()))?;
        Ok(())
    }
}

impl Reporter for VizReporter {
    fn name(&self) -> &'static str {
        "viz"
    }

    fn begin_search(&mut self, term: &str, matched: &[String]) -> Result<()> {
        self.reset();
        self.slug = self.claim_slug(term);
        self.term = term.to_string();
        self.matched = matched.to_vec();
        Ok(())
    }

    fn begin_chain(&mut self) -> Result<()> {
        self.previous = None;
        Ok(())
    }

    fn mark_user_class(&mut self, class: &str) -> Result<()> {
        if !self.nodes.contains_key(class) {
            let node = VizNode {
                id: self.next_id(),
                cluster: USER_CLUSTER,
                name: class.to_string(),
                jar: USER_CLUSTER_LABEL.to_string(),
            };
            self.nodes.insert(class.to_string(), node);
            self.user_classes.push(class.to_string());
        }
        Ok(())
    }

    fn link(&mut self, class: &str, jars: &[String]) -> Result<()> {
        if !self.nodes.contains_key(class) {
            let node = VizNode {
                id: self.next_id(),
                cluster: self.cluster_for(jars),
                name: class.to_string(),
                jar: jars
                    .first()
                    .map(|j| archive_file_name(j).to_string())
                    .unwrap_or_default(),
            };
            self.nodes.insert(class.to_string(), node);
        }
        let current = self.nodes.get(class).map(|n| n.id).context("node vanished")?;

        if let Some(previous) = self.previous
            && self.written_edges.insert((previous, current))
        {
            self.edges.push(VizEdge {
                source: previous,
                target: current,
            });
        }
        self.previous = Some(current);
        Ok(())
    }

    fn end_chain(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_search(&mut self, _term: &str, matched: &[String]) -> Result<()> {
        self.matched = matched.to_vec();
        self.write_term()?;

        write!(
            self.index,
            "<details><summary><a href=\"{}/{TERM_PAGE_FILE}\">{}</a></summary>",
            self.slug,
            html_escape(&self.term)
        )?;
        self.index.push_str("<div class=\"col-container\">");
        self.index
            .push_str("<div class=\"col\" style=\"background-color:#fce897;\"><ul>");
        for jar in &self.matched {
            write!(self.index, "<li>{}</li>", html_escape(jar))?;
        }
        self.index.push_str("</ul></div>");
        self.index
            .push_str("<div class=\"col\" style=\"background-color:#bdd8fc;\"><ul>");
        for class in &self.user_classes {
            write!(self.index, "<li>{}</li>", html_escape(class))?;
        }
        self.index.push_str("</ul></div></div></details>");

        self.reset();
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.index.push_str("</body></html>");
        let path = self.output_dir.join(VIZ_INDEX_FILE);
        std::fs::write(&path, &self.index)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

fn html_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
