//! Extraction of every class and archive into one immutable inventory.
//!
//! Decoding runs in parallel; merging into the entity maps happens on the
//! calling thread afterwards. Nothing is mutated once [`Inventory::collect`]
//! returns, so the builder's worker tasks can share it freely.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::archive::{ArchiveScan, read_archive};
use crate::classfile::{ClassReferences, extract_references};
use crate::model::{ArchiveEntity, ClassEntity, ReferenceMap};

#[derive(Debug, Default)]
pub struct Inventory {
    classes: Vec<ClassEntity>,
    by_name: HashMap<String, usize>,
    archives: Vec<ArchiveEntity>,
    references: ReferenceMap,
    skipped_entries: usize,
    failed_archives: usize,
}

impl Inventory {
    /// Decodes `class_files` (the codebase) and `jars` (the libraries).
    ///
    /// A malformed standalone class file fails the whole call. Archives are
    /// best effort: bad entries are skipped and unreadable archives dropped.
    pub fn collect(class_files: &[PathBuf], jars: &[PathBuf]) -> Result<Self> {
        let custom: Vec<ClassReferences> = class_files
            .par_iter()
            .map(|path| {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read class file: {}", path.display()))?;
                extract_references(&bytes)
                    .with_context(|| format!("Failed to parse class file: {}", path.display()))
            })
            .collect::<Result<_>>()?;
        info!(classes = custom.len(), "codebase classes decoded");

        let scanned: Vec<(PathBuf, ArchiveScan)> = jars
            .par_iter()
            .filter_map(|path| match read_archive(path) {
                Ok(scan) => Some((path.clone(), scan)),
                Err(err) => {
                    warn!(error = %err, "skipping archive");
                    None
                }
            })
            .collect();
        let failed_archives = jars.len() - scanned.len();
        info!(
            archives = scanned.len(),
            failed = failed_archives,
            "archives decoded"
        );

        let mut inventory = Self::merge(custom, scanned);
        inventory.failed_archives = failed_archives;
        Ok(inventory)
    }

    fn merge(custom: Vec<ClassReferences>, scanned: Vec<(PathBuf, ArchiveScan)>) -> Self {
        let custom_names: HashSet<String> = custom.iter().map(|c| c.name.clone()).collect();
        let mut inventory = Inventory::default();

        for class in custom {
            inventory.absorb(class, &custom_names);
        }

        for (path, scan) in scanned {
            inventory.skipped_entries += scan.skipped;
            let mut members = Vec::with_capacity(scan.classes.len());
            let mut seen = HashSet::with_capacity(scan.classes.len());
            for class in scan.classes {
                let index = inventory.absorb(class, &custom_names);
                if seen.insert(index) {
                    members.push(index);
                }
            }
            inventory.archives.push(ArchiveEntity::new(path, members));
        }

        inventory
    }

    /// First occurrence of a name creates the entity; later ones only add
    /// references. References to codebase classes are dropped.
    fn absorb(&mut self, class: ClassReferences, custom_names: &HashSet<String>) -> usize {
        let ClassReferences { name, referenced } = class;
        let referenced: BTreeSet<String> = referenced
            .into_iter()
            .filter(|r| !custom_names.contains(r))
            .collect();

        let index = match self.by_name.get(&name) {
            Some(index) => *index,
            None => {
                let index = self.classes.len();
                self.classes
                    .push(ClassEntity::new(name.clone(), custom_names.contains(&name)));
                self.by_name.insert(name.clone(), index);
                index
            }
        };
        self.references.entry(name).or_default().extend(referenced);
        index
    }

    pub fn classes(&self) -> &[ClassEntity] {
        &self.classes
    }

    pub fn archives(&self) -> &[ArchiveEntity] {
        &self.archives
    }

    pub fn class(&self, name: &str) -> Option<&ClassEntity> {
        self.by_name.get(name).map(|i| &self.classes[*i])
    }

    pub fn members<'a>(&'a self, archive: &'a ArchiveEntity) -> impl Iterator<Item = &'a ClassEntity> {
        archive.members.iter().filter_map(|i| self.classes.get(*i))
    }

    pub fn references(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.references.get(name)
    }

    pub fn custom_count(&self) -> usize {
        self.classes.iter().filter(|c| c.custom).count()
    }

    pub fn skipped_entries(&self) -> usize {
        self.skipped_entries
    }

    pub fn failed_archives(&self) -> usize {
        self.failed_archives
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{class_bytes, temp_dir, write_file, write_jar};

    fn refs(name: &str, referenced: &[&str]) -> ClassReferences {
        ClassReferences {
            name: name.to_string(),
            referenced: referenced.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn scan(classes: Vec<ClassReferences>) -> ArchiveScan {
        ArchiveScan {
            classes,
            skipped: 0,
        }
    }

    #[test]
    fn same_name_in_codebase_and_archive_is_one_entity() {
        let inventory = Inventory::merge(
            vec![refs("app.Util", &["lib.Widget"])],
            vec![
                (
                    PathBuf::from("/jars/a.jar"),
                    scan(vec![refs("app.Util", &["lib.Other"]), refs("lib.Widget", &[])]),
                ),
                (PathBuf::from("/jars/b.jar"), scan(vec![refs("lib.Widget", &[])])),
            ],
        );

        let names: Vec<&str> = inventory.classes().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["app.Util", "lib.Widget"]);
        assert!(inventory.class("app.Util").is_some_and(|c| c.custom));
        assert!(inventory.class("lib.Widget").is_some_and(|c| !c.custom));

        let util_refs = inventory.references("app.Util").cloned().unwrap_or_default();
        assert!(util_refs.contains("lib.Widget"));
        assert!(util_refs.contains("lib.Other"));

        let a = &inventory.archives()[0];
        let b = &inventory.archives()[1];
        assert_eq!(a.members, vec![0, 1]);
        assert_eq!(b.members, vec![1]);
    }

    #[test]
    fn references_to_codebase_classes_are_dropped() {
        let inventory = Inventory::merge(
            vec![refs("app.A", &["app.B", "lib.X"]), refs("app.B", &[])],
            vec![(PathBuf::from("x.jar"), scan(vec![refs("lib.X", &["app.A"])]))],
        );

        let a_refs = inventory.references("app.A").cloned().unwrap_or_default();
        assert_eq!(a_refs.into_iter().collect::<Vec<_>>(), vec!["lib.X"]);
        assert!(inventory.references("lib.X").is_some_and(|r| r.is_empty()));
        assert_eq!(inventory.custom_count(), 2);
    }

    #[test]
    fn repeated_class_in_one_archive_is_one_member() {
        let classes: Vec<ClassReferences> = (0..3)
            .flat_map(|i| {
                let name = format!("lib.C{i}");
                vec![refs(&name, &[]), refs(&name, &["lib.Extra"])]
            })
            .collect();
        let inventory = Inventory::merge(Vec::new(), vec![(PathBuf::from("big.jar"), scan(classes))]);

        assert_eq!(inventory.archives()[0].members, vec![0, 1, 2]);
        assert!(inventory.references("lib.C1").is_some_and(|r| r.contains("lib.Extra")));
    }

    #[test]
    fn collect_reads_files_and_skips_broken_archives() -> Result<()> {
        let base = temp_dir("inventory_collect");
        let app = base.join("classes/App.class");
        write_file(&app, &class_bytes("App", &["lib/Widget"]));
        let good = base.join("jars/widgets.jar");
        write_jar(&good, &[("lib/Widget.class", class_bytes("lib/Widget", &[]))]);
        let bad = base.join("jars/broken.jar");
        write_file(&bad, b"garbage");

        let inventory = Inventory::collect(&[app], &[bad, good])?;
        assert_eq!(inventory.archives().len(), 1);
        assert_eq!(inventory.failed_archives(), 1);
        assert_eq!(inventory.classes().len(), 2);

        std::fs::remove_dir_all(base)?;
        Ok(())
    }

    #[test]
    fn malformed_codebase_class_is_fatal() {
        let base = temp_dir("inventory_fatal");
        let broken = base.join("classes/Broken.class");
        write_file(&broken, b"nope");

        assert!(Inventory::collect(&[broken], &[]).is_err());
        let _ = std::fs::remove_dir_all(base);
    }
}
