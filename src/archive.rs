use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::classfile::{ClassReferences, extract_references};
use crate::error::ArchiveError;

/// Classes decoded from one archive.
#[derive(Debug, Default)]
pub struct ArchiveScan {
    pub classes: Vec<ClassReferences>,
    /// Entries that were not valid class files.
    pub skipped: usize,
}

/// Decodes every `.class` entry of a jar.
///
/// A malformed entry is skipped; classes already decoded are kept. Any
/// failure of the zip container itself aborts the whole archive.
pub fn read_archive(jar_path: &Path) -> Result<ArchiveScan, ArchiveError> {
    let file = File::open(jar_path).map_err(|source| ArchiveError::Open {
        path: jar_path.to_path_buf(),
        source,
    })?;
    // SAFETY: The file is opened read-only and remains valid for the lifetime of the mmap.
    // The mmap is dropped before the file, ensuring memory safety.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| ArchiveError::Open {
        path: jar_path.to_path_buf(),
        source,
    })?;
    let mut archive =
        ZipArchive::new(Cursor::new(&mmap[..])).map_err(|source| ArchiveError::Corrupt {
            path: jar_path.to_path_buf(),
            source,
        })?;

    let mut scan = ArchiveScan::default();
    let mut buf = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|source| ArchiveError::Corrupt {
            path: jar_path.to_path_buf(),
            source,
        })?;
        if !entry.name().ends_with(".class") || entry.is_dir() {
            continue;
        }
        let entry_name = entry.name().to_string();

        buf.clear();
        entry
            .read_to_end(&mut buf)
            .map_err(|source| ArchiveError::Entry {
                path: jar_path.to_path_buf(),
                entry: entry_name.clone(),
                source,
            })?;

        match extract_references(&buf) {
            Ok(refs) => scan.classes.push(refs),
            Err(err) => {
                warn!(archive = %jar_path.display(), entry = %entry_name, error = %err, "skipping unreadable class entry");
                scan.skipped += 1;
            }
        }
    }

    debug!(
        archive = %jar_path.display(),
        classes = scan.classes.len(),
        skipped = scan.skipped,
        "archive decoded"
    );
    Ok(scan)
}
