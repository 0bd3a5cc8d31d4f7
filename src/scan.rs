use anyhow::{Result, bail};
use ignore::WalkBuilder;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Path filters applied while walking the class and jar directories.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    /// Drop any path with a `test` directory anywhere in it.
    pub exclude_test_dirs: bool,
    /// Full-match patterns; a matching path is skipped.
    pub exclusions: Vec<Regex>,
}

impl ScanFilter {
    pub fn accepts(&self, path: &Path) -> bool {
        if self.exclude_test_dirs
            && path
                .parent()
                .is_some_and(|dir| dir.components().any(|c| c.as_os_str() == "test"))
        {
            return false;
        }
        let text = path.to_string_lossy();
        !self.exclusions.iter().any(|re| re.is_match(&text))
    }
}

/// Anchors `pattern` so that it must match the whole input.
pub fn full_match(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// Every file under `base` with extension `ext`, sorted.
///
/// A missing or non-directory `base` is an error for the whole run.
pub fn scan_files(base: &Path, ext: &str, filter: &ScanFilter) -> Result<Vec<PathBuf>> {
    if !base.is_dir() {
        bail!("Not a directory: {}", base.display());
    }

    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if entry.file_type().is_some_and(|t| t.is_file())
                    && path.extension().is_some_and(|e| e == ext)
                {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut files: Vec<PathBuf> = rx
        .iter()
        .filter(|path| filter.accepts(path))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_dir, write_file};

    #[test]
    fn finds_files_by_extension() -> Result<()> {
        let base = temp_dir("scan_ext");
        write_file(&base.join("a/A.class"), b"");
        write_file(&base.join("a/b/B.class"), b"");
        write_file(&base.join("a/readme.txt"), b"");
        write_file(&base.join("lib/x.jar"), b"");

        let classes = scan_files(&base, "class", &ScanFilter::default())?;
        assert_eq!(classes, vec![base.join("a/A.class"), base.join("a/b/B.class")]);

        let jars = scan_files(&base, "jar", &ScanFilter::default())?;
        assert_eq!(jars, vec![base.join("lib/x.jar")]);

        std::fs::remove_dir_all(base)?;
        Ok(())
    }

    #[test]
    fn filters_test_dirs_and_exclusions() -> Result<()> {
        let base = temp_dir("scan_filter");
        write_file(&base.join("main/keep.jar"), b"");
        write_file(&base.join("src/test/junit.jar"), b"");
        write_file(&base.join("main/tests-only.jar"), b"");
        write_file(&base.join("main/skip-me.jar"), b"");

        let filter = ScanFilter {
            exclude_test_dirs: true,
            exclusions: vec![full_match(".*skip-me.*")?],
        };
        let jars = scan_files(&base, "jar", &filter)?;
        assert_eq!(
            jars,
            vec![base.join("main/keep.jar"), base.join("main/tests-only.jar")]
        );

        std::fs::remove_dir_all(base)?;
        Ok(())
    }

    #[test]
    fn test_dir_above_the_scan_root_also_excludes() -> Result<()> {
        let root = temp_dir("scan_test_root");
        let base = root.join("test/project");
        write_file(&base.join("lib/x.jar"), b"");

        let filter = ScanFilter {
            exclude_test_dirs: true,
            exclusions: Vec::new(),
        };
        assert!(scan_files(&base, "jar", &filter)?.is_empty());
        assert!(!filter.accepts(Path::new("/repo/test/lib/x.jar")));
        assert!(filter.accepts(Path::new("/repo/lib/test")));
        assert!(filter.accepts(Path::new("/repo/testing/x.jar")));

        std::fs::remove_dir_all(root)?;
        Ok(())
    }

    #[test]
    fn missing_directory_is_fatal() {
        let base = temp_dir("scan_missing");
        assert!(scan_files(&base, "jar", &ScanFilter::default()).is_err());
    }

    #[test]
    fn full_match_is_anchored() -> Result<()> {
        let re = full_match("foo")?;
        assert!(re.is_match("foo"));
        assert!(!re.is_match("foobar"));
        Ok(())
    }
}
