//! Test file discovery
//!
//! Finding test files and turning them into parsed suites is behind the `TestDiscovery` trait so
//! the runner can be driven from something other than the filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use lens_syntax::spec::{self, SpecSyntaxError};
use miette::{NamedSource, Report};
use thiserror::Error;

use crate::evaluator::NamedSuite;
use crate::evaluator::index::discover_php_files;

/// Test files larger than this are rejected.
const MAX_SOURCE_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TestError {
    #[error("no such test file or directory: {}", .0.display())]
    Missing(PathBuf),

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is larger than {} MB", .0.display(), MAX_SOURCE_SIZE / (1024 * 1024))]
    TooLarge(PathBuf),

    #[error("{} has {} syntax error(s)", .path.display(), .errors.len())]
    Syntax {
        path: PathBuf,
        source_code: String,
        errors: Vec<SpecSyntaxError>,
    },
}

impl TestError {
    /// Human-readable form; syntax errors are rendered against their source.
    pub fn render(&self) -> String {
        match self {
            TestError::Syntax {
                path,
                source_code,
                errors,
            } => errors
                .iter()
                .map(|error| {
                    let report = Report::new(error.clone())
                        .with_source_code(NamedSource::new(path.display().to_string(), source_code.clone()));
                    format!("{report:?}")
                })
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}

/// A parsed test file.
#[derive(Debug, Clone)]
pub struct TestFile {
    pub path: PathBuf,
    pub suite: NamedSuite,
}

pub trait TestDiscovery {
    /// Test files below `path` (or `path` itself), sorted.
    fn discover_test_files(&self, path: &Path) -> Result<Vec<PathBuf>, TestError>;

    /// Parse one test file; `root` is the path it was discovered from and names the suite.
    fn load(&self, root: &Path, file: &Path) -> Result<TestFile, TestError>;
}

/// Recursive `*.php` discovery on disk.
pub struct DefaultTestDiscovery;

impl TestDiscovery for DefaultTestDiscovery {
    fn discover_test_files(&self, path: &Path) -> Result<Vec<PathBuf>, TestError> {
        if !path.exists() {
            return Err(TestError::Missing(path.to_path_buf()));
        }
        Ok(discover_php_files(path))
    }

    fn load(&self, root: &Path, file: &Path) -> Result<TestFile, TestError> {
        let source = read_source(file)?;
        let suite = spec::parse(&source).map_err(|errors| TestError::Syntax {
            path: file.to_path_buf(),
            source_code: source.clone(),
            errors,
        })?;
        Ok(TestFile {
            path: file.to_path_buf(),
            suite: NamedSuite {
                name: suite_name(root, file),
                suite,
            },
        })
    }
}

/// Read a file, refusing anything unreasonably large.
pub fn read_source(path: &Path) -> Result<String, TestError> {
    let io_error = |source| TestError::Io {
        path: path.to_path_buf(),
        source,
    };
    let metadata = fs::metadata(path).map_err(io_error)?;
    if metadata.len() > MAX_SOURCE_SIZE {
        return Err(TestError::TooLarge(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(io_error)
}

/// `tests/io/disk.php` found under `tests` is `io/disk`.
pub fn suite_name(root: &Path, file: &Path) -> String {
    let relative = file
        .strip_prefix(root)
        .ok()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(file);
    let relative = relative.with_extension("");
    let name = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if name.is_empty() { "suite".to_string() } else { name }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const VALID: &str = "<?php\n// Test\necho 'hi';\n// Output\nhi\n";

    #[test]
    fn test_suite_names() {
        assert_eq!(suite_name(Path::new("tests"), Path::new("tests/io/disk.php")), "io/disk");
        assert_eq!(suite_name(Path::new("tests/disk.php"), Path::new("tests/disk.php")), "tests/disk");
        assert_eq!(suite_name(Path::new("other"), Path::new("disk.php")), "disk");
    }

    #[test]
    fn test_discover_and_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("io")).unwrap();
        fs::create_dir_all(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join("io/disk.php"), VALID).unwrap();
        fs::write(dir.path().join("clock.php"), VALID).unwrap();
        fs::write(dir.path().join(".hidden/skip.php"), VALID).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let discovery = DefaultTestDiscovery;
        let files = discovery.discover_test_files(dir.path()).unwrap();
        assert_eq!(files, [dir.path().join("clock.php"), dir.path().join("io/disk.php")]);

        let loaded = discovery.load(dir.path(), &files[1]).unwrap();
        assert_eq!(loaded.suite.name, "io/disk");
        assert_eq!(loaded.suite.suite.cases.len(), 1);
    }

    #[test]
    fn test_missing_path() {
        let result = DefaultTestDiscovery.discover_test_files(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(TestError::Missing(_))));
    }

    #[test]
    fn test_syntax_errors_are_rendered_with_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.php");
        fs::write(&path, "<?php\n// Test\necho 1;\n").unwrap();

        let error = DefaultTestDiscovery.load(dir.path(), &path).unwrap_err();
        let TestError::Syntax { errors, .. } = &error else {
            panic!("expected a syntax error, got {error:?}");
        };
        assert_eq!(errors.len(), 1);
        let rendered = error.render();
        assert!(rendered.contains("expected an output label"), "{rendered}");
    }
}
