//! Shared utilities for the lensing integration tests.
//!
//! Artifacts (spectra tables, reports) go to `test_output/` at the workspace
//! root so they survive the test run for inspection.

use once_cell::sync::Lazy;
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("workspace root not found above {0}")]
    WorkspaceRootNotFound(PathBuf),
    #[error("column {index} has {actual} rows, expected {expected}")]
    RaggedColumns {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Walk up from the current directory to the `Cargo.toml` declaring `[workspace]`.
pub fn find_workspace_root() -> Result<PathBuf, TestHelperError> {
    let start = env::current_dir()?;
    for dir in start.ancestors() {
        let manifest = dir.join("Cargo.toml");
        if manifest.is_file() && std::fs::read_to_string(&manifest)?.contains("[workspace]") {
            return Ok(dir.to_path_buf());
        }
    }
    Err(TestHelperError::WorkspaceRootNotFound(start))
}

static WORKSPACE_ROOT: Lazy<PathBuf> =
    Lazy::new(|| find_workspace_root().expect("tests must run inside the workspace"));

/// `test_output/` under the workspace root, created on first use.
pub fn get_output_dir() -> PathBuf {
    let dir = WORKSPACE_ROOT.join("test_output");
    std::fs::create_dir_all(&dir).expect("Failed to create test output directory");
    dir
}

pub fn output_path<P: AsRef<Path>>(path: P) -> PathBuf {
    get_output_dir().join(path)
}

/// Write equal-length columns as CSV, one row per index (e.g. per multipole).
pub fn write_columns(
    path: &Path,
    headers: &[&str],
    columns: &[&[f64]],
) -> Result<(), TestHelperError> {
    let rows = columns.first().map_or(0, |c| c.len());
    if let Some((index, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != rows) {
        return Err(TestHelperError::RaggedColumns {
            index,
            expected: rows,
            actual: col.len(),
        });
    }

    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{}", headers.join(","))?;
    for row in 0..rows {
        let line: Vec<String> = columns.iter().map(|c| format!("{:.8e}", c[row])).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    out.flush()?;
    Ok(())
}

/// Largest absolute elementwise difference of two maps of equal length.
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "maps differ in length");
    a.iter()
        .zip(b)
        .fold(0.0_f64, |acc, (x, y)| acc.max((x - y).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_has_manifest() {
        let root = find_workspace_root().unwrap();
        assert!(root.join("Cargo.toml").exists());
        assert!(root.join("lensing").is_dir());
    }

    #[test]
    fn test_output_path_inside_output_dir() {
        let path = output_path("spectra.csv");
        assert_eq!(path.parent(), Some(get_output_dir().as_path()));
        assert!(get_output_dir().is_dir());
    }

    #[test]
    fn test_write_columns() {
        let path = output_path("helpers_columns.csv");
        write_columns(&path, &["ell", "cl"], &[&[0.0, 1.0], &[2.5, 3.5]]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("ell,cl\n"));

        assert!(matches!(
            write_columns(&path, &["a", "b"], &[&[0.0], &[1.0, 2.0]]),
            Err(TestHelperError::RaggedColumns { index: 1, .. })
        ));
    }

    #[test]
    fn test_max_abs_diff() {
        assert_eq!(max_abs_diff(&[1.0, 2.0], &[1.5, 1.0]), 1.0);
    }
}
