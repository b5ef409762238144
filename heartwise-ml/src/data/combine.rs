//! Combining the raw per-site data files into one observation table.

use crate::data::table::Table;
use crate::error::MlError;
use std::path::{Path, PathBuf};

/// Read every file in `file_paths` as a headerless table named by
/// `col_names` and stack them in order.
///
/// All paths are checked before any file is parsed, so a missing file fails
/// the whole call with [`MlError::FileNotFound`] and nothing is produced.
pub fn combine_load_data(
    file_paths: &[PathBuf],
    col_names: &[String],
    missing_markers: &[String],
) -> Result<Table, MlError> {
    if let Some(missing) = file_paths.iter().find(|p| !p.exists()) {
        tracing::error!(path = %missing.display(), "Source file not found");
        return Err(MlError::FileNotFound(missing.clone()));
    }

    let mut combined = Table::new(col_names.to_vec());
    for path in file_paths {
        let part = Table::read_headerless(path, col_names, missing_markers)?;
        tracing::debug!(path = %path.display(), rows = part.row_count(), "Loaded source file");
        combined.append(part)?;
    }

    tracing::info!(
        files = file_paths.len(),
        rows = combined.row_count(),
        "Combined source files"
    );
    Ok(combined)
}

/// Combine the sources and write the result, with a header row, to `output`.
pub fn combine_to_csv(
    file_paths: &[PathBuf],
    col_names: &[String],
    missing_markers: &[String],
    output: &Path,
) -> Result<Table, MlError> {
    let combined = combine_load_data(file_paths, col_names, missing_markers)?;
    combined.write_csv(output)?;
    tracing::info!(output = %output.display(), "Combined data saved");
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::Cell;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    fn two_files(dir: &TempDir) -> Vec<PathBuf> {
        let file1 = dir.path().join("test_file1.csv");
        let file2 = dir.path().join("test_file2.csv");
        std::fs::write(&file1, "1,2,3\n4,5,6\n").unwrap();
        std::fs::write(&file2, "7,8,9\n10,11,12\n").unwrap();
        vec![file1, file2]
    }

    #[test]
    fn test_combine_preserves_file_then_row_order() {
        let dir = TempDir::new().unwrap();
        let files = two_files(&dir);
        let combined = combine_load_data(&files, &names(&["col1", "col2", "col3"]), &[]).unwrap();

        assert_eq!(combined.columns, names(&["col1", "col2", "col3"]));
        let col1: Vec<Cell> = combined.column("col1").unwrap().into_iter().cloned().collect();
        assert_eq!(
            col1,
            vec![Cell::Int(1), Cell::Int(4), Cell::Int(7), Cell::Int(10)]
        );
        assert_eq!(combined.row_count(), 4);
    }

    #[test]
    fn test_combine_missing_file_names_path() {
        let dir = TempDir::new().unwrap();
        let mut files = two_files(&dir);
        files.push(dir.path().join("non_existent_file.csv"));
        let output = dir.path().join("combined.csv");

        let err = combine_to_csv(&files, &names(&["a", "b", "c"]), &[], &output).unwrap_err();
        assert!(matches!(&err, MlError::FileNotFound(p) if p.ends_with("non_existent_file.csv")));
        assert!(err.to_string().contains("non_existent_file.csv"));
        assert!(!output.exists());
    }

    #[test]
    fn test_combine_renames_unconditionally() {
        let dir = TempDir::new().unwrap();
        let files = two_files(&dir);
        let cols = names(&["wrong_col1", "wrong_col2", "wrong_col3"]);
        let combined = combine_load_data(&files, &cols, &[]).unwrap();
        assert_eq!(combined.columns, cols);
    }

    #[test]
    fn test_combine_normalizes_missing_marker() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("processed.va.data");
        std::fs::write(&file, "63,?,1\n").unwrap();
        let combined =
            combine_load_data(&[file], &names(&["a", "b", "c"]), &["?".to_string()]).unwrap();
        assert_eq!(combined.null_count(), 1);
    }

    #[test]
    fn test_combine_rejects_wrong_field_count() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("short.data");
        std::fs::write(&file, "1,2\n").unwrap();
        let err = combine_load_data(&[file], &names(&["a", "b", "c"]), &[]).unwrap_err();
        assert!(matches!(err, MlError::Dataset(_)));
    }
}
