//! Seeded train/test split.

use crate::config::SplitConfig;
use crate::data::table::Table;
use crate::error::MlError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::path::Path;

pub const TRAIN_FILE: &str = "train_df.csv";
pub const TEST_FILE: &str = "test_df.csv";

/// Shuffle row positions with `seed` and send the first
/// `ceil(n * test_size)` of them to the test table.
pub fn train_test_split(
    table: &Table,
    test_size: f64,
    seed: u64,
) -> Result<(Table, Table), MlError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(MlError::config(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    let n = table.row_count();
    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(MlError::dataset(format!(
            "cannot split {n} rows with test_size {test_size}"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let (test, train) = order.split_at(n_test);
    Ok((table.take_rows(train), table.take_rows(test)))
}

/// Split and write `train_df.csv` / `test_df.csv` into `data_dir`.
pub fn split_to_files(
    table: &Table,
    data_dir: &Path,
    config: &SplitConfig,
) -> Result<(Table, Table), MlError> {
    let (train, test) = train_test_split(table, config.test_size, config.seed)?;
    train.write_csv(&data_dir.join(TRAIN_FILE))?;
    test.write_csv(&data_dir.join(TEST_FILE))?;
    tracing::info!(
        train_rows = train.row_count(),
        test_rows = test.row_count(),
        dir = %data_dir.display(),
        "Wrote train/test split"
    );
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::Cell;

    fn numbered(n: i64) -> Table {
        Table::from_rows(vec!["id".into()], (0..n).map(|i| vec![Cell::Int(i)]).collect()).unwrap()
    }

    #[test]
    fn test_split_sizes_round_test_up() {
        let (train, test) = train_test_split(&numbered(10), 0.25, 123).unwrap();
        assert_eq!(test.row_count(), 3);
        assert_eq!(train.row_count(), 7);
    }

    #[test]
    fn test_split_is_a_partition() {
        let (train, test) = train_test_split(&numbered(50), 0.3, 123).unwrap();
        let mut ids: Vec<Cell> = train.rows.into_iter().chain(test.rows).map(|mut r| r.remove(0)).collect();
        ids.sort_by_key(|c| match c {
            Cell::Int(i) => *i,
            _ => -1,
        });
        assert_eq!(ids, (0..50).map(Cell::Int).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_reproducible() {
        let a = train_test_split(&numbered(30), 0.3, 7).unwrap();
        let b = train_test_split(&numbered(30), 0.3, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_split_rejects_bad_size() {
        assert!(train_test_split(&numbered(10), 1.0, 1).is_err());
        assert!(train_test_split(&numbered(1), 0.3, 1).is_err());
    }

    #[test]
    fn test_split_to_files_has_no_index_column() {
        let dir = tempfile::TempDir::new().unwrap();
        split_to_files(&numbered(10), dir.path(), &SplitConfig::default()).unwrap();
        let text = std::fs::read_to_string(dir.path().join(TRAIN_FILE)).unwrap();
        assert!(text.starts_with("id\n"));
        assert_eq!(text.lines().count(), 8);
    }
}
