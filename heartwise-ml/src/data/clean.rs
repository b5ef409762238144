//! Dataset-specific clean-up of the combined table.

use crate::config::CleaningConfig;
use crate::data::table::{Cell, Table};
use crate::error::MlError;
use std::path::Path;

fn to_float(column: &str, cell: &Cell) -> Result<Cell, MlError> {
    match cell {
        Cell::Int(i) => Ok(Cell::Float(*i as f64)),
        Cell::Text(s) => Err(MlError::Cast {
            column: column.to_string(),
            value: s.clone(),
        }),
        other => Ok(other.clone()),
    }
}

/// Numeric coercion: anything that is not a number becomes null.
fn coerce_float(cell: &Cell) -> Cell {
    cell.as_f64().map_or(Cell::Null, Cell::Float)
}

/// Apply the clean-up steps to `table`:
///
/// 1. drop the known duplicate rows by position and renumber,
/// 2. cast the continuous columns to float (text values are an error),
/// 3. mark the plain categorical columns,
/// 4. coerce the remaining categorical columns to numbers, so `1` and `1.0`
///    form one level, then mark them categorical.
pub fn clean(table: &Table, config: &CleaningConfig) -> Result<Table, MlError> {
    let mut cleaned = table.clone();
    cleaned.drop_rows(&config.duplicate_rows)?;

    for column in &config.float_columns {
        cleaned.map_column(column, |cell| to_float(column, cell))?;
    }
    for column in &config.categorical_columns {
        cleaned.mark_categorical(column)?;
    }
    for column in &config.coerced_categorical_columns {
        let mut coerced = 0usize;
        cleaned.map_column(column, |cell| {
            let out = coerce_float(cell);
            if out.is_null() && !cell.is_null() {
                coerced += 1;
            }
            Ok(out)
        })?;
        if coerced > 0 {
            tracing::warn!(column = %column, values = coerced, "Non-numeric values coerced to null");
        }
        cleaned.mark_categorical(column)?;
    }

    tracing::info!(
        rows_before = table.row_count(),
        rows_after = cleaned.row_count(),
        "Cleaned combined data"
    );
    Ok(cleaned)
}

/// Clean the CSV at `path` and overwrite it with the result.
pub fn clean_csv(
    path: &Path,
    config: &CleaningConfig,
    missing_markers: &[String],
) -> Result<Table, MlError> {
    let table = Table::read_csv(path, missing_markers)?;
    let cleaned = clean(&table, config)?;
    cleaned.write_csv(path)?;
    Ok(cleaned)
}
