//! In-memory observation table with CSV I/O.

use crate::error::MlError;
use crate::persistence::atomic_write;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Parse a raw token. Empty tokens, configured missing markers and `NaN`
    /// all become [`Cell::Null`].
    pub fn parse(token: &str, missing_markers: &[String]) -> Self {
        let token = token.trim();
        if token.is_empty() || missing_markers.iter().any(|m| m == token) {
            return Cell::Null;
        }
        if let Ok(i) = token.parse::<i64>() {
            return Cell::Int(i);
        }
        match token.parse::<f64>() {
            Ok(f) if f.is_nan() => Cell::Null,
            Ok(f) => Cell::Float(f),
            Err(_) => Cell::Text(token.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Numeric view of the cell; text and null have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Null | Cell::Text(_) => None,
        }
    }

    /// Render the cell as a CSV field.
    pub fn to_field(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => format_float(*f),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "NaN"),
            other => write!(f, "{}", other.to_field()),
        }
    }
}

/// Shortest round-trip float form that always keeps a fractional part (`140.0`).
pub fn format_float(value: f64) -> String {
    format!("{value:?}")
}

/// A row-major table of observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    /// Columns that have been cast to categorical.
    #[serde(default)]
    pub categorical: BTreeSet<String>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            categorical: BTreeSet::new(),
        }
    }

    /// Build a table, checking that every row has one cell per column.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, MlError> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(MlError::dataset(format!(
                "row {idx} has {} fields, expected {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self {
            columns,
            rows,
            categorical: BTreeSet::new(),
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, MlError> {
        self.column_index(name)
            .ok_or_else(|| MlError::dataset(format!("column '{name}' not found")))
    }

    /// Cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Result<Vec<&Cell>, MlError> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Numeric values of one column; nulls become `None`, text is an error.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>, MlError> {
        let idx = self.require_column(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(pos, row)| match &row[idx] {
                Cell::Text(s) => Err(MlError::dataset(format!(
                    "non-numeric value {s:?} in column '{name}' at row {pos}"
                ))),
                cell => Ok(cell.as_f64()),
            })
            .collect()
    }

    /// Total number of null cells.
    pub fn null_count(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().filter(|c| c.is_null()).count())
            .sum()
    }

    /// Keep only the named columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Table, MlError> {
        let indices = names
            .iter()
            .map(|n| self.require_column(n))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Table {
            columns: names.to_vec(),
            rows,
            categorical: self
                .categorical
                .iter()
                .filter(|c| names.contains(*c))
                .cloned()
                .collect(),
        })
    }

    /// Remove the named columns; every name must exist.
    pub fn drop_columns(&self, names: &[String]) -> Result<Table, MlError> {
        for name in names {
            self.require_column(name)?;
        }
        let keep: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !names.contains(*c))
            .cloned()
            .collect();
        self.select(&keep)
    }

    /// New table with the rows at `positions`, in that order.
    pub fn take_rows(&self, positions: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: positions
                .iter()
                .filter_map(|&p| self.rows.get(p).cloned())
                .collect(),
            categorical: self.categorical.clone(),
        }
    }

    /// Drop rows by position and renumber the rest from zero.
    pub fn drop_rows(&mut self, positions: &[usize]) -> Result<(), MlError> {
        if let Some(&bad) = positions.iter().find(|&&p| p >= self.rows.len()) {
            return Err(MlError::invalid_input(format!(
                "row index {bad} out of range for table with {} rows",
                self.rows.len()
            )));
        }
        let drop: BTreeSet<usize> = positions.iter().copied().collect();
        let rows = std::mem::take(&mut self.rows);
        self.rows = rows
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !drop.contains(i))
            .map(|(_, row)| row)
            .collect();
        Ok(())
    }

    /// Append another table's rows below this one's.
    pub fn append(&mut self, other: Table) -> Result<(), MlError> {
        if other.columns != self.columns {
            return Err(MlError::dataset(format!(
                "cannot append table with columns {:?} to {:?}",
                other.columns, self.columns
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Replace every cell of a column with `f(cell)`.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> Result<(), MlError>
    where
        F: FnMut(&Cell) -> Result<Cell, MlError>,
    {
        let idx = self.require_column(name)?;
        for row in &mut self.rows {
            row[idx] = f(&row[idx])?;
        }
        Ok(())
    }

    pub fn mark_categorical(&mut self, name: &str) -> Result<(), MlError> {
        self.require_column(name)?;
        self.categorical.insert(name.to_string());
        Ok(())
    }

    pub fn is_categorical(&self, name: &str) -> bool {
        self.categorical.contains(name)
    }

    /// Distinct non-null values of a column: numbers ascending, then text.
    pub fn levels(&self, name: &str) -> Result<Vec<Cell>, MlError> {
        let mut numbers: Vec<f64> = Vec::new();
        let mut texts: BTreeSet<String> = BTreeSet::new();
        let mut ints = true;
        for cell in self.column(name)? {
            match cell {
                Cell::Int(i) => numbers.push(*i as f64),
                Cell::Float(f) => {
                    ints = false;
                    numbers.push(*f);
                }
                Cell::Text(s) => {
                    texts.insert(s.clone());
                }
                Cell::Null => {}
            }
        }
        numbers.sort_by(f64::total_cmp);
        numbers.dedup();
        let mut levels: Vec<Cell> = numbers
            .into_iter()
            .map(|n| if ints { Cell::Int(n as i64) } else { Cell::Float(n) })
            .collect();
        levels.extend(texts.into_iter().map(Cell::Text));
        Ok(levels)
    }

    /// Read a CSV file whose first row is the header.
    pub fn read_csv(path: &Path, missing_markers: &[String]) -> Result<Table, MlError> {
        if !path.exists() {
            return Err(MlError::FileNotFound(path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(|t| Cell::parse(t, missing_markers)).collect());
        }
        Table::from_rows(columns, rows)
    }

    /// Read a headerless delimited file, naming columns with `names`.
    pub fn read_headerless(
        path: &Path,
        names: &[String],
        missing_markers: &[String],
    ) -> Result<Table, MlError> {
        if !path.exists() {
            return Err(MlError::FileNotFound(path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != names.len() {
                return Err(MlError::dataset(format!(
                    "{}: line {} has {} fields, expected {}",
                    path.display(),
                    line + 1,
                    record.len(),
                    names.len()
                )));
            }
            rows.push(record.iter().map(|t| Cell::parse(t, missing_markers)).collect());
        }
        Table::from_rows(names.to_vec(), rows)
    }

    /// Serialize to CSV text with a header row.
    pub fn to_csv_string(&self) -> Result<String, MlError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Cell::to_field))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| MlError::Io(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| MlError::dataset(e.to_string()))
    }

    /// Write to `path` as CSV with a header row.
    pub fn write_csv(&self, path: &Path) -> Result<(), MlError> {
        let text = self.to_csv_string()?;
        atomic_write(path, text.as_bytes())?;
        tracing::debug!(path = %path.display(), rows = self.row_count(), "Wrote table");
        Ok(())
    }

    /// Render a subset of rows with their positions, for warnings.
    pub fn render_rows(&self, positions: &[usize]) -> String {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.len()).collect();
        let index_width = positions
            .iter()
            .map(|p| p.to_string().len())
            .max()
            .unwrap_or(1);
        let rendered: Vec<Vec<String>> = positions
            .iter()
            .filter_map(|&p| self.rows.get(p))
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();
        for row in &rendered {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }
        let mut out = format!("{:index_width$}", "");
        for (name, w) in self.columns.iter().zip(widths.iter().copied()) {
            out.push_str(&format!("  {name:>w$}"));
        }
        for (pos, row) in positions.iter().zip(&rendered) {
            out.push('\n');
            out.push_str(&format!("{pos:<index_width$}"));
            for (cell, w) in row.iter().zip(widths.iter().copied()) {
                out.push_str(&format!("  {cell:>w$}"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn markers() -> Vec<String> {
        vec!["?".to_string()]
    }

    #[test]
    fn test_cell_parse() {
        assert_eq!(Cell::parse("63", &markers()), Cell::Int(63));
        assert_eq!(Cell::parse("63.0", &markers()), Cell::Float(63.0));
        assert_eq!(Cell::parse(" ? ", &markers()), Cell::Null);
        assert_eq!(Cell::parse("", &markers()), Cell::Null);
        assert_eq!(Cell::parse("NaN", &markers()), Cell::Null);
        assert_eq!(Cell::parse("abc", &markers()), Cell::Text("abc".into()));
    }

    #[test]
    fn test_float_fields_keep_fraction() {
        assert_eq!(Cell::Float(140.0).to_field(), "140.0");
        assert_eq!(Cell::Float(2.3).to_field(), "2.3");
        assert_eq!(Cell::Int(1).to_field(), "1");
        assert_eq!(Cell::Null.to_field(), "");
    }

    #[test]
    fn test_drop_rows_renumbers() {
        let mut table = Table::from_rows(
            vec!["a".into()],
            vec![vec![Cell::Int(0)], vec![Cell::Int(1)], vec![Cell::Int(2)]],
        )
        .unwrap();
        table.drop_rows(&[1]).unwrap();
        assert_eq!(table.rows, vec![vec![Cell::Int(0)], vec![Cell::Int(2)]]);
        assert!(table.drop_rows(&[5]).is_err());
    }

    #[test]
    fn test_drop_columns_rejects_unknown_names() {
        let table = Table::from_rows(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)]],
        )
        .unwrap();
        let kept = table.drop_columns(&["b".to_string()]).unwrap();
        assert_eq!(kept.columns, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(kept.rows, vec![vec![Cell::Int(1), Cell::Int(3)]]);

        let err = table.drop_columns(&["zz".to_string()]).unwrap_err();
        assert!(err.to_string().contains("zz"));
    }

    #[test]
    fn test_levels_sorted_numeric() {
        let table = Table::from_rows(
            vec!["cp".into()],
            vec![
                vec![Cell::Float(4.0)],
                vec![Cell::Float(1.0)],
                vec![Cell::Null],
                vec![Cell::Float(4.0)],
            ],
        )
        .unwrap();
        assert_eq!(
            table.levels("cp").unwrap(),
            vec![Cell::Float(1.0), Cell::Float(4.0)]
        );
    }

    #[test]
    fn test_csv_roundtrip_preserves_nulls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        let table = Table::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec![Cell::Int(1), Cell::Null],
                vec![Cell::Float(2.5), Cell::Text("x".into())],
            ],
        )
        .unwrap();
        table.write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "a,b\n1,\n2.5,x\n");
        let loaded = Table::read_csv(&path, &markers()).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_render_rows_includes_positions() {
        let table = Table::from_rows(
            vec!["A".into(), "B".into()],
            vec![vec![Cell::Int(1), Cell::Int(4)], vec![Cell::Int(2), Cell::Int(5)]],
        )
        .unwrap();
        let out = table.render_rows(&[1]);
        assert!(out.contains('A') && out.contains('B'));
        assert!(out.lines().nth(1).unwrap().starts_with('1'));
    }
}
