//! Schema definition and type inference for observation tables.

use crate::data::table::{Cell, Table};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Categorical,
    Null,
}

impl ColumnType {
    /// Whether a column inferred as `observed` satisfies this expected type.
    ///
    /// Floats accept integer columns, and an all-null column satisfies any
    /// nullable expectation.
    pub fn accepts(self, observed: ColumnType) -> bool {
        match (self, observed) {
            (_, ColumnType::Null) => true,
            (ColumnType::Float, ColumnType::Integer) => true,
            (ColumnType::Categorical, _) => true,
            (expected, observed) => expected == observed,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "int64",
            ColumnType::Float => "float64",
            ColumnType::String => "str",
            ColumnType::Categorical => "category",
            ColumnType::Null => "null",
        };
        f.write_str(name)
    }
}

/// Schema definition for a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub columns: Vec<ColumnSchema>,
}

impl SchemaDefinition {
    pub fn get(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Schema for a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

/// Infer a column type from its non-null values.
pub fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a Cell>,
{
    let mut has_int = false;
    let mut has_float = false;
    let mut has_string = false;

    for v in values {
        match v {
            Cell::Int(_) => has_int = true,
            Cell::Float(_) => has_float = true,
            Cell::Text(_) => has_string = true,
            Cell::Null => {}
        }
    }

    if has_string {
        return ColumnType::String;
    }
    if has_float {
        return ColumnType::Float;
    }
    if has_int {
        return ColumnType::Integer;
    }
    ColumnType::Null
}

/// Infer the schema of a table. Columns cast to categorical report as such.
pub fn infer_schema(table: &Table) -> SchemaDefinition {
    let columns = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let cells = table.rows.iter().map(|row| &row[i]);
            let dtype = if table.is_categorical(name) {
                ColumnType::Categorical
            } else {
                infer_column_type(cells.clone())
            };
            ColumnSchema {
                name: name.clone(),
                dtype,
                nullable: cells.clone().any(Cell::is_null),
            }
        })
        .collect();
    SchemaDefinition { columns }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_column_type_int_with_nulls() {
        let values = [Cell::Int(1), Cell::Null, Cell::Int(3)];
        assert_eq!(infer_column_type(&values), ColumnType::Integer);
    }

    #[test]
    fn test_infer_column_type_mixed_numeric() {
        let values = [Cell::Int(1), Cell::Float(2.5)];
        assert_eq!(infer_column_type(&values), ColumnType::Float);
    }

    #[test]
    fn test_infer_column_type_string() {
        let values = [Cell::Int(1), Cell::Text("a".into())];
        assert_eq!(infer_column_type(&values), ColumnType::String);
    }

    #[test]
    fn test_accepts() {
        assert!(ColumnType::Float.accepts(ColumnType::Integer));
        assert!(!ColumnType::Integer.accepts(ColumnType::Float));
        assert!(ColumnType::Integer.accepts(ColumnType::Null));
        assert!(!ColumnType::Float.accepts(ColumnType::String));
    }

    #[test]
    fn test_infer_schema() {
        let mut table = Table::from_rows(
            vec!["age".into(), "cp".into()],
            vec![vec![Cell::Int(63), Cell::Int(1)], vec![Cell::Null, Cell::Int(4)]],
        )
        .unwrap();
        table.mark_categorical("cp").unwrap();
        let schema = infer_schema(&table);
        assert_eq!(schema.columns.len(), 2);
        assert_eq!(schema.columns[0].dtype, ColumnType::Integer);
        assert!(schema.columns[0].nullable);
        assert_eq!(schema.get("cp").unwrap().dtype, ColumnType::Categorical);
    }
}
