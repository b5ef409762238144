//! Transformer + estimator pipelines over tables.

use crate::algorithms::{ClassicalAlgorithm, Classifier};
use crate::data::table::{Cell, Table};
use crate::error::MlError;
use crate::features::transforms::{ColumnTransformer, FittedTransformer};
use ndarray::Array2;

/// Dense matrix from a table whose cells are all numeric.
pub fn table_to_matrix(table: &Table) -> Result<Array2<f64>, MlError> {
    let mut out = Array2::zeros((table.row_count(), table.column_count()));
    for (r, row) in table.rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            out[[r, c]] = cell.as_f64().ok_or_else(|| {
                MlError::invalid_input(format!(
                    "column '{}' row {r}: {cell} is not a number; pass a preprocessor",
                    table.columns[c]
                ))
            })?;
        }
    }
    Ok(out)
}

/// Maps label values to class indices, in sorted label order.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEncoding {
    pub classes: Vec<Cell>,
}

impl LabelEncoding {
    /// Classes are the sorted union of the first column of every table.
    pub fn fit(tables: &[&Table]) -> Result<Self, MlError> {
        let mut combined: Option<Table> = None;
        for table in tables {
            let column = label_column(table)?;
            let single = table.select(&[column.to_string()])?;
            match combined.as_mut() {
                Some(all) => all.append(Table::from_rows(all.columns.clone(), single.rows)?)?,
                None => combined = Some(single),
            }
        }
        let combined = combined.ok_or_else(|| MlError::invalid_input("no label tables given"))?;
        let classes = combined.levels(&combined.columns[0])?;
        if classes.len() < 2 {
            return Err(MlError::dataset(format!(
                "need at least two label classes, found {}",
                classes.len()
            )));
        }
        Ok(Self { classes })
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Class indices for the first column of `table`.
    pub fn encode(&self, table: &Table) -> Result<Vec<usize>, MlError> {
        let column = label_column(table)?;
        table
            .column(column)?
            .into_iter()
            .enumerate()
            .map(|(row, cell)| {
                self.classes
                    .iter()
                    .position(|c| same_label(c, cell))
                    .ok_or_else(|| {
                        MlError::dataset(format!("row {row}: unknown or missing label '{cell}'"))
                    })
            })
            .collect()
    }

    /// Report names, one per class index.
    pub fn names(&self) -> Vec<String> {
        self.classes.iter().map(Cell::to_field).collect()
    }
}

fn same_label(a: &Cell, b: &Cell) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => !a.is_null() && a == b,
    }
}

fn label_column(table: &Table) -> Result<&str, MlError> {
    match table.columns.as_slice() {
        [only] => Ok(only.as_str()),
        other => Err(MlError::invalid_input(format!(
            "label table must have exactly one column, found {}",
            other.len()
        ))),
    }
}

/// An optional column transformer followed by one estimator.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub transformer: Option<ColumnTransformer>,
    pub algorithm: ClassicalAlgorithm,
}

/// A pipeline fitted on one training set.
#[derive(Debug)]
pub struct FittedPipeline {
    pub transformer: Option<FittedTransformer>,
    pub algorithm: ClassicalAlgorithm,
    pub n_classes: usize,
    estimator: Box<dyn Classifier>,
}

impl Pipeline {
    pub fn new(transformer: Option<ColumnTransformer>, algorithm: ClassicalAlgorithm) -> Self {
        Self {
            transformer,
            algorithm,
        }
    }

    /// Fit the transformer on `x`, then the estimator on its output.
    pub fn fit(&self, x: &Table, y: &[usize], n_classes: usize) -> Result<FittedPipeline, MlError> {
        let transformer = self.transformer.as_ref().map(|t| t.fit(x)).transpose()?;
        let features = match &transformer {
            Some(fitted) => fitted.transform(x)?,
            None => table_to_matrix(x)?,
        };
        let mut estimator = self.algorithm.build();
        estimator.fit(features.view(), y, n_classes)?;
        Ok(FittedPipeline {
            transformer,
            algorithm: self.algorithm.clone(),
            n_classes,
            estimator,
        })
    }
}

impl FittedPipeline {
    fn features(&self, x: &Table) -> Result<Array2<f64>, MlError> {
        match &self.transformer {
            Some(fitted) => fitted.transform(x),
            None => table_to_matrix(x),
        }
    }

    pub fn predict(&self, x: &Table) -> Result<Vec<usize>, MlError> {
        self.estimator.predict(self.features(x)?.view())
    }

    pub fn predict_proba(&self, x: &Table) -> Result<Array2<f64>, MlError> {
        self.estimator.predict_proba(self.features(x)?.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::ModelFamily;
    use crate::config::HandleUnknown;
    use pretty_assertions::assert_eq;

    fn labels(values: &[i64]) -> Table {
        Table::from_rows(
            vec!["label".into()],
            values.iter().map(|&v| vec![Cell::Int(v)]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_label_encoding_uses_sorted_union() {
        let train = labels(&[2, 0, 2]);
        let test = labels(&[1, 0]);
        let encoding = LabelEncoding::fit(&[&train, &test]).unwrap();
        assert_eq!(encoding.names(), vec!["0", "1", "2"]);
        assert_eq!(encoding.encode(&train).unwrap(), vec![2, 0, 2]);
        assert_eq!(encoding.encode(&test).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_label_encoding_rejects_missing_label() {
        let encoding = LabelEncoding::fit(&[&labels(&[0, 1])]).unwrap();
        let mut test = labels(&[0]);
        test.rows[0][0] = Cell::Null;
        assert!(encoding.encode(&test).is_err());
    }

    #[test]
    fn test_table_to_matrix_rejects_text() {
        let table = Table::from_rows(
            vec!["a".into()],
            vec![vec![Cell::Float(1.0)], vec![Cell::Text("x".into())]],
        )
        .unwrap();
        assert!(table_to_matrix(&table).is_err());
    }

    #[test]
    fn test_pipeline_with_transformer_predicts() {
        let rows: Vec<Vec<Cell>> = (0..40)
            .map(|i| vec![Cell::Float(i as f64), Cell::Int(1 + i % 2)])
            .collect();
        let x = Table::from_rows(vec!["age".into(), "cp".into()], rows).unwrap();
        let y: Vec<usize> = (0..40).map(|i| usize::from(i >= 20)).collect();
        let transformer = ColumnTransformer {
            numeric: vec!["age".into()],
            categorical: vec!["cp".into()],
            binary: vec![],
            drop: vec![],
            handle_unknown: HandleUnknown::Error,
        };
        let pipeline = Pipeline::new(
            Some(transformer),
            ClassicalAlgorithm::default_for(ModelFamily::DecisionTree, 100),
        );
        let fitted = pipeline.fit(&x, &y, 2).unwrap();
        assert_eq!(fitted.predict(&x).unwrap(), y);
        assert_eq!(fitted.predict_proba(&x).unwrap().ncols(), 2);
    }
}
