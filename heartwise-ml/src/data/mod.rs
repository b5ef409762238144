//! Data stages: combining, validation, cleaning and splitting.

pub mod clean;
pub mod combine;
pub mod correlation;
pub mod schema;
pub mod split;
pub mod table;
pub mod validate;

pub use clean::{clean, clean_csv};
pub use combine::{combine_load_data, combine_to_csv};
pub use schema::{ColumnSchema, ColumnType, SchemaDefinition};
pub use split::{split_to_files, train_test_split};
pub use table::{Cell, Table};
pub use validate::{CheckOutcome, CheckStatus, ValidationReport, run_validation};
