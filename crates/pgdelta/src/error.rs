use thiserror::Error;

/// Errors produced while building a schema or diffing two schemas.
///
/// Every error is terminal for the call: no partial script is returned.
/// Each variant carries enough context (object name, statement text) for
/// a human to correct the offending input.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse DDL: {0}")]
    Parse(#[from] pgdelta_sql::ParseError),

    #[error("statement references unknown table {table}: {statement}")]
    UnknownTable { table: String, statement: String },

    #[error("{kind} {name} is defined more than once")]
    Duplicate { kind: &'static str, name: String },

    #[error(
        "foreign key on {table} references {referenced} without a column list, \
         and {referenced} has no single-column primary key"
    )]
    AmbiguousReference { table: String, referenced: String },

    #[error("unsupported schema change: {0}")]
    UnsupportedChange(String),
}
