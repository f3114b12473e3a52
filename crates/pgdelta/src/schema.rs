//! The neutral schema model.
//!
//! Pure data: tables, columns, constraints, indexes, views, policies,
//! user-defined types and extensions, keyed by name in declaration order.
//! Values are immutable once built by ingest; the differ only reads them.
//!
//! Opaque SQL fragments (defaults, check bodies, view bodies, policy
//! predicates, index predicates) are stored exactly as written. The differ
//! compares them through [`crate::normalize`], never byte-for-byte.

use indexmap::IndexMap;
use pgdelta_sql::{IdentityClass, IndexColumn, PolicyCommand, TypeRepresentation};

use crate::Error;
use crate::ingest;

/// A complete database schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// Tables keyed by qualified name (`schema.table`).
    pub tables: IndexMap<String, Table>,
    /// Views keyed by qualified name.
    pub views: IndexMap<String, View>,
    /// User-defined types keyed by qualified name.
    pub types: IndexMap<String, TypeDef>,
    /// Extensions by name, mapped to their create statement text.
    pub extensions: IndexMap<String, String>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a DDL script and fold it into a schema.
    pub fn from_sql(sql: &str) -> Result<Self, Error> {
        let statements = pgdelta_sql::parse_sql(sql)?;
        ingest::build_schema(&statements)
    }

    /// Get a table by its qualified key.
    pub fn get_table(&self, schema: &str, name: &str) -> Option<&Table> {
        self.tables.get(&qualified_key(schema, name))
    }
}

/// Key used for schema-qualified object maps.
pub(crate) fn qualified_key(schema: &str, name: &str) -> String {
    format!("{schema}.{name}")
}

/// A database table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub schema: String,
    pub name: String,
    /// Columns in declaration order.
    pub columns: IndexMap<String, Column>,
    /// Constraints by name, inline decorations already lifted.
    pub constraints: IndexMap<String, Constraint>,
    /// Indexes by name.
    pub indexes: IndexMap<String, Index>,
    /// Row-level security policies by name.
    pub policies: IndexMap<String, Policy>,
    /// The raw `CREATE TABLE` text, replayed verbatim when the whole
    /// table is new. Columns and constraints added later via `ALTER
    /// TABLE` are not part of it and carry `via_alter`.
    pub statement_text: String,
}

impl Table {
    /// The primary-key constraint, if any.
    pub fn primary_key(&self) -> Option<&Constraint> {
        self.constraints
            .values()
            .find(|c| matches!(c.kind, ConstraintKind::PrimaryKey { .. }))
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// Folded core type name, lowercased (`character varying`, `bigint`).
    pub type_name: String,
    /// Type arguments as written (`["5", "2"]` for `numeric(5, 2)`).
    pub type_args: Vec<String>,
    pub array: bool,
    /// The type exactly as written in the DDL (`varchar(40)`), used when
    /// rendering so the user's spelling survives.
    pub type_text: String,
    pub nullable: bool,
    /// Default expression as raw text.
    pub default: Option<String>,
    pub identity: Option<Identity>,
    /// `GENERATED ALWAYS AS (<expr>) STORED` expression.
    pub generated: Option<String>,
    /// True when this column arrived via `ALTER TABLE ADD COLUMN` rather
    /// than the table's `CREATE TABLE` statement.
    pub via_alter: bool,
}

/// An identity attribute.
///
/// Sequence options are recorded for new identity columns and ignored
/// when both sides of a diff already carry an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub class: IdentityClass,
    pub sequence_options: Option<String>,
}

/// A named table constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub deferrable: bool,
    pub initially_deferred: bool,
    /// True when added via `ALTER TABLE ADD CONSTRAINT` after the table
    /// was created.
    pub via_alter: bool,
}

/// Constraint payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    PrimaryKey { columns: Vec<String> },
    Unique { columns: Vec<String> },
    ForeignKey(ForeignKey),
    Check { expr: String },
}

impl ConstraintKind {
    /// Columns of this table the constraint covers (empty for checks,
    /// whose expressions are opaque).
    pub fn columns(&self) -> &[String] {
        match self {
            ConstraintKind::PrimaryKey { columns } | ConstraintKind::Unique { columns } => columns,
            ConstraintKind::ForeignKey(fk) => &fk.columns,
            ConstraintKind::Check { .. } => &[],
        }
    }
}

/// A foreign-key payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub ref_schema: String,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}

/// A secondary index.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub name: String,
    pub table_schema: String,
    pub table: String,
    pub unique: bool,
    /// Access method (`btree`, `gin`, ...), when given.
    pub method: Option<String>,
    pub columns: Vec<IndexColumn>,
    /// Partial-index predicate as raw text.
    pub predicate: Option<String>,
    /// Raw `CREATE INDEX` text; absent for indexes declared through
    /// `ALTER TABLE ADD INDEX`, which are rendered synthesized.
    pub statement_text: Option<String>,
}

/// A view, with its defining query kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub schema: String,
    pub name: String,
    pub body: String,
    pub statement_text: String,
}

/// A row-level security policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub name: String,
    pub table_schema: String,
    pub table: String,
    pub permissive: bool,
    pub command: PolicyCommand,
    pub roles: Vec<String>,
    pub using_expr: Option<String>,
    pub check_expr: Option<String>,
    pub statement_text: String,
}

/// A user-defined type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub schema: String,
    pub name: String,
    pub representation: TypeRepresentation,
    pub statement_text: String,
}
