//! Typed DDL statements.
//!
//! This is the contract between the parser and the schema model: every
//! recognized statement becomes one of these values. Statements retain
//! their raw source text (`text`) so that create statements can later be
//! replayed verbatim instead of being re-serialized from the tree.

/// A possibly schema-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectName {
    pub schema: Option<String>,
    pub name: String,
}

impl ObjectName {
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// The schema this name lives in, defaulting to `public`.
    pub fn schema_or_public(&self) -> &str {
        self.schema.as_deref().unwrap_or("public")
    }
}

/// A recognized DDL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTable),
    CreateIndex(CreateIndex),
    CreateView(CreateView),
    CreatePolicy(CreatePolicy),
    CreateType(CreateType),
    CreateExtension(CreateExtension),
    AlterTable(AlterTable),
}

impl Statement {
    /// Raw source text of the statement, without the trailing semicolon.
    pub fn text(&self) -> &str {
        match self {
            Statement::CreateTable(s) => &s.text,
            Statement::CreateIndex(s) => &s.text,
            Statement::CreateView(s) => &s.text,
            Statement::CreatePolicy(s) => &s.text,
            Statement::CreateType(s) => &s.text,
            Statement::CreateExtension(s) => &s.text,
            Statement::AlterTable(s) => &s.text,
        }
    }
}

/// `CREATE TABLE name (...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: ObjectName,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<TableConstraint>,
    pub text: String,
}

/// A column definition inside `CREATE TABLE` or `ALTER TABLE ADD COLUMN`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub type_name: TypeName,
    pub options: Vec<ColumnOption>,
}

/// A parsed type name.
///
/// `name` holds the lowercased, space-joined core name with multi-word
/// types already folded (`timestamp with time zone`, `character varying`,
/// `double precision`). `text` is the type exactly as written, arguments
/// and array suffix included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    pub name: String,
    pub args: Vec<String>,
    pub array: bool,
    pub text: String,
}

/// An inline column decoration.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnOption {
    NotNull,
    Null,
    /// `DEFAULT <expr>` with the expression as raw text.
    Default(String),
    PrimaryKey,
    Unique,
    /// `REFERENCES tbl [(cols)] [ON DELETE ...] [ON UPDATE ...]`.
    References {
        table: ObjectName,
        columns: Vec<String>,
        on_delete: Option<String>,
        on_update: Option<String>,
    },
    /// `CHECK (<expr>)` with the expression as raw text.
    Check(String),
    /// `GENERATED <class> AS IDENTITY [(seq options)]`.
    Identity(IdentityDef),
    /// `GENERATED ALWAYS AS (<expr>) STORED`.
    GeneratedStored(String),
}

/// Identity class: `GENERATED ALWAYS` vs `GENERATED BY DEFAULT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityClass {
    Always,
    ByDefault,
}

impl IdentityClass {
    pub fn as_sql(self) -> &'static str {
        match self {
            IdentityClass::Always => "ALWAYS",
            IdentityClass::ByDefault => "BY DEFAULT",
        }
    }
}

/// An identity attribute with its sequence options as raw text
/// (`START WITH 10 INCREMENT BY 2`), empty when none were given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityDef {
    pub class: IdentityClass,
    pub sequence_options: Option<String>,
}

/// A table-level constraint, named or anonymous.
#[derive(Debug, Clone, PartialEq)]
pub struct TableConstraint {
    pub name: Option<String>,
    pub kind: TableConstraintKind,
    pub deferrable: bool,
    pub initially_deferred: bool,
}

/// Body of a table-level constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraintKind {
    PrimaryKey {
        columns: Vec<String>,
    },
    Unique {
        columns: Vec<String>,
    },
    ForeignKey {
        columns: Vec<String>,
        ref_table: ObjectName,
        ref_columns: Vec<String>,
        on_delete: Option<String>,
        on_update: Option<String>,
    },
    Check {
        expr: String,
    },
}

/// Sort order of an index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// SQL suffix for this sort order, empty for the ASC default.
    pub fn to_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "",
            SortOrder::Desc => " DESC",
        }
    }
}

/// Nulls placement of an index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullsOrder {
    #[default]
    Default,
    First,
    Last,
}

impl NullsOrder {
    /// SQL suffix for this nulls placement, empty for the default.
    pub fn to_sql(self) -> &'static str {
        match self {
            NullsOrder::Default => "",
            NullsOrder::First => " NULLS FIRST",
            NullsOrder::Last => " NULLS LAST",
        }
    }
}

/// One indexed column or expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    /// Column name, or a parenthesized expression as raw text.
    pub expr: String,
    pub order: SortOrder,
    pub nulls: NullsOrder,
}

impl IndexColumn {
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            order: SortOrder::Asc,
            nulls: NullsOrder::Default,
        }
    }
}

/// `CREATE [UNIQUE] INDEX ... ON table (...) [WHERE ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    /// Index name; synthesized as `<table>_<cols>_idx` when omitted.
    pub name: String,
    pub table: ObjectName,
    pub unique: bool,
    /// Access method from `USING`, e.g. `btree` or `gin`.
    pub method: Option<String>,
    pub columns: Vec<IndexColumn>,
    /// Partial-index predicate as raw text.
    pub predicate: Option<String>,
    pub text: String,
}

/// `CREATE [OR REPLACE] VIEW name AS <body>`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateView {
    pub name: ObjectName,
    pub or_replace: bool,
    /// The defining query as raw text.
    pub body: String,
    pub text: String,
}

/// Command a policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyCommand {
    #[default]
    All,
    Select,
    Insert,
    Update,
    Delete,
}

impl PolicyCommand {
    pub fn as_sql(self) -> &'static str {
        match self {
            PolicyCommand::All => "ALL",
            PolicyCommand::Select => "SELECT",
            PolicyCommand::Insert => "INSERT",
            PolicyCommand::Update => "UPDATE",
            PolicyCommand::Delete => "DELETE",
        }
    }
}

/// `CREATE POLICY name ON table ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePolicy {
    pub name: String,
    pub table: ObjectName,
    pub permissive: bool,
    pub command: PolicyCommand,
    /// Roles from the `TO` clause; defaults to `[PUBLIC]`.
    pub roles: Vec<String>,
    pub using_expr: Option<String>,
    pub check_expr: Option<String>,
    pub text: String,
}

/// Representation of a user-defined type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRepresentation {
    Enum { labels: Vec<String> },
    Composite { fields: Vec<(String, TypeName)> },
}

/// `CREATE TYPE name AS ENUM (...)` or `CREATE TYPE name AS (...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateType {
    pub name: ObjectName,
    pub representation: TypeRepresentation,
    pub text: String,
}

/// `CREATE EXTENSION [IF NOT EXISTS] name ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateExtension {
    pub name: String,
    pub if_not_exists: bool,
    pub text: String,
}

/// `ALTER TABLE name <operation>`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlterTable {
    pub table: ObjectName,
    pub operation: AlterTableOp,
    pub text: String,
}

/// The single operation of an `ALTER TABLE` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterTableOp {
    AddColumn(ColumnDef),
    AddConstraint(TableConstraint),
    /// MySQL-flavored `ADD INDEX name (cols)`, accepted on ingest.
    AddIndex {
        name: String,
        unique: bool,
        columns: Vec<IndexColumn>,
    },
}
