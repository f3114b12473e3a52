//! Fold a parsed DDL stream into a [`Schema`].
//!
//! Ingest is where the model is canonicalized: inline column decorations
//! (`PRIMARY KEY`, `UNIQUE`, `REFERENCES`, `CHECK`) become named top-level
//! constraints using PostgreSQL's default naming convention, serial types
//! become plain integer types with an implicit sequence default, and
//! `REFERENCES tbl` without a column list is resolved against the target
//! table's primary key. Users mix inline decorations with top-level
//! `ALTER TABLE ADD CONSTRAINT`; canonicalizing both into the same shape
//! is what lets the differ compare like with like.

use indexmap::IndexMap;

use pgdelta_sql::{
    AlterTable, AlterTableOp, ColumnDef, ColumnOption, CreateExtension, CreateIndex, CreatePolicy,
    CreateTable, CreateType, CreateView, Statement, TableConstraint, TableConstraintKind,
};

use crate::Error;
use crate::schema::{
    Column, Constraint, ConstraintKind, ForeignKey, Identity, Index, Policy, Schema, Table,
    TypeDef, View, qualified_key,
};

/// Build a schema from a parsed DDL stream.
pub fn build_schema(statements: &[Statement]) -> Result<Schema, Error> {
    let mut schema = Schema::new();
    for statement in statements {
        match statement {
            Statement::CreateTable(create) => ingest_create_table(&mut schema, create)?,
            Statement::CreateIndex(create) => ingest_create_index(&mut schema, create)?,
            Statement::CreateView(create) => ingest_create_view(&mut schema, create)?,
            Statement::CreatePolicy(create) => ingest_create_policy(&mut schema, create)?,
            Statement::CreateType(create) => ingest_create_type(&mut schema, create)?,
            Statement::CreateExtension(create) => ingest_create_extension(&mut schema, create)?,
            Statement::AlterTable(alter) => ingest_alter_table(&mut schema, alter)?,
        }
    }
    Ok(schema)
}

fn ingest_create_table(schema: &mut Schema, create: &CreateTable) -> Result<(), Error> {
    let schema_name = create.name.schema_or_public().to_string();
    let key = qualified_key(&schema_name, &create.name.name);
    if schema.tables.contains_key(&key) {
        if create.if_not_exists {
            return Ok(());
        }
        return Err(Error::Duplicate {
            kind: "table",
            name: key,
        });
    }

    let mut table = Table {
        schema: schema_name,
        name: create.name.name.clone(),
        columns: IndexMap::new(),
        constraints: IndexMap::new(),
        indexes: IndexMap::new(),
        policies: IndexMap::new(),
        statement_text: create.text.clone(),
    };

    for def in &create.columns {
        add_column(&mut table, def, false)?;
    }
    for tc in &create.constraints {
        let constraint = table_constraint(&table.name, tc, false);
        add_constraint(&mut table, constraint)?;
    }
    let resolved = resolve_fk_columns(schema, &table, &create.text)?;
    apply_fk_resolutions(&mut table, resolved);
    apply_primary_key_not_null(&mut table);

    schema.tables.insert(key, table);
    Ok(())
}

/// Build a column from its definition and lift its inline decorations
/// into named constraints on the table.
fn add_column(table: &mut Table, def: &ColumnDef, via_alter: bool) -> Result<(), Error> {
    if table.columns.contains_key(&def.name) {
        return Err(Error::Duplicate {
            kind: "column",
            name: format!("{}.{}", table.name, def.name),
        });
    }

    let mut column = base_column(&table.name, def);
    column.via_alter = via_alter;

    for option in &def.options {
        match option {
            ColumnOption::NotNull => column.nullable = false,
            ColumnOption::Null => column.nullable = true,
            ColumnOption::Default(expr) => column.default = Some(expr.clone()),
            ColumnOption::PrimaryKey => {
                column.nullable = false;
                let constraint = Constraint {
                    name: format!("{}_pkey", table.name),
                    kind: ConstraintKind::PrimaryKey {
                        columns: vec![def.name.clone()],
                    },
                    deferrable: false,
                    initially_deferred: false,
                    via_alter,
                };
                add_constraint(table, constraint)?;
            }
            ColumnOption::Unique => {
                let constraint = Constraint {
                    name: format!("{}_{}_key", table.name, def.name),
                    kind: ConstraintKind::Unique {
                        columns: vec![def.name.clone()],
                    },
                    deferrable: false,
                    initially_deferred: false,
                    via_alter,
                };
                add_constraint(table, constraint)?;
            }
            ColumnOption::References {
                table: ref_table,
                columns,
                on_delete,
                on_update,
            } => {
                let constraint = Constraint {
                    name: format!("{}_{}_fkey", table.name, def.name),
                    kind: ConstraintKind::ForeignKey(ForeignKey {
                        columns: vec![def.name.clone()],
                        ref_schema: ref_table.schema_or_public().to_string(),
                        ref_table: ref_table.name.clone(),
                        ref_columns: columns.clone(),
                        on_delete: on_delete.clone(),
                        on_update: on_update.clone(),
                    }),
                    deferrable: false,
                    initially_deferred: false,
                    via_alter,
                };
                add_constraint(table, constraint)?;
            }
            ColumnOption::Check(expr) => {
                let constraint = Constraint {
                    name: format!("{}_{}_check", table.name, def.name),
                    kind: ConstraintKind::Check { expr: expr.clone() },
                    deferrable: false,
                    initially_deferred: false,
                    via_alter,
                };
                add_constraint(table, constraint)?;
            }
            ColumnOption::Identity(identity) => {
                // Identity columns are NOT NULL by construction.
                column.nullable = false;
                column.identity = Some(Identity {
                    class: identity.class,
                    sequence_options: identity.sequence_options.clone(),
                });
            }
            ColumnOption::GeneratedStored(expr) => {
                column.generated = Some(expr.clone());
            }
        }
    }

    table.columns.insert(def.name.clone(), column);
    Ok(())
}

/// A column with only its type resolved: serial pseudo-types become the
/// matching integer type carrying an implicit sequence default.
fn base_column(table_name: &str, def: &ColumnDef) -> Column {
    let serial = match def.type_name.name.as_str() {
        "serial" | "serial4" => Some("integer"),
        "bigserial" | "serial8" => Some("bigint"),
        "smallserial" | "serial2" => Some("smallint"),
        _ => None,
    };
    let (type_name, type_text, default) = match serial {
        Some(mapped) => (
            mapped.to_string(),
            mapped.to_string(),
            Some(format!(
                "nextval('{}_{}_seq'::regclass)",
                table_name, def.name
            )),
        ),
        None => (
            def.type_name.name.clone(),
            def.type_name.text.clone(),
            None,
        ),
    };

    Column {
        name: def.name.clone(),
        type_name,
        type_args: def.type_name.args.clone(),
        array: def.type_name.array,
        type_text,
        // A serial column is NOT NULL, it is shorthand for
        // `integer NOT NULL DEFAULT nextval(...)`.
        nullable: serial.is_none(),
        default,
        identity: None,
        generated: None,
        via_alter: false,
    }
}

/// Build a named constraint from a table-level constraint clause,
/// synthesizing the PostgreSQL default name when none was given.
fn table_constraint(table_name: &str, tc: &TableConstraint, via_alter: bool) -> Constraint {
    let kind = match &tc.kind {
        TableConstraintKind::PrimaryKey { columns } => ConstraintKind::PrimaryKey {
            columns: columns.clone(),
        },
        TableConstraintKind::Unique { columns } => ConstraintKind::Unique {
            columns: columns.clone(),
        },
        TableConstraintKind::ForeignKey {
            columns,
            ref_table,
            ref_columns,
            on_delete,
            on_update,
        } => ConstraintKind::ForeignKey(ForeignKey {
            columns: columns.clone(),
            ref_schema: ref_table.schema_or_public().to_string(),
            ref_table: ref_table.name.clone(),
            ref_columns: ref_columns.clone(),
            on_delete: on_delete.clone(),
            on_update: on_update.clone(),
        }),
        TableConstraintKind::Check { expr } => ConstraintKind::Check { expr: expr.clone() },
    };
    let name = tc
        .name
        .clone()
        .unwrap_or_else(|| default_constraint_name(table_name, &kind));
    Constraint {
        name,
        kind,
        deferrable: tc.deferrable,
        initially_deferred: tc.initially_deferred,
        via_alter,
    }
}

/// PostgreSQL's default name for an unnamed constraint.
fn default_constraint_name(table_name: &str, kind: &ConstraintKind) -> String {
    match kind {
        ConstraintKind::PrimaryKey { .. } => format!("{table_name}_pkey"),
        ConstraintKind::Unique { columns } => {
            format!("{}_{}_key", table_name, columns.join("_"))
        }
        ConstraintKind::ForeignKey(fk) => match fk.columns.first() {
            Some(first) => format!("{table_name}_{first}_fkey"),
            None => format!("{table_name}_fkey"),
        },
        ConstraintKind::Check { .. } => format!("{table_name}_check"),
    }
}

fn add_constraint(table: &mut Table, constraint: Constraint) -> Result<(), Error> {
    if table.constraints.contains_key(&constraint.name) {
        return Err(Error::Duplicate {
            kind: "constraint",
            name: format!("{}.{}", table.name, constraint.name),
        });
    }
    table.constraints.insert(constraint.name.clone(), constraint);
    Ok(())
}

/// Resolve `REFERENCES tbl` clauses that came without a column list.
///
/// The target must already be declared and must have a single-column
/// primary key; otherwise the reference is ambiguous. Foreign keys with
/// an explicit column list may point at tables declared later.
///
/// Split into a read phase and a write phase so callers can run the read
/// against the schema while the table still sits inside it.
fn resolve_fk_columns(
    schema: &Schema,
    table: &Table,
    statement_text: &str,
) -> Result<Vec<(String, Vec<String>)>, Error> {
    let mut resolved: Vec<(String, Vec<String>)> = Vec::new();
    for constraint in table.constraints.values() {
        let ConstraintKind::ForeignKey(fk) = &constraint.kind else {
            continue;
        };
        if !fk.ref_columns.is_empty() {
            continue;
        }
        let target = if fk.ref_schema == table.schema && fk.ref_table == table.name {
            Some(table)
        } else {
            schema.tables.get(&qualified_key(&fk.ref_schema, &fk.ref_table))
        };
        let Some(target) = target else {
            return Err(Error::UnknownTable {
                table: fk.ref_table.clone(),
                statement: statement_text.to_string(),
            });
        };
        let pk_columns = target.primary_key().and_then(|pk| match &pk.kind {
            ConstraintKind::PrimaryKey { columns } => Some(columns.clone()),
            _ => None,
        });
        match pk_columns {
            Some(columns) if columns.len() == 1 => {
                resolved.push((constraint.name.clone(), columns));
            }
            _ => {
                return Err(Error::AmbiguousReference {
                    table: table.name.clone(),
                    referenced: fk.ref_table.clone(),
                });
            }
        }
    }
    Ok(resolved)
}

/// Re-resolve foreign keys and primary-key nullability after an `ALTER
/// TABLE` touched the table in place.
fn finish_table_update(schema: &mut Schema, key: &str, statement_text: &str) -> Result<(), Error> {
    let resolved = match schema.tables.get(key) {
        Some(table) => resolve_fk_columns(schema, table, statement_text)?,
        None => return Ok(()),
    };
    if let Some(table) = schema.tables.get_mut(key) {
        apply_fk_resolutions(table, resolved);
        apply_primary_key_not_null(table);
    }
    Ok(())
}

fn apply_fk_resolutions(table: &mut Table, resolved: Vec<(String, Vec<String>)>) {
    for (name, columns) in resolved {
        if let Some(constraint) = table.constraints.get_mut(&name)
            && let ConstraintKind::ForeignKey(fk) = &mut constraint.kind
        {
            fk.ref_columns = columns;
        }
    }
}

/// Primary-key columns are NOT NULL whether or not the DDL spelled it out.
fn apply_primary_key_not_null(table: &mut Table) {
    let pk_columns: Vec<String> = match table.primary_key() {
        Some(pk) => pk.kind.columns().to_vec(),
        None => return,
    };
    for name in pk_columns {
        if let Some(column) = table.columns.get_mut(&name) {
            column.nullable = false;
        }
    }
}

fn ingest_create_index(schema: &mut Schema, create: &CreateIndex) -> Result<(), Error> {
    let schema_name = create.table.schema_or_public().to_string();
    let key = qualified_key(&schema_name, &create.table.name);
    let Some(table) = schema.tables.get_mut(&key) else {
        return Err(Error::UnknownTable {
            table: create.table.name.clone(),
            statement: create.text.clone(),
        });
    };
    if table.indexes.contains_key(&create.name) {
        return Err(Error::Duplicate {
            kind: "index",
            name: create.name.clone(),
        });
    }
    table.indexes.insert(
        create.name.clone(),
        Index {
            name: create.name.clone(),
            table_schema: schema_name,
            table: create.table.name.clone(),
            unique: create.unique,
            method: create.method.clone(),
            columns: create.columns.clone(),
            predicate: create.predicate.clone(),
            statement_text: Some(create.text.clone()),
        },
    );
    Ok(())
}

fn ingest_create_view(schema: &mut Schema, create: &CreateView) -> Result<(), Error> {
    let schema_name = create.name.schema_or_public().to_string();
    let key = qualified_key(&schema_name, &create.name.name);
    if schema.views.contains_key(&key) && !create.or_replace {
        return Err(Error::Duplicate {
            kind: "view",
            name: key,
        });
    }
    schema.views.insert(
        key,
        View {
            schema: schema_name,
            name: create.name.name.clone(),
            body: create.body.clone(),
            statement_text: create.text.clone(),
        },
    );
    Ok(())
}

fn ingest_create_policy(schema: &mut Schema, create: &CreatePolicy) -> Result<(), Error> {
    let schema_name = create.table.schema_or_public().to_string();
    let key = qualified_key(&schema_name, &create.table.name);
    let Some(table) = schema.tables.get_mut(&key) else {
        return Err(Error::UnknownTable {
            table: create.table.name.clone(),
            statement: create.text.clone(),
        });
    };
    if table.policies.contains_key(&create.name) {
        return Err(Error::Duplicate {
            kind: "policy",
            name: create.name.clone(),
        });
    }
    table.policies.insert(
        create.name.clone(),
        Policy {
            name: create.name.clone(),
            table_schema: schema_name,
            table: create.table.name.clone(),
            permissive: create.permissive,
            command: create.command,
            roles: create.roles.clone(),
            using_expr: create.using_expr.clone(),
            check_expr: create.check_expr.clone(),
            statement_text: create.text.clone(),
        },
    );
    Ok(())
}

fn ingest_create_type(schema: &mut Schema, create: &CreateType) -> Result<(), Error> {
    let schema_name = create.name.schema_or_public().to_string();
    let key = qualified_key(&schema_name, &create.name.name);
    if schema.types.contains_key(&key) {
        return Err(Error::Duplicate {
            kind: "type",
            name: key,
        });
    }
    schema.types.insert(
        key,
        TypeDef {
            schema: schema_name,
            name: create.name.name.clone(),
            representation: create.representation.clone(),
            statement_text: create.text.clone(),
        },
    );
    Ok(())
}

fn ingest_create_extension(schema: &mut Schema, create: &CreateExtension) -> Result<(), Error> {
    if schema.extensions.contains_key(&create.name) {
        if create.if_not_exists {
            return Ok(());
        }
        return Err(Error::Duplicate {
            kind: "extension",
            name: create.name.clone(),
        });
    }
    schema
        .extensions
        .insert(create.name.clone(), create.text.clone());
    Ok(())
}

fn ingest_alter_table(schema: &mut Schema, alter: &AlterTable) -> Result<(), Error> {
    let schema_name = alter.table.schema_or_public().to_string();
    let key = qualified_key(&schema_name, &alter.table.name);
    if !schema.tables.contains_key(&key) {
        return Err(Error::UnknownTable {
            table: alter.table.name.clone(),
            statement: alter.text.clone(),
        });
    }

    match &alter.operation {
        AlterTableOp::AddColumn(def) => {
            if let Some(table) = schema.tables.get_mut(&key) {
                add_column(table, def, true)?;
            }
            // The new column may carry an inline REFERENCES or PRIMARY KEY.
            finish_table_update(schema, &key, &alter.text)?;
        }
        AlterTableOp::AddConstraint(tc) => {
            if let Some(table) = schema.tables.get_mut(&key) {
                let constraint = table_constraint(&table.name, tc, true);
                add_constraint(table, constraint)?;
            }
            finish_table_update(schema, &key, &alter.text)?;
        }
        AlterTableOp::AddIndex {
            name,
            unique,
            columns,
        } => {
            let Some(table) = schema.tables.get_mut(&key) else {
                return Err(Error::UnknownTable {
                    table: alter.table.name.clone(),
                    statement: alter.text.clone(),
                });
            };
            if table.indexes.contains_key(name) {
                return Err(Error::Duplicate {
                    kind: "index",
                    name: name.clone(),
                });
            }
            table.indexes.insert(
                name.clone(),
                Index {
                    name: name.clone(),
                    table_schema: schema_name,
                    table: alter.table.name.clone(),
                    unique: *unique,
                    method: None,
                    columns: columns.clone(),
                    predicate: None,
                    statement_text: None,
                },
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn schema_of(sql: &str) -> Schema {
        Schema::from_sql(sql).unwrap()
    }

    #[test]
    fn test_inline_constraints_are_lifted() {
        let schema = schema_of(indoc! {"
            CREATE TABLE users (
              id bigint NOT NULL PRIMARY KEY,
              email text UNIQUE,
              age integer CHECK (age >= 0)
            );
        "});
        let table = schema.get_table("public", "users").unwrap();
        assert_eq!(table.constraints.len(), 3);
        assert!(table.constraints.contains_key("users_pkey"));
        assert!(table.constraints.contains_key("users_email_key"));
        assert!(table.constraints.contains_key("users_age_check"));
        // The column keeps only type/nullability, not the decoration.
        assert!(!table.columns["id"].nullable);
    }

    #[test]
    fn test_named_and_inline_constraints_compare_alike() {
        let inline = schema_of("CREATE TABLE t (id bigint PRIMARY KEY);");
        let named = schema_of(indoc! {"
            CREATE TABLE t (
              id bigint NOT NULL,
              CONSTRAINT t_pkey PRIMARY KEY (id)
            );
        "});
        let a = inline.get_table("public", "t").unwrap();
        let b = named.get_table("public", "t").unwrap();
        assert_eq!(
            a.constraints["t_pkey"].kind,
            b.constraints["t_pkey"].kind
        );
    }

    #[test]
    fn test_serial_normalizes_to_integer_with_sequence_default() {
        let schema = schema_of("CREATE TABLE t (id bigserial, n serial);");
        let table = schema.get_table("public", "t").unwrap();
        assert_eq!(table.columns["id"].type_name, "bigint");
        assert_eq!(
            table.columns["id"].default.as_deref(),
            Some("nextval('t_id_seq'::regclass)")
        );
        assert_eq!(table.columns["n"].type_name, "integer");
    }

    #[test]
    fn test_identity_column_is_not_null() {
        let schema = schema_of("CREATE TABLE t (id bigint GENERATED ALWAYS AS IDENTITY);");
        let table = schema.get_table("public", "t").unwrap();
        assert!(!table.columns["id"].nullable);
        assert!(table.columns["id"].identity.is_some());
    }

    #[test]
    fn test_references_without_columns_resolves_to_pk() {
        let schema = schema_of(indoc! {"
            CREATE TABLE users (id bigint PRIMARY KEY);
            CREATE TABLE posts (user_id bigint REFERENCES users);
        "});
        let posts = schema.get_table("public", "posts").unwrap();
        let ConstraintKind::ForeignKey(fk) = &posts.constraints["posts_user_id_fkey"].kind else {
            panic!("expected foreign key");
        };
        assert_eq!(fk.ref_columns, vec!["id"]);
    }

    #[test]
    fn test_references_undeclared_table_fails() {
        let err = Schema::from_sql("CREATE TABLE posts (user_id bigint REFERENCES users);")
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTable { .. }), "got {err:?}");
    }

    #[test]
    fn test_references_composite_pk_is_ambiguous() {
        let err = Schema::from_sql(indoc! {"
            CREATE TABLE pairs (a bigint, b bigint, PRIMARY KEY (a, b));
            CREATE TABLE refs (pair bigint REFERENCES pairs);
        "})
        .unwrap_err();
        assert!(matches!(err, Error::AmbiguousReference { .. }), "got {err:?}");
    }

    #[test]
    fn test_duplicate_table_fails() {
        let err = Schema::from_sql("CREATE TABLE t (a int); CREATE TABLE t (b int);").unwrap_err();
        assert!(matches!(err, Error::Duplicate { kind: "table", .. }));
    }

    #[test]
    fn test_duplicate_column_fails() {
        let err = Schema::from_sql("CREATE TABLE t (a int, a text);").unwrap_err();
        assert!(matches!(err, Error::Duplicate { kind: "column", .. }));
    }

    #[test]
    fn test_index_on_unknown_table_fails() {
        let err = Schema::from_sql("CREATE INDEX idx ON missing (col);").unwrap_err();
        assert!(matches!(err, Error::UnknownTable { .. }));
    }

    #[test]
    fn test_alter_add_column_marked_via_alter() {
        let schema = schema_of(indoc! {"
            CREATE TABLE t (a int);
            ALTER TABLE t ADD COLUMN b text NOT NULL;
        "});
        let table = schema.get_table("public", "t").unwrap();
        assert!(!table.columns["a"].via_alter);
        assert!(table.columns["b"].via_alter);
        assert!(!table.columns["b"].nullable);
    }

    #[test]
    fn test_alter_add_constraint_synthesizes_name() {
        let schema = schema_of(indoc! {"
            CREATE TABLE users (id bigint PRIMARY KEY);
            CREATE TABLE posts (user_id bigint);
            ALTER TABLE posts ADD FOREIGN KEY (user_id) REFERENCES users (id);
        "});
        let posts = schema.get_table("public", "posts").unwrap();
        let constraint = &posts.constraints["posts_user_id_fkey"];
        assert!(constraint.via_alter);
    }

    #[test]
    fn test_table_level_pk_columns_become_not_null() {
        let schema = schema_of("CREATE TABLE t (a bigint, b bigint, PRIMARY KEY (a, b));");
        let table = schema.get_table("public", "t").unwrap();
        assert!(!table.columns["a"].nullable);
        assert!(!table.columns["b"].nullable);
    }

    #[test]
    fn test_policy_on_table() {
        let schema = schema_of(indoc! {"
            CREATE TABLE users (id bigint);
            CREATE POLICY p_users ON users AS PERMISSIVE FOR ALL TO PUBLIC USING (true);
        "});
        let table = schema.get_table("public", "users").unwrap();
        assert!(table.policies.contains_key("p_users"));
    }

    #[test]
    fn test_extension_if_not_exists_is_idempotent() {
        let schema = schema_of(
            "CREATE EXTENSION pgcrypto; CREATE EXTENSION IF NOT EXISTS pgcrypto;",
        );
        assert_eq!(schema.extensions.len(), 1);
    }
}
