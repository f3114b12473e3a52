//! Canonical schema dump, backing the CLI's `--export`.
//!
//! Emits the schema in a fixed order regardless of how the input DDL was
//! arranged: extensions, types, tables (each with its columns first, then
//! a trailing `PRIMARY KEY (...)` entry), the remaining constraints as
//! `ALTER TABLE` statements, then indexes, then views. The output is
//! itself valid input, so a dump can serve as a desired-schema baseline.

use pgdelta_sql::{quote_ident, quote_qualified};

use crate::render;
use crate::schema::{ConstraintKind, Schema, Table};

/// Dump a schema as DDL in canonical order.
pub fn export_schema(schema: &Schema) -> String {
    let mut out = String::new();

    let mut extensions: Vec<&String> = schema.extensions.keys().collect();
    extensions.sort();
    for name in extensions {
        out.push_str(&schema.extensions[name]);
        out.push_str(";\n");
    }

    let mut type_keys: Vec<&String> = schema.types.keys().collect();
    type_keys.sort();
    for key in type_keys {
        out.push_str(&schema.types[key].statement_text);
        out.push_str(";\n");
    }

    let mut table_keys: Vec<&String> = schema.tables.keys().collect();
    table_keys.sort();

    for key in &table_keys {
        export_table(&mut out, &schema.tables[*key]);
    }

    // Foreign keys and the other non-PK constraints come after every
    // table exists.
    for key in &table_keys {
        let table = &schema.tables[*key];
        let mut names: Vec<&String> = table.constraints.keys().collect();
        names.sort();
        for name in names {
            let constraint = &table.constraints[name];
            if matches!(constraint.kind, ConstraintKind::PrimaryKey { .. }) {
                continue;
            }
            out.push_str(&render::render_change(&crate::Change::AddConstraint {
                table: crate::TableRef {
                    schema: table.schema.clone(),
                    name: table.name.clone(),
                },
                constraint: constraint.clone(),
            }));
            out.push('\n');
        }
    }

    for key in &table_keys {
        let table = &schema.tables[*key];
        let mut names: Vec<&String> = table.indexes.keys().collect();
        names.sort();
        for name in names {
            let index = &table.indexes[name];
            out.push_str(&render::render_change(&crate::Change::CreateIndex {
                table: crate::TableRef {
                    schema: table.schema.clone(),
                    name: table.name.clone(),
                },
                index: index.clone(),
            }));
            out.push('\n');
        }
    }

    let mut view_keys: Vec<&String> = schema.views.keys().collect();
    view_keys.sort();
    for key in view_keys {
        out.push_str(&schema.views[key].statement_text);
        out.push_str(";\n");
    }

    out
}

/// One table: columns first, then the `PRIMARY KEY (...)` entry.
fn export_table(out: &mut String, table: &Table) {
    out.push_str(&format!(
        "CREATE TABLE {} (\n",
        quote_qualified(&table.schema, &table.name)
    ));
    let mut entries: Vec<String> = table
        .columns
        .values()
        .map(|column| format!("    {}", render::column_definition(column)))
        .collect();
    if let Some(pk) = table.primary_key() {
        let columns = pk
            .kind
            .columns()
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        entries.push(format!("    PRIMARY KEY ({columns})"));
    }
    out.push_str(&entries.join(",\n"));
    out.push_str("\n);\n");
}
