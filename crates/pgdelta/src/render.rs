//! Render changes as DDL statements.
//!
//! Identifiers are double-quoted and schema-qualified. Create statements
//! whose source text was retained (`CREATE TABLE`, `CREATE INDEX`,
//! `CREATE VIEW`, `CREATE POLICY`, `CREATE TYPE`, `CREATE EXTENSION`)
//! are replayed verbatim; everything else is synthesized, and the
//! synthesized shapes are pinned bit-exact by the test suite.

use pgdelta_sql::{IndexColumn, quote_ident, quote_qualified};

use crate::diff::{Change, TableRef};
use crate::schema::{Column, ConstraintKind, ForeignKey, Index};

fn table_name(table: &TableRef) -> String {
    quote_qualified(&table.schema, &table.name)
}

/// Render one change as a single DDL statement.
pub fn render_change(change: &Change) -> String {
    match change {
        Change::CreateExtension { statement_text, .. } => format!("{statement_text};"),
        Change::CreateType(ty) => format!("{};", ty.statement_text),
        Change::DropType { schema, name } => {
            format!("DROP TYPE {};", quote_qualified(schema, name))
        }
        Change::CreateTable(table) => format!("{};", table.statement_text),
        Change::DropTable(table) => format!("DROP TABLE {};", table_name(table)),
        Change::AddColumn { table, column } => {
            format!(
                "ALTER TABLE {} ADD COLUMN {};",
                table_name(table),
                column_definition(column)
            )
        }
        Change::DropColumn { table, column } => {
            format!(
                "ALTER TABLE {} DROP COLUMN {};",
                table_name(table),
                quote_ident(column)
            )
        }
        Change::AlterColumnType {
            table,
            column,
            type_text,
        } => {
            format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {};",
                table_name(table),
                quote_ident(column),
                type_text
            )
        }
        Change::AlterColumnNullable {
            table,
            column,
            nullable,
        } => {
            let action = if *nullable { "DROP" } else { "SET" };
            format!(
                "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL;",
                table_name(table),
                quote_ident(column),
                action
            )
        }
        Change::AlterColumnDefault {
            table,
            column,
            default,
        } => match default {
            Some(expr) => format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                table_name(table),
                quote_ident(column),
                expr
            ),
            None => format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;",
                table_name(table),
                quote_ident(column)
            ),
        },
        Change::AddIdentity {
            table,
            column,
            identity,
        } => {
            let options = match &identity.sequence_options {
                Some(options) => format!(" ({options})"),
                None => String::new(),
            };
            format!(
                "ALTER TABLE {} ALTER COLUMN {} ADD GENERATED {} AS IDENTITY{};",
                table_name(table),
                quote_ident(column),
                identity.class.as_sql(),
                options
            )
        }
        Change::DropIdentity { table, column } => {
            format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP IDENTITY IF EXISTS;",
                table_name(table),
                quote_ident(column)
            )
        }
        Change::SetIdentityClass {
            table,
            column,
            class,
        } => {
            format!(
                "ALTER TABLE {} ALTER COLUMN {} SET GENERATED {};",
                table_name(table),
                quote_ident(column),
                class.as_sql()
            )
        }
        Change::AddConstraint { table, constraint } => match &constraint.kind {
            // Primary keys are added without a constraint name; the
            // database assigns the default `<table>_pkey`.
            ConstraintKind::PrimaryKey { columns } => {
                format!(
                    "ALTER TABLE {} ADD primary key ({});",
                    table_name(table),
                    quoted_list(columns)
                )
            }
            kind => {
                let mut sql = format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} {}",
                    table_name(table),
                    quote_ident(&constraint.name),
                    constraint_body(kind)
                );
                if constraint.deferrable {
                    sql.push_str(" DEFERRABLE");
                }
                if constraint.initially_deferred {
                    sql.push_str(" INITIALLY DEFERRED");
                }
                sql.push(';');
                sql
            }
        },
        Change::DropConstraint { table, constraint } => {
            format!(
                "ALTER TABLE {} DROP CONSTRAINT {};",
                table_name(table),
                quote_ident(&constraint.name)
            )
        }
        Change::CreateIndex { index, .. } => match &index.statement_text {
            Some(text) => format!("{text};"),
            None => synthesized_index(index),
        },
        Change::DropIndex { index, .. } => {
            format!("DROP INDEX {};", quote_ident(&index.name))
        }
        Change::CreateView(view) => format!("{};", view.statement_text),
        Change::ReplaceView(view) => {
            format!(
                "CREATE OR REPLACE VIEW {} AS {};",
                quote_qualified(&view.schema, &view.name),
                view.body
            )
        }
        Change::DropView { schema, name } => {
            format!("DROP VIEW {};", quote_qualified(schema, name))
        }
        Change::CreatePolicy { policy, .. } => format!("{};", policy.statement_text),
        Change::DropPolicy { table, policy } => {
            format!(
                "DROP POLICY {} ON {};",
                quote_ident(&policy.name),
                table_name(table)
            )
        }
    }
}

/// The column clause of `ADD COLUMN` (also reused by the schema export):
/// name, type as written, then nullability, default and identity or
/// generated clauses.
pub(crate) fn column_definition(column: &Column) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), column.type_text);
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(&format!(" DEFAULT {default}"));
    }
    if let Some(identity) = &column.identity {
        sql.push_str(&format!(" GENERATED {} AS IDENTITY", identity.class.as_sql()));
        if let Some(options) = &identity.sequence_options {
            sql.push_str(&format!(" ({options})"));
        }
    }
    if let Some(expr) = &column.generated {
        sql.push_str(&format!(" GENERATED ALWAYS AS ({expr}) STORED"));
    }
    sql
}

fn constraint_body(kind: &ConstraintKind) -> String {
    match kind {
        ConstraintKind::PrimaryKey { columns } => {
            format!("PRIMARY KEY ({})", quoted_list(columns))
        }
        ConstraintKind::Unique { columns } => format!("UNIQUE ({})", quoted_list(columns)),
        ConstraintKind::ForeignKey(fk) => foreign_key_body(fk),
        ConstraintKind::Check { expr } => format!("CHECK ({expr})"),
    }
}

fn foreign_key_body(fk: &ForeignKey) -> String {
    let target = if fk.ref_schema == "public" {
        quote_ident(&fk.ref_table)
    } else {
        quote_qualified(&fk.ref_schema, &fk.ref_table)
    };
    let mut sql = format!(
        "FOREIGN KEY ({}) REFERENCES {} ({})",
        quoted_list(&fk.columns),
        target,
        quoted_list(&fk.ref_columns)
    );
    if let Some(action) = &fk.on_delete {
        sql.push_str(&format!(" ON DELETE {action}"));
    }
    if let Some(action) = &fk.on_update {
        sql.push_str(&format!(" ON UPDATE {action}"));
    }
    sql
}

/// Synthesized `CREATE INDEX`, used for indexes that were declared
/// through `ALTER TABLE ADD INDEX` and carry no original statement.
fn synthesized_index(index: &Index) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    let columns: Vec<String> = index.columns.iter().map(render_index_column).collect();
    let method = match &index.method {
        Some(method) => format!(" USING {method}"),
        None => String::new(),
    };
    let predicate = match &index.predicate {
        Some(predicate) => format!(" WHERE {predicate}"),
        None => String::new(),
    };
    format!(
        "CREATE {}INDEX {} ON {}{} ({}){};",
        unique,
        quote_ident(&index.name),
        quote_qualified(&index.table_schema, &index.table),
        method,
        columns.join(", "),
        predicate
    )
}

fn render_index_column(column: &IndexColumn) -> String {
    let expr = if column
        .expr
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_')
    {
        quote_ident(&column.expr)
    } else {
        column.expr.clone()
    };
    format!("{}{}{}", expr, column.order.to_sql(), column.nulls.to_sql())
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|name| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Constraint, Identity};
    use pgdelta_sql::{IdentityClass, NullsOrder, SortOrder};

    fn users() -> TableRef {
        TableRef {
            schema: "public".to_string(),
            name: "users".to_string(),
        }
    }

    fn make_column(name: &str, type_text: &str, nullable: bool) -> Column {
        Column {
            name: name.to_string(),
            type_name: type_text.to_string(),
            type_args: Vec::new(),
            array: false,
            type_text: type_text.to_string(),
            nullable,
            default: None,
            identity: None,
            generated: None,
            via_alter: false,
        }
    }

    #[test]
    fn snapshot_add_column() {
        let mut column = make_column("age", "integer", false);
        column.default = Some("0".to_string());
        let sql = render_change(&Change::AddColumn {
            table: users(),
            column,
        });
        insta::assert_snapshot!(
            sql,
            @r#"ALTER TABLE "public"."users" ADD COLUMN "age" integer NOT NULL DEFAULT 0;"#
        );
    }

    #[test]
    fn snapshot_add_identity_column() {
        let mut column = make_column("id", "bigint", false);
        column.identity = Some(Identity {
            class: IdentityClass::ByDefault,
            sequence_options: Some("START WITH 10".to_string()),
        });
        let sql = render_change(&Change::AddColumn {
            table: users(),
            column,
        });
        insta::assert_snapshot!(
            sql,
            @r#"ALTER TABLE "public"."users" ADD COLUMN "id" bigint NOT NULL GENERATED BY DEFAULT AS IDENTITY (START WITH 10);"#
        );
    }

    #[test]
    fn snapshot_alter_column_type() {
        let sql = render_change(&Change::AlterColumnType {
            table: users(),
            column: "name".to_string(),
            type_text: "varchar(40)".to_string(),
        });
        insta::assert_snapshot!(
            sql,
            @r#"ALTER TABLE "public"."users" ALTER COLUMN "name" TYPE varchar(40);"#
        );
    }

    #[test]
    fn snapshot_nullability() {
        let set = render_change(&Change::AlterColumnNullable {
            table: users(),
            column: "name".to_string(),
            nullable: false,
        });
        insta::assert_snapshot!(
            set,
            @r#"ALTER TABLE "public"."users" ALTER COLUMN "name" SET NOT NULL;"#
        );

        let drop = render_change(&Change::AlterColumnNullable {
            table: users(),
            column: "name".to_string(),
            nullable: true,
        });
        insta::assert_snapshot!(
            drop,
            @r#"ALTER TABLE "public"."users" ALTER COLUMN "name" DROP NOT NULL;"#
        );
    }

    #[test]
    fn snapshot_defaults() {
        let set = render_change(&Change::AlterColumnDefault {
            table: users(),
            column: "active".to_string(),
            default: Some("false".to_string()),
        });
        insta::assert_snapshot!(
            set,
            @r#"ALTER TABLE "public"."users" ALTER COLUMN "active" SET DEFAULT false;"#
        );

        let drop = render_change(&Change::AlterColumnDefault {
            table: users(),
            column: "active".to_string(),
            default: None,
        });
        insta::assert_snapshot!(
            drop,
            @r#"ALTER TABLE "public"."users" ALTER COLUMN "active" DROP DEFAULT;"#
        );
    }

    #[test]
    fn snapshot_identity_changes() {
        let add = render_change(&Change::AddIdentity {
            table: users(),
            column: "id".to_string(),
            identity: Identity {
                class: IdentityClass::Always,
                sequence_options: None,
            },
        });
        insta::assert_snapshot!(
            add,
            @r#"ALTER TABLE "public"."users" ALTER COLUMN "id" ADD GENERATED ALWAYS AS IDENTITY;"#
        );

        let drop = render_change(&Change::DropIdentity {
            table: users(),
            column: "id".to_string(),
        });
        insta::assert_snapshot!(
            drop,
            @r#"ALTER TABLE "public"."users" ALTER COLUMN "id" DROP IDENTITY IF EXISTS;"#
        );

        let set = render_change(&Change::SetIdentityClass {
            table: users(),
            column: "id".to_string(),
            class: IdentityClass::ByDefault,
        });
        insta::assert_snapshot!(
            set,
            @r#"ALTER TABLE "public"."users" ALTER COLUMN "id" SET GENERATED BY DEFAULT;"#
        );
    }

    #[test]
    fn snapshot_add_foreign_key() {
        let constraint = Constraint {
            name: "posts_ibfk_1".to_string(),
            kind: ConstraintKind::ForeignKey(ForeignKey {
                columns: vec!["user_id".to_string()],
                ref_schema: "public".to_string(),
                ref_table: "users".to_string(),
                ref_columns: vec!["id".to_string()],
                on_delete: None,
                on_update: None,
            }),
            deferrable: false,
            initially_deferred: false,
            via_alter: false,
        };
        let sql = render_change(&Change::AddConstraint {
            table: TableRef {
                schema: "public".to_string(),
                name: "posts".to_string(),
            },
            constraint,
        });
        insta::assert_snapshot!(
            sql,
            @r#"ALTER TABLE "public"."posts" ADD CONSTRAINT "posts_ibfk_1" FOREIGN KEY ("user_id") REFERENCES "users" ("id");"#
        );
    }

    #[test]
    fn snapshot_add_primary_key_has_no_constraint_name() {
        let constraint = Constraint {
            name: "users_pkey".to_string(),
            kind: ConstraintKind::PrimaryKey {
                columns: vec!["id".to_string(), "tenant_id".to_string()],
            },
            deferrable: false,
            initially_deferred: false,
            via_alter: false,
        };
        let sql = render_change(&Change::AddConstraint {
            table: users(),
            constraint,
        });
        insta::assert_snapshot!(
            sql,
            @r#"ALTER TABLE "public"."users" ADD primary key ("id", "tenant_id");"#
        );
    }

    #[test]
    fn snapshot_drop_statements() {
        let drop_constraint = render_change(&Change::DropConstraint {
            table: users(),
            constraint: Constraint {
                name: "users_pkey".to_string(),
                kind: ConstraintKind::PrimaryKey {
                    columns: vec!["id".to_string()],
                },
                deferrable: false,
                initially_deferred: false,
                via_alter: false,
            },
        });
        insta::assert_snapshot!(
            drop_constraint,
            @r#"ALTER TABLE "public"."users" DROP CONSTRAINT "users_pkey";"#
        );

        let drop_table = render_change(&Change::DropTable(TableRef {
            schema: "public".to_string(),
            name: "bigdata".to_string(),
        }));
        insta::assert_snapshot!(drop_table, @r#"DROP TABLE "public"."bigdata";"#);

        let drop_view = render_change(&Change::DropView {
            schema: "public".to_string(),
            name: "v".to_string(),
        });
        insta::assert_snapshot!(drop_view, @r#"DROP VIEW "public"."v";"#);
    }

    #[test]
    fn snapshot_synthesized_index() {
        let index = Index {
            name: "users_email_idx".to_string(),
            table_schema: "public".to_string(),
            table: "users".to_string(),
            unique: true,
            method: None,
            columns: vec![
                IndexColumn {
                    expr: "email".to_string(),
                    order: SortOrder::Asc,
                    nulls: NullsOrder::Default,
                },
                IndexColumn {
                    expr: "created_at".to_string(),
                    order: SortOrder::Desc,
                    nulls: NullsOrder::Last,
                },
            ],
            predicate: None,
            statement_text: None,
        };
        let sql = render_change(&Change::CreateIndex {
            table: users(),
            index,
        });
        insta::assert_snapshot!(
            sql,
            @r#"CREATE UNIQUE INDEX "users_email_idx" ON "public"."users" ("email", "created_at" DESC NULLS LAST);"#
        );
    }
}
