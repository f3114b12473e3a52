//! Schema diffing - compare a desired schema against the current one.
//!
//! [`diff`] walks both schemas and produces the list of [`Change`]s that
//! turns `current` into `desired`. It is a pure function: same inputs,
//! same output, including the ordering of independent changes
//! (lexicographic by object kind, schema and name; within one table,
//! column additions and alterations follow the desired declaration order
//! and drops follow the current declaration order).
//!
//! The list it returns is *unordered* with respect to execution
//! dependencies; [`crate::order`] sorts it before rendering.
//!
//! Renames are deliberately not detected: an object that only appears
//! under a new name is modeled as a drop plus an add.

use tracing::debug;

use pgdelta_sql::IdentityClass;

use crate::Error;
use crate::normalize;
use crate::schema::{
    Column, Constraint, ConstraintKind, Identity, Index, Policy, Schema, Table, TypeDef, View,
};

/// The table a change applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    fn of(table: &Table) -> Self {
        Self {
            schema: table.schema.clone(),
            name: table.name.clone(),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A single schema change, not yet rendered as SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Extensions declared in desired are created if absent (and never
    /// dropped, see the extension asymmetry in [`diff`]).
    CreateExtension {
        name: String,
        statement_text: String,
    },
    CreateType(TypeDef),
    DropType {
        schema: String,
        name: String,
    },
    /// Replays the original `CREATE TABLE` statement text.
    CreateTable(Box<Table>),
    DropTable(TableRef),
    AddColumn {
        table: TableRef,
        column: Column,
    },
    DropColumn {
        table: TableRef,
        column: String,
    },
    AlterColumnType {
        table: TableRef,
        column: String,
        type_text: String,
    },
    AlterColumnNullable {
        table: TableRef,
        column: String,
        nullable: bool,
    },
    /// `None` means `DROP DEFAULT`.
    AlterColumnDefault {
        table: TableRef,
        column: String,
        default: Option<String>,
    },
    AddIdentity {
        table: TableRef,
        column: String,
        identity: Identity,
    },
    DropIdentity {
        table: TableRef,
        column: String,
    },
    /// Class only; sequence options of an existing identity are ignored.
    SetIdentityClass {
        table: TableRef,
        column: String,
        class: IdentityClass,
    },
    AddConstraint {
        table: TableRef,
        constraint: Constraint,
    },
    /// Carries the full constraint so the orderer can see what it covers.
    DropConstraint {
        table: TableRef,
        constraint: Constraint,
    },
    CreateIndex {
        table: TableRef,
        index: Index,
    },
    DropIndex {
        table: TableRef,
        index: Index,
    },
    CreateView(View),
    ReplaceView(View),
    DropView {
        schema: String,
        name: String,
    },
    CreatePolicy {
        table: TableRef,
        policy: Policy,
    },
    DropPolicy {
        table: TableRef,
        policy: Policy,
    },
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::CreateExtension { name, .. } => write!(f, "+ extension {name}"),
            Change::CreateType(ty) => write!(f, "+ type {}.{}", ty.schema, ty.name),
            Change::DropType { schema, name } => write!(f, "- type {schema}.{name}"),
            Change::CreateTable(table) => write!(f, "+ table {}.{}", table.schema, table.name),
            Change::DropTable(table) => write!(f, "- table {table}"),
            Change::AddColumn { table, column } => {
                write!(f, "+ column {}.{}", table, column.name)
            }
            Change::DropColumn { table, column } => write!(f, "- column {table}.{column}"),
            Change::AlterColumnType {
                table,
                column,
                type_text,
            } => write!(f, "~ column {table}.{column}: type {type_text}"),
            Change::AlterColumnNullable {
                table,
                column,
                nullable,
            } => {
                let to = if *nullable { "nullable" } else { "not null" };
                write!(f, "~ column {table}.{column}: {to}")
            }
            Change::AlterColumnDefault { table, column, default } => {
                let to = default.as_deref().unwrap_or("(none)");
                write!(f, "~ column {table}.{column}: default {to}")
            }
            Change::AddIdentity { table, column, .. } => {
                write!(f, "+ identity {table}.{column}")
            }
            Change::DropIdentity { table, column } => write!(f, "- identity {table}.{column}"),
            Change::SetIdentityClass { table, column, class } => {
                write!(f, "~ identity {table}.{column}: {}", class.as_sql())
            }
            Change::AddConstraint { table, constraint } => {
                write!(f, "+ constraint {}.{}", table, constraint.name)
            }
            Change::DropConstraint { table, constraint } => {
                write!(f, "- constraint {}.{}", table, constraint.name)
            }
            Change::CreateIndex { index, .. } => write!(f, "+ index {}", index.name),
            Change::DropIndex { index, .. } => write!(f, "- index {}", index.name),
            Change::CreateView(view) => write!(f, "+ view {}.{}", view.schema, view.name),
            Change::ReplaceView(view) => write!(f, "~ view {}.{}", view.schema, view.name),
            Change::DropView { schema, name } => write!(f, "- view {schema}.{name}"),
            Change::CreatePolicy { policy, .. } => write!(f, "+ policy {}", policy.name),
            Change::DropPolicy { policy, .. } => write!(f, "- policy {}", policy.name),
        }
    }
}

/// Compare two schemas and produce the changes that turn `current` into
/// `desired`.
pub fn diff(current: &Schema, desired: &Schema) -> Result<Vec<Change>, Error> {
    let mut changes = Vec::new();

    // Extensions observed in current but not declared in desired are
    // ignored, never dropped. Desired extensions are created if absent.
    let mut extension_names: Vec<&String> = desired.extensions.keys().collect();
    extension_names.sort();
    for name in extension_names {
        if !current.extensions.contains_key(name) {
            changes.push(Change::CreateExtension {
                name: name.clone(),
                statement_text: desired.extensions[name].clone(),
            });
        }
    }

    for key in sorted_union(current.types.keys(), desired.types.keys()) {
        match (current.types.get(&key), desired.types.get(&key)) {
            (None, Some(ty)) => changes.push(Change::CreateType(ty.clone())),
            (Some(ty), None) => changes.push(Change::DropType {
                schema: ty.schema.clone(),
                name: ty.name.clone(),
            }),
            (Some(cur), Some(des)) => {
                // Types are not altered in place; a payload change is a
                // drop plus a create, adjacent in the output.
                if cur.representation != des.representation {
                    debug!(type_name = %key, "type definition changed");
                    changes.push(Change::DropType {
                        schema: cur.schema.clone(),
                        name: cur.name.clone(),
                    });
                    changes.push(Change::CreateType(des.clone()));
                }
            }
            (None, None) => {}
        }
    }

    for key in sorted_union(current.tables.keys(), desired.tables.keys()) {
        match (current.tables.get(&key), desired.tables.get(&key)) {
            (None, Some(table)) => push_create_table(&mut changes, table),
            (Some(table), None) => changes.push(Change::DropTable(TableRef::of(table))),
            (Some(cur), Some(des)) => diff_table(&mut changes, cur, des)?,
            (None, None) => {}
        }
    }

    for key in sorted_union(current.views.keys(), desired.views.keys()) {
        match (current.views.get(&key), desired.views.get(&key)) {
            (None, Some(view)) => changes.push(Change::CreateView(view.clone())),
            (Some(view), None) => changes.push(Change::DropView {
                schema: view.schema.clone(),
                name: view.name.clone(),
            }),
            (Some(cur), Some(des)) => {
                if normalize::normalize_expr(&cur.body) != normalize::normalize_expr(&des.body) {
                    debug!(view = %key, "view body changed");
                    changes.push(Change::ReplaceView(des.clone()));
                }
            }
            (None, None) => {}
        }
    }

    Ok(changes)
}

/// A brand-new table: replay its `CREATE TABLE` text, then everything
/// that is not part of that text — columns and constraints that arrived
/// via `ALTER TABLE`, plus all of its indexes and policies.
fn push_create_table(changes: &mut Vec<Change>, table: &Table) {
    let table_ref = TableRef::of(table);
    changes.push(Change::CreateTable(Box::new(table.clone())));
    for column in table.columns.values() {
        if column.via_alter {
            changes.push(Change::AddColumn {
                table: table_ref.clone(),
                column: column.clone(),
            });
        }
    }
    for constraint in table.constraints.values() {
        if constraint.via_alter {
            changes.push(Change::AddConstraint {
                table: table_ref.clone(),
                constraint: constraint.clone(),
            });
        }
    }
    for index in table.indexes.values() {
        changes.push(Change::CreateIndex {
            table: table_ref.clone(),
            index: index.clone(),
        });
    }
    for policy in table.policies.values() {
        changes.push(Change::CreatePolicy {
            table: table_ref.clone(),
            policy: policy.clone(),
        });
    }
}

/// Diff two tables with the same qualified name.
fn diff_table(changes: &mut Vec<Change>, current: &Table, desired: &Table) -> Result<(), Error> {
    let table = TableRef::of(desired);

    // Columns present in desired: additions and in-place alterations.
    for (name, des_col) in &desired.columns {
        match current.columns.get(name) {
            None => changes.push(Change::AddColumn {
                table: table.clone(),
                column: des_col.clone(),
            }),
            Some(cur_col) => diff_column(changes, &table, cur_col, des_col)?,
        }
    }
    // Columns present only in current are dropped.
    for name in current.columns.keys() {
        if !desired.columns.contains_key(name) {
            changes.push(Change::DropColumn {
                table: table.clone(),
                column: name.clone(),
            });
        }
    }

    // Constraints are never altered in place: a matching name with a
    // differing payload becomes a drop plus an add.
    for name in sorted_union(current.constraints.keys(), desired.constraints.keys()) {
        match (current.constraints.get(&name), desired.constraints.get(&name)) {
            (None, Some(constraint)) => changes.push(Change::AddConstraint {
                table: table.clone(),
                constraint: constraint.clone(),
            }),
            (Some(constraint), None) => changes.push(Change::DropConstraint {
                table: table.clone(),
                constraint: constraint.clone(),
            }),
            (Some(cur), Some(des)) => {
                if !constraints_equal(cur, des) {
                    debug!(table = %table, constraint = %name, "constraint changed");
                    changes.push(Change::DropConstraint {
                        table: table.clone(),
                        constraint: cur.clone(),
                    });
                    changes.push(Change::AddConstraint {
                        table: table.clone(),
                        constraint: des.clone(),
                    });
                }
            }
            (None, None) => {}
        }
    }

    // Same for indexes: a changed definition drops and recreates.
    for name in sorted_union(current.indexes.keys(), desired.indexes.keys()) {
        match (current.indexes.get(&name), desired.indexes.get(&name)) {
            (None, Some(index)) => changes.push(Change::CreateIndex {
                table: table.clone(),
                index: index.clone(),
            }),
            (Some(index), None) => changes.push(Change::DropIndex {
                table: table.clone(),
                index: index.clone(),
            }),
            (Some(cur), Some(des)) => {
                if !indexes_equal(cur, des) {
                    debug!(table = %table, index = %name, "index definition changed");
                    changes.push(Change::DropIndex {
                        table: table.clone(),
                        index: cur.clone(),
                    });
                    changes.push(Change::CreateIndex {
                        table: table.clone(),
                        index: des.clone(),
                    });
                }
            }
            (None, None) => {}
        }
    }

    // Policies have no usable ALTER; any field change is a drop plus a
    // create, adjacent in the output.
    for name in sorted_union(current.policies.keys(), desired.policies.keys()) {
        match (current.policies.get(&name), desired.policies.get(&name)) {
            (None, Some(policy)) => changes.push(Change::CreatePolicy {
                table: table.clone(),
                policy: policy.clone(),
            }),
            (Some(policy), None) => changes.push(Change::DropPolicy {
                table: table.clone(),
                policy: policy.clone(),
            }),
            (Some(cur), Some(des)) => {
                if !policies_equal(cur, des) {
                    debug!(table = %table, policy = %name, "policy changed");
                    changes.push(Change::DropPolicy {
                        table: table.clone(),
                        policy: cur.clone(),
                    });
                    changes.push(Change::CreatePolicy {
                        table: table.clone(),
                        policy: des.clone(),
                    });
                }
            }
            (None, None) => {}
        }
    }

    Ok(())
}

/// Diff one column present on both sides.
fn diff_column(
    changes: &mut Vec<Change>,
    table: &TableRef,
    current: &Column,
    desired: &Column,
) -> Result<(), Error> {
    // A generated expression cannot be altered in place, and switching a
    // column between plain and generated has no ALTER either.
    match (&current.generated, &desired.generated) {
        (None, None) => {}
        (Some(cur), Some(des))
            if normalize::normalize_expr(cur) == normalize::normalize_expr(des) => {}
        _ => {
            return Err(Error::UnsupportedChange(format!(
                "cannot alter the generated expression of column {}.{}; drop and re-add the column",
                table, current.name
            )));
        }
    }

    if normalize::type_tuple(current) != normalize::type_tuple(desired) {
        changes.push(Change::AlterColumnType {
            table: table.clone(),
            column: desired.name.clone(),
            type_text: desired.type_text.clone(),
        });
    }

    if current.nullable != desired.nullable {
        changes.push(Change::AlterColumnNullable {
            table: table.clone(),
            column: desired.name.clone(),
            nullable: desired.nullable,
        });
    }

    let current_default = current
        .default
        .as_deref()
        .map(|expr| normalize::normalize_default(expr, current));
    let desired_default = desired
        .default
        .as_deref()
        .map(|expr| normalize::normalize_default(expr, desired));
    if current_default != desired_default {
        changes.push(Change::AlterColumnDefault {
            table: table.clone(),
            column: desired.name.clone(),
            default: desired.default.clone(),
        });
    }

    match (&current.identity, &desired.identity) {
        (None, None) => {}
        (None, Some(identity)) => changes.push(Change::AddIdentity {
            table: table.clone(),
            column: desired.name.clone(),
            identity: identity.clone(),
        }),
        (Some(_), None) => changes.push(Change::DropIdentity {
            table: table.clone(),
            column: desired.name.clone(),
        }),
        (Some(cur), Some(des)) => {
            // Changing the class preserves the underlying sequence.
            // Sequence options of an existing identity are ignored.
            if cur.class != des.class {
                changes.push(Change::SetIdentityClass {
                    table: table.clone(),
                    column: desired.name.clone(),
                    class: des.class,
                });
            }
        }
    }

    Ok(())
}

fn constraints_equal(a: &Constraint, b: &Constraint) -> bool {
    if a.deferrable != b.deferrable || a.initially_deferred != b.initially_deferred {
        return false;
    }
    match (&a.kind, &b.kind) {
        (
            ConstraintKind::PrimaryKey { columns: x },
            ConstraintKind::PrimaryKey { columns: y },
        ) => x == y,
        (ConstraintKind::Unique { columns: x }, ConstraintKind::Unique { columns: y }) => x == y,
        (ConstraintKind::ForeignKey(x), ConstraintKind::ForeignKey(y)) => x == y,
        (ConstraintKind::Check { expr: x }, ConstraintKind::Check { expr: y }) => {
            normalize::normalize_expr(x) == normalize::normalize_expr(y)
        }
        _ => false,
    }
}

fn indexes_equal(a: &Index, b: &Index) -> bool {
    a.unique == b.unique
        && a.method.as_deref().unwrap_or("btree") == b.method.as_deref().unwrap_or("btree")
        && a.columns.len() == b.columns.len()
        && a.columns.iter().zip(&b.columns).all(|(x, y)| {
            normalize::normalize_expr(&x.expr) == normalize::normalize_expr(&y.expr)
                && x.order == y.order
                && x.nulls == y.nulls
        })
        && normalize::normalize_opt_expr(a.predicate.as_deref())
            == normalize::normalize_opt_expr(b.predicate.as_deref())
}

fn policies_equal(a: &Policy, b: &Policy) -> bool {
    let mut a_roles = a.roles.clone();
    let mut b_roles = b.roles.clone();
    a_roles.sort();
    b_roles.sort();
    a.permissive == b.permissive
        && a.command == b.command
        && a_roles == b_roles
        && normalize::normalize_opt_expr(a.using_expr.as_deref())
            == normalize::normalize_opt_expr(b.using_expr.as_deref())
        && normalize::normalize_opt_expr(a.check_expr.as_deref())
            == normalize::normalize_opt_expr(b.check_expr.as_deref())
}

fn sorted_union<'a>(
    a: impl Iterator<Item = &'a String>,
    b: impl Iterator<Item = &'a String>,
) -> Vec<String> {
    let mut keys: Vec<String> = a.chain(b).cloned().collect();
    keys.sort();
    keys.dedup();
    keys
}
