//! Dependency ordering of changes.
//!
//! The differ emits changes grouped by object; this module sorts them so
//! that every statement's preconditions are satisfied by the statements
//! before it: foreign keys drop before the columns and tables they
//! reference, policies drop before their tables, referenced tables exist
//! before the foreign keys that point at them, and so on.
//!
//! The sort is a stable topological sort (Kahn's algorithm) over an
//! explicit dependency graph: among ready nodes the differ's own order
//! wins, which keeps drop+create pairs adjacent. When the graph has a
//! cycle (mutually-referencing foreign keys on dropped tables), the
//! orderer falls back to a two-phase plan - all drops first, then
//! everything else, within-category order preserved - and flags it. The
//! database tolerates this because foreign keys are added only after both
//! referenced tables exist.

use tracing::warn;

use crate::diff::{Change, TableRef};
use crate::schema::{ConstraintKind, ForeignKey, Index, Schema};

/// Result of ordering changes.
#[derive(Debug)]
pub struct OrderedChanges {
    /// Changes in valid execution order.
    pub changes: Vec<Change>,
    /// True when the cycle fallback was taken. An internal signal, not a
    /// user error.
    pub used_fallback: bool,
}

/// Order changes so dependencies come first. `current` is the schema the
/// script will run against; it supplies the object relationships (which
/// tables a dropped table references, which type a column uses) that the
/// change list alone does not carry.
pub fn order_changes(changes: Vec<Change>, current: &Schema) -> OrderedChanges {
    let n = changes.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];
    for a in 0..n {
        for b in 0..n {
            if a != b && must_precede(&changes[a], &changes[b], current) {
                successors[a].push(b);
                indegree[b] += 1;
            }
        }
    }

    let mut order = Vec::with_capacity(n);
    let mut done = vec![false; n];
    while order.len() < n {
        // Stable: among ready nodes, the differ's original order wins.
        let next = (0..n).find(|&i| !done[i] && indegree[i] == 0);
        let Some(i) = next else {
            warn!("dependency cycle detected; falling back to drops-first ordering");
            return fallback(changes);
        };
        done[i] = true;
        for &j in &successors[i] {
            indegree[j] -= 1;
        }
        order.push(i);
    }

    let mut slots: Vec<Option<Change>> = changes.into_iter().map(Some).collect();
    let changes = order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect();
    OrderedChanges {
        changes,
        used_fallback: false,
    }
}

/// The cycle fallback: all drops first, all creates last, the differ's
/// order preserved within each phase.
fn fallback(changes: Vec<Change>) -> OrderedChanges {
    let (drops, rest): (Vec<Change>, Vec<Change>) =
        changes.into_iter().partition(is_drop);
    let mut changes = drops;
    changes.extend(rest);
    OrderedChanges {
        changes,
        used_fallback: true,
    }
}

fn is_drop(change: &Change) -> bool {
    matches!(
        change,
        Change::DropTable(_)
            | Change::DropColumn { .. }
            | Change::DropConstraint { .. }
            | Change::DropIndex { .. }
            | Change::DropView { .. }
            | Change::DropPolicy { .. }
            | Change::DropType { .. }
    )
}

/// Whether change `a` must execute before change `b`.
fn must_precede(a: &Change, b: &Change, current: &Schema) -> bool {
    match (a, b) {
        // Policies drop before their table and before any column drop on
        // it (a policy predicate may reference any column).
        (Change::DropPolicy { table, .. }, Change::DropTable(dropped)) => table == dropped,
        (Change::DropPolicy { table, .. }, Change::DropColumn { table: other, .. }) => {
            table == other
        }
        // A policy recreated under the same name drops first.
        (
            Change::DropPolicy { table, policy },
            Change::CreatePolicy {
                table: other,
                policy: created,
            },
        ) => table == other && policy.name == created.name,

        // Constraints drop before the columns they cover (for a
        // self-referencing foreign key, also the columns it points at).
        (
            Change::DropConstraint { table, constraint },
            Change::DropColumn {
                table: other,
                column,
            },
        ) if table == other => {
            constraint.kind.columns().contains(column)
                || matches!(
                    fk_of(&constraint.kind),
                    Some(fk) if references_table(fk, other) && fk.ref_columns.contains(column)
                )
        }
        // Foreign keys drop before the objects they reference, and
        // before every non-foreign-key constraint drop.
        (Change::DropConstraint { constraint, .. }, _) if fk_of(&constraint.kind).is_some() => {
            let Some(fk) = fk_of(&constraint.kind) else {
                return false;
            };
            match b {
                Change::DropTable(dropped) => references_table(fk, dropped),
                Change::DropColumn {
                    table: other,
                    column,
                } => references_table(fk, other) && fk.ref_columns.contains(column),
                Change::DropConstraint {
                    constraint: other, ..
                } => fk_of(&other.kind).is_none(),
                Change::AddConstraint {
                    table: other,
                    constraint: added,
                } => {
                    // Same name redefined: drop first.
                    table_of(a) == Some(other) && added.name == constraint.name
                }
                _ => false,
            }
        }
        // A constraint redefined under the same name drops first.
        (
            Change::DropConstraint { table, constraint },
            Change::AddConstraint {
                table: other,
                constraint: added,
            },
        ) => table == other && constraint.name == added.name,

        // Indexes drop before the columns they index.
        (
            Change::DropIndex { table, index },
            Change::DropColumn {
                table: other,
                column,
            },
        ) => table == other && index_covers(index, column),
        // An index redefined under the same name drops first.
        (
            Change::DropIndex { table, index },
            Change::CreateIndex {
                table: other,
                index: created,
            },
        ) => table == other && index.name == created.name,

        // Views drop before any table drop (a view may select from it).
        (Change::DropView { .. }, Change::DropTable(_)) => true,

        // A table that references another via foreign key drops first.
        (Change::DropTable(x), Change::DropTable(y)) => {
            current_table_references(current, x, y)
        }
        // Defensive: a dropped table re-created under the same name.
        (Change::DropTable(dropped), Change::CreateTable(created)) => {
            dropped.schema == created.schema && dropped.name == created.name
        }
        // Tables drop before the types their columns use drop.
        (Change::DropTable(dropped), Change::DropType { name, .. }) => {
            current_table_uses_type(current, dropped, name)
        }
        (Change::AlterColumnType { table, column, .. }, Change::DropType { name, .. }) => {
            current_column_uses_type(current, table, column, name)
        }

        // A type redefined under the same name drops first.
        (Change::DropType { schema, name }, Change::CreateType(created)) => {
            *schema == created.schema && *name == created.name
        }
        // Types exist before the tables and columns that use them.
        (Change::CreateType(ty), Change::CreateTable(table)) => {
            table.columns.values().any(|c| c.type_name == ty.name)
        }
        (Change::CreateType(ty), Change::AddColumn { column, .. }) => column.type_name == ty.name,
        (Change::CreateType(ty), Change::AlterColumnType { type_text, .. }) => {
            type_text.trim().trim_end_matches("[]").eq_ignore_ascii_case(&ty.name)
        }

        // Extensions come before everything else that creates objects.
        (Change::CreateExtension { .. }, _) => is_create(b),

        // A new table exists before anything is added to it, and before
        // foreign keys that reference it.
        (Change::CreateTable(table), _) => {
            let created = TableRef {
                schema: table.schema.clone(),
                name: table.name.clone(),
            };
            match b {
                Change::AddColumn { table: other, .. }
                | Change::AddConstraint { table: other, .. }
                | Change::CreateIndex { table: other, .. }
                | Change::CreatePolicy { table: other, .. } => {
                    if *other == created {
                        return true;
                    }
                    if let Change::AddConstraint { constraint, .. } = b
                        && let Some(fk) = fk_of(&constraint.kind)
                    {
                        return references_table(fk, &created);
                    }
                    false
                }
                Change::CreateView(_) | Change::ReplaceView(_) => true,
                _ => false,
            }
        }

        // Columns exist before constraints, indexes and policies that
        // touch them.
        (Change::AddColumn { table, column }, Change::AddConstraint { table: other, constraint }) => {
            (table == other && constraint.kind.columns().contains(&column.name))
                || match fk_of(&constraint.kind) {
                    Some(fk) => references_table(fk, table) && fk.ref_columns.contains(&column.name),
                    None => false,
                }
        }
        (Change::AddColumn { table, column }, Change::CreateIndex { table: other, index }) => {
            table == other && index_covers(index, &column.name)
        }
        (Change::AddColumn { table, .. }, Change::CreatePolicy { table: other, .. }) => {
            table == other
        }
        (Change::AddColumn { .. }, Change::CreateView(_) | Change::ReplaceView(_)) => true,

        // A primary or unique key exists before foreign keys that rely
        // on it.
        (
            Change::AddConstraint { table, constraint },
            Change::AddConstraint {
                constraint: added, ..
            },
        ) => {
            matches!(
                constraint.kind,
                ConstraintKind::PrimaryKey { .. } | ConstraintKind::Unique { .. }
            ) && match fk_of(&added.kind) {
                Some(fk) => references_table(fk, table),
                None => false,
            }
        }

        _ => false,
    }
}

fn is_create(change: &Change) -> bool {
    matches!(
        change,
        Change::CreateTable(_)
            | Change::CreateIndex { .. }
            | Change::CreateView(_)
            | Change::ReplaceView(_)
            | Change::CreateType(_)
            | Change::CreatePolicy { .. }
            | Change::AddColumn { .. }
            | Change::AddConstraint { .. }
    )
}

fn fk_of(kind: &ConstraintKind) -> Option<&ForeignKey> {
    match kind {
        ConstraintKind::ForeignKey(fk) => Some(fk),
        _ => None,
    }
}

fn references_table(fk: &ForeignKey, table: &TableRef) -> bool {
    fk.ref_schema == table.schema && fk.ref_table == table.name
}

fn index_covers(index: &Index, column: &str) -> bool {
    index.columns.iter().any(|c| c.expr == column)
}

fn table_of(change: &Change) -> Option<&TableRef> {
    match change {
        Change::DropTable(table) => Some(table),
        Change::AddColumn { table, .. }
        | Change::DropColumn { table, .. }
        | Change::AlterColumnType { table, .. }
        | Change::AlterColumnNullable { table, .. }
        | Change::AlterColumnDefault { table, .. }
        | Change::AddIdentity { table, .. }
        | Change::DropIdentity { table, .. }
        | Change::SetIdentityClass { table, .. }
        | Change::AddConstraint { table, .. }
        | Change::DropConstraint { table, .. }
        | Change::CreateIndex { table, .. }
        | Change::DropIndex { table, .. }
        | Change::CreatePolicy { table, .. }
        | Change::DropPolicy { table, .. } => Some(table),
        _ => None,
    }
}

/// Whether table `x` (as it exists in the current schema) has a foreign
/// key referencing table `y`.
fn current_table_references(current: &Schema, x: &TableRef, y: &TableRef) -> bool {
    let Some(table) = current.get_table(&x.schema, &x.name) else {
        return false;
    };
    table.constraints.values().any(|c| match fk_of(&c.kind) {
        Some(fk) => references_table(fk, y),
        None => false,
    })
}

fn current_table_uses_type(current: &Schema, table: &TableRef, type_name: &str) -> bool {
    let Some(table) = current.get_table(&table.schema, &table.name) else {
        return false;
    };
    table.columns.values().any(|c| c.type_name == type_name)
}

fn current_column_uses_type(
    current: &Schema,
    table: &TableRef,
    column: &str,
    type_name: &str,
) -> bool {
    let Some(table) = current.get_table(&table.schema, &table.name) else {
        return false;
    };
    table
        .columns
        .get(column)
        .is_some_and(|c| c.type_name == type_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::schema::Schema;
    use indoc::indoc;

    fn ordered(current_sql: &str, desired_sql: &str) -> OrderedChanges {
        let current = Schema::from_sql(current_sql).unwrap();
        let desired = Schema::from_sql(desired_sql).unwrap();
        let changes = diff::diff(&current, &desired).unwrap();
        order_changes(changes, &current)
    }

    fn position(changes: &[Change], predicate: impl Fn(&Change) -> bool) -> usize {
        changes
            .iter()
            .position(predicate)
            .expect("change not found")
    }

    #[test]
    fn test_constraint_drops_before_its_column() {
        let result = ordered(
            "CREATE TABLE users (id bigint NOT NULL PRIMARY KEY, name text);",
            "CREATE TABLE users (name text);",
        );
        assert!(!result.used_fallback);
        let drop_constraint = position(&result.changes, |c| {
            matches!(c, Change::DropConstraint { .. })
        });
        let drop_column = position(&result.changes, |c| matches!(c, Change::DropColumn { .. }));
        assert!(drop_constraint < drop_column);
    }

    #[test]
    fn test_foreign_key_drops_before_referenced_table() {
        let current = indoc! {"
            CREATE TABLE users (id bigint PRIMARY KEY);
            CREATE TABLE posts (
              user_id bigint,
              CONSTRAINT posts_user_id_fkey FOREIGN KEY (user_id) REFERENCES users (id)
            );
        "};
        let desired = "CREATE TABLE posts (user_id bigint);";
        let result = ordered(current, desired);
        assert!(!result.used_fallback);
        let drop_fk = position(&result.changes, |c| {
            matches!(c, Change::DropConstraint { .. })
        });
        let drop_table = position(&result.changes, |c| matches!(c, Change::DropTable(_)));
        assert!(drop_fk < drop_table);
    }

    #[test]
    fn test_policy_drops_before_column_drop_on_its_table() {
        let current = indoc! {"
            CREATE TABLE users (id bigint, secret text);
            CREATE POLICY p_users ON users USING (secret IS NOT NULL);
        "};
        let desired = "CREATE TABLE users (id bigint);";
        let result = ordered(current, desired);
        let drop_policy = position(&result.changes, |c| matches!(c, Change::DropPolicy { .. }));
        let drop_column = position(&result.changes, |c| {
            matches!(c, Change::DropColumn { column, .. } if column == "secret")
        });
        assert!(drop_policy < drop_column);
    }

    #[test]
    fn test_referenced_table_creates_before_foreign_key() {
        let desired = indoc! {"
            CREATE TABLE posts (user_id bigint);
            ALTER TABLE posts ADD CONSTRAINT posts_user_id_fkey
              FOREIGN KEY (user_id) REFERENCES users (id);
            CREATE TABLE users (id bigint PRIMARY KEY);
        "};
        let result = ordered("", desired);
        assert!(!result.used_fallback);
        let create_users = position(&result.changes, |c| {
            matches!(c, Change::CreateTable(t) if t.name == "users")
        });
        let add_fk = position(&result.changes, |c| {
            matches!(c, Change::AddConstraint { constraint, .. } if constraint.name == "posts_user_id_fkey")
        });
        assert!(create_users < add_fk);
    }

    #[test]
    fn test_index_creates_after_its_column() {
        let current = "CREATE TABLE t (a int);";
        let desired = indoc! {"
            CREATE TABLE t (a int, b int);
            CREATE INDEX t_b_idx ON t (b);
        "};
        let result = ordered(current, desired);
        let add_column = position(&result.changes, |c| {
            matches!(c, Change::AddColumn { column, .. } if column.name == "b")
        });
        let create_index = position(&result.changes, |c| matches!(c, Change::CreateIndex { .. }));
        assert!(add_column < create_index);
    }

    #[test]
    fn test_index_drops_before_its_column() {
        let current = indoc! {"
            CREATE TABLE t (a int, b int);
            CREATE INDEX t_b_idx ON t (b);
        "};
        let desired = "CREATE TABLE t (a int);";
        let result = ordered(current, desired);
        let drop_index = position(&result.changes, |c| matches!(c, Change::DropIndex { .. }));
        let drop_column = position(&result.changes, |c| {
            matches!(c, Change::DropColumn { column, .. } if column == "b")
        });
        assert!(drop_index < drop_column);
    }

    #[test]
    fn test_policy_recreate_stays_adjacent() {
        let current = indoc! {"
            CREATE TABLE users (id bigint);
            CREATE POLICY p_users ON users AS PERMISSIVE USING (true);
        "};
        let desired = indoc! {"
            CREATE TABLE users (id bigint);
            CREATE POLICY p_users ON users AS RESTRICTIVE USING (true);
        "};
        let result = ordered(current, desired);
        assert_eq!(result.changes.len(), 2);
        assert!(matches!(result.changes[0], Change::DropPolicy { .. }));
        assert!(matches!(result.changes[1], Change::CreatePolicy { .. }));
    }

    #[test]
    fn test_mutually_referencing_drops_take_fallback() {
        let current = indoc! {"
            CREATE TABLE a (id bigint PRIMARY KEY, b_id bigint);
            CREATE TABLE b (id bigint PRIMARY KEY, a_id bigint);
            ALTER TABLE a ADD CONSTRAINT a_b_id_fkey FOREIGN KEY (b_id) REFERENCES b (id);
            ALTER TABLE b ADD CONSTRAINT b_a_id_fkey FOREIGN KEY (a_id) REFERENCES a (id);
        "};
        let result = ordered(current, "");
        assert!(result.used_fallback);
        // Both drops still present, in the differ's order.
        assert_eq!(result.changes.len(), 2);
        assert!(result.changes.iter().all(|c| matches!(c, Change::DropTable(_))));
    }

    #[test]
    fn test_independent_changes_keep_differ_order() {
        let result = ordered(
            "CREATE TABLE a (x int); CREATE TABLE b (y int);",
            "CREATE TABLE a (x int, x2 int); CREATE TABLE b (y int, y2 int);",
        );
        assert_eq!(result.changes.len(), 2);
        assert!(matches!(
            &result.changes[0],
            Change::AddColumn { column, .. } if column.name == "x2"
        ));
        assert!(matches!(
            &result.changes[1],
            Change::AddColumn { column, .. } if column.name == "y2"
        ));
    }
}
