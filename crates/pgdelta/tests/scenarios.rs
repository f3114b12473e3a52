//! End-to-end migration scenarios over the full pipeline: parse both
//! inputs, diff, order, render. Expected scripts are pinned bit-exact.

use indoc::indoc;
use pgdelta::generate_migration;

fn migrate(current: &str, desired: &str) -> Vec<String> {
    generate_migration(current, desired).unwrap()
}

#[test]
fn first_time_create_replays_the_statement() {
    let desired = indoc! {"
        CREATE TABLE users (
          id bigint NOT NULL,
          name text,
          age integer
        );
    "};
    let script = migrate("", desired);
    assert_eq!(script, vec![desired.trim_end().to_string()]);

    // Converged: nothing more to do.
    assert!(migrate(desired, desired).is_empty());
}

#[test]
fn extra_table_is_dropped() {
    let desired = "CREATE TABLE users (id bigint NOT NULL, name text, age integer);";
    let current = format!("{desired}\nCREATE TABLE bigdata (data bigint);");
    let script = migrate(&current, desired);
    assert_eq!(script, vec![r#"DROP TABLE "public"."bigdata";"#]);
}

#[test]
fn column_type_change() {
    let current = "CREATE TABLE users (id bigint NOT NULL, name text);";
    let desired = "CREATE TABLE users (id bigint NOT NULL, name varchar(40));";
    let script = migrate(current, desired);
    assert_eq!(
        script,
        vec![r#"ALTER TABLE "public"."users" ALTER COLUMN "name" TYPE varchar(40);"#]
    );
    assert!(migrate(desired, desired).is_empty());
}

#[test]
fn default_boolean_flip() {
    let current = "CREATE TABLE test (col boolean default true);";
    let desired = "CREATE TABLE test (col boolean default false);";
    let script = migrate(current, desired);
    assert_eq!(
        script,
        vec![r#"ALTER TABLE "public"."test" ALTER COLUMN "col" SET DEFAULT false;"#]
    );
}

#[test]
fn default_set_and_drop() {
    let with_default = "CREATE TABLE timestamps (created_at timestamp default current_timestamp);";
    let without_default = "CREATE TABLE timestamps (created_at timestamp);";

    assert_eq!(
        migrate(with_default, without_default),
        vec![r#"ALTER TABLE "public"."timestamps" ALTER COLUMN "created_at" DROP DEFAULT;"#]
    );
    assert_eq!(
        migrate(without_default, with_default),
        vec![
            r#"ALTER TABLE "public"."timestamps" ALTER COLUMN "created_at" SET DEFAULT current_timestamp;"#
        ]
    );
}

#[test]
fn primary_key_drops_before_its_column() {
    let current = "CREATE TABLE users (id bigint NOT NULL PRIMARY KEY, name text);";
    let desired = "CREATE TABLE users (name text);";
    let script = migrate(current, desired);
    assert_eq!(
        script,
        vec![
            r#"ALTER TABLE "public"."users" DROP CONSTRAINT "users_pkey";"#,
            r#"ALTER TABLE "public"."users" DROP COLUMN "id";"#,
        ]
    );
}

#[test]
fn foreign_key_added_on_existing_columns() {
    let current = indoc! {"
        CREATE TABLE users (id bigint PRIMARY KEY);
        CREATE TABLE posts (content text, user_id bigint);
    "};
    let desired = indoc! {"
        CREATE TABLE users (id bigint PRIMARY KEY);
        CREATE TABLE posts (
          content text,
          user_id bigint,
          CONSTRAINT posts_ibfk_1 FOREIGN KEY (user_id) REFERENCES users (id)
        );
    "};
    let script = migrate(current, desired);
    assert_eq!(
        script,
        vec![
            r#"ALTER TABLE "public"."posts" ADD CONSTRAINT "posts_ibfk_1" FOREIGN KEY ("user_id") REFERENCES "users" ("id");"#
        ]
    );
}

#[test]
fn policy_change_becomes_drop_then_create() {
    let current = indoc! {"
        CREATE TABLE users (id bigint);
        CREATE POLICY p_users ON users AS PERMISSIVE FOR ALL TO PUBLIC USING (id = (current_user)::integer);
    "};
    let desired = indoc! {"
        CREATE TABLE users (id bigint);
        CREATE POLICY p_users ON users AS RESTRICTIVE FOR ALL TO postgres USING (id = (current_user)::integer);
    "};
    let script = migrate(current, desired);
    assert_eq!(
        script,
        vec![
            r#"DROP POLICY "p_users" ON "public"."users";"#,
            "CREATE POLICY p_users ON users AS RESTRICTIVE FOR ALL TO postgres USING (id = (current_user)::integer);",
        ]
    );
}

// ---------------------------------------------------------------------
// Universal properties
// ---------------------------------------------------------------------

#[test]
fn fixed_point_on_a_rich_schema() {
    let schema = indoc! {"
        CREATE EXTENSION pgcrypto;
        CREATE TYPE mood AS ENUM ('sad', 'ok', 'happy');
        CREATE TABLE users (
          id bigint GENERATED ALWAYS AS IDENTITY,
          email text UNIQUE,
          feeling mood,
          created_at timestamptz NOT NULL DEFAULT now(),
          PRIMARY KEY (id)
        );
        CREATE TABLE posts (
          id bigserial PRIMARY KEY,
          user_id bigint REFERENCES users ON DELETE CASCADE,
          title varchar(200) NOT NULL
        );
        CREATE UNIQUE INDEX posts_title_idx ON posts (title) WHERE title <> '';
        CREATE VIEW recent_posts AS SELECT * FROM posts WHERE id > 100;
        CREATE POLICY p_posts ON posts FOR SELECT TO PUBLIC USING (true);
    "};
    assert!(migrate(schema, schema).is_empty());
}

#[test]
fn determinism() {
    let current = "CREATE TABLE b (x int); CREATE TABLE a (y int);";
    let desired = indoc! {"
        CREATE TABLE a (y int, z int);
        CREATE TABLE c (w int);
        CREATE INDEX c_w_idx ON c (w);
    "};
    let first = migrate(current, desired);
    let second = migrate(current, desired);
    assert_eq!(first, second);
}

#[test]
fn normalization_stability() {
    let current = "CREATE TABLE t (a int);";
    let desired_spelled_one_way = indoc! {"
        CREATE TABLE t (
          a integer,
          b varchar(10) DEFAULT ''::character varying,
          c bool DEFAULT TRUE
        );
    "};
    let desired_spelled_another = indoc! {"
        CREATE TABLE t (
          a int,
          b character varying(10) DEFAULT '',
          c boolean DEFAULT true
        );
    "};
    // The two desired schemas differ only in forms the normalizer
    // collapses, so both must request the same set of changes.
    let one = migrate(current, desired_spelled_one_way);
    let other = migrate(current, desired_spelled_another);
    assert_eq!(one.len(), other.len());
    // Statement text follows the user's spelling, so compare shapes, not
    // bytes: both scripts add the same two columns.
    assert!(one.iter().all(|s| s.starts_with(r#"ALTER TABLE "public"."t" ADD COLUMN"#)));
    assert!(other.iter().all(|s| s.starts_with(r#"ALTER TABLE "public"."t" ADD COLUMN"#)));

    // And once applied, both spellings are the same fixed point.
    assert!(migrate(desired_spelled_one_way, desired_spelled_another).is_empty());
    assert!(migrate(desired_spelled_another, desired_spelled_one_way).is_empty());
}

#[test]
fn renames_are_modeled_as_drop_plus_add() {
    let current = "CREATE TABLE users (id bigint, fullname text);";
    let desired = "CREATE TABLE users (id bigint, display_name text);";
    let script = migrate(current, desired);
    assert_eq!(script.len(), 2);
    assert!(script.iter().any(|s| s.contains("ADD COLUMN \"display_name\"")));
    assert!(script.iter().any(|s| s.contains("DROP COLUMN \"fullname\"")));
    assert!(script.iter().all(|s| !s.contains("RENAME")));
}

#[test]
fn mixed_migration_orders_creates_after_their_dependencies() {
    let current = indoc! {"
        CREATE TABLE users (id bigint PRIMARY KEY);
    "};
    let desired = indoc! {"
        CREATE TABLE users (id bigint PRIMARY KEY);
        CREATE TABLE posts (
          id bigint PRIMARY KEY,
          author bigint,
          CONSTRAINT posts_author_fkey FOREIGN KEY (author) REFERENCES users (id)
        );
        CREATE INDEX posts_author_idx ON posts (author);
    "};
    let script = migrate(current, desired);
    let create_table = script
        .iter()
        .position(|s| s.starts_with("CREATE TABLE posts"))
        .expect("create table present");
    let create_index = script
        .iter()
        .position(|s| s.starts_with("CREATE INDEX posts_author_idx"))
        .expect("create index present");
    assert!(create_table < create_index);
}

#[test]
fn errors_surface_with_context() {
    // Index on a table that was never declared.
    let err = generate_migration("", "CREATE INDEX idx ON nope (a);").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("nope"), "unexpected message: {message}");

    // Malformed DDL.
    assert!(generate_migration("", "CREATE TABLE (;").is_err());
}
