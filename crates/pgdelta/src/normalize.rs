//! Normalized forms used for comparison.
//!
//! The database's stored form and the user's source form of a type or an
//! expression often differ lexically while being semantically identical
//! (`varchar(40)` vs `character varying(40)`, `''::character varying` vs
//! `''`, `TRUE` vs `true`). Everything the differ compares goes through
//! this module first; everything it renders stays verbatim.

use crate::schema::Column;

/// Canonical spelling for a type-name alias. Returns the input unchanged
/// when it has no alias.
pub fn canonical_type_name(name: &str) -> &str {
    match name {
        "int" | "int4" => "integer",
        "int8" => "bigint",
        "int2" => "smallint",
        "bool" => "boolean",
        "char" | "bpchar" => "character",
        "varchar" => "character varying",
        "timestamptz" => "timestamp with time zone",
        "timetz" => "time with time zone",
        // A bare timestamp/time means the zone-less variant.
        "timestamp" => "timestamp without time zone",
        "time" => "time without time zone",
        "float4" => "real",
        "float8" => "double precision",
        "decimal" => "numeric",
        other => other,
    }
}

/// The comparable shape of a column's type: canonical name, arguments,
/// array flag.
pub fn type_tuple(column: &Column) -> (String, Vec<String>, bool) {
    (
        canonical_type_name(&column.type_name).to_string(),
        column.type_args.clone(),
        column.array,
    )
}

/// Normalize a default expression for comparison against another default.
///
/// - trims redundant outer parentheses,
/// - collapses `<literal>::<type>` back to the bare literal when the cast
///   type aliases the column's own type,
/// - lowercases bare boolean literals,
/// - uppercases the `CURRENT_TIMESTAMP` / `CURRENT_DATE` / `CURRENT_TIME`
///   keywords.
pub fn normalize_default(expr: &str, column: &Column) -> String {
    let mut s = trim_outer_parens(expr.trim());

    if let Some((lhs, cast_type)) = split_cast(s) {
        let cast_core = strip_type_args(cast_type);
        let column_core = canonical_type_name(&column.type_name);
        if canonical_type_name(&cast_core) == column_core && is_literal(lhs) {
            s = lhs;
        }
    }

    if s.eq_ignore_ascii_case("true") {
        return "true".to_string();
    }
    if s.eq_ignore_ascii_case("false") {
        return "false".to_string();
    }
    for kw in ["CURRENT_TIMESTAMP", "CURRENT_DATE", "CURRENT_TIME"] {
        if s.eq_ignore_ascii_case(kw) {
            return kw.to_string();
        }
    }

    s.to_string()
}

/// Trim outer parentheses as long as they wrap the whole expression.
fn trim_outer_parens(expr: &str) -> &str {
    let mut s = expr.trim();
    while s.starts_with('(') && s.ends_with(')') && wraps_whole(s) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

/// Whether the leading `(` of `s` closes at the very end of `s`.
fn wraps_whole(s: &str) -> bool {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return i == s.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Split a trailing top-level `::type` cast off an expression. Returns
/// `(lhs, type_text)` when present.
fn split_cast(expr: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    let mut in_string = false;
    let bytes = expr.as_bytes();
    let mut i = 0;
    let mut cast_at = None;
    while i < bytes.len() {
        let c = bytes[i];
        if in_string {
            if c == b'\'' {
                // A doubled quote stays inside the string.
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 1;
                } else {
                    in_string = false;
                }
            }
        } else {
            match c {
                b'\'' => in_string = true,
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                    cast_at = Some(i);
                    i += 1;
                }
                _ => {}
            }
        }
        i += 1;
    }
    let at = cast_at?;
    Some((expr[..at].trim_end(), expr[at + 2..].trim()))
}

/// Drop `(args)` from a type spelling: `numeric(5)` -> `numeric`.
fn strip_type_args(type_text: &str) -> String {
    let core = match type_text.find('(') {
        Some(at) => &type_text[..at],
        None => type_text,
    };
    core.trim().to_ascii_lowercase()
}

/// Whether an expression is a single string or numeric literal.
fn is_literal(expr: &str) -> bool {
    let s = expr.trim();
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        return true;
    }
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-')
}

/// Normalize an opaque expression (check body, policy predicate, index
/// predicate, view body) for comparison: lowercase outside quoted strings
/// and quoted identifiers, collapse runs of whitespace to single spaces.
pub fn normalize_expr(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut pending_space = false;

    let mut in_single_quote = false;
    let mut in_double_quote = false;

    let mut chars = expr.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_single_quote {
            out.push(ch);
            if ch == '\'' {
                // SQL escapes single quotes by doubling them: ''
                if matches!(chars.peek(), Some('\'')) {
                    out.push(chars.next().expect("peeked"));
                } else {
                    in_single_quote = false;
                }
            }
            continue;
        }

        if in_double_quote {
            out.push(ch);
            if ch == '"' {
                if matches!(chars.peek(), Some('"')) {
                    out.push(chars.next().expect("peeked"));
                } else {
                    in_double_quote = false;
                }
            }
            continue;
        }

        match ch {
            '\'' => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push('\'');
                in_single_quote = true;
            }
            '"' => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push('"');
                in_double_quote = true;
            }
            c if c.is_whitespace() => {
                pending_space = true;
            }
            c => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                for lc in c.to_lowercase() {
                    out.push(lc);
                }
            }
        }
    }

    out.trim().to_string()
}

/// Normalize an optional expression; `None` stays `None`.
pub fn normalize_opt_expr(expr: Option<&str>) -> Option<String> {
    expr.map(normalize_expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_of_type(type_name: &str) -> Column {
        Column {
            name: "col".to_string(),
            type_name: type_name.to_string(),
            type_args: Vec::new(),
            array: false,
            type_text: type_name.to_string(),
            nullable: true,
            default: None,
            identity: None,
            generated: None,
            via_alter: false,
        }
    }

    #[test]
    fn test_type_aliases() {
        assert_eq!(canonical_type_name("int"), "integer");
        assert_eq!(canonical_type_name("bool"), "boolean");
        assert_eq!(canonical_type_name("varchar"), "character varying");
        assert_eq!(canonical_type_name("timestamptz"), "timestamp with time zone");
        assert_eq!(canonical_type_name("text"), "text");
    }

    #[test]
    fn test_default_cast_collapses_for_matching_type() {
        let col = column_of_type("character varying");
        assert_eq!(normalize_default("''::character varying", &col), "''");
        // varchar aliases character varying, so the cast still collapses.
        let col = column_of_type("varchar");
        assert_eq!(normalize_default("''::character varying", &col), "''");
    }

    #[test]
    fn test_default_cast_kept_for_other_type() {
        let col = column_of_type("timestamp with time zone");
        assert_eq!(
            normalize_default("'0001-01-01 00:00:00'::timestamp without time zone", &col),
            "'0001-01-01 00:00:00'::timestamp without time zone"
        );
    }

    #[test]
    fn test_default_boolean_lowercased() {
        let col = column_of_type("boolean");
        assert_eq!(normalize_default("TRUE", &col), "true");
        assert_eq!(normalize_default("false", &col), "false");
    }

    #[test]
    fn test_default_current_timestamp_uppercased() {
        let col = column_of_type("timestamp without time zone");
        assert_eq!(
            normalize_default("current_timestamp", &col),
            "CURRENT_TIMESTAMP"
        );
        assert_eq!(
            normalize_default("CURRENT_TIMESTAMP", &col),
            "CURRENT_TIMESTAMP"
        );
    }

    #[test]
    fn test_default_outer_parens_trimmed() {
        let col = column_of_type("integer");
        assert_eq!(normalize_default("(20)", &col), "20");
        assert_eq!(normalize_default("((20))", &col), "20");
        // Parens that do not wrap the whole expression stay.
        assert_eq!(normalize_default("(1 + 2) * 3", &col), "(1 + 2) * 3");
    }

    #[test]
    fn test_default_cast_with_args_collapses() {
        let col = column_of_type("numeric");
        assert_eq!(normalize_default("42.195::numeric(5)", &col), "42.195");
    }

    #[test]
    fn test_cast_inside_string_untouched() {
        let col = column_of_type("text");
        assert_eq!(normalize_default("'a::b'", &col), "'a::b'");
    }

    #[test]
    fn test_normalize_expr_whitespace_and_case() {
        assert_eq!(
            normalize_expr("SELECT  *\n  FROM users\tWHERE active"),
            "select * from users where active"
        );
    }

    #[test]
    fn test_normalize_expr_preserves_quoted() {
        assert_eq!(
            normalize_expr("name = 'O''Brien'  AND  \"Weird Col\" > 1"),
            "name = 'O''Brien' and \"Weird Col\" > 1"
        );
    }
}
