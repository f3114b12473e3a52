//! DDL tokenizer, typed AST and parser.
//!
//! This crate owns the textual side of pgdelta: it turns a DDL script into
//! a stream of typed [`Statement`]s, and provides the identifier quoting
//! helpers used when rendering DDL back out.
//!
//! The parser is deliberately shallow where PostgreSQL's own parser is
//! deep: expression defaults, check bodies, view bodies, policy predicates
//! and index predicates are captured as raw source text (balanced on
//! parentheses) instead of being elaborated into an expression tree. The
//! stored form in the database and the source form in a schema file often
//! differ lexically while meaning the same thing, so downstream comparison
//! happens on a normalized copy of that text — never on a re-serialized
//! tree that would lose the original bytes.

mod ast;
pub use ast::*;

mod token;
pub use token::{Token, TokenKind, tokenize};

mod parser;
pub use parser::{ParseError, parse_sql};

/// Quote an identifier for generated DDL.
///
/// Generated statements quote every identifier, so table and column
/// names that collide with reserved words (`user`, `order`, `check`)
/// or carry case survive untouched. An embedded double quote is
/// doubled, the reverse of what the tokenizer undoes when reading a
/// quoted identifier back in.
///
/// # Example
/// ```
/// assert_eq!(pgdelta_sql::quote_ident("order"), "\"order\"");
/// assert_eq!(pgdelta_sql::quote_ident("we\"ird"), "\"we\"\"ird\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for c in name.chars() {
        if c == '"' {
            quoted.push('"');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Quote a schema-qualified object name.
///
/// # Example
/// ```
/// assert_eq!(
///     pgdelta_sql::quote_qualified("public", "users"),
///     "\"public\".\"users\""
/// );
/// ```
pub fn quote_qualified(schema: &str, name: &str) -> String {
    let mut quoted = quote_ident(schema);
    quoted.push('.');
    quoted.push_str(&quote_ident(name));
    quoted
}
