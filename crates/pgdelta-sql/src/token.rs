//! DDL token stream.
//!
//! Tokens carry byte spans into the source so the parser can slice out
//! raw statement text and raw expression fragments verbatim.

use crate::parser::ParseError;

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A bare word: identifier or keyword. Matched case-insensitively.
    Word,
    /// A double-quoted identifier. The span includes the quotes.
    QuotedIdent,
    /// A single-quoted string literal. The span includes the quotes.
    String,
    /// A numeric literal.
    Number,
    /// Structural punctuation: `( ) , ; . [ ]`.
    Symbol(char),
    /// Any operator run: `::`, `=`, `||`, `<>`, `->`, ...
    Op,
}

/// A lexed token with its byte span in the source.
#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// The raw source text of this token.
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn is_op_char(c: char) -> bool {
    matches!(
        c,
        ':' | '=' | '<' | '>' | '+' | '-' | '*' | '/' | '|' | '!' | '~' | '%' | '^' | '&' | '@' | '#'
    )
}

/// Tokenize a DDL script.
///
/// Skips whitespace, `--` line comments and `/* */` block comments.
/// Fails on unterminated strings, quoted identifiers or block comments.
pub fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < src.len() {
        let c = src[i..].chars().next().expect("in-bounds char");

        if c.is_whitespace() {
            i += c.len_utf8();
            continue;
        }

        // Line comment
        if c == '-' && src[i..].starts_with("--") {
            match src[i..].find('\n') {
                Some(off) => i += off + 1,
                None => i = src.len(),
            }
            continue;
        }

        // Block comment
        if c == '/' && src[i..].starts_with("/*") {
            match src[i + 2..].find("*/") {
                Some(off) => i += 2 + off + 2,
                None => return Err(ParseError::at(src, i, "unterminated block comment")),
            }
            continue;
        }

        let start = i;

        if is_word_start(c) {
            i += c.len_utf8();
            while i < src.len() {
                let c = src[i..].chars().next().expect("in-bounds char");
                if !is_word_continue(c) {
                    break;
                }
                i += c.len_utf8();
            }
            tokens.push(Token {
                kind: TokenKind::Word,
                start,
                end: i,
            });
            continue;
        }

        if c.is_ascii_digit() {
            while i < src.len() {
                let b = bytes[i];
                if b.is_ascii_digit() || b == b'.' {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Number,
                start,
                end: i,
            });
            continue;
        }

        if c == '\'' {
            i += 1;
            loop {
                match src[i..].find('\'') {
                    Some(off) => {
                        i += off + 1;
                        // A doubled quote is an escaped quote, keep scanning.
                        if src[i..].starts_with('\'') {
                            i += 1;
                        } else {
                            break;
                        }
                    }
                    None => return Err(ParseError::at(src, start, "unterminated string literal")),
                }
            }
            tokens.push(Token {
                kind: TokenKind::String,
                start,
                end: i,
            });
            continue;
        }

        if c == '"' {
            i += 1;
            loop {
                match src[i..].find('"') {
                    Some(off) => {
                        i += off + 1;
                        if src[i..].starts_with('"') {
                            i += 1;
                        } else {
                            break;
                        }
                    }
                    None => {
                        return Err(ParseError::at(src, start, "unterminated quoted identifier"));
                    }
                }
            }
            tokens.push(Token {
                kind: TokenKind::QuotedIdent,
                start,
                end: i,
            });
            continue;
        }

        if matches!(c, '(' | ')' | ',' | ';' | '.' | '[' | ']') {
            i += 1;
            tokens.push(Token {
                kind: TokenKind::Symbol(c),
                start,
                end: i,
            });
            continue;
        }

        if is_op_char(c) {
            while i < src.len() {
                let c = src[i..].chars().next().expect("in-bounds char");
                if !is_op_char(c) {
                    break;
                }
                // Don't glue a comment opener onto the previous operator.
                if src[i..].starts_with("--") || src[i..].starts_with("/*") {
                    break;
                }
                i += c.len_utf8();
            }
            tokens.push(Token {
                kind: TokenKind::Op,
                start,
                end: i,
            });
            continue;
        }

        return Err(ParseError::at(
            src,
            i,
            &format!("unexpected character {c:?}"),
        ));
    }

    Ok(tokens)
}

/// Unquote a lexed identifier token: strips the surrounding double quotes
/// and undoubles embedded quotes. Bare words fold to lowercase, matching
/// PostgreSQL's identifier semantics.
pub(crate) fn unquote_ident(kind: TokenKind, text: &str) -> String {
    match kind {
        TokenKind::QuotedIdent => text[1..text.len() - 1].replace("\"\"", "\""),
        _ => text.to_ascii_lowercase(),
    }
}

/// Unquote a lexed string literal token.
pub(crate) fn unquote_string(text: &str) -> String {
    text[1..text.len() - 1].replace("''", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_words_and_symbols() {
        let toks = tokenize("CREATE TABLE users (id bigint);").unwrap();
        let texts: Vec<&str> = toks.iter().map(|t| t.text("CREATE TABLE users (id bigint);")).collect();
        assert_eq!(
            texts,
            vec!["CREATE", "TABLE", "users", "(", "id", "bigint", ")", ";"]
        );
    }

    #[test]
    fn test_string_escapes() {
        let src = "default 'it''s'";
        let toks = tokenize(src).unwrap();
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[1].kind, TokenKind::String);
        assert_eq!(toks[1].text(src), "'it''s'");
    }

    #[test]
    fn test_quoted_ident() {
        let src = "\"Weird \"\"Name\"\"\"";
        let toks = tokenize(src).unwrap();
        assert_eq!(toks.len(), 1);
        assert_eq!(unquote_ident(toks[0].kind, toks[0].text(src)), "Weird \"Name\"");
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("-- hi\nselect /* there */ 1"),
            vec![TokenKind::Word, TokenKind::Number]
        );
    }

    #[test]
    fn test_cast_operator() {
        let src = "''::character varying";
        let toks = tokenize(src).unwrap();
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::String, TokenKind::Op, TokenKind::Word, TokenKind::Word]
        );
        assert_eq!(toks[1].text(src), "::");
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize("default 'oops").is_err());
    }

    #[test]
    fn test_numbers() {
        let src = "numeric(5, 2) default 42.195";
        let toks = tokenize(src).unwrap();
        assert_eq!(toks[2].text(src), "5");
        assert_eq!(toks.last().unwrap().text(src), "42.195");
    }
}
