//! Recursive-descent parser for the recognized DDL subset.
//!
//! The parser consumes the token stream from [`crate::tokenize`] and
//! produces [`Statement`] values. Anything expression-shaped (defaults,
//! check bodies, view bodies, policy predicates, index predicates) is
//! captured as raw source text with balanced bracket tracking.

use thiserror::Error;

use crate::ast::*;
use crate::token::{Token, TokenKind, tokenize, unquote_ident, unquote_string};

/// Error produced while tokenizing or parsing DDL.
#[derive(Debug, Clone, Error)]
#[error("{message} (near {near:?})")]
pub struct ParseError {
    pub message: String,
    /// A short excerpt of the source at the point of failure.
    pub near: String,
}

impl ParseError {
    pub(crate) fn at(src: &str, offset: usize, message: &str) -> Self {
        let rest = &src[offset.min(src.len())..];
        let near: String = rest.chars().take(32).collect();
        Self {
            message: message.to_string(),
            near,
        }
    }
}

/// Parse a DDL script into statements.
pub fn parse_sql(src: &str) -> Result<Vec<Statement>, ParseError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        src,
        tokens,
        pos: 0,
    };
    let mut statements = Vec::new();
    loop {
        while parser.eat_symbol(';') {}
        if parser.at_end() {
            break;
        }
        statements.push(parser.parse_statement()?);
        if !parser.at_end() && !parser.eat_symbol(';') {
            return Err(parser.error("expected ';' after statement"));
        }
    }
    Ok(statements)
}

/// Keywords that terminate a `DEFAULT` expression when seen at bracket
/// depth zero (the next column option, or the next constraint).
const DEFAULT_STOP_WORDS: &[&str] = &[
    "NOT",
    "NULL",
    "PRIMARY",
    "UNIQUE",
    "REFERENCES",
    "CHECK",
    "GENERATED",
    "CONSTRAINT",
    "DEFAULT",
    "DEFERRABLE",
    "INITIALLY",
    "COLLATE",
];

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_nth(&self, n: usize) -> Option<Token> {
        self.tokens.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Byte offset just past the last consumed token.
    fn prev_end(&self) -> usize {
        self.tokens[self.pos - 1].end
    }

    fn error(&self, message: &str) -> ParseError {
        let offset = self
            .peek()
            .map(|t| t.start)
            .unwrap_or_else(|| self.src.len());
        ParseError::at(self.src, offset, message)
    }

    fn word_at(&self, n: usize) -> Option<&'a str> {
        let tok = self.peek_nth(n)?;
        match tok.kind {
            TokenKind::Word => Some(tok.text(self.src)),
            _ => None,
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        self.word_at(0).is_some_and(|w| w.eq_ignore_ascii_case(kw))
    }

    fn is_keyword_at(&self, n: usize, kw: &str) -> bool {
        self.word_at(n).is_some_and(|w| w.eq_ignore_ascii_case(kw))
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume a run of keywords, all or nothing.
    fn eat_keywords(&mut self, kws: &[&str]) -> bool {
        for (n, kw) in kws.iter().enumerate() {
            if !self.is_keyword_at(n, kw) {
                return false;
            }
        }
        self.pos += kws.len();
        true
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {kw}")))
        }
    }

    fn eat_symbol(&mut self, c: char) -> bool {
        match self.peek() {
            Some(tok) if tok.kind == TokenKind::Symbol(c) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_symbol(&mut self, c: char) -> Result<(), ParseError> {
        if self.eat_symbol(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    /// An identifier: bare word (folded to lowercase) or quoted.
    fn parse_ident(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(tok) if matches!(tok.kind, TokenKind::Word | TokenKind::QuotedIdent) => {
                self.pos += 1;
                Ok(unquote_ident(tok.kind, tok.text(self.src)))
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn parse_object_name(&mut self) -> Result<ObjectName, ParseError> {
        let first = self.parse_ident()?;
        if self.eat_symbol('.') {
            let name = self.parse_ident()?;
            Ok(ObjectName {
                schema: Some(first),
                name,
            })
        } else {
            Ok(ObjectName {
                schema: None,
                name: first,
            })
        }
    }

    /// A parenthesized, comma-separated identifier list. The opening
    /// parenthesis has not been consumed yet.
    fn parse_ident_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect_symbol('(')?;
        let mut idents = vec![self.parse_ident()?];
        while self.eat_symbol(',') {
            idents.push(self.parse_ident()?);
        }
        self.expect_symbol(')')?;
        Ok(idents)
    }

    // ------------------------------------------------------------------
    // Raw-text capture
    // ------------------------------------------------------------------

    /// Capture raw source until the matching `)` of an already-consumed
    /// `(`. Leaves the closing parenthesis for the caller.
    fn capture_until_close_paren(&mut self) -> Result<String, ParseError> {
        let start = match self.peek() {
            Some(tok) => tok.start,
            None => return Err(self.error("unterminated parenthesized expression")),
        };
        let mut end = start;
        let mut depth = 0usize;
        loop {
            let tok = match self.peek() {
                Some(tok) => tok,
                None => return Err(self.error("unterminated parenthesized expression")),
            };
            match tok.kind {
                TokenKind::Symbol('(') => depth += 1,
                TokenKind::Symbol(')') => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            end = tok.end;
            self.pos += 1;
        }
        Ok(self.src[start..end].trim().to_string())
    }

    /// Capture raw source until a statement terminator (`;` at depth
    /// zero, or end of input). Used for view bodies and index predicates.
    fn capture_until_stmt_end(&mut self) -> Result<String, ParseError> {
        let start = match self.peek() {
            Some(tok) => tok.start,
            None => return Err(self.error("expected expression")),
        };
        let mut end = start;
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::Symbol('(') | TokenKind::Symbol('[') => depth += 1,
                TokenKind::Symbol(')') | TokenKind::Symbol(']') => depth = depth.saturating_sub(1),
                TokenKind::Symbol(';') if depth == 0 => break,
                _ => {}
            }
            end = tok.end;
            self.pos += 1;
        }
        Ok(self.src[start..end].trim().to_string())
    }

    /// Capture a `DEFAULT` expression: raw source until a depth-zero
    /// `,`, `)`, `;` or the start of the next column option.
    fn capture_default_expr(&mut self) -> Result<String, ParseError> {
        let start = match self.peek() {
            Some(tok) => tok.start,
            None => return Err(self.error("expected expression after DEFAULT")),
        };
        let mut end = start;
        let mut depth = 0usize;
        let mut consumed = 0usize;
        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::Symbol('(') | TokenKind::Symbol('[') => depth += 1,
                TokenKind::Symbol(')') | TokenKind::Symbol(']') => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                TokenKind::Symbol(',') | TokenKind::Symbol(';') if depth == 0 => break,
                TokenKind::Word if depth == 0 && consumed > 0 => {
                    let word = tok.text(self.src);
                    if DEFAULT_STOP_WORDS
                        .iter()
                        .any(|kw| word.eq_ignore_ascii_case(kw))
                    {
                        break;
                    }
                }
                _ => {}
            }
            end = tok.end;
            self.pos += 1;
            consumed += 1;
        }
        if consumed == 0 {
            return Err(self.error("expected expression after DEFAULT"));
        }
        Ok(self.src[start..end].trim().to_string())
    }

    /// Capture one index element: raw source until a depth-zero `,` or
    /// `)`, with trailing `ASC`/`DESC`/`NULLS FIRST`/`NULLS LAST` parsed
    /// off the end.
    fn capture_index_elem(&mut self) -> Result<IndexColumn, ParseError> {
        let start = match self.peek() {
            Some(tok) => tok.start,
            None => return Err(self.error("expected index column")),
        };
        let mut end = start;
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::Symbol('(') | TokenKind::Symbol('[') => depth += 1,
                TokenKind::Symbol(')') | TokenKind::Symbol(']') => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                TokenKind::Symbol(',') if depth == 0 => break,
                _ => {}
            }
            end = tok.end;
            self.pos += 1;
        }
        let raw = self.src[start..end].trim();
        if raw.is_empty() {
            return Err(self.error("expected index column"));
        }
        Ok(parse_index_elem(raw))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let start = self.peek().map(|t| t.start).unwrap_or(0);
        if self.eat_keyword("CREATE") {
            if self.eat_keyword("TABLE") {
                return self.parse_create_table(start);
            }
            if self.is_keyword("UNIQUE") || self.is_keyword("INDEX") {
                let unique = self.eat_keyword("UNIQUE");
                self.expect_keyword("INDEX")?;
                return self.parse_create_index(start, unique);
            }
            if self.eat_keyword("OR") {
                self.expect_keyword("REPLACE")?;
                self.expect_keyword("VIEW")?;
                return self.parse_create_view(start, true);
            }
            if self.eat_keyword("VIEW") {
                return self.parse_create_view(start, false);
            }
            if self.eat_keyword("POLICY") {
                return self.parse_create_policy(start);
            }
            if self.eat_keyword("TYPE") {
                return self.parse_create_type(start);
            }
            if self.eat_keyword("EXTENSION") {
                return self.parse_create_extension(start);
            }
            return Err(self.error("unsupported CREATE statement"));
        }
        if self.eat_keyword("ALTER") {
            self.expect_keyword("TABLE")?;
            return self.parse_alter_table(start);
        }
        Err(self.error("unsupported statement"))
    }

    fn finish_text(&self, start: usize) -> String {
        self.src[start..self.prev_end()].to_string()
    }

    fn parse_create_table(&mut self, start: usize) -> Result<Statement, ParseError> {
        let if_not_exists = self.eat_keywords(&["IF", "NOT", "EXISTS"]);
        let name = self.parse_object_name()?;
        self.expect_symbol('(')?;

        let mut columns = Vec::new();
        let mut constraints = Vec::new();
        loop {
            if matches!(self.peek(), Some(tok) if tok.kind == TokenKind::Symbol(')')) {
                break;
            }
            if self.at_constraint_start() {
                constraints.push(self.parse_table_constraint()?);
            } else {
                columns.push(self.parse_column_def()?);
            }
            if !self.eat_symbol(',') {
                break;
            }
        }
        self.expect_symbol(')')?;

        Ok(Statement::CreateTable(CreateTable {
            name,
            if_not_exists,
            columns,
            constraints,
            text: self.finish_text(start),
        }))
    }

    fn at_constraint_start(&self) -> bool {
        ["CONSTRAINT", "PRIMARY", "UNIQUE", "FOREIGN", "CHECK"]
            .iter()
            .any(|kw| self.is_keyword(kw))
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef, ParseError> {
        let name = self.parse_ident()?;
        let type_name = self.parse_type_name()?;
        let mut options = Vec::new();
        loop {
            if self.eat_keywords(&["NOT", "NULL"]) {
                options.push(ColumnOption::NotNull);
            } else if self.eat_keyword("NULL") {
                options.push(ColumnOption::Null);
            } else if self.eat_keyword("DEFAULT") {
                options.push(ColumnOption::Default(self.capture_default_expr()?));
            } else if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                options.push(ColumnOption::PrimaryKey);
            } else if self.eat_keyword("UNIQUE") {
                options.push(ColumnOption::Unique);
            } else if self.eat_keyword("REFERENCES") {
                let table = self.parse_object_name()?;
                let columns = if matches!(self.peek(), Some(tok) if tok.kind == TokenKind::Symbol('('))
                {
                    self.parse_ident_list()?
                } else {
                    Vec::new()
                };
                let (on_delete, on_update) = self.parse_fk_actions()?;
                options.push(ColumnOption::References {
                    table,
                    columns,
                    on_delete,
                    on_update,
                });
            } else if self.eat_keyword("CHECK") {
                self.expect_symbol('(')?;
                let expr = self.capture_until_close_paren()?;
                self.expect_symbol(')')?;
                options.push(ColumnOption::Check(expr));
            } else if self.eat_keyword("GENERATED") {
                options.push(self.parse_generated()?);
            } else if self.eat_keyword("CONSTRAINT") {
                // Inline constraint names are discarded: lifted inline
                // constraints always get the default synthesized name.
                self.parse_ident()?;
            } else if self.eat_keyword("COLLATE") {
                self.parse_object_name()?;
            } else if self.eat_keywords(&["NOT", "DEFERRABLE"]) || self.eat_keyword("DEFERRABLE") {
                // Inline FK timing flags, accepted and dropped.
            } else if self.eat_keyword("INITIALLY") {
                if !self.eat_keyword("DEFERRED") {
                    self.expect_keyword("IMMEDIATE")?;
                }
            } else {
                break;
            }
        }
        Ok(ColumnDef {
            name,
            type_name,
            options,
        })
    }

    fn parse_generated(&mut self) -> Result<ColumnOption, ParseError> {
        let class = if self.eat_keyword("ALWAYS") {
            IdentityClass::Always
        } else {
            self.expect_keyword("BY")?;
            self.expect_keyword("DEFAULT")?;
            IdentityClass::ByDefault
        };
        self.expect_keyword("AS")?;
        if self.eat_keyword("IDENTITY") {
            let sequence_options = if self.eat_symbol('(') {
                let raw = self.capture_until_close_paren()?;
                self.expect_symbol(')')?;
                Some(raw)
            } else {
                None
            };
            return Ok(ColumnOption::Identity(IdentityDef {
                class,
                sequence_options,
            }));
        }
        if class != IdentityClass::Always {
            return Err(self.error("GENERATED BY DEFAULT requires AS IDENTITY"));
        }
        self.expect_symbol('(')?;
        let expr = self.capture_until_close_paren()?;
        self.expect_symbol(')')?;
        self.expect_keyword("STORED")?;
        Ok(ColumnOption::GeneratedStored(expr))
    }

    fn parse_type_name(&mut self) -> Result<TypeName, ParseError> {
        let start = match self.peek() {
            Some(tok) => tok.start,
            None => return Err(self.error("expected type name")),
        };
        let first = self.parse_ident()?;
        let mut name = first;
        match name.as_str() {
            "double" => {
                self.expect_keyword("PRECISION")?;
                name = "double precision".to_string();
            }
            "character" | "bit" => {
                if self.eat_keyword("VARYING") {
                    name = format!("{name} varying");
                }
            }
            "timestamp" | "time" => {
                if self.eat_keyword("WITH") {
                    self.expect_keyword("TIME")?;
                    self.expect_keyword("ZONE")?;
                    name = format!("{name} with time zone");
                } else if self.eat_keyword("WITHOUT") {
                    self.expect_keyword("TIME")?;
                    self.expect_keyword("ZONE")?;
                    name = format!("{name} without time zone");
                }
            }
            _ => {}
        }

        let args = if self.eat_symbol('(') {
            let raw = self.capture_until_close_paren()?;
            self.expect_symbol(')')?;
            raw.split(',').map(|a| a.trim().to_string()).collect()
        } else {
            Vec::new()
        };

        let mut array = false;
        loop {
            if self.eat_symbol('[') {
                self.expect_symbol(']')?;
                array = true;
            } else if self.eat_keyword("ARRAY") {
                array = true;
            } else {
                break;
            }
        }

        Ok(TypeName {
            name,
            args,
            array,
            text: self.finish_text(start),
        })
    }

    fn parse_table_constraint(&mut self) -> Result<TableConstraint, ParseError> {
        let name = if self.eat_keyword("CONSTRAINT") {
            Some(self.parse_ident()?)
        } else {
            None
        };
        let kind = if self.eat_keyword("PRIMARY") {
            self.expect_keyword("KEY")?;
            TableConstraintKind::PrimaryKey {
                columns: self.parse_ident_list()?,
            }
        } else if self.eat_keyword("UNIQUE") {
            TableConstraintKind::Unique {
                columns: self.parse_ident_list()?,
            }
        } else if self.eat_keyword("FOREIGN") {
            self.expect_keyword("KEY")?;
            let columns = self.parse_ident_list()?;
            self.expect_keyword("REFERENCES")?;
            let ref_table = self.parse_object_name()?;
            let ref_columns = if matches!(self.peek(), Some(tok) if tok.kind == TokenKind::Symbol('('))
            {
                self.parse_ident_list()?
            } else {
                Vec::new()
            };
            let (on_delete, on_update) = self.parse_fk_actions()?;
            TableConstraintKind::ForeignKey {
                columns,
                ref_table,
                ref_columns,
                on_delete,
                on_update,
            }
        } else if self.eat_keyword("CHECK") {
            self.expect_symbol('(')?;
            let expr = self.capture_until_close_paren()?;
            self.expect_symbol(')')?;
            TableConstraintKind::Check { expr }
        } else {
            return Err(self.error("expected constraint definition"));
        };

        let deferrable = if self.eat_keywords(&["NOT", "DEFERRABLE"]) {
            false
        } else {
            self.eat_keyword("DEFERRABLE")
        };
        let initially_deferred = if self.eat_keyword("INITIALLY") {
            if self.eat_keyword("DEFERRED") {
                true
            } else {
                self.expect_keyword("IMMEDIATE")?;
                false
            }
        } else {
            false
        };

        Ok(TableConstraint {
            name,
            kind,
            deferrable,
            initially_deferred,
        })
    }

    fn parse_fk_actions(&mut self) -> Result<(Option<String>, Option<String>), ParseError> {
        let mut on_delete = None;
        let mut on_update = None;
        while self.eat_keyword("ON") {
            let is_delete = if self.eat_keyword("DELETE") {
                true
            } else {
                self.expect_keyword("UPDATE")?;
                false
            };
            let action = self.parse_fk_action()?;
            if is_delete {
                on_delete = Some(action);
            } else {
                on_update = Some(action);
            }
        }
        Ok((on_delete, on_update))
    }

    fn parse_fk_action(&mut self) -> Result<String, ParseError> {
        if self.eat_keyword("CASCADE") {
            Ok("CASCADE".to_string())
        } else if self.eat_keyword("RESTRICT") {
            Ok("RESTRICT".to_string())
        } else if self.eat_keyword("SET") {
            if self.eat_keyword("NULL") {
                Ok("SET NULL".to_string())
            } else {
                self.expect_keyword("DEFAULT")?;
                Ok("SET DEFAULT".to_string())
            }
        } else if self.eat_keyword("NO") {
            self.expect_keyword("ACTION")?;
            Ok("NO ACTION".to_string())
        } else {
            Err(self.error("expected referential action"))
        }
    }

    fn parse_create_index(&mut self, start: usize, unique: bool) -> Result<Statement, ParseError> {
        self.eat_keyword("CONCURRENTLY");
        self.eat_keywords(&["IF", "NOT", "EXISTS"]);
        let name = if self.is_keyword("ON") {
            None
        } else {
            Some(self.parse_ident()?)
        };
        self.expect_keyword("ON")?;
        let table = self.parse_object_name()?;
        let method = if self.eat_keyword("USING") {
            Some(self.parse_ident()?)
        } else {
            None
        };
        self.expect_symbol('(')?;
        let mut columns = vec![self.capture_index_elem()?];
        while self.eat_symbol(',') {
            columns.push(self.capture_index_elem()?);
        }
        self.expect_symbol(')')?;
        let predicate = if self.eat_keyword("WHERE") {
            Some(self.capture_until_stmt_end()?)
        } else {
            None
        };

        let name = name.unwrap_or_else(|| default_index_name(&table.name, &columns));
        Ok(Statement::CreateIndex(CreateIndex {
            name,
            table,
            unique,
            method,
            columns,
            predicate,
            text: self.finish_text(start),
        }))
    }

    fn parse_create_view(&mut self, start: usize, or_replace: bool) -> Result<Statement, ParseError> {
        let name = self.parse_object_name()?;
        self.expect_keyword("AS")?;
        let body = self.capture_until_stmt_end()?;
        Ok(Statement::CreateView(CreateView {
            name,
            or_replace,
            body,
            text: self.finish_text(start),
        }))
    }

    fn parse_create_policy(&mut self, start: usize) -> Result<Statement, ParseError> {
        let name = self.parse_ident()?;
        self.expect_keyword("ON")?;
        let table = self.parse_object_name()?;
        let mut permissive = true;
        if self.eat_keyword("AS") {
            if !self.eat_keyword("PERMISSIVE") {
                self.expect_keyword("RESTRICTIVE")?;
                permissive = false;
            }
        }
        let command = if self.eat_keyword("FOR") {
            if self.eat_keyword("ALL") {
                PolicyCommand::All
            } else if self.eat_keyword("SELECT") {
                PolicyCommand::Select
            } else if self.eat_keyword("INSERT") {
                PolicyCommand::Insert
            } else if self.eat_keyword("UPDATE") {
                PolicyCommand::Update
            } else {
                self.expect_keyword("DELETE")?;
                PolicyCommand::Delete
            }
        } else {
            PolicyCommand::All
        };
        let roles = if self.eat_keyword("TO") {
            let mut roles = vec![self.parse_ident()?];
            while self.eat_symbol(',') {
                roles.push(self.parse_ident()?);
            }
            roles
        } else {
            vec!["public".to_string()]
        };
        let using_expr = if self.eat_keyword("USING") {
            self.expect_symbol('(')?;
            let expr = self.capture_until_close_paren()?;
            self.expect_symbol(')')?;
            Some(expr)
        } else {
            None
        };
        let check_expr = if self.eat_keyword("WITH") {
            self.expect_keyword("CHECK")?;
            self.expect_symbol('(')?;
            let expr = self.capture_until_close_paren()?;
            self.expect_symbol(')')?;
            Some(expr)
        } else {
            None
        };

        Ok(Statement::CreatePolicy(CreatePolicy {
            name,
            table,
            permissive,
            command,
            roles,
            using_expr,
            check_expr,
            text: self.finish_text(start),
        }))
    }

    fn parse_create_type(&mut self, start: usize) -> Result<Statement, ParseError> {
        let name = self.parse_object_name()?;
        self.expect_keyword("AS")?;
        let representation = if self.eat_keyword("ENUM") {
            self.expect_symbol('(')?;
            let mut labels = Vec::new();
            if !matches!(self.peek(), Some(tok) if tok.kind == TokenKind::Symbol(')')) {
                loop {
                    match self.peek() {
                        Some(tok) if tok.kind == TokenKind::String => {
                            labels.push(unquote_string(tok.text(self.src)));
                            self.pos += 1;
                        }
                        _ => return Err(self.error("expected enum label")),
                    }
                    if !self.eat_symbol(',') {
                        break;
                    }
                }
            }
            self.expect_symbol(')')?;
            TypeRepresentation::Enum { labels }
        } else {
            self.expect_symbol('(')?;
            let mut fields = Vec::new();
            if !matches!(self.peek(), Some(tok) if tok.kind == TokenKind::Symbol(')')) {
                loop {
                    let field = self.parse_ident()?;
                    let ty = self.parse_type_name()?;
                    fields.push((field, ty));
                    if !self.eat_symbol(',') {
                        break;
                    }
                }
            }
            self.expect_symbol(')')?;
            TypeRepresentation::Composite { fields }
        };

        Ok(Statement::CreateType(CreateType {
            name,
            representation,
            text: self.finish_text(start),
        }))
    }

    fn parse_create_extension(&mut self, start: usize) -> Result<Statement, ParseError> {
        let if_not_exists = self.eat_keywords(&["IF", "NOT", "EXISTS"]);
        let name = self.parse_ident()?;
        // Swallow WITH SCHEMA / VERSION / CASCADE options.
        while let Some(tok) = self.peek() {
            if tok.kind == TokenKind::Symbol(';') {
                break;
            }
            self.pos += 1;
        }
        Ok(Statement::CreateExtension(CreateExtension {
            name,
            if_not_exists,
            text: self.finish_text(start),
        }))
    }

    fn parse_alter_table(&mut self, start: usize) -> Result<Statement, ParseError> {
        self.eat_keyword("ONLY");
        let table = self.parse_object_name()?;
        self.expect_keyword("ADD")?;

        let operation = if self.is_keyword("INDEX")
            || (self.is_keyword("UNIQUE") && self.is_keyword_at(1, "INDEX"))
        {
            let unique = self.eat_keyword("UNIQUE");
            self.expect_keyword("INDEX")?;
            let name = self.parse_ident()?;
            self.expect_symbol('(')?;
            let mut columns = vec![self.capture_index_elem()?];
            while self.eat_symbol(',') {
                columns.push(self.capture_index_elem()?);
            }
            self.expect_symbol(')')?;
            AlterTableOp::AddIndex {
                name,
                unique,
                columns,
            }
        } else if self.at_constraint_start() {
            AlterTableOp::AddConstraint(self.parse_table_constraint()?)
        } else {
            self.eat_keyword("COLUMN");
            AlterTableOp::AddColumn(self.parse_column_def()?)
        };

        Ok(Statement::AlterTable(AlterTable {
            table,
            operation,
            text: self.finish_text(start),
        }))
    }
}

/// Parse one raw index element like `email DESC NULLS LAST`,
/// `"createdAt" DESC` or `lower(email)` into an [`IndexColumn`].
fn parse_index_elem(raw: &str) -> IndexColumn {
    let upper = raw.to_uppercase();
    let (rest, nulls) = if upper.ends_with(" NULLS FIRST") {
        (&raw[..raw.len() - 12], NullsOrder::First)
    } else if upper.ends_with(" NULLS LAST") {
        (&raw[..raw.len() - 11], NullsOrder::Last)
    } else {
        (raw, NullsOrder::Default)
    };
    let rest = rest.trim();
    let upper = rest.to_uppercase();
    let (expr, order) = if upper.ends_with(" DESC") {
        (rest[..rest.len() - 5].trim(), SortOrder::Desc)
    } else if upper.ends_with(" ASC") {
        (rest[..rest.len() - 4].trim(), SortOrder::Asc)
    } else {
        (rest, SortOrder::Asc)
    };

    // A plain column name folds like any identifier would.
    let expr = if expr.starts_with('"') && expr.ends_with('"') && expr.len() >= 2 {
        expr[1..expr.len() - 1].replace("\"\"", "\"")
    } else if expr.chars().all(|c| c.is_alphanumeric() || c == '_') {
        expr.to_ascii_lowercase()
    } else {
        expr.to_string()
    };

    IndexColumn { expr, order, nulls }
}

/// Default name for an anonymous index: `<table>_<cols>_idx`.
fn default_index_name(table: &str, columns: &[IndexColumn]) -> String {
    let cols: Vec<&str> = columns
        .iter()
        .map(|c| {
            if c.expr.chars().all(|ch| ch.is_alphanumeric() || ch == '_') {
                c.expr.as_str()
            } else {
                "expr"
            }
        })
        .collect();
    format!("{}_{}_idx", table, cols.join("_"))
}
