/// Recursive-descent parser for the relm declaration language.
use crate::ast::*;
use crate::lexer::{LexError, Lexer, SpannedToken, Token};
use serde_json::{Number, Value};

/// A syntax error with the position of the offending token.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{line}:{col}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        let LexError { line, col, message } = e;
        Self { line, col, message }
    }
}

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    pub fn parse(input: &str) -> Result<File, ParseError> {
        let tokens = Lexer::new(input).tokenize()?;
        Self { tokens, pos: 0 }.parse_file()
    }

    // -- Helpers --

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn error(&self, message: String) -> ParseError {
        let SpannedToken { line, col, .. } = self.tokens[self.pos];
        ParseError { line, col, message }
    }

    /// Step past the current token. The trailing `Eof` is never consumed.
    fn advance(&mut self) {
        self.pos = (self.pos + 1).min(self.tokens.len() - 1);
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {expected}, got {}", self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(s) => {
                self.advance();
                Ok(s)
            }
            // Keywords that may double as names inside a body
            Token::Group
            | Token::Offset
            | Token::Require
            | Token::Exclude
            | Token::Modified
            | Token::Query => {
                let s = self.peek().to_string();
                self.advance();
                Ok(s)
            }
            other => Err(self.error(format!("expected identifier, got {other}"))),
        }
    }

    fn expect_integer(&mut self) -> Result<u64, ParseError> {
        match self.peek().clone() {
            Token::Integer(n) => {
                self.advance();
                Ok(n)
            }
            other => Err(self.error(format!("expected integer, got {other}"))),
        }
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    // -- Top-level --

    fn parse_file(&mut self) -> Result<File, ParseError> {
        let package = self.parse_package_decl()?;
        let mut items = Vec::new();
        while !self.at(&Token::Eof) {
            items.push(self.parse_top_level_item()?);
        }
        Ok(File { package, items })
    }

    fn parse_package_decl(&mut self) -> Result<PackageDecl, ParseError> {
        self.expect(&Token::Package)?;
        let namespace = self.expect_ident()?;
        self.expect(&Token::Colon)?;
        let name = self.expect_ident()?;
        let version = if self.eat(&Token::At) {
            match self.peek().clone() {
                Token::Version(v) => {
                    self.advance();
                    Some(v)
                }
                other => return Err(self.error(format!("expected version, got {other}"))),
            }
        } else {
            None
        };
        Ok(PackageDecl {
            namespace,
            name,
            version,
        })
    }

    fn parse_top_level_item(&mut self) -> Result<TopLevelItem, ParseError> {
        match self.peek() {
            Token::Enum => Ok(TopLevelItem::Enum(self.parse_enum()?)),
            Token::Component => Ok(TopLevelItem::Component(self.parse_component()?)),
            Token::System => Ok(TopLevelItem::System(self.parse_system()?)),
            other => Err(self.error(format!("expected top-level item, got {other}"))),
        }
    }

    // -- Type expression --

    fn parse_type_expr(&mut self) -> Result<TypeExpr, ParseError> {
        match self.peek().clone() {
            Token::List => {
                self.advance();
                Ok(TypeExpr::List(Box::new(self.parse_single_type_arg()?)))
            }
            Token::OptionKw => {
                self.advance();
                Ok(TypeExpr::Option(Box::new(self.parse_single_type_arg()?)))
            }
            Token::Set => {
                self.advance();
                Ok(TypeExpr::Set(Box::new(self.parse_single_type_arg()?)))
            }
            Token::Map => {
                self.advance();
                self.expect(&Token::LAngle)?;
                let key = self.parse_type_expr()?;
                self.expect(&Token::Comma)?;
                let val = self.parse_type_expr()?;
                self.expect(&Token::RAngle)?;
                Ok(TypeExpr::Map(Box::new(key), Box::new(val)))
            }
            Token::Tuple => {
                self.advance();
                self.expect(&Token::LAngle)?;
                let mut types = vec![self.parse_type_expr()?];
                while self.eat(&Token::Comma) {
                    if self.at(&Token::RAngle) {
                        break;
                    }
                    types.push(self.parse_type_expr()?);
                }
                self.expect(&Token::RAngle)?;
                Ok(TypeExpr::Tuple(types))
            }
            Token::Ident(ref s) => {
                let name = s.clone();
                self.advance();
                if is_primitive(&name) {
                    Ok(TypeExpr::Primitive(name))
                } else {
                    Ok(TypeExpr::Named(name))
                }
            }
            other => Err(self.error(format!("expected type expression, got {other}"))),
        }
    }

    fn parse_single_type_arg(&mut self) -> Result<TypeExpr, ParseError> {
        self.expect(&Token::LAngle)?;
        let inner = self.parse_type_expr()?;
        self.expect(&Token::RAngle)?;
        Ok(inner)
    }

    // -- Literals (field defaults) --

    fn parse_literal(&mut self) -> Result<Value, ParseError> {
        match self.peek().clone() {
            Token::Minus => {
                self.advance();
                match self.peek().clone() {
                    Token::Integer(n) => {
                        self.advance();
                        let n = i64::try_from(n)
                            .map_err(|_| self.error(format!("integer out of range: -{n}")))?;
                        Ok(Value::Number(Number::from(-n)))
                    }
                    Token::Float(f) => {
                        self.advance();
                        self.float_value(-f)
                    }
                    other => Err(self.error(format!("expected number after '-', got {other}"))),
                }
            }
            Token::Integer(n) => {
                self.advance();
                Ok(Value::Number(Number::from(n)))
            }
            Token::Float(f) => {
                self.advance();
                self.float_value(f)
            }
            Token::Str(s) => {
                self.advance();
                Ok(Value::String(s))
            }
            Token::True => {
                self.advance();
                Ok(Value::Bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Value::Bool(false))
            }
            Token::NoneKw => {
                self.advance();
                Ok(Value::Null)
            }
            // Enum case
            Token::Ident(s) => {
                self.advance();
                Ok(Value::String(s))
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                loop {
                    if self.at(&Token::RBracket) {
                        break;
                    }
                    items.push(self.parse_literal()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Value::Array(items))
            }
            other => Err(self.error(format!("expected literal, got {other}"))),
        }
    }

    fn float_value(&self, f: f64) -> Result<Value, ParseError> {
        Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| self.error(format!("non-finite float literal: {f}")))
    }

    // -- Enum --

    fn parse_enum(&mut self) -> Result<EnumDef, ParseError> {
        self.expect(&Token::Enum)?;
        let name = self.expect_ident()?;
        self.expect(&Token::LBrace)?;
        let mut variants = Vec::new();
        loop {
            if self.at(&Token::RBrace) {
                break;
            }
            variants.push(self.expect_ident()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        if variants.is_empty() {
            return Err(self.error(format!("enum '{name}' has no variants")));
        }
        Ok(EnumDef { name, variants })
    }

    // -- Component --

    fn parse_component(&mut self) -> Result<ComponentDef, ParseError> {
        self.expect(&Token::Component)?;
        let name = self.expect_ident()?;
        self.expect(&Token::LBrace)?;
        let mut fields: Vec<FieldDef> = Vec::new();
        loop {
            if self.at(&Token::RBrace) {
                break;
            }
            let field_name = self.expect_ident()?;
            if fields.iter().any(|f| f.name == field_name) {
                return Err(self.error(format!(
                    "duplicate field '{field_name}' in component '{name}'"
                )));
            }
            self.expect(&Token::Colon)?;
            let ty = self.parse_type_expr()?;
            let default = if self.eat(&Token::Eq) {
                Some(self.parse_literal()?)
            } else {
                None
            };
            fields.push(FieldDef {
                name: field_name,
                ty,
                default,
                editor: None,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(ComponentDef {
            name,
            fields,
            editor: None,
        })
    }

    // -- System --

    fn parse_system(&mut self) -> Result<SystemDef, ParseError> {
        self.expect(&Token::System)?;
        let name = self.expect_ident()?;
        self.expect(&Token::LBrace)?;

        let mut group = None;
        let mut offset = 0i32;
        let mut queries: Vec<QueryDef> = Vec::new();

        while !self.at(&Token::RBrace) {
            match self.peek() {
                Token::Query => {
                    let query = self.parse_query()?;
                    if queries.iter().any(|q| q.name == query.name) {
                        return Err(self.error(format!(
                            "duplicate query '{}' in system '{name}'",
                            query.name
                        )));
                    }
                    queries.push(query);
                }
                Token::Group => {
                    self.advance();
                    self.expect(&Token::Colon)?;
                    group = Some(self.expect_ident()?);
                    self.eat(&Token::Comma);
                }
                Token::Offset => {
                    self.advance();
                    self.expect(&Token::Colon)?;
                    let negative = self.eat(&Token::Minus);
                    let raw = self.expect_integer()?;
                    let magnitude = i32::try_from(raw)
                        .map_err(|_| self.error(format!("offset out of range: {raw}")))?;
                    offset = if negative { -magnitude } else { magnitude };
                    self.eat(&Token::Comma);
                }
                other => {
                    return Err(self.error(format!("unexpected token in system body: {other}")));
                }
            }
        }
        self.expect(&Token::RBrace)?;

        Ok(SystemDef {
            name,
            group,
            offset,
            queries,
        })
    }

    fn parse_query(&mut self) -> Result<QueryDef, ParseError> {
        self.expect(&Token::Query)?;
        let name = self.expect_ident()?;
        self.expect(&Token::LBrace)?;

        let mut require = Vec::new();
        let mut exclude = Vec::new();
        let mut modified = Vec::new();

        while !self.at(&Token::RBrace) {
            match self.peek() {
                Token::Require => {
                    self.advance();
                    self.expect(&Token::Colon)?;
                    require = self.parse_ident_list()?;
                    self.eat(&Token::Comma);
                }
                Token::Exclude => {
                    self.advance();
                    self.expect(&Token::Colon)?;
                    exclude = self.parse_ident_list()?;
                    self.eat(&Token::Comma);
                }
                Token::Modified => {
                    self.advance();
                    self.expect(&Token::Colon)?;
                    modified = self.parse_ident_list()?;
                    self.eat(&Token::Comma);
                }
                other => {
                    return Err(self.error(format!("unexpected token in query body: {other}")));
                }
            }
        }
        self.expect(&Token::RBrace)?;

        Ok(QueryDef {
            name,
            require,
            exclude,
            modified,
        })
    }

    fn parse_ident_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(&Token::LBracket)?;
        let mut items = Vec::new();
        loop {
            if self.at(&Token::RBracket) {
                break;
            }
            items.push(self.expect_ident()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn is_primitive(name: &str) -> bool {
    matches!(
        name,
        "bool"
            | "u8"
            | "u16"
            | "u32"
            | "u64"
            | "i8"
            | "i16"
            | "i32"
            | "i64"
            | "f32"
            | "f64"
            | "string"
            | "bytes"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
