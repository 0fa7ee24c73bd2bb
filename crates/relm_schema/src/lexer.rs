/// Lexer for the relm declaration language.
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Package,
    Enum,
    Component,
    System,
    Query,
    Group,
    Offset,
    Require,
    Exclude,
    Modified,
    True,
    False,
    NoneKw,

    // Parameterized type keywords
    List,
    OptionKw,
    Set,
    Map,
    Tuple,

    // Literals
    Ident(String),
    Integer(u64),
    Float(f64),
    Str(String),
    /// A dotted `major.minor.patch` run, only meaningful after `@`.
    Version(String),

    // Punctuation
    Colon,
    Comma,
    Dot,
    At,
    Eq,
    Minus,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LAngle,
    RAngle,

    // Special
    Eof,
}

/// Reserved words. Everything else that looks like a word is an identifier.
const KEYWORDS: &[(&str, Token)] = &[
    ("package", Token::Package),
    ("enum", Token::Enum),
    ("component", Token::Component),
    ("system", Token::System),
    ("query", Token::Query),
    ("group", Token::Group),
    ("offset", Token::Offset),
    ("require", Token::Require),
    ("exclude", Token::Exclude),
    ("modified", Token::Modified),
    ("true", Token::True),
    ("false", Token::False),
    ("none", Token::NoneKw),
    ("list", Token::List),
    ("option", Token::OptionKw),
    ("set", Token::Set),
    ("map", Token::Map),
    ("tuple", Token::Tuple),
];

const PUNCT: &[(u8, Token)] = &[
    (b':', Token::Colon),
    (b',', Token::Comma),
    (b'.', Token::Dot),
    (b'@', Token::At),
    (b'=', Token::Eq),
    (b'-', Token::Minus),
    (b'{', Token::LBrace),
    (b'}', Token::RBrace),
    (b'[', Token::LBracket),
    (b']', Token::RBracket),
    (b'<', Token::LAngle),
    (b'>', Token::RAngle),
];

impl Token {
    fn keyword(word: &str) -> Option<Token> {
        KEYWORDS
            .iter()
            .find(|(kw, _)| *kw == word)
            .map(|(_, tok)| tok.clone())
    }

    fn punct(byte: u8) -> Option<Token> {
        PUNCT
            .iter()
            .find(|(b, _)| *b == byte)
            .map(|(_, tok)| tok.clone())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) | Token::Version(s) => f.write_str(s),
            Token::Integer(n) => write!(f, "{n}"),
            Token::Float(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Eof => f.write_str("end of input"),
            other => {
                if let Some((kw, _)) = KEYWORDS.iter().find(|(_, t)| t == other) {
                    return f.write_str(kw);
                }
                match PUNCT.iter().find(|(_, t)| t == other) {
                    Some((b, _)) => write!(f, "{}", *b as char),
                    None => write!(f, "{other:?}"),
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub line: usize,
    pub col: usize,
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.token == Token::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            while self.peek_byte().is_some_and(|b| b.is_ascii_whitespace()) {
                self.advance();
            }

            // Line comments
            if self.peek_byte() == Some(b'/') && self.peek_byte_at(1) == Some(b'/') {
                while let Some(b) = self.peek_byte() {
                    self.advance();
                    if b == b'\n' {
                        break;
                    }
                }
                continue;
            }

            // Block comments
            if self.peek_byte() == Some(b'/') && self.peek_byte_at(1) == Some(b'*') {
                let (line, col) = (self.line, self.col);
                self.advance();
                self.advance();
                loop {
                    match self.advance() {
                        None => {
                            return Err(LexError {
                                line,
                                col,
                                message: "unterminated block comment".to_string(),
                            });
                        }
                        Some(b'*') => {
                            if self.peek_byte() == Some(b'/') {
                                self.advance();
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                continue;
            }

            return Ok(());
        }
    }

    fn next_token(&mut self) -> Result<SpannedToken, LexError> {
        self.skip_whitespace_and_comments()?;

        let line = self.line;
        let col = self.col;

        let Some(b) = self.peek_byte() else {
            return Ok(SpannedToken {
                token: Token::Eof,
                line,
                col,
            });
        };

        if let Some(token) = Token::punct(b) {
            self.advance();
            return Ok(SpannedToken { token, line, col });
        }

        if b == b'"' {
            let token = self.lex_string(line, col)?;
            return Ok(SpannedToken { token, line, col });
        }

        if b.is_ascii_digit() {
            let token = self.lex_number(line, col)?;
            return Ok(SpannedToken { token, line, col });
        }

        if b.is_ascii_alphabetic() || b == b'_' {
            let start = self.pos;
            while self
                .peek_byte()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
            {
                self.advance();
            }
            // Only ASCII bytes were consumed above.
            let word = String::from_utf8_lossy(&self.input[start..self.pos]);
            let token = Token::keyword(&word).unwrap_or_else(|| Token::Ident(word.into_owned()));
            return Ok(SpannedToken { token, line, col });
        }

        Err(LexError {
            line,
            col,
            message: format!("unexpected character: '{}'", b as char),
        })
    }

    /// Digits and dots: no dot is an integer, one is a float, two is a version.
    fn lex_number(&mut self, line: usize, col: usize) -> Result<Token, LexError> {
        let start = self.pos;
        let mut dots = 0;
        while let Some(c) = self.peek_byte() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == b'.' && self.peek_byte_at(1).is_some_and(|n| n.is_ascii_digit()) {
                dots += 1;
                self.advance();
            } else {
                break;
            }
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        let bad = |message: String| LexError { line, col, message };
        match dots {
            0 => text
                .parse()
                .map(Token::Integer)
                .map_err(|_| bad(format!("integer out of range: {text}"))),
            1 => text
                .parse()
                .map(Token::Float)
                .map_err(|_| bad(format!("invalid float: {text}"))),
            2 => Ok(Token::Version(text)),
            _ => Err(bad(format!("malformed number: {text}"))),
        }
    }

    fn lex_string(&mut self, line: usize, col: usize) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.advance() {
                None | Some(b'\n') => {
                    return Err(LexError {
                        line,
                        col,
                        message: "unterminated string literal".to_string(),
                    });
                }
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(c @ (b'"' | b'\\')) => bytes.push(c),
                    other => {
                        return Err(LexError {
                            line: self.line,
                            col: self.col,
                            message: format!(
                                "unknown escape: \\{}",
                                other.map(|c| c as char).unwrap_or(' ')
                            ),
                        });
                    }
                },
                Some(c) => bytes.push(c),
            }
        }
        String::from_utf8(bytes)
            .map(Token::Str)
            .map_err(|_| LexError {
                line,
                col,
                message: "string literal is not valid UTF-8".to_string(),
            })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{line}:{col}: {message}")]
pub struct LexError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        let toks = tokens("component position { x: f32, y: f32 }");
        assert_eq!(toks[0], Token::Component);
        assert!(matches!(toks[1], Token::Ident(ref s) if s == "position"));
        assert_eq!(toks[2], Token::LBrace);
    }

    #[test]
    fn test_comments() {
        let toks = tokens("// line comment\ncomponent /* block */ frozen {}");
        assert_eq!(toks[0], Token::Component);
        assert!(matches!(toks[1], Token::Ident(ref s) if s == "frozen"));
    }

    #[test]
    fn test_package_version() {
        let toks = tokens("package relm:core@0.1.0");
        assert_eq!(toks[0].to_string(), "package");
        assert_eq!(toks[0], Token::Package);
        assert_eq!(toks[2], Token::Colon);
        assert_eq!(toks[4], Token::At);
        assert_eq!(toks[5], Token::Version("0.1.0".to_string()));
    }

    #[test]
    fn test_numeric_literals() {
        let toks = tokens("= -1.5, 42");
        assert_eq!(toks[0], Token::Eq);
        assert_eq!(toks[1], Token::Minus);
        assert_eq!(toks[2], Token::Float(1.5));
        assert_eq!(toks[4], Token::Integer(42));
    }

    #[test]
    fn test_display_round_trips_keywords_and_punct() {
        for src in ["component", "tuple", "{", ">", "-"] {
            assert_eq!(tokens(src)[0].to_string(), src);
        }
        assert_eq!(Token::Eof.to_string(), "end of input");
    }

    #[test]
    fn test_string_escapes() {
        let toks = tokens(r#""say \"hi\"""#);
        assert_eq!(toks[0], Token::Str("say \"hi\"".to_string()));
    }

    #[test]
    fn test_unterminated_block_comment_reports_opening() {
        let err = Lexer::new("component a {}\n  /* never closed")
            .tokenize()
            .unwrap_err();
        assert_eq!((err.line, err.col), (2, 3));
        assert!(err.message.contains("block comment"));
    }

    #[test]
    fn test_unterminated_string_reports_position() {
        let err = Lexer::new("\n  \"oops").tokenize().unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.col, 3);
    }
}
