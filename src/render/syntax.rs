//! Syntax checker for generated configuration text.
//!
//! A winnow tokenizer and a recursive-descent parser for the subset of the
//! Alloy grammar the renderer produces: blocks with optional string labels,
//! attributes, string/number/bool/null literals, lists, objects and dotted
//! references. Parsing yields a [`Body`] so tests can inspect what a reader
//! of the file would see.

use std::fmt;
use thiserror::Error;
use winnow::ascii::{digit1, multispace1, till_line_ending};
use winnow::combinator::{alt, cut_err, fail, opt, preceded, repeat, terminated};
use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::prelude::*;
use winnow::Parser as _;
use winnow::token::{one_of, take_till, take_while};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    String(String),
    Number(String),
    Bool(bool),
    Null,
    List(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    /// Dotted reference such as `loki.write.default.receiver`
    Traversal(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    pub attributes: Vec<(String, Expr)>,
    pub blocks: Vec<Block>,
}

impl Body {
    pub fn attr(&self, key: &str) -> Option<&Expr> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn find_block(&self, name: &str, label: Option<&str>) -> Option<&Block> {
        self.blocks
            .iter()
            .find(|b| b.name == name && b.label.as_deref() == label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub label: Option<String>,
    pub body: Body,
}

/// Parse a configuration file.
pub fn parse(text: &str) -> Result<Body, SyntaxError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let body = parser.body()?;

    match parser.peek() {
        Token { kind: TokenKind::Eof, .. } => Ok(body),
        token => Err(token.error(format!("unexpected {}", token.kind))),
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    String(String),
    Number(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Equals,
    Comma,
    Dot,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "identifier '{}'", s),
            TokenKind::String(_) => f.write_str("string"),
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::LBrace => f.write_str("'{'"),
            TokenKind::RBrace => f.write_str("'}'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::Equals => f.write_str("'='"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Dot => f.write_str("'.'"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
    column: usize,
}

impl Token {
    fn error<S: Into<String>>(&self, message: S) -> SyntaxError {
        SyntaxError {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }
}

/// Line/column tracking over byte offsets into the source text.
struct Cursor<'a> {
    text: &'a str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Advance to `rest`, the unconsumed tail of the text.
    fn seek(&mut self, rest: &str) -> (usize, usize) {
        let target = self.text.len() - rest.len();
        for c in self.text[self.offset..target].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset = target;
        (self.line, self.column)
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut input = text;
    let mut cursor = Cursor::new(text);
    let mut tokens = Vec::new();

    loop {
        let (line, column) = cursor.seek(input);
        trivia.parse_next(&mut input).map_err(|e| SyntaxError {
            line,
            column,
            message: label(e).unwrap_or("invalid whitespace").to_string(),
        })?;

        let (line, column) = cursor.seek(input);
        let start = input;
        let Some(first) = start.chars().next() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                line,
                column,
            });
            return Ok(tokens);
        };

        let kind = token.parse_next(&mut input).map_err(|e| SyntaxError {
            line,
            column,
            message: match label(e) {
                Some(label) => label.to_string(),
                None => format!("unexpected character '{}'", first),
            },
        })?;
        tokens.push(Token { kind, line, column });
    }
}

/// Innermost label attached to a failed parse.
fn label(err: ErrMode<ContextError>) -> Option<&'static str> {
    err.into_inner().ok()?.context().find_map(|c| match c {
        StrContext::Label(label) => Some(*label),
        _ => None,
    })
}

/// Whitespace and `//` comments.
fn trivia(input: &mut &str) -> ModalResult<()> {
    repeat(
        0..,
        alt((multispace1.void(), ("//", till_line_ending).void())),
    )
    .parse_next(input)
}

fn token(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        string_literal.map(TokenKind::String),
        number.map(TokenKind::Number),
        ident.map(TokenKind::Ident),
        '{'.value(TokenKind::LBrace),
        '}'.value(TokenKind::RBrace),
        '['.value(TokenKind::LBracket),
        ']'.value(TokenKind::RBracket),
        '='.value(TokenKind::Equals),
        ','.value(TokenKind::Comma),
        '.'.value(TokenKind::Dot),
    ))
    .parse_next(input)
}

fn ident(input: &mut &str) -> ModalResult<String> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .map(str::to_string)
        .parse_next(input)
}

/// `-?digits(.digits)?([eE][+-]?digits)?`
fn number(input: &mut &str) -> ModalResult<String> {
    (
        opt('-'),
        digit1,
        opt(('.', digit1)),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)),
    )
        .take()
        .map(str::to_string)
        .parse_next(input)
}

enum Fragment<'a> {
    Literal(&'a str),
    Escaped(char),
}

fn string_literal(input: &mut &str) -> ModalResult<String> {
    preceded('"', cut_err(terminated(string_body, closing_quote))).parse_next(input)
}

fn string_body(input: &mut &str) -> ModalResult<String> {
    repeat(
        0..,
        alt((
            take_till(1.., |c: char| c == '"' || c == '\\' || (c.is_control() && c != '\t'))
                .map(Fragment::Literal),
            preceded('\\', cut_err(escape.context(StrContext::Label("invalid escape"))))
                .map(Fragment::Escaped),
        )),
    )
    .fold(String::new, |mut out, fragment| {
        match fragment {
            Fragment::Literal(s) => out.push_str(s),
            Fragment::Escaped(c) => out.push(c),
        }
        out
    })
    .parse_next(input)
}

fn escape(input: &mut &str) -> ModalResult<char> {
    alt((
        '\\'.value('\\'),
        '"'.value('"'),
        'n'.value('\n'),
        'r'.value('\r'),
        't'.value('\t'),
        preceded('u', take_while(4usize, |c: char| c.is_ascii_hexdigit()))
            .verify_map(|hex: &str| u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)),
    ))
    .parse_next(input)
}

fn closing_quote(input: &mut &str) -> ModalResult<()> {
    let label = match input.chars().next() {
        Some('"') => return '"'.void().parse_next(input),
        None | Some('\n') => "unterminated string",
        Some(_) => "raw control character in string",
    };
    fail::<_, (), _>
        .context(StrContext::Label(label))
        .parse_next(input)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token list always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, SyntaxError> {
        let token = self.next();
        if token.kind == kind {
            Ok(token)
        } else {
            Err(token.error(format!("expected {}, found {}", kind, token.kind)))
        }
    }

    fn ident(&mut self) -> Result<String, SyntaxError> {
        let token = self.next();
        match token.kind {
            TokenKind::Ident(name) => Ok(name),
            ref other => Err(token.error(format!("expected identifier, found {}", other))),
        }
    }

    /// `IDENT ('.' IDENT)*`
    fn dotted(&mut self, first: String) -> Result<String, SyntaxError> {
        let mut name = first;
        while self.peek().kind == TokenKind::Dot {
            self.next();
            name.push('.');
            name.push_str(&self.ident()?);
        }
        Ok(name)
    }

    fn body(&mut self) -> Result<Body, SyntaxError> {
        let mut body = Body::default();

        loop {
            match &self.peek().kind {
                TokenKind::Eof | TokenKind::RBrace => return Ok(body),
                TokenKind::Ident(_) => {}
                other => {
                    return Err(self
                        .peek()
                        .error(format!("expected attribute or block, found {}", other)))
                }
            }

            let head = self.peek().clone();
            let first = self.ident()?;

            if self.peek().kind == TokenKind::Equals {
                self.next();
                let value = self.expr()?;
                if body.attributes.iter().any(|(k, _)| *k == first) {
                    return Err(head.error(format!("attribute '{}' set twice", first)));
                }
                body.attributes.push((first, value));
                continue;
            }

            let name = self.dotted(first)?;
            let label = match &self.peek().kind {
                TokenKind::String(label) => Some(label.clone()),
                _ => None,
            };
            if label.is_some() {
                self.next();
            }

            self.expect(TokenKind::LBrace)?;
            let inner = self.body()?;
            self.expect(TokenKind::RBrace)?;

            body.blocks.push(Block {
                name,
                label,
                body: inner,
            });
        }
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.next();
        match token.kind {
            TokenKind::String(s) => Ok(Expr::String(s)),
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Ident(name) if name == "true" => Ok(Expr::Bool(true)),
            TokenKind::Ident(name) if name == "false" => Ok(Expr::Bool(false)),
            TokenKind::Ident(name) if name == "null" => Ok(Expr::Null),
            TokenKind::Ident(name) => Ok(Expr::Traversal(self.dotted(name)?)),
            TokenKind::LBracket => self.list(),
            TokenKind::LBrace => self.object(),
            ref other => Err(token.error(format!("expected expression, found {}", other))),
        }
    }

    fn list(&mut self) -> Result<Expr, SyntaxError> {
        let mut items = Vec::new();
        loop {
            if self.peek().kind == TokenKind::RBracket {
                self.next();
                return Ok(Expr::List(items));
            }
            items.push(self.expr()?);

            let token = self.next();
            match token.kind {
                TokenKind::Comma => {}
                TokenKind::RBracket => return Ok(Expr::List(items)),
                ref other => return Err(token.error(format!("expected ',' or ']', found {}", other))),
            }
        }
    }

    fn object(&mut self) -> Result<Expr, SyntaxError> {
        let mut entries: Vec<(String, Expr)> = Vec::new();
        loop {
            let token = self.next();
            let key = match token.kind {
                TokenKind::RBrace => return Ok(Expr::Object(entries)),
                TokenKind::Ident(ref key) | TokenKind::String(ref key) => key.clone(),
                ref other => {
                    return Err(token.error(format!("expected object key, found {}", other)))
                }
            };
            if entries.iter().any(|(k, _)| *k == key) {
                return Err(token.error(format!("object key '{}' set twice", key)));
            }

            self.expect(TokenKind::Equals)?;
            entries.push((key, self.expr()?));

            let token = self.next();
            match token.kind {
                TokenKind::Comma => {}
                TokenKind::RBrace => return Ok(Expr::Object(entries)),
                ref other => return Err(token.error(format!("expected ',' or '}}', found {}", other))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blocks_and_attributes() {
        let body = parse(
            r#"
// generated
loki.write "default" {
	endpoint {
		url = "http://loki:3100/loki/api/v1/push"
	}
	external_labels = {}
}

loki.source.file "system" {
	targets    = local.file_match.system.targets
	forward_to = [loki.write.default.receiver]
}
"#,
        )
        .unwrap();

        assert_eq!(body.blocks.len(), 2);
        let write = body.find_block("loki.write", Some("default")).unwrap();
        assert_eq!(write.body.attr("external_labels"), Some(&Expr::Object(vec![])));
        let endpoint = write.body.find_block("endpoint", None).unwrap();
        assert_eq!(
            endpoint.body.attr("url"),
            Some(&Expr::String("http://loki:3100/loki/api/v1/push".to_string()))
        );

        let source = body.find_block("loki.source.file", Some("system")).unwrap();
        assert_eq!(
            source.body.attr("forward_to"),
            Some(&Expr::List(vec![Expr::Traversal(
                "loki.write.default.receiver".to_string()
            )]))
        );
    }

    #[test]
    fn test_parse_literals() {
        let body = parse(
            r#"stage.x {
	a = [0.1, 1.0, -3, 1e-07]
	b = true
	c = null
	d = [{
		"app.kubernetes.io/name" = "x",
		y = "z",
	}, {}]
	e = "tab\there \"q\" \\ \u00e9"
}"#,
        )
        .unwrap();

        let block = &body.blocks[0].body;
        assert_eq!(
            block.attr("a"),
            Some(&Expr::List(vec![
                Expr::Number("0.1".to_string()),
                Expr::Number("1.0".to_string()),
                Expr::Number("-3".to_string()),
                Expr::Number("1e-07".to_string()),
            ]))
        );
        assert_eq!(block.attr("b"), Some(&Expr::Bool(true)));
        assert_eq!(block.attr("c"), Some(&Expr::Null));
        let Some(Expr::List(objects)) = block.attr("d") else {
            panic!("d must be a list");
        };
        assert_eq!(objects.len(), 2);
        assert_eq!(
            block.attr("e"),
            Some(&Expr::String("tab\there \"q\" \\ é".to_string()))
        );
    }

    #[test]
    fn test_errors_have_positions() {
        let err = parse("a {\n\tb = \n}\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("expected expression"));

        let err = parse("a {\n\tb = \"open\n}\n").unwrap_err();
        assert!(err.message.contains("unterminated"));

        let err = parse("a {\n").unwrap_err();
        assert!(err.message.contains("end of input"));

        let err = parse("a { }\n}\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_rejects_duplicates() {
        assert!(parse("a {\n\tb = 1\n\tb = 2\n}\n").is_err());
        assert!(parse("a {\n\tb = {x = 1, x = 2}\n}\n").is_err());
    }

    #[test]
    fn test_lexer_errors() {
        let err = parse("a {\n\tb = \"x\u{0001}y\"\n}\n").unwrap_err();
        assert_eq!(err.message, "raw control character in string");

        let err = parse("a {\n\tb = #\n}\n").unwrap_err();
        assert_eq!((err.line, err.column), (2, 6));
        assert_eq!(err.message, "unexpected character '#'");

        let err = parse("a {\n\tb = \"\\u12\"\n}\n").unwrap_err();
        assert_eq!(err.message, "invalid escape");
    }

    #[test]
    fn test_rejects_bad_escape() {
        let err = parse("a {\n\tb = \"\\q\"\n}\n").unwrap_err();
        assert!(err.message.contains("escape"));
    }
}
