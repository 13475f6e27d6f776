//! Schema grammar and parser
//!
//! A schema describes the shape of the values moved across the Lua boundary:
//!
//! ```text
//! sequence  := directive (';' directive)*
//! directive := scalar | table
//! scalar    := 'b' | 'i' | 'f' | 's' | 'l' | 'u'
//! table     := '{' pair (',' pair)* '}'
//! pair      := key ':' directive
//! key       := identifier | integer-literal
//! ```
//!
//! The scalar tags stand for boolean, integer, float, string, callable
//! (`l`, a Lua function) and opaque reference (`u`, userdata). Whitespace
//! between tokens is ignored, so config schemas can be written over several
//! lines.
//!
//! Parsing is done by pure functions over an immutable token slice; every
//! step returns its result together with the position of the next token.

use crate::value::Key;
use crate::{Error, Result};
use std::fmt;

/// Default cap on table nesting, shared by the parser and the engines
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Leaf type of a directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// `b`
    Bool,
    /// `i`, an integer-valued number
    Int,
    /// `f`, any number
    Float,
    /// `s`, a string or a number coerced to one
    String,
    /// `l`, a function, registered as a handle on pop
    Callable,
    /// `u`, a host object passed by reference
    Opaque,
}

impl Tag {
    /// Parse a single-character scalar tag
    pub fn from_char(c: char) -> Option<Tag> {
        match c {
            'b' => Some(Tag::Bool),
            'i' => Some(Tag::Int),
            'f' => Some(Tag::Float),
            's' => Some(Tag::String),
            'l' => Some(Tag::Callable),
            'u' => Some(Tag::Opaque),
            _ => None,
        }
    }

    /// Schema character for this tag
    pub fn as_char(self) -> char {
        match self {
            Tag::Bool => 'b',
            Tag::Int => 'i',
            Tag::Float => 'f',
            Tag::String => 's',
            Tag::Callable => 'l',
            Tag::Opaque => 'u',
        }
    }

    /// Human readable name used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Tag::Bool => "boolean",
            Tag::Int => "integer",
            Tag::Float => "number",
            Tag::String => "string",
            Tag::Callable => "function",
            Tag::Opaque => "userdata",
        }
    }
}

/// One parsed schema node
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// A scalar consuming one binding
    Leaf(Tag),
    /// Pairs in schema order; keys are unique
    Table(Vec<(Key, Directive)>),
}

impl Directive {
    /// Append the leaf tags of this directive in depth-first order
    pub fn collect_leaves(&self, out: &mut Vec<Tag>) {
        match self {
            Directive::Leaf(tag) => out.push(*tag),
            Directive::Table(pairs) => {
                for (_, child) in pairs {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Nesting depth, a leaf counting as one
    pub fn depth(&self) -> usize {
        match self {
            Directive::Leaf(_) => 1,
            Directive::Table(pairs) => {
                1 + pairs.iter().map(|(_, d)| d.depth()).max().unwrap_or(0)
            }
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Leaf(tag) => write!(f, "{}", tag.as_char()),
            Directive::Table(pairs) => {
                write!(f, "{{")?;
                for (i, (key, child)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, child)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A parsed schema: one directive per `;`-separated segment
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    directives: Vec<Directive>,
}

impl Schema {
    /// Parse a schema with the default nesting limit
    pub fn parse(source: &str) -> Result<Schema> {
        Self::parse_with_limit(source, DEFAULT_MAX_DEPTH)
    }

    /// Parse a schema, failing with [`Error::RecursionLimit`] when tables nest
    /// deeper than `max_depth`
    pub fn parse_with_limit(source: &str, max_depth: usize) -> Result<Schema> {
        let tokens = tokenize(source)?;
        let directives = parse_sequence(&tokens, max_depth)?;
        Ok(Schema { directives })
    }

    /// Top-level directives, one per value in a sequence
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Number of top-level directives
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Leaf tags in binding order (left to right, depth first)
    pub fn leaves(&self) -> Vec<Tag> {
        let mut out = Vec::new();
        for directive in &self.directives {
            directive.collect_leaves(&mut out);
        }
        out
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, directive) in self.directives.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", directive)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Schema {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Schema::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Word(String),
    LBrace,
    RBrace,
    Colon,
    Comma,
    Semicolon,
    End,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Word(w) => write!(f, "'{}'", w),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Semicolon => write!(f, "';'"),
            TokenKind::End => write!(f, "end of schema"),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        let kind = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            c if is_word_char(c) => {
                let mut end = position;
                while let Some(&(i, c)) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token {
                    kind: TokenKind::Word(source[position..end].to_string()),
                    position,
                });
                continue;
            }
            other => {
                return Err(Error::SchemaSyntax {
                    position,
                    found: format!("'{}'", other),
                    expected: "a tag, key or one of \"{}:,;\"".to_string(),
                })
            }
        };
        chars.next();
        tokens.push(Token { kind, position });
    }

    tokens.push(Token {
        kind: TokenKind::End,
        position: source.len(),
    });
    Ok(tokens)
}

fn syntax_error(token: &Token, expected: &str) -> Error {
    Error::SchemaSyntax {
        position: token.position,
        found: token.kind.to_string(),
        expected: expected.to_string(),
    }
}

/// The token stream always ends with `End`, so lookups clamp to it
fn token_at(tokens: &[Token], pos: usize) -> &Token {
    &tokens[pos.min(tokens.len() - 1)]
}

fn parse_sequence(tokens: &[Token], max_depth: usize) -> Result<Vec<Directive>> {
    let mut directives = Vec::new();
    let mut pos = 0;

    loop {
        let (directive, next) = parse_directive(tokens, pos, 1, max_depth)?;
        directives.push(directive);

        let token = token_at(tokens, next);
        match token.kind {
            TokenKind::Semicolon => pos = next + 1,
            TokenKind::End => return Ok(directives),
            _ => return Err(syntax_error(token, "';' or end of schema")),
        }
    }
}

fn parse_directive(
    tokens: &[Token],
    pos: usize,
    depth: usize,
    max_depth: usize,
) -> Result<(Directive, usize)> {
    if depth > max_depth {
        return Err(Error::RecursionLimit { limit: max_depth });
    }

    let token = token_at(tokens, pos);
    match &token.kind {
        TokenKind::LBrace => parse_table(tokens, pos + 1, depth, max_depth),
        TokenKind::Word(word) => {
            let mut chars = word.chars();
            match (chars.next().and_then(Tag::from_char), chars.next()) {
                (Some(tag), None) => Ok((Directive::Leaf(tag), pos + 1)),
                _ => Err(syntax_error(token, "one of \"bifslu{\"")),
            }
        }
        _ => Err(syntax_error(token, "one of \"bifslu{\"")),
    }
}

/// Parse the pairs of a table; `pos` is just past the opening brace
fn parse_table(
    tokens: &[Token],
    mut pos: usize,
    depth: usize,
    max_depth: usize,
) -> Result<(Directive, usize)> {
    let mut pairs: Vec<(Key, Directive)> = Vec::new();

    loop {
        let key_token = token_at(tokens, pos);
        let (key, next) = parse_key(tokens, pos)?;
        if pairs.iter().any(|(k, _)| *k == key) {
            return Err(syntax_error(key_token, "a key not already used in this table"));
        }

        let colon = token_at(tokens, next);
        if colon.kind != TokenKind::Colon {
            return Err(syntax_error(colon, "':'"));
        }

        let (child, next) = parse_directive(tokens, next + 1, depth + 1, max_depth)?;
        pairs.push((key, child));

        let token = token_at(tokens, next);
        match token.kind {
            TokenKind::Comma => pos = next + 1,
            TokenKind::RBrace => return Ok((Directive::Table(pairs), next + 1)),
            _ => return Err(syntax_error(token, "',' or '}'")),
        }
    }
}

fn parse_key(tokens: &[Token], pos: usize) -> Result<(Key, usize)> {
    let token = token_at(tokens, pos);
    let TokenKind::Word(word) = &token.kind else {
        return Err(syntax_error(token, "a key"));
    };

    if word.bytes().all(|b| b.is_ascii_digit()) {
        match word.parse::<i64>() {
            Ok(index) if index >= 1 => Ok((Key::Index(index), pos + 1)),
            _ => Err(syntax_error(token, "a positive integer key")),
        }
    } else {
        Ok((Key::Named(word.clone()), pos + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syntax(err: Error) -> (usize, String, String) {
        match err {
            Error::SchemaSyntax {
                position,
                found,
                expected,
            } => (position, found, expected),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_scalars() {
        let schema = Schema::parse("i; s ;b;f;l;u").unwrap();
        assert_eq!(
            schema.leaves(),
            vec![Tag::Int, Tag::String, Tag::Bool, Tag::Float, Tag::Callable, Tag::Opaque]
        );
        assert_eq!(schema.len(), 6);
    }

    #[test]
    fn test_parse_nested_table() {
        let schema = Schema::parse("{color: {1: f, 2: f, 3: f}, emission: f}").unwrap();
        let Directive::Table(pairs) = &schema.directives()[0] else {
            panic!("expected table");
        };
        assert_eq!(pairs[0].0, Key::Named("color".into()));
        assert_eq!(pairs[1].0, Key::Named("emission".into()));
        let Directive::Table(color) = &pairs[0].1 else {
            panic!("expected nested table");
        };
        assert_eq!(color[2].0, Key::Index(3));
        assert_eq!(schema.leaves().len(), 4);
        assert_eq!(schema.directives()[0].depth(), 3);
    }

    #[test]
    fn test_multiline_schema() {
        let schema = Schema::parse(
            "{
                output_file: s,
                settings: {iterations: i, max_depth: i}
            }",
        )
        .unwrap();
        assert_eq!(schema.leaves(), vec![Tag::String, Tag::Int, Tag::Int]);
    }

    #[test]
    fn test_canonical_display() {
        let schema = Schema::parse("{ a:i ,b : {1:f}} ;  s").unwrap();
        assert_eq!(schema.to_string(), "{a: i, b: {1: f}}; s");
        assert_eq!(Schema::parse(&schema.to_string()).unwrap(), schema);
    }

    #[test]
    fn test_missing_directive_after_colon() {
        let (position, found, _) = syntax(Schema::parse("{a: }").unwrap_err());
        assert_eq!(position, 4);
        assert_eq!(found, "'}'");
    }

    #[test]
    fn test_missing_colon() {
        let (position, found, expected) = syntax(Schema::parse("{a i}").unwrap_err());
        assert_eq!(position, 3);
        assert_eq!(found, "'i'");
        assert_eq!(expected, "':'");
    }

    #[test]
    fn test_unterminated_table() {
        let (position, found, _) = syntax(Schema::parse("{a: i, b: f").unwrap_err());
        assert_eq!(position, 11);
        assert_eq!(found, "end of schema");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Schema::parse("").is_err());
        assert!(Schema::parse("x").is_err());
        assert!(Schema::parse("ii").is_err());
        assert!(Schema::parse("i;").is_err());
        assert!(Schema::parse("{}").is_err());
        assert!(Schema::parse("{0: i}").is_err());
        assert!(Schema::parse("i # s").is_err());
        assert!(Schema::parse("i s").is_err());
    }

    #[test]
    fn test_duplicate_keys() {
        let (position, found, _) = syntax(Schema::parse("{a: i, a: f}").unwrap_err());
        assert_eq!(position, 7);
        assert_eq!(found, "'a'");
        // Same key at different levels is fine
        assert!(Schema::parse("{a: {a: i}}").is_ok());
    }

    #[test]
    fn test_recursion_limit() {
        let deep = format!("{}i{}", "{a: ".repeat(40), "}".repeat(40));
        assert!(matches!(
            Schema::parse(&deep),
            Err(Error::RecursionLimit { limit: DEFAULT_MAX_DEPTH })
        ));
        assert!(Schema::parse_with_limit("{a: {b: i}}", 3).is_ok());
        assert!(matches!(
            Schema::parse_with_limit("{a: {b: i}}", 2),
            Err(Error::RecursionLimit { limit: 2 })
        ));
    }

    #[test]
    fn test_key_that_looks_like_tag() {
        let schema = Schema::parse("{b: i, i: b}").unwrap();
        assert_eq!(schema.leaves(), vec![Tag::Int, Tag::Bool]);
        assert_eq!(schema.to_string(), "{b: i, i: b}");
    }
}
