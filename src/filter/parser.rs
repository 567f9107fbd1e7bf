//! Recursive-descent parser for the filter grammar.
//!
//! ```text
//! filter   := "(" body ")"
//! body     := "&" filter+ | "|" filter+ | "!" filter | item
//! item     := key "=" ( "*" | value )
//! key      := [A-Za-z0-9_.:/-]+
//! value    := ( escaped | non-paren-char )*   -- trailing whitespace trimmed
//! escaped  := "\" ( "\" | "*" | "(" | ")" )
//! ```
//!
//! Whitespace is tolerated between structural tokens. Failures carry the
//! byte position of the offending input; no partial AST is ever returned.

use crate::error::{CoreError, Result};
use crate::filter::ast::FilterAst;

/// Parse a complete filter string into an AST.
pub fn parse_filter(input: &str) -> Result<FilterAst> {
    let mut parser = Parser::new(input);
    parser.skip_whitespace();
    let ast = parser.parse_filter()?;
    parser.skip_whitespace();
    if !parser.is_eof() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(ast)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn parse_filter(&mut self) -> Result<FilterAst> {
        self.expect(b'(')?;
        self.skip_whitespace();

        let node = match self.peek() {
            Some(b'&') => {
                self.advance();
                FilterAst::And(self.parse_clauses("'&'")?)
            }
            Some(b'|') => {
                self.advance();
                FilterAst::Or(self.parse_clauses("'|'")?)
            }
            Some(b'!') => {
                self.advance();
                self.skip_whitespace();
                FilterAst::Not(Box::new(self.parse_filter()?))
            }
            _ => self.parse_item()?,
        };

        self.skip_whitespace();
        self.expect(b')')?;
        Ok(node)
    }

    /// One or more nested filters, for AND / OR bodies.
    fn parse_clauses(&mut self, operator: &str) -> Result<Vec<FilterAst>> {
        let mut clauses = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(b'(') {
                clauses.push(self.parse_filter()?);
            } else {
                break;
            }
        }
        if clauses.is_empty() {
            return Err(self.error(&format!("{operator} requires at least one clause")));
        }
        Ok(clauses)
    }

    fn parse_item(&mut self) -> Result<FilterAst> {
        let key_start = self.pos;
        while self.peek().is_some_and(is_key_byte) {
            self.advance();
        }
        if self.pos == key_start {
            return Err(self.error("expected a key"));
        }
        // Key bytes are ASCII by construction.
        let key = String::from_utf8_lossy(&self.input[key_start..self.pos]).into_owned();

        self.expect(b'=')?;

        // `(key=*)` is presence: a single unescaped '*' directly before the
        // closing paren. Anything longer is an ordinary value.
        if self.peek() == Some(b'*') {
            let mut lookahead = self.pos + 1;
            while self.input.get(lookahead).is_some_and(|b| b.is_ascii_whitespace()) {
                lookahead += 1;
            }
            if self.input.get(lookahead) == Some(&b')') {
                self.advance();
                return Ok(FilterAst::Present { key });
            }
        }

        let value_pos = self.pos;
        let value = self.parse_value()?;
        Ok(FilterAst::Eq { key, value, value_pos })
    }

    fn parse_value(&mut self) -> Result<String> {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated filter")),
                Some(b')') => break,
                Some(b'(') => return Err(self.error("unescaped '(' in value")),
                Some(b'\\') => {
                    let escape_pos = self.pos;
                    self.advance();
                    match self.peek() {
                        Some(b @ (b'\\' | b'*' | b'(' | b')')) => {
                            buf.push(b);
                            self.advance();
                        }
                        Some(_) => {
                            return Err(self.error_at(escape_pos, "unknown escape sequence"));
                        }
                        None => return Err(self.error("unterminated escape")),
                    }
                }
                Some(b) => {
                    buf.push(b);
                    self.advance();
                }
            }
        }

        // Escapes can only produce '\\', '*', '(' or ')', so every trailing
        // whitespace byte in the buffer came from literal input.
        while buf.last().is_some_and(|b| b.is_ascii_whitespace()) {
            buf.pop();
        }

        String::from_utf8(buf).map_err(|_| self.error("value is not valid utf-8"))
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.advance();
        }
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        if self.peek() == Some(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected as char)))
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn error(&self, msg: &str) -> CoreError {
        self.error_at(self.pos, msg)
    }

    fn error_at(&self, pos: usize, msg: &str) -> CoreError {
        CoreError::InvalidFilter { pos, msg: msg.to_string() }
    }
}

fn is_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b':' | b'/' | b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(key: &str, value: &str, value_pos: usize) -> FilterAst {
        FilterAst::Eq {
            key: key.to_string(),
            value: value.to_string(),
            value_pos,
        }
    }

    fn parse_err(input: &str) -> (usize, String) {
        match parse_filter(input) {
            Err(CoreError::InvalidFilter { pos, msg }) => (pos, msg),
            other => panic!("expected InvalidFilter, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_equality() {
        assert_eq!(parse_filter("(type=skill)").unwrap(), eq("type", "skill", 6));
    }

    #[test]
    fn test_presence() {
        assert_eq!(
            parse_filter("(endpoint=*)").unwrap(),
            FilterAst::Present { key: "endpoint".into() }
        );
    }

    #[test]
    fn test_presence_with_trailing_whitespace() {
        assert_eq!(
            parse_filter("(endpoint=* )").unwrap(),
            FilterAst::Present { key: "endpoint".into() }
        );
    }

    #[test]
    fn test_escaped_star_is_equality() {
        assert_eq!(parse_filter(r"(name=\*)").unwrap(), eq("name", "*", 6));
    }

    #[test]
    fn test_and_with_children() {
        let ast = parse_filter("(&(type=skill)(capability=summarize))").unwrap();
        match ast {
            FilterAst::And(children) => {
                assert_eq!(children.len(), 2);
                assert_eq!(children[0], eq("type", "skill", 8));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_or_and_not_nest() {
        let ast = parse_filter("(|(tag=nlp)(!(status=deprecated)))").unwrap();
        match ast {
            FilterAst::Or(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], FilterAst::Not(_)));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn test_whitespace_between_structural_tokens() {
        let ast = parse_filter("( & (a=1) (b=2) )").unwrap();
        assert!(matches!(ast, FilterAst::And(ref c) if c.len() == 2));
    }

    #[test]
    fn test_value_trailing_whitespace_trimmed() {
        assert_eq!(parse_filter("(name=alpha beta  )").unwrap(), eq("name", "alpha beta", 6));
    }

    #[test]
    fn test_empty_value_allowed() {
        assert_eq!(parse_filter("(version=)").unwrap(), eq("version", "", 9));
    }

    #[test]
    fn test_escapes_unwrap() {
        assert_eq!(
            parse_filter(r"(name=a\(b\)c\\d)").unwrap(),
            eq("name", r"a(b)c\d", 6)
        );
    }

    #[test]
    fn test_key_charset() {
        assert_eq!(
            parse_filter("(attrs.proto/http:2-rc_1=yes)").unwrap(),
            eq("attrs.proto/http:2-rc_1", "yes", 25)
        );
    }

    #[test]
    fn test_unescaped_paren_in_value_rejected() {
        let (pos, _) = parse_err("(name=a(b)");
        assert_eq!(pos, 7);
    }

    #[test]
    fn test_unknown_escape_rejected() {
        let (pos, msg) = parse_err(r"(name=a\nb)");
        assert_eq!(pos, 7);
        assert!(msg.contains("escape"));
    }

    #[test]
    fn test_empty_and_rejected() {
        let (_, msg) = parse_err("(&)");
        assert!(msg.contains("at least one clause"));
    }

    #[test]
    fn test_trailing_input_rejected() {
        let (pos, msg) = parse_err("(a=b))");
        assert_eq!(pos, 5);
        assert!(msg.contains("trailing"));
    }

    #[test]
    fn test_missing_open_rejected() {
        let (pos, _) = parse_err("a=b");
        assert_eq!(pos, 0);
    }

    #[test]
    fn test_unterminated_rejected() {
        let (pos, _) = parse_err("(a=b");
        assert_eq!(pos, 4);
    }

    #[test]
    fn test_rev_value_pos_points_at_value() {
        // Parsing succeeds; the evaluator validates integer shape later
        // using this recorded position.
        assert_eq!(parse_filter("(rev=abc)").unwrap(), eq("rev", "abc", 5));
    }

    #[test]
    fn test_not_requires_nested_filter() {
        let (_, msg) = parse_err("(!a=b)");
        assert!(msg.contains("expected '('"));
    }
}
