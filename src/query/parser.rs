//! Recursive-descent filter parser
//!
//! expression := conjunction (OR conjunction)*
//! conjunction := term (AND term)*
//! term := NOT term | '(' expression ')' | ALL | condition
//! condition := operand (op | IN | LIKE | ILIKE) operand
//! operand := literal | field
//!
//! Keywords are case-insensitive. A bare identifier that is not a
//! keyword is a field reference; `{delimited}` references accept any
//! characters.

use crate::error::{Error, Result};

use super::ast::{CmpOp, Expr, Literal, Operand};
use super::lexer::{tokenize, SpannedToken, Token};

/// Parses a filter expression into an AST
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        end: input.len(),
    };
    let expr = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(Error::parse(token.pos, "unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    index: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.index)
    }

    fn next(&mut self) -> Option<SpannedToken> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn pos(&self) -> usize {
        self.peek().map_or(self.end, |t| t.pos)
    }

    /// Consumes a keyword (case-insensitive) if it is next
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if let Some(SpannedToken { token: Token::Ident(word), .. }) = self.peek() {
            if word.eq_ignore_ascii_case(keyword) {
                self.index += 1;
                return true;
            }
        }
        false
    }

    fn expression(&mut self) -> Result<Expr> {
        let mut left = self.conjunction()?;
        while self.eat_keyword("or") {
            let right = self.conjunction()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        while self.eat_keyword("and") {
            let right = self.term()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            let inner = self.term()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        if matches!(self.peek(), Some(SpannedToken { token: Token::LParen, .. })) {
            self.index += 1;
            let inner = self.expression()?;
            self.expect_rparen()?;
            return Ok(inner);
        }
        if self.eat_keyword("all") {
            return Ok(Expr::All);
        }
        self.condition()
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.next() {
            Some(SpannedToken { token: Token::RParen, .. }) => Ok(()),
            Some(token) => Err(Error::parse(token.pos, "expected ')'")),
            None => Err(Error::parse(self.end, "expected ')'")),
        }
    }

    fn condition(&mut self) -> Result<Expr> {
        let left = self.operand()?;
        let Some(token) = self.next() else {
            return Err(Error::parse(self.end, "expected a comparison operator"));
        };
        let op = match &token.token {
            Token::Eq => CmpOp::Eq,
            Token::Ne => CmpOp::Ne,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            Token::Ident(word) if word.eq_ignore_ascii_case("in") => {
                let right = self.operand()?;
                return Ok(Expr::In { needle: left, haystack: right });
            }
            Token::Ident(word) if word.eq_ignore_ascii_case("like") => CmpOp::Like,
            Token::Ident(word) if word.eq_ignore_ascii_case("ilike") => CmpOp::ILike,
            _ => return Err(Error::parse(token.pos, "expected a comparison operator")),
        };
        let right = self.operand()?;
        Ok(Expr::Compare { op, left, right })
    }

    fn operand(&mut self) -> Result<Operand> {
        let pos = self.pos();
        let Some(token) = self.next() else {
            return Err(Error::parse(self.end, "expected an operand"));
        };
        Ok(match token.token {
            Token::Field(name) => Operand::Field(name),
            Token::Ident(word) => {
                if word.eq_ignore_ascii_case("null") {
                    Operand::Literal(Literal::Null)
                } else if word.eq_ignore_ascii_case("true") {
                    Operand::Literal(Literal::Boolean(true))
                } else if word.eq_ignore_ascii_case("false") {
                    Operand::Literal(Literal::Boolean(false))
                } else if is_keyword(&word) {
                    return Err(Error::parse(
                        pos,
                        format!("keyword {word:?} cannot be used as a field name; use {{{word}}}"),
                    ));
                } else {
                    Operand::Field(word)
                }
            }
            Token::Str(s) => Operand::Literal(Literal::Str(s)),
            Token::Int(i) => Operand::Literal(Literal::Integer(i)),
            Token::Float(f) => Operand::Literal(Literal::Float(f)),
            Token::Date(d) => Operand::Literal(Literal::Date(d)),
            Token::Time(t) => Operand::Literal(Literal::Time(t)),
            Token::DateTime(d) => Operand::Literal(Literal::DateTime(d)),
            Token::LBracket => {
                self.index -= 1;
                Operand::Literal(self.list_literal()?)
            }
            _ => return Err(Error::parse(pos, "expected an operand")),
        })
    }

    fn list_literal(&mut self) -> Result<Literal> {
        // opening bracket already peeked
        self.index += 1;
        let mut items = Vec::new();
        if matches!(self.peek(), Some(SpannedToken { token: Token::RBracket, .. })) {
            self.index += 1;
            return Ok(Literal::List(items));
        }
        loop {
            let pos = self.pos();
            match self.operand()? {
                Operand::Literal(lit) => items.push(lit),
                Operand::Field(_) => {
                    return Err(Error::parse(pos, "field references are not allowed in lists"))
                }
            }
            match self.next() {
                Some(SpannedToken { token: Token::Comma, .. }) => continue,
                Some(SpannedToken { token: Token::RBracket, .. }) => break,
                Some(token) => return Err(Error::parse(token.pos, "expected ',' or ']'")),
                None => return Err(Error::parse(self.end, "unterminated list literal")),
            }
        }
        Ok(Literal::List(items))
    }
}

fn is_keyword(word: &str) -> bool {
    ["and", "or", "not", "in", "like", "ilike", "all", "true", "false", "null"]
        .iter()
        .any(|k| word.eq_ignore_ascii_case(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn field(name: &str) -> Operand {
        Operand::Field(name.into())
    }

    fn lit(l: Literal) -> Operand {
        Operand::Literal(l)
    }

    #[test]
    fn test_simple_comparison() {
        assert_eq!(
            parse("age > 40").unwrap(),
            Expr::Compare {
                op: CmpOp::Gt,
                left: field("age"),
                right: lit(Literal::Integer(40)),
            }
        );
    }

    #[test]
    fn test_precedence_or_of_ands() {
        // a == 1 and b == 2 or c == 3  parses as  (a and b) or c
        let parsed = parse("a == 1 and b == 2 or c == 3").unwrap();
        match parsed {
            Expr::Or(left, right) => {
                assert!(matches!(*left, Expr::And(_, _)));
                assert!(matches!(*right, Expr::Compare { .. }));
            }
            other => panic!("expected Or at top, got {other:?}"),
        }
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let parsed = parse("a == 1 and (b == 2 or c == 3)").unwrap();
        match parsed {
            Expr::And(_, right) => assert!(matches!(*right, Expr::Or(_, _))),
            other => panic!("expected And at top, got {other:?}"),
        }
    }

    #[test]
    fn test_negation() {
        let parsed = parse("not age == 3").unwrap();
        assert!(matches!(parsed, Expr::Not(_)));
        let parsed = parse("NOT (a == 1 OR b == 2)").unwrap();
        assert!(matches!(parsed, Expr::Not(inner) if matches!(*inner, Expr::Or(_, _))));
    }

    #[test]
    fn test_membership() {
        assert_eq!(
            parse("\"b\" in tags").unwrap(),
            Expr::In {
                needle: lit(Literal::Str("b".into())),
                haystack: field("tags"),
            }
        );
        assert_eq!(
            parse("status in [\"open\", \"closed\", null]").unwrap(),
            Expr::In {
                needle: field("status"),
                haystack: lit(Literal::List(vec![
                    Literal::Str("open".into()),
                    Literal::Str("closed".into()),
                    Literal::Null,
                ])),
            }
        );
    }

    #[test]
    fn test_delimited_field_names() {
        assert_eq!(
            parse("{weird field!} == true").unwrap(),
            Expr::Compare {
                op: CmpOp::Eq,
                left: field("weird field!"),
                right: lit(Literal::Boolean(true)),
            }
        );
    }

    #[test]
    fn test_all_keyword() {
        assert_eq!(parse("ALL").unwrap(), Expr::All);
        assert!(matches!(parse("all or age > 2").unwrap(), Expr::Or(_, _)));
    }

    #[test]
    fn test_temporal_literal_condition() {
        assert_eq!(
            parse("born < 2000-06-15").unwrap(),
            Expr::Compare {
                op: CmpOp::Lt,
                left: field("born"),
                right: lit(Literal::Date(NaiveDate::from_ymd_opt(2000, 6, 15).unwrap())),
            }
        );
    }

    #[test]
    fn test_like_operators() {
        assert!(matches!(
            parse("name LIKE \"Al%\"").unwrap(),
            Expr::Compare { op: CmpOp::Like, .. }
        ));
        assert!(matches!(
            parse("name ilike \"al%\"").unwrap(),
            Expr::Compare { op: CmpOp::ILike, .. }
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("age >").is_err());
        assert!(parse("age > 1 extra").is_err());
        assert!(parse("(age > 1").is_err());
        assert!(parse("in in in").is_err());
        assert!(parse("[1, 2] ==").is_err());
    }

    #[test]
    fn test_keyword_field_requires_delimiters() {
        assert!(parse("like == 1").is_err());
        assert!(parse("{like} == 1").is_ok());
    }
}
