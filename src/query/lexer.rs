//! Filter expression tokenizer
//!
//! Hand-rolled scanner producing position-tagged tokens. Temporal
//! literals are recognized lexically (`2024-01-31`, `12:30:00`,
//! `2024-01-31T12:30:00`), matching the textual forms the codec
//! writes, so the parser never has to guess a string's meaning.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare identifier: a field reference or a keyword
    Ident(String),
    /// `{delimited}` field reference
    Field(String),
    Str(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    /// Byte offset in the filter text
    pub pos: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '(' => {
                tokens.push(SpannedToken { token: Token::LParen, pos });
                i += 1;
            }
            ')' => {
                tokens.push(SpannedToken { token: Token::RParen, pos });
                i += 1;
            }
            '[' => {
                tokens.push(SpannedToken { token: Token::LBracket, pos });
                i += 1;
            }
            ']' => {
                tokens.push(SpannedToken { token: Token::RBracket, pos });
                i += 1;
            }
            ',' => {
                tokens.push(SpannedToken { token: Token::Comma, pos });
                i += 1;
            }
            '=' => {
                if matches!(chars.get(i + 1), Some((_, '='))) {
                    tokens.push(SpannedToken { token: Token::Eq, pos });
                    i += 2;
                } else {
                    return Err(Error::parse(pos, "expected '=='"));
                }
            }
            '!' => {
                if matches!(chars.get(i + 1), Some((_, '='))) {
                    tokens.push(SpannedToken { token: Token::Ne, pos });
                    i += 2;
                } else {
                    return Err(Error::parse(pos, "expected '!='"));
                }
            }
            '<' => {
                if matches!(chars.get(i + 1), Some((_, '='))) {
                    tokens.push(SpannedToken { token: Token::Le, pos });
                    i += 2;
                } else {
                    tokens.push(SpannedToken { token: Token::Lt, pos });
                    i += 1;
                }
            }
            '>' => {
                if matches!(chars.get(i + 1), Some((_, '='))) {
                    tokens.push(SpannedToken { token: Token::Ge, pos });
                    i += 2;
                } else {
                    tokens.push(SpannedToken { token: Token::Gt, pos });
                    i += 1;
                }
            }
            '{' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].1 != '}' {
                    end += 1;
                }
                if end == chars.len() {
                    return Err(Error::parse(pos, "unterminated '{' field name"));
                }
                let name: String = chars[start..end].iter().map(|(_, c)| c).collect();
                tokens.push(SpannedToken { token: Token::Field(name), pos });
                i = end + 1;
            }
            '"' => {
                let (literal, next) = scan_string(&chars, i)?;
                tokens.push(SpannedToken { token: Token::Str(literal), pos });
                i = next;
            }
            '-' | '+' => {
                if !matches!(chars.get(i + 1), Some((_, d)) if d.is_ascii_digit()) {
                    return Err(Error::parse(pos, "expected a number after sign"));
                }
                let (token, next) = scan_signed_number(&chars, i)?;
                tokens.push(SpannedToken { token, pos });
                i = next;
            }
            c if c.is_ascii_digit() => {
                let (token, next) = scan_numeric(&chars, i)?;
                tokens.push(SpannedToken { token, pos });
                i = next;
            }
            c if c == '_' || c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && {
                    let c = chars[i].1;
                    c == '_' || c.is_alphanumeric()
                } {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().map(|(_, c)| c).collect();
                tokens.push(SpannedToken { token: Token::Ident(ident), pos });
            }
            other => {
                return Err(Error::parse(pos, format!("unexpected character {other:?}")));
            }
        }
    }
    Ok(tokens)
}

/// Scans a double-quoted string with backslash escapes
fn scan_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize)> {
    let open = chars[start].0;
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i].1 {
            '"' => return Ok((out, i + 1)),
            '\\' => {
                let Some(&(esc_pos, esc)) = chars.get(i + 1) else {
                    return Err(Error::parse(open, "unterminated string literal"));
                };
                out.push(match esc {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '"' => '"',
                    '\\' => '\\',
                    other => {
                        return Err(Error::parse(
                            esc_pos,
                            format!("unknown escape sequence '\\{other}'"),
                        ))
                    }
                });
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(Error::parse(open, "unterminated string literal"))
}

/// Scans a number with a leading sign (never a temporal literal)
fn scan_signed_number(chars: &[(usize, char)], start: usize) -> Result<(Token, usize)> {
    let mut i = start + 1;
    i = consume_digits(chars, i);
    let (lexeme, next) = number_tail(chars, start, i)?;
    parse_number(chars[start].0, &lexeme, next)
}

/// Scans a bare digit run, which may turn out to be a number, a date,
/// a time, or a datetime
fn scan_numeric(chars: &[(usize, char)], start: usize) -> Result<(Token, usize)> {
    let pos = chars[start].0;
    let mut i = consume_digits(chars, start);
    match chars.get(i).map(|&(_, c)| c) {
        Some('-') => {
            // date, optionally followed by 'T' time
            i = consume_digits(chars, expect_digit_after(chars, i, "date")?);
            match chars.get(i).map(|&(_, c)| c) {
                Some('-') => {
                    i = consume_digits(chars, expect_digit_after(chars, i, "date")?);
                }
                _ => return Err(Error::parse(pos, "malformed date literal")),
            }
            if matches!(chars.get(i), Some((_, 'T')))
                && matches!(chars.get(i + 1), Some((_, d)) if d.is_ascii_digit())
            {
                i = consume_time(chars, i + 1)?;
                let lexeme = collect(chars, start, i);
                let value = NaiveDateTime::parse_from_str(&lexeme, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(&lexeme, "%Y-%m-%dT%H:%M"))
                    .map_err(|_| Error::parse(pos, format!("invalid datetime {lexeme:?}")))?;
                return Ok((Token::DateTime(value), i));
            }
            let lexeme = collect(chars, start, i);
            let value = NaiveDate::parse_from_str(&lexeme, "%Y-%m-%d")
                .map_err(|_| Error::parse(pos, format!("invalid date {lexeme:?}")))?;
            Ok((Token::Date(value), i))
        }
        Some(':') => {
            let end = consume_time(chars, start)?;
            let lexeme = collect(chars, start, end);
            let value = NaiveTime::parse_from_str(&lexeme, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(&lexeme, "%H:%M"))
                .map_err(|_| Error::parse(pos, format!("invalid time {lexeme:?}")))?;
            Ok((Token::Time(value), end))
        }
        _ => {
            let (lexeme, next) = number_tail(chars, start, i)?;
            parse_number(pos, &lexeme, next)
        }
    }
}

/// Consumes `HH:MM[:SS[.frac]]` starting at the hour digits
fn consume_time(chars: &[(usize, char)], start: usize) -> Result<usize> {
    let mut i = consume_digits(chars, start);
    if !matches!(chars.get(i), Some((_, ':'))) {
        return Err(Error::parse(chars[start].0, "malformed time literal"));
    }
    i = consume_digits(chars, expect_digit_after(chars, i, "time")?);
    if matches!(chars.get(i), Some((_, ':'))) {
        i = consume_digits(chars, expect_digit_after(chars, i, "time")?);
        if matches!(chars.get(i), Some((_, '.')))
            && matches!(chars.get(i + 1), Some((_, d)) if d.is_ascii_digit())
        {
            i = consume_digits(chars, i + 1);
        }
    }
    Ok(i)
}

/// Consumes an optional fraction and exponent after an integer part;
/// `parse_number` tells floats from ints by the lexeme's content
fn number_tail(chars: &[(usize, char)], start: usize, mut i: usize) -> Result<(String, usize)> {
    if matches!(chars.get(i), Some((_, '.')))
        && matches!(chars.get(i + 1), Some((_, d)) if d.is_ascii_digit())
    {
        i = consume_digits(chars, i + 1);
    }
    if matches!(chars.get(i), Some((_, 'e' | 'E'))) {
        let mut j = i + 1;
        if matches!(chars.get(j), Some((_, '-' | '+'))) {
            j += 1;
        }
        if matches!(chars.get(j), Some((_, d)) if d.is_ascii_digit()) {
            i = consume_digits(chars, j);
        }
    }
    Ok((collect(chars, start, i), i))
}

fn parse_number(pos: usize, lexeme: &str, next: usize) -> Result<(Token, usize)> {
    if lexeme.contains(['.', 'e', 'E']) {
        let value: f64 = lexeme
            .parse()
            .map_err(|_| Error::parse(pos, format!("invalid number {lexeme:?}")))?;
        Ok((Token::Float(value), next))
    } else {
        let value: i64 = lexeme
            .parse()
            .map_err(|_| Error::parse(pos, format!("number out of range {lexeme:?}")))?;
        Ok((Token::Int(value), next))
    }
}

fn consume_digits(chars: &[(usize, char)], mut i: usize) -> usize {
    while matches!(chars.get(i), Some((_, d)) if d.is_ascii_digit()) {
        i += 1;
    }
    i
}

fn expect_digit_after(chars: &[(usize, char)], i: usize, what: &str) -> Result<usize> {
    if matches!(chars.get(i + 1), Some((_, d)) if d.is_ascii_digit()) {
        Ok(i + 1)
    } else {
        Err(Error::parse(
            chars[i].0,
            format!("malformed {what} literal"),
        ))
    }
}

fn collect(chars: &[(usize, char)], start: usize, end: usize) -> String {
    chars[start..end].iter().map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_operators_and_punctuation() {
        assert_eq!(
            kinds("== != < <= > >= ( ) [ ] ,"),
            vec![
                Token::Eq,
                Token::Ne,
                Token::Lt,
                Token::Le,
                Token::Gt,
                Token::Ge,
                Token::LParen,
                Token::RParen,
                Token::LBracket,
                Token::RBracket,
                Token::Comma,
            ]
        );
    }

    #[test]
    fn test_identifiers_and_delimited_fields() {
        assert_eq!(
            kinds("age {field with spaces} _x1"),
            vec![
                Token::Ident("age".into()),
                Token::Field("field with spaces".into()),
                Token::Ident("_x1".into()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 -7 3.5 1e3 -2.5E-2"),
            vec![
                Token::Int(42),
                Token::Int(-7),
                Token::Float(3.5),
                Token::Float(1000.0),
                Token::Float(-0.025),
            ]
        );
    }

    #[test]
    fn test_temporal_literals() {
        let tokens = kinds("2024-02-29 12:30:05.25 2024-02-29T12:30:05");
        assert_eq!(
            tokens[0],
            Token::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(
            tokens[1],
            Token::Time(NaiveTime::from_hms_milli_opt(12, 30, 5, 250).unwrap())
        );
        assert_eq!(
            tokens[2],
            Token::DateTime(
                NaiveDate::from_ymd_opt(2024, 2, 29)
                    .unwrap()
                    .and_hms_opt(12, 30, 5)
                    .unwrap()
            )
        );
    }

    #[test]
    fn test_short_time() {
        assert_eq!(
            kinds("12:30"),
            vec![Token::Time(NaiveTime::from_hms_opt(12, 30, 0).unwrap())]
        );
    }

    #[test]
    fn test_strings_with_escapes() {
        assert_eq!(
            kinds(r#""plain" "with \"quotes\"" "line\nbreak""#),
            vec![
                Token::Str("plain".into()),
                Token::Str("with \"quotes\"".into()),
                Token::Str("line\nbreak".into()),
            ]
        );
    }

    #[test]
    fn test_errors_carry_positions() {
        match tokenize("age = 3") {
            Err(crate::error::Error::ParseError { position, .. }) => assert_eq!(position, 4),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(tokenize("\"unterminated").is_err());
        assert!(tokenize("{unterminated").is_err());
        assert!(tokenize("2024-13-40").is_err());
    }
}
