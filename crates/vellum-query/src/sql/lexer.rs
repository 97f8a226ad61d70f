/// SQL lexer (tokenizer) using nom.
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::value,
    IResult,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    In,
    Range,
    Order,
    By,
    Asc,
    Desc,
    Limit,
    Offset,
    Count,
    Distinct,
    Null,
    True,
    False,

    // Literals
    Integer(i64),
    Float(f64),
    StringLit(String),

    // Identifiers. Single-quoted strings double as quoted identifiers in
    // field position, preserving case for dotted field access.
    Ident(String),

    // Symbols
    LParen,
    RParen,
    Comma,
    Star,
    Semicolon,
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    Minus,
}

/// Tokenize a SQL string.
pub fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut remaining = input.trim();

    while !remaining.is_empty() {
        match multispace0::<&str, nom::error::Error<&str>>(remaining) {
            Ok((rest, _)) => remaining = rest,
            Err(_) => break,
        }

        if remaining.is_empty() {
            break;
        }

        match lex_token(remaining) {
            Ok((rest, token)) => {
                tokens.push(token);
                remaining = rest;
            }
            Err(_) => {
                return Err(format!(
                    "unexpected character at: '{}'",
                    &remaining[..remaining.len().min(20)]
                ));
            }
        }
    }

    Ok(tokens)
}

fn lex_token(input: &str) -> IResult<&str, Token> {
    alt((
        lex_symbol,
        lex_string_literal,
        lex_number,
        lex_keyword_or_ident,
    ))(input)
}

fn lex_symbol(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Le, tag("<=")),
        value(Token::Ge, tag(">=")),
        value(Token::LParen, char('(')),
        value(Token::RParen, char(')')),
        value(Token::Comma, char(',')),
        value(Token::Star, char('*')),
        value(Token::Semicolon, char(';')),
        value(Token::Eq, char('=')),
        value(Token::Lt, char('<')),
        value(Token::Gt, char('>')),
        value(Token::Minus, char('-')),
    ))(input)
}

fn lex_string_literal(input: &str) -> IResult<&str, Token> {
    let (input, _) = char('\'')(input)?;
    let mut result = String::new();
    let mut chars = input.chars();
    let mut consumed = 0;

    loop {
        match chars.next() {
            Some('\'') => {
                consumed += 1;
                // Escaped quote ''
                if chars.clone().next() == Some('\'') {
                    chars.next();
                    consumed += 1;
                    result.push('\'');
                } else {
                    break;
                }
            }
            Some(c) => {
                consumed += c.len_utf8();
                result.push(c);
            }
            None => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Char,
                )));
            }
        }
    }

    Ok((&input[consumed..], Token::StringLit(result)))
}

fn lex_number(input: &str) -> IResult<&str, Token> {
    let mut int_end = 0usize;
    for c in input.chars() {
        if c.is_ascii_digit() {
            int_end += c.len_utf8();
        } else {
            break;
        }
    }

    if int_end > 0 && input[int_end..].starts_with('.') {
        let frac_start = int_end + 1;
        let mut frac_end = frac_start;
        for c in input[frac_start..].chars() {
            if c.is_ascii_digit() {
                frac_end += c.len_utf8();
            } else {
                break;
            }
        }
        if frac_end > frac_start {
            let float_text = &input[..frac_end];
            let num: f64 = float_text.parse().map_err(|_| {
                nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))
            })?;
            return Ok((&input[frac_end..], Token::Float(num)));
        }
    }

    let (input, digits) = digit1(input)?;

    let num: i64 = digits.parse().map_err(|_| {
        nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
    })?;

    Ok((input, Token::Integer(num)))
}

fn lex_keyword_or_ident(input: &str) -> IResult<&str, Token> {
    let (remaining, word) =
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.')(input)?;
    let upper = word.to_uppercase();

    let token = match upper.as_str() {
        "SELECT" => Token::Select,
        "FROM" => Token::From,
        "WHERE" => Token::Where,
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "IN" => Token::In,
        "RANGE" => Token::Range,
        "ORDER" => Token::Order,
        "BY" => Token::By,
        "ASC" => Token::Asc,
        "DESC" => Token::Desc,
        "LIMIT" => Token::Limit,
        "OFFSET" => Token::Offset,
        "COUNT" => Token::Count,
        "DISTINCT" => Token::Distinct,
        "NULL" => Token::Null,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        _ => Token::Ident(word.to_string()),
    };

    Ok((remaining, token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        let tokens = tokenize("select * FROM items Where year = 2002").unwrap();
        assert_eq!(tokens[0], Token::Select);
        assert_eq!(tokens[1], Token::Star);
        assert_eq!(tokens[2], Token::From);
        assert_eq!(tokens[3], Token::Ident("items".into()));
        assert_eq!(tokens[4], Token::Where);
        assert_eq!(tokens[5], Token::Ident("year".into()));
        assert_eq!(tokens[6], Token::Eq);
        assert_eq!(tokens[7], Token::Integer(2002));
    }

    #[test]
    fn string_literal_with_escaped_quote() {
        let tokens = tokenize("'it''s'").unwrap();
        assert_eq!(tokens, vec![Token::StringLit("it's".into())]);
    }

    #[test]
    fn dotted_identifier_lexes_as_one_token() {
        let tokens = tokenize("actor.name").unwrap();
        assert_eq!(tokens, vec![Token::Ident("actor.name".into())]);
    }

    #[test]
    fn floats_and_negatives() {
        let tokens = tokenize("-3.5").unwrap();
        assert_eq!(tokens, vec![Token::Minus, Token::Float(3.5)]);
    }
}
