//! Lexer for the trigger expression language
//!
//! Converts expression source text into a token stream. Every token carries
//! its byte offset so parse errors can point at the offending position.

use crate::ExpressionError;

/// Token kinds recognized by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    True,
    False,
    None,

    And,
    Or,
    Not,
    In,

    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    Percent,

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
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
}

/// A token with its byte offset in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub pos: usize,
}

fn keyword(ident: &str) -> Option<Tok> {
    match ident {
        "and" => Some(Tok::And),
        "or" => Some(Tok::Or),
        "not" => Some(Tok::Not),
        "in" => Some(Tok::In),
        "True" => Some(Tok::True),
        "False" => Some(Tok::False),
        "None" => Some(Tok::None),
        _ => Option::None,
    }
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    i: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            i: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.i).map(|&(_, c)| c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.i + offset).map(|&(_, c)| c)
    }

    fn pos(&self) -> usize {
        self.chars
            .get(self.i)
            .map(|&(p, _)| p)
            .unwrap_or(self.src.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.i += 1;
        }
        c
    }

    fn lex_number(&mut self) -> Result<Token, ExpressionError> {
        let start = self.pos();
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = &self.src[start..self.pos()];
        let tok = if is_float {
            Tok::Float(text.parse().map_err(|_| {
                ExpressionError::syntax(start, format!("invalid number literal '{}'", text))
            })?)
        } else {
            Tok::Int(text.parse().map_err(|_| {
                ExpressionError::syntax(start, format!("invalid number literal '{}'", text))
            })?)
        };
        Ok(Token { tok, pos: start })
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, ExpressionError> {
        let start = self.pos();
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\\') => {
                    let escape_pos = self.pos();
                    match self.bump() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('\\') => value.push('\\'),
                        Some('\'') => value.push('\''),
                        Some('"') => value.push('"'),
                        Some(other) => {
                            return Err(ExpressionError::syntax(
                                escape_pos,
                                format!("unknown escape '\\{}'", other),
                            ));
                        }
                        None => {
                            return Err(ExpressionError::syntax(escape_pos, "dangling escape"));
                        }
                    }
                }
                Some(c) if c == quote => break,
                Some(c) => value.push(c),
                None => {
                    return Err(ExpressionError::syntax(start, "unterminated string literal"));
                }
            }
        }
        Ok(Token {
            tok: Tok::Str(value),
            pos: start,
        })
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos();
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        let ident = &self.src[start..self.pos()];
        Token {
            tok: keyword(ident).unwrap_or_else(|| Tok::Ident(ident.to_string())),
            pos: start,
        }
    }

    /// Emit `two` when the next character matches `second`, else `one`.
    fn lex_maybe_double(&mut self, second: char, two: Tok, one: Tok) -> Token {
        let pos = self.pos();
        self.bump();
        if self.peek() == Some(second) {
            self.bump();
            Token { tok: two, pos }
        } else {
            Token { tok: one, pos }
        }
    }

    fn lex_single(&mut self, tok: Tok) -> Token {
        let pos = self.pos();
        self.bump();
        Token { tok, pos }
    }
}

/// Tokenize expression source text
pub fn tokenize(src: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();

    while let Some(c) = lexer.peek() {
        let token = match c {
            ' ' | '\t' | '\r' | '\n' => {
                lexer.bump();
                continue;
            }
            '0'..='9' => lexer.lex_number()?,
            '\'' | '"' => lexer.lex_string(c)?,
            'a'..='z' | 'A'..='Z' | '_' => lexer.lex_ident(),
            '+' => lexer.lex_single(Tok::Plus),
            '-' => lexer.lex_single(Tok::Minus),
            '*' => lexer.lex_maybe_double('*', Tok::DoubleStar, Tok::Star),
            '/' => lexer.lex_single(Tok::Slash),
            '%' => lexer.lex_single(Tok::Percent),
            '<' => lexer.lex_maybe_double('=', Tok::Le, Tok::Lt),
            '>' => lexer.lex_maybe_double('=', Tok::Ge, Tok::Gt),
            '=' => {
                let pos = lexer.pos();
                if lexer.peek_at(1) == Some('=') {
                    lexer.bump();
                    lexer.bump();
                    Token { tok: Tok::Eq, pos }
                } else {
                    return Err(ExpressionError::syntax(
                        pos,
                        "assignment is not supported; did you mean '=='?",
                    ));
                }
            }
            '!' => {
                let pos = lexer.pos();
                if lexer.peek_at(1) == Some('=') {
                    lexer.bump();
                    lexer.bump();
                    Token { tok: Tok::Ne, pos }
                } else {
                    return Err(ExpressionError::syntax(pos, "unexpected character '!'"));
                }
            }
            '(' => lexer.lex_single(Tok::LParen),
            ')' => lexer.lex_single(Tok::RParen),
            '[' => lexer.lex_single(Tok::LBracket),
            ']' => lexer.lex_single(Tok::RBracket),
            '{' => lexer.lex_single(Tok::LBrace),
            '}' => lexer.lex_single(Tok::RBrace),
            ',' => lexer.lex_single(Tok::Comma),
            ':' => lexer.lex_single(Tok::Colon),
            '.' => lexer.lex_single(Tok::Dot),
            other => {
                return Err(ExpressionError::syntax(
                    lexer.pos(),
                    format!("unexpected character '{}'", other),
                ));
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 23 4.5"),
            vec![Tok::Int(1), Tok::Int(23), Tok::Float(4.5)]
        );
    }

    #[test]
    fn test_dot_after_int_is_member_access() {
        // only "digit.digit" forms a float
        assert_eq!(
            kinds("1.x"),
            vec![Tok::Int(1), Tok::Dot, Tok::Ident("x".to_string())]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#"'a' "b\n" 'it\'s'"#),
            vec![
                Tok::Str("a".to_string()),
                Tok::Str("b\n".to_string()),
                Tok::Str("it's".to_string())
            ]
        );
    }

    #[test]
    fn test_unicode_in_strings() {
        assert_eq!(kinds("'héllo'"), vec![Tok::Str("héllo".to_string())]);
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("event_count and True"),
            vec![Tok::Ident("event_count".to_string()), Tok::And, Tok::True]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("== != <= >= < > ** *"),
            vec![
                Tok::Eq,
                Tok::Ne,
                Tok::Le,
                Tok::Ge,
                Tok::Lt,
                Tok::Gt,
                Tok::DoubleStar,
                Tok::Star
            ]
        );
    }

    #[test]
    fn test_token_positions() {
        let tokens = tokenize("a == 10").unwrap();
        assert_eq!(tokens[0].pos, 0);
        assert_eq!(tokens[1].pos, 2);
        assert_eq!(tokens[2].pos, 5);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("'oops").unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { position: 0, .. }));
    }

    #[test]
    fn test_bare_equals_rejected() {
        assert!(tokenize("a = 1").is_err());
    }
}
