use crate::frontend::token::Token;

#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for LexError {}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            line: self.line,
            col: self.col,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        // Leaves the terminating newline for the main loop.
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn read_string(&mut self) -> Result<Token, LexError> {
        let start_line = self.line;
        let start_col = self.col;
        self.advance(); // opening quote

        let mut string = String::new();
        loop {
            match self.current() {
                Some('\'') => {
                    self.advance();
                    return Ok(Token::Str(string));
                }
                Some('\n') | None => {
                    return Err(LexError {
                        message: "unterminated string literal".to_string(),
                        line: start_line,
                        col: start_col,
                    });
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let start_line = self.line;
        let start_col = self.col;

        // Digit-first alphanumeric run, so `0x1f` scans as one token.
        let mut digits = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16)
        } else {
            digits.parse::<u32>()
        };

        match parsed {
            Ok(value) => Ok(Token::Int(value)),
            Err(_) => Err(LexError {
                message: format!("invalid integer literal: {}", digits),
                line: start_line,
                col: start_col,
            }),
        }
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        Token::keyword(&ident).unwrap_or(Token::Ident(ident))
    }

    fn read_operator(&mut self) -> Result<Token, LexError> {
        let Some(ch) = self.current() else {
            return Err(self.error("unexpected end of input"));
        };

        // Two-character operators take priority (maximal munch).
        let two = match (ch, self.peek()) {
            ('<', Some('<')) => Some(Token::Shl),
            ('>', Some('>')) => Some(Token::Shr),
            ('&', Some('&')) => Some(Token::LAnd),
            ('|', Some('|')) => Some(Token::LOr),
            ('=', Some('=')) => Some(Token::Eql),
            ('!', Some('=')) => Some(Token::Neq),
            ('<', Some('=')) => Some(Token::Leq),
            ('>', Some('=')) => Some(Token::Geq),
            _ => None,
        };

        if let Some(tok) = two {
            self.advance();
            self.advance();
            return Ok(tok);
        }

        let tok = match ch {
            '+' => Token::Add,
            '-' => Token::Sub,
            '*' => Token::Mul,
            '/' => Token::Quo,
            '%' => Token::Rem,
            '&' => Token::And,
            '|' => Token::Or,
            '^' => Token::Xor,
            '<' => Token::Lss,
            '>' => Token::Gtr,
            '=' => Token::Assign,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            other => return Err(self.error(format!("unexpected character: {:?}", other))),
        };
        self.advance();
        Ok(tok)
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            let Some(ch) = self.current() else { break };

            if ch == '\n' {
                self.advance();
                tokens.push(Token::Newline);
            } else if ch == '/' && self.peek() == Some('/') {
                self.skip_comment();
            } else if ch == '\'' {
                tokens.push(self.read_string()?);
            } else if ch.is_ascii_digit() {
                tokens.push(self.read_number()?);
            } else if ch.is_ascii_alphabetic() || ch == '_' {
                tokens.push(self.read_identifier());
            } else {
                tokens.push(self.read_operator()?);
            }
        }

        // Statements are newline-terminated; guarantee one before EOF.
        if tokens.last() != Some(&Token::Newline) {
            tokens.push(Token::Newline);
        }
        tokens.push(Token::Eof);

        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::new(src).tokenize().unwrap()
    }

    #[test]
    fn test_keywords_and_idents() {
        let toks = lex("var x\n");
        assert_eq!(
            toks,
            vec![
                Token::Var,
                Token::Ident("x".to_string()),
                Token::Newline,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_maximal_munch_operators() {
        let toks = lex("a << 1 <= 2");
        assert!(toks.contains(&Token::Shl));
        assert!(toks.contains(&Token::Leq));
        assert!(!toks.contains(&Token::Lss));
    }

    #[test]
    fn test_assign_vs_eql() {
        let toks = lex("x = y == z");
        assert_eq!(toks.iter().filter(|t| **t == Token::Assign).count(), 1);
        assert_eq!(toks.iter().filter(|t| **t == Token::Eql).count(), 1);
    }

    #[test]
    fn test_hex_and_decimal_integers() {
        assert_eq!(lex("0x1f")[0], Token::Int(31));
        assert_eq!(lex("42")[0], Token::Int(42));
    }

    #[test]
    fn test_invalid_integer_is_fatal() {
        assert!(Lexer::new("12abc").tokenize().is_err());
    }

    #[test]
    fn test_single_quoted_string() {
        assert_eq!(lex("'hello'")[0], Token::Str("hello".to_string()));
    }

    #[test]
    fn test_unterminated_string_is_fatal() {
        assert!(Lexer::new("'oops\n").tokenize().is_err());
        assert!(Lexer::new("'oops").tokenize().is_err());
    }

    #[test]
    fn test_comment_runs_to_newline() {
        let toks = lex("var x // comment here\nvar y\n");
        assert!(toks.iter().all(|t| !matches!(t, Token::Ident(s) if s == "comment")));
        assert_eq!(toks.iter().filter(|t| **t == Token::Newline).count(), 2);
    }

    #[test]
    fn test_newline_guaranteed_before_eof() {
        let toks = lex("return x");
        let n = toks.len();
        assert_eq!(toks[n - 2], Token::Newline);
        assert_eq!(toks[n - 1], Token::Eof);
    }

    #[test]
    fn test_newlines_not_collapsed() {
        let toks = lex("\n\n\n");
        assert_eq!(toks.iter().filter(|t| **t == Token::Newline).count(), 3);
    }

    #[test]
    fn test_unknown_character_is_fatal() {
        assert!(Lexer::new("var x @ y").tokenize().is_err());
    }
}
