#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Ident(String),
    Int(u32),
    Str(String),

    // Arithmetic / bitwise
    Add,  // +
    Sub,  // -
    Mul,  // *
    Quo,  // /
    Rem,  // %
    And,  // &
    Or,   // |
    Xor,  // ^
    Shl,  // <<
    Shr,  // >>
    LAnd, // &&
    LOr,  // ||

    // Comparison
    Eql, // ==
    Lss, // <
    Gtr, // >
    Neq, // !=
    Leq, // <=
    Geq, // >=

    Assign, // =

    // Delimiters
    LParen,
    RParen,
    Comma,

    // Keywords
    Var,
    Func,
    If,
    Else,
    While,
    Break,
    Continue,
    Return,
    End,

    // Special
    Newline,
    Eof,
}

impl Token {
    /// Keyword lookup for a scanned identifier.
    pub fn keyword(ident: &str) -> Option<Token> {
        match ident {
            "var" => Some(Token::Var),
            "func" => Some(Token::Func),
            "if" => Some(Token::If),
            "else" => Some(Token::Else),
            "while" => Some(Token::While),
            "break" => Some(Token::Break),
            "continue" => Some(Token::Continue),
            "return" => Some(Token::Return),
            "end" => Some(Token::End),
            _ => None,
        }
    }

    /// True for tokens that act as binary operators in an expression chain.
    pub fn is_binary_op(&self) -> bool {
        matches!(
            self,
            Token::Add
                | Token::Sub
                | Token::Mul
                | Token::Quo
                | Token::Rem
                | Token::And
                | Token::Or
                | Token::Xor
                | Token::Shl
                | Token::Shr
                | Token::LAnd
                | Token::LOr
                | Token::Eql
                | Token::Lss
                | Token::Gtr
                | Token::Neq
                | Token::Leq
                | Token::Geq
        )
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{}", s),
            Token::Int(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Add => write!(f, "+"),
            Token::Sub => write!(f, "-"),
            Token::Mul => write!(f, "*"),
            Token::Quo => write!(f, "/"),
            Token::Rem => write!(f, "%"),
            Token::And => write!(f, "&"),
            Token::Or => write!(f, "|"),
            Token::Xor => write!(f, "^"),
            Token::Shl => write!(f, "<<"),
            Token::Shr => write!(f, ">>"),
            Token::LAnd => write!(f, "&&"),
            Token::LOr => write!(f, "||"),
            Token::Eql => write!(f, "=="),
            Token::Lss => write!(f, "<"),
            Token::Gtr => write!(f, ">"),
            Token::Neq => write!(f, "!="),
            Token::Leq => write!(f, "<="),
            Token::Geq => write!(f, ">="),
            Token::Assign => write!(f, "="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Var => write!(f, "var"),
            Token::Func => write!(f, "func"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::While => write!(f, "while"),
            Token::Break => write!(f, "break"),
            Token::Continue => write!(f, "continue"),
            Token::Return => write!(f, "return"),
            Token::End => write!(f, "end"),
            Token::Newline => write!(f, "\\n"),
            Token::Eof => write!(f, "EOF"),
        }
    }
}
