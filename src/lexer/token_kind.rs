use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TokenKind {
    Text,
    VariableStart,
    VariableEnd,
    BlockStart,
    BlockEnd,
    CommentStart,
    CommentEnd,
    RawStart,
    RawEnd,
    Identifier,
    IntegerLit,
    FloatLit,
    StringLit,
    BoolLit,
    NoneLit,

    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Pipe,
    Tilde,

    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Assign,

    And,
    Or,
    Not,
    In,
    Is,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl TokenKind {
    /// `true` for tokens that terminate an expression/tag body at the
    /// parser's synchronization points (§4.2 recovery).
    pub fn is_delimiter_close(self) -> bool {
        matches!(self, TokenKind::VariableEnd | TokenKind::BlockEnd | TokenKind::Eof)
    }
}
