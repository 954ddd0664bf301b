use serde::Serialize;

use super::token_kind::TokenKind;
use crate::diagnostics::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TrimFlags {
    /// `-` immediately after the opener (`{%-`, `{{-`): trim preceding text.
    pub trim_before: bool,
    /// `-` immediately before the closer (`-%}`, `-}}`): trim following text.
    pub trim_after: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
    #[serde(default, skip_serializing_if = "is_default_trim")]
    pub trim: TrimFlags,
}

fn is_default_trim(trim: &TrimFlags) -> bool {
    *trim == TrimFlags::default()
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, span: Span) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            span,
            trim: TrimFlags::default(),
        }
    }

    pub fn with_trim(mut self, trim: TrimFlags) -> Self {
        self.trim = trim;
        self
    }
}
