pub mod token;
pub mod token_kind;

pub use token::{Token, TrimFlags};
pub use token_kind::TokenKind;

use log::trace;

use crate::diagnostics::{Diagnostic, DiagnosticType, Diagnostics, Position, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Tag,
    Expression,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    offset: u32,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    diagnostics: Diagnostics,
}

pub fn lex(source: &str) -> (Vec<Token>, Diagnostics) {
    let mut lexer = Lexer::new(source);
    lexer.run();
    apply_trim(&mut lexer.tokens);
    (lexer.tokens, lexer.diagnostics)
}

impl Lexer {
    fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            offset: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    fn here(&self) -> Position {
        Position {
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, delta: usize) -> Option<char> {
        self.chars.get(self.pos + delta).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        let chars: Vec<char> = s.chars().collect();
        if self.pos + chars.len() > self.chars.len() {
            return false;
        }
        self.chars[self.pos..self.pos + chars.len()] == chars[..]
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        self.offset += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn push(&mut self, kind: TokenKind, lexeme: String, start: Position) {
        let span = Span::new(start, self.here());
        self.tokens.push(Token::new(kind, lexeme, span));
    }

    fn error(&mut self, kind: DiagnosticType, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::new(kind, message, span));
    }

    fn run(&mut self) {
        let mut mode = Mode::Text;
        loop {
            match mode {
                Mode::Text => {
                    if self.at_eof() {
                        break;
                    }
                    mode = self.lex_text();
                }
                Mode::Tag => {
                    mode = self.lex_tag_or_expr(true);
                }
                Mode::Expression => {
                    mode = self.lex_tag_or_expr(false);
                }
            }
        }
        self.push(TokenKind::Eof, String::new(), self.here());
    }

    fn lex_text(&mut self) -> Mode {
        let start = self.here();
        let mut text = String::new();
        loop {
            if self.at_eof() {
                break;
            }
            if self.starts_with("{{") || self.starts_with("{%") || self.starts_with("{#") {
                break;
            }
            text.push(self.advance().unwrap());
        }
        if !text.is_empty() {
            self.push(TokenKind::Text, text, start);
        }
        if self.at_eof() {
            return Mode::Text;
        }
        if self.starts_with("{%") {
            if self.is_raw_open() {
                self.lex_raw_section();
                return Mode::Text;
            }
            self.lex_opener("{%", TokenKind::BlockStart);
            Mode::Tag
        } else if self.starts_with("{{") {
            self.lex_opener("{{", TokenKind::VariableStart);
            Mode::Expression
        } else {
            self.lex_comment_section();
            Mode::Text
        }
    }

    fn lex_opener(&mut self, literal: &str, kind: TokenKind) {
        let start = self.here();
        for _ in 0..literal.chars().count() {
            self.advance();
        }
        let mut lexeme = literal.to_string();
        let mut trim = TrimFlags::default();
        if self.peek() == Some('-') {
            self.advance();
            lexeme.push('-');
            trim.trim_before = true;
        }
        let span = Span::new(start, self.here());
        self.tokens
            .push(Token::new(kind, lexeme, span).with_trim(trim));
        trace!("lexer: entered {kind:?} mode at {start}");
    }

    fn is_raw_open(&self) -> bool {
        let mut i = self.pos + 2;
        if self.chars.get(i) == Some(&'-') {
            i += 1;
        }
        while matches!(self.chars.get(i), Some(c) if c.is_whitespace()) {
            i += 1;
        }
        let word_start = i;
        while matches!(self.chars.get(i), Some(c) if c.is_alphanumeric() || *c == '_') {
            i += 1;
        }
        self.chars[word_start..i].iter().collect::<String>() == "raw"
    }

    fn lex_raw_section(&mut self) {
        let open_start = self.here();
        // Consume the opening `{% raw %}` tag as a single RawStart token.
        self.advance_n(2); // "{%"
        let mut lexeme = String::from("{%");
        if self.peek() == Some('-') {
            lexeme.push(self.advance().unwrap());
        }
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            lexeme.push(self.advance().unwrap());
        }
        for _ in 0.."raw".len() {
            lexeme.push(self.advance().unwrap());
        }
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            lexeme.push(self.advance().unwrap());
        }
        let trim_before = lexeme.starts_with("{%-");
        let mut trim_after = false;
        if self.peek() == Some('-') && self.peek_at(1) == Some('%') && self.peek_at(2) == Some('}')
        {
            lexeme.push(self.advance().unwrap());
            trim_after = true;
        }
        if self.starts_with("%}") {
            self.advance_n(2);
            lexeme.push_str("%}");
        } else {
            self.error(
                DiagnosticType::UnterminatedBlock,
                "unterminated `raw` tag",
                Span::new(open_start, self.here()),
            );
        }
        self.tokens.push(
            Token::new(TokenKind::RawStart, lexeme, Span::new(open_start, self.here())).with_trim(
                TrimFlags {
                    trim_before,
                    trim_after,
                },
            ),
        );

        let body_start = self.here();
        let mut body = String::new();
        loop {
            if self.at_eof() {
                self.error(
                    DiagnosticType::UnterminatedBlock,
                    "missing `{% endraw %}`",
                    Span::new(body_start, self.here()),
                );
                break;
            }
            if self.is_endraw_here() {
                break;
            }
            body.push(self.advance().unwrap());
        }
        if !body.is_empty() {
            self.push(TokenKind::Text, body, body_start);
        }
        if !self.at_eof() {
            let close_start = self.here();
            let mut close_lexeme = String::new();
            self.advance_n(2);
            close_lexeme.push_str("{%");
            if self.peek() == Some('-') {
                close_lexeme.push(self.advance().unwrap());
            }
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                close_lexeme.push(self.advance().unwrap());
            }
            for _ in 0.."endraw".len() {
                close_lexeme.push(self.advance().unwrap());
            }
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                close_lexeme.push(self.advance().unwrap());
            }
            if self.peek() == Some('-') && self.peek_at(1) == Some('%') {
                close_lexeme.push(self.advance().unwrap());
            }
            if self.starts_with("%}") {
                self.advance_n(2);
                close_lexeme.push_str("%}");
            }
            self.tokens.push(Token::new(
                TokenKind::RawEnd,
                close_lexeme,
                Span::new(close_start, self.here()),
            ));
        }
    }

    fn is_endraw_here(&self) -> bool {
        if !self.starts_with("{%") {
            return false;
        }
        let mut i = self.pos + 2;
        if self.chars.get(i) == Some(&'-') {
            i += 1;
        }
        while matches!(self.chars.get(i), Some(c) if c.is_whitespace()) {
            i += 1;
        }
        let word_start = i;
        while matches!(self.chars.get(i), Some(c) if c.is_alphanumeric() || *c == '_') {
            i += 1;
        }
        self.chars[word_start..i].iter().collect::<String>() == "endraw"
    }

    fn lex_comment_section(&mut self) {
        let start = self.here();
        let mut open = String::new();
        self.advance_n(2);
        open.push_str("{#");
        let trim_before = if self.peek() == Some('-') {
            open.push(self.advance().unwrap());
            true
        } else {
            false
        };
        self.tokens.push(
            Token::new(TokenKind::CommentStart, open, Span::new(start, self.here())).with_trim(
                TrimFlags {
                    trim_before,
                    trim_after: false,
                },
            ),
        );

        let body_start = self.here();
        let mut body = String::new();
        loop {
            if self.at_eof() {
                self.error(
                    DiagnosticType::UnterminatedComment,
                    "unterminated comment",
                    Span::new(body_start, self.here()),
                );
                break;
            }
            if self.peek() == Some('-') && self.peek_at(1) == Some('#') && self.peek_at(2) == Some('}') {
                break;
            }
            if self.starts_with("#}") {
                break;
            }
            body.push(self.advance().unwrap());
        }
        if !body.is_empty() {
            self.push(TokenKind::Text, body, body_start);
        }
        if !self.at_eof() {
            let close_start = self.here();
            let mut close = String::new();
            let trim_after = if self.peek() == Some('-') {
                close.push(self.advance().unwrap());
                true
            } else {
                false
            };
            if self.starts_with("#}") {
                self.advance_n(2);
                close.push_str("#}");
            }
            self.tokens.push(
                Token::new(TokenKind::CommentEnd, close, Span::new(close_start, self.here()))
                    .with_trim(TrimFlags {
                        trim_before: false,
                        trim_after,
                    }),
            );
        }
    }

    fn advance_n(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn lex_tag_or_expr(&mut self, in_tag: bool) -> Mode {
        self.skip_ascii_whitespace();
        if self.at_eof() {
            let kind = if in_tag {
                DiagnosticType::UnterminatedBlock
            } else {
                DiagnosticType::UnterminatedExpression
            };
            self.error(kind, "unexpected end of input", Span::point(self.here()));
            return Mode::Text;
        }

        // Closers.
        if in_tag && self.peek() == Some('-') && self.peek_at(1) == Some('%') && self.peek_at(2) == Some('}') {
            return self.lex_closer("-%}", TokenKind::BlockEnd, true);
        }
        if in_tag && self.starts_with("%}") {
            return self.lex_closer("%}", TokenKind::BlockEnd, false);
        }
        if !in_tag && self.peek() == Some('-') && self.peek_at(1) == Some('}') && self.peek_at(2) == Some('}') {
            return self.lex_closer("-}}", TokenKind::VariableEnd, true);
        }
        if !in_tag && self.starts_with("}}") {
            return self.lex_closer("}}", TokenKind::VariableEnd, false);
        }

        let start = self.here();
        let c = self.peek().unwrap();

        if c.is_alphabetic() || c == '_' {
            self.lex_identifier(start);
            return if in_tag { Mode::Tag } else { Mode::Expression };
        }
        if c.is_ascii_digit() {
            self.lex_number(start);
            return if in_tag { Mode::Tag } else { Mode::Expression };
        }
        if c == '"' || c == '\'' {
            self.lex_string(start, c);
            return if in_tag { Mode::Tag } else { Mode::Expression };
        }

        self.lex_operator(start, in_tag);
        if in_tag {
            Mode::Tag
        } else {
            Mode::Expression
        }
    }

    fn lex_closer(&mut self, literal: &str, kind: TokenKind, trim_after: bool) -> Mode {
        let start = self.here();
        self.advance_n(literal.chars().count());
        self.tokens.push(
            Token::new(kind, literal, Span::new(start, self.here())).with_trim(TrimFlags {
                trim_before: false,
                trim_after,
            }),
        );
        trace!("lexer: closed {kind:?} at {start}, returning to Text mode");
        Mode::Text
    }

    fn skip_ascii_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn lex_identifier(&mut self, start: Position) {
        let mut lexeme = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            lexeme.push(self.advance().unwrap());
        }
        let kind = match lexeme.as_str() {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            "is" => TokenKind::Is,
            "true" | "True" | "false" | "False" => TokenKind::BoolLit,
            "none" | "None" | "null" => TokenKind::NoneLit,
            _ => TokenKind::Identifier,
        };
        self.push(kind, lexeme, start);
    }

    fn lex_number(&mut self, start: Position) {
        let mut lexeme = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            lexeme.push(self.advance().unwrap());
        }
        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            lexeme.push(self.advance().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                lexeme.push(self.advance().unwrap());
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let save = (self.pos, self.offset, self.line, self.column);
            let mut exp = String::new();
            exp.push(self.advance().unwrap());
            if matches!(self.peek(), Some('+') | Some('-')) {
                exp.push(self.advance().unwrap());
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    exp.push(self.advance().unwrap());
                }
                lexeme.push_str(&exp);
                is_float = true;
            } else {
                (self.pos, self.offset, self.line, self.column) = save;
            }
        }
        let kind = if is_float {
            TokenKind::FloatLit
        } else {
            TokenKind::IntegerLit
        };
        self.push(kind, lexeme, start);
    }

    fn lex_string(&mut self, start: Position, quote: char) {
        let mut lexeme = String::new();
        lexeme.push(self.advance().unwrap()); // opening quote
        let mut terminated = false;
        loop {
            match self.peek() {
                None => break,
                Some('\n') => break,
                Some(c) if c == quote => {
                    lexeme.push(self.advance().unwrap());
                    terminated = true;
                    break;
                }
                Some('\\') => {
                    lexeme.push(self.advance().unwrap());
                    match self.peek() {
                        Some('x') => {
                            lexeme.push(self.advance().unwrap());
                            for _ in 0..2 {
                                if matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                                    lexeme.push(self.advance().unwrap());
                                }
                            }
                        }
                        Some('u') => {
                            lexeme.push(self.advance().unwrap());
                            for _ in 0..4 {
                                if matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                                    lexeme.push(self.advance().unwrap());
                                }
                            }
                        }
                        Some(_) => {
                            lexeme.push(self.advance().unwrap());
                        }
                        None => {}
                    }
                }
                Some(_) => {
                    lexeme.push(self.advance().unwrap());
                }
            }
        }
        let span = Span::new(start, self.here());
        if !terminated {
            self.error(
                DiagnosticType::UnterminatedString,
                "unterminated string literal",
                span,
            );
        }
        self.push(TokenKind::StringLit, lexeme, start);
        let _ = span;
    }

    fn lex_operator(&mut self, start: Position, in_tag: bool) {
        let two: Option<(&str, TokenKind)> = {
            let a = self.peek();
            let b = self.peek_at(1);
            match (a, b) {
                (Some('*'), Some('*')) => Some(("**", TokenKind::DoubleStar)),
                (Some('/'), Some('/')) => Some(("//", TokenKind::DoubleSlash)),
                (Some('='), Some('=')) => Some(("==", TokenKind::Eq)),
                (Some('!'), Some('=')) => Some(("!=", TokenKind::Ne)),
                (Some('<'), Some('=')) => Some(("<=", TokenKind::Le)),
                (Some('>'), Some('=')) => Some((">=", TokenKind::Ge)),
                _ => None,
            }
        };
        if let Some((lit, kind)) = two {
            self.advance_n(2);
            self.push(kind, lit, start);
            return;
        }
        let c = self.advance().unwrap();
        let kind = match c {
            '.' => Some(TokenKind::Dot),
            ',' => Some(TokenKind::Comma),
            ':' => Some(TokenKind::Colon),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            '|' => Some(TokenKind::Pipe),
            '~' => Some(TokenKind::Tilde),
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '%' => Some(TokenKind::Percent),
            '<' => Some(TokenKind::Lt),
            '>' => Some(TokenKind::Gt),
            '=' => Some(TokenKind::Assign),
            '!' => None,
            _ => None,
        };
        let span = Span::new(start, self.here());
        match kind {
            Some(kind) => self.push(kind, c.to_string(), start),
            None => {
                let _ = in_tag;
                self.error(
                    DiagnosticType::UnexpectedChar,
                    format!("unexpected character {c:?}"),
                    span,
                );
            }
        }
    }
}

fn apply_trim(tokens: &mut [Token]) {
    for i in 0..tokens.len() {
        let trim = tokens[i].trim;
        if trim.trim_before && i > 0 {
            if let Some(prev) = tokens.get_mut(i - 1) {
                if prev.kind == TokenKind::Text {
                    let trimmed = prev.lexeme.trim_end_matches([' ', '\t', '\r', '\n']);
                    let removed = prev.lexeme.len() - trimmed.len();
                    prev.lexeme = trimmed.to_string();
                    if removed > 0 {
                        prev.span.end.offset = prev.span.end.offset.saturating_sub(removed as u32);
                    }
                }
            }
        }
        if trim.trim_after {
            if let Some(next) = tokens.get_mut(i + 1) {
                if next.kind == TokenKind::Text {
                    let (new_text, removed) = trim_leading_through_newline(&next.lexeme);
                    next.lexeme = new_text;
                    if removed > 0 {
                        next.span.start.offset += removed as u32;
                    }
                }
            }
        }
    }
}

fn trim_leading_through_newline(s: &str) -> (String, usize) {
    let mut end = 0;
    let mut saw_newline = false;
    for (i, c) in s.char_indices() {
        if c == ' ' || c == '\t' || c == '\r' {
            end = i + c.len_utf8();
        } else if c == '\n' {
            end = i + c.len_utf8();
            saw_newline = true;
            break;
        } else {
            break;
        }
    }
    if saw_newline || end == s.len() {
        (s[end..].to_string(), end)
    } else {
        (s.to_string(), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn basic_text_and_variable() {
        let (tokens, diags) = lex("Hello, {{ name }}!");
        assert!(diags.is_empty());
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Text,
                TokenKind::VariableStart,
                TokenKind::Identifier,
                TokenKind::VariableEnd,
                TokenKind::Text,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_expression_reports_diagnostic() {
        let (_, diags) = lex("{{ x ");
        assert!(diags
            .iter()
            .any(|d| d.kind == DiagnosticType::UnterminatedExpression));
    }

    #[test]
    fn unterminated_string_recovers_at_eol() {
        let (tokens, diags) = lex("{{ \"abc\n }}");
        assert!(diags
            .iter()
            .any(|d| d.kind == DiagnosticType::UnterminatedString));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::StringLit));
    }

    #[test]
    fn trim_before_strips_preceding_whitespace() {
        let (tokens, _) = lex("  \n  {%- if x %}y{% endif %}");
        let text = &tokens[0];
        assert_eq!(text.kind, TokenKind::Text);
        assert_eq!(text.lexeme, "");
    }

    #[test]
    fn trim_after_strips_following_newline() {
        let (tokens, _) = lex("{% if x -%}\n  y{% endif %}");
        let text_after = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Text)
            .expect("text token");
        assert_eq!(text_after.lexeme, "  y");
    }

    #[test]
    fn raw_block_is_not_tokenized() {
        let ks = kinds("{% raw %}{{ not a var }}{% endraw %}");
        assert_eq!(
            ks,
            vec![
                TokenKind::RawStart,
                TokenKind::Text,
                TokenKind::RawEnd,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn comment_is_not_tokenized() {
        let ks = kinds("{# this { is not a tag #}");
        assert_eq!(
            ks,
            vec![
                TokenKind::CommentStart,
                TokenKind::Text,
                TokenKind::CommentEnd,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn operators_and_keywords() {
        let ks = kinds("{{ a is not none and b >= 1.5 }}");
        assert!(ks.contains(&TokenKind::Is));
        assert!(ks.contains(&TokenKind::Not));
        assert!(ks.contains(&TokenKind::NoneLit));
        assert!(ks.contains(&TokenKind::And));
        assert!(ks.contains(&TokenKind::Ge));
        assert!(ks.contains(&TokenKind::FloatLit));
    }

    #[test]
    fn always_reaches_eof() {
        for src in ["", "{{", "{%", "{#", "text only", "{{ 'unterminated"] {
            let (tokens, _) = lex(src);
            assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        }
    }
}
