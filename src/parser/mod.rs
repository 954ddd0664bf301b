mod expr;
mod stmt;

use log::trace;

use crate::ast::{Node, Template};
use crate::diagnostics::{Diagnostic, DiagnosticType, Diagnostics, Position, Span};
use crate::lexer::{Token, TokenKind};

#[derive(Debug, Clone)]
pub(crate) struct BlockFrame {
    pub tag: String,
    pub start: Span,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Diagnostics,
    pub(crate) frames: Vec<BlockFrame>,
}

pub fn parse(tokens: Vec<Token>) -> (Template, Diagnostics) {
    let mut parser = Parser::new(tokens);
    let body = parser.parse_body(&[]);
    for frame in parser.frames.drain(..).collect::<Vec<_>>() {
        parser.diagnostics.push(Diagnostic::new(
            DiagnosticType::MissingEndTag,
            format!("missing end tag for `{{% {} %}}`", frame.tag),
            frame.start,
        ));
    }
    let span = template_span(&body);
    (Template { body, span }, parser.diagnostics)
}

fn template_span(body: &[Node]) -> Span {
    match (body.first(), body.last()) {
        (Some(first), Some(last)) => first.span.merge(last.span),
        _ => Span::point(Position::start()),
    }
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            diagnostics: Diagnostics::new(),
            frames: Vec::new(),
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn at_eof(&self) -> bool {
        self.current_kind() == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Token {
        if self.check(kind) {
            self.advance()
        } else {
            let tok = self.current().clone();
            self.diagnostics.push(Diagnostic::new(
                DiagnosticType::ExpectedToken,
                format!("expected {kind}, found {}", tok.kind),
                tok.span,
            ));
            tok
        }
    }

    fn error(&mut self, kind: DiagnosticType, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::new(kind, message, span));
    }

    fn synchronize(&mut self) {
        while !self.current_kind().is_delimiter_close() {
            self.advance();
        }
        if !self.at_eof() {
            self.advance();
        }
    }

    fn push_frame(&mut self, tag: impl Into<String>, start: Span) {
        let tag = tag.into();
        trace!("parser: entering block frame `{tag}` at {start}");
        self.frames.push(BlockFrame { tag, start });
    }

    fn pop_frame_expecting(&mut self, tag: &str, span: Span) {
        if let Some(pos) = self.frames.iter().rposition(|f| f.tag == tag) {
            let popped = self.frames.split_off(pos);
            for skipped in &popped[1..] {
                self.error(
                    DiagnosticType::MissingEndTag,
                    format!("missing end tag for `{{% {} %}}`", skipped.tag),
                    skipped.start,
                );
            }
            trace!("parser: closing block frame `{tag}`");
        } else {
            self.error(
                DiagnosticType::UnexpectedEndTag,
                format!("unexpected `end{tag}`: no matching `{tag}` tag is open"),
                span,
            );
        }
    }
}
