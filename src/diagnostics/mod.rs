//! Structured diagnostics threaded through every pipeline stage.

use serde::Serialize;
use std::fmt;

/// A 0-based byte offset plus 1-based line/column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub offset: u32,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn start() -> Self {
        Position {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A source range; `end` is exclusive. Invariant: `start.offset <= end.offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        debug_assert!(start.offset <= end.offset);
        Span { start, end }
    }

    /// A zero-width span at `pos`, used for synthetic/recovered nodes.
    pub fn point(pos: Position) -> Self {
        Span {
            start: pos,
            end: pos,
        }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        let start = if self.start.offset <= other.start.offset {
            self.start
        } else {
            other.start
        };
        let end = if self.end.offset >= other.end.offset {
            self.end
        } else {
            other.end
        };
        Span { start, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

/// The closed set of diagnostic kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticType {
    UnterminatedExpression,
    UnterminatedBlock,
    UnterminatedString,
    UnterminatedComment,
    UnexpectedChar,
    UnexpectedToken,
    ExpectedToken,
    ExpectedExpression,
    MissingEndTag,
    UnknownTag,
    UnexpectedEndTag,
    UnknownVariable,
    UnknownFilter,
    UnknownTest,
    UnknownFunction,
    UnknownTagRenderer,
    InvalidOperand,
    NotIterable,
    UnsupportedNode,
    TemplateNotFound,
    UnknownMacro,
    TemplateCycle,
    HtmlUnexpectedEndTag,
    HtmlMismatchedEndTag,
    HtmlUnclosedTag,
}

impl DiagnosticType {
    /// The stage name used in the stable dotted id (`"Lexer/UnterminatedString"`).
    fn stage(self) -> &'static str {
        use DiagnosticType::*;
        match self {
            UnterminatedExpression
            | UnterminatedBlock
            | UnterminatedString
            | UnterminatedComment
            | UnexpectedChar => "Lexer",
            UnexpectedToken | ExpectedToken | ExpectedExpression | MissingEndTag | UnknownTag
            | UnexpectedEndTag => "Parser",
            UnknownVariable
            | UnknownFilter
            | UnknownTest
            | UnknownFunction
            | UnknownTagRenderer
            | InvalidOperand
            | NotIterable
            | UnsupportedNode
            | TemplateNotFound
            | UnknownMacro
            | TemplateCycle => "Renderer",
            HtmlUnexpectedEndTag | HtmlMismatchedEndTag | HtmlUnclosedTag => "Html",
        }
    }

    fn name(self) -> &'static str {
        use DiagnosticType::*;
        match self {
            UnterminatedExpression => "UnterminatedExpression",
            UnterminatedBlock => "UnterminatedBlock",
            UnterminatedString => "UnterminatedString",
            UnterminatedComment => "UnterminatedComment",
            UnexpectedChar => "UnexpectedChar",
            UnexpectedToken => "UnexpectedToken",
            ExpectedToken => "ExpectedToken",
            ExpectedExpression => "ExpectedExpression",
            MissingEndTag => "MissingEndTag",
            UnknownTag => "UnknownTag",
            UnexpectedEndTag => "UnexpectedEndTag",
            UnknownVariable => "UnknownVariable",
            UnknownFilter => "UnknownFilter",
            UnknownTest => "UnknownTest",
            UnknownFunction => "UnknownFunction",
            UnknownTagRenderer => "UnknownTagRenderer",
            InvalidOperand => "InvalidOperand",
            NotIterable => "NotIterable",
            UnsupportedNode => "UnsupportedNode",
            TemplateNotFound => "TemplateNotFound",
            UnknownMacro => "UnknownMacro",
            TemplateCycle => "TemplateCycle",
            HtmlUnexpectedEndTag => "HtmlUnexpectedEndTag",
            HtmlMismatchedEndTag => "HtmlMismatchedEndTag",
            HtmlUnclosedTag => "HtmlUnclosedTag",
        }
    }

    /// The stable dotted id, e.g. `Lexer/UnterminatedString`.
    pub fn id(self) -> String {
        format!("{}/{}", self.stage(), self.name())
    }

    /// Default severity for diagnostics of this type when not overridden.
    pub fn default_severity(self) -> Severity {
        use DiagnosticType::*;
        match self {
            UnknownVariable => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    #[serde(skip)]
    pub kind: DiagnosticType,
    pub severity: Severity,
    pub id: String,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticType, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            kind,
            severity: kind.default_severity(),
            id: kind.id(),
            message: message.into(),
            span,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} {}",
            self.severity, self.span.start, self.id, self.message
        )
    }
}

/// An accumulator that every stage threads through instead of raising.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics(Vec::new())
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_stable_dotted_string() {
        assert_eq!(
            DiagnosticType::UnterminatedString.id(),
            "Lexer/UnterminatedString"
        );
        assert_eq!(DiagnosticType::UnknownFilter.id(), "Renderer/UnknownFilter");
    }

    #[test]
    fn span_merge_takes_outer_bounds() {
        let a = Span::new(
            Position {
                offset: 2,
                line: 1,
                column: 3,
            },
            Position {
                offset: 5,
                line: 1,
                column: 6,
            },
        );
        let b = Span::new(
            Position {
                offset: 4,
                line: 1,
                column: 5,
            },
            Position {
                offset: 9,
                line: 1,
                column: 10,
            },
        );
        let merged = a.merge(b);
        assert_eq!(merged.start.offset, 2);
        assert_eq!(merged.end.offset, 9);
    }
}
