//! The formatter interface and one modest concrete implementation. Rather
//! than a full pretty-printer driven by the AST, this walks the lexer's own
//! token vector and re-joins it with normalized whitespace around tag
//! delimiters.

use crate::diagnostics::Diagnostics;
use crate::lexer::{self, Token, TokenKind};

/// A formatter over template source. `format_source` below is the one
/// implementation shipped; the trait exists so alternative formatting
/// strategies (e.g. a future AST-driven pretty-printer) can be swapped in
/// without touching the CLI's `format` command.
pub trait Formatter {
    fn format(&self, source: &str) -> FormatOutcome;
}

/// The formatter's output: the best-effort reformatted text plus whatever
/// diagnostics turned up while re-lexing the input. Formatting is infallible
/// at the API boundary: malformed input still yields output.
#[derive(Debug, Clone)]
pub struct FormatOutcome {
    pub output: String,
    pub diagnostics: Diagnostics,
}

/// A modest whitespace-normalizing formatter: not a full pretty-printer.
#[derive(Debug, Default)]
pub struct WhitespaceFormatter;

impl Formatter for WhitespaceFormatter {
    fn format(&self, source: &str) -> FormatOutcome {
        let (tokens, diagnostics) = lexer::lex(source);
        FormatOutcome {
            output: render_tokens(&tokens),
            diagnostics,
        }
    }
}

/// Convenience wrapper used by the linter's `Formatting` rule and the CLI's
/// `format` command, for callers that only want the text.
pub fn format_source(source: &str) -> String {
    WhitespaceFormatter.format(source).output
}

/// Tokens before which a space is suppressed, regardless of what precedes
/// them.
fn tight_before(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Comma
            | TokenKind::Dot
            | TokenKind::Colon
            | TokenKind::LParen
            | TokenKind::RParen
            | TokenKind::LBracket
            | TokenKind::RBracket
    )
}

/// Tokens after which a space is suppressed before whatever follows.
fn tight_after(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::LParen | TokenKind::LBracket | TokenKind::Dot)
}

fn is_tag_opener(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::VariableStart | TokenKind::BlockStart)
}

fn is_tag_closer(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::VariableEnd | TokenKind::BlockEnd)
}

fn is_verbatim(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Text
            | TokenKind::RawStart
            | TokenKind::RawEnd
            | TokenKind::CommentStart
            | TokenKind::CommentEnd
            | TokenKind::Eof
    )
}

/// Re-emits `tokens`, inserting exactly one space around tag delimiters and
/// between inner expression/statement tokens, except where `tight_before`/
/// `tight_after` suppress it. Text, raw, and comment bodies pass through
/// verbatim — only the tag-interior token stream is normalized.
fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut last_inner_kind: Option<TokenKind> = None;

    for token in tokens {
        if is_verbatim(token.kind) {
            out.push_str(&token.lexeme);
            last_inner_kind = None;
            continue;
        }

        if is_tag_opener(token.kind) {
            let literal = match token.kind {
                TokenKind::VariableStart => "{{",
                _ => "{%",
            };
            out.push_str(literal);
            if token.trim.trim_before {
                out.push('-');
            }
            out.push(' ');
            last_inner_kind = None;
            continue;
        }

        if is_tag_closer(token.kind) {
            if !out.ends_with(' ') {
                out.push(' ');
            }
            if token.trim.trim_after {
                out.push('-');
            }
            out.push_str(match token.kind {
                TokenKind::VariableEnd => "}}",
                _ => "%}",
            });
            last_inner_kind = None;
            continue;
        }

        let needs_space = match last_inner_kind {
            None => false,
            Some(prev) => !tight_before(token.kind) && !tight_after(prev),
        };
        if needs_space {
            out.push(' ');
        }
        out.push_str(&token.lexeme);
        last_inner_kind = Some(token.kind);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_simple_variable_output() {
        assert_eq!(format_source("hello {{ name }}!"), "hello {{ name }}!");
    }

    #[test]
    fn normalizes_extra_inner_whitespace() {
        assert_eq!(format_source("{{   name   }}"), "{{ name }}");
    }

    #[test]
    fn tightens_call_and_attribute_syntax() {
        assert_eq!(format_source("{{ obj . method( 1 , 2 ) }}"), "{{ obj.method(1, 2) }}");
    }

    #[test]
    fn preserves_trim_markers() {
        assert_eq!(format_source("{%- if x -%}y{% endif %}"), "{%- if x -%}y{% endif %}");
    }

    #[test]
    fn passes_raw_and_comment_bodies_through_verbatim() {
        let src = "{% raw %}{{ not a var }}{% endraw %}{# a comment #}";
        assert_eq!(format_source(src), src);
    }

    #[test]
    fn is_idempotent() {
        let src = "{{   a|upper }}  {% for x in   items %}{{x}}{% endfor %}";
        let once = format_source(src);
        let twice = format_source(&once);
        assert_eq!(once, twice);
    }
}
