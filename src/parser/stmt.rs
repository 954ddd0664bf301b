
use super::Parser;
use crate::ast::{CallArgs, Expr, ExprKind, MacroParam, Node, NodeKind};
use crate::diagnostics::{DiagnosticType, Span};
use crate::lexer::TokenKind;

const END_KEYWORDS: &[&str] = &[
    "endif", "elif", "else", "endfor", "endset", "endmacro", "endcall", "endfilter", "endwith",
    "endblock", "endraw", "endautoescape",
];

impl Parser {
    /// Parses statements/output/text until EOF or a tag whose identifier is
    /// in `terminators` is encountered (left unconsumed for the caller).
    pub(crate) fn parse_body(&mut self, terminators: &[&str]) -> Vec<Node> {
        let mut nodes = Vec::new();
        loop {
            match self.current_kind() {
                TokenKind::Eof => break,
                TokenKind::Text => {
                    let tok = self.advance();
                    nodes.push(Node::new(NodeKind::Text(tok.lexeme), tok.span));
                }
                TokenKind::CommentStart => {
                    nodes.push(self.parse_comment());
                }
                TokenKind::RawStart => {
                    nodes.push(self.parse_raw());
                }
                TokenKind::VariableStart => {
                    nodes.push(self.parse_output());
                }
                TokenKind::BlockStart => {
                    if let Some(name) = self.peek_tag_name() {
                        if terminators.contains(&name.as_str()) {
                            break;
                        }
                    }
                    nodes.push(self.parse_tag());
                }
                _ => {
                    // Stray token outside any delimiter context; skip defensively.
                    self.advance();
                }
            }
        }
        nodes
    }

    fn peek_tag_name(&self) -> Option<String> {
        self.tokens
            .get(self.pos + 1)
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.lexeme.clone())
    }

    fn parse_comment(&mut self) -> Node {
        let start = self.advance().span; // CommentStart
        let text = if self.check(TokenKind::Text) {
            self.advance().lexeme
        } else {
            String::new()
        };
        let end = if self.check(TokenKind::CommentEnd) {
            self.advance().span
        } else {
            start
        };
        Node::new(NodeKind::Comment(text), start.merge(end))
    }

    fn parse_raw(&mut self) -> Node {
        let start = self.advance().span; // RawStart
        let text = if self.check(TokenKind::Text) {
            self.advance().lexeme
        } else {
            String::new()
        };
        let end = if self.check(TokenKind::RawEnd) {
            self.advance().span
        } else {
            start
        };
        Node::new(NodeKind::Raw(text), start.merge(end))
    }

    fn parse_output(&mut self) -> Node {
        let start = self.advance().span; // VariableStart
        let expr = self.parse_expr();
        let end = self.expect(TokenKind::VariableEnd).span;
        Node::new(NodeKind::Output(Box::new(expr)), start.merge(end))
    }

    /// Consumes `{%`, reads the tag name, and dispatches.
    fn parse_tag(&mut self) -> Node {
        let open = self.advance().span; // BlockStart
        let (name, name_span) = self.read_tag_name();
        let node = match name.as_str() {
            "if" => self.parse_if(open),
            "for" => self.parse_for(open),
            "set" => self.parse_set(open),
            "macro" => self.parse_macro(open),
            "call" => self.parse_call_block(open),
            "filter" => self.parse_filter_block(open),
            "with" => self.parse_with(open),
            "block" => self.parse_block(open),
            "extends" => self.parse_extends(open),
            "include" => self.parse_include(open),
            "import" => self.parse_import(open),
            "from" => self.parse_from_import(open),
            "do" => self.parse_do(open),
            "autoescape" => self.parse_autoescape(open),
            _ if END_KEYWORDS.contains(&name.as_str()) => {
                let tag = name.trim_start_matches("end");
                self.pop_frame_expecting(tag, name_span);
                self.skip_to_block_end();
                Node::new(NodeKind::Text(String::new()), open.merge(name_span))
            }
            "" => {
                self.skip_to_block_end();
                Node::new(NodeKind::Text(String::new()), open)
            }
            _ => {
                self.error(
                    DiagnosticType::UnknownTag,
                    format!("unknown tag `{name}`"),
                    name_span,
                );
                self.skip_to_block_end();
                Node::new(NodeKind::Text(String::new()), open.merge(name_span))
            }
        };
        node
    }

    fn read_tag_name(&mut self) -> (String, Span) {
        if self.check(TokenKind::Identifier) {
            let tok = self.advance();
            (tok.lexeme, tok.span)
        } else {
            let span = self.current().span;
            (String::new(), span)
        }
    }

    fn skip_to_block_end(&mut self) {
        while !self.check(TokenKind::BlockEnd) && !self.at_eof() {
            self.advance();
        }
        if self.check(TokenKind::BlockEnd) {
            self.advance();
        }
    }

    fn parse_if(&mut self, open: Span) -> Node {
        self.push_frame("if", open);
        let mut branches = Vec::new();
        let cond = self.parse_expr();
        self.expect(TokenKind::BlockEnd);
        let body = self.parse_body(&["elif", "else", "endif"]);
        branches.push((cond, body));

        loop {
            if self.tag_is("elif") {
                self.advance(); // BlockStart
                self.advance(); // 'elif'
                let cond = self.parse_expr();
                self.expect(TokenKind::BlockEnd);
                let body = self.parse_body(&["elif", "else", "endif"]);
                branches.push((cond, body));
                continue;
            }
            break;
        }

        let else_body = if self.tag_is("else") {
            self.advance();
            self.advance();
            self.expect(TokenKind::BlockEnd);
            self.parse_body(&["endif"])
        } else {
            Vec::new()
        };

        let end = self.close_end_tag("if", "endif");
        Node::new(NodeKind::If { branches, else_body }, open.merge(end))
    }

    fn tag_is(&self, name: &str) -> bool {
        self.check(TokenKind::BlockStart) && self.peek_tag_name().as_deref() == Some(name)
    }

    /// Consumes `{% endX %}`, popping the matching frame, and returns its span.
    fn close_end_tag(&mut self, tag: &'static str, end_name: &str) -> Span {
        if self.tag_is(end_name) {
            let start = self.advance().span;
            self.advance();
            let end = self.expect(TokenKind::BlockEnd).span;
            self.pop_frame_expecting(tag, start.merge(end));
            end
        } else {
            let span = self.current().span;
            self.error(
                DiagnosticType::MissingEndTag,
                format!("missing `{{% end{tag} %}}`"),
                span,
            );
            self.pop_frame_expecting(tag, span);
            span
        }
    }

    fn parse_for(&mut self, open: Span) -> Node {
        self.push_frame("for", open);
        let mut target = vec![self.read_tag_name_identifier()];
        while self.matches(TokenKind::Comma) {
            target.push(self.read_tag_name_identifier());
        }
        self.expect_keyword_in();
        let iter = self.parse_expr();
        let filter = if self.tag_keyword_is_if() {
            self.advance();
            Some(Box::new(self.parse_expr()))
        } else {
            None
        };
        let recursive = if self.check(TokenKind::Identifier) && self.current().lexeme == "recursive" {
            self.advance();
            true
        } else {
            false
        };
        self.expect(TokenKind::BlockEnd);
        let body = self.parse_body(&["else", "endfor"]);
        let else_body = if self.tag_is("else") {
            self.advance();
            self.advance();
            self.expect(TokenKind::BlockEnd);
            self.parse_body(&["endfor"])
        } else {
            Vec::new()
        };
        let end = self.close_end_tag("for", "endfor");
        Node::new(
            NodeKind::For {
                target,
                iter: Box::new(iter),
                body,
                else_body,
                filter,
                recursive,
            },
            open.merge(end),
        )
    }

    fn tag_keyword_is_if(&self) -> bool {
        self.check(TokenKind::Identifier) && self.current().lexeme == "if"
    }

    fn read_tag_name_identifier(&mut self) -> String {
        if self.check(TokenKind::Identifier) {
            self.advance().lexeme
        } else {
            let span = self.current().span;
            self.error(DiagnosticType::ExpectedToken, "expected an identifier", span);
            String::new()
        }
    }

    fn expect_keyword_in(&mut self) {
        if self.check(TokenKind::In) {
            self.advance();
        } else {
            let span = self.current().span;
            self.error(DiagnosticType::ExpectedToken, "expected `in`", span);
        }
    }

    fn parse_set(&mut self, open: Span) -> Node {
        let mut target = vec![self.read_tag_name_identifier()];
        while self.matches(TokenKind::Comma) {
            target.push(self.read_tag_name_identifier());
        }
        if self.check(TokenKind::Assign) {
            self.advance();
            let value = self.parse_expr();
            let end = self.expect(TokenKind::BlockEnd).span;
            return Node::new(NodeKind::Set { target, value: Box::new(value) }, open.merge(end));
        }
        // `{% set x %}...{% endset %}` (optionally `| filter`).
        self.push_frame("set", open);
        let filter = if self.matches(TokenKind::Pipe) {
            let (name, name_span) = self.read_identifier_for_filter();
            let args = self.parse_optional_filter_args();
            Some(Box::new(Expr::new(
                ExprKind::Filter {
                    name,
                    expr: Box::new(Expr::new(ExprKind::Name("__setblock__".into()), name_span)),
                    args,
                },
                name_span,
            )))
        } else {
            None
        };
        self.expect(TokenKind::BlockEnd);
        let body = self.parse_body(&["endset"]);
        let end = self.close_end_tag("set", "endset");
        Node::new(
            NodeKind::SetBlock {
                target: target.into_iter().next().unwrap_or_default(),
                body,
                filter,
            },
            open.merge(end),
        )
    }

    fn read_identifier_for_filter(&mut self) -> (String, Span) {
        if self.check(TokenKind::Identifier) {
            let tok = self.advance();
            (tok.lexeme, tok.span)
        } else {
            let span = self.current().span;
            (String::new(), span)
        }
    }

    fn parse_optional_filter_args(&mut self) -> CallArgs {
        if self.check(TokenKind::LParen) {
            self.parse_paren_args()
        } else {
            CallArgs::empty()
        }
    }

    fn parse_paren_args(&mut self) -> CallArgs {
        self.expect(TokenKind::LParen);
        let mut positional = Vec::new();
        let mut kwargs = Vec::new();
        while !self.check(TokenKind::RParen) && !self.at_eof() {
            if self.check(TokenKind::Identifier) && self.peek_is(1, TokenKind::Assign) {
                let name = self.advance().lexeme;
                self.advance();
                kwargs.push((name, self.parse_expr()));
            } else {
                positional.push(self.parse_expr());
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen);
        CallArgs { positional, kwargs }
    }

    fn peek_is(&self, delta: usize, kind: TokenKind) -> bool {
        self.tokens
            .get(self.pos + delta)
            .map(|t| t.kind == kind)
            .unwrap_or(false)
    }

    fn parse_macro_params(&mut self) -> Vec<MacroParam> {
        self.expect(TokenKind::LParen);
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) && !self.at_eof() {
            let tok = self.current().clone();
            let name = self.read_tag_name_identifier();
            let default = if self.matches(TokenKind::Assign) {
                Some(self.parse_expr())
            } else {
                None
            };
            params.push(MacroParam {
                name,
                default,
                span: tok.span,
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen);
        params
    }

    fn parse_macro(&mut self, open: Span) -> Node {
        self.push_frame("macro", open);
        let name = self.read_tag_name_identifier();
        let params = self.parse_macro_params();
        self.expect(TokenKind::BlockEnd);
        let body = self.parse_body(&["endmacro"]);
        let end = self.close_end_tag("macro", "endmacro");
        Node::new(NodeKind::Macro { name, params, body }, open.merge(end))
    }

    fn parse_call_block(&mut self, open: Span) -> Node {
        self.push_frame("call", open);
        let call_params = if self.check(TokenKind::LParen) {
            self.parse_macro_params()
        } else {
            Vec::new()
        };
        let call = self.parse_expr();
        self.expect(TokenKind::BlockEnd);
        let body = self.parse_body(&["endcall"]);
        let end = self.close_end_tag("call", "endcall");
        Node::new(
            NodeKind::CallBlock {
                call: Box::new(call),
                call_params,
                body,
            },
            open.merge(end),
        )
    }

    fn parse_filter_block(&mut self, open: Span) -> Node {
        self.push_frame("filter", open);
        let (name, name_span) = self.read_identifier_for_filter();
        let args = self.parse_optional_filter_args();
        let filter = Expr::new(
            ExprKind::Filter {
                name,
                expr: Box::new(Expr::new(ExprKind::Name("__filterblock__".into()), name_span)),
                args,
            },
            name_span,
        );
        self.expect(TokenKind::BlockEnd);
        let body = self.parse_body(&["endfilter"]);
        let end = self.close_end_tag("filter", "endfilter");
        Node::new(
            NodeKind::FilterBlock {
                filter: Box::new(filter),
                body,
            },
            open.merge(end),
        )
    }

    fn parse_with(&mut self, open: Span) -> Node {
        self.push_frame("with", open);
        let mut assignments = Vec::new();
        while self.check(TokenKind::Identifier) {
            let name = self.advance().lexeme;
            self.expect(TokenKind::Assign);
            let value = self.parse_expr();
            assignments.push((name, value));
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::BlockEnd);
        let body = self.parse_body(&["endwith"]);
        let end = self.close_end_tag("with", "endwith");
        Node::new(NodeKind::With { assignments, body }, open.merge(end))
    }

    fn parse_block(&mut self, open: Span) -> Node {
        self.push_frame("block", open);
        let name = self.read_tag_name_identifier();
        let mut scoped = false;
        let mut required = false;
        loop {
            if self.check(TokenKind::Identifier) && self.current().lexeme == "scoped" {
                self.advance();
                scoped = true;
                continue;
            }
            if self.check(TokenKind::Identifier) && self.current().lexeme == "required" {
                self.advance();
                required = true;
                continue;
            }
            break;
        }
        self.expect(TokenKind::BlockEnd);
        let body = self.parse_body(&["endblock"]);
        let end = if self.tag_is("endblock") {
            self.advance();
            self.advance();
            // Optional repeated block name after `endblock`.
            if self.check(TokenKind::Identifier) {
                self.advance();
            }
            let end = self.expect(TokenKind::BlockEnd).span;
            self.pop_frame_expecting("block", open.merge(end));
            end
        } else {
            self.close_end_tag("block", "endblock")
        };
        Node::new(
            NodeKind::Block {
                name,
                body,
                scoped,
                required,
            },
            open.merge(end),
        )
    }

    fn parse_extends(&mut self, open: Span) -> Node {
        let expr = self.parse_expr();
        let end = self.expect(TokenKind::BlockEnd).span;
        Node::new(NodeKind::Extends { expr: Box::new(expr) }, open.merge(end))
    }

    fn parse_include(&mut self, open: Span) -> Node {
        let expr = self.parse_expr();
        let mut ignore_missing = false;
        let mut with_context = true;
        loop {
            if self.check(TokenKind::Identifier) && self.current().lexeme == "ignore" {
                self.advance();
                if self.check(TokenKind::Identifier) && self.current().lexeme == "missing" {
                    self.advance();
                }
                ignore_missing = true;
                continue;
            }
            if self.matches(TokenKind::Not) {
                if self.check(TokenKind::Identifier) && self.current().lexeme == "with" {
                    self.advance();
                    if self.check(TokenKind::Identifier) && self.current().lexeme == "context" {
                        self.advance();
                    }
                    with_context = false;
                }
                continue;
            }
            if self.check(TokenKind::Identifier) && self.current().lexeme == "with" {
                self.advance();
                if self.check(TokenKind::Identifier) && self.current().lexeme == "context" {
                    self.advance();
                }
                with_context = true;
                continue;
            }
            break;
        }
        let end = self.expect(TokenKind::BlockEnd).span;
        Node::new(
            NodeKind::Include {
                expr: Box::new(expr),
                ignore_missing,
                with_context,
            },
            open.merge(end),
        )
    }

    fn parse_import(&mut self, open: Span) -> Node {
        let expr = self.parse_expr();
        if self.check(TokenKind::Identifier) && self.current().lexeme == "as" {
            self.advance();
        }
        let name = self.read_tag_name_identifier();
        let with_context = self.parse_trailing_context_clause();
        let end = self.expect(TokenKind::BlockEnd).span;
        Node::new(
            NodeKind::Import {
                expr: Box::new(expr),
                name,
                with_context,
            },
            open.merge(end),
        )
    }

    fn parse_from_import(&mut self, open: Span) -> Node {
        let expr = self.parse_expr();
        if self.check(TokenKind::Identifier) && self.current().lexeme == "import" {
            self.advance();
        }
        let mut names = Vec::new();
        loop {
            if !self.check(TokenKind::Identifier) {
                break;
            }
            let name = self.advance().lexeme;
            let alias = if self.check(TokenKind::Identifier) && self.current().lexeme == "as" {
                self.advance();
                Some(self.read_tag_name_identifier())
            } else {
                None
            };
            names.push((name, alias));
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        let with_context = self.parse_trailing_context_clause();
        let end = self.expect(TokenKind::BlockEnd).span;
        Node::new(
            NodeKind::FromImport {
                expr: Box::new(expr),
                names,
                with_context,
            },
            open.merge(end),
        )
    }

    fn parse_trailing_context_clause(&mut self) -> bool {
        if self.matches(TokenKind::Not) {
            if self.check(TokenKind::Identifier) && self.current().lexeme == "with" {
                self.advance();
                if self.check(TokenKind::Identifier) && self.current().lexeme == "context" {
                    self.advance();
                }
            }
            return false;
        }
        if self.check(TokenKind::Identifier) && self.current().lexeme == "with" {
            self.advance();
            if self.check(TokenKind::Identifier) && self.current().lexeme == "context" {
                self.advance();
            }
            return true;
        }
        false
    }

    fn parse_do(&mut self, open: Span) -> Node {
        let expr = self.parse_expr();
        let end = self.expect(TokenKind::BlockEnd).span;
        Node::new(NodeKind::Do { expr: Box::new(expr) }, open.merge(end))
    }

    fn parse_autoescape(&mut self, open: Span) -> Node {
        self.push_frame("autoescape", open);
        let enabled_expr = self.parse_expr();
        let enabled = matches!(
            enabled_expr.kind,
            ExprKind::Literal(crate::ast::Literal::Bool(true))
        );
        self.expect(TokenKind::BlockEnd);
        let body = self.parse_body(&["endautoescape"]);
        let end = self.close_end_tag("autoescape", "endautoescape");
        Node::new(NodeKind::AutoEscape { enabled, body }, open.merge(end))
    }
}
