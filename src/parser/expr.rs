
use super::Parser;
use crate::ast::{BinOp, CallArgs, Expr, ExprKind, Literal, UnaryOp};
use crate::diagnostics::{DiagnosticType, Span};
use crate::lexer::TokenKind;

impl Parser {
    /// Entry point: precedence level 1 (`or`), the loosest binding operator.
    pub(crate) fn parse_expr(&mut self) -> Expr {
        self.parse_ternary()
    }

    /// `a if cond else b` — Jinja's inline conditional, binds looser than `or`.
    fn parse_ternary(&mut self) -> Expr {
        let expr = self.parse_or();
        if self.check(TokenKind::Identifier) && self.current().lexeme == "if" {
            self.advance();
            let cond = self.parse_or();
            let else_expr = if self.check(TokenKind::Identifier) && self.current().lexeme == "else" {
                self.advance();
                self.parse_ternary()
            } else {
                Expr::new(ExprKind::Literal(Literal::None), cond.span)
            };
            let span = expr.span.merge(else_expr.span);
            return Expr::new(
                ExprKind::Ternary {
                    cond: Box::new(cond),
                    then_expr: Box::new(expr),
                    else_expr: Box::new(else_expr),
                },
                span,
            );
        }
        expr
    }

    fn parse_or(&mut self) -> Expr {
        let mut left = self.parse_and();
        while self.check(TokenKind::Or) {
            self.advance();
            let right = self.parse_and();
            let span = left.span.merge(right.span);
            left = Expr::new(ExprKind::Binary(BinOp::Or, Box::new(left), Box::new(right)), span);
        }
        left
    }

    fn parse_and(&mut self) -> Expr {
        let mut left = self.parse_not();
        while self.check(TokenKind::And) {
            self.advance();
            let right = self.parse_not();
            let span = left.span.merge(right.span);
            left = Expr::new(ExprKind::Binary(BinOp::And, Box::new(left), Box::new(right)), span);
        }
        left
    }

    fn parse_not(&mut self) -> Expr {
        if self.check(TokenKind::Not) {
            let start = self.current().span;
            self.advance();
            let operand = self.parse_not();
            let span = start.merge(operand.span);
            return Expr::new(ExprKind::Unary(UnaryOp::Not, Box::new(operand)), span);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Expr {
        let mut left = self.parse_filter();
        loop {
            let op = match self.current_kind() {
                TokenKind::Eq => Some(BinOp::Eq),
                TokenKind::Ne => Some(BinOp::Ne),
                TokenKind::Lt => Some(BinOp::Lt),
                TokenKind::Gt => Some(BinOp::Gt),
                TokenKind::Le => Some(BinOp::Le),
                TokenKind::Ge => Some(BinOp::Ge),
                _ => None,
            };
            if let Some(op) = op {
                self.advance();
                let right = self.parse_filter();
                let span = left.span.merge(right.span);
                left = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), span);
                continue;
            }
            if self.check(TokenKind::In) {
                self.advance();
                let right = self.parse_filter();
                let span = left.span.merge(right.span);
                left = Expr::new(ExprKind::Binary(BinOp::In, Box::new(left), Box::new(right)), span);
                continue;
            }
            if self.check(TokenKind::Not) && self.peek_next_is(TokenKind::In) {
                self.advance();
                self.advance();
                let right = self.parse_filter();
                let span = left.span.merge(right.span);
                left = Expr::new(ExprKind::Binary(BinOp::NotIn, Box::new(left), Box::new(right)), span);
                continue;
            }
            if self.check(TokenKind::Is) {
                self.advance();
                let negated = if self.check(TokenKind::Not) {
                    self.advance();
                    true
                } else {
                    false
                };
                let (name, name_span) = self.expect_identifier("test name");
                let args = self.parse_optional_call_args();
                let span = left.span.merge(name_span).merge(
                    args.positional
                        .last()
                        .map(|e| e.span)
                        .unwrap_or(name_span),
                );
                left = Expr::new(
                    ExprKind::Test {
                        expr: Box::new(left),
                        name,
                        args,
                        negated,
                    },
                    span,
                );
                continue;
            }
            break;
        }
        left
    }

    fn peek_next_is(&self, kind: TokenKind) -> bool {
        self.tokens
            .get(self.pos + 1)
            .map(|t| t.kind == kind)
            .unwrap_or(false)
    }

    /// `|` filter pipeline, left-associative, binds looser than `~`.
    fn parse_filter(&mut self) -> Expr {
        let mut left = self.parse_concat();
        while self.check(TokenKind::Pipe) {
            self.advance();
            let (name, name_span) = self.expect_identifier("filter name");
            let args = self.parse_optional_call_args();
            let span = left.span.merge(name_span);
            left = Expr::new(
                ExprKind::Filter {
                    name,
                    expr: Box::new(left),
                    args,
                },
                span,
            );
        }
        left
    }

    fn parse_concat(&mut self) -> Expr {
        let first = self.parse_additive();
        if !self.check(TokenKind::Tilde) {
            return first;
        }
        let mut parts = vec![first];
        while self.matches(TokenKind::Tilde) {
            parts.push(self.parse_additive());
        }
        let span = parts.first().unwrap().span.merge(parts.last().unwrap().span);
        Expr::new(ExprKind::Concat(parts), span)
    }

    fn parse_additive(&mut self) -> Expr {
        let mut left = self.parse_multiplicative();
        loop {
            let op = match self.current_kind() {
                TokenKind::Plus => Some(BinOp::Add),
                TokenKind::Minus => Some(BinOp::Sub),
                _ => None,
            };
            let Some(op) = op else { break };
            self.advance();
            let right = self.parse_multiplicative();
            let span = left.span.merge(right.span);
            left = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), span);
        }
        left
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut left = self.parse_unary();
        loop {
            let op = match self.current_kind() {
                TokenKind::Star => Some(BinOp::Mul),
                TokenKind::Slash => Some(BinOp::Div),
                TokenKind::DoubleSlash => Some(BinOp::FloorDiv),
                TokenKind::Percent => Some(BinOp::Mod),
                _ => None,
            };
            let Some(op) = op else { break };
            self.advance();
            let right = self.parse_unary();
            let span = left.span.merge(right.span);
            left = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), span);
        }
        left
    }

    fn parse_unary(&mut self) -> Expr {
        match self.current_kind() {
            TokenKind::Plus | TokenKind::Minus => {
                let tok = self.advance();
                let op = if tok.kind == TokenKind::Plus {
                    UnaryOp::Pos
                } else {
                    UnaryOp::Neg
                };
                let operand = self.parse_unary();
                let span = tok.span.merge(operand.span);
                Expr::new(ExprKind::Unary(op, Box::new(operand)), span)
            }
            _ => self.parse_power(),
        }
    }

    /// `**`, right-associative.
    fn parse_power(&mut self) -> Expr {
        let base = self.parse_postfix();
        if self.matches(TokenKind::DoubleStar) {
            let exponent = self.parse_unary();
            let span = base.span.merge(exponent.span);
            return Expr::new(ExprKind::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)), span);
        }
        base
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_atom();
        loop {
            match self.current_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let (name, name_span) = self.expect_identifier("attribute name");
                    let span = expr.span.merge(name_span);
                    expr = Expr::new(ExprKind::GetAttr(Box::new(expr), name), span);
                }
                TokenKind::LBracket => {
                    self.advance();
                    expr = self.parse_subscript(expr);
                }
                TokenKind::LParen => {
                    let args = self.parse_call_args();
                    let end = self.current().span;
                    let span = expr.span.merge(end);
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_subscript(&mut self, obj: Expr) -> Expr {
        let start = obj.span;
        let first = if self.check(TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr()))
        };
        if self.check(TokenKind::Colon) {
            self.advance();
            let stop = if self.check(TokenKind::Colon) || self.check(TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expr()))
            };
            let step = if self.matches(TokenKind::Colon) {
                if self.check(TokenKind::RBracket) {
                    None
                } else {
                    Some(Box::new(self.parse_expr()))
                }
            } else {
                None
            };
            let end = self.expect(TokenKind::RBracket).span;
            let span = start.merge(end);
            return Expr::new(
                ExprKind::GetItem(
                    Box::new(obj),
                    Box::new(Expr::new(ExprKind::Slice { start: first, stop, step }, span)),
                ),
                span,
            );
        }
        let index = first.unwrap_or_else(|| {
            self.error(DiagnosticType::ExpectedExpression, "expected an index expression", self.current().span);
            Box::new(Expr::new(ExprKind::Literal(Literal::None), self.current().span))
        });
        let end = self.expect(TokenKind::RBracket).span;
        let span = start.merge(end);
        Expr::new(ExprKind::GetItem(Box::new(obj), index), span)
    }

    fn parse_optional_call_args(&mut self) -> CallArgs {
        if self.check(TokenKind::LParen) {
            self.parse_call_args()
        } else {
            CallArgs::empty()
        }
    }

    fn parse_call_args(&mut self) -> CallArgs {
        self.expect(TokenKind::LParen);
        let mut positional = Vec::new();
        let mut kwargs = Vec::new();
        let mut seen_kwarg = false;
        while !self.check(TokenKind::RParen) && !self.at_eof() {
            if self.check(TokenKind::Identifier) && self.peek_next_is(TokenKind::Assign) {
                let name = self.advance().lexeme;
                self.advance(); // '='
                let value = self.parse_expr();
                kwargs.push((name, value));
                seen_kwarg = true;
            } else {
                let value = self.parse_expr();
                if seen_kwarg {
                    self.error(
                        DiagnosticType::UnexpectedToken,
                        "positional argument follows keyword argument",
                        value.span,
                    );
                }
                positional.push(value);
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen);
        CallArgs { positional, kwargs }
    }

    fn expect_identifier(&mut self, what: &str) -> (String, Span) {
        if self.check(TokenKind::Identifier)
            || self.check(TokenKind::In)
            || self.check(TokenKind::Is)
            || self.check(TokenKind::Not)
            || self.check(TokenKind::And)
            || self.check(TokenKind::Or)
        {
            let tok = self.advance();
            (tok.lexeme, tok.span)
        } else {
            let span = self.current().span;
            self.error(DiagnosticType::ExpectedExpression, format!("expected {what}"), span);
            (String::new(), span)
        }
    }

    fn parse_atom(&mut self) -> Expr {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::IntegerLit => {
                self.advance();
                let value = tok.lexeme.parse::<i64>().unwrap_or(0);
                Expr::new(ExprKind::Literal(Literal::Int(value)), tok.span)
            }
            TokenKind::FloatLit => {
                self.advance();
                let value = tok.lexeme.parse::<f64>().unwrap_or(0.0);
                Expr::new(ExprKind::Literal(Literal::Float(value)), tok.span)
            }
            TokenKind::StringLit => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Str(unescape(&tok.lexeme))), tok.span)
            }
            TokenKind::BoolLit => {
                self.advance();
                let value = matches!(tok.lexeme.as_str(), "true" | "True");
                Expr::new(ExprKind::Literal(Literal::Bool(value)), tok.span)
            }
            TokenKind::NoneLit => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::None), tok.span)
            }
            TokenKind::Identifier => {
                self.advance();
                Expr::new(ExprKind::Name(tok.lexeme), tok.span)
            }
            TokenKind::LParen => {
                self.advance();
                if self.check(TokenKind::RParen) {
                    let end = self.advance().span;
                    return Expr::new(ExprKind::TupleLiteral(Vec::new()), tok.span.merge(end));
                }
                let first = self.parse_expr();
                if self.check(TokenKind::Comma) {
                    let mut items = vec![first];
                    while self.matches(TokenKind::Comma) {
                        if self.check(TokenKind::RParen) {
                            break;
                        }
                        items.push(self.parse_expr());
                    }
                    let end = self.expect(TokenKind::RParen).span;
                    Expr::new(ExprKind::TupleLiteral(items), tok.span.merge(end))
                } else {
                    let end = self.expect(TokenKind::RParen).span;
                    Expr::new(ExprKind::Group(Box::new(first)), tok.span.merge(end))
                }
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(TokenKind::RBracket) && !self.at_eof() {
                    items.push(self.parse_expr());
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(TokenKind::RBracket).span;
                Expr::new(ExprKind::ListLiteral(items), tok.span.merge(end))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut pairs = Vec::new();
                while !self.check(TokenKind::RBrace) && !self.at_eof() {
                    let key = self.parse_expr();
                    self.expect(TokenKind::Colon);
                    let value = self.parse_expr();
                    pairs.push((key, value));
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(TokenKind::RBrace).span;
                Expr::new(ExprKind::DictLiteral(pairs), tok.span.merge(end))
            }
            TokenKind::Minus | TokenKind::Plus => self.parse_unary(),
            _ => {
                self.error(
                    DiagnosticType::ExpectedExpression,
                    format!("expected an expression, found {}", tok.kind),
                    tok.span,
                );
                self.synchronize();
                Expr::new(ExprKind::Literal(Literal::None), tok.span)
            }
        }
    }
}

/// Resolves `\n \t \\ \" \' \xNN \uNNNN` escapes inside a quoted string
/// literal's raw lexeme.
fn unescape(lexeme: &str) -> String {
    let bytes = lexeme.as_bytes();
    let quote = bytes.first().copied();
    let closed = bytes.len() >= 2 && bytes.last().copied() == quote;
    let end = if closed { lexeme.len() - 1 } else { lexeme.len() };
    let inner = &lexeme[1.min(lexeme.len())..end.max(1.min(lexeme.len()))];
    let chars: Vec<char> = inner.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            match chars[i + 1] {
                'n' => {
                    out.push('\n');
                    i += 2;
                }
                't' => {
                    out.push('\t');
                    i += 2;
                }
                '\\' => {
                    out.push('\\');
                    i += 2;
                }
                '"' => {
                    out.push('"');
                    i += 2;
                }
                '\'' => {
                    out.push('\'');
                    i += 2;
                }
                'x' => {
                    let hex: String = chars[i + 2..(i + 4).min(chars.len())].iter().collect();
                    if let Ok(code) = u32::from_str_radix(&hex, 16) {
                        if let Some(c) = char::from_u32(code) {
                            out.push(c);
                        }
                    }
                    i += 2 + hex.len();
                }
                'u' => {
                    let hex: String = chars[i + 2..(i + 6).min(chars.len())].iter().collect();
                    if let Ok(code) = u32::from_str_radix(&hex, 16) {
                        if let Some(c) = char::from_u32(code) {
                            out.push(c);
                        }
                    }
                    i += 2 + hex.len();
                }
                other => {
                    out.push(other);
                    i += 2;
                }
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}
