//! Expression parser.
//!
//! Binary operators are parsed by precedence climbing over the levels in
//! [`BinOp::precedence`]. Above them sit unary operators, then postfix
//! member access and filters, then primaries. The ternary `? :` sits
//! below everything.
//!
//! Recursion is bounded: every nested expression (parentheses, array and
//! mapping literals, brackets, arguments, ternary arms) and every stacked
//! unary operator counts one level against `max_depth`.

use crate::ast::*;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lexer::{tokenize, Spanned, Token};
use crate::value::{format_number, Value};

pub struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    /// Template offset just past the last token, reported for errors at
    /// end of input.
    end_position: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>, end_position: usize) -> Self {
        Self {
            tokens,
            cursor: 0,
            end_position,
            depth: 0,
            max_depth: Config::default().max_depth,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Tokenize and wrap the inside of a tag.
    pub fn for_source(source: &str, offset: usize) -> Result<Self> {
        Ok(Self::new(tokenize(source, offset)?, offset + source.len()))
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    pub(crate) fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + n).map(|s| &s.token)
    }

    pub(crate) fn consume(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    /// Build a parse error pointing at the current token.
    pub(crate) fn error_here(&self, message: impl Into<String>) -> Error {
        match self.tokens.get(self.cursor) {
            Some(s) => Error::parse(message, s.token.to_string(), s.position),
            None => Error::parse(message, "end of tag", self.end_position),
        }
    }

    pub(crate) fn expect(&mut self, token: Token) -> Result<Spanned> {
        if self.peek() == Some(&token) {
            if let Some(spanned) = self.consume() {
                return Ok(spanned);
            }
        }
        Err(self.error_here(format!("expected {token}")))
    }

    pub(crate) fn expect_ident(&mut self, what: &str) -> Result<String> {
        if let Some(Token::Ident(name)) = self.peek() {
            let name = name.clone();
            self.cursor += 1;
            return Ok(name);
        }
        Err(self.error_here(format!("expected {what}")))
    }

    pub(crate) fn expect_end(&mut self) -> Result<()> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(self.error_here("unexpected trailing input"))
        }
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.max_depth {
            return Err(self.error_here(format!(
                "expression nested deeper than {} levels",
                self.max_depth
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.nested(Self::parse_conditional)
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let test = self.parse_binary(1)?;
        if self.peek() != Some(&Token::Question) {
            return Ok(test);
        }
        self.consume(); // ?
        let then = self.parse_expr()?;
        self.expect(Token::Colon)?;
        let otherwise = self.parse_expr()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some(op) = self.peek().and_then(binary_op) else {
                break;
            };
            if op.precedence() < min_precedence {
                break;
            }
            self.consume();
            let rhs = self.parse_binary(op.precedence() + 1)?;
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Token::Bang | Token::Not) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            _ => return self.parse_postfix(),
        };
        self.consume();
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.consume(); // .
                    let key = match self.peek() {
                        Some(Token::Ident(name)) => name.clone(),
                        Some(Token::Number(n)) => format_number(*n),
                        _ => return Err(self.error_here("expected attribute name after `.`")),
                    };
                    self.consume();
                    expr = Expr::Member {
                        object: Box::new(expr),
                        key: Box::new(Expr::Literal(Value::String(key))),
                        style: AccessStyle::Dot,
                    };
                }
                Some(Token::LBracket) => {
                    self.consume(); // [
                    let key = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        key: Box::new(key),
                        style: AccessStyle::Bracket,
                    };
                }
                Some(Token::Pipe) => {
                    self.consume(); // |
                    let name = self.expect_ident("filter name after `|`")?;
                    let args = if self.peek() == Some(&Token::LParen) {
                        self.consume();
                        self.parse_args()?
                    } else {
                        Vec::new()
                    };
                    expr = Expr::Filter {
                        input: Box::new(expr),
                        name,
                        args,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let Some(spanned) = self.consume() else {
            return Err(self.error_here("expected expression"));
        };

        let expr = match spanned.token {
            Token::Number(n) => Expr::Literal(Value::Number(n)),
            Token::StringLit { value, .. } => Expr::Literal(Value::String(value)),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Null => Expr::Literal(Value::Null),
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    self.consume();
                    let args = self.parse_args()?;
                    Expr::Call { name, args }
                } else {
                    Expr::Variable(name)
                }
            }
            Token::LParen => {
                let e = self.parse_expr()?;
                self.expect(Token::RParen)?;
                e
            }
            Token::LBracket => Expr::Array(self.parse_array()?),
            Token::LBrace => Expr::Mapping(self.parse_mapping()?),
            token => {
                return Err(Error::parse(
                    "expected expression",
                    token.to_string(),
                    spanned.position,
                ))
            }
        };

        Ok(expr)
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.parse_list(Token::RParen)
    }

    fn parse_array(&mut self) -> Result<Vec<Expr>> {
        self.parse_list(Token::RBracket)
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn parse_list(&mut self, close: Token) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&close) {
                self.consume();
                return Ok(items);
            }
            items.push(self.parse_expr()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.consume();
                }
                Some(t) if *t == close => {}
                _ => return Err(self.error_here(format!("expected `,` or {close}"))),
            }
        }
    }

    fn parse_mapping(&mut self) -> Result<Vec<(Expr, Expr)>> {
        let mut entries = Vec::new();
        loop {
            if self.peek() == Some(&Token::RBrace) {
                self.consume();
                return Ok(entries);
            }

            let key = match self.peek().cloned() {
                Some(Token::StringLit { value, .. }) => {
                    self.consume();
                    Expr::Literal(Value::String(value))
                }
                Some(Token::Number(n)) => {
                    self.consume();
                    Expr::Literal(Value::String(format_number(n)))
                }
                Some(Token::Ident(name)) => {
                    self.consume();
                    Expr::Literal(Value::String(name))
                }
                Some(Token::LParen) => {
                    self.consume();
                    let e = self.parse_expr()?;
                    self.expect(Token::RParen)?;
                    e
                }
                _ => return Err(self.error_here("expected mapping key")),
            };
            self.expect(Token::Colon)?;
            let value = self.parse_expr()?;
            entries.push((key, value));

            match self.peek() {
                Some(Token::Comma) => {
                    self.consume();
                }
                Some(Token::RBrace) => {}
                _ => return Err(self.error_here("expected `,` or `}`")),
            }
        }
    }
}

fn binary_op(token: &Token) -> Option<BinOp> {
    Some(match token {
        Token::OrOr | Token::Or => BinOp::Or,
        Token::AndAnd | Token::And => BinOp::And,
        Token::EqEq => BinOp::Eq,
        Token::NotEq => BinOp::NotEq,
        Token::Lt => BinOp::Lt,
        Token::LtEq => BinOp::LtEq,
        Token::Gt => BinOp::Gt,
        Token::GtEq => BinOp::GtEq,
        Token::Plus => BinOp::Add,
        Token::Minus => BinOp::Sub,
        Token::Tilde => BinOp::Concat,
        Token::Star => BinOp::Mul,
        Token::Slash => BinOp::Div,
        Token::Percent => BinOp::Rem,
        _ => return None,
    })
}

/// Parse a complete expression, e.g. the inside of `{{ ... }}`.
pub fn parse_expression(source: &str, offset: usize, max_depth: usize) -> Result<Expr> {
    let mut parser = Parser::for_source(source, offset)?.with_max_depth(max_depth);
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPTH: usize = 64;

    fn parse(source: &str) -> Expr {
        parse_expression(source, 0, DEPTH).unwrap()
    }

    fn num(n: f64) -> Expr {
        Expr::Literal(Value::Number(n))
    }

    fn var(name: &str) -> Expr {
        Expr::Variable(name.to_string())
    }

    fn bin(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn multiplication_binds_tighter() {
        assert_eq!(
            parse("1 + 2 * 3"),
            bin(BinOp::Add, num(1.0), bin(BinOp::Mul, num(2.0), num(3.0)))
        );
        assert_eq!(
            parse("(1 + 2) * 3"),
            bin(BinOp::Mul, bin(BinOp::Add, num(1.0), num(2.0)), num(3.0))
        );
    }

    #[test]
    fn same_level_is_left_associative() {
        assert_eq!(
            parse("a - b - c"),
            bin(BinOp::Sub, bin(BinOp::Sub, var("a"), var("b")), var("c"))
        );
    }

    #[test]
    fn logical_levels() {
        assert_eq!(
            parse("a || b && c == d"),
            bin(
                BinOp::Or,
                var("a"),
                bin(BinOp::And, var("b"), bin(BinOp::Eq, var("c"), var("d")))
            )
        );
        assert_eq!(parse("a or b"), parse("a || b"));
        assert_eq!(parse("not a"), parse("!a"));
    }

    #[test]
    fn filters_bind_tighter_than_binary_operators() {
        let expr = parse("a ~ b|upper");
        let Expr::Binary { op: BinOp::Concat, right, .. } = expr else {
            panic!("expected concat, got {expr:?}");
        };
        assert!(matches!(*right, Expr::Filter { ref name, .. } if name == "upper"));
    }

    #[test]
    fn filter_chains_apply_left_to_right() {
        let expr = parse("a|f|g(1)");
        let Expr::Filter { input, name, args } = expr else {
            panic!("expected filter");
        };
        assert_eq!(name, "g");
        assert_eq!(args, vec![num(1.0)]);
        assert!(matches!(*input, Expr::Filter { ref name, .. } if name == "f"));
    }

    #[test]
    fn dot_and_bracket_build_the_same_lookup() {
        let Expr::Member { key: dot_key, object: dot_obj, .. } = parse("a.b") else {
            panic!("expected member");
        };
        let Expr::Member { key: br_key, object: br_obj, .. } = parse("a['b']") else {
            panic!("expected member");
        };
        assert_eq!(dot_key, br_key);
        assert_eq!(dot_obj, br_obj);
    }

    #[test]
    fn literals_nest() {
        let expr = parse(r#"[1, [2, a + 1], {"k": [3], n: 4, 5: 'x', (k): 6},]"#);
        let Expr::Array(items) = expr else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 3);
        let Expr::Mapping(entries) = &items[2] else {
            panic!("expected mapping");
        };
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].0, Expr::Literal(Value::from("n")));
        assert_eq!(entries[2].0, Expr::Literal(Value::from("5")));
        assert_eq!(entries[3].0, var("k"));
    }

    #[test]
    fn ternary_is_lowest() {
        let expr = parse("a > 1 ? 'big' : 'small'");
        assert!(matches!(expr, Expr::Conditional { .. }));
    }

    #[test]
    fn unary_minus_binds_to_operand() {
        assert_eq!(
            parse("-a * b"),
            bin(
                BinOp::Mul,
                Expr::Unary { op: UnaryOp::Neg, operand: Box::new(var("a")) },
                var("b")
            )
        );
    }

    #[test]
    fn function_call() {
        assert_eq!(
            parse("range(1, 2)"),
            Expr::Call { name: "range".into(), args: vec![num(1.0), num(2.0)] }
        );
    }

    #[test]
    fn errors_carry_token_and_position() {
        match parse_expression("1 + * 2", 10, DEPTH) {
            Err(Error::Parse { found, position, .. }) => {
                assert_eq!(found, "`*`");
                assert_eq!(position, 14);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(matches!(parse_expression("(1 + 2", 0, DEPTH), Err(Error::Parse { .. })));
        assert!(matches!(parse_expression("[1, 2", 0, DEPTH), Err(Error::Parse { .. })));
        assert!(matches!(parse_expression("a b", 0, DEPTH), Err(Error::Parse { .. })));
        assert!(matches!(parse_expression("", 0, DEPTH), Err(Error::Parse { .. })));
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        match parse_expression(&deep, 0, DEPTH) {
            Err(Error::Parse { message, .. }) => assert!(message.contains("nested deeper")),
            other => panic!("expected parse error, got {other:?}"),
        }

        let brackets = format!("{}1{}", "[".repeat(10_000), "]".repeat(10_000));
        assert!(matches!(parse_expression(&brackets, 0, DEPTH), Err(Error::Parse { .. })));
        let mappings = format!("{}1{}", "{a: ".repeat(10_000), "}".repeat(10_000));
        assert!(matches!(parse_expression(&mappings, 0, DEPTH), Err(Error::Parse { .. })));
        let negations = format!("{}1", "-".repeat(10_000));
        assert!(matches!(parse_expression(&negations, 0, DEPTH), Err(Error::Parse { .. })));

        let shallow = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(parse_expression(&shallow, 0, DEPTH).unwrap(), num(1.0));
        assert!(parse_expression(&shallow, 0, 5).is_err());
    }
}
