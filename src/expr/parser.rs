//! Recursive-descent parser producing the expression AST.
//!
//! Precedence, lowest first: `or`, `and`, `not`, comparison, `+ -`,
//! `* / %`, unary `-`, `**`, primary.

use super::lexer::{tokenize, Spanned, Token};
use super::ExprError;
use crate::table::Cell;

/// Deepest bracket, call or prefix-operator nesting accepted.
pub(crate) const MAX_DEPTH: usize = 128;
/// Most AST nodes one expression may hold. Bounds the tree height, which
/// binding, row evaluation and dropping all recurse over.
pub(crate) const MAX_NODES: usize = 512;

/// Expression tree. `C` is the column reference: a name after parsing, a
/// column index once bound to a table.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr<C> {
    Literal(Cell),
    Column(C),
    Unary { op: UnaryOp, operand: Box<Expr<C>> },
    Binary { op: BinaryOp, lhs: Box<Expr<C>>, rhs: Box<Expr<C>> },
    Call { function: Function, args: Vec<Expr<C>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// The fixed function set. Nothing outside this list can be called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Abs,
    Round,
    Sqrt,
    Floor,
    Ceil,
    Min,
    Max,
    Len,
    Lower,
    Upper,
    IsNull,
    NotNull,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Function::Abs,
            "round" => Function::Round,
            "sqrt" => Function::Sqrt,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "min" => Function::Min,
            "max" => Function::Max,
            "len" => Function::Len,
            "lower" => Function::Lower,
            "upper" => Function::Upper,
            "isnull" | "isna" => Function::IsNull,
            "notnull" | "notna" => Function::NotNull,
            _ => return None,
        })
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Function::Abs => "abs",
            Function::Round => "round",
            Function::Sqrt => "sqrt",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Min => "min",
            Function::Max => "max",
            Function::Len => "len",
            Function::Lower => "lower",
            Function::Upper => "upper",
            Function::IsNull => "isnull",
            Function::NotNull => "notnull",
        }
    }

    fn check_arity(self, actual: usize) -> Result<(), ExprError> {
        let (ok, expected) = match self {
            Function::Round => ((1..=2).contains(&actual), "1 or 2"),
            Function::Min | Function::Max => (actual >= 1, "at least 1"),
            _ => (actual == 1, "1"),
        };
        if ok {
            Ok(())
        } else {
            Err(ExprError::Arity { function: self.name(), expected, actual })
        }
    }
}

pub(crate) fn parse(src: &str, frame_identifier: &str) -> Result<Expr<String>, ExprError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ExprError::Syntax { position: 0, message: "empty expression".into() });
    }
    let mut parser = Parser { tokens, pos: 0, end: src.len(), frame: frame_identifier, depth: 0, nodes: 0 };
    let expr = parser.or_expr()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(ExprError::Syntax { position: extra.pos, message: "unexpected trailing input".into() });
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    frame: &'a str,
    depth: usize,
    nodes: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|s| s.token.clone());
        self.pos += 1;
        tok
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == word)
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ExprError> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn error(&self, message: String) -> ExprError {
        ExprError::Syntax { position: self.offset(), message }
    }

    /// Runs `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ExprError>) -> Result<T, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply".into()));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    /// Counts one AST node against the size cap.
    fn node(&mut self, expr: Expr<String>) -> Result<Expr<String>, ExprError> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(self.error("expression too long".into()));
        }
        Ok(expr)
    }

    fn binary(&mut self, op: BinaryOp, lhs: Expr<String>, rhs: Expr<String>) -> Result<Expr<String>, ExprError> {
        self.node(binary(op, lhs, rhs))
    }

    fn or_expr(&mut self) -> Result<Expr<String>, ExprError> {
        let mut lhs = self.and_expr()?;
        while self.peek() == Some(&Token::Or) || self.is_keyword("or") {
            self.pos += 1;
            let rhs = self.and_expr()?;
            lhs = self.binary(BinaryOp::Or, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr<String>, ExprError> {
        let mut lhs = self.not_expr()?;
        while self.peek() == Some(&Token::And) || self.is_keyword("and") {
            self.pos += 1;
            let rhs = self.not_expr()?;
            lhs = self.binary(BinaryOp::And, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr<String>, ExprError> {
        if self.peek() == Some(&Token::Not) || self.is_keyword("not") {
            self.pos += 1;
            let operand = self.nested(Self::not_expr)?;
            return self.node(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand) });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr<String>, ExprError> {
        let lhs = self.additive()?;
        let Some(op) = self.peek().and_then(comparison_op) else {
            return Ok(lhs);
        };
        self.pos += 1;
        let rhs = self.additive()?;
        if self.peek().and_then(comparison_op).is_some() {
            return Err(self.error("chained comparisons are not supported, combine them with 'and'".into()));
        }
        self.binary(op, lhs, rhs)
    }

    fn additive(&mut self) -> Result<Expr<String>, ExprError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
    }

    fn multiplicative(&mut self) -> Result<Expr<String>, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
    }

    fn unary(&mut self) -> Result<Expr<String>, ExprError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                let operand = self.nested(Self::unary)?;
                self.node(Expr::Unary { op: UnaryOp::Neg, operand: Box::new(operand) })
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr<String>, ExprError> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::StarStar) {
            self.pos += 1;
            // Right-associative, and binds tighter than a unary minus on its left: -2 ** 2 == -4
            let exponent = self.nested(Self::unary)?;
            return self.binary(BinaryOp::Pow, base, exponent);
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr<String>, ExprError> {
        let at = self.offset();
        let Some(token) = self.advance() else {
            return Err(ExprError::Syntax { position: at, message: "unexpected end of expression".into() });
        };
        match token {
            Token::Number(n) => self.node(Expr::Literal(Cell::Number(n))),
            Token::Str(s) => self.node(Expr::Literal(Cell::Text(s))),
            Token::Quoted(name) => self.node(Expr::Column(name)),
            Token::LParen => {
                let inner = self.nested(Self::or_expr)?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(word) => self.identifier(word, at),
            other => Err(ExprError::Syntax { position: at, message: format!("unexpected {}", describe(&other)) }),
        }
    }

    fn identifier(&mut self, word: String, at: usize) -> Result<Expr<String>, ExprError> {
        match word.as_str() {
            "True" | "true" => return self.node(Expr::Literal(Cell::Bool(true))),
            "False" | "false" => return self.node(Expr::Literal(Cell::Bool(false))),
            "and" | "or" | "not" => {
                return Err(ExprError::Syntax { position: at, message: format!("unexpected keyword '{word}'") })
            }
            _ => {}
        }

        if word == self.frame {
            let column = self.frame_column()?;
            return self.node(column);
        }

        if self.peek() == Some(&Token::LParen) {
            let function = Function::from_name(&word).ok_or_else(|| ExprError::UnknownFunction(word.clone()))?;
            self.pos += 1;
            let mut args = Vec::new();
            if self.peek() != Some(&Token::RParen) {
                loop {
                    args.push(self.nested(Self::or_expr)?);
                    if self.peek() == Some(&Token::Comma) {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
            }
            self.expect(Token::RParen, "')' after function arguments")?;
            function.check_arity(args.len())?;
            return self.node(Expr::Call { function, args });
        }

        self.node(Expr::Column(word))
    }

    /// `df["col"]`, `df['col']` or `df.col`.
    fn frame_column(&mut self) -> Result<Expr<String>, ExprError> {
        match self.advance() {
            Some(Token::LBracket) => {
                let name = match self.advance() {
                    Some(Token::Str(name)) => name,
                    _ => {
                        self.pos -= 1;
                        return Err(self.error(format!("{}[...] takes a quoted column name", self.frame)));
                    }
                };
                self.expect(Token::RBracket, "']'")?;
                Ok(Expr::Column(name))
            }
            Some(Token::Dot) => match self.advance() {
                Some(Token::Ident(name)) => Ok(Expr::Column(name)),
                _ => {
                    self.pos -= 1;
                    Err(self.error(format!("expected a column name after '{}.'", self.frame)))
                }
            },
            _ => {
                self.pos -= 1;
                Err(self.error(format!("'{}' must be indexed by a column name", self.frame)))
            }
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr<String>, rhs: Expr<String>) -> Expr<String> {
    Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

fn comparison_op(token: &Token) -> Option<BinaryOp> {
    Some(match token {
        Token::EqEq => BinaryOp::Eq,
        Token::NotEq => BinaryOp::Ne,
        Token::Lt => BinaryOp::Lt,
        Token::Le => BinaryOp::Le,
        Token::Gt => BinaryOp::Gt,
        Token::Ge => BinaryOp::Ge,
        _ => return None,
    })
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {n}"),
        Token::Str(s) => format!("string '{s}'"),
        Token::Ident(w) => format!("identifier '{w}'"),
        Token::Quoted(w) => format!("column `{w}`"),
        other => format!("token {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn col(name: &str) -> Expr<String> { Expr::Column(name.into()) }
    fn num(n: f64) -> Expr<String> { Expr::Literal(Cell::Number(n)) }

    #[test]
    fn test_frame_references_become_columns() {
        assert_eq!(parse(r#"df["a"] + df.b"#, "df").unwrap(), binary(BinaryOp::Add, col("a"), col("b")));
        assert_eq!(parse("data['x']", "data").unwrap(), col("x"));
    }

    #[test]
    fn test_precedence() {
        let expected = binary(
            BinaryOp::Or,
            binary(BinaryOp::Gt, col("a"), num(3.0)),
            binary(
                BinaryOp::And,
                binary(BinaryOp::Eq, col("b"), binary(BinaryOp::Add, num(1.0), binary(BinaryOp::Mul, num(2.0), num(3.0)))),
                Expr::Unary { op: UnaryOp::Not, operand: Box::new(col("c")) },
            ),
        );
        assert_eq!(parse("a > 3 or b == 1 + 2 * 3 and not c", "df").unwrap(), expected);
    }

    #[test]
    fn test_power_is_right_associative_and_beats_negation() {
        assert_eq!(
            parse("-2 ** 3 ** 2", "df").unwrap(),
            Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(binary(BinaryOp::Pow, num(2.0), binary(BinaryOp::Pow, num(3.0), num(2.0)))),
            }
        );
    }

    #[test]
    fn test_function_calls() {
        assert_eq!(
            parse("round(a / 3, 2)", "df").unwrap(),
            Expr::Call { function: Function::Round, args: vec![binary(BinaryOp::Div, col("a"), num(3.0)), num(2.0)] }
        );
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("a >")]
    #[case("(a + 1")]
    #[case("1 < a < 3")]
    #[case("df")]
    #[case("df[0]")]
    #[case("df.")]
    #[case("a b")]
    #[case("and a")]
    fn test_syntax_errors(#[case] src: &str) {
        assert!(matches!(parse(src, "df"), Err(ExprError::Syntax { .. })), "accepted: {src:?}");
    }

    #[rstest]
    #[case::nested_brackets(format!("{}a{}", "(".repeat(1000), ")".repeat(1000)), "nested too deeply")]
    #[case::nested_calls(format!("{}a{}", "abs(".repeat(500), ")".repeat(500)), "nested too deeply")]
    #[case::negations("- ".repeat(5000) + "a", "nested too deeply")]
    #[case::long_chain(vec!["a"; 10_000].join(" + "), "expression too long")]
    #[case::long_condition(vec!["a > 1"; 2_000].join(" and "), "expression too long")]
    fn test_oversized_expressions_are_rejected(#[case] src: String, #[case] fragment: &str) {
        match parse(&src, "df") {
            Err(ExprError::Syntax { message, .. }) => assert!(message.contains(fragment), "{message}"),
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_expressions_within_limits_still_parse() {
        let nested = format!("{}a{}", "(".repeat(MAX_DEPTH - 1), ")".repeat(MAX_DEPTH - 1));
        assert_eq!(parse(&nested, "df").unwrap(), col("a"));
        let chain = vec!["a"; MAX_NODES / 2].join(" + ");
        assert!(parse(&chain, "df").is_ok());
    }

    #[test]
    fn test_only_whitelisted_functions_exist() {
        assert_eq!(parse("__import__('os')", "df").unwrap_err(), ExprError::UnknownFunction("__import__".into()));
        assert_eq!(parse("eval('1')", "df").unwrap_err(), ExprError::UnknownFunction("eval".into()));
    }

    #[test]
    fn test_arity_is_checked_at_parse_time() {
        assert_eq!(
            parse("abs(a, b)", "df").unwrap_err(),
            ExprError::Arity { function: "abs", expected: "1", actual: 2 }
        );
        assert!(parse("max()", "df").is_err());
    }
}
