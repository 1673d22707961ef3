use crate::error::{CompilerError, CompilerResult, SourceLocation};
use crate::lexer::token::{Keyword, TokenKind};
use crate::lexer::tokenizer::Tokenizer;
use crate::lexer::Token;

use super::ast::{Expr, FunctionAst, Item, Prototype, PrototypeKind, ANON_FUNCTION};
use super::operators::{DisplacedOperator, OperatorEntry, OperatorTable};

/// Precedence assigned to a `binary` declaration without an explicit
/// precedence literal.
const DEFAULT_BINARY_PRECEDENCE: u32 = 30;

/// One successfully parsed statement, plus the operator-table entry its
/// prototype displaced (needed to roll the table back if IR generation for
/// the definition later fails).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    pub item: Item,
    pub displaced_op: Option<DisplacedOperator>,
}

/// Recursive descent parser with a single token of lookahead.
///
/// Binary expressions use precedence climbing driven by the operator
/// table, which the parser itself extends when it processes a `binary` or
/// `unary` prototype — parsing behavior is a function of previously parsed
/// input, by design.
pub struct Parser<'a> {
    tokenizer: Tokenizer,
    current: Token,
    ops: &'a mut OperatorTable,
}

impl<'a> Parser<'a> {
    /// Create a parser over `source` using (and mutating) `ops`.
    pub fn new(source: &str, ops: &'a mut OperatorTable) -> Self {
        let mut tokenizer = Tokenizer::new(source);
        let current = tokenizer.next_token();
        Self {
            tokenizer,
            current,
            ops,
        }
    }

    /// Parse the next top-level statement, or `None` at end of input.
    ///
    /// Stray semicolons between statements are skipped. The statement's
    /// trailing `;` is consumed; end of input also closes a statement.
    pub fn parse_statement(&mut self) -> CompilerResult<Option<ParsedStatement>> {
        while self.current.kind == TokenKind::Semicolon {
            self.bump();
        }
        if self.current.kind == TokenKind::Eof {
            return Ok(None);
        }

        let (item, displaced_op) = match self.current.kind {
            TokenKind::Keyword(Keyword::Def) => self.parse_definition()?,
            TokenKind::Keyword(Keyword::Extern) => self.parse_extern()?,
            _ => {
                let body = self.parse_expression()?;
                let proto = Prototype::new(ANON_FUNCTION, Vec::new());
                (Item::TopLevel(FunctionAst { proto, body }), None)
            }
        };

        if let Err(err) = self.expect_statement_end() {
            if let Some(displaced) = displaced_op {
                self.ops.restore(displaced);
            }
            return Err(err);
        }

        Ok(Some(ParsedStatement { item, displaced_op }))
    }

    /// The operator table this parser reads and extends. The session uses
    /// it to roll back a registration whose definition failed after
    /// parsing.
    pub fn operator_table_mut(&mut self) -> &mut OperatorTable {
        self.ops
    }

    /// Discard tokens up to and including the next `;` so the session can
    /// resume after a failed statement.
    pub fn synchronize(&mut self) {
        loop {
            match self.current.kind {
                TokenKind::Semicolon => {
                    self.bump();
                    return;
                }
                TokenKind::Eof => return,
                _ => self.bump(),
            }
        }
    }

    /// Parse `def <prototype> <expr>`.
    ///
    /// The prototype's operator (if any) is live in the table while the
    /// body is parsed, so an operator may be used recursively inside its
    /// own definition. A failed body parse restores the displaced entry.
    fn parse_definition(&mut self) -> CompilerResult<(Item, Option<DisplacedOperator>)> {
        self.bump(); // def
        let proto = self.parse_prototype()?;
        let displaced = self.register_operator(&proto);

        match self.parse_expression() {
            Ok(body) => Ok((Item::Definition(FunctionAst { proto, body }), displaced)),
            Err(err) => {
                if let Some(displaced) = displaced {
                    self.ops.restore(displaced);
                }
                Err(err)
            }
        }
    }

    /// Parse `extern <prototype>`.
    fn parse_extern(&mut self) -> CompilerResult<(Item, Option<DisplacedOperator>)> {
        self.bump(); // extern
        let proto = self.parse_prototype()?;
        let displaced = self.register_operator(&proto);
        Ok((Item::Extern(proto), displaced))
    }

    /// Parse a prototype: a plain name, `binary SYM [prec]`, or
    /// `unary SYM`, followed by the parenthesized parameter list.
    fn parse_prototype(&mut self) -> CompilerResult<Prototype> {
        let (name, kind, precedence) = match self.current.kind {
            TokenKind::Identifier => {
                let name = self.current.text.clone();
                self.bump();
                (name, PrototypeKind::Plain, 0)
            }
            TokenKind::Keyword(Keyword::Binary) => {
                self.bump();
                let symbol = self.expect_operator_symbol("binary")?;
                let mut precedence = DEFAULT_BINARY_PRECEDENCE;
                if self.current.kind == TokenKind::Number {
                    let parsed = self.current.text.parse::<u32>().map_err(|_| {
                        self.error(format!("invalid precedence '{}'", self.current.text))
                    })?;
                    if !(1..=100).contains(&parsed) {
                        return Err(self.error("invalid precedence: must be in 1..100"));
                    }
                    precedence = parsed;
                    self.bump();
                }
                (format!("binary{symbol}"), PrototypeKind::Binary, precedence)
            }
            TokenKind::Keyword(Keyword::Unary) => {
                self.bump();
                let symbol = self.expect_operator_symbol("unary")?;
                (format!("unary{symbol}"), PrototypeKind::Unary, 0)
            }
            _ => return Err(self.error("expected function name in prototype")),
        };

        self.expect_op('(', "expected '(' in prototype")?;
        let mut params = Vec::new();
        while self.current.kind == TokenKind::Identifier {
            params.push(self.current.text.clone());
            self.bump();
        }
        self.expect_op(')', "expected ')' in prototype")?;

        let expected = match kind {
            PrototypeKind::Plain => None,
            PrototypeKind::Unary => Some(1),
            PrototypeKind::Binary => Some(2),
        };
        if let Some(expected) = expected {
            if params.len() != expected {
                return Err(self.error("invalid number of operands for operator"));
            }
        }

        Ok(Prototype {
            name,
            params,
            kind,
            precedence,
        })
    }

    /// Install the prototype's operator into the table, returning the
    /// displaced entry.
    fn register_operator(&mut self, proto: &Prototype) -> Option<DisplacedOperator> {
        let symbol = proto.operator_symbol()?;
        let entry = match proto.kind {
            PrototypeKind::Binary => OperatorEntry::binary(proto.precedence),
            PrototypeKind::Unary => OperatorEntry::unary(),
            PrototypeKind::Plain => return None,
        };
        Some(self.ops.define(symbol, entry))
    }

    /// Parse an expression: a unary operand followed by the binary
    /// operator climb.
    fn parse_expression(&mut self) -> CompilerResult<Expr> {
        let lhs = self.parse_unary()?;
        self.parse_bin_op_rhs(0, lhs)
    }

    /// Precedence climbing over binary operators.
    ///
    /// Equal precedences associate left (strict `<` comparison); a
    /// higher-precedence run to the right is folded first by recursing at
    /// `tok_prec + 1`.
    fn parse_bin_op_rhs(&mut self, min_prec: i64, mut lhs: Expr) -> CompilerResult<Expr> {
        loop {
            let tok_prec = self.current_precedence();
            if tok_prec < min_prec {
                return Ok(lhs);
            }

            let op = match self.current.kind {
                TokenKind::Op(symbol) => symbol,
                _ => return Ok(lhs),
            };
            self.bump();

            let mut rhs = self.parse_unary()?;
            let next_prec = self.current_precedence();
            if tok_prec < next_prec {
                rhs = self.parse_bin_op_rhs(tok_prec + 1, rhs)?;
            }

            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    /// Parse a prefix-unary expression, or fall through to a primary.
    ///
    /// Any operator symbol other than `(` and `,` in operand position is a
    /// prefix operator; recursion permits stacked prefixes (`!!x`).
    fn parse_unary(&mut self) -> CompilerResult<Expr> {
        match self.current.kind {
            TokenKind::Op(op) if op != '(' && op != ',' => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_primary(),
        }
    }

    /// Parse a primary expression: literal, variable/call, parenthesized
    /// expression, `if`, `for`, or `var`.
    fn parse_primary(&mut self) -> CompilerResult<Expr> {
        match self.current.kind {
            TokenKind::Number => self.parse_number(),
            TokenKind::Identifier => self.parse_identifier(),
            TokenKind::Op('(') => self.parse_paren(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Var) => self.parse_var(),
            _ => Err(self.error("expected expression")),
        }
    }

    /// Parse a numeric literal.
    fn parse_number(&mut self) -> CompilerResult<Expr> {
        let value = self.current.text.parse::<f64>().map_err(|_| {
            self.error(format!("invalid number literal '{}'", self.current.text))
        })?;
        self.bump();
        Ok(Expr::Number(value))
    }

    /// Parse a variable reference or, when followed by `(`, a call with
    /// comma-separated arguments.
    fn parse_identifier(&mut self) -> CompilerResult<Expr> {
        let name = self.current.text.clone();
        self.bump();

        if !self.check_op('(') {
            return Ok(Expr::Variable(name));
        }
        self.bump();

        let mut args = Vec::new();
        if !self.check_op(')') {
            loop {
                args.push(self.parse_expression()?);
                if self.check_op(')') {
                    break;
                }
                if !self.check_op(',') {
                    return Err(self.error("expected ')' or ',' in argument list"));
                }
                self.bump();
            }
        }
        self.bump(); // )

        Ok(Expr::Call { callee: name, args })
    }

    /// Parse a parenthesized expression.
    fn parse_paren(&mut self) -> CompilerResult<Expr> {
        self.bump(); // (
        let expr = self.parse_expression()?;
        self.expect_op(')', "expected ')'")?;
        Ok(expr)
    }

    /// Parse `if cond then a else b`.
    fn parse_if(&mut self) -> CompilerResult<Expr> {
        self.bump(); // if
        let cond = self.parse_expression()?;
        self.expect_keyword(Keyword::Then, "expected 'then'")?;
        let then_branch = self.parse_expression()?;
        self.expect_keyword(Keyword::Else, "expected 'else'")?;
        let else_branch = self.parse_expression()?;
        Ok(Expr::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    /// Parse `for name = start, end [, step] in body`.
    fn parse_for(&mut self) -> CompilerResult<Expr> {
        self.bump(); // for
        if self.current.kind != TokenKind::Identifier {
            return Err(self.error("expected identifier after 'for'"));
        }
        let var = self.current.text.clone();
        self.bump();

        self.expect_op('=', "expected '=' after loop variable")?;
        let start = self.parse_expression()?;
        self.expect_op(',', "expected ',' after start value")?;
        let end = self.parse_expression()?;

        let step = if self.check_op(',') {
            self.bump();
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };

        self.expect_keyword(Keyword::In, "expected 'in' after 'for'")?;
        let body = self.parse_expression()?;

        Ok(Expr::For {
            var,
            start: Box::new(start),
            end: Box::new(end),
            step,
            body: Box::new(body),
        })
    }

    /// Parse `var name [= init], ... in body`.
    fn parse_var(&mut self) -> CompilerResult<Expr> {
        self.bump(); // var
        let mut bindings = Vec::new();
        loop {
            if self.current.kind != TokenKind::Identifier {
                return Err(self.error("expected identifier after 'var'"));
            }
            let name = self.current.text.clone();
            self.bump();

            let init = if self.check_op('=') {
                self.bump();
                Some(self.parse_expression()?)
            } else {
                None
            };
            bindings.push((name, init));

            if !self.check_op(',') {
                break;
            }
            self.bump();
        }
        self.expect_keyword(Keyword::In, "expected 'in' after 'var' bindings")?;
        let body = self.parse_expression()?;

        Ok(Expr::Var {
            bindings,
            body: Box::new(body),
        })
    }

    // Helper methods for token manipulation

    fn bump(&mut self) {
        self.current = self.tokenizer.next_token();
    }

    /// Precedence of the current token when it is a binary operator, else
    /// -1 so any climb stops.
    fn current_precedence(&self) -> i64 {
        match self.current.kind {
            TokenKind::Op(symbol) => self
                .ops
                .precedence_of(symbol)
                .map_or(-1, |precedence| i64::from(precedence)),
            _ => -1,
        }
    }

    fn check_op(&self, symbol: char) -> bool {
        self.current.kind == TokenKind::Op(symbol)
    }

    fn expect_op(&mut self, symbol: char, message: &str) -> CompilerResult<()> {
        if self.check_op(symbol) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword, message: &str) -> CompilerResult<()> {
        if self.current.kind == TokenKind::Keyword(keyword) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    /// Consume the declared operator symbol of a `binary`/`unary`
    /// prototype. The symbol must be a single ASCII operator character,
    /// and `=` is reserved.
    fn expect_operator_symbol(&mut self, keyword: &str) -> CompilerResult<char> {
        match self.current.kind {
            TokenKind::Op(symbol) if symbol.is_ascii() => {
                if symbol == '=' {
                    return Err(self.error("operator '=' is reserved and cannot be redefined"));
                }
                self.bump();
                Ok(symbol)
            }
            _ => Err(self.error(format!("expected operator symbol after '{keyword}'"))),
        }
    }

    fn expect_statement_end(&mut self) -> CompilerResult<()> {
        match self.current.kind {
            TokenKind::Semicolon => {
                self.bump();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.error("expected ';' after statement")),
        }
    }

    fn error(&self, message: impl Into<String>) -> CompilerError {
        CompilerError::parse_error(
            SourceLocation::new(self.current.line, self.current.column),
            message.into(),
        )
    }
}
