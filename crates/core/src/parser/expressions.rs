use super::{describe, Parser};
use crate::ast::{
    ArithOp, CompareOp, Expr, KeywordCall, Literal, LogicOp, ParamItem, RemoteCall,
};
use crate::error::SyntaxError;
use crate::lexer::Token;

impl<'a> Parser<'a> {
    // -- Expression parsing --------------------------------------
    //
    // Lowest to highest: or, and, not, comparison, + -, * / %, unary -, atom.

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and_expr()?;
        while self.is_word("or") {
            self.advance();
            self.operand_on_same_line("'or'")?;
            let right = self.parse_and_expr()?;
            left = Expr::Logic {
                op: LogicOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_not_expr()?;
        while self.is_word("and") {
            self.advance();
            self.operand_on_same_line("'and'")?;
            let right = self.parse_not_expr()?;
            left = Expr::Logic {
                op: LogicOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.is_word("not") {
            self.advance();
            let operand = self.parse_not_expr()?;
            return Ok(Expr::Not {
                operand: Box::new(operand),
            });
        }
        self.parse_compare_expr()
    }

    fn parse_compare_expr(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_additive_expr()?;
        let op = match self.peek() {
            Token::Eq => CompareOp::Eq,
            Token::Neq => CompareOp::Neq,
            Token::Lt => CompareOp::Lt,
            Token::Lte => CompareOp::Lte,
            Token::Gt => CompareOp::Gt,
            Token::Gte => CompareOp::Gte,
            _ => return Ok(left),
        };
        let op_text = describe(self.peek());
        self.advance();
        self.operand_on_same_line(&op_text)?;
        let right = self.parse_additive_expr()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_additive_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_multiplicative_expr()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => return Ok(left),
            };
            let op_text = describe(self.peek());
            self.advance();
            self.operand_on_same_line(&op_text)?;
            let right = self.parse_multiplicative_expr()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_multiplicative_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary_expr()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                Token::Percent => ArithOp::Mod,
                _ => return Ok(left),
            };
            let op_text = describe(self.peek());
            self.advance();
            self.operand_on_same_line(&op_text)?;
            let right = self.parse_unary_expr()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat(&Token::Minus) {
            let operand = self.parse_unary_expr()?;
            return Ok(Expr::Neg {
                operand: Box::new(operand),
            });
        }
        self.parse_atom_expr()
    }

    fn parse_atom_expr(&mut self) -> Result<Expr, SyntaxError> {
        let lit = match self.peek().clone() {
            Token::Int(n) => Literal::Int(n),
            Token::Float(f) => Literal::Float(f),
            Token::Str(s) => Literal::Str(s),
            Token::Date(d) => Literal::Date(d),
            Token::Placeholder(text) => {
                self.advance();
                return Ok(Expr::Placeholder { text });
            }
            Token::LParen => {
                self.advance();
                let e = self.parse_expr()?;
                self.expect(Token::RParen, "')'")?;
                return Ok(e);
            }
            Token::LBracket if self.at_keyword_call() => {
                let call = self.parse_keyword_call()?;
                return Ok(Expr::Call { call });
            }
            Token::LBracket => return self.parse_list(),
            Token::LBrace => return self.parse_dict(),
            Token::Word(w) => match w.as_str() {
                "True" | "true" => Literal::Bool(true),
                "False" | "false" => Literal::Bool(false),
                "None" | "null" => Literal::Null,
                _ if self.peek_at(1) == &Token::Pipe => {
                    let call = self.parse_remote_call()?;
                    return Ok(Expr::RemoteCall { call });
                }
                _ => {
                    let name = self.take_ident()?;
                    return Ok(Expr::Var { name });
                }
            },
            other => {
                return Err(self.err(format!("expected expression, got {}", describe(&other))))
            }
        };
        self.advance();
        Ok(Expr::lit(lit))
    }

    fn parse_list(&mut self) -> Result<Expr, SyntaxError> {
        self.expect(Token::LBracket, "'['")?;
        let mut items = Vec::new();
        while self.peek() != &Token::RBracket {
            items.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBracket, "']' to close list")?;
        Ok(Expr::List { items })
    }

    fn parse_dict(&mut self) -> Result<Expr, SyntaxError> {
        self.expect(Token::LBrace, "'{'")?;
        let mut items = Vec::new();
        while self.peek() != &Token::RBrace {
            // bare-word keys are literal strings, not variable lookups
            let key = match self.peek().clone() {
                Token::Word(w) if self.peek_at(1) == &Token::Colon => {
                    self.advance();
                    Expr::lit(Literal::Str(w))
                }
                _ => self.parse_expr()?,
            };
            self.expect(Token::Colon, "':' after dictionary key")?;
            let value = self.parse_expr()?;
            items.push((key, value));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace, "'}' to close dictionary")?;
        Ok(Expr::Dict { items })
    }

    // -- Keyword calls -------------------------------------------

    /// `[` one or more words `]` is a keyword call; anything else is a list.
    fn at_keyword_call(&self) -> bool {
        if self.peek() != &Token::LBracket {
            return false;
        }
        let mut i = 1;
        while let Token::Word(w) = self.peek_at(i) {
            if matches!(w.as_str(), "True" | "true" | "False" | "false" | "None" | "null") {
                return false;
            }
            i += 1;
        }
        i > 1 && self.peek_at(i) == &Token::RBracket
    }

    fn parse_keyword_name(&mut self) -> Result<String, SyntaxError> {
        self.expect(Token::LBracket, "'[' to open keyword name")?;
        let mut words = Vec::new();
        while let Token::Word(w) = self.peek().clone() {
            self.advance();
            words.push(w);
        }
        if words.is_empty() {
            return Err(self.err(format!(
                "expected keyword name, got {}",
                describe(self.peek())
            )));
        }
        self.expect(Token::RBracket, "']' to close keyword name")?;
        Ok(words.join(" "))
    }

    fn parse_call_args(&mut self) -> Result<Vec<ParamItem>, SyntaxError> {
        let mut args = Vec::new();
        while self.eat(&Token::Comma) {
            let name = match self.peek().clone() {
                Token::Word(w) => {
                    self.advance();
                    w
                }
                other => {
                    return Err(self.err(format!(
                        "expected parameter name, got {}",
                        describe(&other)
                    )))
                }
            };
            self.expect(Token::Colon, "':' after parameter name")?;
            self.operand_on_same_line(&format!("'{}:'", name))?;
            let value = self.parse_expr()?;
            args.push(ParamItem { name, value });
        }
        Ok(args)
    }

    pub(super) fn parse_keyword_call(&mut self) -> Result<KeywordCall, SyntaxError> {
        let line = self.cur_line();
        let name = self.parse_keyword_name()?;
        let args = self.parse_call_args()?;
        Ok(KeywordCall { name, args, line })
    }

    pub(super) fn parse_remote_call(&mut self) -> Result<RemoteCall, SyntaxError> {
        let line = self.cur_line();
        let alias = self.take_ident()?;
        self.expect(Token::Pipe, "'|' after remote alias")?;
        let keyword = self.parse_keyword_name()?;
        let args = self.parse_call_args()?;
        Ok(RemoteCall {
            alias,
            keyword,
            args,
            line,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{ArithOp, Expr, Literal};
    use crate::parser::parse_expression;

    #[test]
    fn unary_minus_binds_tighter_than_addition() {
        match parse_expression("-1 + 2").unwrap() {
            Expr::Arith {
                op: ArithOp::Add,
                left,
                ..
            } => assert!(matches!(*left, Expr::Neg { .. })),
            other => panic!("unexpected tree {:?}", other),
        }
        assert!(matches!(
            parse_expression("-(1 + 2)").unwrap(),
            Expr::Neg { .. }
        ));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        match parse_expression("1 + 2 * 3").unwrap() {
            Expr::Arith {
                op: ArithOp::Add,
                right,
                ..
            } => assert!(matches!(*right, Expr::Arith { op: ArithOp::Mul, .. })),
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn bracketed_word_is_a_call_but_literals_make_lists() {
        assert!(matches!(
            parse_expression("[获取时间]").unwrap(),
            Expr::Call { .. }
        ));
        assert!(matches!(
            parse_expression("[a, b]").unwrap(),
            Expr::List { .. }
        ));
        assert!(matches!(
            parse_expression("[true]").unwrap(),
            Expr::List { .. }
        ));
    }

    #[test]
    fn dictionary_keys_may_be_bare_words() {
        match parse_expression("{code: 200, \"msg\": ok}").unwrap() {
            Expr::Dict { items } => {
                assert_eq!(items.len(), 2);
                assert!(matches!(
                    &items[0].0,
                    Expr::Literal { value: Literal::Str(k) } if k == "code"
                ));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }
}
