use super::{describe, Parser};
use crate::ast::{ElifClause, Expr, FunctionDef, FunctionParam, Stmt, StmtKind, Teardown};
use crate::error::SyntaxError;
use crate::lexer::Token;

impl<'a> Parser<'a> {
    pub(super) fn parse_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.cur_line();
        let kind = match self.peek().clone() {
            Token::Word(w) => match w.as_str() {
                "for" => return self.parse_for(line),
                "if" => return self.parse_if(line),
                "function" => return self.parse_function(line),
                "return" => {
                    self.advance();
                    let value = if self.at_eof()
                        || self.cur_line() > line
                        || self.is_word("end")
                    {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    StmtKind::Return { value }
                }
                "break" | "continue" => {
                    if self.loop_depth == 0 {
                        return Err(self.err(format!("'{}' outside of a loop", w)));
                    }
                    self.advance();
                    if w == "break" {
                        StmtKind::Break
                    } else {
                        StmtKind::Continue
                    }
                }
                _ if self.peek_at(1) == &Token::Assign => self.parse_assignment()?,
                _ if self.peek_at(1) == &Token::Pipe => {
                    StmtKind::RemoteCall(self.parse_remote_call()?)
                }
                _ => {
                    return Err(self.err(format!(
                        "expected a statement, got {}",
                        describe(self.peek())
                    )))
                }
            },
            Token::LBracket => StmtKind::Call(self.parse_keyword_call()?),
            other => {
                return Err(self.err(format!(
                    "expected a statement, got {}",
                    describe(&other)
                )))
            }
        };
        self.expect_statement_end()?;
        Ok(Stmt { kind, line })
    }

    fn parse_assignment(&mut self) -> Result<StmtKind, SyntaxError> {
        let target = self.take_ident()?;
        self.expect(Token::Assign, "'='")?;
        self.operand_on_same_line("'='")?;
        let value = self.parse_expr()?;
        // A call on the right-hand side gets its own node so the executor can
        // unpack structured results.
        Ok(match value {
            Expr::Call { call } => StmtKind::AssignCall { target, call },
            Expr::RemoteCall { call } => StmtKind::AssignRemoteCall { target, call },
            value => StmtKind::Assign { target, value },
        })
    }

    fn parse_for(&mut self, line: u32) -> Result<Stmt, SyntaxError> {
        self.expect_word("for")?;
        let var = self.take_ident()?;
        self.expect_word("in")?;
        self.expect_word("range")?;
        self.expect(Token::LParen, "'(' after range")?;
        let start = self.parse_expr()?;
        self.expect(Token::Comma, "',' between range bounds")?;
        let end = self.parse_expr()?;
        self.expect(Token::RParen, "')'")?;
        self.expect_word("do")?;

        self.loop_depth += 1;
        let body = self.parse_block(&["end"]);
        self.loop_depth -= 1;

        self.expect_word("end")?;
        Ok(Stmt {
            kind: StmtKind::For {
                var,
                start,
                end,
                body,
            },
            line,
        })
    }

    fn parse_if(&mut self, line: u32) -> Result<Stmt, SyntaxError> {
        self.expect_word("if")?;
        let cond = self.parse_expr()?;
        self.expect_word("do")?;
        let then_body = self.parse_block(&["elif", "else", "end"]);

        let mut elifs = Vec::new();
        while self.is_word("elif") {
            let elif_line = self.cur_line();
            self.advance();
            let cond = self.parse_expr()?;
            self.expect_word("do")?;
            let body = self.parse_block(&["elif", "else", "end"]);
            elifs.push(ElifClause {
                cond,
                body,
                line: elif_line,
            });
        }

        let else_body = if self.is_word("else") {
            self.advance();
            Some(self.parse_block(&["end"]))
        } else {
            None
        };

        self.expect_word("end")?;
        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                then_body,
                elifs,
                else_body,
            },
            line,
        })
    }

    fn parse_function(&mut self, line: u32) -> Result<Stmt, SyntaxError> {
        if self.block_depth > 0 {
            return Err(self.err("custom keywords may only be defined at top level"));
        }
        self.expect_word("function")?;
        let name = self.take_ident()?;

        let mut params = Vec::new();
        if self.eat(&Token::LParen) {
            while self.peek() != &Token::RParen {
                let pname = self.take_ident()?;
                let default = if self.eat(&Token::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                params.push(FunctionParam {
                    name: pname,
                    default,
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen, "')' after parameters")?;
        }
        self.expect_word("do")?;

        let saved_loops = std::mem::take(&mut self.loop_depth);
        let body = self.parse_block(&["end"]);
        self.loop_depth = saved_loops;

        self.expect_word("end")?;
        Ok(Stmt {
            kind: StmtKind::Function(FunctionDef {
                name,
                params,
                body,
                line,
            }),
            line,
        })
    }

    pub(super) fn parse_teardown(&mut self) -> Result<Teardown, SyntaxError> {
        let line = self.cur_line();
        self.advance();
        self.expect_word("do")?;
        let body = self.parse_block(&["end"]);
        self.expect_word("end")?;
        Ok(Teardown { body, line })
    }
}
