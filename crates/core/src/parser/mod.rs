//! Recursive-descent parser with statement-level error recovery.
//!
//! A simple statement may not be followed by another token on the same line,
//! and the operand after a binary operator, `=` or a parameter `:` must start
//! on the operator's line. Errors are recorded and the parser resynchronizes
//! at the next statement boundary, so one pass reports every independent
//! syntax error in a file.

use crate::ast::{Expr, Program, Stmt};
use crate::error::{ParseErrors, SyntaxError};
use crate::lexer::{self, Spanned, Token};

mod expressions;
mod metadata;
mod statements;

/// Words the parser treats structurally; never valid as variable names.
pub(crate) const RESERVED: &[&str] = &[
    "for", "in", "range", "do", "end", "if", "elif", "else", "function", "return", "break",
    "continue", "and", "or", "not",
];

/// Default maximum number of errors collected before the parser gives up.
pub const DEFAULT_MAX_ERRORS: usize = 20;

/// Result of a recovering parse: a best-effort program plus every error.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub program: Program,
    pub errors: Vec<SyntaxError>,
}

impl ParseOutput {
    pub fn into_result(self) -> Result<Program, ParseErrors> {
        if self.errors.is_empty() {
            Ok(self.program)
        } else {
            Err(ParseErrors {
                errors: self.errors,
            })
        }
    }
}

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

pub(crate) struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    errors: Vec<SyntaxError>,
    max_errors: usize,
    loop_depth: usize,
    block_depth: usize,
    /// Token index where the statement being parsed began.
    stmt_start: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned], max_errors: usize) -> Self {
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
            max_errors,
            loop_depth: 0,
            block_depth: 0,
            stmt_start: 0,
        }
    }

    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.cur().token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[i].token
    }

    fn cur_line(&self) -> u32 {
        self.cur().line
    }

    /// Line of the most recently consumed token.
    fn prev_line(&self) -> u32 {
        if self.pos == 0 {
            return 0;
        }
        self.tokens[(self.pos - 1).min(self.tokens.len() - 1)].line
    }

    fn advance(&mut self) -> &Spanned {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn at_eof(&self) -> bool {
        self.peek() == &Token::Eof
    }

    /// An error at the current token. Once a statement has consumed tokens,
    /// an offending token on a later line means the statement itself was left
    /// incomplete, so the error belongs to the line where it stopped.
    fn err(&self, msg: impl Into<String>) -> SyntaxError {
        let line = if self.pos > self.stmt_start && self.cur_line() > self.prev_line() {
            self.prev_line()
        } else {
            self.cur_line()
        };
        SyntaxError::parse(line, msg)
    }

    fn begin_statement(&mut self) {
        self.stmt_start = self.pos;
    }

    /// The operand following `after` must start on the same line.
    fn operand_on_same_line(&self, after: &str) -> Result<(), SyntaxError> {
        if self.at_eof() || self.cur_line() > self.prev_line() {
            Err(SyntaxError::parse(
                self.prev_line(),
                format!("expected expression after {}", after),
            ))
        } else {
            Ok(())
        }
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(self.peek(), Token::Word(x) if x == w)
    }

    fn is_meta(&self, name: &str) -> bool {
        matches!(self.peek(), Token::Meta(x) if x == name)
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Token, what: &str) -> Result<(), SyntaxError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.err(format!("expected {}, got {}", what, describe(self.peek()))))
        }
    }

    fn expect_word(&mut self, expected: &str) -> Result<u32, SyntaxError> {
        let line = self.cur_line();
        if self.is_word(expected) {
            self.advance();
            return Ok(line);
        }
        Err(self.err(format!(
            "expected '{}', got {}",
            expected,
            describe(self.peek())
        )))
    }

    /// An identifier that is not a reserved word.
    fn take_ident(&mut self) -> Result<String, SyntaxError> {
        match self.peek().clone() {
            Token::Word(w) if !RESERVED.contains(&w.as_str()) => {
                self.advance();
                Ok(w)
            }
            other => Err(self.err(format!("expected identifier, got {}", describe(&other)))),
        }
    }

    fn take_str(&mut self) -> Result<String, SyntaxError> {
        if let Token::Str(s) = self.peek().clone() {
            self.advance();
            Ok(s)
        } else {
            Err(self.err(format!(
                "expected string literal, got {}",
                describe(self.peek())
            )))
        }
    }

    fn record(&mut self, e: SyntaxError) {
        if !self.halted() {
            self.errors.push(e);
        }
    }

    fn halted(&self) -> bool {
        self.errors.len() >= self.max_errors
    }

    /// Require the statement just parsed to end its line.
    fn expect_statement_end(&self) -> Result<(), SyntaxError> {
        if self.at_eof() || self.cur_line() > self.prev_line() {
            Ok(())
        } else {
            Err(self.err(format!(
                "unexpected {} after end of statement",
                describe(self.peek())
            )))
        }
    }
}

// ──────────────────────────────────────────────
// Recovery
// ──────────────────────────────────────────────

impl<'a> Parser<'a> {
    /// Could the current token begin a statement?
    fn at_statement_start(&self) -> bool {
        match self.peek() {
            Token::LBracket => true,
            Token::Word(w) => match w.as_str() {
                "for" | "if" | "function" | "return" | "break" | "continue" => true,
                w if RESERVED.contains(&w) => false,
                _ => matches!(self.peek_at(1), Token::Assign | Token::Pipe),
            },
            _ => false,
        }
    }

    /// Skip tokens after an error until a safe point: a statement start on a
    /// later line, a block terminator at the current nesting level,
    /// `@teardown`, or end of input. A `do ... end` block opened while
    /// skipping is skipped whole, so a broken block header discards its body.
    fn synchronize(&mut self, error_line: u32) {
        let mut depth: usize = 0;
        let mut elif_header = false;
        loop {
            let tok = self.peek().clone();
            match &tok {
                Token::Eof => return,
                Token::Meta(m) if m == "teardown" && depth == 0 => return,
                Token::Word(w) => match w.as_str() {
                    "do" => {
                        if elif_header {
                            elif_header = false;
                        } else {
                            depth += 1;
                        }
                    }
                    "end" => {
                        if depth == 0 {
                            return;
                        }
                        depth -= 1;
                        if depth == 0 {
                            self.advance();
                            if self.cur_line() > error_line && self.at_statement_start() {
                                return;
                            }
                            continue;
                        }
                    }
                    "elif" if depth > 0 => elif_header = true,
                    "elif" | "else" if depth == 0 => return,
                    _ => {
                        if depth == 0 && self.cur_line() > error_line && self.at_statement_start()
                        {
                            return;
                        }
                    }
                },
                _ => {
                    if depth == 0 && self.cur_line() > error_line && self.at_statement_start() {
                        return;
                    }
                }
            }
            self.advance();
        }
    }
}

// ──────────────────────────────────────────────
// Program
// ──────────────────────────────────────────────

impl<'a> Parser<'a> {
    fn parse_program(&mut self) -> Program {
        let mut program = Program::default();
        while !self.at_eof() && !self.halted() {
            self.begin_statement();
            if self.is_meta("teardown") {
                match self.parse_teardown() {
                    Ok(t) => {
                        if program.teardown.is_some() {
                            self.record(SyntaxError::parse(t.line, "duplicate @teardown block"));
                        } else {
                            program.teardown = Some(t);
                        }
                    }
                    Err(e) => {
                        let line = e.line;
                        self.record(e);
                        self.synchronize(line);
                        self.skip_stray_end();
                    }
                }
                if !self.at_eof() && !self.halted() {
                    self.begin_statement();
                    self.record(self.err("@teardown must be the last block in the file"));
                    self.synchronize(self.cur_line());
                    self.skip_stray_end();
                }
                continue;
            }

            if matches!(self.peek(), Token::Meta(_)) {
                if !program.body.is_empty() {
                    self.record(self.err("metadata must precede executable statements"));
                }
                match self.parse_metadata() {
                    Ok(m) => program.metadata.push(m),
                    Err(e) => {
                        let line = e.line;
                        self.record(e);
                        self.synchronize(line);
                        self.skip_stray_end();
                    }
                }
                continue;
            }

            match self.parse_statement() {
                Ok(stmt) => program.body.push(stmt),
                Err(e) => {
                    let line = e.line;
                    self.record(e);
                    self.synchronize(line);
                    self.skip_stray_end();
                }
            }
        }
        program
    }

    /// At top level an `end` left over by recovery belongs to the broken
    /// block; consume it instead of reporting it again.
    fn skip_stray_end(&mut self) {
        while self.is_word("end") || self.is_word("elif") || self.is_word("else") {
            let line = self.cur_line();
            self.advance();
            self.synchronize(line);
        }
    }

    /// Parse statements until one of `terminators` (not consumed).
    /// Errors inside the block are recorded and parsing resumes at the next
    /// statement in the same block.
    fn parse_block(&mut self, terminators: &[&str]) -> Vec<Stmt> {
        let mut body = Vec::new();
        self.block_depth += 1;
        loop {
            if self.at_eof() || self.halted() || self.is_meta("teardown") {
                break;
            }
            if terminators.iter().any(|t| self.is_word(t)) {
                break;
            }
            let start = self.pos;
            self.begin_statement();
            match self.parse_statement() {
                Ok(s) => body.push(s),
                Err(e) => {
                    let line = e.line;
                    self.record(e);
                    self.synchronize(line);
                    if self.pos == start {
                        self.advance();
                    }
                }
            }
        }
        self.block_depth -= 1;
        body
    }
}

// ──────────────────────────────────────────────
// Entry points
// ──────────────────────────────────────────────

/// Lex and parse `src`, collecting every lexical and syntax error.
pub fn parse_recovering(src: &str, max_errors: usize) -> ParseOutput {
    let (tokens, mut errors) = lexer::lex(src);
    let mut p = Parser::new(&tokens, max_errors.max(1));
    let program = p.parse_program();
    errors.extend(p.errors);
    errors.sort_by_key(|e| e.line);
    errors.truncate(max_errors.max(1));
    ParseOutput { program, errors }
}

/// Parse `src`; any recorded error makes the whole parse fail.
pub fn parse(src: &str) -> Result<Program, ParseErrors> {
    parse_recovering(src, DEFAULT_MAX_ERRORS).into_result()
}

/// Parse a standalone expression such as a retry success condition.
pub fn parse_expression(src: &str) -> Result<Expr, ParseErrors> {
    let (tokens, mut errors) = lexer::lex(src);
    if errors.is_empty() {
        let mut p = Parser::new(&tokens, DEFAULT_MAX_ERRORS);
        match p.parse_expr() {
            Ok(expr) if p.at_eof() => return Ok(expr),
            Ok(_) => errors.push(p.err(format!(
                "unexpected {} after expression",
                describe(p.peek())
            ))),
            Err(e) => errors.push(e),
        }
    }
    Err(ParseErrors { errors })
}

/// Human-readable token description for diagnostics.
pub(crate) fn describe(tok: &Token) -> String {
    match tok {
        Token::Word(w) => format!("'{}'", w),
        Token::Str(s) => format!("string \"{}\"", s),
        Token::Int(n) => format!("number {}", n),
        Token::Float(f) => format!("number {}", f),
        Token::Date(d) => format!("date {}", d),
        Token::Placeholder(p) => format!("reference {}", p),
        Token::Meta(m) => format!("'@{}'", m),
        Token::LBracket => "'['".into(),
        Token::RBracket => "']'".into(),
        Token::LParen => "'('".into(),
        Token::RParen => "')'".into(),
        Token::LBrace => "'{'".into(),
        Token::RBrace => "'}'".into(),
        Token::Colon => "':'".into(),
        Token::Comma => "','".into(),
        Token::Assign => "'='".into(),
        Token::Pipe => "'|'".into(),
        Token::Plus => "'+'".into(),
        Token::Minus => "'-'".into(),
        Token::Star => "'*'".into(),
        Token::Slash => "'/'".into(),
        Token::Percent => "'%'".into(),
        Token::Eq => "'=='".into(),
        Token::Neq => "'!='".into(),
        Token::Lt => "'<'".into(),
        Token::Lte => "'<='".into(),
        Token::Gt => "'>'".into(),
        Token::Gte => "'>='".into(),
        Token::Eof => "end of input".into(),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
