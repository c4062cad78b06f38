//! kwdsl-core: front end of the kwdsl keyword test language.
//!
//! - [`lex()`] -- source text to a line-numbered token stream
//! - [`parse()`] / [`parse_recovering()`] -- tokens to a [`Program`] AST,
//!   collecting every syntax error in one pass
//! - [`parse_expression()`] -- a standalone expression, for conditions
//!   evaluated by keywords

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::{
    ArithOp, CompareOp, ElifClause, Expr, FunctionDef, FunctionParam, KeywordCall, Literal,
    LogicOp, Metadata, ParamItem, Program, RemoteCall, Stmt, StmtKind, Teardown,
};
pub use error::{ParseErrors, SyntaxError};
pub use lexer::{lex, Spanned, Token};
pub use parser::{parse, parse_expression, parse_recovering, ParseOutput, DEFAULT_MAX_ERRORS};
