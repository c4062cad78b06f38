//! AST for the keyword test language.
//!
//! The parser exclusively builds these nodes; the executor only reads them.
//! Every statement carries the source line of its first token.

use serde::Serialize;

// ──────────────────────────────────────────────
// Program (Start node)
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct Program {
    pub metadata: Vec<Metadata>,
    pub body: Vec<Stmt>,
    pub teardown: Option<Teardown>,
}

impl Program {
    /// Custom keyword definitions in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.body.iter().filter_map(|s| match &s.kind {
            StmtKind::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.iter().find_map(|m| match m {
            Metadata::Name { value, .. } => Some(value.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Teardown {
    pub body: Vec<Stmt>,
    pub line: u32,
}

// ──────────────────────────────────────────────
// Metadata
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metadata {
    Name { value: String, line: u32 },
    Description { value: String, line: u32 },
    Tags { tags: Vec<String>, line: u32 },
    Author { value: String, line: u32 },
    Date { value: String, line: u32 },
    Data { file: String, format: String, line: u32 },
    Import { path: String, line: u32 },
    RemoteImport { url: String, alias: String, line: u32 },
}

impl Metadata {
    pub fn line(&self) -> u32 {
        match self {
            Metadata::Name { line, .. }
            | Metadata::Description { line, .. }
            | Metadata::Tags { line, .. }
            | Metadata::Author { line, .. }
            | Metadata::Date { line, .. }
            | Metadata::Data { line, .. }
            | Metadata::Import { line, .. }
            | Metadata::RemoteImport { line, .. } => *line,
        }
    }
}

// ──────────────────────────────────────────────
// Statements
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum StmtKind {
    Assign {
        target: String,
        value: Expr,
    },
    AssignCall {
        target: String,
        call: KeywordCall,
    },
    AssignRemoteCall {
        target: String,
        call: RemoteCall,
    },
    For {
        var: String,
        start: Expr,
        end: Expr,
        body: Vec<Stmt>,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        elifs: Vec<ElifClause>,
        else_body: Option<Vec<Stmt>>,
    },
    Call(KeywordCall),
    RemoteCall(RemoteCall),
    Return {
        value: Option<Expr>,
    },
    Break,
    Continue,
    Function(FunctionDef),
}

impl StmtKind {
    /// Node kind used in diagnostics.
    pub fn node_name(&self) -> &'static str {
        match self {
            StmtKind::Assign { .. } => "Assignment",
            StmtKind::AssignCall { .. } => "AssignmentKeywordCall",
            StmtKind::AssignRemoteCall { .. } => "AssignmentRemoteKeywordCall",
            StmtKind::For { .. } => "ForLoop",
            StmtKind::If { .. } => "IfStatement",
            StmtKind::Call(_) => "KeywordCall",
            StmtKind::RemoteCall(_) => "RemoteKeywordCall",
            StmtKind::Return { .. } => "Return",
            StmtKind::Break => "Break",
            StmtKind::Continue => "Continue",
            StmtKind::Function(_) => "CustomKeyword",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ElifClause {
    pub cond: Expr,
    pub body: Vec<Stmt>,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordCall {
    pub name: String,
    pub args: Vec<ParamItem>,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteCall {
    pub alias: String,
    pub keyword: String,
    pub args: Vec<ParamItem>,
    pub line: u32,
}

impl RemoteCall {
    /// Name under which the remote keyword is registered locally.
    pub fn qualified_name(&self) -> String {
        format!("{}|{}", self.alias, self.keyword)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamItem {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<FunctionParam>,
    pub body: Vec<Stmt>,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionParam {
    pub name: String,
    pub default: Option<Expr>,
}

// ──────────────────────────────────────────────
// Expressions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "expr", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Quoted string; `${...}` references inside are interpolated at runtime.
    Str(String),
    Date(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    Literal {
        value: Literal,
    },
    /// A bare `${...}` reference
    Placeholder {
        text: String,
    },
    /// A bare identifier: a variable, or its own text when unresolved
    Var {
        name: String,
    },
    List {
        items: Vec<Expr>,
    },
    Dict {
        items: Vec<(Expr, Expr)>,
    },
    Neg {
        operand: Box<Expr>,
    },
    Not {
        operand: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logic {
        op: LogicOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        call: KeywordCall,
    },
    RemoteCall {
        call: RemoteCall,
    },
}

impl Expr {
    pub fn lit(value: Literal) -> Expr {
        Expr::Literal { value }
    }
}
