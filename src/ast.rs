//! Abstract syntax tree nodes for lambda programs.
use crate::error::Pos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Add,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    // decimal integer literal
    Int(i64),
    // variable reference
    Var { name: String, pos: Pos },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
        pos: Pos,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `name <- expr;` creates the variable on first assignment.
    Assign {
        target: String,
        value: Expr,
        pos: Pos,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        label: Option<String>,
        cond: Expr,
        body: Vec<Stmt>,
        pos: Pos,
    },
    Break { label: Option<String>, pos: Pos },
    Continue { label: Option<String>, pos: Pos },
    Expr(Expr),
}

/// Body-less `func name(params);` bound to a runtime built-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternDecl {
    pub name: String,
    pub params: Vec<String>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionItem {
    Extern(ExternDecl),
    Def(FunctionDef),
}

impl FunctionItem {
    pub fn name(&self) -> &str {
        match self {
            FunctionItem::Extern(decl) => &decl.name,
            FunctionItem::Def(def) => &def.name,
        }
    }

    pub fn params(&self) -> &[String] {
        match self {
            FunctionItem::Extern(decl) => &decl.params,
            FunctionItem::Def(def) => &def.params,
        }
    }

    pub fn pos(&self) -> Pos {
        match self {
            FunctionItem::Extern(decl) => decl.pos,
            FunctionItem::Def(def) => def.pos,
        }
    }
}

/// Top-level container for a parsed program, items in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub items: Vec<FunctionItem>,
}
