//! Name and label resolution.
//!
//! Binds every variable to a slot of its function's activation, every
//! `break`/`continue` to a loop, and every call to an entry of the
//! [`FunctionTable`]. The output is the tree the code generator consumes.

use std::collections::BTreeMap;

use tracing::debug;

use crate::ast::{BinaryOp, Expr, ExternDecl, FunctionDef, FunctionItem, Program, Stmt};
use crate::error::{CompileError, CompileResult, Pos};

/// Index of a storage cell inside one function activation.
pub type Slot = usize;

/// Identifies a `while` loop within its function, numbered in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Extern,
    Defined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub kind: FunctionKind,
    pub arity: usize,
    pub pos: Pos,
}

/// Every top-level function name, built once and shared by reference with
/// later stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionTable {
    entries: BTreeMap<String, Signature>,
}

impl FunctionTable {
    /// Register each item, rejecting a second declaration of the same name.
    pub fn build(program: &Program) -> CompileResult<Self> {
        let mut entries: BTreeMap<String, Signature> = BTreeMap::new();
        for item in &program.items {
            let kind = match item {
                FunctionItem::Extern(_) => FunctionKind::Extern,
                FunctionItem::Def(_) => FunctionKind::Defined,
            };
            if let Some(previous) = entries.get(item.name()) {
                let message = match (previous.kind, kind) {
                    (FunctionKind::Extern, FunctionKind::Extern) => {
                        format!("extern `{}` is declared twice", item.name())
                    }
                    (FunctionKind::Defined, FunctionKind::Defined) => {
                        format!("function `{}` is defined twice", item.name())
                    }
                    _ => format!(
                        "`{}` is both declared extern and defined (first at {})",
                        item.name(),
                        previous.pos
                    ),
                };
                return Err(CompileError::resolve(item.pos(), message));
            }
            entries.insert(
                item.name().to_string(),
                Signature {
                    kind,
                    arity: item.params().len(),
                    pos: item.pos(),
                },
            );
        }
        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&Signature> {
        self.entries.get(name)
    }

}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Extern(String),
    Function(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RExpr {
    Int(i64),
    Load(Slot),
    Binary {
        op: BinaryOp,
        lhs: Box<RExpr>,
        rhs: Box<RExpr>,
    },
    Call { callee: Callee, args: Vec<RExpr> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RStmt {
    Store { slot: Slot, value: RExpr },
    If {
        cond: RExpr,
        then_body: Vec<RStmt>,
        else_body: Vec<RStmt>,
    },
    While {
        id: LoopId,
        cond: RExpr,
        body: Vec<RStmt>,
    },
    Break(LoopId),
    Continue(LoopId),
    Expr(RExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFunction {
    pub name: String,
    /// Number of parameters; they occupy the first slots.
    pub params: usize,
    /// Slot names in slot order.
    pub slots: Vec<String>,
    pub loops: usize,
    pub body: Vec<RStmt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProgram {
    pub functions: Vec<ResolvedFunction>,
    pub externs: Vec<ExternDecl>,
    pub table: FunctionTable,
}

/// Resolve a parsed program.
pub fn resolve(program: &Program) -> CompileResult<ResolvedProgram> {
    let table = FunctionTable::build(program)?;
    check_main(&table)?;

    let mut functions = Vec::new();
    let mut externs = Vec::new();
    for item in &program.items {
        match item {
            FunctionItem::Extern(decl) => externs.push(decl.clone()),
            FunctionItem::Def(def) => functions.push(FunctionResolver::new(&table).function(def)?),
        }
    }
    debug!(
        functions = functions.len(),
        externs = externs.len(),
        "resolved program"
    );
    Ok(ResolvedProgram {
        functions,
        externs,
        table,
    })
}

fn check_main(table: &FunctionTable) -> CompileResult<()> {
    match table.get("main") {
        None => Err(CompileError::resolve(
            Pos::new(1, 1),
            "missing `main` function definition",
        )),
        Some(sig) if sig.kind == FunctionKind::Extern => Err(CompileError::resolve(
            sig.pos,
            "`main` must be defined, not declared extern",
        )),
        Some(sig) if sig.arity != 0 => Err(CompileError::resolve(
            sig.pos,
            format!("`main` must take no parameters, found {}", sig.arity),
        )),
        Some(_) => Ok(()),
    }
}

struct OpenLoop {
    label: Option<String>,
    id: LoopId,
}

/// Per-function walk: owns the slot list and the stack of open loops.
struct FunctionResolver<'t> {
    table: &'t FunctionTable,
    slots: Vec<String>,
    loops: Vec<OpenLoop>,
    next_loop: usize,
}

impl<'t> FunctionResolver<'t> {
    fn new(table: &'t FunctionTable) -> Self {
        Self {
            table,
            slots: Vec::new(),
            loops: Vec::new(),
            next_loop: 0,
        }
    }

    fn function(mut self, def: &FunctionDef) -> CompileResult<ResolvedFunction> {
        for param in &def.params {
            if self.lookup(param).is_some() {
                return Err(CompileError::resolve(
                    def.pos,
                    format!("duplicate parameter `{param}` in `{}`", def.name),
                ));
            }
            self.slots.push(param.clone());
        }
        let body = self.block(&def.body)?;
        debug!(
            function = %def.name,
            slots = self.slots.len(),
            loops = self.next_loop,
            "resolved function"
        );
        Ok(ResolvedFunction {
            name: def.name.clone(),
            params: def.params.len(),
            slots: self.slots,
            loops: self.next_loop,
            body,
        })
    }

    fn lookup(&self, name: &str) -> Option<Slot> {
        self.slots.iter().position(|slot| slot == name)
    }

    fn block(&mut self, stmts: &[Stmt]) -> CompileResult<Vec<RStmt>> {
        stmts.iter().map(|stmt| self.stmt(stmt)).collect()
    }

    fn stmt(&mut self, stmt: &Stmt) -> CompileResult<RStmt> {
        Ok(match stmt {
            Stmt::Assign { target, value, .. } => {
                // the right-hand side cannot see the slot it creates
                let value = self.expr(value)?;
                let slot = match self.lookup(target) {
                    Some(slot) => slot,
                    None => {
                        self.slots.push(target.clone());
                        self.slots.len() - 1
                    }
                };
                RStmt::Store { slot, value }
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => RStmt::If {
                cond: self.expr(cond)?,
                then_body: self.block(then_body)?,
                else_body: match else_body {
                    Some(body) => self.block(body)?,
                    None => Vec::new(),
                },
            },
            Stmt::While {
                label,
                cond,
                body,
                pos,
            } => {
                if let Some(name) = label {
                    if self.loops.iter().any(|l| l.label.as_deref() == Some(name.as_str())) {
                        return Err(CompileError::resolve(
                            *pos,
                            format!("loop label `{name}` shadows an enclosing loop"),
                        ));
                    }
                }
                let id = LoopId(self.next_loop);
                self.next_loop += 1;
                let cond = self.expr(cond)?;
                self.loops.push(OpenLoop {
                    label: label.clone(),
                    id,
                });
                let body = self.block(body);
                self.loops.pop();
                RStmt::While {
                    id,
                    cond,
                    body: body?,
                }
            }
            Stmt::Break { label, pos } => RStmt::Break(self.jump_target("break", label, *pos)?),
            Stmt::Continue { label, pos } => {
                RStmt::Continue(self.jump_target("continue", label, *pos)?)
            }
            Stmt::Expr(expr) => RStmt::Expr(self.expr(expr)?),
        })
    }

    fn jump_target(&self, keyword: &str, label: &Option<String>, pos: Pos) -> CompileResult<LoopId> {
        let found = match label {
            None => self.loops.last(),
            Some(name) => self
                .loops
                .iter()
                .rev()
                .find(|l| l.label.as_deref() == Some(name.as_str())),
        };
        match (found, label) {
            (Some(open), _) => Ok(open.id),
            (None, None) => Err(CompileError::resolve(
                pos,
                format!("`{keyword}` outside of a loop"),
            )),
            (None, Some(name)) => Err(CompileError::resolve(
                pos,
                format!("`{keyword} {name}` has no enclosing loop labeled `{name}`"),
            )),
        }
    }

    fn expr(&mut self, expr: &Expr) -> CompileResult<RExpr> {
        Ok(match expr {
            Expr::Int(value) => RExpr::Int(*value),
            Expr::Var { name, pos } => match self.lookup(name) {
                Some(slot) => RExpr::Load(slot),
                None => {
                    return Err(CompileError::resolve(
                        *pos,
                        format!("variable `{name}` is used before it is assigned"),
                    ))
                }
            },
            Expr::Binary { op, lhs, rhs } => RExpr::Binary {
                op: *op,
                lhs: Box::new(self.expr(lhs)?),
                rhs: Box::new(self.expr(rhs)?),
            },
            Expr::Call { callee, args, pos } => {
                let sig = self.table.get(callee).ok_or_else(|| {
                    CompileError::resolve(*pos, format!("call to undeclared function `{callee}`"))
                })?;
                if sig.arity != args.len() {
                    return Err(CompileError::resolve(
                        *pos,
                        format!(
                            "`{callee}` expects {} argument(s), got {}",
                            sig.arity,
                            args.len()
                        ),
                    ));
                }
                let callee = match sig.kind {
                    FunctionKind::Extern => Callee::Extern(callee.clone()),
                    FunctionKind::Defined => Callee::Function(callee.clone()),
                };
                let args = args
                    .iter()
                    .map(|arg| self.expr(arg))
                    .collect::<CompileResult<Vec<_>>>()?;
                RExpr::Call { callee, args }
            }
        })
    }
}
