//! LLVM IR generation for resolved programs using Inkwell.
//!
//! Every value is an `i64`. Each slot gets one `alloca` in its function's
//! entry block, zeroed (or loaded from the matching parameter) before the
//! body runs; `if`/`while`/`break`/`continue` become basic blocks and
//! branches. The finished module is written out for the host target.

use std::collections::HashMap;
use std::path::Path;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context as LlvmContext;
use inkwell::module::{Linkage, Module};
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine, TargetTriple,
};
use inkwell::types::BasicMetadataTypeEnum;
use inkwell::values::{BasicMetadataValueEnum, FunctionValue, IntValue, PointerValue};
use inkwell::{IntPredicate, OptimizationLevel};
use tracing::debug;

use crate::ast::BinaryOp;
use crate::error::{CompileError, CompileResult};
use crate::resolve::{Callee, LoopId, RExpr, RStmt, ResolvedFunction, ResolvedProgram, Slot};
use crate::runtime::{self, Builtin};

/// Blocks a `break`/`continue` can branch to.
struct LoopBlocks<'ctx> {
    id: LoopId,
    cond: BasicBlock<'ctx>,
    end: BasicBlock<'ctx>,
}

/// Generates LLVM IR for a program and keeps the per-function state.
pub struct Codegen<'ctx> {
    ctx: &'ctx LlvmContext,
    builder: Builder<'ctx>,
    module: Module<'ctx>,
    printf: FunctionValue<'ctx>,
    /// User functions by source name.
    functions: HashMap<String, FunctionValue<'ctx>>,
    /// Runtime built-ins by extern name.
    externs: HashMap<String, FunctionValue<'ctx>>,
    /// One `alloca` per slot of the function being generated.
    slots: Vec<PointerValue<'ctx>>,
    loops: Vec<LoopBlocks<'ctx>>,
    ifs: usize,
}

impl<'ctx> Codegen<'ctx> {
    /// Create a new code generator configured for the supplied target triple.
    pub fn new(ctx: &'ctx LlvmContext, triple: &TargetTriple) -> Self {
        let module = ctx.create_module("lambda");
        module.set_triple(triple);
        let builder = ctx.create_builder();
        let printf = runtime::declare_printf(ctx, &module);

        Self {
            ctx,
            builder,
            module,
            printf,
            functions: HashMap::new(),
            externs: HashMap::new(),
            slots: Vec::new(),
            loops: Vec::new(),
            ifs: 0,
        }
    }

    /// Populate the module with the runtime, every user function and the
    /// process entry point, then verify it.
    pub fn emit_program(&mut self, program: &ResolvedProgram) -> CompileResult<()> {
        for builtin in bind_externs(program)? {
            let function = builtin.define(self.ctx, &self.module, &self.builder, self.printf)?;
            self.externs.insert(builtin.name.to_string(), function);
        }

        // declare everything first; calls may precede the callee's definition
        let i64_t = self.ctx.i64_type();
        for function in &program.functions {
            let params: Vec<BasicMetadataTypeEnum> = vec![i64_t.into(); function.params];
            let value = self.module.add_function(
                &runtime::function_symbol(&function.name),
                i64_t.fn_type(&params, false),
                Some(Linkage::Internal),
            );
            self.functions.insert(function.name.clone(), value);
        }
        for function in &program.functions {
            self.function(function)?;
        }

        let user_main = self.function_value("main")?;
        runtime::define_entry(self.ctx, &self.module, &self.builder, user_main)?;

        self.module
            .verify()
            .map_err(|err| CompileError::codegen(format!("invalid module: {err}")))?;
        debug!(
            functions = program.functions.len(),
            builtins = self.externs.len(),
            "generated module"
        );
        Ok(())
    }

    /// Textual LLVM IR of the module.
    pub fn print_ir(&self) -> String {
        self.module.print_to_string().to_string()
    }

    pub fn write_ir(&self, path: &Path) -> CompileResult<()> {
        self.module
            .print_to_file(path)
            .map_err(|err| CompileError::codegen(format!("writing {}: {err}", path.display())))
    }

    /// Write a native object file using the host target machine.
    pub fn write_object(&self, triple: &TargetTriple, path: &Path) -> CompileResult<()> {
        self.write_native(triple, FileType::Object, path)
    }

    /// Write native assembly using the host target machine.
    pub fn write_assembly(&self, triple: &TargetTriple, path: &Path) -> CompileResult<()> {
        self.write_native(triple, FileType::Assembly, path)
    }

    /// Native assembly as text.
    pub fn assembly(&self, triple: &TargetTriple) -> CompileResult<String> {
        let buffer = target_machine(triple)?
            .write_to_memory_buffer(&self.module, FileType::Assembly)
            .map_err(|err| CompileError::codegen(err.to_string()))?;
        Ok(String::from_utf8_lossy(buffer.as_slice()).into_owned())
    }

    fn write_native(&self, triple: &TargetTriple, kind: FileType, path: &Path) -> CompileResult<()> {
        debug!(path = %path.display(), "writing native code");
        target_machine(triple)?
            .write_to_file(&self.module, kind, path)
            .map_err(|err| CompileError::codegen(format!("writing {}: {err}", path.display())))
    }

    fn function_value(&self, name: &str) -> CompileResult<FunctionValue<'ctx>> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::codegen(format!("function `{name}` was never declared")))
    }

    fn function(&mut self, function: &ResolvedFunction) -> CompileResult<()> {
        let value = self.function_value(&function.name)?;
        let i64_t = self.ctx.i64_type();
        self.builder
            .position_at_end(self.ctx.append_basic_block(value, "entry"));
        self.slots.clear();
        self.loops.clear();
        self.ifs = 0;

        for (index, name) in function.slots.iter().enumerate() {
            let slot = self.builder.build_alloca(i64_t, name)?;
            let initial = if index < function.params {
                value.get_nth_param(index as u32).ok_or_else(|| {
                    CompileError::codegen(format!(
                        "function `{}` is missing parameter {index}",
                        function.name
                    ))
                })?
            } else {
                i64_t.const_zero().into()
            };
            self.builder.build_store(slot, initial)?;
            self.slots.push(slot);
        }

        self.block(&function.body)?;
        if self.is_open()? {
            self.builder.build_return(Some(&i64_t.const_zero()))?;
        }
        Ok(())
    }

    fn block(&mut self, stmts: &[RStmt]) -> CompileResult<()> {
        stmts.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&mut self, stmt: &RStmt) -> CompileResult<()> {
        match stmt {
            RStmt::Store { slot, value } => {
                let value = self.expr(value)?;
                self.builder.build_store(self.slot(*slot)?, value)?;
            }
            RStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let n = self.ifs;
                self.ifs += 1;
                let test = self.truth(cond)?;
                let then_bb = self.append_block(&format!("if{n}.then"))?;
                let else_bb = self.append_block(&format!("if{n}.else"))?;
                let end_bb = self.append_block(&format!("if{n}.end"))?;
                self.builder
                    .build_conditional_branch(test, then_bb, else_bb)?;

                self.builder.position_at_end(then_bb);
                self.block(then_body)?;
                self.fall_through(end_bb)?;

                self.builder.position_at_end(else_bb);
                self.block(else_body)?;
                self.fall_through(end_bb)?;

                self.builder.position_at_end(end_bb);
            }
            RStmt::While { id, cond, body } => {
                let cond_bb = self.append_block(&format!("loop{}.cond", id.0))?;
                let body_bb = self.append_block(&format!("loop{}.body", id.0))?;
                let end_bb = self.append_block(&format!("loop{}.end", id.0))?;
                self.builder.build_unconditional_branch(cond_bb)?;

                self.builder.position_at_end(cond_bb);
                let test = self.truth(cond)?;
                self.builder
                    .build_conditional_branch(test, body_bb, end_bb)?;

                self.builder.position_at_end(body_bb);
                self.loops.push(LoopBlocks {
                    id: *id,
                    cond: cond_bb,
                    end: end_bb,
                });
                let body = self.block(body);
                self.loops.pop();
                body?;
                self.fall_through(cond_bb)?;

                self.builder.position_at_end(end_bb);
            }
            RStmt::Break(id) => {
                let target = self.loop_blocks(*id)?.end;
                self.jump(target)?;
            }
            RStmt::Continue(id) => {
                let target = self.loop_blocks(*id)?.cond;
                self.jump(target)?;
            }
            RStmt::Expr(expr) => {
                self.expr(expr)?;
            }
        }
        Ok(())
    }

    fn loop_blocks(&self, id: LoopId) -> CompileResult<&LoopBlocks<'ctx>> {
        self.loops
            .iter()
            .rev()
            .find(|l| l.id == id)
            .ok_or_else(|| CompileError::codegen(format!("unresolved jump target for loop {}", id.0)))
    }

    fn slot(&self, slot: Slot) -> CompileResult<PointerValue<'ctx>> {
        self.slots
            .get(slot)
            .copied()
            .ok_or_else(|| CompileError::codegen(format!("slot {slot} has no storage")))
    }

    fn current_function(&self) -> CompileResult<FunctionValue<'ctx>> {
        self.builder
            .get_insert_block()
            .and_then(|bb| bb.get_parent())
            .ok_or_else(|| CompileError::codegen("builder is not inside a function"))
    }

    fn append_block(&self, name: &str) -> CompileResult<BasicBlock<'ctx>> {
        Ok(self.ctx.append_basic_block(self.current_function()?, name))
    }

    /// Whether the current block still needs a terminator.
    fn is_open(&self) -> CompileResult<bool> {
        let block = self
            .builder
            .get_insert_block()
            .ok_or_else(|| CompileError::codegen("builder is not inside a function"))?;
        Ok(block.get_terminator().is_none())
    }

    /// Branch to `target` unless the current block already ended in a jump.
    fn fall_through(&self, target: BasicBlock<'ctx>) -> CompileResult<()> {
        if self.is_open()? {
            self.builder.build_unconditional_branch(target)?;
        }
        Ok(())
    }

    /// Branch to `target`; statements after a jump land in a fresh block
    /// with no predecessors.
    fn jump(&self, target: BasicBlock<'ctx>) -> CompileResult<()> {
        self.builder.build_unconditional_branch(target)?;
        let rest = self.append_block("dead")?;
        self.builder.position_at_end(rest);
        Ok(())
    }

    /// Evaluate `cond` as a branch condition: any non-zero value is true.
    fn truth(&self, cond: &RExpr) -> CompileResult<IntValue<'ctx>> {
        let value = self.expr(cond)?;
        let zero = self.ctx.i64_type().const_zero();
        Ok(self
            .builder
            .build_int_compare(IntPredicate::NE, value, zero, "cond")?)
    }

    fn expr(&self, expr: &RExpr) -> CompileResult<IntValue<'ctx>> {
        let i64_t = self.ctx.i64_type();
        Ok(match expr {
            RExpr::Int(value) => i64_t.const_int(*value as u64, true),
            RExpr::Load(slot) => self
                .builder
                .build_load(self.slot(*slot)?, "load")?
                .into_int_value(),
            RExpr::Binary { op, lhs, rhs } => {
                let l = self.expr(lhs)?;
                let r = self.expr(rhs)?;
                match op {
                    BinaryOp::Add => self.builder.build_int_add(l, r, "add")?,
                    BinaryOp::Eq => {
                        let bit = self.builder.build_int_compare(IntPredicate::EQ, l, r, "eq")?;
                        self.builder.build_int_z_extend(bit, i64_t, "eq.zext")?
                    }
                    BinaryOp::NotEq => {
                        let bit = self.builder.build_int_compare(IntPredicate::NE, l, r, "ne")?;
                        self.builder.build_int_z_extend(bit, i64_t, "ne.zext")?
                    }
                }
            }
            RExpr::Call { callee, args } => {
                let function = match callee {
                    Callee::Extern(name) => self.externs.get(name).copied().ok_or_else(|| {
                        CompileError::codegen(format!("extern `{name}` is not bound"))
                    })?,
                    Callee::Function(name) => self.function_value(name)?,
                };
                let args = args
                    .iter()
                    .map(|arg| self.expr(arg).map(BasicMetadataValueEnum::from))
                    .collect::<CompileResult<Vec<_>>>()?;
                self.builder
                    .build_call(function, &args, "call")?
                    .try_as_basic_value()
                    .left()
                    .ok_or_else(|| CompileError::codegen("call produced no value"))?
                    .into_int_value()
            }
        })
    }
}

/// Map every extern declaration onto its runtime implementation.
fn bind_externs(program: &ResolvedProgram) -> CompileResult<Vec<&'static Builtin>> {
    program
        .externs
        .iter()
        .map(|decl| {
            let builtin = runtime::lookup(&decl.name).ok_or_else(|| {
                CompileError::codegen(format!(
                    "extern `{}` has no runtime implementation",
                    decl.name
                ))
            })?;
            if builtin.arity != decl.params.len() {
                return Err(CompileError::codegen(format!(
                    "extern `{}` is declared with {} parameter(s) but the runtime provides {}",
                    decl.name,
                    decl.params.len(),
                    builtin.arity
                )));
            }
            Ok(builtin)
        })
        .collect()
}

fn target_machine(triple: &TargetTriple) -> CompileResult<TargetMachine> {
    Target::initialize_native(&InitializationConfig::default()).map_err(CompileError::codegen)?;
    let target = Target::from_triple(triple).map_err(|e| CompileError::codegen(e.to_string()))?;
    // PIC so the host driver can link a position-independent executable
    target
        .create_target_machine(
            triple,
            "generic",
            "",
            OptimizationLevel::None,
            RelocMode::PIC,
            CodeModel::Default,
        )
        .ok_or_else(|| CompileError::codegen("create target machine failed"))
}

/// Grab the default target triple for the build machine.
pub fn host_triple() -> TargetTriple {
    TargetMachine::get_default_triple()
}
