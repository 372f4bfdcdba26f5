//! Built-in runtime compiled into every generated module.
//!
//! Each built-in is a small LLVM function defined next to the user's code;
//! they lean on the host libc `printf` for formatting and output. Process
//! entry is a libc-visible `main` that calls the user's `main` and returns 0,
//! so libc flushes stdout on exit.

use inkwell::builder::Builder;
use inkwell::context::Context as LlvmContext;
use inkwell::module::{Linkage, Module};
use inkwell::types::BasicMetadataTypeEnum;
use inkwell::values::FunctionValue;
use inkwell::AddressSpace;

use crate::error::{CompileError, CompileResult};

/// Symbol prefix for user-defined functions, keeping them clear of libc.
pub const FUNCTION_PREFIX: &str = "lambda_fn_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    /// `printf("%ld\n", x)`
    PrintInt,
}

/// A built-in extern the source program may declare.
#[derive(Debug)]
pub struct Builtin {
    /// Name as written in `func name(..);`.
    pub name: &'static str,
    pub arity: usize,
    /// Symbol of the LLVM function implementing it.
    pub symbol: &'static str,
    body: Body,
}

const PRINT_INT: Builtin = Builtin {
    name: "print_int",
    arity: 1,
    symbol: "lambda_rt_print_int",
    body: Body::PrintInt,
};

pub const BUILTINS: &[Builtin] = &[PRINT_INT];

/// Find the built-in implementing an extern name.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// Symbol of a user-defined function.
pub fn function_symbol(name: &str) -> String {
    format!("{FUNCTION_PREFIX}{name}")
}

/// declare i32 @printf(i8*, ...)
pub fn declare_printf<'ctx>(ctx: &'ctx LlvmContext, module: &Module<'ctx>) -> FunctionValue<'ctx> {
    let i8ptr_t = ctx.i8_type().ptr_type(AddressSpace::default());
    let printf_ty = ctx.i32_type().fn_type(&[i8ptr_t.into()], true);
    module.add_function("printf", printf_ty, Some(Linkage::External))
}

impl Builtin {
    /// Define this built-in in `module`. Like user functions it takes and
    /// returns `i64`, and always returns 0.
    pub fn define<'ctx>(
        &self,
        ctx: &'ctx LlvmContext,
        module: &Module<'ctx>,
        builder: &Builder<'ctx>,
        printf: FunctionValue<'ctx>,
    ) -> CompileResult<FunctionValue<'ctx>> {
        let i64_t = ctx.i64_type();
        let params: Vec<BasicMetadataTypeEnum> = vec![i64_t.into(); self.arity];
        let function =
            module.add_function(self.symbol, i64_t.fn_type(&params, false), Some(Linkage::Internal));
        builder.position_at_end(ctx.append_basic_block(function, "entry"));

        match self.body {
            Body::PrintInt => {
                let fmt = builder
                    .build_global_string_ptr("%ld\n", ".rt.fmt_int")?
                    .as_pointer_value();
                let value = function.get_nth_param(0).ok_or_else(|| {
                    CompileError::codegen(format!("`{}` is missing its parameter", self.symbol))
                })?;
                builder.build_call(printf, &[fmt.into(), value.into()], "")?;
            }
        }

        builder.build_return(Some(&i64_t.const_zero()))?;
        Ok(function)
    }
}

/// Define the process entry point, which runs the program's `main`.
pub fn define_entry<'ctx>(
    ctx: &'ctx LlvmContext,
    module: &Module<'ctx>,
    builder: &Builder<'ctx>,
    user_main: FunctionValue<'ctx>,
) -> CompileResult<FunctionValue<'ctx>> {
    let i32_t = ctx.i32_type();
    let main = module.add_function("main", i32_t.fn_type(&[], false), Some(Linkage::External));
    builder.position_at_end(ctx.append_basic_block(main, "entry"));
    builder.build_call(user_main, &[], "")?;
    builder.build_return(Some(&i32_t.const_zero()))?;
    Ok(main)
}
