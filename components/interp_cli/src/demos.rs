//! Bundled programs
//!
//! Each demo is a small class assembled with [`CodeBuilder`] and loaded into
//! the VM under [`DEMO_CLASS`]. They exercise the paths worth watching with
//! the diagnostics flags: loops and safepoint polls, recursion, exception
//! unwinding across frames, native calls and stack overflow.

use bytecode_system::{Bytecode, ClassDefinition, CodeBuilder, MethodDefinition};
use clap::ValueEnum;
use core_types::{AccessFlags, VmResult};
use interpreter::Vm;

/// Holder class of every demo.
pub const DEMO_CLASS: &str = "demo/Main";

/// A bundled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// `sum(n)`: 1 + 2 + ... + n in a loop
    Sum,
    /// `fib(n)`: naive recursive Fibonacci
    Fib,
    /// `divide(a, b)`: a / b, or -1 when the callee throws
    Divide,
    /// `square(n)`: n * n through a native method
    Native,
    /// `recurse(n)`: unbounded recursion
    Overflow,
}

impl Demo {
    /// Method called by `run`.
    pub fn entry(self) -> &'static str {
        match self {
            Demo::Sum => "sum",
            Demo::Fib => "fib",
            Demo::Divide => "divide",
            Demo::Native => "square",
            Demo::Overflow => "recurse",
        }
    }

    /// Arguments used when none are given.
    pub fn default_args(self) -> &'static [i32] {
        match self {
            Demo::Sum => &[100],
            Demo::Fib => &[15],
            Demo::Divide => &[7, 0],
            Demo::Native => &[12],
            Demo::Overflow => &[0],
        }
    }

    /// `given` padded with defaults to the entry's arity.
    pub fn arguments(self, given: &[i32]) -> Vec<i32> {
        let defaults = self.default_args();
        (0..defaults.len())
            .map(|i| given.get(i).copied().unwrap_or(defaults[i]))
            .collect()
    }

    /// The demo's class.
    pub fn class(self) -> VmResult<ClassDefinition> {
        match self {
            Demo::Sum => sum_class(),
            Demo::Fib => fib_class(),
            Demo::Divide => divide_class(),
            Demo::Native => native_class(),
            Demo::Overflow => overflow_class(),
        }
    }

    /// Load the class and bind its natives.
    pub fn install(self, vm: &mut Vm) -> VmResult<()> {
        vm.load_class(&self.class()?)?;
        if self == Demo::Native {
            // SAFETY: `multiply` matches the (II)I native calling convention
            // and is a plain function that lives for the whole program.
            unsafe { vm.register_native(DEMO_CLASS, "mul", multiply as *const (), "(II)I")? };
        }
        Ok(())
    }
}

fn static_method(name: &str, descriptor: &str, max_locals: u16, code: &CodeBuilder) -> VmResult<MethodDefinition> {
    Ok(MethodDefinition::new(name, descriptor)
        .with_access(AccessFlags::PUBLIC | AccessFlags::STATIC)
        .with_max_locals(max_locals)
        .with_code(code.finish()?))
}

fn sum_class() -> VmResult<ClassDefinition> {
    // locals: n, acc, i
    let mut code = CodeBuilder::new();
    let head = code.new_label();
    let done = code.new_label();
    code.iconst(0).istore(1).iconst(1).istore(2);
    code.bind(head);
    code.iload(2).iload(0).branch(Bytecode::IfIcmpgt, done);
    code.iload(1).iload(2).op(Bytecode::Iadd).istore(1);
    code.iinc(2, 1).branch(Bytecode::Goto, head);
    code.bind(done);
    code.iload(1).op(Bytecode::Ireturn);
    Ok(ClassDefinition::new(DEMO_CLASS).with_method(static_method("sum", "(I)I", 3, &code)?))
}

fn fib_class() -> VmResult<ClassDefinition> {
    let mut class = ClassDefinition::new(DEMO_CLASS);
    let fib = class.add_method_ref(DEMO_CLASS, "fib", "(I)I");
    let mut code = CodeBuilder::new();
    let recurse = code.new_label();
    code.iload(0).iconst(2).branch(Bytecode::IfIcmpge, recurse);
    code.iload(0).op(Bytecode::Ireturn);
    code.bind(recurse);
    code.iload(0).iconst(1).op(Bytecode::Isub).op_u2(Bytecode::Invokestatic, fib);
    code.iload(0).iconst(2).op(Bytecode::Isub).op_u2(Bytecode::Invokestatic, fib);
    code.op(Bytecode::Iadd).op(Bytecode::Ireturn);
    Ok(class.with_method(static_method("fib", "(I)I", 1, &code)?))
}

fn divide_class() -> VmResult<ClassDefinition> {
    let mut div = CodeBuilder::new();
    div.iload(0).iload(1).op(Bytecode::Idiv).op(Bytecode::Ireturn);

    let mut class = ClassDefinition::new(DEMO_CLASS).with_method(static_method("div", "(II)I", 2, &div)?);
    let div_ref = class.add_method_ref(DEMO_CLASS, "div", "(II)I");

    let mut divide = CodeBuilder::new();
    divide
        .iload(0)
        .iload(1)
        .op_u2(Bytecode::Invokestatic, div_ref)
        .op(Bytecode::Ireturn);
    let handler = divide.pc() as u16;
    divide.op(Bytecode::Pop).iconst(-1).op(Bytecode::Ireturn);
    Ok(class.with_method(static_method("divide", "(II)I", 2, &divide)?.with_handler(
        0,
        handler,
        handler,
        Some("java/lang/ArithmeticException"),
    )))
}

fn native_class() -> VmResult<ClassDefinition> {
    let mul = MethodDefinition::new("mul", "(II)I")
        .with_access(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::NATIVE);
    let mut class = ClassDefinition::new(DEMO_CLASS).with_method(mul);
    let mul_ref = class.add_method_ref(DEMO_CLASS, "mul", "(II)I");

    let mut square = CodeBuilder::new();
    square
        .iload(0)
        .iload(0)
        .op_u2(Bytecode::Invokestatic, mul_ref)
        .op(Bytecode::Ireturn);
    Ok(class.with_method(static_method("square", "(I)I", 1, &square)?))
}

fn overflow_class() -> VmResult<ClassDefinition> {
    let mut class = ClassDefinition::new(DEMO_CLASS);
    let recurse = class.add_method_ref(DEMO_CLASS, "recurse", "(I)I");
    let mut code = CodeBuilder::new();
    code.iload(0)
        .iconst(1)
        .op(Bytecode::Iadd)
        .op_u2(Bytecode::Invokestatic, recurse)
        .op(Bytecode::Ireturn);
    Ok(class.with_method(static_method("recurse", "(I)I", 1, &code)?))
}

extern "C" fn multiply(_env: u64, _class: u64, a: i32, b: i32) -> i32 {
    a.wrapping_mul(b)
}
