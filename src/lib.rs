//! A compiler and virtual machine for a small, strict, functional language.
//!
//! A front end hands over a resolved [`Term`]. [`compile`] turns it into a
//! flat [`Program`] of register bytecode, and [`run`] (or a [`Machine`],
//! for fuel-bounded execution) evaluates that program to an [`External`]
//! value.

pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod runtime;
pub mod show;
pub mod source;
pub mod term;

pub use bytecode::{Address, Bytecode, Program, Register};
pub use compiler::compile;
pub use error::{Error, Fault, Result, Violation};
pub use runtime::{
    external::{External, ToExternal},
    fuel::Fuel,
    run, Machine,
};
pub use show::{show, Render};
pub use source::{Diagnostics, Intern, Resolve, Span, Symbol};
pub use term::{
    BinaryOp, Binder, Binding, ConstructorDecl, DataTypeDecl, Literal, Term, TermKind,
};
