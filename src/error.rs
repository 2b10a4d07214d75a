//! Failures of compilation and evaluation.
//!
//! There are exactly two kinds. A [`Violation`] means malformed input reached
//! the compiler or the machine (an upstream defect); a [`Fault`] is something
//! the evaluated program did wrong, which is only discovered at run time as
//! there is no static checker. Neither is recovered from internally.

use crate::{
    bytecode::{Address, Register},
    source::{Diagnostics, Resolve, Span, Symbol},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invariant violated: {violation}")]
    Invariant {
        violation: Violation,
        span: Option<Span>,
    },
    #[error("runtime error: {fault}")]
    Runtime { fault: Fault, span: Span },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("variable {0} has no binding in scope")]
    UnresolvedVariable(Symbol),
    #[error("block does not end in return, tail call or exit")]
    UnterminatedBlock,
    #[error("jump to undefined label {0}")]
    UndefinedLabel(u32),
    #[error("register {register} outside of frame of size {frame_size}")]
    RegisterOutOfRange { register: Register, frame_size: u32 },
    #[error("address {0} outside of program")]
    AddressOutOfRange(Address),
    #[error("operand list outside of program")]
    OperandsOutOfRange,
    #[error("function body takes {expected} captures, given {found}")]
    CaptureMismatch { expected: u32, found: usize },
    #[error("register {0} read before being written")]
    EmptyRegister(Register),
    #[error("recursive binding read before it was tied")]
    UntiedFixpoint,
    #[error("recursive binding tied twice")]
    FixpointTiedTwice,
    #[error("expected a fixpoint, found {found}")]
    NotAFixpoint { found: &'static str },
    #[error("corrupt frame header")]
    CorruptFrame,
    #[error("machine halted after an earlier error")]
    Halted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("cannot call {found}, it is not a function")]
    NotAFunction { found: &'static str },
    #[error("cannot access field {field} of {found}")]
    NotData { field: Symbol, found: &'static str },
    #[error("constructor {constructor} has no field {field}")]
    MissingField { constructor: Symbol, field: Symbol },
    #[error("expected a data type, found {found}")]
    NotADataType { found: &'static str },
    #[error("data type {datatype} has no constructor number {tag}")]
    UnknownConstructor { datatype: Symbol, tag: u32 },
    #[error("constructor {constructor} takes {expected} fields, got {found}")]
    ConstructorArity {
        constructor: Symbol,
        expected: usize,
        found: usize,
    },
    #[error("expected an integer, found {found}")]
    ExpectedInteger { found: &'static str },
    #[error("expected a boolean, found {found}")]
    ExpectedBoolean { found: &'static str },
    #[error("cannot compare {lhs} with {rhs}")]
    Incomparable {
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    IntegerOverflow,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn invariant(violation: Violation) -> Self {
        Self::Invariant {
            violation,
            span: None,
        }
    }

    pub(crate) fn invariant_at(violation: Violation, span: Span) -> Self {
        Self::Invariant {
            violation,
            span: Some(span),
        }
    }

    pub(crate) fn runtime(fault: Fault, span: Span) -> Self {
        Self::Runtime { fault, span }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Invariant { span, .. } => *span,
            Self::Runtime { span, .. } => Some(*span),
        }
    }

    pub fn is_defect(&self) -> bool {
        matches!(self, Self::Invariant { .. })
    }

    /// Renders this error through the host's diagnostics, with names resolved.
    ///
    /// Errors without a span (defects found while lowering) have nothing to
    /// point at and come back as the bare message.
    pub fn report(&self, names: &dyn Resolve, diagnostics: &dyn Diagnostics) -> String {
        let message = crate::show::show(self, names).to_string();
        match self.span() {
            Some(span) => diagnostics.render_error(&message, span),
            None => message,
        }
    }
}
