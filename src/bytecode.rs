//! The flat, executable form of a compiled term.
//!
//! Every function body of a term occupies one contiguous range of
//! [`Program::code`], the top level first. Instructions are fixed-shape and
//! `Copy`; the variable-length operand lists of closure creation and data
//! construction live in [`Program::operands`] and are referenced by range.

use core::fmt;
use std::rc::Rc;

use gc_arena::Collect;

use crate::{
    source::{Span, Symbol},
    term::{BinaryOp, DataTypeDecl, Literal},
};

/// Frame-relative slot index.
///
/// Register `0` of a function frame holds the argument, registers
/// `1..=n` the `n` captures, and everything above is locals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register(pub u32);

impl Register {
    pub const ARGUMENT: Register = Register(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Absolute index into [`Program::code`].
#[derive(Collect, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[collect(require_static)]
pub struct Address(pub u32);

impl Address {
    /// Return address of the outermost frame: returning to it ends the run.
    pub const HALT: Address = Address(u32::MAX);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn next(self) -> Address {
        Address(self.0 + 1)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::HALT {
            write!(f, "@halt")
        } else {
            write!(f, "@{:04}", self.0)
        }
    }
}

/// A range of [`Program::operands`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operands {
    pub start: u32,
    pub len: u32,
}

/// Index into [`Program::datatypes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclIndex(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bytecode {
    BeginFixpoint {
        dest: Register,
    },
    Call {
        dest: Register,
        function: Register,
        argument: Register,
    },
    TailCall {
        function: Register,
        argument: Register,
    },
    CreateFunction {
        dest: Register,
        body: Address,
        frame_size: u32,
        captures: Operands,
    },
    Copy {
        dest: Register,
        source: Register,
    },
    DerefFixpoint {
        dest: Register,
        source: Register,
    },
    EndFixpoint {
        fixpoint: Register,
        value: Register,
    },
    Exit {
        source: Register,
    },
    Member {
        dest: Register,
        source: Register,
        field: Symbol,
    },
    Return {
        source: Register,
    },
    Data {
        dest: Register,
        datatype: Register,
        tag: u32,
        fields: Operands,
    },
    DataType {
        dest: Register,
        decl: DeclIndex,
    },
    Literal {
        dest: Register,
        value: Literal,
    },
    Primitive {
        dest: Register,
        op: BinaryOp,
        lhs: Register,
        rhs: Register,
    },
    Jump {
        target: Address,
    },
    JumpUnless {
        condition: Register,
        target: Address,
    },
}

/// Placement of one lowered block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    pub start: Address,
    pub len: u32,
    pub frame_size: u32,
}

/// A fully lowered term. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub code: Vec<Bytecode>,
    /// `spans[i]` is the source of `code[i]`.
    pub spans: Vec<Span>,
    pub operands: Vec<Register>,
    pub datatypes: Vec<Rc<DataTypeDecl>>,
    /// In address order; `blocks[0]` is the top level.
    pub blocks: Vec<BlockInfo>,
    pub entry: Address,
    pub entry_frame_size: u32,
}

impl Program {
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn fetch(&self, address: Address) -> Option<(Bytecode, Span)> {
        let index = address.index();
        Some((*self.code.get(index)?, *self.spans.get(index)?))
    }

    pub fn operands(&self, operands: Operands) -> Option<&[Register]> {
        let start = operands.start as usize;
        self.operands.get(start..start + operands.len as usize)
    }

    pub fn datatype(&self, decl: DeclIndex) -> Option<&Rc<DataTypeDecl>> {
        self.datatypes.get(decl.0 as usize)
    }

    /// The block whose range contains `address`.
    pub fn block_of(&self, address: Address) -> Option<&BlockInfo> {
        self.blocks
            .iter()
            .find(|b| b.start <= address && address.0 < b.start.0 + b.len)
    }
}
