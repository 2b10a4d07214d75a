//! Symbolic instructions over frame-relative registers.
//!
//! An [`IrBlock`] is one function body (or the top level); nested function
//! bodies hang off their [`IrInstruction::CreateFunction`] as child blocks
//! until lowering flattens them. Jumps name block-local [`Label`]s.

use std::rc::Rc;

use crate::{
    bytecode::Register,
    source::{Span, Symbol},
    term::{BinaryOp, DataTypeDecl, Literal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum IrInstruction {
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
        body: IrBlock,
        /// Registers of this block whose values become registers `1..` of
        /// the child frame.
        captures: Vec<Register>,
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
        fields: Vec<Register>,
    },
    DataType {
        dest: Register,
        decl: Rc<DataTypeDecl>,
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
        target: Label,
    },
    JumpUnless {
        condition: Register,
        target: Label,
    },
    /// Marks the position a label refers to. Emits no code.
    Label(Label),
}

impl IrInstruction {
    /// Calls `f` with every register this instruction names in its own
    /// block. The registers of a child block are not included.
    pub fn for_each_register(&self, mut f: impl FnMut(Register)) {
        match self {
            Self::BeginFixpoint { dest } => f(*dest),
            Self::Call {
                dest,
                function,
                argument,
            } => {
                f(*dest);
                f(*function);
                f(*argument);
            }
            Self::TailCall { function, argument } => {
                f(*function);
                f(*argument);
            }
            Self::CreateFunction { dest, captures, .. } => {
                f(*dest);
                captures.iter().copied().for_each(f);
            }
            Self::Copy { dest, source }
            | Self::DerefFixpoint { dest, source }
            | Self::Member { dest, source, .. } => {
                f(*dest);
                f(*source);
            }
            Self::EndFixpoint { fixpoint, value } => {
                f(*fixpoint);
                f(*value);
            }
            Self::Exit { source } | Self::Return { source } => f(*source),
            Self::Data {
                dest,
                datatype,
                fields,
                ..
            } => {
                f(*dest);
                f(*datatype);
                fields.iter().copied().for_each(f);
            }
            Self::DataType { dest, .. } | Self::Literal { dest, .. } => f(*dest),
            Self::Primitive { dest, lhs, rhs, .. } => {
                f(*dest);
                f(*lhs);
                f(*rhs);
            }
            Self::JumpUnless { condition, .. } => f(*condition),
            Self::Jump { .. } | Self::Label(_) => {}
        }
    }
}

/// An instruction together with the span of the term it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct IrNode {
    pub instruction: IrInstruction,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrBlock {
    /// Registers filled in by the calling convention: the argument plus one
    /// per capture. Zero for the top level.
    pub parameters: u32,
    pub nodes: Vec<IrNode>,
    pub span: Span,
}

impl IrBlock {
    pub fn max_register(&self) -> Option<Register> {
        let mut max = self.parameters.checked_sub(1).map(Register);
        for node in &self.nodes {
            node.instruction
                .for_each_register(|r| max = Some(max.map_or(r, |m| m.max(r))));
        }
        max
    }

    /// `1 + max register referenced`.
    pub fn frame_size(&self) -> u32 {
        self.max_register().map_or(0, |r| r.0 + 1)
    }

    pub fn is_terminated(&self) -> bool {
        self.nodes.last().is_some_and(|n| {
            matches!(
                n.instruction,
                IrInstruction::Return { .. }
                    | IrInstruction::TailCall { .. }
                    | IrInstruction::Exit { .. }
            )
        })
    }
}
