//! IR to bytecode: flattening, frame sizing and relocation.
//!
//! Blocks are laid out in pre-order. A block's own instructions are emitted
//! contiguously; its child blocks follow, in the order of the
//! `CreateFunction`s that own them, and each of those instructions is patched
//! with its child's start address once the child is placed. Placement only
//! depends on the shape of the tree, so a single patch per nesting boundary
//! is enough.

use std::{collections::HashMap, rc::Rc};

use tracing::trace;

use crate::{
    bytecode::{Address, BlockInfo, Bytecode, DeclIndex, Operands, Program, Register},
    error::{Error, Result, Violation},
    source::Span,
    term::DataTypeDecl,
};

use super::ir::{IrBlock, IrInstruction, Label};

pub fn lower(block: &IrBlock) -> Result<Program> {
    let mut lowering = Lowering::default();
    let entry = lowering.block(block)?;
    Ok(Program {
        code: lowering.code,
        spans: lowering.spans,
        operands: lowering.operands,
        datatypes: lowering.datatypes,
        blocks: lowering.blocks,
        entry,
        entry_frame_size: block.frame_size(),
    })
}

#[derive(Default)]
struct Lowering {
    code: Vec<Bytecode>,
    spans: Vec<Span>,
    operands: Vec<Register>,
    datatypes: Vec<Rc<DataTypeDecl>>,
    blocks: Vec<BlockInfo>,
}

impl Lowering {
    fn here(&self) -> Address {
        Address(self.code.len() as u32)
    }

    fn operands(&mut self, registers: &[Register]) -> Operands {
        let start = self.operands.len() as u32;
        self.operands.extend_from_slice(registers);
        Operands {
            start,
            len: registers.len() as u32,
        }
    }

    /// Lowers `block` and everything nested in it, returning its start.
    fn block(&mut self, block: &IrBlock) -> Result<Address> {
        if !block.is_terminated() {
            return Err(Error::invariant_at(Violation::UnterminatedBlock, block.span));
        }

        let start = self.here();
        let frame_size = block.frame_size();
        let labels = label_addresses(block, start);
        let resolve = |label: Label| {
            labels
                .get(&label)
                .copied()
                .ok_or(Error::invariant_at(Violation::UndefinedLabel(label.0), block.span))
        };

        let info = self.blocks.len();
        self.blocks.push(BlockInfo {
            start,
            len: 0,
            frame_size,
        });

        let mut children = Vec::new();
        for node in &block.nodes {
            let bytecode = match &node.instruction {
                IrInstruction::Label(_) => continue,
                IrInstruction::BeginFixpoint { dest } => Bytecode::BeginFixpoint { dest: *dest },
                IrInstruction::Call {
                    dest,
                    function,
                    argument,
                } => Bytecode::Call {
                    dest: *dest,
                    function: *function,
                    argument: *argument,
                },
                IrInstruction::TailCall { function, argument } => Bytecode::TailCall {
                    function: *function,
                    argument: *argument,
                },
                IrInstruction::CreateFunction {
                    dest,
                    body,
                    captures,
                } => {
                    // r0 is the argument, captures fill the rest
                    if body.parameters as usize != captures.len() + 1 {
                        return Err(Error::invariant_at(
                            Violation::CaptureMismatch {
                                expected: body.parameters.saturating_sub(1),
                                found: captures.len(),
                            },
                            node.span,
                        ));
                    }
                    children.push((self.code.len(), body));
                    Bytecode::CreateFunction {
                        dest: *dest,
                        // patched below, once the child is placed
                        body: Address::HALT,
                        frame_size: body.frame_size(),
                        captures: self.operands(captures),
                    }
                }
                IrInstruction::Copy { dest, source } => Bytecode::Copy {
                    dest: *dest,
                    source: *source,
                },
                IrInstruction::DerefFixpoint { dest, source } => Bytecode::DerefFixpoint {
                    dest: *dest,
                    source: *source,
                },
                IrInstruction::EndFixpoint { fixpoint, value } => Bytecode::EndFixpoint {
                    fixpoint: *fixpoint,
                    value: *value,
                },
                IrInstruction::Exit { source } => Bytecode::Exit { source: *source },
                IrInstruction::Member {
                    dest,
                    source,
                    field,
                } => Bytecode::Member {
                    dest: *dest,
                    source: *source,
                    field: *field,
                },
                IrInstruction::Return { source } => Bytecode::Return { source: *source },
                IrInstruction::Data {
                    dest,
                    datatype,
                    tag,
                    fields,
                } => Bytecode::Data {
                    dest: *dest,
                    datatype: *datatype,
                    tag: *tag,
                    fields: self.operands(fields),
                },
                IrInstruction::DataType { dest, decl } => {
                    let index = DeclIndex(self.datatypes.len() as u32);
                    self.datatypes.push(decl.clone());
                    Bytecode::DataType {
                        dest: *dest,
                        decl: index,
                    }
                }
                IrInstruction::Literal { dest, value } => Bytecode::Literal {
                    dest: *dest,
                    value: *value,
                },
                IrInstruction::Primitive { dest, op, lhs, rhs } => Bytecode::Primitive {
                    dest: *dest,
                    op: *op,
                    lhs: *lhs,
                    rhs: *rhs,
                },
                IrInstruction::Jump { target } => Bytecode::Jump {
                    target: resolve(*target)?,
                },
                IrInstruction::JumpUnless { condition, target } => Bytecode::JumpUnless {
                    condition: *condition,
                    target: resolve(*target)?,
                },
            };
            self.code.push(bytecode);
            self.spans.push(node.span);
        }

        let len = self.here().0 - start.0;
        self.blocks[info].len = len;
        trace!(target: "knot::lower", start = %start, len, frame_size, "placed block");

        for (at, child) in children {
            let address = self.block(child)?;
            if let Bytecode::CreateFunction { body, .. } = &mut self.code[at] {
                *body = address;
            }
        }

        Ok(start)
    }
}

/// Absolute address of every label in `block`, given where it starts.
fn label_addresses(block: &IrBlock, start: Address) -> HashMap<Label, Address> {
    let mut labels = HashMap::new();
    let mut address = start;
    for node in &block.nodes {
        match node.instruction {
            IrInstruction::Label(label) => {
                labels.insert(label, address);
            }
            _ => address = address.next(),
        }
    }
    labels
}
