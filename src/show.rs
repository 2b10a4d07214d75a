//! Human-readable rendering of IR, programs, values and errors.
//!
//! Names are interned, so everything here renders through a [`Resolve`].
//! Wrap an item with [`show`] to get something that implements `Display`.

use core::fmt;

use crate::{
    bytecode::{Address, Bytecode, Program},
    compiler::ir::{IrBlock, IrInstruction},
    error::{Error, Fault, Violation},
    runtime::external::{External, Token},
    source::{Resolve, Symbol},
    term::Literal,
};

pub trait Render {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Resolve) -> fmt::Result;
}

pub struct Show<'a, T: ?Sized> {
    item: &'a T,
    names: &'a dyn Resolve,
}

impl<'a, T: Render + ?Sized> fmt::Display for Show<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.item.render(f, self.names)
    }
}

pub fn show<'a, T: Render + ?Sized>(item: &'a T, names: &'a dyn Resolve) -> Show<'a, T> {
    Show { item, names }
}

fn literal(f: &mut fmt::Formatter<'_>, value: Literal) -> fmt::Result {
    match value {
        Literal::Integer(int) => write!(f, "{int}"),
        Literal::Boolean(b) => write!(f, "{b}"),
    }
}

fn list<T: fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Render for IrBlock {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Resolve) -> fmt::Result {
        render_block(self, f, names, 0)
    }
}

fn render_block(
    block: &IrBlock,
    f: &mut fmt::Formatter<'_>,
    names: &dyn Resolve,
    depth: usize,
) -> fmt::Result {
    let indent = "  ".repeat(depth);
    writeln!(f, "{indent}== block (params {}) ==", block.parameters)?;
    for node in &block.nodes {
        write!(f, "{indent}")?;
        match &node.instruction {
            IrInstruction::BeginFixpoint { dest } => writeln!(f, "{dest} = begin-fixpoint")?,
            IrInstruction::Call {
                dest,
                function,
                argument,
            } => writeln!(f, "{dest} = call {function} {argument}")?,
            IrInstruction::TailCall { function, argument } => {
                writeln!(f, "tail-call {function} {argument}")?
            }
            IrInstruction::CreateFunction {
                dest,
                body,
                captures,
            } => {
                writeln!(f, "{dest} = function [{}]", list(captures))?;
                render_block(body, f, names, depth + 1)?;
            }
            IrInstruction::Copy { dest, source } => writeln!(f, "{dest} = copy {source}")?,
            IrInstruction::DerefFixpoint { dest, source } => {
                writeln!(f, "{dest} = deref-fixpoint {source}")?
            }
            IrInstruction::EndFixpoint { fixpoint, value } => {
                writeln!(f, "end-fixpoint {fixpoint} {value}")?
            }
            IrInstruction::Exit { source } => writeln!(f, "exit {source}")?,
            IrInstruction::Member {
                dest,
                source,
                field,
            } => writeln!(f, "{dest} = member {source} .{}", names.resolve(*field))?,
            IrInstruction::Return { source } => writeln!(f, "return {source}")?,
            IrInstruction::Data {
                dest,
                datatype,
                tag,
                fields,
            } => writeln!(f, "{dest} = data {datatype} #{tag} [{}]", list(fields))?,
            IrInstruction::DataType { dest, decl } => {
                writeln!(f, "{dest} = datatype {}", names.resolve(decl.name))?
            }
            IrInstruction::Literal { dest, value } => {
                write!(f, "{dest} = literal ")?;
                literal(f, *value)?;
                writeln!(f)?
            }
            IrInstruction::Primitive { dest, op, lhs, rhs } => {
                writeln!(f, "{dest} = {lhs} {} {rhs}", op.symbol())?
            }
            IrInstruction::Jump { target } => writeln!(f, "jump L{}", target.0)?,
            IrInstruction::JumpUnless { condition, target } => {
                writeln!(f, "jump-unless {condition} L{}", target.0)?
            }
            IrInstruction::Label(label) => writeln!(f, "L{}:", label.0)?,
        }
    }
    Ok(())
}

impl Render for Program {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Resolve) -> fmt::Result {
        for (index, instruction) in self.code.iter().enumerate() {
            let address = Address(index as u32);
            match self.block_of(address) {
                Some(block) if block.start == address => {
                    writeln!(f, "== block {address} (frame {}) ==", block.frame_size)?
                }
                _ => {}
            }
            write!(f, "{address} ")?;
            match *instruction {
                Bytecode::BeginFixpoint { dest } => writeln!(f, "{dest} = begin-fixpoint")?,
                Bytecode::Call {
                    dest,
                    function,
                    argument,
                } => writeln!(f, "{dest} = call {function} {argument}")?,
                Bytecode::TailCall { function, argument } => {
                    writeln!(f, "tail-call {function} {argument}")?
                }
                Bytecode::CreateFunction {
                    dest,
                    body,
                    frame_size,
                    captures,
                } => writeln!(
                    f,
                    "{dest} = function {body} (frame {frame_size}) [{}]",
                    list(self.operands(captures).unwrap_or_default())
                )?,
                Bytecode::Copy { dest, source } => writeln!(f, "{dest} = copy {source}")?,
                Bytecode::DerefFixpoint { dest, source } => {
                    writeln!(f, "{dest} = deref-fixpoint {source}")?
                }
                Bytecode::EndFixpoint { fixpoint, value } => {
                    writeln!(f, "end-fixpoint {fixpoint} {value}")?
                }
                Bytecode::Exit { source } => writeln!(f, "exit {source}")?,
                Bytecode::Member {
                    dest,
                    source,
                    field,
                } => writeln!(f, "{dest} = member {source} .{}", names.resolve(field))?,
                Bytecode::Return { source } => writeln!(f, "return {source}")?,
                Bytecode::Data {
                    dest,
                    datatype,
                    tag,
                    fields,
                } => writeln!(
                    f,
                    "{dest} = data {datatype} #{tag} [{}]",
                    list(self.operands(fields).unwrap_or_default())
                )?,
                Bytecode::DataType { dest, decl } => match self.datatype(decl) {
                    Some(decl) => writeln!(f, "{dest} = datatype {}", names.resolve(decl.name))?,
                    None => writeln!(f, "{dest} = datatype ?{}", decl.0)?,
                },
                Bytecode::Literal { dest, value } => {
                    write!(f, "{dest} = literal ")?;
                    literal(f, value)?;
                    writeln!(f)?
                }
                Bytecode::Primitive { dest, op, lhs, rhs } => {
                    writeln!(f, "{dest} = {lhs} {} {rhs}", op.symbol())?
                }
                Bytecode::Jump { target } => writeln!(f, "jump {target}")?,
                Bytecode::JumpUnless { condition, target } => {
                    writeln!(f, "jump-unless {condition} {target}")?
                }
            }
        }
        Ok(())
    }
}

impl Render for External {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Resolve) -> fmt::Result {
        for token in self.tokens() {
            match token {
                Token::Leaf(External::Integer(int)) => write!(f, "{int}")?,
                Token::Leaf(External::Boolean(b)) => write!(f, "{b}")?,
                Token::Leaf(External::Function { body, captures, .. }) => {
                    write!(f, "<function {body}, {captures} captured>")?
                }
                Token::Leaf(External::DataType { name, .. }) => {
                    write!(f, "<data {}>", names.resolve(*name))?
                }
                Token::Leaf(External::Fixpoint(None)) => write!(f, "<pending>")?,
                Token::Leaf(External::Data { .. } | External::Fixpoint(Some(_))) => {}
                Token::Open { constructor, .. } => write!(f, "{}", names.resolve(constructor))?,
                Token::Field { name, first } => {
                    let sep = if first { " {" } else { "," };
                    write!(f, "{sep} {} = ", names.resolve(name))?;
                }
                Token::Close { empty } => {
                    if !empty {
                        write!(f, " }}")?;
                    }
                }
                // a tied fixpoint shows as its value
                Token::Tied | Token::Untied => {}
            }
        }
        Ok(())
    }
}

impl Render for Violation {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Resolve) -> fmt::Result {
        match self {
            Self::UnresolvedVariable(name) => {
                write!(f, "variable {} has no binding in scope", names.resolve(*name))
            }
            other => write!(f, "{other}"),
        }
    }
}

impl Render for Fault {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Resolve) -> fmt::Result {
        let name = |symbol: &Symbol| names.resolve(*symbol);
        match self {
            Self::NotData { field, found } => {
                write!(f, "cannot access field {} of {found}", name(field))
            }
            Self::MissingField { constructor, field } => write!(
                f,
                "constructor {} has no field {}",
                name(constructor),
                name(field)
            ),
            Self::UnknownConstructor { datatype, tag } => write!(
                f,
                "data type {} has no constructor number {tag}",
                name(datatype)
            ),
            Self::ConstructorArity {
                constructor,
                expected,
                found,
            } => write!(
                f,
                "constructor {} takes {expected} fields, got {found}",
                name(constructor)
            ),
            other => write!(f, "{other}"),
        }
    }
}

impl Render for Error {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Resolve) -> fmt::Result {
        match self {
            Self::Invariant { violation, .. } => {
                write!(f, "invariant violated: ")?;
                violation.render(f, names)
            }
            Self::Runtime { fault, .. } => {
                write!(f, "runtime error: ")?;
                fault.render(f, names)
            }
        }
    }
}
