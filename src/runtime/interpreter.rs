//! The dispatch loop and the frame protocol.
//!
//! All frames live on one slot stack. A frame starting at `base` is laid out
//! as
//!
//! ```text
//! base + 0   saved base of the caller
//! base + 1   return address
//! base + 2   r0, the argument
//! base + 3.. captures, then locals
//! ```
//!
//! and the running frame is always the topmost one, so its registers end at
//! the top of the stack. A call pushes a frame; a tail call rebuilds the
//! current frame in place, keeping its header; a return pops the frame and
//! writes the result into the destination of the `Call` sitting just before
//! the return address.

use gc_arena::{Collect, Gc, Mutation};
use tracing::trace;

use crate::{
    bytecode::{Address, Bytecode, Operands, Program, Register},
    error::{Error, Fault, Result, Violation},
    source::Span,
    term::{BinaryOp, Literal},
};

use super::{
    external::{External, ToExternal},
    fuel::Fuel,
    value::{Data, DataType, Fixpoint, Function, Value},
};

pub(crate) const HEADER: usize = 2;

#[derive(Collect, Clone, Copy, Debug)]
#[collect(no_drop)]
pub(crate) enum Slot<'gc> {
    Empty,
    Base(usize),
    ReturnTo(Address),
    Value(Value<'gc>),
}

#[derive(Collect, Default)]
#[collect(no_drop)]
pub(crate) struct Stack<'gc> {
    slots: Vec<Slot<'gc>>,
}

/// Where the machine is, outside of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub pc: Address,
    pub base: usize,
    pub peak: usize,
}

impl<'gc> Stack<'gc> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Lays out the outermost frame.
    pub fn enter_top_level(&mut self, frame_size: u32) {
        self.slots.clear();
        self.slots.push(Slot::Base(0));
        self.slots.push(Slot::ReturnTo(Address::HALT));
        self.slots.resize(HEADER + frame_size as usize, Slot::Empty);
    }

    fn slot(&self, base: usize, register: Register) -> Result<usize> {
        let index = base + HEADER + register.index();
        if index < self.slots.len() {
            Ok(index)
        } else {
            Err(Error::invariant(Violation::RegisterOutOfRange {
                register,
                frame_size: self.slots.len().saturating_sub(base + HEADER) as u32,
            }))
        }
    }

    fn read(&self, base: usize, register: Register) -> Result<Value<'gc>> {
        match self.slots[self.slot(base, register)?] {
            Slot::Value(value) => Ok(value),
            Slot::Empty => Err(Error::invariant(Violation::EmptyRegister(register))),
            Slot::Base(_) | Slot::ReturnTo(_) => Err(Error::invariant(Violation::CorruptFrame)),
        }
    }

    fn write(&mut self, base: usize, register: Register, value: Value<'gc>) -> Result<()> {
        let index = self.slot(base, register)?;
        self.slots[index] = Slot::Value(value);
        Ok(())
    }

    fn header(&self, base: usize) -> Result<(usize, Address)> {
        match self.slots.get(base..base + HEADER) {
            Some([Slot::Base(saved), Slot::ReturnTo(address)]) => Ok((*saved, *address)),
            _ => Err(Error::invariant(Violation::CorruptFrame)),
        }
    }

    /// Pushes a frame for `function` at the top of the stack.
    fn enter(
        &mut self,
        saved: usize,
        return_to: Address,
        argument: Value<'gc>,
        function: &Function<'gc>,
    ) -> usize {
        let base = self.slots.len();
        self.slots.push(Slot::Base(saved));
        self.slots.push(Slot::ReturnTo(return_to));
        self.slots.push(Slot::Value(argument));
        self.slots
            .extend(function.captures.iter().map(|capture| Slot::Value(*capture)));
        self.slots
            .resize(base + HEADER + function.frame_size as usize, Slot::Empty);
        base
    }

    fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }
}

/// Runs until the program finishes, fails or `fuel` runs out.
///
/// Returns the final value once the outermost frame exits.
pub(crate) fn execute<'gc>(
    mc: &Mutation<'gc>,
    stack: &mut Stack<'gc>,
    program: &Program,
    cursor: &mut Cursor,
    fuel: &mut Fuel,
) -> Result<Option<External>> {
    while fuel.should_continue() {
        fuel.consume(1);
        let (instruction, span) = program
            .fetch(cursor.pc)
            .ok_or(Error::invariant(Violation::AddressOutOfRange(cursor.pc)))?;
        let base = cursor.base;
        let mut next = cursor.pc.next();

        match instruction {
            Bytecode::BeginFixpoint { dest } => stack.write(base, dest, Value::pending(mc))?,
            Bytecode::EndFixpoint { fixpoint, value } => {
                let cell = match stack.read(base, fixpoint)? {
                    Value::Fixpoint(cell) => cell,
                    other => {
                        return Err(Error::invariant_at(
                            Violation::NotAFixpoint {
                                found: other.type_name(),
                            },
                            span,
                        ))
                    }
                };
                let value = stack.read(base, value)?;
                Fixpoint::tie(cell, mc, value).map_err(|v| Error::invariant_at(v, span))?;
            }
            Bytecode::DerefFixpoint { dest, source } => {
                let value = match stack.read(base, source)? {
                    Value::Fixpoint(cell) => {
                        Fixpoint::get(cell).map_err(|v| Error::invariant_at(v, span))?
                    }
                    other => {
                        return Err(Error::invariant_at(
                            Violation::NotAFixpoint {
                                found: other.type_name(),
                            },
                            span,
                        ))
                    }
                };
                stack.write(base, dest, value)?;
            }
            Bytecode::Copy { dest, source } => {
                let value = stack.read(base, source)?;
                stack.write(base, dest, value)?;
            }
            Bytecode::CreateFunction {
                dest,
                body,
                frame_size,
                captures,
            } => {
                let captures = operands(program, captures)?
                    .iter()
                    .map(|register| stack.read(base, *register))
                    .collect::<Result<Vec<_>>>()?;
                let function = Function {
                    body,
                    frame_size,
                    captures,
                };
                stack.write(base, dest, Value::Function(Gc::new(mc, function)))?;
            }
            Bytecode::Call {
                function, argument, ..
            } => {
                let callee = callable(stack.read(base, function)?, span)?;
                let argument = stack.read(base, argument)?;
                cursor.base = stack.enter(base, next, argument, &callee);
                next = callee.body;
                trace!(target: "knot::runtime", body = %callee.body, depth = cursor.base, "call");
            }
            Bytecode::TailCall { function, argument } => {
                let callee = callable(stack.read(base, function)?, span)?;
                let argument = stack.read(base, argument)?;
                let (saved, return_to) = stack.header(base)?;
                stack.truncate(base);
                stack.enter(saved, return_to, argument, &callee);
                next = callee.body;
                trace!(target: "knot::runtime", body = %callee.body, depth = base, "tail call");
            }
            Bytecode::Return { source } => {
                let value = stack.read(base, source)?;
                let (saved, return_to) = stack.header(base)?;
                stack.truncate(base);
                if return_to == Address::HALT {
                    return Ok(Some(value.to_external()));
                }

                let call = return_to
                    .0
                    .checked_sub(1)
                    .and_then(|address| program.fetch(Address(address)));
                let Some((Bytecode::Call { dest, .. }, _)) = call else {
                    return Err(Error::invariant(Violation::CorruptFrame));
                };
                cursor.base = saved;
                stack.write(saved, dest, value)?;
                next = return_to;
                trace!(target: "knot::runtime", to = %return_to, depth = saved, "return");
            }
            Bytecode::Exit { source } => {
                let value = stack.read(base, source)?;
                return Ok(Some(value.to_external()));
            }
            Bytecode::DataType { dest, decl } => {
                let decl = program
                    .datatype(decl)
                    .ok_or(Error::invariant(Violation::OperandsOutOfRange))?;
                let datatype = DataType { decl: decl.clone() };
                stack.write(base, dest, Value::DataType(Gc::new(mc, datatype)))?;
            }
            Bytecode::Data {
                dest,
                datatype,
                tag,
                fields,
            } => {
                let datatype = match stack.read(base, datatype)? {
                    Value::DataType(datatype) => datatype,
                    other => {
                        return Err(Error::runtime(
                            Fault::NotADataType {
                                found: other.type_name(),
                            },
                            span,
                        ))
                    }
                };
                let decl = &datatype.decl;
                let constructor = decl.constructors.get(tag as usize).ok_or(Error::runtime(
                    Fault::UnknownConstructor {
                        datatype: decl.name,
                        tag,
                    },
                    span,
                ))?;
                let fields = operands(program, fields)?
                    .iter()
                    .map(|register| stack.read(base, *register))
                    .collect::<Result<Vec<_>>>()?;
                if fields.len() != constructor.fields.len() {
                    return Err(Error::runtime(
                        Fault::ConstructorArity {
                            constructor: constructor.name,
                            expected: constructor.fields.len(),
                            found: fields.len(),
                        },
                        span,
                    ));
                }
                let data = Data {
                    datatype,
                    tag,
                    fields,
                };
                stack.write(base, dest, Value::Data(Gc::new(mc, data)))?;
            }
            Bytecode::Member {
                dest,
                source,
                field,
            } => {
                let data = match stack.read(base, source)? {
                    Value::Data(data) => data,
                    other => {
                        return Err(Error::runtime(
                            Fault::NotData {
                                field,
                                found: other.type_name(),
                            },
                            span,
                        ))
                    }
                };
                let constructor = data
                    .constructor()
                    .ok_or(Error::invariant_at(Violation::CorruptFrame, span))?;
                let value = constructor
                    .field_index(field)
                    .and_then(|index| data.fields.get(index))
                    .ok_or(Error::runtime(
                        Fault::MissingField {
                            constructor: constructor.name,
                            field,
                        },
                        span,
                    ))?;
                stack.write(base, dest, *value)?;
            }
            Bytecode::Literal { dest, value } => {
                let value = match value {
                    Literal::Integer(int) => Value::Integer(int),
                    Literal::Boolean(b) => Value::Boolean(b),
                };
                stack.write(base, dest, value)?;
            }
            Bytecode::Primitive { dest, op, lhs, rhs } => {
                let lhs = stack.read(base, lhs)?;
                let rhs = stack.read(base, rhs)?;
                let value = primitive(op, lhs, rhs).map_err(|fault| Error::runtime(fault, span))?;
                stack.write(base, dest, value)?;
            }
            Bytecode::Jump { target } => next = target,
            Bytecode::JumpUnless { condition, target } => {
                let condition = stack.read(base, condition)?;
                let holds = condition.as_boolean().ok_or(Error::runtime(
                    Fault::ExpectedBoolean {
                        found: condition.type_name(),
                    },
                    span,
                ))?;
                if !holds {
                    next = target;
                }
            }
        }

        cursor.pc = next;
        cursor.peak = cursor.peak.max(stack.len());
    }
    Ok(None)
}

fn operands(program: &Program, operands: Operands) -> Result<&[Register]> {
    program
        .operands(operands)
        .ok_or(Error::invariant(Violation::OperandsOutOfRange))
}

fn callable<'gc>(value: Value<'gc>, span: Span) -> Result<Gc<'gc, Function<'gc>>> {
    match value {
        Value::Function(function) => Ok(function),
        other => Err(Error::runtime(
            Fault::NotAFunction {
                found: other.type_name(),
            },
            span,
        )),
    }
}

fn primitive<'gc>(op: BinaryOp, lhs: Value<'gc>, rhs: Value<'gc>) -> Result<Value<'gc>, Fault> {
    let integer = |value: Value<'gc>| {
        value.as_integer().ok_or(Fault::ExpectedInteger {
            found: value.type_name(),
        })
    };

    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (lhs, rhs) {
                (Value::Integer(a), Value::Integer(b)) => a == b,
                (Value::Boolean(a), Value::Boolean(b)) => a == b,
                _ => {
                    return Err(Fault::Incomparable {
                        lhs: lhs.type_name(),
                        rhs: rhs.type_name(),
                    })
                }
            };
            Ok(Value::Boolean(equal == (op == BinaryOp::Eq)))
        }
        BinaryOp::Lt => Ok(Value::Boolean(integer(lhs)? < integer(rhs)?)),
        BinaryOp::Le => Ok(Value::Boolean(integer(lhs)? <= integer(rhs)?)),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            let (a, b) = (integer(lhs)?, integer(rhs)?);
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                _ if b == 0 => return Err(Fault::DivisionByZero),
                _ => a.checked_div(b),
            };
            result.map(Value::Integer).ok_or(Fault::IntegerOverflow)
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::primitive;
    use crate::{error::Fault, runtime::value::Value, term::BinaryOp};

    #[test]
    fn arithmetic_is_checked() {
        let_assert!(
            Ok(Value::Integer(-3)) =
                primitive(BinaryOp::Div, Value::Integer(7), Value::Integer(-2))
        );
        check!(
            primitive(BinaryOp::Div, Value::Integer(1), Value::Integer(0)).unwrap_err()
                == Fault::DivisionByZero
        );
        check!(
            primitive(BinaryOp::Add, Value::Integer(i64::MAX), Value::Integer(1)).unwrap_err()
                == Fault::IntegerOverflow
        );
        check!(
            primitive(BinaryOp::Div, Value::Integer(i64::MIN), Value::Integer(-1)).unwrap_err()
                == Fault::IntegerOverflow
        );
    }

    #[test]
    fn comparisons() {
        let_assert!(
            Ok(Value::Boolean(true)) =
                primitive(BinaryOp::Le, Value::Integer(2), Value::Integer(2))
        );
        let_assert!(
            Ok(Value::Boolean(false)) =
                primitive(BinaryOp::Ne, Value::Boolean(true), Value::Boolean(true))
        );
        check!(
            primitive(BinaryOp::Eq, Value::Integer(1), Value::Boolean(true)).unwrap_err()
                == Fault::Incomparable {
                    lhs: "integer",
                    rhs: "boolean"
                }
        );
        check!(
            primitive(BinaryOp::Lt, Value::Boolean(false), Value::Integer(0)).unwrap_err()
                == Fault::ExpectedInteger { found: "boolean" }
        );
    }
}
