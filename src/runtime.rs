//! Executing lowered programs.
//!
//! A [`Machine`] owns a [`Program`] and a garbage-collected arena holding
//! its stack. It runs in fuel-bounded slices: [`Machine::step`] executes at
//! most as many instructions as the given [`Fuel`] allows, collecting
//! garbage between slices, so a host can interleave evaluation with other
//! work or abandon a runaway program.

use gc_arena::{Arena, Rootable};
use tracing::debug;

use crate::{
    bytecode::{Address, Program},
    error::{Error, Result, Violation},
};

pub mod external;
pub mod fuel;
pub mod interpreter;
pub mod value;

use external::External;
use fuel::Fuel;
use interpreter::{Cursor, Stack};

type StackArena = Arena<Rootable![Stack<'_>]>;

/// Instructions per slice when running to completion.
const SLICE: i32 = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Ready,
    Running,
    Finished(External),
    Failed,
}

pub struct Machine {
    program: Program,
    arena: StackArena,
    cursor: Cursor,
    state: State,
}

impl Machine {
    pub fn new(program: Program) -> Self {
        Self {
            cursor: Cursor {
                pc: program.entry,
                base: 0,
                peak: 0,
            },
            program,
            arena: StackArena::new(|_| Stack::default()),
            state: State::Ready,
        }
    }

    /// Runs one fuel-bounded slice.
    ///
    /// Returns the result once the program has finished; `Ok(None)` means
    /// the fuel ran out (or was interrupted) first. A machine that failed
    /// stays failed until [`Machine::reset`].
    pub fn step(&mut self, fuel: &mut Fuel) -> Result<Option<External>> {
        match &self.state {
            State::Failed => return Err(Error::invariant(Violation::Halted)),
            State::Finished(result) => return Ok(Some(result.clone())),
            State::Ready | State::Running => {}
        }
        if self.state == State::Ready {
            self.start();
        }

        let Self {
            program,
            arena,
            cursor,
            ..
        } = self;
        let outcome =
            arena.mutate_root(|mc, stack| interpreter::execute(mc, stack, program, cursor, fuel));
        arena.collect_debt();

        match outcome {
            Ok(Some(result)) => {
                debug!(target: "knot::runtime", peak = self.cursor.peak, "finished");
                self.state = State::Finished(result.clone());
                Ok(Some(result))
            }
            Ok(None) => Ok(None),
            Err(error) => {
                debug!(target: "knot::runtime", pc = %self.cursor.pc, %error, "failed");
                self.state = State::Failed;
                Err(error)
            }
        }
    }

    /// Runs to completion.
    pub fn run(&mut self) -> Result<External> {
        let mut fuel = Fuel::empty();
        loop {
            fuel.refill(SLICE, SLICE);
            if let Some(result) = self.step(&mut fuel)? {
                return Ok(result);
            }
        }
    }

    pub fn result(&self) -> Option<&External> {
        match &self.state {
            State::Finished(result) => Some(result),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished(_))
    }

    /// Where the next instruction will be fetched from.
    pub fn pc(&self) -> Address {
        self.cursor.pc
    }

    /// The highest the slot stack has been since the last start, frame
    /// headers included.
    pub fn peak_stack(&self) -> usize {
        self.cursor.peak
    }

    /// Drops all state, including any failure, so the program can run again.
    pub fn reset(&mut self) {
        self.arena = StackArena::new(|_| Stack::default());
        self.cursor = Cursor {
            pc: self.program.entry,
            base: 0,
            peak: 0,
        };
        self.state = State::Ready;
    }

    fn start(&mut self) {
        let frame_size = self.program.entry_frame_size;
        self.arena
            .mutate_root(|_, stack| stack.enter_top_level(frame_size));
        self.cursor = Cursor {
            pc: self.program.entry,
            base: 0,
            peak: interpreter::HEADER + frame_size as usize,
        };
        self.state = State::Running;
        debug!(
            target: "knot::runtime",
            entry = %self.program.entry,
            frame_size,
            "starting"
        );
    }
}

/// Runs `program` to completion on a fresh machine.
pub fn run(program: Program) -> Result<External> {
    Machine::new(program).run()
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::{external::External, fuel::Fuel, Machine};
    use crate::{
        bytecode::{Address, BlockInfo, Bytecode, Program, Register},
        error::{Error, Violation},
        source::{Intern, Span},
        term::Literal,
    };

    fn program(code: Vec<Bytecode>, entry_frame_size: u32) -> Program {
        let mut rodeo = lasso::Rodeo::default();
        let span = Span::new(rodeo.intern("runtime.kn"), 0, 0);
        Program {
            spans: vec![span; code.len()],
            blocks: vec![BlockInfo {
                start: Address(0),
                len: code.len() as u32,
                frame_size: entry_frame_size,
            }],
            code,
            operands: vec![],
            datatypes: vec![],
            entry: Address(0),
            entry_frame_size,
        }
    }

    #[test]
    fn fuel_slices_resume() {
        let mut machine = Machine::new(program(
            vec![
                Bytecode::Literal {
                    dest: Register(0),
                    value: Literal::Integer(5),
                },
                Bytecode::Copy {
                    dest: Register(1),
                    source: Register(0),
                },
                Bytecode::Exit {
                    source: Register(1),
                },
            ],
            2,
        ));

        let mut fuel = Fuel::with(2);
        check!(machine.step(&mut fuel).unwrap().is_none());
        check!(machine.pc() == Address(2));
        check!(!machine.is_finished());

        fuel.refill(10, 10);
        check!(machine.step(&mut fuel).unwrap() == Some(External::Integer(5)));
        check!(machine.result() == Some(&External::Integer(5)));
        check!(fuel.remaining() == 9);
    }

    #[test]
    fn interrupted_fuel_runs_nothing() {
        let mut machine = Machine::new(program(
            vec![
                Bytecode::Literal {
                    dest: Register(0),
                    value: Literal::Boolean(true),
                },
                Bytecode::Exit {
                    source: Register(0),
                },
            ],
            1,
        ));
        let mut fuel = Fuel::with(100);
        fuel.interrupt();
        check!(machine.step(&mut fuel).unwrap().is_none());
        check!(fuel.remaining() == 100);
        check!(machine.run().unwrap() == External::Boolean(true));
    }

    #[test]
    fn failure_is_sticky_until_reset() {
        let mut machine = Machine::new(program(
            vec![Bytecode::Exit {
                source: Register(0),
            }],
            1,
        ));
        let_assert!(
            Err(Error::Invariant {
                violation: Violation::EmptyRegister(Register(0)),
                ..
            }) = machine.run()
        );
        let_assert!(
            Err(Error::Invariant {
                violation: Violation::Halted,
                ..
            }) = machine.run()
        );

        machine.reset();
        check!(machine.peak_stack() == 0);
        let_assert!(
            Err(Error::Invariant {
                violation: Violation::EmptyRegister(_),
                ..
            }) = machine.run()
        );
    }

    #[test]
    fn running_off_the_end_is_a_defect() {
        let mut machine = Machine::new(program(
            vec![Bytecode::Jump {
                target: Address(40),
            }],
            0,
        ));
        let_assert!(
            Err(Error::Invariant {
                violation: Violation::AddressOutOfRange(Address(40)),
                ..
            }) = machine.run()
        );
    }
}
