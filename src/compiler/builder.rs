//! Term to IR translation.
//!
//! Every intermediate result gets a fresh register; nothing is reused. A
//! term is built either for its value (leaving the result in a register) or
//! in tail position, where the builder emits the instruction that leaves the
//! block itself: `Return` or `TailCall` in a function body, `Exit` at the top
//! level.

use crate::{
    bytecode::Register,
    error::{Error, Result, Violation},
    source::Span,
    term::{Binding, Term, TermKind},
};

use super::{
    analysis,
    environment::{Environment, Local},
    ir::{IrBlock, IrInstruction, IrNode, Label},
};

/// Builds the top-level block for `term`.
pub fn build(term: &Term) -> Result<IrBlock> {
    let mut builder = BlockBuilder::new(BlockKind::TopLevel, Environment::default(), 0, term.span);
    builder.tail(term)?;
    Ok(builder.finish())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    TopLevel,
    Function,
}

struct BlockBuilder {
    kind: BlockKind,
    env: Environment,
    parameters: u32,
    nodes: Vec<IrNode>,
    next_register: u32,
    next_label: u32,
    span: Span,
}

impl BlockBuilder {
    fn new(kind: BlockKind, env: Environment, parameters: u32, span: Span) -> Self {
        Self {
            kind,
            env,
            parameters,
            nodes: Vec::new(),
            next_register: parameters,
            next_label: 0,
            span,
        }
    }

    fn finish(self) -> IrBlock {
        IrBlock {
            parameters: self.parameters,
            nodes: self.nodes,
            span: self.span,
        }
    }

    fn fresh(&mut self) -> Register {
        let register = Register(self.next_register);
        self.next_register += 1;
        register
    }

    fn label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn emit(&mut self, instruction: IrInstruction, span: Span) {
        self.nodes.push(IrNode { instruction, span });
    }

    /// Builds `term` for its value and returns the register holding it.
    fn value(&mut self, term: &Term) -> Result<Register> {
        let span = term.span;
        match &term.kind {
            TermKind::Variable(binding) => self.read(*binding, span),
            TermKind::Abstraction { parameter, body } => self.abstraction(term, *parameter, body),
            TermKind::Application { function, argument } => {
                let function = self.value(function)?;
                let argument = self.value(argument)?;
                let dest = self.fresh();
                self.emit(
                    IrInstruction::Call {
                        dest,
                        function,
                        argument,
                    },
                    span,
                );
                Ok(dest)
            }
            TermKind::Let {
                binding,
                definition,
                body,
            } => {
                self.bind(*binding, definition, span)?;
                self.value(body)
            }
            TermKind::Group(inner) => self.value(inner),
            TermKind::DataType(decl) => {
                let dest = self.fresh();
                self.emit(
                    IrInstruction::DataType {
                        dest,
                        decl: decl.clone(),
                    },
                    span,
                );
                Ok(dest)
            }
            TermKind::Data {
                datatype,
                tag,
                fields,
            } => {
                let datatype = self.value(datatype)?;
                let fields = fields
                    .iter()
                    .map(|field| self.value(field))
                    .collect::<Result<Vec<_>>>()?;
                let dest = self.fresh();
                self.emit(
                    IrInstruction::Data {
                        dest,
                        datatype,
                        tag: *tag,
                        fields,
                    },
                    span,
                );
                Ok(dest)
            }
            TermKind::Member { value, field } => {
                let source = self.value(value)?;
                let dest = self.fresh();
                self.emit(
                    IrInstruction::Member {
                        dest,
                        source,
                        field: *field,
                    },
                    span,
                );
                Ok(dest)
            }
            TermKind::Literal(value) => {
                let dest = self.fresh();
                self.emit(
                    IrInstruction::Literal {
                        dest,
                        value: *value,
                    },
                    span,
                );
                Ok(dest)
            }
            TermKind::Binary { op, lhs, rhs } => {
                let lhs = self.value(lhs)?;
                let rhs = self.value(rhs)?;
                let dest = self.fresh();
                self.emit(
                    IrInstruction::Primitive {
                        dest,
                        op: *op,
                        lhs,
                        rhs,
                    },
                    span,
                );
                Ok(dest)
            }
            TermKind::If {
                condition,
                consequent,
                alternative,
            } => {
                let condition = self.value(condition)?;
                let dest = self.fresh();
                let otherwise = self.label();
                let end = self.label();
                self.emit(
                    IrInstruction::JumpUnless {
                        condition,
                        target: otherwise,
                    },
                    span,
                );
                let then_value = self.value(consequent)?;
                self.emit(
                    IrInstruction::Copy {
                        dest,
                        source: then_value,
                    },
                    consequent.span,
                );
                self.emit(IrInstruction::Jump { target: end }, span);
                self.emit(IrInstruction::Label(otherwise), span);
                let else_value = self.value(alternative)?;
                self.emit(
                    IrInstruction::Copy {
                        dest,
                        source: else_value,
                    },
                    alternative.span,
                );
                self.emit(IrInstruction::Label(end), span);
                Ok(dest)
            }
        }
    }

    /// Builds `term` in tail position: the block is left once it is done.
    fn tail(&mut self, term: &Term) -> Result<()> {
        let span = term.span;
        match &term.kind {
            TermKind::Application { function, argument } if self.kind == BlockKind::Function => {
                let function = self.value(function)?;
                let argument = self.value(argument)?;
                self.emit(IrInstruction::TailCall { function, argument }, span);
                Ok(())
            }
            TermKind::Let {
                binding,
                definition,
                body,
            } => {
                self.bind(*binding, definition, span)?;
                self.tail(body)
            }
            TermKind::Group(inner) => self.tail(inner),
            TermKind::If {
                condition,
                consequent,
                alternative,
            } => {
                let condition = self.value(condition)?;
                let otherwise = self.label();
                self.emit(
                    IrInstruction::JumpUnless {
                        condition,
                        target: otherwise,
                    },
                    span,
                );
                self.tail(consequent)?;
                self.emit(IrInstruction::Label(otherwise), span);
                self.tail(alternative)
            }
            _ => {
                let source = self.value(term)?;
                let leave = match self.kind {
                    BlockKind::TopLevel => IrInstruction::Exit { source },
                    BlockKind::Function => IrInstruction::Return { source },
                };
                self.emit(leave, span);
                Ok(())
            }
        }
    }

    /// Binds a let. A recursive definition is built against a fixpoint
    /// placeholder that is tied once the definition's value exists.
    fn bind(&mut self, binding: Binding, definition: &Term, span: Span) -> Result<()> {
        if analysis::is_recursive(&binding, definition) {
            let fixpoint = self.fresh();
            self.emit(IrInstruction::BeginFixpoint { dest: fixpoint }, span);
            self.env.define(binding, Local::placeholder(fixpoint));
            let value = self.value(definition)?;
            self.emit(IrInstruction::EndFixpoint { fixpoint, value }, definition.span);
            self.env.define(binding, Local::value(value));
        } else {
            let value = self.value(definition)?;
            self.env.define(binding, Local::value(value));
        }
        Ok(())
    }

    fn lookup(&self, binding: Binding, span: Span) -> Result<Local> {
        self.env
            .get(binding)
            .ok_or_else(|| Error::invariant_at(Violation::UnresolvedVariable(binding.name), span))
    }

    fn read(&mut self, binding: Binding, span: Span) -> Result<Register> {
        let local = self.lookup(binding, span)?;
        let dest = self.fresh();
        let instruction = if local.placeholder {
            IrInstruction::DerefFixpoint {
                dest,
                source: local.register,
            }
        } else {
            IrInstruction::Copy {
                dest,
                source: local.register,
            }
        };
        self.emit(instruction, span);
        Ok(dest)
    }

    fn abstraction(&mut self, term: &Term, parameter: Binding, body: &Term) -> Result<Register> {
        let captures = analysis::free_variables(term)
            .into_iter()
            .map(|binding| Ok((binding, self.lookup(binding, term.span)?)))
            .collect::<Result<Vec<_>>>()?;

        let env = Environment::function(parameter, captures.iter().copied());
        let parameters = 1 + captures.len() as u32;
        let mut child = BlockBuilder::new(BlockKind::Function, env, parameters, term.span);
        child.tail(body)?;

        let dest = self.fresh();
        self.emit(
            IrInstruction::CreateFunction {
                dest,
                body: child.finish(),
                captures: captures.iter().map(|(_, local)| local.register).collect(),
            },
            term.span,
        );
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::build;
    use crate::{
        bytecode::Register,
        compiler::ir::IrInstruction,
        error::{Error, Violation},
        source::{Intern, Span},
        term::{BinaryOp, Binder, Term},
    };

    struct Fixture {
        rodeo: lasso::Rodeo,
        binder: Binder,
        span: Span,
    }

    impl Fixture {
        fn new() -> Self {
            let mut rodeo = lasso::Rodeo::default();
            let span = Span::new(rodeo.intern("builder.kn"), 0, 0);
            Self {
                rodeo,
                binder: Binder::default(),
                span,
            }
        }

        fn bind(&mut self, name: &str) -> crate::term::Binding {
            let name = self.rodeo.intern(name);
            self.binder.fresh(name)
        }
    }

    fn instructions(block: &crate::compiler::ir::IrBlock) -> Vec<&IrInstruction> {
        block.nodes.iter().map(|n| &n.instruction).collect()
    }

    #[test]
    fn identity_function() {
        let mut fx = Fixture::new();
        let x = fx.bind("x");
        let span = fx.span;
        let block = build(&Term::abstraction(x, Term::variable(x, span), span)).unwrap();

        let ins = instructions(&block);
        check!(ins.len() == 2);
        let_assert!(
            IrInstruction::CreateFunction {
                dest,
                body,
                captures
            } = ins[0]
        );
        check!(captures.is_empty());
        check!(body.parameters == 1);
        check!(
            instructions(body)
                == vec![
                    &IrInstruction::Copy {
                        dest: Register(1),
                        source: Register(0)
                    },
                    &IrInstruction::Return {
                        source: Register(1)
                    }
                ]
        );
        check!(ins[1] == &IrInstruction::Exit { source: *dest });
    }

    #[test]
    fn tail_application_in_function_only() {
        let mut fx = Fixture::new();
        let f = fx.bind("f");
        let x = fx.bind("x");
        let span = fx.span;

        // f -> x -> f x, applied at the top level to itself
        let inner = Term::abstraction(
            x,
            Term::application(Term::variable(f, span), Term::variable(x, span), span),
            span,
        );
        let outer = Term::abstraction(f, inner, span);
        let top = Term::application(outer.clone(), outer, span);
        let block = build(&top).unwrap();

        let ins = instructions(&block);
        let_assert!(Some(IrInstruction::Exit { .. }) = ins.last().copied());
        check!(ins.iter().any(|i| matches!(i, IrInstruction::Call { .. })));
        check!(!ins.iter().any(|i| matches!(i, IrInstruction::TailCall { .. })));

        let_assert!(IrInstruction::CreateFunction { body: outer_body, .. } = ins[0]);
        let_assert!(
            IrInstruction::CreateFunction {
                body: inner_body,
                captures,
                ..
            } = instructions(outer_body)[0]
        );
        // f is the argument of the outer function
        check!(captures == &vec![Register(0)]);
        check!(inner_body.parameters == 2);
        let_assert!(Some(IrInstruction::TailCall { function, argument }) =
            instructions(inner_body).last().copied());
        check!(*function == Register(2));
        check!(*argument == Register(3));
    }

    #[test]
    fn recursive_let_ties_a_fixpoint() {
        let mut fx = Fixture::new();
        let f = fx.bind("f");
        let n = fx.bind("n");
        let span = fx.span;

        // f = n -> f n, f
        let definition = Term::abstraction(
            n,
            Term::application(Term::variable(f, span), Term::variable(n, span), span),
            span,
        );
        let block = build(&Term::let_in(f, definition, Term::variable(f, span), span)).unwrap();
        let ins = instructions(&block);

        let_assert!(IrInstruction::BeginFixpoint { dest: fixpoint } = ins[0]);
        let_assert!(
            IrInstruction::CreateFunction {
                dest: closure,
                body,
                captures
            } = ins[1]
        );
        check!(captures == &vec![*fixpoint]);
        check!(ins[2] == &IrInstruction::EndFixpoint {
            fixpoint: *fixpoint,
            value: *closure
        });
        // after the tie the body reads the closure directly
        check!(ins[3] == &IrInstruction::Copy {
            dest: Register(2),
            source: *closure
        });
        // inside, the captured placeholder is dereferenced on use
        check!(instructions(body)[0] == &IrInstruction::DerefFixpoint {
            dest: Register(2),
            source: Register(1)
        });
    }

    #[test]
    fn conditional_in_value_position_joins() {
        let fx = Fixture::new();
        let span = fx.span;
        let term = Term::binary(
            BinaryOp::Add,
            Term::if_then_else(
                Term::boolean(true, span),
                Term::integer(1, span),
                Term::integer(2, span),
                span,
            ),
            Term::integer(3, span),
            span,
        );
        let block = build(&term).unwrap();
        let ins = instructions(&block);
        let count = |f: fn(&IrInstruction) -> bool| ins.iter().filter(|i| f(i)).count();
        check!(count(|i| matches!(i, IrInstruction::Label(_))) == 2);
        check!(count(|i| matches!(i, IrInstruction::Copy { dest: Register(1), .. })) == 2);
        let_assert!(Some(IrInstruction::Exit { .. }) = ins.last().copied());
    }

    #[test]
    fn unresolved_variable_is_a_defect() {
        let mut fx = Fixture::new();
        let ghost = fx.bind("ghost");
        let span = fx.span;
        let error = build(&Term::variable(ghost, span)).unwrap_err();
        check!(
            error
                == Error::Invariant {
                    violation: Violation::UnresolvedVariable(ghost.name),
                    span: Some(span)
                }
        );
    }
}
