mod common;

use arbitrary::Unstructured;
use arbtest::arbtest;
use assert2::check;
use common::{eval, Fixture};
use knot::{compile, BinaryOp, Binding, Machine, Term};

/// `loop = n -> if n == 0 then 0 else loop (n - 1), loop depth`
fn countdown(depth: i64) -> Term {
    let mut fx = Fixture::new();
    let lp = fx.bind("loop");
    let n = fx.bind("n");
    let at = fx.at();
    let body = Term::if_then_else(
        Term::binary(BinaryOp::Eq, fx.var(n), fx.int(0), at),
        fx.int(0),
        fx.apply(fx.var(lp), Term::binary(BinaryOp::Sub, fx.var(n), fx.int(1), at)),
        at,
    );
    fx.let_in(lp, fx.lambda(n, body), fx.apply(fx.var(lp), fx.int(depth)))
}

/// `sum = n -> if n == 0 then 0 else n + sum (n - 1), sum depth`
fn summation(depth: i64) -> Term {
    let mut fx = Fixture::new();
    let sum = fx.bind("sum");
    let n = fx.bind("n");
    let at = fx.at();
    let body = Term::if_then_else(
        Term::binary(BinaryOp::Eq, fx.var(n), fx.int(0), at),
        fx.int(0),
        Term::binary(
            BinaryOp::Add,
            fx.var(n),
            fx.apply(fx.var(sum), Term::binary(BinaryOp::Sub, fx.var(n), fx.int(1), at)),
            at,
        ),
        at,
    );
    fx.let_in(sum, fx.lambda(n, body), fx.apply(fx.var(sum), fx.int(depth)))
}

fn peak_stack(term: &Term) -> usize {
    let mut machine = Machine::new(compile(term).unwrap());
    machine.run().unwrap();
    machine.peak_stack()
}

#[test]
fn tail_calls_run_in_constant_stack() {
    let shallow = peak_stack(&countdown(10));
    check!(peak_stack(&countdown(100_000)) == shallow);

    arbtest(|u| {
        let depth = u.int_in_range(0..=5_000)?;
        check!(peak_stack(&countdown(depth)) == shallow, "depth {depth}");
        Ok(())
    });
}

#[test]
fn non_tail_calls_grow_the_stack() {
    check!(peak_stack(&summation(100)) > peak_stack(&summation(10)));
    check!(eval(&summation(100)).unwrap().as_integer() == Some(5050));
}

/// A closed term without applications, along with the kind of value it
/// evaluates to.
struct Generator<'u, 'a> {
    u: &'u mut Unstructured<'a>,
    fx: Fixture,
    /// Let bindings in scope with the kind of their value.
    scope: Vec<(Binding, &'static str)>,
}

impl Generator<'_, '_> {
    fn small(&mut self) -> arbitrary::Result<Term> {
        Ok(self.fx.int(self.u.int_in_range(-1_000..=1_000)?))
    }

    fn term(&mut self, depth: u32) -> arbitrary::Result<(Term, &'static str)> {
        let at = self.fx.at();
        let choices = if depth == 0 { 3 } else { 10 };
        Ok(match self.u.choose_index(choices)? {
            0 => (self.small()?, "integer"),
            1 => (Term::boolean(self.u.arbitrary()?, at), "boolean"),
            2 if !self.scope.is_empty() => {
                let (binding, kind) = *self.u.choose(&self.scope)?;
                (self.fx.var(binding), kind)
            }
            2 => (self.small()?, "integer"),
            3 => {
                let op = self.u.choose(&[BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul])?;
                let (lhs, rhs) = (self.small()?, self.small()?);
                (Term::binary(*op, lhs, rhs, at), "integer")
            }
            4 => {
                let op = self.u.arbitrary::<BinaryOp>()?;
                let (lhs, rhs) = (self.small()?, self.small()?);
                let rhs = if op == BinaryOp::Div { self.fx.int(7) } else { rhs };
                let kind = match op {
                    BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => "integer",
                    _ => "boolean",
                };
                (Term::binary(op, lhs, rhs, at), kind)
            }
            5 => {
                // the body is never run, so whatever it refers to is fine
                let parameter = self.fx.bind("p");
                self.scope.push((parameter, "unknown"));
                let (body, _) = self.term(depth - 1)?;
                self.scope.pop();
                (self.fx.lambda(parameter, body), "function")
            }
            6 => {
                let binding = self.fx.bind("v");
                let (definition, kind) = self.term(depth - 1)?;
                self.scope.push((binding, kind));
                let (body, body_kind) = self.term(depth - 1)?;
                self.scope.pop();
                (self.fx.let_in(binding, definition, body), body_kind)
            }
            7 => {
                let taken: bool = self.u.arbitrary()?;
                let (consequent, then_kind) = self.term(depth - 1)?;
                let (alternative, else_kind) = self.term(depth - 1)?;
                let kind = if taken { then_kind } else { else_kind };
                let condition = Term::boolean(taken, at);
                (Term::if_then_else(condition, consequent, alternative, at), kind)
            }
            8 => {
                let (inner, kind) = self.term(depth - 1)?;
                (Term::group(inner, at), kind)
            }
            _ => {
                let (datatype, fields) = self.fx.record("Box", &["item"]);
                let (item, kind) = self.term(depth - 1)?;
                let data = Term::data(datatype, 0, vec![item], at);
                if self.u.arbitrary()? {
                    (Term::member(data, fields[0], at), kind)
                } else {
                    (data, "data")
                }
            }
        })
    }
}

#[test]
fn closed_terms_evaluate_to_their_shape() {
    arbtest(|u| {
        let mut generator = Generator {
            u,
            fx: Fixture::new(),
            scope: Vec::new(),
        };
        let depth = generator.u.int_in_range(0..=6)?;
        let (term, kind) = generator.term(depth)?;

        let value = eval(&term).unwrap();
        check!(value.kind() == kind, "{term:?}");
        Ok(())
    });
}

#[test]
fn compilation_is_deterministic() {
    arbtest(|u| {
        let depth = u.int_in_range(0..=200)?;
        let term = summation(depth);
        check!(compile(&term).unwrap() == compile(&term).unwrap());
        Ok(())
    });
}
