//! Shared helpers for assembling terms by hand and evaluating them.
#![allow(dead_code)]

use knot::{
    compile, run, Binder, Binding, ConstructorDecl, DataTypeDecl, External, Intern, Result, Span,
    Symbol, Term,
};

pub struct Fixture {
    pub rodeo: lasso::Rodeo,
    pub binder: Binder,
    source: Symbol,
}

impl Fixture {
    pub fn new() -> Self {
        let mut rodeo = lasso::Rodeo::default();
        let source = rodeo.intern("test.kn");
        Self {
            rodeo,
            binder: Binder::default(),
            source,
        }
    }

    pub fn name(&mut self, name: &str) -> Symbol {
        self.rodeo.intern(name)
    }

    pub fn bind(&mut self, name: &str) -> Binding {
        let name = self.name(name);
        self.binder.fresh(name)
    }

    pub fn span(&self, start: usize, end: usize) -> Span {
        Span::new(self.source, start, end)
    }

    /// A span for terms whose position does not matter.
    pub fn at(&self) -> Span {
        self.span(0, 0)
    }

    pub fn var(&self, binding: Binding) -> Term {
        Term::variable(binding, self.at())
    }

    pub fn int(&self, value: i64) -> Term {
        Term::integer(value, self.at())
    }

    pub fn lambda(&self, parameter: Binding, body: Term) -> Term {
        Term::abstraction(parameter, body, self.at())
    }

    pub fn apply(&self, function: Term, argument: Term) -> Term {
        Term::application(function, argument, self.at())
    }

    pub fn let_in(&self, binding: Binding, definition: Term, body: Term) -> Term {
        Term::let_in(binding, definition, body, self.at())
    }

    /// `data (Name field...)` with a single constructor named like the type.
    pub fn record(&mut self, name: &str, fields: &[&str]) -> (Term, Vec<Symbol>) {
        let name = self.name(name);
        let fields = fields.iter().map(|field| self.name(field)).collect::<Vec<_>>();
        let decl = DataTypeDecl {
            name,
            constructors: vec![ConstructorDecl {
                name,
                fields: fields.clone(),
            }],
        };
        (Term::data_type(decl, self.at()), fields)
    }

    /// `data (Constructor field...) | ...`, returning the constructor names
    /// in tag order.
    pub fn variants(
        &mut self,
        name: &str,
        constructors: &[(&str, &[&str])],
    ) -> (Term, Vec<Symbol>) {
        let name = self.name(name);
        let constructors = constructors
            .iter()
            .map(|(constructor, fields)| ConstructorDecl {
                name: self.name(constructor),
                fields: fields.iter().map(|field| self.name(field)).collect(),
            })
            .collect::<Vec<_>>();
        let names = constructors.iter().map(|c| c.name).collect();
        let decl = DataTypeDecl { name, constructors };
        (Term::data_type(decl, self.at()), names)
    }
}

pub fn eval(term: &Term) -> Result<External> {
    run(compile(term)?)
}
