//! Resolved term trees, as handed over by the front end.
//!
//! By the time a [`Term`] reaches this crate every [`TermKind::Variable`]
//! already points at the [`Binding`] that introduced it, and every node
//! carries the [`Span`] it was parsed from. Binding ids are unique within a
//! term tree, so the compiler never has to deal with shadowing.

use std::rc::Rc;

use arbitrary::Arbitrary;

use crate::source::{Span, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(pub u32);

/// A binding site: a lambda parameter or a let-bound name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Binding {
    pub id: BindingId,
    pub name: Symbol,
}

/// Hands out fresh binding ids while a term is being assembled.
#[derive(Debug, Default)]
pub struct Binder {
    next: u32,
}

impl Binder {
    pub fn fresh(&mut self, name: Symbol) -> Binding {
        let id = BindingId(self.next);
        self.next += 1;
        Binding { id, name }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub kind: TermKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermKind {
    Variable(Binding),
    /// `parameter -> body`
    Abstraction {
        parameter: Binding,
        body: Box<Term>,
    },
    /// `function argument`
    Application {
        function: Box<Term>,
        argument: Box<Term>,
    },
    /// `binding = definition, body`
    ///
    /// The binding is in scope within its own definition, which makes the
    /// let recursive whenever the definition mentions it.
    Let {
        binding: Binding,
        definition: Box<Term>,
        body: Box<Term>,
    },
    /// `( inner )`
    Group(Box<Term>),
    /// `data (Ctor field...) ...`
    DataType(Rc<DataTypeDecl>),
    /// A value built by constructor `tag` of the data type `datatype`
    /// evaluates to.
    Data {
        datatype: Box<Term>,
        tag: u32,
        fields: Vec<Term>,
    },
    /// `value.field`
    Member {
        value: Box<Term>,
        field: Symbol,
    },
    Literal(Literal),
    Binary {
        op: BinaryOp,
        lhs: Box<Term>,
        rhs: Box<Term>,
    },
    /// `condition then consequent else alternative`
    If {
        condition: Box<Term>,
        consequent: Box<Term>,
        alternative: Box<Term>,
    },
}

/// Declaration of a data type: an ordered set of named constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTypeDecl {
    pub name: Symbol,
    pub constructors: Vec<ConstructorDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorDecl {
    pub name: Symbol,
    pub fields: Vec<Symbol>,
}

impl ConstructorDecl {
    pub fn field_index(&self, field: Symbol) -> Option<usize> {
        self.fields.iter().position(|f| *f == field)
    }
}

#[derive(Arbitrary, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Literal {
    Integer(i64),
    Boolean(bool),
}

#[derive(Arbitrary, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

// Shorthands for front ends (and tests) assembling trees by hand
impl Term {
    pub fn new(kind: TermKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn variable(binding: Binding, span: Span) -> Self {
        Self::new(TermKind::Variable(binding), span)
    }

    pub fn abstraction(parameter: Binding, body: Term, span: Span) -> Self {
        Self::new(
            TermKind::Abstraction {
                parameter,
                body: Box::new(body),
            },
            span,
        )
    }

    pub fn application(function: Term, argument: Term, span: Span) -> Self {
        Self::new(
            TermKind::Application {
                function: Box::new(function),
                argument: Box::new(argument),
            },
            span,
        )
    }

    pub fn let_in(binding: Binding, definition: Term, body: Term, span: Span) -> Self {
        Self::new(
            TermKind::Let {
                binding,
                definition: Box::new(definition),
                body: Box::new(body),
            },
            span,
        )
    }

    pub fn group(inner: Term, span: Span) -> Self {
        Self::new(TermKind::Group(Box::new(inner)), span)
    }

    pub fn data_type(decl: DataTypeDecl, span: Span) -> Self {
        Self::new(TermKind::DataType(Rc::new(decl)), span)
    }

    pub fn data(datatype: Term, tag: u32, fields: Vec<Term>, span: Span) -> Self {
        Self::new(
            TermKind::Data {
                datatype: Box::new(datatype),
                tag,
                fields,
            },
            span,
        )
    }

    pub fn member(value: Term, field: Symbol, span: Span) -> Self {
        Self::new(
            TermKind::Member {
                value: Box::new(value),
                field,
            },
            span,
        )
    }

    pub fn integer(value: i64, span: Span) -> Self {
        Self::new(TermKind::Literal(Literal::Integer(value)), span)
    }

    pub fn boolean(value: bool, span: Span) -> Self {
        Self::new(TermKind::Literal(Literal::Boolean(value)), span)
    }

    pub fn binary(op: BinaryOp, lhs: Term, rhs: Term, span: Span) -> Self {
        Self::new(
            TermKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    }

    pub fn if_then_else(condition: Term, consequent: Term, alternative: Term, span: Span) -> Self {
        Self::new(
            TermKind::If {
                condition: Box::new(condition),
                consequent: Box::new(consequent),
                alternative: Box::new(alternative),
            },
            span,
        )
    }
}
