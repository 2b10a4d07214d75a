//! Values the machine computes with.
use core::fmt;
use std::rc::Rc;

use gc_arena::{Collect, Gc, Mutation, RefLock};

use crate::{
    bytecode::Address,
    error::Violation,
    term::{ConstructorDecl, DataTypeDecl},
};

pub type FixpointPtr<'gc> = Gc<'gc, RefLock<Fixpoint<'gc>>>;

#[derive(Collect, Clone, Copy, Debug)]
#[collect(no_drop)]
pub enum Value<'gc> {
    Integer(i64),
    Boolean(bool),
    Function(Gc<'gc, Function<'gc>>),
    DataType(Gc<'gc, DataType>),
    Data(Gc<'gc, Data<'gc>>),
    Fixpoint(FixpointPtr<'gc>),
}

impl<'gc> Value<'gc> {
    /// Used in fault messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::Function(_) => "function",
            Self::DataType(_) => "data type",
            Self::Data(_) => "data",
            Self::Fixpoint(_) => "fixpoint",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(int) => Some(*int),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// A fresh, untied fixpoint cell.
    pub fn pending(mc: &Mutation<'gc>) -> Self {
        Self::Fixpoint(Gc::new(mc, RefLock::new(Fixpoint::Pending)))
    }
}

/// A closure: code plus the values it captured, in capture order.
#[derive(Collect)]
#[collect(no_drop)]
pub struct Function<'gc> {
    pub body: Address,
    pub frame_size: u32,
    pub captures: Vec<Value<'gc>>,
}

// Captures may reach back to this function through a fixpoint.
impl<'gc> fmt::Debug for Function<'gc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("body", &self.body)
            .field("frame_size", &self.frame_size)
            .field("captures", &self.captures.len())
            .finish()
    }
}

#[derive(Collect, Debug)]
#[collect(require_static)]
pub struct DataType {
    pub decl: Rc<DataTypeDecl>,
}

#[derive(Collect, Debug)]
#[collect(no_drop)]
pub struct Data<'gc> {
    pub datatype: Gc<'gc, DataType>,
    pub tag: u32,
    pub fields: Vec<Value<'gc>>,
}

impl<'gc> Data<'gc> {
    pub fn constructor(&self) -> Option<&ConstructorDecl> {
        self.datatype.decl.constructors.get(self.tag as usize)
    }
}

/// Cell standing in for a recursive binding until its definition exists.
#[derive(Collect, Clone, Copy, Debug, Default)]
#[collect(no_drop)]
pub enum Fixpoint<'gc> {
    #[default]
    Pending,
    Tied(Value<'gc>),
}

impl<'gc> Fixpoint<'gc> {
    pub fn tie(
        cell: FixpointPtr<'gc>,
        mc: &Mutation<'gc>,
        value: Value<'gc>,
    ) -> Result<(), Violation> {
        let mut state = cell.borrow_mut(mc);
        match *state {
            Fixpoint::Pending => {
                *state = Fixpoint::Tied(value);
                Ok(())
            }
            Fixpoint::Tied(_) => Err(Violation::FixpointTiedTwice),
        }
    }

    pub fn get(cell: FixpointPtr<'gc>) -> Result<Value<'gc>, Violation> {
        match *cell.borrow() {
            Fixpoint::Tied(value) => Ok(value),
            Fixpoint::Pending => Err(Violation::UntiedFixpoint),
        }
    }
}
