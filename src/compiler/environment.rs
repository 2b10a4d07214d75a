use std::collections::HashMap;

use crate::{
    bytecode::Register,
    term::{Binding, BindingId},
};

/// Where a binding lives in the block being built.
///
/// A placeholder register holds the fixpoint cell of a recursive binding
/// whose definition has not been tied yet. Reading the binding has to go
/// through the cell rather than copy the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Local {
    pub register: Register,
    pub placeholder: bool,
}

impl Local {
    pub fn value(register: Register) -> Self {
        Self {
            register,
            placeholder: false,
        }
    }

    pub fn placeholder(register: Register) -> Self {
        Self {
            register,
            placeholder: true,
        }
    }
}

/// Bindings visible in one block.
///
/// There is no parent link: a function body sees the enclosing blocks only
/// through the captures it was created with, which occupy their own
/// registers.
#[derive(Debug, Default, Clone)]
pub struct Environment {
    locals: HashMap<BindingId, Local>,
}

impl Environment {
    /// The environment of a function body: argument in register `0`, then
    /// one register per capture, each keeping the placeholder status it had
    /// in the enclosing block.
    pub fn function(
        parameter: Binding,
        captures: impl IntoIterator<Item = (Binding, Local)>,
    ) -> Self {
        let mut env = Self::default();
        env.define(parameter, Local::value(Register::ARGUMENT));
        for (index, (binding, outer)) in captures.into_iter().enumerate() {
            let register = Register(index as u32 + 1);
            env.define(
                binding,
                Local {
                    register,
                    placeholder: outer.placeholder,
                },
            );
        }
        env
    }

    pub fn get(&self, binding: Binding) -> Option<Local> {
        self.locals.get(&binding.id).copied()
    }

    /// Binds (or rebinds) `binding`, returning the previous location.
    pub fn define(&mut self, binding: Binding, local: Local) -> Option<Local> {
        self.locals.insert(binding.id, local)
    }
}
