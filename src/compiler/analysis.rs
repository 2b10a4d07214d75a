//! Free-variable analysis over resolved terms.

use std::collections::HashSet;

use crate::term::{Binding, BindingId, Term, TermKind};

/// Bindings referenced in `term` but not bound inside it, in order of first
/// occurrence. The order decides capture layout, so it has to be stable.
pub fn free_variables(term: &Term) -> Vec<Binding> {
    let mut collector = FreeVariables::default();
    collector.visit(term);
    collector.found
}

#[derive(Default)]
struct FreeVariables {
    bound: Vec<BindingId>,
    seen: HashSet<BindingId>,
    found: Vec<Binding>,
}

impl FreeVariables {
    fn visit(&mut self, term: &Term) {
        match &term.kind {
            TermKind::Variable(binding) => {
                if !self.bound.contains(&binding.id) && self.seen.insert(binding.id) {
                    self.found.push(*binding);
                }
            }
            TermKind::Abstraction { parameter, body } => {
                self.bound.push(parameter.id);
                self.visit(body);
                self.bound.pop();
            }
            TermKind::Application { function, argument } => {
                self.visit(function);
                self.visit(argument);
            }
            TermKind::Let {
                binding,
                definition,
                body,
            } => {
                // in scope for its own definition, see `TermKind::Let`
                self.bound.push(binding.id);
                self.visit(definition);
                self.visit(body);
                self.bound.pop();
            }
            TermKind::Group(inner) => self.visit(inner),
            TermKind::DataType(_) | TermKind::Literal(_) => {}
            TermKind::Data {
                datatype, fields, ..
            } => {
                self.visit(datatype);
                fields.iter().for_each(|f| self.visit(f));
            }
            TermKind::Member { value, .. } => self.visit(value),
            TermKind::Binary { lhs, rhs, .. } => {
                self.visit(lhs);
                self.visit(rhs);
            }
            TermKind::If {
                condition,
                consequent,
                alternative,
            } => {
                self.visit(condition);
                self.visit(consequent);
                self.visit(alternative);
            }
        }
    }
}

/// Whether `binding` is referenced from its own definition.
pub fn is_recursive(binding: &Binding, definition: &Term) -> bool {
    free_variables(definition)
        .iter()
        .any(|free| free.id == binding.id)
}
