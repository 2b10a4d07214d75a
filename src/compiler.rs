//! Compile resolved terms into bytecode.
//!
//! Compilation runs in two passes. The [`builder`] turns a term into IR:
//! symbolic instructions over frame-relative registers, with every function
//! body kept as its own nested block. [`lower`] then flattens that tree into
//! one [`Program`], sizes every frame and relocates addresses.
//!
//! For example, `f = n -> f n, f 1` builds into
//!
//! ```text
//! == block (params 0) ==
//! r0 = begin-fixpoint
//! r1 = function [r0]
//!   == block (params 2) ==
//!   r2 = deref-fixpoint r1
//!   r3 = copy r0
//!   tail-call r2 r3
//! end-fixpoint r0 r1
//! r2 = copy r1
//! r3 = literal 1
//! r4 = call r2 r3
//! exit r4
//! ```
//!
//! and lowers to a program where the top level occupies addresses `0..7`
//! and the function body `7..10`.

use tracing::debug;

use crate::{bytecode::Program, error::Result, term::Term};

pub mod analysis;
pub mod builder;
pub mod environment;
pub mod ir;
pub mod lower;

/// Compiles a closed term.
pub fn compile(term: &Term) -> Result<Program> {
    let block = builder::build(term)?;
    let program = lower::lower(&block)?;
    debug!(
        target: "knot::compiler",
        instructions = program.len(),
        blocks = program.blocks.len(),
        entry_frame_size = program.entry_frame_size,
        "compiled term"
    );
    Ok(program)
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::compile;
    use crate::{
        source::{Intern, Span},
        term::{Binder, Term},
    };

    #[test]
    fn documented_layout() {
        let mut rodeo = lasso::Rodeo::default();
        let span = Span::new(rodeo.intern("doc.kn"), 0, 0);
        let mut binder = Binder::default();
        let f = binder.fresh(rodeo.intern("f"));
        let n = binder.fresh(rodeo.intern("n"));

        let definition = Term::abstraction(
            n,
            Term::application(Term::variable(f, span), Term::variable(n, span), span),
            span,
        );
        let body = Term::application(Term::variable(f, span), Term::integer(1, span), span);
        let program = compile(&Term::let_in(f, definition, body, span)).unwrap();

        check!(program.blocks.len() == 2);
        check!(program.blocks[0].len == 7);
        check!(program.blocks[1].start.0 == 7);
        check!(program.blocks[1].len == 3);
        check!(program.entry_frame_size == 5);
        check!(program.blocks[1].frame_size == 4);
    }
}
