//! Names and source locations shared with the front end and the host.
//!
//! The compiler never owns source text or an interner. It only needs three
//! narrow services: turning a name into a [`Symbol`], turning it back for
//! display, and rendering a message against a [`Span`].

use core::fmt;

use gc_arena::Collect;
use lasso::Key;

/// An interned name.
#[derive(Collect, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[collect(require_static)]
pub struct Symbol(lasso::Spur);

impl From<lasso::Spur> for Symbol {
    fn from(value: lasso::Spur) -> Self {
        Self(value)
    }
}

impl Symbol {
    pub fn spur(self) -> lasso::Spur {
        self.0
    }
}

// Without an interner at hand the best we can do is the raw id
impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0.into_usize())
    }
}

/// Where a term came from: the interned source name plus a byte range
/// (start inclusive, end exclusive).
#[derive(Collect, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[collect(require_static)]
pub struct Span {
    pub source: Symbol,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(source: Symbol, start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { source, start, end }
    }
}

/// Name interning.
pub trait Intern {
    fn intern(&mut self, name: &str) -> Symbol;
}

/// Name resolution for rendering.
pub trait Resolve {
    fn resolve(&self, symbol: Symbol) -> &str;
}

impl Intern for lasso::Rodeo {
    fn intern(&mut self, name: &str) -> Symbol {
        Symbol(self.get_or_intern(name))
    }
}

impl<T: lasso::Reader> Resolve for T {
    fn resolve(&self, symbol: Symbol) -> &str {
        lasso::Resolver::resolve(self, &symbol.0)
    }
}

/// Diagnostic rendering, provided by the host.
///
/// The host owns the source text; it is expected to map the span to lines
/// and columns and underline it.
pub trait Diagnostics {
    fn render_error(&self, message: &str, span: Span) -> String;
}
