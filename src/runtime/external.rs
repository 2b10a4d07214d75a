use core::fmt;
use std::mem;

use crate::{bytecode::Address, source::Symbol};

use super::value::{Fixpoint, Value};

/// Owned snapshot of a value, valid after the arena it came from is gone.
///
/// Functions are shown by their code and capture count only. Captures can
/// lead back to the function itself, so they are never followed.
///
/// Data may nest arbitrarily deep. Conversion, cloning, comparison,
/// formatting and dropping all walk it with an explicit stack.
pub enum External {
    Integer(i64),
    Boolean(bool),
    Function {
        body: Address,
        frame_size: u32,
        captures: usize,
    },
    DataType {
        name: Symbol,
        constructors: Vec<Symbol>,
    },
    Data {
        datatype: Symbol,
        constructor: Symbol,
        fields: Vec<(Symbol, External)>,
    },
    /// `None` while the cell is still pending.
    Fixpoint(Option<Box<External>>),
}

impl External {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::Function { .. } => "function",
            Self::DataType { .. } => "data type",
            Self::Data { .. } => "data",
            Self::Fixpoint(_) => "fixpoint",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(int) => Some(*int),
            _ => None,
        }
    }

    /// Field `name` of a data value.
    pub fn field(&self, name: Symbol) -> Option<&External> {
        match self {
            Self::Data { fields, .. } => fields
                .iter()
                .find_map(|(field, value)| (*field == name).then_some(value)),
            _ => None,
        }
    }

    /// The value in print order, one [`Token`] per step.
    pub(crate) fn tokens(&self) -> Tokens<'_> {
        Tokens {
            stack: vec![Step::Visit(self)],
        }
    }
}

/// A node whose children are still to be converted.
enum Shell {
    Data {
        datatype: Symbol,
        constructor: Symbol,
        names: Vec<Symbol>,
    },
    Fixpoint,
}

impl Shell {
    fn assemble(self, children: Vec<External>) -> External {
        match self {
            Shell::Data {
                datatype,
                constructor,
                names,
            } => External::Data {
                datatype,
                constructor,
                fields: names.into_iter().zip(children).collect(),
            },
            Shell::Fixpoint => External::Fixpoint(children.into_iter().next().map(Box::new)),
        }
    }
}

enum Split<S> {
    Leaf(External),
    Node(Shell, Vec<S>),
}

/// Builds an [`External`] bottom-up from `root`, asking `split` to open
/// one source node at a time.
fn assemble<S>(root: S, mut split: impl FnMut(S) -> Split<S>) -> External {
    let mut stack: Vec<(Shell, std::vec::IntoIter<S>, Vec<External>)> = Vec::new();
    let mut next = root;
    loop {
        let mut value = match split(next) {
            Split::Leaf(value) => value,
            Split::Node(shell, children) => {
                let mut pending = children.into_iter();
                match pending.next() {
                    Some(first) => {
                        let done = Vec::with_capacity(pending.len() + 1);
                        stack.push((shell, pending, done));
                        next = first;
                        continue;
                    }
                    None => shell.assemble(Vec::new()),
                }
            }
        };
        loop {
            let Some((shell, mut pending, mut done)) = stack.pop() else {
                return value;
            };
            done.push(value);
            if let Some(child) = pending.next() {
                stack.push((shell, pending, done));
                next = child;
                break;
            }
            value = shell.assemble(done);
        }
    }
}

impl Clone for External {
    fn clone(&self) -> Self {
        assemble(self, |external| match external {
            External::Data {
                datatype,
                constructor,
                fields,
            } => Split::Node(
                Shell::Data {
                    datatype: *datatype,
                    constructor: *constructor,
                    names: fields.iter().map(|(name, _)| *name).collect(),
                },
                fields.iter().map(|(_, value)| value).collect(),
            ),
            External::Fixpoint(Some(inner)) => Split::Node(Shell::Fixpoint, vec![&**inner]),
            External::Fixpoint(None) => Split::Leaf(External::Fixpoint(None)),
            External::Integer(int) => Split::Leaf(External::Integer(*int)),
            External::Boolean(b) => Split::Leaf(External::Boolean(*b)),
            External::Function {
                body,
                frame_size,
                captures,
            } => Split::Leaf(External::Function {
                body: *body,
                frame_size: *frame_size,
                captures: *captures,
            }),
            External::DataType { name, constructors } => Split::Leaf(External::DataType {
                name: *name,
                constructors: constructors.clone(),
            }),
        })
    }
}

impl PartialEq for External {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some(pair) = pending.pop() {
            match pair {
                (
                    External::Data {
                        datatype,
                        constructor,
                        fields,
                    },
                    External::Data {
                        datatype: other_datatype,
                        constructor: other_constructor,
                        fields: other_fields,
                    },
                ) => {
                    if datatype != other_datatype
                        || constructor != other_constructor
                        || fields.len() != other_fields.len()
                    {
                        return false;
                    }
                    for ((name, value), (other_name, other_value)) in
                        fields.iter().zip(other_fields)
                    {
                        if name != other_name {
                            return false;
                        }
                        pending.push((value, other_value));
                    }
                }
                (External::Fixpoint(Some(a)), External::Fixpoint(Some(b))) => {
                    pending.push((&**a, &**b))
                }
                (External::Fixpoint(None), External::Fixpoint(None)) => {}
                (External::Integer(a), External::Integer(b)) if a == b => {}
                (External::Boolean(a), External::Boolean(b)) if a == b => {}
                (
                    External::Function {
                        body,
                        frame_size,
                        captures,
                    },
                    External::Function {
                        body: other_body,
                        frame_size: other_frame_size,
                        captures: other_captures,
                    },
                ) if body == other_body
                    && frame_size == other_frame_size
                    && captures == other_captures => {}
                (
                    External::DataType { name, constructors },
                    External::DataType {
                        name: other_name,
                        constructors: other_constructors,
                    },
                ) if name == other_name && constructors == other_constructors => {}
                _ => return false,
            }
        }
        true
    }
}

impl Eq for External {}

impl Drop for External {
    fn drop(&mut self) {
        fn detach(external: &mut External, into: &mut Vec<External>) {
            match external {
                External::Data { fields, .. } => {
                    into.extend(mem::take(fields).into_iter().map(|(_, value)| value))
                }
                External::Fixpoint(inner) => into.extend(inner.take().map(|inner| *inner)),
                _ => {}
            }
        }

        let mut orphans = Vec::new();
        detach(self, &mut orphans);
        while let Some(mut orphan) = orphans.pop() {
            detach(&mut orphan, &mut orphans);
        }
    }
}

impl fmt::Debug for External {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in self.tokens() {
            match token {
                Token::Open { constructor, empty } => {
                    write!(f, "Data({constructor}")?;
                    if !empty {
                        write!(f, " {{")?;
                    }
                }
                Token::Field { name, first } => {
                    let sep = if first { " " } else { ", " };
                    write!(f, "{sep}{name}: ")?;
                }
                Token::Close { empty } => {
                    if !empty {
                        write!(f, " }}")?;
                    }
                    write!(f, ")")?;
                }
                Token::Tied => write!(f, "Fixpoint(Some(")?,
                Token::Untied => write!(f, "))")?,
                Token::Leaf(External::Integer(int)) => write!(f, "Integer({int})")?,
                Token::Leaf(External::Boolean(b)) => write!(f, "Boolean({b})")?,
                Token::Leaf(External::Function {
                    body,
                    frame_size,
                    captures,
                }) => write!(
                    f,
                    "Function {{ body: {body}, frame_size: {frame_size}, captures: {captures} }}"
                )?,
                Token::Leaf(External::DataType { name, constructors }) => {
                    write!(f, "DataType {{ name: {name}, constructors: {constructors:?} }}")?
                }
                Token::Leaf(External::Fixpoint(None)) => write!(f, "Fixpoint(None)")?,
                Token::Leaf(External::Data { .. } | External::Fixpoint(Some(_))) => {}
            }
        }
        Ok(())
    }
}

/// One step of printing an [`External`].
pub(crate) enum Token<'a> {
    /// Anything that is neither data nor a tied fixpoint.
    Leaf(&'a External),
    Open {
        constructor: Symbol,
        empty: bool,
    },
    Field {
        name: Symbol,
        first: bool,
    },
    Close {
        empty: bool,
    },
    /// Before and after the value of a tied fixpoint.
    Tied,
    Untied,
}

enum Step<'a> {
    Visit(&'a External),
    Emit(Token<'a>),
}

pub(crate) struct Tokens<'a> {
    stack: Vec<Step<'a>>,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        match self.stack.pop()? {
            Step::Emit(token) => Some(token),
            Step::Visit(External::Data {
                constructor,
                fields,
                ..
            }) => {
                let empty = fields.is_empty();
                self.stack.push(Step::Emit(Token::Close { empty }));
                for (index, (name, value)) in fields.iter().enumerate().rev() {
                    self.stack.push(Step::Visit(value));
                    self.stack.push(Step::Emit(Token::Field {
                        name: *name,
                        first: index == 0,
                    }));
                }
                Some(Token::Open {
                    constructor: *constructor,
                    empty,
                })
            }
            Step::Visit(External::Fixpoint(Some(inner))) => {
                self.stack.push(Step::Emit(Token::Untied));
                self.stack.push(Step::Visit(&**inner));
                Some(Token::Tied)
            }
            Step::Visit(leaf) => Some(Token::Leaf(leaf)),
        }
    }
}

pub trait ToExternal {
    fn to_external(&self) -> External;
}

macro_rules! to_external {
    (simple $ty:ty as $kind:ident) => {
        impl ToExternal for $ty {
            fn to_external(&self) -> External {
                External::$kind(*self)
            }
        }
    };
}

to_external!(simple i64 as Integer);
to_external!(simple bool as Boolean);

impl ToExternal for External {
    fn to_external(&self) -> External {
        self.clone()
    }
}

impl<'gc> ToExternal for Value<'gc> {
    fn to_external(&self) -> External {
        assemble(*self, |value| match value {
            Value::Integer(int) => Split::Leaf(int.to_external()),
            Value::Boolean(b) => Split::Leaf(b.to_external()),
            Value::Function(function) => Split::Leaf(External::Function {
                body: function.body,
                frame_size: function.frame_size,
                captures: function.captures.len(),
            }),
            Value::DataType(datatype) => Split::Leaf(External::DataType {
                name: datatype.decl.name,
                constructors: datatype.decl.constructors.iter().map(|c| c.name).collect(),
            }),
            Value::Data(data) => {
                let datatype = data.datatype.decl.name;
                let (constructor, names) = match data.constructor() {
                    Some(decl) => (decl.name, decl.fields.clone()),
                    None => (datatype, Vec::new()),
                };
                let shell = Shell::Data {
                    datatype,
                    constructor,
                    names,
                };
                Split::Node(shell, data.fields.clone())
            }
            Value::Fixpoint(cell) => match *cell.borrow() {
                Fixpoint::Pending => Split::Leaf(External::Fixpoint(None)),
                Fixpoint::Tied(value) => Split::Node(Shell::Fixpoint, vec![value]),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use assert2::{check, let_assert};
    use gc_arena::{Arena, Gc, Rootable};

    use super::{External, ToExternal};
    use crate::{
        runtime::value::{Data, DataType, Value},
        source::{Intern, Symbol},
        term::{ConstructorDecl, DataTypeDecl},
    };

    #[test]
    fn data_fields_are_named() {
        let mut rodeo = lasso::Rodeo::default();
        let [pair, x, y] = ["Pair", "x", "y"].map(|name| rodeo.intern(name));
        let decl = Rc::new(DataTypeDecl {
            name: pair,
            constructors: vec![ConstructorDecl {
                name: pair,
                fields: vec![x, y],
            }],
        });

        let arena = Arena::<Rootable![()]>::new(|_| ());
        let external = arena.mutate(|mc, _| {
            let datatype = Gc::new(mc, DataType { decl });
            let data = Gc::new(
                mc,
                Data {
                    datatype,
                    tag: 0,
                    fields: vec![Value::Integer(3), Value::Boolean(false)],
                },
            );
            Value::Data(data).to_external()
        });

        check!(external.kind() == "data");
        check!(external.field(x) == Some(&External::Integer(3)));
        check!(external.field(y) == Some(&External::Boolean(false)));
        let_assert!(External::Data { constructor, .. } = &external);
        check!(*constructor == pair);
    }

    /// `Box { item = Box { item = ... 0 } }`, `depth` boxes deep.
    fn nested(boxed: Symbol, item: Symbol, depth: usize) -> External {
        (0..depth).fold(External::Integer(0), |inner, _| External::Data {
            datatype: boxed,
            constructor: boxed,
            fields: vec![(item, inner)],
        })
    }

    #[test]
    fn deep_values_clone_compare_and_drop() {
        let mut rodeo = lasso::Rodeo::default();
        let [boxed, item] = ["Box", "item"].map(|name| rodeo.intern(name));

        let deep = nested(boxed, item, 300_000);
        let copy = deep.clone();
        check!(copy == deep);
        check!(copy != nested(boxed, item, 299_999));
        check!(format!("{:?}", nested(boxed, item, 1)).starts_with("Data(#"));
    }

    #[test]
    fn tied_fixpoints_compare_by_value() {
        let tied = External::Fixpoint(Some(Box::new(External::Integer(4))));
        check!(tied.clone() == tied);
        check!(tied != External::Fixpoint(None));
        check!(format!("{tied:?}") == "Fixpoint(Some(Integer(4)))");
    }
}
