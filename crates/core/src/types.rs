//! The DDP type system: five primitives plus one list constructor.
//!
//! Types are compared structurally (`#[derive(PartialEq)]` on a plain enum
//! gives us that for free) — there is no subtyping, no type variables, and
//! no row polymorphism here.

use std::fmt;

/// A DDP type: one of the five primitives, or a homogeneous list of one.
///
/// `Liste von Liste von Zahl` is not a legal DDP type — lists are only ever
/// one level deep, of a primitive element type — so `List` boxes a
/// `Primitive`, not a `Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(Primitive),
    List(Primitive),
}

/// The five primitive DDP types (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// `Zahl` — 64-bit signed integer.
    Zahl,
    /// `Kommazahl` — 64-bit IEEE-754 float.
    Kommazahl,
    /// `Boolean` — 1-bit truth value.
    Boolean,
    /// `Buchstabe` — a single Unicode scalar value.
    Buchstabe,
    /// `Text` — heap-allocated, reference-counted UTF-8 string.
    Text,
}

impl Primitive {
    /// Whether values of this type live on the heap and are reference
    /// counted (spec §3 "Heap value representation").
    pub const fn is_heap(self) -> bool {
        matches!(self, Primitive::Text)
    }

    pub const fn keyword(self) -> &'static str {
        match self {
            Primitive::Zahl => "Zahl",
            Primitive::Kommazahl => "Kommazahl",
            Primitive::Boolean => "Boolean",
            Primitive::Buchstabe => "Buchstabe",
            Primitive::Text => "Text",
        }
    }
}

impl Type {
    pub const fn is_heap(self) -> bool {
        match self {
            Type::Primitive(p) => p.is_heap(),
            // every list variant is itself a heap-allocated, refcounted block
            Type::List(_) => true,
        }
    }

    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Type::Primitive(Primitive::Zahl) | Type::Primitive(Primitive::Kommazahl)
        )
    }

    pub const fn is_list(self) -> bool {
        matches!(self, Type::List(_))
    }

    /// The type yielded by indexing into `self`, if `self` supports it
    /// (text yields `Buchstabe`, `Liste von T` yields `T`).
    pub const fn element_type(self) -> Option<Type> {
        match self {
            Type::Primitive(Primitive::Text) => Some(Type::Primitive(Primitive::Buchstabe)),
            Type::List(p) => Some(Type::Primitive(p)),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p.keyword()),
            Type::List(p) => write!(f, "Liste von {}", p.keyword()),
        }
    }
}
