//! Buffer identity interning.
//!
//! Residency refinement joins call-site arguments that refer to the same
//! buffer. Instead of comparing value handles, every distinct value name is
//! interned once into a [`BufferId`].

use string_interner::{StringInterner, DefaultSymbol, backend::StringBackend, Symbol as SymbolTrait};
use std::fmt;
use serde::{Serialize, Deserialize};

type Backend = StringBackend<DefaultSymbol>;

/// Stable key for a buffer (or scalar) value within one analysis.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferId(u32);

impl BufferId {
    pub fn as_raw(&self) -> u32 { self.0 }
}

impl fmt::Debug for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferId({})", self.0)
    }
}

/// Interner mapping value names to [`BufferId`]s.
#[derive(Debug, Clone)]
pub struct BufferInterner {
    interner: StringInterner<Backend>,
}

impl Default for BufferInterner {
    fn default() -> Self { Self::new() }
}

impl BufferInterner {
    pub fn new() -> Self {
        Self { interner: StringInterner::new() }
    }

    pub fn intern(&mut self, name: &str) -> BufferId {
        let sym = self.interner.get_or_intern(name);
        BufferId(sym.to_usize() as u32)
    }

    pub fn get(&self, name: &str) -> Option<BufferId> {
        self.interner.get(name).map(|sym| BufferId(sym.to_usize() as u32))
    }

    pub fn resolve(&self, id: BufferId) -> Option<&str> {
        let sym = DefaultSymbol::try_from_usize(id.0 as usize)?;
        self.interner.resolve(sym)
    }

    pub fn len(&self) -> usize { self.interner.len() }
    pub fn is_empty(&self) -> bool { self.interner.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_same_id() {
        let mut interner = BufferInterner::new();
        let a = interner.intern("A");
        let b = interner.intern("B");
        assert_eq!(a, interner.intern("A"));
        assert_ne!(a, b);
        assert_eq!(interner.resolve(b), Some("B"));
        assert_eq!(interner.get("C"), None);
        assert_eq!(interner.len(), 2);
    }
}
