//! Interned static strings plus the runtime string value.
//!
//! Static strings live for the process lifetime and are identified by a
//! stable 32-bit id, which is what the event-key encoder stores inline.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroU32;
use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StringId(NonZeroU32);

impl StringId {
    pub fn raw(self) -> u32 {
        self.0.get()
    }

    pub fn from_raw(raw: u32) -> Option<StringId> {
        NonZeroU32::new(raw).map(StringId)
    }
}

#[derive(Default)]
struct Interner {
    by_text: AHashMap<&'static str, StringId>,
    by_id: Vec<&'static str>,
}

static INTERNER: Lazy<RwLock<Interner>> = Lazy::new(|| RwLock::new(Interner::default()));

/// Intern `text`, returning the stable id shared by all equal static strings.
pub fn intern(text: &str) -> StringId {
    {
        let interner = INTERNER.read();
        if let Some(&id) = interner.by_text.get(text) {
            return id;
        }
    }

    let mut interner = INTERNER.write();
    if let Some(&id) = interner.by_text.get(text) {
        return id;
    }
    let leaked: &'static str = Box::leak(text.to_owned().into_boxed_str());
    let raw = interner.by_id.len() as u32 + 1;
    let id = StringId(NonZeroU32::new(raw).unwrap());
    interner.by_id.push(leaked);
    interner.by_text.insert(leaked, id);
    id
}

/// Resolve an interned id. Ids only come from [`intern`], so this total
/// lookup panics on a corrupted id.
pub fn lookup(id: StringId) -> &'static str {
    let interner = INTERNER.read();
    interner.by_id[(id.raw() - 1) as usize]
}

/// A runtime string value: either an interned static string or a counted
/// heap string.
#[derive(Clone)]
pub enum StringVal {
    Static(StringId),
    Counted(Arc<str>),
}

impl StringVal {
    pub fn new_static(text: &str) -> StringVal {
        StringVal::Static(intern(text))
    }

    pub fn new_counted(text: &str) -> StringVal {
        StringVal::Counted(Arc::from(text))
    }

    pub fn is_static(&self) -> bool {
        matches!(self, StringVal::Static(_))
    }

    pub fn static_id(&self) -> Option<StringId> {
        match self {
            StringVal::Static(id) => Some(*id),
            StringVal::Counted(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StringVal::Static(id) => lookup(*id),
            StringVal::Counted(s) => s,
        }
    }

    /// Static (interned) copy of this string.
    pub fn to_static(&self) -> StringVal {
        match self {
            StringVal::Static(id) => StringVal::Static(*id),
            StringVal::Counted(s) => StringVal::Static(intern(s)),
        }
    }
}

// Equality and hashing go by contents so a counted string indexes the same
// array slot as its interned twin.
impl PartialEq for StringVal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StringVal::Static(a), StringVal::Static(b)) => a == b,
            _ => self.as_str() == other.as_str(),
        }
    }
}

impl Eq for StringVal {}

impl Hash for StringVal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Debug for StringVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StringVal::Static(_) => write!(f, "static({:?})", self.as_str()),
            StringVal::Counted(_) => write!(f, "counted({:?})", self.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let a = intern("hello");
        let b = intern("hello");
        assert_eq!(a, b);
        assert_eq!(lookup(a), "hello");
    }

    #[test]
    fn test_counted_equals_static() {
        let a = StringVal::new_static("key");
        let b = StringVal::new_counted("key");
        assert_eq!(a, b);
        assert!(!b.is_static());
        assert!(b.to_static().is_static());
    }
}
