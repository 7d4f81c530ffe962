//! Type-erased keys.
//!
//! Scratch values and long transactions are addressed by caller-supplied keys of any
//! hashable type. Keys of different types never compare equal, so `"a"` and `String::from("a")`
//! address different entries.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A caller-supplied key.
pub trait OpaqueKey: Hash + Eq + fmt::Debug + Send + Sync + 'static {}

impl<T> OpaqueKey for T where T: Hash + Eq + fmt::Debug + Send + Sync + 'static {}

trait DynKey: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn DynKey) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T: OpaqueKey> DynKey for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynKey) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }

    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An owned, type-erased key.
pub(crate) struct AnyKey(Box<dyn DynKey>);

impl AnyKey {
    pub(crate) fn new<K: OpaqueKey>(key: K) -> Self {
        Self(Box::new(key))
    }

    /// Key for a scratch slot: the key paired with the value type stored under it.
    pub(crate) fn slot<K: OpaqueKey, V: 'static>(key: K) -> Self {
        Self::new((key, TypeId::of::<V>()))
    }

    /// `Debug` rendering of the wrapped key, used in errors and logs.
    pub(crate) fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

impl PartialEq for AnyKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(&*other.0)
    }
}

impl Eq for AnyKey {}

impl Hash for AnyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl fmt::Debug for AnyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.dyn_fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_same_type_equality() {
        assert_eq!(AnyKey::new("batch"), AnyKey::new("batch"));
        assert_ne!(AnyKey::new("batch"), AnyKey::new("other"));
    }

    #[test]
    fn test_different_types_never_equal() {
        assert_ne!(AnyKey::new("7"), AnyKey::new(String::from("7")));
        assert_ne!(AnyKey::new(7u32), AnyKey::new(7u64));
    }

    #[test]
    fn test_slot_is_scoped_by_value_type() {
        assert_eq!(AnyKey::slot::<_, u32>("n"), AnyKey::slot::<_, u32>("n"));
        assert_ne!(AnyKey::slot::<_, u32>("n"), AnyKey::slot::<_, String>("n"));
    }

    #[test]
    fn test_hash_map_lookup() {
        let mut map = HashMap::new();
        map.insert(AnyKey::new(1u8), "one");
        map.insert(AnyKey::new("one"), "str");

        assert_eq!(map.get(&AnyKey::new(1u8)), Some(&"one"));
        assert_eq!(map.get(&AnyKey::new("one")), Some(&"str"));
        assert_eq!(map.get(&AnyKey::new(1u16)), None);
    }

    #[test]
    fn test_describe() {
        assert_eq!(AnyKey::new("batch").describe(), "\"batch\"");
        assert_eq!(AnyKey::new(42u32).describe(), "42");
    }
}
