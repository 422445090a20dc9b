//! Type-keyed side tables owned by events and channels.
//!
//! A connection handler typically stores per-connection state on the
//! connection's channel and per-request scratch data on the event. The table
//! is dropped together with its owner.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// A heterogeneous map holding at most one value per type.
#[derive(Default)]
pub struct Associations {
    slots: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl Associations {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<TypeId, Box<dyn Any + Send + Sync>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value`, returning the value of the same type it replaced.
    pub fn insert<V: Any + Send + Sync>(&self, value: V) -> Option<V> {
        self.slots()
            .insert(TypeId::of::<V>(), Box::new(value))
            .and_then(|old| old.downcast::<V>().ok())
            .map(|old| *old)
    }

    /// A clone of the stored value of type `V`.
    pub fn get<V: Any + Send + Sync + Clone>(&self) -> Option<V> {
        self.slots()
            .get(&TypeId::of::<V>())
            .and_then(|value| value.downcast_ref::<V>())
            .cloned()
    }

    /// Runs `f` on the stored value of type `V`, if any.
    pub fn with<V: Any + Send + Sync, R>(&self, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.slots()
            .get_mut(&TypeId::of::<V>())
            .and_then(|value| value.downcast_mut::<V>())
            .map(f)
    }

    /// Returns the stored value, inserting `init()` first when absent.
    pub fn get_or_insert_with<V: Any + Send + Sync + Clone>(&self, init: impl FnOnce() -> V) -> V {
        let mut slots = self.slots();
        let slot = slots
            .entry(TypeId::of::<V>())
            .or_insert_with(|| Box::new(init()));
        match slot.downcast_ref::<V>() {
            Some(value) => value.clone(),
            None => unreachable!("slot keyed by TypeId holds a different type"),
        }
    }

    pub fn remove<V: Any + Send + Sync>(&self) -> Option<V> {
        self.slots()
            .remove(&TypeId::of::<V>())
            .and_then(|old| old.downcast::<V>().ok())
            .map(|old| *old)
    }

    pub fn contains<V: Any + Send + Sync>(&self) -> bool {
        self.slots().contains_key(&TypeId::of::<V>())
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

impl fmt::Debug for Associations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Associations")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Session(u32);

    #[test]
    fn test_insert_get_remove() {
        let table = Associations::new();
        assert!(table.is_empty());
        assert_eq!(table.insert(Session(1)), None);
        assert_eq!(table.insert(Session(2)), Some(Session(1)));
        assert_eq!(table.get::<Session>(), Some(Session(2)));
        assert!(table.contains::<Session>());
        assert_eq!(table.remove::<Session>(), Some(Session(2)));
        assert!(!table.contains::<Session>());
    }

    #[test]
    fn test_values_are_keyed_by_type() {
        let table = Associations::new();
        table.insert(Session(7));
        table.insert(String::from("peer"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get::<String>().as_deref(), Some("peer"));
        assert_eq!(table.get::<u64>(), None);
    }

    #[test]
    fn test_with_mutates_in_place() {
        let table = Associations::new();
        table.insert(Vec::<u8>::new());
        table.with(|buf: &mut Vec<u8>| buf.extend_from_slice(b"ab"));
        assert_eq!(table.get::<Vec<u8>>(), Some(b"ab".to_vec()));
        assert_eq!(table.with(|_: &mut Session| ()), None);
    }

    #[test]
    fn test_get_or_insert_with_initializes_once() {
        let table = Associations::new();
        assert_eq!(table.get_or_insert_with(|| Session(3)), Session(3));
        assert_eq!(table.get_or_insert_with(|| Session(4)), Session(3));
    }
}
