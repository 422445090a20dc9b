//! # Matching keys
//!
//! Channels and events never compare by identity. Each one resolves to a
//! [`Criterion`] (its default key) and answers whether it is eligible for the
//! key a handler declared. Handler scopes store criteria; the resolver only
//! ever asks [`Eligible::is_eligible_for`].
//!
//! The key space is shared between events and channels:
//!
//! | Variant    | As event key                  | As channel key               |
//! |------------|-------------------------------|------------------------------|
//! | `Any`      | every event                   | every channel (broadcast)    |
//! | `Type`     | the type or a descendant type | the type or a descendant     |
//! | `Exact`    | events of exactly that type   | channels of exactly the type |
//! | `Name`     | named events with that name   | named channels with the name |
//! | `Instance` | never                         | one component's own channel  |

use std::{
    any::TypeId,
    fmt,
    hash::{Hash, Hasher},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Identity of a Rust type, usable as a matching key.
///
/// Equality and hashing use only the [`TypeId`]; the name is kept for logs.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key of the type `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path, generic arguments left intact.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        match base.rfind("::") {
            Some(pos) => &self.name[pos + 2..],
            None => self.name,
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Stable identity of a component, unchanged by attach and detach.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Allocates a fresh, process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A matching key declared by a handler or derived from an event or channel.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Criterion {
    /// Root of both hierarchies: "any event" or "broadcast".
    Any,
    /// A type, matched by itself and by its declared descendants.
    Type(TypeKey),
    /// A type, matched by itself only.
    Exact(TypeKey),
    /// An explicit name.
    Name(Arc<str>),
    /// The own channel of one component.
    Instance(ComponentId),
}

impl Criterion {
    /// The type key of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Criterion::Type(TypeKey::of::<T>())
    }

    /// The type key of `T`, not matched by descendants.
    pub fn exactly<T: ?Sized + 'static>() -> Self {
        Criterion::Exact(TypeKey::of::<T>())
    }

    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Criterion::Name(name.into())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Criterion::Any)
    }
}

impl fmt::Debug for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Any => f.write_str("*"),
            Criterion::Type(key) => write!(f, "{key:?}"),
            Criterion::Exact(key) => write!(f, "={key:?}"),
            Criterion::Name(name) => write!(f, "{name:?}"),
            Criterion::Instance(id) => write!(f, "{id:?}"),
        }
    }
}

impl From<TypeKey> for Criterion {
    fn from(key: TypeKey) -> Self {
        Criterion::Type(key)
    }
}

impl From<&str> for Criterion {
    fn from(name: &str) -> Self {
        Criterion::Name(name.into())
    }
}

impl From<ComponentId> for Criterion {
    fn from(id: ComponentId) -> Self {
        Criterion::Instance(id)
    }
}

/// Something that can be matched against handler criteria.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be matched against handler criteria",
    label = "missing `Eligible` implementation",
    note = "Channels and fired events implement `Eligible`."
)]
pub trait Eligible {
    /// The key that represents this value in cache keys.
    fn default_criterion(&self) -> Criterion;

    /// Whether a handler that declared `criterion` should see this value.
    fn is_eligible_for(&self, criterion: &Criterion) -> bool;
}

/// A type and its ancestors, nearest first, own key at index 0.
///
/// Computed once when a typed channel or event is created so that matching
/// never walks a type hierarchy.
#[derive(Clone, PartialEq, Eq)]
pub struct Lineage(Arc<[TypeKey]>);

impl Lineage {
    pub fn new(own: TypeKey, ancestors: Vec<TypeKey>) -> Self {
        let mut keys = Vec::with_capacity(ancestors.len() + 1);
        keys.push(own);
        for key in ancestors {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Self(keys.into())
    }

    pub fn own(&self) -> TypeKey {
        self.0[0]
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.0.contains(key)
    }

    pub fn keys(&self) -> &[TypeKey] {
        &self.0
    }

    /// `Any`, any key in the lineage, or exactly the own key.
    pub fn matches(&self, criterion: &Criterion) -> bool {
        match criterion {
            Criterion::Any => true,
            Criterion::Type(key) => self.contains(key),
            Criterion::Exact(key) => self.own() == *key,
            _ => false,
        }
    }
}

impl fmt::Debug for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base;
    struct Derived;
    mod nested {
        pub struct Generic<T>(pub T);
    }

    #[test]
    fn test_type_key_equality_ignores_name() {
        assert_eq!(TypeKey::of::<Base>(), TypeKey::of::<Base>());
        assert_ne!(TypeKey::of::<Base>(), TypeKey::of::<Derived>());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(TypeKey::of::<Base>().short_name(), "Base");
        assert_eq!(
            TypeKey::of::<nested::Generic<u8>>().short_name(),
            "Generic<u8>"
        );
    }

    #[test]
    fn test_lineage_matching() {
        let lineage = Lineage::new(TypeKey::of::<Derived>(), vec![TypeKey::of::<Base>()]);
        assert!(lineage.matches(&Criterion::Any));
        assert!(lineage.matches(&Criterion::of::<Derived>()));
        assert!(lineage.matches(&Criterion::of::<Base>()));
        assert!(!lineage.matches(&Criterion::of::<u32>()));
        assert!(!lineage.matches(&Criterion::named("Derived")));
    }

    #[test]
    fn test_exact_criterion_skips_descendants() {
        let lineage = Lineage::new(TypeKey::of::<Derived>(), vec![TypeKey::of::<Base>()]);
        assert!(lineage.matches(&Criterion::exactly::<Derived>()));
        assert!(!lineage.matches(&Criterion::exactly::<Base>()));
        assert_ne!(Criterion::exactly::<Base>(), Criterion::of::<Base>());
    }

    #[test]
    fn test_lineage_deduplicates() {
        let lineage = Lineage::new(
            TypeKey::of::<Derived>(),
            vec![TypeKey::of::<Base>(), TypeKey::of::<Base>()],
        );
        assert_eq!(lineage.keys().len(), 2);
        assert_eq!(lineage.own(), TypeKey::of::<Derived>());
    }

    #[test]
    fn test_component_ids_are_unique() {
        let a = ComponentId::next();
        let b = ComponentId::next();
        assert_ne!(a, b);
        assert_ne!(Criterion::from(a), Criterion::from(b));
    }
}
