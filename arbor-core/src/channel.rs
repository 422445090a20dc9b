//! # Channels
//!
//! A [`Channel`] identifies a logical bus. Events are fired on one or more
//! channels and a handler sees an event only if at least one of those
//! channels is eligible for one of the handler's channel criteria.
//!
//! # Variants
//!
//! - **Broadcast**: eligible for every key; its own key ([`Criterion::Any`])
//!   is accepted by every channel.
//! - **Typed**: created from a [`ChannelType`]; eligible for its own type key
//!   and for every declared ancestor, so a handler listening on a base type
//!   also sees the more specific channels.
//! - **Named**: eligible for the identical name only.
//! - **Component**: the own channel of one component instance.
//!
//! # Subchannels
//!
//! [`Channel::subchannel`] yields a channel that matches exactly like its
//! main channel but owns a fresh [`Associations`] table. Network components
//! use one subchannel per connection to keep per-connection state.

use crate::{
    associations::Associations,
    criterion::{ComponentId, Criterion, Eligible, Lineage, TypeKey},
};
use std::{
    fmt,
    sync::{Arc, LazyLock},
};

/// Marker trait for types that tag a channel.
///
/// Ancestors make the channel visible to handlers declared on those types.
///
/// ```rust,ignore
/// struct Transport;
/// impl ChannelType for Transport {}
///
/// struct Tls;
/// impl ChannelType for Tls {
///     fn ancestors() -> Vec<TypeKey> {
///         vec![TypeKey::of::<Transport>()]
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be used to tag a channel",
    label = "missing `ChannelType` implementation",
    note = "Implement `ChannelType` or use `#[derive(ChannelType)]`."
)]
pub trait ChannelType: Send + Sync + 'static {
    /// All ancestor channel types, in any order.
    fn ancestors() -> Vec<TypeKey>
    where
        Self: Sized,
    {
        Vec::new()
    }
}

#[derive(Clone, PartialEq, Eq)]
enum ChannelKind {
    Broadcast,
    Typed(Lineage),
    Named(Arc<str>),
    Component(ComponentId),
}

/// An immutable bus identifier.
///
/// Cloning shares the associated-data table; two channels compare equal when
/// their matching keys are equal, whatever table they carry.
#[derive(Clone)]
pub struct Channel {
    kind: ChannelKind,
    associations: Arc<Associations>,
}

static BROADCAST: LazyLock<Channel> = LazyLock::new(|| Channel::from_kind(ChannelKind::Broadcast));

impl Channel {
    fn from_kind(kind: ChannelKind) -> Self {
        Self {
            kind,
            associations: Arc::new(Associations::new()),
        }
    }

    /// The channel every handler listens on and every channel key accepts.
    pub fn broadcast() -> Self {
        BROADCAST.clone()
    }

    /// A channel tagged with the type `T` and its ancestors.
    pub fn of<T: ChannelType>() -> Self {
        Self::from_kind(ChannelKind::Typed(Lineage::new(
            TypeKey::of::<T>(),
            T::ancestors(),
        )))
    }

    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::from_kind(ChannelKind::Named(name.into()))
    }

    /// The own channel of a component.
    pub fn component(id: ComponentId) -> Self {
        Self::from_kind(ChannelKind::Component(id))
    }

    /// A channel matching like this one, with its own associated data.
    pub fn subchannel(&self) -> Self {
        Self::from_kind(self.kind.clone())
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self.kind, ChannelKind::Broadcast)
    }

    /// The component this channel belongs to, for component channels.
    pub fn component_id(&self) -> Option<ComponentId> {
        match self.kind {
            ChannelKind::Component(id) => Some(id),
            _ => None,
        }
    }

    pub fn associations(&self) -> &Associations {
        &self.associations
    }

    /// Whether both values share one associated-data table.
    pub fn same_instance(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.associations, &other.associations)
    }
}

impl Eligible for Channel {
    fn default_criterion(&self) -> Criterion {
        match &self.kind {
            ChannelKind::Broadcast => Criterion::Any,
            ChannelKind::Typed(lineage) => Criterion::Type(lineage.own()),
            ChannelKind::Named(name) => Criterion::Name(name.clone()),
            ChannelKind::Component(id) => Criterion::Instance(*id),
        }
    }

    fn is_eligible_for(&self, criterion: &Criterion) -> bool {
        match (&self.kind, criterion) {
            (ChannelKind::Broadcast, _) | (_, Criterion::Any) => true,
            (ChannelKind::Typed(lineage), _) => lineage.matches(criterion),
            (ChannelKind::Named(name), Criterion::Name(other)) => name == other,
            (ChannelKind::Component(id), Criterion::Instance(other)) => id == other,
            _ => false,
        }
    }
}

impl From<&Channel> for Criterion {
    fn from(channel: &Channel) -> Self {
        channel.default_criterion()
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Channel {}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ChannelKind::Broadcast => f.write_str("Broadcast"),
            ChannelKind::Typed(lineage) => write!(f, "Channel<{:?}>", lineage.own()),
            ChannelKind::Named(name) => write!(f, "Channel({name:?})"),
            ChannelKind::Component(id) => write!(f, "Channel{id:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Transport;
    impl ChannelType for Transport {}

    struct Tls;
    impl ChannelType for Tls {
        fn ancestors() -> Vec<TypeKey> {
            vec![TypeKey::of::<Transport>()]
        }
    }

    struct Unrelated;
    impl ChannelType for Unrelated {}

    #[test]
    fn test_matching_is_reflexive() {
        let channels = [
            Channel::broadcast(),
            Channel::of::<Tls>(),
            Channel::named("web"),
            Channel::component(ComponentId::next()),
        ];
        for channel in &channels {
            assert!(channel.is_eligible_for(&channel.default_criterion()));
        }
    }

    #[test]
    fn test_broadcast_matches_and_is_matched_by_everything() {
        let broadcast = Channel::broadcast();
        assert!(broadcast.is_eligible_for(&Criterion::of::<Unrelated>()));
        assert!(broadcast.is_eligible_for(&Criterion::named("x")));
        assert!(broadcast.is_eligible_for(&Criterion::Instance(ComponentId::next())));

        let any = broadcast.default_criterion();
        assert!(Channel::of::<Tls>().is_eligible_for(&any));
        assert!(Channel::named("x").is_eligible_for(&any));
        assert!(Channel::component(ComponentId::next()).is_eligible_for(&any));
    }

    #[test]
    fn test_typed_channel_matches_ancestors_only() {
        let tls = Channel::of::<Tls>();
        assert!(tls.is_eligible_for(&Criterion::of::<Transport>()));
        assert!(!tls.is_eligible_for(&Criterion::of::<Unrelated>()));

        let transport = Channel::of::<Transport>();
        assert!(!transport.is_eligible_for(&Criterion::of::<Tls>()));
    }

    #[test]
    fn test_named_channels_need_identical_names() {
        let channel = Channel::named("test1");
        assert!(channel.is_eligible_for(&Criterion::named("test1")));
        assert!(!channel.is_eligible_for(&Criterion::named("test2")));
        assert!(!channel.is_eligible_for(&Criterion::of::<Transport>()));
    }

    #[test]
    fn test_subchannel_shares_key_not_data() {
        let main = Channel::named("conn");
        let sub = main.subchannel();
        main.associations().insert(1u32);

        assert_eq!(main, sub);
        assert!(!main.same_instance(&sub));
        assert!(main.same_instance(&main.clone()));
        assert!(sub.associations().is_empty());
        assert_eq!(sub.default_criterion(), main.default_criterion());
    }
}
