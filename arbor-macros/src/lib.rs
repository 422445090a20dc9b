//! Derive macros for arbor.
//!
//! - `#[derive(Event)]` implements `arbor::Event`
//! - `#[derive(ChannelType)]` implements `arbor::ChannelType`
//!
//! Both accept `extends(..)` to declare ancestors. Ancestry is transitive:
//! the ancestors of every listed parent are included.

use proc_macro::TokenStream;

mod ancestry;
mod channel;
mod event;

/// Derive macro for implementing the `Event` trait.
///
/// ```rust,ignore
/// #[derive(Debug, Event)]
/// #[event(result = String, extends(Request))]
/// struct GetRequest {
///     path: String,
/// }
/// ```
///
/// `result` defaults to `()`.
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    event::derive_event_impl(input)
}

/// Derive macro for implementing the `ChannelType` trait.
///
/// ```rust,ignore
/// #[derive(ChannelType)]
/// #[channel(extends(Transport))]
/// struct Tls;
/// ```
#[proc_macro_derive(ChannelType, attributes(channel))]
pub fn derive_channel_type(input: TokenStream) -> TokenStream {
    channel::derive_channel_type_impl(input)
}
