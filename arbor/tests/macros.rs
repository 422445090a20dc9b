//! Integration tests for the derive macros.

#![cfg(feature = "macros")]

use arbor::{
    Channel, ChannelType, Component, Event, Handle, Handlers, TypeKey, testing::Probe,
};

#[derive(Debug, Event)]
struct Request;

#[derive(Debug, Event)]
#[event(result = String, extends(Request))]
struct Get {
    path: String,
}

#[derive(Debug, Event)]
#[event(extends(Get))]
struct CachedGet;

#[derive(ChannelType)]
struct Transport;

#[derive(ChannelType)]
#[channel(extends(Transport))]
struct Tls;

#[test]
fn test_event_ancestry_is_transitive() {
    assert!(Request::ancestors().is_empty());
    assert_eq!(Get::ancestors(), vec![TypeKey::of::<Request>()]);
    assert_eq!(
        CachedGet::ancestors(),
        vec![TypeKey::of::<Get>(), TypeKey::of::<Request>()]
    );
    assert_eq!(<Tls as ChannelType>::ancestors(), vec![TypeKey::of::<Transport>()]);
}

struct Files {
    probe: Probe,
}

impl Component for Files {
    fn handlers(handlers: &mut Handlers<Self>) {
        handlers
            .on::<Get>()
            .channel_type::<Transport>()
            .run_sync(|this, get, _| {
                this.probe.push(get.path.clone());
                get.set_result(format!("contents of {}", get.path));
            });
        handlers
            .handler()
            .event_type::<Request>()
            .broadcast()
            .run_sync(|this, event, _| this.probe.push(event.name().to_owned()));
    }
}

#[tokio::test]
async fn test_derived_events_dispatch() {
    let probe = Probe::new();
    let files = Handle::new(Files {
        probe: probe.clone(),
    })
    .unwrap();
    files.start().await;

    let get = files.fire_on(
        Get {
            path: "/index".into(),
        },
        &[Channel::of::<Tls>()],
    );
    assert_eq!(get.get().await.as_deref(), Some("contents of /index"));
    files.fire(CachedGet).wait().await;

    assert_eq!(probe.entries(), vec!["/index", "Get", "CachedGet"]);
}
