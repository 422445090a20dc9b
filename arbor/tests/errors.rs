//! Handler faults and error events.

mod common;

use arbor::{
    BoxError, Component, Handle, HandlerError, Handlers, Prepared,
    events::{Error, HandlingError},
    testing::Probe,
};
use common::{Ping, Pong};

struct Faulty {
    probe: Probe,
}

impl Component for Faulty {
    fn handlers(handlers: &mut Handlers<Self>) {
        handlers
            .on::<Ping>()
            .named("fails")
            .priority(2)
            .run(|_, _, _| async { Err::<(), BoxError>("boom".into()) });
        handlers
            .on::<Ping>()
            .priority(1)
            .run_sync(|this, _, _| this.probe.push("after"));
        handlers
            .on::<Pong>()
            .named("panics")
            .run_sync(|_, _, _| -> () { panic!("kaput") });
        handlers.on::<HandlingError>().run_sync(|this, failure, _| {
            let kind = match failure.error() {
                HandlerError::Panic(message) => format!("panic:{message}"),
                HandlerError::Failed(error) => format!("failed:{error}"),
            };
            this.probe
                .push(format!("{}:{}:{kind}", failure.handler(), failure.event().name()));
        });
    }
}

#[tokio::test]
async fn test_failure_becomes_one_handling_error() {
    let probe = Probe::new();
    let app = Handle::new(Faulty {
        probe: probe.clone(),
    })
    .unwrap();
    app.start().await;

    let ping = app.fire(Ping);
    ping.wait().await;

    assert_eq!(probe.entries(), vec!["after", "fails:Ping:failed:boom"]);
}

#[tokio::test]
async fn test_panic_becomes_handling_error() {
    let probe = Probe::new();
    let app = Handle::new(Faulty {
        probe: probe.clone(),
    })
    .unwrap();
    app.start().await;

    let pong = app.fire(Pong);
    pong.wait().await;

    assert_eq!(probe.entries(), vec!["panics:Pong:panic:kaput"]);
}

struct Reporter {
    probe: Probe,
}

impl Component for Reporter {
    fn handlers(handlers: &mut Handlers<Self>) {
        handlers
            .on::<Ping>()
            .run(|_, _, _| async { Err::<(), BoxError>("first".into()) });
        // Receives `HandlingError` through its ancestor, then fails itself.
        handlers
            .handler()
            .named("reporter")
            .event_type::<Error>()
            .run_sync(|this, event, _| {
                this.probe.push(event.name().to_owned());
                Err::<(), BoxError>("second".into())
            });
    }
}

#[tokio::test]
async fn test_failing_error_handler_is_not_refired() {
    let probe = Probe::new();
    let app = Handle::new(Reporter {
        probe: probe.clone(),
    })
    .unwrap();
    app.start().await;

    let ping = app.fire(Ping);
    ping.wait().await;

    assert_eq!(probe.entries(), vec!["HandlingError"]);
}

#[tokio::test]
async fn test_unhandled_error_event_completes() {
    let app = common::leaf();
    app.start().await;

    let error = app.fire(Error::new("disk full").with_source(std::io::Error::other("enospc")));
    error.wait().await;

    assert_eq!(error.message(), "disk full");
    assert_eq!(error.source().map(ToString::to_string), Some("enospc".to_owned()));
}

struct Narrow {
    probe: Probe,
}

impl Component for Narrow {
    fn handlers(handlers: &mut Handlers<Self>) {
        handlers
            .on::<Ping>()
            .run(|_, _, _| async { Err::<(), BoxError>("boom".into()) });
        handlers
            .on::<Error>()
            .named("errors")
            .run_sync(|this, error, _| this.probe.push(error.message().to_owned()));
    }
}

#[tokio::test]
async fn test_typed_error_handler_sees_plain_errors_only() {
    let probe = Probe::new();
    let app = Handle::new(Narrow {
        probe: probe.clone(),
    })
    .unwrap();
    let resolved = app.manager().resolve(&Prepared::new(Error::new("x")), &[]);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].name, "errors");
    app.start().await;

    // The resulting `HandlingError` is not an `Error` payload; it completes
    // unhandled instead of reaching "errors".
    let ping = app.fire(Ping);
    ping.wait().await;
    assert!(probe.is_empty());

    app.fire(Error::new("disk full")).wait().await;
    assert_eq!(probe.entries(), vec!["disk full"]);
}
