//! Completion events, generated events and pipelines.

mod common;

use arbor::{
    Component, Event, Handle, Handlers, NamedEvent, Prepared,
    events::{Start, Started},
    testing::Probe,
};
use common::{Ping, Pong, settle};
use std::time::Duration;

struct Chain {
    probe: Probe,
}

impl Component for Chain {
    fn handlers(handlers: &mut Handlers<Self>) {
        handlers.on::<Start>().run_sync(|this, _, _| this.probe.push("start"));
        handlers
            .on::<Started>()
            .run_sync(|this, started, _| {
                let of_start = started
                    .completion_of()
                    .is_some_and(|event| event.is::<Start>());
                this.probe.push(format!("started:{of_start}"));
            });
        handlers.on::<Ping>().run(|this, _, ctx| async move {
            ctx.fire(Pong);
            this.probe.push("ping");
        });
        handlers.on::<Pong>().run(|this, _, _| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            this.probe.push("pong");
        });
        handlers
            .handler()
            .named_event("ping-done")
            .run_sync(|this, _, _| this.probe.push("done"));
    }
}

fn chain() -> (Handle<Chain>, Probe) {
    let probe = Probe::new();
    let chain = Handle::new(Chain {
        probe: probe.clone(),
    })
    .unwrap();
    (chain, probe)
}

#[tokio::test]
async fn test_started_follows_start() {
    let (app, probe) = chain();

    let start = app.start().await;
    assert!(start.is_done());
    settle().await;

    assert_eq!(probe.entries(), vec!["start", "started:true"]);
}

#[tokio::test]
async fn test_generated_events_delay_completion() {
    let (app, probe) = chain();
    app.start().await;
    settle().await;
    let before = probe.len();

    let ping = app.fire(Prepared::new(Ping).with_completion(NamedEvent::new("ping-done")));
    ping.wait().await;

    assert_eq!(probe.entries()[before..], ["ping", "pong"]);
    settle().await;
    assert_eq!(probe.entries()[before..], ["ping", "pong", "done"]);
}

struct Echo {
    probe: Probe,
}

impl Component for Echo {
    fn handlers(handlers: &mut Handlers<Self>) {
        handlers.on::<Ping>().run_sync(|this, _, ctx| {
            this.probe.push(format!("ping@{}", ctx.pipeline().id()));
            ctx.manager().fire(Pong);
        });
        handlers.on::<Pong>().run_sync(|this, _, ctx| {
            this.probe.push(format!("pong@{}", ctx.pipeline().id()));
        });
    }
}

#[tokio::test]
async fn test_fires_from_handlers_stay_on_their_pipeline() {
    let probe = Probe::new();
    let app = Handle::new(Echo {
        probe: probe.clone(),
    })
    .unwrap();
    app.start().await;

    let pipeline = app.manager().new_pipeline();
    let ping = pipeline.fire(Ping);
    ping.wait().await;

    let id = pipeline.id();
    assert_eq!(probe.entries(), vec![format!("ping@{id}"), format!("pong@{id}")]);
    assert!(!pipeline.same_pipeline(&app.manager().new_pipeline()));
    assert!(pipeline.is_idle());
}

struct Slow {
    probe: Probe,
}

impl Component for Slow {
    fn handlers(handlers: &mut Handlers<Self>) {
        handlers.on::<Ping>().run(|this, _, _| async move {
            this.probe.push("slow:begin");
            tokio::time::sleep(Duration::from_millis(200)).await;
            this.probe.push("slow:end");
        });
        handlers
            .on::<Pong>()
            .run_sync(|this, _, _| this.probe.push("fast"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipelines_run_independently() {
    let probe = Probe::new();
    let app = Handle::new(Slow {
        probe: probe.clone(),
    })
    .unwrap();
    app.start().await;

    let slow = app.manager().new_pipeline().fire(Ping);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fast = app.manager().new_pipeline().fire(Pong);
    futures::future::join(fast.wait(), slow.wait()).await;

    assert_eq!(probe.entries(), vec!["slow:begin", "fast", "slow:end"]);
}

#[tokio::test]
async fn test_one_pipeline_keeps_firing_order() {
    let (app, probe) = chain();
    app.start().await;
    settle().await;
    let before = probe.len();

    let pipeline = app.manager().new_pipeline();
    let first = pipeline.fire(Pong);
    let second = pipeline.fire(NamedEvent::new("ping-done"));
    second.wait().await;

    assert!(first.is_done());
    assert_eq!(probe.entries()[before..], ["pong", "done"]);
}

struct Deferred {
    probe: Probe,
}

impl Component for Deferred {
    fn handlers(handlers: &mut Handlers<Self>) {
        handlers.on::<Ping>().run_sync(|this, ping, _| {
            let lock = ping.lock_completion();
            let probe = this.probe.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                probe.push("background");
                lock.release();
            });
        });
        handlers.on::<Pong>().run_sync(|_, pong, _| {
            // Never released by hand; only the timeout lets `Pong` complete.
            let lock = pong.lock_completion_for(Duration::from_millis(50));
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(lock);
            });
        });
        handlers
            .handler()
            .named_event("ping-done")
            .run_sync(|this, _, _| this.probe.push("done"));
    }
}

#[tokio::test]
async fn test_completion_waits_for_released_lock() {
    let probe = Probe::new();
    let app = Handle::new(Deferred {
        probe: probe.clone(),
    })
    .unwrap();
    app.start().await;

    let ping = app.fire(Prepared::new(Ping).with_completion(NamedEvent::new("ping-done")));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!ping.is_done());
    assert!(probe.is_empty());

    ping.wait().await;
    settle().await;
    assert_eq!(probe.entries(), vec!["background", "done"]);
}

#[tokio::test]
async fn test_completion_lock_expires() {
    let app = Handle::new(Deferred {
        probe: Probe::new(),
    })
    .unwrap();
    app.start().await;

    let pong = app.fire(Pong);
    let waited = tokio::time::timeout(Duration::from_secs(5), pong.wait()).await;
    assert!(waited.is_ok());
    assert!(pong.is_done());
}

#[derive(Debug, Clone, Copy)]
struct Seq {
    task: usize,
    n: usize,
}

impl Event for Seq {
    type Result = ();
}

struct Sequencer {
    probe: Probe,
}

impl Component for Sequencer {
    fn handlers(handlers: &mut Handlers<Self>) {
        handlers.on::<Seq>().run(|this, seq, _| async move {
            this.probe.push(format!("begin {} {}", seq.task, seq.n));
            tokio::time::sleep(Duration::from_millis(1)).await;
            this.probe.push(format!("end {} {}", seq.task, seq.n));
        });
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_share_one_pipeline() {
    const TASKS: usize = 4;
    const EVENTS: usize = 10;

    let probe = Probe::new();
    let app = Handle::new(Sequencer {
        probe: probe.clone(),
    })
    .unwrap();
    app.start().await;

    let pipeline = app.manager().new_pipeline();
    let producers: Vec<_> = (0..TASKS)
        .map(|task| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let mut fired = Vec::new();
                for n in 0..EVENTS {
                    fired.push(pipeline.fire(Seq { task, n }));
                    tokio::task::yield_now().await;
                }
                fired
            })
        })
        .collect();
    for producer in producers {
        for seq in producer.await.unwrap() {
            seq.wait().await;
        }
    }

    let entries = probe.entries();
    assert_eq!(entries.len(), 2 * TASKS * EVENTS);
    let mut next = [0; TASKS];
    for pair in entries.chunks(2) {
        // A handler ends before the next one on the pipeline begins.
        let begin = pair[0].strip_prefix("begin ").unwrap();
        assert_eq!(pair[1].strip_prefix("end ").unwrap(), begin);

        let (task, n) = begin.split_once(' ').unwrap();
        let (task, n): (usize, usize) = (task.parse().unwrap(), n.parse().unwrap());
        assert_eq!(n, next[task], "task {task} out of order");
        next[task] += 1;
    }
    assert_eq!(next, [EVENTS; TASKS]);
}
