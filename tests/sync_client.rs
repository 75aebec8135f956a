//! Sync client state machine, backoff and reconnect behaviour.
//!
//! Time is paused, so every delay below is observed exactly.

mod common;

use common::{policy, timestamps, CallKind, MockTransport, Script, Step};
use tailview::net::RetryPolicy;
use tailview::sync::{SyncClient, SyncHandle};
use tailview::types::{ConnectionState, SessionId, SyncEvent, SyncEventKind};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::{sleep, timeout, Duration};

fn spawn(
    transport: MockTransport,
    policy: RetryPolicy,
) -> (SyncHandle, UnboundedReceiver<SyncEvent>) {
    let (tx, rx) = unbounded_channel();
    let client = SyncClient::new(SessionId(1), "chat.jsonl", Box::new(transport), policy, tx);
    (SyncHandle::spawn(client), rx)
}

async fn next_kind(rx: &mut UnboundedReceiver<SyncEvent>) -> SyncEventKind {
    let ev = timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("no event before timeout")
        .expect("event channel closed");
    assert_eq!(ev.session, SessionId(1));
    ev.kind
}

async fn expect_state(rx: &mut UnboundedReceiver<SyncEvent>, want: ConnectionState) {
    match next_kind(rx).await {
        SyncEventKind::ConnectionStateChanged(s) => assert_eq!(s, want),
        other => panic!("expected state {want}, got {other:?}"),
    }
}

async fn expect_records(rx: &mut UnboundedReceiver<SyncEvent>) -> Vec<i64> {
    match next_kind(rx).await {
        SyncEventKind::RecordsAvailable(records) => timestamps(&records),
        other => panic!("expected records, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_then_fails_without_further_attempts() {
    let script = Script::new(vec![Step::Fail, Step::Fail, Step::Fail, Step::Fail]);
    let (_handle, mut rx) = spawn(
        MockTransport::pull(script.clone(), Duration::from_millis(1000)),
        policy(3),
    );

    expect_state(&mut rx, ConnectionState::Connecting).await;
    expect_state(&mut rx, ConnectionState::Reconnecting).await;
    match next_kind(&mut rx).await {
        SyncEventKind::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected exhaustion, got {other:?}"),
    }
    expect_state(&mut rx, ConnectionState::Failed).await;

    let connects = script.calls_of(CallKind::Connect);
    assert_eq!(connects.len(), 4);
    let gaps: Vec<u128> = connects
        .windows(2)
        .map(|w| (w[1].at - w[0].at).as_millis())
        .collect();
    assert_eq!(gaps, vec![1000, 2000, 4000]);

    // Terminal: nothing else is scheduled.
    sleep(Duration::from_secs(3600)).await;
    assert_eq!(script.count(CallKind::Connect), 4);
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn resume_reconnects_with_the_same_cursor() {
    let script = Script::new(vec![Step::Batch(vec![1, 2]), Step::Fail]);
    let (handle, mut rx) = spawn(
        MockTransport::pull(script.clone(), Duration::from_millis(1000)),
        policy(0),
    );

    expect_state(&mut rx, ConnectionState::Connecting).await;
    assert_eq!(expect_records(&mut rx).await, vec![1, 2]);
    expect_state(&mut rx, ConnectionState::Live).await;
    // Poll fails; zero retries allowed.
    assert!(matches!(
        next_kind(&mut rx).await,
        SyncEventKind::RetriesExhausted { attempts: 1, .. }
    ));
    expect_state(&mut rx, ConnectionState::Failed).await;

    script.push(Step::Batch(vec![2, 3]));
    handle.resume();
    expect_state(&mut rx, ConnectionState::Connecting).await;
    assert_eq!(expect_records(&mut rx).await, vec![3]);
    expect_state(&mut rx, ConnectionState::Live).await;

    let connects = script.calls_of(CallKind::Connect);
    assert_eq!(connects.last().and_then(|c| c.cursor), Some(2));
}

#[tokio::test(start_paused = true)]
async fn push_drop_reconnects_without_redisplay() {
    let script = Script::new(vec![
        Step::Connected,
        Step::Batch(vec![10, 20, 30]),
        Step::Fail,
        Step::Connected,
        Step::Batch(vec![20, 30, 40]),
    ]);
    let (_handle, mut rx) = spawn(MockTransport::push(script.clone()), policy(5));

    expect_state(&mut rx, ConnectionState::Connecting).await;
    expect_state(&mut rx, ConnectionState::Live).await;
    assert_eq!(expect_records(&mut rx).await, vec![10, 20, 30]);
    expect_state(&mut rx, ConnectionState::Reconnecting).await;
    expect_state(&mut rx, ConnectionState::Live).await;
    assert_eq!(expect_records(&mut rx).await, vec![40]);

    let connects = script.calls_of(CallKind::Connect);
    assert_eq!(connects.len(), 2);
    assert_eq!(connects[0].cursor, None);
    assert_eq!(connects[1].cursor, Some(30));
    assert_eq!((connects[1].at - connects[0].at).as_millis(), 1000);
    assert!(script.count(CallKind::Close) >= 1);
}

#[tokio::test(start_paused = true)]
async fn pull_polls_on_interval_after_each_cycle() {
    let script = Script::new(vec![
        Step::Batch(vec![1]),
        Step::Batch(vec![]),
        Step::Batch(vec![2]),
    ]);
    let (_handle, mut rx) = spawn(
        MockTransport::pull(script.clone(), Duration::from_millis(1000)),
        policy(3),
    );

    expect_state(&mut rx, ConnectionState::Connecting).await;
    assert_eq!(expect_records(&mut rx).await, vec![1]);
    expect_state(&mut rx, ConnectionState::Live).await;
    // The empty poll emits nothing.
    assert_eq!(expect_records(&mut rx).await, vec![2]);

    let calls = script.calls();
    assert_eq!(calls[0].kind, CallKind::Connect);
    assert_eq!(calls[1].kind, CallKind::Next);
    assert_eq!(calls[2].kind, CallKind::Next);
    assert_eq!((calls[1].at - calls[0].at).as_millis(), 1000);
    assert_eq!((calls[2].at - calls[1].at).as_millis(), 1000);
    assert_eq!(calls[2].cursor, Some(1));
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_backoff() {
    let script = Script::new(vec![Step::Fail]);
    let (handle, mut rx) = spawn(
        MockTransport::pull(script.clone(), Duration::from_millis(1000)),
        policy(5),
    );

    expect_state(&mut rx, ConnectionState::Connecting).await;
    expect_state(&mut rx, ConnectionState::Reconnecting).await;

    handle.shutdown();
    let finished = timeout(Duration::from_millis(500), async {
        while !handle.is_finished() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(finished.is_ok(), "client did not stop during backoff");
    assert_eq!(script.count(CallKind::Connect), 1);
    assert!(script.count(CallKind::Close) >= 1);
}
