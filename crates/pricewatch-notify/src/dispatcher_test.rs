use pricewatch_core::{ChangeKind, ProductKey, ProductSnapshot};
use rust_decimal::Decimal;
use tokio::time::Instant;

use super::*;
use crate::dead_letter::MemoryDeadLetters;
use crate::transport::MemoryTransport;

fn event(n: i64) -> ChangeEvent {
    ChangeEvent {
        kind: ChangeKind::PriceDrop,
        category_slug: "drones".to_string(),
        product: ProductSnapshot {
            key: ProductKey::new(format!("HBCV{n:08}")),
            title: format!("Drone {n}"),
            price: 850,
            link: format!("https://shop.example/drone-{n}"),
            image: None,
        },
        previous_price: Some(1000),
        percent_change: Some(Decimal::new(1500, 2)),
    }
}

fn settings(mode: NotifyMode) -> DispatcherSettings {
    DispatcherSettings {
        mode,
        buffer_size: 3,
        flush_interval: Duration::from_secs(60),
        send_delay: Duration::from_secs(2),
        delivery_retry: RetryPolicy::fixed(3, Duration::from_secs(1)),
        max_rate_limit_waits: MAX_RATE_LIMIT_WAITS,
        dead_letter_max_retries: 3,
    }
}

struct Harness {
    transport: Arc<MemoryTransport>,
    dead_letters: Arc<MemoryDeadLetters>,
    dispatcher: Dispatcher,
}

fn harness(settings: DispatcherSettings) -> Harness {
    let transport = Arc::new(MemoryTransport::new());
    let dead_letters = Arc::new(MemoryDeadLetters::new());
    let dispatcher = Dispatcher::new(transport.clone(), dead_letters.clone(), settings);
    Harness {
        transport,
        dead_letters,
        dispatcher,
    }
}

#[tokio::test(start_paused = true)]
async fn instant_mode_sends_each_event_with_delay() {
    let h = harness(settings(NotifyMode::Instant));
    let started = Instant::now();

    let report = h.dispatcher.dispatch(vec![event(1), event(2), event(3)]).await;

    assert_eq!(report.delivered, 3);
    assert_eq!(report.dead_lettered, 0);
    assert_eq!(h.transport.delivered().len(), 3);
    assert!(h.transport.delivered()[0].text.contains("Drone 1"));
    assert!(started.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_waits_server_hint_without_consuming_attempts() {
    let mut settings = settings(NotifyMode::Instant);
    settings.delivery_retry = RetryPolicy::once();
    let h = harness(settings);
    h.transport.push_responses([Err(TransportError::RateLimited {
        retry_after: Duration::from_secs(7),
    })]);
    let started = Instant::now();

    let report = h.dispatcher.dispatch(vec![event(1)]).await;

    assert_eq!(report.delivered, 1);
    assert_eq!(h.transport.attempts(), 2);
    assert!(started.elapsed() >= Duration::from_secs(7));
    assert!(h.dead_letters.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn endless_rate_limiting_dead_letters_the_message() {
    let h = harness(settings(NotifyMode::Instant));
    h.transport.push_responses(
        (0..=MAX_RATE_LIMIT_WAITS).map(|_| {
            Err(TransportError::RateLimited {
                retry_after: Duration::from_secs(1),
            })
        }),
    );

    let report = h.dispatcher.dispatch(vec![event(1)]).await;

    assert_eq!(report.dead_lettered, 1);
    assert_eq!(h.transport.attempts(), MAX_RATE_LIMIT_WAITS + 1);
}

#[tokio::test(start_paused = true)]
async fn delivery_failures_are_retried_immediately() {
    let h = harness(settings(NotifyMode::Instant));
    h.transport.push_responses([
        Err(TransportError::DeliveryFailed("502".to_string())),
        Err(TransportError::DeliveryFailed("502".to_string())),
    ]);

    let report = h.dispatcher.dispatch(vec![event(1)]).await;

    assert_eq!(report.delivered, 1);
    assert_eq!(h.transport.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn persistent_failure_goes_to_dead_letter_log() {
    let h = harness(settings(NotifyMode::Instant));
    h.transport.fail_always("chat not found");

    let report = h.dispatcher.dispatch(vec![event(1)]).await;

    assert_eq!(report.dead_lettered, 1);
    let entries = h.dead_letters.snapshot();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].retry_count, 0);
    assert_eq!(entries[0].event, event(1));
    assert!(entries[0].error.contains("chat not found"));
}

#[tokio::test(start_paused = true)]
async fn dead_letter_is_dropped_after_initial_plus_three_retries() {
    let mut settings = settings(NotifyMode::Instant);
    settings.delivery_retry = RetryPolicy::once();
    let h = harness(settings);
    h.transport.fail_always("timeout");

    h.dispatcher.dispatch(vec![event(1)]).await;
    assert_eq!(h.transport.attempts(), 1);

    let first = h.dispatcher.retry_dead_letters().await.unwrap();
    assert_eq!(first.requeued, 1);
    assert_eq!(h.dead_letters.snapshot()[0].retry_count, 1);

    let second = h.dispatcher.retry_dead_letters().await.unwrap();
    assert_eq!(second.requeued, 1);

    let third = h.dispatcher.retry_dead_letters().await.unwrap();
    assert_eq!(third.dropped, 1);
    assert_eq!(h.transport.attempts(), 4);
    assert!(h.dead_letters.snapshot().is_empty());

    let fourth = h.dispatcher.retry_dead_letters().await.unwrap();
    assert_eq!(fourth, RetryPassReport::default());
    assert_eq!(h.transport.attempts(), 4, "never retried a 5th time");
}

#[tokio::test(start_paused = true)]
async fn successful_retry_pass_clears_entry() {
    let mut settings = settings(NotifyMode::Instant);
    settings.delivery_retry = RetryPolicy::once();
    let h = harness(settings);
    h.transport.fail_always("down");
    h.dispatcher.dispatch(vec![event(1), event(2)]).await;
    assert_eq!(h.dead_letters.snapshot().len(), 2);

    h.transport.recover();
    let report = h.dispatcher.retry_dead_letters().await.unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 2);
    assert!(h.dead_letters.snapshot().is_empty());
    assert_eq!(h.transport.delivered().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn batched_mode_flushes_at_size_bound() {
    let h = harness(settings(NotifyMode::Batched));

    let report = h.dispatcher.dispatch(vec![event(1), event(2)]).await;
    assert_eq!(report.queued, 2);
    assert_eq!(report.delivered, 0);
    assert_eq!(h.transport.attempts(), 0);

    let started = Instant::now();
    let report = h.dispatcher.dispatch(vec![event(3)]).await;
    assert_eq!(report.delivered, 3);
    assert_eq!(report.queued, 0);
    assert!(started.elapsed() >= Duration::from_secs(4), "burst is paced");
}

#[tokio::test(start_paused = true)]
async fn batched_mode_flushes_at_age_bound() {
    let h = harness(settings(NotifyMode::Batched));
    h.dispatcher.dispatch(vec![event(1)]).await;

    assert_eq!(h.dispatcher.flush_if_due().await.delivered, 0);
    tokio::time::advance(Duration::from_secs(60)).await;
    let report = h.dispatcher.flush_if_due().await;

    assert_eq!(report.delivered, 1);
    assert_eq!(h.dispatcher.queued().await, 0);
}

#[tokio::test(start_paused = true)]
async fn explicit_flush_drains_partial_buffer() {
    let h = harness(settings(NotifyMode::Batched));
    h.dispatcher.dispatch(vec![event(1)]).await;

    let report = h.dispatcher.flush().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(h.dispatcher.flush().await, DispatchReport::default());
}

#[tokio::test(start_paused = true)]
async fn change_log_records_dispatched_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("changes.jsonl");
    let transport = Arc::new(MemoryTransport::new());
    let dispatcher = Dispatcher::new(
        transport,
        Arc::new(MemoryDeadLetters::new()),
        settings(NotifyMode::Instant),
    )
    .with_change_log(ChangeLog::new(&path));

    dispatcher.dispatch(vec![event(1), event(2)]).await;

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 2);
}
