//! Time-driven behaviour: countdown milestones and the auto-cancel loop
//!
//! Runs on tokio's paused clock; the engine clock below follows it so that
//! sleeps and the wall clock advance together.

mod common;

use chrono::{DateTime, Utc};
use common::*;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use test_log::test;
use tokio::time::Instant;

use funding_hedge::common::channels::create_shutdown_channel;
use funding_hedge::common::clock::Clock;
use funding_hedge::common::types::Exchange;
use funding_hedge::engine::{
    AutoCancelEngine, AutoCancelPolicy, NotificationBus, NotificationLevel, SubscriptionCoordinator,
    TickerCache,
};

/// Wall clock anchored to tokio's (possibly paused) monotonic clock
#[derive(Debug)]
struct TokioClock {
    base: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    fn new() -> Self {
        Self {
            base: start_time(),
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(Instant::now() - self.started).unwrap();
        self.base + elapsed
    }
}

fn setup() -> (Arc<FakeBackend>, NotificationBus, Arc<SubscriptionCoordinator>, Arc<TokioClock>) {
    let backend = FakeBackend::new();
    let clock = Arc::new(TokioClock::new());
    let bus = NotificationBus::new(Duration::from_secs(600), 100, clock.clone());
    let coordinator = Arc::new(SubscriptionCoordinator::new(
        backend.clone(),
        bus.clone(),
        clock.clone(),
    ));
    (backend, bus, coordinator, clock)
}

#[test(tokio::test(start_paused = true))]
async fn test_countdown_announces_each_milestone_once() {
    let (_backend, bus, coordinator, _clock) = setup();
    let mut req = request("BTCUSDT", dec!(100), 5, 0);
    req.next_funding_time = start_time() + chrono::Duration::milliseconds(12_500);
    let sub = coordinator.create(req).await.unwrap();

    tokio::time::sleep(Duration::from_secs(15)).await;

    let milestones: Vec<String> = bus
        .active()
        .into_iter()
        .filter(|n| n.level == NotificationLevel::Info)
        .map(|n| n.message)
        .collect();
    assert_eq!(milestones.len(), 2, "{:?}", milestones);
    assert!(milestones[0].contains("10 seconds"));
    assert!(milestones[1].contains("5 seconds"));

    // Task ended at funding time; the entry itself waits for reconciliation
    assert!(!coordinator.scheduler().is_running(&sub.id));
    assert_eq!(coordinator.registry().get(&sub.id).await.unwrap().countdown, Some(1));
}

#[test(tokio::test(start_paused = true))]
async fn test_countdown_stops_after_cancel() {
    let (_backend, _bus, coordinator, _clock) = setup();
    let sub = coordinator
        .create(request("ETHUSDT", dec!(100), 5, 120))
        .await
        .unwrap();

    // Ticks at t=0, 1 and 2
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(coordinator.scheduler().is_running(&sub.id));
    assert_eq!(coordinator.registry().get(&sub.id).await.unwrap().countdown, Some(118));

    coordinator.cancel(&sub.id, true).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!coordinator.scheduler().is_running(&sub.id));
}

#[test(tokio::test(start_paused = true))]
async fn test_sweep_loop_cancels_inside_window() {
    let (backend, bus, coordinator, clock) = setup();
    let sub = coordinator
        .create(request("BTCUSDT", dec!(100), 5, 45))
        .await
        .unwrap();

    let ticker = Arc::new(TickerCache::new());
    ticker.update("BTCUSDT", Exchange::Bybit, dec!(0.00005));

    let engine = Arc::new(AutoCancelEngine::new(
        coordinator.clone(),
        ticker,
        AutoCancelPolicy {
            enabled: true,
            threshold: Some(dec!(0.0001)),
        },
        clock,
    ));
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run(shutdown_rx).await })
    };

    // First sweep at t=0 sees 45s left: outside the window
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(coordinator.registry().contains(&sub.id).await);

    // Second sweep at t=30 sees 15s left
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!coordinator.registry().contains(&sub.id).await);
    assert!(backend.record_ids().is_empty());

    let warning = bus
        .active()
        .into_iter()
        .find(|n| n.level == NotificationLevel::Warning)
        .expect("auto-cancel warning");
    assert!(warning.message.contains("0.005%"), "{}", warning.message);
    assert!(warning.message.contains("15s left"), "{}", warning.message);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[test(tokio::test(start_paused = true))]
async fn test_background_reconcile_drops_remotely_closed_entries() {
    let (backend, _bus, coordinator, _clock) = setup();
    let sub = coordinator
        .create(request("SOLUSDT", dec!(50), 2, 3600))
        .await
        .unwrap();

    // Completed or cancelled on another device
    backend.remove(&sub.id);

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .run_reconciliation(Duration::from_secs(60), shutdown_rx)
                .await
        })
    };

    // No pass before the first period elapses
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(coordinator.registry().contains(&sub.id).await);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(!coordinator.registry().contains(&sub.id).await);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}
