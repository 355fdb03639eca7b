//! End-to-end tests for the resilience pipeline.
//!
//! Everything runs on paused tokio time, so waits, backoffs, and cooldowns
//! are exercised deterministically without real sleeping.

use pacer::{
    BucketConfig, CallOutcome, DualBucket, Error, OrchestratorBuilder, ADJUST_GROW,
    THROTTLE_BACKOFF_FACTOR,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Captures tracing output in test logs; filter with RUST_LOG.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// 60 calls and 600 weight units per minute with burst 1.5: capacities of
/// 1.5 call tokens and 15 weight tokens.
fn small_bucket() -> BucketConfig {
    BucketConfig {
        initial_call_rate: 60.0,
        min_call_rate: 6.0,
        max_call_rate: 120.0,
        initial_weight_rate: 600.0,
        min_weight_rate: 60.0,
        max_weight_rate: 1200.0,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn tokens_never_exceed_capacity() {
    let bucket = DualBucket::new(small_bucket()).unwrap();

    // Idle for a long time, then churn: levels stay within capacity.
    tokio::time::advance(Duration::from_secs(600)).await;
    for _ in 0..5 {
        let _ = bucket.acquire("orders", 1, Duration::ZERO).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        let snapshot = bucket.snapshot().await;
        assert!(snapshot.call_tokens <= snapshot.call_capacity + 1e-9);
        assert!(snapshot.weight_tokens <= snapshot.weight_capacity + 1e-9);
        assert!(snapshot.call_tokens >= 0.0);
        assert!(snapshot.weight_tokens >= 0.0);
    }
}

#[tokio::test(start_paused = true)]
async fn rates_stay_inside_clamps_under_any_feedback() {
    let bucket = DualBucket::new(small_bucket()).unwrap();

    // Hammer the bucket with throttles: rates floor at the minimums.
    for _ in 0..100 {
        bucket.record_outcome("orders", CallOutcome::Throttled, 0).await;
    }
    let snapshot = bucket.snapshot().await;
    assert_eq!(snapshot.call_rate, 6.0);
    assert_eq!(snapshot.weight_rate, 60.0);

    // Then feed it sustained success: rates cap at the maximums.
    for _ in 0..200 {
        tokio::time::advance(Duration::from_secs(61)).await;
        for _ in 0..50 {
            bucket.record_outcome("orders", CallOutcome::Success, 1).await;
        }
        bucket.maybe_adjust().await;
    }
    let snapshot = bucket.snapshot().await;
    assert_eq!(snapshot.call_rate, 120.0);
    assert_eq!(snapshot.weight_rate, 1200.0);
}

#[tokio::test(start_paused = true)]
async fn throttle_reaction_is_immediate_and_suppresses_the_periodic_loop() {
    init_tracing();
    let bucket = DualBucket::new(small_bucket()).unwrap();

    // A healthy window is due for growth...
    tokio::time::advance(Duration::from_secs(61)).await;
    for _ in 0..50 {
        bucket.record_outcome("orders", CallOutcome::Success, 1).await;
    }

    // ...but a single throttle wins: rates are cut now, and the periodic
    // loop is pushed out a full interval.
    bucket.record_outcome("orders", CallOutcome::Throttled, 0).await;
    bucket.maybe_adjust().await;
    let snapshot = bucket.snapshot().await;
    assert!((snapshot.call_rate - 60.0 * THROTTLE_BACKOFF_FACTOR).abs() < 1e-9);
    assert!((snapshot.weight_rate - 600.0 * THROTTLE_BACKOFF_FACTOR).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn hysteresis_grows_once_per_interval() {
    let bucket = DualBucket::new(small_bucket()).unwrap();

    tokio::time::advance(Duration::from_secs(61)).await;
    for _ in 0..100 {
        bucket.record_outcome("orders", CallOutcome::Success, 1).await;
    }

    bucket.maybe_adjust().await;
    let grown = bucket.snapshot().await.call_rate;
    assert!((grown - 60.0 * ADJUST_GROW).abs() < 1e-9);

    // Asking again inside the same interval changes nothing.
    bucket.maybe_adjust().await;
    assert_eq!(bucket.snapshot().await.call_rate, grown);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn concurrent_acquires_grant_exactly_the_capacity() {
    // 400 calls/min, burst 1.5: exactly 10 call tokens at the start.
    let config = BucketConfig {
        initial_call_rate: 400.0,
        min_call_rate: 40.0,
        max_call_rate: 800.0,
        ..small_bucket()
    };
    let bucket = Arc::new(DualBucket::new(config).unwrap());

    let mut handles = Vec::new();
    for _ in 0..1000 {
        let bucket = Arc::clone(&bucket);
        handles.push(tokio::spawn(async move {
            bucket.acquire("orders", 0, Duration::ZERO).await.granted
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 10);

    let snapshot = bucket.snapshot().await;
    assert!(snapshot.call_tokens >= 0.0);
}

#[tokio::test(start_paused = true)]
async fn breaker_trips_heals_and_reprobes() {
    init_tracing();
    let orchestrator = OrchestratorBuilder::new()
        .per_minute(600.0, 6000.0)
        .max_failures(2)
        .reset_timeout(Duration::from_secs(30))
        .build();
    let invocations = Arc::new(AtomicUsize::new(0));

    // Two fatal failures open the breaker.
    for _ in 0..2 {
        let counter = Arc::clone(&invocations);
        let failed = orchestrator
            .execute("orders", 1, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Error::fatal("boom")) }
            })
            .await
            .unwrap_err();
        assert_eq!(failed.metadata.status, "fatal");
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 2);

    // While open, calls are rejected without reaching the remote.
    let failed = orchestrator
        .execute("orders", 1, || async { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(failed.error, Error::CircuitOpen { .. }));
    assert_eq!(invocations.load(Ordering::SeqCst), 2);

    // After the cooldown the first call probes and resets the breaker.
    tokio::time::advance(Duration::from_secs(31)).await;
    let report = orchestrator
        .execute("orders", 1, || async { Ok("healed") })
        .await
        .unwrap();
    assert_eq!(report.value, "healed");
    assert!(!orchestrator.breakers().get_or_create("orders").is_open().await);
}

#[tokio::test(start_paused = true)]
async fn retries_terminate_at_the_attempt_budget() {
    init_tracing();
    let orchestrator = OrchestratorBuilder::new()
        .per_minute(600.0, 6000.0)
        .max_attempts(3)
        .max_failures(10)
        .build();
    let invocations = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&invocations);
    let failed = orchestrator
        .execute("orders", 1, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::throttled("always 429")) }
        })
        .await
        .unwrap_err();

    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    assert_eq!(failed.metadata.attempts, 3);
    assert_eq!(failed.metadata.history.len(), 3);
    assert!(matches!(
        failed.error,
        Error::MaxRetriesExceeded { attempts: 3, .. }
    ));

    // Three throttles also cut the bucket rate three times.
    let expected = 600.0 * THROTTLE_BACKOFF_FACTOR.powi(3);
    let snapshot = orchestrator.bucket().snapshot().await;
    assert!((snapshot.call_rate - expected).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn transient_faults_retry_on_a_flat_delay() {
    let orchestrator = OrchestratorBuilder::new()
        .per_minute(600.0, 6000.0)
        .base_delay(Duration::from_millis(200))
        .build();
    let invocations = Arc::new(AtomicUsize::new(0));

    let started = tokio::time::Instant::now();
    let counter = Arc::clone(&invocations);
    let report = orchestrator
        .execute("orders", 1, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::transient("reset"))
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(report.metadata.attempts, 3);
    // Two flat delays, no exponential growth and no jitter.
    assert_eq!(started.elapsed(), Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn denied_admission_fails_without_a_single_attempt() {
    let orchestrator = OrchestratorBuilder::new()
        .bucket(small_bucket())
        .acquire_timeout(Duration::ZERO)
        .build();
    let invocations = Arc::new(AtomicUsize::new(0));

    // Capacity is 1.5 call tokens: one call drains it.
    orchestrator
        .execute("orders", 1, || async { Ok(()) })
        .await
        .unwrap();

    let counter = Arc::clone(&invocations);
    let failed = orchestrator
        .execute("orders", 1, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await
        .unwrap_err();

    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    assert_eq!(failed.metadata.attempts, 0);
    assert!(failed.metadata.history.is_empty());
    assert!(matches!(failed.error, Error::RateLimitExceeded { .. }));
}

#[tokio::test(start_paused = true)]
async fn weight_heavier_than_capacity_is_rejected_up_front() {
    let bucket = DualBucket::new(small_bucket()).unwrap();

    // Weight capacity is 15 units; a 500-unit call can never be admitted.
    let admission = bucket
        .acquire("bulk-export", 500, Duration::from_secs(300))
        .await;
    assert!(!admission.granted);
    assert_eq!(admission.waited, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn weight_dimension_gates_independently_of_calls() {
    let bucket = DualBucket::new(small_bucket()).unwrap();

    // One heavy call drains the weight dimension but leaves a call token.
    assert!(bucket.acquire("orders", 15, Duration::ZERO).await.granted);
    let snapshot = bucket.snapshot().await;
    assert!(snapshot.call_tokens >= 0.5);

    // A weighted call must now wait; a zero-weight call still passes.
    assert!(!bucket.acquire("orders", 10, Duration::ZERO).await.granted);
    assert!(bucket.acquire("orders", 0, Duration::ZERO).await.granted);
}

#[tokio::test(start_paused = true)]
async fn breakers_and_stats_are_tracked_per_endpoint() {
    let orchestrator = OrchestratorBuilder::new()
        .per_minute(600.0, 6000.0)
        .max_failures(1)
        .build();

    let _ = orchestrator
        .execute("flaky", 1, || async { Err::<(), _>(Error::fatal("down")) })
        .await;
    orchestrator
        .execute("healthy", 1, || async { Ok(()) })
        .await
        .unwrap();

    // The flaky endpoint's breaker is open; the healthy one still flows.
    let failed = orchestrator
        .execute("flaky", 1, || async { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(failed.error, Error::CircuitOpen { .. }));
    orchestrator
        .execute("healthy", 1, || async { Ok(()) })
        .await
        .unwrap();

    let snapshot = orchestrator.bucket().snapshot().await;
    let names: Vec<&str> = snapshot.endpoints.iter().map(|e| e.endpoint.as_str()).collect();
    assert_eq!(names, ["flaky", "healthy"]);
    assert_eq!(snapshot.endpoints[1].counters.succeeded, 2);

    let stats = orchestrator.breakers().stats();
    assert_eq!(stats.active_endpoints, 2);
}

#[tokio::test(start_paused = true)]
async fn attempt_history_narrates_the_whole_call() {
    init_tracing();
    let observed = Arc::new(AtomicUsize::new(0));
    let hook_observed = Arc::clone(&observed);
    let orchestrator = OrchestratorBuilder::new()
        .per_minute(600.0, 6000.0)
        .max_failures(10)
        .build()
        .with_attempt_hook(move |_| {
            hook_observed.fetch_add(1, Ordering::SeqCst);
        });

    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);
    let report = orchestrator
        .execute("orders", 1, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0 => Err(Error::throttled("429")),
                    1 => Err(Error::transient("reset")),
                    _ => Ok(()),
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(report.metadata.attempts, 3);
    assert_eq!(observed.load(Ordering::SeqCst), 3);
    let attempts: Vec<u32> = report.metadata.history.iter().map(|r| r.attempt).collect();
    assert_eq!(attempts, [1, 2, 3]);

    // The history serializes for structured logs.
    let json = serde_json::to_string(&report.metadata).unwrap();
    assert!(json.contains("\"throttled\""));
    assert!(json.contains("\"rate_at_time\""));
}

#[tokio::test(start_paused = true)]
async fn dropping_an_execute_future_holds_no_tokens() {
    let orchestrator = OrchestratorBuilder::new().bucket(small_bucket()).build();

    orchestrator
        .execute("orders", 1, || async { Ok(()) })
        .await
        .unwrap();

    {
        // Admission for this call is never granted: the future is dropped
        // while acquire is still waiting on a timer.
        let pending = orchestrator.execute("orders", 1, || async { Ok(()) });
        futures::pin_mut!(pending);
        assert!(futures::poll!(pending.as_mut()).is_pending());
    }

    // The abandoned call debited nothing; refill restores full service.
    tokio::time::advance(Duration::from_secs(60)).await;
    orchestrator
        .execute("orders", 1, || async { Ok(()) })
        .await
        .unwrap();
}
