/*!
 * Tests for admission control under concurrent callers
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_pending, assert_ready_ok, task};

use subtrans::errors::AdmissionError;
use subtrans::translation::{AdmissionConfig, AdmissionController, RetryBudget};

fn limits(rpm: u32, tpm: u64, cap: Option<usize>) -> AdmissionConfig {
    AdmissionConfig {
        requests_per_window: rpm,
        tokens_per_window: tpm,
        max_concurrent: cap,
        window: Duration::from_secs(60),
        poll_interval: Duration::from_secs(2),
    }
}

/// Test that the concurrency cap holds with many waiting callers
#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_withManyCallers_shouldNeverBeExceeded() {
    let controller = AdmissionController::new(limits(1000, 1_000_000, Some(3)));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..12 {
        let controller = controller.clone();
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            let permit = controller.acquire(&format!("req {}", i), 10).await.unwrap();
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            permit.release(10);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 3);
    let state = controller.snapshot();
    assert_eq!(state.in_flight, 0);
    assert_eq!(state.window_request_count, 12);
}

/// Test that the request quota spreads work over windows
#[tokio::test(start_paused = true)]
async fn test_request_quota_shouldDelayBeyondWindow() {
    let controller = AdmissionController::new(limits(2, 1_000_000, None));
    let start = Instant::now();

    for i in 0..3 {
        let permit = controller.acquire(&format!("req {}", i), 1).await.unwrap();
        permit.release(1);
    }

    assert!(start.elapsed() > Duration::from_secs(60));
}

/// Test that a request larger than the token quota is refused outright
#[tokio::test(start_paused = true)]
async fn test_acquire_aboveTokenQuota_shouldNotWait() {
    let controller = AdmissionController::new(limits(10, 100, None));
    let start = Instant::now();

    let error = controller.acquire("huge", 101).await.unwrap_err();
    assert_eq!(error, AdmissionError::ExceedsQuota { cost: 101, quota: 100 });
    assert_eq!(start.elapsed(), Duration::ZERO);
}

/// Test that concurrent consumers never overdraw the retry budget
#[tokio::test]
async fn test_retry_budget_withConcurrentConsumers_shouldGrantExactlyTotal() {
    let budget = Arc::new(RetryBudget::new(25));
    let granted = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let budget = Arc::clone(&budget);
        let granted = Arc::clone(&granted);
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                if budget.try_consume() {
                    granted.fetch_add(1, Ordering::SeqCst);
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(granted.load(Ordering::SeqCst), 25);
    assert_eq!(budget.remaining(), 0);
}

/// Test that a caller over the concurrency cap stays queued until a slot frees
#[tokio::test(start_paused = true)]
async fn test_acquire_atConcurrencyCap_shouldStayPendingUntilRelease() {
    let controller = AdmissionController::new(limits(100, 1_000_000, Some(1)));
    let first = controller.acquire("first", 10).await.unwrap();

    let mut queued = task::spawn(controller.acquire("second", 10));
    assert_pending!(queued.poll());

    // polling again after several intervals does not bypass the cap
    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(queued.is_woken());
    assert_pending!(queued.poll());

    first.release(10);
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(queued.is_woken());
    let second = assert_ready_ok!(queued.poll());
    assert_eq!(controller.snapshot().in_flight, 1);
    second.release(10);
}
