//! Rate-limit-aware request scheduler.
//!
//! The directory API enforces strict per-account rate limits. Every HTTP
//! call the app makes goes through this scheduler, which bounds the number
//! of in-flight requests, observes 429 responses, and transparently retries
//! them after the server's advertised window.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use reqwest::{header, Response, StatusCode};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};

/// Default number of requests allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Total attempts for one request, including the first.
const MAX_ATTEMPTS: u32 = 5;

/// Fallback window when Retry-After is missing or not a positive integer.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Margin added on top of the server's advertised window.
const RETRY_MARGIN_SECS: u64 = 1;

/// Safety-net interval for the drain loop, in case a wakeup is missed.
const DRAIN_INTERVAL: Duration = Duration::from_millis(500);

/// How the scheduler (and callers) should treat a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  Success,
  RateLimited,
  Failure,
}

/// Classify a response status: any 2xx is a success, exactly 429 is rate
/// limiting, everything else is a failure.
pub fn classify(status: StatusCode) -> Classification {
  if status == StatusCode::TOO_MANY_REQUESTS {
    Classification::RateLimited
  } else if status.is_success() {
    Classification::Success
  } else {
    Classification::Failure
  }
}

/// Shared "is the account currently rate-limited" flag plus the server's
/// advertised retry-after window. Written only by the scheduler's retry
/// loop; read by the UI for the advisory banner.
#[derive(Debug, Default)]
pub struct RateLimitState {
  limited: AtomicBool,
  retry_after_secs: AtomicU64,
}

impl RateLimitState {
  pub fn is_limited(&self) -> bool {
    self.limited.load(Ordering::Relaxed)
  }

  pub fn retry_after_secs(&self) -> u64 {
    self.retry_after_secs.load(Ordering::Relaxed)
  }

  /// Single update path: the flag and the window always move together.
  fn record(&self, limited: bool, retry_after_secs: u64) {
    self.retry_after_secs.store(retry_after_secs, Ordering::Relaxed);
    self.limited.store(limited, Ordering::Relaxed);
  }
}

/// A deferred HTTP call. Boxed so the scheduler can re-invoke it once per
/// retry attempt; each invocation must build a fresh request.
type RequestFn = Box<dyn Fn() -> BoxFuture<'static, Result<Response>> + Send + Sync>;

/// One queued submission: the request closure plus the channel that settles
/// the caller. Owned exclusively by the scheduler from submission until the
/// final response (or transport error) is sent back.
struct ScheduledRequest {
  run: RequestFn,
  done: oneshot::Sender<Result<Response>>,
}

/// Bounded-concurrency queue for HTTP-issuing closures.
///
/// At most `max_concurrency` requests execute at any instant. A request
/// occupies its slot from execution start until final settlement, including
/// any internal 429 retries, so a rate-limit episode never amplifies load.
/// No ordering is guaranteed between concurrent submissions.
#[derive(Clone)]
pub struct RateLimitedScheduler {
  inner: Arc<Inner>,
}

struct Inner {
  max_concurrency: usize,
  queue: Mutex<VecDeque<ScheduledRequest>>,
  executing: AtomicUsize,
  rate_limit: Arc<RateLimitState>,
  wake: Notify,
}

impl RateLimitedScheduler {
  pub fn new() -> Self {
    Self::with_max_concurrency(DEFAULT_MAX_CONCURRENCY)
  }

  pub fn with_max_concurrency(max_concurrency: usize) -> Self {
    let inner = Arc::new(Inner {
      max_concurrency,
      queue: Mutex::new(VecDeque::new()),
      executing: AtomicUsize::new(0),
      rate_limit: Arc::new(RateLimitState::default()),
      wake: Notify::new(),
    });

    // Drain pump: normally woken by submissions and slot releases, with a
    // timer as safety net. Exits once the scheduler itself is dropped.
    let pump = Arc::downgrade(&inner);
    tokio::spawn(async move {
      loop {
        let Some(inner) = pump.upgrade() else { break };
        inner.drain();
        tokio::select! {
          _ = inner.wake.notified() => {}
          _ = tokio::time::sleep(DRAIN_INTERVAL) => {}
        }
      }
    });

    Self { inner }
  }

  /// Handle to the shared rate-limit flag, for advisory display.
  pub fn rate_limit(&self) -> Arc<RateLimitState> {
    Arc::clone(&self.inner.rate_limit)
  }

  /// Enqueue a request and wait for its final response.
  ///
  /// The caller always receives a settled result: 429s are retried up to
  /// five total attempts and the last response is returned as a normal
  /// value even when still rate-limited, so callers must classify the
  /// status themselves. Only transport-level failures return `Err`.
  pub async fn submit<F>(&self, request: F) -> Result<Response>
  where
    F: Fn() -> BoxFuture<'static, Result<Response>> + Send + Sync + 'static,
  {
    let (tx, rx) = oneshot::channel();
    {
      let mut queue = self.inner.queue.lock().expect("scheduler queue poisoned");
      queue.push_back(ScheduledRequest {
        run: Box::new(request),
        done: tx,
      });
    }
    self.inner.drain();

    rx.await
      .map_err(|_| eyre!("scheduler dropped the request before settling it"))?
  }
}

impl Default for RateLimitedScheduler {
  fn default() -> Self {
    Self::new()
  }
}

impl Inner {
  /// Start queued requests while slots are available. The executing counter
  /// is only ever incremented under the queue lock, which keeps concurrent
  /// drains from overcommitting the pool.
  fn drain(self: &Arc<Self>) {
    loop {
      let request = {
        let mut queue = self.queue.lock().expect("scheduler queue poisoned");
        if self.executing.load(Ordering::Acquire) >= self.max_concurrency {
          return;
        }
        let Some(request) = queue.pop_front() else {
          return;
        };
        self.executing.fetch_add(1, Ordering::AcqRel);
        request
      };

      let inner = Arc::clone(self);
      tokio::spawn(async move {
        // Released on drop, even if the request closure panics.
        let _slot = SlotGuard {
          inner: Arc::clone(&inner),
        };
        let result = inner.run_with_retry(&request.run).await;
        let _ = request.done.send(result);
      });
    }
  }

  /// Execute one request, retrying on 429 up to `MAX_ATTEMPTS` total tries.
  /// The backoff suspends only this task; other in-flight requests and the
  /// queue keep moving.
  async fn run_with_retry(&self, run: &RequestFn) -> Result<Response> {
    let mut attempt = 1;
    loop {
      let response = run().await?;
      let limited = classify(response.status()) == Classification::RateLimited;
      let wait_secs = retry_after_secs(&response);
      self.rate_limit.record(limited, if limited { wait_secs } else { 0 });

      if !limited || attempt == MAX_ATTEMPTS {
        if limited {
          warn!(attempt, "still rate limited after final attempt, giving up");
        }
        return Ok(response);
      }

      debug!(attempt, wait_secs, "rate limited, backing off before retry");
      tokio::time::sleep(Duration::from_secs(wait_secs)).await;
      attempt += 1;
    }
  }
}

struct SlotGuard {
  inner: Arc<Inner>,
}

impl Drop for SlotGuard {
  fn drop(&mut self) {
    self.inner.executing.fetch_sub(1, Ordering::AcqRel);
    self.inner.wake.notify_one();
  }
}

/// Seconds to wait before retrying: the server's Retry-After plus a one
/// second margin, or the 60s default when the header is absent or not a
/// positive integer.
fn retry_after_secs(response: &Response) -> u64 {
  let advertised = response
    .headers()
    .get(header::RETRY_AFTER)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| value.trim().parse::<i64>().ok())
    .filter(|secs| *secs > 0)
    .map(|secs| secs as u64)
    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

  advertised + RETRY_MARGIN_SECS
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicU32;
  use tokio::time::Instant;

  fn response(status: u16, retry_after: Option<&str>) -> Response {
    let mut builder = http::Response::builder().status(status);
    if let Some(value) = retry_after {
      builder = builder.header("retry-after", value);
    }
    Response::from(builder.body("").unwrap())
  }

  #[test]
  fn test_classify() {
    assert_eq!(classify(StatusCode::OK), Classification::Success);
    assert_eq!(classify(StatusCode::NO_CONTENT), Classification::Success);
    assert_eq!(
      classify(StatusCode::TOO_MANY_REQUESTS),
      Classification::RateLimited
    );
    assert_eq!(classify(StatusCode::MULTIPLE_CHOICES), Classification::Failure);
    assert_eq!(classify(StatusCode::NOT_FOUND), Classification::Failure);
    assert_eq!(
      classify(StatusCode::INTERNAL_SERVER_ERROR),
      Classification::Failure
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrency_is_bounded() {
    let scheduler = RateLimitedScheduler::with_max_concurrency(2);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..5 {
      let scheduler = scheduler.clone();
      let current = Arc::clone(&current);
      let peak = Arc::clone(&peak);
      handles.push(tokio::spawn(async move {
        scheduler
          .submit(move || {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            Box::pin(async move {
              let now = current.fetch_add(1, Ordering::SeqCst) + 1;
              peak.fetch_max(now, Ordering::SeqCst);
              tokio::time::sleep(Duration::from_millis(50)).await;
              current.fetch_sub(1, Ordering::SeqCst);
              Ok(response(200, None))
            })
          })
          .await
      }));
    }

    for handle in handles {
      let result = handle.await.unwrap().unwrap();
      assert_eq!(result.status(), StatusCode::OK);
    }
    assert_eq!(peak.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_persistent_429_returns_fifth_response() {
    let scheduler = RateLimitedScheduler::new();
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result = scheduler
      .submit(move || {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Ok(response(429, Some("1")))
        })
      })
      .await
      .unwrap();

    assert_eq!(result.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(attempts.load(Ordering::SeqCst), 5);
    assert!(scheduler.rate_limit().is_limited());
  }

  #[tokio::test(start_paused = true)]
  async fn test_retry_after_header_adds_margin() {
    let scheduler = RateLimitedScheduler::new();
    let attempts = Arc::new(AtomicU32::new(0));

    let started = Instant::now();
    let counter = Arc::clone(&attempts);
    let result = scheduler
      .submit(move || {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
          if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(response(429, Some("5")))
          } else {
            Ok(response(200, None))
          }
        })
      })
      .await
      .unwrap();

    assert_eq!(result.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_secs(6));
    // Recovery clears the advisory flag.
    assert!(!scheduler.rate_limit().is_limited());
  }

  #[tokio::test(start_paused = true)]
  async fn test_missing_retry_after_defaults_to_sixty_seconds() {
    let scheduler = RateLimitedScheduler::new();
    let attempts = Arc::new(AtomicU32::new(0));

    let started = Instant::now();
    let counter = Arc::clone(&attempts);
    scheduler
      .submit(move || {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
          if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(response(429, Some("not-a-number")))
          } else {
            Ok(response(200, None))
          }
        })
      })
      .await
      .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(61));
  }

  #[tokio::test(start_paused = true)]
  async fn test_transport_error_is_not_retried() {
    let scheduler = RateLimitedScheduler::new();
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result = scheduler
      .submit(move || {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Err(eyre!("connection reset"))
        })
      })
      .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_status_is_returned_without_retry() {
    let scheduler = RateLimitedScheduler::new();
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result = scheduler
      .submit(move || {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Ok(response(503, None))
        })
      })
      .await
      .unwrap();

    assert_eq!(result.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(!scheduler.rate_limit().is_limited());
  }
}
