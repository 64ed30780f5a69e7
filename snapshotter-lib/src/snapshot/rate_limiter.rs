use core::cell::Cell;
use core::pin::pin;
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

const LOG_TARGET: &str = "   limiter";

tokio::task_local! {
    /// Time the current budgeted operation has spent held back by a limiter.
    static LIMITER_WAIT: WaitLedger;
}

#[derive(Debug, Default)]
struct WaitLedger {
    credited: Cell<Duration>,
    waiting_since: Cell<Option<Instant>>,
}

impl WaitLedger {
    fn begin(&self) {
        self.waiting_since.set(Some(Instant::now()));
    }

    fn end(&self) {
        if let Some(since) = self.waiting_since.take() {
            self.credit(since.elapsed());
        }
    }

    fn credit(&self, waited: Duration) {
        self.credited.set(self.credited.get() + waited);
    }

    /// Drain the wait accumulated so far, including a wait still in progress.
    fn drain(&self) -> Duration {
        let mut waited = self.credited.take();
        if let Some(since) = self.waiting_since.get() {
            let now = Instant::now();
            waited += now - since;
            self.waiting_since.set(Some(now));
        }
        waited
    }
}

/// Request pacing applied to one upstream host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostLimits {
    /// Minimum spacing between two grants for the host.
    #[serde(default, with = "humantime_serde")]
    pub min_interval: Duration,

    /// Maximum number of requests in flight for the host.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

const fn default_max_concurrent() -> usize {
    5
}

impl Default for HostLimits {
    fn default() -> Self {
        Self {
            min_interval: Duration::ZERO,
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug)]
struct HostState {
    min_interval: Duration,
    semaphore: Arc<Semaphore>,

    /// Earliest instant of the next grant. Held across the spacing sleep so grants are
    /// handed out one at a time, in arrival order.
    next_slot: tokio::sync::Mutex<Instant>,

    /// Set by [`RateLimiter::pause`]; the longest pause wins.
    paused_until: Mutex<Instant>,
}

impl HostState {
    fn new(limits: HostLimits) -> Self {
        let now = Instant::now();
        Self {
            min_interval: limits.min_interval,
            semaphore: Arc::new(Semaphore::new(limits.max_concurrent)),
            next_slot: tokio::sync::Mutex::new(now),
            paused_until: Mutex::new(now),
        }
    }

    fn paused_until(&self) -> Instant {
        *self.paused_until.lock().expect("lock not poisoned")
    }
}

/// Permission to issue one request. The host's concurrency slot is released on drop.
#[derive(Debug)]
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
}

/// Per-host request pacing and concurrency limiting.
///
/// Each host gets a minimum inter-request interval and a cap on outstanding requests.
/// Callers wait in [`acquire`](Self::acquire) in FIFO order until both constraints allow
/// them through. A host can be paused with [`pause`](Self::pause) when the upstream
/// reports that its rate limit is exhausted.
#[derive(Debug)]
pub struct RateLimiter {
    default_limits: HostLimits,
    overrides: HashMap<String, HostLimits>,
    hosts: Mutex<HashMap<String, Arc<HostState>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(default_limits: HostLimits, overrides: HashMap<String, HostLimits>) -> Self {
        Self {
            default_limits,
            overrides,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Limits that apply to `host`.
    #[must_use]
    pub fn limits_for(&self, host: &str) -> HostLimits {
        self.overrides.get(host).copied().unwrap_or(self.default_limits)
    }

    fn host_state(&self, host: &str) -> Arc<HostState> {
        let mut hosts = self.hosts.lock().expect("lock not poisoned");
        Arc::clone(
            hosts
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(HostState::new(self.limits_for(host)))),
        )
    }

    /// Wait until a request to `host` is allowed.
    ///
    /// Hold the returned permit for the duration of the request.
    pub async fn acquire(&self, host: &str) -> RatePermit {
        let state = self.host_state(host);
        let _ = LIMITER_WAIT.try_with(WaitLedger::begin);

        let permit = Arc::clone(&state.semaphore)
            .acquire_owned()
            .await
            .expect("semaphore is never closed");

        let mut next_slot = state.next_slot.lock().await;
        loop {
            let ready_at = (*next_slot).max(state.paused_until());
            if ready_at <= Instant::now() {
                break;
            }
            tokio::time::sleep_until(ready_at).await;
        }
        *next_slot = Instant::now() + state.min_interval;
        drop(next_slot);

        let _ = LIMITER_WAIT.try_with(WaitLedger::end);
        RatePermit { _permit: permit }
    }

    /// Hold back every grant for `host` for at least `duration` from now.
    ///
    /// Requests already granted are not affected. Overlapping pauses keep the later deadline.
    pub fn pause(&self, host: &str, duration: Duration) {
        let state = self.host_state(host);
        let until = Instant::now() + duration;

        let mut paused_until = state.paused_until.lock().expect("lock not poisoned");
        if until > *paused_until {
            *paused_until = until;
            log::info!(target: LOG_TARGET, "Pausing requests to '{host}' for {}s", duration.as_secs());
        }
    }
}

/// Add `waited` to the limiter wait of the enclosing [`timeout_excluding_waits`], if any.
pub fn credit_limiter_wait(waited: Duration) {
    let _ = LIMITER_WAIT.try_with(|ledger| ledger.credit(waited));
}

/// Run `fut` with a time budget that does not count time spent waiting on a [`RateLimiter`].
///
/// Waits in [`RateLimiter::acquire`] and waits credited through [`credit_limiter_wait`]
/// push the deadline back by the same amount. Returns `None` if the budget runs out.
pub async fn timeout_excluding_waits<F: Future>(budget: Duration, fut: F) -> Option<F::Output> {
    LIMITER_WAIT
        .scope(WaitLedger::default(), async move {
            let mut fut = pin!(fut);
            let mut deadline = Instant::now() + budget;
            loop {
                tokio::select! {
                    output = &mut fut => return Some(output),
                    () = tokio::time::sleep_until(deadline) => {
                        let waited = LIMITER_WAIT.with(WaitLedger::drain);
                        if waited.is_zero() {
                            return None;
                        }
                        deadline += waited;
                    }
                }
            }
        })
        .await
}
