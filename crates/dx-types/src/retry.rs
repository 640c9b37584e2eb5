use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded retry with jittered exponential backoff.
///
/// One policy instance covers both external fetch calls and persistence
/// commits, so the retry/timeout behavior lives in exactly one place
/// instead of bespoke loops at every call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (>= 1).
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 0.0..=1.0 fraction of the delay randomized either way.
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let base = base_delay_ms.max(1);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: base,
            max_delay_ms: max_delay_ms.max(base),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// Two attempts with a short pause, the write-commit default.
    pub fn commit_default() -> Self {
        Self::new(2, 500, 2_000, 0.2)
    }

    fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(attempt as u32);
        let mut delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        if self.jitter_pct > 0.0 {
            let spread = (delay as f64 * self.jitter_pct) as i64;
            if spread > 0 {
                let delta = rand::thread_rng().gen_range(-spread..=spread);
                delay = delay.saturating_add_signed(delta);
            }
        }
        Duration::from_millis(delay)
    }

    /// Run `op` until it succeeds or attempts are exhausted; the final
    /// error is returned unchanged. The closure receives the zero-based
    /// attempt number.
    pub async fn run<F, Fut, T, E>(&self, op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.run_where(op, |_| true).await
    }

    /// Like [`run`](Self::run), but an error for which `should_retry`
    /// returns false is surfaced immediately without burning the
    /// remaining attempts.
    pub async fn run_where<F, Fut, T, E, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !should_retry(&e) {
                        return Err(e);
                    }
                    sleep(self.next_delay(attempt - 1)).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::commit_default()
    }
}
