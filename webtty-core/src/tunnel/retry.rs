//! Retry policy for tunnel operations that can race shell start-up

use std::future::Future;
use std::time::Duration;

use crate::shell::ShellHandle;

/// Fixed-backoff retry with a bounded number of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// - `max_attempts`: total tries, including the first
    /// - `backoff`: pause between tries
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Resize policy: 3 tries, 50ms apart
    pub fn resize_policy() -> Self {
        Self::new(3, Duration::from_millis(50))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds or attempts run out, returning the last error
    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(_) => {
                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::resize_policy()
    }
}

/// Resize `shell`, giving up quietly after the policy's attempts
pub async fn resize_with_retry(shell: &dyn ShellHandle, cols: u16, rows: u16, policy: RetryPolicy) {
    if let Err(e) = policy.run(|| shell.resize(cols, rows)).await {
        tracing::debug!(cols, rows, error = %e, "Giving up on resize");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::MockShell;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn stops_after_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ()> = RetryPolicy::resize_policy()
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result: Result<(), &str> = RetryPolicy::resize_policy()
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("not ready")
            })
            .await;
        assert_eq!(result, Err("not ready"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn resize_succeeds_once_shell_ready() {
        let (shell, controller) = MockShell::new();
        controller.fail_resizes(2);
        resize_with_retry(&shell, 100, 30, RetryPolicy::resize_policy()).await;
        assert_eq!(controller.resizes(), vec![(100, 30)]);
    }

    #[tokio::test(start_paused = true)]
    async fn resize_failure_is_swallowed() {
        let (shell, controller) = MockShell::new();
        controller.fail_resizes(5);
        resize_with_retry(&shell, 100, 30, RetryPolicy::resize_policy()).await;
        assert!(controller.resizes().is_empty());
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
