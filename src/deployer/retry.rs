use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::warn;

use crate::{DeployConfig, ProvisionError, Result};

/// Waits between retry attempts. Injected so tests run without wall-clock delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(
        &self,
        delay: Duration,
    );
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(
        &self,
        delay: Duration,
    ) {
        tokio::time::sleep(delay).await;
    }
}

/// Bounded retry with a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// attempts after the first one
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            delay: Duration::from_secs(2),
        }
    }
}

impl From<&DeployConfig> for RetryPolicy {
    fn from(config: &DeployConfig) -> Self {
        Self {
            retries: config.activation_retries,
            delay: config.activation_retry_delay(),
        }
    }
}

impl RetryPolicy {
    pub fn new(
        retries: u32,
        delay: Duration,
    ) -> Self {
        Self {
            retries,
            delay,
        }
    }

    /// Runs `attempt` until it succeeds, the policy is exhausted or it fails
    /// with an error `retryable` refuses. Before every retry `recover` runs and
    /// then the sleeper waits `delay`. Returns the last error.
    pub async fn run<'a, T, F, R, P>(
        &self,
        sleeper: &dyn Sleeper,
        mut attempt: F,
        mut recover: R,
        retryable: P,
    ) -> Result<T>
    where
        F: FnMut() -> BoxFuture<'a, Result<T>>,
        R: FnMut() -> BoxFuture<'a, ()>,
        P: Fn(&ProvisionError) -> bool,
    {
        let mut remaining = self.retries;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if remaining > 0 && retryable(&err) => {
                    remaining -= 1;
                    warn!("attempt failed, {} retries left: {}", remaining, err);
                    recover().await;
                    sleeper.sleep(self.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };

    use futures::FutureExt;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for Recorder {
        async fn sleep(
            &self,
            delay: Duration,
        ) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    fn failing(
        calls: &AtomicU32,
        failures: u32,
    ) -> Result<u32> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            Err(ProvisionError::Engine {
                status: Some(400),
                message: format!("attempt {}", n),
            })
        } else {
            Ok(n)
        }
    }

    #[tokio::test]
    async fn test_retries_once_then_succeeds() {
        let sleeper = Recorder::default();
        let calls = &AtomicU32::new(0);
        let recovered = &AtomicU32::new(0);
        let policy = RetryPolicy::new(1, Duration::from_millis(250));

        let value = policy
            .run(
                &sleeper,
                move || async move { failing(calls, 1) }.boxed(),
                move || {
                    async move {
                        recovered.fetch_add(1, Ordering::SeqCst);
                    }
                    .boxed()
                },
                |_| true,
            )
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(recovered.load(Ordering::SeqCst), 1);
        assert_eq!(*sleeper.delays.lock().unwrap(), vec![Duration::from_millis(250)]);
    }

    #[tokio::test]
    async fn test_exhausted_policy_returns_last_error() {
        let sleeper = Recorder::default();
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(10));

        let err = policy.run(&sleeper, move || async move { failing(calls, 10) }.boxed(), || async {}.boxed(), |_| true).await.unwrap_err();

        assert_eq!(
            err,
            ProvisionError::Engine {
                status: Some(400),
                message: "attempt 3".to_string(),
            }
        );
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refused_errors_are_not_retried() {
        let sleeper = Recorder::default();
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let err = policy.run(&sleeper, move || async move { failing(calls, 1) }.boxed(), || async {}.boxed(), |_| false).await.unwrap_err();

        assert!(matches!(err, ProvisionError::Engine { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }
}
