use crate::error::ErrorKind;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::stage::{Stage, StageError};

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Default pause between a failed attempt and the next construction.
pub const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_secs(10);

/// Options for a supervisor.
#[derive(Clone, Debug)]
pub struct SupervisorOptions {
    /// Fixed pause before rebuilding a failed stage.
    pub restart_backoff: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            restart_backoff: DEFAULT_RESTART_BACKOFF,
        }
    }
}

/// Why a supervisor returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    /// The shutdown token was cancelled.
    Shutdown,

    /// The stage failed with a fatal error, such as the broker interrupting it.
    Fatal,
}

/// Keeps one stage alive: builds it, runs it, and rebuilds it after every
/// retryable failure.
///
/// Nothing is carried from one attempt to the next. The backoff is fixed and
/// there is no retry ceiling.
pub struct Supervisor<St>
where
    St: Stage,
{
    config: St::Config,
    metrics: Arc<dyn MetricsSink>,
    options: SupervisorOptions,
    shutdown_token: CancellationToken,
}

impl<St> std::fmt::Debug for Supervisor<St>
where
    St: Stage,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("stage", &St::NAME)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<St> Supervisor<St>
where
    St: Stage,
{
    /// Creates a supervisor that stops when `shutdown_token` is cancelled.
    pub fn new(
        config: St::Config,
        options: SupervisorOptions,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            metrics: Arc::new(NoopMetrics),
            options,
            shutdown_token,
        }
    }

    /// Reports restarts to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Runs the stage until shutdown or a fatal error.
    pub async fn run(&self) -> Exit {
        loop {
            if self.shutdown_token.is_cancelled() {
                return Exit::Shutdown;
            }

            let constructed = tokio::select! {
                biased;
                () = self.shutdown_token.cancelled() => return Exit::Shutdown,
                constructed = St::construct(&self.config) => constructed,
            };

            let result = match constructed {
                Ok(stage) => {
                    info!("stage '{}' running", St::NAME);
                    stage.run(&self.shutdown_token).await
                    // `stage` drops here, closing its bindings before any backoff
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) if self.shutdown_token.is_cancelled() => {
                    info!("stage '{}' shut down", St::NAME);
                    return Exit::Shutdown;
                }
                Ok(()) => {
                    info!("stage '{}' stopped, rebuilding", St::NAME);
                }
                Err(e) if e.kind() == ErrorKind::Fatal => {
                    error!("stage '{}' failed fatally: {}", St::NAME, e);
                    return Exit::Fatal;
                }
                Err(e) => {
                    if self.shutdown_token.is_cancelled() {
                        info!("stage '{}' ended during shutdown: {}", St::NAME, e);
                        return Exit::Shutdown;
                    }

                    warn!(
                        "stage '{}' failed: {}; restarting in {:?}",
                        St::NAME,
                        e,
                        self.options.restart_backoff
                    );
                    self.metrics.stage_restarted(St::NAME);

                    tokio::select! {
                        () = self.shutdown_token.cancelled() => return Exit::Shutdown,
                        () = tokio::time::sleep(self.options.restart_backoff) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use thiserror::Error;
    use tokio::sync::Notify;
    use tokio::time::Instant;

    #[derive(Debug, Error)]
    #[error("test stage failed ({0})")]
    struct TestError(ErrorKind);

    impl StageError for TestError {
        fn kind(&self) -> ErrorKind {
            self.0
        }
    }

    #[derive(Debug, Default)]
    struct TestConfig {
        attempts: AtomicUsize,
        failures: usize,
        failure_kind: Option<ErrorKind>,
        started: Notify,
    }

    struct TestStage {
        config: Arc<TestConfig>,
    }

    #[async_trait]
    impl Stage for TestStage {
        const NAME: &'static str = "test-stage";

        type Config = Arc<TestConfig>;
        type Error = TestError;

        async fn construct(config: &Self::Config) -> Result<Self, Self::Error> {
            let attempt = config.attempts.fetch_add(1, Ordering::SeqCst);

            if attempt < config.failures {
                return Err(TestError(
                    config.failure_kind.unwrap_or(ErrorKind::Retryable),
                ));
            }

            Ok(Self {
                config: config.clone(),
            })
        }

        async fn run(&self, shutdown: &CancellationToken) -> Result<(), Self::Error> {
            self.config.started.notify_one();
            shutdown.cancelled().await;
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct CountingMetrics {
        restarts: AtomicUsize,
    }

    impl MetricsSink for CountingMetrics {
        fn stage_restarted(&self, stage: &str) {
            assert_eq!(stage, "test-stage");
            self.restarts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_after_backoff_until_construct_succeeds() {
        let config = Arc::new(TestConfig {
            failures: 2,
            ..TestConfig::default()
        });
        let metrics = Arc::new(CountingMetrics::default());
        let shutdown_token = CancellationToken::new();

        let supervisor = Supervisor::<TestStage>::new(
            config.clone(),
            SupervisorOptions {
                restart_backoff: Duration::from_secs(10),
            },
            shutdown_token.clone(),
        )
        .with_metrics(metrics.clone());

        let start = Instant::now();
        let handle = tokio::spawn(async move { supervisor.run().await });

        config.started.notified().await;
        let elapsed = start.elapsed();

        assert_eq!(config.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.restarts.load(Ordering::SeqCst), 2);
        assert!(elapsed >= Duration::from_secs(20));
        assert!(elapsed < Duration::from_secs(21));

        shutdown_token.cancel();
        let exit = handle.await.unwrap();
        assert_eq!(exit, Exit::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let config = Arc::new(TestConfig {
            failures: usize::MAX,
            failure_kind: Some(ErrorKind::Fatal),
            ..TestConfig::default()
        });
        let metrics = Arc::new(CountingMetrics::default());

        let supervisor = Supervisor::<TestStage>::new(
            config.clone(),
            SupervisorOptions::default(),
            CancellationToken::new(),
        )
        .with_metrics(metrics.clone());

        let exit = supervisor.run().await;

        assert_eq!(exit, Exit::Fatal);
        assert_eq!(config.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.restarts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let config = Arc::new(TestConfig {
            failures: usize::MAX,
            ..TestConfig::default()
        });
        let shutdown_token = CancellationToken::new();

        let supervisor = Supervisor::<TestStage>::new(
            config.clone(),
            SupervisorOptions {
                restart_backoff: Duration::from_secs(3600),
            },
            shutdown_token.clone(),
        );

        let handle = tokio::spawn(async move { supervisor.run().await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_token.cancel();

        let exit = handle.await.unwrap();

        assert_eq!(exit, Exit::Shutdown);
        assert_eq!(config.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_run_never_constructs() {
        let config = Arc::new(TestConfig::default());
        let shutdown_token = CancellationToken::new();
        shutdown_token.cancel();

        let supervisor =
            Supervisor::<TestStage>::new(config.clone(), SupervisorOptions::default(), shutdown_token);

        assert_eq!(supervisor.run().await, Exit::Shutdown);
        assert_eq!(config.attempts.load(Ordering::SeqCst), 0);
    }
}
