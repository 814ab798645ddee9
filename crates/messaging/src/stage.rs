use crate::error::ErrorKind;

use std::error::Error;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Marker trait for stage errors.
pub trait StageError: Error + Send + Sync + 'static {
    /// Whether the supervisor should rebuild the stage or give up.
    fn kind(&self) -> ErrorKind;
}

/// A deployable unit: one input consumer, its output producers, and any
/// collaborators, built together and torn down together.
///
/// The supervisor calls `construct` once per attempt and drops the instance
/// when `run` returns, which closes every binding it owns.
#[async_trait]
pub trait Stage
where
    Self: Send + Sync + Sized + 'static,
{
    /// Name used in logs and metrics.
    const NAME: &'static str;

    /// Everything needed to build an instance.
    type Config: Send + Sync + 'static;

    /// The error type for the stage.
    type Error: StageError;

    /// Connects to the broker and creates every binding.
    async fn construct(config: &Self::Config) -> Result<Self, Self::Error>;

    /// Runs the input consumer until it stops or `shutdown` is cancelled.
    async fn run(&self, shutdown: &CancellationToken) -> Result<(), Self::Error>;
}
