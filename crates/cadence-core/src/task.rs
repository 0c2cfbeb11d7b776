//! Bridging blocking file work into the async runtime.

use tokio::task;

use crate::error::{PipelineError, Result};

/// Runs `f` on the blocking thread pool and flattens the join error.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f).await.map_err(PipelineError::join)?
}
