//! Structured fan-out of fallible tasks sharing one cancellation token.
//!
//! Every task spawned into a [`FanOut`] races its work against the group's
//! [`CancellationToken`]. [`FanOut::join`] collects results by spawn index,
//! cancels the token on the first failure, and waits for every sibling to
//! finish before returning, so no work is left running behind the caller.

use std::fmt;
use std::future::Future;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Why a fan-out did not produce a full result set.
#[derive(Debug)]
pub enum FanOutError<E> {
    /// The first task error. Later errors are discarded.
    Task(E),
    /// The group was cancelled from outside before every task finished.
    Cancelled,
    /// A task panicked or was aborted.
    Aborted(JoinError),
}

impl<E: fmt::Display> fmt::Display for FanOutError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanOutError::Task(err) => err.fmt(f),
            FanOutError::Cancelled => f.write_str("cancelled before all tasks completed"),
            FanOutError::Aborted(err) => write!(f, "task aborted: {err}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for FanOutError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FanOutError::Task(err) => Some(err),
            FanOutError::Cancelled => None,
            FanOutError::Aborted(err) => Some(err),
        }
    }
}

/// A group of concurrently running tasks with one success/failure outcome.
pub struct FanOut<T, E> {
    tasks: JoinSet<(usize, Option<Result<T, E>>)>,
    token: CancellationToken,
    spawned: usize,
}

impl<T, E> FanOut<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create a group with its own root token.
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Create a group whose token is a child of `parent`.
    ///
    /// Cancelling `parent` cancels the group; a failure inside the group does
    /// not cancel `parent`.
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self::with_token(parent.child_token())
    }

    fn with_token(token: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            token,
            spawned: 0,
        }
    }

    /// The token shared by every task in the group.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Spawn a task. Its result lands at the next index.
    ///
    /// `task` receives a clone of the group token for cancellation checks of
    /// its own. Once the token fires, the task is dropped at its next await
    /// point and contributes no result.
    pub fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let index = self.spawned;
        self.spawned += 1;
        let token = self.token.clone();
        let work = task(token.clone());
        self.tasks.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => (index, None),
                result = work => (index, Some(result)),
            }
        });
    }

    /// Number of tasks spawned so far.
    pub fn len(&self) -> usize {
        self.spawned
    }

    pub fn is_empty(&self) -> bool {
        self.spawned == 0
    }

    /// Wait for every task and return the results in spawn order.
    pub async fn join(mut self) -> Result<Vec<T>, FanOutError<E>> {
        let mut slots: Vec<Option<T>> = (0..self.spawned).map(|_| None).collect();
        let mut failure: Option<FanOutError<E>> = None;

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = match joined {
                Ok((index, Some(Ok(value)))) => {
                    slots[index] = Some(value);
                    continue;
                }
                Ok((_, Some(Err(err)))) => FanOutError::Task(err),
                Ok((_, None)) => continue,
                Err(err) => FanOutError::Aborted(err),
            };
            if failure.is_none() {
                failure = Some(outcome);
                self.token.cancel();
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        slots
            .into_iter()
            .collect::<Option<Vec<T>>>()
            .ok_or(FanOutError::Cancelled)
    }
}

impl<T, E> Default for FanOut<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
