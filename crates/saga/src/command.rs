//! Step commands: the forward and compensating actions of a saga step.

use std::future::Future;

use async_trait::async_trait;

use crate::error::CommandError;

/// An asynchronous, side-effecting operation executed for a saga step.
///
/// The payload is handed over by value; the processor keeps its own copy and
/// forwards it unchanged to the next step. Only success or failure matters to
/// the orchestrator.
///
/// Commands may run more than once for the same saga instance when the
/// transport redelivers an envelope, so they should be idempotent.
#[async_trait]
pub trait StepCommand<P>: Send + Sync {
    /// Executes the command for one saga instance.
    async fn execute(&self, payload: P) -> Result<(), CommandError>;
}

/// A [`StepCommand`] backed by an async closure. See [`command_fn`].
#[derive(Clone)]
pub struct FnCommand<F> {
    f: F,
}

/// Turns an async closure into a [`StepCommand`].
///
/// ```
/// use saga::{CommandError, StepCommand, command_fn};
///
/// let reserve = command_fn(|seats: u32| async move {
///     if seats == 0 {
///         return Err(CommandError::new("nothing to reserve"));
///     }
///     Ok(())
/// });
/// # let _ = &reserve;
/// ```
pub fn command_fn<F>(f: F) -> FnCommand<F> {
    FnCommand { f }
}

#[async_trait]
impl<P, F, Fut> StepCommand<P> for FnCommand<F>
where
    P: Send + 'static,
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), CommandError>> + Send,
{
    async fn execute(&self, payload: P) -> Result<(), CommandError> {
        (self.f)(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fn_command_passes_payload() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let command = command_fn(move |value: usize| {
            let seen = Arc::clone(&seen_clone);
            async move {
                seen.store(value, Ordering::SeqCst);
                Ok::<(), CommandError>(())
            }
        });

        command.execute(42).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[tokio::test]
    async fn test_fn_command_propagates_failure() {
        let command = command_fn(|_: ()| async { Err::<(), _>(CommandError::new("declined")) });
        let err = command.execute(()).await.unwrap_err();
        assert_eq!(err.reason(), "declined");
    }

    #[tokio::test]
    async fn test_fn_command_as_trait_object() {
        let command: Arc<dyn StepCommand<u8>> =
            Arc::new(command_fn(|_: u8| async { Ok::<(), CommandError>(()) }));
        assert!(command.execute(1).await.is_ok());
    }
}
