//! Invocation context
//!
//! One context per function invocation. It carries the invocation id used in
//! spans and the cancellation signal every suspended backend call observes.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::BindError;

#[derive(Debug, Clone)]
pub struct InvocationContext {
    id: Uuid,
    cancellation: CancellationToken,
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationContext {
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Context cancelled together with `token`
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            cancellation: token,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fail fast before starting new work on a cancelled invocation
    pub fn check(&self) -> Result<(), BindError> {
        if self.is_cancelled() {
            return Err(BindError::Cancelled);
        }
        Ok(())
    }
}

/// Run a backend operation, aborting with `Cancelled` as soon as `token` fires.
///
/// The operation future is dropped on cancellation; no rollback is attempted.
pub async fn cancellable<T, E, F>(token: &CancellationToken, operation: F) -> Result<T, BindError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<BindError>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(BindError::Cancelled),
        result = operation => result.map_err(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use std::time::Duration;

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let cx = InvocationContext::new();
        let value = cancellable(cx.cancellation(), async { Ok::<_, BackendError>(5) })
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert!(cx.check().is_ok());
    }

    #[tokio::test]
    async fn pending_operation_observes_cancellation() {
        let cx = InvocationContext::new();
        let token = cx.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = cancellable(cx.cancellation(), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, BackendError>(())
        })
        .await;

        assert!(matches!(result, Err(BindError::Cancelled)));
        assert!(matches!(cx.check(), Err(BindError::Cancelled)));
    }

    #[tokio::test]
    async fn backend_errors_are_wrapped() {
        let cx = InvocationContext::new();
        let result: Result<(), BindError> = cancellable(cx.cancellation(), async {
            Err(BackendError::not_found("items"))
        })
        .await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(InvocationContext::new().id(), InvocationContext::new().id());
    }
}
