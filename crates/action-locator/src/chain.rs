//! Ordered "try A, then B, then C" evaluation.

use futures::future::BoxFuture;
use std::fmt::Display;
use tracing::debug;

/// One lazily evaluated candidate. `Ok(None)` is a miss.
pub type Attempt<'a, T, E> = BoxFuture<'a, Result<Option<T>, E>>;

/// Errors that can abort a chain instead of counting as a miss.
pub trait ChainError: Display {
    fn aborts_chain(&self) -> bool;
}

impl ChainError for crate::errors::LocatorError {
    fn aborts_chain(&self) -> bool {
        matches!(self, crate::errors::LocatorError::Cancelled)
    }
}

/// The winning candidate and its position in the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Won<T> {
    pub index: usize,
    pub value: T,
}

/// Awaits candidates in order and returns the first hit.
///
/// Non-aborting errors are logged and treated as misses. Candidates after the
/// winner are never polled.
pub async fn first_success<T, E>(
    label: &str,
    attempts: Vec<Attempt<'_, T, E>>,
) -> Result<Option<Won<T>>, E>
where
    E: ChainError,
{
    for (index, attempt) in attempts.into_iter().enumerate() {
        match attempt.await {
            Ok(Some(value)) => {
                debug!(chain = label, index, "chain candidate succeeded");
                return Ok(Some(Won { index, value }));
            }
            Ok(None) => debug!(chain = label, index, "chain candidate missed"),
            Err(err) if err.aborts_chain() => return Err(err),
            Err(err) => debug!(chain = label, index, error = %err, "chain candidate failed"),
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LocatorError;
    use cdp_adapter::{AdapterError, AdapterErrorKind};
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn returns_first_hit_and_skips_the_rest() {
        let polled = AtomicUsize::new(0);
        let attempts: Vec<Attempt<'_, &str, LocatorError>> = vec![
            async { Ok(None) }.boxed(),
            async {
                Err(LocatorError::Driver(AdapterError::new(AdapterErrorKind::CdpIo)))
            }
            .boxed(),
            async { Ok(Some("third")) }.boxed(),
            async {
                polled.fetch_add(1, Ordering::SeqCst);
                Ok(Some("fourth"))
            }
            .boxed(),
        ];
        let won = first_success("test", attempts).await.unwrap();
        assert_eq!(
            won,
            Some(Won {
                index: 2,
                value: "third"
            })
        );
        assert_eq!(polled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_aborts() {
        let attempts: Vec<Attempt<'_, (), LocatorError>> = vec![
            async { Err(LocatorError::Cancelled) }.boxed(),
            async { Ok(Some(())) }.boxed(),
        ];
        assert!(matches!(
            first_success("test", attempts).await,
            Err(LocatorError::Cancelled)
        ));
    }
}
