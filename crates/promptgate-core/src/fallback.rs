//! Fallback execution across an ordered provider target list
//!
//! Drives `[primary, fallback0, fallback1, ...]`: retryable provider errors
//! move on to the next target, non-retryable ones short-circuit, and
//! non-provider errors (resolution failures) abort without fallback. The
//! executor never delays or backs off; the target list is the retry budget.

use crate::config::ProviderType;
use crate::error::Error;
use crate::providers::ProviderError;
use std::future::Future;

/// One concrete execution target in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTarget {
    pub provider_id: String,
    pub provider_type: ProviderType,
    pub model: String,
}

/// Outcome of one attempt, reported through the attempt observer.
#[derive(Debug)]
pub struct AttemptOutcome<'a> {
    pub target: &'a ExecutionTarget,
    /// `None` for the successful attempt.
    pub error: Option<&'a ProviderError>,
}

/// Why the whole chain failed.
#[derive(Debug)]
pub enum FallbackFailure {
    /// Every target failed retryably (this is the last error), or one target
    /// failed terminally.
    Provider(ProviderError),
    /// A non-provider error: rethrown without trying further targets.
    Fatal(Error),
}

/// Execute attempts across `targets` in order.
///
/// `resolve` produces the provider instance for a target; `attempt` performs
/// the call; `on_attempt` observes every attempt, successful or not.
pub async fn execute_with_fallback<P, T, A, Fut>(
    targets: &[ExecutionTarget],
    resolve: impl Fn(&ExecutionTarget) -> Result<P, Error>,
    attempt: A,
    mut on_attempt: impl FnMut(AttemptOutcome<'_>),
) -> Result<T, FallbackFailure>
where
    A: Fn(P, ExecutionTarget) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    if targets.is_empty() {
        return Err(FallbackFailure::Fatal(Error::execution(
            "fallback executor invoked with an empty target list",
        )));
    }

    let mut last_error: Option<ProviderError> = None;

    for target in targets {
        let provider = resolve(target).map_err(FallbackFailure::Fatal)?;

        match attempt(provider, target.clone()).await {
            Ok(response) => {
                on_attempt(AttemptOutcome {
                    target,
                    error: None,
                });
                return Ok(response);
            }
            Err(err) => {
                tracing::debug!(
                    provider = %target.provider_id,
                    model = %target.model,
                    reason = %err.reason,
                    retryable = err.retryable,
                    "provider attempt failed"
                );
                on_attempt(AttemptOutcome {
                    target,
                    error: Some(&err),
                });
                if !err.retryable {
                    return Err(FallbackFailure::Provider(err));
                }
                last_error = Some(err);
            }
        }
    }

    // Unwrap is safe: the list is non-empty and every attempt failed
    // retryably, so last_error was set on the final iteration.
    Err(FallbackFailure::Provider(last_error.expect("at least one attempt ran")))
}
