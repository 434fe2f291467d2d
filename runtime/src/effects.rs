//! Effect execution.
//!
//! Reducers and services describe post-commit work as [`Effect`] values.
//! The functions here run those descriptions and collect the actions they
//! produce, so the caller can inspect outcomes (for example which tasks were
//! enqueued) or simply drop them.
//!
//! Effects are only ever executed after the transaction that produced them
//! has committed. A retried transaction discards the effects of its failed
//! attempts.

use crate::metrics::EffectMetrics;
use conference_core::effect::Effect;
use futures::future::join_all;
use std::future::Future;
use std::pin::Pin;

/// Execute a single effect, returning the action it produced, if any.
pub fn execute<A>(effect: Effect<A>) -> Pin<Box<dyn Future<Output = Vec<A>> + Send>>
where
    A: Send + 'static,
{
    Box::pin(async move {
        match effect {
            Effect::None => {
                EffectMetrics::record_execution("none");
                Vec::new()
            },
            Effect::Future(fut) => {
                EffectMetrics::record_execution("future");
                tracing::trace!("Executing Effect::Future");
                fut.await.into_iter().collect()
            },
        }
    })
}

/// Execute a batch of effects concurrently.
///
/// Actions are returned in declaration order.
pub async fn execute_all<A, I>(effects: I) -> Vec<A>
where
    A: Send + 'static,
    I: IntoIterator<Item = Effect<A>>,
{
    join_all(effects.into_iter().map(execute))
        .await
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn batch_keeps_declaration_order() {
        let actions = execute_all(vec![
            Effect::future(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Some("slow")
            }),
            Effect::None,
            Effect::future(async { None }),
            Effect::future(async { Some("fast") }),
        ])
        .await;

        assert_eq!(actions, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn none_produces_nothing() {
        assert!(execute(Effect::<u8>::None).await.is_empty());
    }
}
