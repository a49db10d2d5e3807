//! Fan-out/fan-in over independent async operations.
//!
//! Every task is awaited, whether or not its siblings failed, and all
//! failures are reported together.

use std::future::Future;

use futures::future::join_all;

use crate::error::KeelError;

/// Await every future and return each outcome in input order.
pub async fn settle_all<I, F, T, E>(tasks: I) -> Vec<Result<T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    join_all(tasks).await
}

/// Split settled outcomes into successes and failures, keeping order.
pub fn split_settled<T, E>(results: Vec<Result<T, E>>) -> (Vec<T>, Vec<E>) {
    let mut successes = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(err) => failures.push(err),
        }
    }
    (successes, failures)
}

/// All values, or one error listing every failure.
pub fn all_or_aggregate<T>(results: Vec<Result<T, KeelError>>) -> Result<Vec<T>, KeelError> {
    let (successes, failures) = split_settled(results);
    if failures.is_empty() {
        Ok(successes)
    } else {
        Err(KeelError::batch(failures))
    }
}
