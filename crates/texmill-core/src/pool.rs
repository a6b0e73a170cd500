use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runs `f` over `items` with at most `limit` futures in flight.
///
/// Results come back in the order of `items`. Items whose task panicked are
/// dropped from the output, so callers that need a 1:1 mapping should return
/// a fallible type instead of panicking.
pub async fn run_bounded<T, R, F, Fut>(limit: usize, items: Vec<T>, f: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let f = Arc::new(f);
    let len = items.len();
    let mut set = JoinSet::new();

    for (idx, item) in items.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let f = f.clone();
        set.spawn(async move {
            // The semaphore is never closed, so acquiring only fails on shutdown.
            let _permit = semaphore.acquire_owned().await.ok();
            (idx, f(item).await)
        });
    }

    let mut slots: Vec<Option<R>> = (0..len).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, value)) => slots[idx] = Some(value),
            Err(e) => log::warn!("pooled task failed: {}", e),
        }
    }
    slots.into_iter().flatten().collect()
}
