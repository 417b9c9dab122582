//! Debounced derivation of one watched value from another.

use std::future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

/// Derive a receiver that follows `map(source)` once `source` has been quiet
/// for `period`.
///
/// The derived receiver starts at `map` of the current source value. Each
/// source change restarts the quiet period; when it elapses the derived value
/// is recomputed from the latest source value and published, even if it is
/// equal to the previous one, so observers can tell that input settled.
///
/// A change still waiting out its quiet period when the source sender is
/// dropped is published before the background task ends. The task also ends
/// once every derived receiver is dropped.
///
/// Must be called from within a Tokio runtime.
pub fn debounced<T, U, F>(mut source: watch::Receiver<T>, period: Duration, map: F) -> watch::Receiver<U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: Fn(&T) -> U + Send + 'static,
{
    let initial = map(&source.borrow_and_update());
    let (sender, derived) = watch::channel(initial);

    tokio::spawn(async move {
        let mut deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                changed = source.changed() => {
                    if changed.is_err() {
                        if let Some(deadline) = deadline {
                            sleep_until(deadline).await;
                            let value = map(&source.borrow());
                            let _ = sender.send(value);
                        }
                        break;
                    }
                    deadline = Some(Instant::now() + period);
                }
                () = settle(deadline) => {
                    deadline = None;
                    let value = map(&source.borrow_and_update());
                    if sender.send(value).is_err() {
                        break;
                    }
                }
                () = sender.closed() => break,
            }
        }
    });

    derived
}

async fn settle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const PERIOD: Duration = Duration::from_millis(500);

    async fn settle_tasks() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn starts_at_mapped_initial_value() {
        let (_tx, rx) = watch::channel(2_u32);
        let derived = debounced(rx, PERIOD, |v| v * 10);
        assert_eq!(*derived.borrow(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_only_after_quiet_period() {
        let (tx, rx) = watch::channel(String::new());
        let derived = debounced(rx, PERIOD, String::len);
        settle_tasks().await;

        tx.send_replace("ab".to_string());
        settle_tasks().await;
        advance(Duration::from_millis(300)).await;
        tx.send_replace("abcd".to_string());
        settle_tasks().await;
        advance(Duration::from_millis(300)).await;
        settle_tasks().await;
        assert_eq!(*derived.borrow(), 0);

        advance(Duration::from_millis(250)).await;
        settle_tasks().await;
        assert_eq!(*derived.borrow(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn republishes_equal_values() {
        let (tx, rx) = watch::channel(1_u32);
        let derived = debounced(rx, PERIOD, |v| *v > 0);
        settle_tasks().await;

        tx.send_replace(2);
        settle_tasks().await;
        advance(PERIOD).await;
        settle_tasks().await;

        assert!(derived.has_changed().unwrap());
        assert!(*derived.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_pending_change_when_source_closes() {
        let (tx, rx) = watch::channel(0_u32);
        let mut derived = debounced(rx, PERIOD, |v| *v);
        settle_tasks().await;

        tx.send_replace(7);
        settle_tasks().await;
        drop(tx);

        derived.changed().await.unwrap();
        assert_eq!(*derived.borrow(), 7);
    }
}
