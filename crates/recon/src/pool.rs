use std::thread;

use crossbeam_channel::{bounded, unbounded};
use tracing::warn;

use paxlane_store::StoreError;

/// Outcome of one phase fan-out.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseStats {
    /// Records whose intents were applied.
    pub processed: usize,
    /// Records skipped after a row-level store error.
    pub skipped: usize,
}

/// Fan per-record tasks across a bounded worker pool and drain completely
/// before returning.
///
/// Workers run `work` and emit each record's mutation intents as one
/// message; the calling thread is the single consumer and owns whatever
/// batch accumulator `apply` writes into. The intent channel is the only
/// path to shared state, so workers never contend on the batch.
///
/// A row-level store error drops that record's intents on the floor
/// (markers stay as they were), logs it and moves on. A fatal store error
/// aborts the phase once the pool has drained.
pub fn run_phase<T, M, W, A>(
    phase: &'static str,
    items: Vec<T>,
    workers: usize,
    work: W,
    mut apply: A,
) -> Result<PhaseStats, StoreError>
where
    T: Send,
    M: Send,
    W: Fn(T) -> Result<Vec<M>, StoreError> + Sync,
    A: FnMut(Vec<M>) -> Result<(), StoreError>,
{
    let workers = workers.max(1);
    let mut stats = PhaseStats::default();
    let mut fatal: Option<StoreError> = None;

    thread::scope(|s| {
        let (task_tx, task_rx) = bounded::<T>(workers * 2);
        let (done_tx, done_rx) = unbounded::<Result<Vec<M>, StoreError>>();

        for _ in 0..workers {
            let task_rx = task_rx.clone();
            let done_tx = done_tx.clone();
            let work = &work;
            s.spawn(move || {
                for item in task_rx.iter() {
                    if done_tx.send(work(item)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(task_rx);
        drop(done_tx);

        s.spawn(move || {
            for item in items {
                if task_tx.send(item).is_err() {
                    break;
                }
            }
        });

        for outcome in done_rx.iter() {
            match outcome {
                Ok(intents) => {
                    if fatal.is_some() {
                        continue;
                    }
                    match apply(intents) {
                        Ok(()) => stats.processed += 1,
                        Err(e) => fatal = Some(e),
                    }
                }
                Err(e) if e.is_fatal() => {
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(e) => {
                    stats.skipped += 1;
                    warn!(phase, error = %e, "record skipped");
                }
            }
        }
    });

    match fatal {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn all_items_reach_the_consumer() {
        let seen = AtomicUsize::new(0);
        let mut total = 0u64;
        let stats = run_phase(
            "test",
            (1..=100u64).collect(),
            8,
            |n| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(vec![n])
            },
            |intents| {
                total += intents.iter().sum::<u64>();
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(stats.processed, 100);
        assert_eq!(stats.skipped, 0);
        assert_eq!(seen.load(Ordering::SeqCst), 100);
        assert_eq!(total, 5050);
    }

    #[test]
    fn row_level_errors_skip_only_that_record() {
        let stats = run_phase(
            "test",
            (0..10u64).collect(),
            4,
            |n| {
                if n % 3 == 0 {
                    Err(StoreError::MissingRow(format!("row {n}")))
                } else {
                    Ok(vec![n])
                }
            },
            |_| Ok(()),
        )
        .unwrap();
        assert_eq!(stats.processed, 6);
        assert_eq!(stats.skipped, 4);
    }

    #[test]
    fn fatal_errors_abort_the_phase() {
        let result = run_phase(
            "test",
            (0..10u64).collect(),
            4,
            |n| {
                if n == 5 {
                    Err(StoreError::Unavailable("gone".into()))
                } else {
                    Ok(vec![n])
                }
            },
            |_| Ok(()),
        );
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
