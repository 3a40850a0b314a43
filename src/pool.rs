//! Bounded parallel driver.
//!
//! Images are independent, so the batch API fans out across a fixed pool
//! of OS threads: one bounded channel feeds work in, one carries results
//! back. Bounded channels are the backpressure mechanism: a lazy input
//! iterator is pulled at most a small buffer ahead of the slowest worker,
//! so a directory walk feeding a million paths never materializes them
//! all.
//!
//! Delivery contract (documented and tested): the `consume` callback runs
//! on the calling thread in **completion order**; the returned collection
//! is always in **input order**. Cancellation is cooperative and lives in
//! the job closure, not here: the engine's jobs check a [`CancelFlag`]
//! before starting real work, so already-started images finish and the
//! rest drain through as cancelled results.

use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Extra items pulled ahead of the workers.
const FEED_AHEAD: usize = 2;

/// Shared cooperative cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    /// Flip the flag. Work that already started is allowed to finish.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The pool width to use when the user did not pick one.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Apply `job` to every input on up to `threads` worker threads.
///
/// `consume` is invoked on the calling thread, once per input, in
/// completion order; its return values come back in input order.
pub fn run_with<T, R, O, I, F, C>(threads: usize, inputs: I, job: F, mut consume: C) -> Vec<O>
where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send,
    T: Send,
    R: Send,
    F: Fn(&T) -> R + Sync,
    C: FnMut(T, R) -> O,
{
    let threads = threads.max(1);
    let inputs = inputs.into_iter();
    let (task_tx, task_rx) = bounded::<(usize, T)>(threads + FEED_AHEAD);
    let (result_tx, result_rx) = bounded::<(usize, T, R)>(threads + FEED_AHEAD);

    let mut out: Vec<(usize, O)> = Vec::new();
    std::thread::scope(|scope| {
        let job = &job;

        scope.spawn(move || {
            for task in inputs.enumerate() {
                // Send fails only when all workers are gone; nothing left
                // to feed in that case.
                if task_tx.send(task).is_err() {
                    break;
                }
            }
        });

        for _ in 0..threads {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                while let Ok((index, input)) = task_rx.recv() {
                    let result = job(&input);
                    if result_tx.send((index, input, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(task_rx);
        drop(result_tx);

        while let Ok((index, input, result)) = result_rx.recv() {
            out.push((index, consume(input, result)));
        }
    });

    out.sort_by_key(|(index, _)| *index);
    out.into_iter().map(|(_, output)| output).collect()
}

/// [`run_with`] without a callback: input-order `(input, result)` pairs.
pub fn run<T, R, I, F>(threads: usize, inputs: I, job: F) -> Vec<(T, R)>
where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send,
    T: Send,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    run_with(threads, inputs, job, |input, result| (input, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn results_come_back_in_input_order() {
        // Reverse sleep times so completion order inverts input order.
        let inputs: Vec<u64> = (0..8).collect();
        let pairs = run(4, inputs, |&n| {
            std::thread::sleep(Duration::from_millis(40 - n * 5));
            n * 10
        });
        let expected: Vec<(u64, u64)> = (0..8).map(|n| (n, n * 10)).collect();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn callback_runs_once_per_input_and_returns_in_input_order() {
        let seen = Mutex::new(Vec::new());
        let outputs = run_with(
            2,
            vec!["a", "b", "c"],
            |s| s.len(),
            |input, len| {
                seen.lock().unwrap().push(input);
                format!("{input}:{len}")
            },
        );
        assert_eq!(outputs, ["a:1", "b:1", "c:1"]);
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, ["a", "b", "c"]);
    }

    #[test]
    fn callback_sees_completion_order() {
        // One slow head item: with two threads, later items complete first.
        let order = Mutex::new(Vec::new());
        run_with(
            2,
            vec![50u64, 0, 0, 0],
            |&ms| std::thread::sleep(Duration::from_millis(ms)),
            |input, ()| order.lock().unwrap().push(input),
        );
        let order = order.lock().unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(*order.last().unwrap(), 50, "slow item must finish last");
    }

    #[test]
    fn lazy_inputs_are_pulled_with_bounded_lookahead() {
        let pulled = AtomicUsize::new(0);
        let done = AtomicUsize::new(0);
        let high_water = AtomicUsize::new(0);

        let threads = 2;
        let inputs = (0..100).map(|n| {
            pulled.fetch_add(1, Ordering::SeqCst);
            n
        });
        // Iterator::map over a Range is Send; track the largest gap
        // between items pulled and items finished.
        run(threads, inputs, |_| {
            std::thread::sleep(Duration::from_millis(1));
            let ahead =
                pulled.load(Ordering::SeqCst) - done.fetch_add(1, Ordering::SeqCst);
            high_water.fetch_max(ahead, Ordering::SeqCst);
        });

        // Feeder buffer + in-flight items + result buffer, with slack for
        // scheduling noise. The point is "a handful", not "all 100".
        let bound = 2 * (threads + FEED_AHEAD) + threads + 2;
        assert!(
            high_water.load(Ordering::SeqCst) <= bound,
            "lookahead {} exceeded bound {}",
            high_water.load(Ordering::SeqCst),
            bound
        );
    }

    #[test]
    fn zero_threads_still_works() {
        let pairs = run(0, vec![1, 2], |&n| n + 1);
        assert_eq!(pairs, vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn empty_input_is_fine() {
        let pairs: Vec<(i32, i32)> = run(4, Vec::new(), |&n| n);
        assert!(pairs.is_empty());
    }

    #[test]
    fn cancel_flag_round_trips() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
