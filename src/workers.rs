//! Bounded fan-out/fan-in over a slice of work items.
//!
//! Used for per-document extraction and per-page OCR. Results come back in
//! input order regardless of which worker finished first.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use crate::cancel::CancelToken;

/// Run `work` over `items` on at most `workers` scoped threads.
///
/// Slot `i` of the returned vector holds the result for `items[i]`, or `None`
/// when the item was never started because `cancel` was raised. Items already
/// in flight when cancellation happens still complete; callers decide whether
/// to discard them.
pub fn run_ordered<T, R, F>(
    items: &[T],
    workers: usize,
    cancel: &CancelToken,
    work: F,
) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }

    let workers = workers.clamp(1, items.len());
    let cursor = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, R)>();

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let cursor = &cursor;
            let work = &work;
            scope.spawn(move || loop {
                if cancel.is_cancelled() {
                    break;
                }
                let index = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(item) = items.get(index) else {
                    break;
                };
                if tx.send((index, work(index, item))).is_err() {
                    break;
                }
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<R>> = items.iter().map(|_| None).collect();
    for (index, result) in rx {
        slots[index] = Some(result);
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn preserves_input_order_not_completion_order() {
        let items = vec![30u64, 1, 10, 0];
        let results = run_ordered(&items, 4, &CancelToken::new(), |_, delay| {
            thread::sleep(Duration::from_millis(*delay));
            *delay * 2
        });
        assert_eq!(results, vec![Some(60), Some(2), Some(20), Some(0)]);
    }

    #[test]
    fn empty_input_returns_empty() {
        let items: Vec<u32> = vec![];
        let results = run_ordered(&items, 3, &CancelToken::new(), |_, x| *x);
        assert!(results.is_empty());
    }

    #[test]
    fn zero_workers_still_makes_progress() {
        let items = vec![1, 2, 3];
        let results = run_ordered(&items, 0, &CancelToken::new(), |_, x| x + 1);
        assert_eq!(results, vec![Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn cancelled_before_start_runs_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let items = vec![1, 2, 3];
        let results = run_ordered(&items, 2, &cancel, |_, x| *x);
        assert!(results.iter().all(Option::is_none));
    }

    #[test]
    fn cancellation_mid_run_stops_picking_new_items() {
        let cancel = CancelToken::new();
        let items: Vec<usize> = (0..20).collect();
        let results = run_ordered(&items, 1, &cancel, |index, _| {
            if index == 2 {
                cancel.cancel();
            }
            index
        });
        assert_eq!(results[0], Some(0));
        assert_eq!(results[2], Some(2));
        assert!(results[3..].iter().all(Option::is_none));
    }

    #[test]
    fn index_passed_to_work_matches_slot() {
        let items = vec!["a", "b", "c"];
        let results = run_ordered(&items, 2, &CancelToken::new(), |index, s| format!("{index}{s}"));
        assert_eq!(
            results,
            vec![Some("0a".to_string()), Some("1b".to_string()), Some("2c".to_string())]
        );
    }
}
