//! Counting semaphore with FIFO wakeup and explicit teardown.
//!
//! Used to bound decryption fan-out and share-propagation concurrency,
//! and (with `max = 1`) for per-resource mutual exclusion. Unlike
//! `tokio::sync::Semaphore` this one supports runtime capacity changes
//! (`set_max`) and `purge()`, which rejects every queued waiter during
//! session teardown.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::CvaultError;

pub struct Semaphore {
    state: Mutex<State>,
}

struct State {
    /// Granted-but-unreleased acquisitions. Invariant: `count <= max`
    /// whenever the lock is not held.
    count: usize,
    max: usize,
    waiting: VecDeque<oneshot::Sender<()>>,
}

impl Semaphore {
    pub fn new(max: usize) -> Self {
        Semaphore {
            state: Mutex::new(State {
                count: 0,
                max: max.max(1),
                waiting: VecDeque::new(),
            }),
        }
    }

    /// Acquire a slot, waiting in FIFO order if the semaphore is full.
    ///
    /// Returns `CvaultError::Purged` if `purge()` rejects this waiter
    /// before a slot is granted. The caller must pair every successful
    /// acquisition with exactly one `release()`.
    pub async fn acquire(&self) -> Result<(), CvaultError> {
        let rx = {
            let mut s = self.state.lock().expect("semaphore lock poisoned");
            if s.count < s.max {
                s.count += 1;
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            s.waiting.push_back(tx);
            rx
        };

        // The granting side increments `count` before sending, so a
        // successful recv means the slot is already ours.
        rx.await.map_err(|_| CvaultError::Purged)
    }

    /// Release a previously acquired slot and grant waiters if capacity
    /// allows.
    pub fn release(&self) {
        let mut s = self.state.lock().expect("semaphore lock poisoned");
        s.count = s.count.saturating_sub(1);
        grant_waiters(&mut s);
    }

    /// Number of currently granted (unreleased) acquisitions.
    pub fn count(&self) -> usize {
        self.state.lock().expect("semaphore lock poisoned").count
    }

    /// Change capacity. Current holders are never evicted; queued
    /// waiters are granted immediately if the new capacity allows.
    pub fn set_max(&self, new_max: usize) {
        let mut s = self.state.lock().expect("semaphore lock poisoned");
        s.max = new_max.max(1);
        grant_waiters(&mut s);
    }

    /// Reject every queued waiter and reset the counter. Returns how
    /// many waiters were purged. Only used for teardown (logout); any
    /// in-flight holders keep running but their `release()` becomes a
    /// no-op against the reset counter.
    pub fn purge(&self) -> usize {
        let mut s = self.state.lock().expect("semaphore lock poisoned");
        let purged = s.waiting.len();
        // Dropping the senders wakes every waiter with an error.
        s.waiting.clear();
        s.count = 0;
        purged
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.state.lock().unwrap().waiting.len()
    }
}

fn grant_waiters(s: &mut State) {
    while s.count < s.max {
        match s.waiting.pop_front() {
            Some(tx) => {
                s.count += 1;
                if tx.send(()).is_err() {
                    // Waiter future was dropped; reclaim the slot.
                    s.count -= 1;
                }
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn acquire_under_capacity_is_immediate() {
        let sem = Semaphore::new(2);
        sem.acquire().await.unwrap();
        sem.acquire().await.unwrap();
        assert_eq!(sem.count(), 2);
        sem.release();
        assert_eq!(sem.count(), 1);
    }

    #[tokio::test]
    async fn waiters_are_granted_fifo() {
        let sem = Arc::new(Semaphore::new(1));
        sem.acquire().await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for id in ["a", "b", "c"] {
            let task_sem = sem.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                task_sem.acquire().await.unwrap();
                tx.send(id).unwrap();
            });
            // Wait until this waiter is actually queued so the FIFO
            // order is deterministic.
            while sem.waiter_count() < expected_waiters(id) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }

        sem.release();
        assert_eq!(rx.recv().await.unwrap(), "a");
        sem.release();
        assert_eq!(rx.recv().await.unwrap(), "b");
        sem.release();
        assert_eq!(rx.recv().await.unwrap(), "c");
    }

    fn expected_waiters(id: &str) -> usize {
        match id {
            "a" => 1,
            "b" => 2,
            _ => 3,
        }
    }

    #[tokio::test]
    async fn concurrent_holders_never_exceed_max() {
        const MAX: usize = 4;
        const TASKS: usize = 64;

        let sem = Arc::new(Semaphore::new(MAX));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let sem = sem.clone();
            let current = current.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                sem.acquire().await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                current.fetch_sub(1, Ordering::SeqCst);
                sem.release();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= MAX);
        assert_eq!(sem.count(), 0);
    }

    #[tokio::test]
    async fn purge_rejects_queued_waiters() {
        let sem = Arc::new(Semaphore::new(1));
        sem.acquire().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let sem = sem.clone();
            handles.push(tokio::spawn(async move { sem.acquire().await }));
        }
        while sem.waiter_count() < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(sem.purge(), 3);
        for h in handles {
            let res = h.await.unwrap();
            assert!(matches!(res, Err(CvaultError::Purged)));
        }

        // Counter is reset; fresh acquisitions succeed.
        assert_eq!(sem.count(), 0);
        sem.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn set_max_grants_queued_waiters() {
        let sem = Arc::new(Semaphore::new(1));
        sem.acquire().await.unwrap();

        let waiter = {
            let sem = sem.clone();
            tokio::spawn(async move { sem.acquire().await })
        };
        while sem.waiter_count() < 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        sem.set_max(2);
        waiter.await.unwrap().unwrap();
        assert_eq!(sem.count(), 2);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(16))]

        /// For any capacity and task count, the number of concurrently
        /// granted acquisitions never exceeds the capacity.
        #[test]
        fn prop_counter_bounded(max in 1usize..6, tasks in 1usize..48) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async move {
                let sem = Arc::new(Semaphore::new(max));
                let current = Arc::new(AtomicUsize::new(0));
                let peak = Arc::new(AtomicUsize::new(0));

                let mut handles = Vec::new();
                for _ in 0..tasks {
                    let sem = sem.clone();
                    let current = current.clone();
                    let peak = peak.clone();
                    handles.push(tokio::spawn(async move {
                        sem.acquire().await.unwrap();
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        sem.release();
                    }));
                }
                for h in handles {
                    h.await.unwrap();
                }

                assert!(peak.load(Ordering::SeqCst) <= max);
            });
        }
    }
}
