//! Bounded waiting for released resources

use parking_lot::{Condvar, Mutex};
use std::time::Instant;
use tokio::sync::Notify;

/// Parking spot for callers waiting on an exhausted pool.
///
/// Blocking callers park on the condvar, async callers on the `Notify`.
/// Every state change that could satisfy a waiter goes through
/// [`wake_one`](Self::wake_one) after it has been published.
pub(crate) struct WaitQueue {
    lock: Mutex<()>,
    condvar: Condvar,
    notify: Notify,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            condvar: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Wake one blocking and one async waiter, if any.
    pub fn wake_one(&self) {
        // Taking the lock orders this wake after any in-progress check in
        // `wait_until`, so a waiter cannot miss it between check and park.
        drop(self.lock.lock());
        self.condvar.notify_one();
        self.notify.notify_one();
    }

    /// Repeatedly run `attempt` until it yields a value or `deadline` passes.
    ///
    /// `attempt` runs with the wait lock held and must not block.
    pub fn wait_until<R>(
        &self,
        deadline: Instant,
        mut attempt: impl FnMut() -> Option<R>,
    ) -> Option<R> {
        let mut guard = self.lock.lock();
        loop {
            if let Some(found) = attempt() {
                return Some(found);
            }
            if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                return attempt();
            }
        }
    }

    /// Async form of [`wait_until`](Self::wait_until).
    ///
    /// The notification is registered before each attempt so a wake between
    /// the attempt and the await is kept.
    pub async fn wait_until_async<R>(
        &self,
        deadline: tokio::time::Instant,
        mut attempt: impl FnMut() -> Option<R>,
    ) -> Option<R> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(found) = attempt() {
                return Some(found);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return attempt();
            }
        }
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_times_out() {
        let queue = WaitQueue::new();
        let start = Instant::now();
        let result: Option<()> = queue.wait_until(start + Duration::from_millis(50), || None);

        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wake_releases_waiter() {
        let queue = Arc::new(WaitQueue::new());
        let ready = Arc::new(AtomicBool::new(false));

        let waker = {
            let queue = Arc::clone(&queue);
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ready.store(true, Ordering::SeqCst);
                queue.wake_one();
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        let result = queue.wait_until(deadline, || ready.load(Ordering::SeqCst).then_some(()));
        waker.join().unwrap();

        assert!(result.is_some());
    }

    #[tokio::test]
    async fn test_async_wait_times_out() {
        let queue = WaitQueue::new();
        let start = tokio::time::Instant::now();
        let result: Option<()> = queue
            .wait_until_async(start + Duration::from_millis(30), || None)
            .await;

        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_async_wake_before_await_is_kept() {
        let queue = WaitQueue::new();
        let mut attempts = 0;

        // The first attempt fails and wakes itself, as a concurrent release would
        let result = queue
            .wait_until_async(tokio::time::Instant::now() + Duration::from_secs(5), || {
                attempts += 1;
                if attempts == 1 {
                    queue.wake_one();
                    None
                } else {
                    Some(attempts)
                }
            })
            .await;

        assert_eq!(result, Some(2));
    }
}
