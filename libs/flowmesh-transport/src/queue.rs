use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

/// A bounded queue that never blocks the writer: once full, the oldest
/// undelivered item is discarded to make room for the new one (§4.2
/// "drop-oldest backpressure").
pub struct DropOldestQueue<T> {
    inner: Mutex<VecDeque<T>>,
    notify: Notify,
    capacity: usize,
}

impl<T> DropOldestQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self { inner: Mutex::new(VecDeque::with_capacity(capacity)), notify: Notify::new(), capacity }
    }

    /// Never blocks. Returns the dropped item, if any, so the caller can log it.
    pub fn push(&self, item: T) -> Option<T> {
        let mut guard = self.inner.lock().expect("drop-oldest queue poisoned");
        let dropped = if guard.len() >= self.capacity { guard.pop_front() } else { None };
        guard.push_back(item);
        drop(guard);
        self.notify.notify_one();
        dropped
    }

    /// Waits for the next item in source order.
    pub async fn pop(&self) -> T {
        loop {
            {
                let mut guard = self.inner.lock().expect("drop-oldest queue poisoned");
                if let Some(item) = guard.pop_front() {
                    return item;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("drop-oldest queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drops_oldest_when_full() {
        let q: DropOldestQueue<i32> = DropOldestQueue::new(2);
        assert_eq!(q.push(1), None);
        assert_eq!(q.push(2), None);
        assert_eq!(q.push(3), Some(1));
        assert_eq!(q.pop().await, 2);
        assert_eq!(q.pop().await, 3);
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let q = std::sync::Arc::new(DropOldestQueue::<i32>::new(4));
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.pop().await });
        tokio::task::yield_now().await;
        q.push(7);
        assert_eq!(handle.await.unwrap(), 7);
    }
}
