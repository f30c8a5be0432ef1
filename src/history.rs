//! history.rs — bounded in-memory log of emitted records. This is the
//! read side of the narrow seam: external collaborators pull recent
//! emissions from here (or receive them via a publisher) and own any
//! durable storage themselves.

use std::sync::Mutex;

#[derive(Debug)]
pub struct EmissionLog<T: Clone> {
    inner: Mutex<Vec<T>>,
    cap: usize,
}

impl<T: Clone> EmissionLog<T> {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::with_capacity(cap.min(10_000))),
            cap: cap.min(10_000).max(1),
        }
    }

    pub fn push(&self, item: T) {
        let mut v = self.inner.lock().expect("emission log mutex poisoned");
        v.push(item);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<T> {
        let v = self.inner.lock().expect("emission log mutex poisoned");
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("emission log mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_entries_fall_out_at_capacity() {
        let log = EmissionLog::with_capacity(3);
        for i in 0..5 {
            log.push(i);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.snapshot_last_n(10), vec![2, 3, 4]);
    }

    #[test]
    fn last_n_takes_the_tail() {
        let log = EmissionLog::with_capacity(10);
        for i in 0..6 {
            log.push(i);
        }
        assert_eq!(log.snapshot_last_n(2), vec![4, 5]);
    }
}
