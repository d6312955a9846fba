// Time Window Container - rolling (timestamp, item) buffer
// Age-based pruning plus a hard capacity cap

use std::collections::VecDeque;

/// Rolling time window keyed by millisecond timestamps.
///
/// Items are expected in roughly ascending time order; pruning walks from the
/// front and stops at the first item still inside the window.
#[derive(Debug, Clone)]
pub struct TimeWindow<T> {
    duration_ms: i64,
    max_capacity: usize,
    data: VecDeque<(i64, T)>,
}

impl<T> TimeWindow<T> {
    pub fn new(duration_ms: i64, max_capacity: usize) -> Self {
        Self {
            duration_ms,
            max_capacity: max_capacity.max(1),
            data: VecDeque::with_capacity(max_capacity.min(10_000)),
        }
    }

    /// Append an item, then drop whatever fell out of the window relative to it
    pub fn push(&mut self, timestamp: i64, item: T) {
        self.push_evicting(timestamp, item, |_| {});
    }

    /// `push` that hands every dropped item to `on_evict`
    pub fn push_evicting(&mut self, timestamp: i64, item: T, mut on_evict: impl FnMut(T)) {
        if self.data.len() >= self.max_capacity {
            if let Some((_, old)) = self.data.pop_front() {
                on_evict(old);
            }
        }
        self.data.push_back((timestamp, item));
        self.prune_evicting(timestamp, on_evict);
    }

    /// Remove items strictly older than `now - duration_ms`
    pub fn prune(&mut self, now: i64) {
        self.prune_evicting(now, |_| {});
    }

    pub fn prune_evicting(&mut self, now: i64, mut on_evict: impl FnMut(T)) {
        let cutoff = now - self.duration_ms;
        while matches!(self.data.front(), Some((ts, _)) if *ts < cutoff) {
            if let Some((_, old)) = self.data.pop_front() {
                on_evict(old);
            }
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.data.iter().map(|(_, item)| item)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(i64, T)> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    pub fn last(&self) -> Option<&(i64, T)> {
        self.data.back()
    }

    pub fn first(&self) -> Option<&(i64, T)> {
        self.data.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_prunes_relative_to_newest() {
        let mut window: TimeWindow<i32> = TimeWindow::new(100, 100);

        window.push(0, 1);
        window.push(50, 2);
        window.push(100, 3);
        window.push(150, 4);
        window.push(200, 5);

        // cutoff 100 keeps the boundary item
        assert_eq!(window.len(), 3);
        assert_eq!(window.first().map(|(ts, _)| *ts), Some(100));
        assert_eq!(window.last().map(|(_, v)| *v), Some(5));
    }

    #[test]
    fn test_capacity() {
        let mut window: TimeWindow<i32> = TimeWindow::new(10_000, 3);

        for (ts, v) in [(100, 1), (200, 2), (300, 3), (400, 4)] {
            window.push(ts, v);
        }

        assert_eq!(window.len(), 3);
        assert_eq!(window.first().map(|(ts, _)| *ts), Some(200));
    }

    #[test]
    fn test_explicit_prune_and_values() {
        let mut window: TimeWindow<i32> = TimeWindow::new(1_000, 100);
        window.push(100, 1);
        window.push(200, 2);
        window.push(300, 3);

        assert_eq!(window.values().sum::<i32>(), 6);

        window.prune(1_250);
        assert_eq!(window.values().copied().collect::<Vec<_>>(), vec![3]);

        window.clear();
        assert!(window.is_empty());
    }

    #[test]
    fn test_evicted_items_are_handed_back() {
        let mut window: TimeWindow<i32> = TimeWindow::new(1_000, 2);
        let mut evicted = Vec::new();
        window.push_evicting(100, 1, |v| evicted.push(v));
        window.push_evicting(200, 2, |v| evicted.push(v));
        window.push_evicting(300, 3, |v| evicted.push(v));
        assert_eq!(evicted, vec![1]);

        window.prune_evicting(1_250, |v| evicted.push(v));
        assert_eq!(evicted, vec![1, 2]);
        assert_eq!(window.len(), 1);
    }
}
