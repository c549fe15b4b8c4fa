use std::collections::VecDeque;

use crate::entities::ActivityItem;

pub const DEFAULT_CAPACITY: usize = 15;

/// Bounded, newest-first list of activity items.
///
/// Position reflects insertion order only; `occurred_at` is never consulted.
#[derive(Debug, Clone)]
pub struct ActivityFeed {
    items: VecDeque<ActivityItem>,
    capacity: usize,
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivityFeed {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Keeps the first `capacity` items of `seed`, in the given order.
    pub fn seeded(seed: Vec<ActivityItem>, capacity: usize) -> Self {
        let mut feed = Self::new(capacity);
        feed.items.extend(seed.into_iter().take(feed.capacity));
        feed
    }

    /// Prepends `item` and returns the item evicted from the tail, if any.
    pub fn push_front(&mut self, item: ActivityItem) -> Option<ActivityItem> {
        self.items.push_front(item);
        if self.items.len() > self.capacity {
            self.items.pop_back()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityItem> {
        self.items.iter()
    }

    pub fn snapshot(&self) -> Vec<ActivityItem> {
        self.items.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
