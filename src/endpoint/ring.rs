//! Fixed-capacity circular history

/// Fixed-capacity FIFO history.
///
/// Once `capacity` items have been pushed, every further push overwrites the
/// oldest retained item. A capacity of zero retains nothing.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Retained items; grows up to `capacity`, then is overwritten in place
    items: Vec<T>,
    /// Maximum number of retained items
    capacity: usize,
    /// Write cursor (index of the oldest item once the buffer is full)
    next: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` items
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    /// Append an item, evicting the oldest one when full
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }

        if self.items.len() < self.capacity {
            self.items.push(item);
        } else {
            self.items[self.next] = item;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// Iterate over retained items, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        // Before the first wrap `next == len`, so `newer` holds everything.
        let (newer, older) = self.items.split_at(self.next.min(self.items.len()));
        older.iter().chain(newer.iter())
    }

    /// Retained items, oldest first
    #[must_use]
    pub fn get(&self) -> Vec<&T> {
        self.iter().collect()
    }

    /// Most recently pushed item
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        if self.items.is_empty() {
            return None;
        }
        let index = (self.next + self.capacity - 1) % self.capacity;
        self.items.get(index)
    }

    /// Number of retained items, `min(pushes, capacity)`
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing has been retained yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the buffer has reached its capacity
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Maximum number of retained items
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
