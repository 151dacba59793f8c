//! Fixed-capacity rolling history indexed by age
//!
//! Age 0 is the most recent entry. Pushing a new entry evicts the oldest one,
//! so the buffer always holds exactly `N` snapshots.

/// Circular buffer of `N` snapshots, addressed by age.
#[derive(Debug, Clone)]
pub struct History<T, const N: usize> {
    slots: [T; N],
    head: usize,
}

impl<T: Clone, const N: usize> History<T, N> {
    /// Create a history where every age holds a copy of `value`.
    pub fn filled(value: T) -> Self {
        assert!(N > 0, "history capacity must be non-zero");
        History {
            slots: std::array::from_fn(|_| value.clone()),
            head: 0,
        }
    }
}

impl<T, const N: usize> History<T, N> {
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    fn slot(&self, age: usize) -> usize {
        assert!(age < N, "age {} out of range for history of depth {}", age, N);
        (self.head + age) % N
    }

    /// Snapshot of the given age (0 = most recent).
    pub fn get(&self, age: usize) -> &T {
        &self.slots[self.slot(age)]
    }

    pub fn get_mut(&mut self, age: usize) -> &mut T {
        let idx = self.slot(age);
        &mut self.slots[idx]
    }

    /// Rotate every entry one age older and hand back the former oldest slot
    /// as the new age-0 entry, to be overwritten in place.
    pub fn advance(&mut self) -> &mut T {
        self.head = (self.head + N - 1) % N;
        &mut self.slots[self.head]
    }

    /// Push a new age-0 entry and return the evicted oldest one.
    pub fn push(&mut self, value: T) -> T {
        std::mem::replace(self.advance(), value)
    }

    /// Iterate from age 0 to age `N - 1`.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..N).map(move |age| self.get(age))
    }
}
