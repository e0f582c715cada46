use std::collections::BTreeMap;

/// Releases values in index order regardless of the order they complete in.
pub struct Resequencer<T> {
    buffer: BTreeMap<usize, T>,
    next_expected: usize,
}

impl<T> Resequencer<T> {
    pub fn new(first_index: usize) -> Self {
        Self {
            buffer: BTreeMap::new(),
            next_expected: first_index,
        }
    }

    pub fn push(&mut self, index: usize, value: T) {
        self.buffer.insert(index, value);
    }

    /// The next value in order, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<(usize, T)> {
        let value = self.buffer.remove(&self.next_expected)?;
        let index = self.next_expected;
        self.next_expected += 1;
        Some((index, value))
    }

    pub fn pending_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_expected(&self) -> usize {
        self.next_expected
    }
}
