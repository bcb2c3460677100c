//! Size and count bounded batching of released fragments

use crate::config::{AssemblyConfig, GapPolicy};

/// A unit of assembled output
pub trait Fragment: Sized {
    /// Contribution to the batch size (milliseconds for audio, 0 for records)
    fn size(&self) -> u64;

    /// Separator to insert after this fragment, if the flavor uses one
    fn gap_after(&self, policy: &GapPolicy) -> Option<Self>;
}

/// A flushed group of consecutive items
#[derive(Clone, Debug, PartialEq)]
pub struct Batch<F> {
    /// Sequence number, starting at 0
    pub seq: usize,
    /// Items contributing to the batch
    pub items: usize,
    /// Fragments and gaps in release order
    pub fragments: Vec<F>,
    /// Accumulated size
    pub size: u64,
}

impl<F> Batch<F> {
    fn empty(seq: usize) -> Self {
        Self {
            seq,
            items: 0,
            fragments: Vec::new(),
            size: 0,
        }
    }
}

/// Accumulates released items into batches
///
/// Gaps follow every fragment except the very last fragment of the last
/// item. A batch is handed out as soon as its size exceeds the size
/// threshold or its item count reaches the count threshold.
#[derive(Debug)]
pub struct Assembler<F> {
    total: usize,
    released: usize,
    flush_size_threshold: u64,
    flush_count_threshold: usize,
    gap: GapPolicy,
    current: Batch<F>,
}

impl<F: Fragment> Assembler<F> {
    /// Assembler for a run of `total` items
    pub fn new(config: &AssemblyConfig, total: usize) -> Self {
        Self {
            total,
            released: 0,
            flush_size_threshold: config.flush_size_threshold,
            flush_count_threshold: config.flush_count_threshold.max(1),
            gap: config.gap,
            current: Batch::empty(0),
        }
    }

    /// Append the next released item's fragments; returns a batch when one is full
    pub fn push(&mut self, fragments: Vec<F>) -> Option<Batch<F>> {
        self.released += 1;
        let last_item = self.released == self.total;
        let count = fragments.len();

        for (i, fragment) in fragments.into_iter().enumerate() {
            let gap = if last_item && i + 1 == count {
                None
            } else {
                fragment.gap_after(&self.gap)
            };
            self.append(fragment);
            if let Some(gap) = gap {
                self.append(gap);
            }
        }
        self.current.items += 1;

        if self.current.size > self.flush_size_threshold
            || self.current.items >= self.flush_count_threshold
        {
            Some(self.take())
        } else {
            None
        }
    }

    /// Hand out the partial batch at the end of the run, if it has items
    pub fn finish(&mut self) -> Option<Batch<F>> {
        (self.current.items > 0).then(|| self.take())
    }

    /// Items pushed so far
    pub fn released(&self) -> usize {
        self.released
    }

    fn append(&mut self, fragment: F) {
        self.current.size += fragment.size();
        self.current.fragments.push(fragment);
    }

    fn take(&mut self) -> Batch<F> {
        let next = Batch::empty(self.current.seq + 1);
        std::mem::replace(&mut self.current, next)
    }
}
