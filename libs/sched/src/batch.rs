//! Partitioning of the argument stream into per-job batches.

use std::num::NonZeroUsize;

/// A contiguous slice of the argument stream assigned to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Zero-based position of this batch in admission order.
    pub index: usize,

    /// Arguments in stream order. Never empty.
    pub args: Vec<String>,
}

/// Lazily splits an argument stream into batches of `size` arguments.
///
/// Every argument lands in exactly one batch, in order; only the final
/// batch may be shorter.
#[derive(Debug)]
pub struct Batches<I> {
    args: I,
    size: NonZeroUsize,
    next_index: usize,
}

impl<I> Batches<I>
where
    I: Iterator<Item = String>,
{
    pub fn new(args: I, size: NonZeroUsize) -> Self {
        Self {
            args,
            size,
            next_index: 0,
        }
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = String>,
{
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let args: Vec<String> = self.args.by_ref().take(self.size.get()).collect();
        if args.is_empty() {
            return None;
        }

        let index = self.next_index;
        self.next_index += 1;
        Some(Batch { index, args })
    }
}
