//! Lazy pipeline-of-transforms over a sequence of items
//!
//! A `Pipeline` is a boxed, `Send` iterator with composable stages:
//! shuffle -> map / par_map -> batch -> prefetch. Nothing runs until the
//! pipeline is iterated, and every stage pulls from the one before it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

type BoxedIter<T> = Box<dyn Iterator<Item = T> + Send>;

/// Prefetch buffer sizing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prefetch {
    /// Size the buffer from the machine's available parallelism
    #[default]
    Auto,
    /// Fixed number of prefetched items
    Buffer(usize),
    /// Run stages inline on the consumer thread
    Off,
}

impl Prefetch {
    /// Concrete buffer size, `None` when prefetching is disabled
    pub fn resolve(self) -> Option<usize> {
        match self {
            Prefetch::Auto => Some(
                thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(2),
            ),
            Prefetch::Buffer(0) | Prefetch::Off => None,
            Prefetch::Buffer(n) => Some(n),
        }
    }
}

/// Lazy, composable sequence of items
pub struct Pipeline<T> {
    inner: BoxedIter<T>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Wrap any sendable iterator
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self {
            inner: Box::new(items.into_iter()),
        }
    }

    /// Endless stream that rebuilds the pipeline from `factory` each time
    /// the previous one is exhausted.
    ///
    /// `factory` must not keep returning empty pipelines, or iteration
    /// never yields.
    pub fn repeat_with<F>(factory: F) -> Self
    where
        F: FnMut() -> Pipeline<T> + Send + 'static,
    {
        Self::new(std::iter::repeat_with(factory).flatten())
    }

    /// Buffered shuffle: keeps `buffer_size` items and yields a random one,
    /// refilling from upstream. A buffer as large as the sequence gives a
    /// full uniform shuffle.
    pub fn shuffle(self, buffer_size: usize, seed: u64) -> Self {
        Self {
            inner: Box::new(ShuffleBuffer {
                source: self.inner,
                buffer: Vec::with_capacity(buffer_size.max(1)),
                capacity: buffer_size.max(1),
                rng: StdRng::seed_from_u64(seed),
            }),
        }
    }

    /// Apply `f` to each item on the consumer thread
    pub fn map<U, F>(self, f: F) -> Pipeline<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        Pipeline {
            inner: Box::new(self.inner.map(f)),
        }
    }

    /// Apply `f` to chunks of `chunk_size` items in parallel, preserving order
    pub fn par_map<U, F>(self, chunk_size: usize, f: F) -> Pipeline<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Pipeline {
            inner: Box::new(ParMap {
                source: self.inner,
                f,
                chunk_size: chunk_size.max(1),
                ready: VecDeque::new(),
            }),
        }
    }

    /// Group items into vectors of `batch_size`; the last batch may be short
    pub fn batch(self, batch_size: usize) -> Pipeline<Vec<T>> {
        Pipeline {
            inner: Box::new(Batched {
                source: self.inner,
                batch_size: batch_size.max(1),
            }),
        }
    }

    /// Run upstream stages on a background thread, keeping up to the
    /// resolved buffer size of items ready. A panic on that thread is
    /// re-raised on the consumer once the buffered items are drained.
    pub fn prefetch(self, prefetch: Prefetch) -> Self {
        let Some(buffer) = prefetch.resolve() else {
            return self;
        };

        let (tx, rx) = mpsc::sync_channel(buffer);
        let source = self.inner;
        let worker = thread::spawn(move || {
            for item in source {
                // Receiver dropped: the consumer stopped iterating
                if tx.send(item).is_err() {
                    break;
                }
            }
        });

        Self {
            inner: Box::new(Prefetched {
                rx,
                worker: Some(worker),
            }),
        }
    }
}

impl<T> Iterator for Pipeline<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next()
    }
}

struct ShuffleBuffer<T> {
    source: BoxedIter<T>,
    buffer: Vec<T>,
    capacity: usize,
    rng: StdRng,
}

impl<T> Iterator for ShuffleBuffer<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while self.buffer.len() < self.capacity {
            match self.source.next() {
                Some(item) => self.buffer.push(item),
                None => break,
            }
        }

        if self.buffer.is_empty() {
            return None;
        }

        let index = self.rng.gen_range(0..self.buffer.len());
        Some(self.buffer.swap_remove(index))
    }
}

struct ParMap<T, U, F> {
    source: BoxedIter<T>,
    f: F,
    chunk_size: usize,
    ready: VecDeque<U>,
}

impl<T, U, F> Iterator for ParMap<T, U, F>
where
    T: Send,
    U: Send,
    F: Fn(T) -> U + Send + Sync,
{
    type Item = U;

    fn next(&mut self) -> Option<U> {
        if self.ready.is_empty() {
            let chunk: Vec<T> = self.source.by_ref().take(self.chunk_size).collect();
            if chunk.is_empty() {
                return None;
            }

            let f = &self.f;

            #[cfg(feature = "parallel")]
            {
                use rayon::prelude::*;
                let mapped: Vec<U> = chunk.into_par_iter().map(f).collect();
                self.ready.extend(mapped);
            }

            #[cfg(not(feature = "parallel"))]
            {
                self.ready.extend(chunk.into_iter().map(f));
            }
        }

        self.ready.pop_front()
    }
}

struct Batched<T> {
    source: BoxedIter<T>,
    batch_size: usize,
}

impl<T> Iterator for Batched<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Vec<T>> {
        let batch: Vec<T> = self.source.by_ref().take(self.batch_size).collect();
        if batch.is_empty() { None } else { Some(batch) }
    }
}

struct Prefetched<T> {
    rx: Receiver<T>,
    worker: Option<JoinHandle<()>>,
}

impl<T> Iterator for Prefetched<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self.rx.recv() {
            Ok(item) => Some(item),
            // Disconnected: either upstream is exhausted or the worker died
            Err(_) => {
                if let Some(worker) = self.worker.take() {
                    if let Err(payload) = worker.join() {
                        std::panic::resume_unwind(payload);
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shuffle_is_permutation() {
        let mut shuffled: Vec<u32> = Pipeline::new(0..100u32).shuffle(100, 7).collect();
        assert_ne!(shuffled, (0..100).collect::<Vec<_>>());
        shuffled.sort_unstable();
        assert_eq!(shuffled, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let a: Vec<u32> = Pipeline::new(0..50u32).shuffle(50, 3).collect();
        let b: Vec<u32> = Pipeline::new(0..50u32).shuffle(50, 3).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_batch_keeps_remainder() {
        let batches: Vec<Vec<u32>> = Pipeline::new(0..10u32).batch(4).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2], vec![8, 9]);
    }

    #[test]
    fn test_par_map_preserves_order() {
        let doubled: Vec<u64> = Pipeline::new(0..37u64).par_map(8, |x| x * 2).collect();
        assert_eq!(doubled, (0..37u64).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_prefetch_yields_everything() {
        let items: Vec<u32> = Pipeline::new(0..20u32)
            .map(|x| x + 1)
            .prefetch(Prefetch::Buffer(3))
            .collect();
        assert_eq!(items, (1..21).collect::<Vec<_>>());
    }

    #[test]
    fn test_prefetch_reraises_upstream_panic() {
        let result = std::panic::catch_unwind(|| {
            Pipeline::new(0..10u32)
                .map(|x| if x == 5 { panic!("stage failed on {}", x) } else { x })
                .prefetch(Prefetch::Buffer(2))
                .collect::<Vec<_>>()
        });

        let payload = result.expect_err("a failed stage must not end the stream quietly");
        let message = payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_default();
        assert_eq!(message, "stage failed on 5");
    }

    #[test]
    fn test_prefetch_exhaustion_stays_ended() {
        let mut pipeline = Pipeline::new(0..3u32).prefetch(Prefetch::Buffer(1));
        assert_eq!(pipeline.by_ref().count(), 3);
        assert_eq!(pipeline.next(), None);
    }

    #[test]
    fn test_repeat_with_cycles() {
        let items: Vec<u32> = Pipeline::repeat_with(|| Pipeline::new(0..3u32))
            .prefetch(Prefetch::Auto)
            .take(7)
            .collect();
        assert_eq!(items, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_prefetch_resolve() {
        assert_eq!(Prefetch::Off.resolve(), None);
        assert_eq!(Prefetch::Buffer(0).resolve(), None);
        assert_eq!(Prefetch::Buffer(5).resolve(), Some(5));
        assert!(Prefetch::Auto.resolve().unwrap() >= 1);
    }
}
