//! Producer / worker-pool / unshuffler skeleton.
//!
//! A producer numbers each record as it enters the pipeline. Workers
//! transform records in parallel and out of order; the unshuffler
//! buffers results in a min-heap keyed on the record number and
//! releases them in strictly ascending order, one output per input.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender};

/// Entries read from the heap before each head-of-line check; amortizes
/// priority-queue operations
pub const HEAP_DELAY: usize = 8;

/// A numbered record moving through an ordered pipeline
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope<T> {
    /// Original position in the input stream, starting at 1
    pub index: usize,
    pub ident: String,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(index: usize, ident: String, payload: T) -> Self {
        Self {
            index,
            ident,
            payload,
        }
    }
}

/// Min-heap adapter over the envelope index
struct ByIndex<T>(Envelope<T>);

impl<T> PartialEq for ByIndex<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.index == other.0.index
    }
}

impl<T> Eq for ByIndex<T> {}

impl<T> PartialOrd for ByIndex<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ByIndex<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for a min-heap on BinaryHeap
        other.0.index.cmp(&self.0.index)
    }
}

/// Spawn a producer that numbers records from an iterator onto a
/// bounded channel
pub fn spawn_producer<T, I>(source: I, depth: usize) -> Receiver<Envelope<T>>
where
    T: Send + 'static,
    I: IntoIterator<Item = T> + Send + 'static,
    I::IntoIter: Send,
{
    let (tx, rx) = bounded(depth.max(1));

    thread::spawn(move || {
        for (i, payload) in source.into_iter().enumerate() {
            if tx
                .send(Envelope::new(i + 1, String::new(), payload))
                .is_err()
            {
                break;
            }
        }
    });

    rx
}

/// Spawn a fixed-size worker pool transforming envelopes. Workers share
/// the input channel; output order is arbitrary.
pub fn spawn_workers<T, U, F>(
    workers: usize,
    depth: usize,
    inp: Receiver<Envelope<T>>,
    transform: F,
) -> Receiver<Envelope<U>>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(Envelope<T>) -> Envelope<U> + Send + Sync + Clone + 'static,
{
    let (tx, rx) = bounded(depth.max(1));

    for _ in 0..workers.max(1) {
        let inp = inp.clone();
        let tx: Sender<Envelope<U>> = tx.clone();
        let transform = transform.clone();

        thread::spawn(move || {
            for env in inp.iter() {
                if tx.send(transform(env)).is_err() {
                    break;
                }
            }
        });
    }

    rx
}

/// Spawn the unshuffler: consume out-of-order envelopes and release them
/// with indices strictly ascending, exactly one output per input
pub fn spawn_unshuffler<T>(inp: Receiver<Envelope<T>>, depth: usize) -> Receiver<Envelope<T>>
where
    T: Send + 'static,
{
    let (tx, rx) = bounded(depth.max(1));

    thread::spawn(move || {
        let mut heap: BinaryHeap<ByIndex<T>> = BinaryHeap::new();

        // index of next desired result
        let mut next = 1;
        let mut delay = 0;

        for env in inp.iter() {
            heap.push(ByIndex(env));

            // read several values before checking the head of the heap
            if delay < HEAP_DELAY {
                delay += 1;
                continue;
            }
            delay = 0;

            while let Some(curr) = heap.pop() {
                if curr.0.index > next {
                    heap.push(curr);
                    break;
                }

                // send even if the payload is empty so downstream
                // counters stay consistent
                let index = curr.0.index;
                if tx.send(curr.0).is_err() {
                    return;
                }

                if index == next {
                    next += 1;
                }
            }
        }

        // flush the remainder of the heap
        while let Some(curr) = heap.pop() {
            if tx.send(curr.0).is_err() {
                return;
            }
        }
    });

    rx
}
