// src/scheduler/queue.rs

//! Bounded priority queue: highest priority first, FIFO within a band.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::model::AnalysisJob;

struct Queued {
    job: AnalysisJob,
    /// Insertion order; lower is older.
    ticket: u64,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Max-heap: higher priority wins, then the older ticket.
    fn cmp(&self, other: &Self) -> Ordering {
        self.job
            .priority
            .cmp(&other.job.priority)
            .then_with(|| other.ticket.cmp(&self.ticket))
    }
}

pub struct JobQueue {
    heap: BinaryHeap<Queued>,
    capacity: usize,
    next_ticket: u64,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self { heap: BinaryHeap::with_capacity(capacity.min(4_096)), capacity, next_ticket: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Enqueue `job`, handing it back when the queue is full.
    pub fn push(&mut self, job: AnalysisJob) -> Result<(), AnalysisJob> {
        if self.heap.len() >= self.capacity {
            return Err(job);
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.heap.push(Queued { job, ticket });
        Ok(())
    }

    pub fn pop(&mut self) -> Option<AnalysisJob> {
        self.heap.pop().map(|q| q.job)
    }

    /// Drop queued jobs for which `keep` is false; returns how many went.
    pub fn retain(&mut self, mut keep: impl FnMut(&AnalysisJob) -> bool) -> usize {
        let before = self.heap.len();
        self.heap.retain(|q| keep(&q.job));
        before - self.heap.len()
    }
}
