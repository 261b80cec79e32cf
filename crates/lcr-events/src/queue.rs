// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A `parking_lot::Mutex`-guarded `BinaryHeap<PrioritizedEvent>`, ordered by
//! `(priority, Reverse(sequence))` so FIFO-within-priority falls out of
//! `Ord` instead of a secondary data structure. `tokio::sync::Notify` wakes
//! a waiting dispatcher the same way the daemon's event bus wakes its
//! engine loop on `send()`.

use crate::event::Event;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

pub(crate) struct PrioritizedEvent {
    sequence: u64,
    pub event: Event,
}

impl PartialEq for PrioritizedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event.priority == other.event.priority && self.sequence == other.sequence
    }
}
impl Eq for PrioritizedEvent {}

impl PartialOrd for PrioritizedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.event.priority, Reverse(self.sequence)).cmp(&(other.event.priority, Reverse(other.sequence)))
    }
}

pub(crate) struct EventQueue {
    heap: Mutex<BinaryHeap<PrioritizedEvent>>,
    dead_letter: Mutex<VecDeque<Event>>,
    sequence: AtomicU64,
    notify: Notify,
    capacity: usize,
    dead_letter_capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize, dead_letter_capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            dead_letter: Mutex::new(VecDeque::new()),
            sequence: AtomicU64::new(0),
            notify: Notify::new(),
            capacity,
            dead_letter_capacity,
        }
    }

    /// Enqueues `event`. If this pushes the queue past capacity, evicts the
    /// oldest event among the lowest priority class currently present (which
    /// may be the event just pushed) into the dead-letter ring.
    pub fn push(&self, event: Event) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let mut heap = self.heap.lock();
        heap.push(PrioritizedEvent { sequence, event });

        if heap.len() > self.capacity {
            let min_priority = heap.iter().map(|e| e.event.priority).min().expect("heap is non-empty");
            let evict_sequence = heap
                .iter()
                .filter(|e| e.event.priority == min_priority)
                .map(|e| e.sequence)
                .min()
                .expect("at least one entry at min_priority");

            let items = std::mem::take(&mut *heap).into_vec();
            let mut survivors = Vec::with_capacity(items.len());
            let mut evicted = None;
            for item in items {
                if evicted.is_none() && item.sequence == evict_sequence {
                    evicted = Some(item.event);
                } else {
                    survivors.push(item);
                }
            }
            *heap = survivors.into_iter().collect();
            if let Some(dropped) = evicted {
                drop(heap);
                self.push_dead_letter(dropped);
                self.notify.notify_one();
                return;
            }
        }
        drop(heap);
        self.notify.notify_one();
    }

    fn push_dead_letter(&self, event: Event) {
        let mut ring = self.dead_letter.lock();
        ring.push_back(event);
        while ring.len() > self.dead_letter_capacity {
            ring.pop_front();
        }
    }

    pub fn pop(&self) -> Option<Event> {
        self.heap.lock().pop().map(|p| p.event)
    }

    pub fn pop_batch(&self, max: usize) -> Vec<Event> {
        let mut heap = self.heap.lock();
        let mut batch = Vec::with_capacity(max.min(heap.len()));
        for _ in 0..max {
            match heap.pop() {
                Some(p) => batch.push(p.event),
                None => break,
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dead_letter(&self) -> Vec<Event> {
        self.dead_letter.lock().iter().cloned().collect()
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
