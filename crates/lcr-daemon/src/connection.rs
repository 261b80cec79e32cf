// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection bookkeeping: transport state, the bounded outbound
//! queue, mounted-component tracking, and the bad-frame strike counter.

use lcr_core::{ClientId, ComponentId};
use lcr_wire::Message;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Open,
    Closing,
    Closed,
    Reconnecting,
    Error,
}

#[derive(Debug)]
pub struct QueuedFrame {
    pub message: Message,
    pub critical: bool,
}

/// Bounded outbound queue. Overflow evicts the oldest non-critical frame;
/// critical frames (errors, mount responses) are never dropped, even if
/// that means briefly exceeding capacity.
#[derive(Debug)]
pub struct SendQueue {
    capacity: usize,
    frames: Mutex<VecDeque<QueuedFrame>>,
    notify: Notify,
    closed: AtomicBool,
}

impl SendQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueues `message`, returning the frame that had to be evicted to
    /// make room (or the message itself, when the queue is already closed).
    pub fn push(&self, message: Message, critical: bool) -> Option<Message> {
        if self.closed.load(Ordering::SeqCst) {
            return Some(message);
        }
        let mut frames = self.frames.lock();
        let dropped = if frames.len() >= self.capacity {
            match frames.iter().position(|f| !f.critical) {
                Some(pos) => frames.remove(pos).map(|f| f.message),
                None => None,
            }
        } else {
            None
        };
        frames.push_back(QueuedFrame { message, critical });
        drop(frames);
        self.notify.notify_one();
        dropped
    }

    pub fn pop(&self) -> Option<QueuedFrame> {
        self.frames.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Stops accepting new frames and wakes the writer so it can observe
    /// the closed flag and exit once drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct Connection {
    pub client_id: ClientId,
    state: Mutex<TransportState>,
    last_inbound_ms: AtomicU64,
    inbound_sequence: AtomicU64,
    outbound_sequence: AtomicU64,
    mounted: Mutex<HashSet<ComponentId>>,
    pub send_queue: SendQueue,
    /// Timestamps of recent bad frames, pruned to the strike window.
    parse_errors: Mutex<VecDeque<u64>>,
    closed: Notify,
}

impl Connection {
    pub fn new(client_id: ClientId, send_queue_capacity: usize, now_ms: u64) -> Self {
        Self {
            client_id,
            state: Mutex::new(TransportState::Connecting),
            last_inbound_ms: AtomicU64::new(now_ms),
            inbound_sequence: AtomicU64::new(0),
            outbound_sequence: AtomicU64::new(0),
            mounted: Mutex::new(HashSet::new()),
            send_queue: SendQueue::new(send_queue_capacity),
            parse_errors: Mutex::new(VecDeque::new()),
            closed: Notify::new(),
        }
    }

    pub fn state(&self) -> TransportState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransportState) {
        *self.state.lock() = state;
        if matches!(state, TransportState::Closing | TransportState::Closed | TransportState::Error) {
            self.closed.notify_waiters();
        }
    }

    /// Resolves once the connection leaves the open state; the heartbeat
    /// task parks on this.
    pub async fn closed_notified(&self) {
        self.closed.notified().await;
    }

    pub fn record_inbound(&self, now_ms: u64) -> u64 {
        self.last_inbound_ms.store(now_ms, Ordering::SeqCst);
        self.inbound_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn last_inbound_ms(&self) -> u64 {
        self.last_inbound_ms.load(Ordering::SeqCst)
    }

    pub fn next_outbound_sequence(&self) -> u64 {
        self.outbound_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn track_mount(&self, component_id: ComponentId) {
        self.mounted.lock().insert(component_id);
    }

    pub fn untrack_mount(&self, component_id: &ComponentId) {
        self.mounted.lock().remove(component_id);
    }

    pub fn mounted_components(&self) -> Vec<ComponentId> {
        self.mounted.lock().iter().cloned().collect()
    }

    /// Records one bad frame; true means the strike budget is spent and the
    /// connection should be terminated.
    pub fn record_parse_error(&self, now_ms: u64, max_strikes: usize, window_ms: u64) -> bool {
        let mut strikes = self.parse_errors.lock();
        strikes.push_back(now_ms);
        while let Some(front) = strikes.front() {
            if now_ms.saturating_sub(*front) > window_ms {
                strikes.pop_front();
            } else {
                break;
            }
        }
        strikes.len() > max_strikes
    }

    /// Enqueues an outbound frame. Returns the frame the queue evicted, if
    /// overflow forced one out.
    pub fn enqueue(&self, message: Message, critical: bool) -> Option<Message> {
        self.next_outbound_sequence();
        self.send_queue.push(message, critical)
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
