//! Per-window request scheduler.
//!
//! DESIGN
//! ======
//! One FIFO per caller window id, created on first enqueue and dropped when
//! it drains. Only the head of a queue runs; everything behind it waits.
//! Window id 0 is an ordinary key, so unparented requests serialize with
//! each other. Different windows run concurrently.
//!
//! The manager is not shared. The dispatch service owns it and feeds it the
//! [`Completion`] events that running requests emit on `events`.
//!
//! INVARIANTS
//! ==========
//! - At most one request per queue is in progress, and it is the head.
//! - A request leaves its queue only after its completion, except a queued
//!   request that is canceled before it ever ran.
//! - A queue is never present in the map while empty.

use std::collections::{BTreeMap, VecDeque};

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::params::Parameters;
use crate::request::{Completion, Request};

pub struct QueueManager {
    queues: BTreeMap<u32, VecDeque<Request>>,
    events: mpsc::UnboundedSender<Completion>,
}

impl QueueManager {
    #[must_use]
    pub fn new(events: mpsc::UnboundedSender<Completion>) -> Self {
        Self { queues: BTreeMap::new(), events }
    }

    /// Append to the request's window queue, starting it if the queue was
    /// empty.
    pub fn enqueue(&mut self, request: Request) {
        let window_id = request.window_id();
        let queue = self.queues.entry(window_id).or_default();
        queue.push_back(request);
        debug!(window_id, depth = queue.len(), "queue: enqueued");
        if queue.len() == 1 {
            self.run_queue(window_id);
        }
    }

    /// Start the head of `window_id`'s queue unless it is already running.
    pub fn run_queue(&mut self, window_id: u32) {
        let Some(head) = self.queues.get_mut(&window_id).and_then(VecDeque::front_mut) else {
            return;
        };
        if head.is_in_progress() {
            return;
        }
        head.start(&self.events);
    }

    /// Retire the completed head and advance its queue.
    pub fn on_completed(&mut self, completion: Completion) {
        let Completion { key, window_id } = completion;
        let Some(queue) = self.queues.get_mut(&window_id) else {
            debug!(key, window_id, "queue: completion for unknown request");
            return;
        };

        match queue.iter().position(|r| r.key() == key) {
            Some(0) => {}
            Some(position) => {
                error!(key, window_id, position, "queue: completion from a request that is not the head");
                return;
            }
            None => {
                debug!(key, window_id, "queue: completion for unknown request");
                return;
            }
        }

        if let Some(done) = queue.pop_front() {
            info!(key, window_id, request_id = done.id(), "queue: request completed");
        }
        if queue.is_empty() {
            self.queues.remove(&window_id);
        } else {
            self.run_queue(window_id);
        }
    }

    /// Cancel the request whose caller id is `request_id`. A waiting request
    /// is removed and answered at once; the running head is told to stop.
    /// Returns whether a request matched.
    pub fn cancel(&mut self, request_id: &str) -> bool {
        if request_id.is_empty() {
            return false;
        }
        for (&window_id, queue) in &mut self.queues {
            let Some(position) = queue.iter().position(|r| r.id() == request_id) else {
                continue;
            };
            if position == 0 {
                debug!(request_id, window_id, "queue: canceling running request");
                if let Some(head) = queue.front_mut() {
                    head.cancel(&self.events);
                }
                return true;
            }
            debug!(request_id, window_id, position, "queue: removing waiting request");
            if let Some(mut waiting) = queue.remove(position) {
                waiting.cancel(&self.events);
            }
            return true;
        }
        false
    }

    /// Forward new parameters to the request `request_id`. Returns whether a
    /// running request took them.
    pub fn refresh(&mut self, request_id: &str, parameters: Parameters) -> bool {
        self.find_mut(request_id).is_some_and(|r| r.refresh(parameters))
    }

    pub fn find_mut(&mut self, request_id: &str) -> Option<&mut Request> {
        if request_id.is_empty() {
            return None;
        }
        self.queues.values_mut().flat_map(VecDeque::iter_mut).find(|r| r.id() == request_id)
    }

    /// No queued or running requests.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queues.is_empty()
    }

    #[cfg(test)]
    pub fn queue_len(&self, window_id: u32) -> usize {
        self.queues.get(&window_id).map_or(0, VecDeque::len)
    }

    /// Total requests across all windows.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
