/*
 * queue.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Request queue for the message pump.
//!
//! While a response is being parsed the queue is locked: its contents move
//! into a `LockedQueue` snapshot that the parser walks with a cursor, and
//! anything enqueued meanwhile lands in a fresh list. Unlocking puts the
//! snapshot's remainder in front of the newcomers, so submission order is
//! preserved.

use std::collections::VecDeque;

use super::request::Request;

/// Snapshot walked by the response loop.
#[derive(Debug)]
pub struct LockedQueue {
    items: VecDeque<Request>,
    offset: Option<usize>,
}

impl LockedQueue {
    fn new(items: VecDeque<Request>) -> Self {
        Self { items, offset: None }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Advance the cursor and return the request under it.
    pub fn next(&mut self) -> Option<&mut Request> {
        let next = self.offset.map_or(0, |o| o + 1);
        if next >= self.items.len() {
            return None;
        }
        self.offset = Some(next);
        self.items.get_mut(next)
    }

    /// The request under the cursor.
    pub fn current(&mut self) -> Option<&mut Request> {
        self.offset.and_then(|o| self.items.get_mut(o))
    }

    /// Whether a CAPABILITY behind the cursor has been written. A pending
    /// greeting under the cursor would read the same capability block, and
    /// the written request is the one owed the reply.
    pub fn capability_in_flight(&self) -> bool {
        let start = self.offset.map_or(0, |o| o + 1);
        self.items
            .iter()
            .skip(start)
            .any(|r| r.is_awaiting() && r.command().answers_with_capabilities())
    }

    /// Rewind the cursor; nothing is removed.
    pub fn reset(&mut self) {
        self.offset = None;
    }

    /// Remove the requests before the cursor and keep the one under it,
    /// which still has round trips to go. Rewinds.
    pub fn trunc_before(&mut self) {
        if let Some(offset) = self.offset.take() {
            for mut request in self.items.drain(..offset) {
                request.abandon("superseded");
            }
        }
    }

    /// Remove every request up to and including the cursor, then rewind.
    /// Skipped optional requests go with it, silently.
    pub fn trunc(&mut self) {
        if let Some(offset) = self.offset.take() {
            for mut request in self.items.drain(..=offset) {
                request.abandon("superseded");
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MessageQueue {
    queued: VecDeque<Request>,
    locked: Option<LockedQueue>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: Request) {
        self.queued.push_back(request);
    }

    pub fn len(&self) -> usize {
        self.queued.len() + self.locked.as_ref().map_or(0, LockedQueue::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    pub fn lock(&mut self) -> &mut LockedQueue {
        let queued = &mut self.queued;
        self.locked
            .get_or_insert_with(|| LockedQueue::new(std::mem::take(queued)))
    }

    /// Merge: locked remainder first, then whatever arrived during the lock.
    pub fn unlock(&mut self) {
        if let Some(locked) = self.locked.take() {
            let mut items = locked.items;
            items.extend(self.queued.drain(..));
            self.queued = items;
        }
    }

    /// Index of the next request to write, honouring pipelining barriers.
    /// None while locked.
    pub fn deliverable(&self) -> Option<usize> {
        if self.locked.is_some() {
            return None;
        }
        let mut in_flight = false;
        for (i, request) in self.queued.iter().enumerate() {
            if !request.has_request() {
                continue;
            }
            if request.is_awaiting() {
                if request.is_barrier() {
                    return None;
                }
                in_flight = true;
                continue;
            }
            if request.is_barrier() && in_flight {
                return None;
            }
            return Some(i);
        }
        None
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Request> {
        self.queued.get_mut(index)
    }

    pub fn remove(&mut self, index: usize) -> Option<Request> {
        self.queued.remove(index)
    }

    /// Whether any queued request is waiting for bytes from the server.
    pub fn expects_response(&self) -> bool {
        self.queued.iter().any(Request::expects_response)
    }

    /// Abandon every request in order and empty the queue.
    pub fn drain(&mut self, reason: &str) -> usize {
        self.unlock();
        let count = self.queued.len();
        for mut request in self.queued.drain(..) {
            request.abandon(reason);
        }
        count
    }
}
