// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! In-memory queue of wall clock timers. Used by the processor for awakeable deadlines and for
//! the backoff between invocation attempts. Timers are not durable: whoever owns the queue
//! re-registers them from persisted state after a restart.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use reprise_types::time::MillisSinceEpoch;

#[derive(Debug)]
pub struct Timer<T> {
    wake_up_time: MillisSinceEpoch,
    payload: T,
}

impl<T> Timer<T> {
    pub fn wake_up_time(&self) -> MillisSinceEpoch {
        self.wake_up_time
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_inner(self) -> T {
        self.payload
    }
}

impl<T> Ord for Timer<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wake_up_time.cmp(&other.wake_up_time)
    }
}

impl<T> PartialOrd for Timer<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Timer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Timer<T> {}

#[derive(Debug)]
pub struct TimerQueue<T>(BinaryHeap<Reverse<Timer<T>>>);

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        TimerQueue::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self(BinaryHeap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn sleep_until(&mut self, wake_up_time: MillisSinceEpoch, payload: T) {
        self.0.push(Reverse(Timer {
            wake_up_time,
            payload,
        }))
    }

    /// Earliest registered wake up time.
    pub fn next_wake_up_time(&self) -> Option<MillisSinceEpoch> {
        self.0.peek().map(|Reverse(timer)| timer.wake_up_time)
    }

    /// Drops every timer whose payload matches `predicate`.
    pub fn remove_if(&mut self, mut predicate: impl FnMut(&T) -> bool) {
        self.0.retain(|Reverse(timer)| !predicate(&timer.payload));
    }

    /// Waits for the earliest timer and pops it. Pending forever if the queue is empty.
    ///
    /// Cancel safe: the timer is only popped once it is due.
    pub async fn await_timer(&mut self) -> Timer<T> {
        loop {
            let Some(wake_up_time) = self.next_wake_up_time() else {
                return futures::future::pending().await;
            };

            let sleep = wake_up_time.saturating_duration_since_now();
            if !sleep.is_zero() {
                tokio::time::sleep(sleep).await;
            }

            if let Some(Reverse(timer)) = self.0.pop() {
                return timer;
            }
        }
    }
}

impl<T> FromIterator<(MillisSinceEpoch, T)> for TimerQueue<T> {
    fn from_iter<IT: IntoIterator<Item = (MillisSinceEpoch, T)>>(iter: IT) -> Self {
        let mut tq = TimerQueue::new();
        for (time, payload) in iter {
            tq.sleep_until(time, payload);
        }
        tq
    }
}
