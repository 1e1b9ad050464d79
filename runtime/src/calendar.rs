// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::Tick;

/// A future callback to the device model.
///
/// The device owns the event and keeps it alive between `schedule` and the
/// fire (or a `cancel`); the calendar only holds handles. The `tag` is
/// opaque to the runtime and lets a device multiplex several timers over
/// one `timed_event` callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimedEvent {
    pub time: Tick,
    pub tag: u64,
}

impl TimedEvent {
    pub fn new(time: Tick, tag: u64) -> Self {
        Self { time, tag }
    }

    /// Convenience constructor for the shared handle devices pass around.
    pub fn shared(time: Tick, tag: u64) -> EventRef {
        Rc::new(RefCell::new(Self::new(time, tag)))
    }
}

/// Shared handle to a device-owned event.
pub type EventRef = Rc<RefCell<TimedEvent>>;

/// Ordered set of future device callbacks, keyed by logical time.
///
/// Entries are ordered by (time, insertion sequence): two events scheduled
/// for the same tick fire in the order they were scheduled. The sequence
/// number is internal and never observable through event equality. All
/// operations are O(log n); the calendar never fires events on its own.
#[derive(Default)]
pub struct EventCalendar {
    entries: BTreeMap<(Tick, u64), EventRef>,
    // Position of each scheduled handle, for cancellation.
    handles: HashMap<*const RefCell<TimedEvent>, (Tick, u64)>,
    next_seq: u64,
}

impl EventCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `event` at its current `time`. Scheduling a handle that is
    /// already in the calendar is a caller bug; cancel it first.
    pub fn schedule(&mut self, event: EventRef) {
        let time = event.borrow().time;
        let key = (time, self.next_seq);
        self.next_seq += 1;
        let prev = self.handles.insert(Rc::as_ptr(&event), key);
        debug_assert!(prev.is_none(), "event scheduled twice without cancel");
        self.entries.insert(key, event);
    }

    /// Removes `event` if scheduled; no-op otherwise.
    pub fn cancel(&mut self, event: &EventRef) {
        if let Some(key) = self.handles.remove(&Rc::as_ptr(event)) {
            self.entries.remove(&key);
        }
    }

    /// The earliest scheduled event, if any.
    pub fn peek(&self) -> Option<&EventRef> {
        self.entries.values().next()
    }

    /// The time of the earliest scheduled event, if any.
    pub fn next_time(&self) -> Option<Tick> {
        self.entries.keys().next().map(|(time, _)| *time)
    }

    /// Removes and returns the earliest event iff its time is <= `now`.
    pub fn pop_due(&mut self, now: Tick) -> Option<EventRef> {
        let (&key, _) = self.entries.iter().next()?;
        if key.0 > now {
            return None;
        }
        let event = self.entries.remove(&key).unwrap();
        self.handles.remove(&Rc::as_ptr(&event));
        Some(event)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
