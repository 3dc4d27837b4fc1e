//! Time-keyed event table embedded in every node.
//!
//! Keys fire on the one-sided condition `key <= cursor` and are deleted as they fire. A cursor
//! that jumps across a key in one step, or is reset and replayed, still fires each key once.

use std::fmt;

use crate::ids::ListenerToken;
use crate::listeners::{Listener, ListenerList};
use crate::outputs::BlendEvent;

struct ScheduledKey {
    time: f32,
    listeners: ListenerList,
}

#[derive(Default)]
pub struct EventSchedule {
    /// Sorted ascending by `time`.
    keys: Vec<ScheduledKey>,
    next_token: u64,
}

impl fmt::Debug for EventSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.keys.iter().map(|k| (k.time, k.listeners.len())))
            .finish()
    }
}

impl EventSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` at `time`. Negative or non-finite times are ignored.
    pub fn add<F>(&mut self, time: f32, listener: F) -> Option<ListenerToken>
    where
        F: FnMut(&BlendEvent) + 'static,
    {
        self.add_boxed(time, Box::new(listener))
    }

    pub(crate) fn add_boxed(&mut self, time: f32, listener: Listener) -> Option<ListenerToken> {
        if !time.is_finite() || time < 0.0 {
            return None;
        }
        let token = ListenerToken(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);

        let pos = self.keys.partition_point(|k| k.time < time);
        match self.keys.get_mut(pos) {
            Some(key) if key.time == time => key.listeners.insert(token, listener),
            _ => {
                let mut listeners = ListenerList::new();
                listeners.insert(token, listener);
                self.keys.insert(pos, ScheduledKey { time, listeners });
            }
        }
        Some(token)
    }

    /// Remove one registration. Empty keys are dropped.
    pub fn remove(&mut self, time: f32, token: ListenerToken) -> bool {
        let Some(pos) = self.keys.iter().position(|k| k.time == time) else {
            return false;
        };
        let removed = self.keys[pos].listeners.unsubscribe(token);
        if self.keys[pos].listeners.is_empty() {
            self.keys.remove(pos);
        }
        removed
    }

    /// Remove every registration at `time`, returning how many were dropped.
    pub fn remove_all(&mut self, time: f32) -> usize {
        match self.keys.iter().position(|k| k.time == time) {
            Some(pos) => self.keys.remove(pos).listeners.len(),
            None => 0,
        }
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Number of distinct keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = f32> + '_ {
        self.keys.iter().map(|k| k.time)
    }

    /// Fire and delete every key `<= cursor`, in key order. The event for each key is built by
    /// `make_event` and appended to `sink` after its listeners ran.
    pub fn fire_due(
        &mut self,
        cursor: f32,
        mut make_event: impl FnMut(f32) -> BlendEvent,
        sink: &mut Vec<BlendEvent>,
    ) {
        let due = self.keys.partition_point(|k| k.time <= cursor);
        if due == 0 {
            return;
        }
        // Detach before invoking so a listener can never observe its own key again.
        let fired: Vec<ScheduledKey> = self.keys.drain(..due).collect();
        for mut key in fired {
            let event = make_event(key.time);
            key.listeners.emit(&event);
            sink.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;
    use std::cell::Cell;
    use std::rc::Rc;

    fn ev(time: f32) -> BlendEvent {
        BlendEvent::ScheduledEvent {
            layer: 0,
            node: NodeId {
                index: 0,
                generation: 0,
            },
            child: None,
            time,
        }
    }

    #[test]
    fn rejects_negative_time() {
        let mut s = EventSchedule::new();
        assert!(s.add(-0.1, |_| {}).is_none());
        assert!(s.add(f32::NAN, |_| {}).is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn shared_keys_multicast_and_remove_one() {
        let hits = Rc::new(Cell::new(0));
        let mut s = EventSchedule::new();
        let h1 = hits.clone();
        let a = s.add(0.5, move |_| h1.set(h1.get() + 1)).unwrap();
        let h2 = hits.clone();
        s.add(0.5, move |_| h2.set(h2.get() + 10)).unwrap();
        assert_eq!(s.len(), 1);

        assert!(s.remove(0.5, a));
        let mut sink = Vec::new();
        s.fire_due(1.0, ev, &mut sink);
        assert_eq!(hits.get(), 10);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn one_sided_window_fires_once_across_large_jump() {
        let hits = Rc::new(Cell::new(0));
        let mut s = EventSchedule::new();
        for t in [0.2, 0.4, 0.9] {
            let h = hits.clone();
            s.add(t, move |_| h.set(h.get() + 1));
        }
        let mut sink = Vec::new();
        s.fire_due(0.5, ev, &mut sink);
        assert_eq!(hits.get(), 2);
        s.fire_due(0.5, ev, &mut sink);
        assert_eq!(hits.get(), 2);
        s.fire_due(10.0, ev, &mut sink);
        assert_eq!(hits.get(), 3);
        assert!(s.is_empty());
        let times: Vec<f32> = sink
            .iter()
            .map(|e| match e {
                BlendEvent::ScheduledEvent { time, .. } => *time,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(times, vec![0.2, 0.4, 0.9]);
    }

    #[test]
    fn remove_all_drops_every_listener_at_key() {
        let mut s = EventSchedule::new();
        s.add(1.0, |_| {});
        s.add(1.0, |_| {});
        s.add(2.0, |_| {});
        assert_eq!(s.remove_all(1.0), 2);
        assert_eq!(s.remove_all(1.0), 0);
        assert_eq!(s.times().collect::<Vec<_>>(), vec![2.0]);
    }
}
