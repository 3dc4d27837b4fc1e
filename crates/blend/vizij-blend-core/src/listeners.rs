//! Ordered listener lists with token-based unsubscribe.

use std::fmt;

use crate::ids::ListenerToken;
use crate::outputs::BlendEvent;

pub type Listener = Box<dyn FnMut(&BlendEvent)>;

#[derive(Default)]
pub struct ListenerList {
    entries: Vec<(ListenerToken, Listener)>,
    next: u64,
}

impl fmt::Debug for ListenerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl ListenerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerToken
    where
        F: FnMut(&BlendEvent) + 'static,
    {
        let token = ListenerToken(self.next);
        self.next = self.next.wrapping_add(1);
        self.entries.push((token, Box::new(listener)));
        token
    }

    /// Insert under a token allocated by the caller.
    pub(crate) fn insert(&mut self, token: ListenerToken, listener: Listener) {
        self.entries.push((token, listener));
    }

    pub fn unsubscribe(&mut self, token: ListenerToken) -> bool {
        match self.entries.iter().position(|(t, _)| *t == token) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke every listener in registration order.
    pub fn emit(&mut self, event: &BlendEvent) {
        for (_, listener) in self.entries.iter_mut() {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ev() -> BlendEvent {
        BlendEvent::FadeCompleted {
            layer: 0,
            node: NodeId {
                index: 0,
                generation: 0,
            },
        }
    }

    #[test]
    fn emits_in_registration_order_and_unsubscribes() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = ListenerList::new();
        let l1 = log.clone();
        let first = list.subscribe(move |_| l1.borrow_mut().push(1));
        let l2 = log.clone();
        list.subscribe(move |_| l2.borrow_mut().push(2));

        list.emit(&ev());
        assert_eq!(*log.borrow(), vec![1, 2]);

        assert!(list.unsubscribe(first));
        assert!(!list.unsubscribe(first));
        list.emit(&ev());
        assert_eq!(*log.borrow(), vec![1, 2, 2]);
        assert_eq!(list.len(), 1);
    }
}
