// Typed publish/subscribe channels
//
// Everything here runs on the driver thread. Subscribers may attach or
// detach while a value is being dispatched; a subscriber removed mid-dispatch
// is not called, one added mid-dispatch sees the next value.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct StreamInner<T> {
    next_id: u64,
    subscribers: Vec<(u64, Callback<T>)>,
    closed: bool,
}

/// A multicast stream of values
///
/// Clones share the same subscriber list.
pub struct Stream<T> {
    inner: Rc<RefCell<StreamInner<T>>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Stream")
            .field("subscribers", &inner.subscribers.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

impl<T: 'static> Stream<T> {
    /// Create a stream with no subscribers
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(StreamInner {
                next_id: 0,
                subscribers: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Attach a callback; it stays attached until the returned handle is dropped
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&T) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return Subscription::inert();
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let callback: Callback<T> = Rc::new(RefCell::new(callback));
        inner.subscribers.push((id, callback));

        let weak: Weak<RefCell<StreamInner<T>>> = Rc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    // Drop the callback outside the borrow, it may own other subscriptions
                    let removed = {
                        let mut inner = inner.borrow_mut();
                        inner
                            .subscribers
                            .iter()
                            .position(|(sid, _)| *sid == id)
                            .map(|index| inner.subscribers.remove(index))
                    };
                    drop(removed);
                }
            })),
        }
    }

    /// Deliver a value to every current subscriber, in subscription order
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<(u64, Callback<T>)> = {
            let inner = self.inner.borrow();
            if inner.closed {
                return;
            }
            inner.subscribers.clone()
        };

        for (id, callback) in snapshot {
            let still_subscribed = self
                .inner
                .borrow()
                .subscribers
                .iter()
                .any(|(sid, _)| *sid == id);
            if !still_subscribed {
                continue;
            }

            match callback.try_borrow_mut() {
                Ok(mut callback) => (&mut *callback)(value),
                Err(_) => log::warn!("Skipping re-entrant delivery to subscriber {}", id),
            }
        }
    }

    /// Drop every subscriber and refuse new ones
    pub fn close(&self) {
        let dropped = {
            let mut inner = self.inner.borrow_mut();
            inner.closed = true;
            std::mem::take(&mut inner.subscribers)
        };
        drop(dropped);
    }

    /// Whether the stream has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// Number of attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

impl<T: 'static> Default for Stream<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle that keeps a subscriber attached
///
/// Dropping it unsubscribes. Call [`Subscription::detach`] to keep the
/// subscriber for the lifetime of the stream instead.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn inert() -> Self {
        Self { unsubscribe: None }
    }

    /// Detach now
    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }

    /// Keep the subscriber attached until the stream is closed
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }

    /// Whether this handle still controls a subscriber
    pub fn is_attached(&self) -> bool {
        self.unsubscribe.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// A group of subscriptions released together
#[derive(Debug, Default)]
pub struct SubscriptionBag {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Unsubscribe everything
    pub fn clear(&mut self) {
        let subscriptions = std::mem::take(&mut self.subscriptions);
        drop(subscriptions);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

/// A value with a change notification
pub struct Property<T> {
    value: Rc<RefCell<T>>,
    changes: Stream<T>,
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
            changes: self.changes.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.value.borrow()).finish()
    }
}

impl<T: Clone + PartialEq + 'static> Property<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Rc::new(RefCell::new(value)),
            changes: Stream::new(),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Store a value, notifying subscribers only if it changed
    pub fn set(&self, value: T) -> bool {
        if *self.value.borrow() == value {
            return false;
        }
        *self.value.borrow_mut() = value.clone();
        self.changes.emit(&value);
        true
    }

    /// Stream of new values; the current value is not replayed
    pub fn changes(&self) -> Stream<T> {
        self.changes.clone()
    }
}
