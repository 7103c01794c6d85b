//! Reactive state that text content is interpolated against.

use core::cell::{Cell, RefCell};
use hashbrown::HashMap;
use std::rc::{Rc, Weak};
use tracing::trace;

/// Called whenever a subscribed namespace changes.
pub type Subscriber = Rc<dyn Fn()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Anything interpolation can read from and subscribe to.
///
/// The engine only ever holds data contexts weakly.
pub trait DataContext {
	fn get(&self, namespace: &str) -> Option<String>;
	fn set(&self, value: String, namespace: &str);
	fn subscribe(&self, namespace: &str, subscriber: Subscriber) -> SubscriptionId;
	fn unsubscribe(&self, id: SubscriptionId);
}

/// A flat string-keyed [`DataContext`].
#[derive(Default)]
pub struct Store {
	values: RefCell<HashMap<String, String>>,
	subscribers: RefCell<Vec<(SubscriptionId, String, Subscriber)>>,
	next_id: Cell<u64>,
}
impl Store {
	#[must_use]
	pub fn new() -> Rc<Self> {
		Rc::default()
	}

	#[must_use]
	pub fn subscriber_count(&self, namespace: &str) -> usize {
		self.subscribers.borrow().iter().filter(|(_, n, _)| n == namespace).count()
	}
}
impl DataContext for Store {
	fn get(&self, namespace: &str) -> Option<String> {
		self.values.borrow().get(namespace).cloned()
	}

	fn set(&self, value: String, namespace: &str) {
		let changed = self.values.borrow_mut().insert(namespace.to_owned(), value.clone()).as_ref() != Some(&value);
		if !changed {
			return;
		}

		// Subscribers may (un)subscribe while being notified.
		let notified: Vec<Subscriber> = self
			.subscribers
			.borrow()
			.iter()
			.filter(|(_, n, _)| n == namespace)
			.map(|(_, _, subscriber)| subscriber.clone())
			.collect();
		trace!(namespace, count = notified.len(), "Notifying subscribers.");
		for subscriber in notified {
			subscriber();
		}
	}

	fn subscribe(&self, namespace: &str, subscriber: Subscriber) -> SubscriptionId {
		let id = SubscriptionId(self.next_id.get());
		self.next_id.set(id.0 + 1);
		self.subscribers.borrow_mut().push((id, namespace.to_owned(), subscriber));
		id
	}

	fn unsubscribe(&self, id: SubscriptionId) {
		self.subscribers.borrow_mut().retain(|(i, _, _)| *i != id);
	}
}

/// Unsubscribes on drop, if the context is still around.
pub(crate) struct Subscription {
	context: Weak<dyn DataContext>,
	id: SubscriptionId,
}
impl Subscription {
	pub(crate) fn new(context: &Rc<dyn DataContext>, namespace: &str, subscriber: Subscriber) -> Self {
		Self {
			id: context.subscribe(namespace, subscriber),
			context: Rc::downgrade(context),
		}
	}

	pub(crate) fn is_for(&self, context: &Rc<dyn DataContext>) -> bool {
		self.context.as_ptr().cast::<()>() == Rc::as_ptr(context).cast::<()>()
	}
}
impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(context) = self.context.upgrade() {
			context.unsubscribe(self.id)
		}
	}
}
