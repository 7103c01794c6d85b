//! Pluggable resolvers that decide how declared tags, attributes and events reach the host.

use crate::{host::Handler, tree::Uid};
use hashbrown::HashMap;
use std::{cell::RefCell, rc::Rc};

/// What a [`Behavior`] is for. Routers and the like look nodes up by capability rather than by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
	/// A plain component with no special role.
	Component,
	/// Decides whether its subtree applies to the current route.
	RouteMatcher,
	/// Receives the children of the active route.
	RouteOutlet,
}

/// A behavior object attached to an element by a [`TagResolver`].
pub trait Behavior {
	fn capability(&self) -> Capability;

	/// Overrides the host tag the element is created with. By default, the declared tag is used literally.
	fn host_tag(&self) -> Option<&str> {
		None
	}

	/// Called after the element's host node was inserted, once the pass has finished.
	fn mounted(&self, _uid: Uid) {}

	/// Called after the element's host node was removed, once the pass has finished.
	fn unmounting(&self, _uid: Uid) {}
}

pub trait TagResolver {
	fn resolve(&self, tag: &str) -> Option<Rc<dyn Behavior>>;
}

/// How a declared attribute is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
	/// Write this value to the host attribute.
	Literal(String),
	/// Don't write the attribute. Instead, bind `handler` to `event` on the node (a navigation handler, for example).
	Listener { event: String, handler: String },
	/// Don't touch the host for this attribute at all.
	Omit,
}

pub trait AttributeResolver {
	fn resolve(&self, uid: Uid, name: &str, value: &str) -> Resolution;
}

impl<F: Fn(Uid, &str, &str) -> Resolution> AttributeResolver for F {
	fn resolve(&self, uid: Uid, name: &str, value: &str) -> Resolution {
		self(uid, name, value)
	}
}

/// Attribute resolvers by attribute name, tag resolvers in registration order, and named event handlers.
#[derive(Default)]
pub struct Registry {
	attributes: HashMap<String, Rc<dyn AttributeResolver>>,
	tags: Vec<Rc<dyn TagResolver>>,
	/// Host listeners capture the slot rather than the closure, so replacing a handler reaches listeners that already exist.
	handlers: HashMap<String, Rc<RefCell<Handler>>>,
}
impl Registry {
	pub fn register_attribute(&mut self, name: impl Into<String>, resolver: Rc<dyn AttributeResolver>) {
		self.attributes.insert(name.into(), resolver);
	}

	pub fn register_tag(&mut self, resolver: Rc<dyn TagResolver>) {
		self.tags.push(resolver)
	}

	pub fn register_handler(&mut self, name: impl Into<String>, handler: Handler) {
		match self.handlers.entry(name.into()) {
			hashbrown::hash_map::Entry::Occupied(slot) => *slot.get().borrow_mut() = handler,
			hashbrown::hash_map::Entry::Vacant(vacant) => {
				vacant.insert(Rc::new(RefCell::new(handler)));
			}
		}
	}

	/// A handler that always calls whatever is currently registered under `name`.
	#[must_use]
	pub fn handler(&self, name: &str) -> Option<Handler> {
		let slot = Rc::clone(self.handlers.get(name)?);
		Some(Rc::new(move || {
			// Cloned out first so the handler may re-register itself.
			let current = Rc::clone(&*slot.borrow());
			(*current)()
		}))
	}

	/// Attributes without a resolver apply literally.
	#[must_use]
	pub fn resolve_attribute(&self, uid: Uid, name: &str, value: &str) -> Resolution {
		match self.attributes.get(name) {
			Some(resolver) => resolver.resolve(uid, name, value),
			None => Resolution::Literal(value.to_owned()),
		}
	}

	/// The first tag resolver that claims `tag` wins.
	#[must_use]
	pub fn resolve_tag(&self, tag: &str) -> Option<Rc<dyn Behavior>> {
		self.tags.iter().find_map(|resolver| resolver.resolve(tag))
	}
}
