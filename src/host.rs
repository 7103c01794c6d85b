//! The host tree API the reconciler drives.
//!
//! A host is whatever actually gets rendered: the browser DOM ([`DomHost`](`crate::dom::DomHost`)),
//! or an in-memory tree ([`MemoryHost`](`crate::memory::MemoryHost`)).
//! Host calls are synchronous and never suspend.

use crate::tree::Uid;
use core::fmt::Debug;
use std::rc::Rc;
use thiserror::Error;

/// A user event handler. Handlers are registered by name on the [`Engine`](`crate::Engine`).
pub type Handler = Rc<dyn Fn()>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host call `{call}` failed: {message}")]
pub struct HostError {
	pub call: &'static str,
	pub message: String,
}
impl HostError {
	pub fn new(call: &'static str, message: impl Into<String>) -> Self {
		Self { call, message: message.into() }
	}
}

pub trait Host {
	/// A handle to a host node. Equality must be node identity.
	type Node: Clone + PartialEq + Debug;

	/// A host-side event listener object that can be attached to many nodes.
	type Listener;

	fn create_element(&mut self, tag: &str) -> Result<Self::Node, HostError>;
	fn create_text_node(&mut self, text: &str) -> Self::Node;

	/// Labels `node` with the uid of the virtual node it was created for.
	fn tag_uid(&mut self, node: &Self::Node, uid: Uid);
	fn uid_of(&self, node: &Self::Node) -> Option<Uid>;

	/// `false` once the node was destroyed or otherwise taken out of the tree by someone other than the engine.
	fn is_alive(&self, node: &Self::Node) -> bool;

	/// The element's tag name, or [`None`] for anything that isn't an element.
	fn tag_name(&self, node: &Self::Node) -> Option<String>;
	fn is_text(&self, node: &Self::Node) -> bool;
	fn text_content(&self, node: &Self::Node) -> String;
	fn set_text_content(&mut self, node: &Self::Node, text: &str);

	/// The live attribute list, in host order.
	fn attributes(&self, node: &Self::Node) -> Vec<(String, String)>;
	fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str) -> Result<(), HostError>;
	fn remove_attribute(&mut self, node: &Self::Node, name: &str) -> Result<(), HostError>;

	fn child_nodes(&self, parent: &Self::Node) -> Vec<Self::Node>;
	fn parent_node(&self, node: &Self::Node) -> Option<Self::Node>;
	fn first_child(&self, parent: &Self::Node) -> Option<Self::Node>;
	fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

	/// Inserts (or moves) `child` into `parent` before `reference`, or at the end if `reference` is [`None`].
	fn insert_before(&mut self, parent: &Self::Node, child: &Self::Node, reference: Option<&Self::Node>) -> Result<(), HostError>;
	fn append_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), HostError> {
		self.insert_before(parent, child, None)
	}
	fn remove_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), HostError>;

	fn create_listener(&mut self, handler: Handler) -> Self::Listener;
	fn add_event_listener(&mut self, node: &Self::Node, event: &str, listener: &Self::Listener) -> Result<(), HostError>;
	fn remove_event_listener(&mut self, node: &Self::Node, event: &str, listener: &Self::Listener) -> Result<(), HostError>;
}
