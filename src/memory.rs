//! A deterministic in-memory [`Host`] that records every mutation it receives.

use crate::{
	host::{Handler, Host, HostError},
	tree::Uid,
};
use core::fmt::{self, Debug, Formatter, Write as _};
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// One host call that changed the tree, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
	CreateElement { node: NodeId, tag: String },
	CreateText { node: NodeId, text: String },
	/// Covers moves, too.
	Insert { parent: NodeId, node: NodeId, before: Option<NodeId> },
	Remove { parent: NodeId, node: NodeId },
	SetText { node: NodeId, text: String },
	AttributeAdded { node: NodeId, name: String, value: String },
	AttributeUpdated { node: NodeId, name: String, value: String },
	AttributeRemoved { node: NodeId, name: String },
	ListenerAdded { node: NodeId, event: String },
	ListenerRemoved { node: NodeId, event: String },
}

/// A listener object. Equal only to clones of itself.
#[derive(Clone)]
pub struct MemoryListener(Handler);
impl PartialEq for MemoryListener {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Debug for MemoryListener {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("MemoryListener").field(&Rc::as_ptr(&self.0)).finish()
	}
}

#[derive(Debug)]
enum Data {
	Element { tag: String, attributes: Vec<(String, String)> },
	Text(String),
}

#[derive(Debug)]
struct MemoryNode {
	data: Data,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
	uid: Option<Uid>,
	alive: bool,
	listeners: Vec<(String, MemoryListener)>,
}

#[derive(Debug, Default)]
pub struct MemoryHost {
	nodes: Vec<MemoryNode>,
	log: Vec<Mutation>,
}
impl MemoryHost {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn push(&mut self, data: Data) -> NodeId {
		let id = NodeId(self.nodes.len());
		self.nodes.push(MemoryNode {
			data,
			parent: None,
			children: Vec::new(),
			uid: None,
			alive: true,
			listeners: Vec::new(),
		});
		id
	}

	/// Creates a detached element without logging it, to serve as an engine root.
	pub fn create_root(&mut self, tag: &str) -> NodeId {
		self.push(Data::Element {
			tag: tag.to_owned(),
			attributes: Vec::new(),
		})
	}

	/// Returns and clears the mutation log.
	pub fn take_log(&mut self) -> Vec<Mutation> {
		core::mem::take(&mut self.log)
	}

	#[must_use]
	pub fn log(&self) -> &[Mutation] {
		&self.log
	}

	fn node(&self, id: NodeId) -> &MemoryNode {
		&self.nodes[id.0]
	}

	fn node_mut(&mut self, id: NodeId) -> &mut MemoryNode {
		&mut self.nodes[id.0]
	}

	/// The handlers a `event` on `node` would call, outermost listener last.
	///
	/// Returned rather than called, so that they can run after any borrow of the host is released.
	#[must_use]
	pub fn handlers(&self, node: NodeId, event: &str) -> Vec<Handler> {
		self.node(node)
			.listeners
			.iter()
			.filter(|(e, _)| e == event)
			.map(|(_, listener)| listener.0.clone())
			.collect()
	}

	#[must_use]
	pub fn listener_count(&self, node: NodeId) -> usize {
		self.node(node).listeners.len()
	}

	/// Destroys `node` and its subtree behind the engine's back, as foreign code might.
	pub fn destroy(&mut self, node: NodeId) {
		if let Some(parent) = self.node(node).parent {
			self.node_mut(parent).children.retain(|c| *c != node);
		}
		self.node_mut(node).parent = None;
		let mut stack = vec![node];
		while let Some(id) = stack.pop() {
			let node = self.node_mut(id);
			node.alive = false;
			node.listeners.clear();
			stack.extend(node.children.iter().copied());
		}
		trace!(?node, "Destroyed host subtree.");
	}

	#[must_use]
	pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
		match &self.node(node).data {
			Data::Element { attributes, .. } => attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone()),
			Data::Text(_) => None,
		}
	}

	/// Number of nodes ever created, including destroyed ones.
	#[must_use]
	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	/// An HTML-like serialisation of `node`'s subtree.
	#[must_use]
	pub fn render(&self, node: NodeId) -> String {
		let mut html = String::new();
		self.render_into(node, &mut html);
		html
	}

	fn render_into(&self, node: NodeId, html: &mut String) {
		let node = self.node(node);
		match &node.data {
			Data::Text(text) => html.push_str(text),
			Data::Element { tag, attributes } => {
				html.push('<');
				html.push_str(tag);
				for (name, value) in attributes {
					let _ = write!(html, " {}={:?}", name, value);
				}
				html.push('>');
				for &child in &node.children {
					self.render_into(child, html);
				}
				let _ = write!(html, "</{}>", tag);
			}
		}
	}

	fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
		core::iter::successors(Some(node), |id| self.node(*id).parent).any(|id| id == ancestor)
	}

	fn detach(&mut self, node: NodeId) {
		if let Some(parent) = self.node_mut(node).parent.take() {
			self.node_mut(parent).children.retain(|c| *c != node);
		}
	}
}

impl Host for MemoryHost {
	type Node = NodeId;
	type Listener = MemoryListener;

	fn create_element(&mut self, tag: &str) -> Result<NodeId, HostError> {
		if tag.is_empty() || tag.chars().any(|c| c.is_whitespace() || c == '<' || c == '>') {
			return Err(HostError::new("create_element", format!("invalid tag name {:?}", tag)));
		}
		let node = self.push(Data::Element {
			tag: tag.to_owned(),
			attributes: Vec::new(),
		});
		self.log.push(Mutation::CreateElement { node, tag: tag.to_owned() });
		Ok(node)
	}

	fn create_text_node(&mut self, text: &str) -> NodeId {
		let node = self.push(Data::Text(text.to_owned()));
		self.log.push(Mutation::CreateText { node, text: text.to_owned() });
		node
	}

	fn tag_uid(&mut self, node: &NodeId, uid: Uid) {
		self.node_mut(*node).uid = Some(uid)
	}

	fn uid_of(&self, node: &NodeId) -> Option<Uid> {
		self.node(*node).uid
	}

	fn is_alive(&self, node: &NodeId) -> bool {
		self.node(*node).alive
	}

	fn tag_name(&self, node: &NodeId) -> Option<String> {
		match &self.node(*node).data {
			Data::Element { tag, .. } => Some(tag.clone()),
			Data::Text(_) => None,
		}
	}

	fn is_text(&self, node: &NodeId) -> bool {
		matches!(self.node(*node).data, Data::Text(_))
	}

	fn text_content(&self, node: &NodeId) -> String {
		match &self.node(*node).data {
			Data::Text(text) => text.clone(),
			Data::Element { .. } => self.node(*node).children.iter().map(|child| self.text_content(child)).collect(),
		}
	}

	fn set_text_content(&mut self, node: &NodeId, text: &str) {
		if let Data::Text(data) = &mut self.node_mut(*node).data {
			*data = text.to_owned();
		} else {
			// Same as the DOM: an element's children are replaced by a single text node.
			let children = core::mem::take(&mut self.node_mut(*node).children);
			for child in children {
				self.node_mut(child).parent = None;
			}
			let child = self.push(Data::Text(text.to_owned()));
			self.node_mut(child).parent = Some(*node);
			self.node_mut(*node).children.push(child);
		}
		self.log.push(Mutation::SetText { node: *node, text: text.to_owned() });
	}

	fn attributes(&self, node: &NodeId) -> Vec<(String, String)> {
		match &self.node(*node).data {
			Data::Element { attributes, .. } => attributes.clone(),
			Data::Text(_) => Vec::new(),
		}
	}

	fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) -> Result<(), HostError> {
		if name.is_empty() || name.chars().any(char::is_whitespace) {
			return Err(HostError::new("set_attribute", format!("invalid attribute name {:?}", name)));
		}
		let mutation = match &mut self.node_mut(*node).data {
			Data::Text(_) => return Err(HostError::new("set_attribute", "not an element")),
			Data::Element { attributes, .. } => match attributes.iter_mut().find(|(n, _)| n == name) {
				Some((_, existing)) => {
					*existing = value.to_owned();
					Mutation::AttributeUpdated {
						node: *node,
						name: name.to_owned(),
						value: value.to_owned(),
					}
				}
				None => {
					attributes.push((name.to_owned(), value.to_owned()));
					Mutation::AttributeAdded {
						node: *node,
						name: name.to_owned(),
						value: value.to_owned(),
					}
				}
			},
		};
		self.log.push(mutation);
		Ok(())
	}

	fn remove_attribute(&mut self, node: &NodeId, name: &str) -> Result<(), HostError> {
		let removed = match &mut self.node_mut(*node).data {
			Data::Text(_) => return Err(HostError::new("remove_attribute", "not an element")),
			Data::Element { attributes, .. } => {
				let before = attributes.len();
				attributes.retain(|(n, _)| n != name);
				attributes.len() != before
			}
		};
		if removed {
			self.log.push(Mutation::AttributeRemoved {
				node: *node,
				name: name.to_owned(),
			});
		}
		Ok(())
	}

	fn child_nodes(&self, parent: &NodeId) -> Vec<NodeId> {
		self.node(*parent).children.clone()
	}

	fn parent_node(&self, node: &NodeId) -> Option<NodeId> {
		self.node(*node).parent
	}

	fn first_child(&self, parent: &NodeId) -> Option<NodeId> {
		self.node(*parent).children.first().copied()
	}

	fn next_sibling(&self, node: &NodeId) -> Option<NodeId> {
		let parent = self.node(*node).parent?;
		let siblings = &self.node(parent).children;
		let index = siblings.iter().position(|c| c == node)?;
		siblings.get(index + 1).copied()
	}

	fn insert_before(&mut self, parent: &NodeId, child: &NodeId, reference: Option<&NodeId>) -> Result<(), HostError> {
		if reference == Some(child) {
			return Ok(());
		}
		if self.is_text(parent) {
			return Err(HostError::new("insert_before", "text nodes can't have children"));
		}
		if self.is_inclusive_ancestor(*child, *parent) {
			return Err(HostError::new("insert_before", "can't insert a node into its own subtree"));
		}
		if let Some(reference) = reference {
			if self.node(*reference).parent != Some(*parent) {
				return Err(HostError::new("insert_before", "the reference node is not a child of the parent"));
			}
		}
		self.detach(*child);
		let index = match reference {
			Some(reference) => self.node(*parent).children.iter().position(|c| c == reference).unwrap_or(0),
			None => self.node(*parent).children.len(),
		};
		self.node_mut(*parent).children.insert(index, *child);
		self.node_mut(*child).parent = Some(*parent);
		self.log.push(Mutation::Insert {
			parent: *parent,
			node: *child,
			before: reference.copied(),
		});
		Ok(())
	}

	fn remove_child(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), HostError> {
		if self.node(*child).parent != Some(*parent) {
			return Err(HostError::new("remove_child", "not a child of this parent"));
		}
		self.detach(*child);
		self.log.push(Mutation::Remove { parent: *parent, node: *child });
		Ok(())
	}

	fn create_listener(&mut self, handler: Handler) -> MemoryListener {
		MemoryListener(handler)
	}

	fn add_event_listener(&mut self, node: &NodeId, event: &str, listener: &MemoryListener) -> Result<(), HostError> {
		let listeners = &mut self.node_mut(*node).listeners;
		if listeners.iter().any(|(e, l)| e == event && l == listener) {
			return Ok(());
		}
		listeners.push((event.to_owned(), listener.clone()));
		self.log.push(Mutation::ListenerAdded {
			node: *node,
			event: event.to_owned(),
		});
		Ok(())
	}

	fn remove_event_listener(&mut self, node: &NodeId, event: &str, listener: &MemoryListener) -> Result<(), HostError> {
		let listeners = &mut self.node_mut(*node).listeners;
		let before = listeners.len();
		listeners.retain(|(e, l)| !(e == event && l == listener));
		if listeners.len() != before {
			self.log.push(Mutation::ListenerRemoved {
				node: *node,
				event: event.to_owned(),
			});
		}
		Ok(())
	}
}
