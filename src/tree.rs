//! The virtual tree: an arena of [`VNode`]s indexed by [`Uid`].
//!
//! Ownership flows strictly from parent to child through [`VNode::children`].
//! [`VNode::parent`] is a plain back-index used for ancestor walks.

use crate::{
	binder::Behavior,
	content::ContentBinder,
	context::DataContext,
	error::{Error, Result},
};
use core::fmt::{self, Debug, Display, Formatter};
use hashbrown::HashMap;
use std::rc::{Rc, Weak};
use tracing::trace;

/// A virtual node's identity. Never reused by the engine that handed it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(u64);
impl Uid {
	#[must_use]
	pub fn get(self) -> u64 {
		self.0
	}

	pub(crate) fn from_raw(raw: u64) -> Self {
		Self(raw)
	}
}
impl Display for Uid {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Binds a host event to a handler registered by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventBinding {
	pub event: String,
	pub handler: String,
}
impl EventBinding {
	pub fn new(event: impl Into<String>, handler: impl Into<String>) -> Self {
		Self { event: event.into(), handler: handler.into() }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
	Element,
	Text,
	/// Neither tag nor content: transparent to the host tree.
	Abstract,
}

pub struct VNode {
	uid: Uid,
	tag: Option<String>,
	content: Option<ContentBinder>,
	attributes: Vec<(String, String)>,
	events: Vec<EventBinding>,
	children: Vec<Uid>,
	parent: Option<Uid>,
	version: u64,
	/// Set on every ancestor of a node whose version changed, until a pass walks through it.
	dirty_below: bool,
	context: Option<Weak<dyn DataContext>>,
	behavior: Option<Rc<dyn Behavior>>,
}
impl VNode {
	#[must_use]
	pub fn uid(&self) -> Uid {
		self.uid
	}

	#[must_use]
	pub fn tag(&self) -> Option<&str> {
		self.tag.as_deref()
	}

	#[must_use]
	pub fn content(&self) -> Option<&ContentBinder> {
		self.content.as_ref()
	}

	pub(crate) fn content_mut(&mut self) -> Option<&mut ContentBinder> {
		self.content.as_mut()
	}

	#[must_use]
	pub fn kind(&self) -> Kind {
		match (&self.tag, &self.content) {
			(Some(_), _) => Kind::Element,
			(None, Some(_)) => Kind::Text,
			(None, None) => Kind::Abstract,
		}
	}

	#[must_use]
	pub fn attributes(&self) -> &[(String, String)] {
		&self.attributes
	}

	#[must_use]
	pub fn events(&self) -> &[EventBinding] {
		&self.events
	}

	#[must_use]
	pub fn children(&self) -> &[Uid] {
		&self.children
	}

	#[must_use]
	pub fn parent(&self) -> Option<Uid> {
		self.parent
	}

	#[must_use]
	pub fn version(&self) -> u64 {
		self.version
	}

	#[must_use]
	pub fn is_dirty_below(&self) -> bool {
		self.dirty_below
	}

	#[must_use]
	pub fn behavior(&self) -> Option<&Rc<dyn Behavior>> {
		self.behavior.as_ref()
	}

	pub(crate) fn set_behavior(&mut self, behavior: Rc<dyn Behavior>) {
		self.behavior = Some(behavior)
	}

	#[must_use]
	pub fn own_context(&self) -> Option<Rc<dyn DataContext>> {
		self.context.as_ref().and_then(Weak::upgrade)
	}
}
impl Debug for VNode {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("VNode")
			.field("uid", &self.uid)
			.field("tag", &self.tag)
			.field("content", &self.content)
			.field("attributes", &self.attributes.len())
			.field("events", &self.events)
			.field("children", &self.children)
			.field("parent", &self.parent)
			.field("version", &self.version)
			.finish()
	}
}

/// A declarative description of a subtree, turned into [`VNode`]s by [`Engine::create`](`crate::Engine::create`).
#[derive(Default, Clone)]
pub struct Decl {
	tag: Option<String>,
	content: Option<String>,
	attributes: Vec<(String, String)>,
	events: Vec<EventBinding>,
	children: Vec<Decl>,
	context: Option<Rc<dyn DataContext>>,
}
impl Decl {
	#[must_use]
	pub fn element(tag: impl Into<String>) -> Self {
		Self { tag: Some(tag.into()), ..Self::default() }
	}

	#[must_use]
	pub fn text(content: impl Into<String>) -> Self {
		Self { content: Some(content.into()), ..Self::default() }
	}

	/// A tag-less, content-less grouping node.
	#[must_use]
	pub fn fragment() -> Self {
		Self::default()
	}

	/// Sets text content. Combined with a tag, this fails on creation with [`Error::StructuralConflict`].
	#[must_use]
	pub fn content(mut self, content: impl Into<String>) -> Self {
		self.content = Some(content.into());
		self
	}

	#[must_use]
	pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		upsert(&mut self.attributes, name.into(), value.into());
		self
	}

	#[must_use]
	pub fn on(mut self, event: impl Into<String>, handler: impl Into<String>) -> Self {
		let binding = EventBinding::new(event, handler);
		if !self.events.contains(&binding) {
			self.events.push(binding)
		}
		self
	}

	#[must_use]
	pub fn child(mut self, child: Decl) -> Self {
		self.children.push(child);
		self
	}

	#[must_use]
	pub fn children(mut self, children: impl IntoIterator<Item = Decl>) -> Self {
		self.children.extend(children);
		self
	}

	/// The data context for this node and, unless they bring their own, its descendants.
	#[must_use]
	pub fn context(mut self, context: Rc<dyn DataContext>) -> Self {
		self.context = Some(context);
		self
	}

	/// Iterative, so that arbitrarily deep declarations can't exhaust the stack.
	fn validate(&self) -> Result<()> {
		let mut stack = vec![self];
		while let Some(decl) = stack.pop() {
			if decl.tag.is_some() && decl.content.is_some() {
				return Err(Error::conflict(None, "a node can't have both a tag and text content"));
			}
			if decl.content.is_some() && !decl.children.is_empty() {
				return Err(Error::conflict(None, "text nodes can't have children"));
			}
			stack.extend(&decl.children);
		}
		Ok(())
	}
}
impl Debug for Decl {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Decl")
			.field("tag", &self.tag)
			.field("content", &self.content.as_ref().map(|_| ".."))
			.field("attributes", &self.attributes.len())
			.field("events", &self.events)
			.field("children", &self.children)
			.finish()
	}
}

fn upsert(attributes: &mut Vec<(String, String)>, name: String, value: String) -> bool {
	match attributes.iter_mut().find(|(n, _)| *n == name) {
		Some((_, existing)) if *existing == value => false,
		Some((_, existing)) => {
			*existing = value;
			true
		}
		None => {
			attributes.push((name, value));
			true
		}
	}
}

/// Concrete descendants of a node's child spines, with abstract nodes pulled out of the way.
#[derive(Debug, Default)]
pub(crate) struct Flattened {
	/// `(node, virtual parent)`, in virtual order.
	pub(crate) concrete: Vec<(Uid, Uid)>,
	/// `(node, virtual parent)` for every abstract node crossed on the way, pre-order.
	pub(crate) abstracts: Vec<(Uid, Uid)>,
}

pub struct Tree {
	nodes: HashMap<Uid, VNode>,
	next_uid: u64,
	root: Uid,
}
impl Tree {
	pub(crate) fn new() -> Self {
		let mut tree = Self { nodes: HashMap::new(), next_uid: 0, root: Uid(0) };
		tree.root = tree.allocate(None, None);
		tree
	}

	/// The synthetic root, which stands in for the host node the engine was attached to.
	#[must_use]
	pub fn root(&self) -> Uid {
		self.root
	}

	fn allocate(&mut self, tag: Option<String>, content: Option<ContentBinder>) -> Uid {
		let uid = Uid(self.next_uid);
		self.next_uid += 1;
		self.nodes.insert(
			uid,
			VNode {
				uid,
				tag,
				content,
				attributes: Vec::new(),
				events: Vec::new(),
				children: Vec::new(),
				parent: None,
				version: 0,
				dirty_below: false,
				context: None,
				behavior: None,
			},
		);
		uid
	}

	pub fn get(&self, uid: Uid) -> Result<&VNode> {
		self.nodes.get(&uid).ok_or(Error::UseAfterRelease { uid })
	}

	pub(crate) fn get_mut(&mut self, uid: Uid) -> Result<&mut VNode> {
		self.nodes.get_mut(&uid).ok_or(Error::UseAfterRelease { uid })
	}

	#[must_use]
	pub fn contains(&self, uid: Uid) -> bool {
		self.nodes.contains_key(&uid)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Creates a detached subtree.
	pub fn create(&mut self, decl: Decl) -> Result<Uid> {
		decl.validate()?;
		Ok(self.create_validated(decl))
	}

	fn create_validated(&mut self, decl: Decl) -> Uid {
		let (top, children) = self.create_node(decl, None);
		let mut stack: Vec<(Decl, Uid)> = children.into_iter().rev().map(|child| (child, top)).collect();
		while let Some((decl, parent)) = stack.pop() {
			let (uid, children) = self.create_node(decl, Some(parent));
			stack.extend(children.into_iter().rev().map(|child| (child, uid)));
		}
		top
	}

	/// Allocates one node and appends it to `parent`. Returns the declarations of its children, which are still to be created.
	fn create_node(&mut self, decl: Decl, parent: Option<Uid>) -> (Uid, Vec<Decl>) {
		let Decl { tag, content, attributes, events, children, context } = decl;
		let uid = self.allocate(tag, content.map(ContentBinder::new));
		if let Some(node) = self.nodes.get_mut(&uid) {
			node.attributes = attributes;
			node.events = events;
			node.parent = parent;
			node.context = context.as_ref().map(Rc::downgrade);
		}
		if let Some(node) = parent.and_then(|parent| self.nodes.get_mut(&parent)) {
			node.children.push(uid)
		}
		trace!(%uid, "Created node.");
		(uid, children)
	}

	/// Bumps `uid`'s version and flags its ancestors.
	pub(crate) fn mark_dirty(&mut self, uid: Uid) -> Result<()> {
		let node = self.get_mut(uid)?;
		node.version += 1;
		let mut next = node.parent;
		while let Some(ancestor) = next.and_then(|parent| self.nodes.get_mut(&parent)) {
			if ancestor.dirty_below {
				break;
			}
			ancestor.dirty_below = true;
			next = ancestor.parent;
		}
		Ok(())
	}

	pub(crate) fn clear_dirty_below(&mut self, uid: Uid) {
		if let Some(node) = self.nodes.get_mut(&uid) {
			node.dirty_below = false
		}
	}

	/// `uid` followed by its ancestors, nearest first.
	pub fn ancestors(&self, uid: Uid) -> impl Iterator<Item = Uid> + '_ {
		core::iter::successors(Some(uid).filter(|uid| self.contains(*uid)), move |uid| self.nodes.get(uid).and_then(|node| node.parent))
	}

	#[must_use]
	pub fn is_ancestor_or_self(&self, ancestor: Uid, uid: Uid) -> bool {
		self.ancestors(uid).any(|a| a == ancestor)
	}

	/// The lowest common ancestor, if both nodes share a tree.
	#[must_use]
	pub fn lowest_common_ancestor(&self, a: Uid, b: Uid) -> Option<Uid> {
		let a_chain: hashbrown::HashSet<Uid> = self.ancestors(a).collect();
		self.ancestors(b).find(|uid| a_chain.contains(uid))
	}

	/// The nearest data context on the ancestor chain, including `uid` itself.
	#[must_use]
	pub fn context_for(&self, uid: Uid) -> Option<Rc<dyn DataContext>> {
		self.ancestors(uid).find_map(|uid| self.nodes.get(&uid).and_then(VNode::own_context))
	}

	pub(crate) fn flatten_children(&self, uid: Uid) -> Flattened {
		let mut flattened = Flattened::default();
		// `(node, index of its next child)`, innermost fragment last.
		let mut stack = vec![(uid, 0)];
		while let Some((parent, index)) = stack.pop() {
			let child = match self.nodes.get(&parent).and_then(|node| node.children.get(index)) {
				Some(&child) => child,
				None => continue,
			};
			stack.push((parent, index + 1));
			match self.nodes.get(&child).map(VNode::kind) {
				Some(Kind::Abstract) => {
					flattened.abstracts.push((child, parent));
					stack.push((child, 0));
				}
				Some(_) => flattened.concrete.push((child, parent)),
				None => (),
			}
		}
		flattened
	}

	/// Takes `child` away from its current parent, if any. Returns that former parent.
	fn detach(&mut self, child: Uid) -> Result<Option<Uid>> {
		let parent = match self.get_mut(child)?.parent.take() {
			Some(parent) => parent,
			None => return Ok(None),
		};
		self.get_mut(parent)?.children.retain(|c| *c != child);
		self.mark_dirty(parent)?;
		Ok(Some(parent))
	}

	fn check_adoptable(&self, parent: Uid, children: &[Uid]) -> Result<()> {
		let parent_node = self.get(parent)?;
		if parent_node.content.is_some() && !children.is_empty() {
			return Err(Error::conflict(parent, "text nodes can't have children"));
		}
		for (i, &child) in children.iter().enumerate() {
			self.get(child)?;
			if child == self.root {
				return Err(Error::conflict(child, "the root can't be attached anywhere"));
			}
			if self.is_ancestor_or_self(child, parent) {
				return Err(Error::conflict(child, "a node can't be attached below itself"));
			}
			if children[..i].contains(&child) {
				return Err(Error::conflict(child, "a node can't appear twice in one child list"));
			}
		}
		Ok(())
	}

	/// Replaces `parent`'s child list. Returns every node whose child list changed.
	pub(crate) fn set_children(&mut self, parent: Uid, children: Vec<Uid>) -> Result<Vec<Uid>> {
		self.check_adoptable(parent, &children)?;
		let mut touched = vec![parent];
		let previous = core::mem::take(&mut self.get_mut(parent)?.children);
		for orphan in previous {
			if !children.contains(&orphan) {
				self.get_mut(orphan)?.parent = None;
			}
		}
		let mut adopted = Vec::new();
		for &child in &children {
			let current_parent = self.get(child)?.parent;
			if current_parent != Some(parent) {
				adopted.push((child, self.context_for(child)));
				if let Some(former) = self.detach(child)? {
					touched.push(former)
				}
			}
			self.get_mut(child)?.parent = Some(parent);
		}
		self.get_mut(parent)?.children = children;
		self.mark_dirty(parent)?;
		self.invalidate_moved_text(adopted)?;
		Ok(touched)
	}

	/// Appends to `parent`'s child list. Returns every node whose child list changed.
	pub(crate) fn push_children(&mut self, parent: Uid, additions: Vec<Uid>) -> Result<Vec<Uid>> {
		self.check_adoptable(parent, &additions)?;
		let mut touched = vec![parent];
		let mut adopted = Vec::with_capacity(additions.len());
		for &child in &additions {
			adopted.push((child, self.context_for(child)));
			if let Some(former) = self.detach(child)? {
				if former != parent {
					touched.push(former)
				}
			}
			self.get_mut(child)?.parent = Some(parent);
		}
		self.get_mut(parent)?.children.extend(additions);
		self.mark_dirty(parent)?;
		self.invalidate_moved_text(adopted)?;
		Ok(touched)
	}

	pub(crate) fn set_content(&mut self, uid: Uid, template: String) -> Result<bool> {
		let node = self.get_mut(uid)?;
		if node.tag.is_some() {
			return Err(Error::conflict(uid, "an element can't have text content"));
		}
		if !node.children.is_empty() {
			return Err(Error::conflict(uid, "a node with children can't become a text node"));
		}
		match &mut node.content {
			Some(content) if content.template() == template => return Ok(false),
			Some(content) => content.set(template),
			None => node.content = Some(ContentBinder::new(template)),
		}
		self.mark_dirty(uid)?;
		Ok(true)
	}

	pub(crate) fn clear_content(&mut self, uid: Uid) -> Result<bool> {
		if self.get_mut(uid)?.content.take().is_none() {
			return Ok(false);
		}
		self.mark_dirty(uid)?;
		Ok(true)
	}

	pub(crate) fn set_tag(&mut self, uid: Uid, tag: Option<String>) -> Result<bool> {
		if uid == self.root {
			return Err(Error::conflict(uid, "the root's tag is fixed by its host node"));
		}
		let node = self.get_mut(uid)?;
		if tag.is_some() && node.content.is_some() {
			return Err(Error::conflict(uid, "a text node can't have a tag"));
		}
		if node.tag == tag {
			return Ok(false);
		}
		node.tag = tag;
		node.behavior = None;
		self.mark_dirty(uid)?;
		Ok(true)
	}

	pub(crate) fn set_attributes(&mut self, uid: Uid, attributes: Vec<(String, String)>) -> Result<bool> {
		let mut deduplicated = Vec::with_capacity(attributes.len());
		for (name, value) in attributes {
			upsert(&mut deduplicated, name, value);
		}
		let node = self.get_mut(uid)?;
		if node.attributes == deduplicated {
			return Ok(false);
		}
		node.attributes = deduplicated;
		self.mark_dirty(uid)?;
		Ok(true)
	}

	pub(crate) fn push_attributes(&mut self, uid: Uid, attributes: Vec<(String, String)>) -> Result<bool> {
		let node = self.get_mut(uid)?;
		let mut changed = false;
		for (name, value) in attributes {
			changed |= upsert(&mut node.attributes, name, value);
		}
		if changed {
			self.mark_dirty(uid)?;
		}
		Ok(changed)
	}

	pub(crate) fn set_events(&mut self, uid: Uid, events: Vec<EventBinding>) -> Result<bool> {
		let node = self.get_mut(uid)?;
		let mut deduplicated: Vec<EventBinding> = Vec::with_capacity(events.len());
		for event in events {
			if !deduplicated.contains(&event) {
				deduplicated.push(event)
			}
		}
		if node.events == deduplicated {
			return Ok(false);
		}
		node.events = deduplicated;
		self.mark_dirty(uid)?;
		Ok(true)
	}

	pub(crate) fn set_context(&mut self, uid: Uid, context: &Rc<dyn DataContext>) -> Result<()> {
		self.get_mut(uid)?.context = Some(Rc::downgrade(context));
		self.invalidate_text_below(uid)
	}

	/// Marks every text node in the subtree dirty, for when the data they resolve against changes wholesale.
	fn invalidate_text_below(&mut self, uid: Uid) -> Result<()> {
		let mut stack = vec![uid];
		while let Some(uid) = stack.pop() {
			let node = self.get(uid)?;
			stack.extend_from_slice(&node.children);
			if node.content.is_some() {
				self.mark_dirty(uid)?;
			}
		}
		Ok(())
	}

	/// Re-resolves text below adopted nodes whose inherited data context changed with the move.
	fn invalidate_moved_text(&mut self, adopted: Vec<(Uid, Option<Rc<dyn DataContext>>)>) -> Result<()> {
		for (child, before) in adopted {
			let after = self.context_for(child);
			let same = match (&before, &after) {
				(Some(before), Some(after)) => Rc::as_ptr(before).cast::<()>() == Rc::as_ptr(after).cast::<()>(),
				(None, None) => true,
				_ => false,
			};
			if !same {
				trace!(%child, "Data context changed with the move.");
				self.invalidate_text_below(child)?;
			}
		}
		Ok(())
	}

	/// Destroys the subtree below and including `uid`. Returns its former parent.
	pub(crate) fn release(&mut self, uid: Uid) -> Result<Option<Uid>> {
		if uid == self.root {
			return Err(Error::conflict(uid, "the root can't be released"));
		}
		let parent = self.detach(uid)?;
		let mut stack = vec![uid];
		while let Some(uid) = stack.pop() {
			if let Some(node) = self.nodes.remove(&uid) {
				stack.extend(node.children);
			}
		}
		trace!(%uid, "Released subtree.");
		Ok(parent)
	}

	/// Nodes in the subtree whose behavior declares `capability`, in pre-order.
	#[must_use]
	pub fn find_capability(&self, from: Uid, capability: crate::binder::Capability) -> Vec<Uid> {
		let mut found = Vec::new();
		let mut stack = vec![from];
		while let Some(uid) = stack.pop() {
			if let Some(node) = self.nodes.get(&uid) {
				if node.behavior.as_ref().map(|b| b.capability()) == Some(capability) {
					found.push(uid)
				}
				stack.extend(node.children.iter().rev());
			}
		}
		found
	}
}
