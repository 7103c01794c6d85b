//! The diff/patch pass that brings a host subtree in line with its virtual counterpart.

use crate::{
	binder::{Behavior, Registry, Resolution},
	config::Config,
	error::{Error, Result},
	host::Host,
	identity::{Entry, IdentityMap},
	listeners::ListenerTable,
	load::{self, Shape},
	scheduler::PassReport,
	temp_set::TempSet,
	tree::{EventBinding, Kind, Tree, Uid},
};
use hashbrown::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{debug, error, info, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

/// Marks a node dirty and requests a sync for it, from outside the pass.
pub(crate) type Invalidate = Rc<dyn Fn(Uid)>;

/// A behavior notification, delivered once the pass has released the engine.
pub(crate) enum Hook {
	Mounted(Rc<dyn Behavior>, Uid),
	Unmounting(Rc<dyn Behavior>, Uid),
}
impl Hook {
	pub(crate) fn dispatch(self) {
		match self {
			Hook::Mounted(behavior, uid) => behavior.mounted(uid),
			Hook::Unmounting(behavior, uid) => behavior.unmounting(uid),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unmount {
	/// Take the host node out of its host parent.
	Detach,
	/// Leave the host node where it is. An ancestor's host node is being detached.
	InPlace,
	/// The host node is already gone. Don't call into the host at all.
	Forget,
}

/// The state of one pass.
struct Pass<'a> {
	tree: &'a mut Tree,
	invalidate: &'a Invalidate,
	report: PassReport,
	hooks: Vec<Hook>,
	/// Nodes taken out of their old host parent because they moved, waiting to be reinserted by an inclusion.
	parked: Vec<Uid>,
}

/// How an element's declared attributes and events resolved.
#[derive(Default)]
struct Resolved {
	literal: Vec<(String, String)>,
	omitted: Vec<String>,
	listeners: Vec<EventBinding>,
}

/// Resolves `uid`'s text content and subscribes it to every key it reads.
pub(crate) fn resolve_text(tree: &mut Tree, uid: Uid, invalidate: &Invalidate) -> Result<String> {
	let context = tree.context_for(uid);
	let binder = match tree.get_mut(uid)?.content_mut() {
		Some(binder) => binder,
		None => return Ok(String::new()),
	};
	let text = binder.get(context.as_deref());
	if let Some(context) = &context {
		let invalidate = invalidate.clone();
		let on_change: Rc<dyn Fn()> = Rc::new(move || invalidate(uid));
		binder.bind(context, &on_change);
	}
	Ok(text)
}

/// Owns the host and the identity map. Nothing else writes to either.
pub struct Reconciler<H: Host> {
	host: H,
	root: Uid,
	map: IdentityMap<H::Node>,
	listeners: ListenerTable<H::Listener>,
	registry: Registry,
	config: Config,
	host_uids: TempSet<Uid>,
	virtual_uids: TempSet<Uid>,
}
impl<H: Host> Reconciler<H> {
	pub(crate) fn new(mut host: H, root_node: H::Node, root: Uid, config: Config) -> Self {
		host.tag_uid(&root_node, root);
		let mut map = IdentityMap::default();
		map.insert(root, Entry::new(Some(root_node), Some(0), None));
		Self {
			host,
			root,
			map,
			listeners: ListenerTable::default(),
			registry: Registry::default(),
			config,
			host_uids: TempSet::new(),
			virtual_uids: TempSet::new(),
		}
	}

	#[must_use]
	pub fn host(&self) -> &H {
		&self.host
	}

	pub fn host_mut(&mut self) -> &mut H {
		&mut self.host
	}

	#[must_use]
	pub fn identity_map(&self) -> &IdentityMap<H::Node> {
		&self.map
	}

	#[must_use]
	pub fn listeners(&self) -> &ListenerTable<H::Listener> {
		&self.listeners
	}

	pub(crate) fn registry_mut(&mut self) -> &mut Registry {
		&mut self.registry
	}

	/// Runs one pass from the nearest suitable mounted ancestor of `target`.
	///
	/// Hooks are returned even on failure, since mutations applied before it aren't rolled back.
	#[instrument(skip(self, tree, invalidate))]
	pub(crate) fn reconcile(&mut self, tree: &mut Tree, target: Uid, invalidate: &Invalidate) -> (Result<PassReport>, Vec<Hook>) {
		let mut pass = Pass {
			tree,
			invalidate,
			report: PassReport::default(),
			hooks: Vec::new(),
			parked: Vec::new(),
		};
		let result = self.run(&mut pass, target);
		self.unpark(&mut pass);

		let freed = self.listeners.collect();
		trace!("Freed {} event listener(s).", freed);
		info!("Event listener count/cached capacity: {}/{}", self.listeners.len(), self.listeners.capacity());
		if STATIC_MAX_LEVEL >= Level::WARN && self.listeners.capacity() >= self.config.listener_capacity_warning {
			warn!(
				"The shared listener table is large ({}).\n\
				This may point to many distinct handler names being bound and unbound.",
				self.listeners.capacity()
			)
		}

		match &result {
			Ok(()) => debug!(report = ?pass.report, "Pass finished."),
			Err(error) => error!(%error, report = ?pass.report, "Pass failed."),
		}
		let Pass { report, hooks, .. } = pass;
		(result.map(|()| report), hooks)
	}

	fn run(&mut self, pass: &mut Pass<'_>, target: Uid) -> Result<()> {
		let anchor = match self.resolve_anchor(pass, target)? {
			Some(anchor) => anchor,
			None => return Ok(()),
		};
		pass.report.target = Some(anchor);
		let host_node = match self.map.host(anchor) {
			Some(host_node) => host_node.clone(),
			None => return Ok(()),
		};
		self.compare(pass, anchor, &host_node, 0)
	}

	/// Finds the nearest mounted ancestor-or-self of `target` that is itself unchanged since the last pass.
	///
	/// Changed nodes are compared from their parent, so that tag and kind transitions can be handled as replacements.
	fn resolve_anchor(&mut self, pass: &mut Pass<'_>, target: Uid) -> Result<Option<Uid>> {
		match self.nearest_mounted(pass.tree, target) {
			Err(Error::StaleHostReference { uid }) => {
				self.purge(pass, uid);
				Err(Error::StaleHostReference { uid })
			}
			result => result,
		}
	}

	fn nearest_mounted(&self, tree: &Tree, target: Uid) -> Result<Option<Uid>> {
		if !tree.contains(target) {
			debug!(%target, "Sync target was released.");
			return Ok(None);
		}
		let chain = tree.ancestors(target).collect::<Vec<_>>();
		if chain.last() != Some(&self.root) {
			let error = Error::InvalidSyncTarget { uid: target };
			debug!(%error, "Skipping sync.");
			return Ok(None);
		}
		for uid in chain {
			let host_node = match self.map.host(uid) {
				Some(host_node) => host_node,
				None => continue,
			};
			if !self.host.is_alive(host_node) {
				error!(%uid, "Identity map entry references a destroyed host node.");
				return Err(Error::StaleHostReference { uid });
			}
			let changed = Some(tree.get(uid)?.version()) != self.map.version(uid);
			if changed && uid != self.root {
				continue;
			}
			return Ok(Some(uid));
		}
		Ok(None)
	}

	/// The [`Error::InvalidSyncTarget`]-or-anchor query without side effects.
	pub(crate) fn mounted_ancestor(&self, tree: &Tree, target: Uid) -> Result<Uid> {
		tree.get(target)?;
		match self.nearest_mounted(tree, target)? {
			Some(anchor) => Ok(anchor),
			None => Err(Error::InvalidSyncTarget { uid: target }),
		}
	}

	/// Drops the identity map entries of a subtree whose host node was destroyed externally, so the next pass remounts it.
	fn purge(&mut self, pass: &mut Pass<'_>, uid: Uid) {
		if uid == self.root {
			error!("The root host node was destroyed. Nothing can be mounted anymore.");
			return;
		}
		let mount_parent = self.map.get(uid).and_then(|entry| entry.mount_parent);
		if let Err(error) = self.unmount(pass, uid, Unmount::Forget, None) {
			error!(%error, "Failed to purge stale subtree.");
		}
		if let Some(parent) = mount_parent {
			// Forces the parent's children to be reconciled again.
			let _ = pass.tree.mark_dirty(parent);
		}
	}

	fn check_depth(&self, uid: Uid, depth: usize) -> Result<()> {
		if depth > self.config.depth_limit {
			error!("Depth limit reached");
			return Err(Error::DepthLimitExceeded { uid, limit: self.config.depth_limit });
		}
		Ok(())
	}

	fn effective_tag(tree: &Tree, uid: Uid) -> Result<Option<String>> {
		let node = tree.get(uid)?;
		Ok(node
			.behavior()
			.and_then(|behavior| behavior.host_tag().map(str::to_owned))
			.or_else(|| node.tag().map(str::to_owned)))
	}

	/// Whether `host_node` can be patched in place to represent `uid`.
	fn matches_host(&self, tree: &Tree, uid: Uid, host_node: &H::Node) -> Result<bool> {
		Ok(match tree.get(uid)?.kind() {
			Kind::Element => {
				let wanted = Self::effective_tag(tree, uid)?.unwrap_or_default();
				match self.host.tag_name(host_node) {
					Some(found) if self.config.tags_match(&found, &wanted) => true,
					Some(found) => {
						if STATIC_MAX_LEVEL >= Level::WARN && found.eq_ignore_ascii_case(&wanted) {
							warn!(
								"Recreating element due to different tag name casing: {:?} -> {:?}\n\
								Enable `Config::case_insensitive_tags` if the host normalises tag names.",
								found, wanted
							)
						}
						false
					}
					None => false,
				}
			}
			Kind::Text => self.host.is_text(host_node),
			Kind::Abstract => false,
		})
	}

	#[instrument(skip(self, pass, host_node))]
	fn compare(&mut self, pass: &mut Pass<'_>, uid: Uid, host_node: &H::Node, depth: usize) -> Result<()> {
		self.check_depth(uid, depth)?;
		let (version, dirty_below, kind) = {
			let node = pass.tree.get(uid)?;
			(node.version(), node.is_dirty_below(), node.kind())
		};
		let self_dirty = self.map.version(uid) != Some(version);
		if !self_dirty && !dirty_below {
			trace!("Unchanged.");
			pass.report.skipped += 1;
			return Ok(());
		}

		if uid == self.root {
			let span = trace_span!("Diffing root children");
			let _enter = span.enter();
			self.sync_children(pass, uid, host_node, depth + 1)?;
			self.finish(pass, uid, version);
			return Ok(());
		}

		if self_dirty && !self.matches_host(pass.tree, uid, host_node)? {
			return self.replace(pass, uid, host_node, depth);
		}

		match kind {
			Kind::Text => {
				let span = trace_span!("Diffing text node");
				let _enter = span.enter();
				if self_dirty {
					self.patch_text(pass, uid, host_node)?;
				}
			}
			Kind::Element => {
				let span = trace_span!("Diffing element");
				let _enter = span.enter();
				if self_dirty {
					let resolved = self.resolve_element(pass.tree, uid)?;
					self.patch_attributes(host_node, &resolved)?;
					self.patch_listeners(uid, host_node, resolved.listeners)?;
				}
			}
			Kind::Abstract => (),
		}
		if self_dirty {
			pass.report.patched += 1;
		}

		if kind == Kind::Element {
			self.sync_children(pass, uid, host_node, depth + 1)?;
		}
		self.finish(pass, uid, version);
		Ok(())
	}

	fn finish(&mut self, pass: &mut Pass<'_>, uid: Uid, version: u64) {
		if let Some(entry) = self.map.get_mut(uid) {
			entry.version = Some(version);
		}
		pass.tree.clear_dirty_below(uid);
	}

	/// Structural replace: the node changed kind or tag under the same uid.
	fn replace(&mut self, pass: &mut Pass<'_>, uid: Uid, host_node: &H::Node, depth: usize) -> Result<()> {
		let span = trace_span!("Replacing mismatching host node");
		let _enter = span.enter();
		let host_parent = match self.host.parent_node(host_node) {
			Some(host_parent) => host_parent,
			None => {
				error!("Host node to replace has no parent. Forgetting it.");
				return self.unmount(pass, uid, Unmount::Forget, None);
			}
		};
		let reference = self.host.next_sibling(host_node);
		let mount_parent = self.map.get(uid).and_then(|entry| entry.mount_parent).unwrap_or(self.root);
		self.unmount(pass, uid, Unmount::Detach, Some(&host_parent))?;
		self.mount(pass, uid, mount_parent, &host_parent, reference.as_ref(), depth)
	}

	fn patch_text(&mut self, pass: &mut Pass<'_>, uid: Uid, host_node: &H::Node) -> Result<()> {
		let text = resolve_text(pass.tree, uid, pass.invalidate)?;
		let current = self.host.text_content(host_node);
		if current != text {
			if cfg!(feature = "dangerous-logging") {
				trace!(from = ?current, to = ?text, "Updating text.");
			}
			self.host.set_text_content(host_node, &text)
		}
		Ok(())
	}

	/// Runs attribute resolvers and checks that every event binding has a handler, before anything touches the host.
	fn resolve_element(&self, tree: &Tree, uid: Uid) -> Result<Resolved> {
		let node = tree.get(uid)?;
		let mut resolved = Resolved::default();
		for (name, value) in node.attributes() {
			match self.registry.resolve_attribute(uid, name, value) {
				Resolution::Literal(value) => resolved.literal.push((name.clone(), value)),
				Resolution::Listener { event, handler } => resolved.listeners.push(EventBinding { event, handler }),
				Resolution::Omit => resolved.omitted.push(name.clone()),
			}
		}
		resolved.listeners.extend(node.events().iter().cloned());
		for binding in &resolved.listeners {
			if self.registry.handler(&binding.handler).is_none() {
				error!(%uid, event = %binding.event, handler = %binding.handler, "Unresolvable event handler.");
				return Err(Error::ListenerResolutionFailure {
					uid,
					event: binding.event.clone(),
					handler: binding.handler.clone(),
				});
			}
		}
		Ok(resolved)
	}

	/// Removals and updates first, then additions.
	#[allow(clippy::similar_names)]
	fn patch_attributes(&mut self, host_node: &H::Node, resolved: &Resolved) -> Result<()> {
		let live = self.host.attributes(host_node);
		for (name, value) in &live {
			match resolved.literal.iter().find(|(n, _)| n == name) {
				None if resolved.omitted.contains(name) => (),
				None => {
					trace!(name = %name, "Removing attribute.");
					self.host.remove_attribute(host_node, name)?
				}
				Some((_, wanted)) if wanted != value => {
					if cfg!(feature = "dangerous-logging") {
						trace!(name = %name, from = %value, to = %wanted, "Updating attribute.");
					}
					self.host.set_attribute(host_node, name, wanted)?
				}
				Some(_) => (),
			}
		}
		for (name, value) in &resolved.literal {
			if !live.iter().any(|(n, _)| n == name) {
				trace!(name = %name, "Adding attribute.");
				self.host.set_attribute(host_node, name, value)?
			}
		}
		Ok(())
	}

	fn patch_listeners(&mut self, uid: Uid, host_node: &H::Node, wanted: Vec<EventBinding>) -> Result<()> {
		let current = match self.map.get(uid) {
			Some(entry) => entry.listeners.clone(),
			None => Vec::new(),
		};
		if current == wanted {
			return Ok(());
		}
		for binding in &current {
			if !wanted.contains(binding) {
				self.listeners.unbind(&mut self.host, host_node, &binding.event, &binding.handler);
			}
		}
		let mut bound = current.iter().filter(|b| wanted.contains(b)).cloned().collect::<Vec<_>>();
		for binding in wanted {
			if current.contains(&binding) {
				continue;
			}
			let handler = match self.registry.handler(&binding.handler) {
				Some(handler) => handler,
				None => {
					return Err(Error::ListenerResolutionFailure {
						uid,
						event: binding.event,
						handler: binding.handler,
					})
				}
			};
			self.listeners.bind(&mut self.host, host_node, &binding.event, &binding.handler, &handler)?;
			bound.push(binding);
			if let Some(entry) = self.map.get_mut(uid) {
				entry.listeners = bound.clone();
			}
		}
		if let Some(entry) = self.map.get_mut(uid) {
			entry.listeners = bound;
		}
		Ok(())
	}

	/// Whether `uid` is still concrete and attached below the root, so a later inclusion in this pass may pick up its host node.
	fn moved_away(&self, tree: &Tree, uid: Uid) -> bool {
		tree.get(uid).map_or(false, |node| node.kind() != Kind::Abstract) && tree.is_ancestor_or_self(self.root, uid)
	}

	/// Unmounts parked nodes that no inclusion picked up.
	fn unpark(&mut self, pass: &mut Pass<'_>) {
		for uid in core::mem::take(&mut pass.parked) {
			let host_node = match self.map.host(uid) {
				Some(host_node) => host_node.clone(),
				None => continue,
			};
			if self.host.parent_node(&host_node).is_none() {
				if let Err(error) = self.unmount(pass, uid, Unmount::Detach, None) {
					error!(%uid, %error, "Failed to unmount parked node.");
				}
			}
		}
	}

	/// Tracked host children of `host_parent`, in host order.
	fn tracked_children(&self, host_parent: &H::Node) -> Vec<(Uid, H::Node)> {
		self.host
			.child_nodes(host_parent)
			.into_iter()
			.filter_map(|child| {
				let uid = self.host.uid_of(&child)?;
				if self.map.tracks(uid, &child) {
					Some((uid, child))
				} else {
					None
				}
			})
			.collect()
	}

	/// Abstract entries mounted (transitively, through other abstract entries) below `uid`.
	fn abstract_entries_below(&self, uid: Uid) -> Vec<Uid> {
		let mut found = Vec::new();
		let mut stack = vec![uid];
		while let Some(parent) = stack.pop() {
			let entry = match self.map.get(parent) {
				Some(entry) => entry,
				None => continue,
			};
			for &child in &entry.mounted {
				if let Some(child_entry) = self.map.get(child) {
					if child_entry.host.is_none() && child_entry.mount_parent == Some(parent) {
						found.push(child);
						stack.push(child);
					}
				}
			}
		}
		found
	}

	/// The host node to insert before, so that the new node lands right after its nearest mounted preceding sibling.
	fn insertion_reference(&self, preceding: &[(Uid, Uid)], host_parent: &H::Node) -> Option<H::Node> {
		for &(sibling, _) in preceding.iter().rev() {
			if let Some(sibling_host) = self.map.host(sibling) {
				if self.host.parent_node(sibling_host).as_ref() == Some(host_parent) {
					return self.host.next_sibling(sibling_host);
				}
			}
		}
		self.host.first_child(host_parent)
	}

	/// Compares, then includes, then removes.
	#[allow(clippy::too_many_lines)]
	#[instrument(skip(self, pass, host_parent))]
	fn sync_children(&mut self, pass: &mut Pass<'_>, uid: Uid, host_parent: &H::Node, depth: usize) -> Result<()> {
		self.check_depth(uid, depth)?;
		let flattened = pass.tree.flatten_children(uid);
		let host_children = self.tracked_children(host_parent);

		let (to_compare, to_include, to_remove) = {
			let host_uids = self.host_uids.temp();
			host_uids.extend(host_children.iter().map(|(uid, _)| *uid));
			let virtual_uids = self.virtual_uids.temp();
			virtual_uids.extend(flattened.concrete.iter().map(|(uid, _)| *uid));

			let (to_compare, to_include): (Vec<_>, Vec<_>) = flattened.concrete.iter().enumerate().partition(|(_, (uid, _))| host_uids.contains(uid));
			let to_remove: Vec<(Uid, H::Node)> = host_children.iter().filter(|(uid, _)| !virtual_uids.contains(uid)).cloned().collect();
			(to_compare, to_include, to_remove)
		};
		let stale_abstracts: Vec<Uid> = {
			let current: HashSet<Uid> = flattened.abstracts.iter().map(|(uid, _)| *uid).collect();
			self.abstract_entries_below(uid).into_iter().filter(|uid| !current.contains(uid)).collect()
		};
		trace!(
			compare = to_compare.len(),
			include = to_include.len(),
			remove = to_remove.len(),
			stale_abstracts = stale_abstracts.len(),
			"Diffing children."
		);

		{
			let positions: HashMap<Uid, (usize, H::Node)> = host_children.iter().enumerate().map(|(i, (uid, node))| (*uid, (i, node.clone()))).collect();
			let mut last_position: Option<usize> = None;
			let mut previous_host: Option<H::Node> = None;
			for (_, &(child, virtual_parent)) in to_compare {
				let (position, child_host) = match positions.get(&child) {
					Some((position, child_host)) => (*position, child_host.clone()),
					None => continue,
				};
				if let Some(entry) = self.map.get_mut(child) {
					entry.mount_parent = Some(virtual_parent);
				}
				if last_position.map_or(false, |last| position < last) {
					let reference = match &previous_host {
						Some(previous_host) => self.host.next_sibling(previous_host),
						None => self.host.first_child(host_parent),
					};
					trace!(%child, "Moving out-of-order child.");
					self.host.insert_before(host_parent, &child_host, reference.as_ref())?;
					pass.report.moved += 1;
				} else {
					last_position = Some(position);
				}
				self.compare(pass, child, &child_host, depth + 1)?;
				previous_host = self.map.host(child).cloned();
			}
		}

		for (i, &(child, virtual_parent)) in to_include {
			let reference = self.insertion_reference(&flattened.concrete[..i], host_parent);
			self.mount(pass, child, virtual_parent, host_parent, reference.as_ref(), depth + 1)?;
		}

		for (child, child_host) in to_remove {
			// Skips nodes that an inclusion above already moved elsewhere.
			if !self.map.tracks(child, &child_host) || self.host.parent_node(&child_host).as_ref() != Some(host_parent) {
				continue;
			}
			if self.moved_away(pass.tree, child) {
				trace!(%child, "Parking host node of a node that moved to another parent.");
				self.host.remove_child(host_parent, &child_host)?;
				pass.parked.push(child);
			} else {
				self.unmount(pass, child, Unmount::Detach, Some(host_parent))?;
			}
		}
		for stale in stale_abstracts {
			// An inclusion may have turned this entry concrete again.
			if self.map.get(stale).map_or(false, |entry| entry.host.is_none()) {
				self.unmount(pass, stale, Unmount::Detach, Some(host_parent))?;
			}
		}

		// Abstract nodes are (re)registered last, so that removals above can't take their fresh entries with them.
		for &(abstract_uid, virtual_parent) in &flattened.abstracts {
			let (version, children) = {
				let node = pass.tree.get(abstract_uid)?;
				(node.version(), node.children().to_vec())
			};
			if self.map.host(abstract_uid).is_some() {
				self.unmount(pass, abstract_uid, Unmount::Detach, Some(host_parent))?;
			}
			match self.map.get_mut(abstract_uid) {
				Some(entry) => {
					entry.version = Some(version);
					entry.mount_parent = Some(virtual_parent);
					entry.mounted = children;
				}
				None => {
					let mut entry = Entry::new(None, Some(version), Some(virtual_parent));
					entry.mounted = children;
					self.map.insert(abstract_uid, entry);
				}
			}
			pass.tree.clear_dirty_below(abstract_uid);
		}

		let children = pass.tree.get(uid)?.children().to_vec();
		if let Some(entry) = self.map.get_mut(uid) {
			entry.mounted = children;
		}
		Ok(())
	}

	#[instrument(skip(self, pass, host_parent, reference))]
	fn mount(&mut self, pass: &mut Pass<'_>, uid: Uid, mount_parent: Uid, host_parent: &H::Node, reference: Option<&H::Node>, depth: usize) -> Result<()> {
		self.check_depth(uid, depth)?;
		if let Some(host_node) = self.map.host(uid).cloned() {
			if self.host.is_alive(&host_node) && self.matches_host(pass.tree, uid, &host_node)? {
				return self.relocate(pass, uid, mount_parent, host_parent, &host_node, reference, depth);
			}
		}
		if self.map.contains(uid) {
			trace!("Still mounted elsewhere. Unmounting first.");
			self.unmount(pass, uid, Unmount::Detach, None)?;
		}

		let (kind, version) = {
			let node = pass.tree.get(uid)?;
			(node.kind(), node.version())
		};
		let (host_node, resolved) = match kind {
			Kind::Text => {
				let text = resolve_text(pass.tree, uid, pass.invalidate)?;
				if !pass.tree.get(uid)?.events().is_empty() {
					warn!(%uid, "Event bindings on text nodes are ignored.");
				}
				(self.host.create_text_node(&text), None)
			}
			Kind::Element => {
				let resolved = self.resolve_element(pass.tree, uid)?;
				let node = pass.tree.get(uid)?;
				if node.behavior().is_none() {
					if let Some(behavior) = node.tag().and_then(|tag| self.registry.resolve_tag(tag)) {
						trace!(capability = ?behavior.capability(), "Attaching behavior.");
						pass.tree.get_mut(uid)?.set_behavior(behavior);
					}
				}
				let tag = Self::effective_tag(pass.tree, uid)?.unwrap_or_default();
				(self.host.create_element(&tag)?, Some(resolved))
			}
			Kind::Abstract => {
				error!(%uid, "Tried to mount an abstract node directly.");
				return Ok(());
			}
		};
		self.host.tag_uid(&host_node, uid);
		self.host.insert_before(host_parent, &host_node, reference)?;
		// Tracked from here on so that a failure below can clean up, but without a version until complete.
		let mut entry = Entry::new(Some(host_node.clone()), None, Some(mount_parent));
		entry.behavior = pass.tree.get(uid)?.behavior().cloned();
		self.map.insert(uid, entry);
		pass.report.mounted += 1;

		if let Some(resolved) = resolved {
			self.patch_attributes(&host_node, &resolved)?;
			self.patch_listeners(uid, &host_node, resolved.listeners)?;
			self.sync_children(pass, uid, &host_node, depth + 1)?;
			if let Some(behavior) = pass.tree.get(uid)?.behavior() {
				pass.hooks.push(Hook::Mounted(behavior.clone(), uid));
			}
		}
		self.finish(pass, uid, version);
		Ok(())
	}

	/// Moves a node that is still mounted elsewhere under `host_parent`, keeping its host node.
	#[allow(clippy::too_many_arguments)]
	fn relocate(&mut self, pass: &mut Pass<'_>, uid: Uid, mount_parent: Uid, host_parent: &H::Node, host_node: &H::Node, reference: Option<&H::Node>, depth: usize) -> Result<()> {
		trace!(%uid, "Moving mounted node to its new parent.");
		self.host.insert_before(host_parent, host_node, reference)?;
		if let Some(entry) = self.map.get_mut(uid) {
			entry.mount_parent = Some(mount_parent);
		}
		pass.report.moved += 1;
		self.compare(pass, uid, host_node, depth)
	}

	/// Removes `uid`'s entry and, recursively, those of the descendants that were mounted through it.
	///
	/// `scope` is the host node concrete descendants must (still) be children of to be considered part of this subtree.
	fn unmount(&mut self, pass: &mut Pass<'_>, uid: Uid, mode: Unmount, scope: Option<&H::Node>) -> Result<()> {
		let entry = match self.map.remove(uid) {
			Some(entry) => entry,
			None => return Ok(()),
		};
		let span = trace_span!("Unmounting", %uid, ?mode);
		let _enter = span.enter();

		if let Some(host_node) = &entry.host {
			for binding in &entry.listeners {
				if mode == Unmount::Forget {
					self.listeners.forget(&binding.handler);
				} else {
					self.listeners.unbind(&mut self.host, host_node, &binding.event, &binding.handler);
				}
			}
			if mode == Unmount::Detach {
				if let Some(host_parent) = self.host.parent_node(host_node) {
					self.host.remove_child(&host_parent, host_node)?;
				}
			}
			if let Some(behavior) = entry.behavior.clone() {
				pass.hooks.push(Hook::Unmounting(behavior, uid));
			}
			pass.report.unmounted += 1;
		}

		let (child_mode, child_scope) = match &entry.host {
			Some(host_node) => (if mode == Unmount::Forget { Unmount::Forget } else { Unmount::InPlace }, Some(host_node.clone())),
			None => (mode, scope.cloned()),
		};
		for child in entry.mounted {
			let owned = match self.map.get(child) {
				Some(child_entry) if child_entry.mount_parent == Some(uid) => match &child_entry.host {
					None => true,
					Some(_) if child_mode == Unmount::Forget => true,
					Some(child_host) => child_scope.is_some() && self.host.parent_node(child_host) == child_scope,
				},
				_ => false,
			};
			if owned {
				self.unmount(pass, child, child_mode, child_scope.as_ref())?;
			}
		}
		Ok(())
	}

	/// Adopts untracked host children of the root as new virtual nodes without recreating them.
	pub(crate) fn hydrate(&mut self, tree: &mut Tree) -> Result<Vec<Uid>> {
		let root_host = match self.map.host(self.root) {
			Some(root_host) => root_host.clone(),
			None => return Ok(Vec::new()),
		};
		let loaded = load::load_child_nodes(&self.host, &root_host);
		let mut adopted = Vec::with_capacity(loaded.len());
		for (decl, shape) in loaded {
			if self.host.uid_of(&shape.host).map_or(false, |uid| self.map.tracks(uid, &shape.host)) {
				continue;
			}
			let uid = tree.create(decl)?;
			tree.push_children(self.root, vec![uid])?;
			self.register_loaded(tree, uid, self.root, shape)?;
			adopted.push(uid);
		}
		if let Some(entry) = self.map.get_mut(self.root) {
			entry.mounted = tree.get(self.root)?.children().to_vec();
		}
		debug!(count = adopted.len(), "Hydrated host nodes.");
		Ok(adopted)
	}

	fn register_loaded(&mut self, tree: &Tree, uid: Uid, mount_parent: Uid, shape: Shape<H::Node>) -> Result<()> {
		let node = tree.get(uid)?;
		self.host.tag_uid(&shape.host, uid);
		let mut entry = Entry::new(Some(shape.host), Some(node.version()), Some(mount_parent));
		entry.mounted = node.children().to_vec();
		self.map.insert(uid, entry);
		for (&child, child_shape) in node.children().iter().zip(shape.children) {
			self.register_loaded(tree, child, uid, child_shape)?;
		}
		Ok(())
	}
}
