//! The public entry point: owns the virtual tree, the reconciler and the scheduler of one UI.

use crate::{
	binder::{AttributeResolver, Capability, TagResolver},
	config::Config,
	context::DataContext,
	error::{Error, Result},
	host::Host,
	identity::IdentityMap,
	reconcile::{self, Hook, Invalidate, Reconciler},
	scheduler::{PassReport, Scheduler, SyncHandle, Timer},
	tree::{Decl, EventBinding, Tree, Uid},
};
use core::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, instrument, trace, warn};

struct Shared<H: Host> {
	this: Weak<Shared<H>>,
	root: Uid,
	tree: RefCell<Tree>,
	reconciler: RefCell<Reconciler<H>>,
	scheduler: RefCell<Scheduler>,
	timer: Box<dyn Timer>,
}

/// A handle to one reconciliation engine. Clones share the same engine.
///
/// Mutations only mark nodes dirty and schedule a pass. The pass runs when the [`Timer`] fires, or on [`flush`](`Engine::flush`).
pub struct Engine<H: Host + 'static> {
	shared: Rc<Shared<H>>,
}
impl<H: Host + 'static> Clone for Engine<H> {
	fn clone(&self) -> Self {
		Self { shared: self.shared.clone() }
	}
}

impl<H: Host + 'static> Shared<H> {
	fn merge(&self, tree: Option<&Tree>, a: Uid, b: Uid) -> Uid {
		tree.and_then(|tree| tree.lowest_common_ancestor(a, b)).unwrap_or(self.root)
	}

	fn request_sync(&self, uids: &[Uid]) -> SyncHandle {
		let (handle, arm) = {
			let tree = self.tree.try_borrow().ok();
			self.scheduler.borrow_mut().request(uids, |a, b| self.merge(tree.as_deref(), a, b))
		};
		if arm {
			self.arm();
		}
		handle
	}

	fn arm(&self) {
		let this = self.this.clone();
		self.timer.arm(Box::new(move || {
			if let Some(shared) = this.upgrade() {
				shared.flush();
			}
		}))
	}

	fn invalidator(&self) -> Invalidate {
		let this = self.this.clone();
		Rc::new(move |uid| {
			if let Some(shared) = this.upgrade() {
				shared.invalidate(uid)
			}
		})
	}

	/// A data change for `uid`'s content.
	fn invalidate(&self, uid: Uid) {
		match self.tree.try_borrow_mut() {
			Ok(mut tree) => {
				if let Err(error) = tree.mark_dirty(uid) {
					trace!(%error, "Ignoring invalidation.");
					return;
				}
			}
			Err(_) => {
				trace!(%uid, "Tree is busy. Deferring invalidation.");
				if self.scheduler.borrow_mut().defer(uid) {
					self.arm();
				}
				return;
			}
		}
		drop(self.request_sync(&[uid]));
	}

	#[instrument(skip(self))]
	fn flush(&self) -> Option<Result<PassReport>> {
		let mut batch = self.scheduler.borrow_mut().take()?;
		let (mut tree, mut reconciler) = match (self.tree.try_borrow_mut(), self.reconciler.try_borrow_mut()) {
			(Ok(tree), Ok(reconciler)) => (tree, reconciler),
			_ => {
				warn!("Flush requested while a pass is running. Postponing.");
				let mut scheduler = self.scheduler.borrow_mut();
				let arm = !scheduler.is_pending();
				scheduler.restore(batch, |_, _| self.root);
				drop(scheduler);
				if arm {
					self.arm();
				}
				return None;
			}
		};

		for uid in core::mem::take(&mut batch.deferred) {
			if tree.mark_dirty(uid).is_ok() {
				batch.target = Some(match batch.target {
					Some(target) => self.merge(Some(&tree), target, uid),
					None => uid,
				});
			}
		}

		let (result, hooks): (_, Vec<Hook>) = match batch.target {
			Some(target) => reconciler.reconcile(&mut tree, target, &self.invalidator()),
			None => (Ok(PassReport::default()), Vec::new()),
		};
		drop(reconciler);
		drop(tree);

		trace!(count = hooks.len(), "Dispatching behavior hooks.");
		for hook in hooks {
			hook.dispatch();
		}
		batch.resolve(&result);
		Some(result)
	}
}

impl<H: Host + 'static> Engine<H> {
	/// Creates an engine that renders into `root_node`'s children.
	///
	/// `root_node`'s own attributes are never touched.
	pub fn new(host: H, root_node: H::Node, timer: impl Timer + 'static, config: Config) -> Self {
		let tree = Tree::new();
		let root = tree.root();
		let reconciler = Reconciler::new(host, root_node, root, config);
		debug!(?config, "Creating engine.");
		Self {
			shared: Rc::new_cyclic(|this| Shared {
				this: this.clone(),
				root,
				tree: RefCell::new(tree),
				reconciler: RefCell::new(reconciler),
				scheduler: RefCell::new(Scheduler::default()),
				timer: Box::new(timer),
			}),
		}
	}

	/// The synthetic root node, which stands for the host root passed to [`new`](`Engine::new`).
	#[must_use]
	pub fn root(&self) -> Uid {
		self.shared.root
	}

	fn mutate(&self, f: impl FnOnce(&mut Tree) -> Result<Vec<Uid>>) -> Result<SyncHandle> {
		let touched = {
			let mut tree = self.shared.tree.try_borrow_mut().map_err(|_| Error::Reentrant)?;
			f(&mut tree)?
		};
		Ok(self.shared.request_sync(&touched))
	}

	/// Creates a detached subtree. It is mounted once it is attached below the root and synchronised.
	pub fn create(&self, decl: Decl) -> Result<Uid> {
		self.shared.tree.try_borrow_mut().map_err(|_| Error::Reentrant)?.create(decl)
	}

	/// Replaces `parent`'s children. Children attached elsewhere are moved.
	pub fn set_children(&self, parent: Uid, children: Vec<Uid>) -> Result<SyncHandle> {
		self.mutate(|tree| tree.set_children(parent, children))
	}

	pub fn push_children(&self, parent: Uid, children: Vec<Uid>) -> Result<SyncHandle> {
		self.mutate(|tree| tree.push_children(parent, children))
	}

	/// Sets `uid`'s text template. `{{key}}` placeholders are resolved against the nearest data context.
	pub fn set_content(&self, uid: Uid, template: impl Into<String>) -> Result<SyncHandle> {
		let template = template.into();
		self.mutate(|tree| tree.set_content(uid, template).map(|_| vec![uid]))
	}

	pub fn clear_content(&self, uid: Uid) -> Result<SyncHandle> {
		self.mutate(|tree| tree.clear_content(uid).map(|_| vec![uid]))
	}

	/// Changes (or with [`None`], removes) `uid`'s tag. The next pass replaces the host node.
	pub fn set_tag(&self, uid: Uid, tag: Option<String>) -> Result<SyncHandle> {
		self.mutate(|tree| tree.set_tag(uid, tag).map(|_| vec![uid]))
	}

	/// Replaces `uid`'s attributes. Later duplicates win.
	pub fn set_attributes(&self, uid: Uid, attributes: Vec<(String, String)>) -> Result<SyncHandle> {
		self.mutate(|tree| tree.set_attributes(uid, attributes).map(|_| vec![uid]))
	}

	/// Adds or overwrites attributes, keeping the others.
	pub fn push_attributes(&self, uid: Uid, attributes: Vec<(String, String)>) -> Result<SyncHandle> {
		self.mutate(|tree| tree.push_attributes(uid, attributes).map(|_| vec![uid]))
	}

	pub fn set_events(&self, uid: Uid, events: Vec<EventBinding>) -> Result<SyncHandle> {
		self.mutate(|tree| tree.set_events(uid, events).map(|_| vec![uid]))
	}

	/// Attaches a data context to `uid`. Its descendants inherit it unless they have their own.
	///
	/// The engine holds the context weakly.
	pub fn set_context(&self, uid: Uid, context: &Rc<dyn DataContext>) -> Result<SyncHandle> {
		self.mutate(|tree| tree.set_context(uid, context).map(|()| vec![uid]))
	}

	/// Destroys `uid`'s subtree. Any further use of these uids fails with [`Error::UseAfterRelease`].
	pub fn release(&self, uid: Uid) -> Result<SyncHandle> {
		self.mutate(|tree| Ok(tree.release(uid)?.into_iter().collect()))
	}

	/// Schedules a pass covering `uid`.
	///
	/// Requests made before the pass runs are merged into one pass from their lowest common ancestor.
	pub fn request_sync(&self, uid: Uid) -> SyncHandle {
		self.shared.request_sync(&[uid])
	}

	/// Runs the pending pass now, if there is one.
	///
	/// Returns [`None`] if nothing was pending, or if a pass is already running (in which case the batch is postponed).
	pub fn flush(&self) -> Option<Result<PassReport>> {
		self.shared.flush()
	}

	#[must_use]
	pub fn is_pending(&self) -> bool {
		self.shared.scheduler.borrow().is_pending()
	}

	#[must_use]
	pub fn pass_count(&self) -> u64 {
		self.shared.scheduler.borrow().passes()
	}

	/// The node a pass requested for `uid` would start from.
	///
	/// # Errors
	///
	/// [`Error::InvalidSyncTarget`] if `uid` isn't attached below the root.
	pub fn mounted_ancestor(&self, uid: Uid) -> Result<Uid> {
		let tree = self.shared.tree.try_borrow().map_err(|_| Error::Reentrant)?;
		let reconciler = self.shared.reconciler.try_borrow().map_err(|_| Error::Reentrant)?;
		reconciler.mounted_ancestor(&tree, uid)
	}

	/// Resolves `uid`'s content now, and subscribes it to the keys it reads.
	pub fn content(&self, uid: Uid) -> Result<String> {
		let mut tree = self.shared.tree.try_borrow_mut().map_err(|_| Error::Reentrant)?;
		reconcile::resolve_text(&mut tree, uid, &self.shared.invalidator())
	}

	pub fn version(&self, uid: Uid) -> Result<u64> {
		self.with_tree(|tree| tree.get(uid).map(|node| node.version()))?
	}

	pub fn children(&self, uid: Uid) -> Result<Vec<Uid>> {
		self.with_tree(|tree| tree.get(uid).map(|node| node.children().to_vec()))?
	}

	pub fn parent(&self, uid: Uid) -> Result<Option<Uid>> {
		self.with_tree(|tree| tree.get(uid).map(|node| node.parent()))?
	}

	/// The host node `uid` is currently mounted as, if any.
	#[must_use]
	pub fn host_node(&self, uid: Uid) -> Option<H::Node> {
		self.shared.reconciler.try_borrow().ok()?.identity_map().host(uid).cloned()
	}

	#[must_use]
	pub fn is_mounted(&self, uid: Uid) -> bool {
		self.shared
			.reconciler
			.try_borrow()
			.map_or(false, |reconciler| reconciler.identity_map().contains(uid))
	}

	/// Borrows the host, for inspection or for host changes the engine doesn't know about.
	pub fn with_host<T>(&self, f: impl FnOnce(&mut H) -> T) -> Result<T> {
		let mut reconciler = self.shared.reconciler.try_borrow_mut().map_err(|_| Error::Reentrant)?;
		Ok(f(reconciler.host_mut()))
	}

	pub fn with_tree<T>(&self, f: impl FnOnce(&Tree) -> T) -> Result<T> {
		let tree = self.shared.tree.try_borrow().map_err(|_| Error::Reentrant)?;
		Ok(f(&tree))
	}

	pub fn with_identity_map<T>(&self, f: impl FnOnce(&IdentityMap<H::Node>) -> T) -> Result<T> {
		let reconciler = self.shared.reconciler.try_borrow().map_err(|_| Error::Reentrant)?;
		Ok(f(reconciler.identity_map()))
	}

	/// How many nodes currently bind `handler`.
	pub fn handler_bindings(&self, handler: &str) -> Result<u16> {
		let reconciler = self.shared.reconciler.try_borrow().map_err(|_| Error::Reentrant)?;
		Ok(reconciler.listeners().bindings(handler))
	}

	/// Registers a named event handler.
	///
	/// Registering a name again replaces the handler, also for nodes that are already bound to it.
	pub fn register_handler(&self, name: impl Into<String>, handler: impl Fn() + 'static) -> Result<()> {
		let mut reconciler = self.shared.reconciler.try_borrow_mut().map_err(|_| Error::Reentrant)?;
		reconciler.registry_mut().register_handler(name, Rc::new(handler));
		Ok(())
	}

	pub fn register_attribute_resolver(&self, name: impl Into<String>, resolver: impl AttributeResolver + 'static) -> Result<()> {
		let mut reconciler = self.shared.reconciler.try_borrow_mut().map_err(|_| Error::Reentrant)?;
		reconciler.registry_mut().register_attribute(name, Rc::new(resolver));
		Ok(())
	}

	pub fn register_tag_resolver(&self, resolver: impl TagResolver + 'static) -> Result<()> {
		let mut reconciler = self.shared.reconciler.try_borrow_mut().map_err(|_| Error::Reentrant)?;
		reconciler.registry_mut().register_tag(Rc::new(resolver));
		Ok(())
	}

	/// Nodes below `from` whose attached behavior declares `capability`, in document order.
	pub fn find_capability(&self, from: Uid, capability: Capability) -> Result<Vec<Uid>> {
		self.with_tree(|tree| tree.find_capability(from, capability))
	}

	/// Adopts host children of the root that the engine doesn't track yet, without recreating them.
	///
	/// Returns the new top-level nodes, which are appended to the root's children.
	pub fn hydrate(&self) -> Result<Vec<Uid>> {
		let mut tree = self.shared.tree.try_borrow_mut().map_err(|_| Error::Reentrant)?;
		let mut reconciler = self.shared.reconciler.try_borrow_mut().map_err(|_| Error::Reentrant)?;
		reconciler.hydrate(&mut tree)
	}
}
