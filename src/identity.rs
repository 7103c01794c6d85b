//! The cross-reference from virtual node to host node.

use crate::{
	binder::Behavior,
	tree::{EventBinding, Uid},
};
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashMap;
use std::rc::Rc;

/// What the engine knows about a mounted virtual node.
#[derive(Clone)]
pub struct Entry<N> {
	/// [`None`] for abstract nodes, which are tracked but never reach the host.
	pub host: Option<N>,
	/// The node's version as of the last pass that fully synchronised it.
	///
	/// [`None`] while a mount is in progress or after it failed partway, so that the next pass never skips the node.
	pub version: Option<u64>,
	/// The virtual parent this node was mounted under.
	pub mount_parent: Option<Uid>,
	/// Virtual children mounted under this node.
	pub mounted: Vec<Uid>,
	/// Listeners currently attached to [`host`](`Entry::host`).
	pub listeners: Vec<EventBinding>,
	/// Kept here so that unmount hooks still reach behaviors of released nodes.
	pub(crate) behavior: Option<Rc<dyn Behavior>>,
}
impl<N: Debug> Debug for Entry<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Entry")
			.field("host", &self.host)
			.field("version", &self.version)
			.field("mount_parent", &self.mount_parent)
			.field("mounted", &self.mounted)
			.field("listeners", &self.listeners)
			.field("behavior", &self.behavior.as_ref().map(|behavior| behavior.capability()))
			.finish()
	}
}
impl<N> Entry<N> {
	pub(crate) fn new(host: Option<N>, version: Option<u64>, mount_parent: Option<Uid>) -> Self {
		Self {
			host,
			version,
			mount_parent,
			mounted: Vec::new(),
			listeners: Vec::new(),
			behavior: None,
		}
	}
}

/// Contains an entry for a uid if and only if that node is mounted, or is the synthetic root.
///
/// Only the reconciler writes to it.
#[derive(Debug)]
pub struct IdentityMap<N> {
	entries: HashMap<Uid, Entry<N>>,
}
impl<N> Default for IdentityMap<N> {
	fn default() -> Self {
		Self { entries: HashMap::new() }
	}
}
impl<N: PartialEq> IdentityMap<N> {
	#[must_use]
	pub fn get(&self, uid: Uid) -> Option<&Entry<N>> {
		self.entries.get(&uid)
	}

	pub(crate) fn get_mut(&mut self, uid: Uid) -> Option<&mut Entry<N>> {
		self.entries.get_mut(&uid)
	}

	#[must_use]
	pub fn contains(&self, uid: Uid) -> bool {
		self.entries.contains_key(&uid)
	}

	#[must_use]
	pub fn host(&self, uid: Uid) -> Option<&N> {
		self.entries.get(&uid).and_then(|entry| entry.host.as_ref())
	}

	#[must_use]
	pub fn version(&self, uid: Uid) -> Option<u64> {
		self.entries.get(&uid).and_then(|entry| entry.version)
	}

	/// Whether `uid` is tracked with exactly this host node.
	#[must_use]
	pub fn tracks(&self, uid: Uid, host: &N) -> bool {
		self.host(uid) == Some(host)
	}

	pub(crate) fn insert(&mut self, uid: Uid, entry: Entry<N>) -> Option<Entry<N>> {
		self.entries.insert(uid, entry)
	}

	pub(crate) fn remove(&mut self, uid: Uid) -> Option<Entry<N>> {
		self.entries.remove(&uid)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn uids(&self) -> impl Iterator<Item = Uid> + '_ {
		self.entries.keys().copied()
	}
}
