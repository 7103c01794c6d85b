use crate::{
	host::{Handler, Host, HostError},
	rc_hash_map::{CountSaturatedError, RcHashMap},
};
use tracing::{error, trace};

/// One host listener object per handler name, shared by every node that binds that handler.
pub struct ListenerTable<L> {
	handles: RcHashMap<String, u16, L>,
}
impl<L> Default for ListenerTable<L> {
	fn default() -> Self {
		Self { handles: RcHashMap::new() }
	}
}
impl<L> ListenerTable<L> {
	/// Attaches the shared listener for `handler_name` to `node`, creating it first if necessary.
	pub fn bind<H: Host<Listener = L>>(&mut self, host: &mut H, node: &H::Node, event: &str, handler_name: &str, handler: &Handler) -> Result<(), HostError> {
		let listener = self
			.handles
			.increment_or_insert_with(handler_name.to_owned(), |name| {
				trace!(handler = %name, "Creating host listener.");
				host.create_listener(handler.clone())
			})
			.map_err(|CountSaturatedError| HostError::new("add_event_listener", "too many (more than 65k) bindings of the same handler"))?;
		host.add_event_listener(node, event, listener)
	}

	/// Detaches the shared listener for `handler_name` from `node`.
	///
	/// The listener object itself is kept until [`collect`](`ListenerTable::collect`), so that a rebind within the same pass reuses it.
	pub fn unbind<H: Host<Listener = L>>(&mut self, host: &mut H, node: &H::Node, event: &str, handler_name: &str) {
		match self.handles.weak_decrement(handler_name) {
			Ok(Some(listener)) => {
				if let Err(error) = host.remove_event_listener(node, event, listener) {
					error!("Failed to remove event listener {:?}: {}", event, error)
				}
			}
			Ok(None) => error!("Tried to unbind handler {:?}, which was never bound.", handler_name),
			Err(CountSaturatedError) => error!("Tried to unbind handler {:?} more often than it was bound.", handler_name),
		}
	}

	/// Releases one binding of `handler_name` without calling into the host, for nodes the host already destroyed.
	pub fn forget(&mut self, handler_name: &str) {
		if let Err(CountSaturatedError) = self.handles.weak_decrement(handler_name) {
			error!("Tried to forget handler {:?} more often than it was bound.", handler_name)
		}
	}

	/// Drops listener objects no node refers to anymore. Returns how many were freed.
	pub fn collect(&mut self) -> usize {
		self.handles.drain_weak().count()
	}

	#[must_use]
	pub fn bindings(&self, handler_name: &str) -> u16 {
		self.handles.count(handler_name)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.handles.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.handles.is_empty()
	}

	#[must_use]
	pub fn capacity(&self) -> usize {
		self.handles.capacity()
	}
}
