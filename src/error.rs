use crate::{host::HostError, tree::Uid};
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Everything that can go wrong while mutating the virtual tree or reconciling it.
///
/// `Clone` so that a single failed pass can reject every [`SyncHandle`](`crate::SyncHandle`) of its batch with the same value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
	/// A node was asked to be an element and a text node at once, or to be attached in a way that would form a cycle.
	#[error("structural conflict: {detail}")]
	StructuralConflict { uid: Option<Uid>, detail: &'static str },

	#[error("{uid} was released")]
	UseAfterRelease { uid: Uid },

	/// The identity map still points at a host node that was destroyed behind the engine's back.
	///
	/// The affected subtree is dropped from the identity map, so the next pass mounts it afresh.
	#[error("identity map entry for {uid} references a destroyed host node")]
	StaleHostReference { uid: Uid },

	/// Benign: the node has no path to any mounted ancestor, so synchronising it does nothing.
	#[error("{uid} has no path to a mounted ancestor")]
	InvalidSyncTarget { uid: Uid },

	#[error("no handler named {handler:?} for {event:?} event on {uid}")]
	ListenerResolutionFailure { uid: Uid, event: String, handler: String },

	#[error("depth limit of {limit} reached below {uid}")]
	DepthLimitExceeded { uid: Uid, limit: usize },

	#[error("the engine was dropped before the pending pass ran")]
	EngineDropped,

	/// The virtual tree was accessed from inside a reconciliation pass (from a resolver, say).
	#[error("the virtual tree is locked by a running reconciliation pass")]
	Reentrant,

	#[error(transparent)]
	Host(#[from] HostError),
}

impl Error {
	pub(crate) fn conflict(uid: impl Into<Option<Uid>>, detail: &'static str) -> Self {
		Self::StructuralConflict { uid: uid.into(), detail }
	}
}
