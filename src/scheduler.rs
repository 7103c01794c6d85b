//! Coalesces sync requests into one reconciliation pass per tick.

use crate::{
	error::{Error, Result},
	tree::Uid,
};
use core::{
	cell::RefCell,
	future::Future,
	pin::Pin,
	task::{Context, Poll},
};
use futures_channel::oneshot;
use std::rc::Rc;
use tracing::trace;

/// Arms a one-shot callback for "soon": the next microtask, or a minimal timeout.
///
/// The callback must not run synchronously inside [`arm`](`Timer::arm`).
pub trait Timer {
	fn arm(&self, fire: Box<dyn FnOnce()>);
}

/// A [`Timer`] that fires only when told to. Clones share the same slot.
#[derive(Clone, Default)]
pub struct ManualTimer {
	armed: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}
impl ManualTimer {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn is_armed(&self) -> bool {
		self.armed.borrow().is_some()
	}

	/// Runs the armed callback, if any. Returns whether one ran.
	pub fn fire(&self) -> bool {
		let fire = self.armed.borrow_mut().take();
		match fire {
			Some(fire) => {
				fire();
				true
			}
			None => false,
		}
	}
}
impl Timer for ManualTimer {
	fn arm(&self, fire: Box<dyn FnOnce()>) {
		*self.armed.borrow_mut() = Some(fire);
	}
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
	/// The node the pass started from, or [`None`] if there was nothing mounted to synchronise.
	pub target: Option<Uid>,
	pub patched: usize,
	pub mounted: usize,
	pub unmounted: usize,
	pub moved: usize,
	/// Nodes skipped because nothing changed since the last pass.
	pub skipped: usize,
}

/// Completion handle of a sync request. Resolves once the pass that covers it has run.
///
/// Can be awaited, or polled synchronously through [`try_result`](`SyncHandle::try_result`).
#[derive(Debug)]
pub struct SyncHandle {
	receiver: oneshot::Receiver<Result<PassReport>>,
	result: Option<Result<PassReport>>,
}
impl SyncHandle {
	fn new(receiver: oneshot::Receiver<Result<PassReport>>) -> Self {
		Self { receiver, result: None }
	}

	/// The outcome, if the pass already ran.
	pub fn try_result(&mut self) -> Option<Result<PassReport>> {
		if self.result.is_none() {
			self.result = match self.receiver.try_recv() {
				Ok(Some(result)) => Some(result),
				Ok(None) => None,
				Err(oneshot::Canceled) => Some(Err(Error::EngineDropped)),
			};
		}
		self.result.clone()
	}

	#[must_use]
	pub fn is_done(&mut self) -> bool {
		self.try_result().is_some()
	}
}
impl Future for SyncHandle {
	type Output = Result<PassReport>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		if let Some(result) = self.result.clone() {
			return Poll::Ready(result);
		}
		let this = &mut *self;
		Pin::new(&mut this.receiver).poll(cx).map(|result| {
			let result = result.unwrap_or(Err(Error::EngineDropped));
			this.result = Some(result.clone());
			result
		})
	}
}

/// Requests collected since the timer was armed.
#[derive(Debug, Default)]
pub(crate) struct Batch {
	/// The lowest common ancestor of every request so far.
	pub(crate) target: Option<Uid>,
	/// Nodes whose data changed while a pass held the tree. They are marked dirty and merged at flush time.
	pub(crate) deferred: Vec<Uid>,
	pub(crate) waiters: Vec<oneshot::Sender<Result<PassReport>>>,
}
impl Batch {
	pub(crate) fn resolve(self, result: &Result<PassReport>) {
		trace!(waiters = self.waiters.len(), ok = result.is_ok(), "Resolving sync handles.");
		for waiter in self.waiters {
			// The caller may have dropped its handle.
			let _ = waiter.send(result.clone());
		}
	}
}

#[derive(Debug, Default)]
pub(crate) struct Scheduler {
	pending: Option<Batch>,
	passes: u64,
}
impl Scheduler {
	/// Adds `uids` to the pending batch, merging each with the current target through `merge`.
	///
	/// Returns one handle for all of them, and whether the timer needs to be armed because the scheduler was idle.
	pub(crate) fn request(&mut self, uids: &[Uid], mut merge: impl FnMut(Uid, Uid) -> Uid) -> (SyncHandle, bool) {
		let (sender, receiver) = oneshot::channel();
		let arm = self.pending.is_none();
		let batch = self.pending.get_or_insert_with(Batch::default);
		for &uid in uids {
			batch.target = Some(match batch.target {
				Some(target) => merge(target, uid),
				None => uid,
			});
		}
		batch.waiters.push(sender);
		trace!(?uids, target = ?batch.target, arm, "Sync requested.");
		(SyncHandle::new(receiver), arm)
	}

	/// Puts a batch back that couldn't run, merging it into whatever arrived in the meantime.
	pub(crate) fn restore(&mut self, batch: Batch, mut merge: impl FnMut(Uid, Uid) -> Uid) {
		match &mut self.pending {
			None => self.pending = Some(batch),
			Some(pending) => {
				if let Some(uid) = batch.target {
					pending.target = Some(match pending.target {
						Some(target) => merge(target, uid),
						None => uid,
					});
				}
				pending.deferred.extend(batch.deferred);
				pending.waiters.extend(batch.waiters);
			}
		}
		self.passes = self.passes.saturating_sub(1);
	}

	/// Queues an invalidation that arrived while the tree was busy. Returns whether the timer needs to be armed.
	pub(crate) fn defer(&mut self, uid: Uid) -> bool {
		let arm = self.pending.is_none();
		self.pending.get_or_insert_with(Batch::default).deferred.push(uid);
		arm
	}

	/// Takes the pending batch. Requests arriving from here on go into the next one.
	pub(crate) fn take(&mut self) -> Option<Batch> {
		let batch = self.pending.take();
		if batch.is_some() {
			self.passes += 1;
		}
		batch
	}

	pub(crate) fn is_pending(&self) -> bool {
		self.pending.is_some()
	}

	pub(crate) fn passes(&self) -> u64 {
		self.passes
	}
}
