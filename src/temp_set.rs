use core::hash::Hash;
use hashbrown::HashSet;

/// A scratch set whose heap allocation survives between uses.
pub struct TempSet<T>(HashSet<T>);
impl<T: Hash + Eq> TempSet<T> {
	pub fn new() -> Self {
		Self(HashSet::new())
	}

	/// Clears the set and lends it out.
	///
	/// Clearing happens before each borrow rather than after, so an early return from the borrower can't leak stale values into the next one.
	pub fn temp(&mut self) -> &mut HashSet<T> {
		self.0.clear();
		&mut self.0
	}
}
impl<T: Hash + Eq> Default for TempSet<T> {
	fn default() -> Self {
		Self::new()
	}
}
