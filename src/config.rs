/// Engine tuning. There is no file or environment configuration; build one of these in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
	/// How deep a single pass may recurse below its target before giving up with
	/// [`Error::DepthLimitExceeded`](`crate::Error::DepthLimitExceeded`).
	pub depth_limit: usize,
	/// Warn once the shared listener table's capacity reaches this size.
	pub listener_capacity_warning: usize,
	/// Compare tag names ASCII-case-insensitively when checking host nodes. The DOM reports HTML tag names in upper case.
	pub case_insensitive_tags: bool,
}
impl Config {
	#[must_use]
	pub const fn new() -> Self {
		Self {
			depth_limit: 1024,
			listener_capacity_warning: 100,
			case_insensitive_tags: true,
		}
	}

	#[must_use]
	pub fn with_depth_limit(mut self, depth_limit: usize) -> Self {
		self.depth_limit = depth_limit;
		self
	}

	#[must_use]
	pub fn with_listener_capacity_warning(mut self, capacity: usize) -> Self {
		self.listener_capacity_warning = capacity;
		self
	}

	#[must_use]
	pub fn with_case_insensitive_tags(mut self, case_insensitive: bool) -> Self {
		self.case_insensitive_tags = case_insensitive;
		self
	}

	pub(crate) fn tags_match(&self, a: &str, b: &str) -> bool {
		if self.case_insensitive_tags {
			a.eq_ignore_ascii_case(b)
		} else {
			a == b
		}
	}
}
impl Default for Config {
	fn default() -> Self {
		Self::new()
	}
}
