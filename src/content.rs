//! Text content with `{{name}}` interpolation.

use crate::context::{DataContext, Subscription};
use core::cell::Cell;
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
	Literal(String),
	/// A namespace key into the data context.
	Interpolated(String),
}

/// Compiles `template` in a single pass.
///
/// An unterminated `{{` is kept literally, and so is `{{}}` (no key).
#[must_use]
pub fn compile(template: &str) -> Vec<Part> {
	let mut parts = Vec::new();
	let mut literal = String::new();
	let mut rest = template;
	while let Some(open) = rest.find("{{") {
		let after_open = &rest[open + 2..];
		let close = match after_open.find("}}") {
			Some(close) => close,
			None => break,
		};
		let key = after_open[..close].trim();
		literal.push_str(&rest[..open]);
		if key.is_empty() {
			literal.push_str(&rest[open..open + 2 + close + 2]);
		} else {
			if !literal.is_empty() {
				parts.push(Part::Literal(core::mem::take(&mut literal)));
			}
			parts.push(Part::Interpolated(key.to_owned()));
		}
		rest = &after_open[close + 2..];
	}
	literal.push_str(rest);
	if !literal.is_empty() {
		parts.push(Part::Literal(literal));
	}
	parts
}

/// The content binding of a text node.
pub struct ContentBinder {
	template: String,
	parts: Vec<Part>,
	subscriptions: HashMap<String, Subscription>,
	/// Bumped on [`set`](`ContentBinder::set`), so that callbacks registered for an earlier template stay silent
	/// even if the context notifies from a subscriber list it copied before they were removed.
	generation: Rc<Cell<u64>>,
}
impl ContentBinder {
	#[must_use]
	pub fn new(template: impl Into<String>) -> Self {
		let template = template.into();
		Self {
			parts: compile(&template),
			template,
			subscriptions: HashMap::new(),
			generation: Rc::default(),
		}
	}

	#[must_use]
	pub fn template(&self) -> &str {
		&self.template
	}

	#[must_use]
	pub fn parts(&self) -> &[Part] {
		&self.parts
	}

	/// Resolves the template. Unresolved keys (or a missing context) become empty strings.
	#[must_use]
	pub fn get(&self, context: Option<&dyn DataContext>) -> String {
		let mut text = String::with_capacity(self.template.len());
		for part in &self.parts {
			match part {
				Part::Literal(literal) => text.push_str(literal),
				Part::Interpolated(key) => {
					if let Some(value) = context.and_then(|context| context.get(key)) {
						text.push_str(&value)
					}
				}
			}
		}
		text
	}

	/// Recompiles and drops all subscriptions of the previous template.
	pub fn set(&mut self, template: impl Into<String>) {
		self.template = template.into();
		self.parts = compile(&self.template);
		self.subscriptions.clear();
		self.generation.set(self.generation.get() + 1);
	}

	/// Subscribes `on_change` to every interpolated key that isn't subscribed to `context` yet.
	///
	/// Subscriptions to any other context are dropped first. Returns how many subscriptions were added.
	pub fn bind(&mut self, context: &Rc<dyn DataContext>, on_change: &Rc<dyn Fn()>) -> usize {
		self.subscriptions.retain(|_, subscription| subscription.is_for(context));
		let mut added = 0;
		for part in &self.parts {
			let key = match part {
				Part::Interpolated(key) => key,
				Part::Literal(_) => continue,
			};
			if self.subscriptions.contains_key(key) {
				continue;
			}

			let generation = self.generation.clone();
			let expected = generation.get();
			let on_change = on_change.clone();
			let subscription = Subscription::new(
				context,
				key,
				Rc::new(move || {
					if generation.get() == expected {
						on_change()
					}
				}),
			);
			self.subscriptions.insert(key.clone(), subscription);
			added += 1;
		}
		if added > 0 {
			trace!(added, "Subscribed content binding.");
		}
		added
	}

	#[must_use]
	pub fn subscription_count(&self) -> usize {
		self.subscriptions.len()
	}
}
impl core::fmt::Debug for ContentBinder {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		let mut debug = f.debug_struct("ContentBinder");
		if cfg!(feature = "dangerous-logging") {
			debug.field("template", &self.template);
		}
		debug.field("parts", &self.parts.len()).field("subscriptions", &self.subscriptions.len()).finish()
	}
}
