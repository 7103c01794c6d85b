//! Reads pre-existing host content back into declarations, so it can be adopted instead of recreated.

use crate::{host::Host, tree::Decl};
use tracing::{trace, warn};

/// The host nodes a loaded [`Decl`] was read from, in the same shape.
#[derive(Debug, Clone)]
pub struct Shape<N> {
	pub host: N,
	pub children: Vec<Shape<N>>,
}

pub fn load_child_nodes<H: Host>(host: &H, parent: &H::Node) -> Vec<(Decl, Shape<H::Node>)> {
	host.child_nodes(parent)
		.into_iter()
		.filter_map(|child| {
			if host.tag_name(&child).is_some() {
				Some(load_element(host, child))
			} else if host.is_text(&child) {
				let text = host.text_content(&child);
				if cfg!(feature = "dangerous-logging") {
					trace!(?text, "Loaded text node.");
				}
				Some((Decl::text(text), Shape { host: child, children: Vec::new() }))
			} else {
				warn!("Skipping unrecognised child node: {:?}", child);
				None
			}
		})
		.collect()
}

pub fn load_element<H: Host>(host: &H, element: H::Node) -> (Decl, Shape<H::Node>) {
	let tag = host.tag_name(&element).unwrap_or_default();
	trace!(%tag, "Loading element.");
	let mut decl = load_attributes(host, &element, Decl::element(tag));
	let mut children = Vec::new();
	for (child, shape) in load_child_nodes(host, &element) {
		decl = decl.child(child);
		children.push(shape);
	}
	(decl, Shape { host: element, children })
}

pub fn load_attributes<H: Host>(host: &H, element: &H::Node, decl: Decl) -> Decl {
	host.attributes(element).into_iter().fold(decl, |decl, (name, value)| decl.attr(name, value))
}
