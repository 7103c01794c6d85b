//! The browser host, over `web-sys`.

use crate::{
	host::{Handler, Host, HostError},
	scheduler::Timer,
	tree::Uid,
};
use js_sys::{Function, Reflect};
use tracing::error;
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{Document, Element, Node, Text};

/// The JS property host nodes carry their virtual node's uid in.
const UID_KEY: &str = "__sdomUid";

fn host_error(call: &'static str, error: &JsValue) -> HostError {
	HostError::new(call, format!("{:?}", error))
}

/// Drives the DOM of `document`.
///
/// Nodes count as alive while they are connected, so the root has to stay attached to the document.
pub struct DomHost {
	document: Document,
}
impl DomHost {
	#[must_use]
	pub fn new(document: Document) -> Self {
		Self { document }
	}

	#[must_use]
	pub fn document(&self) -> &Document {
		&self.document
	}
}

impl Host for DomHost {
	type Node = Node;
	type Listener = Closure<dyn Fn()>;

	fn create_element(&mut self, tag: &str) -> Result<Node, HostError> {
		self.document
			.create_element(tag)
			.map(Into::into)
			.map_err(|error| host_error("create_element", &error))
	}

	fn create_text_node(&mut self, text: &str) -> Node {
		self.document.create_text_node(text).into()
	}

	#[allow(clippy::cast_precision_loss)]
	fn tag_uid(&mut self, node: &Node, uid: Uid) {
		if let Err(error) = Reflect::set(node, &JsValue::from_str(UID_KEY), &JsValue::from_f64(uid.get() as f64)) {
			error!("Failed to tag host node with {}: {:?}", uid, error)
		}
	}

	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	fn uid_of(&self, node: &Node) -> Option<Uid> {
		let value = Reflect::get(node, &JsValue::from_str(UID_KEY)).ok()?;
		value.as_f64().map(|raw| Uid::from_raw(raw as u64))
	}

	fn is_alive(&self, node: &Node) -> bool {
		node.is_connected()
	}

	fn tag_name(&self, node: &Node) -> Option<String> {
		node.dyn_ref::<Element>().map(Element::tag_name)
	}

	fn is_text(&self, node: &Node) -> bool {
		node.dyn_ref::<Text>().is_some()
	}

	fn text_content(&self, node: &Node) -> String {
		node.text_content().unwrap_or_default()
	}

	fn set_text_content(&mut self, node: &Node, text: &str) {
		node.set_text_content(Some(text))
	}

	fn attributes(&self, node: &Node) -> Vec<(String, String)> {
		let attributes = match node.dyn_ref::<Element>() {
			Some(element) => element.attributes(),
			None => return Vec::new(),
		};
		(0..attributes.length())
			.filter_map(|i| attributes.item(i))
			.map(|attribute| (attribute.name(), attribute.value()))
			.collect()
	}

	fn set_attribute(&mut self, node: &Node, name: &str, value: &str) -> Result<(), HostError> {
		let element = node.dyn_ref::<Element>().ok_or_else(|| HostError::new("set_attribute", "not an element"))?;
		element.set_attribute(name, value).map_err(|error| host_error("set_attribute", &error))
	}

	fn remove_attribute(&mut self, node: &Node, name: &str) -> Result<(), HostError> {
		let element = node.dyn_ref::<Element>().ok_or_else(|| HostError::new("remove_attribute", "not an element"))?;
		element.remove_attribute(name).map_err(|error| host_error("remove_attribute", &error))
	}

	fn child_nodes(&self, parent: &Node) -> Vec<Node> {
		let child_nodes = parent.child_nodes();
		(0..child_nodes.length()).filter_map(|i| child_nodes.item(i)).collect()
	}

	fn parent_node(&self, node: &Node) -> Option<Node> {
		node.parent_node()
	}

	fn first_child(&self, parent: &Node) -> Option<Node> {
		parent.first_child()
	}

	fn next_sibling(&self, node: &Node) -> Option<Node> {
		node.next_sibling()
	}

	fn insert_before(&mut self, parent: &Node, child: &Node, reference: Option<&Node>) -> Result<(), HostError> {
		parent
			.insert_before(child, reference)
			.map(drop)
			.map_err(|error| host_error("insert_before", &error))
	}

	fn remove_child(&mut self, parent: &Node, child: &Node) -> Result<(), HostError> {
		parent.remove_child(child).map(drop).map_err(|error| host_error("remove_child", &error))
	}

	fn create_listener(&mut self, handler: Handler) -> Closure<dyn Fn()> {
		Closure::wrap(Box::new(move || handler()) as Box<dyn Fn()>)
	}

	fn add_event_listener(&mut self, node: &Node, event: &str, listener: &Closure<dyn Fn()>) -> Result<(), HostError> {
		node.add_event_listener_with_callback(event, listener.as_ref().unchecked_ref())
			.map_err(|error| host_error("add_event_listener", &error))
	}

	fn remove_event_listener(&mut self, node: &Node, event: &str, listener: &Closure<dyn Fn()>) -> Result<(), HostError> {
		node.remove_event_listener_with_callback(event, listener.as_ref().unchecked_ref())
			.map_err(|error| host_error("remove_event_listener", &error))
	}
}

/// Fires through a zero-delay `setTimeout`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DomTimer;
impl Timer for DomTimer {
	fn arm(&self, fire: Box<dyn FnOnce()>) {
		let window = match web_sys::window() {
			Some(window) => window,
			None => {
				error!("No window to arm a timer on. The pending sync will only run on flush.");
				return;
			}
		};
		let callback = Closure::once_into_js(move || fire());
		if let Err(error) = window.set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref::<Function>(), 0) {
			error!("Failed to arm sync timer: {:?}", error)
		}
	}
}
