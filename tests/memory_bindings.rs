use sdom::{
	binder::TagResolver,
	memory::{MemoryHost, Mutation, NodeId},
	Behavior, Capability, Config, DataContext, Decl, Engine, EventBinding, ManualTimer, PassReport, Resolution, Store, Uid,
};
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};

fn engine() -> (Engine<MemoryHost>, NodeId) {
	let mut host = MemoryHost::new();
	let body = host.create_root("body");
	(Engine::new(host, body, ManualTimer::new(), Config::new()), body)
}

fn sync(engine: &Engine<MemoryHost>) -> PassReport {
	engine.flush().expect("no pass was pending").expect("the pass failed")
}

fn render(engine: &Engine<MemoryHost>, node: NodeId) -> String {
	engine.with_host(|host| host.render(node)).unwrap()
}

fn click(engine: &Engine<MemoryHost>, uid: Uid) {
	let node = engine.host_node(uid).expect("not mounted");
	let handlers = engine.with_host(|host| host.handlers(node, "click")).unwrap();
	for handler in handlers {
		handler()
	}
}

fn counter(engine: &Engine<MemoryHost>, name: &str) -> Rc<Cell<usize>> {
	let count = Rc::new(Cell::new(0));
	let handler_count = count.clone();
	engine.register_handler(name, move || handler_count.set(handler_count.get() + 1)).unwrap();
	count
}

#[test]
fn handlers_fire_on_events() {
	let (engine, _) = engine();
	let count = counter(&engine, "count");
	let button = engine.create(Decl::element("button").on("click", "count").child(Decl::text("+1"))).unwrap();
	engine.set_children(engine.root(), vec![button]).unwrap();
	sync(&engine);

	assert_eq!(count.get(), 0);
	click(&engine, button);
	assert_eq!(count.get(), 1);

	engine.set_events(button, vec![]).unwrap();
	sync(&engine);
	click(&engine, button);
	assert_eq!(count.get(), 1);
}

#[test]
fn nodes_share_one_listener_per_handler() {
	let (engine, _) = engine();
	let count = counter(&engine, "count");
	let buttons: Vec<Uid> = (0..3).map(|_| engine.create(Decl::element("button").on("click", "count")).unwrap()).collect();
	engine.set_children(engine.root(), buttons.clone()).unwrap();
	sync(&engine);

	assert_eq!(engine.handler_bindings("count").unwrap(), 3);
	for &button in &buttons {
		click(&engine, button);
	}
	assert_eq!(count.get(), 3);

	engine.set_children(engine.root(), vec![buttons[0]]).unwrap();
	sync(&engine);
	assert_eq!(engine.handler_bindings("count").unwrap(), 1);

	engine.set_children(engine.root(), vec![]).unwrap();
	sync(&engine);
	assert_eq!(engine.handler_bindings("count").unwrap(), 0);
}

#[test]
fn re_registering_reaches_bound_listeners() {
	let (engine, _) = engine();
	let first = counter(&engine, "count");
	let button = engine.create(Decl::element("button").on("click", "count")).unwrap();
	engine.set_children(engine.root(), vec![button]).unwrap();
	sync(&engine);
	click(&engine, button);
	assert_eq!(first.get(), 1);
	engine.with_host(MemoryHost::take_log).unwrap();

	let second = counter(&engine, "count");
	click(&engine, button);
	assert_eq!((first.get(), second.get()), (1, 1));
	assert_eq!(engine.handler_bindings("count").unwrap(), 1);
	assert!(!engine.is_pending());
	assert!(engine.with_host(MemoryHost::take_log).unwrap().is_empty());
}

#[test]
fn changing_bindings_rebinds_only_the_difference() {
	let (engine, _) = engine();
	counter(&engine, "a");
	counter(&engine, "b");
	let node = engine.create(Decl::element("input").on("input", "a").on("change", "b")).unwrap();
	engine.set_children(engine.root(), vec![node]).unwrap();
	sync(&engine);
	engine.with_host(MemoryHost::take_log).unwrap();

	engine.set_events(node, vec![EventBinding::new("input", "a"), EventBinding::new("blur", "b")]).unwrap();
	sync(&engine);
	let host_node = engine.host_node(node).unwrap();
	assert_eq!(
		engine.with_host(MemoryHost::take_log).unwrap(),
		vec![
			Mutation::ListenerRemoved {
				node: host_node,
				event: "change".to_owned(),
			},
			Mutation::ListenerAdded {
				node: host_node,
				event: "blur".to_owned(),
			},
		]
	);
	assert_eq!(engine.handler_bindings("b").unwrap(), 1);
}

#[test]
fn unknown_handlers_fail_before_touching_the_host() {
	let (engine, body) = engine();
	let button = engine.create(Decl::element("button").on("click", "nowhere")).unwrap();
	engine.set_children(engine.root(), vec![button]).unwrap();

	let result = engine.flush().unwrap();
	assert_eq!(
		result,
		Err(sdom::Error::ListenerResolutionFailure {
			uid: button,
			event: "click".to_owned(),
			handler: "nowhere".to_owned(),
		})
	);
	assert!(!engine.is_mounted(button));
	assert_eq!(render(&engine, body), "<body></body>");

	// Registering the handler later lets the next pass succeed.
	counter(&engine, "nowhere");
	engine.request_sync(engine.root());
	sync(&engine);
	assert_eq!(render(&engine, body), "<body><button></button></body>");
}

#[test]
fn attribute_resolvers_can_bind_listeners() {
	let (engine, body) = engine();
	let navigations = counter(&engine, "navigate");
	engine
		.register_attribute_resolver("route", |_: Uid, _: &str, _: &str| Resolution::Listener {
			event: "click".to_owned(),
			handler: "navigate".to_owned(),
		})
		.unwrap();
	engine
		.register_attribute_resolver("href", |_: Uid, _: &str, value: &str| Resolution::Literal(format!("#{}", value)))
		.unwrap();

	let link = engine.create(Decl::element("a").attr("href", "/home").attr("route", "home")).unwrap();
	engine.set_children(engine.root(), vec![link]).unwrap();
	sync(&engine);

	assert_eq!(render(&engine, body), r##"<body><a href="#/home"></a></body>"##);
	click(&engine, link);
	assert_eq!(navigations.get(), 1);
	assert_eq!(engine.handler_bindings("navigate").unwrap(), 1);

	engine.set_attributes(link, vec![("href".to_owned(), "/home".to_owned())]).unwrap();
	sync(&engine);
	assert_eq!(engine.handler_bindings("navigate").unwrap(), 0);
}

#[test]
fn omitted_attributes_are_left_alone() {
	let (engine, _) = engine();
	engine.register_attribute_resolver("value", |_: Uid, _: &str, _: &str| Resolution::Omit).unwrap();
	let input = engine.create(Decl::element("input").attr("value", "ignored")).unwrap();
	engine.set_children(engine.root(), vec![input]).unwrap();
	sync(&engine);

	let node = engine.host_node(input).unwrap();
	assert_eq!(engine.with_host(|host| host.attribute(node, "value")).unwrap(), None);

	// Foreign writes to an omitted attribute survive patches.
	engine.with_host(|host| sdom::Host::set_attribute(host, &node, "value", "typed")).unwrap().unwrap();
	engine.push_attributes(input, vec![("name".to_owned(), "q".to_owned())]).unwrap();
	sync(&engine);
	assert_eq!(engine.with_host(|host| host.attribute(node, "value")).unwrap().as_deref(), Some("typed"));
}

struct Outlet {
	log: Rc<RefCell<Vec<String>>>,
}
impl Behavior for Outlet {
	fn capability(&self) -> Capability {
		Capability::RouteOutlet
	}

	fn host_tag(&self) -> Option<&str> {
		Some("div")
	}

	fn mounted(&self, uid: Uid) {
		self.log.borrow_mut().push(format!("mounted {}", uid))
	}

	fn unmounting(&self, uid: Uid) {
		self.log.borrow_mut().push(format!("unmounting {}", uid))
	}
}

struct Outlets(Rc<RefCell<Vec<String>>>);
impl TagResolver for Outlets {
	fn resolve(&self, tag: &str) -> Option<Rc<dyn Behavior>> {
		if tag == "router-outlet" {
			Some(Rc::new(Outlet { log: self.0.clone() }))
		} else {
			None
		}
	}
}

#[test]
fn tag_resolvers_attach_behaviors() {
	let (engine, body) = engine();
	let log = Rc::new(RefCell::new(Vec::new()));
	engine.register_tag_resolver(Outlets(log.clone())).unwrap();

	let outlet = engine.create(Decl::element("router-outlet").attr("name", "main")).unwrap();
	let page = engine.create(Decl::element("main").child(Decl::element("nav")).child(Decl::fragment())).unwrap();
	let fragment = engine.children(page).unwrap()[1];
	engine.push_children(fragment, vec![outlet]).unwrap();
	engine.set_children(engine.root(), vec![page]).unwrap();

	assert_eq!(engine.find_capability(engine.root(), Capability::RouteOutlet).unwrap(), vec![]);
	sync(&engine);

	assert_eq!(render(&engine, body), r#"<body><main><nav></nav><div name="main"></div></main></body>"#);
	assert_eq!(engine.find_capability(engine.root(), Capability::RouteOutlet).unwrap(), vec![outlet]);
	assert_eq!(engine.find_capability(engine.root(), Capability::RouteMatcher).unwrap(), vec![]);
	assert_eq!(*log.borrow(), vec![format!("mounted {}", outlet)]);

	engine.release(page).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), "<body></body>");
	assert_eq!(log.borrow().last(), Some(&format!("unmounting {}", outlet)));
}

struct Greeter {
	engine: Engine<MemoryHost>,
}
impl Behavior for Greeter {
	fn capability(&self) -> Capability {
		Capability::Component
	}

	fn mounted(&self, uid: Uid) {
		let greeting = self.engine.create(Decl::text("hello")).unwrap();
		self.engine.set_children(uid, vec![greeting]).unwrap();
	}
}

struct Greeters(Engine<MemoryHost>);
impl TagResolver for Greeters {
	fn resolve(&self, tag: &str) -> Option<Rc<dyn Behavior>> {
		if tag == "x-greeter" {
			Some(Rc::new(Greeter { engine: self.0.clone() }))
		} else {
			None
		}
	}
}

#[test]
fn hooks_may_mutate_the_tree() {
	let (engine, body) = engine();
	engine.register_tag_resolver(Greeters(engine.clone())).unwrap();
	let greeter = engine.create(Decl::element("x-greeter")).unwrap();
	engine.set_children(engine.root(), vec![greeter]).unwrap();

	sync(&engine);
	assert!(engine.is_pending());
	sync(&engine);
	assert_eq!(render(&engine, body), "<body><x-greeter>hello</x-greeter></body>");
}

#[test]
fn text_follows_its_data_context() {
	let (engine, body) = engine();
	let store = Store::new();
	store.set("Ada".to_owned(), "name");
	let context: Rc<dyn DataContext> = store.clone();

	let card = engine
		.create(
			Decl::element("section")
				.context(context.clone())
				.child(Decl::element("h2").child(Decl::text("{{name}}")))
				.child(Decl::element("p").child(Decl::text("Static"))),
		)
		.unwrap();
	engine.set_children(engine.root(), vec![card]).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), "<body><section><h2>Ada</h2><p>Static</p></section></body>");
	assert_eq!(store.subscriber_count("name"), 1);
	engine.with_host(MemoryHost::take_log).unwrap();

	store.set("Grace".to_owned(), "name");
	assert!(engine.is_pending());
	let report = sync(&engine);
	assert_eq!(report.patched, 1);
	assert_eq!(render(&engine, body), "<body><section><h2>Grace</h2><p>Static</p></section></body>");
	assert!(matches!(
		engine.with_host(MemoryHost::take_log).unwrap().as_slice(),
		[Mutation::SetText { text, .. }] if text == "Grace"
	));
	assert_eq!(store.subscriber_count("name"), 1);
}

#[test]
fn identical_text_is_not_written() {
	let (engine, _) = engine();
	let store = Store::new();
	store.set("same".to_owned(), "value");
	let context: Rc<dyn DataContext> = store.clone();

	let text = engine.create(Decl::text("same").context(context.clone())).unwrap();
	engine.set_children(engine.root(), vec![text]).unwrap();
	sync(&engine);
	engine.with_host(MemoryHost::take_log).unwrap();

	engine.set_content(text, "{{value}}").unwrap();
	let report = sync(&engine);
	assert_eq!(report.patched, 1);
	assert!(engine.with_host(MemoryHost::take_log).unwrap().is_empty());
}

#[test]
fn content_round_trip() {
	let (engine, _) = engine();
	let text = engine.create(Decl::text("")).unwrap();
	for literal in ["plain", "", "with } braces {", "unicode: ✓"] {
		engine.set_content(text, literal).unwrap();
		assert_eq!(engine.content(text).unwrap(), literal);
	}
}

#[test]
fn replacing_the_template_drops_old_subscriptions() {
	let (engine, body) = engine();
	let store = Store::new();
	let context: Rc<dyn DataContext> = store.clone();
	let text = engine.create(Decl::text("{{first}}").context(context.clone())).unwrap();
	engine.set_children(engine.root(), vec![text]).unwrap();
	sync(&engine);
	assert_eq!(store.subscriber_count("first"), 1);

	engine.set_content(text, "{{second}}").unwrap();
	assert_eq!(store.subscriber_count("first"), 0);
	sync(&engine);
	assert_eq!(store.subscriber_count("second"), 1);

	store.set("ignored".to_owned(), "first");
	assert!(!engine.is_pending());
	store.set("shown".to_owned(), "second");
	sync(&engine);
	assert_eq!(render(&engine, body), "<body>shown</body>");
}

#[test]
fn contexts_can_be_swapped() {
	let (engine, body) = engine();
	let (english, german) = (Store::new(), Store::new());
	english.set("Hello".to_owned(), "greeting");
	german.set("Hallo".to_owned(), "greeting");
	let (english_context, german_context): (Rc<dyn DataContext>, Rc<dyn DataContext>) = (english.clone(), german.clone());

	let page = engine.create(Decl::element("p").context(english_context).child(Decl::text("{{greeting}}!"))).unwrap();
	engine.set_children(engine.root(), vec![page]).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), "<body><p>Hello!</p></body>");

	engine.set_context(page, &german_context).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), "<body><p>Hallo!</p></body>");
	assert_eq!(english.subscriber_count("greeting"), 0);

	german.set("Servus".to_owned(), "greeting");
	sync(&engine);
	assert_eq!(render(&engine, body), "<body><p>Servus!</p></body>");
}

#[test]
fn moved_text_resolves_against_its_new_context() {
	let (engine, body) = engine();
	let (one, two) = (Store::new(), Store::new());
	one.set("one".to_owned(), "value");
	two.set("two".to_owned(), "value");
	let (one_context, two_context): (Rc<dyn DataContext>, Rc<dyn DataContext>) = (one.clone(), two.clone());

	let first = engine.create(Decl::fragment().context(one_context).child(Decl::text("{{value}}"))).unwrap();
	let second = engine.create(Decl::fragment().context(two_context)).unwrap();
	engine.set_children(engine.root(), vec![first, second]).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), "<body>one</body>");

	let text = engine.children(first).unwrap()[0];
	engine.push_children(second, vec![text]).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), "<body>two</body>");
	assert_eq!(one.subscriber_count("value"), 0);
	assert_eq!(two.subscriber_count("value"), 1);

	two.set("changed".to_owned(), "value");
	sync(&engine);
	assert_eq!(render(&engine, body), "<body>changed</body>");
}
