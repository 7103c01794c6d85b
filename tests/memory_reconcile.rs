use sdom::{
	memory::{MemoryHost, Mutation, NodeId},
	Config, Decl, Engine, ManualTimer, PassReport, Uid,
};

fn engine() -> (Engine<MemoryHost>, NodeId) {
	let mut host = MemoryHost::new();
	let body = host.create_root("body");
	(Engine::new(host, body, ManualTimer::new(), Config::new()), body)
}

fn sync(engine: &Engine<MemoryHost>) -> PassReport {
	engine.flush().expect("no pass was pending").expect("the pass failed")
}

fn take_log(engine: &Engine<MemoryHost>) -> Vec<Mutation> {
	engine.with_host(MemoryHost::take_log).unwrap()
}

fn render(engine: &Engine<MemoryHost>, node: NodeId) -> String {
	engine.with_host(|host| host.render(node)).unwrap()
}

fn host(engine: &Engine<MemoryHost>, uid: Uid) -> NodeId {
	engine.host_node(uid).expect("not mounted")
}

/// `<div>` with three `<p id=..>` children, mounted.
fn three_paragraphs(engine: &Engine<MemoryHost>) -> (Uid, [Uid; 3]) {
	let list = engine.create(Decl::element("div")).unwrap();
	let items = ["a", "b", "c"].map(|id| engine.create(Decl::element("p").attr("id", id)).unwrap());
	engine.set_children(list, items.to_vec()).unwrap();
	engine.set_children(engine.root(), vec![list]).unwrap();
	sync(engine);
	take_log(engine);
	(list, items)
}

#[test]
fn list_push_keeps_existing_items() {
	let (engine, body) = engine();
	let ul = engine.create(Decl::element("ul").child(Decl::element("li").child(Decl::text("a")))).unwrap();
	engine.set_children(engine.root(), vec![ul]).unwrap();

	let report = sync(&engine);
	assert_eq!(report.mounted, 3);
	assert_eq!(render(&engine, body), "<body><ul><li>a</li></ul></body>");

	let first = engine.children(ul).unwrap()[0];
	let first_host = host(&engine, first);
	take_log(&engine);

	let second = engine.create(Decl::element("li").child(Decl::text("b"))).unwrap();
	engine.push_children(ul, vec![second]).unwrap();
	let report = sync(&engine);

	assert_eq!(render(&engine, body), "<body><ul><li>a</li><li>b</li></ul></body>");
	assert_eq!(host(&engine, first), first_host);
	assert_eq!(report.mounted, 2);
	assert_eq!(report.unmounted, 0);

	let log = take_log(&engine);
	assert_eq!(log.iter().filter(|m| matches!(m, Mutation::CreateElement { .. })).count(), 1);
	assert!(!log.iter().any(|m| matches!(m, Mutation::Remove { .. })));
}

#[test]
fn second_pass_is_a_no_op() {
	let (engine, body) = engine();
	let tree = engine
		.create(Decl::element("main").attr("class", "app").child(Decl::element("h1").child(Decl::text("Title"))).child(Decl::fragment().child(Decl::element("hr"))))
		.unwrap();
	engine.set_children(engine.root(), vec![tree]).unwrap();
	sync(&engine);
	let before = render(&engine, body);
	take_log(&engine);

	engine.request_sync(engine.root());
	let report = sync(&engine);
	assert!(take_log(&engine).is_empty());
	assert_eq!((report.patched, report.mounted, report.unmounted, report.moved), (0, 0, 0, 0));
	assert_eq!(render(&engine, body), before);

	let heading = engine.children(tree).unwrap()[0];
	engine.request_sync(heading);
	let report = sync(&engine);
	assert!(take_log(&engine).is_empty());
	assert_eq!(report.target, Some(heading));
	assert_eq!(report.skipped, 1);
}

#[test]
fn removal_touches_only_the_removed_node() {
	let (engine, _) = engine();
	let (list, [a, b, c]) = three_paragraphs(&engine);
	let hosts = [a, b, c].map(|uid| host(&engine, uid));

	engine.set_children(list, vec![a, c]).unwrap();
	let report = sync(&engine);

	assert_eq!(take_log(&engine), vec![Mutation::Remove { parent: host(&engine, list), node: hosts[1] }]);
	assert_eq!(report.unmounted, 1);
	assert_eq!(host(&engine, a), hosts[0]);
	assert_eq!(host(&engine, c), hosts[2]);
	assert!(!engine.is_mounted(b));
}

#[test]
fn insertion_lands_between_its_siblings() {
	let (engine, body) = engine();
	let (list, [a, b, c]) = three_paragraphs(&engine);
	engine.set_children(list, vec![a, c]).unwrap();
	sync(&engine);
	take_log(&engine);

	engine.set_children(list, vec![a, b, c]).unwrap();
	let report = sync(&engine);
	assert_eq!(report.mounted, 1);

	let b_host = host(&engine, b);
	let log = take_log(&engine);
	assert!(log.contains(&Mutation::Insert {
		parent: host(&engine, list),
		node: b_host,
		before: Some(host(&engine, c)),
	}));
	assert_eq!(render(&engine, body), r#"<body><div><p id="a"></p><p id="b"></p><p id="c"></p></div></body>"#);
}

#[test]
fn insertion_at_the_front() {
	let (engine, body) = engine();
	let (list, [a, b, c]) = three_paragraphs(&engine);
	engine.set_children(list, vec![b, c]).unwrap();
	sync(&engine);

	engine.set_children(list, vec![a, b, c]).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), r#"<body><div><p id="a"></p><p id="b"></p><p id="c"></p></div></body>"#);
}

#[test]
fn attribute_changes_are_minimal() {
	let (engine, _) = engine();
	let link = engine.create(Decl::element("a").attr("href", "/a")).unwrap();
	engine.set_children(engine.root(), vec![link]).unwrap();
	sync(&engine);
	take_log(&engine);

	engine.set_attributes(link, vec![("href".to_owned(), "/b".to_owned()), ("title".to_owned(), "x".to_owned())]).unwrap();
	let report = sync(&engine);
	let node = host(&engine, link);
	assert_eq!(
		take_log(&engine),
		vec![
			Mutation::AttributeUpdated {
				node,
				name: "href".to_owned(),
				value: "/b".to_owned(),
			},
			Mutation::AttributeAdded {
				node,
				name: "title".to_owned(),
				value: "x".to_owned(),
			},
		]
	);
	assert_eq!(report.patched, 1);

	engine.set_attributes(link, vec![("title".to_owned(), "x".to_owned())]).unwrap();
	sync(&engine);
	assert_eq!(take_log(&engine), vec![Mutation::AttributeRemoved { node, name: "href".to_owned() }]);
}

#[test]
fn push_attributes_keeps_the_rest() {
	let (engine, body) = engine();
	let input = engine.create(Decl::element("input").attr("type", "text").attr("name", "q")).unwrap();
	engine.set_children(engine.root(), vec![input]).unwrap();
	sync(&engine);

	engine.push_attributes(input, vec![("name".to_owned(), "query".to_owned())]).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), r#"<body><input type="text" name="query"></input></body>"#);
}

#[test]
fn out_of_order_children_are_moved() {
	let (engine, body) = engine();
	let (list, [a, b, c]) = three_paragraphs(&engine);
	let hosts = [a, b, c].map(|uid| host(&engine, uid));

	engine.set_children(list, vec![c, a, b]).unwrap();
	let report = sync(&engine);

	assert_eq!(report.moved, 2);
	assert_eq!(report.mounted, 0);
	assert_eq!(report.unmounted, 0);
	assert_eq!([a, b, c].map(|uid| host(&engine, uid)), hosts);
	assert_eq!(render(&engine, body), r#"<body><div><p id="c"></p><p id="a"></p><p id="b"></p></div></body>"#);
	assert!(!take_log(&engine).iter().any(|m| matches!(m, Mutation::CreateElement { .. } | Mutation::Remove { .. })));
}

#[test]
fn fragments_are_transparent() {
	let (engine, body) = engine();
	let header = engine.create(Decl::element("header")).unwrap();
	let fragment = engine.create(Decl::fragment().child(Decl::element("i")).child(Decl::element("b"))).unwrap();
	let footer = engine.create(Decl::element("footer")).unwrap();
	engine.set_children(engine.root(), vec![header, fragment, footer]).unwrap();
	sync(&engine);

	assert_eq!(render(&engine, body), "<body><header></header><i></i><b></b><footer></footer></body>");
	assert!(engine.is_mounted(fragment));
	assert_eq!(engine.host_node(fragment), None);

	let bold = engine.children(fragment).unwrap()[1];
	engine.set_children(fragment, vec![bold]).unwrap();
	let report = sync(&engine);
	assert_eq!(report.unmounted, 1);
	assert_eq!(render(&engine, body), "<body><header></header><b></b><footer></footer></body>");
}

#[test]
fn removing_a_fragment_removes_its_content() {
	let (engine, body) = engine();
	let fragment = engine.create(Decl::fragment().child(Decl::element("i")).child(Decl::fragment().child(Decl::text("deep")))).unwrap();
	let keep = engine.create(Decl::element("span")).unwrap();
	engine.set_children(engine.root(), vec![fragment, keep]).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), "<body><i></i>deep<span></span></body>");

	engine.set_children(engine.root(), vec![keep]).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), "<body><span></span></body>");
	assert!(!engine.is_mounted(fragment));
	engine
		.with_identity_map(|map| assert_eq!(map.len(), 2, "only the root and the span should be left"))
		.unwrap();
}

#[test]
fn tag_change_replaces_the_host_node() {
	let (engine, body) = engine();
	let node = engine.create(Decl::element("span").attr("class", "c").child(Decl::text("t"))).unwrap();
	let sibling = engine.create(Decl::element("hr")).unwrap();
	engine.set_children(engine.root(), vec![node, sibling]).unwrap();
	sync(&engine);
	let old = host(&engine, node);

	engine.set_tag(node, Some("em".to_owned())).unwrap();
	let report = sync(&engine);

	assert_ne!(host(&engine, node), old);
	assert_eq!((report.unmounted, report.mounted), (2, 2));
	assert_eq!(render(&engine, body), r#"<body><em class="c">t</em><hr></hr></body>"#);
}

#[test]
fn element_becoming_abstract_hands_its_children_up() {
	let (engine, body) = engine();
	let wrapper = engine.create(Decl::element("div").child(Decl::element("i")).child(Decl::element("b"))).unwrap();
	engine.set_children(engine.root(), vec![wrapper]).unwrap();
	sync(&engine);

	let children = engine.children(wrapper).unwrap();
	let hosts: Vec<NodeId> = children.iter().map(|&child| host(&engine, child)).collect();

	engine.set_tag(wrapper, None).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), "<body><i></i><b></b></body>");
	assert!(engine.is_mounted(wrapper));
	assert_eq!(engine.host_node(wrapper), None);

	engine.set_tag(wrapper, Some("section".to_owned())).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), "<body><section><i></i><b></b></section></body>");
	assert!(children.iter().all(|&child| engine.is_mounted(child)));
	assert_eq!(children.iter().map(|&child| host(&engine, child)).collect::<Vec<_>>(), hosts);
}

#[test]
fn text_becoming_an_element() {
	let (engine, body) = engine();
	let node = engine.create(Decl::text("plain")).unwrap();
	engine.set_children(engine.root(), vec![node]).unwrap();
	sync(&engine);

	engine.clear_content(node).unwrap();
	engine.set_tag(node, Some("br".to_owned())).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), "<body><br></br></body>");
}

#[test]
fn reparenting_moves_without_duplicates() {
	let (engine, body) = engine();
	let left = engine.create(Decl::element("ol")).unwrap();
	let right = engine.create(Decl::element("ul")).unwrap();
	let item = engine.create(Decl::element("li").child(Decl::text("x"))).unwrap();
	engine.push_children(left, vec![item]).unwrap();
	engine.set_children(engine.root(), vec![left, right]).unwrap();
	sync(&engine);

	let before = host(&engine, item);

	engine.push_children(right, vec![item]).unwrap();
	assert_eq!(engine.parent(item).unwrap(), Some(right));
	assert!(engine.children(left).unwrap().is_empty());
	let report = sync(&engine);
	assert_eq!(render(&engine, body), "<body><ol></ol><ul><li>x</li></ul></body>");
	assert!(engine.is_mounted(item));
	assert_eq!(host(&engine, item), before);
	assert_eq!((report.moved, report.mounted, report.unmounted), (1, 0, 0));
}

#[test]
fn foreign_host_children_are_left_alone() {
	let mut host = MemoryHost::new();
	let body = host.create_root("body");
	let foreign = sdom::Host::create_element(&mut host, "aside").unwrap();
	sdom::Host::append_child(&mut host, &body, &foreign).unwrap();
	let engine = Engine::new(host, body, ManualTimer::new(), Config::new());

	let node = engine.create(Decl::element("p")).unwrap();
	engine.set_children(engine.root(), vec![node]).unwrap();
	sync(&engine);
	engine.set_children(engine.root(), vec![]).unwrap();
	sync(&engine);
	assert_eq!(render(&engine, body), "<body><aside></aside></body>");
}
