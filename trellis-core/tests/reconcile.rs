//! Reconciler Integration Tests
//!
//! Host mutation counts of common diffs, refs, retained nodes, extension
//! nodes, and error routing out of the reconciler.

use std::cell::RefCell;
use std::rc::Rc;

use tracing_subscriber::EnvFilter;
use trellis_core::error::Result;
use trellis_core::reactive::{ReactiveMap, Runtime, Signal};
use trellis_core::render::{HostHandle, HostOp, HostOps, MemoryHost, Renderer};
use trellis_core::vdom::{
    Component, NodeExtension, NodeRef, PropValue, RendererInternals, RetainHook, VNode,
};
use trellis_core::{ErrorPhase, RuntimeError};

/// Route `tracing` output through the test harness; `RUST_LOG` selects it.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (Runtime, Renderer<MemoryHost>, HostHandle) {
    init_tracing();
    let rt = Runtime::new();
    let renderer = Renderer::new(&rt, MemoryHost::new());
    let root = renderer.host().create_root();
    (rt, renderer, root)
}

fn keyed_list(keys: &[&str]) -> VNode {
    VNode::element("ul").children(
        keys.iter()
            .map(|k| VNode::element("li").key(*k).text_content(*k)),
    )
}

// ---- Minimality ----

fn page(badge: &Rc<Component>) -> VNode {
    VNode::element("main")
        .prop("class", "page")
        .prop("id", 7i64)
        .children([
            VNode::text("title"),
            VNode::comment("slot"),
            VNode::fragment([VNode::element("em").text_content("x"), VNode::text("y")]),
            VNode::component(badge).prop("label", "new"),
            keyed_list(&["a", "b"]),
        ])
}

#[test]
fn identical_tree_patches_to_nothing() {
    let (_rt, renderer, root) = setup();
    let badge = Component::new("badge", |_ctx| {
        |props: &ReactiveMap<PropValue>| {
            let label = props
                .get("label")
                .and_then(|p| p.as_data().and_then(|v| v.as_str().map(String::from)))
                .unwrap_or_default();
            VNode::element("span").text_content(label)
        }
    });

    renderer.render(Some(page(&badge)), root).unwrap();
    renderer.host().clear_ops();
    renderer.render(Some(page(&badge)), root).unwrap();

    assert_eq!(renderer.host().ops(), Vec::<HostOp>::new());
}

#[test]
fn mount_then_unmount_leaves_container_empty() {
    let (_rt, renderer, root) = setup();
    let badge = Component::from_render("badge", || VNode::text("b"));

    renderer.render(Some(page(&badge)), root).unwrap();
    assert_eq!(renderer.host().children(root).len(), 1);

    renderer.render(None, root).unwrap();
    assert!(renderer.host().children(root).is_empty());
    assert_eq!(renderer.host().serialize(root), "");
}

#[test]
fn keyed_reorder_moves_only_outside_stable_run() {
    let (_rt, renderer, root) = setup();

    renderer.render(Some(keyed_list(&["a", "b", "c", "d"])), root).unwrap();
    let ul = renderer.host().children(root)[0];
    let before = renderer.host().children(ul);
    let (a, b) = (before[0], before[1]);

    renderer.host().clear_ops();
    renderer.render(Some(keyed_list(&["c", "d", "a", "e"])), root).unwrap();

    assert_eq!(
        renderer.host().serialize(root),
        "<ul><li>c</li><li>d</li><li>a</li><li>e</li></ul>"
    );
    assert_eq!(renderer.host().removals(), vec![b]);
    assert_eq!(renderer.host().moves(), vec![a]);
    let created: Vec<_> = renderer
        .host()
        .ops()
        .into_iter()
        .filter(HostOp::is_create)
        .collect();
    assert_eq!(created.len(), 1);
}

#[test]
fn changed_props_only() {
    let (_rt, renderer, root) = setup();
    let link = |class: &str| {
        VNode::element("a")
            .prop("href", "/home")
            .prop("class", class)
    };

    renderer.render(Some(link("idle")), root).unwrap();
    renderer.host().clear_ops();
    renderer.render(Some(link("active")), root).unwrap();

    let ops = renderer.host().ops();
    assert_eq!(ops.len(), 1);
    assert!(matches!(&ops[0], HostOp::PatchProp { key, .. } if key == "class"));
    assert_eq!(
        renderer.host().serialize(root),
        r#"<a href="/home" class="active"></a>"#
    );
}

// ---- Refs ----

#[test]
fn element_ref_follows_mount_and_unmount() {
    let (_rt, renderer, root) = setup();
    let input = NodeRef::new();

    renderer
        .render(
            Some(VNode::element("form").child(VNode::element("input").node_ref(&input))),
            root,
        )
        .unwrap();
    let form = renderer.host().children(root)[0];
    assert_eq!(input.host(), renderer.host().children(form).first().copied());

    renderer.render(Some(VNode::element("form")), root).unwrap();
    assert!(!input.is_set());
}

#[test]
fn component_ref_points_at_instance() {
    let (_rt, renderer, root) = setup();
    let def = Component::from_render("panel", || VNode::element("section"));
    let panel = NodeRef::new();

    renderer
        .render(Some(VNode::component(&def).node_ref(&panel)), root)
        .unwrap();
    let instance = panel.instance().unwrap();
    assert_eq!(instance.name(), "panel");
    assert!(instance.is_mounted());

    renderer.render(None, root).unwrap();
    assert!(panel.get().is_none());
    assert!(instance.is_unmounted());
}

// ---- Retained nodes ----

struct Stash {
    storage: HostHandle,
    kept: RefCell<Vec<HostHandle>>,
}

impl RetainHook for Stash {
    fn retain(&self, node: &VNode, internals: &dyn RendererInternals) -> Result<()> {
        let el = node.el().ok_or(RuntimeError::NotMounted { kind: "element" })?;
        internals.host().insert(el, self.storage, None)?;
        self.kept.borrow_mut().push(el);
        Ok(())
    }
}

#[test]
fn retained_node_moves_to_storage() {
    let (_rt, renderer, root) = setup();
    let storage = renderer.host().create_root();
    let stash = Rc::new(Stash {
        storage,
        kept: RefCell::new(Vec::new()),
    });

    let hook: Rc<dyn RetainHook> = stash.clone();
    renderer
        .render(
            Some(VNode::element("div").child(VNode::element("p").text_content("kept").retain(hook))),
            root,
        )
        .unwrap();
    renderer.host().clear_ops();
    renderer.render(Some(VNode::element("div")), root).unwrap();

    assert_eq!(renderer.host().serialize(root), "<div></div>");
    assert_eq!(renderer.host().serialize(storage), "<p>kept</p>");
    assert!(renderer.host().removals().is_empty());
    assert_eq!(stash.kept.borrow().len(), 1);
}

// ---- Extension nodes ----

/// Renders its children into another container, leaving a placeholder
/// comment in place.
struct Portal {
    target: HostHandle,
}

impl NodeExtension for Portal {
    fn name(&self) -> &str {
        "portal"
    }

    fn mount(
        &self,
        node: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
        internals: &dyn RendererInternals,
    ) -> Result<()> {
        let placeholder = internals.host().create_comment("portal")?;
        internals.host().insert(placeholder, container, anchor)?;
        node.set_el(Some(placeholder));
        if let Some(children) = node.children_mut() {
            internals.mount_children(children, self.target, None)?;
        }
        Ok(())
    }

    fn update(
        &self,
        prev: &mut VNode,
        next: &mut VNode,
        _container: HostHandle,
        _anchor: Option<HostHandle>,
        internals: &dyn RendererInternals,
    ) -> Result<()> {
        next.set_el(prev.el());
        internals.patch_children(prev, next, self.target, None)
    }

    fn unmount(
        &self,
        node: &mut VNode,
        do_remove: bool,
        internals: &dyn RendererInternals,
    ) -> Result<()> {
        if let Some(children) = node.children_mut() {
            for child in children {
                internals.unmount(child, true)?;
            }
        }
        if let (true, Some(el)) = (do_remove, node.el()) {
            internals.host().remove(el)?;
        }
        Ok(())
    }

    fn move_to(
        &self,
        node: &VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
        internals: &dyn RendererInternals,
    ) -> Result<()> {
        if let Some(el) = node.el() {
            internals.host().insert(el, container, anchor)?;
        }
        Ok(())
    }
}

#[test]
fn extension_renders_elsewhere() {
    let (_rt, renderer, root) = setup();
    let overlay = renderer.host().create_root();
    let portal: Rc<dyn NodeExtension> = Rc::new(Portal { target: overlay });

    let view = |msg: &str| {
        VNode::element("div").children([
            VNode::text("body"),
            VNode::extension(portal.clone()).child(VNode::element("dialog").text_content(msg)),
        ])
    };

    renderer.render(Some(view("hi")), root).unwrap();
    assert_eq!(renderer.host().serialize(root), "<div>body<!--portal--></div>");
    assert_eq!(renderer.host().serialize(overlay), "<dialog>hi</dialog>");

    renderer.render(Some(view("bye")), root).unwrap();
    assert_eq!(renderer.host().serialize(overlay), "<dialog>bye</dialog>");

    renderer.render(None, root).unwrap();
    assert_eq!(renderer.host().serialize(root), "");
    assert_eq!(renderer.host().serialize(overlay), "");
}

// ---- Errors and warnings ----

#[test]
fn host_failure_goes_to_handler_as_render_error() {
    let (rt, renderer, root) = setup();
    let phases = Rc::new(RefCell::new(Vec::new()));
    let p = phases.clone();
    rt.set_error_handler(move |err, phase| {
        assert!(matches!(err, RuntimeError::Host(_)));
        p.borrow_mut().push(phase);
        Ok(())
    });

    renderer.host().fail_next("create_element", "out of memory");
    renderer.render(Some(VNode::element("div")), root).unwrap();
    assert_eq!(*phases.borrow(), vec![ErrorPhase::Render]);
}

#[test]
fn host_failure_propagates_without_handler() {
    let (_rt, renderer, root) = setup();
    renderer.host().fail_next("insert", "detached");

    let err = renderer.render(Some(VNode::text("x")), root).unwrap_err();
    match err {
        RuntimeError::Host(host) => assert_eq!(host.op, "insert"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn scheduled_rerender_failure_is_routed_once() {
    let (rt, renderer, root) = setup();
    let phases = Rc::new(RefCell::new(Vec::new()));
    let p = phases.clone();
    rt.set_error_handler(move |_, phase| {
        p.borrow_mut().push(phase);
        Ok(())
    });

    let count = Signal::new(&rt, 0);
    let c = count.clone();
    renderer
        .mount(root, move || VNode::element("b").text_content(c.get().to_string()))
        .unwrap();

    renderer.host().fail_next("set_element_text", "busy");
    count.set(1);
    rt.tick().unwrap();
    assert_eq!(*phases.borrow(), vec![ErrorPhase::Render]);

    // the component keeps working afterwards
    count.set(2);
    rt.tick().unwrap();
    assert_eq!(renderer.host().serialize(root), "<b>2</b>");
}

#[test]
fn duplicate_keys_are_reported() {
    let (rt, renderer, root) = setup();
    let warnings = Rc::new(RefCell::new(Vec::new()));
    let w = warnings.clone();
    rt.set_warn_handler(move |warning| w.borrow_mut().push(warning.clone()));

    renderer.render(Some(keyed_list(&["a", "b"])), root).unwrap();
    renderer.render(Some(keyed_list(&["c", "x", "x"])), root).unwrap();

    assert_eq!(
        *warnings.borrow(),
        vec![RuntimeError::DuplicateSiblingKey { key: "x".into() }]
    );
}

#[test]
fn duplicate_old_keys_do_not_leak_host_nodes() {
    let (_rt, renderer, root) = setup();
    let list = |items: &[(&str, &str)]| {
        VNode::element("ul").children(
            items
                .iter()
                .map(|(key, text)| VNode::element("li").key(*key).text_content(*text)),
        )
    };

    renderer
        .render(Some(list(&[("x", "1"), ("x", "2"), ("z", "z")])), root)
        .unwrap();
    let ul = renderer.host().children(root)[0];
    let before = renderer.host().children(ul);

    renderer.host().clear_ops();
    renderer
        .render(Some(list(&[("z", "z"), ("x", "x")])), root)
        .unwrap();

    assert_eq!(
        renderer.host().serialize(root),
        "<ul><li>z</li><li>x</li></ul>"
    );
    // the second `x` goes; `z` is reused rather than recreated
    assert_eq!(renderer.host().removals(), vec![before[1]]);
    assert!(!renderer.host().ops().iter().any(HostOp::is_create));
}
