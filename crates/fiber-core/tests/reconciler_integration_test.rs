//! End-to-end scenarios through the public reconciler API, rendered into the
//! in-memory host and driven by the manual clock.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fiber_core::{
    current_fiber, deps, try_use_state, use_callback, use_effect, use_reducer, use_state, Child,
    Component, Destroy, Dispatch, Element, FiberError, FiberId, HostOp, ManualClock, MemoryHost,
    NodeId, Props, Reconciler, RootId, SetState, NO_WORK,
};

struct App {
    clock: Rc<ManualClock>,
    reconciler: Reconciler<MemoryHost>,
    root: RootId,
    container: NodeId,
}

impl App {
    fn new() -> Self {
        let clock = ManualClock::new();
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let reconciler = Reconciler::new(host, clock.clone());
        let root = reconciler.create_container(container);
        Self {
            clock,
            reconciler,
            root,
            container,
        }
    }

    fn mount(&self, element: impl Into<Child>) {
        self.reconciler
            .update_container_sync(element, self.root)
            .expect("render failed");
    }

    fn text(&self) -> String {
        self.reconciler
            .with_host(|host| host.text_content(self.container))
    }

    fn children_of(&self, node: NodeId) -> Vec<NodeId> {
        self.reconciler.with_host(|host| host.children(node).to_vec())
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Todos {
    next_id: u32,
    items: Vec<(u32, &'static str)>,
}

#[derive(Clone, Debug)]
enum TodoAction {
    Add(&'static str),
    Remove(u32),
    Reverse,
}

fn reduce_todos(todos: &Todos, action: TodoAction) -> Todos {
    let mut next = todos.clone();
    match action {
        TodoAction::Add(label) => {
            next.items.push((next.next_id, label));
            next.next_id += 1;
        }
        TodoAction::Remove(id) => next.items.retain(|(item, _)| *item != id),
        TodoAction::Reverse => next.items.reverse(),
    }
    next
}

fn todo_list(slot: &Rc<RefCell<Option<Dispatch<TodoAction>>>>) -> Component {
    let slot = slot.clone();
    Component::new("TodoList", move |_| {
        let (todos, dispatch) = use_reducer(
            reduce_todos,
            Todos {
                next_id: 0,
                items: Vec::new(),
            },
        );
        *slot.borrow_mut() = Some(dispatch);
        let items = todos.items.iter().map(|(id, label)| {
            Element::host("li", Props::with_children(*label))
                .with_key(&id.to_string())
                .into()
        });
        Element::host("ul", Props::with_children(Child::list(items))).into()
    })
}

#[test]
fn first_mount_of_text_creates_and_appends_once() {
    let app = App::new();
    app.mount("hi");
    let operations = app.reconciler.with_host(|host| host.operations().to_vec());
    let text = app.children_of(app.container)[0];
    assert_eq!(
        operations,
        vec![
            HostOp::CreateText {
                id: text,
                text: "hi".to_owned()
            },
            HostOp::AppendChild {
                parent: app.container,
                child: text
            },
        ]
    );
}

#[test]
fn keyed_todo_items_keep_their_nodes() {
    let app = App::new();
    let slot = Rc::new(RefCell::new(None));
    let list = todo_list(&slot);
    app.mount(Element::component(&list, Props::new()));
    let dispatch = slot.borrow().clone().expect("list rendered");

    app.reconciler
        .flush_sync(|| {
            dispatch.dispatch(TodoAction::Add("milk"));
            dispatch.dispatch(TodoAction::Add("eggs"));
            dispatch.dispatch(TodoAction::Add("bread"));
        })
        .unwrap();
    assert_eq!(app.text(), "milkeggsbread");
    let ul = app.children_of(app.container)[0];
    let nodes = app.children_of(ul);
    assert_eq!(nodes.len(), 3);

    app.reconciler
        .flush_sync(|| dispatch.dispatch(TodoAction::Remove(1)))
        .unwrap();
    assert_eq!(app.text(), "milkbread");
    assert_eq!(app.children_of(ul), vec![nodes[0], nodes[2]]);

    app.reconciler
        .flush_sync(|| dispatch.dispatch(TodoAction::Reverse))
        .unwrap();
    assert_eq!(app.text(), "breadmilk");
    assert_eq!(app.children_of(ul), vec![nodes[2], nodes[0]]);
}

#[test]
fn sync_updates_jump_ahead_of_pending_async_work() {
    let app = App::new();
    let slot: Rc<RefCell<Option<SetState<i32>>>> = Rc::default();
    let component = {
        let slot = slot.clone();
        Component::new("Counter", move |_| {
            let (count, set_count) = use_state(|| 0i32);
            *slot.borrow_mut() = Some(set_count);
            Child::text(count.to_string())
        })
    };
    app.mount(Element::component(&component, Props::new()));
    let set_count = slot.borrow().clone().expect("counter rendered");

    set_count.update(|count| count + 1);
    app.reconciler
        .flush_sync(|| set_count.update(|count| count * 10))
        .unwrap();
    // The sync pass skips the async increment and applies only the multiply.
    assert_eq!(app.text(), "0");
    assert_ne!(app.reconciler.pending_expiration_time(app.root), Some(NO_WORK));

    // The async pass replays both updates in the order they were made.
    app.clock.run_until_idle(10);
    assert_eq!(app.text(), "10");
    assert_eq!(app.reconciler.pending_expiration_time(app.root), Some(NO_WORK));
}

#[test]
fn unmounting_a_child_runs_its_cleanup() {
    let app = App::new();
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::default();
    let toggle: Rc<RefCell<Option<SetState<bool>>>> = Rc::default();

    let child = {
        let log = log.clone();
        Component::new("Subscriber", move |_| {
            let log = log.clone();
            use_effect(
                move || {
                    log.borrow_mut().push("subscribe");
                    Some(Box::new(move || log.borrow_mut().push("unsubscribe")) as Destroy)
                },
                deps![],
            );
            Child::text("subscribed")
        })
    };
    let parent = {
        let toggle = toggle.clone();
        Component::new("Parent", move |_| {
            let (show, set_show) = use_state(|| true);
            *toggle.borrow_mut() = Some(set_show);
            if show {
                Element::component(&child, Props::new()).into()
            } else {
                Child::text("hidden")
            }
        })
    };

    app.mount(Element::component(&parent, Props::new()));
    app.reconciler.flush_passive_effects().unwrap();
    assert_eq!(app.text(), "subscribed");
    assert_eq!(*log.borrow(), vec!["subscribe"]);

    let set_show = toggle.borrow().clone().expect("parent rendered");
    app.reconciler.flush_sync(|| set_show.set(false)).unwrap();
    assert_eq!(app.text(), "hidden");
    assert_eq!(*log.borrow(), vec!["subscribe", "unsubscribe"]);
}

#[test]
fn callbacks_stay_stable_while_deps_match() {
    let app = App::new();
    let seen: Rc<RefCell<Vec<Rc<dyn Fn() -> i32>>>> = Rc::default();
    let component = {
        let seen = seen.clone();
        Component::new("Stable", move |props| {
            let factor = *props.data_ref::<i32>().unwrap_or(&1);
            let callback: Rc<dyn Fn() -> i32> =
                use_callback(Rc::new(move || factor * 2), deps![factor]);
            seen.borrow_mut().push(callback);
            Child::Empty
        })
    };

    app.mount(Element::component(&component, Props::new().data(1i32)));
    app.mount(Element::component(&component, Props::new().data(1i32)));
    app.mount(Element::component(&component, Props::new().data(3i32)));

    let seen = seen.borrow();
    assert_eq!(seen.len(), 3);
    assert!(Rc::ptr_eq(&seen[0], &seen[1]));
    assert!(!Rc::ptr_eq(&seen[1], &seen[2]));
    assert_eq!(seen[2](), 6);
}

#[test]
fn roots_render_independently() {
    let clock = ManualClock::new();
    let mut host = MemoryHost::new();
    let left_container = host.create_container();
    let right_container = host.create_container();
    let reconciler = Reconciler::new(host, clock.clone());
    let left = reconciler.create_container(left_container);
    let right = reconciler.create_container(right_container);

    reconciler.update_container_sync("left", left).unwrap();
    reconciler.update_container("right", right).unwrap();
    assert_eq!(reconciler.pending_expiration_time(left), Some(NO_WORK));
    assert_ne!(reconciler.pending_expiration_time(right), Some(NO_WORK));

    clock.run_until_idle(10);
    reconciler.with_host(|host| {
        assert_eq!(host.text_content(left_container), "left");
        assert_eq!(host.text_content(right_container), "right");
    });
}

#[test]
fn hooks_need_a_rendering_component() {
    assert_eq!(
        try_use_state(|| 0i32).err(),
        Some(FiberError::InvalidHookCall { hook: "use_state" })
    );
    assert!(current_fiber().is_err());

    let app = App::new();
    let rendered: Rc<Cell<Option<FiberId>>> = Rc::default();
    let component = {
        let rendered = rendered.clone();
        Component::new("Probe", move |_| {
            rendered.set(current_fiber().ok());
            Child::Empty
        })
    };
    app.mount(Element::component(&component, Props::new()));
    let root_fiber = app.reconciler.current_root_fiber(app.root).unwrap();
    assert_eq!(rendered.get(), app.reconciler.children(root_fiber).first().copied());
}
