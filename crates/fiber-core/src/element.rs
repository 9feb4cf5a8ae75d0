//! Tree descriptions handed to the reconciler.
//!
//! Descriptions are immutable and cheap to clone. Identity matters: the
//! reconciler treats two props objects as unchanged only when they are the
//! same allocation.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub type Key = Rc<str>;

/// A function component: renders props into a child description.
#[derive(Clone)]
pub struct Component {
    name: Rc<str>,
    render: Rc<dyn Fn(&Props) -> Child>,
}

impl Component {
    pub fn new(name: &str, render: impl Fn(&Props) -> Child + 'static) -> Self {
        Self {
            name: Rc::from(name),
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, props: &Props) -> Child {
        (self.render)(props)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.render), Rc::as_ptr(&other.render))
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementType {
    /// A host node such as `"div"`.
    Host(Rc<str>),
    Component(Component),
    /// Groups its children without a node of its own.
    Fragment,
}

impl ElementType {
    pub fn host(tag: &str) -> Self {
        ElementType::Host(Rc::from(tag))
    }
}

#[derive(Clone, Default)]
pub struct Props {
    pub children: Child,
    /// Defers the whole subtree until an idle pass.
    pub hidden: bool,
    pub attributes: BTreeMap<String, String>,
    /// Arbitrary input for function components.
    pub data: Option<Rc<dyn Any>>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_children(children: impl Into<Child>) -> Self {
        Self {
            children: children.into(),
            ..Self::default()
        }
    }

    pub fn child(mut self, children: impl Into<Child>) -> Self {
        self.children = children.into();
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_owned(), value.into());
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn data<T: 'static>(mut self, data: T) -> Self {
        self.data = Some(Rc::new(data));
        self
    }

    pub fn data_ref<T: 'static>(&self) -> Option<&T> {
        self.data.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("children", &self.children)
            .field("hidden", &self.hidden)
            .field("attributes", &self.attributes)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Element {
    pub element_type: ElementType,
    pub key: Option<Key>,
    pub props: Rc<Props>,
}

impl Element {
    pub fn new(element_type: ElementType, key: Option<&str>, props: Props) -> Self {
        Self {
            element_type,
            key: key.map(Rc::from),
            props: Rc::new(props),
        }
    }

    pub fn host(tag: &str, props: Props) -> Self {
        Self::new(ElementType::host(tag), None, props)
    }

    pub fn component(component: &Component, props: Props) -> Self {
        Self::new(ElementType::Component(component.clone()), None, props)
    }

    pub fn fragment(children: impl Into<Child>) -> Self {
        Self::new(ElementType::Fragment, None, Props::with_children(children))
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(Rc::from(key));
        self
    }
}

/// One position's worth of tree description.
#[derive(Clone, Debug, Default)]
pub enum Child {
    #[default]
    Empty,
    Text(Rc<str>),
    Element(Element),
    /// A list of children; a nested list becomes a fragment.
    List(Rc<[Child]>),
    /// A value that is not a tree description. Rendered as nothing.
    Unsupported(Rc<str>),
}

impl Child {
    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Child::Text(text.into())
    }

    pub fn list(children: impl IntoIterator<Item = Child>) -> Self {
        Child::List(children.into_iter().collect())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Child::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Referential equality: same allocation, not same contents.
    pub fn same(&self, other: &Child) -> bool {
        match (self, other) {
            (Child::Empty, Child::Empty) => true,
            (Child::Text(a), Child::Text(b)) => Rc::ptr_eq(a, b),
            (Child::Element(a), Child::Element(b)) => {
                Rc::ptr_eq(&a.props, &b.props)
                    && a.key == b.key
                    && a.element_type == b.element_type
            }
            (Child::List(a), Child::List(b)) => Rc::ptr_eq(a, b),
            (Child::Unsupported(a), Child::Unsupported(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Element> for Child {
    fn from(element: Element) -> Self {
        Child::Element(element)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(Rc::from(text))
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(Rc::from(text))
    }
}

impl From<Vec<Child>> for Child {
    fn from(children: Vec<Child>) -> Self {
        Child::List(children.into())
    }
}

macro_rules! number_into_child {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Child {
                fn from(value: $ty) -> Self {
                    Child::Text(Rc::from(value.to_string()))
                }
            }
        )*
    };
}

number_into_child!(i32, i64, u32, u64, usize, f64);
