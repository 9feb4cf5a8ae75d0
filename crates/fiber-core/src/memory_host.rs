//! In-memory host used by tests and headless tools.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::element::{Child, Props};
use crate::fiber::FiberId;
use crate::host::{HostConfig, NodeId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryNode {
    Container {
        children: Vec<NodeId>,
    },
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
        text_content: Option<String>,
        children: Vec<NodeId>,
    },
    Text {
        text: String,
    },
}

impl MemoryNode {
    pub fn children(&self) -> &[NodeId] {
        match self {
            MemoryNode::Container { children } | MemoryNode::Element { children, .. } => children,
            MemoryNode::Text { .. } => &[],
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            MemoryNode::Container { children } | MemoryNode::Element { children, .. } => {
                Some(children)
            }
            MemoryNode::Text { .. } => None,
        }
    }
}

/// One host call, as recorded by [`MemoryHost`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostOp {
    CreateInstance { id: NodeId, tag: String },
    CreateText { id: NodeId, text: String },
    AppendChild { parent: NodeId, child: NodeId },
    InsertBefore { parent: NodeId, child: NodeId, before: NodeId },
    RemoveChild { parent: NodeId, child: NodeId },
    CommitUpdate { id: NodeId },
    CommitTextUpdate { id: NodeId, text: String },
    ResetTextContent { id: NodeId },
    CommitMount { id: NodeId },
}

/// Keeps host nodes in a vector and records every call made on it.
///
/// Elements whose tag was registered with [`MemoryHost::text_only_tag`] and
/// whose children are plain text store that text themselves. Elements with
/// an `autofocus` attribute ask for a [`HostConfig::commit_mount`] call.
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: Vec<Option<MemoryNode>>,
    text_only_tags: BTreeSet<String>,
    operations: Vec<HostOp>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text_only_tag(mut self, tag: &str) -> Self {
        self.text_only_tags.insert(tag.to_owned());
        self
    }

    pub fn create_container(&mut self) -> NodeId {
        self.insert(MemoryNode::Container {
            children: Vec::new(),
        })
    }

    fn insert(&mut self, node: MemoryNode) -> NodeId {
        self.nodes.push(Some(node));
        self.nodes.len() - 1
    }

    pub fn node(&self, id: NodeId) -> Option<&MemoryNode> {
        self.nodes.get(id)?.as_ref()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], MemoryNode::children)
    }

    /// Number of live nodes, containers included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn operations(&self) -> &[HostOp] {
        &self.operations
    }

    pub fn take_operations(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.operations)
    }

    /// Concatenated text below `id`, in document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut output = String::new();
        self.collect_text(id, &mut output);
        output
    }

    fn collect_text(&self, id: NodeId, output: &mut String) {
        match self.node(id) {
            Some(MemoryNode::Text { text }) => output.push_str(text),
            Some(MemoryNode::Element {
                text_content: Some(text),
                ..
            }) => output.push_str(text),
            Some(node) => {
                for &child in node.children() {
                    self.collect_text(child, output);
                }
            }
            None => {}
        }
    }

    pub fn dump_tree(&self, root: Option<NodeId>) -> String {
        let mut output = String::new();
        match root {
            Some(root) => self.dump_node(&mut output, root, 0),
            None => output.push_str("(no root)\n"),
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.node(id) {
            Some(MemoryNode::Container { children }) => {
                let _ = writeln!(output, "{indent}[{id}] container");
                for &child in children {
                    self.dump_node(output, child, depth + 1);
                }
            }
            Some(MemoryNode::Element {
                tag,
                attributes,
                text_content,
                children,
            }) => {
                let _ = write!(output, "{indent}[{id}] <{tag}>");
                for (name, value) in attributes {
                    let _ = write!(output, " {name}={value:?}");
                }
                if let Some(text) = text_content {
                    let _ = write!(output, " {text:?}");
                }
                output.push('\n');
                for &child in children {
                    self.dump_node(output, child, depth + 1);
                }
            }
            Some(MemoryNode::Text { text }) => {
                let _ = writeln!(output, "{indent}[{id}] {text:?}");
            }
            None => {
                let _ = writeln!(output, "{indent}[{id}] (missing)");
            }
        }
    }

    fn detach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(children) = self
            .nodes
            .get_mut(parent)
            .and_then(Option::as_mut)
            .and_then(MemoryNode::children_mut)
        {
            children.retain(|&existing| existing != child);
        }
    }

    fn release(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if let Some(released) = self.nodes.get_mut(node).and_then(Option::take) {
                stack.extend_from_slice(released.children());
            }
        }
    }

    fn direct_text(&self, element_type: &str, props: &Props) -> Option<String> {
        if !self.text_only_tags.contains(element_type) {
            return None;
        }
        props.children.as_text().map(str::to_owned)
    }
}

impl HostConfig for MemoryHost {
    fn create_instance(&mut self, element_type: &str, props: &Props, _owner: FiberId) -> NodeId {
        let text_content = self.direct_text(element_type, props);
        let id = self.insert(MemoryNode::Element {
            tag: element_type.to_owned(),
            attributes: BTreeMap::new(),
            text_content,
            children: Vec::new(),
        });
        self.operations.push(HostOp::CreateInstance {
            id,
            tag: element_type.to_owned(),
        });
        id
    }

    fn create_text_instance(&mut self, text: &str, _owner: FiberId) -> NodeId {
        let id = self.insert(MemoryNode::Text {
            text: text.to_owned(),
        });
        self.operations.push(HostOp::CreateText {
            id,
            text: text.to_owned(),
        });
        id
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(parent, child);
        if let Some(children) = self
            .nodes
            .get_mut(parent)
            .and_then(Option::as_mut)
            .and_then(MemoryNode::children_mut)
        {
            children.push(child);
        }
        self.operations.push(HostOp::AppendChild { parent, child });
    }

    fn is_text_only_container(&self, element_type: &str, props: &Props) -> bool {
        self.text_only_tags.contains(element_type) && matches!(props.children, Child::Text(_))
    }

    fn finalize_initial_properties(
        &mut self,
        instance: NodeId,
        _element_type: &str,
        props: &Props,
    ) -> bool {
        if let Some(Some(MemoryNode::Element { attributes, .. })) = self.nodes.get_mut(instance) {
            attributes.clone_from(&props.attributes);
        }
        props.attributes.contains_key("autofocus")
    }

    fn insert_before(&mut self, parent: NodeId, child: NodeId, before: NodeId) {
        self.detach(parent, child);
        if let Some(children) = self
            .nodes
            .get_mut(parent)
            .and_then(Option::as_mut)
            .and_then(MemoryNode::children_mut)
        {
            let index = children
                .iter()
                .position(|&existing| existing == before)
                .unwrap_or(children.len());
            children.insert(index, child);
        }
        self.operations.push(HostOp::InsertBefore {
            parent,
            child,
            before,
        });
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(parent, child);
        self.release(child);
        self.operations.push(HostOp::RemoveChild { parent, child });
    }

    fn commit_update(
        &mut self,
        instance: NodeId,
        element_type: &str,
        _old_props: &Props,
        new_props: &Props,
    ) {
        let direct_text = self.direct_text(element_type, new_props);
        if let Some(Some(MemoryNode::Element {
            attributes,
            text_content,
            ..
        })) = self.nodes.get_mut(instance)
        {
            attributes.clone_from(&new_props.attributes);
            if direct_text.is_some() {
                *text_content = direct_text;
            }
        }
        self.operations.push(HostOp::CommitUpdate { id: instance });
    }

    fn commit_text_update(&mut self, instance: NodeId, _old_text: &str, new_text: &str) {
        if let Some(Some(MemoryNode::Text { text })) = self.nodes.get_mut(instance) {
            new_text.clone_into(text);
        }
        self.operations.push(HostOp::CommitTextUpdate {
            id: instance,
            text: new_text.to_owned(),
        });
    }

    fn reset_text_content(&mut self, instance: NodeId) {
        if let Some(Some(MemoryNode::Element { text_content, .. })) = self.nodes.get_mut(instance) {
            *text_content = None;
        }
        self.operations.push(HostOp::ResetTextContent { id: instance });
    }

    fn commit_mount(&mut self, instance: NodeId, _element_type: &str, _props: &Props) {
        self.operations.push(HostOp::CommitMount { id: instance });
    }
}
