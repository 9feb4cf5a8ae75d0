//! Contract between the reconciler and the renderer that owns real nodes.
//!
//! The reconciler never touches a host node directly. During the complete
//! phase it creates instances and assembles them bottom-up; during commit it
//! asks the host to insert, update and remove them.

use crate::element::Props;
use crate::fiber::FiberId;

/// Opaque handle to a host node. Containers use the same handle space.
pub type NodeId = usize;

pub trait HostConfig {
    fn create_instance(&mut self, element_type: &str, props: &Props, owner: FiberId) -> NodeId;

    fn create_text_instance(&mut self, text: &str, owner: FiberId) -> NodeId;

    fn append_child(&mut self, parent: NodeId, child: NodeId);

    /// Whether the host renders this element's text itself, in which case
    /// its children are not reconciled.
    fn is_text_only_container(&self, element_type: &str, props: &Props) -> bool;

    /// Applies initial props. Returning `true` requests a
    /// [`HostConfig::commit_mount`] call once the node is committed.
    fn finalize_initial_properties(
        &mut self,
        instance: NodeId,
        element_type: &str,
        props: &Props,
    ) -> bool;

    fn insert_before(&mut self, parent: NodeId, child: NodeId, before: NodeId);

    fn remove_child(&mut self, parent: NodeId, child: NodeId);

    fn commit_update(
        &mut self,
        _instance: NodeId,
        _element_type: &str,
        _old_props: &Props,
        _new_props: &Props,
    ) {
    }

    fn commit_text_update(&mut self, _instance: NodeId, _old_text: &str, _new_text: &str) {}

    fn reset_text_content(&mut self, _instance: NodeId) {}

    fn commit_mount(&mut self, _instance: NodeId, _element_type: &str, _props: &Props) {}
}
