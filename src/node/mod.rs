//! Shader graph intermediate representation.
//!
//! Scenes describe materials as graphs of typed nodes. The graph is
//! renderer-agnostic; backends walk the flattened node list and translate
//! each node into their own shading system.

mod desc;
mod manager;
pub mod nodes;
mod socket;
mod value;

pub use self::{
    desc::{
        GraphError, IntoPropertyValue, NodeDesc, NodeDescLink, NodeIndex, NodeSocketDesc,
        NodeTypeId, SocketIo,
    },
    manager::*,
    socket::{NodeSocketRef, Socket},
    value::{
        convert, is_array_type, is_convertible_to, is_numeric_type, is_vector2_type,
        is_vector_type, DataValue, SocketType, SocketValue, SOCKET_TYPE_COUNT,
    },
};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::codec::{BlobReader, BlobWriter};

    fn group(manager: &Arc<NodeManager>) -> Arc<NodeDesc> {
        NodeDesc::create_group(manager, None)
    }

    /// Evaluates the constant driving an input socket after resolution:
    /// either a stored literal or a resolved math-node chain.
    fn eval_input(root: &Arc<NodeDesc>, node: &Arc<NodeDesc>, socket: &str) -> f32 {
        for link in root.links() {
            let (to_node, to_name) = link.to_socket.node_and_name().unwrap();
            if Arc::ptr_eq(&to_node, node) && to_name == socket {
                let (from_node, _) = link.from_socket.node_and_name().unwrap();
                return eval_math_node(root, &from_node);
            }
        }
        node.find_input_or_property_desc(socket)
            .and_then(|d| d.data_value.to_float())
            .unwrap_or(f32::NAN)
    }

    fn eval_math_node(root: &Arc<NodeDesc>, node: &Arc<NodeDesc>) -> f32 {
        assert_eq!(node.type_name(), NODE_MATH);
        let op = node
            .property_value(nodes::math::IN_TYPE)
            .and_then(|v| v.to_int())
            .unwrap();
        let v1 = eval_input(root, node, nodes::math::IN_VALUE1);
        let v2 = eval_input(root, node, nodes::math::IN_VALUE2);
        match op {
            0 => v1 + v2,
            1 => v1 - v2,
            2 => v1 * v2,
            3 => v1 / v2,
            _ => f32::NAN,
        }
    }

    #[test]
    fn operators_synthesize_math_nodes() {
        let manager = NodeManager::new();
        let root = group(&manager);
        let a = root.add_constant_node(2.0).unwrap();
        let b = root.add_constant_node(3.0).unwrap();
        let sum = &a + &b;
        assert!(sum.is_node_socket());
        let sum_node = sum.node().unwrap();
        assert_eq!(sum_node.type_name(), NODE_MATH);
        // Two constants plus the synthesized add node.
        assert_eq!(root.nodes().len(), 3);
        assert_eq!(root.links().len(), 2);
    }

    #[test]
    fn scalar_vector_operator_broadcasts() {
        let manager = NodeManager::new();
        let root = group(&manager);
        let v = root.add_constant_vector_node(crate::math::Vec3::ONE).unwrap();
        let s = root.add_constant_node(2.0).unwrap();
        let prod = &v * &s;
        let node = prod.node().unwrap();
        assert_eq!(node.type_name(), NODE_VECTOR_MATH);
        assert!(root
            .nodes()
            .iter()
            .any(|n| n.type_name() == NODE_COMBINE_XYZ));
    }

    #[test]
    fn link_into_concrete_socket_fails() {
        let manager = NodeManager::new();
        let root = group(&manager);
        let a = root.add_constant_node(1.0).unwrap();
        let err = root.link(a, Socket::from(2.0)).unwrap_err();
        assert!(matches!(err, GraphError::LinkTargetConcrete { .. }));
    }

    #[test]
    fn concrete_source_is_stored_not_linked() {
        let manager = NodeManager::new();
        let root = group(&manager);
        let math = root.add_node(NODE_MATH).unwrap();
        let links_before = root.links().len();
        root.link(
            Socket::from(4.0),
            math.input_socket(nodes::math::IN_VALUE1).unwrap(),
        )
        .unwrap();
        assert_eq!(root.links().len(), links_before);
        assert_eq!(
            math.find_input_socket_desc(nodes::math::IN_VALUE1)
                .unwrap()
                .data_value
                .to_float(),
            Some(4.0)
        );
    }

    #[test]
    fn relinking_replaces_previous_link() {
        let manager = NodeManager::new();
        let root = group(&manager);
        let a = root.add_constant_node(1.0).unwrap();
        let b = root.add_constant_node(2.0).unwrap();
        let math = root.add_node(NODE_MATH).unwrap();
        let target = math.input_socket(nodes::math::IN_VALUE1).unwrap();
        root.link(a, target.clone()).unwrap();
        let before = root.links().len();
        root.link(b.clone(), target.clone()).unwrap();
        assert_eq!(root.links().len(), before);
        let link = root
            .links()
            .into_iter()
            .find(|l| l.to_socket == target)
            .unwrap();
        assert_eq!(link.from_socket, b);
    }

    /// A group wrapping a single add node: after resolution the root holds
    /// only the inner math node and evaluation yields the expected sum.
    #[test]
    fn group_resolution_preserves_semantics() {
        let manager = NodeManager::new();
        let root = group(&manager);
        let inner = root.add_group_node().unwrap();

        let in_a = inner.register_socket("a", DataValue::float(0.0), SocketIo::IN);
        let in_b = inner.register_socket("b", DataValue::float(0.0), SocketIo::IN);
        let out_o = inner.register_socket("o", DataValue::typeless(SocketType::Float), SocketIo::OUT);

        let math = inner.add_node(NODE_MATH).unwrap();
        math.set_property(nodes::math::IN_TYPE, nodes::math::MathType::Add)
            .unwrap();
        inner
            .link(in_a, math.input_socket(nodes::math::IN_VALUE1).unwrap())
            .unwrap();
        inner
            .link(in_b, math.input_socket(nodes::math::IN_VALUE2).unwrap())
            .unwrap();
        inner
            .link(math.primary_output_socket().unwrap(), out_o.clone())
            .unwrap();

        let c2 = root.add_constant_node(2.0).unwrap();
        let c3 = root.add_constant_node(3.0).unwrap();
        root.link(c2, inner.input_socket("a").unwrap()).unwrap();
        root.link(c3, inner.input_socket("b").unwrap()).unwrap();

        let out = root.add_node(NODE_OUTPUT).unwrap();
        root.link(
            inner.output_socket("o").unwrap(),
            out.input_socket(nodes::output::IN_NORMAL).unwrap(),
        )
        .unwrap();

        root.resolve_group_nodes().unwrap();

        assert!(root.nodes().iter().all(|n| !n.is_group_node()));
        assert!(root
            .nodes()
            .iter()
            .any(|n| Arc::ptr_eq(n, &math)));
        for link in root.links() {
            assert!(link.from_socket.node().is_some());
            assert!(link.to_socket.node().is_some());
        }

        // The output node's normal input is now driven by the math node,
        // which evaluates to 2 + 3.
        let driving = root
            .links()
            .into_iter()
            .find(|l| {
                l.to_socket
                    .node_and_name()
                    .map_or(false, |(n, s)| Arc::ptr_eq(&n, &out) && s == nodes::output::IN_NORMAL)
            })
            .unwrap();
        let (from_node, _) = driving.from_socket.node_and_name().unwrap();
        assert!(Arc::ptr_eq(&from_node, &math));
        assert_eq!(eval_math_node(&root, &math), 5.0);
    }

    /// A group input with no incoming link propagates its default onto the
    /// inner destination.
    #[test]
    fn unconnected_group_input_propagates_default() {
        let manager = NodeManager::new();
        let root = group(&manager);
        let inner = root.add_group_node().unwrap();

        let in_a = inner.register_socket("a", DataValue::float(7.5), SocketIo::IN);
        let math = inner.add_node(NODE_MATH).unwrap();
        inner
            .link(in_a, math.input_socket(nodes::math::IN_VALUE1).unwrap())
            .unwrap();

        root.resolve_group_nodes().unwrap();

        assert_eq!(
            math.find_input_socket_desc(nodes::math::IN_VALUE1)
                .unwrap()
                .data_value
                .to_float(),
            Some(7.5)
        );
    }

    #[test]
    fn nested_groups_flatten_completely() {
        let manager = NodeManager::new();
        let root = group(&manager);
        let mid = root.add_group_node().unwrap();
        let leaf = mid.add_group_node().unwrap();
        leaf.add_node(NODE_MATH).unwrap();
        mid.add_node(NODE_COLOR).unwrap();

        root.resolve_group_nodes().unwrap();
        let nodes = root.nodes();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| !n.is_group_node()));
    }

    #[test]
    fn graph_serialization_round_trip() {
        let manager = NodeManager::new();
        let root = group(&manager);
        let math = root.add_node(NODE_MATH).unwrap();
        math.set_name("m0");
        math.set_property(nodes::math::IN_TYPE, nodes::math::MathType::Multiply)
            .unwrap();
        let tex = root
            .add_image_texture_node("textures/stone.png", nodes::TextureType::ColorImage)
            .unwrap();
        root.link(
            tex.output_socket(nodes::image_texture::OUT_ALPHA).unwrap(),
            math.input_socket(nodes::math::IN_VALUE1).unwrap(),
        )
        .unwrap();

        let mut w = BlobWriter::new();
        root.serialize(&mut w).unwrap();
        let blob = w.finish();

        let restored = NodeDesc::create_group(&manager, None);
        restored.deserialize(&mut BlobReader::new(&blob)).unwrap();

        assert_eq!(restored.nodes().len(), root.nodes().len());
        let rmath = restored.find_node("m0").unwrap();
        assert_eq!(
            rmath
                .property_value(nodes::math::IN_TYPE)
                .and_then(|v| v.to_int()),
            Some(nodes::math::MathType::Multiply as i32)
        );
        assert_eq!(restored.links().len(), root.links().len());
        let link = restored
            .links()
            .into_iter()
            .find(|l| {
                l.to_socket
                    .node_and_name()
                    .map_or(false, |(n, s)| Arc::ptr_eq(&n, &rmath) && s == nodes::math::IN_VALUE1)
            })
            .unwrap();
        let (from_node, from_name) = link.from_socket.node_and_name().unwrap();
        assert_eq!(from_node.type_name(), NODE_IMAGE_TEXTURE);
        assert_eq!(from_name, nodes::image_texture::OUT_ALPHA);
    }
}
