//! Shader-graph nodes and node groups.
//!
//! A [`NodeDesc`] is a description of a shader node: typed input/output
//! sockets plus compile-time properties. Group nodes additionally own an
//! ordered child-node list and the links between child sockets. Groups are
//! authoring sugar only; [`NodeDesc::resolve_group_nodes`] inlines them so
//! that backends only ever see a flat graph.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::{
    codec::{BlobReader, BlobWriter, CodecError},
    math::{Affine3A, Vec2, Vec3},
    node::{
        manager::NodeManager,
        nodes::{self, TextureType},
        socket::Socket,
        value::{convert, DataValue, SocketType, SocketValue},
    },
};

pub type NodeIndex = u32;
pub type NodeTypeId = u32;

bitflags::bitflags! {
    /// Direction class of a socket. Properties carry no flag.
    pub struct SocketIo: u8 {
        const IN = 0b01;
        const OUT = 0b10;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Unknown node type '{type_name}'")]
    UnknownNodeType { type_name: String },

    #[error("Unknown node type id {type_id}")]
    UnknownNodeTypeId { type_id: NodeTypeId },

    #[error("{node} has no input socket named '{socket}'")]
    NoInputSocket { node: String, socket: String },

    #[error("{node} has no output socket named '{socket}'")]
    NoOutputSocket { node: String, socket: String },

    #[error("{node} has no property named '{socket}'")]
    NoProperty { node: String, socket: String },

    #[error("{node} has no primary output socket")]
    NoPrimaryOutput { node: String },

    #[error("Invalid value for property '{socket}' of {node}: expected {expected}")]
    InvalidPropertyValue {
        node: String,
        socket: String,
        expected: SocketType,
    },

    #[error("To-socket {to} is a concrete value, which cannot be linked to")]
    LinkTargetConcrete { to: String },

    #[error("Socket {socket} references a non-existing node")]
    DanglingSocket { socket: String },

    #[error("To-socket {to} is an output socket, which is only allowed for group nodes")]
    LinkTargetIsOutput { to: String },

    #[error("From-socket {from} is an input socket, which is only allowed for group nodes")]
    LinkSourceIsInput { from: String },

    #[error("From-socket {from} carries a concrete value that is not compatible with to-socket {to}")]
    IncompatibleLinkValue { from: String, to: String },

    #[error("Sockets {from} and {to} do not share a group node")]
    NoCommonGroup { from: String, to: String },

    #[error("{node} is not a group node")]
    NotAGroupNode { node: String },

    #[error("Group resolution encountered an unresolved child group in {node}")]
    UnresolvedChildGroup { node: String },

    #[error("Node {node} references a parent it does not belong to")]
    ParentMismatch { node: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Socket slot on a node: direction class plus the default (or stored) value.
#[derive(Clone, Debug)]
pub struct NodeSocketDesc {
    pub io: SocketIo,
    pub data_value: DataValue,
}

impl NodeSocketDesc {
    pub(crate) fn serialize(&self, w: &mut BlobWriter) {
        w.write_u8(self.io.bits());
        self.data_value.serialize(w);
    }

    pub(crate) fn deserialize(r: &mut BlobReader<'_>) -> Result<Self, CodecError> {
        let io = SocketIo::from_bits_truncate(r.read_u8()?);
        let data_value = DataValue::deserialize(r)?;
        Ok(NodeSocketDesc { io, data_value })
    }
}

/// Directed connection between two sockets of the same group.
#[derive(Clone, Debug)]
pub struct NodeDescLink {
    pub from_socket: Socket,
    pub to_socket: Socket,
}

impl NodeDescLink {
    pub(crate) fn serialize(
        &self,
        w: &mut BlobWriter,
        table: &HashMap<usize, NodeIndex>,
    ) -> Result<(), GraphError> {
        self.from_socket.serialize(w, table)?;
        self.to_socket.serialize(w, table)?;
        Ok(())
    }

    pub(crate) fn deserialize(
        r: &mut BlobReader<'_>,
        table: &[Arc<NodeDesc>],
    ) -> Result<Self, GraphError> {
        Ok(NodeDescLink {
            from_socket: Socket::deserialize(r, table)?,
            to_socket: Socket::deserialize(r, table)?,
        })
    }
}

struct NodeState {
    type_name: String,
    name: String,
    inputs: HashMap<String, NodeSocketDesc>,
    outputs: HashMap<String, NodeSocketDesc>,
    properties: HashMap<String, NodeSocketDesc>,
    primary_output: Option<String>,
    parent: Weak<NodeDesc>,
}

struct GroupState {
    manager: Arc<NodeManager>,
    nodes: Vec<Arc<NodeDesc>>,
    links: Vec<NodeDescLink>,
}

/// Shader-graph node. Group nodes carry the optional group payload.
pub struct NodeDesc {
    self_ref: Weak<NodeDesc>,
    state: RwLock<NodeState>,
    group: Option<RwLock<GroupState>>,
}

impl fmt::Debug for NodeDesc {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("NodeDesc")
            .field("name", &self.name())
            .field("type_name", &self.type_name())
            .field("group", &self.is_group_node())
            .finish()
    }
}

impl fmt::Display for NodeDesc {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Node[{}][{}]", self.name(), self.type_name())
    }
}

/// Value that can be stored into a node property slot.
pub trait IntoPropertyValue {
    fn into_property_value(self) -> SocketValue;
}

impl IntoPropertyValue for bool {
    fn into_property_value(self) -> SocketValue {
        SocketValue::Bool(self)
    }
}

impl IntoPropertyValue for f32 {
    fn into_property_value(self) -> SocketValue {
        SocketValue::Float(self)
    }
}

impl IntoPropertyValue for i32 {
    fn into_property_value(self) -> SocketValue {
        SocketValue::Int(self)
    }
}

impl IntoPropertyValue for u32 {
    fn into_property_value(self) -> SocketValue {
        SocketValue::UInt(self)
    }
}

impl IntoPropertyValue for Vec3 {
    fn into_property_value(self) -> SocketValue {
        SocketValue::Vector(self)
    }
}

impl IntoPropertyValue for Vec2 {
    fn into_property_value(self) -> SocketValue {
        SocketValue::Point2(self)
    }
}

impl IntoPropertyValue for &str {
    fn into_property_value(self) -> SocketValue {
        SocketValue::String(self.to_owned())
    }
}

impl IntoPropertyValue for String {
    fn into_property_value(self) -> SocketValue {
        SocketValue::String(self)
    }
}

impl IntoPropertyValue for Affine3A {
    fn into_property_value(self) -> SocketValue {
        SocketValue::Transform(self)
    }
}

impl IntoPropertyValue for Vec<f32> {
    fn into_property_value(self) -> SocketValue {
        SocketValue::FloatArray(self)
    }
}

impl IntoPropertyValue for Vec<Vec3> {
    fn into_property_value(self) -> SocketValue {
        SocketValue::ColorArray(self)
    }
}

fn natural_type(value: &SocketValue) -> SocketType {
    match value {
        SocketValue::Bool(_) => SocketType::Bool,
        SocketValue::Float(_) => SocketType::Float,
        SocketValue::Int(_) => SocketType::Int,
        SocketValue::UInt(_) => SocketType::UInt,
        SocketValue::Vector(_) => SocketType::Vector,
        SocketValue::Point2(_) => SocketType::Point2,
        SocketValue::String(_) => SocketType::String,
        SocketValue::Enum(_) => SocketType::Enum,
        SocketValue::Transform(_) => SocketType::Transform,
        SocketValue::FloatArray(_) => SocketType::FloatArray,
        SocketValue::ColorArray(_) => SocketType::ColorArray,
    }
}

impl NodeDesc {
    /// Creates a plain (non-group) node.
    pub fn create(parent: Option<&Arc<NodeDesc>>) -> Arc<NodeDesc> {
        Arc::new_cyclic(|self_ref| NodeDesc {
            self_ref: self_ref.clone(),
            state: RwLock::new(NodeState {
                type_name: String::new(),
                name: String::new(),
                inputs: HashMap::new(),
                outputs: HashMap::new(),
                properties: HashMap::new(),
                primary_output: None,
                parent: parent.map(Arc::downgrade).unwrap_or_default(),
            }),
            group: None,
        })
    }

    /// Creates a group node bound to a node manager.
    pub fn create_group(
        manager: &Arc<NodeManager>,
        parent: Option<&Arc<NodeDesc>>,
    ) -> Arc<NodeDesc> {
        Arc::new_cyclic(|self_ref| NodeDesc {
            self_ref: self_ref.clone(),
            state: RwLock::new(NodeState {
                type_name: "group".to_owned(),
                name: String::new(),
                inputs: HashMap::new(),
                outputs: HashMap::new(),
                properties: HashMap::new(),
                primary_output: None,
                parent: parent.map(Arc::downgrade).unwrap_or_default(),
            }),
            group: Some(RwLock::new(GroupState {
                manager: manager.clone(),
                nodes: Vec::new(),
                links: Vec::new(),
            })),
        })
    }

    pub(crate) fn arc(&self) -> Arc<NodeDesc> {
        self.self_ref.upgrade().expect("node is alive while borrowed")
    }

    pub fn is_group_node(&self) -> bool {
        self.group.is_some()
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.state.write().name = name.into();
    }

    pub fn type_name(&self) -> String {
        self.state.read().type_name.clone()
    }

    pub(crate) fn set_type_name(&self, type_name: impl Into<String>) {
        self.state.write().type_name = type_name.into();
    }

    pub fn parent(&self) -> Option<Arc<NodeDesc>> {
        self.state.read().parent.upgrade()
    }

    pub(crate) fn set_parent(&self, parent: Option<&Arc<NodeDesc>>) {
        self.state.write().parent = parent.map(Arc::downgrade).unwrap_or_default();
    }

    /// Position of this node within its parent group.
    pub fn index(&self) -> Result<NodeIndex, GraphError> {
        let parent = match self.parent() {
            Some(p) => p,
            None => return Ok(NodeIndex::MAX),
        };
        let this = self.arc();
        parent
            .with_group(|g| g.nodes.iter().position(|n| Arc::ptr_eq(n, &this)))?
            .map(|i| i as NodeIndex)
            .ok_or_else(|| GraphError::ParentMismatch {
                node: self.to_string(),
            })
    }

    // ---- socket registration ------------------------------------------------

    /// Registers a socket; `io` selects the input/output/property table.
    pub fn register_socket(
        &self,
        name: impl Into<String>,
        value: DataValue,
        io: SocketIo,
    ) -> Socket {
        let name = name.into();
        let desc = NodeSocketDesc {
            io,
            data_value: value,
        };
        let mut state = self.state.write();
        if io.contains(SocketIo::OUT) {
            state.outputs.insert(name.clone(), desc);
            drop(state);
            Socket::from_node(&self.arc(), name, true)
        } else if io.contains(SocketIo::IN) {
            state.inputs.insert(name.clone(), desc);
            drop(state);
            Socket::from_node(&self.arc(), name, false)
        } else {
            state.properties.insert(name.clone(), desc);
            drop(state);
            Socket::from_node(&self.arc(), name, false)
        }
    }

    pub fn register_primary_output(&self, name: impl Into<String>) {
        self.state.write().primary_output = Some(name.into());
    }

    pub fn primary_output_socket(&self) -> Result<Socket, GraphError> {
        let primary = self.state.read().primary_output.clone();
        let name = primary.ok_or_else(|| GraphError::NoPrimaryOutput {
            node: self.to_string(),
        })?;
        self.output_socket(&name)
    }

    // ---- socket lookup ------------------------------------------------------

    pub fn find_input_socket(&self, name: &str) -> Option<Socket> {
        self.state
            .read()
            .inputs
            .contains_key(name)
            .then(|| Socket::from_node(&self.arc(), name.to_owned(), false))
    }

    pub fn find_output_socket(&self, name: &str) -> Option<Socket> {
        self.state
            .read()
            .outputs
            .contains_key(name)
            .then(|| Socket::from_node(&self.arc(), name.to_owned(), true))
    }

    pub fn find_property(&self, name: &str) -> Option<Socket> {
        self.state
            .read()
            .properties
            .contains_key(name)
            .then(|| Socket::from_node(&self.arc(), name.to_owned(), false))
    }

    pub fn input_socket(&self, name: &str) -> Result<Socket, GraphError> {
        self.find_input_socket(name)
            .ok_or_else(|| GraphError::NoInputSocket {
                node: self.to_string(),
                socket: name.to_owned(),
            })
    }

    pub fn output_socket(&self, name: &str) -> Result<Socket, GraphError> {
        self.find_output_socket(name)
            .ok_or_else(|| GraphError::NoOutputSocket {
                node: self.to_string(),
                socket: name.to_owned(),
            })
    }

    pub fn property(&self, name: &str) -> Result<Socket, GraphError> {
        self.find_property(name).ok_or_else(|| GraphError::NoProperty {
            node: self.to_string(),
            socket: name.to_owned(),
        })
    }

    pub fn input_or_property(&self, name: &str) -> Result<Socket, GraphError> {
        if let Some(socket) = self.find_input_socket(name) {
            return Ok(socket);
        }
        self.property(name)
    }

    pub fn find_input_socket_desc(&self, name: &str) -> Option<NodeSocketDesc> {
        self.state.read().inputs.get(name).cloned()
    }

    pub fn find_output_socket_desc(&self, name: &str) -> Option<NodeSocketDesc> {
        self.state.read().outputs.get(name).cloned()
    }

    pub fn find_property_desc(&self, name: &str) -> Option<NodeSocketDesc> {
        self.state.read().properties.get(name).cloned()
    }

    pub fn find_input_or_property_desc(&self, name: &str) -> Option<NodeSocketDesc> {
        self.find_input_socket_desc(name)
            .or_else(|| self.find_property_desc(name))
    }

    /// Desc behind a node socket, honoring the socket's direction.
    pub fn find_socket_desc(&self, socket: &Socket) -> Option<NodeSocketDesc> {
        let (_, name) = socket.node_and_name()?;
        if socket.is_output() {
            self.find_output_socket_desc(&name)
        } else {
            self.find_input_or_property_desc(&name)
        }
    }

    pub fn inputs(&self) -> Vec<(String, NodeSocketDesc)> {
        self.state
            .read()
            .inputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn outputs(&self) -> Vec<(String, NodeSocketDesc)> {
        self.state
            .read()
            .outputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn properties(&self) -> Vec<(String, NodeSocketDesc)> {
        self.state
            .read()
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ---- property values ----------------------------------------------------

    /// Stores a literal into a property (or input) slot, converting it to the
    /// slot's socket type.
    pub fn set_property<T: IntoPropertyValue>(
        &self,
        name: &str,
        value: T,
    ) -> Result<(), GraphError> {
        let node_repr = self.to_string();
        let payload = value.into_property_value();
        let tmp = DataValue::new(natural_type(&payload), payload);
        let mut state = self.state.write();
        let slot = match state.properties.get_mut(name) {
            Some(slot) => slot,
            None => state
                .inputs
                .get_mut(name)
                .ok_or_else(|| GraphError::NoProperty {
                    node: node_repr.clone(),
                    socket: name.to_owned(),
                })?,
        };
        let expected = slot.data_value.ty;
        let converted = convert(&tmp, expected).ok_or_else(|| GraphError::InvalidPropertyValue {
            node: node_repr,
            socket: name.to_owned(),
            expected,
        })?;
        slot.data_value = converted;
        Ok(())
    }

    pub fn property_value(&self, name: &str) -> Option<DataValue> {
        self.state
            .read()
            .properties
            .get(name)
            .map(|d| d.data_value.clone())
    }

    pub(crate) fn set_output_value(&self, name: &str, value: DataValue) {
        if let Some(slot) = self.state.write().outputs.get_mut(name) {
            slot.data_value = value;
        }
    }

    pub(crate) fn set_input_or_property_value(&self, name: &str, value: DataValue) {
        let mut state = self.state.write();
        if let Some(slot) = state.inputs.get_mut(name) {
            slot.data_value = value;
            return;
        }
        if let Some(slot) = state.properties.get_mut(name) {
            slot.data_value = value;
        }
    }

    // ---- group access -------------------------------------------------------

    fn with_group<R>(&self, f: impl FnOnce(&GroupState) -> R) -> Result<R, GraphError> {
        let group = self.group.as_ref().ok_or_else(|| GraphError::NotAGroupNode {
            node: self.to_string(),
        })?;
        Ok(f(&group.read()))
    }

    fn with_group_mut<R>(&self, f: impl FnOnce(&mut GroupState) -> R) -> Result<R, GraphError> {
        let group = self.group.as_ref().ok_or_else(|| GraphError::NotAGroupNode {
            node: self.to_string(),
        })?;
        Ok(f(&mut group.write()))
    }

    pub fn nodes(&self) -> Vec<Arc<NodeDesc>> {
        self.with_group(|g| g.nodes.clone()).unwrap_or_default()
    }

    pub fn links(&self) -> Vec<NodeDescLink> {
        self.with_group(|g| g.links.clone()).unwrap_or_default()
    }

    pub fn find_node(&self, name: &str) -> Option<Arc<NodeDesc>> {
        self.with_group(|g| g.nodes.iter().find(|n| n.name() == name).cloned())
            .ok()
            .flatten()
    }

    pub fn find_node_by_type(&self, type_name: &str) -> Option<Arc<NodeDesc>> {
        self.with_group(|g| g.nodes.iter().find(|n| n.type_name() == type_name).cloned())
            .ok()
            .flatten()
    }

    pub fn node_by_index(&self, index: NodeIndex) -> Option<Arc<NodeDesc>> {
        self.with_group(|g| g.nodes.get(index as usize).cloned())
            .ok()
            .flatten()
    }

    pub fn find_node_index(&self, node: &Arc<NodeDesc>) -> Option<NodeIndex> {
        self.with_group(|g| {
            g.nodes
                .iter()
                .position(|n| Arc::ptr_eq(n, node))
                .map(|i| i as NodeIndex)
        })
        .ok()
        .flatten()
    }

    pub(crate) fn manager(&self) -> Result<Arc<NodeManager>, GraphError> {
        self.with_group(|g| g.manager.clone())
    }

    /// Instantiates a registered node type as a child of this group.
    pub fn add_node(&self, type_name: &str) -> Result<Arc<NodeDesc>, GraphError> {
        let manager = self.manager()?;
        let node = manager
            .create_node(type_name, Some(&self.arc()))
            .ok_or_else(|| GraphError::UnknownNodeType {
                type_name: type_name.to_owned(),
            })?;
        self.with_group_mut(|g| g.nodes.push(node.clone()))?;
        Ok(node)
    }

    /// Adds a nested group node as a child of this group.
    pub fn add_group_node(&self) -> Result<Arc<NodeDesc>, GraphError> {
        let manager = self.manager()?;
        let node = NodeDesc::create_group(&manager, Some(&self.arc()));
        self.with_group_mut(|g| g.nodes.push(node.clone()))?;
        Ok(node)
    }

    pub fn add_node_by_id(&self, type_id: NodeTypeId) -> Result<Arc<NodeDesc>, GraphError> {
        let manager = self.manager()?;
        let node = manager
            .create_node_by_id(type_id, Some(&self.arc()))
            .ok_or(GraphError::UnknownNodeTypeId { type_id })?;
        self.with_group_mut(|g| g.nodes.push(node.clone()))?;
        Ok(node)
    }

    // ---- authoring conveniences ---------------------------------------------

    pub fn add_math_node(
        &self,
        socket0: &Socket,
        socket1: &Socket,
        op: nodes::math::MathType,
    ) -> Result<Socket, GraphError> {
        let node = self.add_node(super::manager::NODE_MATH)?;
        node.set_property(nodes::math::IN_TYPE, op as i32)?;
        self.link(socket0.clone(), node.input_socket(nodes::math::IN_VALUE1)?)?;
        self.link(socket1.clone(), node.input_socket(nodes::math::IN_VALUE2)?)?;
        node.primary_output_socket()
    }

    pub fn add_vector_math_node(
        &self,
        socket0: &Socket,
        socket1: &Socket,
        op: nodes::vector_math::VectorMathType,
    ) -> Result<Arc<NodeDesc>, GraphError> {
        let node = self.add_node(super::manager::NODE_VECTOR_MATH)?;
        node.set_property(nodes::vector_math::IN_TYPE, op as i32)?;
        self.link(
            socket0.clone(),
            node.input_socket(nodes::vector_math::IN_VECTOR1)?,
        )?;
        if socket1.is_valid() {
            self.link(
                socket1.clone(),
                node.input_socket(nodes::vector_math::IN_VECTOR2)?,
            )?;
        }
        Ok(node)
    }

    pub fn combine_rgb(
        &self,
        r: &Socket,
        g: &Socket,
        b: &Socket,
    ) -> Result<Socket, GraphError> {
        let node = self.add_node(super::manager::NODE_COMBINE_RGB)?;
        self.link(r.clone(), node.input_socket(nodes::combine_rgb::IN_R)?)?;
        self.link(g.clone(), node.input_socket(nodes::combine_rgb::IN_G)?)?;
        self.link(b.clone(), node.input_socket(nodes::combine_rgb::IN_B)?)?;
        node.primary_output_socket()
    }

    pub fn separate_rgb(&self, rgb: &Socket) -> Result<Arc<NodeDesc>, GraphError> {
        let node = self.add_node(super::manager::NODE_SEPARATE_RGB)?;
        self.link(rgb.clone(), node.input_socket(nodes::separate_rgb::IN_COLOR)?)?;
        Ok(node)
    }

    pub fn add_image_texture_node(
        &self,
        file_name: &str,
        texture_type: TextureType,
    ) -> Result<Arc<NodeDesc>, GraphError> {
        self.add_image_texture_node_impl(Some(file_name), None, texture_type)
    }

    pub fn add_image_texture_node_from_socket(
        &self,
        file_name_socket: &Socket,
        texture_type: TextureType,
    ) -> Result<Arc<NodeDesc>, GraphError> {
        self.add_image_texture_node_impl(None, Some(file_name_socket), texture_type)
    }

    fn add_image_texture_node_impl(
        &self,
        file_name: Option<&str>,
        file_name_socket: Option<&Socket>,
        texture_type: TextureType,
    ) -> Result<Arc<NodeDesc>, GraphError> {
        let node = match texture_type {
            TextureType::ColorImage => {
                let node = self.add_node(super::manager::NODE_IMAGE_TEXTURE)?;
                node.set_property(nodes::image_texture::IN_COLORSPACE, nodes::COLORSPACE_SRGB)?;
                // Channel-packed alpha keeps disabled translucency from
                // bleeding into the color channels.
                node.set_property(
                    nodes::image_texture::IN_ALPHA_TYPE,
                    nodes::image_texture::AlphaType::ChannelPacked as i32,
                )?;
                node
            }
            TextureType::NonColorImage => {
                let node = self.add_node(super::manager::NODE_IMAGE_TEXTURE)?;
                node.set_property(nodes::image_texture::IN_COLORSPACE, nodes::COLORSPACE_RAW)?;
                node
            }
            TextureType::EquirectangularImage => {
                let node = self.add_node(super::manager::NODE_ENVIRONMENT_TEXTURE)?;
                node.set_property(
                    nodes::environment_texture::IN_COLORSPACE,
                    nodes::COLORSPACE_RAW,
                )?;
                node.set_property(
                    nodes::environment_texture::IN_PROJECTION,
                    nodes::EnvironmentProjection::Equirectangular as i32,
                )?;
                node
            }
            TextureType::NormalMap => {
                return self.add_normal_map_node_desc(file_name, file_name_socket, 1.0)
            }
        };
        if let Some(file_name) = file_name {
            node.set_property(nodes::image_texture::IN_FILENAME, file_name)?;
        } else if let Some(socket) = file_name_socket {
            let in_filename = node.property(nodes::image_texture::IN_FILENAME)?;
            self.link(socket.clone(), in_filename)?;
        }
        Ok(node)
    }

    pub fn add_normal_map_node(
        &self,
        file_name: Option<&str>,
        file_name_socket: Option<&Socket>,
        strength: f32,
    ) -> Result<Socket, GraphError> {
        let node = self.add_normal_map_node_desc(file_name, file_name_socket, strength)?;
        node.primary_output_socket()
    }

    fn add_normal_map_node_desc(
        &self,
        file_name: Option<&str>,
        file_name_socket: Option<&Socket>,
        strength: f32,
    ) -> Result<Arc<NodeDesc>, GraphError> {
        let tex =
            self.add_image_texture_node_impl(file_name, file_name_socket, TextureType::NonColorImage)?;
        let nmap = self.add_node(super::manager::NODE_NORMAL_MAP)?;
        nmap.set_property(
            nodes::normal_map::IN_SPACE,
            nodes::normal_map::NormalMapSpace::Tangent as i32,
        )?;
        self.link(
            tex.primary_output_socket()?,
            nmap.input_socket(nodes::normal_map::IN_COLOR)?,
        )?;
        nmap.set_property(nodes::normal_map::IN_STRENGTH, strength)?;
        Ok(nmap)
    }

    pub fn add_constant_node(&self, value: f32) -> Result<Socket, GraphError> {
        let node = self.add_node(super::manager::NODE_MATH)?;
        node.set_property(nodes::math::IN_VALUE1, value)?;
        node.set_property(nodes::math::IN_VALUE2, 0.0f32)?;
        node.set_property(nodes::math::IN_TYPE, nodes::math::MathType::Add as i32)?;
        node.primary_output_socket()
    }

    pub fn add_constant_vector_node(&self, value: Vec3) -> Result<Socket, GraphError> {
        let node = self.add_node(super::manager::NODE_VECTOR_MATH)?;
        node.set_property(nodes::vector_math::IN_VECTOR1, value)?;
        node.set_property(nodes::vector_math::IN_VECTOR2, Vec3::ZERO)?;
        node.set_property(
            nodes::vector_math::IN_TYPE,
            nodes::vector_math::VectorMathType::Add as i32,
        )?;
        node.primary_output_socket()
    }

    /// Mixes two sockets; closures go through a mix-closure node, colors
    /// through a blend mix node.
    pub fn mix(
        &self,
        socket0: &Socket,
        socket1: &Socket,
        fac: &Socket,
    ) -> Result<Socket, GraphError> {
        let ty0 = socket0.socket_type();
        let ty1 = socket1.socket_type();
        if ty0 != SocketType::Closure && ty1 != SocketType::Closure {
            return self.mix_mode(socket0, socket1, fac, nodes::mix::MixType::Blend);
        }
        let node = self.add_node(super::manager::NODE_MIX_CLOSURE)?;
        self.link(
            socket0.clone(),
            node.input_socket(nodes::mix_closure::IN_CLOSURE1)?,
        )?;
        self.link(
            socket1.clone(),
            node.input_socket(nodes::mix_closure::IN_CLOSURE2)?,
        )?;
        self.link(fac.clone(), node.input_socket(nodes::mix_closure::IN_FAC)?)?;
        node.primary_output_socket()
    }

    pub fn mix_mode(
        &self,
        socket0: &Socket,
        socket1: &Socket,
        fac: &Socket,
        mode: nodes::mix::MixType,
    ) -> Result<Socket, GraphError> {
        let node = self.add_node(super::manager::NODE_MIX)?;
        self.link(socket0.clone(), node.input_socket(nodes::mix::IN_COLOR1)?)?;
        self.link(socket1.clone(), node.input_socket(nodes::mix::IN_COLOR2)?)?;
        self.link(fac.clone(), node.input_socket(nodes::mix::IN_FAC)?)?;
        node.set_property(nodes::mix::IN_TYPE, mode as i32)?;
        node.primary_output_socket()
    }

    pub fn invert(&self, socket: &Socket, fac: Option<&Socket>) -> Result<Socket, GraphError> {
        let node = self.add_node(super::manager::NODE_INVERT)?;
        self.link(socket.clone(), node.input_socket(nodes::invert::IN_COLOR)?)?;
        if let Some(fac) = fac {
            self.link(fac.clone(), node.input_socket(nodes::invert::IN_FAC)?)?;
        }
        node.primary_output_socket()
    }

    pub fn to_gray_scale(&self, socket: &Socket) -> Result<Socket, GraphError> {
        let node = self.add_node(super::manager::NODE_RGB_TO_BW)?;
        self.link(socket.clone(), node.input_socket(nodes::rgb_to_bw::IN_COLOR)?)?;
        let value = node.primary_output_socket()?;
        self.combine_rgb(&value, &value, &value)
    }

    // ---- linking ------------------------------------------------------------

    pub fn link_named(
        &self,
        from_node: &Arc<NodeDesc>,
        from_socket: &str,
        to_node: &Arc<NodeDesc>,
        to_socket: &str,
    ) -> Result<(), GraphError> {
        self.link(
            from_node.output_socket(from_socket)?,
            to_node.input_socket(to_socket)?,
        )
    }

    /// Connects `from` to `to` within this group.
    ///
    /// A concrete `from` value is converted and stored into the target slot
    /// instead of creating a link. A pre-existing link into `to` is replaced.
    pub fn link(&self, from: Socket, to: Socket) -> Result<(), GraphError> {
        if to.is_concrete_value() {
            return Err(GraphError::LinkTargetConcrete { to: to.to_string() });
        }
        let (to_node, to_name) = to
            .node_and_name()
            .ok_or_else(|| GraphError::DanglingSocket {
                socket: to.to_string(),
            })?;
        let to_desc = if to.is_output() {
            if !to_node.is_group_node() {
                return Err(GraphError::LinkTargetIsOutput { to: to.to_string() });
            }
            to_node.find_output_socket_desc(&to_name)
        } else {
            to_node.find_input_socket_desc(&to_name)
        };
        let to_desc = to_desc
            .or_else(|| to_node.find_property_desc(&to_name))
            .ok_or_else(|| GraphError::NoInputSocket {
                node: to_node.to_string(),
                socket: to_name.clone(),
            })?;

        if from.is_concrete_value() {
            if let Some(from_value) = from.value() {
                let converted = convert(from_value, to_desc.data_value.ty).ok_or_else(|| {
                    GraphError::IncompatibleLinkValue {
                        from: from.to_string(),
                        to: to.to_string(),
                    }
                })?;
                if to.is_output() {
                    to_node.set_output_value(&to_name, converted);
                } else {
                    to_node.set_input_or_property_value(&to_name, converted);
                }
            }
            return Ok(());
        }

        let (from_node, from_name) =
            from.node_and_name()
                .ok_or_else(|| GraphError::DanglingSocket {
                    socket: from.to_string(),
                })?;
        if from_node.find_output_socket_desc(&from_name).is_none() {
            if !from_node.is_group_node() {
                return Err(GraphError::LinkSourceIsInput {
                    from: from.to_string(),
                });
            }
            if from_node.find_input_or_property_desc(&from_name).is_none() {
                return Err(GraphError::NoOutputSocket {
                    node: from_node.to_string(),
                    socket: from_name,
                });
            }
        }

        self.with_group_mut(|g| {
            if let Some(pos) = g.links.iter().position(|l| l.to_socket == to) {
                g.links.remove(pos);
            }
            g.links.push(NodeDescLink {
                from_socket: from,
                to_socket: to,
            });
        })
    }

    // ---- group resolution ---------------------------------------------------

    /// Inlines every nested group into this graph. Afterwards no child of
    /// this node is a group.
    pub fn resolve_group_nodes(&self) -> Result<(), GraphError> {
        if !self.is_group_node() {
            return Err(GraphError::NotAGroupNode {
                node: self.to_string(),
            });
        }
        let mut i = 0;
        loop {
            let child = self.with_group(|g| g.nodes.get(i).cloned())?;
            let child = match child {
                Some(c) => c,
                None => break,
            };
            if child.is_group_node() {
                child.resolve_group_nodes()?;
                child.splice_into_parent()?;
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    /// Splices this (already internally flat) group into its parent,
    /// rerouting all links that cross the group boundary.
    fn splice_into_parent(&self) -> Result<(), GraphError> {
        let this = self.arc();
        let parent = self.parent().ok_or_else(|| GraphError::ParentMismatch {
            node: self.to_string(),
        })?;

        let mut parent_links = parent.with_group_mut(|g| std::mem::take(&mut g.links))?;
        let (mut my_links, my_nodes) =
            self.with_group_mut(|g| (std::mem::take(&mut g.links), std::mem::take(&mut g.nodes)))?;

        let refers_to_me = |s: &Socket| s.node().map_or(false, |n| Arc::ptr_eq(&n, &this));
        let key_of = |s: &Socket| -> (String, bool) {
            let name = s.node_and_name().map(|(_, n)| n).unwrap_or_default();
            (name, s.is_output())
        };

        // Parent-level links touching this group's pseudo-node.
        let mut incoming: HashMap<(String, bool), usize> = HashMap::new();
        let mut outgoing: HashMap<(String, bool), SmallVec<[usize; 4]>> = HashMap::new();
        for (idx, link) in parent_links.iter().enumerate() {
            if refers_to_me(&link.to_socket) {
                incoming.insert(key_of(&link.to_socket), idx);
            } else if refers_to_me(&link.from_socket) {
                outgoing.entry(key_of(&link.from_socket)).or_default().push(idx);
            }
        }

        // Inner links touching this group's own sockets.
        let mut inner_from_inputs: HashMap<(String, bool), SmallVec<[usize; 4]>> = HashMap::new();
        let mut inner_to_outputs: HashMap<(String, bool), usize> = HashMap::new();
        for (idx, link) in my_links.iter().enumerate() {
            if refers_to_me(&link.from_socket) {
                inner_from_inputs
                    .entry(key_of(&link.from_socket))
                    .or_default()
                    .push(idx);
            }
            if refers_to_me(&link.to_socket) {
                inner_to_outputs.insert(key_of(&link.to_socket), idx);
            }
        }

        let mut cleared_to_sockets: Vec<Socket> = Vec::new();
        let mut new_parent_links: Vec<NodeDescLink> = Vec::new();

        // Properties and inputs: either propagate the stored default into the
        // inner targets, or reroute the incoming parent link onto them.
        let mut input_names: Vec<String> = Vec::new();
        {
            let state = self.state.read();
            input_names.extend(state.properties.keys().cloned());
            input_names.extend(state.inputs.keys().cloned());
        }
        for name in input_names {
            let skey = (name.clone(), false);
            let inner = match inner_from_inputs.get(&skey) {
                Some(list) => list,
                None => continue,
            };
            match incoming.get(&skey) {
                None => {
                    let default = self
                        .find_input_or_property_desc(&name)
                        .ok_or_else(|| GraphError::NoInputSocket {
                            node: self.to_string(),
                            socket: name.clone(),
                        })?
                        .data_value;
                    for &li in inner {
                        let to = my_links[li].to_socket.clone();
                        let (to_node, to_name) =
                            to.node_and_name().ok_or_else(|| GraphError::DanglingSocket {
                                socket: to.to_string(),
                            })?;
                        if to.is_output() {
                            to_node.set_output_value(&to_name, default.clone());
                            inner_to_outputs.remove(&(to_name, true));
                        } else {
                            to_node.set_input_or_property_value(&to_name, default.clone());
                        }
                    }
                }
                Some(&pi) => {
                    let from = parent_links[pi].from_socket.clone();
                    cleared_to_sockets.push(parent_links[pi].to_socket.clone());
                    for &li in inner {
                        let to = my_links[li].to_socket.clone();
                        if to.is_output() {
                            // The output pass reroutes the outgoing links to
                            // this source directly.
                            let okey = key_of(&to);
                            if let Some(&oi) = inner_to_outputs.get(&okey) {
                                my_links[oi].from_socket = from.clone();
                            }
                        } else {
                            new_parent_links.push(NodeDescLink {
                                from_socket: from.clone(),
                                to_socket: to,
                            });
                        }
                    }
                }
            }
        }

        // Outputs: connected outputs reroute the outgoing links to the inner
        // source; unconnected ones propagate their stored value outward.
        let mut removed_parent_links: Vec<usize> = Vec::new();
        let output_names: Vec<String> = self.state.read().outputs.keys().cloned().collect();
        for name in output_names {
            let skey = (name.clone(), true);
            let out_links = match outgoing.get(&skey) {
                Some(list) => list,
                None => continue,
            };
            match inner_to_outputs.get(&skey) {
                None => {
                    let value = self
                        .find_output_socket_desc(&name)
                        .ok_or_else(|| GraphError::NoOutputSocket {
                            node: self.to_string(),
                            socket: name.clone(),
                        })?
                        .data_value;
                    for &pi in out_links {
                        let to = parent_links[pi].to_socket.clone();
                        let (to_node, to_name) =
                            to.node_and_name().ok_or_else(|| GraphError::DanglingSocket {
                                socket: to.to_string(),
                            })?;
                        to_node.set_input_or_property_value(&to_name, value.clone());
                        removed_parent_links.push(pi);
                    }
                }
                Some(&ii) => {
                    let from = my_links[ii].from_socket.clone();
                    for &pi in out_links {
                        parent_links[pi].from_socket = from.clone();
                    }
                }
            }
        }

        // Apply the queued parent-link updates.
        for to in &cleared_to_sockets {
            if let Some(pos) = parent_links.iter().position(|l| &l.to_socket == to) {
                removed_parent_links.push(pos);
            }
        }
        removed_parent_links.sort_unstable();
        removed_parent_links.dedup();
        for pos in removed_parent_links.into_iter().rev() {
            parent_links.remove(pos);
        }
        parent_links.append(&mut new_parent_links);

        // Move children and surviving inner links up.
        parent.with_group_mut(|g| -> Result<(), GraphError> {
            let pos = g
                .nodes
                .iter()
                .position(|n| Arc::ptr_eq(n, &this))
                .ok_or_else(|| GraphError::ParentMismatch {
                    node: self.to_string(),
                })?;
            g.nodes.remove(pos);
            g.nodes.reserve(my_nodes.len());
            for child in &my_nodes {
                if child.is_group_node() {
                    return Err(GraphError::UnresolvedChildGroup {
                        node: self.to_string(),
                    });
                }
                child.set_parent(Some(&parent));
                g.nodes.push(child.clone());
            }
            Ok(())
        })??;

        for link in my_links {
            if refers_to_me(&link.from_socket) || refers_to_me(&link.to_socket) {
                continue;
            }
            parent_links.push(link);
        }
        parent.with_group_mut(|g| g.links = parent_links)?;
        self.set_parent(None);
        Ok(())
    }

    // ---- serialization ------------------------------------------------------

    /// Serializes this group: the node tree first, then each group's links,
    /// with sockets referring to nodes through a pre-order index table.
    pub fn serialize(&self, w: &mut BlobWriter) -> Result<(), GraphError> {
        let mut table = HashMap::new();
        let mut next = 0u32;
        self.build_index_table(&mut table, &mut next);
        self.serialize_nodes(w);
        self.serialize_links(w, &table)
    }

    fn build_index_table(&self, table: &mut HashMap<usize, NodeIndex>, next: &mut NodeIndex) {
        table.insert(self as *const NodeDesc as usize, *next);
        *next += 1;
        if self.is_group_node() {
            for child in self.nodes() {
                child.build_index_table(table, next);
            }
        }
    }

    fn serialize_nodes(&self, w: &mut BlobWriter) {
        let state = self.state.read();
        w.write_string(&state.type_name);
        w.write_string(&state.name);
        let write_map = |w: &mut BlobWriter, map: &HashMap<String, NodeSocketDesc>| {
            w.write_u32(map.len() as u32);
            for (name, desc) in map {
                w.write_string(name);
                desc.serialize(w);
            }
        };
        write_map(w, &state.inputs);
        write_map(w, &state.properties);
        write_map(w, &state.outputs);
        w.write_bool(state.primary_output.is_some());
        if let Some(primary) = &state.primary_output {
            w.write_string(primary);
        }
        drop(state);

        if self.is_group_node() {
            let children = self.nodes();
            w.write_u32(children.len() as u32);
            for child in children {
                w.write_bool(child.is_group_node());
                child.serialize_nodes(w);
            }
        }
    }

    fn serialize_links(
        &self,
        w: &mut BlobWriter,
        table: &HashMap<usize, NodeIndex>,
    ) -> Result<(), GraphError> {
        let links = self.links();
        w.write_u32(links.len() as u32);
        for link in &links {
            link.serialize(w, table)?;
        }
        for child in self.nodes() {
            if child.is_group_node() {
                child.serialize_links(w, table)?;
            }
        }
        Ok(())
    }

    /// Deserializes into this (empty) group node.
    pub fn deserialize(&self, r: &mut BlobReader<'_>) -> Result<(), GraphError> {
        self.deserialize_nodes(r)?;
        let mut table = Vec::new();
        self.collect_preorder(&mut table);
        self.deserialize_links(r, &table)
    }

    fn collect_preorder(&self, table: &mut Vec<Arc<NodeDesc>>) {
        table.push(self.arc());
        if self.is_group_node() {
            for child in self.nodes() {
                child.collect_preorder(table);
            }
        }
    }

    fn deserialize_nodes(&self, r: &mut BlobReader<'_>) -> Result<(), GraphError> {
        {
            let mut state = self.state.write();
            state.type_name = r.read_string()?;
            state.name = r.read_string()?;
            let read_map =
                |r: &mut BlobReader<'_>| -> Result<HashMap<String, NodeSocketDesc>, CodecError> {
                    let n = r.read_u32()? as usize;
                    let mut map = HashMap::with_capacity(n);
                    for _ in 0..n {
                        let key = r.read_string()?;
                        map.insert(key, NodeSocketDesc::deserialize(r)?);
                    }
                    Ok(map)
                };
            state.inputs = read_map(r)?;
            state.properties = read_map(r)?;
            state.outputs = read_map(r)?;
            state.primary_output = if r.read_bool()? {
                Some(r.read_string()?)
            } else {
                None
            };
        }

        if self.is_group_node() {
            let manager = self.manager()?;
            let this = self.arc();
            let count = r.read_u32()? as usize;
            for _ in 0..count {
                let is_group = r.read_bool()?;
                let child = if is_group {
                    NodeDesc::create_group(&manager, Some(&this))
                } else {
                    NodeDesc::create(Some(&this))
                };
                child.deserialize_nodes(r)?;
                self.with_group_mut(|g| g.nodes.push(child.clone()))?;
            }
        }
        Ok(())
    }

    fn deserialize_links(
        &self,
        r: &mut BlobReader<'_>,
        table: &[Arc<NodeDesc>],
    ) -> Result<(), GraphError> {
        let count = r.read_u32()? as usize;
        for _ in 0..count {
            let link = NodeDescLink::deserialize(r, table)?;
            self.with_group_mut(|g| g.links.push(link))?;
        }
        for child in self.nodes() {
            if child.is_group_node() {
                child.deserialize_links(r, table)?;
            }
        }
        Ok(())
    }
}
