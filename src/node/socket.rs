//! Sockets: either a concrete literal or a reference to a node port.
//!
//! Arithmetic between sockets is graph authoring: when at least one operand
//! is a node port, the operator synthesizes the matching math node inside the
//! owning group and returns its primary output.

use std::{
    collections::HashMap,
    fmt,
    ops::{Add, Div, Mul, Neg, Rem, Sub},
    sync::{Arc, Weak},
};

use crate::{
    codec::{BlobReader, BlobWriter},
    math::Vec3,
    node::{
        desc::{GraphError, NodeDesc, NodeIndex},
        nodes::{
            combine_xyz,
            math::MathType,
            vector_math::VectorMathType,
        },
        value::{is_numeric_type, is_vector_type, DataValue, SocketType},
    },
};

const COMPARISON_EPSILON: f32 = 0.00001;

/// Reference to a named socket of a node.
#[derive(Clone, Debug)]
pub struct NodeSocketRef {
    pub(crate) node: Weak<NodeDesc>,
    pub(crate) name: String,
    pub(crate) output: bool,
}

/// A concrete value or a node socket reference.
#[derive(Clone)]
pub enum Socket {
    Value(DataValue),
    Node(NodeSocketRef),
}

impl From<DataValue> for Socket {
    fn from(value: DataValue) -> Self {
        Socket::Value(value)
    }
}

impl From<f32> for Socket {
    fn from(value: f32) -> Self {
        Socket::Value(DataValue::float(value))
    }
}

impl From<Vec3> for Socket {
    fn from(value: Vec3) -> Self {
        Socket::Value(DataValue::vector(value))
    }
}

impl PartialEq for Socket {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Socket::Value(a), Socket::Value(b)) => a == b,
            (Socket::Node(a), Socket::Node(b)) => {
                let na = a.node.upgrade();
                let nb = b.node.upgrade();
                let nodes_match = match (&na, &nb) {
                    (Some(na), Some(nb)) => Arc::ptr_eq(na, nb),
                    (None, None) => true,
                    _ => false,
                };
                nodes_match && a.name == b.name
            }
            _ => false,
        }
    }
}

impl Socket {
    /// An unconnected, invalid socket.
    pub fn invalid() -> Self {
        Socket::Node(NodeSocketRef {
            node: Weak::new(),
            name: String::new(),
            output: false,
        })
    }

    pub(crate) fn from_node(node: &Arc<NodeDesc>, name: impl Into<String>, output: bool) -> Self {
        Socket::Node(NodeSocketRef {
            node: Arc::downgrade(node),
            name: name.into(),
            output,
        })
    }

    pub fn is_concrete_value(&self) -> bool {
        matches!(self, Socket::Value(_))
    }

    pub fn is_node_socket(&self) -> bool {
        !self.is_concrete_value()
    }

    /// Concrete sockets count as outputs for linking purposes.
    pub fn is_output(&self) -> bool {
        match self {
            Socket::Value(_) => true,
            Socket::Node(n) => n.output,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Socket::Value(_) => true,
            Socket::Node(n) => n.node.strong_count() > 0,
        }
    }

    pub fn node(&self) -> Option<Arc<NodeDesc>> {
        match self {
            Socket::Value(_) => None,
            Socket::Node(n) => n.node.upgrade(),
        }
    }

    pub fn node_and_name(&self) -> Option<(Arc<NodeDesc>, String)> {
        match self {
            Socket::Value(_) => None,
            Socket::Node(n) => n.node.upgrade().map(|node| (node, n.name.clone())),
        }
    }

    pub fn value(&self) -> Option<&DataValue> {
        match self {
            Socket::Value(v) => Some(v),
            Socket::Node(_) => None,
        }
    }

    pub fn socket_type(&self) -> SocketType {
        match self {
            Socket::Value(v) => v.ty,
            Socket::Node(_) => {
                let node = match self.node() {
                    Some(n) => n,
                    None => return SocketType::Invalid,
                };
                node.find_socket_desc(self)
                    .map(|d| d.data_value.ty)
                    .unwrap_or(SocketType::Invalid)
            }
        }
    }

    /// Links this socket to `other`, resolving the group that must own the
    /// link from the operand nodes.
    pub fn link(&self, other: &Socket) -> Result<(), GraphError> {
        if self.is_concrete_value() && other.is_concrete_value() {
            return Err(GraphError::LinkTargetConcrete {
                to: other.to_string(),
            });
        }
        let node0 = self.node();
        let node1 = other.node();
        let group = match (&node0, &node1) {
            (None, None) => None,
            (Some(n0), None) => n0.parent(),
            (None, Some(n1)) => n1.parent(),
            (Some(n0), Some(n1)) => {
                if Arc::ptr_eq(n0, n1) {
                    // A group input linked straight to one of the group's own
                    // outputs. The only case where a node links to itself.
                    n0.is_group_node().then(|| n0.clone())
                } else {
                    let p0 = n0.parent();
                    let p1 = n1.parent();
                    match (&p0, &p1) {
                        (Some(a), Some(b)) if Arc::ptr_eq(a, b) => p0.clone(),
                        _ => {
                            if p0.as_ref().map_or(false, |p| Arc::ptr_eq(p, n1)) {
                                p0.clone()
                            } else if p1.as_ref().map_or(false, |p| Arc::ptr_eq(p, n0)) {
                                p1.clone()
                            } else {
                                None
                            }
                        }
                    }
                }
            }
        };
        let group = group.ok_or_else(|| GraphError::NoCommonGroup {
            from: self.to_string(),
            to: other.to_string(),
        })?;
        group.link(self.clone(), other.clone())
    }

    /// The group node a synthesized operator node must be added to.
    ///
    /// An input socket is only usable as an operand inside its own group
    /// node; otherwise the result lives in the parent of the operand node.
    fn common_group_node(&self, other: &Socket) -> Option<Arc<NodeDesc>> {
        if !self.is_concrete_value() && !self.is_output() {
            return self.node().filter(|n| n.is_group_node());
        }
        if !other.is_concrete_value() && !other.is_output() {
            return other.node().filter(|n| n.is_group_node());
        }
        let reference = if self.is_concrete_value() { other } else { self };
        reference.node()?.parent()
    }

    fn apply_operator(
        &self,
        other: &Socket,
        op: MathType,
        vec_op: Option<VectorMathType>,
        apply: fn(f32, f32) -> f32,
    ) -> Socket {
        let src_type = self.socket_type();
        let dst_type = other.socket_type();
        if self.is_concrete_value() && other.is_concrete_value() {
            let apply_vec = |a: Vec3, b: Vec3| -> Vec3 {
                Vec3::new(apply(a.x, b.x), apply(a.y, b.y), apply(a.z, b.z))
            };
            if is_vector_type(src_type) {
                let a = match self.value().and_then(DataValue::to_vector) {
                    Some(v) => v,
                    None => return Socket::from(0.0),
                };
                if is_vector_type(dst_type) {
                    let b = match other.value().and_then(DataValue::to_vector) {
                        Some(v) => v,
                        None => return Socket::from(0.0),
                    };
                    return Socket::from(apply_vec(a, b));
                }
                if !is_numeric_type(dst_type) {
                    return Socket::from(0.0);
                }
                let b = match other.value().and_then(|v| v.to_float()) {
                    Some(v) => v,
                    None => return Socket::from(0.0),
                };
                return Socket::from(apply_vec(a, Vec3::splat(b)));
            }
            if is_vector_type(dst_type) {
                if !is_numeric_type(src_type) {
                    return Socket::from(0.0);
                }
                let a = match self.value().and_then(|v| v.to_float()) {
                    Some(v) => v,
                    None => return Socket::from(0.0),
                };
                let b = match other.value().and_then(DataValue::to_vector) {
                    Some(v) => v,
                    None => return Socket::from(0.0),
                };
                return Socket::from(apply_vec(Vec3::splat(a), b));
            }
            let a = self.value().and_then(|v| v.to_float());
            let b = other.value().and_then(|v| v.to_float());
            return match (a, b) {
                (Some(a), Some(b)) => Socket::from(apply(a, b)),
                _ => Socket::from(0.0),
            };
        }

        let target = match self.common_group_node(other) {
            Some(t) => t,
            None => return Socket::from(0.0),
        };

        let result = if is_vector_type(src_type) {
            let vec_op = match vec_op {
                Some(op) => op,
                None => return Socket::from(0.0),
            };
            if is_vector_type(dst_type) {
                target
                    .add_vector_math_node(self, other, vec_op)
                    .and_then(|n| n.primary_output_socket())
            } else if is_numeric_type(dst_type) {
                broadcast_to_vector(&target, other)
                    .and_then(|v| target.add_vector_math_node(self, &v, vec_op))
                    .and_then(|n| n.primary_output_socket())
            } else {
                return Socket::from(0.0);
            }
        } else if is_vector_type(dst_type) {
            let vec_op = match vec_op {
                Some(op) if is_numeric_type(src_type) => op,
                _ => return Socket::from(0.0),
            };
            broadcast_to_vector(&target, self)
                .and_then(|v| target.add_vector_math_node(&v, other, vec_op))
                .and_then(|n| n.primary_output_socket())
        } else {
            target.add_math_node(self, other, op)
        };
        result.unwrap_or_else(|_| Socket::from(0.0))
    }

    fn apply_comparison(
        &self,
        other: &Socket,
        compare: fn(f32, f32) -> bool,
        make_node: fn(&Arc<NodeDesc>, &Socket, &Socket) -> Result<Socket, GraphError>,
    ) -> Socket {
        if self.is_concrete_value() && other.is_concrete_value() {
            let a = self.value().and_then(|v| v.to_float());
            let b = other.value().and_then(|v| v.to_float());
            return match (a, b) {
                (Some(a), Some(b)) => Socket::from(compare(a, b) as u8 as f32),
                _ => Socket::from(0.0),
            };
        }
        let target = match self.common_group_node(other) {
            Some(t) => t,
            None => return Socket::from(0.0),
        };
        make_node(&target, self, other).unwrap_or_else(|_| Socket::from(0.0))
    }

    /// `self ^ other` as a power node (or concrete powf).
    pub fn pow(&self, other: impl Into<Socket>) -> Socket {
        self.apply_operator(&other.into(), MathType::Power, None, f32::powf)
    }

    /// Scalar mask `self < other` (0 or 1).
    pub fn lt(&self, other: impl Into<Socket>) -> Socket {
        self.apply_comparison(&other.into(), |a, b| a < b, |g, a, b| {
            g.add_math_node(a, b, MathType::LessThan)
        })
    }

    /// Scalar mask `self <= other`, offset by a small epsilon on the node
    /// path.
    pub fn le(&self, other: impl Into<Socket>) -> Socket {
        self.apply_comparison(&other.into(), |a, b| a <= b, |g, a, b| {
            let b = b + COMPARISON_EPSILON;
            g.add_math_node(a, &b, MathType::LessThan)
        })
    }

    /// Scalar mask `self > other`.
    pub fn gt(&self, other: impl Into<Socket>) -> Socket {
        self.apply_comparison(&other.into(), |a, b| a > b, |g, a, b| {
            g.add_math_node(a, b, MathType::GreaterThan)
        })
    }

    /// Scalar mask `self >= other`, offset by a small epsilon on the node
    /// path.
    pub fn ge(&self, other: impl Into<Socket>) -> Socket {
        self.apply_comparison(&other.into(), |a, b| a >= b, |g, a, b| {
            let b = b - COMPARISON_EPSILON;
            g.add_math_node(a, &b, MathType::GreaterThan)
        })
    }

    pub(crate) fn serialize(
        &self,
        w: &mut BlobWriter,
        table: &HashMap<usize, NodeIndex>,
    ) -> Result<(), GraphError> {
        if !self.is_valid() {
            w.write_u8(0);
            return Ok(());
        }
        match self {
            Socket::Value(v) => {
                w.write_u8(1);
                v.serialize(w);
                Ok(())
            }
            Socket::Node(n) => {
                let node = n.node.upgrade().ok_or_else(|| GraphError::DanglingSocket {
                    socket: self.to_string(),
                })?;
                let idx = table
                    .get(&(Arc::as_ptr(&node) as usize))
                    .ok_or_else(|| GraphError::ParentMismatch {
                        node: node.to_string(),
                    })?;
                w.write_u8(2);
                w.write_u32(*idx);
                w.write_string(&n.name);
                w.write_bool(n.output);
                Ok(())
            }
        }
    }

    pub(crate) fn deserialize(
        r: &mut BlobReader<'_>,
        table: &[Arc<NodeDesc>],
    ) -> Result<Socket, GraphError> {
        match r.read_u8()? {
            0 => Ok(Socket::invalid()),
            1 => Ok(Socket::Value(DataValue::deserialize(r)?)),
            _ => {
                let idx = r.read_u32()? as usize;
                let node = table.get(idx).ok_or_else(|| GraphError::DanglingSocket {
                    socket: format!("Socket[node #{idx}]"),
                })?;
                let name = r.read_string()?;
                let output = r.read_bool()?;
                Ok(Socket::from_node(node, name, output))
            }
        }
    }
}

/// Splats a scalar socket into a vector through a combine-xyz node.
fn broadcast_to_vector(group: &Arc<NodeDesc>, scalar: &Socket) -> Result<Socket, GraphError> {
    let node = group.add_node(super::manager::NODE_COMBINE_XYZ)?;
    group.link(scalar.clone(), node.input_socket(combine_xyz::IN_X)?)?;
    group.link(scalar.clone(), node.input_socket(combine_xyz::IN_Y)?)?;
    group.link(scalar.clone(), node.input_socket(combine_xyz::IN_Z)?)?;
    node.primary_output_socket()
}

impl fmt::Display for Socket {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Socket[{}]", self.socket_type())?;
        match self {
            Socket::Value(v) => write!(fmt, "[{}]", v),
            Socket::Node(n) => {
                match n.node.upgrade() {
                    Some(node) => write!(fmt, "[{}]", node)?,
                    None => fmt.write_str("[NULL]")?,
                }
                write!(fmt, "[{}]", n.name)
            }
        }
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, fmt)
    }
}

macro_rules! socket_binary_op {
    ($trait:ident, $method:ident, $math:expr, $vec_math:expr, $apply:expr) => {
        impl $trait<&Socket> for &Socket {
            type Output = Socket;

            fn $method(self, rhs: &Socket) -> Socket {
                self.apply_operator(rhs, $math, $vec_math, $apply)
            }
        }

        impl $trait<Socket> for Socket {
            type Output = Socket;

            fn $method(self, rhs: Socket) -> Socket {
                (&self).$method(&rhs)
            }
        }

        impl $trait<f32> for &Socket {
            type Output = Socket;

            fn $method(self, rhs: f32) -> Socket {
                self.apply_operator(&Socket::from(rhs), $math, $vec_math, $apply)
            }
        }

        impl $trait<f32> for Socket {
            type Output = Socket;

            fn $method(self, rhs: f32) -> Socket {
                (&self).$method(rhs)
            }
        }
    };
}

socket_binary_op!(
    Add,
    add,
    MathType::Add,
    Some(VectorMathType::Add),
    |a, b| a + b
);
socket_binary_op!(
    Sub,
    sub,
    MathType::Subtract,
    Some(VectorMathType::Subtract),
    |a, b| a - b
);
socket_binary_op!(
    Mul,
    mul,
    MathType::Multiply,
    Some(VectorMathType::Multiply),
    |a, b| a * b
);
socket_binary_op!(
    Div,
    div,
    MathType::Divide,
    Some(VectorMathType::Divide),
    |a, b| a / b
);
socket_binary_op!(
    Rem,
    rem,
    MathType::Modulo,
    Some(VectorMathType::Modulo),
    |a, b| a % b
);

impl Neg for &Socket {
    type Output = Socket;

    fn neg(self) -> Socket {
        if is_vector_type(self.socket_type()) {
            &Socket::from(Vec3::ZERO) - self
        } else {
            &Socket::from(0.0) - self
        }
    }
}

impl Neg for Socket {
    type Output = Socket;

    fn neg(self) -> Socket {
        -&self
    }
}

impl Add<&Socket> for f32 {
    type Output = Socket;

    fn add(self, rhs: &Socket) -> Socket {
        &Socket::from(self) + rhs
    }
}

impl Mul<&Socket> for f32 {
    type Output = Socket;

    fn mul(self, rhs: &Socket) -> Socket {
        &Socket::from(self) * rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concrete_add_sub_are_exact() {
        let a = Socket::from(1.25f32);
        let b = Socket::from(2.5f32);
        let sum = &a + &b;
        assert_eq!(sum.value().unwrap().to_float(), Some(3.75));
        let diff = &a - &b;
        assert_eq!(diff.value().unwrap().to_float(), Some(-1.25));
    }

    #[test]
    fn concrete_vector_ops_are_component_wise() {
        let a = Socket::from(Vec3::new(1.0, 2.0, 3.0));
        let b = Socket::from(Vec3::new(4.0, 5.0, 6.0));
        let prod = &a * &b;
        assert_eq!(
            prod.value().unwrap().to_vector(),
            Some(Vec3::new(4.0, 10.0, 18.0))
        );
    }

    #[test]
    fn concrete_scalar_vector_broadcast() {
        let a = Socket::from(2.0f32);
        let b = Socket::from(Vec3::new(1.0, 2.0, 3.0));
        let prod = &a * &b;
        assert_eq!(
            prod.value().unwrap().to_vector(),
            Some(Vec3::new(2.0, 4.0, 6.0))
        );
    }

    #[test]
    fn concrete_comparisons_yield_masks() {
        let a = Socket::from(1.0f32);
        assert_eq!(a.lt(2.0).value().unwrap().to_float(), Some(1.0));
        assert_eq!(a.gt(2.0).value().unwrap().to_float(), Some(0.0));
        assert_eq!(a.le(1.0).value().unwrap().to_float(), Some(1.0));
        assert_eq!(a.ge(1.5).value().unwrap().to_float(), Some(0.0));
    }

    #[test]
    fn concrete_pow_and_modulo() {
        let a = Socket::from(2.0f32);
        assert_eq!(a.pow(3.0).value().unwrap().to_float(), Some(8.0));
        let b = Socket::from(7.0f32);
        assert_eq!((b % 4.0).value().unwrap().to_float(), Some(3.0));
    }

    #[test]
    fn negation_of_scalar() {
        let a = Socket::from(1.5f32);
        assert_eq!((-&a).value().unwrap().to_float(), Some(-1.5));
    }

    #[test]
    fn invalid_socket_reports_invalid_type() {
        let s = Socket::invalid();
        assert!(!s.is_valid());
        assert_eq!(s.socket_type(), SocketType::Invalid);
    }
}
