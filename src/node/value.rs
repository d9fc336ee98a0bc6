//! Typed socket values and the conversion table between socket types.

use std::{fmt, sync::Arc};

use crate::{
    codec::{BlobReader, BlobWriter, CodecError},
    math::{self, Affine3A, Vec2, Vec3},
};

/// Semantic type of a socket. `Color`/`Vector`/`Point`/`Normal` share a
/// 3-float payload but are distinct types; `Closure` and `Node` never carry a
/// value and exist for linking only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SocketType {
    Bool = 0,
    Float,
    Int,
    UInt,
    Color,
    Vector,
    Point,
    Normal,
    Point2,
    Closure,
    String,
    Enum,
    Transform,
    Node,
    FloatArray,
    ColorArray,

    Invalid = u8::MAX,
}

pub const SOCKET_TYPE_COUNT: usize = 16;

impl SocketType {
    pub fn from_u8(v: u8) -> Option<SocketType> {
        Some(match v {
            0 => SocketType::Bool,
            1 => SocketType::Float,
            2 => SocketType::Int,
            3 => SocketType::UInt,
            4 => SocketType::Color,
            5 => SocketType::Vector,
            6 => SocketType::Point,
            7 => SocketType::Normal,
            8 => SocketType::Point2,
            9 => SocketType::Closure,
            10 => SocketType::String,
            11 => SocketType::Enum,
            12 => SocketType::Transform,
            13 => SocketType::Node,
            14 => SocketType::FloatArray,
            15 => SocketType::ColorArray,
            u8::MAX => SocketType::Invalid,
            _ => return None,
        })
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketType::Bool => "Bool",
            SocketType::Float => "Float",
            SocketType::Int => "Int",
            SocketType::UInt => "UInt",
            SocketType::Color => "Color",
            SocketType::Vector => "Vector",
            SocketType::Point => "Point",
            SocketType::Normal => "Normal",
            SocketType::Point2 => "Point2",
            SocketType::Closure => "Closure",
            SocketType::String => "String",
            SocketType::Enum => "Enum",
            SocketType::Transform => "Transform",
            SocketType::Node => "Node",
            SocketType::FloatArray => "FloatArray",
            SocketType::ColorArray => "ColorArray",
            SocketType::Invalid => "Invalid",
        };
        fmt.write_str(name)
    }
}

pub const fn is_numeric_type(ty: SocketType) -> bool {
    matches!(
        ty,
        SocketType::Bool | SocketType::Float | SocketType::Int | SocketType::UInt | SocketType::Enum
    )
}

pub const fn is_vector_type(ty: SocketType) -> bool {
    matches!(
        ty,
        SocketType::Color | SocketType::Vector | SocketType::Point | SocketType::Normal
    )
}

pub const fn is_vector2_type(ty: SocketType) -> bool {
    matches!(ty, SocketType::Point2)
}

pub const fn is_array_type(ty: SocketType) -> bool {
    matches!(ty, SocketType::FloatArray | SocketType::ColorArray)
}

/// Whether a value of `src` can be re-tagged or numerically cast to `dst`.
pub const fn is_convertible_to(src: SocketType, dst: SocketType) -> bool {
    if is_numeric_type(src) {
        return is_numeric_type(dst);
    }
    if is_vector_type(src) {
        return is_vector_type(dst);
    }
    matches!(
        (src, dst),
        (SocketType::Point2, SocketType::Point2)
            | (SocketType::String, SocketType::String)
            | (SocketType::Transform, SocketType::Transform)
            | (SocketType::FloatArray, SocketType::FloatArray)
            | (SocketType::ColorArray, SocketType::ColorArray)
    )
}

/// Payload shared between the value-carrying socket types.
#[derive(Clone, Debug, PartialEq)]
pub enum SocketValue {
    Bool(bool),
    Float(f32),
    Int(i32),
    UInt(u32),
    /// Color / Vector / Point / Normal.
    Vector(Vec3),
    Point2(Vec2),
    String(String),
    Enum(i32),
    Transform(Affine3A),
    FloatArray(Vec<f32>),
    ColorArray(Vec<Vec3>),
}

impl SocketValue {
    fn as_f64(&self) -> Option<f64> {
        Some(match self {
            SocketValue::Bool(v) => *v as u8 as f64,
            SocketValue::Float(v) => *v as f64,
            SocketValue::Int(v) => *v as f64,
            SocketValue::UInt(v) => *v as f64,
            SocketValue::Enum(v) => *v as f64,
            _ => return None,
        })
    }

    fn as_vec3(&self) -> Option<Vec3> {
        match self {
            SocketValue::Vector(v) => Some(*v),
            _ => None,
        }
    }
}

/// A typed, shared literal. Equality is identity equality: two values are
/// equal iff their types match and their payloads alias.
#[derive(Clone, Debug)]
pub struct DataValue {
    pub ty: SocketType,
    pub value: Option<Arc<SocketValue>>,
}

impl Default for DataValue {
    fn default() -> Self {
        DataValue {
            ty: SocketType::Bool,
            value: None,
        }
    }
}

impl PartialEq for DataValue {
    fn eq(&self, other: &Self) -> bool {
        if self.ty != other.ty {
            return false;
        }
        match (&self.value, &other.value) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for DataValue {}

impl DataValue {
    pub fn new(ty: SocketType, value: SocketValue) -> Self {
        DataValue {
            ty,
            value: Some(Arc::new(value)),
        }
    }

    /// A value-less slot of the given type (output sockets, `Closure`,
    /// `Node`).
    pub fn typeless(ty: SocketType) -> Self {
        DataValue { ty, value: None }
    }

    pub fn bool(v: bool) -> Self {
        Self::new(SocketType::Bool, SocketValue::Bool(v))
    }

    pub fn float(v: f32) -> Self {
        Self::new(SocketType::Float, SocketValue::Float(v))
    }

    pub fn int(v: i32) -> Self {
        Self::new(SocketType::Int, SocketValue::Int(v))
    }

    pub fn uint(v: u32) -> Self {
        Self::new(SocketType::UInt, SocketValue::UInt(v))
    }

    pub fn color(v: Vec3) -> Self {
        Self::new(SocketType::Color, SocketValue::Vector(v))
    }

    pub fn vector(v: Vec3) -> Self {
        Self::new(SocketType::Vector, SocketValue::Vector(v))
    }

    pub fn point(v: Vec3) -> Self {
        Self::new(SocketType::Point, SocketValue::Vector(v))
    }

    pub fn normal(v: Vec3) -> Self {
        Self::new(SocketType::Normal, SocketValue::Vector(v))
    }

    pub fn point2(v: Vec2) -> Self {
        Self::new(SocketType::Point2, SocketValue::Point2(v))
    }

    pub fn string(v: impl Into<String>) -> Self {
        Self::new(SocketType::String, SocketValue::String(v.into()))
    }

    pub fn enum_value(v: i32) -> Self {
        Self::new(SocketType::Enum, SocketValue::Enum(v))
    }

    pub fn transform(v: Affine3A) -> Self {
        Self::new(SocketType::Transform, SocketValue::Transform(v))
    }

    pub fn float_array(v: Vec<f32>) -> Self {
        Self::new(SocketType::FloatArray, SocketValue::FloatArray(v))
    }

    pub fn color_array(v: Vec<Vec3>) -> Self {
        Self::new(SocketType::ColorArray, SocketValue::ColorArray(v))
    }

    pub fn is_typeless(&self) -> bool {
        self.value.is_none()
    }

    pub fn to_bool(&self) -> Option<bool> {
        self.value.as_ref()?.as_f64().map(|v| v != 0.0)
    }

    pub fn to_float(&self) -> Option<f32> {
        self.value.as_ref()?.as_f64().map(|v| v as f32)
    }

    pub fn to_int(&self) -> Option<i32> {
        self.value.as_ref()?.as_f64().map(|v| v as i32)
    }

    pub fn to_uint(&self) -> Option<u32> {
        self.value.as_ref()?.as_f64().map(|v| v as u32)
    }

    pub fn to_vector(&self) -> Option<Vec3> {
        self.value.as_ref()?.as_vec3()
    }

    pub fn to_point2(&self) -> Option<Vec2> {
        match self.value.as_deref()? {
            SocketValue::Point2(v) => Some(*v),
            _ => None,
        }
    }

    pub fn to_string_value(&self) -> Option<String> {
        match self.value.as_deref()? {
            SocketValue::String(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn to_transform(&self) -> Option<Affine3A> {
        match self.value.as_deref()? {
            SocketValue::Transform(v) => Some(*v),
            _ => None,
        }
    }

    pub fn serialize(&self, w: &mut BlobWriter) {
        w.write_u8(self.ty as u8);
        w.write_bool(self.value.is_some());
        let value = match &self.value {
            Some(v) => v,
            None => return,
        };
        match value.as_ref() {
            SocketValue::Bool(v) => w.write_bool(*v),
            SocketValue::Float(v) => w.write_f32(*v),
            SocketValue::Int(v) | SocketValue::Enum(v) => w.write_i32(*v),
            SocketValue::UInt(v) => w.write_u32(*v),
            SocketValue::Vector(v) => w.write_vec3(*v),
            SocketValue::Point2(v) => w.write_vec2(*v),
            SocketValue::String(v) => w.write_string(v),
            SocketValue::Transform(v) => math::write_affine(w, v),
            SocketValue::FloatArray(v) => w.write_f32_slice(v),
            SocketValue::ColorArray(v) => w.write_vec3_slice(v),
        }
    }

    pub fn deserialize(r: &mut BlobReader<'_>) -> Result<DataValue, CodecError> {
        let raw = r.read_u8()?;
        let ty = SocketType::from_u8(raw).ok_or(CodecError::InvalidDiscriminant {
            ty: "SocketType",
            value: raw as u32,
        })?;
        let has_value = r.read_bool()?;
        if !has_value {
            return Ok(DataValue::typeless(ty));
        }
        let value = match ty {
            SocketType::Bool => SocketValue::Bool(r.read_bool()?),
            SocketType::Float => SocketValue::Float(r.read_f32()?),
            SocketType::Int => SocketValue::Int(r.read_i32()?),
            SocketType::Enum => SocketValue::Enum(r.read_i32()?),
            SocketType::UInt => SocketValue::UInt(r.read_u32()?),
            SocketType::Color | SocketType::Vector | SocketType::Point | SocketType::Normal => {
                SocketValue::Vector(r.read_vec3()?)
            }
            SocketType::Point2 => SocketValue::Point2(r.read_vec2()?),
            SocketType::String => SocketValue::String(r.read_string()?),
            SocketType::Transform => SocketValue::Transform(math::read_affine(r)?),
            SocketType::FloatArray => SocketValue::FloatArray(r.read_f32_vec()?),
            SocketType::ColorArray => SocketValue::ColorArray(r.read_vec3_vec()?),
            SocketType::Closure | SocketType::Node | SocketType::Invalid => {
                return Err(CodecError::InvalidDiscriminant {
                    ty: "SocketType (value-carrying)",
                    value: raw as u32,
                })
            }
        };
        Ok(DataValue::new(ty, value))
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.as_deref() {
            None => write!(fmt, "{}[NULL]", self.ty),
            Some(SocketValue::Bool(v)) => write!(fmt, "{}[{}]", self.ty, v),
            Some(SocketValue::Float(v)) => write!(fmt, "{}[{}]", self.ty, v),
            Some(SocketValue::Int(v)) | Some(SocketValue::Enum(v)) => {
                write!(fmt, "{}[{}]", self.ty, v)
            }
            Some(SocketValue::UInt(v)) => write!(fmt, "{}[{}]", self.ty, v),
            Some(SocketValue::Vector(v)) => write!(fmt, "{}[{} {} {}]", self.ty, v.x, v.y, v.z),
            Some(SocketValue::Point2(v)) => write!(fmt, "{}[{} {}]", self.ty, v.x, v.y),
            Some(SocketValue::String(v)) => write!(fmt, "{}[{}]", self.ty, v),
            Some(SocketValue::Transform(_)) => write!(fmt, "{}[transform]", self.ty),
            Some(SocketValue::FloatArray(v)) => write!(fmt, "{}[{} floats]", self.ty, v.len()),
            Some(SocketValue::ColorArray(v)) => write!(fmt, "{}[{} colors]", self.ty, v.len()),
        }
    }
}

/// Casts `value` to `dst`. Returns `None` when the conversion table forbids
/// the cast. `src == dst` returns the value itself (same payload).
pub fn convert(value: &DataValue, dst: SocketType) -> Option<DataValue> {
    if value.ty == dst {
        return Some(value.clone());
    }
    if !is_convertible_to(value.ty, dst) {
        return None;
    }
    let payload = value.value.as_deref()?;
    let converted = match dst {
        SocketType::Bool => SocketValue::Bool(payload.as_f64()? != 0.0),
        SocketType::Float => SocketValue::Float(payload.as_f64()? as f32),
        SocketType::Int => SocketValue::Int(payload.as_f64()? as i32),
        SocketType::Enum => SocketValue::Enum(payload.as_f64()? as i32),
        SocketType::UInt => SocketValue::UInt(payload.as_f64()? as u32),
        SocketType::Color | SocketType::Vector | SocketType::Point | SocketType::Normal => {
            SocketValue::Vector(payload.as_vec3()?)
        }
        _ => return None,
    };
    Some(DataValue::new(dst, converted))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TYPES: [SocketType; SOCKET_TYPE_COUNT] = [
        SocketType::Bool,
        SocketType::Float,
        SocketType::Int,
        SocketType::UInt,
        SocketType::Color,
        SocketType::Vector,
        SocketType::Point,
        SocketType::Normal,
        SocketType::Point2,
        SocketType::Closure,
        SocketType::String,
        SocketType::Enum,
        SocketType::Transform,
        SocketType::Node,
        SocketType::FloatArray,
        SocketType::ColorArray,
    ];

    #[test]
    fn conversion_is_reflexive_for_value_types() {
        for ty in ALL_TYPES {
            if matches!(ty, SocketType::Closure | SocketType::Node) {
                continue;
            }
            assert!(is_convertible_to(ty, ty), "{ty} must convert to itself");
        }
    }

    #[test]
    fn identity_conversion_returns_same_payload() {
        let v = DataValue::float(2.5);
        let converted = convert(&v, SocketType::Float).unwrap();
        assert_eq!(v, converted);
    }

    #[test]
    fn numeric_and_vector_families() {
        assert!(is_convertible_to(SocketType::Float, SocketType::Int));
        assert!(is_convertible_to(SocketType::Bool, SocketType::Enum));
        assert!(is_convertible_to(SocketType::Color, SocketType::Normal));
        assert!(!is_convertible_to(SocketType::String, SocketType::Float));
        assert!(!is_convertible_to(SocketType::Float, SocketType::Color));
        assert!(!is_convertible_to(SocketType::Closure, SocketType::Closure));
    }

    #[test]
    fn numeric_cast_values() {
        let v = DataValue::float(3.7);
        assert_eq!(convert(&v, SocketType::Int).unwrap().to_int(), Some(3));
        let b = DataValue::bool(true);
        assert_eq!(convert(&b, SocketType::Float).unwrap().to_float(), Some(1.0));
    }

    #[test]
    fn identity_equality_distinguishes_equal_payloads() {
        let a = DataValue::float(1.0);
        let b = DataValue::float(1.0);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn serialization_round_trip() {
        let values = [
            DataValue::bool(true),
            DataValue::float(0.5),
            DataValue::int(-3),
            DataValue::uint(9),
            DataValue::color(Vec3::new(1.0, 0.5, 0.25)),
            DataValue::point2(Vec2::new(0.1, 0.9)),
            DataValue::string("albedo.png"),
            DataValue::enum_value(4),
            DataValue::float_array(vec![1.0, 2.0]),
            DataValue::color_array(vec![Vec3::ONE]),
            DataValue::typeless(SocketType::Closure),
        ];
        for v in values {
            let mut w = BlobWriter::new();
            v.serialize(&mut w);
            let blob = w.finish();
            let read = DataValue::deserialize(&mut BlobReader::new(&blob)).unwrap();
            assert_eq!(read.ty, v.ty);
            assert_eq!(read.value.as_deref(), v.value.as_deref());
        }
    }
}
