//! Registry of node types: name to factory, with the built-in catalog.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    math::{Affine3A, Vec3},
    node::{
        desc::{IntoPropertyValue, NodeDesc, NodeTypeId, SocketIo},
        nodes,
        value::{DataValue, SocketType, SocketValue},
    },
};

pub const NODE_MATH: &str = "math";
pub const NODE_HSV: &str = "hsv";
pub const NODE_SEPARATE_XYZ: &str = "separate_xyz";
pub const NODE_COMBINE_XYZ: &str = "combine_xyz";
pub const NODE_SEPARATE_RGB: &str = "separate_rgb";
pub const NODE_COMBINE_RGB: &str = "combine_rgb";
pub const NODE_GEOMETRY: &str = "geometry";
pub const NODE_CAMERA_INFO: &str = "camera_info";
pub const NODE_IMAGE_TEXTURE: &str = "image_texture";
pub const NODE_NORMAL_TEXTURE: &str = "normal_texture";
pub const NODE_ENVIRONMENT_TEXTURE: &str = "environment_texture";
pub const NODE_NOISE_TEXTURE: &str = "noise_texture";
pub const NODE_MIX_CLOSURE: &str = "mix_closure";
pub const NODE_ADD_CLOSURE: &str = "add_closure";
pub const NODE_BACKGROUND_SHADER: &str = "background_shader";
pub const NODE_TEXTURE_COORDINATE: &str = "texture_coordinate";
pub const NODE_UVMAP: &str = "uvmap";
pub const NODE_MAPPING: &str = "mapping";
pub const NODE_SCATTER_VOLUME: &str = "scatter_volume";
pub const NODE_EMISSION: &str = "emission";
pub const NODE_COLOR: &str = "color";
pub const NODE_ATTRIBUTE: &str = "attribute";
pub const NODE_LIGHT_PATH: &str = "light_path";
pub const NODE_TRANSPARENT_BSDF: &str = "transparent_bsdf";
pub const NODE_TRANSLUCENT_BSDF: &str = "translucent_bsdf";
pub const NODE_DIFFUSE_BSDF: &str = "diffuse_bsdf";
pub const NODE_NORMAL_MAP: &str = "normal_map";
pub const NODE_PRINCIPLED_BSDF: &str = "principled_bsdf";
pub const NODE_PRINCIPLED_VOLUME: &str = "principled_volume";
pub const NODE_TOON_BSDF: &str = "toon_bsdf";
pub const NODE_GLOSSY_BSDF: &str = "glossy_bsdf";
pub const NODE_GLASS_BSDF: &str = "glass_bsdf";
pub const NODE_VOLUME_CLEAR: &str = "volume_clear";
pub const NODE_VOLUME_HOMOGENEOUS: &str = "volume_homogeneous";
pub const NODE_VOLUME_HETEROGENEOUS: &str = "volume_heterogeneous";
pub const NODE_OUTPUT: &str = "output";
pub const NODE_VECTOR_MATH: &str = "vector_math";
pub const NODE_MIX: &str = "mix";
pub const NODE_RGB_TO_BW: &str = "rgb_to_bw";
pub const NODE_INVERT: &str = "invert";
pub const NODE_VECTOR_TRANSFORM: &str = "vector_transform";
pub const NODE_RGB_RAMP: &str = "rgb_ramp";
pub const NODE_LAYER_WEIGHT: &str = "layer_weight";
pub const NODE_AMBIENT_OCCLUSION: &str = "ambient_occlusion";

pub const NODE_COUNT: u32 = 44;

macro_rules! impl_property_enum {
    ($($ty:ty),* $(,)?) => {
        $(impl IntoPropertyValue for $ty {
            fn into_property_value(self) -> SocketValue {
                SocketValue::Enum(self as i32)
            }
        })*
    };
}

impl_property_enum!(
    nodes::math::MathType,
    nodes::vector_math::VectorMathType,
    nodes::mix::MixType,
    nodes::mapping::MappingType,
    nodes::normal_map::NormalMapSpace,
    nodes::image_texture::AlphaType,
    nodes::image_texture::InterpolationType,
    nodes::image_texture::ExtensionType,
    nodes::image_texture::Projection,
    nodes::vector_transform::VectorTransformType,
    nodes::vector_transform::ConvertSpace,
    nodes::EnvironmentProjection,
);

type NodeFactory = Box<dyn Fn(Option<&Arc<NodeDesc>>) -> Arc<NodeDesc> + Send + Sync>;

struct NodeType {
    type_name: String,
    factory: NodeFactory,
}

/// Name-indexed node type registry. Lookup is case-insensitive.
pub struct NodeManager {
    node_types: RwLock<Vec<NodeType>>,
}

impl std::fmt::Debug for NodeManager {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("NodeManager")
            .field("node_types", &self.node_types.read().len())
            .finish()
    }
}

impl NodeManager {
    /// Creates a manager with the built-in catalog registered.
    pub fn new() -> Arc<NodeManager> {
        let manager = Arc::new(NodeManager {
            node_types: RwLock::new(Vec::new()),
        });
        manager.register_default_types();
        manager
    }

    /// Registers (or replaces) a node type. Returns its stable id.
    pub fn register_node_type<F>(&self, type_name: &str, factory: F) -> NodeTypeId
    where
        F: Fn(Option<&Arc<NodeDesc>>) -> Arc<NodeDesc> + Send + Sync + 'static,
    {
        let lower = type_name.to_lowercase();
        let mut types = self.node_types.write();
        if let Some(pos) = types.iter().position(|t| t.type_name == lower) {
            types[pos].factory = Box::new(factory);
            return pos as NodeTypeId;
        }
        types.push(NodeType {
            type_name: lower,
            factory: Box::new(factory),
        });
        (types.len() - 1) as NodeTypeId
    }

    pub fn find_node_type_id(&self, type_name: &str) -> Option<NodeTypeId> {
        let lower = type_name.to_lowercase();
        self.node_types
            .read()
            .iter()
            .position(|t| t.type_name == lower)
            .map(|p| p as NodeTypeId)
    }

    pub fn node_type_count(&self) -> usize {
        self.node_types.read().len()
    }

    pub fn create_node(
        &self,
        type_name: &str,
        parent: Option<&Arc<NodeDesc>>,
    ) -> Option<Arc<NodeDesc>> {
        let id = self.find_node_type_id(type_name)?;
        self.create_node_by_id(id, parent)
    }

    pub fn create_node_by_id(
        &self,
        id: NodeTypeId,
        parent: Option<&Arc<NodeDesc>>,
    ) -> Option<Arc<NodeDesc>> {
        let types = self.node_types.read();
        let ty = types.get(id as usize)?;
        let node = (ty.factory)(parent);
        node.set_type_name(&ty.type_name);
        Some(node)
    }

    fn register_default_types(&self) {
        use crate::node::value::SocketType as T;

        fn prop(node: &Arc<NodeDesc>, name: &str, value: DataValue) {
            node.register_socket(name, value, SocketIo::empty());
        }
        fn input(node: &Arc<NodeDesc>, name: &str, value: DataValue) {
            node.register_socket(name, value, SocketIo::IN);
        }
        fn output(node: &Arc<NodeDesc>, name: &str, ty: SocketType) {
            node.register_socket(name, DataValue::typeless(ty), SocketIo::OUT);
        }

        self.register_node_type(NODE_MATH, |parent| {
            let n = NodeDesc::create(parent);
            prop(&n, nodes::math::IN_TYPE, DataValue::enum_value(0));
            prop(&n, nodes::math::IN_USE_CLAMP, DataValue::bool(false));
            input(&n, nodes::math::IN_VALUE1, DataValue::float(0.5));
            input(&n, nodes::math::IN_VALUE2, DataValue::float(0.5));
            input(&n, nodes::math::IN_VALUE3, DataValue::float(0.0));
            output(&n, nodes::math::OUT_VALUE, T::Float);
            n.register_primary_output(nodes::math::OUT_VALUE);
            n
        });
        self.register_node_type(NODE_HSV, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::hsv::IN_HUE, DataValue::float(0.5));
            input(&n, nodes::hsv::IN_SATURATION, DataValue::float(1.0));
            input(&n, nodes::hsv::IN_VALUE, DataValue::float(1.0));
            input(&n, nodes::hsv::IN_FAC, DataValue::float(1.0));
            input(&n, nodes::hsv::IN_COLOR, DataValue::color(Vec3::ZERO));
            output(&n, nodes::hsv::OUT_COLOR, T::Color);
            n.register_primary_output(nodes::hsv::OUT_COLOR);
            n
        });
        self.register_node_type(NODE_SEPARATE_XYZ, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::separate_xyz::IN_VECTOR, DataValue::color(Vec3::ZERO));
            output(&n, nodes::separate_xyz::OUT_X, T::Float);
            output(&n, nodes::separate_xyz::OUT_Y, T::Float);
            output(&n, nodes::separate_xyz::OUT_Z, T::Float);
            n
        });
        self.register_node_type(NODE_COMBINE_XYZ, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::combine_xyz::IN_X, DataValue::float(0.0));
            input(&n, nodes::combine_xyz::IN_Y, DataValue::float(0.0));
            input(&n, nodes::combine_xyz::IN_Z, DataValue::float(0.0));
            output(&n, nodes::combine_xyz::OUT_VECTOR, T::Vector);
            n.register_primary_output(nodes::combine_xyz::OUT_VECTOR);
            n
        });
        self.register_node_type(NODE_SEPARATE_RGB, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::separate_rgb::IN_COLOR, DataValue::color(Vec3::ZERO));
            output(&n, nodes::separate_rgb::OUT_R, T::Float);
            output(&n, nodes::separate_rgb::OUT_G, T::Float);
            output(&n, nodes::separate_rgb::OUT_B, T::Float);
            n
        });
        self.register_node_type(NODE_COMBINE_RGB, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::combine_rgb::IN_R, DataValue::float(0.0));
            input(&n, nodes::combine_rgb::IN_G, DataValue::float(0.0));
            input(&n, nodes::combine_rgb::IN_B, DataValue::float(0.0));
            output(&n, nodes::combine_rgb::OUT_IMAGE, T::Color);
            n.register_primary_output(nodes::combine_rgb::OUT_IMAGE);
            n
        });
        self.register_node_type(NODE_GEOMETRY, |parent| {
            let n = NodeDesc::create(parent);
            output(&n, nodes::geometry::OUT_POSITION, T::Point);
            output(&n, nodes::geometry::OUT_NORMAL, T::Normal);
            output(&n, nodes::geometry::OUT_TANGENT, T::Normal);
            output(&n, nodes::geometry::OUT_TRUE_NORMAL, T::Normal);
            output(&n, nodes::geometry::OUT_INCOMING, T::Vector);
            output(&n, nodes::geometry::OUT_PARAMETRIC, T::Point);
            output(&n, nodes::geometry::OUT_BACKFACING, T::Float);
            output(&n, nodes::geometry::OUT_POINTINESS, T::Float);
            output(&n, nodes::geometry::OUT_RANDOM_PER_ISLAND, T::Float);
            n.register_primary_output(nodes::geometry::OUT_POSITION);
            n
        });
        self.register_node_type(NODE_CAMERA_INFO, |parent| {
            let n = NodeDesc::create(parent);
            output(&n, nodes::camera_info::OUT_VIEW_VECTOR, T::Vector);
            output(&n, nodes::camera_info::OUT_VIEW_Z_DEPTH, T::Float);
            output(&n, nodes::camera_info::OUT_VIEW_DISTANCE, T::Float);
            n.register_primary_output(nodes::camera_info::OUT_VIEW_VECTOR);
            n
        });
        self.register_node_type(NODE_IMAGE_TEXTURE, |parent| {
            let n = NodeDesc::create(parent);
            prop(&n, nodes::image_texture::IN_FILENAME, DataValue::string(""));
            prop(
                &n,
                nodes::image_texture::IN_COLORSPACE,
                DataValue::string(nodes::COLORSPACE_AUTO),
            );
            prop(
                &n,
                nodes::image_texture::IN_ALPHA_TYPE,
                DataValue::enum_value(nodes::image_texture::AlphaType::Auto as i32),
            );
            prop(
                &n,
                nodes::image_texture::IN_INTERPOLATION,
                DataValue::enum_value(nodes::image_texture::InterpolationType::Linear as i32),
            );
            prop(
                &n,
                nodes::image_texture::IN_EXTENSION,
                DataValue::enum_value(nodes::image_texture::ExtensionType::Repeat as i32),
            );
            prop(
                &n,
                nodes::image_texture::IN_PROJECTION,
                DataValue::enum_value(nodes::image_texture::Projection::Flat as i32),
            );
            prop(
                &n,
                nodes::image_texture::IN_PROJECTION_BLEND,
                DataValue::float(0.0),
            );
            input(&n, nodes::image_texture::IN_VECTOR, DataValue::point(Vec3::ZERO));
            output(&n, nodes::image_texture::OUT_COLOR, T::Color);
            output(&n, nodes::image_texture::OUT_ALPHA, T::Float);
            n.register_primary_output(nodes::image_texture::OUT_COLOR);
            n
        });
        self.register_node_type(NODE_NORMAL_TEXTURE, |parent| {
            let n = NodeDesc::create(parent);
            prop(&n, nodes::normal_texture::IN_FILENAME, DataValue::string(""));
            prop(&n, nodes::normal_texture::IN_STRENGTH, DataValue::float(1.0));
            output(&n, nodes::normal_texture::OUT_NORMAL, T::Normal);
            n.register_primary_output(nodes::normal_texture::OUT_NORMAL);
            n
        });
        self.register_node_type(NODE_ENVIRONMENT_TEXTURE, |parent| {
            let n = NodeDesc::create(parent);
            prop(&n, nodes::environment_texture::IN_FILENAME, DataValue::string(""));
            prop(
                &n,
                nodes::environment_texture::IN_COLORSPACE,
                DataValue::string(nodes::COLORSPACE_AUTO),
            );
            prop(
                &n,
                nodes::environment_texture::IN_ALPHA_TYPE,
                DataValue::enum_value(nodes::image_texture::AlphaType::Auto as i32),
            );
            prop(
                &n,
                nodes::environment_texture::IN_INTERPOLATION,
                DataValue::enum_value(nodes::image_texture::InterpolationType::Linear as i32),
            );
            prop(
                &n,
                nodes::environment_texture::IN_PROJECTION,
                DataValue::enum_value(nodes::EnvironmentProjection::Equirectangular as i32),
            );
            input(
                &n,
                nodes::environment_texture::IN_VECTOR,
                DataValue::vector(Vec3::ZERO),
            );
            output(&n, nodes::environment_texture::OUT_COLOR, T::Color);
            output(&n, nodes::environment_texture::OUT_ALPHA, T::Float);
            n.register_primary_output(nodes::environment_texture::OUT_COLOR);
            n
        });
        self.register_node_type(NODE_NOISE_TEXTURE, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::noise_texture::IN_VECTOR, DataValue::vector(Vec3::ZERO));
            input(&n, nodes::noise_texture::IN_W, DataValue::float(0.0));
            input(&n, nodes::noise_texture::IN_SCALE, DataValue::float(1.0));
            input(&n, nodes::noise_texture::IN_DETAIL, DataValue::float(2.0));
            input(&n, nodes::noise_texture::IN_ROUGHNESS, DataValue::float(0.5));
            input(&n, nodes::noise_texture::IN_DISTORTION, DataValue::float(0.0));
            output(&n, nodes::noise_texture::OUT_FAC, T::Float);
            output(&n, nodes::noise_texture::OUT_COLOR, T::Color);
            n.register_primary_output(nodes::noise_texture::OUT_COLOR);
            n
        });
        self.register_node_type(NODE_MIX_CLOSURE, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::mix_closure::IN_FAC, DataValue::float(0.5));
            input(
                &n,
                nodes::mix_closure::IN_CLOSURE1,
                DataValue::typeless(T::Closure),
            );
            input(
                &n,
                nodes::mix_closure::IN_CLOSURE2,
                DataValue::typeless(T::Closure),
            );
            output(&n, nodes::mix_closure::OUT_CLOSURE, T::Closure);
            n.register_primary_output(nodes::mix_closure::OUT_CLOSURE);
            n
        });
        self.register_node_type(NODE_ADD_CLOSURE, |parent| {
            let n = NodeDesc::create(parent);
            input(
                &n,
                nodes::add_closure::IN_CLOSURE1,
                DataValue::typeless(T::Closure),
            );
            input(
                &n,
                nodes::add_closure::IN_CLOSURE2,
                DataValue::typeless(T::Closure),
            );
            output(&n, nodes::add_closure::OUT_CLOSURE, T::Closure);
            n.register_primary_output(nodes::add_closure::OUT_CLOSURE);
            n
        });
        self.register_node_type(NODE_BACKGROUND_SHADER, |parent| {
            let n = NodeDesc::create(parent);
            input(
                &n,
                nodes::background_shader::IN_COLOR,
                DataValue::color(Vec3::splat(0.8)),
            );
            input(&n, nodes::background_shader::IN_STRENGTH, DataValue::float(1.0));
            input(
                &n,
                nodes::background_shader::IN_SURFACE_MIX_WEIGHT,
                DataValue::float(0.0),
            );
            output(&n, nodes::background_shader::OUT_BACKGROUND, T::Closure);
            n.register_primary_output(nodes::background_shader::OUT_BACKGROUND);
            n
        });
        self.register_node_type(NODE_TEXTURE_COORDINATE, |parent| {
            let n = NodeDesc::create(parent);
            prop(
                &n,
                nodes::texture_coordinate::IN_FROM_DUPLI,
                DataValue::bool(false),
            );
            prop(
                &n,
                nodes::texture_coordinate::IN_USE_TRANSFORM,
                DataValue::bool(false),
            );
            prop(
                &n,
                nodes::texture_coordinate::IN_OB_TFM,
                DataValue::transform(Affine3A::IDENTITY),
            );
            output(&n, nodes::texture_coordinate::OUT_GENERATED, T::Point);
            output(&n, nodes::texture_coordinate::OUT_NORMAL, T::Normal);
            output(&n, nodes::texture_coordinate::OUT_UV, T::Point);
            output(&n, nodes::texture_coordinate::OUT_OBJECT, T::Point);
            output(&n, nodes::texture_coordinate::OUT_CAMERA, T::Point);
            output(&n, nodes::texture_coordinate::OUT_WINDOW, T::Point);
            output(&n, nodes::texture_coordinate::OUT_REFLECTION, T::Normal);
            n
        });
        self.register_node_type(NODE_UVMAP, |parent| {
            let n = NodeDesc::create(parent);
            output(&n, nodes::uvmap::OUT_UV, T::Point);
            n
        });
        self.register_node_type(NODE_MAPPING, |parent| {
            let n = NodeDesc::create(parent);
            prop(
                &n,
                nodes::mapping::IN_TYPE,
                DataValue::enum_value(nodes::mapping::MappingType::Point as i32),
            );
            input(&n, nodes::mapping::IN_VECTOR, DataValue::point(Vec3::ZERO));
            input(&n, nodes::mapping::IN_LOCATION, DataValue::point(Vec3::ZERO));
            input(&n, nodes::mapping::IN_ROTATION, DataValue::point(Vec3::ZERO));
            input(&n, nodes::mapping::IN_SCALE, DataValue::point(Vec3::ONE));
            output(&n, nodes::mapping::OUT_VECTOR, T::Vector);
            n.register_primary_output(nodes::mapping::OUT_VECTOR);
            n
        });
        self.register_node_type(NODE_SCATTER_VOLUME, |parent| {
            let n = NodeDesc::create(parent);
            input(
                &n,
                nodes::scatter_volume::IN_COLOR,
                DataValue::color(Vec3::splat(0.8)),
            );
            input(&n, nodes::scatter_volume::IN_DENSITY, DataValue::float(1.0));
            input(&n, nodes::scatter_volume::IN_ANISOTROPY, DataValue::float(0.0));
            input(
                &n,
                nodes::scatter_volume::IN_VOLUME_MIX_WEIGHT,
                DataValue::float(0.0),
            );
            output(&n, nodes::scatter_volume::OUT_VOLUME, T::Closure);
            n.register_primary_output(nodes::scatter_volume::OUT_VOLUME);
            n
        });
        self.register_node_type(NODE_EMISSION, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::emission::IN_COLOR, DataValue::color(Vec3::splat(0.8)));
            // Cycles defaults to 10, which is excessive for our purposes.
            input(&n, nodes::emission::IN_STRENGTH, DataValue::float(1.0));
            input(
                &n,
                nodes::emission::IN_SURFACE_MIX_WEIGHT,
                DataValue::float(0.0),
            );
            output(&n, nodes::emission::OUT_EMISSION, T::Closure);
            n.register_primary_output(nodes::emission::OUT_EMISSION);
            n
        });
        self.register_node_type(NODE_COLOR, |parent| {
            let n = NodeDesc::create(parent);
            prop(&n, nodes::color::IN_VALUE, DataValue::color(Vec3::ZERO));
            output(&n, nodes::color::OUT_COLOR, T::Color);
            n.register_primary_output(nodes::color::OUT_COLOR);
            n
        });
        self.register_node_type(NODE_ATTRIBUTE, |parent| {
            let n = NodeDesc::create(parent);
            prop(&n, nodes::attribute::IN_ATTRIBUTE, DataValue::string(""));
            output(&n, nodes::attribute::OUT_COLOR, T::Color);
            output(&n, nodes::attribute::OUT_VECTOR, T::Vector);
            output(&n, nodes::attribute::OUT_FAC, T::Float);
            n.register_primary_output(nodes::attribute::OUT_COLOR);
            n
        });
        self.register_node_type(NODE_LIGHT_PATH, |parent| {
            let n = NodeDesc::create(parent);
            output(&n, nodes::light_path::OUT_IS_CAMERA_RAY, T::Float);
            output(&n, nodes::light_path::OUT_IS_SHADOW_RAY, T::Float);
            output(&n, nodes::light_path::OUT_IS_DIFFUSE_RAY, T::Float);
            output(&n, nodes::light_path::OUT_IS_GLOSSY_RAY, T::Float);
            output(&n, nodes::light_path::OUT_IS_SINGULAR_RAY, T::Float);
            output(&n, nodes::light_path::OUT_IS_REFLECTION_RAY, T::Float);
            output(&n, nodes::light_path::OUT_IS_TRANSMISSION_RAY, T::Float);
            output(&n, nodes::light_path::OUT_IS_VOLUME_SCATTER_RAY, T::Float);
            output(&n, nodes::light_path::OUT_RAY_LENGTH, T::Float);
            output(&n, nodes::light_path::OUT_RAY_DEPTH, T::Float);
            output(&n, nodes::light_path::OUT_DIFFUSE_DEPTH, T::Float);
            output(&n, nodes::light_path::OUT_GLOSSY_DEPTH, T::Float);
            output(&n, nodes::light_path::OUT_TRANSPARENT_DEPTH, T::Float);
            output(&n, nodes::light_path::OUT_TRANSMISSION_DEPTH, T::Float);
            n
        });
        self.register_node_type(NODE_TRANSPARENT_BSDF, |parent| {
            let n = NodeDesc::create(parent);
            input(
                &n,
                nodes::transparent_bsdf::IN_COLOR,
                DataValue::color(Vec3::ONE),
            );
            input(
                &n,
                nodes::transparent_bsdf::IN_SURFACE_MIX_WEIGHT,
                DataValue::float(0.0),
            );
            output(&n, nodes::transparent_bsdf::OUT_BSDF, T::Closure);
            n.register_primary_output(nodes::transparent_bsdf::OUT_BSDF);
            n
        });
        self.register_node_type(NODE_TRANSLUCENT_BSDF, |parent| {
            let n = NodeDesc::create(parent);
            input(
                &n,
                nodes::translucent_bsdf::IN_COLOR,
                DataValue::color(Vec3::splat(0.8)),
            );
            input(
                &n,
                nodes::translucent_bsdf::IN_NORMAL,
                DataValue::normal(Vec3::ZERO),
            );
            input(
                &n,
                nodes::translucent_bsdf::IN_SURFACE_MIX_WEIGHT,
                DataValue::float(0.0),
            );
            output(&n, nodes::translucent_bsdf::OUT_BSDF, T::Closure);
            n.register_primary_output(nodes::translucent_bsdf::OUT_BSDF);
            n
        });
        self.register_node_type(NODE_DIFFUSE_BSDF, |parent| {
            let n = NodeDesc::create(parent);
            input(
                &n,
                nodes::diffuse_bsdf::IN_COLOR,
                DataValue::color(Vec3::splat(0.8)),
            );
            input(&n, nodes::diffuse_bsdf::IN_NORMAL, DataValue::normal(Vec3::ZERO));
            input(
                &n,
                nodes::diffuse_bsdf::IN_SURFACE_MIX_WEIGHT,
                DataValue::float(0.0),
            );
            input(&n, nodes::diffuse_bsdf::IN_ROUGHNESS, DataValue::float(0.0));
            output(&n, nodes::diffuse_bsdf::OUT_BSDF, T::Closure);
            n.register_primary_output(nodes::diffuse_bsdf::OUT_BSDF);
            n
        });
        self.register_node_type(NODE_NORMAL_MAP, |parent| {
            let n = NodeDesc::create(parent);
            prop(
                &n,
                nodes::normal_map::IN_SPACE,
                DataValue::enum_value(nodes::normal_map::NormalMapSpace::Tangent as i32),
            );
            prop(&n, nodes::normal_map::IN_ATTRIBUTE, DataValue::string(""));
            input(&n, nodes::normal_map::IN_STRENGTH, DataValue::float(1.0));
            input(
                &n,
                nodes::normal_map::IN_COLOR,
                DataValue::color(Vec3::new(0.5, 0.5, 1.0)),
            );
            output(&n, nodes::normal_map::OUT_NORMAL, T::Normal);
            n.register_primary_output(nodes::normal_map::OUT_NORMAL);
            n
        });
        self.register_node_type(NODE_PRINCIPLED_BSDF, |parent| {
            let n = NodeDesc::create(parent);

            // SVM closure ids; see the backend kernel's type listing.
            const CLOSURE_BSDF_MICROFACET_MULTI_GGX_GLASS_ID: i32 = 30;
            const CLOSURE_BSSRDF_PRINCIPLED_ID: i32 = 42;

            prop(
                &n,
                nodes::principled_bsdf::IN_DISTRIBUTION,
                DataValue::enum_value(CLOSURE_BSDF_MICROFACET_MULTI_GGX_GLASS_ID),
            );
            prop(
                &n,
                nodes::principled_bsdf::IN_SUBSURFACE_METHOD,
                DataValue::enum_value(CLOSURE_BSSRDF_PRINCIPLED_ID),
            );
            input(
                &n,
                nodes::principled_bsdf::IN_BASE_COLOR,
                DataValue::color(Vec3::splat(0.8)),
            );
            input(
                &n,
                nodes::principled_bsdf::IN_SUBSURFACE_COLOR,
                DataValue::color(Vec3::splat(0.8)),
            );
            input(&n, nodes::principled_bsdf::IN_METALLIC, DataValue::float(0.0));
            input(&n, nodes::principled_bsdf::IN_SUBSURFACE, DataValue::float(0.0));
            input(
                &n,
                nodes::principled_bsdf::IN_SUBSURFACE_RADIUS,
                DataValue::vector(Vec3::splat(0.1)),
            );
            input(&n, nodes::principled_bsdf::IN_SPECULAR, DataValue::float(0.0));
            input(&n, nodes::principled_bsdf::IN_ROUGHNESS, DataValue::float(0.5));
            input(
                &n,
                nodes::principled_bsdf::IN_SPECULAR_TINT,
                DataValue::float(0.0),
            );
            input(
                &n,
                nodes::principled_bsdf::IN_ANISOTROPIC,
                DataValue::float(0.0),
            );
            input(&n, nodes::principled_bsdf::IN_SHEEN, DataValue::float(0.0));
            input(&n, nodes::principled_bsdf::IN_SHEEN_TINT, DataValue::float(0.0));
            input(&n, nodes::principled_bsdf::IN_CLEARCOAT, DataValue::float(0.0));
            input(
                &n,
                nodes::principled_bsdf::IN_CLEARCOAT_ROUGHNESS,
                DataValue::float(0.03),
            );
            input(&n, nodes::principled_bsdf::IN_IOR, DataValue::float(0.0));
            input(
                &n,
                nodes::principled_bsdf::IN_TRANSMISSION,
                DataValue::float(0.0),
            );
            input(
                &n,
                nodes::principled_bsdf::IN_TRANSMISSION_ROUGHNESS,
                DataValue::float(0.0),
            );
            input(
                &n,
                nodes::principled_bsdf::IN_ANISOTROPIC_ROTATION,
                DataValue::float(0.0),
            );
            input(
                &n,
                nodes::principled_bsdf::IN_EMISSION,
                DataValue::color(Vec3::ZERO),
            );
            input(&n, nodes::principled_bsdf::IN_ALPHA, DataValue::float(1.0));
            input(
                &n,
                nodes::principled_bsdf::IN_NORMAL,
                DataValue::normal(Vec3::ZERO),
            );
            input(
                &n,
                nodes::principled_bsdf::IN_CLEARCOAT_NORMAL,
                DataValue::normal(Vec3::ZERO),
            );
            input(
                &n,
                nodes::principled_bsdf::IN_TANGENT,
                DataValue::normal(Vec3::ZERO),
            );
            input(
                &n,
                nodes::principled_bsdf::IN_SURFACE_MIX_WEIGHT,
                DataValue::float(0.0),
            );
            output(&n, nodes::principled_bsdf::OUT_BSDF, T::Closure);
            n.register_primary_output(nodes::principled_bsdf::OUT_BSDF);
            n
        });
        self.register_node_type(NODE_PRINCIPLED_VOLUME, |parent| {
            let n = NodeDesc::create(parent);
            input(
                &n,
                nodes::principled_volume::IN_COLOR,
                DataValue::color(Vec3::splat(0.5)),
            );
            input(&n, nodes::principled_volume::IN_DENSITY, DataValue::float(1.0));
            input(
                &n,
                nodes::principled_volume::IN_ANISOTROPY,
                DataValue::float(0.0),
            );
            input(
                &n,
                nodes::principled_volume::IN_ABSORPTION_COLOR,
                DataValue::color(Vec3::ZERO),
            );
            input(
                &n,
                nodes::principled_volume::IN_EMISSION_STRENGTH,
                DataValue::float(0.0),
            );
            input(
                &n,
                nodes::principled_volume::IN_EMISSION_COLOR,
                DataValue::color(Vec3::ZERO),
            );
            input(
                &n,
                nodes::principled_volume::IN_BLACKBODY_INTENSITY,
                DataValue::float(0.0),
            );
            input(
                &n,
                nodes::principled_volume::IN_BLACKBODY_TINT,
                DataValue::color(Vec3::ZERO),
            );
            input(
                &n,
                nodes::principled_volume::IN_TEMPERATURE,
                DataValue::float(1000.0),
            );
            input(
                &n,
                nodes::principled_volume::IN_VOLUME_MIX_WEIGHT,
                DataValue::float(0.0),
            );
            output(&n, nodes::principled_volume::OUT_VOLUME, T::Closure);
            n.register_primary_output(nodes::principled_volume::OUT_VOLUME);
            n
        });
        self.register_node_type(NODE_TOON_BSDF, |parent| {
            let n = NodeDesc::create(parent);

            const CLOSURE_BSDF_DIFFUSE_TOON_ID: i32 = 7;

            prop(
                &n,
                nodes::toon_bsdf::IN_COMPONENT,
                DataValue::enum_value(CLOSURE_BSDF_DIFFUSE_TOON_ID),
            );
            input(&n, nodes::toon_bsdf::IN_COLOR, DataValue::color(Vec3::splat(0.8)));
            input(&n, nodes::toon_bsdf::IN_NORMAL, DataValue::normal(Vec3::ZERO));
            input(
                &n,
                nodes::toon_bsdf::IN_SURFACE_MIX_WEIGHT,
                DataValue::float(0.0),
            );
            input(&n, nodes::toon_bsdf::IN_SIZE, DataValue::float(0.5));
            input(&n, nodes::toon_bsdf::IN_SMOOTH, DataValue::float(0.0));
            output(&n, nodes::toon_bsdf::OUT_BSDF, T::Closure);
            n.register_primary_output(nodes::toon_bsdf::OUT_BSDF);
            n
        });
        self.register_node_type(NODE_GLOSSY_BSDF, |parent| {
            let n = NodeDesc::create(parent);

            const CLOSURE_BSDF_MICROFACET_GGX_ID: i32 = 9;

            input(
                &n,
                nodes::glossy_bsdf::IN_COLOR,
                DataValue::color(Vec3::splat(0.8)),
            );
            input(&n, nodes::glossy_bsdf::IN_ALPHA, DataValue::float(1.0));
            input(&n, nodes::glossy_bsdf::IN_NORMAL, DataValue::normal(Vec3::ZERO));
            input(
                &n,
                nodes::glossy_bsdf::IN_SURFACE_MIX_WEIGHT,
                DataValue::float(0.0),
            );
            prop(
                &n,
                nodes::glossy_bsdf::IN_DISTRIBUTION,
                DataValue::enum_value(CLOSURE_BSDF_MICROFACET_GGX_ID),
            );
            input(&n, nodes::glossy_bsdf::IN_ROUGHNESS, DataValue::float(0.5));
            output(&n, nodes::glossy_bsdf::OUT_BSDF, T::Closure);
            n.register_primary_output(nodes::glossy_bsdf::OUT_BSDF);
            n
        });
        self.register_node_type(NODE_GLASS_BSDF, |parent| {
            let n = NodeDesc::create(parent);

            const CLOSURE_BSDF_MICROFACET_GGX_GLASS_ID: i32 = 32;

            prop(
                &n,
                nodes::glass_bsdf::IN_DISTRIBUTION,
                DataValue::enum_value(CLOSURE_BSDF_MICROFACET_GGX_GLASS_ID),
            );
            input(&n, nodes::glass_bsdf::IN_COLOR, DataValue::color(Vec3::splat(0.8)));
            input(&n, nodes::glass_bsdf::IN_NORMAL, DataValue::normal(Vec3::ZERO));
            input(
                &n,
                nodes::glass_bsdf::IN_SURFACE_MIX_WEIGHT,
                DataValue::float(0.0),
            );
            input(&n, nodes::glass_bsdf::IN_ROUGHNESS, DataValue::float(0.0));
            input(&n, nodes::glass_bsdf::IN_IOR, DataValue::float(0.3));
            output(&n, nodes::glass_bsdf::OUT_BSDF, T::Closure);
            n.register_primary_output(nodes::glass_bsdf::OUT_BSDF);
            n
        });
        self.register_node_type(NODE_VOLUME_CLEAR, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::volume_clear::IN_PRIORITY, DataValue::int(0));
            input(
                &n,
                nodes::volume_clear::IN_IOR,
                DataValue::vector(Vec3::splat(0.3)),
            );
            input(
                &n,
                nodes::volume_clear::IN_ABSORPTION,
                DataValue::vector(Vec3::ZERO),
            );
            input(&n, nodes::volume_clear::IN_EMISSION, DataValue::vector(Vec3::ZERO));
            prop(
                &n,
                nodes::volume_clear::IN_DEFAULT_WORLD_VOLUME,
                DataValue::bool(false),
            );
            output(&n, nodes::volume_clear::OUT_VOLUME, T::Closure);
            n.register_primary_output(nodes::volume_clear::OUT_VOLUME);
            n
        });
        self.register_node_type(NODE_VOLUME_HOMOGENEOUS, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::volume_homogeneous::IN_PRIORITY, DataValue::int(0));
            input(
                &n,
                nodes::volume_homogeneous::IN_IOR,
                DataValue::vector(Vec3::splat(0.3)),
            );
            input(
                &n,
                nodes::volume_homogeneous::IN_ABSORPTION,
                DataValue::vector(Vec3::ZERO),
            );
            input(
                &n,
                nodes::volume_homogeneous::IN_EMISSION,
                DataValue::vector(Vec3::ZERO),
            );
            input(
                &n,
                nodes::volume_homogeneous::IN_SCATTERING,
                DataValue::vector(Vec3::ZERO),
            );
            input(
                &n,
                nodes::volume_homogeneous::IN_ASYMMETRY,
                DataValue::vector(Vec3::ZERO),
            );
            input(
                &n,
                nodes::volume_homogeneous::IN_MULTI_SCATTERING,
                DataValue::bool(false),
            );
            input(
                &n,
                nodes::volume_homogeneous::IN_ABSORPTION_DEPTH,
                DataValue::float(0.01),
            );
            prop(
                &n,
                nodes::volume_homogeneous::IN_DEFAULT_WORLD_VOLUME,
                DataValue::bool(false),
            );
            output(&n, nodes::volume_homogeneous::OUT_VOLUME, T::Closure);
            n.register_primary_output(nodes::volume_homogeneous::OUT_VOLUME);
            n
        });
        self.register_node_type(NODE_VOLUME_HETEROGENEOUS, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::volume_heterogeneous::IN_PRIORITY, DataValue::int(0));
            input(
                &n,
                nodes::volume_heterogeneous::IN_IOR,
                DataValue::vector(Vec3::splat(0.3)),
            );
            input(
                &n,
                nodes::volume_heterogeneous::IN_ABSORPTION,
                DataValue::vector(Vec3::ZERO),
            );
            input(
                &n,
                nodes::volume_heterogeneous::IN_EMISSION,
                DataValue::vector(Vec3::ZERO),
            );
            input(
                &n,
                nodes::volume_heterogeneous::IN_SCATTERING,
                DataValue::vector(Vec3::ZERO),
            );
            input(
                &n,
                nodes::volume_heterogeneous::IN_ASYMMETRY,
                DataValue::vector(Vec3::ZERO),
            );
            input(
                &n,
                nodes::volume_heterogeneous::IN_MULTI_SCATTERING,
                DataValue::bool(false),
            );
            input(
                &n,
                nodes::volume_heterogeneous::IN_STEP_SIZE,
                DataValue::float(0.0),
            );
            input(
                &n,
                nodes::volume_heterogeneous::IN_STEP_MAX_COUNT,
                DataValue::int(0),
            );
            prop(
                &n,
                nodes::volume_heterogeneous::IN_DEFAULT_WORLD_VOLUME,
                DataValue::bool(false),
            );
            output(&n, nodes::volume_heterogeneous::OUT_VOLUME, T::Closure);
            n.register_primary_output(nodes::volume_heterogeneous::OUT_VOLUME);
            n
        });
        self.register_node_type(NODE_OUTPUT, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::output::IN_SURFACE, DataValue::typeless(T::Closure));
            input(&n, nodes::output::IN_VOLUME, DataValue::typeless(T::Closure));
            input(
                &n,
                nodes::output::IN_DISPLACEMENT,
                DataValue::vector(Vec3::ZERO),
            );
            input(&n, nodes::output::IN_NORMAL, DataValue::normal(Vec3::ZERO));
            n
        });
        self.register_node_type(NODE_VECTOR_MATH, |parent| {
            let n = NodeDesc::create(parent);
            prop(
                &n,
                nodes::vector_math::IN_TYPE,
                DataValue::enum_value(nodes::vector_math::VectorMathType::Add as i32),
            );
            input(
                &n,
                nodes::vector_math::IN_VECTOR1,
                DataValue::vector(Vec3::ZERO),
            );
            input(
                &n,
                nodes::vector_math::IN_VECTOR2,
                DataValue::vector(Vec3::ZERO),
            );
            input(&n, nodes::vector_math::IN_SCALE, DataValue::float(1.0));
            output(&n, nodes::vector_math::OUT_VALUE, T::Float);
            output(&n, nodes::vector_math::OUT_VECTOR, T::Vector);
            n.register_primary_output(nodes::vector_math::OUT_VECTOR);
            n
        });
        self.register_node_type(NODE_MIX, |parent| {
            let n = NodeDesc::create(parent);
            prop(
                &n,
                nodes::mix::IN_TYPE,
                DataValue::enum_value(nodes::mix::MixType::Blend as i32),
            );
            prop(&n, nodes::mix::IN_USE_CLAMP, DataValue::bool(false));
            input(&n, nodes::mix::IN_FAC, DataValue::float(0.5));
            input(&n, nodes::mix::IN_COLOR1, DataValue::color(Vec3::ZERO));
            input(&n, nodes::mix::IN_COLOR2, DataValue::color(Vec3::ZERO));
            output(&n, nodes::mix::OUT_COLOR, T::Color);
            n.register_primary_output(nodes::mix::OUT_COLOR);
            n
        });
        self.register_node_type(NODE_RGB_TO_BW, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::rgb_to_bw::IN_COLOR, DataValue::color(Vec3::ZERO));
            output(&n, nodes::rgb_to_bw::OUT_VAL, T::Float);
            n.register_primary_output(nodes::rgb_to_bw::OUT_VAL);
            n
        });
        self.register_node_type(NODE_INVERT, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::invert::IN_COLOR, DataValue::color(Vec3::ZERO));
            input(&n, nodes::invert::IN_FAC, DataValue::float(1.0));
            output(&n, nodes::invert::OUT_COLOR, T::Float);
            n.register_primary_output(nodes::invert::OUT_COLOR);
            n
        });
        self.register_node_type(NODE_VECTOR_TRANSFORM, |parent| {
            let n = NodeDesc::create(parent);
            prop(
                &n,
                nodes::vector_transform::IN_TYPE,
                DataValue::enum_value(nodes::vector_transform::VectorTransformType::Vector as i32),
            );
            prop(
                &n,
                nodes::vector_transform::IN_CONVERT_FROM,
                DataValue::enum_value(nodes::vector_transform::ConvertSpace::World as i32),
            );
            prop(
                &n,
                nodes::vector_transform::IN_CONVERT_TO,
                DataValue::enum_value(nodes::vector_transform::ConvertSpace::Object as i32),
            );
            input(
                &n,
                nodes::vector_transform::IN_VECTOR,
                DataValue::vector(Vec3::ZERO),
            );
            output(&n, nodes::vector_transform::OUT_VECTOR, T::Vector);
            n.register_primary_output(nodes::vector_transform::OUT_VECTOR);
            n
        });
        self.register_node_type(NODE_RGB_RAMP, |parent| {
            let n = NodeDesc::create(parent);
            prop(&n, nodes::rgb_ramp::IN_RAMP, DataValue::color_array(Vec::new()));
            prop(
                &n,
                nodes::rgb_ramp::IN_RAMP_ALPHA,
                DataValue::float_array(Vec::new()),
            );
            prop(&n, nodes::rgb_ramp::IN_INTERPOLATE, DataValue::bool(true));
            input(&n, nodes::rgb_ramp::IN_FAC, DataValue::float(0.0));
            output(&n, nodes::rgb_ramp::OUT_COLOR, T::Color);
            output(&n, nodes::rgb_ramp::OUT_ALPHA, T::Float);
            n.register_primary_output(nodes::rgb_ramp::OUT_COLOR);
            n
        });
        self.register_node_type(NODE_LAYER_WEIGHT, |parent| {
            let n = NodeDesc::create(parent);
            input(&n, nodes::layer_weight::IN_NORMAL, DataValue::normal(Vec3::ZERO));
            input(&n, nodes::layer_weight::IN_BLEND, DataValue::float(0.5));
            output(&n, nodes::layer_weight::OUT_FRESNEL, T::Float);
            output(&n, nodes::layer_weight::OUT_FACING, T::Float);
            n.register_primary_output(nodes::layer_weight::OUT_FRESNEL);
            n
        });
        self.register_node_type(NODE_AMBIENT_OCCLUSION, |parent| {
            let n = NodeDesc::create(parent);
            prop(&n, nodes::ambient_occlusion::IN_SAMPLES, DataValue::int(16));
            input(
                &n,
                nodes::ambient_occlusion::IN_COLOR,
                DataValue::color(Vec3::ZERO),
            );
            input(
                &n,
                nodes::ambient_occlusion::IN_DISTANCE,
                DataValue::float(1.0),
            );
            input(
                &n,
                nodes::ambient_occlusion::IN_NORMAL,
                DataValue::normal(Vec3::ZERO),
            );
            prop(&n, nodes::ambient_occlusion::IN_INSIDE, DataValue::bool(false));
            prop(
                &n,
                nodes::ambient_occlusion::IN_ONLY_LOCAL,
                DataValue::bool(false),
            );
            output(&n, nodes::ambient_occlusion::OUT_COLOR, T::Color);
            output(&n, nodes::ambient_occlusion::OUT_AO, T::Float);
            n.register_primary_output(nodes::ambient_occlusion::OUT_AO);
            n
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_is_complete() {
        let manager = NodeManager::new();
        assert_eq!(manager.node_type_count(), NODE_COUNT as usize);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let manager = NodeManager::new();
        assert_eq!(
            manager.find_node_type_id("Principled_BSDF"),
            manager.find_node_type_id(NODE_PRINCIPLED_BSDF)
        );
    }

    #[test]
    fn created_nodes_are_populated() {
        let manager = NodeManager::new();
        let node = manager.create_node(NODE_MATH, None).unwrap();
        assert_eq!(node.type_name(), NODE_MATH);
        assert!(node.find_input_socket(nodes::math::IN_VALUE1).is_some());
        assert!(node.find_property(nodes::math::IN_TYPE).is_some());
        assert!(node.find_output_socket(nodes::math::OUT_VALUE).is_some());
        assert!(node.primary_output_socket().is_ok());
        assert_eq!(
            node.find_input_socket_desc(nodes::math::IN_VALUE1)
                .unwrap()
                .data_value
                .to_float(),
            Some(0.5)
        );
    }

    #[test]
    fn registering_same_name_replaces() {
        let manager = NodeManager::new();
        let before = manager.node_type_count();
        let id0 = manager.find_node_type_id(NODE_MATH).unwrap();
        let id1 = manager.register_node_type(NODE_MATH, |parent| NodeDesc::create(parent));
        assert_eq!(id0, id1);
        assert_eq!(manager.node_type_count(), before);
    }

    #[test]
    fn unknown_type_yields_none() {
        let manager = NodeManager::new();
        assert!(manager.create_node("no_such_node", None).is_none());
    }
}
