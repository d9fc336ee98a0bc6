//! Socket-name constants and per-node enums for the built-in node catalog.
//!
//! Names follow the SVM-style conventions backends expect; changing them
//! breaks serialized graphs.

/// Automatic color space selection.
pub const COLORSPACE_AUTO: &str = "";
/// Raw (non-color) data. Matches the backend's builtin raw space name.
pub const COLORSPACE_RAW: &str = "__builtin_raw";
/// sRGB color data. Matches the backend's builtin sRGB space name.
pub const COLORSPACE_SRGB: &str = "__builtin_srgb";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ColorSpace {
    Srgb = 0,
    Raw,
    Auto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EnvironmentProjection {
    Equirectangular = 0,
    MirrorBall,
}

/// How an image texture node should be preconfigured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TextureType {
    EquirectangularImage,
    ColorImage,
    NonColorImage,
    NormalMap,
}

pub mod math {
    pub const IN_TYPE: &str = "type";
    pub const IN_USE_CLAMP: &str = "use_clamp";
    pub const IN_VALUE1: &str = "value1";
    pub const IN_VALUE2: &str = "value2";
    pub const IN_VALUE3: &str = "value3";

    pub const OUT_VALUE: &str = "value";

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(u32)]
    pub enum MathType {
        Add = 0,
        Subtract,
        Multiply,
        Divide,
        Sine,
        Cosine,
        Tangent,
        ArcSine,
        ArcCosine,
        ArcTangent,
        Power,
        Logarithm,
        Minimum,
        Maximum,
        Round,
        LessThan,
        GreaterThan,
        Modulo,
        Absolute,
        ArcTan2,
        Floor,
        Ceil,
        Fraction,
        Sqrt,
        InvSqrt,
        Sign,
        Exponent,
        Radians,
        Degrees,
        SinH,
        CosH,
        TanH,
        Trunc,
        Snap,
        Wrap,
        Compare,
        MultiplyAdd,
        PingPong,
        SmoothMin,
        SmoothMax,
    }
}

pub mod vector_math {
    pub const IN_TYPE: &str = "type";
    pub const IN_VECTOR1: &str = "vector1";
    pub const IN_VECTOR2: &str = "vector2";
    pub const IN_SCALE: &str = "scale";

    pub const OUT_VALUE: &str = "value";
    pub const OUT_VECTOR: &str = "vector";

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(u32)]
    pub enum VectorMathType {
        Add = 0,
        Subtract,
        Multiply,
        Divide,

        CrossProduct,
        Project,
        Reflect,
        DotProduct,

        Distance,
        Length,
        Scale,
        Normalize,

        Snap,
        Floor,
        Ceil,
        Modulo,
        Fraction,
        Absolute,
        Minimum,
        Maximum,
    }
}

pub mod hsv {
    pub const IN_HUE: &str = "hue";
    pub const IN_SATURATION: &str = "saturation";
    pub const IN_VALUE: &str = "value";
    pub const IN_FAC: &str = "fac";
    pub const IN_COLOR: &str = "color";

    pub const OUT_COLOR: &str = "color";
}

pub mod separate_xyz {
    pub const IN_VECTOR: &str = "vector";

    pub const OUT_X: &str = "x";
    pub const OUT_Y: &str = "y";
    pub const OUT_Z: &str = "z";
}

pub mod combine_xyz {
    pub const IN_X: &str = "x";
    pub const IN_Y: &str = "Y";
    pub const IN_Z: &str = "Z";

    pub const OUT_VECTOR: &str = "vector";
}

pub mod separate_rgb {
    pub const IN_COLOR: &str = "color";

    pub const OUT_R: &str = "r";
    pub const OUT_G: &str = "g";
    pub const OUT_B: &str = "b";
}

pub mod combine_rgb {
    pub const IN_R: &str = "r";
    pub const IN_G: &str = "g";
    pub const IN_B: &str = "b";

    pub const OUT_IMAGE: &str = "image";
}

pub mod geometry {
    pub const OUT_POSITION: &str = "position";
    pub const OUT_NORMAL: &str = "normal";
    pub const OUT_TANGENT: &str = "tangent";
    pub const OUT_TRUE_NORMAL: &str = "true_normal";
    pub const OUT_INCOMING: &str = "incoming";
    pub const OUT_PARAMETRIC: &str = "parametric";
    pub const OUT_BACKFACING: &str = "backfacing";
    pub const OUT_POINTINESS: &str = "pointiness";
    pub const OUT_RANDOM_PER_ISLAND: &str = "random_per_island";
}

pub mod camera_info {
    pub const OUT_VIEW_VECTOR: &str = "view_vector";
    pub const OUT_VIEW_Z_DEPTH: &str = "view_z_depth";
    pub const OUT_VIEW_DISTANCE: &str = "view_distance";
}

pub mod image_texture {
    pub const IN_FILENAME: &str = "filename";
    pub const IN_COLORSPACE: &str = "colorspace";
    pub const IN_ALPHA_TYPE: &str = "alpha_type";
    pub const IN_INTERPOLATION: &str = "interpolation";
    pub const IN_EXTENSION: &str = "extension";
    pub const IN_PROJECTION: &str = "projection";
    pub const IN_PROJECTION_BLEND: &str = "projection_blend";
    pub const IN_VECTOR: &str = "vector";

    pub const OUT_COLOR: &str = "color";
    pub const OUT_ALPHA: &str = "alpha";

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(u32)]
    pub enum AlphaType {
        Unassociated = 0,
        Associated,
        ChannelPacked,
        Ignore,
        Auto,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(u32)]
    pub enum InterpolationType {
        Linear = 0,
        Closest,
        Cubic,
        Smart,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(u32)]
    pub enum ExtensionType {
        Repeat = 0,
        Extend,
        Clip,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(u32)]
    pub enum Projection {
        Flat = 0,
        Box,
        Sphere,
        Tube,
    }
}

pub mod normal_texture {
    pub const IN_FILENAME: &str = "filename";
    pub const IN_STRENGTH: &str = "strength";

    pub const OUT_NORMAL: &str = "normal";
}

pub mod environment_texture {
    pub const IN_FILENAME: &str = "filename";
    pub const IN_COLORSPACE: &str = "colorspace";
    pub const IN_ALPHA_TYPE: &str = "alpha_type";
    pub const IN_INTERPOLATION: &str = "interpolation";
    pub const IN_PROJECTION: &str = "projection";
    pub const IN_VECTOR: &str = "vector";

    pub const OUT_COLOR: &str = "color";
    pub const OUT_ALPHA: &str = "alpha";
}

pub mod noise_texture {
    pub const IN_VECTOR: &str = "vector";
    pub const IN_W: &str = "w";
    pub const IN_SCALE: &str = "scale";
    pub const IN_DETAIL: &str = "detail";
    pub const IN_ROUGHNESS: &str = "roughness";
    pub const IN_DISTORTION: &str = "distortion";

    pub const OUT_FAC: &str = "fac";
    pub const OUT_COLOR: &str = "color";
}

pub mod mix_closure {
    pub const IN_FAC: &str = "fac";
    pub const IN_CLOSURE1: &str = "closure1";
    pub const IN_CLOSURE2: &str = "closure2";

    pub const OUT_CLOSURE: &str = "closure";
}

pub mod add_closure {
    pub const IN_CLOSURE1: &str = "closure1";
    pub const IN_CLOSURE2: &str = "closure2";

    pub const OUT_CLOSURE: &str = "closure";
}

pub mod background_shader {
    pub const IN_COLOR: &str = "color";
    pub const IN_STRENGTH: &str = "strength";
    pub const IN_SURFACE_MIX_WEIGHT: &str = "surface_mix_weight";

    pub const OUT_BACKGROUND: &str = "background";
}

pub mod texture_coordinate {
    pub const IN_FROM_DUPLI: &str = "from_dupli";
    pub const IN_USE_TRANSFORM: &str = "use_transform";
    pub const IN_OB_TFM: &str = "ob_tfm";

    pub const OUT_GENERATED: &str = "generated";
    pub const OUT_NORMAL: &str = "normal";
    pub const OUT_UV: &str = "UV";
    pub const OUT_OBJECT: &str = "object";
    pub const OUT_CAMERA: &str = "camera";
    pub const OUT_WINDOW: &str = "window";
    pub const OUT_REFLECTION: &str = "reflection";
}

pub mod uvmap {
    pub const OUT_UV: &str = "UV";
}

pub mod mapping {
    pub const IN_TYPE: &str = "type";
    pub const IN_VECTOR: &str = "vector";
    pub const IN_LOCATION: &str = "location";
    pub const IN_ROTATION: &str = "rotation";
    pub const IN_SCALE: &str = "scale";

    pub const OUT_VECTOR: &str = "vector";

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(u32)]
    pub enum MappingType {
        Point = 0,
        Texture,
        Vector,
        Normal,
    }
}

pub mod scatter_volume {
    pub const IN_COLOR: &str = "color";
    pub const IN_DENSITY: &str = "density";
    pub const IN_ANISOTROPY: &str = "anisotropy";
    pub const IN_VOLUME_MIX_WEIGHT: &str = "volume_mix_weight";

    pub const OUT_VOLUME: &str = "volume";
}

pub mod emission {
    pub const IN_COLOR: &str = "color";
    pub const IN_STRENGTH: &str = "strength";
    pub const IN_SURFACE_MIX_WEIGHT: &str = "surface_mix_weight";

    pub const OUT_EMISSION: &str = "emission";
}

pub mod color {
    pub const IN_VALUE: &str = "value";

    pub const OUT_COLOR: &str = "color";
}

pub mod attribute {
    pub const IN_ATTRIBUTE: &str = "attribute";

    pub const OUT_COLOR: &str = "color";
    pub const OUT_VECTOR: &str = "vector";
    pub const OUT_FAC: &str = "fac";
}

pub mod light_path {
    pub const OUT_IS_CAMERA_RAY: &str = "is_camera_ray";
    pub const OUT_IS_SHADOW_RAY: &str = "is_shadow_ray";
    pub const OUT_IS_DIFFUSE_RAY: &str = "is_diffuse_ray";
    pub const OUT_IS_GLOSSY_RAY: &str = "is_glossy_ray";
    pub const OUT_IS_SINGULAR_RAY: &str = "is_singular_ray";
    pub const OUT_IS_REFLECTION_RAY: &str = "is_reflection_ray";
    pub const OUT_IS_TRANSMISSION_RAY: &str = "is_transmission_ray";
    pub const OUT_IS_VOLUME_SCATTER_RAY: &str = "is_volume_scatter_ray";

    pub const OUT_RAY_LENGTH: &str = "ray_length";
    pub const OUT_RAY_DEPTH: &str = "ray_depth";
    pub const OUT_DIFFUSE_DEPTH: &str = "diffuse_depth";
    pub const OUT_GLOSSY_DEPTH: &str = "glossy_depth";
    pub const OUT_TRANSPARENT_DEPTH: &str = "transparent_depth";
    pub const OUT_TRANSMISSION_DEPTH: &str = "transmission_depth";
}

pub mod transparent_bsdf {
    pub const IN_COLOR: &str = "color";
    pub const IN_SURFACE_MIX_WEIGHT: &str = "surface_mix_weight";

    pub const OUT_BSDF: &str = "BSDF";
}

pub mod translucent_bsdf {
    pub const IN_COLOR: &str = "color";
    pub const IN_NORMAL: &str = "normal";
    pub const IN_SURFACE_MIX_WEIGHT: &str = "surface_mix_weight";

    pub const OUT_BSDF: &str = "BSDF";
}

pub mod diffuse_bsdf {
    pub const IN_COLOR: &str = "color";
    pub const IN_NORMAL: &str = "normal";
    pub const IN_SURFACE_MIX_WEIGHT: &str = "surface_mix_weight";
    pub const IN_ROUGHNESS: &str = "roughness";

    pub const OUT_BSDF: &str = "BSDF";
}

pub mod normal_map {
    pub const IN_SPACE: &str = "space";
    pub const IN_ATTRIBUTE: &str = "attribute";
    pub const IN_STRENGTH: &str = "strength";
    pub const IN_COLOR: &str = "color";

    pub const OUT_NORMAL: &str = "normal";

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(u32)]
    pub enum NormalMapSpace {
        Tangent = 0,
        Object,
        World,
    }
}

pub mod principled_bsdf {
    pub const IN_DISTRIBUTION: &str = "distribution";
    pub const IN_SUBSURFACE_METHOD: &str = "subsurface_method";
    pub const IN_BASE_COLOR: &str = "base_color";
    pub const IN_SUBSURFACE_COLOR: &str = "subsurface_color";
    pub const IN_METALLIC: &str = "metallic";
    pub const IN_SUBSURFACE: &str = "subsurface";
    pub const IN_SUBSURFACE_RADIUS: &str = "subsurface_radius";
    pub const IN_SPECULAR: &str = "specular";
    pub const IN_ROUGHNESS: &str = "roughness";
    pub const IN_SPECULAR_TINT: &str = "specular_tint";
    pub const IN_ANISOTROPIC: &str = "anisotropic";
    pub const IN_SHEEN: &str = "sheen";
    pub const IN_SHEEN_TINT: &str = "sheen_tint";
    pub const IN_CLEARCOAT: &str = "clearcoat";
    pub const IN_CLEARCOAT_ROUGHNESS: &str = "clearcoat_roughness";
    pub const IN_IOR: &str = "ior";
    pub const IN_TRANSMISSION: &str = "transmission";
    pub const IN_TRANSMISSION_ROUGHNESS: &str = "transmission_roughness";
    pub const IN_ANISOTROPIC_ROTATION: &str = "anisotropic_rotation";
    pub const IN_EMISSION: &str = "emission";
    pub const IN_ALPHA: &str = "alpha";
    pub const IN_NORMAL: &str = "normal";
    pub const IN_CLEARCOAT_NORMAL: &str = "clearcoat_normal";
    pub const IN_TANGENT: &str = "tangent";
    pub const IN_SURFACE_MIX_WEIGHT: &str = "surface_mix_weight";

    pub const OUT_BSDF: &str = "BSDF";
}

pub mod principled_volume {
    pub const IN_COLOR: &str = "color";
    pub const IN_DENSITY: &str = "density";
    pub const IN_ANISOTROPY: &str = "anisotropy";
    pub const IN_ABSORPTION_COLOR: &str = "absorption_color";
    pub const IN_EMISSION_STRENGTH: &str = "emission_strength";
    pub const IN_EMISSION_COLOR: &str = "emission_color";
    pub const IN_BLACKBODY_INTENSITY: &str = "blackbody_intensity";
    pub const IN_BLACKBODY_TINT: &str = "blackbody_tint";
    pub const IN_TEMPERATURE: &str = "temperature";
    pub const IN_VOLUME_MIX_WEIGHT: &str = "volume_mix_weight";

    pub const OUT_VOLUME: &str = "volume";
}

pub mod toon_bsdf {
    pub const IN_COMPONENT: &str = "component";
    pub const IN_COLOR: &str = "color";
    pub const IN_NORMAL: &str = "normal";
    pub const IN_SURFACE_MIX_WEIGHT: &str = "surface_mix_weight";
    pub const IN_SIZE: &str = "size";
    pub const IN_SMOOTH: &str = "smooth";

    pub const OUT_BSDF: &str = "BSDF";
}

pub mod glossy_bsdf {
    pub const IN_COLOR: &str = "color";
    pub const IN_ALPHA: &str = "alpha";
    pub const IN_NORMAL: &str = "normal";
    pub const IN_SURFACE_MIX_WEIGHT: &str = "surface_mix_weight";
    pub const IN_DISTRIBUTION: &str = "distribution";
    pub const IN_ROUGHNESS: &str = "roughness";

    pub const OUT_BSDF: &str = "BSDF";
}

pub mod glass_bsdf {
    pub const IN_DISTRIBUTION: &str = "distribution";
    pub const IN_COLOR: &str = "color";
    pub const IN_NORMAL: &str = "normal";
    pub const IN_SURFACE_MIX_WEIGHT: &str = "surface_mix_weight";
    pub const IN_ROUGHNESS: &str = "roughness";
    pub const IN_IOR: &str = "IOR";

    pub const OUT_BSDF: &str = "BSDF";
}

pub mod volume_clear {
    pub const IN_PRIORITY: &str = "priority";
    pub const IN_IOR: &str = "IOR";
    pub const IN_ABSORPTION: &str = "absorption";
    pub const IN_EMISSION: &str = "emission";

    pub const IN_DEFAULT_WORLD_VOLUME: &str = "default_world_volume";

    pub const OUT_VOLUME: &str = "volume";
}

pub mod volume_homogeneous {
    pub const IN_PRIORITY: &str = "priority";
    pub const IN_IOR: &str = "IOR";
    pub const IN_ABSORPTION: &str = "absorption";
    pub const IN_EMISSION: &str = "emission";

    pub const IN_SCATTERING: &str = "scattering";
    pub const IN_ASYMMETRY: &str = "asymmetry";
    pub const IN_MULTI_SCATTERING: &str = "multiscattering";

    pub const IN_ABSORPTION_DEPTH: &str = "absorption_depth";
    pub const IN_DEFAULT_WORLD_VOLUME: &str = "default_world_volume";

    pub const OUT_VOLUME: &str = "homogeneous";
}

pub mod volume_heterogeneous {
    pub const IN_PRIORITY: &str = "priority";
    pub const IN_IOR: &str = "IOR";
    pub const IN_ABSORPTION: &str = "absorption";
    pub const IN_EMISSION: &str = "emission";

    pub const IN_SCATTERING: &str = "scattering";
    pub const IN_ASYMMETRY: &str = "asymmetry";
    pub const IN_MULTI_SCATTERING: &str = "multiscattering";

    pub const IN_STEP_SIZE: &str = "step_size";
    pub const IN_STEP_MAX_COUNT: &str = "step_max_count";

    pub const IN_DEFAULT_WORLD_VOLUME: &str = "default_world_volume";

    pub const OUT_VOLUME: &str = "heterogeneous";
}

pub mod output {
    pub const IN_SURFACE: &str = "surface";
    pub const IN_VOLUME: &str = "volume";
    pub const IN_DISPLACEMENT: &str = "displacement";
    pub const IN_NORMAL: &str = "normal";
}

pub mod mix {
    pub const IN_TYPE: &str = "type";
    pub const IN_USE_CLAMP: &str = "use_clamp";
    pub const IN_FAC: &str = "fac";
    pub const IN_COLOR1: &str = "color1";
    pub const IN_COLOR2: &str = "color2";

    pub const OUT_COLOR: &str = "color";

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(u32)]
    pub enum MixType {
        Blend = 0,
        Add,
        Mul,
        Sub,
        Screen,
        Div,
        Diff,
        Dark,
        Light,
        Overlay,
        Dodge,
        Burn,
        Hue,
        Sat,
        Val,
        Color,
        Soft,
        Linear,
        Clamp,
    }
}

pub mod rgb_to_bw {
    pub const IN_COLOR: &str = "color";

    pub const OUT_VAL: &str = "val";
}

pub mod invert {
    pub const IN_COLOR: &str = "color";
    pub const IN_FAC: &str = "fac";

    pub const OUT_COLOR: &str = "color";
}

pub mod vector_transform {
    pub const IN_TYPE: &str = "type";
    pub const IN_CONVERT_FROM: &str = "convert_from";
    pub const IN_CONVERT_TO: &str = "convert_to";
    pub const IN_VECTOR: &str = "vector";

    pub const OUT_VECTOR: &str = "vector";

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(u32)]
    pub enum VectorTransformType {
        None = 0,
        Vector,
        Point,
        Normal,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(u32)]
    pub enum ConvertSpace {
        World = 0,
        Object,
        Camera,
    }
}

pub mod rgb_ramp {
    pub const IN_RAMP: &str = "ramp";
    pub const IN_RAMP_ALPHA: &str = "ramp_alpha";
    pub const IN_INTERPOLATE: &str = "interpolate";
    pub const IN_FAC: &str = "fac";

    pub const OUT_COLOR: &str = "color";
    pub const OUT_ALPHA: &str = "alpha";
}

pub mod layer_weight {
    pub const IN_NORMAL: &str = "normal";
    pub const IN_BLEND: &str = "blend";

    pub const OUT_FRESNEL: &str = "fresnel";
    pub const OUT_FACING: &str = "facing";
}

pub mod ambient_occlusion {
    pub const IN_SAMPLES: &str = "samples";
    pub const IN_COLOR: &str = "color";
    pub const IN_DISTANCE: &str = "distance";
    pub const IN_NORMAL: &str = "normal";
    pub const IN_INSIDE: &str = "inside";
    pub const IN_ONLY_LOCAL: &str = "only_local";

    pub const OUT_COLOR: &str = "color";
    pub const OUT_AO: &str = "ao";
}
