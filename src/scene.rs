//! The renderer-agnostic scene container.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::{
    camera::Camera,
    codec::{BlobReader, BlobWriter, CodecError},
    color::ColorTransformInfo,
    light::Light,
    math::Vec3,
    model_cache::{CacheError, ModelCache},
    node::NodeManager,
    object::Object,
    world_object::WorldObject,
};

/// Current version written into every persisted blob.
pub const SERIALIZATION_VERSION: u32 = 3;
/// Oldest version still accepted on read.
pub const MIN_SERIALIZATION_VERSION: u32 = 3;

const SCENE_MAGIC: &[u8; 4] = b"RTD\0";

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("Scene blob header magic mismatch")]
    BadMagic,

    #[error("Unsupported scene version {version} (supported: {min}..={max})")]
    UnsupportedVersion { version: u32, min: u32, max: u32 },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DeviceType {
    Cpu = 0,
    Gpu,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RenderMode {
    RenderImage = 0,
    BakeAmbientOcclusion,
    BakeNormals,
    BakeDiffuseLighting,
    BakeDiffuseLightingSeparate,
    SceneAlbedo,
    SceneNormals,
    SceneDepth,
}

impl RenderMode {
    fn from_u8(v: u8) -> Option<RenderMode> {
        Some(match v {
            0 => RenderMode::RenderImage,
            1 => RenderMode::BakeAmbientOcclusion,
            2 => RenderMode::BakeNormals,
            3 => RenderMode::BakeDiffuseLighting,
            4 => RenderMode::BakeDiffuseLightingSeparate,
            5 => RenderMode::SceneAlbedo,
            6 => RenderMode::SceneNormals,
            7 => RenderMode::SceneDepth,
            _ => return None,
        })
    }
}

/// True for modes that render a camera image (as opposed to texture baking).
pub fn is_render_scene_mode(mode: RenderMode) -> bool {
    matches!(
        mode,
        RenderMode::RenderImage
            | RenderMode::SceneAlbedo
            | RenderMode::SceneNormals
            | RenderMode::SceneDepth
    )
}

pub fn is_baking_scene_mode(mode: RenderMode) -> bool {
    matches!(
        mode,
        RenderMode::BakeAmbientOcclusion
            | RenderMode::BakeNormals
            | RenderMode::BakeDiffuseLighting
            | RenderMode::BakeDiffuseLightingSeparate
    )
}

/// Lightmap bakes get the lightmap-tuned denoiser filter.
pub fn is_lightmap_render_mode(mode: RenderMode) -> bool {
    matches!(
        mode,
        RenderMode::BakeDiffuseLighting | RenderMode::BakeDiffuseLightingSeparate
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DenoiseMode {
    Off = 0,
    /// Denoise the beauty pass directly without auxiliary passes.
    Fast,
    /// Render albedo and normal auxiliary passes before denoising.
    Detailed,
}

/// A named output image channel of the render.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PassType {
    Color = 0,
    Albedo,
    Normal,
    Depth,
    Ao,
    Diffuse,
    DiffuseDirect,
    DiffuseIndirect,
}

impl std::fmt::Display for PassType {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PassType::Color => "COLOR",
            PassType::Albedo => "ALBEDO",
            PassType::Normal => "NORMAL",
            PassType::Depth => "DEPTH",
            PassType::Ao => "AO",
            PassType::Diffuse => "DIFFUSE",
            PassType::DiffuseDirect => "DIFFUSE_DIRECT",
            PassType::DiffuseIndirect => "DIFFUSE_INDIRECT",
        };
        fmt.write_str(name)
    }
}

/// The pass holding the primary image of a render mode. Separate diffuse
/// baking produces two passes and has no single main pass.
pub fn main_pass_type(mode: RenderMode) -> Option<PassType> {
    Some(match mode {
        RenderMode::RenderImage => PassType::Color,
        RenderMode::SceneAlbedo => PassType::Albedo,
        RenderMode::SceneNormals | RenderMode::BakeNormals => PassType::Normal,
        RenderMode::SceneDepth => PassType::Depth,
        RenderMode::BakeAmbientOcclusion => PassType::Ao,
        RenderMode::BakeDiffuseLighting => PassType::Diffuse,
        RenderMode::BakeDiffuseLightingSeparate => return None,
    })
}

/// Scene-wide render parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct SceneInfo {
    pub sky: String,
    /// Sky orientation as pitch/yaw/roll degrees.
    pub sky_angles: Vec3,
    pub sky_strength: f32,
    pub emission_strength: f32,
    pub light_intensity_factor: f32,
    pub motion_blur_strength: f32,
    pub max_transparency_bounces: u32,
    pub max_bounces: u32,
    pub max_diffuse_bounces: u32,
    pub max_glossy_bounces: u32,
    pub max_transmission_bounces: u32,
    pub exposure: f32,
    pub transparent_sky: bool,
}

impl Default for SceneInfo {
    fn default() -> Self {
        SceneInfo {
            sky: String::new(),
            sky_angles: Vec3::ZERO,
            sky_strength: 1.0,
            emission_strength: 1.0,
            light_intensity_factor: 1.0,
            motion_blur_strength: 0.0,
            max_transparency_bounces: 64,
            max_bounces: 12,
            max_diffuse_bounces: 4,
            max_glossy_bounces: 4,
            max_transmission_bounces: 12,
            exposure: 1.0,
            transparent_sky: false,
        }
    }
}

impl SceneInfo {
    fn write(&self, w: &mut BlobWriter) {
        w.write_string(&self.sky);
        w.write_vec3(self.sky_angles);
        w.write_f32(self.sky_strength);
        w.write_f32(self.emission_strength);
        w.write_f32(self.light_intensity_factor);
        w.write_f32(self.motion_blur_strength);
        w.write_u32(self.max_transparency_bounces);
        w.write_u32(self.max_bounces);
        w.write_u32(self.max_diffuse_bounces);
        w.write_u32(self.max_glossy_bounces);
        w.write_u32(self.max_transmission_bounces);
        w.write_f32(self.exposure);
        w.write_bool(self.transparent_sky);
    }

    fn read(r: &mut BlobReader<'_>) -> Result<Self, CodecError> {
        Ok(SceneInfo {
            sky: r.read_string()?,
            sky_angles: r.read_vec3()?,
            sky_strength: r.read_f32()?,
            emission_strength: r.read_f32()?,
            light_intensity_factor: r.read_f32()?,
            motion_blur_strength: r.read_f32()?,
            max_transparency_bounces: r.read_u32()?,
            max_bounces: r.read_u32()?,
            max_diffuse_bounces: r.read_u32()?,
            max_glossy_bounces: r.read_u32()?,
            max_transmission_bounces: r.read_u32()?,
            exposure: r.read_f32()?,
            transparent_sky: r.read_bool()?,
        })
    }
}

/// Parameters fixed at scene creation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct CreateInfo {
    pub samples: Option<u32>,
    pub hdr_output: bool,
    pub denoise_mode: DenoiseMode,
    pub progressive: bool,
    pub progressive_refine: bool,
    pub device_type: DeviceType,
    pub exposure: f32,
    pub color_transform: Option<ColorTransformInfo>,
}

impl Default for CreateInfo {
    fn default() -> Self {
        CreateInfo {
            samples: None,
            hdr_output: false,
            denoise_mode: DenoiseMode::Detailed,
            progressive: false,
            progressive_refine: false,
            device_type: DeviceType::Gpu,
            exposure: 1.0,
            color_transform: None,
        }
    }
}

impl CreateInfo {
    fn write(&self, w: &mut BlobWriter) {
        w.write_bool(self.samples.is_some());
        if let Some(samples) = self.samples {
            w.write_u32(samples);
        }
        w.write_bool(self.hdr_output);
        w.write_u8(self.denoise_mode as u8);
        w.write_bool(self.progressive);
        w.write_bool(self.progressive_refine);
        w.write_u8(self.device_type as u8);
        w.write_f32(self.exposure);
        w.write_bool(self.color_transform.is_some());
        if let Some(ct) = &self.color_transform {
            w.write_string(&ct.config);
            w.write_bool(ct.look_name.is_some());
            if let Some(look) = &ct.look_name {
                w.write_string(look);
            }
        }
    }

    fn read(r: &mut BlobReader<'_>) -> Result<Self, CodecError> {
        let samples = if r.read_bool()? {
            Some(r.read_u32()?)
        } else {
            None
        };
        let hdr_output = r.read_bool()?;
        let raw_denoise = r.read_u8()?;
        let denoise_mode = match raw_denoise {
            0 => DenoiseMode::Off,
            1 => DenoiseMode::Fast,
            2 => DenoiseMode::Detailed,
            _ => {
                return Err(CodecError::InvalidDiscriminant {
                    ty: "DenoiseMode",
                    value: raw_denoise as u32,
                })
            }
        };
        let progressive = r.read_bool()?;
        let progressive_refine = r.read_bool()?;
        let raw_device = r.read_u8()?;
        let device_type = match raw_device {
            0 => DeviceType::Cpu,
            1 => DeviceType::Gpu,
            _ => {
                return Err(CodecError::InvalidDiscriminant {
                    ty: "DeviceType",
                    value: raw_device as u32,
                })
            }
        };
        let exposure = r.read_f32()?;
        let color_transform = if r.read_bool()? {
            let config = r.read_string()?;
            let look_name = if r.read_bool()? {
                Some(r.read_string()?)
            } else {
                None
            };
            Some(ColorTransformInfo { config, look_name })
        } else {
            None
        };
        Ok(CreateInfo {
            samples,
            hdr_output,
            denoise_mode,
            progressive,
            progressive_refine,
            device_type,
            exposure,
            color_transform,
        })
    }
}

/// Auxiliary data stored in the scene header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SerializationData {
    pub output_file_name: String,
}

/// Header contents, readable without deserializing the full scene.
#[derive(Clone, Debug)]
pub struct SceneHeader {
    pub render_mode: RenderMode,
    pub create_info: CreateInfo,
    pub serialization_data: SerializationData,
    pub scene_info: SceneInfo,
}

/// A posed scene entity addressable by UUID during live edits.
#[derive(Clone, Debug)]
pub enum SceneActor {
    Camera(Arc<Camera>),
    Light(Arc<Light>),
    Object(Arc<Object>),
}

impl SceneActor {
    pub fn world(&self) -> &WorldObject {
        match self {
            SceneActor::Camera(c) => c.world(),
            SceneActor::Light(l) => l.world(),
            SceneActor::Object(o) => o.world(),
        }
    }
}

/// Owns the camera, lights and model caches handed to a renderer.
pub struct Scene {
    node_manager: Arc<NodeManager>,
    camera: Arc<Camera>,
    lights: RwLock<Vec<Arc<Light>>>,
    model_caches: RwLock<Vec<Arc<ModelCache>>>,
    scene_info: RwLock<SceneInfo>,
    render_mode: RwLock<RenderMode>,
    create_info: CreateInfo,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Scene")
            .field("render_mode", &self.render_mode())
            .field("lights", &self.lights.read().len())
            .field("model_caches", &self.model_caches.read().len())
            .finish()
    }
}

impl Scene {
    pub fn new(render_mode: RenderMode, create_info: CreateInfo) -> Arc<Scene> {
        Arc::new(Scene {
            node_manager: NodeManager::new(),
            camera: Camera::new(),
            lights: RwLock::new(Vec::new()),
            model_caches: RwLock::new(Vec::new()),
            scene_info: RwLock::new(SceneInfo::default()),
            render_mode: RwLock::new(render_mode),
            create_info,
        })
    }

    pub fn node_manager(&self) -> &Arc<NodeManager> {
        &self.node_manager
    }

    pub fn camera(&self) -> &Arc<Camera> {
        &self.camera
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.camera.resolution()
    }

    pub fn lights(&self) -> Vec<Arc<Light>> {
        self.lights.read().clone()
    }

    pub fn add_light(&self, light: Arc<Light>) {
        self.lights.write().push(light);
    }

    pub fn model_caches(&self) -> Vec<Arc<ModelCache>> {
        self.model_caches.read().clone()
    }

    pub fn add_model_cache(&self, cache: Arc<ModelCache>) {
        self.model_caches.write().push(cache);
    }

    pub fn scene_info(&self) -> SceneInfo {
        self.scene_info.read().clone()
    }

    pub fn set_scene_info(&self, info: SceneInfo) {
        *self.scene_info.write() = info;
    }

    pub fn render_mode(&self) -> RenderMode {
        *self.render_mode.read()
    }

    pub fn set_render_mode(&self, mode: RenderMode) {
        *self.render_mode.write() = mode;
    }

    pub fn create_info(&self) -> &CreateInfo {
        &self.create_info
    }

    pub fn set_sky(&self, sky_path: impl Into<String>) {
        self.scene_info.write().sky = sky_path.into();
    }

    pub fn set_sky_angles(&self, angles: Vec3) {
        self.scene_info.write().sky_angles = angles;
    }

    pub fn set_sky_strength(&self, strength: f32) {
        self.scene_info.write().sky_strength = strength;
    }

    pub fn set_emission_strength(&self, strength: f32) {
        self.scene_info.write().emission_strength = strength;
    }

    pub fn emission_strength(&self) -> f32 {
        self.scene_info.read().emission_strength
    }

    pub fn set_light_intensity_factor(&self, factor: f32) {
        self.scene_info.write().light_intensity_factor = factor;
    }

    pub fn light_intensity_factor(&self) -> f32 {
        self.scene_info.read().light_intensity_factor
    }

    pub fn set_motion_blur_strength(&self, strength: f32) {
        self.scene_info.write().motion_blur_strength = strength;
    }

    pub fn set_max_transparency_bounces(&self, bounces: u32) {
        self.scene_info.write().max_transparency_bounces = bounces;
    }

    pub fn set_max_bounces(&self, bounces: u32) {
        self.scene_info.write().max_bounces = bounces;
    }

    pub fn set_max_diffuse_bounces(&self, bounces: u32) {
        self.scene_info.write().max_diffuse_bounces = bounces;
    }

    pub fn set_max_glossy_bounces(&self, bounces: u32) {
        self.scene_info.write().max_glossy_bounces = bounces;
    }

    pub fn set_max_transmission_bounces(&self, bounces: u32) {
        self.scene_info.write().max_transmission_bounces = bounces;
    }

    pub fn set_transparent_sky(&self, transparent: bool) {
        self.scene_info.write().transparent_sky = transparent;
    }

    pub fn set_exposure(&self, exposure: f32) {
        self.scene_info.write().exposure = exposure;
    }

    /// UUID-hash to actor map over the camera, lights and all cached
    /// objects. Renderers use it to resolve live-edit updates.
    pub fn build_actor_map(&self) -> HashMap<u64, SceneActor> {
        let mut map = HashMap::new();
        map.insert(
            self.camera.world().uuid().to_hash(),
            SceneActor::Camera(self.camera.clone()),
        );
        for light in self.lights() {
            map.insert(light.world().uuid().to_hash(), SceneActor::Light(light));
        }
        for cache in self.model_caches() {
            for chunk in cache.chunks() {
                for object in chunk.objects() {
                    map.insert(object.world().uuid().to_hash(), SceneActor::Object(object));
                }
            }
        }
        map
    }

    /// Serializes the scene header, camera and lights. Model caches are
    /// serialized separately via [`ModelCache::serialize`].
    pub fn serialize(
        &self,
        w: &mut BlobWriter,
        serialization_data: &SerializationData,
    ) -> Result<(), SceneError> {
        w.write_bytes(SCENE_MAGIC);
        w.write_u32(SERIALIZATION_VERSION);
        self.create_info.write(w);
        w.write_string(&serialization_data.output_file_name);
        self.scene_info.read().write(w);
        w.write_u8(self.render_mode() as u8);

        self.camera.serialize(w);
        let lights = self.lights();
        w.write_u32(lights.len() as u32);
        for light in &lights {
            light.serialize(w);
        }
        Ok(())
    }

    /// Reads only the header of a serialized scene.
    pub fn read_header_info(r: &mut BlobReader<'_>) -> Result<SceneHeader, SceneError> {
        let magic = r.read_bytes(4)?;
        if magic != SCENE_MAGIC {
            return Err(SceneError::BadMagic);
        }
        let version = r.read_u32()?;
        if version < MIN_SERIALIZATION_VERSION || version > SERIALIZATION_VERSION {
            return Err(SceneError::UnsupportedVersion {
                version,
                min: MIN_SERIALIZATION_VERSION,
                max: SERIALIZATION_VERSION,
            });
        }
        let create_info = CreateInfo::read(r)?;
        let output_file_name = r.read_string()?;
        let scene_info = SceneInfo::read(r)?;
        let raw_mode = r.read_u8()?;
        let render_mode = RenderMode::from_u8(raw_mode).ok_or(CodecError::InvalidDiscriminant {
            ty: "RenderMode",
            value: raw_mode as u32,
        })?;
        Ok(SceneHeader {
            render_mode,
            create_info,
            serialization_data: SerializationData { output_file_name },
            scene_info,
        })
    }

    pub fn deserialize(r: &mut BlobReader<'_>) -> Result<Arc<Scene>, SceneError> {
        let header = Self::read_header_info(r)?;
        let scene = Scene::new(header.render_mode, header.create_info);
        scene.set_scene_info(header.scene_info);
        scene.camera.deserialize(r)?;
        let light_count = r.read_u32()? as usize;
        for _ in 0..light_count {
            scene.add_light(Light::deserialize(r)?);
        }
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::LightType;

    #[test]
    fn mode_predicates() {
        assert!(is_render_scene_mode(RenderMode::RenderImage));
        assert!(!is_render_scene_mode(RenderMode::BakeNormals));
        assert!(is_baking_scene_mode(RenderMode::BakeAmbientOcclusion));
        assert!(is_lightmap_render_mode(RenderMode::BakeDiffuseLighting));
        assert!(!is_lightmap_render_mode(RenderMode::BakeNormals));
    }

    #[test]
    fn main_pass_per_mode() {
        assert_eq!(main_pass_type(RenderMode::RenderImage), Some(PassType::Color));
        assert_eq!(main_pass_type(RenderMode::SceneDepth), Some(PassType::Depth));
        assert_eq!(main_pass_type(RenderMode::BakeDiffuseLightingSeparate), None);
    }

    #[test]
    fn serialization_round_trip() {
        let scene = Scene::new(
            RenderMode::RenderImage,
            CreateInfo {
                samples: Some(32),
                hdr_output: true,
                color_transform: Some(ColorTransformInfo {
                    config: "filmic-blender".into(),
                    look_name: Some("Medium Contrast".into()),
                }),
                ..CreateInfo::default()
            },
        );
        scene.camera().set_resolution(640, 480);
        scene.set_sky("skies/day01.hdr");
        scene.set_sky_strength(2.0);
        scene.set_max_bounces(6);
        let light = Light::new();
        light.set_light_type(LightType::Directional);
        scene.add_light(light);

        let mut w = BlobWriter::new();
        scene
            .serialize(
                &mut w,
                &SerializationData {
                    output_file_name: "render/out.hdr".into(),
                },
            )
            .unwrap();
        let blob = w.finish();

        let restored = Scene::deserialize(&mut BlobReader::new(&blob)).unwrap();
        assert_eq!(restored.render_mode(), RenderMode::RenderImage);
        assert_eq!(restored.create_info().samples, Some(32));
        assert!(restored.create_info().hdr_output);
        assert_eq!(restored.scene_info().sky, "skies/day01.hdr");
        assert_eq!(restored.scene_info().max_bounces, 6);
        assert_eq!(restored.resolution(), (640, 480));
        assert_eq!(restored.lights().len(), 1);
        assert_eq!(restored.lights()[0].light_type(), LightType::Directional);
    }

    #[test]
    fn header_only_read() {
        let scene = Scene::new(RenderMode::SceneAlbedo, CreateInfo::default());
        let mut w = BlobWriter::new();
        scene.serialize(&mut w, &SerializationData::default()).unwrap();
        let blob = w.finish();
        let header = Scene::read_header_info(&mut BlobReader::new(&blob)).unwrap();
        assert_eq!(header.render_mode, RenderMode::SceneAlbedo);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut w = BlobWriter::new();
        w.write_bytes(b"NOPE");
        w.write_u32(SERIALIZATION_VERSION);
        let blob = w.finish();
        assert!(matches!(
            Scene::read_header_info(&mut BlobReader::new(&blob)),
            Err(SceneError::BadMagic)
        ));
    }

    #[test]
    fn actor_map_contains_all_entities() {
        let scene = Scene::new(RenderMode::RenderImage, CreateInfo::default());
        let light = Light::new();
        scene.add_light(light.clone());
        let map = scene.build_actor_map();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key(&light.world().uuid().to_hash()));
        assert!(map.contains_key(&scene.camera().world().uuid().to_hash()));
    }
}
