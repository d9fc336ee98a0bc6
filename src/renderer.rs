//! Abstract renderer surface, backend lifecycle and the render-stage state
//! machine.
//!
//! A [`Renderer`] is produced by a backend (plug-in library or in-process
//! factory) for a given [`Scene`]. The crate drives the staged pipeline;
//! backends implement the scene-dependent stages (lighting, aux passes,
//! baking) and inherit default handling for denoising, image finalization,
//! stereoscopic merging and teardown.

use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::{
    backend,
    camera::{CameraType, PanoramaType},
    color::ColorProcessor,
    denoise::{Denoiser, Info as DenoiseInfo},
    hash::ContentHash,
    image::{ImageBuffer, ImageLayerSet, FULLY_OPAQUE},
    job::{job_pair, JobStatus, RenderJob, RenderWorker},
    mesh::Mesh,
    model_cache::{CacheError, ModelCache, ShaderCache},
    node::GraphError,
    object::Object,
    scene::{
        is_lightmap_render_mode, is_render_scene_mode, main_pass_type, PassType, RenderMode,
        Scene, SceneActor,
    },
    tile_manager::{TileData, TileManager},
    world_object::Uuid,
};

pub const OUTPUT_COLOR: &str = "COLOR";
pub const OUTPUT_ALBEDO: &str = "ALBEDO";
pub const OUTPUT_NORMAL: &str = "NORMAL";
pub const OUTPUT_DEPTH: &str = "DEPTH";
pub const OUTPUT_AO: &str = "AO";
pub const OUTPUT_DIFFUSE: &str = "DIFFUSE";
pub const OUTPUT_DIFFUSE_DIRECT: &str = "DIFFUSE_DIRECT";
pub const OUTPUT_DIFFUSE_INDIRECT: &str = "DIFFUSE_INDIRECT";

bitflags::bitflags! {
    pub struct RendererFlags: u32 {
        const ENABLE_LIVE_EDITING = 0b001;
        const DISABLE_DISPLAY_DRIVER = 0b010;
        const COMPILING_KERNELS = 0b100;
    }
}

/// One of the two stereoscopic output eyes, or none for mono renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StereoEye {
    Left = 0,
    Right,
    None,
}

pub const STEREO_EYE_COUNT: usize = 2;

impl StereoEye {
    /// Buffer slot of this eye; `None` shares the left slot.
    pub fn buffer_index(&self) -> usize {
        match self {
            StereoEye::Left | StereoEye::None => 0,
            StereoEye::Right => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ImageRenderStage {
    InitializeScene = 0,
    Lighting,
    Albedo,
    Normal,
    Denoise,
    FinalizeImage,
    MergeStereoscopic,

    SceneAlbedo,
    SceneNormals,
    SceneDepth,

    Bake,

    Finalize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStageResult {
    Complete,
    Continue,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateRendererError {
    #[error("Illegal resolution {width}x{height}: Resolution must not be 0")]
    InvalidResolution { width: u32, height: u32 },

    #[error("Failed to load renderer module '{identifier}': {message}")]
    ModuleNotFound { identifier: String, message: String },

    #[error("Failed to locate symbol 'create_renderer' in renderer module '{identifier}': {message}")]
    SymbolMissing { identifier: String, message: String },

    #[error("Renderer backend '{identifier}' failed: {message}")]
    BackendFailed { identifier: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Render stage {stage:?} is not handled by this backend")]
    UnhandledStage { stage: ImageRenderStage },

    #[error("No result buffer exists for pass {pass}")]
    MissingResultBuffer { pass: PassType },

    #[error("Denoising failed: {message}")]
    DenoiseFailed { message: String },

    #[error("Backend failure: {message}")]
    Backend { message: String },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

// ---- process-wide handlers -------------------------------------------------

type LogHandler = Arc<dyn Fn(&str) + Send + Sync>;
type KernelCompileCallback = Arc<dyn Fn(bool) + Send + Sync>;

static LOG_HANDLER: Lazy<Mutex<Option<LogHandler>>> = Lazy::new(|| Mutex::new(None));
static KERNEL_COMPILE_CALLBACK: Lazy<Mutex<Option<KernelCompileCallback>>> =
    Lazy::new(|| Mutex::new(None));
static MODULE_LOOKUP_LOCATION: Lazy<Mutex<String>> = Lazy::new(|| Mutex::new(String::new()));

/// Installs (or clears) the process-wide log handler.
pub fn set_log_handler(handler: Option<LogHandler>) {
    *LOG_HANDLER.lock() = handler;
}

pub fn log_handler() -> Option<LogHandler> {
    LOG_HANDLER.lock().clone()
}

/// Routes a message through tracing and the installed handler.
pub fn log_message(message: &str) {
    tracing::info!("{message}");
    if let Some(handler) = log_handler() {
        handler(message);
    }
}

/// Callback invoked when a backend starts or finishes compiling kernels.
pub fn set_kernel_compile_callback(callback: Option<KernelCompileCallback>) {
    *KERNEL_COMPILE_CALLBACK.lock() = callback;
}

pub fn kernel_compile_callback() -> Option<KernelCompileCallback> {
    KERNEL_COMPILE_CALLBACK.lock().clone()
}

/// Subdirectory under `<program>/modules/` searched for renderer libraries.
pub fn set_module_lookup_location(location: impl Into<String>) {
    *MODULE_LOOKUP_LOCATION.lock() = location.into();
}

pub(crate) fn module_lookup_location() -> String {
    MODULE_LOOKUP_LOCATION.lock().clone()
}

// ---- renderer core ---------------------------------------------------------

struct RenderData {
    shader_cache: Arc<ShaderCache>,
    model_cache: Arc<ModelCache>,
}

/// State shared by every renderer implementation: the scene borrow, the tile
/// manager, declared passes and their result buffers, and the merged render
/// caches.
pub struct RendererCore {
    scene: Arc<Scene>,
    flags: RwLock<RendererFlags>,
    tile_manager: TileManager,
    denoiser: RwLock<Denoiser>,
    color_processor: RwLock<Option<Arc<dyn ColorProcessor>>>,
    passes: Mutex<HashMap<PassType, u32>>,
    next_output_index: Mutex<u32>,
    result_buffers: Mutex<HashMap<PassType, [Option<ImageBuffer>; STEREO_EYE_COUNT]>>,
    render_data: Mutex<RenderData>,
    actor_map: RwLock<HashMap<u64, SceneActor>>,
    progressive_running: Mutex<bool>,
    progressive_condition: Condvar,
}

impl std::fmt::Debug for RendererCore {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("RendererCore")
            .field("scene", &self.scene)
            .field("flags", &self.flags.read().bits())
            .finish()
    }
}

impl RendererCore {
    pub fn new(scene: Arc<Scene>, flags: RendererFlags) -> RendererCore {
        RendererCore {
            scene,
            flags: RwLock::new(flags),
            tile_manager: TileManager::new(),
            denoiser: RwLock::new(Denoiser::default()),
            color_processor: RwLock::new(None),
            passes: Mutex::new(HashMap::new()),
            next_output_index: Mutex::new(0),
            result_buffers: Mutex::new(HashMap::new()),
            render_data: Mutex::new(RenderData {
                shader_cache: ShaderCache::new(),
                model_cache: ModelCache::new(),
            }),
            actor_map: RwLock::new(HashMap::new()),
            progressive_running: Mutex::new(false),
            progressive_condition: Condvar::new(),
        }
    }

    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    pub fn flags(&self) -> RendererFlags {
        *self.flags.read()
    }

    pub fn tile_manager(&self) -> &TileManager {
        &self.tile_manager
    }

    pub fn set_denoiser(&self, denoiser: Denoiser) {
        *self.denoiser.write() = denoiser;
    }

    pub fn set_color_processor(&self, processor: Option<Arc<dyn ColorProcessor>>) {
        *self.color_processor.write() = processor;
    }

    pub fn color_processor(&self) -> Option<Arc<dyn ColorProcessor>> {
        self.color_processor.read().clone()
    }

    pub fn is_building_kernels(&self) -> bool {
        self.flags().contains(RendererFlags::COMPILING_KERNELS)
    }

    pub fn is_display_driver_enabled(&self) -> bool {
        !self.flags().contains(RendererFlags::DISABLE_DISPLAY_DRIVER)
    }

    /// Marks kernel compilation and fires the process-wide callback on
    /// transitions.
    pub fn set_building_kernels(&self, compiling: bool) {
        {
            let mut flags = self.flags.write();
            if flags.contains(RendererFlags::COMPILING_KERNELS) == compiling {
                return;
            }
            flags.set(RendererFlags::COMPILING_KERNELS, compiling);
        }
        if let Some(callback) = kernel_compile_callback() {
            callback(compiling);
        }
    }

    /// Declares an output pass, assigning it the next output index. Returns
    /// the existing index when already declared.
    pub fn add_pass(&self, pass: PassType) -> u32 {
        let mut passes = self.passes.lock();
        if let Some(&index) = passes.get(&pass) {
            return index;
        }
        let mut next = self.next_output_index.lock();
        let index = *next;
        *next += 1;
        passes.insert(pass, index);
        index
    }

    pub fn declared_passes(&self) -> Vec<(PassType, u32)> {
        self.passes.lock().iter().map(|(&p, &i)| (p, i)).collect()
    }

    pub fn pass_output_index(&self, pass: PassType) -> Option<u32> {
        self.passes.lock().get(&pass).copied()
    }

    pub fn set_result_buffer(&self, pass: PassType, eye: StereoEye, buffer: ImageBuffer) {
        let mut buffers = self.result_buffers.lock();
        let slots = buffers.entry(pass).or_insert_with(|| [None, None]);
        slots[eye.buffer_index()] = Some(buffer);
    }

    pub fn result_buffer(&self, pass: PassType, eye: StereoEye) -> Option<ImageBuffer> {
        self.result_buffers
            .lock()
            .get(&pass)
            .and_then(|slots| slots[eye.buffer_index()].clone())
    }

    fn take_result_buffer(&self, pass: PassType, eye: StereoEye) -> Option<ImageBuffer> {
        self.result_buffers
            .lock()
            .get_mut(&pass)
            .and_then(|slots| slots[eye.buffer_index()].take())
    }

    /// Merges the scene's model caches into the renderer-owned copy and
    /// bakes it.
    pub fn prepare_for_rendering(&self, use_float_data: bool) -> Result<(), RenderError> {
        self.tile_manager.set_use_float_data(use_float_data);
        let render_data = self.render_data.lock();
        for cache in self.scene.model_caches() {
            render_data.model_cache.merge(&cache);
        }
        render_data.model_cache.bake()?;
        for chunk in render_data.model_cache.chunks() {
            render_data.shader_cache.merge(chunk.shader_cache());
        }
        Ok(())
    }

    /// Regenerates live cache data and flattens every shader graph.
    pub fn initialize(&self) -> Result<(), RenderError> {
        let render_data = self.render_data.lock();
        render_data.model_cache.generate_data()?;
        for shader in render_data.shader_cache.shaders() {
            shader.finalize()?;
        }
        drop(render_data);
        self.update_actor_map();
        Ok(())
    }

    pub fn render_model_cache(&self) -> Arc<ModelCache> {
        self.render_data.lock().model_cache.clone()
    }

    pub fn render_shader_cache(&self) -> Arc<ShaderCache> {
        self.render_data.lock().shader_cache.clone()
    }

    pub fn update_actor_map(&self) {
        *self.actor_map.write() = self.scene.build_actor_map();
    }

    pub fn find_actor(&self, uuid: &Uuid) -> Option<SceneActor> {
        self.actor_map.read().get(&uuid.to_hash()).cloned()
    }

    pub fn find_render_mesh_by_hash(&self, hash: &ContentHash) -> Option<Arc<Mesh>> {
        let model_cache = self.render_model_cache();
        for chunk in model_cache.chunks() {
            for mesh in chunk.meshes() {
                if mesh.hash().as_ref() == Some(hash) {
                    return Some(mesh);
                }
            }
        }
        None
    }

    pub fn find_object(&self, name: &str) -> Option<Arc<Object>> {
        let model_cache = self.render_model_cache();
        for chunk in model_cache.chunks() {
            for object in chunk.objects() {
                if object.name() == name {
                    return Some(object);
                }
            }
        }
        None
    }

    pub fn should_use_transparent_sky(&self) -> bool {
        self.scene.scene_info().transparent_sky
    }

    pub fn rendered_tile_batch(&self) -> Vec<TileData> {
        self.tile_manager.rendered_tile_batch()
    }

    // ---- progressive refine ------------------------------------------------

    /// Marks the progressive-refine loop as running.
    pub fn begin_progressive_refine(&self) {
        *self.progressive_running.lock() = true;
    }

    /// Blocks the render thread until [`RendererCore::stop_rendering`] is
    /// called. Simulates indefinite convergence in progressive refine.
    pub fn wait_for_stop_rendering(&self) {
        let mut running = self.progressive_running.lock();
        while *running {
            self.progressive_condition.wait(&mut running);
        }
    }

    pub fn stop_rendering(&self) {
        *self.progressive_running.lock() = false;
        self.progressive_condition.notify_all();
    }

    pub fn is_progressive_refine_running(&self) -> bool {
        *self.progressive_running.lock()
    }

    // ---- default stage handling --------------------------------------------

    fn denoise_pass(
        &self,
        pass: PassType,
        eye: StereoEye,
        lightmap: bool,
        worker: &RenderWorker,
    ) -> Result<(), RenderError> {
        let mut image = self
            .take_result_buffer(pass, eye)
            .ok_or(RenderError::MissingResultBuffer { pass })?;
        let albedo = self.result_buffer(PassType::Albedo, eye);
        let normal = self.result_buffer(PassType::Normal, eye);
        let info = DenoiseInfo {
            width: image.width(),
            height: image.height(),
            lightmap,
            ..DenoiseInfo::default()
        };
        let progress = |_: f32| !worker.is_cancelled();
        let result = self.denoiser.read().denoise_image(
            &info,
            &mut image,
            albedo.as_ref(),
            normal.as_ref(),
            Some(&progress),
        );
        self.set_result_buffer(pass, eye, image);
        result.map_err(|message| RenderError::DenoiseFailed { message })
    }

    /// Default per-buffer finalization: color transform, alpha clear and
    /// flips, then the backend's own hook.
    fn finalize_images(
        &self,
        eye: StereoEye,
        backend_hook: &dyn Fn(&mut ImageBuffer, StereoEye),
    ) -> Result<(), RenderError> {
        let mode = self.scene.render_mode();
        let progressive = self.scene.create_info().progressive;
        let clear_alpha = !self.should_use_transparent_sky() || is_lightmap_render_mode(mode);

        // The horizontal flip depends on the camera projection; equirect and
        // fisheye-equidistant panoramas come out unmirrored.
        let camera = self.scene.camera();
        let mut flip_horizontally = is_render_scene_mode(mode);
        if camera.camera_type() == CameraType::Panorama {
            match camera.panorama_type() {
                PanoramaType::Equirectangular | PanoramaType::FisheyeEquidistant => {
                    flip_horizontally = false;
                }
                _ => {}
            }
        }

        let pass_types: Vec<PassType> = self.result_buffers.lock().keys().copied().collect();
        for pass in pass_types {
            let mut image = match self.take_result_buffer(pass, eye) {
                Some(image) => image,
                None => continue,
            };
            if let Some(processor) = self.color_processor() {
                if let Err(err) = processor.apply(&mut image) {
                    log_message(&format!("Unable to apply color transform: {err}"));
                }
            }
            if clear_alpha {
                image.clear_alpha(FULLY_OPAQUE);
            }
            if !progressive {
                // The progressive path flips inside the tile manager.
                image.flip(flip_horizontally, true);
            }
            backend_hook(&mut image, eye);
            self.set_result_buffer(pass, eye, image);
        }
        Ok(())
    }

    /// Stacks the left-eye image on top of the right-eye image for the main
    /// pass, leaving the composite in the left slot.
    fn merge_stereoscopic(&self) -> Result<(), RenderError> {
        let pass = match main_pass_type(self.scene.render_mode()) {
            Some(pass) => pass,
            None => return Ok(()),
        };
        let left = self
            .take_result_buffer(pass, StereoEye::Left)
            .ok_or(RenderError::MissingResultBuffer { pass })?;
        let right = self
            .take_result_buffer(pass, StereoEye::Right)
            .ok_or(RenderError::MissingResultBuffer { pass })?;
        let composite = ImageBuffer::stack_vertical(&left, &right).map_err(|err| {
            RenderError::Backend {
                message: format!("Stereoscopic merge failed: {err}"),
            }
        })?;
        self.set_result_buffer(pass, StereoEye::Left, composite);
        Ok(())
    }

    /// Collects the finalized left-eye buffers into the job result.
    pub fn result_image_layers(&self) -> ImageLayerSet {
        let mut layers = ImageLayerSet::default();
        let buffers = self.result_buffers.lock();
        for (pass, slots) in buffers.iter() {
            if let Some(image) = &slots[StereoEye::Left.buffer_index()] {
                layers.insert(pass.to_string(), Arc::new(image.clone()));
            }
        }
        layers
    }
}

// ---- renderer trait --------------------------------------------------------

/// Backend surface of a renderer.
///
/// `handle_render_stage` carries default handling for the backend-agnostic
/// stages; implementations handle the earlier, scene-dependent stages and
/// delegate the rest to the default.
pub trait Renderer: Send + Sync {
    fn core(&self) -> &RendererCore;

    fn wait(&self);
    fn start(&self);
    fn progress(&self) -> f32;
    fn reset(&self);
    fn restart(&self);
    fn stop(&self) -> bool;
    fn pause(&self) -> bool;
    fn resume(&self) -> bool;
    fn suspend(&self) -> bool;

    fn begin_scene_edit(&self) -> bool {
        false
    }

    fn end_scene_edit(&self) -> bool {
        false
    }

    fn sync_edited_actor(&self, uuid: &Uuid) -> bool;

    fn export_scene(&self, path: &str) -> bool;

    /// Writes a preview of the current render state; returns the path
    /// written, or an error message.
    fn save_render_preview(&self, path: &str) -> Result<String, String>;

    /// Marks the render as cancelled; stage loops must poll this
    /// cooperatively.
    fn set_cancelled(&self, message: &str);

    fn close_render_scene(&self);

    /// Hook applied to every result buffer at the end of FinalizeImage.
    fn finalize_image(&self, _image: &mut ImageBuffer, _eye: StereoEye) {}

    /// Switches state from the left to the right eye after a stage ran for
    /// the left eye. Returns `true` when the stage must be re-run.
    fn update_stereo_eye(
        &self,
        worker: &RenderWorker,
        stage: ImageRenderStage,
        eye: &mut StereoEye,
    ) -> bool {
        let _ = (worker, stage);
        if *eye == StereoEye::Left {
            *eye = StereoEye::Right;
            return true;
        }
        false
    }

    fn should_use_progressive_float_format(&self) -> bool {
        true
    }

    /// Launches the render on its own thread. Equivalent to the free
    /// [`start_render`] function.
    fn start_render(self: Arc<Self>) -> RenderJob
    where
        Self: Sized + 'static,
    {
        start_render(self)
    }

    /// Stage dispatch. The default covers Denoise, FinalizeImage,
    /// MergeStereoscopic and Finalize; everything earlier must be handled by
    /// the backend.
    fn handle_render_stage(
        &self,
        worker: &RenderWorker,
        stage: ImageRenderStage,
        eye: StereoEye,
    ) -> Result<RenderStageResult, RenderError> {
        handle_render_stage_default(self, worker, stage, eye)
    }
}

impl std::fmt::Debug for dyn Renderer {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.core().fmt(fmt)
    }
}

/// Default handling for the backend-agnostic stages. Backends overriding
/// `handle_render_stage` delegate unhandled stages here.
pub fn handle_render_stage_default<R: Renderer + ?Sized>(
    renderer: &R,
    worker: &RenderWorker,
    stage: ImageRenderStage,
    eye: StereoEye,
) -> Result<RenderStageResult, RenderError> {
    match stage {
        ImageRenderStage::Denoise => {
            let core = renderer.core();
            let mode = core.scene().render_mode();
            if is_lightmap_render_mode(mode) {
                match mode {
                    RenderMode::BakeDiffuseLighting => {
                        core.denoise_pass(PassType::Diffuse, eye, true, worker)?;
                    }
                    RenderMode::BakeDiffuseLightingSeparate => {
                        core.denoise_pass(PassType::DiffuseDirect, eye, true, worker)?;
                        core.denoise_pass(PassType::DiffuseIndirect, eye, true, worker)?;
                    }
                    _ => {}
                }
            } else if let Some(pass) = main_pass_type(mode) {
                core.denoise_pass(pass, eye, false, worker)?;
            }

            let mut next_eye = eye;
            if eye == StereoEye::Left && renderer.update_stereo_eye(worker, stage, &mut next_eye) {
                return Ok(RenderStageResult::Continue);
            }
            renderer.handle_render_stage(worker, ImageRenderStage::FinalizeImage, eye)
        }
        ImageRenderStage::FinalizeImage => {
            let core = renderer.core();
            core.finalize_images(eye, &|image, eye| renderer.finalize_image(image, eye))?;
            match eye {
                StereoEye::Left => Ok(RenderStageResult::Continue),
                StereoEye::Right => renderer.handle_render_stage(
                    worker,
                    ImageRenderStage::MergeStereoscopic,
                    StereoEye::None,
                ),
                StereoEye::None => {
                    renderer.handle_render_stage(worker, ImageRenderStage::Finalize, StereoEye::None)
                }
            }
        }
        ImageRenderStage::MergeStereoscopic => {
            renderer.core().merge_stereoscopic()?;
            renderer.handle_render_stage(worker, ImageRenderStage::Finalize, StereoEye::None)
        }
        ImageRenderStage::Finalize => {
            renderer.close_render_scene();
            Ok(RenderStageResult::Complete)
        }
        other => Err(RenderError::UnhandledStage { stage: other }),
    }
}

/// The stage a render enters after scene initialization.
pub fn initial_render_stage(mode: RenderMode) -> ImageRenderStage {
    match mode {
        RenderMode::RenderImage => ImageRenderStage::Lighting,
        RenderMode::SceneAlbedo => ImageRenderStage::SceneAlbedo,
        RenderMode::SceneNormals => ImageRenderStage::SceneNormals,
        RenderMode::SceneDepth => ImageRenderStage::SceneDepth,
        _ => ImageRenderStage::Bake,
    }
}

/// Creates a renderer for `scene` through the backend identified by
/// `identifier`: first the in-process registry, then the module search path.
pub fn create_renderer(
    scene: &Arc<Scene>,
    identifier: &str,
    flags: RendererFlags,
) -> Result<Arc<dyn Renderer>, CreateRendererError> {
    let (width, height) = scene.resolution();
    if width == 0 || height == 0 {
        return Err(CreateRendererError::InvalidResolution { width, height });
    }
    backend::instantiate(scene, identifier, flags)
}

/// Tears down process-wide renderer state: the library cache and the log
/// handler.
pub fn close() {
    backend::close_libraries();
    set_log_handler(None);
}

/// Launches the render-stage state machine on its own thread and returns
/// the job handle.
pub fn start_render(renderer: Arc<dyn Renderer>) -> RenderJob {
    let (worker, job) = job_pair();
    {
        let renderer = renderer.clone();
        worker.set_cancel_hook(move |message| renderer.set_cancelled(message));
    }
    let thread = std::thread::spawn(move || {
        worker.set_status(JobStatus::Running, None);
        match drive_render(&renderer, &worker) {
            Ok(()) => {
                if worker.is_cancelled() {
                    worker.set_status(JobStatus::Cancelled, None);
                } else {
                    worker.update_progress(1.0);
                    worker.set_result(renderer.core().result_image_layers());
                    worker.set_status(JobStatus::Complete, None);
                }
            }
            Err(err) => {
                tracing::error!("Render failed: {err}");
                worker.set_status(JobStatus::Failed, Some(err.to_string()));
            }
        }
    });
    job.attach_thread(thread);
    job
}

fn drive_render(renderer: &Arc<dyn Renderer>, worker: &RenderWorker) -> Result<(), RenderError> {
    let core = renderer.core();
    core.prepare_for_rendering(renderer.should_use_progressive_float_format())?;
    core.initialize()?;

    let scene = core.scene();
    let stereoscopic = scene.camera().is_stereoscopic();
    let stage = initial_render_stage(scene.render_mode());
    let mut eye = if stereoscopic {
        StereoEye::Left
    } else {
        StereoEye::None
    };

    loop {
        match renderer.handle_render_stage(worker, stage, eye)? {
            RenderStageResult::Complete => return Ok(()),
            RenderStageResult::Continue => {
                if worker.is_cancelled() {
                    return Ok(());
                }
                // A Continue after the left eye re-runs the pipeline for the
                // right one; anything else means the backend drives the
                // remaining stages itself.
                if eye == StereoEye::Left {
                    eye = StereoEye::Right;
                    continue;
                }
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        image::ImageFormat,
        scene::CreateInfo,
    };

    struct NullRenderer {
        core: RendererCore,
    }

    impl NullRenderer {
        fn new(scene: Arc<Scene>) -> Arc<NullRenderer> {
            Arc::new(NullRenderer {
                core: RendererCore::new(scene, RendererFlags::empty()),
            })
        }
    }

    impl Renderer for NullRenderer {
        fn core(&self) -> &RendererCore {
            &self.core
        }

        fn wait(&self) {}
        fn start(&self) {}
        fn progress(&self) -> f32 {
            0.0
        }
        fn reset(&self) {}
        fn restart(&self) {}
        fn stop(&self) -> bool {
            true
        }
        fn pause(&self) -> bool {
            false
        }
        fn resume(&self) -> bool {
            false
        }
        fn suspend(&self) -> bool {
            false
        }
        fn sync_edited_actor(&self, _uuid: &Uuid) -> bool {
            false
        }
        fn export_scene(&self, _path: &str) -> bool {
            false
        }
        fn save_render_preview(&self, _path: &str) -> Result<String, String> {
            Err("unsupported".to_owned())
        }
        fn set_cancelled(&self, _message: &str) {}
        fn close_render_scene(&self) {}
    }

    fn filled_buffer(w: u32, h: u32, value: f32) -> ImageBuffer {
        let mut img = ImageBuffer::new(w, h, ImageFormat::Rgba32F);
        for px in img.pixels_f32_mut().unwrap() {
            *px = value;
        }
        img
    }

    #[test]
    fn stereoscopic_merge_stacks_left_on_top() {
        let scene = Scene::new(RenderMode::RenderImage, CreateInfo::default());
        scene.camera().set_resolution(4, 2);
        let renderer = NullRenderer::new(scene);
        let core = renderer.core();
        core.set_result_buffer(PassType::Color, StereoEye::Left, filled_buffer(4, 2, 1.0));
        core.set_result_buffer(PassType::Color, StereoEye::Right, filled_buffer(4, 2, 2.0));

        core.merge_stereoscopic().unwrap();

        let merged = core.result_buffer(PassType::Color, StereoEye::Left).unwrap();
        assert_eq!(merged.width(), 4);
        assert_eq!(merged.height(), 4);
        let px = merged.pixels_f32().unwrap();
        assert_eq!(px[0], 1.0);
        assert_eq!(px[(2 * 4) * 4], 2.0);
        assert!(core.result_buffer(PassType::Color, StereoEye::Right).is_none());
    }

    #[test]
    fn finalize_flips_horizontally_for_perspective() {
        let scene = Scene::new(RenderMode::RenderImage, CreateInfo::default());
        scene.camera().set_resolution(2, 1);
        let renderer = NullRenderer::new(scene);
        let core = renderer.core();
        let mut img = ImageBuffer::new(2, 1, ImageFormat::Rgba32F);
        img.pixels_f32_mut().unwrap()[0] = 1.0;
        core.set_result_buffer(PassType::Color, StereoEye::None, img);

        core.finalize_images(StereoEye::None, &|_, _| {}).unwrap();

        let out = core.result_buffer(PassType::Color, StereoEye::None).unwrap();
        let px = out.pixels_f32().unwrap();
        // Pixel moved to the right edge by the horizontal flip.
        assert_eq!(px[0], 0.0);
        assert_eq!(px[4], 1.0);
    }

    #[test]
    fn finalize_keeps_horizontal_for_equirectangular_panorama() {
        let scene = Scene::new(RenderMode::RenderImage, CreateInfo::default());
        scene.camera().set_resolution(2, 1);
        scene.camera().set_camera_type(CameraType::Panorama);
        scene
            .camera()
            .set_panorama_type(PanoramaType::Equirectangular);
        let renderer = NullRenderer::new(scene);
        let core = renderer.core();
        let mut img = ImageBuffer::new(2, 1, ImageFormat::Rgba32F);
        img.pixels_f32_mut().unwrap()[0] = 1.0;
        core.set_result_buffer(PassType::Color, StereoEye::None, img);

        core.finalize_images(StereoEye::None, &|_, _| {}).unwrap();

        let out = core.result_buffer(PassType::Color, StereoEye::None).unwrap();
        let px = out.pixels_f32().unwrap();
        assert_eq!(px[0], 1.0);
    }

    #[test]
    fn finalize_clears_alpha_without_transparent_sky() {
        let scene = Scene::new(RenderMode::RenderImage, CreateInfo::default());
        scene.camera().set_resolution(1, 1);
        let renderer = NullRenderer::new(scene);
        let core = renderer.core();
        core.set_result_buffer(PassType::Color, StereoEye::None, ImageBuffer::new(1, 1, ImageFormat::Rgba32F));
        core.finalize_images(StereoEye::None, &|_, _| {}).unwrap();
        let out = core.result_buffer(PassType::Color, StereoEye::None).unwrap();
        assert_eq!(out.pixels_f32().unwrap()[3], 1.0);
    }

    #[test]
    fn pass_indices_are_stable() {
        let scene = Scene::new(RenderMode::RenderImage, CreateInfo::default());
        let renderer = NullRenderer::new(scene);
        let core = renderer.core();
        assert_eq!(core.add_pass(PassType::Color), 0);
        assert_eq!(core.add_pass(PassType::Albedo), 1);
        assert_eq!(core.add_pass(PassType::Color), 0);
        assert_eq!(core.pass_output_index(PassType::Albedo), Some(1));
    }

    #[test]
    fn progressive_refine_wait_and_stop() {
        let scene = Scene::new(RenderMode::RenderImage, CreateInfo::default());
        let renderer = NullRenderer::new(scene);
        let core: &RendererCore = renderer.core();
        core.begin_progressive_refine();
        assert!(core.is_progressive_refine_running());

        let renderer2 = renderer.clone();
        let waiter = std::thread::spawn(move || {
            renderer2.core().wait_for_stop_rendering();
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        core.stop_rendering();
        waiter.join().unwrap();
        assert!(!core.is_progressive_refine_running());
    }
}
