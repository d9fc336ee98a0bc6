//! End-to-end tests of the renderer lifecycle against a stub backend.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracery::{
    create_renderer, main_pass_type, register_backend, start_render, unregister_backend,
    CreateInfo, CreateRendererError, DenoiseMode, ImageBuffer, ImageFormat, ImageRenderStage,
    JobStatus, RenderError, RenderStageResult, RenderWorker, Renderer, RendererCore,
    RendererFlags, Scene, StereoEye, Uuid,
};

const BACKGROUND: [f32; 4] = [0.8, 0.8, 0.8, 1.0];

/// Minimal backend: every render converges instantly to the background
/// color.
struct StubRenderer {
    core: RendererCore,
    closed: AtomicBool,
}

impl StubRenderer {
    fn create(scene: &Arc<Scene>, flags: RendererFlags) -> Result<Arc<dyn Renderer>, String> {
        Ok(Arc::new(StubRenderer {
            core: RendererCore::new(scene.clone(), flags),
            closed: AtomicBool::new(false),
        }))
    }

    fn render_pass_buffer(&self) -> ImageBuffer {
        let (width, height) = self.core.scene().resolution();
        let mut image = ImageBuffer::new(width, height, ImageFormat::Rgba32F);
        for px in image.pixels_f32_mut().unwrap().chunks_exact_mut(4) {
            px.copy_from_slice(&BACKGROUND);
        }
        image
    }
}

impl Renderer for StubRenderer {
    fn core(&self) -> &RendererCore {
        &self.core
    }

    fn wait(&self) {}
    fn start(&self) {}
    fn progress(&self) -> f32 {
        1.0
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
        Err("preview not supported".to_owned())
    }
    fn set_cancelled(&self, _message: &str) {}

    fn close_render_scene(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn handle_render_stage(
        &self,
        worker: &RenderWorker,
        stage: ImageRenderStage,
        eye: StereoEye,
    ) -> Result<RenderStageResult, RenderError> {
        match stage {
            ImageRenderStage::Lighting => {
                let pass = main_pass_type(self.core.scene().render_mode())
                    .expect("render-image mode has a main pass");
                self.core.add_pass(pass);
                self.core
                    .set_result_buffer(pass, eye, self.render_pass_buffer());
                match self.core.scene().create_info().denoise_mode {
                    DenoiseMode::Off => {
                        self.handle_render_stage(worker, ImageRenderStage::FinalizeImage, eye)
                    }
                    DenoiseMode::Fast | DenoiseMode::Detailed => {
                        self.handle_render_stage(worker, ImageRenderStage::Denoise, eye)
                    }
                }
            }
            other => tracery::handle_render_stage_default(self, worker, other, eye),
        }
    }
}

fn empty_scene(denoise_mode: DenoiseMode) -> Arc<Scene> {
    let scene = Scene::new(
        tracery::RenderMode::RenderImage,
        CreateInfo {
            samples: Some(1),
            denoise_mode,
            ..CreateInfo::default()
        },
    );
    scene.camera().set_resolution(640, 480);
    scene
}

#[test]
fn stub_backend_renders_background_color() {
    register_backend("stub_complete", StubRenderer::create);
    let scene = empty_scene(DenoiseMode::Off);
    let renderer = create_renderer(&scene, "stub_complete", RendererFlags::empty()).unwrap();

    let job = start_render(renderer);
    assert_eq!(job.wait(), JobStatus::Complete);

    let result = job.take_result().expect("completed job has a result");
    let color = result.get("COLOR").expect("COLOR pass is declared");
    assert_eq!(color.width(), 640);
    assert_eq!(color.height(), 480);
    for px in color.pixels_f32().unwrap().chunks_exact(4) {
        assert_eq!(px, &BACKGROUND);
    }
    unregister_backend("stub_complete");
}

#[test]
fn fast_denoise_path_reaches_finalize() {
    register_backend("stub_denoise", StubRenderer::create);
    let scene = empty_scene(DenoiseMode::Fast);
    let renderer = create_renderer(&scene, "stub_denoise", RendererFlags::empty()).unwrap();
    let job = start_render(renderer);
    assert_eq!(job.wait(), JobStatus::Complete);
    assert!(job.take_result().is_some());
    unregister_backend("stub_denoise");
}

#[test]
fn zero_resolution_is_rejected() {
    let scene = Scene::new(tracery::RenderMode::RenderImage, CreateInfo::default());
    scene.camera().set_resolution(0, 480);
    let result = create_renderer(&scene, "anything", RendererFlags::empty());
    assert!(matches!(
        result,
        Err(CreateRendererError::InvalidResolution { width: 0, .. })
    ));
}

#[test]
fn unknown_backend_yields_error_and_no_registry_entry() {
    let scene = empty_scene(DenoiseMode::Off);
    let result = create_renderer(&scene, "no_such_backend", RendererFlags::empty());
    match result {
        Err(CreateRendererError::ModuleNotFound { identifier, message }) => {
            assert_eq!(identifier, "no_such_backend");
            assert!(!message.is_empty());
        }
        other => panic!("expected ModuleNotFound, got {other:?}"),
    }
    // No partial cache entry was retained.
    assert!(!tracery::unload_renderer_library("no_such_backend"));
}

#[test]
fn failing_backend_factory_propagates_message() {
    register_backend("stub_failing", |_scene, _flags| {
        Err("device initialization failed".to_owned())
    });
    let scene = empty_scene(DenoiseMode::Off);
    let result = create_renderer(&scene, "stub_failing", RendererFlags::empty());
    match result {
        Err(CreateRendererError::BackendFailed { message, .. }) => {
            assert_eq!(message, "device initialization failed");
        }
        other => panic!("expected BackendFailed, got {other:?}"),
    }
    unregister_backend("stub_failing");
}
