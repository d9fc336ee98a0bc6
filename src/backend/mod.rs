//! Backend boundary: the plug-in ABI and the renderer backend registry.
//!
//! Backends come in two forms: shared libraries discovered on disk by
//! identifier, and in-process factories registered by the embedding
//! application (or tests). Both produce [`Renderer`] handles.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::{
    renderer::{module_lookup_location, CreateRendererError, Renderer, RendererFlags},
    scene::Scene,
};

/// Symbol every renderer library must export.
pub const CREATE_RENDERER_SYMBOL: &[u8] = b"create_renderer";

/// Shared-library base name for a backend identifier, without platform
/// prefix/suffix.
pub fn renderer_library_name(identifier: &str) -> String {
    format!("UniRender_{identifier}")
}

/// Out-parameter of the plug-in entry point.
#[derive(Default)]
pub struct RendererCreateResult {
    pub renderer: Option<Arc<dyn Renderer>>,
    pub error: Option<String>,
}

impl std::fmt::Debug for RendererCreateResult {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("RendererCreateResult")
            .field("renderer", &self.renderer.is_some())
            .field("error", &self.error)
            .finish()
    }
}

/// Entry point signature of a renderer library.
///
/// Rust trait objects cross this boundary, so a library must be built with
/// the same toolchain as its host. Returns `true` on success; on failure the
/// library fills `error`.
pub type CreateRendererFn = unsafe extern "C" fn(
    scene: &Arc<Scene>,
    flags: RendererFlags,
    out: &mut RendererCreateResult,
) -> bool;

type BackendFactory =
    Arc<dyn Fn(&Arc<Scene>, RendererFlags) -> Result<Arc<dyn Renderer>, String> + Send + Sync>;

static BACKEND_REGISTRY: Lazy<Mutex<HashMap<String, BackendFactory>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static RENDERER_LIBRARIES: Lazy<Mutex<HashMap<String, Arc<libloading::Library>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers an in-process backend under the given identifier, bypassing
/// shared-library loading. Used by embedded backends and tests.
pub fn register_backend<F>(identifier: &str, factory: F)
where
    F: Fn(&Arc<Scene>, RendererFlags) -> Result<Arc<dyn Renderer>, String> + Send + Sync + 'static,
{
    BACKEND_REGISTRY
        .lock()
        .insert(identifier.to_owned(), Arc::new(factory));
}

pub fn unregister_backend(identifier: &str) -> bool {
    BACKEND_REGISTRY.lock().remove(identifier).is_some()
}

/// Drops the cached library for an identifier. The library itself may stay
/// mapped while renderer handles exist.
pub fn unload_renderer_library(identifier: &str) -> bool {
    RENDERER_LIBRARIES.lock().remove(identifier).is_some()
}

pub(crate) fn close_libraries() {
    RENDERER_LIBRARIES.lock().clear();
}

fn module_directory(identifier: &str) -> PathBuf {
    let mut path = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .unwrap_or_default();
    path.push("modules");
    let location = module_lookup_location();
    if !location.is_empty() {
        path.push(location);
    }
    path.push(identifier);
    path
}

fn library_path(identifier: &str) -> PathBuf {
    let mut path = module_directory(identifier);
    path.push(format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        renderer_library_name(identifier),
        std::env::consts::DLL_SUFFIX
    ));
    path
}

/// Creates a renderer through the registry or the library cache. The cache
/// only retains a library once renderer creation succeeded.
pub(crate) fn instantiate(
    scene: &Arc<Scene>,
    identifier: &str,
    flags: RendererFlags,
) -> Result<Arc<dyn Renderer>, CreateRendererError> {
    let factory = BACKEND_REGISTRY.lock().get(identifier).cloned();
    if let Some(factory) = factory {
        return factory(scene, flags).map_err(|message| CreateRendererError::BackendFailed {
            identifier: identifier.to_owned(),
            message,
        });
    }

    let cached = RENDERER_LIBRARIES.lock().get(identifier).cloned();
    let (library, newly_loaded) = match cached {
        Some(lib) => (lib, false),
        None => {
            let path = library_path(identifier);
            tracing::debug!("Loading renderer module from {}", path.display());
            let lib = unsafe { libloading::Library::new(&path) }.map_err(|err| {
                CreateRendererError::ModuleNotFound {
                    identifier: identifier.to_owned(),
                    message: format!("{}: {err}", path.display()),
                }
            })?;
            (Arc::new(lib), true)
        }
    };

    let mut result = RendererCreateResult::default();
    let ok = unsafe {
        let func: libloading::Symbol<'_, CreateRendererFn> = library
            .get(CREATE_RENDERER_SYMBOL)
            .map_err(|err| CreateRendererError::SymbolMissing {
                identifier: identifier.to_owned(),
                message: err.to_string(),
            })?;
        func(scene, flags, &mut result)
    };

    if !ok {
        return Err(CreateRendererError::BackendFailed {
            identifier: identifier.to_owned(),
            message: result
                .error
                .unwrap_or_else(|| "Renderer backend reported an unknown error".to_owned()),
        });
    }
    let renderer = result
        .renderer
        .ok_or_else(|| CreateRendererError::BackendFailed {
            identifier: identifier.to_owned(),
            message: "Renderer backend returned success without a renderer".to_owned(),
        })?;

    if newly_loaded {
        RENDERER_LIBRARIES
            .lock()
            .insert(identifier.to_owned(), library);
    }
    Ok(renderer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_name_convention() {
        assert_eq!(renderer_library_name("cycles"), "UniRender_cycles");
    }

    #[test]
    fn library_path_contains_identifier_directory() {
        let path = library_path("luxcore");
        let s = path.to_string_lossy();
        assert!(s.contains("modules"));
        assert!(s.contains("luxcore"));
        assert!(s.contains("UniRender_luxcore"));
    }
}
