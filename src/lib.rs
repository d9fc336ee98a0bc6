//!
//! Tracery is a renderer-agnostic raytracing middleware: scenes, meshes,
//! lights, cameras and shader graphs are described once, in a neutral form,
//! and dispatched to a dynamically loaded path-tracing backend that does the
//! actual pixel work.
//!
//! The crate covers four tightly coupled subsystems:
//! scene/shader description (a group-capable node-graph IR with typed
//! sockets), content-addressed model caches with bake/unbake duality, the
//! renderer lifecycle with its staged render pipeline, and a progressive
//! tiled compositor.
//!

#![warn(missing_debug_implementations)]

pub mod backend;
pub mod denoise;

mod camera;
mod codec;
mod color;
mod hash;
mod image;
mod job;
mod light;
mod math;
mod mesh;
mod model_cache;
mod node;
mod object;
mod renderer;
mod scene;
mod shader;
mod tile_manager;
mod world_object;

pub use self::{
    camera::*,
    codec::*,
    color::*,
    hash::*,
    image::*,
    job::*,
    light::*,
    math::*,
    mesh::*,
    model_cache::*,
    node::*,
    object::*,
    renderer::*,
    scene::*,
    shader::*,
    tile_manager::*,
    world_object::*,
};

pub use self::{
    backend::{register_backend, unload_renderer_library, unregister_backend},
    node::nodes,
};

/// Image size is defined to `u32`, which is standard for graphics APIs of
/// today.
pub type ImageSize = u32;

/// Two dimensional extent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct Extent2d {
    /// Width of the extent.
    pub width: ImageSize,

    /// Height of the extent.
    pub height: ImageSize,
}

impl Extent2d {
    pub fn new(width: ImageSize, height: ImageSize) -> Self {
        Extent2d { width, height }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_aspect_ratio() {
        let extent = Extent2d::new(1920, 1080);
        assert!((extent.aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
        assert_eq!(extent.pixel_count(), 1920 * 1080);
    }
}
