//! Renderer-independent camera description.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    codec::{BlobReader, BlobWriter, CodecError},
    world_object::{Uuid, WorldObject},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CameraType {
    Perspective = 0,
    Orthographic,
    Panorama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PanoramaType {
    Equirectangular = 0,
    FisheyeEquidistant,
    FisheyeEquisolid,
    Mirrorball,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct CameraState {
    camera_type: CameraType,
    panorama_type: PanoramaType,
    width: u32,
    height: u32,
    near_z: f32,
    far_z: f32,
    /// Vertical field of view in degrees.
    fov: f32,
    focal_distance: f32,
    aperture_size: f32,
    aperture_ratio: f32,
    blade_count: u32,
    blades_rotation: f32,
    dof_enabled: bool,
    stereoscopic: bool,
    interocular_distance: f32,
    longitude_min: f32,
    longitude_max: f32,
    latitude_min: f32,
    latitude_max: f32,
    /// Shutter time in frames. Advisory; backends decide how to honor it.
    shutter_time: f32,
    rolling_shutter_enabled: bool,
    rolling_shutter_duration: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        CameraState {
            camera_type: CameraType::Perspective,
            panorama_type: PanoramaType::Equirectangular,
            width: 1920,
            height: 1080,
            near_z: 0.1,
            far_z: 32_768.0,
            fov: 39.6,
            focal_distance: 10.0,
            aperture_size: 0.0,
            aperture_ratio: 1.0,
            blade_count: 0,
            blades_rotation: 0.0,
            dof_enabled: false,
            stereoscopic: false,
            interocular_distance: 65.0,
            longitude_min: -90.0,
            longitude_max: 90.0,
            latitude_min: -90.0,
            latitude_max: 90.0,
            shutter_time: 0.0,
            rolling_shutter_enabled: false,
            rolling_shutter_duration: 0.1,
        }
    }
}

/// The scene camera.
pub struct Camera {
    world: WorldObject,
    state: RwLock<CameraState>,
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        fmt.debug_struct("Camera")
            .field("type", &state.camera_type)
            .field("resolution", &format_args!("{}x{}", state.width, state.height))
            .finish()
    }
}

impl Camera {
    pub fn new() -> Arc<Camera> {
        let camera = Arc::new(Camera {
            world: WorldObject::new(),
            state: RwLock::new(CameraState::default()),
        });
        camera.world.set_uuid(Uuid::generate());
        camera
    }

    pub fn world(&self) -> &WorldObject {
        &self.world
    }

    pub fn set_resolution(&self, width: u32, height: u32) {
        let mut state = self.state.write();
        state.width = width;
        state.height = height;
    }

    pub fn resolution(&self) -> (u32, u32) {
        let state = self.state.read();
        (state.width, state.height)
    }

    pub fn width(&self) -> u32 {
        self.state.read().width
    }

    pub fn height(&self) -> u32 {
        self.state.read().height
    }

    pub fn aspect_ratio(&self) -> f32 {
        let state = self.state.read();
        state.width as f32 / state.height as f32
    }

    pub fn set_camera_type(&self, camera_type: CameraType) {
        self.state.write().camera_type = camera_type;
    }

    pub fn camera_type(&self) -> CameraType {
        self.state.read().camera_type
    }

    pub fn set_panorama_type(&self, panorama_type: PanoramaType) {
        self.state.write().panorama_type = panorama_type;
    }

    pub fn panorama_type(&self) -> PanoramaType {
        self.state.read().panorama_type
    }

    pub fn set_near_z(&self, near_z: f32) {
        self.state.write().near_z = near_z;
    }

    pub fn near_z(&self) -> f32 {
        self.state.read().near_z
    }

    pub fn set_far_z(&self, far_z: f32) {
        self.state.write().far_z = far_z;
    }

    pub fn far_z(&self) -> f32 {
        self.state.read().far_z
    }

    /// Vertical field of view in degrees.
    pub fn set_fov(&self, fov: f32) {
        self.state.write().fov = fov;
    }

    pub fn fov(&self) -> f32 {
        self.state.read().fov
    }

    /// Field of view derived from focal length and sensor size, both in
    /// millimeters.
    pub fn set_fov_from_focal_length(&self, focal_length: f32, sensor_size: f32) {
        let fov = 2.0 * (sensor_size / (2.0 * focal_length)).atan();
        self.state.write().fov = fov.to_degrees();
    }

    pub fn set_dof_enabled(&self, enabled: bool) {
        self.state.write().dof_enabled = enabled;
    }

    pub fn dof_enabled(&self) -> bool {
        self.state.read().dof_enabled
    }

    pub fn set_focal_distance(&self, focal_distance: f32) {
        self.state.write().focal_distance = focal_distance;
    }

    pub fn focal_distance(&self) -> f32 {
        self.state.read().focal_distance
    }

    pub fn set_aperture_size(&self, size: f32) {
        self.state.write().aperture_size = size;
    }

    pub fn aperture_size(&self) -> f32 {
        self.state.read().aperture_size
    }

    /// Aperture radius computed from an f-stop at the given focal length
    /// (millimeters).
    pub fn set_aperture_size_from_fstop(&self, fstop: f32, focal_length: f32) {
        let size = if fstop > 0.0 {
            focal_length / (2.0 * fstop)
        } else {
            0.0
        };
        self.state.write().aperture_size = size;
    }

    pub fn set_bokeh_ratio(&self, ratio: f32) {
        self.state.write().aperture_ratio = ratio;
    }

    pub fn bokeh_ratio(&self) -> f32 {
        self.state.read().aperture_ratio
    }

    pub fn set_blade_count(&self, count: u32) {
        self.state.write().blade_count = count;
    }

    pub fn blade_count(&self) -> u32 {
        self.state.read().blade_count
    }

    pub fn set_blades_rotation(&self, rotation: f32) {
        self.state.write().blades_rotation = rotation;
    }

    pub fn blades_rotation(&self) -> f32 {
        self.state.read().blades_rotation
    }

    pub fn set_stereoscopic(&self, stereoscopic: bool) {
        self.state.write().stereoscopic = stereoscopic;
    }

    /// Whether stereoscopic output was requested and the projection supports
    /// it.
    pub fn is_stereoscopic(&self) -> bool {
        let state = self.state.read();
        state.stereoscopic && state.camera_type == CameraType::Panorama
    }

    pub fn stereoscopic_flag(&self) -> bool {
        self.state.read().stereoscopic
    }

    pub fn set_interocular_distance(&self, distance: f32) {
        self.state.write().interocular_distance = distance;
    }

    pub fn interocular_distance(&self) -> f32 {
        self.state.read().interocular_distance
    }

    pub fn set_equirectangular_horizontal_range(&self, min: f32, max: f32) {
        let mut state = self.state.write();
        state.longitude_min = min;
        state.longitude_max = max;
    }

    pub fn set_equirectangular_vertical_range(&self, min: f32, max: f32) {
        let mut state = self.state.write();
        state.latitude_min = min;
        state.latitude_max = max;
    }

    pub fn equirectangular_horizontal_range(&self) -> (f32, f32) {
        let state = self.state.read();
        (state.longitude_min, state.longitude_max)
    }

    pub fn equirectangular_vertical_range(&self) -> (f32, f32) {
        let state = self.state.read();
        (state.latitude_min, state.latitude_max)
    }

    pub fn set_shutter_time(&self, time_in_frames: f32) {
        self.state.write().shutter_time = time_in_frames;
    }

    pub fn shutter_time(&self) -> f32 {
        self.state.read().shutter_time
    }

    pub fn set_rolling_shutter_enabled(&self, enabled: bool) {
        self.state.write().rolling_shutter_enabled = enabled;
    }

    pub fn rolling_shutter_enabled(&self) -> bool {
        self.state.read().rolling_shutter_enabled
    }

    pub fn set_rolling_shutter_duration(&self, duration: f32) {
        self.state.write().rolling_shutter_duration = duration;
    }

    pub fn rolling_shutter_duration(&self) -> f32 {
        self.state.read().rolling_shutter_duration
    }

    pub fn serialize(&self, w: &mut BlobWriter) {
        self.world.serialize(w);
        let state = self.state.read();
        w.write_u8(state.camera_type as u8);
        w.write_u8(state.panorama_type as u8);
        w.write_u32(state.width);
        w.write_u32(state.height);
        w.write_f32(state.near_z);
        w.write_f32(state.far_z);
        w.write_f32(state.fov);
        w.write_f32(state.focal_distance);
        w.write_f32(state.aperture_size);
        w.write_f32(state.aperture_ratio);
        w.write_u32(state.blade_count);
        w.write_f32(state.blades_rotation);
        w.write_bool(state.dof_enabled);
        w.write_bool(state.stereoscopic);
        w.write_f32(state.interocular_distance);
        w.write_f32(state.longitude_min);
        w.write_f32(state.longitude_max);
        w.write_f32(state.latitude_min);
        w.write_f32(state.latitude_max);
        w.write_f32(state.shutter_time);
        w.write_bool(state.rolling_shutter_enabled);
        w.write_f32(state.rolling_shutter_duration);
    }

    pub fn deserialize(&self, r: &mut BlobReader<'_>) -> Result<(), CodecError> {
        self.world.deserialize(r)?;
        let mut state = self.state.write();
        let raw_type = r.read_u8()?;
        state.camera_type = match raw_type {
            0 => CameraType::Perspective,
            1 => CameraType::Orthographic,
            2 => CameraType::Panorama,
            _ => {
                return Err(CodecError::InvalidDiscriminant {
                    ty: "CameraType",
                    value: raw_type as u32,
                })
            }
        };
        let raw_pano = r.read_u8()?;
        state.panorama_type = match raw_pano {
            0 => PanoramaType::Equirectangular,
            1 => PanoramaType::FisheyeEquidistant,
            2 => PanoramaType::FisheyeEquisolid,
            3 => PanoramaType::Mirrorball,
            _ => {
                return Err(CodecError::InvalidDiscriminant {
                    ty: "PanoramaType",
                    value: raw_pano as u32,
                })
            }
        };
        state.width = r.read_u32()?;
        state.height = r.read_u32()?;
        state.near_z = r.read_f32()?;
        state.far_z = r.read_f32()?;
        state.fov = r.read_f32()?;
        state.focal_distance = r.read_f32()?;
        state.aperture_size = r.read_f32()?;
        state.aperture_ratio = r.read_f32()?;
        state.blade_count = r.read_u32()?;
        state.blades_rotation = r.read_f32()?;
        state.dof_enabled = r.read_bool()?;
        state.stereoscopic = r.read_bool()?;
        state.interocular_distance = r.read_f32()?;
        state.longitude_min = r.read_f32()?;
        state.longitude_max = r.read_f32()?;
        state.latitude_min = r.read_f32()?;
        state.latitude_max = r.read_f32()?;
        state.shutter_time = r.read_f32()?;
        state.rolling_shutter_enabled = r.read_bool()?;
        state.rolling_shutter_duration = r.read_f32()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_round_trip() {
        let cam = Camera::new();
        cam.set_resolution(640, 480);
        cam.set_camera_type(CameraType::Panorama);
        cam.set_panorama_type(PanoramaType::FisheyeEquisolid);
        cam.set_fov(70.0);
        cam.set_dof_enabled(true);
        cam.set_aperture_size_from_fstop(2.8, 50.0);

        let mut w = BlobWriter::new();
        cam.serialize(&mut w);
        let blob = w.finish();

        let restored = Camera::new();
        restored.deserialize(&mut BlobReader::new(&blob)).unwrap();
        assert_eq!(*restored.state.read(), *cam.state.read());
        assert_eq!(restored.world().uuid(), cam.world().uuid());
    }

    #[test]
    fn aspect_ratio() {
        let cam = Camera::new();
        cam.set_resolution(640, 480);
        assert!((cam.aspect_ratio() - 4.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn stereoscopic_requires_panorama() {
        let cam = Camera::new();
        cam.set_stereoscopic(true);
        assert!(!cam.is_stereoscopic());
        cam.set_camera_type(CameraType::Panorama);
        assert!(cam.is_stereoscopic());
    }
}
