//! Renderer-independent light description.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    codec::{BlobReader, BlobWriter, CodecError},
    math::Vec3,
    world_object::{Uuid, WorldObject},
};

/// Luminous flux in lumen.
pub type Lumen = f32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum LightType {
    Point = 0,
    Spot,
    Directional,

    Area,
    Background,
    Triangle,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct LightState {
    light_type: LightType,
    color: Vec3,
    intensity: Lumen,
    size: f32,
    /// Spot outer cone angle in degrees.
    outer_cone_angle: f32,
    /// Inner-to-outer blend fraction for spots.
    blend_fraction: f32,
    axis_u: Vec3,
    axis_v: Vec3,
    size_u: f32,
    size_v: f32,
    round: bool,
}

impl Default for LightState {
    fn default() -> Self {
        LightState {
            light_type: LightType::Point,
            color: Vec3::ONE,
            intensity: 1_600.0,
            size: 1.0,
            outer_cone_angle: 0.0,
            blend_fraction: 0.0,
            axis_u: Vec3::ZERO,
            axis_v: Vec3::ZERO,
            size_u: 1.0,
            size_v: 1.0,
            round: false,
        }
    }
}

pub struct Light {
    world: WorldObject,
    state: RwLock<LightState>,
}

impl std::fmt::Debug for Light {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        fmt.debug_struct("Light")
            .field("type", &state.light_type)
            .field("intensity", &state.intensity)
            .finish()
    }
}

impl Light {
    pub fn new() -> Arc<Light> {
        let light = Arc::new(Light {
            world: WorldObject::new(),
            state: RwLock::new(LightState::default()),
        });
        light.world.set_uuid(Uuid::generate());
        light
    }

    pub fn world(&self) -> &WorldObject {
        &self.world
    }

    pub fn set_light_type(&self, light_type: LightType) {
        self.state.write().light_type = light_type;
    }

    pub fn light_type(&self) -> LightType {
        self.state.read().light_type
    }

    pub fn set_color(&self, color: Vec3) {
        self.state.write().color = color;
    }

    pub fn color(&self) -> Vec3 {
        self.state.read().color
    }

    pub fn set_intensity(&self, intensity: Lumen) {
        self.state.write().intensity = intensity;
    }

    pub fn intensity(&self) -> Lumen {
        self.state.read().intensity
    }

    pub fn set_size(&self, size: f32) {
        self.state.write().size = size;
    }

    pub fn size(&self) -> f32 {
        self.state.read().size
    }

    /// Spot cone: outer angle in degrees, plus the inner-to-outer blend
    /// fraction.
    pub fn set_cone_angle(&self, outer_angle: f32, blend_fraction: f32) {
        let mut state = self.state.write();
        state.outer_cone_angle = outer_angle;
        state.blend_fraction = blend_fraction;
    }

    pub fn outer_cone_angle(&self) -> f32 {
        self.state.read().outer_cone_angle
    }

    pub fn blend_fraction(&self) -> f32 {
        self.state.read().blend_fraction
    }

    pub fn set_axis_u(&self, axis: Vec3) {
        self.state.write().axis_u = axis;
    }

    pub fn axis_u(&self) -> Vec3 {
        self.state.read().axis_u
    }

    pub fn set_axis_v(&self, axis: Vec3) {
        self.state.write().axis_v = axis;
    }

    pub fn axis_v(&self) -> Vec3 {
        self.state.read().axis_v
    }

    pub fn set_size_u(&self, size: f32) {
        self.state.write().size_u = size;
    }

    pub fn size_u(&self) -> f32 {
        self.state.read().size_u
    }

    pub fn set_size_v(&self, size: f32) {
        self.state.write().size_v = size;
    }

    pub fn size_v(&self) -> f32 {
        self.state.read().size_v
    }

    pub fn set_round(&self, round: bool) {
        self.state.write().round = round;
    }

    pub fn is_round(&self) -> bool {
        self.state.read().round
    }

    pub fn serialize(&self, w: &mut BlobWriter) {
        self.world.serialize(w);
        let state = self.state.read();
        w.write_u8(state.light_type as u8);
        w.write_vec3(state.color);
        w.write_f32(state.intensity);
        w.write_f32(state.size);
        w.write_f32(state.outer_cone_angle);
        w.write_f32(state.blend_fraction);
        w.write_vec3(state.axis_u);
        w.write_vec3(state.axis_v);
        w.write_f32(state.size_u);
        w.write_f32(state.size_v);
        w.write_bool(state.round);
    }

    pub fn deserialize(r: &mut BlobReader<'_>) -> Result<Arc<Light>, CodecError> {
        let world = WorldObject::new();
        world.deserialize(r)?;
        let raw = r.read_u8()?;
        let light_type = match raw {
            0 => LightType::Point,
            1 => LightType::Spot,
            2 => LightType::Directional,
            3 => LightType::Area,
            4 => LightType::Background,
            5 => LightType::Triangle,
            _ => {
                return Err(CodecError::InvalidDiscriminant {
                    ty: "LightType",
                    value: raw as u32,
                })
            }
        };
        let state = LightState {
            light_type,
            color: r.read_vec3()?,
            intensity: r.read_f32()?,
            size: r.read_f32()?,
            outer_cone_angle: r.read_f32()?,
            blend_fraction: r.read_f32()?,
            axis_u: r.read_vec3()?,
            axis_v: r.read_vec3()?,
            size_u: r.read_f32()?,
            size_v: r.read_f32()?,
            round: r.read_bool()?,
        };
        Ok(Arc::new(Light {
            world,
            state: RwLock::new(state),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_round_trip() {
        let light = Light::new();
        light.set_light_type(LightType::Spot);
        light.set_color(Vec3::new(1.0, 0.8, 0.6));
        light.set_intensity(800.0);
        light.set_cone_angle(45.0, 0.2);
        light.world().set_pos(Vec3::new(0.0, 10.0, 0.0));

        let mut w = BlobWriter::new();
        light.serialize(&mut w);
        let blob = w.finish();

        let restored = Light::deserialize(&mut BlobReader::new(&blob)).unwrap();
        assert_eq!(*restored.state.read(), *light.state.read());
        assert_eq!(restored.world().pos(), light.world().pos());
    }
}
