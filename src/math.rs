//! Math primitives shared across the scene description.

pub use glam::{Affine3A, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use crate::codec::{BlobReader, BlobWriter, CodecError};

/// Rigid pose: translation and rotation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub const IDENTITY: Self = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Transform {
            translation,
            rotation,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }

    pub(crate) fn write(&self, w: &mut BlobWriter) {
        w.write_vec3(self.translation);
        w.write_quat(self.rotation);
    }

    pub(crate) fn read(r: &mut BlobReader<'_>) -> Result<Self, CodecError> {
        Ok(Transform {
            translation: r.read_vec3()?,
            rotation: r.read_quat()?,
        })
    }
}

/// Pose with a non-uniform scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaledTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for ScaledTransform {
    fn default() -> Self {
        ScaledTransform {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl ScaledTransform {
    pub const IDENTITY: Self = ScaledTransform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        ScaledTransform {
            translation,
            rotation,
            scale,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn to_affine(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub(crate) fn write(&self, w: &mut BlobWriter) {
        w.write_vec3(self.translation);
        w.write_quat(self.rotation);
        w.write_vec3(self.scale);
    }

    pub(crate) fn read(r: &mut BlobReader<'_>) -> Result<Self, CodecError> {
        Ok(ScaledTransform {
            translation: r.read_vec3()?,
            rotation: r.read_quat()?,
            scale: r.read_vec3()?,
        })
    }
}

impl From<Transform> for ScaledTransform {
    fn from(t: Transform) -> Self {
        ScaledTransform {
            translation: t.translation,
            rotation: t.rotation,
            scale: Vec3::ONE,
        }
    }
}

pub(crate) fn write_affine(w: &mut BlobWriter, m: &Affine3A) {
    let cols = m.to_cols_array();
    for v in cols {
        w.write_f32(v);
    }
}

pub(crate) fn read_affine(r: &mut BlobReader<'_>) -> Result<Affine3A, CodecError> {
    let mut cols = [0.0f32; 12];
    for v in &mut cols {
        *v = r.read_f32()?;
    }
    Ok(Affine3A::from_cols_array(&cols))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_round_trip() {
        let pose = ScaledTransform::new(
            Vec3::new(1.0, -2.0, 3.5),
            Quat::from_rotation_y(0.5),
            Vec3::splat(2.0),
        );
        let mut w = BlobWriter::new();
        pose.write(&mut w);
        let blob = w.finish();
        let read = ScaledTransform::read(&mut BlobReader::new(&blob)).unwrap();
        assert_eq!(pose, read);
    }

    #[test]
    fn scaled_matrix_applies_scale() {
        let pose = ScaledTransform::new(Vec3::ZERO, Quat::IDENTITY, Vec3::splat(3.0));
        let p = pose.to_matrix().transform_point3(Vec3::ONE);
        assert_eq!(p, Vec3::splat(3.0));
    }
}
