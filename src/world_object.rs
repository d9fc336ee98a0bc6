//! Base state shared by everything placed in a scene: a pose and a stable
//! identity.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::{
    codec::{BlobReader, BlobWriter, CodecError},
    math::{Quat, ScaledTransform, Vec3},
};

/// 128-bit scene-object identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct Uuid(pub [u64; 2]);

static UUID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

impl Uuid {
    pub const NIL: Uuid = Uuid([0, 0]);

    /// Generates a process-unique identity.
    pub fn generate() -> Uuid {
        let seed = std::time::UNIX_EPOCH
            .elapsed()
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let counter = UUID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Uuid([splitmix64(seed ^ counter), splitmix64(counter.wrapping_add(seed.rotate_left(32)))])
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0, 0]
    }

    /// Hash used for actor-map keys.
    pub fn to_hash(&self) -> u64 {
        self.0[0] ^ self.0[1].rotate_left(17)
    }

    pub(crate) fn write(&self, w: &mut BlobWriter) {
        w.write_u64(self.0[0]);
        w.write_u64(self.0[1]);
    }

    pub(crate) fn read(r: &mut BlobReader<'_>) -> Result<Uuid, CodecError> {
        Ok(Uuid([r.read_u64()?, r.read_u64()?]))
    }
}

impl std::fmt::Display for Uuid {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "{:016x}{:016x}", self.0[0], self.0[1])
    }
}

/// Posed scene entity. Cameras, lights and objects embed one.
#[derive(Debug)]
pub struct WorldObject {
    pose: RwLock<ScaledTransform>,
    uuid: RwLock<Uuid>,
}

impl Default for WorldObject {
    fn default() -> Self {
        WorldObject::new()
    }
}

impl WorldObject {
    pub fn new() -> Self {
        WorldObject {
            pose: RwLock::new(ScaledTransform::IDENTITY),
            uuid: RwLock::new(Uuid::NIL),
        }
    }

    pub fn pos(&self) -> Vec3 {
        self.pose.read().translation
    }

    pub fn set_pos(&self, pos: Vec3) {
        self.pose.write().translation = pos;
    }

    pub fn rotation(&self) -> Quat {
        self.pose.read().rotation
    }

    pub fn set_rotation(&self, rotation: Quat) {
        self.pose.write().rotation = rotation;
    }

    pub fn scale(&self) -> Vec3 {
        self.pose.read().scale
    }

    pub fn set_scale(&self, scale: Vec3) {
        self.pose.write().scale = scale;
    }

    pub fn pose(&self) -> ScaledTransform {
        *self.pose.read()
    }

    pub fn set_pose(&self, pose: ScaledTransform) {
        *self.pose.write() = pose;
    }

    pub fn uuid(&self) -> Uuid {
        *self.uuid.read()
    }

    pub fn set_uuid(&self, uuid: Uuid) {
        *self.uuid.write() = uuid;
    }

    pub(crate) fn serialize(&self, w: &mut BlobWriter) {
        self.pose().write(w);
        self.uuid().write(w);
    }

    pub(crate) fn deserialize(&self, r: &mut BlobReader<'_>) -> Result<(), CodecError> {
        self.set_pose(ScaledTransform::read(r)?);
        self.set_uuid(Uuid::read(r)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_uuids_are_unique() {
        let a = Uuid::generate();
        let b = Uuid::generate();
        assert_ne!(a, b);
        assert!(!a.is_nil());
    }

    #[test]
    fn pose_round_trip() {
        let obj = WorldObject::new();
        obj.set_pos(Vec3::new(1.0, 2.0, 3.0));
        obj.set_rotation(Quat::from_rotation_z(1.0));
        obj.set_scale(Vec3::splat(0.5));
        obj.set_uuid(Uuid::generate());

        let mut w = BlobWriter::new();
        obj.serialize(&mut w);
        let blob = w.finish();

        let restored = WorldObject::new();
        restored.deserialize(&mut BlobReader::new(&blob)).unwrap();
        assert_eq!(restored.pose(), obj.pose());
        assert_eq!(restored.uuid(), obj.uuid());
    }
}
