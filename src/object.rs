//! Mesh instances placed in the world.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    codec::{BlobReader, BlobWriter},
    hash::ContentHash,
    math::Transform,
    mesh::{Mesh, MeshError},
    world_object::{Uuid, WorldObject},
};

#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("Object references mesh that is not part of the cache")]
    MeshNotInCache,

    #[error("Serialized object references unknown mesh index {index}")]
    UnknownMeshIndex { index: u32 },

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Codec(#[from] crate::codec::CodecError),
}

struct ObjectState {
    name: String,
    motion_pose: Transform,
    hash: Option<ContentHash>,
}

/// A posed instance of a mesh.
pub struct Object {
    world: WorldObject,
    mesh: Arc<Mesh>,
    state: RwLock<ObjectState>,
}

impl std::fmt::Debug for Object {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Object")
            .field("name", &self.name())
            .field("mesh", &self.mesh.name())
            .finish()
    }
}

impl Object {
    pub fn new(mesh: Arc<Mesh>) -> Arc<Object> {
        let object = Arc::new(Object {
            world: WorldObject::new(),
            mesh,
            state: RwLock::new(ObjectState {
                name: String::new(),
                motion_pose: Transform::IDENTITY,
                hash: None,
            }),
        });
        object.world.set_uuid(Uuid::generate());
        object
    }

    pub fn world(&self) -> &WorldObject {
        &self.world
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.state.write().name = name.into();
    }

    /// Pose at the previous frame, used for motion blur.
    pub fn motion_pose(&self) -> Transform {
        self.state.read().motion_pose
    }

    pub fn set_motion_pose(&self, pose: Transform) {
        self.state.write().motion_pose = pose;
    }

    pub fn hash(&self) -> Option<ContentHash> {
        self.state.read().hash
    }

    pub(crate) fn set_hash(&self, hash: ContentHash) {
        self.state.write().hash = Some(hash);
    }

    /// Serializes pose, name and the mesh as an index into the owning chunk.
    pub fn serialize(
        &self,
        w: &mut BlobWriter,
        mesh_index_of: &dyn Fn(&Arc<Mesh>) -> Option<u32>,
    ) -> Result<(), ObjectError> {
        self.world.serialize(w);
        let state = self.state.read();
        state.motion_pose.write(w);
        w.write_string(&state.name);
        drop(state);
        let mesh_index = mesh_index_of(&self.mesh).ok_or(ObjectError::MeshNotInCache)?;
        w.write_u32(mesh_index);
        Ok(())
    }

    pub fn deserialize(
        r: &mut BlobReader<'_>,
        mesh_of: &dyn Fn(u32) -> Option<Arc<Mesh>>,
    ) -> Result<Arc<Object>, ObjectError> {
        let world = WorldObject::new();
        world.deserialize(r)?;
        let motion_pose = Transform::read(r)?;
        let name = r.read_string()?;
        let mesh_index = r.read_u32()?;
        let mesh = mesh_of(mesh_index).ok_or(ObjectError::UnknownMeshIndex { index: mesh_index })?;
        let object = Arc::new(Object {
            world,
            mesh,
            state: RwLock::new(ObjectState {
                name,
                motion_pose,
                hash: None,
            }),
        });
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        math::{Quat, Vec3},
        mesh::MeshFlags,
    };

    #[test]
    fn serialization_round_trip() {
        let mesh = Mesh::new("m", 0, 0, MeshFlags::empty());
        let obj = Object::new(mesh.clone());
        obj.set_name("chair");
        obj.world().set_pos(Vec3::new(4.0, 5.0, 6.0));
        obj.world().set_rotation(Quat::from_rotation_x(0.25));

        let mut w = BlobWriter::new();
        obj.serialize(&mut w, &|_| Some(0)).unwrap();
        let blob = w.finish();

        let restored =
            Object::deserialize(&mut BlobReader::new(&blob), &|_| Some(mesh.clone())).unwrap();
        assert_eq!(restored.name(), "chair");
        assert_eq!(restored.world().pose(), obj.world().pose());
        assert_eq!(restored.world().uuid(), obj.world().uuid());
    }

    #[test]
    fn unknown_mesh_index_fails() {
        let mesh = Mesh::new("m", 0, 0, MeshFlags::empty());
        let obj = Object::new(mesh);
        let mut w = BlobWriter::new();
        obj.serialize(&mut w, &|_| Some(3)).unwrap();
        let blob = w.finish();
        let result = Object::deserialize(&mut BlobReader::new(&blob), &|_| None);
        assert!(matches!(
            result,
            Err(ObjectError::UnknownMeshIndex { index: 3 })
        ));
    }
}
