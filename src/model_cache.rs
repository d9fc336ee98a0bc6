//! Content-addressed caches of shaders, meshes and objects.
//!
//! A cache chunk can hold its contents in two representations: live
//! (editable `Mesh`/`Object` handles) and baked (immutable blobs stamped
//! with a content hash). Baking is what makes scene hand-off to a renderer
//! and on-disk serialization cheap and deterministic.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::{
    codec::{BlobReader, BlobWriter, CodecError},
    hash::{murmur3, ContentHash},
    mesh::{Mesh, MeshError},
    node::{GraphError, NodeManager},
    object::{Object, ObjectError},
    scene::{MIN_SERIALIZATION_VERSION, SERIALIZATION_VERSION},
    shader::Shader,
};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Unsupported cache version {version} (supported: {min}..={max})")]
    UnsupportedVersion { version: u32, min: u32, max: u32 },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

fn check_version(version: u32) -> Result<(), CacheError> {
    if version < MIN_SERIALIZATION_VERSION || version > SERIALIZATION_VERSION {
        return Err(CacheError::UnsupportedVersion {
            version,
            min: MIN_SERIALIZATION_VERSION,
            max: SERIALIZATION_VERSION,
        });
    }
    Ok(())
}

/// Insertion-ordered shader collection with stable indices.
pub struct ShaderCache {
    shaders: RwLock<Vec<Arc<Shader>>>,
}

impl std::fmt::Debug for ShaderCache {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("ShaderCache")
            .field("shaders", &self.shaders.read().len())
            .finish()
    }
}

impl ShaderCache {
    pub fn new() -> Arc<ShaderCache> {
        Arc::new(ShaderCache {
            shaders: RwLock::new(Vec::new()),
        })
    }

    pub fn shaders(&self) -> Vec<Arc<Shader>> {
        self.shaders.read().clone()
    }

    pub fn len(&self) -> usize {
        self.shaders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.read().is_empty()
    }

    pub fn add_shader(&self, shader: Arc<Shader>) -> usize {
        let mut shaders = self.shaders.write();
        shaders.push(shader);
        shaders.len() - 1
    }

    pub fn shader(&self, idx: u32) -> Option<Arc<Shader>> {
        self.shaders.read().get(idx as usize).cloned()
    }

    pub fn merge(&self, other: &ShaderCache) {
        let other_shaders = other.shaders.read().clone();
        self.shaders.write().extend(other_shaders);
    }

    /// Inverse of the index order: shader pointer to index.
    pub fn shader_to_index_table(&self) -> HashMap<usize, usize> {
        self.shaders
            .read()
            .iter()
            .enumerate()
            .map(|(i, s)| (Arc::as_ptr(s) as usize, i))
            .collect()
    }

    pub fn index_of(&self, shader: &Arc<Shader>) -> Option<u32> {
        self.shaders
            .read()
            .iter()
            .position(|s| Arc::ptr_eq(s, shader))
            .map(|i| i as u32)
    }

    /// Layout: `version u32 | count u32 | shader*`.
    pub fn serialize(&self, w: &mut BlobWriter) -> Result<(), CacheError> {
        w.write_u32(SERIALIZATION_VERSION);
        let shaders = self.shaders.read().clone();
        w.write_u32(shaders.len() as u32);
        for shader in &shaders {
            shader.serialize(w)?;
        }
        Ok(())
    }

    pub fn deserialize(
        r: &mut BlobReader<'_>,
        manager: &Arc<NodeManager>,
    ) -> Result<Arc<ShaderCache>, CacheError> {
        let version = r.read_u32()?;
        check_version(version)?;
        let cache = ShaderCache::new();
        let count = r.read_u32()? as usize;
        for _ in 0..count {
            let shader = Shader::deserialize(r, manager)?;
            cache.add_shader(shader);
        }
        Ok(cache)
    }
}

bitflags::bitflags! {
    pub struct ChunkFlags: u8 {
        const HAS_BAKED_DATA = 0b01;
        const HAS_UNBAKED_DATA = 0b10;
    }
}

struct ChunkState {
    flags: ChunkFlags,
    objects: Vec<Arc<Object>>,
    meshes: Vec<Arc<Mesh>>,
    baked_objects: Vec<Vec<u8>>,
    baked_meshes: Vec<Vec<u8>>,
    serialization_version: u32,
}

/// A bundle of meshes and objects sharing one shader cache.
pub struct ModelCacheChunk {
    shader_cache: Arc<ShaderCache>,
    state: RwLock<ChunkState>,
}

impl std::fmt::Debug for ModelCacheChunk {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        fmt.debug_struct("ModelCacheChunk")
            .field("flags", &state.flags)
            .field("meshes", &state.meshes.len())
            .field("objects", &state.objects.len())
            .finish()
    }
}

impl ModelCacheChunk {
    /// Seed of the content hash appended to every baked blob.
    pub const MURMUR_SEED: u32 = 195_574;

    pub fn new(shader_cache: Arc<ShaderCache>) -> Arc<ModelCacheChunk> {
        Arc::new(ModelCacheChunk {
            shader_cache,
            state: RwLock::new(ChunkState {
                flags: ChunkFlags::HAS_UNBAKED_DATA,
                objects: Vec::new(),
                meshes: Vec::new(),
                baked_objects: Vec::new(),
                baked_meshes: Vec::new(),
                serialization_version: SERIALIZATION_VERSION,
            }),
        })
    }

    pub fn shader_cache(&self) -> &Arc<ShaderCache> {
        &self.shader_cache
    }

    pub fn flags(&self) -> ChunkFlags {
        self.state.read().flags
    }

    pub fn meshes(&self) -> Vec<Arc<Mesh>> {
        self.state.read().meshes.clone()
    }

    pub fn objects(&self) -> Vec<Arc<Object>> {
        self.state.read().objects.clone()
    }

    pub fn mesh(&self, idx: u32) -> Option<Arc<Mesh>> {
        self.state.read().meshes.get(idx as usize).cloned()
    }

    pub fn object(&self, idx: u32) -> Option<Arc<Object>> {
        self.state.read().objects.get(idx as usize).cloned()
    }

    pub fn baked_object_data(&self) -> Vec<Vec<u8>> {
        self.state.read().baked_objects.clone()
    }

    pub fn baked_mesh_data(&self) -> Vec<Vec<u8>> {
        self.state.read().baked_meshes.clone()
    }

    pub fn mesh_to_index_table(&self) -> HashMap<usize, usize> {
        self.state
            .read()
            .meshes
            .iter()
            .enumerate()
            .map(|(i, m)| (Arc::as_ptr(m) as usize, i))
            .collect()
    }

    /// Adds a mesh, invalidating any baked state.
    pub fn add_mesh(&self, mesh: Arc<Mesh>) -> Result<usize, CacheError> {
        self.unbake()?;
        let mut state = self.state.write();
        state.meshes.push(mesh);
        Ok(state.meshes.len() - 1)
    }

    /// Adds an object, invalidating any baked state.
    pub fn add_object(&self, object: Arc<Object>) -> Result<usize, CacheError> {
        self.unbake()?;
        let mut state = self.state.write();
        state.objects.push(object);
        Ok(state.objects.len() - 1)
    }

    pub fn remove_mesh(&self, mesh: &Arc<Mesh>) {
        let mut state = self.state.write();
        if let Some(pos) = state.meshes.iter().position(|m| Arc::ptr_eq(m, mesh)) {
            state.meshes.remove(pos);
        }
    }

    pub fn remove_object(&self, object: &Arc<Object>) {
        let mut state = self.state.write();
        if let Some(pos) = state.objects.iter().position(|o| Arc::ptr_eq(o, object)) {
            state.objects.remove(pos);
        }
    }

    /// Serializes every object and mesh into its own blob, appends the
    /// content hash of the serialized bytes and stamps it onto the live
    /// handle. Idempotent while baked data exists.
    pub fn bake(&self) -> Result<(), CacheError> {
        if self.flags().contains(ChunkFlags::HAS_BAKED_DATA) {
            return Ok(());
        }
        let (objects, meshes) = {
            let state = self.state.read();
            (state.objects.clone(), state.meshes.clone())
        };

        let mesh_table = self.mesh_to_index_table();
        let mesh_index_of =
            |mesh: &Arc<Mesh>| mesh_table.get(&(Arc::as_ptr(mesh) as usize)).map(|&i| i as u32);
        let mut baked_objects = Vec::with_capacity(objects.len());
        for object in &objects {
            let mut w = BlobWriter::new();
            object.serialize(&mut w, &mesh_index_of)?;
            let mut blob = w.finish();
            let hash = murmur3(&blob, Self::MURMUR_SEED);
            blob.extend_from_slice(hash.as_bytes());
            object.set_hash(hash);
            baked_objects.push(blob);
        }

        let shader_table = self.shader_cache.shader_to_index_table();
        let shader_index_of = |shader: &Arc<Shader>| {
            shader_table
                .get(&(Arc::as_ptr(shader) as usize))
                .map(|&i| i as u32)
        };
        let mut baked_meshes = Vec::with_capacity(meshes.len());
        for mesh in &meshes {
            let mut w = BlobWriter::new();
            mesh.serialize(&mut w, &shader_index_of)?;
            let mut blob = w.finish();
            let hash = murmur3(&blob, Self::MURMUR_SEED);
            blob.extend_from_slice(hash.as_bytes());
            mesh.set_hash(hash);
            baked_meshes.push(blob);
        }

        let mut state = self.state.write();
        state.baked_objects = baked_objects;
        state.baked_meshes = baked_meshes;
        state.flags |= ChunkFlags::HAS_BAKED_DATA;
        Ok(())
    }

    /// Rebuilds live meshes and objects from the baked blobs. Mesh shader
    /// indices are forwarded through the chunk's shader cache.
    pub fn generate_unbaked_data(&self, force: bool) -> Result<(), CacheError> {
        if self.flags().contains(ChunkFlags::HAS_UNBAKED_DATA) && !force {
            return Ok(());
        }
        let (baked_meshes, baked_objects) = {
            let state = self.state.read();
            (state.baked_meshes.clone(), state.baked_objects.clone())
        };

        let shader_cache = self.shader_cache.clone();
        let mut meshes = Vec::with_capacity(baked_meshes.len());
        for blob in &baked_meshes {
            let mut r = BlobReader::new(blob);
            let mesh = Mesh::deserialize(&mut r, &|idx| shader_cache.shader(idx))?;
            let hash_bytes: [u8; 16] = r
                .read_bytes(ContentHash::SIZE)?
                .try_into()
                .map_err(|_| CodecError::UnexpectedEof {
                    needed: ContentHash::SIZE,
                    remaining: 0,
                })?;
            mesh.set_hash(ContentHash::from_bytes(hash_bytes));
            meshes.push(mesh);
        }

        let mut objects = Vec::with_capacity(baked_objects.len());
        for blob in &baked_objects {
            let mut r = BlobReader::new(blob);
            let object = Object::deserialize(&mut r, &|idx| meshes.get(idx as usize).cloned())?;
            let hash_bytes: [u8; 16] = r
                .read_bytes(ContentHash::SIZE)?
                .try_into()
                .map_err(|_| CodecError::UnexpectedEof {
                    needed: ContentHash::SIZE,
                    remaining: 0,
                })?;
            object.set_hash(ContentHash::from_bytes(hash_bytes));
            objects.push(object);
        }

        let mut state = self.state.write();
        state.meshes = meshes;
        state.objects = objects;
        state.flags |= ChunkFlags::HAS_UNBAKED_DATA;
        Ok(())
    }

    /// Drops the baked representation, regenerating live data first if it is
    /// the only one present.
    fn unbake(&self) -> Result<(), CacheError> {
        if !self.flags().contains(ChunkFlags::HAS_BAKED_DATA) {
            return Ok(());
        }
        if !self.flags().contains(ChunkFlags::HAS_UNBAKED_DATA) {
            self.generate_unbaked_data(false)?;
        }
        let mut state = self.state.write();
        state.baked_objects.clear();
        state.baked_meshes.clear();
        state.flags.remove(ChunkFlags::HAS_BAKED_DATA);
        Ok(())
    }

    /// Layout: `version u32 | shader cache | baked objects | baked meshes`,
    /// each list framed as `count u32 | (size u64, bytes)*`.
    pub fn serialize(&self, w: &mut BlobWriter) -> Result<(), CacheError> {
        self.bake()?;
        w.write_u32(SERIALIZATION_VERSION);
        self.shader_cache.serialize(w)?;
        let state = self.state.read();
        let write_list = |w: &mut BlobWriter, list: &[Vec<u8>]| {
            w.write_u32(list.len() as u32);
            for blob in list {
                w.write_u64(blob.len() as u64);
                w.write_bytes(blob);
            }
        };
        write_list(w, &state.baked_objects);
        write_list(w, &state.baked_meshes);
        Ok(())
    }

    pub fn deserialize(
        r: &mut BlobReader<'_>,
        manager: &Arc<NodeManager>,
    ) -> Result<Arc<ModelCacheChunk>, CacheError> {
        let version = r.read_u32()?;
        check_version(version)?;
        let shader_cache = ShaderCache::deserialize(r, manager)?;
        let read_list = |r: &mut BlobReader<'_>| -> Result<Vec<Vec<u8>>, CodecError> {
            let count = r.read_u32()? as usize;
            let mut list = Vec::with_capacity(count);
            for _ in 0..count {
                let size = r.read_u64()? as usize;
                list.push(r.read_bytes(size)?.to_vec());
            }
            Ok(list)
        };
        let baked_objects = read_list(r)?;
        let baked_meshes = read_list(r)?;
        Ok(Arc::new(ModelCacheChunk {
            shader_cache,
            state: RwLock::new(ChunkState {
                flags: ChunkFlags::HAS_BAKED_DATA,
                objects: Vec::new(),
                meshes: Vec::new(),
                baked_objects,
                baked_meshes,
                serialization_version: version,
            }),
        }))
    }

    pub fn serialization_version(&self) -> u32 {
        self.state.read().serialization_version
    }
}

/// Ordered collection of cache chunks.
pub struct ModelCache {
    chunks: RwLock<Vec<Arc<ModelCacheChunk>>>,
    unique: RwLock<bool>,
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("ModelCache")
            .field("chunks", &self.chunks.read().len())
            .finish()
    }
}

impl ModelCache {
    pub fn new() -> Arc<ModelCache> {
        Arc::new(ModelCache {
            chunks: RwLock::new(Vec::new()),
            unique: RwLock::new(false),
        })
    }

    /// Unique caches are copied rather than shared when merged into a scene.
    pub fn set_unique(&self, unique: bool) {
        *self.unique.write() = unique;
    }

    pub fn is_unique(&self) -> bool {
        *self.unique.read()
    }

    pub fn chunks(&self) -> Vec<Arc<ModelCacheChunk>> {
        self.chunks.read().clone()
    }

    pub fn add_chunk(&self, shader_cache: Arc<ShaderCache>) -> Arc<ModelCacheChunk> {
        let chunk = ModelCacheChunk::new(shader_cache);
        self.chunks.write().push(chunk.clone());
        chunk
    }

    pub fn merge(&self, other: &ModelCache) {
        let other_chunks = other.chunks.read().clone();
        self.chunks.write().extend(other_chunks);
    }

    pub fn bake(&self) -> Result<(), CacheError> {
        for chunk in self.chunks() {
            chunk.bake()?;
        }
        Ok(())
    }

    /// Regenerates live data in every chunk.
    pub fn generate_data(&self) -> Result<(), CacheError> {
        for chunk in self.chunks() {
            chunk.generate_unbaked_data(true)?;
        }
        Ok(())
    }

    pub fn serialize(&self, w: &mut BlobWriter) -> Result<(), CacheError> {
        self.bake()?;
        w.write_u32(SERIALIZATION_VERSION);
        let chunks = self.chunks();
        w.write_u32(chunks.len() as u32);
        for chunk in &chunks {
            chunk.serialize(w)?;
        }
        Ok(())
    }

    pub fn deserialize(
        r: &mut BlobReader<'_>,
        manager: &Arc<NodeManager>,
    ) -> Result<Arc<ModelCache>, CacheError> {
        let version = r.read_u32()?;
        check_version(version)?;
        let cache = ModelCache::new();
        let count = r.read_u32()? as usize;
        for _ in 0..count {
            let chunk = ModelCacheChunk::deserialize(r, manager)?;
            cache.chunks.write().push(chunk);
        }
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        math::{Quat, Vec2, Vec3, Vec4},
        mesh::MeshFlags,
    };

    fn triangle_mesh(shader: &Arc<Shader>) -> Arc<Mesh> {
        let mesh = Mesh::new("tri", 3, 1, MeshFlags::empty());
        let t = Vec4::new(1.0, 0.0, 0.0, 1.0);
        mesh.add_vertex(Vec3::new(0.0, 0.0, 0.0), Vec3::Z, t, Vec2::new(0.0, 0.0));
        mesh.add_vertex(Vec3::new(1.0, 0.0, 0.0), Vec3::Z, t, Vec2::new(1.0, 0.0));
        mesh.add_vertex(Vec3::new(0.0, 1.0, 0.0), Vec3::Z, t, Vec2::new(0.0, 1.0));
        mesh.add_sub_mesh_shader(shader.clone());
        mesh.add_triangle(0, 1, 2, 0);
        mesh
    }

    fn sample_chunk() -> (Arc<ModelCacheChunk>, Arc<Mesh>, Arc<Object>) {
        let shader_cache = ShaderCache::new();
        let shader = Shader::new();
        shader_cache.add_shader(shader.clone());
        let chunk = ModelCacheChunk::new(shader_cache);
        let mesh = triangle_mesh(&shader);
        let object = Object::new(mesh.clone());
        object.set_name("tri_object");
        object.world().set_pos(Vec3::new(1.0, 2.0, 3.0));
        object.world().set_rotation(Quat::from_rotation_y(0.7));
        chunk.add_mesh(mesh.clone()).unwrap();
        chunk.add_object(object.clone()).unwrap();
        (chunk, mesh, object)
    }

    #[test]
    fn bake_round_trip_preserves_content() {
        let (chunk, mesh, object) = sample_chunk();
        chunk.bake().unwrap();
        assert!(chunk.flags().contains(ChunkFlags::HAS_BAKED_DATA));
        let mesh_hash = mesh.hash().unwrap();

        chunk.generate_unbaked_data(true).unwrap();
        let restored_mesh = chunk.mesh(0).unwrap();
        let restored_object = chunk.object(0).unwrap();

        assert_eq!(&*restored_mesh.vertices(), &*mesh.vertices());
        assert_eq!(&*restored_mesh.triangles(), &*mesh.triangles());
        assert_eq!(restored_mesh.origin_shader_index_table(), vec![0]);
        assert!(Arc::ptr_eq(
            &restored_mesh.sub_mesh_shaders()[0],
            &chunk.shader_cache().shader(0).unwrap()
        ));
        assert_eq!(restored_mesh.hash().unwrap(), mesh_hash);
        assert_eq!(restored_object.name(), object.name());
        assert_eq!(restored_object.world().pose(), object.world().pose());
    }

    #[test]
    fn baked_hash_matches_serialized_bytes() {
        let (chunk, mesh, _) = sample_chunk();
        chunk.bake().unwrap();
        let blob = chunk.baked_mesh_data()[0].clone();
        let payload = &blob[..blob.len() - ContentHash::SIZE];
        let expected = murmur3(payload, ModelCacheChunk::MURMUR_SEED);
        assert_eq!(mesh.hash().unwrap(), expected);
        assert_eq!(&blob[blob.len() - ContentHash::SIZE..], expected.as_bytes());
    }

    #[test]
    fn bake_is_idempotent() {
        let (chunk, _, _) = sample_chunk();
        chunk.bake().unwrap();
        let first = chunk.baked_mesh_data();
        chunk.bake().unwrap();
        assert_eq!(chunk.baked_mesh_data(), first);
    }

    #[test]
    fn adding_invalidates_baked_state() {
        let (chunk, _, _) = sample_chunk();
        chunk.bake().unwrap();
        let shader = chunk.shader_cache().shader(0).unwrap();
        chunk.add_mesh(triangle_mesh(&shader)).unwrap();
        assert!(!chunk.flags().contains(ChunkFlags::HAS_BAKED_DATA));
        assert!(chunk.baked_mesh_data().is_empty());
        assert_eq!(chunk.meshes().len(), 2);
    }

    #[test]
    fn cache_serialization_round_trip() {
        let (chunk, _, _) = sample_chunk();
        let cache = ModelCache::new();
        cache.chunks.write().push(chunk);

        let mut w = BlobWriter::new();
        cache.serialize(&mut w).unwrap();
        let blob = w.finish();

        let manager = NodeManager::new();
        let restored = ModelCache::deserialize(&mut BlobReader::new(&blob), &manager).unwrap();
        assert_eq!(restored.chunks().len(), 1);
        let chunk = &restored.chunks()[0];
        assert!(chunk.flags().contains(ChunkFlags::HAS_BAKED_DATA));
        chunk.generate_unbaked_data(true).unwrap();
        assert_eq!(chunk.meshes().len(), 1);
        assert_eq!(chunk.objects().len(), 1);
        assert_eq!(chunk.objects()[0].name(), "tri_object");
    }

    #[test]
    fn old_version_is_refused() {
        let mut w = BlobWriter::new();
        w.write_u32(2);
        w.write_u32(0);
        let blob = w.finish();
        let manager = NodeManager::new();
        let result = ModelCache::deserialize(&mut BlobReader::new(&blob), &manager);
        assert!(matches!(
            result,
            Err(CacheError::UnsupportedVersion { version: 2, .. })
        ));
    }

    #[test]
    fn shader_cache_index_table() {
        let cache = ShaderCache::new();
        let a = Shader::new();
        let b = Shader::new();
        cache.add_shader(a.clone());
        cache.add_shader(b.clone());
        assert_eq!(cache.index_of(&a), Some(0));
        assert_eq!(cache.index_of(&b), Some(1));
        let table = cache.shader_to_index_table();
        assert_eq!(table[&(Arc::as_ptr(&b) as usize)], 1);
    }

    #[test]
    fn model_cache_merge_appends_chunks() {
        let (chunk_a, _, _) = sample_chunk();
        let (chunk_b, _, _) = sample_chunk();
        let a = ModelCache::new();
        let b = ModelCache::new();
        a.chunks.write().push(chunk_a);
        b.chunks.write().push(chunk_b);
        a.merge(&b);
        assert_eq!(a.chunks().len(), 2);
    }
}
