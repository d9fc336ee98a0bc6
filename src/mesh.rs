//! Indexed triangle meshes in the layout backends consume directly.
//!
//! Vertex data is stored per-vertex; UVs, tangents and tangent signs are
//! additionally materialized per triangle corner when triangles are added,
//! because that is the layout attribute arrays are handed over in.

use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use crate::{
    codec::{BlobReader, BlobWriter, CodecError},
    hash::ContentHash,
    math::{Vec2, Vec3, Vec4},
    shader::Shader,
};

bitflags::bitflags! {
    pub struct MeshFlags: u8 {
        /// Per-vertex alpha channel is used for alpha blending.
        const HAS_ALPHAS = 0b01;
        /// Per-vertex alpha channel carries wrinkle-map blend factors.
        const HAS_WRINKLES = 0b10;
    }
}

/// Boolean stored as one byte per triangle.
pub type Smooth = u8;

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("Triangle index {index} is out of range (mesh has {vertex_count} vertices)")]
    TriangleIndexOutOfRange { index: u32, vertex_count: usize },

    #[error("Shader index {index} is out of range (mesh has {shader_count} shaders)")]
    ShaderIndexOutOfRange { index: u32, shader_count: usize },

    #[error("Mesh references shader that is not part of the cache")]
    ShaderNotInCache,

    #[error("Serialized mesh references unknown shader index {index}")]
    UnknownShaderIndex { index: u32 },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// One bundle of hair strands, shaded by a single sub-mesh shader.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HairStrandData {
    /// Segment count per strand.
    pub hair_segments: Vec<u32>,
    /// Control points of all strands, concatenated.
    pub points: Vec<Vec3>,
    /// Base UV per strand.
    pub uvs: Vec<Vec2>,
    /// Thickness per control point.
    pub thickness: Vec<f32>,
}

impl HairStrandData {
    fn write(&self, w: &mut BlobWriter) {
        w.write_u32_slice(&self.hair_segments);
        w.write_vec3_slice(&self.points);
        w.write_vec2_slice(&self.uvs);
        w.write_f32_slice(&self.thickness);
    }

    fn read(r: &mut BlobReader<'_>) -> Result<Self, CodecError> {
        Ok(HairStrandData {
            hair_segments: r.read_u32_vec()?,
            points: r.read_vec3_vec()?,
            uvs: r.read_vec2_vec()?,
            thickness: r.read_f32_vec()?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct HairStrandDataSet {
    pub strand_data: HairStrandData,
    pub shader_index: u32,
}

struct MeshData {
    name: String,
    flags: MeshFlags,
    num_verts: u64,
    num_tris: u64,

    verts: Vec<Vec3>,
    vertex_normals: Vec<Vec3>,
    per_vertex_uvs: Vec<Vec2>,
    per_vertex_tangents: Vec<Vec4>,
    per_vertex_tangent_signs: Vec<f32>,
    alphas: Option<Vec<f32>>,

    triangles: Vec<u32>,
    shader: Vec<u32>,
    smooth: Vec<Smooth>,

    // Corner attributes, length 3 * triangle count.
    uvs: Vec<Vec2>,
    uv_tangents: Vec<Vec3>,
    uv_tangent_signs: Vec<f32>,

    lightmap_uvs: Vec<Vec2>,
    sub_mesh_shaders: Vec<Arc<Shader>>,
    hair_strand_data_sets: Vec<HairStrandDataSet>,

    origin_shader_index_table: Vec<u32>,
    hash: Option<ContentHash>,
}

pub struct Mesh {
    data: RwLock<MeshData>,
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        fmt.debug_struct("Mesh")
            .field("name", &data.name)
            .field("verts", &data.verts.len())
            .field("tris", &(data.triangles.len() / 3))
            .field("flags", &data.flags)
            .finish()
    }
}

impl Mesh {
    /// New mesh with reserved capacity for the declared extents.
    pub fn new(name: impl Into<String>, num_verts: u64, num_tris: u64, flags: MeshFlags) -> Arc<Mesh> {
        let has_alpha_channel =
            flags.intersects(MeshFlags::HAS_ALPHAS | MeshFlags::HAS_WRINKLES);
        Arc::new(Mesh {
            data: RwLock::new(MeshData {
                name: name.into(),
                flags,
                num_verts,
                num_tris,
                verts: Vec::with_capacity(num_verts as usize),
                vertex_normals: Vec::with_capacity(num_verts as usize),
                per_vertex_uvs: Vec::with_capacity(num_verts as usize),
                per_vertex_tangents: Vec::with_capacity(num_verts as usize),
                per_vertex_tangent_signs: Vec::with_capacity(num_verts as usize),
                alphas: has_alpha_channel.then(|| Vec::with_capacity(num_verts as usize)),
                triangles: Vec::with_capacity(num_tris as usize * 3),
                shader: Vec::with_capacity(num_tris as usize),
                smooth: Vec::with_capacity(num_tris as usize),
                uvs: Vec::with_capacity(num_tris as usize * 3),
                uv_tangents: Vec::with_capacity(num_tris as usize * 3),
                uv_tangent_signs: Vec::with_capacity(num_tris as usize * 3),
                lightmap_uvs: Vec::new(),
                sub_mesh_shaders: Vec::new(),
                hair_strand_data_sets: Vec::new(),
                origin_shader_index_table: Vec::new(),
                hash: None,
            }),
        })
    }

    pub fn name(&self) -> String {
        self.data.read().name.clone()
    }

    pub fn flags(&self) -> MeshFlags {
        self.data.read().flags
    }

    pub fn has_alphas(&self) -> bool {
        self.flags().contains(MeshFlags::HAS_ALPHAS)
    }

    pub fn has_wrinkles(&self) -> bool {
        self.flags().contains(MeshFlags::HAS_WRINKLES)
    }

    pub fn vertex_count(&self) -> u64 {
        self.data.read().verts.len() as u64
    }

    pub fn triangle_count(&self) -> u64 {
        (self.data.read().triangles.len() / 3) as u64
    }

    pub fn hash(&self) -> Option<ContentHash> {
        self.data.read().hash
    }

    pub(crate) fn set_hash(&self, hash: ContentHash) {
        self.data.write().hash = Some(hash);
    }

    /// Appends one vertex. Rejected once the declared vertex budget is full.
    pub fn add_vertex(&self, pos: Vec3, normal: Vec3, tangent: Vec4, uv: Vec2) -> bool {
        let mut data = self.data.write();
        if data.verts.len() as u64 >= data.num_verts {
            return false;
        }
        data.verts.push(pos);
        data.vertex_normals.push(normal);
        data.per_vertex_uvs.push(uv);
        data.per_vertex_tangents.push(tangent);
        data.per_vertex_tangent_signs.push(tangent.w);
        true
    }

    pub fn add_alpha(&self, alpha: f32) -> bool {
        let mut data = self.data.write();
        match &mut data.alphas {
            Some(alphas) => {
                alphas.push(alpha);
                true
            }
            None => false,
        }
    }

    pub fn add_wrinkle_factor(&self, factor: f32) -> bool {
        self.add_alpha(factor)
    }

    /// Appends one triangle, swapping the second and third index to invert
    /// the winding into the convention backends expect. Corner UV/tangent
    /// data is materialized from the per-vertex arrays.
    pub fn add_triangle(&self, idx0: u32, idx1: u32, idx2: u32, shader_index: u32) -> bool {
        let mut data = self.data.write();
        let n = data.verts.len() as u32;
        if idx0 >= n || idx1 >= n || idx2 >= n {
            return false;
        }
        if data.triangles.len() as u64 >= data.num_tris * 3 {
            return false;
        }
        let corners = [idx0, idx2, idx1];
        data.triangles.extend_from_slice(&corners);
        data.shader.push(shader_index);
        data.smooth.push(1);
        for &c in &corners {
            let uv = data.per_vertex_uvs[c as usize];
            let tangent = data.per_vertex_tangents[c as usize];
            let sign = data.per_vertex_tangent_signs[c as usize];
            data.uvs.push(uv);
            data.uv_tangents.push(tangent.truncate());
            data.uv_tangent_signs.push(sign);
        }
        true
    }

    pub fn add_sub_mesh_shader(&self, shader: Arc<Shader>) -> u32 {
        let mut data = self.data.write();
        data.sub_mesh_shaders.push(shader);
        (data.sub_mesh_shaders.len() - 1) as u32
    }

    pub fn set_lightmap_uvs(&self, lightmap_uvs: Vec<Vec2>) {
        self.data.write().lightmap_uvs = lightmap_uvs;
    }

    pub fn add_hair_strand_data(&self, strand_data: HairStrandData, shader_index: u32) {
        self.data.write().hair_strand_data_sets.push(HairStrandDataSet {
            strand_data,
            shader_index,
        });
    }

    /// Checks index invariants: triangle indices within the vertex range,
    /// per-triangle shader indices within the sub-mesh shader table.
    pub fn validate(&self) -> Result<(), MeshError> {
        let data = self.data.read();
        let vertex_count = data.verts.len();
        for &idx in &data.triangles {
            if idx as usize >= vertex_count {
                return Err(MeshError::TriangleIndexOutOfRange { index: idx, vertex_count });
            }
        }
        let shader_count = data.sub_mesh_shaders.len();
        for &idx in &data.shader {
            if idx as usize >= shader_count {
                return Err(MeshError::ShaderIndexOutOfRange { index: idx, shader_count });
            }
        }
        Ok(())
    }

    /// Appends `other` onto this mesh, offsetting vertex and shader indices.
    pub fn merge(&self, other: &Mesh) {
        let other = other.data.read();
        let mut data = self.data.write();
        let vertex_offset = data.verts.len() as u32;
        let shader_offset = data.sub_mesh_shaders.len() as u32;

        data.num_verts += other.num_verts;
        data.num_tris += other.num_tris;
        data.verts.extend_from_slice(&other.verts);
        data.vertex_normals.extend_from_slice(&other.vertex_normals);
        data.per_vertex_uvs.extend_from_slice(&other.per_vertex_uvs);
        data.per_vertex_tangents
            .extend_from_slice(&other.per_vertex_tangents);
        data.per_vertex_tangent_signs
            .extend_from_slice(&other.per_vertex_tangent_signs);
        if let (Some(alphas), Some(other_alphas)) = (&mut data.alphas, &other.alphas) {
            alphas.extend_from_slice(other_alphas);
        }
        data.triangles
            .extend(other.triangles.iter().map(|&i| i + vertex_offset));
        data.shader
            .extend(other.shader.iter().map(|&i| i + shader_offset));
        data.smooth.extend_from_slice(&other.smooth);
        data.uvs.extend_from_slice(&other.uvs);
        data.uv_tangents.extend_from_slice(&other.uv_tangents);
        data.uv_tangent_signs
            .extend_from_slice(&other.uv_tangent_signs);
        data.lightmap_uvs.extend_from_slice(&other.lightmap_uvs);
        data.sub_mesh_shaders
            .extend(other.sub_mesh_shaders.iter().cloned());
        data.hair_strand_data_sets.extend(
            other
                .hair_strand_data_sets
                .iter()
                .cloned()
                .map(|mut set| {
                    set.shader_index += shader_offset;
                    set
                }),
        );
    }

    /// Recomputes corner tangents from the vertex normals. Stands in when no
    /// external tangent-space generator has run over the mesh.
    pub fn compute_tangents(&self) {
        let mut data = self.data.write();
        let mut tangents = Vec::with_capacity(data.triangles.len());
        let mut signs = Vec::with_capacity(data.triangles.len());
        for &idx in &data.triangles {
            let normal = data
                .vertex_normals
                .get(idx as usize)
                .copied()
                .unwrap_or(Vec3::Z);
            tangents.push(normal.any_orthonormal_vector());
            signs.push(1.0);
        }
        data.uv_tangents = tangents;
        data.uv_tangent_signs = signs;
    }

    // ---- accessors ----------------------------------------------------------

    fn read(&self) -> RwLockReadGuard<'_, MeshData> {
        self.data.read()
    }

    pub fn vertices(&self) -> MappedRwLockReadGuard<'_, [Vec3]> {
        RwLockReadGuard::map(self.read(), |d| d.verts.as_slice())
    }

    pub fn vertex_normals(&self) -> MappedRwLockReadGuard<'_, [Vec3]> {
        RwLockReadGuard::map(self.read(), |d| d.vertex_normals.as_slice())
    }

    pub fn triangles(&self) -> MappedRwLockReadGuard<'_, [u32]> {
        RwLockReadGuard::map(self.read(), |d| d.triangles.as_slice())
    }

    pub fn shaders(&self) -> MappedRwLockReadGuard<'_, [u32]> {
        RwLockReadGuard::map(self.read(), |d| d.shader.as_slice())
    }

    pub fn smooth(&self) -> MappedRwLockReadGuard<'_, [Smooth]> {
        RwLockReadGuard::map(self.read(), |d| d.smooth.as_slice())
    }

    pub fn uvs(&self) -> MappedRwLockReadGuard<'_, [Vec2]> {
        RwLockReadGuard::map(self.read(), |d| d.uvs.as_slice())
    }

    pub fn uv_tangents(&self) -> MappedRwLockReadGuard<'_, [Vec3]> {
        RwLockReadGuard::map(self.read(), |d| d.uv_tangents.as_slice())
    }

    pub fn uv_tangent_signs(&self) -> MappedRwLockReadGuard<'_, [f32]> {
        RwLockReadGuard::map(self.read(), |d| d.uv_tangent_signs.as_slice())
    }

    pub fn per_vertex_uvs(&self) -> MappedRwLockReadGuard<'_, [Vec2]> {
        RwLockReadGuard::map(self.read(), |d| d.per_vertex_uvs.as_slice())
    }

    pub fn lightmap_uvs(&self) -> MappedRwLockReadGuard<'_, [Vec2]> {
        RwLockReadGuard::map(self.read(), |d| d.lightmap_uvs.as_slice())
    }

    pub fn alphas(&self) -> Option<MappedRwLockReadGuard<'_, [f32]>> {
        let guard = self.read();
        if guard.alphas.is_none() {
            return None;
        }
        Some(RwLockReadGuard::map(guard, |d| {
            d.alphas.as_deref().unwrap_or(&[])
        }))
    }

    pub fn sub_mesh_shaders(&self) -> Vec<Arc<Shader>> {
        self.data.read().sub_mesh_shaders.clone()
    }

    pub fn hair_strand_data_sets(&self) -> Vec<HairStrandDataSet> {
        self.data.read().hair_strand_data_sets.clone()
    }

    /// Shader indices as stored in the serialized blob, before they were
    /// forwarded through a shader cache.
    pub fn origin_shader_index_table(&self) -> Vec<u32> {
        self.data.read().origin_shader_index_table.clone()
    }

    // ---- serialization ------------------------------------------------------

    /// Serializes the mesh, mapping each sub-mesh shader through
    /// `shader_index_of` into cache indices.
    pub fn serialize(
        &self,
        w: &mut BlobWriter,
        shader_index_of: &dyn Fn(&Arc<Shader>) -> Option<u32>,
    ) -> Result<(), MeshError> {
        let data = self.data.read();
        w.write_string(&data.name);
        w.write_u8(data.flags.bits());
        w.write_u64(data.verts.len() as u64);
        w.write_u64((data.triangles.len() / 3) as u64);

        w.write_vec3_slice(&data.verts);
        w.write_vec3_slice(&data.vertex_normals);
        w.write_vec2_slice(&data.per_vertex_uvs);
        w.write_vec4_slice(&data.per_vertex_tangents);
        w.write_f32_slice(&data.per_vertex_tangent_signs);
        w.write_bool(data.alphas.is_some());
        if let Some(alphas) = &data.alphas {
            w.write_f32_slice(alphas);
        }

        w.write_u32_slice(&data.triangles);
        w.write_u32_slice(&data.shader);
        w.write_u8_slice(&data.smooth);

        w.write_vec2_slice(&data.uvs);
        w.write_vec3_slice(&data.uv_tangents);
        w.write_f32_slice(&data.uv_tangent_signs);
        w.write_vec2_slice(&data.lightmap_uvs);

        w.write_u32(data.sub_mesh_shaders.len() as u32);
        for shader in &data.sub_mesh_shaders {
            let idx = shader_index_of(shader).ok_or(MeshError::ShaderNotInCache)?;
            w.write_u32(idx);
        }

        w.write_u32(data.hair_strand_data_sets.len() as u32);
        for set in &data.hair_strand_data_sets {
            set.strand_data.write(w);
            w.write_u32(set.shader_index);
        }
        Ok(())
    }

    /// Reads a mesh blob, resolving sub-mesh shader indices through
    /// `shader_of`. The raw index table is retained for re-indexing when
    /// caches are merged.
    pub fn deserialize(
        r: &mut BlobReader<'_>,
        shader_of: &dyn Fn(u32) -> Option<Arc<Shader>>,
    ) -> Result<Arc<Mesh>, MeshError> {
        let name = r.read_string()?;
        let flags = MeshFlags::from_bits_truncate(r.read_u8()?);
        let num_verts = r.read_u64()?;
        let num_tris = r.read_u64()?;

        let mesh = Mesh::new(name, num_verts, num_tris, flags);
        {
            let mut data = mesh.data.write();
            data.verts = r.read_vec3_vec()?;
            data.vertex_normals = r.read_vec3_vec()?;
            data.per_vertex_uvs = r.read_vec2_vec()?;
            data.per_vertex_tangents = r.read_vec4_vec()?;
            data.per_vertex_tangent_signs = r.read_f32_vec()?;
            data.alphas = if r.read_bool()? {
                Some(r.read_f32_vec()?)
            } else {
                None
            };
            data.triangles = r.read_u32_vec()?;
            data.shader = r.read_u32_vec()?;
            data.smooth = r.read_u8_vec()?;
            data.uvs = r.read_vec2_vec()?;
            data.uv_tangents = r.read_vec3_vec()?;
            data.uv_tangent_signs = r.read_f32_vec()?;
            data.lightmap_uvs = r.read_vec2_vec()?;

            let shader_count = r.read_u32()? as usize;
            data.sub_mesh_shaders.reserve(shader_count);
            data.origin_shader_index_table.reserve(shader_count);
            for _ in 0..shader_count {
                let idx = r.read_u32()?;
                data.origin_shader_index_table.push(idx);
                let shader = shader_of(idx).ok_or(MeshError::UnknownShaderIndex { index: idx })?;
                data.sub_mesh_shaders.push(shader);
            }

            let hair_count = r.read_u32()? as usize;
            data.hair_strand_data_sets.reserve(hair_count);
            for _ in 0..hair_count {
                let strand_data = HairStrandData::read(r)?;
                let shader_index = r.read_u32()?;
                data.hair_strand_data_sets.push(HairStrandDataSet {
                    strand_data,
                    shader_index,
                });
            }
        }
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Arc<Mesh> {
        let mesh = Mesh::new("quad", 4, 2, MeshFlags::empty());
        let n = Vec3::Z;
        let t = Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(mesh.add_vertex(Vec3::new(0.0, 0.0, 0.0), n, t, Vec2::new(0.0, 0.0)));
        assert!(mesh.add_vertex(Vec3::new(1.0, 0.0, 0.0), n, t, Vec2::new(1.0, 0.0)));
        assert!(mesh.add_vertex(Vec3::new(1.0, 1.0, 0.0), n, t, Vec2::new(1.0, 1.0)));
        assert!(mesh.add_vertex(Vec3::new(0.0, 1.0, 0.0), n, t, Vec2::new(0.0, 1.0)));
        mesh.add_sub_mesh_shader(Shader::new());
        assert!(mesh.add_triangle(0, 1, 2, 0));
        assert!(mesh.add_triangle(0, 2, 3, 0));
        mesh
    }

    #[test]
    fn triangle_winding_is_inverted() {
        let mesh = quad();
        assert_eq!(&*mesh.triangles(), &[0, 2, 1, 0, 3, 2]);
        mesh.validate().unwrap();
    }

    #[test]
    fn corner_attributes_follow_winding() {
        let mesh = quad();
        let uvs = mesh.uvs();
        assert_eq!(uvs.len(), 6);
        assert_eq!(uvs[0], Vec2::new(0.0, 0.0));
        assert_eq!(uvs[1], Vec2::new(1.0, 1.0));
        assert_eq!(uvs[2], Vec2::new(1.0, 0.0));
    }

    #[test]
    fn vertex_budget_is_enforced() {
        let mesh = Mesh::new("tiny", 1, 1, MeshFlags::empty());
        let t = Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(mesh.add_vertex(Vec3::ZERO, Vec3::Z, t, Vec2::ZERO));
        assert!(!mesh.add_vertex(Vec3::ONE, Vec3::Z, t, Vec2::ZERO));
    }

    #[test]
    fn out_of_range_triangle_is_rejected() {
        let mesh = Mesh::new("bad", 2, 1, MeshFlags::empty());
        let t = Vec4::new(1.0, 0.0, 0.0, 1.0);
        mesh.add_vertex(Vec3::ZERO, Vec3::Z, t, Vec2::ZERO);
        mesh.add_vertex(Vec3::ONE, Vec3::Z, t, Vec2::ZERO);
        assert!(!mesh.add_triangle(0, 1, 2, 0));
    }

    #[test]
    fn validate_rejects_dangling_shader_index() {
        let mesh = Mesh::new("noshader", 3, 1, MeshFlags::empty());
        let t = Vec4::new(1.0, 0.0, 0.0, 1.0);
        mesh.add_vertex(Vec3::ZERO, Vec3::Z, t, Vec2::ZERO);
        mesh.add_vertex(Vec3::X, Vec3::Z, t, Vec2::ZERO);
        mesh.add_vertex(Vec3::Y, Vec3::Z, t, Vec2::ZERO);
        assert!(mesh.add_triangle(0, 1, 2, 0));
        assert!(matches!(
            mesh.validate(),
            Err(MeshError::ShaderIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn merge_offsets_indices() {
        let a = quad();
        let b = quad();
        a.merge(&b);
        assert_eq!(a.vertex_count(), 8);
        assert_eq!(a.triangle_count(), 4);
        let tris = a.triangles();
        assert_eq!(&tris[6..12], &[4, 6, 5, 4, 7, 6]);
        drop(tris);
        let shaders = a.shaders();
        assert_eq!(&shaders[2..4], &[1, 1]);
        drop(shaders);
        a.validate().unwrap();
    }

    #[test]
    fn alpha_channel_requires_flag() {
        let plain = Mesh::new("plain", 1, 0, MeshFlags::empty());
        assert!(!plain.add_alpha(1.0));
        let wrinkled = Mesh::new("wrinkled", 1, 0, MeshFlags::HAS_WRINKLES);
        assert!(wrinkled.add_wrinkle_factor(0.5));
    }

    #[test]
    fn serialization_round_trip_preserves_geometry() {
        let mesh = quad();
        let shaders = mesh.sub_mesh_shaders();
        let mut w = BlobWriter::new();
        mesh.serialize(&mut w, &|shader| {
            shaders
                .iter()
                .position(|s| Arc::ptr_eq(s, shader))
                .map(|i| i as u32)
        })
        .unwrap();
        let blob = w.finish();

        let restored = Mesh::deserialize(&mut BlobReader::new(&blob), &|idx| {
            shaders.get(idx as usize).cloned()
        })
        .unwrap();

        assert_eq!(&*restored.vertices(), &*mesh.vertices());
        assert_eq!(&*restored.triangles(), &*mesh.triangles());
        assert_eq!(&*restored.uvs(), &*mesh.uvs());
        assert_eq!(restored.origin_shader_index_table(), vec![0]);
        restored.validate().unwrap();
    }
}
