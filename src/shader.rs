//! Shaders: containers of per-pass node graphs.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    codec::{BlobReader, BlobWriter, CodecError},
    node::{GraphError, NodeDesc, NodeManager},
};

/// Output pass a shader graph is authored for. Exactly one pass is active
/// when the shader is handed to a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Pass {
    Combined = 0,
    Albedo,
    Normal,
    Depth,
}

/// Procedural hair generation parameters, applied per-shader.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct HairConfig {
    pub num_segments: u32,
    pub hair_per_square_meter: f32,
    pub default_thickness: f32,
    pub default_length: f32,
    pub default_hair_strength: f32,
    pub random_hair_length_factor: f32,
}

impl Default for HairConfig {
    fn default() -> Self {
        HairConfig {
            num_segments: 1,
            hair_per_square_meter: 100.0,
            default_thickness: 0.1,
            default_length: 0.1,
            default_hair_strength: 0.2,
            random_hair_length_factor: 0.5,
        }
    }
}

impl HairConfig {
    fn write(&self, w: &mut BlobWriter) {
        w.write_u32(self.num_segments);
        w.write_f32(self.hair_per_square_meter);
        w.write_f32(self.default_thickness);
        w.write_f32(self.default_length);
        w.write_f32(self.default_hair_strength);
        w.write_f32(self.random_hair_length_factor);
    }

    fn read(r: &mut BlobReader<'_>) -> Result<Self, CodecError> {
        Ok(HairConfig {
            num_segments: r.read_u32()?,
            hair_per_square_meter: r.read_f32()?,
            default_thickness: r.read_f32()?,
            default_length: r.read_f32()?,
            default_hair_strength: r.read_f32()?,
            random_hair_length_factor: r.read_f32()?,
        })
    }
}

/// Adaptive subdivision parameters, applied per-shader.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct SubdivisionSettings {
    pub max_level: u32,
    pub max_edge_screen_size: f32,
}

impl SubdivisionSettings {
    fn write(&self, w: &mut BlobWriter) {
        w.write_u32(self.max_level);
        w.write_f32(self.max_edge_screen_size);
    }

    fn read(r: &mut BlobReader<'_>) -> Result<Self, CodecError> {
        Ok(SubdivisionSettings {
            max_level: r.read_u32()?,
            max_edge_screen_size: r.read_f32()?,
        })
    }
}

struct ShaderState {
    combined_pass: Option<Arc<NodeDesc>>,
    albedo_pass: Option<Arc<NodeDesc>>,
    normal_pass: Option<Arc<NodeDesc>>,
    depth_pass: Option<Arc<NodeDesc>>,
    active_pass: Pass,
    hair_config: Option<HairConfig>,
    subdivision_settings: Option<SubdivisionSettings>,
}

/// Material description: up to four pass graphs plus hair/subdivision
/// settings.
pub struct Shader {
    state: RwLock<ShaderState>,
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        fmt.debug_struct("Shader")
            .field("active_pass", &state.active_pass)
            .field("combined", &state.combined_pass.is_some())
            .field("albedo", &state.albedo_pass.is_some())
            .field("normal", &state.normal_pass.is_some())
            .field("depth", &state.depth_pass.is_some())
            .finish()
    }
}

impl Shader {
    pub fn new() -> Arc<Shader> {
        Arc::new(Shader {
            state: RwLock::new(ShaderState {
                combined_pass: None,
                albedo_pass: None,
                normal_pass: None,
                depth_pass: None,
                active_pass: Pass::Combined,
                hair_config: None,
                subdivision_settings: None,
            }),
        })
    }

    pub fn set_pass(&self, pass: Pass, graph: Option<Arc<NodeDesc>>) {
        let mut state = self.state.write();
        match pass {
            Pass::Combined => state.combined_pass = graph,
            Pass::Albedo => state.albedo_pass = graph,
            Pass::Normal => state.normal_pass = graph,
            Pass::Depth => state.depth_pass = graph,
        }
    }

    pub fn pass(&self, pass: Pass) -> Option<Arc<NodeDesc>> {
        let state = self.state.read();
        match pass {
            Pass::Combined => state.combined_pass.clone(),
            Pass::Albedo => state.albedo_pass.clone(),
            Pass::Normal => state.normal_pass.clone(),
            Pass::Depth => state.depth_pass.clone(),
        }
    }

    pub fn set_active_pass(&self, pass: Pass) {
        self.state.write().active_pass = pass;
    }

    pub fn active_pass(&self) -> Pass {
        self.state.read().active_pass
    }

    /// Graph of the currently active pass, if authored.
    pub fn active_pass_node(&self) -> Option<Arc<NodeDesc>> {
        let active = self.active_pass();
        self.pass(active)
    }

    pub fn hair_config(&self) -> Option<HairConfig> {
        self.state.read().hair_config
    }

    pub fn set_hair_config(&self, config: HairConfig) {
        self.state.write().hair_config = Some(config);
    }

    pub fn clear_hair_config(&self) {
        self.state.write().hair_config = None;
    }

    pub fn subdivision_settings(&self) -> Option<SubdivisionSettings> {
        self.state.read().subdivision_settings
    }

    pub fn set_subdivision_settings(&self, settings: SubdivisionSettings) {
        self.state.write().subdivision_settings = Some(settings);
    }

    pub fn clear_subdivision_settings(&self) {
        self.state.write().subdivision_settings = None;
    }

    /// Flattens group nodes in every authored pass graph. Backends receive
    /// flat graphs only.
    pub fn finalize(&self) -> Result<(), GraphError> {
        let passes = {
            let state = self.state.read();
            [
                state.combined_pass.clone(),
                state.albedo_pass.clone(),
                state.normal_pass.clone(),
                state.depth_pass.clone(),
            ]
        };
        for pass in passes.into_iter().flatten() {
            pass.resolve_group_nodes()?;
        }
        Ok(())
    }

    /// Layout: hair flag+config, subdivision flag+settings, pass bit mask,
    /// then each present pass graph in pass order.
    pub fn serialize(&self, w: &mut BlobWriter) -> Result<(), GraphError> {
        let state = self.state.read();
        let passes = [
            state.combined_pass.clone(),
            state.albedo_pass.clone(),
            state.normal_pass.clone(),
            state.depth_pass.clone(),
        ];
        let hair = state.hair_config;
        let subdiv = state.subdivision_settings;
        drop(state);

        w.write_bool(hair.is_some());
        if let Some(hair) = hair {
            hair.write(w);
        }
        w.write_bool(subdiv.is_some());
        if let Some(subdiv) = subdiv {
            subdiv.write(w);
        }

        let mut flags = 0u32;
        for (i, pass) in passes.iter().enumerate() {
            if pass.is_some() {
                flags |= 1 << i;
            }
        }
        w.write_u32(flags);
        for pass in passes.into_iter().flatten() {
            pass.serialize(w)?;
        }
        Ok(())
    }

    pub fn deserialize(
        r: &mut BlobReader<'_>,
        manager: &Arc<NodeManager>,
    ) -> Result<Arc<Shader>, GraphError> {
        let shader = Shader::new();
        let hair_config = if r.read_bool()? {
            Some(HairConfig::read(r)?)
        } else {
            None
        };
        let subdivision_settings = if r.read_bool()? {
            Some(SubdivisionSettings::read(r)?)
        } else {
            None
        };
        {
            let mut state = shader.state.write();
            state.hair_config = hair_config;
            state.subdivision_settings = subdivision_settings;
        }
        let flags = r.read_u32()?;
        for (i, pass) in [Pass::Combined, Pass::Albedo, Pass::Normal, Pass::Depth]
            .into_iter()
            .enumerate()
        {
            if flags & (1 << i) == 0 {
                continue;
            }
            let graph = NodeDesc::create_group(manager, None);
            graph.deserialize(r)?;
            shader.set_pass(pass, Some(graph));
        }
        Ok(shader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{nodes, NODE_OUTPUT, NODE_PRINCIPLED_BSDF};

    fn sample_shader(manager: &Arc<NodeManager>) -> Arc<Shader> {
        let shader = Shader::new();
        let graph = NodeDesc::create_group(manager, None);
        let bsdf = graph.add_node(NODE_PRINCIPLED_BSDF).unwrap();
        bsdf.set_property(
            nodes::principled_bsdf::IN_BASE_COLOR,
            crate::math::Vec3::new(1.0, 0.0, 0.0),
        )
        .unwrap();
        let out = graph.add_node(NODE_OUTPUT).unwrap();
        graph
            .link(
                bsdf.primary_output_socket().unwrap(),
                out.input_socket(nodes::output::IN_SURFACE).unwrap(),
            )
            .unwrap();
        shader.set_pass(Pass::Combined, Some(graph));
        shader
    }

    #[test]
    fn active_pass_selection() {
        let manager = NodeManager::new();
        let shader = sample_shader(&manager);
        assert!(shader.active_pass_node().is_some());
        shader.set_active_pass(Pass::Depth);
        assert!(shader.active_pass_node().is_none());
    }

    #[test]
    fn serialization_round_trip() {
        let manager = NodeManager::new();
        let shader = sample_shader(&manager);
        shader.set_hair_config(HairConfig::default());
        shader.set_subdivision_settings(SubdivisionSettings {
            max_level: 2,
            max_edge_screen_size: 1.5,
        });

        let mut w = BlobWriter::new();
        shader.serialize(&mut w).unwrap();
        let blob = w.finish();

        let restored = Shader::deserialize(&mut BlobReader::new(&blob), &manager).unwrap();
        assert_eq!(restored.hair_config(), shader.hair_config());
        assert_eq!(
            restored.subdivision_settings(),
            shader.subdivision_settings()
        );
        let graph = restored.pass(Pass::Combined).unwrap();
        assert!(restored.pass(Pass::Albedo).is_none());
        assert!(graph
            .nodes()
            .iter()
            .any(|n| n.type_name() == NODE_PRINCIPLED_BSDF));
        assert_eq!(graph.links().len(), 1);
    }
}
