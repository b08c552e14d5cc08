//! Minimal binary glTF 2.0 (GLB) writer for coloured points and meshes.
//!
//! Layout: 12-byte header, a JSON chunk padded with spaces and an optional
//! BIN chunk padded with zeros. Positions are `f32` VEC3 with min/max
//! bounds, colours normalized `u8` VEC4, indices `u32`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::Serialize;

use scene_recon_core::{Pt3, Rgb};

use super::geometry::{Mesh, PointCloud};

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const MODE_POINTS: u32 = 0;
const MODE_TRIANGLES: u32 = 4;

const COMPONENT_UNSIGNED_BYTE: u32 = 5121;
const COMPONENT_UNSIGNED_INT: u32 = 5125;
const COMPONENT_FLOAT: u32 = 5126;

const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;

/// A named piece of geometry placed in the scene root.
#[derive(Debug, Clone, PartialEq)]
pub enum GlbNode {
    Points { name: String, cloud: PointCloud },
    Triangles { name: String, mesh: Mesh },
}

impl GlbNode {
    fn is_empty(&self) -> bool {
        match self {
            Self::Points { cloud, .. } => cloud.is_empty(),
            Self::Triangles { mesh, .. } => mesh.is_empty() || mesh.vertices.is_empty(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    asset: Asset,
    scene: usize,
    scenes: Vec<SceneDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    nodes: Vec<Node>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    meshes: Vec<MeshDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    accessors: Vec<Accessor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    buffer_views: Vec<BufferView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    buffers: Vec<Buffer>,
}

#[derive(Serialize)]
struct Asset {
    version: &'static str,
    generator: &'static str,
}

#[derive(Serialize)]
struct SceneDef {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    nodes: Vec<usize>,
}

#[derive(Serialize)]
struct Node {
    name: String,
    mesh: usize,
}

#[derive(Serialize)]
struct MeshDef {
    name: String,
    primitives: Vec<Primitive>,
}

#[derive(Serialize)]
struct Primitive {
    attributes: BTreeMap<&'static str, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    indices: Option<usize>,
    mode: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Accessor {
    buffer_view: usize,
    component_type: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    normalized: bool,
    count: usize,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<[f32; 3]>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BufferView {
    buffer: usize,
    byte_offset: usize,
    byte_length: usize,
    target: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Buffer {
    byte_length: usize,
}

/// Accumulates the BIN chunk and the JSON arrays that index into it.
struct Builder {
    doc: Document,
    bin: Vec<u8>,
}

impl Builder {
    fn new() -> Self {
        Self {
            doc: Document {
                asset: Asset {
                    version: "2.0",
                    generator: concat!("scene-recon ", env!("CARGO_PKG_VERSION")),
                },
                scene: 0,
                scenes: vec![SceneDef { nodes: Vec::new() }],
                nodes: Vec::new(),
                meshes: Vec::new(),
                accessors: Vec::new(),
                buffer_views: Vec::new(),
                buffers: Vec::new(),
            },
            bin: Vec::new(),
        }
    }

    fn push_view(&mut self, bytes: &[u8], target: u32) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        self.doc.buffer_views.push(BufferView {
            buffer: 0,
            byte_offset: self.bin.len(),
            byte_length: bytes.len(),
            target,
        });
        self.bin.extend_from_slice(bytes);
        self.doc.buffer_views.len() - 1
    }

    fn push_accessor(&mut self, accessor: Accessor) -> usize {
        self.doc.accessors.push(accessor);
        self.doc.accessors.len() - 1
    }

    fn positions(&mut self, points: &[Pt3]) -> usize {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        let mut bytes = Vec::with_capacity(points.len() * 12);
        for p in points {
            for (axis, v) in [p.x, p.y, p.z].into_iter().enumerate() {
                let v = v as f32;
                min[axis] = min[axis].min(v);
                max[axis] = max[axis].max(v);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        let view = self.push_view(&bytes, TARGET_ARRAY_BUFFER);
        self.push_accessor(Accessor {
            buffer_view: view,
            component_type: COMPONENT_FLOAT,
            normalized: false,
            count: points.len(),
            kind: "VEC3",
            min: Some(min),
            max: Some(max),
        })
    }

    fn colors(&mut self, colors: &[Rgb]) -> usize {
        let bytes: Vec<u8> = colors
            .iter()
            .flat_map(|&[r, g, b]| [r, g, b, u8::MAX])
            .collect();
        let view = self.push_view(&bytes, TARGET_ARRAY_BUFFER);
        self.push_accessor(Accessor {
            buffer_view: view,
            component_type: COMPONENT_UNSIGNED_BYTE,
            normalized: true,
            count: colors.len(),
            kind: "VEC4",
            min: None,
            max: None,
        })
    }

    fn indices(&mut self, faces: &[[u32; 3]]) -> usize {
        let bytes: Vec<u8> = faces
            .iter()
            .flatten()
            .flat_map(|i| i.to_le_bytes())
            .collect();
        let view = self.push_view(&bytes, TARGET_ELEMENT_ARRAY_BUFFER);
        self.push_accessor(Accessor {
            buffer_view: view,
            component_type: COMPONENT_UNSIGNED_INT,
            normalized: false,
            count: faces.len() * 3,
            kind: "SCALAR",
            min: None,
            max: None,
        })
    }

    fn add(&mut self, node: &GlbNode) -> Result<()> {
        let (name, positions, colors, faces, mode) = match node {
            GlbNode::Points { name, cloud } => {
                (name, &cloud.positions, &cloud.colors, None, MODE_POINTS)
            }
            GlbNode::Triangles { name, mesh } => {
                (name, &mesh.vertices, &mesh.colors, Some(&mesh.faces), MODE_TRIANGLES)
            }
        };
        ensure!(
            positions.len() == colors.len(),
            "node '{name}': {} positions but {} colours",
            positions.len(),
            colors.len()
        );
        if let Some(faces) = faces {
            let n = positions.len() as u32;
            ensure!(
                faces.iter().flatten().all(|&i| i < n),
                "node '{name}': face index out of range"
            );
        }

        let mut attributes = BTreeMap::new();
        attributes.insert("POSITION", self.positions(positions));
        attributes.insert("COLOR_0", self.colors(colors));
        let indices = faces.map(|f| self.indices(f));

        self.doc.meshes.push(MeshDef {
            name: name.clone(),
            primitives: vec![Primitive {
                attributes,
                indices,
                mode,
            }],
        });
        self.doc.nodes.push(Node {
            name: name.clone(),
            mesh: self.doc.meshes.len() - 1,
        });
        let node_index = self.doc.nodes.len() - 1;
        self.doc.scenes[0].nodes.push(node_index);
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        if !self.bin.is_empty() {
            self.doc.buffers.push(Buffer {
                byte_length: self.bin.len(),
            });
        }
        let mut json = serde_json::to_vec(&self.doc)?;
        while json.len() % 4 != 0 {
            json.push(b' ');
        }

        let mut total = 12 + 8 + json.len();
        if !self.bin.is_empty() {
            total += 8 + self.bin.len();
        }
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
        out.extend_from_slice(&GLB_VERSION.to_le_bytes());
        out.extend_from_slice(&u32::try_from(total)?.to_le_bytes());
        out.extend_from_slice(&u32::try_from(json.len())?.to_le_bytes());
        out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
        out.extend_from_slice(&json);
        if !self.bin.is_empty() {
            out.extend_from_slice(&u32::try_from(self.bin.len())?.to_le_bytes());
            out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
            out.extend_from_slice(&self.bin);
        }
        Ok(out)
    }
}

/// Encode nodes as a GLB byte stream. Empty nodes are skipped, so an
/// all-empty input still yields a valid (empty) scene.
///
/// # Errors
///
/// Returns an error if a node's attribute lengths disagree or the file
/// would exceed the 4 GiB GLB limit.
pub fn encode_glb(nodes: &[GlbNode]) -> Result<Vec<u8>> {
    let mut builder = Builder::new();
    for node in nodes.iter().filter(|n| !n.is_empty()) {
        builder.add(node)?;
    }
    builder.finish()
}

/// Encode and write `nodes` to `path`.
///
/// # Errors
///
/// Returns an error if encoding or the write fails.
pub fn write_glb(path: &Path, nodes: &[GlbNode]) -> Result<()> {
    let bytes = encode_glb(nodes)?;
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}
