//! glTF/GLB scene loading into a [`SceneGraph`] plus flat primitive list.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use corelib::transform::Transform;
use corelib::{Mat4, NodeId, Quat, SceneGraph, Vec3};

use crate::mesh::{Material, MeshData, MeshVertex, Primitive};

/// Projection parameters of an embedded camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CameraProjection {
    Perspective {
        yfov: f32,
        znear: f32,
        zfar: Option<f32>,
        aspect: Option<f32>,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        znear: f32,
        zfar: f32,
    },
}

/// Camera embedded in the model file.
#[derive(Clone, Debug)]
pub struct CameraDef {
    pub name: Option<String>,
    pub node: NodeId,
    /// Transform relative to the model root, captured at load time.
    pub transform: Mat4,
    pub projection: CameraProjection,
}

impl CameraDef {
    pub fn position(&self) -> Vec3 {
        self.transform.to_scale_rotation_translation().2
    }

    pub fn rotation(&self) -> Quat {
        self.transform.to_scale_rotation_translation().1
    }
}

/// Result of loading a model.
#[derive(Clone, Debug)]
pub struct LoadedScene {
    /// Synthetic group node holding the file's root nodes.
    pub root: NodeId,
    pub graph: SceneGraph,
    pub primitives: Vec<Primitive>,
    pub cameras: Vec<CameraDef>,
}

impl LoadedScene {
    pub fn first_camera(&self) -> Option<&CameraDef> {
        self.cameras.first()
    }
}

/// Load a `.glb` / `.gltf` from disk (external buffers resolved relative to it).
pub fn load_gltf_from_path(path: impl AsRef<Path>) -> Result<LoadedScene> {
    let path = path.as_ref();
    log::info!("Loading model from {:?}", path);
    let (doc, buffers, _images) = gltf::import(path)
        .with_context(|| format!("Failed to import glTF: {}", path.display()))?;
    let scene = build_scene(&doc, &buffers)?;
    log::info!(
        "Loaded model: {} nodes, {} primitives, {} cameras",
        scene.graph.len(),
        scene.primitives.len(),
        scene.cameras.len()
    );
    Ok(scene)
}

/// Load from an in-memory `.glb` or self-contained `.gltf`.
pub fn load_gltf_from_slice(bytes: &[u8]) -> Result<LoadedScene> {
    let (doc, buffers, _images) = gltf::import_slice(bytes).context("Failed to parse glTF")?;
    build_scene(&doc, &buffers)
}

struct Builder<'a> {
    buffers: &'a [gltf::buffer::Data],
    graph: SceneGraph,
    primitives: Vec<Primitive>,
    cameras: Vec<(Option<String>, NodeId, CameraProjection)>,
    /// glTF mesh index -> our primitive indices.
    mesh_cache: HashMap<usize, Vec<usize>>,
}

fn build_scene(doc: &gltf::Document, buffers: &[gltf::buffer::Data]) -> Result<LoadedScene> {
    let gscene = doc
        .default_scene()
        .or_else(|| doc.scenes().next())
        .ok_or_else(|| anyhow!("glTF contains no scenes"))?;

    let mut b = Builder {
        buffers,
        graph: SceneGraph::new(),
        primitives: Vec::new(),
        cameras: Vec::new(),
        mesh_cache: HashMap::new(),
    };

    let root = b.graph.spawn(
        Some(gscene.name().unwrap_or("Scene")),
        Transform::identity(),
        None,
    );

    // Iterative DFS; glTF forbids cycles but we guard anyway.
    let mut visited = vec![false; doc.nodes().len()];
    let mut stack: Vec<(gltf::Node, NodeId)> = gscene.nodes().map(|n| (n, root)).collect();
    stack.reverse();
    while let Some((node, parent)) = stack.pop() {
        if std::mem::replace(&mut visited[node.index()], true) {
            log::warn!("glTF node {} referenced twice, skipping", node.index());
            continue;
        }
        let id = b.add_node(&node, parent)?;
        let mut kids: Vec<_> = node.children().map(|c| (c, id)).collect();
        kids.reverse();
        stack.extend(kids);
    }

    let Builder {
        graph,
        primitives,
        cameras,
        ..
    } = b;

    let cameras = cameras
        .into_iter()
        .map(|(name, node, projection)| CameraDef {
            name,
            node,
            transform: graph.world_matrix(node).unwrap_or(Mat4::IDENTITY),
            projection,
        })
        .collect();

    Ok(LoadedScene {
        root,
        graph,
        primitives,
        cameras,
    })
}

impl Builder<'_> {
    fn add_node(&mut self, node: &gltf::Node, parent: NodeId) -> Result<NodeId> {
        let (t, r, s) = node.transform().decomposed();
        let transform = Transform::from_translation_quat_scale(
            Vec3::from(t),
            Quat::from_array(r),
            Vec3::from(s),
        );
        let id = self.graph.spawn(node.name(), transform, Some(parent));

        if let Some(mesh) = node.mesh() {
            for prim in self.mesh_primitives(&mesh)? {
                self.graph.attach_primitive(id, prim);
            }
        }

        if let Some(camera) = node.camera() {
            let projection = match camera.projection() {
                gltf::camera::Projection::Perspective(p) => CameraProjection::Perspective {
                    yfov: p.yfov(),
                    znear: p.znear(),
                    zfar: p.zfar(),
                    aspect: p.aspect_ratio(),
                },
                gltf::camera::Projection::Orthographic(o) => CameraProjection::Orthographic {
                    xmag: o.xmag(),
                    ymag: o.ymag(),
                    znear: o.znear(),
                    zfar: o.zfar(),
                },
            };
            let name = camera.name().or(node.name()).map(str::to_owned);
            self.cameras.push((name, id, projection));
        }
        Ok(id)
    }

    fn mesh_primitives(&mut self, mesh: &gltf::Mesh) -> Result<Vec<usize>> {
        if let Some(cached) = self.mesh_cache.get(&mesh.index()) {
            return Ok(cached.clone());
        }
        let mut out = Vec::new();
        for prim in mesh.primitives() {
            if prim.mode() != gltf::mesh::Mode::Triangles {
                log::debug!(
                    "Skipping non-triangle primitive ({:?}) in mesh {:?}",
                    prim.mode(),
                    mesh.name()
                );
                continue;
            }
            let data = self.read_primitive(&prim).with_context(|| {
                format!(
                    "Failed to read primitive {} of mesh {:?}",
                    prim.index(),
                    mesh.name().unwrap_or("<unnamed>")
                )
            })?;
            out.push(self.primitives.len());
            self.primitives.push(Primitive {
                mesh: data,
                material: read_material(&prim.material()),
            });
        }
        self.mesh_cache.insert(mesh.index(), out.clone());
        Ok(out)
    }

    fn read_primitive(&self, prim: &gltf::Primitive) -> Result<MeshData> {
        let buffers = self.buffers;
        let reader = prim.reader(|buf| buffers.get(buf.index()).map(|d| d.0.as_slice()));

        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .ok_or_else(|| anyhow!("primitive has no POSITION attribute"))?
            .collect();
        let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
        let uvs: Option<Vec<[f32; 2]>> = reader
            .read_tex_coords(0)
            .map(|tc| tc.into_f32().collect());

        let vertices: Vec<MeshVertex> = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let n = normals
                    .as_ref()
                    .and_then(|v| v.get(i).copied())
                    .unwrap_or([0.0, 0.0, 1.0]);
                let uv = uvs
                    .as_ref()
                    .and_then(|v| v.get(i).copied())
                    .unwrap_or([0.0, 0.0]);
                MeshVertex::new(p, n, uv)
            })
            .collect();

        let indices: Vec<u32> = match reader.read_indices() {
            Some(idx) => idx.into_u32().collect(),
            None => (0..vertices.len() as u32).collect(),
        };
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            anyhow::bail!("index {} out of bounds (vertices={})", bad, vertices.len());
        }

        let mut mesh = MeshData::new(vertices, indices);
        if normals.is_none() {
            mesh.recompute_normals();
        }
        Ok(mesh)
    }
}

fn read_material(m: &gltf::Material) -> Material {
    let pbr = m.pbr_metallic_roughness();
    Material {
        base_color: pbr.base_color_factor(),
        emissive: m.emissive_factor(),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One triangle (positions + u16 indices) in a base64 data URI.
    const TRIANGLE_BUFFER: &str =
        "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAA=";

    fn face_rig_gltf() -> String {
        format!(
            r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [ {{ "name": "Rig", "nodes": [0, 3] }} ],
  "nodes": [
    {{ "name": "head", "children": [1], "translation": [0, 1, 0] }},
    {{ "name": "face", "mesh": 0, "rotation": [0, 0.3826834, 0, 0.9238795], "children": [2] }},
    {{ "name": "nose" }},
    {{ "name": "Camera", "camera": 0, "translation": [0, 0.5, 4] }}
  ],
  "cameras": [
    {{ "type": "perspective", "perspective": {{ "yfov": 0.8, "znear": 0.05, "zfar": 50 }} }}
  ],
  "materials": [
    {{ "pbrMetallicRoughness": {{ "baseColorFactor": [0.9, 0.7, 0.6, 1.0], "metallicFactor": 0.0, "roughnessFactor": 0.5 }},
       "emissiveFactor": [0.1, 0.0, 0.0] }}
  ],
  "meshes": [
    {{ "name": "FaceMesh", "primitives": [ {{ "attributes": {{ "POSITION": 0 }}, "indices": 1, "material": 0 }} ] }}
  ],
  "buffers": [ {{ "byteLength": 44, "uri": "{TRIANGLE_BUFFER}" }} ],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0] }},
    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
  ]
}}"#
        )
    }

    #[test]
    fn builds_named_hierarchy_under_group_root() {
        let scene = load_gltf_from_slice(face_rig_gltf().as_bytes()).expect("parse");
        let g = &scene.graph;
        assert_eq!(g.name(scene.root), Some("Rig"));
        assert_eq!(g.roots(), &[scene.root]);

        let head = g.find_by_name("head").unwrap();
        let face = g.find_by_name("face").unwrap();
        let nose = g.find_by_name("nose").unwrap();
        assert_eq!(g.parent(head), Some(scene.root));
        assert_eq!(g.parent(face), Some(head));
        assert_eq!(g.parent(nose), Some(face));

        // 45 degrees about Y lands in the yaw channel.
        let rot = g.transform(face).unwrap().rotation_euler;
        assert!((rot.y - std::f32::consts::FRAC_PI_4).abs() < 1e-4);
        assert!(rot.x.abs() < 1e-4 && rot.z.abs() < 1e-4);
    }

    #[test]
    fn reads_geometry_and_material() {
        let scene = load_gltf_from_slice(face_rig_gltf().as_bytes()).unwrap();
        assert_eq!(scene.primitives.len(), 1);
        let prim = &scene.primitives[0];
        assert_eq!(prim.mesh.vertices.len(), 3);
        assert_eq!(prim.mesh.indices, vec![0, 1, 2]);
        // No NORMAL attribute: normals are rebuilt from winding.
        assert_eq!(prim.mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(prim.material.base_color, [0.9, 0.7, 0.6, 1.0]);
        assert_eq!(prim.material.roughness, 0.5);
        assert_eq!(prim.material.emissive, [0.1, 0.0, 0.0]);

        let face = scene.graph.find_by_name("face").unwrap();
        assert_eq!(scene.graph.primitives(face), &[0]);
        assert_eq!(scene.graph.drawables().count(), 1);
    }

    #[test]
    fn exposes_first_camera() {
        let scene = load_gltf_from_slice(face_rig_gltf().as_bytes()).unwrap();
        let cam = scene.first_camera().expect("camera");
        assert_eq!(cam.name.as_deref(), Some("Camera"));
        assert!((cam.position() - Vec3::new(0.0, 0.5, 4.0)).length() < 1e-5);
        match cam.projection {
            CameraProjection::Perspective { yfov, znear, zfar, aspect } => {
                assert_eq!(yfov, 0.8);
                assert_eq!(znear, 0.05);
                assert_eq!(zfar, Some(50.0));
                assert_eq!(aspect, None);
            }
            other => panic!("unexpected projection {other:?}"),
        }
    }

    #[test]
    fn model_without_cameras_has_none() {
        let src = r#"{ "asset": { "version": "2.0" }, "scenes": [ { "nodes": [0] } ], "nodes": [ { "name": "solo" } ] }"#;
        let scene = load_gltf_from_slice(src.as_bytes()).unwrap();
        assert!(scene.first_camera().is_none());
        assert_eq!(scene.graph.name(scene.root), Some("Scene"));
        assert!(scene.graph.find_by_name("face").is_none());
    }

    #[test]
    fn missing_file_and_garbage_are_errors() {
        assert!(load_gltf_from_path("/definitely/not/here.glb").is_err());
        assert!(load_gltf_from_slice(b"not gltf at all").is_err());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.gltf");
        std::fs::write(&path, face_rig_gltf()).unwrap();
        let scene = load_gltf_from_path(&path).unwrap();
        assert!(scene.graph.find_by_name("face").is_some());
    }
}
