//! Triangle mesh loading from Wavefront OBJ files.

use std::io::BufRead;
use std::path::Path;

use glam::Vec3;
use vkframe_rhi::vertex::Vertex;

use crate::error::{ResourceError, ResourceResult};

/// Flattened triangle mesh ready for upload.
///
/// Every object in the source file is merged into one vertex list; indices
/// are rebased so they stay valid after the merge.
#[derive(Debug, Default, Clone)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    }
}

impl MeshData {
    /// Loads and triangulates an OBJ file.
    ///
    /// Objects without normals get smooth, area-weighted vertex normals.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        let (models, _materials) =
            tobj::load_obj(path, &load_options()).map_err(|source| ResourceError::ObjLoad {
                path: path.to_path_buf(),
                source,
            })?;

        let mesh = Self::from_models(&models)?;
        if mesh.indices.is_empty() {
            return Err(ResourceError::NoGeometry(path.to_path_buf()));
        }

        tracing::info!(
            "Loaded mesh {:?}: {} vertices, {} triangles",
            path,
            mesh.vertices.len(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }

    /// Parses OBJ text from a reader. Material libraries are not resolved.
    pub fn parse<R: BufRead>(reader: &mut R) -> ResourceResult<Self> {
        let (models, _materials) =
            tobj::load_obj_buf(reader, &load_options(), |_| Err(tobj::LoadError::OpenFileFailed))
                .map_err(|source| ResourceError::ObjLoad {
                    path: "<memory>".into(),
                    source,
                })?;

        let mesh = Self::from_models(&models)?;
        if mesh.indices.is_empty() {
            return Err(ResourceError::NoGeometry("<memory>".into()));
        }
        Ok(mesh)
    }

    fn from_models(models: &[tobj::Model]) -> ResourceResult<Self> {
        let mut data = Self::default();

        for model in models {
            let mesh = &model.mesh;
            let positions: Vec<Vec3> = mesh
                .positions
                .chunks_exact(3)
                .map(|p| Vec3::new(p[0], p[1], p[2]))
                .collect();

            let normals: Vec<Vec3> = if mesh.normals.len() == mesh.positions.len() {
                mesh.normals
                    .chunks_exact(3)
                    .map(|n| Vec3::new(n[0], n[1], n[2]))
                    .collect()
            } else {
                tracing::debug!("Generating smooth normals for '{}'", model.name);
                smooth_normals(&positions, &mesh.indices)
            };

            let base = data.vertices.len();
            let total = base + positions.len();
            if u32::try_from(total).is_err() {
                return Err(ResourceError::TooManyVertices(total));
            }
            let base = base as u32;

            data.vertices.extend(
                positions
                    .iter()
                    .zip(&normals)
                    .map(|(&position, &normal)| Vertex::new(position, normal)),
            );
            data.indices.extend(mesh.indices.iter().map(|&i| base + i));
        }

        Ok(data)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Sums unnormalized face normals onto each corner so larger triangles
/// weigh more, then normalizes.
fn smooth_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }

    normals
        .into_iter()
        .map(|n| n.normalize_or_zero())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const QUAD: &str = "\
o quad
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
f 1 2 3 4
";

    #[test]
    fn test_parse_triangulates_quads() {
        let mesh = MeshData::parse(&mut Cursor::new(QUAD)).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn test_missing_normals_are_generated() {
        let mesh = MeshData::parse(&mut Cursor::new(QUAD)).unwrap();
        for vertex in &mesh.vertices {
            assert!((vertex.normal.z - 1.0).abs() < 1e-5);
            assert_eq!(vertex.normal.w, 0.0);
            assert_eq!(vertex.position.w, 1.0);
        }
    }

    #[test]
    fn test_file_normals_are_kept() {
        let obj = "\
v 0 0 0
v 1 0 0
v 0 1 0
vn 0 0 -1
f 1//1 2//1 3//1
";
        let mesh = MeshData::parse(&mut Cursor::new(obj)).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert!(mesh.vertices.iter().all(|v| (v.normal.z + 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_objects_are_merged_with_rebased_indices() {
        let obj = "\
o first
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
o second
v 0 0 1
v 1 0 1
v 0 1 1
f 4 5 6
";
        let mesh = MeshData::parse(&mut Cursor::new(obj)).unwrap();
        assert_eq!(mesh.vertices.len(), 6);
        assert_eq!(mesh.triangle_count(), 2);
        let max = mesh.indices.iter().copied().max().unwrap();
        assert_eq!(max, 5);
        assert_eq!(mesh.vertices[3].position.z, 1.0);
    }

    #[test]
    fn test_empty_input_has_no_geometry() {
        let result = MeshData::parse(&mut Cursor::new("# nothing here\n"));
        assert!(matches!(result, Err(ResourceError::NoGeometry(_))));
    }

    #[test]
    fn test_smooth_normals_weight_by_area() {
        let positions = [
            Vec3::ZERO,
            Vec3::X * 10.0,
            Vec3::Y * 10.0,
            Vec3::ZERO,
            Vec3::Z,
        ];
        // Large triangle in XY (normal +Z) and a thin one in XZ sharing vertex 0.
        let indices = [0, 1, 2, 0, 4, 1];
        let normals = smooth_normals(&positions, &indices);
        assert!(normals[0].z > normals[0].y.abs());
        assert!((normals[0].length() - 1.0).abs() < 1e-5);
        assert_eq!(normals[3], Vec3::ZERO);
    }

    #[test]
    fn test_vertex_bytes_matches_layout() {
        let mesh = MeshData::parse(&mut Cursor::new(QUAD)).unwrap();
        assert_eq!(mesh.vertex_bytes().len(), mesh.vertices.len() * 32);
    }
}
