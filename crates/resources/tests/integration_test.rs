//! Integration tests for OBJ mesh loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use vkframe_resources::{MeshData, ResourceError};

fn write_temp(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("vkframe_{}_{}", std::process::id(), name));
    fs::write(&path, contents).expect("Failed to write temp OBJ");
    path
}

#[test]
fn test_load_obj_file() {
    let path = write_temp(
        "cube_face.obj",
        "v -1 -1 0\nv 1 -1 0\nv 1 1 0\nv -1 1 0\nf 1 2 3 4\n",
    );

    let mesh = MeshData::load(&path).expect("Failed to load OBJ");
    fs::remove_file(&path).ok();

    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.triangle_count(), 2);
    assert_eq!(mesh.index_bytes().len(), 6 * 4);
}

#[test]
fn test_missing_file_reports_path() {
    let path = Path::new("does/not/exist.obj");
    let err = MeshData::load(path).unwrap_err();
    match err {
        ResourceError::ObjLoad { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_bundled_octahedron_has_outward_normals() {
    let mesh = MeshData::load(Path::new("../../assets/models/octahedron.obj"))
        .expect("Failed to load bundled mesh");

    assert_eq!(mesh.vertices.len(), 6);
    assert_eq!(mesh.triangle_count(), 8);
    for vertex in &mesh.vertices {
        assert_eq!(vertex.position.w, 1.0);
        assert_eq!(vertex.normal.w, 0.0);
        let facing = vertex.position.truncate().dot(vertex.normal.truncate());
        assert!(facing > 0.99, "normal should point away from the center");
    }
}
