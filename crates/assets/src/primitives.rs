//! Built-in meshes.

use crate::obj::MeshData;

/// Unit quad in the XY plane facing +Z: 4 vertices, 2 triangles.
pub fn plane() -> MeshData {
    MeshData {
        positions: vec![
            [-0.5, -0.5, 0.0],
            [0.5, -0.5, 0.0],
            [0.5, 0.5, 0.0],
            [-0.5, 0.5, 0.0],
        ],
        uvs: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        normals: vec![[0.0, 0.0, 1.0]; 4],
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_is_two_triangles() {
        let plane = plane();
        assert_eq!(plane.vertex_count(), 4);
        assert_eq!(plane.indices.len(), 6);
        assert!(plane.indices.iter().all(|&i| (i as usize) < plane.vertex_count()));
    }
}
