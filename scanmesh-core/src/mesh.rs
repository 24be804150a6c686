//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Three vertex indices of one triangle
pub type Face = [usize; 3];

/// An undirected edge as `(smaller, larger)` vertex index
pub type Edge = (usize, usize);

/// A triangle mesh with vertices and faces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<Face>,
    pub normals: Option<Vec<Vector3f>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

/// Order-independent identity of a triangle
pub fn canonical_face(face: &Face) -> Face {
    let mut key = *face;
    key.sort_unstable();
    key
}

/// Normalized undirected edge
pub fn edge_key(a: usize, b: usize) -> Edge {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// The three undirected edges of a face
pub fn face_edges(face: &Face) -> [Edge; 3] {
    [
        edge_key(face[0], face[1]),
        edge_key(face[1], face[2]),
        edge_key(face[2], face[0]),
    ]
}

/// Area of the triangle spanned by three points
pub fn triangle_area(a: &Point3f, b: &Point3f, c: &Point3f) -> f32 {
    0.5 * (b - a).cross(&(c - a)).norm()
}

/// Check that `face` indexes `vertices`, uses three distinct vertices and
/// spans more than `area_epsilon`.
pub fn check_triangle(vertices: &[Point3f], face: &Face, area_epsilon: f32) -> Result<()> {
    if let Some(&bad) = face.iter().find(|&&i| i >= vertices.len()) {
        return Err(Error::InvalidData(format!(
            "vertex index {} out of range for {} vertices",
            bad,
            vertices.len()
        )));
    }
    if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
        return Err(Error::DegenerateGeometry(format!("repeated vertex in {:?}", face)));
    }
    let area = triangle_area(&vertices[face[0]], &vertices[face[1]], &vertices[face[2]]);
    if !(area > area_epsilon) {
        return Err(Error::DegenerateGeometry(format!(
            "triangle {:?} has area {:e}",
            face, area
        )));
    }
    Ok(())
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<Face>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            colors: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Calculate unit face normals (zero vector for degenerate faces)
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let edge1 = self.vertices[face[1]] - v0;
                let edge2 = self.vertices[face[2]] - v0;
                edge1.cross(&edge2).try_normalize(f32::EPSILON).unwrap_or_else(Vector3f::zeros)
            })
            .collect()
    }

    /// Derive per-vertex normals as the area-weighted average of adjacent
    /// face normals. Isolated vertices get +z.
    pub fn compute_vertex_normals(&mut self) {
        let mut accum = vec![Vector3f::zeros(); self.vertices.len()];
        for face in &self.faces {
            let v0 = self.vertices[face[0]];
            let weighted = (self.vertices[face[1]] - v0).cross(&(self.vertices[face[2]] - v0));
            for &i in face {
                accum[i] += weighted;
            }
        }
        self.normals = Some(
            accum
                .into_iter()
                .map(|n| n.try_normalize(f32::EPSILON).unwrap_or_else(Vector3f::z))
                .collect(),
        );
    }

    /// Set vertex colors; ignored unless there is one color per vertex
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Verify every face indexes valid, distinct vertices and that no
    /// canonical face appears twice
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.faces.len());
        for face in &self.faces {
            if face.iter().any(|&i| i >= self.vertices.len()) {
                return Err(Error::InvalidData(format!(
                    "face {:?} references a vertex beyond {}",
                    face,
                    self.vertices.len()
                )));
            }
            if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                return Err(Error::DegenerateGeometry(format!("repeated vertex in {:?}", face)));
            }
            if !seen.insert(canonical_face(face)) {
                return Err(Error::InvalidData(format!("duplicate face {:?}", face)));
            }
        }
        Ok(())
    }

    /// Drop faces whose canonical key was already seen; returns how many went
    pub fn remove_duplicated_triangles(&mut self) -> usize {
        let before = self.faces.len();
        let mut seen = HashSet::with_capacity(before);
        self.faces.retain(|face| seen.insert(canonical_face(face)));
        before - self.faces.len()
    }

    /// Drop faces with repeated indices or area at most `area_epsilon`
    pub fn remove_degenerate_triangles(&mut self, area_epsilon: f32) -> usize {
        let before = self.faces.len();
        let vertices = &self.vertices;
        self.faces
            .retain(|face| check_triangle(vertices, face, area_epsilon).is_ok());
        before - self.faces.len()
    }

    /// Indices of vertices used by at least one face, ascending
    pub fn referenced_vertices(&self) -> Vec<usize> {
        let mut used = vec![false; self.vertices.len()];
        for face in &self.faces {
            for &i in face {
                used[i] = true;
            }
        }
        used.iter()
            .enumerate()
            .filter_map(|(i, &u)| u.then_some(i))
            .collect()
    }

    /// Remove vertices no face refers to, remapping faces and per-vertex
    /// attributes; returns how many vertices were removed
    pub fn remove_unreferenced_vertices(&mut self) -> usize {
        let keep = self.referenced_vertices();
        let removed = self.vertices.len() - keep.len();
        if removed == 0 {
            return 0;
        }

        let mut remap = vec![usize::MAX; self.vertices.len()];
        for (new, &old) in keep.iter().enumerate() {
            remap[old] = new;
        }

        self.vertices = keep.iter().map(|&i| self.vertices[i]).collect();
        if let Some(normals) = self.normals.take() {
            self.normals = Some(keep.iter().map(|&i| normals[i]).collect());
        }
        if let Some(colors) = self.colors.take() {
            self.colors = Some(keep.iter().map(|&i| colors[i]).collect());
        }
        for face in &mut self.faces {
            for i in face.iter_mut() {
                *i = remap[*i];
            }
        }
        removed
    }
}
