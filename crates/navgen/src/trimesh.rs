//! The triangle soup fed into [`Heightfield`](crate::Heightfield) rasterization.

use glam::{UVec3, Vec3A};

use crate::{
    math::{Aabb3d, TriangleIndices as _},
    span::AreaType,
};

/// A mesh used as input for [`Heightfield`](crate::Heightfield) rasterization.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TriMesh {
    /// The vertices composing the mesh.
    /// Follows the convention of a triangle list.
    pub vertices: Vec<Vec3A>,

    /// The indices composing the mesh.
    /// Follows the convention of a triangle list.
    pub indices: Vec<UVec3>,

    /// The area types of the trimesh. Each index corresponds 1:1 to the [`TriMesh::indices`].
    pub area_types: Vec<AreaType>,
}

impl TriMesh {
    /// Builds a trimesh out of flat vertex and index arrays, as used by most exporters.
    /// Trailing values that do not form a full vertex or triangle are ignored.
    /// All triangles start out as [`AreaType::NOT_WALKABLE`].
    pub fn from_flat(vertices: &[f32], indices: &[u32]) -> Self {
        let vertices: Vec<_> = vertices
            .chunks_exact(3)
            .map(|v| Vec3A::new(v[0], v[1], v[2]))
            .collect();
        let indices: Vec<_> = indices
            .chunks_exact(3)
            .map(|i| UVec3::new(i[0], i[1], i[2]))
            .collect();
        let area_types = vec![AreaType::NOT_WALKABLE; indices.len()];
        Self {
            vertices,
            indices,
            area_types,
        }
    }

    /// Computes the AABB of the trimesh.
    /// Returns `None` if the trimesh is empty.
    pub fn compute_aabb(&self) -> Option<Aabb3d> {
        Aabb3d::from_verts(&self.vertices)
    }

    /// Whether the trimesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether every index references an existing vertex.
    pub fn has_valid_indices(&self) -> bool {
        let count = self.vertices.len() as u32;
        self.indices.iter().all(|i| i.max_element() < count)
    }

    /// Marks the triangles as walkable or not based on the threshold angle.
    ///
    /// The triangles are marked as walkable if the angle between their normal and the up axis
    /// is less than the threshold angle. Triangles that do not pass are left untouched.
    ///
    /// # Arguments
    ///
    /// * `threshold_rad` - The threshold angle in radians.
    ///
    pub fn mark_walkable_triangles(&mut self, threshold_rad: f32) {
        let threshold_cos = threshold_rad.cos();
        for (i, indices) in self.indices.iter().enumerate() {
            let normal = indices.normal(&self.vertices);

            if normal.y > threshold_cos {
                self.area_types[i] = AreaType::DEFAULT_WALKABLE;
            }
        }
    }

    /// Clears the area of every triangle that is too steep to walk on.
    ///
    /// The inverse of [`TriMesh::mark_walkable_triangles`]: triangles keep their area unless
    /// their slope is above the threshold, in which case they become [`AreaType::NOT_WALKABLE`].
    pub fn clear_unwalkable_triangles(&mut self, threshold_rad: f32) {
        let threshold_cos = threshold_rad.cos();
        for (i, indices) in self.indices.iter().enumerate() {
            let normal = indices.normal(&self.vertices);

            if normal.y <= threshold_cos {
                self.area_types[i] = AreaType::NOT_WALKABLE;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(height: f32) -> TriMesh {
        let mut trimesh = TriMesh::from_flat(
            &[0.0, 0.0, 0.0, 0.0, height, 1.0, 1.0, 0.0, 0.0],
            &[0, 1, 2],
        );
        trimesh.area_types = vec![AreaType(7)];
        trimesh
    }

    #[test]
    fn from_flat_ignores_trailing_values() {
        let trimesh = TriMesh::from_flat(&[0.0; 10], &[0, 1, 2, 0]);
        assert_eq!(trimesh.vertices.len(), 3);
        assert_eq!(trimesh.indices.len(), 1);
        assert_eq!(trimesh.area_types, vec![AreaType::NOT_WALKABLE]);
    }

    #[test]
    fn flat_triangle_is_walkable() {
        let mut trimesh = ramp(0.0);
        trimesh.area_types = vec![AreaType::NOT_WALKABLE];
        trimesh.mark_walkable_triangles(45.0_f32.to_radians());
        assert_eq!(trimesh.area_types, vec![AreaType::DEFAULT_WALKABLE]);
    }

    #[test]
    fn steep_triangle_is_cleared() {
        let mut trimesh = ramp(3.0);
        trimesh.clear_unwalkable_triangles(45.0_f32.to_radians());
        assert_eq!(trimesh.area_types, vec![AreaType::NOT_WALKABLE]);

        let mut trimesh = ramp(0.5);
        trimesh.clear_unwalkable_triangles(45.0_f32.to_radians());
        assert_eq!(trimesh.area_types, vec![AreaType(7)]);
    }
}
