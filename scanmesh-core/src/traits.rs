//! Core traits for scanmesh

use crate::{frame::Frame, mesh::TriangleMesh, point::*, point_cloud::PointCloud, transform::Transform3D};

/// Anything carrying a 3D position that algorithms can read and rewrite.
///
/// Filters and registration are generic over this so colored scan points keep
/// their attributes while only the geometry is inspected or moved.
pub trait Positioned: Copy {
    /// Position of the element
    fn position(&self) -> Point3f;

    /// Copy of the element moved to `position`
    fn with_position(&self, position: Point3f) -> Self;
}

impl Positioned for Point3f {
    fn position(&self) -> Point3f {
        *self
    }

    fn with_position(&self, position: Point3f) -> Self {
        position
    }
}

impl Positioned for ScanPoint {
    fn position(&self) -> Point3f {
        self.position
    }

    fn with_position(&self, position: Point3f) -> Self {
        Self {
            position,
            color: self.color,
        }
    }
}

/// Trait for nearest neighbor search functionality
pub trait NearestNeighborSearch {
    /// Find up to k nearest neighbors to a query point as `(index, distance)`,
    /// sorted by ascending distance
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)>;
    
    /// Find all neighbors within a given radius as `(index, distance)`
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)>;
}

/// Trait for objects that can be transformed
pub trait Transformable {
    /// Apply a transformation to the object
    fn transform(&mut self, transform: &Transform3D);
}

/// Trait for objects with an axis-aligned extent
pub trait Bounded {
    /// Axis-aligned bounding box, `None` when empty
    fn bounding_box(&self) -> Option<(Point3f, Point3f)>;

    /// Center of the bounding box
    fn center(&self) -> Option<Point3f> {
        self.bounding_box().map(|(min, max)| nalgebra::center(&min, &max))
    }
}

/// Axis-aligned bounds of a sequence of positions
pub fn bounds_of<I>(positions: I) -> Option<(Point3f, Point3f)>
where
    I: IntoIterator<Item = Point3f>,
{
    let mut iter = positions.into_iter();
    let first = iter.next()?;
    Some(iter.fold((first, first), |(min, max), p| {
        (min.inf(&p), max.sup(&p))
    }))
}

impl<T: Positioned> Bounded for PointCloud<T> {
    fn bounding_box(&self) -> Option<(Point3f, Point3f)> {
        bounds_of(self.points.iter().map(Positioned::position))
    }
}

impl Bounded for Frame {
    fn bounding_box(&self) -> Option<(Point3f, Point3f)> {
        bounds_of(self.points.iter().map(|p| p.position))
    }
}

impl Bounded for TriangleMesh {
    fn bounding_box(&self) -> Option<(Point3f, Point3f)> {
        bounds_of(self.vertices.iter().copied())
    }
}
