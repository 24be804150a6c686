//! Uniform-grid spatial hashing for neighbor queries
//!
//! Points are bucketed by `floor(coord / cell_size)` into a hash map keyed by
//! a packed [`GridKey`]. A query visits the `(2r + 1)^3` cells around the query
//! cell, so its cost depends on local density rather than on the number of
//! indexed points.

use scanmesh_core::{cell_coords, Error, GridKey, NearestNeighborSearch, Point3f, Result};
use std::collections::HashMap;

/// Default number of rings visited by k-nearest queries
pub const DEFAULT_MAX_RINGS: i32 = 2;

/// Hash grid over a fixed point set
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    cell_size: f32,
    max_rings: i32,
    cells: HashMap<GridKey, Vec<usize>>,
    points: Vec<Point3f>,
}

impl SpatialIndex {
    /// Bucket `points` into cells of edge length `cell_size`
    pub fn build(points: &[Point3f], cell_size: f32) -> Result<Self> {
        if !(cell_size > 0.0) || !cell_size.is_finite() {
            return Err(Error::InvalidData(format!(
                "cell_size must be positive and finite, got {}",
                cell_size
            )));
        }

        let mut cells: HashMap<GridKey, Vec<usize>> = HashMap::new();
        for (idx, point) in points.iter().enumerate() {
            cells
                .entry(GridKey::from_point(point, cell_size))
                .or_default()
                .push(idx);
        }

        Ok(Self {
            cell_size,
            max_rings: DEFAULT_MAX_RINGS,
            cells,
            points: points.to_vec(),
        })
    }

    /// Set how many rings k-nearest queries may expand to
    pub fn with_max_rings(mut self, max_rings: i32) -> Self {
        self.max_rings = max_rings.max(1);
        self
    }

    /// Edge length of a cell
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of non-empty cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of indexed points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no points are indexed
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Indexed point positions
    pub fn points(&self) -> &[Point3f] {
        &self.points
    }

    /// Distance up to which k-nearest queries are complete
    pub fn search_horizon(&self) -> f32 {
        self.max_rings as f32 * self.cell_size
    }

    /// Indices of all points whose cell lies within `cell_radius` cells of the
    /// query's cell (Chebyshev distance). Candidates only: no distance filter.
    pub fn query(&self, point: &Point3f, cell_radius: i32) -> Vec<usize> {
        let mut out = Vec::new();
        self.visit_block(cell_coords(point, self.cell_size), cell_radius, |indices| {
            out.extend_from_slice(indices)
        });
        out
    }

    fn visit_block<F: FnMut(&[usize])>(&self, center: [i32; 3], radius: i32, mut visit: F) {
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                for dz in -radius..=radius {
                    let key = GridKey::new(center[0] + dx, center[1] + dy, center[2] + dz);
                    if let Some(indices) = self.cells.get(&key) {
                        visit(indices);
                    }
                }
            }
        }
    }

    /// Cells forming the hollow shell exactly `ring` cells away
    fn visit_ring<F: FnMut(&[usize])>(&self, center: [i32; 3], ring: i32, mut visit: F) {
        if ring == 0 {
            if let Some(indices) = self.cells.get(&GridKey::new(center[0], center[1], center[2])) {
                visit(indices);
            }
            return;
        }
        for dx in -ring..=ring {
            for dy in -ring..=ring {
                for dz in -ring..=ring {
                    if dx.abs() != ring && dy.abs() != ring && dz.abs() != ring {
                        continue;
                    }
                    let key = GridKey::new(center[0] + dx, center[1] + dy, center[2] + dz);
                    if let Some(indices) = self.cells.get(&key) {
                        visit(indices);
                    }
                }
            }
        }
    }

    /// Closest indexed point within `max_distance`, if any
    pub fn nearest_within(&self, query: &Point3f, max_distance: f32) -> Option<(usize, f32)> {
        self.find_radius_neighbors(query, max_distance)
            .into_iter()
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

impl NearestNeighborSearch for SpatialIndex {
    /// Approximate: expands ring by ring up to the search horizon and stops
    /// once `k` candidates are certainly the closest among the visited cells.
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        if k == 0 || self.points.is_empty() {
            return Vec::new();
        }

        let center = cell_coords(query, self.cell_size);
        let mut found: Vec<(usize, f32)> = Vec::new();

        for ring in 0..=self.max_rings {
            self.visit_ring(center, ring, |indices| {
                found.extend(
                    indices
                        .iter()
                        .map(|&i| (i, (self.points[i] - query).norm())),
                );
            });

            // every point within `ring * cell_size` has been visited by now
            let complete_radius = ring as f32 * self.cell_size;
            if found.len() >= k {
                found.sort_by(|a, b| a.1.total_cmp(&b.1));
                if found[k - 1].1 <= complete_radius {
                    found.truncate(k);
                    return found;
                }
            }
        }

        found.sort_by(|a, b| a.1.total_cmp(&b.1));
        found.truncate(k);
        found
    }

    /// Complete for any radius: visits `ceil(radius / cell_size)` rings.
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        if !(radius >= 0.0) {
            return Vec::new();
        }
        let rings = (radius / self.cell_size).ceil() as i32;
        let mut out = Vec::new();
        self.visit_block(cell_coords(query, self.cell_size), rings, |indices| {
            for &i in indices {
                let distance = (self.points[i] - query).norm();
                if distance <= radius {
                    out.push((i, distance));
                }
            }
        });
        out
    }
}
