//! Packed integer keys for uniform 3D grids
//!
//! Spatial hashing and the sparse fusion volume both address cells by an
//! integer 3-tuple. `GridKey` packs that tuple into a single `u64` (21 bits per
//! axis, biased) so lookups never allocate.

use crate::point::Point3f;
use serde::{Deserialize, Serialize};

const AXIS_BITS: u32 = 21;
const AXIS_MASK: u64 = (1 << AXIS_BITS) - 1;
const AXIS_BIAS: i64 = 1 << (AXIS_BITS - 1);

/// Smallest cell coordinate representable without wrapping
pub const GRID_MIN: i32 = -(AXIS_BIAS as i32);
/// Largest cell coordinate representable without wrapping
pub const GRID_MAX: i32 = (AXIS_BIAS - 1) as i32;

/// A bit-packed signed 3D cell coordinate.
///
/// Coordinates outside `GRID_MIN..=GRID_MAX` wrap around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridKey(u64);

impl GridKey {
    /// Pack a cell coordinate
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        let pack = |c: i32| ((c as i64 + AXIS_BIAS) as u64) & AXIS_MASK;
        Self((pack(x) << (2 * AXIS_BITS)) | (pack(y) << AXIS_BITS) | pack(z))
    }

    /// Key of the cell containing `point` for the given cell size
    pub fn from_point(point: &Point3f, cell_size: f32) -> Self {
        let [x, y, z] = cell_coords(point, cell_size);
        Self::new(x, y, z)
    }

    /// Unpack the cell coordinate
    pub fn coords(self) -> [i32; 3] {
        let unpack = |bits: u64| ((bits & AXIS_MASK) as i64 - AXIS_BIAS) as i32;
        [
            unpack(self.0 >> (2 * AXIS_BITS)),
            unpack(self.0 >> AXIS_BITS),
            unpack(self.0),
        ]
    }

    /// Key of the cell displaced by the given offset
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        let [x, y, z] = self.coords();
        Self::new(x + dx, y + dy, z + dz)
    }

    /// Raw packed value
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Integer cell coordinate of `point`: `floor(coord / cell_size)` per axis
pub fn cell_coords(point: &Point3f, cell_size: f32) -> [i32; 3] {
    [
        (point.x / cell_size).floor() as i32,
        (point.y / cell_size).floor() as i32,
        (point.z / cell_size).floor() as i32,
    ]
}
