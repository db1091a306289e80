//! World coordinates and their wire forms
//!
//! A [`Position`] is an absolute tile (x, z, plane). Zones are 8x8 tiles,
//! mapsquares are 64x64. A [`BaseArea`] describes the square of tiles the
//! client keeps loaded around the player; its zone window determines which
//! mapsquares (and so which region keys) are sent on a map rebuild.

use std::ops::RangeInclusive;

use crate::game::constants::map::BASE_AREA_SIZE;

/// Mask for one 14-bit coordinate in the high-resolution form
const COORD_MASK: u32 = 0x3FFF;

/// Absolute world tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub z: i32,
    pub plane: u8,
}

impl Position {
    pub const fn new(x: i32, z: i32, plane: u8) -> Self {
        Self { x, z, plane }
    }

    pub fn zone_x(&self) -> i32 {
        self.x >> 3
    }

    pub fn zone_z(&self) -> i32 {
        self.z >> 3
    }

    /// Offset within the zone (0..=7)
    pub fn local_x(&self) -> i32 {
        self.x & 7
    }

    pub fn local_z(&self) -> i32 {
        self.z & 7
    }

    pub fn mapsquare_x(&self) -> i32 {
        self.x >> 6
    }

    pub fn mapsquare_z(&self) -> i32 {
        self.z >> 6
    }

    /// 30-bit packed form: plane in bits 28..30, x in 14..28, z in 0..14
    pub fn high_res(&self) -> u32 {
        assert!(self.plane < 4, "plane {} out of range", self.plane);
        (self.z as u32 & COORD_MASK)
            | (self.x as u32 & COORD_MASK) << 14
            | (self.plane as u32) << 28
    }

    /// Inverse of [`Position::high_res`], as the client decodes it
    pub fn from_high_res(packed: u32) -> Self {
        Self {
            x: ((packed >> 14) & COORD_MASK) as i32,
            z: (packed & COORD_MASK) as i32,
            plane: ((packed >> 28) & 3) as u8,
        }
    }

    /// Chebyshev distance in tiles, `None` across planes
    pub fn distance(&self, other: &Position) -> Option<i32> {
        (self.plane == other.plane)
            .then(|| (self.x - other.x).abs().max((self.z - other.z).abs()))
    }
}

/// Loaded map area around a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseArea {
    /// Index of the size preset, echoed to the client
    pub index: u8,
    pub size_x: i32,
    pub size_z: i32,
}

impl Default for BaseArea {
    fn default() -> Self {
        Self::square(BASE_AREA_SIZE)
    }
}

impl BaseArea {
    pub fn square(size: i32) -> Self {
        Self { index: 0, size_x: size, size_z: size }
    }

    /// Zone half-extent in each axis
    pub fn half_zones(&self) -> (i32, i32) {
        (self.size_x >> 4, self.size_z >> 4)
    }

    /// Zones covered around `pos`, `2 * (size >> 4) + 1` per axis
    pub fn zone_bounds(&self, pos: &Position) -> (RangeInclusive<i32>, RangeInclusive<i32>) {
        let (hx, hz) = self.half_zones();
        (
            pos.zone_x() - hx..=pos.zone_x() + hx,
            pos.zone_z() - hz..=pos.zone_z() + hz,
        )
    }

    /// Mapsquares overlapped by the zone window, x-major
    pub fn mapsquares(&self, pos: &Position) -> MapsquareGrid {
        let (xs, zs) = self.zone_bounds(pos);
        MapsquareGrid::new(xs.start() >> 3..=xs.end() >> 3, zs.start() >> 3..=zs.end() >> 3)
    }
}

/// Iterator over (mapsquare x, mapsquare z) pairs
#[derive(Debug, Clone)]
pub struct MapsquareGrid {
    x: i32,
    z: i32,
    min_z: i32,
    max_x: i32,
    max_z: i32,
}

impl MapsquareGrid {
    fn new(xs: RangeInclusive<i32>, zs: RangeInclusive<i32>) -> Self {
        Self {
            x: *xs.start(),
            z: *zs.start(),
            min_z: *zs.start(),
            max_x: *xs.end(),
            max_z: *zs.end(),
        }
    }
}

impl Iterator for MapsquareGrid {
    type Item = (i32, i32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.x > self.max_x || self.min_z > self.max_z {
            return None;
        }
        let item = (self.x, self.z);
        if self.z == self.max_z {
            self.z = self.min_z;
            self.x += 1;
        } else {
            self.z += 1;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.x > self.max_x || self.min_z > self.max_z {
            return (0, Some(0));
        }
        let columns = (self.max_z - self.min_z + 1) as usize;
        let rest = (self.max_x - self.x) as usize * columns + (self.max_z - self.z + 1) as usize;
        (rest, Some(rest))
    }
}

impl ExactSizeIterator for MapsquareGrid {}
