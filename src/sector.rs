//! Sector hashing for coarse spatial indexing
//!
//! Space is partitioned into cubes of side `grid_size` light-years. A
//! point's sector id is a truncated hex digest of its integer cube
//! coordinates, so equality checks and index lookups never touch floats.
//! The hasher is pure; both parameters are fixed for the lifetime of a
//! dataset (changing either requires a full rebuild).

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct SectorGrid {
    grid_size: f64,
    hash_length: usize,
}

impl SectorGrid {
    pub fn new(grid_size: f64, hash_length: usize) -> Self {
        Self {
            grid_size,
            hash_length,
        }
    }

    /// Sector id for a point in space
    pub fn sector_id(&self, x: f64, y: f64, z: f64) -> String {
        let gx = (x / self.grid_size).floor() as i64;
        let gy = (y / self.grid_size).floor() as i64;
        let gz = (z / self.grid_size).floor() as i64;
        self.cube_id(gx, gy, gz)
    }

    /// Every sector id whose cube intersects the bounding box of the
    /// sphere centered at `(x, y, z)` with the given radius
    ///
    /// The box over-includes corner cubes; callers that need exact
    /// membership follow up with a distance check. No sphere point can
    /// land outside the returned set.
    pub fn nearby_sectors(&self, x: f64, y: f64, z: f64, radius: f64) -> Vec<String> {
        let range = |c: f64| {
            let lo = ((c - radius) / self.grid_size).floor() as i64;
            let hi = ((c + radius) / self.grid_size).ceil() as i64;
            lo..=hi
        };

        let mut sectors = Vec::new();
        for gx in range(x) {
            for gy in range(y) {
                for gz in range(z) {
                    sectors.push(self.cube_id(gx, gy, gz));
                }
            }
        }
        sectors
    }

    /// Content hash identifying a surface point of interest
    ///
    /// Keyed over the fields that make the point unique; absent fields
    /// hash as empty strings so the id is stable across partial payloads.
    pub fn location_id(
        &self,
        system_address: i64,
        name: &str,
        body_id: Option<i64>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> String {
        let input = format!(
            "{}|{}|{}|{}|{}",
            system_address,
            name,
            body_id.map(|v| v.to_string()).unwrap_or_default(),
            latitude.map(|v| v.to_string()).unwrap_or_default(),
            longitude.map(|v| v.to_string()).unwrap_or_default(),
        );
        self.digest(&input)
    }

    fn cube_id(&self, gx: i64, gy: i64, gz: i64) -> String {
        self.digest(&format!("{}:{}:{}", gx, gy, gz))
    }

    fn digest(&self, input: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(self.hash_length);
        for byte in digest.iter() {
            if hex.len() >= self.hash_length {
                break;
            }
            hex.push_str(&format!("{:02x}", byte));
        }
        hex.truncate(self.hash_length);
        hex
    }
}

impl Default for SectorGrid {
    fn default() -> Self {
        Self::new(100.0, 16)
    }
}
