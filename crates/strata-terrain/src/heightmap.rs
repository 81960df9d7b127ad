//! Heightmap providers.
//!
//! The decoration pipeline never computes terrain shape itself; it asks a
//! [`HeightmapProvider`]. Two are included: a flat one for tests and a
//! multi-octave fBm one over simplex noise for the server.

use noise::{NoiseFn, Simplex};
use strata_math::TileCoord;

/// Height and climate for one block column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainSample {
    pub height: i32,
    pub temperature: f32,
    pub moisture: f32,
}

pub trait HeightmapProvider: Send + Sync {
    /// Surface y of the column at `(local_x, local_z)` inside `tile`.
    fn surface_height(&self, tile: TileCoord, local_x: i32, local_z: i32) -> i32;

    fn sample_cell(&self, tile: TileCoord, local_x: i32, local_z: i32) -> TerrainSample {
        TerrainSample {
            height: self.surface_height(tile, local_x, local_z),
            temperature: 0.5,
            moisture: 0.5,
        }
    }
}

/// Constant surface height everywhere.
#[derive(Clone, Copy, Debug)]
pub struct FlatHeightmap {
    pub height: i32,
}

impl FlatHeightmap {
    pub fn new(height: i32) -> Self {
        Self { height }
    }
}

impl HeightmapProvider for FlatHeightmap {
    fn surface_height(&self, _tile: TileCoord, _local_x: i32, _local_z: i32) -> i32 {
        self.height
    }
}

/// fBm parameters. Each octave doubles frequency (lacunarity 2) and halves
/// amplitude (persistence 0.5) by default.
#[derive(Clone, Debug)]
pub struct HeightmapParams {
    pub seed: u64,
    pub octaves: u32,
    pub lacunarity: f64,
    pub persistence: f64,
    pub base_frequency: f64,
    pub amplitude: f64,
    /// Height the noise oscillates around.
    pub base_height: i32,
    pub min_height: i32,
    pub max_height: i32,
}

impl Default for HeightmapParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 5,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 0.006,
            amplitude: 18.0,
            base_height: 68,
            min_height: 8,
            max_height: 200,
        }
    }
}

pub struct NoiseHeightmap {
    noise: Simplex,
    temperature: Simplex,
    moisture: Simplex,
    params: HeightmapParams,
}

impl NoiseHeightmap {
    pub fn new(params: HeightmapParams) -> Self {
        Self {
            noise: Simplex::new(params.seed as u32),
            temperature: Simplex::new(params.seed.wrapping_add(0x7E3A) as u32),
            moisture: Simplex::new(params.seed.wrapping_add(0x3C1F) as u32),
            params,
        }
    }

    /// Raw fBm value at a block column.
    pub fn sample(&self, x: f64, z: f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;
        for _ in 0..self.params.octaves {
            total += self.noise.get([x * frequency, z * frequency]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }
        total
    }

    /// Geometric sum of octave amplitudes, the bound on `|sample|`.
    pub fn max_amplitude(&self) -> f64 {
        let mut sum = 0.0;
        let mut amp = self.params.amplitude;
        for _ in 0..self.params.octaves {
            sum += amp;
            amp *= self.params.persistence;
        }
        sum
    }

    pub fn params(&self) -> &HeightmapParams {
        &self.params
    }
}

impl HeightmapProvider for NoiseHeightmap {
    fn surface_height(&self, tile: TileCoord, local_x: i32, local_z: i32) -> i32 {
        let x = f64::from(tile.block_x() + local_x);
        let z = f64::from(tile.block_z() + local_z);
        let h = f64::from(self.params.base_height) + self.sample(x, z);
        (libm::floor(h) as i32).clamp(self.params.min_height, self.params.max_height)
    }

    fn sample_cell(&self, tile: TileCoord, local_x: i32, local_z: i32) -> TerrainSample {
        let x = f64::from(tile.block_x() + local_x) * 0.002;
        let z = f64::from(tile.block_z() + local_z) * 0.002;
        TerrainSample {
            height: self.surface_height(tile, local_x, local_z),
            temperature: ((self.temperature.get([x, z]) + 1.0) * 0.5) as f32,
            moisture: ((self.moisture.get([x, z]) + 1.0) * 0.5) as f32,
        }
    }
}
