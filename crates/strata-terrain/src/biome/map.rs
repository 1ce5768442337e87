//! Single-channel world map: one biome id per pixel.

use std::path::Path;

use crate::error::TerrainError;

/// A decoded world-map image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldMap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl WorldMap {
    /// Build a map from row-major pixel data.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, TerrainError> {
        if width == 0 || height == 0 {
            return Err(TerrainError::InvalidWorldMap(format!(
                "{width}x{height} map has no pixels"
            )));
        }
        if pixels.len() != width as usize * height as usize {
            return Err(TerrainError::InvalidWorldMap(format!(
                "{width}x{height} map needs {} pixels, got {}",
                width as usize * height as usize,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A map holding a single biome everywhere.
    pub fn uniform(width: u32, height: u32, biome: u8) -> Result<Self, TerrainError> {
        Self::from_raw(width, height, vec![biome; width as usize * height as usize])
    }

    /// Decode an image file. Colour images are reduced to luma.
    pub fn load(path: &Path) -> Result<Self, TerrainError> {
        let image = image::open(path).map_err(|source| TerrainError::WorldMap {
            path: path.to_path_buf(),
            source,
        })?;
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();
        Self::from_raw(width, height, luma.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel under a world XZ position:
    /// `pixel = (pos + world_size / 2) / pixel_scale`, clamped to the image.
    pub fn pixel_for(&self, wx: f32, wz: f32, world_size: f32) -> (u32, u32) {
        let half = world_size * 0.5;
        let px = clamp_pixel((wx + half) / (world_size / self.width as f32), self.width);
        let pz = clamp_pixel((wz + half) / (world_size / self.height as f32), self.height);
        (px, pz)
    }

    /// Biome id under a world XZ position.
    pub fn sample(&self, wx: f32, wz: f32, world_size: f32) -> u8 {
        let (px, pz) = self.pixel_for(wx, wz, world_size);
        self.pixels[pz as usize * self.width as usize + px as usize]
    }
}

fn clamp_pixel(p: f32, extent: u32) -> u32 {
    // NaN falls through clamp as NaN and casts to 0.
    p.floor().clamp(0.0, (extent - 1) as f32) as u32
}
