//! Integer hashing and hash-based value noise.

/// PCG output permutation of a single 32-bit state.
#[inline]
pub fn pcg(v: u32) -> u32 {
    let state = v.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Hash a seed with a 2D integer lattice coordinate.
#[inline]
pub fn hash2(seed: u32, x: i32, z: i32) -> u32 {
    pcg(pcg(pcg(seed) ^ x as u32) ^ z as u32)
}

/// Map a hash to `[0, 1)` using its top 24 bits.
#[inline]
pub fn unit(h: u32) -> f32 {
    (h >> 8) as f32 * (1.0 / 16_777_216.0)
}

#[inline]
fn fade(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Smoothly interpolated lattice noise in `[0, 1)`.
pub fn value_noise(x: f32, z: f32, seed: u32) -> f32 {
    let x0 = x.floor();
    let z0 = z.floor();
    let ix = x0 as i32;
    let iz = z0 as i32;
    let ux = fade(x - x0);
    let uz = fade(z - z0);

    let a = unit(hash2(seed, ix, iz));
    let b = unit(hash2(seed, ix.wrapping_add(1), iz));
    let c = unit(hash2(seed, ix, iz.wrapping_add(1)));
    let d = unit(hash2(seed, ix.wrapping_add(1), iz.wrapping_add(1)));

    lerp(lerp(a, b, ux), lerp(c, d, ux), uz)
}

/// Octave settings for [`fbm`].
#[derive(Debug, Clone, Copy)]
pub struct Octaves {
    pub amplitude: f32,
    pub base_frequency: f32,
    pub octaves: u32,
    pub persistence: f32,
    pub lacunarity: f32,
}

/// Fractal sum of signed value noise. Octave `i` is seeded with `seed + i`.
pub fn fbm(x: f32, z: f32, seed: u32, o: Octaves) -> f32 {
    let mut total = 0.0;
    let mut frequency = o.base_frequency;
    let mut amplitude = o.amplitude;
    for i in 0..o.octaves {
        let n = value_noise(x * frequency, z * frequency, seed.wrapping_add(i));
        total += (n * 2.0 - 1.0) * amplitude;
        frequency *= o.lacunarity;
        amplitude *= o.persistence;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic_and_seed_sensitive() {
        assert_eq!(hash2(7, 3, -4), hash2(7, 3, -4));
        assert_ne!(hash2(7, 3, -4), hash2(8, 3, -4));
        assert_ne!(hash2(7, 3, -4), hash2(7, -4, 3));
    }

    #[test]
    fn test_unit_range() {
        assert_eq!(unit(0), 0.0);
        assert!(unit(u32::MAX) < 1.0);
    }

    #[test]
    fn test_value_noise_range() {
        for i in 0..500 {
            let x = i as f32 * 0.37 - 90.0;
            let z = i as f32 * -0.53 + 12.0;
            let n = value_noise(x, z, 42);
            assert!((0.0..1.0).contains(&n), "noise {n} out of range at ({x}, {z})");
        }
    }

    #[test]
    fn test_value_noise_matches_lattice_at_integers() {
        let n = value_noise(5.0, -3.0, 9);
        assert_eq!(n, unit(hash2(9, 5, -3)));
    }

    #[test]
    fn test_fbm_bounded_by_amplitude_sum() {
        let o = Octaves {
            amplitude: 10.0,
            base_frequency: 0.05,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        };
        let bound = 10.0 + 5.0 + 2.5 + 1.25;
        for i in 0..200 {
            let v = fbm(i as f32 * 3.1, i as f32 * 1.7, 1, o);
            assert!(v.abs() <= bound);
        }
    }

    #[test]
    fn test_fbm_zero_octaves_is_flat() {
        let o = Octaves {
            amplitude: 10.0,
            base_frequency: 0.05,
            octaves: 0,
            persistence: 0.5,
            lacunarity: 2.0,
        };
        assert_eq!(fbm(12.0, 4.0, 3, o), 0.0);
    }
}
