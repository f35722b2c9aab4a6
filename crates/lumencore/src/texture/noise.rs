//! Procedural noise kernels shared by every noise-family texture node.
//!
//! Every noise family in the spec (Perlin, Voronoi, Musgrave, distorted
//! noise, clouds, marble, wood) is composed from one gradient-noise kernel,
//! the way the original renderer's `basictex.cc` layers its noise families
//! on a shared Perlin base rather than reimplementing each from scratch.

use glam::Vec3;

const PERM_SIZE: usize = 256;

/// A fixed, deterministic permutation table (classic Perlin-noise style).
/// Deterministic so repeated evaluations at the same point are bit-identical
/// (the crate-wide texture-DAG determinism property).
fn permutation() -> &'static [u8; 512] {
    static TABLE: std::sync::OnceLock<[u8; 512]> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        // A fixed pseudo-random shuffle, seeded deterministically so the
        // table is identical on every process start (no RNG dependency).
        let mut p: [u8; PERM_SIZE] = [0; PERM_SIZE];
        for (i, slot) in p.iter_mut().enumerate() {
            *slot = i as u8;
        }
        let mut state: u32 = 0x9E3779B9;
        let mut next_rand = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };
        for i in (1..PERM_SIZE).rev() {
            let j = (next_rand() as usize) % (i + 1);
            p.swap(i, j);
        }
        let mut out = [0u8; 512];
        out[..PERM_SIZE].copy_from_slice(&p);
        out[PERM_SIZE..].copy_from_slice(&p);
        out
    })
}

fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) - 10.0)
}

fn grad(hash: u8, x: f32, y: f32, z: f32) -> f32 {
    let h = hash & 15;
    let u = if h < 8 { x } else { y };
    let v = if h < 4 {
        y
    } else if h == 12 || h == 14 {
        x
    } else {
        z
    };
    (if h & 1 == 0 { u } else { -u }) + (if h & 2 == 0 { v } else { -v })
}

/// Classic Perlin gradient noise, range approximately `[-1, 1]`.
pub fn perlin(p: Vec3) -> f32 {
    let perm = permutation();
    let xi = p.x.floor() as i32 & 255;
    let yi = p.y.floor() as i32 & 255;
    let zi = p.z.floor() as i32 & 255;
    let xf = p.x - p.x.floor();
    let yf = p.y - p.y.floor();
    let zf = p.z - p.z.floor();
    let u = fade(xf);
    let v = fade(yf);
    let w = fade(zf);

    let idx = |dx: i32, dy: i32, dz: i32| -> u8 {
        let a = perm[((xi + dx) & 255) as usize] as i32;
        let b = perm[((a + yi + dy) & 255) as usize] as i32;
        perm[((b + zi + dz) & 255) as usize]
    };

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;

    let c000 = grad(idx(0, 0, 0), xf, yf, zf);
    let c100 = grad(idx(1, 0, 0), xf - 1.0, yf, zf);
    let c010 = grad(idx(0, 1, 0), xf, yf - 1.0, zf);
    let c110 = grad(idx(1, 1, 0), xf - 1.0, yf - 1.0, zf);
    let c001 = grad(idx(0, 0, 1), xf, yf, zf - 1.0);
    let c101 = grad(idx(1, 0, 1), xf - 1.0, yf, zf - 1.0);
    let c011 = grad(idx(0, 1, 1), xf, yf - 1.0, zf - 1.0);
    let c111 = grad(idx(1, 1, 1), xf - 1.0, yf - 1.0, zf - 1.0);

    let x00 = lerp(c000, c100, u);
    let x10 = lerp(c010, c110, u);
    let x01 = lerp(c001, c101, u);
    let x11 = lerp(c011, c111, u);
    let y0 = lerp(x00, x10, v);
    let y1 = lerp(x01, x11, v);
    lerp(y0, y1, w)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VoronoiKind {
    F1,
    F2,
    F3,
    F4,
    F2MinusF1,
    Crackle,
}

/// Nearest feature-point distances to the four closest cell centers in the
/// unit-cube neighborhood of `p`, sorted ascending.
fn voronoi_distances(p: Vec3) -> [f32; 4] {
    let perm = permutation();
    let cell = p.floor();
    let mut dists = [f32::INFINITY; 4];
    for dz in -1..=1 {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let c = cell + Vec3::new(dx as f32, dy as f32, dz as f32);
                let xi = (c.x as i32) & 255;
                let yi = (c.y as i32) & 255;
                let zi = (c.z as i32) & 255;
                let h0 = perm[xi as usize] as i32;
                let h1 = perm[((h0 + yi) & 255) as usize] as i32;
                let h2 = perm[((h1 + zi) & 255) as usize] as u32;
                // Three independent hashed offsets in [0,1) from one 8-bit
                // hash word via bit-rotation, avoiding correlated axes.
                let fx = ((h2.wrapping_mul(2654435761)) & 0xffff) as f32 / 65536.0;
                let fy = ((h2.wrapping_mul(2246822519)) & 0xffff) as f32 / 65536.0;
                let fz = ((h2.wrapping_mul(3266489917)) & 0xffff) as f32 / 65536.0;
                let feature = c + Vec3::new(fx, fy, fz);
                let d = (feature - p).length();
                if d < dists[3] {
                    dists[3] = d;
                    dists.sort_by(|a, b| a.partial_cmp(b).unwrap());
                }
            }
        }
    }
    dists
}

pub fn voronoi(p: Vec3, kind: VoronoiKind) -> f32 {
    let d = voronoi_distances(p);
    match kind {
        VoronoiKind::F1 => d[0],
        VoronoiKind::F2 => d[1],
        VoronoiKind::F3 => d[2],
        VoronoiKind::F4 => d[3],
        VoronoiKind::F2MinusF1 => d[1] - d[0],
        VoronoiKind::Crackle => (d[1] - d[0]).min(1.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MusgraveKind {
    Fbm,
    Multifractal,
    HeteroTerrain,
    HybridMultifractal,
    RidgedMultifractal,
}

pub struct MusgraveParams {
    pub octaves: u32,
    pub lacunarity: f32,
    pub gain: f32,
    pub offset: f32,
}

impl Default for MusgraveParams {
    fn default() -> Self {
        MusgraveParams { octaves: 6, lacunarity: 2.0, gain: 0.5, offset: 1.0 }
    }
}

/// Musgrave's fractal noise family, all built by fractal-summing the same
/// Perlin kernel with different per-octave weighting rules.
pub fn musgrave(p: Vec3, kind: MusgraveKind, params: &MusgraveParams) -> f32 {
    match kind {
        MusgraveKind::Fbm => {
            let mut sum = 0.0;
            let mut freq = 1.0;
            let mut amp = 1.0;
            for _ in 0..params.octaves {
                sum += perlin(p * freq) * amp;
                freq *= params.lacunarity;
                amp *= params.gain;
            }
            sum
        }
        MusgraveKind::Multifractal => {
            let mut value = 1.0;
            let mut freq = 1.0;
            let mut amp = 1.0;
            for _ in 0..params.octaves {
                value *= amp * perlin(p * freq) + 1.0;
                freq *= params.lacunarity;
                amp *= params.gain;
            }
            value
        }
        MusgraveKind::HeteroTerrain => {
            let mut freq = 1.0;
            let mut amp = params.gain;
            let mut value = params.offset + perlin(p);
            for _ in 1..params.octaves {
                freq *= params.lacunarity;
                let increment = (perlin(p * freq) + params.offset) * amp * value;
                value += increment;
                amp *= params.gain;
            }
            value
        }
        MusgraveKind::HybridMultifractal => {
            let mut freq = 1.0;
            let mut amp = params.gain;
            let mut value = (perlin(p) + params.offset) * amp;
            let mut weight = value;
            for _ in 1..params.octaves {
                freq *= params.lacunarity;
                if weight > 1.0 {
                    weight = 1.0;
                }
                let signal = (perlin(p * freq) + params.offset) * amp;
                value += weight * signal;
                weight *= signal;
                amp *= params.gain;
            }
            value
        }
        MusgraveKind::RidgedMultifractal => {
            let mut freq = 1.0;
            let mut amp = 1.0;
            let mut weight = 1.0;
            let mut value = 0.0;
            for _ in 0..params.octaves {
                let mut signal = params.offset - perlin(p * freq).abs();
                signal = signal * signal * weight;
                weight = (signal * amp).clamp(0.0, 1.0);
                value += signal * amp;
                freq *= params.lacunarity;
                amp *= params.gain;
            }
            value
        }
    }
}

/// Perlin noise evaluated at a point distorted by another Perlin field along
/// each axis, producing turbulent warping.
pub fn distorted_noise(p: Vec3, distortion: f32) -> f32 {
    let offset = Vec3::new(
        perlin(p + Vec3::new(5.2, 1.3, 7.1)),
        perlin(p + Vec3::new(9.8, 2.2, 0.5)),
        perlin(p + Vec3::new(1.1, 8.4, 4.7)),
    ) * distortion;
    perlin(p + offset)
}

/// Turbulence: a sum of `|perlin|` at doubling frequencies, the basis for
/// clouds, marble, and wood.
pub fn turbulence(p: Vec3, octaves: u32) -> f32 {
    let mut sum = 0.0;
    let mut freq = 1.0;
    let mut amp = 1.0;
    for _ in 0..octaves {
        sum += perlin(p * freq).abs() * amp;
        freq *= 2.0;
        amp *= 0.5;
    }
    sum
}

pub fn clouds(p: Vec3, octaves: u32) -> f32 {
    (turbulence(p, octaves) * 0.5 + 0.5).clamp(0.0, 1.0)
}

pub fn marble(p: Vec3, octaves: u32, turbulence_strength: f32) -> f32 {
    let t = (p.x + p.y + p.z) * 5.0 + turbulence_strength * turbulence(p, octaves);
    (t.sin() * 0.5 + 0.5).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WoodWaveform {
    Saw,
    Sine,
    Triangle,
}

pub fn wood(p: Vec3, waveform: WoodWaveform, octaves: u32) -> f32 {
    let radial = (p.x * p.x + p.y * p.y).sqrt() * 10.0 + turbulence(p, octaves) * 2.0;
    match waveform {
        WoodWaveform::Saw => radial.rem_euclid(1.0),
        WoodWaveform::Sine => (radial * std::f32::consts::TAU).sin() * 0.5 + 0.5,
        WoodWaveform::Triangle => {
            let t = radial.rem_euclid(1.0);
            1.0 - (2.0 * t - 1.0).abs()
        }
    }
}
