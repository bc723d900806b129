// noise.rs — procedural noise synthesis (Perlin / Simplex / Worley)
//
// Pure functional core: every function is a deterministic map from
// (parameters, coordinates) to a scalar. The same seed and parameters
// always reproduce a bit-identical field, which the dirty-flag cache in
// the graph depends on.
//
// Fields are rendered row-parallel with rayon; each pixel is independent
// so parallelism cannot affect the output bytes.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

// ── Mulberry32 PRNG ─────────────────────────────────────────────────

/// Small deterministic PRNG used for permutation shuffling and Worley
/// feature-point scattering. 32-bit state, full avalanche per step.
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: i32) -> Self {
        Self { state: seed as u32 }
    }

    /// Next f64 in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x6d2b79f5);
        let mut t: u32 = (self.state ^ (self.state >> 15)).wrapping_mul(1 | self.state);
        t = t.wrapping_add((t ^ (t >> 7)).wrapping_mul(61 | t)) ^ t;
        ((t ^ (t >> 14)) as f64) / 4294967296.0
    }
}

// ── Permutation table ───────────────────────────────────────────────

/// Build a 512-entry permutation table: a Fisher-Yates shuffle of the
/// identity [0..255], duplicated into the upper half so corner hashing
/// never needs an index wrap.
pub fn build_perm_table(seed: i32) -> [u8; 512] {
    let mut rng = Mulberry32::new(seed);
    let mut perm = [0u8; 512];

    for i in 0..256u16 {
        perm[i as usize] = i as u8;
    }

    for i in (1..=255usize).rev() {
        let j = (rng.next_f64() * (i as f64 + 1.0)).floor() as usize;
        perm.swap(i, j);
    }

    for i in 0..256 {
        perm[i + 256] = perm[i];
    }

    perm
}

// ── Classic gradient (Perlin) noise ─────────────────────────────────

/// Quintic fade curve, C2-continuous at cell boundaries.
fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + t * (b - a)
}

/// Hash one of 16 gradient directions: magnitude 1..8 on both axes, sign
/// from bit 3 of the hash.
fn grad(hash: u8, x: f64, y: f64) -> f64 {
    let h = hash & 15;
    let mut gx = (1 + (h & 7)) as f64;
    let mut gy = gx;
    if h & 8 != 0 {
        gx = -gx;
        gy = -gy;
    }
    gx * x + gy * y
}

/// Classic 2D gradient noise over the unit lattice.
pub fn perlin_2d(perm: &[u8; 512], x: f64, y: f64) -> f64 {
    let xi = (x.floor() as i64 & 255) as usize;
    let yi = (y.floor() as i64 & 255) as usize;
    let xf = x - x.floor();
    let yf = y - y.floor();

    let u = fade(xf);
    let v = fade(yf);

    let a = perm[xi] as usize + yi;
    let b = perm[xi + 1] as usize + yi;
    let aa = perm[a] as usize;
    let ab = perm[a + 1] as usize;
    let ba = perm[b] as usize;
    let bb = perm[b + 1] as usize;

    lerp(
        lerp(grad(perm[aa], xf, yf), grad(perm[ba], xf - 1.0, yf), u),
        lerp(
            grad(perm[ab], xf, yf - 1.0),
            grad(perm[bb], xf - 1.0, yf - 1.0),
            u,
        ),
        v,
    )
}

/// Multi-octave fractal sum, normalized by the total amplitude so the
/// result stays in the base noise range regardless of octave count.
pub fn octave_perlin(
    perm: &[u8; 512],
    x: f64,
    y: f64,
    octaves: u32,
    persistence: f64,
    lacunarity: f64,
) -> f64 {
    let mut total = 0.0;
    let mut frequency = 1.0;
    let mut amplitude = 1.0;
    let mut max_value = 0.0;

    for _ in 0..octaves.max(1) {
        total += perlin_2d(perm, x * frequency, y * frequency) * amplitude;
        max_value += amplitude;
        amplitude *= persistence;
        frequency *= lacunarity;
    }

    total / max_value
}

// ── 2D Simplex noise ────────────────────────────────────────────────

// Skew/unskew constants: F2 = (sqrt(3) - 1) / 2, G2 = (3 - sqrt(3)) / 6
const F2: f64 = 0.36602540378443864676;
const G2: f64 = 0.21132486540518711775;

// 8 gradient directions (cardinal + diagonal, unnormalized)
const GRAD2: [[f64; 2]; 8] = [
    [1.0, 0.0],
    [-1.0, 0.0],
    [0.0, 1.0],
    [0.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [-1.0, -1.0],
];

/// 2D simplex noise in approximately [-1, 1].
pub fn simplex_2d(perm: &[u8; 512], x: f64, y: f64) -> f64 {
    // Skew input to simplex cell coordinates
    let s = (x + y) * F2;
    let i = (x + s).floor() as i64;
    let j = (y + s).floor() as i64;

    // Unskew to find the cell origin in input space
    let t = (i + j) as f64 * G2;
    let x0 = x - (i as f64 - t);
    let y0 = y - (j as f64 - t);

    // Which of the two triangles of the skewed square contains the point
    let (i1, j1) = if x0 > y0 { (1i64, 0i64) } else { (0i64, 1i64) };

    let x1 = x0 - i1 as f64 + G2;
    let y1 = y0 - j1 as f64 + G2;
    let x2 = x0 - 1.0 + 2.0 * G2;
    let y2 = y0 - 1.0 + 2.0 * G2;

    let ii = (i & 255) as usize;
    let jj = (j & 255) as usize;
    let gi0 = (perm[ii + perm[jj] as usize] % 8) as usize;
    let gi1 = (perm[ii + i1 as usize + perm[jj + j1 as usize] as usize] % 8) as usize;
    let gi2 = (perm[ii + 1 + perm[jj + 1] as usize] % 8) as usize;

    // Radially falling corner contributions; zero outside the kernel
    let mut n0 = 0.0;
    let mut n1 = 0.0;
    let mut n2 = 0.0;

    let mut t0 = 0.5 - x0 * x0 - y0 * y0;
    if t0 >= 0.0 {
        t0 *= t0;
        n0 = t0 * t0 * (GRAD2[gi0][0] * x0 + GRAD2[gi0][1] * y0);
    }

    let mut t1 = 0.5 - x1 * x1 - y1 * y1;
    if t1 >= 0.0 {
        t1 *= t1;
        n1 = t1 * t1 * (GRAD2[gi1][0] * x1 + GRAD2[gi1][1] * y1);
    }

    let mut t2 = 0.5 - x2 * x2 - y2 * y2;
    if t2 >= 0.0 {
        t2 *= t2;
        n2 = t2 * t2 * (GRAD2[gi2][0] * x2 + GRAD2[gi2][1] * y2);
    }

    70.0 * (n0 + n1 + n2)
}

// ── Worley (cellular) noise ─────────────────────────────────────────

/// Number of feature points scattered over a Worley field.
pub const WORLEY_POINT_COUNT: usize = 20;

/// Scatter feature points uniformly over a width x height field using
/// the seeded generator.
pub fn worley_points(seed: i32, width: u32, height: u32, count: usize) -> Vec<(f64, f64)> {
    let mut rng = Mulberry32::new(seed);
    (0..count)
        .map(|_| {
            let x = rng.next_f64() * width as f64;
            let y = rng.next_f64() * height as f64;
            (x, y)
        })
        .collect()
}

/// Distance to the two nearest feature points; cell boundaries show up
/// where the two distances converge.
pub fn worley_f2_minus_f1(points: &[(f64, f64)], x: f64, y: f64) -> f64 {
    let mut d1 = f64::INFINITY;
    let mut d2 = f64::INFINITY;

    for &(px, py) in points {
        let dx = x - px;
        let dy = y - py;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist < d1 {
            d2 = d1;
            d1 = dist;
        } else if dist < d2 {
            d2 = dist;
        }
    }

    d2 - d1
}

// ── Field synthesis ─────────────────────────────────────────────────

/// Noise algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseAlgorithm {
    Perlin,
    Simplex,
    Worley,
}

/// Parameters of a single-channel scalar noise field.
///
/// `scale` divides pixel coordinates before sampling (larger scale =
/// lower spatial frequency). `octaves`, `persistence` and `lacunarity`
/// only affect the Perlin fractal sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseSynth {
    pub algorithm: NoiseAlgorithm,
    pub seed: i32,
    pub scale: f32,
    pub octaves: u32,
    pub persistence: f32,
    pub lacunarity: f32,
}

impl Default for NoiseSynth {
    fn default() -> Self {
        NoiseSynth {
            algorithm: NoiseAlgorithm::Perlin,
            seed: 1234,
            scale: 50.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

#[inline]
fn quantize_signed(v: f64) -> u8 {
    // [-1, 1] -> [0, 255], saturating
    (((v + 1.0) * 0.5 * 255.0).round()).clamp(0.0, 255.0) as u8
}

#[inline]
fn quantize_unsigned(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

impl NoiseSynth {
    /// Effective scale; a zero or near-zero scale falls back to 1 so the
    /// coordinate divide stays finite.
    fn effective_scale(&self) -> f64 {
        let s = self.scale as f64;
        if s.abs() < 1e-6 {
            1.0
        } else {
            s
        }
    }

    /// Render a width x height single-channel field, quantized to u8
    /// with saturation. Deterministic for identical parameters.
    pub fn render(&self, width: u32, height: u32) -> Vec<u8> {
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let w = width as usize;
        let h = height as usize;
        let scale = self.effective_scale();
        let mut data = vec![0u8; w * h];

        match self.algorithm {
            NoiseAlgorithm::Perlin => {
                let perm = build_perm_table(self.seed);
                let (octaves, persistence, lacunarity) = (
                    self.octaves,
                    self.persistence as f64,
                    self.lacunarity as f64,
                );
                data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
                    for (x, out) in row.iter_mut().enumerate() {
                        let nx = x as f64 / scale;
                        let ny = y as f64 / scale;
                        let v = octave_perlin(&perm, nx, ny, octaves, persistence, lacunarity);
                        *out = quantize_signed(v);
                    }
                });
            }
            NoiseAlgorithm::Simplex => {
                let perm = build_perm_table(self.seed);
                data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
                    for (x, out) in row.iter_mut().enumerate() {
                        let nx = x as f64 / scale;
                        let ny = y as f64 / scale;
                        let v = simplex_2d(&perm, nx, ny);
                        *out = quantize_signed(v);
                    }
                });
            }
            NoiseAlgorithm::Worley => {
                let points = worley_points(self.seed, width, height, WORLEY_POINT_COUNT);
                data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
                    for (x, out) in row.iter_mut().enumerate() {
                        let v = worley_f2_minus_f1(&points, x as f64, y as f64) / scale;
                        *out = quantize_unsigned(v);
                    }
                });
            }
        }

        data
    }
}
