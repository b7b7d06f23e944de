//! # Seeded Simplex Noise
//!
//! 2D simplex noise driven entirely by a [`WorldSeed`]. No global state, no
//! time, no thread-local RNG: two generators built from the same seed return
//! the same value for the same coordinates, every run.

/// Seed for all procedural generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct WorldSeed(u64);

impl WorldSeed {
    /// Wraps a raw seed.
    #[inline]
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Raw seed value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Derives an independent sub-seed for `purpose`.
    ///
    /// SplitMix64 finalizer over `seed ^ purpose * golden-ratio`.
    #[inline]
    #[must_use]
    pub const fn derive(self, purpose: u64) -> Self {
        let mut z = self.0 ^ purpose.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        Self(z ^ (z >> 31))
    }

    /// Derives a sub-seed from a string label (dimension ids, hook names).
    #[must_use]
    pub fn derive_str(self, label: &str) -> Self {
        // FNV-1a over the label bytes.
        let mut hash: u64 = 0xCBF2_9CE4_8422_2325;
        for byte in label.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01B3);
        }
        self.derive(hash)
    }
}

const GRADIENTS: [[f64; 2]; 8] = [
    [1.0, 0.0],
    [-1.0, 0.0],
    [0.0, 1.0],
    [0.0, -1.0],
    [0.707_106_781_186_547_6, 0.707_106_781_186_547_6],
    [-0.707_106_781_186_547_6, 0.707_106_781_186_547_6],
    [0.707_106_781_186_547_6, -0.707_106_781_186_547_6],
    [-0.707_106_781_186_547_6, -0.707_106_781_186_547_6],
];

/// 2D simplex noise with output in `[-1, 1]`.
#[derive(Clone)]
pub struct SimplexNoise {
    /// Shuffled 0..256, stored twice so `perm[i + perm[j]]` never wraps.
    perm: [u8; 512],
}

impl SimplexNoise {
    const SKEW: f64 = 0.366_025_403_784_438_6; // (sqrt(3) - 1) / 2
    const UNSKEW: f64 = 0.211_324_865_405_187_1; // (3 - sqrt(3)) / 6

    /// Builds the permutation table from `seed`.
    #[must_use]
    pub fn new(seed: WorldSeed) -> Self {
        let mut table = [0u8; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = i as u8;
        }

        // Fisher-Yates driven by xorshift64*; zero state would stall it.
        let mut state = seed.derive(0x5EED).value() | 1;
        for i in (1..256usize).rev() {
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            let r = state.wrapping_mul(0x2545_F491_4F6C_DD1D);
            let j = (r % (i as u64 + 1)) as usize;
            table.swap(i, j);
        }

        let mut perm = [0u8; 512];
        perm[..256].copy_from_slice(&table);
        perm[256..].copy_from_slice(&table);
        Self { perm }
    }

    #[inline]
    fn hash(&self, i: i64, j: i64) -> usize {
        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;
        self.perm[ii + self.perm[jj] as usize] as usize
    }

    #[inline]
    fn corner(&self, x: f64, y: f64, gi: usize) -> f64 {
        let t = 0.5 - x * x - y * y;
        if t <= 0.0 {
            return 0.0;
        }
        let g = GRADIENTS[gi & 7];
        let t2 = t * t;
        t2 * t2 * (g[0] * x + g[1] * y)
    }

    /// Samples the noise field at `(x, y)`.
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let s = (x + y) * Self::SKEW;
        let i = (x + s).floor() as i64;
        let j = (y + s).floor() as i64;

        let t = (i + j) as f64 * Self::UNSKEW;
        let x0 = x - (i as f64 - t);
        let y0 = y - (j as f64 - t);

        let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

        let x1 = x0 - i1 as f64 + Self::UNSKEW;
        let y1 = y0 - j1 as f64 + Self::UNSKEW;
        let x2 = x0 - 1.0 + 2.0 * Self::UNSKEW;
        let y2 = y0 - 1.0 + 2.0 * Self::UNSKEW;

        let n0 = self.corner(x0, y0, self.hash(i, j));
        let n1 = self.corner(x1, y1, self.hash(i + i1, j + j1));
        let n2 = self.corner(x2, y2, self.hash(i + 1, j + 1));

        // 99.2 brings the theoretical peak of the 8-gradient set close to 1.
        (99.2 * (n0 + n1 + n2)).clamp(-1.0, 1.0)
    }

    /// Layered (fractal) noise normalized back to `[-1, 1]`.
    ///
    /// Each layer doubles the frequency (`lacunarity`) and scales the
    /// amplitude by `persistence`.
    #[must_use]
    pub fn layered(&self, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
        let octaves = octaves.max(1);
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut norm = 0.0;

        for octave in 0..octaves {
            // Offset each layer so octaves don't share lattice points.
            let offset = f64::from(octave) * 17.31;
            total += self.sample(x * frequency + offset, y * frequency - offset) * amplitude;
            norm += amplitude;
            amplitude *= persistence;
            frequency *= lacunarity;
        }

        total / norm
    }
}
