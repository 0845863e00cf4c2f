//! Shared scalar math used by every stage kernel.
//!
//! The GPU shaders reimplement these functions in WGSL; both sides must stay
//! in lockstep because CPU and GPU renders are required to agree within
//! 1/255 on 8-bit output (1e-4 on float). Keep the formulas branch-for-branch
//! identical when touching either side.

/// Guard against log10(0).
pub const EPSILON: f32 = 1e-6;

/// Lowest representable log10 density; log10(EPSILON).
pub const LOG_FLOOR: f32 = -6.0;

/// Rec.709 luminance weights.
pub const LUMA_R: f32 = 0.2126;
pub const LUMA_G: f32 = 0.7152;
pub const LUMA_B: f32 = 0.0722;

#[inline]
pub fn log10_safe(v: f32) -> f32 {
    v.max(EPSILON).log10()
}

#[inline]
pub fn rec709_luma(r: f32, g: f32, b: f32) -> f32 {
    LUMA_R * r + LUMA_G * g + LUMA_B * b
}

#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Logistic H&D characteristic curve with toe and shoulder shaping.
///
/// The base curve is `dmax / (1 + exp(-grade * (x - pivot)))`. Before the
/// exponential, the toe region (x below the pivot) is softened rationally and
/// the shoulder region (x above the pivot) is compressed logarithmically.
/// Both reshaping maps have unit slope at the pivot, so the composite stays
/// C1-continuous there, and both are monotone for non-negative toe/shoulder.
#[inline]
pub fn sigmoid_hd(x: f32, grade: f32, pivot: f32, toe: f32, shoulder: f32, dmax: f32) -> f32 {
    let xs = if x < pivot && toe > 0.0 {
        pivot + (x - pivot) / (1.0 + toe * (pivot - x))
    } else if x > pivot && shoulder > 0.0 {
        pivot + (shoulder * (x - pivot)).ln_1p() / shoulder
    } else {
        x
    };
    dmax / (1.0 + (-grade * (xs - pivot)).exp())
}

// sRGB transfer (IEC 61966-2-1)

#[inline]
pub fn srgb_encode(v: f32) -> f32 {
    if v <= 0.0031308 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

#[inline]
pub fn srgb_decode(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// Integer hash shared with the WGSL kernels for synthesized grain and spot
/// jitter. Three xorshift-multiply rounds; returns a uniform value in [0, 1).
///
/// Coordinates are always full-image coordinates so tiled and untiled renders
/// synthesize identical grain.
#[inline]
pub fn hash2(x: u32, y: u32) -> f32 {
    let mut v = x.wrapping_mul(1664525).wrapping_add(y.wrapping_mul(22695477));
    v ^= v >> 16;
    v = v.wrapping_mul(2246822519);
    v ^= v >> 13;
    v = v.wrapping_mul(3266489917);
    v ^= v >> 16;
    (v as f32) / 4294967296.0
}

/// Hash with an extra lane, used for per-spot jitter.
#[inline]
pub fn hash3(x: u32, y: u32, n: u32) -> f32 {
    hash2(x.wrapping_add(n.wrapping_mul(7919)), y.wrapping_add(n.wrapping_mul(104729)))
}

/// Median of a scratch slice. Mutates the slice order.
#[inline]
pub fn median_in_place(values: &mut [f32]) -> f32 {
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

/// Bilinear sample of an interleaved RGB buffer with edge clamping.
///
/// `x`/`y` are continuous pixel coordinates; samples outside the image read
/// the clamped edge texel, matching the WGSL transform kernel.
#[inline]
pub fn sample_bilinear(
    data: &[f32],
    width: u32,
    height: u32,
    stride: u32,
    x: f32,
    y: f32,
) -> [f32; 3] {
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let xc = x.clamp(0.0, max_x);
    let yc = y.clamp(0.0, max_y);
    let x0 = xc.floor();
    let y0 = yc.floor();
    let fx = xc - x0;
    let fy = yc - y0;
    let x0 = x0 as u32;
    let y0 = y0 as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let texel = |px: u32, py: u32| -> [f32; 3] {
        let i = ((py * stride + px) * 3) as usize;
        [data[i], data[i + 1], data[i + 2]]
    };

    let p00 = texel(x0, y0);
    let p10 = texel(x1, y0);
    let p01 = texel(x0, y1);
    let p11 = texel(x1, y1);

    let mut out = [0.0f32; 3];
    for c in 0..3 {
        let top = mix(p00[c], p10[c], fx);
        let bot = mix(p01[c], p11[c], fx);
        out[c] = mix(top, bot, fy);
    }
    out
}

/// Separable Gaussian weight for a squared pixel distance.
#[inline]
pub fn gaussian_weight(d2: f32, sigma: f32) -> f32 {
    (-d2 / (2.0 * sigma * sigma)).exp()
}

/// Approximate percentile estimator over log10 density.
///
/// A fixed 4096-bucket histogram spanning [LOG_FLOOR, 0]. Only used for the
/// one-shot calibration pass, never per frame, so bucket-center resolution
/// (~0.0015 density) is plenty.
pub struct LogHistogram {
    bins: Vec<u32>,
    total: u64,
}

pub const LOG_HISTOGRAM_BINS: usize = 4096;

impl Default for LogHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LogHistogram {
    pub fn new() -> Self {
        Self {
            bins: vec![0u32; LOG_HISTOGRAM_BINS],
            total: 0,
        }
    }

    /// Accumulate a linear value; it is logged and bucketed internally.
    #[inline]
    pub fn push(&mut self, linear: f32) {
        let d = log10_safe(linear);
        let t = ((d - LOG_FLOOR) / -LOG_FLOOR).clamp(0.0, 1.0);
        let idx = ((t * (LOG_HISTOGRAM_BINS - 1) as f32) as usize).min(LOG_HISTOGRAM_BINS - 1);
        self.bins[idx] += 1;
        self.total += 1;
    }

    /// Merge another histogram (rayon reduce step).
    pub fn merge(mut self, other: LogHistogram) -> LogHistogram {
        for (a, b) in self.bins.iter_mut().zip(other.bins.iter()) {
            *a += *b;
        }
        self.total += other.total;
        self
    }

    /// p-th percentile (0-100) in log10 density, bucket-center resolution.
    pub fn percentile(&self, p: f32) -> f32 {
        if self.total == 0 {
            return LOG_FLOOR;
        }
        let target = (self.total as f64 * (p as f64 / 100.0)).ceil().max(1.0) as u64;
        let mut seen = 0u64;
        for (idx, &count) in self.bins.iter().enumerate() {
            seen += count as u64;
            if seen >= target {
                let t = (idx as f32 + 0.5) / LOG_HISTOGRAM_BINS as f32;
                return LOG_FLOOR + t * -LOG_FLOOR;
            }
        }
        0.0
    }
}
