//! Path-tracing state and sampling helpers.
//!
//! The per-pixel PRNG is a 32-bit LCG: one lane-parallel word per pixel,
//! advanced across frames, so accumulation is deterministic per pixel and
//! independent of packet order. Frames fold into a running mean
//! `accum * (n / (n + 1)) + sample * (1 / (n + 1))` with the sample count
//! kept alongside.

use crate::backend::simd::{Fx, Ux, Vx, vx_dot, vx_normalize};

/// LCG multiplier (the classic glibc constants).
const LCG_MUL: u32 = 1_103_515_245;
/// LCG increment.
const LCG_ADD: u32 = 12_345;

/// Path-tracing accumulator state, owned by the platform.
pub struct PtState {
    /// One PRNG word per pixel.
    pub seeds: Vec<u32>,
    /// Running mean radiance per pixel, linear space.
    pub accum: Vec<[f32; 3]>,
    /// Samples folded in so far.
    pub count: u32,
}

impl PtState {
    /// Fresh state for a `width x height` frame.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        let pixels = width * height;
        Self {
            seeds: (0..pixels as u32)
                .map(|i| i.wrapping_mul(2_654_435_761).wrapping_add(1))
                .collect(),
            accum: vec![[0.0; 3]; pixels],
            count: 0,
        }
    }

    /// Drops accumulated samples (scene or camera changed).
    pub fn restart(&mut self) {
        self.accum.fill([0.0; 3]);
        self.count = 0;
    }
}

/// Advances the lane seeds and returns uniform samples in `[0, 1)`.
#[inline]
#[must_use]
pub fn lcg_next<const N: usize>(seeds: &mut Ux<N>) -> Fx<N> {
    let mut out = Fx::ZERO;
    for i in 0..N {
        let s = seeds.0[i].wrapping_mul(LCG_MUL).wrapping_add(LCG_ADD);
        seeds.0[i] = s;
        out.0[i] = ((s >> 8) & 0x00FF_FFFF) as f32 / 16_777_216.0;
    }
    out
}

/// Builds the tangent pair of an orthonormal basis around the normal:
/// `t1 = n x v` normalized, with an axis fallback when the view direction
/// is collinear with the normal.
#[must_use]
pub fn pt_basis<const N: usize>(n: &Vx<N>, v: &Vx<N>) -> (Vx<N>, Vx<N>) {
    // n x v
    let mut t1 = [
        n[1] * v[2] - n[2] * v[1],
        n[2] * v[0] - n[0] * v[2],
        n[0] * v[1] - n[1] * v[0],
    ];
    let len2 = vx_dot(&t1, &t1);
    let degen = len2.lt(Fx::splat(1.0e-12));
    if degen.any() {
        // n x X, falling back to n x Y when n is the X axis.
        let alt = [Fx::ZERO, n[2], -n[1]];
        let alt_len2 = vx_dot(&alt, &alt);
        let use_y = alt_len2.lt(Fx::splat(1.0e-12));
        let alt2 = [-n[2], Fx::ZERO, n[0]];
        for a in 0..3 {
            let fallback = alt2[a].select(use_y, alt[a]);
            t1[a] = fallback.select(degen, t1[a]);
        }
    }
    let t1 = vx_normalize(&t1);
    // t2 = n x t1 completes the frame.
    let t2 = [
        n[1] * t1[2] - n[2] * t1[1],
        n[2] * t1[0] - n[0] * t1[2],
        n[0] * t1[1] - n[1] * t1[0],
    ];
    (t1, vx_normalize(&t2))
}
