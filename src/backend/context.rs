//! Ray context frames.
//!
//! One [`RayCtx`] holds a packet's lane-parallel registers: origins,
//! directions, the nearest-hit distance buffer, color accumulators, cached
//! hit data and the live-lane mask. Secondary rays push the next frame of a
//! preallocated stack (the recursion ring); the depth cap is the stack
//! length, so the render path never allocates.

use crate::backend::simd::{Fx, Mx, Vx};

/// Which side of a surface a ray interacts with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// The normal-facing side.
    Outer = 0,
    /// The opposite side.
    Inner = 1,
}

impl Side {
    /// The opposite side.
    #[must_use]
    pub fn flip(self) -> Side {
        match self {
            Side::Outer => Side::Inner,
            Side::Inner => Side::Outer,
        }
    }
}

/// The purpose of the rays in a context frame; controls same-surface
/// self-intersection rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    /// Camera rays.
    Primary,
    /// Occlusion rays toward a light.
    Shadow,
    /// Reflection (or reflected part of a Fresnel split).
    Back,
    /// Transmission continuing through the originating surface.
    Thru,
}

/// One lane-parallel context frame.
pub struct RayCtx<const N: usize> {
    /// Ray origins.
    pub org: Vx<N>,
    /// Ray directions (normalized).
    pub ray: Vx<N>,
    /// Nearest accepted hit distance per lane.
    pub t_buf: Fx<N>,
    /// Accumulated radiance per lane.
    pub col: Vx<N>,
    /// World hit point of the current nearest hit.
    pub hit: Vx<N>,
    /// Frame-local hit point (relative to the surface position); reused as
    /// the DFF when a secondary ray re-tests its originating surface.
    pub loc: Vx<N>,
    /// Live-lane mask.
    pub tmask: Mx<N>,
    /// Accumulator mask for bracketed clipper groups.
    pub c_acc: Mx<N>,
    /// Path throughput (path tracing).
    pub mul: Vx<N>,
    /// Surface block the rays originated from (-1 for camera rays).
    pub org_surf: i32,
    /// Side of the originating surface.
    pub org_side: Side,
    /// Ray purpose.
    pub pass: Pass,
    /// Pixel coordinates of lane 0 (primary rays only; used by TILING).
    pub pix: Option<(usize, usize)>,
}

impl<const N: usize> RayCtx<N> {
    /// An idle frame.
    #[must_use]
    pub fn new() -> Self {
        Self {
            org: [Fx::ZERO; 3],
            ray: [Fx::ZERO; 3],
            t_buf: Fx::INF,
            col: [Fx::ZERO; 3],
            hit: [Fx::ZERO; 3],
            loc: [Fx::ZERO; 3],
            tmask: Mx::NONE,
            c_acc: Mx::NONE,
            mul: [Fx::ONE; 3],
            org_surf: -1,
            org_side: Side::Outer,
            pass: Pass::Primary,
            pix: None,
        }
    }

    /// Resets the frame for a fresh packet: T_BUF to the far plane, colors
    /// to zero, the live mask as given.
    pub fn reset(&mut self, org: Vx<N>, ray: Vx<N>, tmask: Mx<N>, pass: Pass) {
        self.org = org;
        self.ray = ray;
        self.t_buf = Fx::INF;
        self.col = [Fx::ZERO; 3];
        self.tmask = tmask;
        self.c_acc = Mx::NONE;
        self.mul = [Fx::ONE; 3];
        self.org_surf = -1;
        self.org_side = Side::Outer;
        self.pass = pass;
        self.pix = None;
    }
}

impl<const N: usize> Default for RayCtx<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The preallocated context stack of one worker.
pub struct CtxStack<const N: usize> {
    frames: Vec<RayCtx<N>>,
}

impl<const N: usize> CtxStack<N> {
    /// Allocates `depth + 2` frames: primary, `depth` secondary levels and
    /// one scratch frame for shadow rays at the deepest level.
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            frames: (0..depth + 2).map(|_| RayCtx::new()).collect(),
        }
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when no frames exist (never, in practice).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Borrows one frame.
    #[inline]
    pub fn frame(&mut self, i: usize) -> &mut RayCtx<N> {
        &mut self.frames[i]
    }

    /// Borrows frame `i` and frame `i + 1` simultaneously (current plus
    /// subcontext).
    #[inline]
    pub fn split(&mut self, i: usize) -> (&mut RayCtx<N>, &mut RayCtx<N>) {
        let (a, b) = self.frames.split_at_mut(i + 1);
        (&mut a[i], &mut b[0])
    }
}
