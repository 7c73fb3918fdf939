//! Traversal kernel.
//!
//! For a packet of rays the kernel walks the visibility list: bounding
//! spheres guard surface runs, each surface transforms DFF/RAY into its
//! solve frame (with caching across consecutive surfaces sharing a trnode),
//! solves the implicit equation (linear for planes, quadratic for
//! quadrics with a cancellation-free root split), clips each candidate
//! against the axis minmax box and the custom clipper list, depth-tests
//! against T_BUF and dispatches the side's material on surviving lanes.
//!
//! Straight-line SIMD code: no I/O, no locks, no allocation.

use glam::Vec3;

use crate::backend::blocks::{ClipRef, Frame, SurfBlock, TraceElem, TraceScene};
use crate::backend::context::{CtxStack, Pass, RayCtx, Side};
use crate::backend::pathtrace::PtState;
use crate::backend::shade::shade_hit;
use crate::backend::simd::{Fx, Mx, Ux, Vx, vx_dot, vx_mad, vx_mat3, vx_normalize, vx_splat, vx_sub};
use crate::config::{Config, Opts, T_MIN};
use crate::engine::FrameBuffer;
use crate::scene::relation::ClipKind;
use crate::scene::surface::SurfKind;

/// Lanes with `|a|` below this solve the degenerate (linear) form.
const EPS_A: f32 = 1.0e-12;
/// Parallel-ray guard for plane solves.
const EPS_K: f32 = 1.0e-12;

/// Cached frame-transformed origin/direction, shared across consecutive
/// surfaces under the same trnode.
struct FrameCache<const N: usize> {
    frame: i32,
    org: Vx<N>,
    ray: Vx<N>,
}

impl<const N: usize> FrameCache<N> {
    fn new() -> Self {
        Self {
            frame: -1,
            org: [Fx::ZERO; 3],
            ray: [Fx::ZERO; 3],
        }
    }
}

/// Applies a frame's inverse to a lane vector, diagonal fastpath included.
#[inline]
fn frame_apply<const N: usize>(ts: &TraceScene, tr: usize, v: &Vx<N>) -> Vx<N> {
    let t = &ts.trs[tr];
    if t.has_rot {
        vx_mat3(&t.inv, v)
    } else {
        [
            v[0] * t.diag.x,
            v[1] * t.diag.y,
            v[2] * t.diag.z,
        ]
    }
}

/// Computes DFF and the solve-space ray for a surface, maintaining the
/// shared-trnode cache.
fn frame_dff_ray<const N: usize>(
    ts: &TraceScene,
    sb: &SurfBlock,
    org: &Vx<N>,
    ray: &Vx<N>,
    cache: &mut FrameCache<N>,
) -> (Vx<N>, Vx<N>) {
    match sb.frame {
        Frame::World => (vx_sub(org, &vx_splat(sb.pos)), *ray),
        Frame::Own(t) => {
            let rel = vx_sub(org, &vx_splat(ts.trs[t].pos));
            (frame_apply(ts, t, &rel), frame_apply(ts, t, ray))
        }
        Frame::Shared(t) => {
            if cache.frame != t as i32 {
                let rel = vx_sub(org, &vx_splat(ts.trs[t].pos));
                cache.org = frame_apply(ts, t, &rel);
                cache.ray = frame_apply(ts, t, ray);
                cache.frame = t as i32;
            }
            (vx_sub(&cache.org, &vx_splat(sb.pos)), cache.ray)
        }
    }
}

/// Transforms a world point into a surface's solve frame (used for custom
/// clipper evaluation, where the clipper may live in another frame).
#[inline]
fn frame_point<const N: usize>(ts: &TraceScene, sb: &SurfBlock, p: &Vx<N>) -> Vx<N> {
    match sb.frame {
        Frame::World => vx_sub(p, &vx_splat(sb.pos)),
        Frame::Own(t) => {
            let rel = vx_sub(p, &vx_splat(ts.trs[t].pos));
            frame_apply(ts, t, &rel)
        }
        Frame::Shared(t) => {
            let rel = vx_sub(p, &vx_splat(ts.trs[t].pos));
            vx_sub(&frame_apply(ts, t, &rel), &vx_splat(sb.pos))
        }
    }
}

/// Evaluates a clipper's implicit function at frame-local points.
#[inline]
fn implicit_eval<const N: usize>(sb: &SurfBlock, l: &Vx<N>) -> Fx<N> {
    if sb.kind == SurfKind::Plane {
        l[0] * sb.sck.x + l[1] * sb.sck.y + l[2] * sb.sck.z
    } else {
        let sq = l[0] * l[0] * sb.sci.x + l[1] * l[1] * sb.sci.y + l[2] * l[2] * sb.sci.z;
        let ln = l[0] * sb.scj.x + l[1] * sb.scj.y + l[2] * sb.scj.z;
        sq - ln - Fx::splat(sb.sci.w)
    }
}

/// One intersection candidate: distances, valid lanes, surface side.
struct Candidate<const N: usize> {
    t: Fx<N>,
    valid: Mx<N>,
    side: Side,
}

/// Solves a surface for up to two candidates.
fn solve<const N: usize>(sb: &SurfBlock, dff: &Vx<N>, ray: &Vx<N>) -> [Candidate<N>; 2] {
    if sb.kind == SurfKind::Plane {
        let dff_k = dff[0] * sb.sck.x + dff[1] * sb.sck.y + dff[2] * sb.sck.z;
        let ray_k = ray[0] * sb.sck.x + ray[1] * sb.sck.y + ray[2] * sb.sck.z;
        let hit = ray_k.abs().gt(Fx::splat(EPS_K));
        let t = -dff_k / ray_k;
        return [
            Candidate {
                t,
                valid: hit & ray_k.lt(Fx::ZERO),
                side: Side::Outer,
            },
            Candidate {
                t,
                valid: hit & ray_k.gt(Fx::ZERO),
                side: Side::Inner,
            },
        ];
    }

    let sci = [Fx::splat(sb.sci.x), Fx::splat(sb.sci.y), Fx::splat(sb.sci.z)];
    let scj = [Fx::splat(sb.scj.x), Fx::splat(sb.scj.y), Fx::splat(sb.scj.z)];

    let mut a = Fx::ZERO;
    let mut b = Fx::ZERO;
    let mut c = Fx::<N>::splat(-sb.sci.w);
    for i in 0..3 {
        a = a + sci[i] * ray[i] * ray[i];
        b = b + sci[i] * ray[i] * dff[i] - scj[i] * ray[i] * Fx::splat(0.5);
        c = c + sci[i] * dff[i] * dff[i] - scj[i] * dff[i];
    }

    let d = b * b - a * c;
    let quad = a.abs().gt(Fx::splat(EPS_A));
    let d_ok = d.ge(Fx::ZERO);
    let v_quad = quad & d_ok;

    // Cancellation-free split: q carries the large-magnitude root term.
    let sq = d.max(Fx::ZERO).sqrt();
    let q = -(b + sq.copysign(b));
    let t1 = q / a; // (-b - sign(b) sqrt(d)) / a
    let t2 = c / q; // the companion root

    let b_pos = b.ge(Fx::ZERO);
    let a_pos = a.gt(Fx::ZERO);
    let tm = t1.select(b_pos, t2); // (-b - sqrt(d)) / a
    let tp = t2.select(b_pos, t1); // (-b + sqrt(d)) / a

    // Outer root is (-b - sqrt(d)) / a for a > 0; roles swap for a < 0.
    let t_out_q = tm.select(a_pos, tp);
    let t_in_q = tp.select(a_pos, tm);

    // Degenerate (two-plane) lanes: linear in t, side by the sign of b.
    let lin = !quad & b.abs().gt(Fx::splat(EPS_A));
    let t_lin = -c / (b * 2.0);
    let t_out = t_out_q.select(quad, t_lin);
    let t_in = t_in_q.select(quad, t_lin);

    [
        Candidate {
            t: t_out,
            valid: v_quad | (lin & b.lt(Fx::ZERO)),
            side: Side::Outer,
        },
        Candidate {
            t: t_in,
            valid: v_quad | (lin & b.gt(Fx::ZERO)),
            side: Side::Inner,
        },
    ]
}

/// Axis minmax clip, custom clipper walk and depth test for one candidate.
/// Returns the surviving mask and the frame-local hit points.
fn clip_candidate<const N: usize>(
    ts: &TraceScene,
    sb: &SurfBlock,
    ctx_org: &Vx<N>,
    ctx_ray: &Vx<N>,
    t_buf: Fx<N>,
    dff: &Vx<N>,
    lray: &Vx<N>,
    t: Fx<N>,
    mut mask: Mx<N>,
) -> (Mx<N>, Vx<N>, Vx<N>) {
    // Depth window first: cheap and usually decisive.
    mask = mask & t.gt(Fx::splat(T_MIN)) & t.lt(t_buf) & t.finite();
    if !mask.any() {
        return (mask, [Fx::ZERO; 3], [Fx::ZERO; 3]);
    }

    let loc = vx_mad(dff, lray, t);

    for a in 0..3 {
        if sb.min_t[a] {
            mask = mask & loc[a].ge(Fx::splat(sb.bmin[a]));
        }
        if sb.max_t[a] {
            mask = mask & loc[a].le(Fx::splat(sb.bmax[a]));
        }
    }
    if !mask.any() {
        return (mask, loc, [Fx::ZERO; 3]);
    }

    let hitw = vx_mad(ctx_org, ctx_ray, t);

    // Custom clippers: ENTER/LEAVE brackets OR-accumulate the group and
    // AND it into the running mask on close.
    if !sb.clip.is_empty() {
        let mut c_acc = Mx::<N>::NONE;
        let mut in_accum = false;
        for elem in &sb.clip {
            match *elem {
                ClipRef::Enter => {
                    in_accum = true;
                    c_acc = Mx::NONE;
                }
                ClipRef::Leave => {
                    in_accum = false;
                    mask = mask & c_acc;
                }
                ClipRef::Surf { blk, kind } => {
                    let cl = &ts.surfs[blk];
                    let chit = frame_point(ts, cl, &hitw);
                    let f = implicit_eval(cl, &chit);
                    let survive = match kind {
                        ClipKind::MinusInner => f.ge(Fx::ZERO),
                        ClipKind::MinusOuter => f.le(Fx::ZERO),
                    };
                    if in_accum {
                        c_acc = c_acc | survive;
                    } else {
                        mask = mask & survive;
                    }
                }
            }
            if !in_accum && !mask.any() {
                break;
            }
        }
    }

    (mask, loc, hitw)
}

/// Tests the packet against an array's bounding sphere; `false` skips the
/// guarded run.
fn sphere_overlap<const N: usize>(ctx: &RayCtx<N>, mid: Vec3, rad2: f32) -> bool {
    let oc = vx_sub(&vx_splat(mid), &ctx.org);
    let b = vx_dot(&ctx.ray, &oc);
    let c = vx_dot(&oc, &oc) - Fx::splat(rad2);
    let d = b * b - c;
    let d_ok = d.ge(Fx::ZERO);
    let sq = d.max(Fx::ZERO).sqrt();
    let t_near = b - sq;
    let t_far = b + sq;
    let hit = d_ok & t_far.gt(Fx::splat(T_MIN)) & t_near.lt(ctx.t_buf) & ctx.tmask;
    hit.any()
}

/// Walks the visibility list for the context frame `ci`, dispatching
/// materials on surviving candidates.
pub fn trace_list<const N: usize>(
    ts: &TraceScene,
    cfg: &Config,
    stack: &mut CtxStack<N>,
    ci: usize,
    rng: &mut Ux<N>,
) {
    let mut cache = FrameCache::new();
    let mut i = 0;
    while i < ts.list.len() {
        match ts.list[i] {
            TraceElem::Bound { mid, rad2, count } => {
                if !sphere_overlap(stack.frame(ci), mid, rad2) {
                    i += count;
                }
            }
            TraceElem::Surf(s) => {
                test_surface(ts, cfg, stack, ci, s, &mut cache, rng);
            }
        }
        i += 1;
    }

    // Lanes that hit nothing see the camera background.
    let ctx = stack.frame(ci);
    if ctx.pass != Pass::Shadow {
        let miss = ctx.tmask & !ctx.t_buf.finite();
        if miss.any() {
            let back = vx_splat::<N>(ts.cam.back);
            for ch in 0..3 {
                ctx.col[ch] = back[ch].select(miss, ctx.col[ch]);
            }
        }
    }
}

/// Tests one surface against the packet.
fn test_surface<const N: usize>(
    ts: &TraceScene,
    cfg: &Config,
    stack: &mut CtxStack<N>,
    ci: usize,
    s_idx: usize,
    cache: &mut FrameCache<N>,
    rng: &mut Ux<N>,
) {
    let sb = &ts.surfs[s_idx];
    let (org, ray, tmask, t_buf, pass, org_surf, org_side, pix, loc0) = {
        let ctx = stack.frame(ci);
        (
            ctx.org, ctx.ray, ctx.tmask, ctx.t_buf, ctx.pass, ctx.org_surf, ctx.org_side,
            ctx.pix, ctx.loc,
        )
    };

    if !tmask.any() {
        return;
    }

    // Coarse screen-rectangle cull for primary packets.
    if cfg.opts.contains(Opts::TILING) && pass == Pass::Primary {
        if let (Some([x0, y0, x1, y1]), Some((px, py))) = (sb.screen, pix) {
            let py = py as i32;
            let px0 = px as i32;
            let px1 = px0 + N as i32;
            if py < y0 || py >= y1 || px1 <= x0 || px0 >= x1 {
                return;
            }
        }
    }

    // A secondary ray may only re-hit its originating surface when it
    // passes through to the opposite side.
    let self_test = org_surf == s_idx as i32;
    if self_test && pass != Pass::Thru {
        return;
    }

    let (dff, lray) = if self_test {
        // Reuse the cached local hit as DFF to avoid re-derivation.
        let (_, lray) = frame_dff_ray(ts, sb, &org, &ray, cache);
        (loc0, lray)
    } else {
        frame_dff_ray(ts, sb, &org, &ray, cache)
    };

    for cand in solve(sb, &dff, &lray) {
        if self_test && cand.side == org_side {
            continue;
        }
        let base = cand.valid & tmask;
        if !base.any() {
            continue;
        }
        let (mask, loc, hitw) =
            clip_candidate(ts, sb, &org, &ray, t_buf, &dff, &lray, cand.t, base);
        if !mask.any() {
            continue;
        }

        if pass == Pass::Shadow {
            // Occlusion only: fold into the hit mask kept in c_acc and
            // retire the shadowed lanes.
            let ctx = stack.frame(ci);
            ctx.c_acc = ctx.c_acc | mask;
            ctx.tmask = ctx.tmask & !mask;
        } else {
            shade_hit(ts, cfg, stack, ci, s_idx, cand.side, mask, cand.t, &loc, &hitw, rng);
        }
    }
}

/// Shadow any-hit: returns the occluded lanes for a context frame that was
/// preloaded with the shadow ray and `t_buf` set to the light distance.
pub fn occlude<const N: usize>(
    ts: &TraceScene,
    cfg: &Config,
    stack: &mut CtxStack<N>,
    ci: usize,
    ignore: &[usize],
    rng: &mut Ux<N>,
) -> Mx<N> {
    let mut cache = FrameCache::new();
    let mut i = 0;
    while i < ts.list.len() {
        if !stack.frame(ci).tmask.any() {
            break; // every live lane already shadowed
        }
        match ts.list[i] {
            TraceElem::Bound { mid, rad2, count } => {
                if !sphere_overlap(stack.frame(ci), mid, rad2) {
                    i += count;
                }
            }
            TraceElem::Surf(s) => {
                let blocking = !ignore.contains(&s)
                    && !ts.mats[ts.surfs[s].mat[0]]
                        .props
                        .contains(crate::resources::MatProps::LIGHT);
                if blocking {
                    test_surface(ts, cfg, stack, ci, s, &mut cache, rng);
                }
            }
        }
        i += 1;
    }
    stack.frame(ci).c_acc
}

// ============================================================================
// Frame loop
// ============================================================================

/// Renders the scanline stripe `row0, row0 + rstep, ...` into the frame
/// buffer. `pt` enables the path-tracing accumulator mode.
pub fn render_frame<const N: usize>(
    ts: &TraceScene,
    cfg: &Config,
    fb: &mut FrameBuffer,
    mut pt: Option<&mut PtState>,
    row0: usize,
    rstep: usize,
) {
    let width = fb.width();
    let height = fb.height();
    let mut stack = CtxStack::<N>::new(cfg.max_depth);

    let offsets = cfg.fsaa.offsets();
    let weight = 1.0 / offsets.len() as f32;
    let inv_half_w = 2.0 / width as f32;
    let gamma = cfg.opts.contains(Opts::GAMMA);
    let pt_on = cfg.opts.contains(Opts::PT_ON) && pt.is_some();

    let cam = &ts.cam;
    let org = vx_splat::<N>(cam.pos);

    let mut y = row0;
    while y < height {
        let mut x0 = 0;
        while x0 < width {
            let in_frame = Mx::<N>::from_fn(|i| x0 + i < width);

            // Per-pixel PRNG lanes (path tracing).
            let mut seeds = Ux::<N>::ZERO;
            if let Some(pt) = pt.as_deref() {
                seeds = Ux::from_fn(|i| {
                    let x = (x0 + i).min(width - 1);
                    pt.seeds[y * width + x]
                });
            }

            let mut acc = [Fx::<N>::ZERO; 3];
            let passes: &[(f32, f32)] = if pt_on { &[(0.5, 0.5)] } else { offsets };
            let w = if pt_on { 1.0 } else { weight };

            for &(ox, oy) in passes {
                // Primary directions from the camera basis; path tracing
                // jitters per lane through the LCG.
                let (jx, jy) = if pt_on {
                    (
                        crate::backend::pathtrace::lcg_next(&mut seeds),
                        crate::backend::pathtrace::lcg_next(&mut seeds),
                    )
                } else {
                    (Fx::splat(ox), Fx::splat(oy))
                };
                let su = Fx::from_fn(|i| (x0 + i) as f32 - width as f32 * 0.5) + jx;
                let sv = Fx::splat(y as f32 - height as f32 * 0.5) + jy;
                let su = su * inv_half_w;
                let sv = sv * inv_half_w;

                let dir = [
                    Fx::splat(cam.nrm.x * cam.pov)
                        + su * cam.hor.x
                        + sv * cam.ver.x,
                    Fx::splat(cam.nrm.y * cam.pov)
                        + su * cam.hor.y
                        + sv * cam.ver.y,
                    Fx::splat(cam.nrm.z * cam.pov)
                        + su * cam.hor.z
                        + sv * cam.ver.z,
                ];
                let dir = vx_normalize(&dir);

                let ctx = stack.frame(0);
                ctx.reset(org, dir, in_frame, Pass::Primary);
                ctx.pix = Some((x0, y));

                trace_list(ts, cfg, &mut stack, 0, &mut seeds);

                let ctx = stack.frame(0);
                for ch in 0..3 {
                    acc[ch] = acc[ch] + ctx.col[ch] * w;
                }
            }

            // Store: path tracing folds into the running mean first.
            for i in 0..N {
                let x = x0 + i;
                if x >= width {
                    break;
                }
                let mut c = [acc[0].0[i], acc[1].0[i], acc[2].0[i]];
                if let Some(pt) = pt.as_deref_mut() {
                    let n = pt.count as f32;
                    let idx = y * width + x;
                    let prev = pt.accum[idx];
                    let blended = [
                        prev[0] * (n / (n + 1.0)) + c[0] / (n + 1.0),
                        prev[1] * (n / (n + 1.0)) + c[1] / (n + 1.0),
                        prev[2] * (n / (n + 1.0)) + c[2] / (n + 1.0),
                    ];
                    pt.accum[idx] = blended;
                    pt.seeds[idx] = seeds.0[i];
                    c = blended;
                }
                fb.put(x, y, pack_pixel(c, gamma));
            }

            x0 += N;
        }
        y += rstep;
    }
}

/// Converts linear radiance to a packed B,G,R,X pixel, square-root gamma
/// encoded when enabled.
#[must_use]
pub fn pack_pixel(c: [f32; 3], gamma: bool) -> u32 {
    let enc = |v: f32| {
        let v = v.clamp(0.0, 1.0);
        let v = if gamma { v.sqrt() } else { v };
        (v * 255.0 + 0.5) as u32
    };
    (enc(c[0]) << 16) | (enc(c[1]) << 8) | enc(c[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_pixel_orders_bgr() {
        let p = pack_pixel([1.0, 0.5, 0.0], false);
        assert_eq!(p >> 16, 255); // red in the third byte
        assert_eq!(p & 0xFF, 0); // blue lowest
    }

    #[test]
    fn gamma_roundtrip_one_lsb() {
        for v in 0..=255u32 {
            let lin = (v as f32 / 255.0).powi(2);
            let p = pack_pixel([lin, lin, lin], true);
            let r = (p >> 16) & 0xFF;
            assert!((r as i32 - v as i32).abs() <= 1, "v={v} r={r}");
        }
    }
}
