//! Shading kernel.
//!
//! Runs per surviving candidate: fetches the side's material, computes the
//! normal (with the conic-singularity snap), samples the texture, evaluates
//! direct lighting with shadow rays, handles transparency/refraction with
//! Fresnel and reflections (recursing through subcontext frames), and in
//! path-tracing mode replaces the diffuse term with a cosine-weighted
//! bounce.

use crate::backend::blocks::{Frame, SurfBlock, TraceScene};
use crate::backend::context::{CtxStack, Pass, Side};
use crate::backend::pathtrace::{lcg_next, pt_basis};
use crate::backend::simd::{Fx, Mx, Ux, Vx, vx_dot, vx_normalize, vx_select, vx_splat, vx_sub};
use crate::backend::tracer::{occlude, trace_list};
use crate::config::{Config, Opts};
use crate::resources::{MatProps, Material};
use crate::scene::surface::SurfKind;

/// Degenerate-point guard for conic normals.
const EPS_SNAP: f32 = 1.0e-8;

/// Raises lanes to a 28.4 fixed-point power: square-root chain for the four
/// fractional bits, square-and-multiply for the integer part.
#[must_use]
pub fn fpow<const N: usize>(x: Fx<N>, p: u32) -> Fx<N> {
    let mut result = Fx::ONE;
    let mut r = x;
    let frac = p & 0xF;
    for i in 0..4 {
        r = r.sqrt();
        if frac & (0x8 >> i) != 0 {
            result = result * r;
        }
    }
    let mut base = x;
    let mut e = p >> 4;
    while e > 0 {
        if e & 1 == 1 {
            result = result * base;
        }
        base = base * base;
        e >>= 1;
    }
    result
}

/// Samples the material texture at frame-local hit points; solid materials
/// broadcast their color. GAMMA textures decode by squaring.
fn sample_tex<const N: usize>(mat: &Material, sb: &SurfBlock, loc: &Vx<N>) -> Vx<N> {
    let gamma = mat.props.contains(MatProps::GAMMA);
    if !mat.props.contains(MatProps::TEXTURE) {
        let c = crate::resources::texture::unpack_color(mat.tex.pixels[0]);
        let decode = |v: f32| if gamma { v * v } else { v };
        return [
            Fx::splat(decode(c[0])),
            Fx::splat(decode(c[1])),
            Fx::splat(decode(c[2])),
        ];
    }

    // Route the frame axes into the local I/J pair, then into texels.
    let map = &sb.map;
    let li = loc[map.map[0]] * map.sgn[0];
    let lj = loc[map.map[1]] * map.sgn[1];
    let lk = loc[map.map[2]] * map.sgn[2];
    let l = [li, lj, lk];
    let u = l[mat.t_map[0]] * mat.xscal + mat.xoffs;
    let v = l[mat.t_map[1]] * mat.yscal + mat.yoffs;

    let mut out = [Fx::ZERO; 3];
    for i in 0..N {
        let ix = (u.0[i].floor() as i32) as u32;
        let iy = (v.0[i].floor() as i32) as u32;
        let c = crate::resources::texture::unpack_color(mat.tex.texel(ix, iy));
        for ch in 0..3 {
            let val = if gamma { c[ch] * c[ch] } else { c[ch] };
            out[ch].0[i] = val;
        }
    }
    out
}

/// Computes the world-space shading normal for the current side, snapping
/// conic singularities to the rotational axis.
fn normal_lanes<const N: usize>(
    ts: &TraceScene,
    sb: &SurfBlock,
    side: Side,
    loc: &Vx<N>,
    ray: &Vx<N>,
) -> Vx<N> {
    let mut n = if sb.kind == SurfKind::Plane {
        vx_splat::<N>(sb.sck)
    } else {
        [
            loc[0] * (2.0 * sb.sci.x) - Fx::splat(sb.scj.x),
            loc[1] * (2.0 * sb.sci.y) - Fx::splat(sb.scj.y),
            loc[2] * (2.0 * sb.sci.z) - Fx::splat(sb.scj.z),
        ]
    };

    if side == Side::Inner {
        n = [-n[0], -n[1], -n[2]];
    }

    // Cone tips and saddle points have a vanishing gradient; snap those
    // lanes to the rotational axis, facing the ray.
    if matches!(
        sb.kind,
        SurfKind::Cone { .. } | SurfKind::Hyperboloid { .. } | SurfKind::Paraboloid { .. }
    ) {
        let len2 = vx_dot(&n, &n);
        let degen = len2.lt(Fx::splat(EPS_SNAP));
        if degen.any() {
            let mk = sb.map.map[2];
            let axis_sign = Fx::ONE.copysign(-ray[mk]);
            for a in 0..3 {
                let axis = if a == mk { axis_sign } else { Fx::ZERO };
                n[a] = axis.select(degen, n[a]);
            }
        }
    }

    // Carry to world space through the inverse transpose.
    let n = match sb.frame {
        Frame::World => n,
        Frame::Own(t) | Frame::Shared(t) => crate::backend::simd::vx_mat3(&ts.trs[t].nrm, &n),
    };
    vx_normalize(&n)
}

/// Dielectric Fresnel reflectance. `eta` is the relative index across the
/// interface in travel direction; TIR lanes return 1.
fn fresnel_dielectric<const N: usize>(cosi: Fx<N>, eta: f32, schlick: bool) -> Fx<N> {
    let k = -(cosi * cosi - 1.0) * (eta * eta);
    let k = -k + 1.0; // 1 - eta^2 (1 - cosi^2)
    let tir = k.lt(Fx::ZERO);

    let r = if schlick {
        let r0 = ((eta - 1.0) / (eta + 1.0)).powi(2);
        let m = -cosi + 1.0;
        let m2 = m * m;
        Fx::splat(r0) + (m2 * m2 * m) * (1.0 - r0)
    } else {
        let cost = k.max(Fx::ZERO).sqrt();
        let rs = (cosi * eta - cost) / (cosi * eta + cost);
        let rp = (cost * eta - cosi) / (cost * eta + cosi);
        (rs * rs + rp * rp) * 0.5
    };
    Fx::ONE.select(tir, r.clamp(0.0, 1.0))
}

/// Metal Fresnel with complex index `(eta, kappa)`: closed form, or the
/// rational approximation when the low-precision option is on.
fn fresnel_metal<const N: usize>(cosi: Fx<N>, eta: f32, ext2: f32, fast: bool) -> Fx<N> {
    let n2k2 = eta * eta + ext2;
    if fast {
        let m = -cosi + 1.0;
        let m2 = m * m;
        let num = Fx::splat((eta - 1.0) * (eta - 1.0) + ext2) + (m2 * m2 * m) * (4.0 * eta);
        let den = (eta + 1.0) * (eta + 1.0) + ext2;
        (num / den).clamp(0.0, 1.0)
    } else {
        let c2 = cosi * cosi;
        let two_nc = cosi * (2.0 * eta);
        let rs = (c2 - two_nc + n2k2) / (c2 + two_nc + n2k2);
        let rp = (c2 * n2k2 - two_nc + 1.0) / (c2 * n2k2 + two_nc + 1.0);
        ((rs + rp) * 0.5).clamp(0.0, 1.0)
    }
}

/// Launches a subcontext trace and returns its radiance.
fn spawn_trace<const N: usize>(
    ts: &TraceScene,
    cfg: &Config,
    stack: &mut CtxStack<N>,
    ci: usize,
    org: &Vx<N>,
    dir: &Vx<N>,
    mask: Mx<N>,
    pass: Pass,
    org_surf: usize,
    org_side: Side,
    loc: &Vx<N>,
    rng: &mut Ux<N>,
) -> Vx<N> {
    let sub = stack.frame(ci + 1);
    sub.reset(*org, *dir, mask, pass);
    sub.org_surf = org_surf as i32;
    sub.org_side = org_side;
    sub.loc = *loc;
    trace_list(ts, cfg, stack, ci + 1, rng);
    stack.frame(ci + 1).col
}

/// Shades one candidate's surviving lanes, updating the context's color
/// and depth buffers.
pub fn shade_hit<const N: usize>(
    ts: &TraceScene,
    cfg: &Config,
    stack: &mut CtxStack<N>,
    ci: usize,
    s_idx: usize,
    side: Side,
    mask: Mx<N>,
    t: Fx<N>,
    loc: &Vx<N>,
    hitw: &Vx<N>,
    rng: &mut Ux<N>,
) {
    let sb = &ts.surfs[s_idx];
    let mat = &ts.mats[sb.mat[side as usize]];
    let ray = stack.frame(ci).ray;

    let tex = sample_tex(mat, sb, loc);

    // Emissive materials short-circuit with their color.
    if mat.props.contains(MatProps::LIGHT) {
        commit(stack.frame(ci), mask, t, hitw, &tex);
        return;
    }

    let n = normal_lanes(ts, sb, side, loc, &ray);
    let cosi = (-vx_dot(&ray, &n)).max(Fx::ZERO);
    let pt_on = cfg.opts.contains(Opts::PT_ON);
    let depth_ok = ci + 2 < stack.len();

    // ------------------------------------------------------------------
    // Base radiance: direct lighting, or the path-traced diffuse bounce.
    // ------------------------------------------------------------------
    let mut base = if pt_on {
        pt_diffuse(ts, cfg, stack, ci, s_idx, side, mask, &n, loc, hitw, mat, &tex, rng, depth_ok)
    } else {
        direct_lighting(
            ts, cfg, stack, ci, s_idx, side, mask, &n, &ray, loc, hitw, mat, &tex, rng,
        )
    };

    // ------------------------------------------------------------------
    // Transparency and reflection weights (Fresnel-adjusted).
    // ------------------------------------------------------------------
    let opaque = mat.props.contains(MatProps::OPAQUE);
    let fresnel = mat.props.contains(MatProps::FRESNEL);
    let schlick = cfg.opts.contains(Opts::SCHLICK);

    let eta = if side == Side::Outer {
        1.0 / mat.c_rfr
    } else {
        mat.c_rfr
    };

    let mut c_rfl = Fx::<N>::splat(mat.c_rfl);
    let mut c_trn = if opaque { Fx::ZERO } else { Fx::splat(mat.c_trn) };

    if !opaque && fresnel && mat.props.contains(MatProps::REFRACT) {
        // Reflectance rises, transmission falls; TIR folds everything
        // into the reflection.
        let r = fresnel_dielectric(cosi, eta, schlick);
        c_rfl = c_rfl + Fx::splat(mat.c_trn) * r;
        c_trn = (Fx::ONE - r) * mat.c_trn;
    }
    if mat.props.contains(MatProps::METAL) && mat.props.contains(MatProps::REFLECT) {
        c_rfl = fresnel_metal(cosi, mat.c_rfr, mat.ext_2, schlick) * mat.c_rfl;
    }

    // Refraction direction (TIR lanes keep a zero transmission weight).
    let k = {
        let s2 = -(cosi * cosi - 1.0); // 1 - cosi^2
        -(s2 * (eta * eta)) + 1.0
    };

    if pt_on && !opaque && fresnel {
        // Unbiased two-way split: one branch per lane, weighted by its
        // probability.
        pt_interface_split(
            ts, cfg, stack, ci, s_idx, side, mask, &n, &ray, cosi, eta, k, loc, hitw, mat,
            c_rfl, c_trn, &mut base, rng, depth_ok,
        );
        commit(stack.frame(ci), mask, t, hitw, &base);
        return;
    }

    let mut rfl_col = [Fx::<N>::ZERO; 3];
    if c_rfl.hmax() > 0.0 && depth_ok {
        let two_dot = vx_dot(&ray, &n) * 2.0;
        let rdir = vx_normalize(&[
            ray[0] - n[0] * two_dot,
            ray[1] - n[1] * two_dot,
            ray[2] - n[2] * two_dot,
        ]);
        rfl_col = spawn_trace(
            ts, cfg, stack, ci, hitw, &rdir, mask, Pass::Back, s_idx, side, loc, rng,
        );
    }

    let mut trn_col = [Fx::<N>::ZERO; 3];
    if c_trn.hmax() > 0.0 && depth_ok {
        let tdir = if mat.props.contains(MatProps::REFRACT) {
            let sq = k.max(Fx::ZERO).sqrt();
            let coef = cosi * eta - sq;
            vx_normalize(&[
                ray[0] * eta + n[0] * coef,
                ray[1] * eta + n[1] * coef,
                ray[2] * eta + n[2] * coef,
            ])
        } else {
            ray
        };
        let live = mask & c_trn.gt(Fx::ZERO);
        if live.any() {
            trn_col = spawn_trace(
                ts, cfg, stack, ci, hitw, &tdir, live, Pass::Thru, s_idx, side, loc, rng,
            );
        }
    }

    let keep = (Fx::ONE - c_rfl - c_trn).max(Fx::ZERO);
    for ch in 0..3 {
        base[ch] = base[ch] * keep + rfl_col[ch] * c_rfl + trn_col[ch] * c_trn;
    }

    commit(stack.frame(ci), mask, t, hitw, &base);
}

/// Direct lighting: ambient, then per light the facing test, shadow
/// any-hit, attenuated diffuse and the fixed-point-power specular.
fn direct_lighting<const N: usize>(
    ts: &TraceScene,
    cfg: &Config,
    stack: &mut CtxStack<N>,
    ci: usize,
    s_idx: usize,
    side: Side,
    mask: Mx<N>,
    n: &Vx<N>,
    ray: &Vx<N>,
    loc: &Vx<N>,
    hitw: &Vx<N>,
    mat: &Material,
    tex: &Vx<N>,
    rng: &mut Ux<N>,
) -> Vx<N> {
    let mut out = [
        tex[0] * ts.ambient.x,
        tex[1] * ts.ambient.y,
        tex[2] * ts.ambient.z,
    ];

    let shadows = cfg.opts.contains(Opts::SHADOWS) && ci + 1 < stack.len();
    let colored = cfg.opts.contains(Opts::COLORED);
    let diffuse = mat.props.contains(MatProps::DIFFUSE);
    let specular = mat.props.contains(MatProps::SPECULAR);
    if !diffuse && !specular {
        return out;
    }

    for light in &ts.lights {
        let lvec = vx_sub(&vx_splat(light.pos), hitw);
        let d2 = vx_dot(&lvec, &lvec);
        let dist = d2.sqrt();
        let inv = dist.recip();
        let ldir = [lvec[0] * inv, lvec[1] * inv, lvec[2] * inv];

        let ndotl = vx_dot(n, &ldir);
        let mut facing = mask & ndotl.gt(Fx::ZERO);
        if light.a_rng > 0.0 {
            facing = facing & d2.lt(Fx::splat(light.a_rng * light.a_rng));
        }
        if !facing.any() {
            continue;
        }

        if shadows {
            let sub = stack.frame(ci + 1);
            sub.reset(*hitw, ldir, facing, Pass::Shadow);
            sub.t_buf = dist;
            sub.org_surf = s_idx as i32;
            sub.org_side = side;
            sub.loc = *loc;
            let shadow = occlude(ts, cfg, stack, ci + 1, &light.ignore, rng);
            facing = facing & !shadow;
            if !facing.any() {
                continue;
            }
        }

        let att = (Fx::splat(light.a_cnt) + dist * light.a_lnr + d2 * light.a_qdr).recip();

        let diff = if diffuse {
            ndotl * mat.l_dff
        } else {
            Fx::ZERO
        };

        let spec = if specular {
            let two_dot = vx_dot(ray, n) * 2.0;
            let refl = [
                ray[0] - n[0] * two_dot,
                ray[1] - n[1] * two_dot,
                ray[2] - n[2] * two_dot,
            ];
            let s = vx_dot(&refl, &ldir).max(Fx::ZERO);
            fpow(s, mat.l_pow) * mat.l_spc
        } else {
            Fx::ZERO
        };

        let metal = mat.props.contains(MatProps::METAL);
        let lcol = if colored {
            light.col
        } else {
            glam::Vec3::splat((light.col.x + light.col.y + light.col.z) / 3.0)
        };

        for ch in 0..3 {
            // Metal specular picks up the surface color.
            let tint = if metal { tex[ch] } else { Fx::ONE };
            let term = (tex[ch] * diff + tint * spec) * att * lcol[ch];
            out[ch] = out[ch] + term.select(facing, Fx::ZERO);
        }
    }

    out
}

/// Path-traced diffuse: one cosine-weighted hemisphere bounce per lane with
/// Russian-roulette survival on the texture color.
fn pt_diffuse<const N: usize>(
    ts: &TraceScene,
    cfg: &Config,
    stack: &mut CtxStack<N>,
    ci: usize,
    s_idx: usize,
    side: Side,
    mask: Mx<N>,
    n: &Vx<N>,
    loc: &Vx<N>,
    hitw: &Vx<N>,
    mat: &Material,
    tex: &Vx<N>,
    rng: &mut Ux<N>,
    depth_ok: bool,
) -> Vx<N> {
    if !mat.props.contains(MatProps::DIFFUSE) || !depth_ok {
        return [Fx::ZERO; 3];
    }

    // Russian roulette on the brightest channel; survivors divide it out.
    let p = tex[0].max(tex[1]).max(tex[2]).clamp(1.0e-3, 1.0);
    let u = lcg_next(rng);
    let survive = mask & u.lt(p);
    if !survive.any() {
        return [Fx::ZERO; 3];
    }
    let texc = [tex[0] / p, tex[1] / p, tex[2] / p];

    let (t1, t2) = pt_basis(n, &stack.frame(ci).ray);
    let u1 = lcg_next(rng);
    let u2 = lcg_next(rng);
    let phi = u2 * std::f32::consts::TAU;
    let sin_t = u1.sqrt();
    let cos_t = (-u1 + 1.0).max(Fx::ZERO).sqrt();
    let (cp, sp) = {
        let mut c = Fx::ZERO;
        let mut s = Fx::ZERO;
        for i in 0..N {
            let (si, co) = phi.0[i].sin_cos();
            c.0[i] = co;
            s.0[i] = si;
        }
        (c, s)
    };
    let dir = vx_normalize(&[
        n[0] * cos_t + (t1[0] * cp + t2[0] * sp) * sin_t,
        n[1] * cos_t + (t1[1] * cp + t2[1] * sp) * sin_t,
        n[2] * cos_t + (t1[2] * cp + t2[2] * sp) * sin_t,
    ]);

    let sub = spawn_trace(
        ts, cfg, stack, ci, hitw, &dir, survive, Pass::Back, s_idx, side, loc, rng,
    );

    let mut out = [Fx::ZERO; 3];
    for ch in 0..3 {
        out[ch] = (sub[ch] * mat.l_dff * texc[ch]).select(survive, Fx::ZERO);
    }
    out
}

/// Path-traced Fresnel interface: per lane a reflect-or-refract coin flip
/// weighted by the reflectance, throughput divided by the branch
/// probability.
fn pt_interface_split<const N: usize>(
    ts: &TraceScene,
    cfg: &Config,
    stack: &mut CtxStack<N>,
    ci: usize,
    s_idx: usize,
    side: Side,
    mask: Mx<N>,
    n: &Vx<N>,
    ray: &Vx<N>,
    cosi: Fx<N>,
    eta: f32,
    k: Fx<N>,
    loc: &Vx<N>,
    hitw: &Vx<N>,
    mat: &Material,
    c_rfl: Fx<N>,
    c_trn: Fx<N>,
    base: &mut Vx<N>,
    rng: &mut Ux<N>,
    depth_ok: bool,
) {
    if !depth_ok {
        return;
    }
    let total = (c_rfl + c_trn).clamp(1.0e-6, 1.0);
    let r_prob = (c_rfl / total).clamp(0.0, 1.0);

    let u = lcg_next(rng);
    let pick_r = mask & u.lt(r_prob);
    let pick_t = mask & !pick_r & c_trn.gt(Fx::ZERO);

    if pick_r.any() {
        let two_dot = vx_dot(ray, n) * 2.0;
        let rdir = vx_normalize(&[
            ray[0] - n[0] * two_dot,
            ray[1] - n[1] * two_dot,
            ray[2] - n[2] * two_dot,
        ]);
        let sub = spawn_trace(
            ts, cfg, stack, ci, hitw, &rdir, pick_r, Pass::Back, s_idx, side, loc, rng,
        );
        // c_rfl / P(reflect) collapses to the combined weight.
        for ch in 0..3 {
            base[ch] = base[ch] + (sub[ch] * total).select(pick_r, Fx::ZERO);
        }
    }

    if pick_t.any() {
        let tdir = if mat.props.contains(MatProps::REFRACT) {
            let sq = k.max(Fx::ZERO).sqrt();
            let coef = cosi * eta - sq;
            vx_normalize(&[
                ray[0] * eta + n[0] * coef,
                ray[1] * eta + n[1] * coef,
                ray[2] * eta + n[2] * coef,
            ])
        } else {
            *ray
        };
        let sub = spawn_trace(
            ts, cfg, stack, ci, hitw, &tdir, pick_t, Pass::Thru, s_idx, side, loc, rng,
        );
        for ch in 0..3 {
            base[ch] = base[ch] + (sub[ch] * total).select(pick_t, Fx::ZERO);
        }
    }
}

/// Writes the shaded color and depth into the context, masked per lane.
fn commit<const N: usize>(
    ctx: &mut crate::backend::context::RayCtx<N>,
    mask: Mx<N>,
    t: Fx<N>,
    hitw: &Vx<N>,
    col: &Vx<N>,
) {
    ctx.t_buf = t.select(mask, ctx.t_buf);
    ctx.col = vx_select(mask, col, &ctx.col);
    ctx.hit = vx_select(mask, hitw, &ctx.hit);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fpow_integer_powers() {
        let x = Fx::<4>::splat(0.5);
        let p = fpow(x, 3 << 4); // 3.0 in 28.4
        for v in p.0 {
            assert!((v - 0.125).abs() < 1e-6);
        }
    }

    #[test]
    fn fpow_fractional_power() {
        let x = Fx::<4>::splat(0.25);
        let p = fpow(x, (1 << 4) | 8); // 1.5 in 28.4
        for v in p.0 {
            assert!((v - 0.125).abs() < 1e-5); // 0.25^1.5
        }
    }

    #[test]
    fn dielectric_fresnel_normal_incidence() {
        let cosi = Fx::<4>::splat(1.0);
        let r = fresnel_dielectric(cosi, 1.0 / 1.5, false);
        // ((n1-n2)/(n1+n2))^2 = 0.04
        for v in r.0 {
            assert!((v - 0.04).abs() < 1e-3);
        }
        let rs = fresnel_dielectric(cosi, 1.0 / 1.5, true);
        for v in rs.0 {
            assert!((v - 0.04).abs() < 1e-3);
        }
    }

    #[test]
    fn dielectric_fresnel_tir() {
        // Exiting glass at a grazing angle: total internal reflection.
        let cosi = Fx::<4>::splat(0.2);
        let r = fresnel_dielectric(cosi, 1.5, false);
        for v in r.0 {
            assert!((v - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn metal_fresnel_bounded() {
        let cosi = Fx::<4>::splat(0.7);
        let slow = fresnel_metal(cosi, 0.2, 9.0, false);
        let fast = fresnel_metal(cosi, 0.2, 9.0, true);
        for v in slow.0.iter().chain(fast.0.iter()) {
            assert!((0.0..=1.0).contains(v));
        }
    }
}
