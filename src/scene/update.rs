//! Hierarchical scene update.
//!
//! Three ordered phases driven by [`update`]:
//!
//! 0. Matrix propagation (serial, top-down): animation callbacks, change
//!    inheritance, transform classification, trnode determination and
//!    matrix composition with transform caching.
//! 1. Per-object field derivation (parallelizable): inverse matrices,
//!    quadric coefficient rewrite along mapped axes, camera yaw cache.
//! 2. Bounds rebuild (serial, bottom-up): surface bounding/clipping boxes
//!    with custom-clipper tightening, bbox geometry and array aggregation.
//!
//! The heavy lifting of the three-case matrix composition rule:
//! an object trivially transformed under its parent trnode keeps its own
//! (relative) matrix for transform caching; an object with its own
//! non-trivial transform below a distant trnode recombines through the
//! trnode chain; everyone else composes with the inherited matrix.

use glam::{Mat4, Vec3, Vec4};

use crate::config::Opts;
use crate::math::{AxisMap, INF, shift_bound};
use crate::scene::bound::update_bbgeom;
use crate::scene::object::{ObjData, ObjTag};
use crate::scene::relation::{ClipElem, ClipKind};
use crate::scene::surface::SurfKind;
use crate::scene::transform::TrmFlags;
use crate::scene::{ObjKey, Scene};

/// Runs all three update phases for the given time.
pub fn update(scene: &mut Scene, time: f64) {
    let root = scene.root;
    update_matrix(scene, root, time, Mat4::IDENTITY, false, TrmFlags::empty());

    // Phase 1 iterates the flat registry lists; per-object work is
    // independent and safe to stripe across workers.
    let keys: Vec<ObjKey> = scene.objects.keys().collect();
    for key in keys {
        update_fields(scene, key);
    }

    update_bounds_array(scene, root);
}

// ============================================================================
// Phase 0 — matrix propagation
// ============================================================================

fn update_matrix(
    scene: &mut Scene,
    key: ObjKey,
    time: f64,
    pmtx: Mat4,
    p_changed: bool,
    p_flags: TrmFlags,
) {
    let opts = scene.opts;
    let tag = scene.objects[key].tag;

    // Inherit changed status from the hierarchy; cameras fold in pending
    // action state, arrays force a full pass on the first root update or
    // when incremental updates are disabled.
    let mut changed = p_changed;
    {
        let node = &scene.objects[key];
        if let ObjData::Camera(c) = &node.data {
            if c.cam_changed {
                changed = true;
            }
        }
        if tag.is_array()
            && ((node.time.is_none() && node.parent.is_none()) || opts.contains(Opts::UPDATE))
        {
            changed = true;
        }
    }

    // Animation callback; animated objects are always considered changed.
    {
        let node = &mut scene.objects[key];
        if node.anim.is_some() {
            if node.time != Some(time) {
                let prev = node.time.unwrap_or(0.0);
                let anim = node.anim.take().expect("checked above");
                anim(time, prev, &mut node.trm);
                node.anim = Some(anim);
            }
            changed = true;
        }
        node.time = Some(time);
        node.obj_changed = changed;
    }

    if changed {
        compose_matrix(scene, key, pmtx, p_flags);
    }

    // Arrays recurse regardless: children may be animated below an
    // unchanged parent.
    if tag.is_array() {
        let (children, pass_mtx, obj_changed, mtx_has) = {
            let node = &mut scene.objects[key];
            let self_trnode_scl =
                node.trnode == Some(key) && node.obj_has_trm == TrmFlags::SCL;
            let map = node.map;
            let obj_changed = node.obj_changed;
            let mtx_has = node.mtx_has_trm;
            let mtx = node.mtx;

            let arr = node.data.as_array_mut().expect("array tag");
            if self_trnode_scl && obj_changed {
                arr.axm = map.to_matrix();
            }
            let pass_mtx = if self_trnode_scl { arr.axm } else { mtx };

            // The array's own mapping moved into axm / the children; its
            // matrix is a plain diagonal now.
            node.map = AxisMap::IDENTITY;

            let arr = node.data.as_array().expect("array tag");
            (arr.children.clone(), pass_mtx, obj_changed, mtx_has)
        };

        for child in children {
            update_matrix(
                scene,
                child,
                time,
                pass_mtx,
                p_changed || obj_changed,
                p_flags | mtx_has,
            );
        }
    }
}

/// Classification, trnode search and the three-case composition rule.
fn compose_matrix(scene: &mut Scene, key: ObjKey, pmtx: Mat4, p_flags: TrmFlags) {
    let opts = scene.opts;
    let tag = scene.objects[key].tag;
    let parent = scene.objects[key].parent;

    let (mtx_has, own_mtx) = {
        let node = &scene.objects[key];
        (
            node.trm.classify(opts.contains(Opts::FSCALE)),
            node.trm.matrix(),
        )
    };
    let obj_has = mtx_has | (p_flags & (TrmFlags::SCL | TrmFlags::ROT));

    // Nearest ancestor with a non-trivial transform.
    let mut trnode = parent;
    while let Some(t) = trnode {
        if !scene.objects[t].mtx_has_trm.is_empty() {
            break;
        }
        trnode = scene.objects[t].parent;
    }

    let mut mtx = if trnode.is_some()
        && trnode == parent
        && mtx_has.is_empty()
        && obj_has.contains(TrmFlags::ROT)
    {
        // Trivial under the parent trnode: own matrix only (cached).
        own_mtx
    } else if trnode.is_some() && trnode != parent && !mtx_has.is_empty() {
        // Own non-trivial transform below a distant trnode: recombine.
        scene.objects[trnode.expect("checked")].mtx * pmtx * own_mtx
    } else {
        pmtx * own_mtx
    };

    // An object with its own non-trivial transform is its own trnode.
    let mut trnode = if mtx_has.is_empty() { trnode } else { Some(key) };

    // Full world matrices for objects outside the caching set.
    if let Some(t) = trnode {
        if t != key
            && (!opts.contains(Opts::TARRAY) || !(tag.is_surface() || tag.is_array()))
        {
            mtx = scene.objects[t].mtx * mtx;
            trnode = Some(key);
        }
    }

    let node = &mut scene.objects[key];
    node.mtx = mtx;
    node.mtx_has_trm = mtx_has;
    node.obj_has_trm = obj_has;
    node.trnode = trnode;
    node.map = AxisMap::IDENTITY;

    // Axis mapping for trivial transforms (and the diagonal separation of
    // scaling-only self-trnodes); cameras and lights have no use for maps.
    if (tag.is_surface() || tag.is_array())
        && (trnode != Some(key) || obj_has == TrmFlags::SCL)
    {
        if let Some((map, scl)) = AxisMap::from_matrix(&node.mtx) {
            node.map = map;
            if trnode == Some(key) && obj_has == TrmFlags::SCL {
                for i in 0..3 {
                    let j = map.map[i];
                    let mut col = Vec4::ZERO;
                    col[j] = scl[i];
                    *node.mtx.col_mut(j) = col;
                }
            }
        }
    }
}

// ============================================================================
// Phase 1 — per-object field derivation
// ============================================================================

fn update_fields(scene: &mut Scene, key: ObjKey) {
    let node = &mut scene.objects[key];
    if !node.obj_changed {
        return;
    }

    if node.trnode == Some(key) {
        node.inv = node.mtx.inverse();
    }

    let map = node.map;
    match &mut node.data {
        ObjData::Surface(s) => {
            (s.shape.sci, s.shape.scj, s.shape.sck) = s.kind.coeffs(&map);
        }
        ObjData::Camera(c) => {
            let (s, co) = node.trm.rotation.z.to_radians().sin_cos();
            c.hor_sin = s;
            c.hor_cos = co;
            c.cam_changed = false;
        }
        _ => {}
    }
}

// ============================================================================
// Phase 2 — bounds rebuild
// ============================================================================

/// Minmax context copied out of a surface so clipper tightening can mix
/// two surfaces' data without aliasing the arena.
#[derive(Clone, Copy)]
struct SurfMm {
    kind: SurfKind,
    smin: Vec3,
    smax: Vec3,
    pos: Vec3,
    map: AxisMap,
    self_trnode: bool,
}

impl SurfMm {
    fn capture(scene: &Scene, key: ObjKey) -> Self {
        let node = &scene.objects[key];
        let s = node.data.as_surface().expect("surface");
        Self {
            kind: s.kind,
            smin: s.smin,
            smax: s.smax,
            pos: node.pos(),
            map: node.map,
            self_trnode: node.trnode == Some(key),
        }
    }

    /// Sub-world box -> local box (axis map, sign swap, position shift).
    fn invert(&self, smin: Vec3, smax: Vec3) -> (Vec3, Vec3) {
        let pps = if self.self_trnode { Vec3::ZERO } else { self.pos };
        let mut tmin = Vec3::ZERO;
        let mut tmax = Vec3::ZERO;
        for a in 0..3 {
            tmin[a] = shift_bound(smin[a], -pps[a]);
            tmax[a] = shift_bound(smax[a], -pps[a]);
        }
        let mut dmin = Vec3::ZERO;
        let mut dmax = Vec3::ZERO;
        for i in 0..3 {
            let (m, s) = (self.map.map[i], self.map.sgn[i]);
            if s > 0.0 {
                dmin[i] = tmin[m];
                dmax[i] = tmax[m];
            } else {
                dmin[i] = -tmax[m];
                dmax[i] = -tmin[m];
            }
        }
        (dmin, dmax)
    }

    /// Local box -> sub-world box.
    fn direct(&self, smin: Vec3, smax: Vec3) -> (Vec3, Vec3) {
        let pps = if self.self_trnode { Vec3::ZERO } else { self.pos };
        let mut tmin = Vec3::ZERO;
        let mut tmax = Vec3::ZERO;
        for i in 0..3 {
            let (m, s) = (self.map.map[i], self.map.sgn[i]);
            if s > 0.0 {
                tmin[m] = smin[i];
                tmax[m] = smax[i];
            } else {
                tmin[m] = -smax[i];
                tmax[m] = -smin[i];
            }
        }
        let mut dmin = Vec3::ZERO;
        let mut dmax = Vec3::ZERO;
        for a in 0..3 {
            dmin[a] = shift_bound(tmin[a], pps[a]);
            dmax[a] = shift_bound(tmax[a], pps[a]);
        }
        (dmin, dmax)
    }

    /// Recalculates bounding and/or clipping boxes from a source box.
    ///
    /// Three modes, selected by which boxes are present:
    /// - source without bbox: run on a *clipper*, accumulating the bbox
    ///   tightening it contributes into the cbox accumulator;
    /// - source with bbox and cbox: apply a previously accumulated cbox to
    ///   the surface's own boxes;
    /// - no source: initialize from the raw axis clippers.
    fn recalc(
        &self,
        src: Option<(Vec3, Vec3)>,
        mut bbox: Option<(&mut Vec3, &mut Vec3)>,
        mut cbox: Option<(&mut Vec3, &mut Vec3)>,
    ) {
        let (tmin, tmax, accumulate) = match (src, bbox.is_some()) {
            (Some((smin, smax)), false) => {
                let (a, b) = self.invert(smin, smax);
                (a, b, true)
            }
            (Some((smin, smax)), true) => {
                let (a, b) = self.invert(smin, smax);
                (a.max(self.smin), b.min(self.smax), false)
            }
            (None, _) => (self.smin, self.smax, false),
        };

        if accumulate {
            let mut lmin = Vec3::ZERO;
            let mut lmax = Vec3::ZERO;
            self.kind.adjust_minmax(
                tmin,
                tmax,
                self.smin,
                self.smax,
                Some((&mut lmin, &mut lmax)),
                None,
            );
            // Only sides the shape actually tightened participate.
            let mut amin = Vec3::ZERO;
            let mut amax = Vec3::ZERO;
            for a in 0..3 {
                amin[a] = if tmin[a] == lmin[a] { -INF } else { lmin[a] };
                amax[a] = if tmax[a] == lmax[a] { INF } else { lmax[a] };
            }
            let (dmin, dmax) = self.direct(amin, amax);
            if let Some((cmin, cmax)) = cbox.as_mut() {
                **cmin = cmin.max(dmin);
                **cmax = cmax.min(dmax);
            }
            return;
        }

        self.kind.adjust_minmax(
            tmin,
            tmax,
            self.smin,
            self.smax,
            bbox.as_mut().map(|(a, b)| (&mut **a, &mut **b)),
            cbox.as_mut().map(|(a, b)| (&mut **a, &mut **b)),
        );
        if let Some((bmin, bmax)) = bbox {
            (*bmin, *bmax) = self.direct(*bmin, *bmax);
        }
        if let Some((cmin, cmax)) = cbox {
            (*cmin, *cmax) = self.direct(*cmin, *cmax);
        }
    }
}

/// Recomputes one surface's bounding/clipping boxes and geometry.
fn update_surface_bounds(scene: &mut Scene, key: ObjKey) {
    let opts = scene.opts;
    let ctx = SurfMm::capture(scene, key);
    let trnode = scene.objects[key].trnode;
    let obj_changed = scene.objects[key].obj_changed;
    let clip: Vec<ClipElem> = scene.objects[key]
        .data
        .as_surface()
        .expect("surface")
        .clip
        .iter()
        .copied()
        .collect();

    // Clippers that participate in bbox tightening: MINUS_OUTER surfaces
    // sharing the trnode, outside accumulator groups, planes excluded.
    let tightening: Vec<ObjKey> = {
        let mut out = Vec::new();
        let mut in_accum = false;
        for elem in &clip {
            match *elem {
                ClipElem::Enter | ClipElem::Leave => in_accum = !in_accum,
                ClipElem::Surface { obj, kind } => {
                    if in_accum || kind != ClipKind::MinusOuter {
                        continue;
                    }
                    let cn = &scene.objects[obj];
                    if cn.tag == ObjTag::Plane || cn.trnode != trnode {
                        continue;
                    }
                    out.push(obj);
                }
            }
        }
        out
    };

    let adjust = opts.contains(Opts::ADJUST)
        && !tightening.is_empty()
        && trnode != Some(key);

    let mut srf_changed = obj_changed;

    if adjust {
        for &obj in &tightening {
            srf_changed |= scene.objects[obj].obj_changed;
        }
    }

    {
        let s = scene.objects[key].data.as_surface_mut().expect("surface");
        s.srf_changed = srf_changed;
    }
    if !srf_changed {
        return;
    }

    let mut bmin;
    let mut bmax;
    let mut cmin;
    let mut cmax;

    if adjust {
        // Bbox from the raw clippers first, then accumulate each outer
        // clipper's tightening into a fresh cbox and re-adjust.
        bmin = Vec3::ZERO;
        bmax = Vec3::ZERO;
        ctx.recalc(None, Some((&mut bmin, &mut bmax)), None);

        cmin = Vec3::splat(-INF);
        cmax = Vec3::splat(INF);
        for &obj in &tightening {
            let clipper = SurfMm::capture(scene, obj);
            clipper.recalc(Some((bmin, bmax)), None, Some((&mut cmin, &mut cmax)));
        }

        let src = (cmin, cmax);
        ctx.recalc(Some(src), Some((&mut bmin, &mut bmax)), Some((&mut cmin, &mut cmax)));
    } else {
        bmin = Vec3::ZERO;
        bmax = Vec3::ZERO;
        cmin = Vec3::ZERO;
        cmax = Vec3::ZERO;
        ctx.recalc(None, Some((&mut bmin, &mut bmax)), Some((&mut cmin, &mut cmax)));
    }

    let trnode_mtx = trnode.map(|t| scene.objects[t].mtx);
    let is_plane = scene.objects[key].tag == ObjTag::Plane;
    let map = scene.objects[key].map;

    let s = scene.objects[key].data.as_surface_mut().expect("surface");
    s.shape.bound.bmin = bmin;
    s.shape.bound.bmax = bmax;
    s.shape.cmin = cmin;
    s.shape.cmax = cmax;

    if !s.shape.bound.verts.is_empty() {
        update_bbgeom(&mut s.shape.bound, &map, is_plane, trnode_mtx.as_ref());
    }
}

/// Aggregates array bounds bottom-up: `aux` collects trnode-cached surface
/// boxes in the trnode view, `bxx` collects bvnode-bound descendants in the
/// world view. The radius field tags empty / finite / boundless.
fn update_bounds_array(scene: &mut Scene, key: ObjKey) {
    {
        let arr = scene.objects[key].data.as_array_mut().expect("array");
        arr.aux.reset();
        arr.bxx.reset();
    }

    let children = scene.objects[key]
        .data
        .as_array()
        .expect("array")
        .children
        .clone();

    for child in children {
        let tag = scene.objects[child].tag;
        if tag.is_array() {
            update_bounds_array(scene, child);
        } else if tag.is_surface() {
            update_surface_bounds(scene, child);
        } else {
            continue;
        }

        let (crad, cbmin, cbmax, cverts) = {
            let node = &scene.objects[child];
            match &node.data {
                ObjData::Array(a) => (a.bxx.rad, a.bxx.bmin, a.bxx.bmax, Vec::new()),
                ObjData::Surface(s) => (
                    s.shape.bound.rad,
                    s.shape.bound.bmin,
                    s.shape.bound.bmax,
                    s.shape.bound.verts.clone(),
                ),
                _ => unreachable!(),
            }
        };
        if crad == 0.0 {
            continue;
        }

        let trnode = scene.objects[child].trnode;
        let bvnode = scene.objects[child].bvnode;

        // Trnode view: cached surfaces extend their trnode's aux box.
        if tag.is_surface() {
            if let Some(t) = trnode {
                if t != child {
                    if let Some(arr) = scene.objects[t].data.as_array_mut() {
                        if crad != INF {
                            arr.aux.enclose(cbmin, cbmax);
                        }
                        arr.aux.rad = arr.aux.rad.max(crad);
                    }
                }
            }
        }

        // World view: bvnode-bound objects extend their bvnode's box.
        if let Some(bv) = bvnode {
            let world_box = trnode.is_none() || tag.is_array();
            if let Some(arr) = scene.objects[bv].data.as_array_mut() {
                if crad != INF {
                    if world_box {
                        arr.bxx.enclose(cbmin, cbmax);
                    } else {
                        for v in &cverts {
                            arr.bxx.enclose_point(*v);
                        }
                    }
                }
                arr.bxx.rad = arr.bxx.rad.max(crad);
            }
        }
    }

    let trnode = scene.objects[key].trnode;
    let trnode_mtx = trnode.map(|t| scene.objects[t].mtx);
    let map = scene.objects[key].map;

    let arr = scene.objects[key].data.as_array_mut().expect("array");
    if arr.aux.rad != 0.0 && arr.aux.rad != INF {
        update_bbgeom(&mut arr.aux, &map, false, trnode_mtx.as_ref());
    }
    if arr.bxx.rad != 0.0 && arr.bxx.rad != INF {
        // Always world space; no trnode transform.
        update_bbgeom(&mut arr.bxx, &map, false, None);
    }
}
