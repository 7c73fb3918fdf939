//! Surface shapes: quadric coefficient derivation and per-shape bounding /
//! clipping box adjustment.
//!
//! Every supported surface is either the K = 0 plane or a quadric
//! `sum(sci * p^2) - sum(scj * p) - sci_w = 0` in its local frame. Phase 1
//! of the update rewrites the coefficient vectors along the mapped world
//! axes so the traversal kernel never touches the axis map for the solve
//! itself.

use glam::{Vec3, Vec4};

use crate::math::{AxisMap, I, INF, J, K};
use crate::scene::ObjTag;

/// A supported surface shape with its scalar parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfKind {
    /// `K = 0` plane.
    Plane,
    /// `I^2 + J^2 = rad^2`.
    Cylinder {
        /// Radius.
        rad: f32,
    },
    /// `I^2 + J^2 + K^2 = rad^2`.
    Sphere {
        /// Radius.
        rad: f32,
    },
    /// `I^2 + J^2 = (rat * K)^2`.
    Cone {
        /// Radius-over-height ratio.
        rat: f32,
    },
    /// `I^2 + J^2 = par * K`.
    Paraboloid {
        /// Parabolic coefficient.
        par: f32,
    },
    /// `I^2 + J^2 - (rat * K)^2 = hyp`.
    Hyperboloid {
        /// Asymptote slope.
        rat: f32,
        /// Hyperbolic offset.
        hyp: f32,
    },
}

impl SurfKind {
    /// The object tag for this shape.
    #[must_use]
    pub fn tag(self) -> ObjTag {
        match self {
            SurfKind::Plane => ObjTag::Plane,
            SurfKind::Cylinder { .. } => ObjTag::Cylinder,
            SurfKind::Sphere { .. } => ObjTag::Sphere,
            SurfKind::Cone { .. } => ObjTag::Cone,
            SurfKind::Paraboloid { .. } => ObjTag::Paraboloid,
            SurfKind::Hyperboloid { .. } => ObjTag::Hyperboloid,
        }
    }

    /// Vertex count of the bound geometry for the given raw clippers:
    /// 8 for closed boxes, 4 for finite plane rectangles, 0 when the shape
    /// stays boundless along an unclipped axis.
    #[must_use]
    pub fn geom_verts(self, smin: Vec3, smax: Vec3) -> usize {
        match self {
            SurfKind::Plane => {
                if smin[I] == -INF || smin[J] == -INF || smax[I] == INF || smax[J] == INF {
                    0
                } else {
                    4
                }
            }
            SurfKind::Sphere { .. } => 8,
            SurfKind::Cylinder { .. } | SurfKind::Cone { .. } | SurfKind::Hyperboloid { .. } => {
                if smin[K] == -INF || smax[K] == INF { 0 } else { 8 }
            }
            SurfKind::Paraboloid { par } => {
                if (smin[K] == -INF && par < 0.0) || (smax[K] == INF && par > 0.0) {
                    0
                } else {
                    8
                }
            }
        }
    }

    /// Rewrites the coefficient vectors along the mapped axes with signs.
    /// Returned vectors are indexed by world axis; `sci.w` is the constant.
    #[must_use]
    pub fn coeffs(self, map: &AxisMap) -> (Vec4, Vec3, Vec3) {
        let mk = map.map[K];
        let sk = map.sgn[K];

        match self {
            SurfKind::Plane => {
                let mut sck = Vec3::ZERO;
                sck[mk] = sk;
                (Vec4::ZERO, Vec3::ZERO, sck)
            }
            SurfKind::Cylinder { rad } => {
                let mut sci = Vec4::new(1.0, 1.0, 1.0, rad * rad);
                sci[mk] = 0.0;
                (sci, Vec3::ZERO, Vec3::ZERO)
            }
            SurfKind::Sphere { rad } => {
                (Vec4::new(1.0, 1.0, 1.0, rad * rad), Vec3::ZERO, Vec3::ZERO)
            }
            SurfKind::Cone { rat } => {
                let mut sci = Vec4::new(1.0, 1.0, 1.0, 0.0);
                sci[mk] = -(rat * rat);
                (sci, Vec3::ZERO, Vec3::ZERO)
            }
            SurfKind::Paraboloid { par } => {
                let mut sci = Vec4::new(1.0, 1.0, 1.0, 0.0);
                sci[mk] = 0.0;
                let mut scj = Vec3::ZERO;
                scj[mk] = par * sk;
                (sci, scj, Vec3::ZERO)
            }
            SurfKind::Hyperboloid { rat, hyp } => {
                let mut sci = Vec4::new(1.0, 1.0, 1.0, hyp);
                sci[mk] = -(rat * rat);
                (sci, Vec3::ZERO, Vec3::ZERO)
            }
        }
    }

    /// Adjusts local-space bounding (`bbox`) and clipping (`cbox`) boxes for
    /// the shape, given a source rectangle `smin..smax` and the surface's
    /// raw axis clippers. The base rule opens cbox sides the raw clippers do
    /// not actually cut; shape rules then cap the radial extent.
    pub fn adjust_minmax(
        self,
        smin: Vec3,
        smax: Vec3,
        raw_min: Vec3,
        raw_max: Vec3,
        mut bbox: Option<(&mut Vec3, &mut Vec3)>,
        mut cbox: Option<(&mut Vec3, &mut Vec3)>,
    ) {
        if let Some((cmin, cmax)) = cbox.as_mut() {
            for a in 0..3 {
                cmin[a] = if smin[a] > raw_min[a] { -INF } else { smin[a] };
                cmax[a] = if smax[a] < raw_max[a] { INF } else { smax[a] };
            }
        }

        match self {
            SurfKind::Plane => {
                if let Some((bmin, bmax)) = bbox.as_mut() {
                    **bmin = Vec3::new(smin[I], smin[J], 0.0);
                    **bmax = Vec3::new(smax[I], smax[J], 0.0);
                }
                if let Some((cmin, cmax)) = cbox.as_mut() {
                    cmin[K] = -INF;
                    cmax[K] = INF;
                }
            }
            SurfKind::Cylinder { rad } => {
                let rad = rad.abs();
                Self::radial_caps(smin, smax, Vec3::new(rad, rad, INF), &mut bbox, &mut cbox);
            }
            SurfKind::Sphere { rad } => {
                let r = rad.abs();
                let mut radv = Vec3::splat(r);
                // A slab cut along one axis shrinks the reachable radius on
                // the other two.
                for k in 0..3 {
                    let top = if smin[k] > 0.0 {
                        smin[k]
                    } else if smax[k] < 0.0 {
                        -smax[k]
                    } else {
                        0.0
                    };
                    let rr = (rad * rad - top * top).max(0.0).sqrt();
                    let i = (k + 1) % 3;
                    let j = (k + 2) % 3;
                    radv[i] = radv[i].min(rr);
                    radv[j] = radv[j].min(rr);
                }
                Self::radial_caps(smin, smax, radv, &mut bbox, &mut cbox);
            }
            SurfKind::Cone { rat } => {
                let top = smin[K].abs().max(smax[K].abs());
                let rad = top * rat.abs();
                Self::radial_caps(smin, smax, Vec3::new(rad, rad, INF), &mut bbox, &mut cbox);
            }
            SurfKind::Paraboloid { par } => {
                let top = (if par < 0.0 { -smin[K] } else { smax[K] }).max(0.0);
                let rad = (top * par.abs()).sqrt();
                Self::radial_caps(smin, smax, Vec3::new(rad, rad, INF), &mut bbox, &mut cbox);
                if let Some((bmin, bmax)) = bbox.as_mut() {
                    if smin[K] <= 0.0 && par > 0.0 {
                        bmin[K] = 0.0;
                    }
                    if smax[K] >= 0.0 && par < 0.0 {
                        bmax[K] = 0.0;
                    }
                }
                if let Some((cmin, cmax)) = cbox.as_mut() {
                    if cmin[K] <= 0.0 && par > 0.0 {
                        cmin[K] = -INF;
                    }
                    if cmax[K] >= 0.0 && par < 0.0 {
                        cmax[K] = INF;
                    }
                }
            }
            SurfKind::Hyperboloid { rat, hyp } => {
                let top = smin[K].abs().max(smax[K].abs());
                let rad = (top * top * rat * rat + hyp).max(0.0).sqrt();
                Self::radial_caps(smin, smax, Vec3::new(rad, rad, INF), &mut bbox, &mut cbox);
            }
        }
    }

    /// Applies radial caps per axis: bbox clamps into `+-rad`, cbox opens
    /// sides already beyond the reachable radius.
    fn radial_caps(
        smin: Vec3,
        smax: Vec3,
        rad: Vec3,
        bbox: &mut Option<(&mut Vec3, &mut Vec3)>,
        cbox: &mut Option<(&mut Vec3, &mut Vec3)>,
    ) {
        if let Some((bmin, bmax)) = bbox.as_mut() {
            for a in 0..3 {
                if rad[a].is_finite() {
                    bmin[a] = smin[a].max(-rad[a]);
                    bmax[a] = smax[a].min(rad[a]);
                } else {
                    bmin[a] = smin[a];
                    bmax[a] = smax[a];
                }
            }
        }
        if let Some((cmin, cmax)) = cbox.as_mut() {
            for a in 0..3 {
                if rad[a].is_finite() {
                    if cmin[a] <= -rad[a] {
                        cmin[a] = -INF;
                    }
                    if cmax[a] >= rad[a] {
                        cmax[a] = INF;
                    }
                }
            }
        }
    }
}
