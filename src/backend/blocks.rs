//! Flat backend blocks.
//!
//! After the update phases, the scene tree is compiled into flat,
//! SIMD-friendly records: per-surface intersection constants, per-light
//! constants, the camera basis and a linear visibility list in which
//! bounding-sphere elements bracket the surface runs they guard. The
//! traversal kernel walks only these blocks; the arena is never touched
//! during render.

use glam::{Mat3, Vec3, Vec4};
use smallvec::SmallVec;

use crate::config::{Config, Opts};
use crate::errors::{PrismError, Result};
use crate::math::{AxisMap, INF, normal_matrix};
use crate::resources::{MatProps, Material};
use crate::scene::object::ObjData;
use crate::scene::relation::{ClipElem, ClipKind};
use crate::scene::surface::SurfKind;
use crate::scene::{ObjKey, Scene};

/// A transform frame shared by trnode-cached surfaces (or owned by a
/// self-trnode surface).
#[derive(Debug, Clone)]
pub struct TrBlock {
    /// Frame origin in world space.
    pub pos: Vec3,
    /// Inverse 3x3 of the frame matrix.
    pub inv: Mat3,
    /// Inverse-transpose 3x3 for normal back-transform.
    pub nrm: Mat3,
    /// Diagonal of the inverse, valid when `has_rot` is false.
    pub diag: Vec3,
    /// Full 3x3 needed; otherwise the diagonal fastpath applies.
    pub has_rot: bool,
}

/// How a surface's DFF/RAY reach its solve space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// No transform: world space is solve space.
    World,
    /// The surface owns the frame (self-trnode).
    Own(usize),
    /// The surface is cached under an ancestor trnode frame; the
    /// transformed DFF/RAY are shared across consecutive surfaces.
    Shared(usize),
}

/// Clip list element resolved to block indices.
#[derive(Debug, Clone, Copy)]
pub enum ClipRef {
    /// Clip against a surface block.
    Surf {
        /// Clipper block index.
        blk: usize,
        /// Subtracted subspace.
        kind: ClipKind,
    },
    /// Open an accumulator group.
    Enter,
    /// Close an accumulator group.
    Leave,
}

/// Per-surface intersection block.
#[derive(Debug, Clone)]
pub struct SurfBlock {
    /// Owning arena node.
    pub obj: ObjKey,
    /// Shape tag (drives the solver dispatch and singularity snap).
    pub kind: SurfKind,
    /// Solve-space frame.
    pub frame: Frame,
    /// Position within the frame (world when `Frame::World`).
    pub pos: Vec3,
    /// Axis map into the local I/J/K frame (texturing, clip-space reads).
    pub map: AxisMap,
    /// Bounding box lower corner, frame space, relative to `pos`.
    pub bmin: Vec3,
    /// Bounding box upper corner, frame space, relative to `pos`.
    pub bmax: Vec3,
    /// Which lower clip sides are active (finite cbox sides).
    pub min_t: [bool; 3],
    /// Which upper clip sides are active.
    pub max_t: [bool; 3],
    /// Quadric square coefficients by frame axis, `w` constant.
    pub sci: Vec4,
    /// Quadric linear coefficients by frame axis.
    pub scj: Vec3,
    /// Plane normal axis vector by frame axis.
    pub sck: Vec3,
    /// Material block indices, outer then inner.
    pub mat: [usize; 2],
    /// Custom clipper list in kernel order.
    pub clip: SmallVec<[ClipRef; 4]>,
    /// Screen-rectangle cull bounds (TILING), `None` tests always.
    pub screen: Option<[i32; 4]>,
}

/// Per-light block.
#[derive(Debug, Clone)]
pub struct LightBlock {
    /// World position.
    pub pos: Vec3,
    /// Premultiplied linear color.
    pub col: Vec3,
    /// Range cutoff (0 disables).
    pub a_rng: f32,
    /// Constant attenuation (biased by +1).
    pub a_cnt: f32,
    /// Linear attenuation.
    pub a_lnr: f32,
    /// Quadratic attenuation.
    pub a_qdr: f32,
    /// Surface blocks the shadow pass ignores for this light.
    pub ignore: SmallVec<[usize; 2]>,
}

/// Camera basis for primary ray generation.
#[derive(Debug, Clone)]
pub struct CamBlock {
    /// Eye position.
    pub pos: Vec3,
    /// Horizontal sensor vector.
    pub hor: Vec3,
    /// Vertical sensor vector.
    pub ver: Vec3,
    /// View normal.
    pub nrm: Vec3,
    /// Field-of-view scale.
    pub pov: f32,
    /// Background color.
    pub back: Vec3,
}

/// One element of the linear visibility list.
#[derive(Debug, Clone, Copy)]
pub enum TraceElem {
    /// Bounding-sphere guard: a miss skips the next `count` elements.
    Bound {
        /// Sphere center, world space.
        mid: Vec3,
        /// Squared radius.
        rad2: f32,
        /// Guarded element count.
        count: usize,
    },
    /// Test a surface block.
    Surf(usize),
}

/// The compiled, render-immutable scene view.
pub struct TraceScene {
    /// Surface blocks in tree order.
    pub surfs: Vec<SurfBlock>,
    /// Transform frames.
    pub trs: Vec<TrBlock>,
    /// Material blocks.
    pub mats: Vec<Material>,
    /// Light blocks.
    pub lights: Vec<LightBlock>,
    /// Visibility list.
    pub list: Vec<TraceElem>,
    /// Frame camera.
    pub cam: CamBlock,
    /// Ambient color (background-tinted when COLORED).
    pub ambient: Vec3,
}

/// Compiles the updated scene into backend blocks.
pub fn compile(scene: &Scene, cfg: &Config) -> Result<TraceScene> {
    let cam_key = scene.primary_camera().ok_or(PrismError::NoCamera)?;
    let cam_node = &scene.objects[cam_key];
    let ObjData::Camera(cam) = &cam_node.data else {
        return Err(PrismError::NoCamera);
    };
    // Camera matrices are always full world; basis from the columns.
    let cmtx = cam_node.mtx;
    let cam_block = CamBlock {
        pos: cam_node.pos(),
        hor: cmtx.col(0).truncate(),
        ver: cmtx.col(1).truncate(),
        nrm: cmtx.col(2).truncate(),
        pov: cam.pov,
        back: cam.background,
    };

    let ambient = if cfg.opts.contains(Opts::COLORED) {
        cam.background * cfg.ambient
    } else {
        Vec3::splat(cfg.ambient)
    };

    // Frames: one per distinct trnode referenced by any surface.
    let mut trs: Vec<TrBlock> = Vec::new();
    let mut tr_of: Vec<(ObjKey, usize)> = Vec::new();
    let mut frame_index = |scene: &Scene, trnode: ObjKey, trs: &mut Vec<TrBlock>| -> usize {
        if let Some(&(_, idx)) = tr_of.iter().find(|(k, _)| *k == trnode) {
            return idx;
        }
        let node = &scene.objects[trnode];
        let inv = Mat3::from_mat4(node.inv);
        let has_rot = node.obj_has_trm.contains(crate::scene::transform::TrmFlags::ROT);
        let block = TrBlock {
            pos: node.pos(),
            inv,
            nrm: normal_matrix(&node.inv),
            diag: Vec3::new(inv.x_axis.x, inv.y_axis.y, inv.z_axis.z),
            has_rot,
        };
        trs.push(block);
        let idx = trs.len() - 1;
        tr_of.push((trnode, idx));
        idx
    };

    // Surface blocks in registry order; remember arena -> block mapping
    // for clip list resolution.
    let mut blk_of: Vec<(ObjKey, usize)> = Vec::new();
    let mut mats: Vec<Material> = Vec::new();
    let mut surfs: Vec<SurfBlock> = Vec::new();

    for (i, &key) in scene.surfaces.iter().enumerate() {
        blk_of.push((key, i));
    }
    let blk_of_key = |key: ObjKey, blk_of: &[(ObjKey, usize)]| -> Option<usize> {
        blk_of.iter().find(|(k, _)| *k == key).map(|&(_, i)| i)
    };

    for &key in &scene.surfaces {
        let node = &scene.objects[key];
        let s = node.data.as_surface().expect("surface");

        let frame = match node.trnode {
            None => Frame::World,
            Some(t) if t == key => Frame::Own(frame_index(scene, t, &mut trs)),
            Some(t) => Frame::Shared(frame_index(scene, t, &mut trs)),
        };

        // Frame-space position: world for free surfaces, trnode-relative
        // for cached ones, the frame origin itself for self-trnodes.
        let pos = match frame {
            Frame::Own(_) => Vec3::ZERO,
            _ => node.pos(),
        };

        let pps = match frame {
            Frame::Own(_) => Vec3::ZERO,
            _ => node.pos(),
        };
        let bound = &s.shape.bound;
        let mut bmin = Vec3::ZERO;
        let mut bmax = Vec3::ZERO;
        for a in 0..3 {
            bmin[a] = crate::math::shift_bound(bound.bmin[a], -pps[a]);
            bmax[a] = crate::math::shift_bound(bound.bmax[a], -pps[a]);
        }

        let min_t = [
            s.shape.cmin.x != -INF,
            s.shape.cmin.y != -INF,
            s.shape.cmin.z != -INF,
        ];
        let max_t = [
            s.shape.cmax.x != INF,
            s.shape.cmax.y != INF,
            s.shape.cmax.z != INF,
        ];

        let outer = mats.len();
        mats.push(scene.materials[s.outer].clone());
        let inner = mats.len();
        mats.push(scene.materials[s.inner].clone());

        // The clip list was head-inserted at build; the backend reverses it
        // once more so accumulator markers sit in correct nesting order.
        let mut clip: SmallVec<[ClipRef; 4]> = SmallVec::new();
        for elem in s.clip.iter().rev() {
            clip.push(match *elem {
                ClipElem::Enter => ClipRef::Enter,
                ClipElem::Leave => ClipRef::Leave,
                ClipElem::Surface { obj, kind } => {
                    let Some(blk) = blk_of_key(obj, &blk_of) else {
                        continue;
                    };
                    ClipRef::Surf { blk, kind }
                }
            });
        }

        surfs.push(SurfBlock {
            obj: key,
            kind: s.kind,
            frame,
            pos,
            map: node.map,
            bmin,
            bmax,
            min_t,
            max_t,
            sci: s.shape.sci,
            scj: s.shape.scj,
            sck: s.shape.sck,
            mat: [outer, inner],
            clip,
            screen: None,
        });
    }

    // Lights; the per-light ignore set excludes emissive geometry sharing
    // the light's immediate parent array (the bulb around the bulb light).
    let mut lights: Vec<LightBlock> = Vec::new();
    for &key in &scene.lights {
        let node = &scene.objects[key];
        let ObjData::Light(l) = &node.data else {
            continue;
        };
        let mut ignore: SmallVec<[usize; 2]> = SmallVec::new();
        if let Some(parent) = node.parent {
            if let Some(arr) = scene.objects[parent].data.as_array() {
                for &sib in &arr.children {
                    if let Some(blk) = blk_of_key(sib, &blk_of) {
                        let outer = &mats[surfs[blk].mat[0]];
                        if outer.props.contains(MatProps::LIGHT) {
                            ignore.push(blk);
                        }
                    }
                }
            }
        }
        lights.push(LightBlock {
            pos: node.pos(),
            col: l.col,
            a_rng: l.a_rng,
            a_cnt: l.a_cnt,
            a_lnr: l.a_lnr,
            a_qdr: l.a_qdr,
            ignore,
        });
    }

    // Visibility list: bvnode-guarded runs first (grouped per bvnode with a
    // finite sphere), then free surfaces.
    let varray = cfg.opts.contains(Opts::VARRAY);
    let mut list: Vec<TraceElem> = Vec::new();
    let mut grouped: Vec<(ObjKey, Vec<usize>)> = Vec::new();
    let mut free: Vec<usize> = Vec::new();

    for (blk, &key) in scene.surfaces.iter().enumerate() {
        let bv = scene.objects[key].bvnode.filter(|_| varray);
        let sphere = bv.and_then(|b| {
            let arr = scene.objects[b].data.as_array()?;
            (arr.bxx.rad != 0.0 && arr.bxx.rad != INF).then_some(b)
        });
        match sphere {
            Some(b) => match grouped.iter_mut().find(|(k, _)| *k == b) {
                Some((_, v)) => v.push(blk),
                None => grouped.push((b, vec![blk])),
            },
            None => free.push(blk),
        }
    }

    for (bv, blks) in grouped {
        let arr = scene.objects[bv].data.as_array().expect("array");
        list.push(TraceElem::Bound {
            mid: arr.bxx.mid,
            rad2: arr.bxx.rad * arr.bxx.rad,
            count: blks.len(),
        });
        list.extend(blks.into_iter().map(TraceElem::Surf));
    }
    list.extend(free.into_iter().map(TraceElem::Surf));

    Ok(TraceScene {
        surfs,
        trs,
        mats,
        lights,
        list,
        cam: cam_block,
        ambient,
    })
}

impl TraceScene {
    /// Refreshes the TILING screen rectangles for the current camera and
    /// resolution. Surfaces without finite world geometry test always.
    pub fn refresh_screen_rects(&mut self, scene: &Scene, width: usize, height: usize) {
        let cam = &self.cam;
        let half_w = width as f32 * 0.5;
        let half_h = height as f32 * 0.5;
        for sb in &mut self.surfs {
            let node = &scene.objects[sb.obj];
            let bound = &node.data.as_surface().expect("surface").shape.bound;
            if bound.verts.is_empty() || bound.rad == 0.0 || bound.rad == INF {
                sb.screen = None;
                continue;
            }
            let mut x0 = i32::MAX;
            let mut y0 = i32::MAX;
            let mut x1 = i32::MIN;
            let mut y1 = i32::MIN;
            let mut behind = false;
            for v in &bound.verts {
                let d = *v - cam.pos;
                let z = d.dot(cam.nrm);
                if z <= crate::config::CLIP_THRESHOLD {
                    behind = true;
                    break;
                }
                // Project onto the pov-scaled sensor plane.
                let u = d.dot(cam.hor) / z * cam.pov;
                let w = d.dot(cam.ver) / z * cam.pov;
                let px = (u * half_w + half_w) as i32;
                let py = (w * half_w + half_h) as i32;
                x0 = x0.min(px - 1);
                y0 = y0.min(py - 1);
                x1 = x1.max(px + 1);
                y1 = y1.max(py + 1);
            }
            sb.screen = if behind {
                None
            } else {
                Some([
                    x0.max(0),
                    y0.max(0),
                    x1.min(width as i32),
                    y1.min(height as i32),
                ])
            };
        }
    }
}
