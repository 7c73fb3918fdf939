//! Scene arena nodes.
//!
//! An [`Object`] keeps only the data every update phase traverses: the
//! hierarchy links, the transform with its composed matrices, change and
//! triviality flags, the trnode/bvnode back-references (keys, never owning),
//! and a payload enum for the camera / light / array / surface specifics.

use glam::{Mat4, Vec3, Vec4};
use smallvec::SmallVec;

use crate::math::AxisMap;
use crate::scene::bound::Bound;
use crate::scene::describe::AnimFn;
use crate::scene::relation::ClipElem;
use crate::scene::surface::SurfKind;
use crate::scene::transform::{Transform, TrmFlags};
use crate::scene::{MatKey, ObjKey};

/// Object tags; surfaces are the contiguous tail of the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjTag {
    /// Camera node.
    Camera,
    /// Point light node.
    Light,
    /// Interior array node.
    Array,
    /// Plane surface.
    Plane,
    /// Cylinder surface.
    Cylinder,
    /// Sphere surface.
    Sphere,
    /// Cone surface.
    Cone,
    /// Paraboloid surface.
    Paraboloid,
    /// Hyperboloid surface.
    Hyperboloid,
}

impl ObjTag {
    /// True for the surface tags.
    #[must_use]
    pub fn is_surface(self) -> bool {
        !matches!(self, ObjTag::Camera | ObjTag::Light | ObjTag::Array)
    }

    /// True for arrays.
    #[must_use]
    pub fn is_array(self) -> bool {
        self == ObjTag::Array
    }
}

/// Camera payload.
#[derive(Debug, Clone)]
pub struct CameraData {
    /// Field-of-view scale (clamped positive).
    pub pov: f32,
    /// Background color.
    pub background: Vec3,
    /// Movement speeds.
    pub dps: Vec3,
    /// Rotation speeds.
    pub drt: Vec3,
    /// Cached sine of the yaw, refreshed in phase 1.
    pub hor_sin: f32,
    /// Cached cosine of the yaw, refreshed in phase 1.
    pub hor_cos: f32,
    /// Set by camera actions; folds into the change flags next update.
    pub cam_changed: bool,
}

/// Light payload. Color is premultiplied by luminosity; the constant
/// attenuation term carries its +1 bias.
#[derive(Debug, Clone)]
pub struct LightData {
    /// Premultiplied linear color.
    pub col: Vec3,
    /// Range cutoff (0 disables).
    pub a_rng: f32,
    /// Constant attenuation term (biased by +1).
    pub a_cnt: f32,
    /// Linear attenuation term.
    pub a_lnr: f32,
    /// Quadratic attenuation term.
    pub a_qdr: f32,
}

/// Array payload: ordered children plus the two aggregate bounds.
#[derive(Debug, Clone)]
pub struct ArrayData {
    /// Ordered child keys.
    pub children: Vec<ObjKey>,
    /// Axis-map matrix passed to children when the array separates a
    /// scaling-only transform.
    pub axm: Mat4,
    /// Bound enclosing contained surfaces in the trnode view.
    pub aux: Bound,
    /// Bound enclosing bvnode-bound descendants in the world view.
    pub bxx: Bound,
}

/// Shape state shared between the update pipeline and the block compiler.
#[derive(Debug, Clone)]
pub struct Shape {
    /// Bounding box (sub-world axes) plus derived geometry.
    pub bound: Bound,
    /// Clipping box lower corner (sub-world axes, ±INF open sides).
    pub cmin: Vec3,
    /// Clipping box upper corner.
    pub cmax: Vec3,
    /// Quadric square coefficients by world axis; `w` is the constant.
    pub sci: Vec4,
    /// Quadric linear coefficients by world axis.
    pub scj: Vec3,
    /// Plane normal axis vector (signed K) by world axis.
    pub sck: Vec3,
}

impl Shape {
    /// Empty shape state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bound: Bound::empty(),
            cmin: Vec3::splat(f32::NEG_INFINITY),
            cmax: Vec3::splat(f32::INFINITY),
            sci: Vec4::ZERO,
            scj: Vec3::ZERO,
            sck: Vec3::ZERO,
        }
    }
}

impl Default for Shape {
    fn default() -> Self {
        Self::new()
    }
}

/// Surface payload.
#[derive(Debug, Clone)]
pub struct SurfaceData {
    /// Shape and scalar parameters.
    pub kind: SurfKind,
    /// Raw lower axis clippers (local I/J/K).
    pub smin: Vec3,
    /// Raw upper axis clippers (local I/J/K).
    pub smax: Vec3,
    /// Outer side material.
    pub outer: MatKey,
    /// Inner side material.
    pub inner: MatKey,
    /// Derived shape state.
    pub shape: Shape,
    /// Custom clipper list (head-first template order).
    pub clip: SmallVec<[ClipElem; 4]>,
    /// Set when the surface or a tightening clipper changed this update.
    pub srf_changed: bool,
}

/// Object payload.
#[derive(Debug, Clone)]
pub enum ObjData {
    /// Camera payload.
    Camera(CameraData),
    /// Light payload.
    Light(LightData),
    /// Array payload.
    Array(ArrayData),
    /// Surface payload.
    Surface(SurfaceData),
}

impl ObjData {
    /// Array payload accessor.
    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayData> {
        match self {
            ObjData::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Mutable array payload accessor.
    pub fn as_array_mut(&mut self) -> Option<&mut ArrayData> {
        match self {
            ObjData::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Surface payload accessor.
    #[must_use]
    pub fn as_surface(&self) -> Option<&SurfaceData> {
        match self {
            ObjData::Surface(s) => Some(s),
            _ => None,
        }
    }

    /// Mutable surface payload accessor.
    pub fn as_surface_mut(&mut self) -> Option<&mut SurfaceData> {
        match self {
            ObjData::Surface(s) => Some(s),
            _ => None,
        }
    }
}

/// One node of the scene arena.
pub struct Object {
    /// Parent key (`None` for the root).
    pub parent: Option<ObjKey>,
    /// Object tag.
    pub tag: ObjTag,
    /// Current transform (mutated by animation callbacks).
    pub trm: Transform,
    /// Optional animation callback.
    pub anim: Option<AnimFn>,
    /// Last update time seen (`None` before the first update).
    pub time: Option<f64>,
    /// Composed matrix (world, or trnode-relative when cached).
    pub mtx: Mat4,
    /// Inverse of the composed matrix (valid for self-trnodes).
    pub inv: Mat4,
    /// Axis map extracted from the composed matrix.
    pub map: AxisMap,
    /// Changed this update.
    pub obj_changed: bool,
    /// Non-triviality of the object's own transform.
    pub mtx_has_trm: TrmFlags,
    /// Non-triviality of the full composed matrix.
    pub obj_has_trm: TrmFlags,
    /// Nearest ancestor (or self) with a non-trivial transform.
    pub trnode: Option<ObjKey>,
    /// Bounding-volume ancestor attached by relations.
    pub bvnode: Option<ObjKey>,
    /// Payload.
    pub data: ObjData,
}

impl Object {
    /// Creates a node with identity matrices and no links.
    #[must_use]
    pub fn new(parent: Option<ObjKey>, tag: ObjTag, trm: Transform, data: ObjData) -> Self {
        Self {
            parent,
            tag,
            trm,
            anim: None,
            time: None,
            mtx: Mat4::IDENTITY,
            inv: Mat4::IDENTITY,
            map: AxisMap::IDENTITY,
            obj_changed: false,
            mtx_has_trm: TrmFlags::empty(),
            obj_has_trm: TrmFlags::empty(),
            trnode: None,
            bvnode: None,
            data,
        }
    }

    /// World (or trnode-relative, when cached) position.
    #[inline]
    #[must_use]
    pub fn pos(&self) -> Vec3 {
        self.mtx.col(3).truncate()
    }

    /// Vertex count of the node's bound geometry; objects without geometry
    /// never become bvnode-bound.
    #[must_use]
    pub fn geom_verts(&self) -> usize {
        match &self.data {
            ObjData::Array(a) => a.bxx.verts.len(),
            ObjData::Surface(s) => s.shape.bound.verts.len(),
            _ => 0,
        }
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("tag", &self.tag)
            .field("parent", &self.parent)
            .field("trnode", &self.trnode)
            .field("bvnode", &self.bvnode)
            .finish_non_exhaustive()
    }
}
