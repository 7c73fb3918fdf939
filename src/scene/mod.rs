//! Scene graph: declarative description, object arena, update pipeline and
//! relation compiler.

pub mod bound;
pub mod describe;
pub mod object;
pub mod relation;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod surface;
pub mod transform;
pub mod update;

use slotmap::new_key_type;

new_key_type! {
    /// Handle of an object node in the scene arena.
    pub struct ObjKey;
    /// Handle of a resolved side material.
    pub struct MatKey;
    /// Handle of a registered texture.
    pub struct TexKey;
}

pub use object::{ArrayData, CameraData, LightData, ObjData, ObjTag, Object, SurfaceData};
pub use scene::Scene;
