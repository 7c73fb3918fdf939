#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod backend;
pub mod config;
pub mod engine;
pub mod errors;
pub mod math;
pub mod resources;
pub mod scene;

pub use backend::dispatch::{granted_lanes, switch0};
pub use config::{Config, Fsaa, Opts};
pub use engine::{CameraAction, FrameBuffer, Platform};
pub use errors::{PrismError, Result};
pub use math::AxisMap;
pub use resources::{MatProps, Material, Texture};
pub use scene::describe::{
    Attenuation, CameraDesc, Color, LightDesc, MatKind, MaterialDesc, ObjectDesc, ObjectKind,
    RelKind, RelationDesc, SceneDesc, SideDesc, SurfaceDesc, SurfaceShape, TextureRef,
};
pub use scene::transform::Transform;
pub use scene::{ObjKey, Scene};
