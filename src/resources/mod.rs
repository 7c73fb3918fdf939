//! Shared render resources: textures and resolved side materials.

pub mod material;
pub mod texture;

pub use material::{MatProps, Material};
pub use texture::Texture;
