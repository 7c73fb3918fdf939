//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`PrismError`] covers construction-time failure modes:
//! malformed scene descriptions, bounding-geometry limits and frame-buffer
//! configuration problems. Render-time conditions that cannot corrupt memory
//! (ray-recursion depth caps, degenerate discriminants, parallel planes) are
//! not errors: they degrade lane-wise with defined fallback values.
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, PrismError>`.

use thiserror::Error;

/// The main error type for the Prism engine.
#[derive(Error, Debug)]
pub enum PrismError {
    // ========================================================================
    // Scene construction errors
    // ========================================================================
    /// A required object, material or texture reference was missing.
    #[error("scene contains a null object: {0}")]
    NullObject(String),

    /// The scene root must be an array object.
    #[error("scene root must be an array")]
    RootNotArray,

    /// No camera was declared anywhere in the scene tree.
    #[error("scene contains no camera")]
    NoCamera,

    /// A named texture was referenced but never registered.
    #[error("texture not found: {0}")]
    TextureNotFound(String),

    /// Texture dimensions must be powers of two for mask-based tiling.
    #[error("texture dimensions must be powers of two: {width}x{height}")]
    TextureDims {
        /// Offending width in texels
        width: u32,
        /// Offending height in texels
        height: u32,
    },

    /// Texture pixel buffer does not match the declared dimensions.
    #[error("texture data size mismatch: expected {expected} texels, got {actual}")]
    TextureSize {
        /// `width * height`
        expected: usize,
        /// Supplied buffer length
        actual: usize,
    },

    // ========================================================================
    // Limit errors
    // ========================================================================
    /// Bounding-box geometry exceeded the configured vertex/edge/face caps.
    #[error("bounding geometry limits exceeded in surface ({verts} verts, {edges} edges, {faces} faces)")]
    BoundLimits {
        /// Generated vertex count
        verts: usize,
        /// Generated edge count
        edges: usize,
        /// Generated face count
        faces: usize,
    },

    // ========================================================================
    // Render configuration errors
    // ========================================================================
    /// Frame buffer is too small for the requested resolution/stride.
    #[error("frame buffer overflow: {width}x{height} with row stride {row} exceeds buffer of {len} pixels")]
    FrameOverflow {
        /// Requested width in pixels
        width: usize,
        /// Requested height in pixels
        height: usize,
        /// Row stride in pixels
        row: usize,
        /// Actual buffer length in pixels
        len: usize,
    },

    /// The requested SIMD configuration could not be decoded.
    #[error("unsupported SIMD request {0:#010x}")]
    BadSimdRequest(u32),
}

/// Alias for `Result<T, PrismError>`.
pub type Result<T> = std::result::Result<T, PrismError>;
