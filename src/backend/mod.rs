//! SIMD ray-traversal backend: lane packets, flat scene blocks, the
//! traversal and shading kernels, the path tracer and platform dispatch.

pub mod blocks;
pub mod context;
pub mod dispatch;
pub mod pathtrace;
pub mod shade;
pub mod simd;
pub mod tracer;

pub use blocks::{TraceScene, compile};
pub use context::{CtxStack, Pass, RayCtx, Side};
pub use pathtrace::PtState;
