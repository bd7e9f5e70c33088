pub mod context;
pub mod frustum;
pub mod gbuffer;
pub mod kernels;
pub mod readback;

pub use context::{GpuContext, GpuInitError};
pub use frustum::{Aabb, extract_frustum_planes, planes_to_array};
pub use gbuffer::GBuffer;
pub use kernels::KernelLibrary;
pub use readback::{CullReadbackPool, CullStats};
