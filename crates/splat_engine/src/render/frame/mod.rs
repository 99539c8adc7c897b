//! Frame pacing
//!
//! [`FrameEngine`] is the per-frame state machine. It talks to the GPU only
//! through [`FrameBackend`], so the ordering rules can be exercised without a
//! device.

pub mod engine;
pub mod slots;

pub use engine::{
    AcquireOutcome, FrameBackend, FrameEngine, FrameOutcome, FramePlan, PresentOutcome, SurfaceInfo,
};
pub use slots::{FrameSlots, SlotState};

/// Frames the host may record ahead of the GPU
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Replace every per-image resource, sized to the current image count
///
/// Old entries are dropped before any new one is created.
pub fn rebuild_per_image<T, E>(
    resources: &mut Vec<T>,
    image_count: u32,
    mut create: impl FnMut(usize) -> Result<T, E>,
) -> Result<(), E> {
    resources.clear();
    resources.reserve(image_count as usize);
    for index in 0..image_count as usize {
        resources.push(create(index)?);
    }
    Ok(())
}
