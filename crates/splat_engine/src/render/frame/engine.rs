//! Per-frame state machine
//!
//! One call to [`FrameEngine::draw_frame`] runs, in order: fence wait, uniform
//! write, stage parameter refresh, image acquire, fence reset, recording,
//! submit, present. The slot cursor advances on every exit path.

use ash::vk;

use super::FrameSlots;
use crate::assets::ShLayout;
use crate::render::camera::CameraUniform;
use crate::render::tiles::TileGrid;

/// Presentation surface as last built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    /// Swapchain extent in pixels
    pub extent: vk::Extent2D,
    /// Number of presentable images
    pub image_count: u32,
}

/// Everything recording needs to know about one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlan {
    /// Frame slot being recorded
    pub slot: usize,
    /// Presentation extent
    pub extent: vk::Extent2D,
    /// Tile grid derived from `extent`
    pub tile_grid: TileGrid,
    /// Points in the loaded cloud, 0 when none
    pub point_count: u32,
    /// Color-coefficient layout of the loaded cloud
    pub sh: ShLayout,
}

impl FramePlan {
    /// Compute stages run only when points are loaded
    pub fn has_points(&self) -> bool {
        self.point_count > 0
    }
}

/// Result of asking the swapchain for an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready once the slot's acquire signal fires
    Acquired {
        /// Swapchain image index
        image_index: u32,
    },
    /// The surface changed; nothing was acquired
    OutOfDate,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented normally
    Presented,
    /// Presented or dropped, but the swapchain must be rebuilt
    NeedsRecreation,
}

/// Report of one frame step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Slot the frame ran in
    pub slot: usize,
    /// Image rendered, `None` when acquisition failed
    pub image_index: Option<u32>,
    /// Caller must recreate the swapchain before the next frame
    pub needs_recreation: bool,
}

/// GPU operations the frame engine sequences
///
/// Implementations do the work; the engine owns the ordering.
pub trait FrameBackend {
    /// Error raised by GPU calls
    type Error;

    /// Block until the slot's previous submission completed
    fn wait_for_slot(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Overwrite the slot's host-visible camera buffer
    fn write_frame_uniforms(&mut self, slot: usize, camera: &CameraUniform) -> Result<(), Self::Error>;

    /// Refresh per-dispatch stage state for the plan's slot
    fn prepare_stages(&mut self, plan: &FramePlan) -> Result<(), Self::Error>;

    /// Acquire the next image using the slot's acquire signal
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome, Self::Error>;

    /// Unsignal the slot's fence ahead of submission
    fn reset_slot_fence(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Re-record the slot's command buffer from scratch
    fn record_frame(&mut self, plan: &FramePlan, image_index: u32) -> Result<(), Self::Error>;

    /// Submit the slot's recording
    fn submit(&mut self, slot: usize, image_index: u32) -> Result<(), Self::Error>;

    /// Give up on a frame whose recording never reached the queue
    ///
    /// Consumes the slot's acquire signal and signals its fence, so the next
    /// wait on the slot returns.
    fn abandon_frame(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Queue the image for presentation
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome, Self::Error>;

    /// Block until the device is idle
    fn wait_idle(&mut self) -> Result<(), Self::Error>;

    /// Rebuild the swapchain and everything sized by its image count
    fn rebuild_swapchain(&mut self, window_extent: vk::Extent2D) -> Result<SurfaceInfo, Self::Error>;
}

/// Frame sequencing and resize bookkeeping
#[derive(Debug, Clone)]
pub struct FrameEngine {
    slots: FrameSlots,
    extent: vk::Extent2D,
    tile_grid: TileGrid,
    image_count: u32,
    point_count: u32,
    sh: ShLayout,
    resize_pending: bool,
    minimized: bool,
}

impl FrameEngine {
    /// Start at slot 0 on a freshly built surface
    pub fn new(surface: SurfaceInfo) -> Self {
        Self {
            slots: FrameSlots::new(),
            extent: surface.extent,
            tile_grid: TileGrid::from_extent(surface.extent),
            image_count: surface.image_count,
            point_count: 0,
            sh: ShLayout::EMPTY,
            resize_pending: false,
            minimized: false,
        }
    }

    /// Record the loaded cloud's size; 0 points skips every compute stage
    pub fn set_scene(&mut self, point_count: u32, sh: ShLayout) {
        self.point_count = point_count;
        self.sh = sh;
    }

    /// Window framebuffer changed; 0×0 pauses rendering
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        self.minimized = width == 0 || height == 0;
        self.resize_pending = true;
        log::debug!("Resize to {width}x{height}{}", if self.minimized { " (paused)" } else { "" });
    }

    /// True while the window is minimized
    pub fn is_paused(&self) -> bool {
        self.minimized
    }

    /// True when a resize arrived since the last recreation
    pub fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    /// Run one frame; `None` while paused
    ///
    /// A failed recording or submission is abandoned before the error returns,
    /// leaving the slot's fence signaled so the caller may retry.
    pub fn draw_frame<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        camera: &CameraUniform,
    ) -> Result<Option<FrameOutcome>, B::Error> {
        if self.minimized {
            return Ok(None);
        }

        let slot = self.slots.current();
        let result = self.run_frame(backend, slot, camera);
        self.slots.advance();

        let mut outcome = result?;
        outcome.needs_recreation |= self.resize_pending;
        log::trace!(
            "Frame {} slot {} image {:?}",
            self.slots.frame_number(),
            outcome.slot,
            outcome.image_index
        );
        Ok(Some(outcome))
    }

    fn run_frame<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        slot: usize,
        camera: &CameraUniform,
    ) -> Result<FrameOutcome, B::Error> {
        backend.wait_for_slot(slot)?;
        self.slots.mark_waited(slot);

        backend.write_frame_uniforms(slot, camera)?;
        let plan = self.plan(slot);
        backend.prepare_stages(&plan)?;

        let image_index = match backend.acquire_image(slot)? {
            AcquireOutcome::Acquired { image_index } => image_index,
            // Fence stays signaled so the slot's next wait returns at once.
            AcquireOutcome::OutOfDate => {
                return Ok(FrameOutcome {
                    slot,
                    image_index: None,
                    needs_recreation: true,
                });
            }
        };

        backend.reset_slot_fence(slot)?;
        self.slots.begin_recording(slot);
        let submitted = backend
            .record_frame(&plan, image_index)
            .and_then(|()| backend.submit(slot, image_index));
        if let Err(e) = submitted {
            if backend.abandon_frame(slot).is_err() {
                log::warn!("Slot {slot} could not be released after a failed submission");
            }
            self.slots.mark_waited(slot);
            return Err(e);
        }
        self.slots.mark_submitted(slot);

        let presented = backend.present(slot, image_index)?;
        Ok(FrameOutcome {
            slot,
            image_index: Some(image_index),
            needs_recreation: presented == PresentOutcome::NeedsRecreation,
        })
    }

    /// Rebuild the swapchain for `window_extent`
    ///
    /// Waits for the device to go idle first. Does nothing but stay paused when
    /// the window is still minimized.
    pub fn recreate<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        window_extent: vk::Extent2D,
    ) -> Result<Option<SurfaceInfo>, B::Error> {
        if window_extent.width == 0 || window_extent.height == 0 {
            self.minimized = true;
            return Ok(None);
        }

        backend.wait_idle()?;
        let surface = backend.rebuild_swapchain(window_extent)?;

        self.extent = surface.extent;
        self.tile_grid = TileGrid::from_extent(surface.extent);
        self.image_count = surface.image_count;
        self.resize_pending = false;
        self.minimized = false;

        log::info!(
            "Swapchain rebuilt at {}x{} ({} images, {}x{} tiles)",
            surface.extent.width,
            surface.extent.height,
            surface.image_count,
            self.tile_grid.tiles_x,
            self.tile_grid.tiles_y
        );
        Ok(Some(surface))
    }

    /// Plan for a frame in `slot` under the current surface and scene
    pub fn plan(&self, slot: usize) -> FramePlan {
        FramePlan {
            slot,
            extent: self.extent,
            tile_grid: self.tile_grid,
            point_count: self.point_count,
            sh: self.sh,
        }
    }

    /// Slot tracker
    pub fn slots(&self) -> &FrameSlots {
        &self.slots
    }

    /// Current presentation extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Current tile grid
    pub fn tile_grid(&self) -> TileGrid {
        self.tile_grid
    }

    /// Current swapchain image count
    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    /// Points in the loaded cloud
    pub fn point_count(&self) -> u32 {
        self.point_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frame::{rebuild_per_image, FRAMES_IN_FLIGHT};
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Wait(usize),
        Upload(usize),
        Prepare(usize),
        Acquire(usize),
        ResetFence(usize),
        Record(usize, u32, bool),
        Submit(usize, u32),
        Abandon(usize),
        Present(usize, u32),
        WaitIdle,
        Rebuild(u32, u32),
    }

    /// Scripted backend: acquire/present results are popped from queues
    struct MockBackend {
        events: Vec<Event>,
        fence_signaled: [bool; FRAMES_IN_FLIGHT],
        acquire_script: VecDeque<AcquireOutcome>,
        present_script: VecDeque<PresentOutcome>,
        surface_image_count: u32,
        render_finished: Vec<usize>,
        next_image: u32,
        fail_submit: bool,
    }

    impl MockBackend {
        fn new(image_count: u32) -> Self {
            Self {
                events: Vec::new(),
                fence_signaled: [true; FRAMES_IN_FLIGHT],
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                surface_image_count: image_count,
                render_finished: (0..image_count as usize).collect(),
                next_image: 0,
                fail_submit: false,
            }
        }

        fn slots_of(&self, matcher: impl Fn(&Event) -> Option<usize>) -> Vec<usize> {
            self.events.iter().filter_map(matcher).collect()
        }
    }

    impl FrameBackend for MockBackend {
        type Error = String;

        fn wait_for_slot(&mut self, slot: usize) -> Result<(), String> {
            if !self.fence_signaled[slot] {
                let submitted = self.events.iter().rev().find_map(|e| match e {
                    Event::Submit(s, _) if *s == slot => Some(true),
                    Event::ResetFence(s) if *s == slot => Some(false),
                    _ => None,
                });
                assert_eq!(submitted, Some(true), "slot {slot} waits on a fence nothing will signal");
                // A real fence would signal once the submission drains.
                self.fence_signaled[slot] = true;
            }
            self.events.push(Event::Wait(slot));
            Ok(())
        }

        fn write_frame_uniforms(&mut self, slot: usize, _camera: &CameraUniform) -> Result<(), String> {
            assert!(self.fence_signaled[slot], "upload to slot {slot} while its fence is unsignaled");
            self.events.push(Event::Upload(slot));
            Ok(())
        }

        fn prepare_stages(&mut self, plan: &FramePlan) -> Result<(), String> {
            self.events.push(Event::Prepare(plan.slot));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome, String> {
            self.events.push(Event::Acquire(slot));
            Ok(self.acquire_script.pop_front().unwrap_or_else(|| {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % self.surface_image_count;
                AcquireOutcome::Acquired { image_index }
            }))
        }

        fn reset_slot_fence(&mut self, slot: usize) -> Result<(), String> {
            self.fence_signaled[slot] = false;
            self.events.push(Event::ResetFence(slot));
            Ok(())
        }

        fn record_frame(&mut self, plan: &FramePlan, image_index: u32) -> Result<(), String> {
            assert!((image_index as usize) < self.render_finished.len());
            self.events.push(Event::Record(plan.slot, image_index, plan.has_points()));
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> Result<(), String> {
            if std::mem::take(&mut self.fail_submit) {
                return Err("device lost".to_string());
            }
            self.events.push(Event::Submit(slot, image_index));
            Ok(())
        }

        fn abandon_frame(&mut self, slot: usize) -> Result<(), String> {
            self.fence_signaled[slot] = true;
            self.events.push(Event::Abandon(slot));
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome, String> {
            self.events.push(Event::Present(slot, image_index));
            Ok(self.present_script.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn wait_idle(&mut self) -> Result<(), String> {
            self.fence_signaled = [true; FRAMES_IN_FLIGHT];
            self.events.push(Event::WaitIdle);
            Ok(())
        }

        fn rebuild_swapchain(&mut self, window_extent: vk::Extent2D) -> Result<SurfaceInfo, String> {
            self.events.push(Event::Rebuild(window_extent.width, window_extent.height));
            self.next_image = 0;
            rebuild_per_image(&mut self.render_finished, self.surface_image_count, |i| Ok::<_, String>(i))?;
            Ok(SurfaceInfo {
                extent: window_extent,
                image_count: self.surface_image_count,
            })
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn engine() -> FrameEngine {
        FrameEngine::new(SurfaceInfo {
            extent: extent(1600, 900),
            image_count: 3,
        })
    }

    #[test]
    fn test_slots_round_robin_across_recreation() {
        let mut engine = engine();
        let mut backend = MockBackend::new(3);
        let camera = CameraUniform::default();
        let mut slots = Vec::new();

        for frame in 0..8 {
            if frame == 3 {
                backend.acquire_script.push_back(AcquireOutcome::OutOfDate);
            }
            if frame == 5 {
                backend.present_script.push_back(PresentOutcome::NeedsRecreation);
            }
            let outcome = engine.draw_frame(&mut backend, &camera).unwrap().unwrap();
            slots.push(outcome.slot);
            if outcome.needs_recreation {
                engine.recreate(&mut backend, extent(1280, 720)).unwrap();
            }
        }

        assert_eq!(slots, vec![0, 1, 0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_no_upload_before_wait() {
        let mut engine = engine();
        let mut backend = MockBackend::new(2);
        let camera = CameraUniform::default();

        for _ in 0..6 {
            engine.draw_frame(&mut backend, &camera).unwrap();
        }

        let mut waited = [false; FRAMES_IN_FLIGHT];
        for event in &backend.events {
            match *event {
                Event::Wait(slot) => waited[slot] = true,
                Event::Upload(slot) => assert!(waited[slot], "slot {slot} written before waiting"),
                Event::Submit(slot, _) => waited[slot] = false,
                _ => {}
            }
        }
        assert_eq!(
            backend.slots_of(|e| if let Event::Upload(s) = e { Some(*s) } else { None }),
            vec![0, 1, 0, 1, 0, 1]
        );
    }

    #[test]
    fn test_frame_sequence_order() {
        let mut engine = engine();
        engine.set_scene(1000, ShLayout { degree: 3, coeffs_per_channel: 15 });
        let mut backend = MockBackend::new(3);

        let outcome = engine
            .draw_frame(&mut backend, &CameraUniform::default())
            .unwrap()
            .unwrap();

        assert_eq!(
            outcome,
            FrameOutcome { slot: 0, image_index: Some(0), needs_recreation: false }
        );
        assert_eq!(
            backend.events,
            vec![
                Event::Wait(0),
                Event::Upload(0),
                Event::Prepare(0),
                Event::Acquire(0),
                Event::ResetFence(0),
                Event::Record(0, 0, true),
                Event::Submit(0, 0),
                Event::Present(0, 0),
            ]
        );
        assert_eq!(engine.slots().state(0), crate::render::frame::SlotState::Submitted);
    }

    #[test]
    fn test_acquire_out_of_date_keeps_fence() {
        let mut engine = engine();
        let mut backend = MockBackend::new(3);
        backend.acquire_script.push_back(AcquireOutcome::OutOfDate);

        let outcome = engine
            .draw_frame(&mut backend, &CameraUniform::default())
            .unwrap()
            .unwrap();

        assert_eq!(outcome.image_index, None);
        assert!(outcome.needs_recreation);
        assert!(!backend.events.iter().any(|e| matches!(e, Event::ResetFence(_))));
        assert!(!backend.events.iter().any(|e| matches!(e, Event::Submit(..))));
        assert!(backend.fence_signaled[0]);
        assert_eq!(engine.slots().current(), 1);
    }

    #[test]
    fn test_present_suboptimal_completes_frame() {
        let mut engine = engine();
        let mut backend = MockBackend::new(3);
        backend.present_script.push_back(PresentOutcome::NeedsRecreation);

        let outcome = engine
            .draw_frame(&mut backend, &CameraUniform::default())
            .unwrap()
            .unwrap();

        assert_eq!(outcome.image_index, Some(0));
        assert!(outcome.needs_recreation);
        assert!(backend.events.contains(&Event::Submit(0, 0)));
        assert!(backend.events.contains(&Event::Present(0, 0)));
        assert_eq!(engine.slots().current(), 1);
    }

    #[test]
    fn test_failed_submit_releases_slot() {
        let mut engine = engine();
        let mut backend = MockBackend::new(3);
        let camera = CameraUniform::default();
        backend.fail_submit = true;

        assert_eq!(engine.draw_frame(&mut backend, &camera), Err("device lost".to_string()));
        assert!(backend.events.contains(&Event::Abandon(0)));
        assert!(backend.fence_signaled[0]);
        assert_eq!(engine.slots().state(0), crate::render::frame::SlotState::Idle);
        assert_eq!(engine.slots().current(), 1);

        for _ in 0..3 {
            engine.draw_frame(&mut backend, &camera).unwrap();
        }
        assert_eq!(
            backend.slots_of(|e| if let Event::Submit(s, _) = e { Some(*s) } else { None }),
            vec![1, 0, 1]
        );
    }

    #[test]
    fn test_empty_scene_skips_compute() {
        let mut engine = engine();
        let mut backend = MockBackend::new(3);

        engine.draw_frame(&mut backend, &CameraUniform::default()).unwrap();
        assert!(backend.events.contains(&Event::Record(0, 0, false)));
    }

    #[test]
    fn test_minimize_then_restore() {
        let mut engine = engine();
        let mut backend = MockBackend::new(3);
        let camera = CameraUniform::default();

        engine.draw_frame(&mut backend, &camera).unwrap();
        engine.handle_resize(0, 0);
        assert!(engine.is_paused());

        let events_before = backend.events.len();
        assert_eq!(engine.draw_frame(&mut backend, &camera).unwrap(), None);
        assert_eq!(engine.recreate(&mut backend, extent(0, 0)).unwrap(), None);
        assert_eq!(backend.events.len(), events_before);

        engine.handle_resize(800, 600);
        assert!(!engine.is_paused());
        let outcome = engine.draw_frame(&mut backend, &camera).unwrap().unwrap();
        assert!(outcome.needs_recreation);

        let surface = engine.recreate(&mut backend, extent(800, 600)).unwrap().unwrap();
        assert_eq!(surface.extent, extent(800, 600));
        assert_eq!(engine.extent(), extent(800, 600));
        assert_eq!(engine.tile_grid(), TileGrid { tiles_x: 50, tiles_y: 38 });
        assert!(!engine.resize_pending());

        let outcome = engine.draw_frame(&mut backend, &camera).unwrap().unwrap();
        assert!(!outcome.needs_recreation);
        assert!(outcome.image_index.is_some());
    }

    #[test]
    fn test_recreation_waits_idle_first() {
        let mut engine = engine();
        let mut backend = MockBackend::new(3);
        engine.draw_frame(&mut backend, &CameraUniform::default()).unwrap();

        engine.recreate(&mut backend, extent(640, 480)).unwrap();
        let tail = &backend.events[backend.events.len() - 2..];
        assert_eq!(tail, &[Event::WaitIdle, Event::Rebuild(640, 480)]);
    }

    #[test]
    fn test_per_image_arrays_follow_image_count() {
        let mut engine = engine();
        let mut backend = MockBackend::new(3);
        let camera = CameraUniform::default();
        engine.draw_frame(&mut backend, &camera).unwrap();

        backend.surface_image_count = 5;
        engine.recreate(&mut backend, extent(1024, 768)).unwrap();
        assert_eq!(engine.image_count(), 5);
        assert_eq!(backend.render_finished.len(), 5);

        backend.surface_image_count = 2;
        engine.recreate(&mut backend, extent(1024, 768)).unwrap();
        assert_eq!(engine.image_count(), 2);
        assert_eq!(backend.render_finished.len(), 2);

        for _ in 0..4 {
            engine.draw_frame(&mut backend, &camera).unwrap();
        }
    }
}
