//! Services the Discord handler needs, built once by the binary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use muster_attendance::{InteractionGuard, ResponseRecorder};
use muster_core::render::Renderer;
use muster_countdown::CountdownScheduler;

pub struct MusterContext {
    pub scheduler: CountdownScheduler,
    pub guard: Arc<InteractionGuard>,
    pub recorder: Arc<ResponseRecorder>,
    pub renderer: Arc<dyn Renderer>,
    pub default_timezone: String,
    scheduler_started: AtomicBool,
}

impl MusterContext {
    pub fn new(
        scheduler: CountdownScheduler,
        guard: Arc<InteractionGuard>,
        recorder: Arc<ResponseRecorder>,
        renderer: Arc<dyn Renderer>,
        default_timezone: String,
    ) -> Self {
        Self {
            scheduler,
            guard,
            recorder,
            renderer,
            default_timezone,
            scheduler_started: AtomicBool::new(false),
        }
    }

    /// True exactly once per process, for the first `ready`.
    pub fn claim_scheduler_start(&self) -> bool {
        !self.scheduler_started.swap(true, Ordering::SeqCst)
    }
}
