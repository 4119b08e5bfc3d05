//! Core crate for imggen_rs: request orchestration between loosely-typed
//! generation requests and a diffusion engine.
//!
//! The crate does not run the diffusion model itself. It turns an untrusted
//! request (prompt, size, sampler name, reference images, seed) into a
//! fully-specified, constraint-satisfying job — fitting the resolution to
//! hardware and per-model limits, correcting parameters per model family,
//! preparing and owning every pixel buffer involved — then hands the job to
//! a [`DiffusionEngine`] and shapes the result into a PNG or animated
//! payload.
//!
//! ```rust,no_run
//! use imggen_rs_core::{
//!     DiffusionEngine, Frame, GenerationRequest, GenerationSession, ImageJob, LoraSpec,
//!     ModelFamily, SampleMethod, SessionConfig, VideoJob,
//! };
//!
//! struct MyEngine; // FFI or in-process bindings to the actual model
//!
//! impl DiffusionEngine for MyEngine {
//!     fn family(&self) -> ModelFamily {
//!         ModelFamily::Sd1
//!     }
//!     fn default_sampler(&self) -> SampleMethod {
//!         SampleMethod::EulerA
//!     }
//!     fn apply_loras(&mut self, _specs: &[LoraSpec]) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//!     fn run_image(&mut self, job: &ImageJob<'_>) -> anyhow::Result<Vec<Frame>> {
//!         # let run_the_model = |_: &ImageJob<'_>| -> anyhow::Result<Vec<Frame>> { unimplemented!() };
//!         run_the_model(job)
//!     }
//!     fn run_video(&mut self, _job: &VideoJob<'_>) -> anyhow::Result<Vec<Frame>> {
//!         anyhow::bail!("not a video model")
//!     }
//! }
//!
//! let mut session = GenerationSession::new(Box::new(MyEngine), SessionConfig::default());
//! let output = session.generate(&GenerationRequest {
//!     prompt: "a sunrise over mountains".to_string(),
//!     width: 640,
//!     height: 480,
//!     ..GenerationRequest::default()
//! });
//! assert!(output.is_success());
//! ```

mod dispatch;
mod encode;
mod engine;
mod error;
mod preprocess;
mod resolution;
mod samplers;
mod schedule;

pub use dispatch::{
    query_capabilities, Capabilities, GenerationMode, GenerationOutput, GenerationRequest,
    GenerationSession, GenerationStatus, ResolvedSettings, SessionConfig, MAX_REFERENCE_IMAGES,
};
pub use encode::{ImageCrateEncoder, OutputEncoder, VideoOutputKind, VIDEO_FPS};
pub use engine::{
    DiffusionEngine, Frame, ImageJob, ImageRef, LoraSpec, ModelFamily, SampleParams, Upscaler,
    VideoJob,
};
pub use error::GenerationError;
pub use preprocess::{live_buffer_count, prepare_image, DecodedImage};
pub use resolution::{fix_resolution, DIMENSION_ALIGN};
pub use samplers::{SampleMethod, Scheduler};
pub use schedule::ScheduleFamily;
