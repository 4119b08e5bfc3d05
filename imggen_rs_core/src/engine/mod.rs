//! Trait boundary between the orchestrator and the diffusion engine proper.
//!
//! The engine owns the model weights, tensor math and sampling loop; this
//! crate only shapes fully-resolved jobs for it and manages the pixel buffers
//! that cross the boundary.

mod family;

use anyhow::Result;

pub use family::ModelFamily;

use crate::samplers::{SampleMethod, Scheduler};

/// An owned frame as produced by the engine: tightly packed, row-major pixel
/// data. Ownership transfers to the dispatcher, which releases it after
/// encoding.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn view(&self) -> ImageRef<'_> {
        ImageRef {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data: &self.data,
        }
    }
}

/// Borrowed view of a pixel buffer handed across the engine boundary.
#[derive(Debug, Clone, Copy)]
pub struct ImageRef<'a> {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: &'a [u8],
}

/// A LoRA to merge into the loaded model at the given strength.
#[derive(Debug, Clone)]
pub struct LoraSpec {
    pub path: String,
    pub multiplier: f32,
}

/// Sampling parameters shared by image and video jobs, after all per-family
/// corrections have been applied.
#[derive(Debug, Clone, Copy)]
pub struct SampleParams {
    pub sample_method: SampleMethod,
    /// `None` selects the engine's model-default schedule.
    pub scheduler: Option<Scheduler>,
    pub steps: u32,
    pub cfg_scale: f32,
    /// `None` leaves the engine's distilled-guidance default untouched.
    pub distilled_guidance: Option<f32>,
    /// 0 disables timestep shifting.
    pub shifted_timestep: f32,
}

/// Fully-resolved parameters for one still-image generation. Built fresh per
/// call; pixel data is borrowed from the session's scratch slots.
#[derive(Debug)]
pub struct ImageJob<'a> {
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    /// `<= 0` means the model default.
    pub clip_skip: i32,
    pub width: u32,
    pub height: u32,
    pub sample: SampleParams,
    pub seed: i64,
    pub strength: f32,
    pub batch_count: u32,
    pub vae_tiling: bool,
    pub init_image: Option<ImageRef<'a>>,
    pub mask_image: Option<ImageRef<'a>>,
    pub ref_images: Vec<ImageRef<'a>>,
    pub id_images: Vec<ImageRef<'a>>,
    /// Reattached on every job: the engine tracks previously applied LoRA
    /// weights and applies only the differences.
    pub loras: &'a [LoraSpec],
}

/// Fully-resolved parameters for one video generation.
#[derive(Debug)]
pub struct VideoJob<'a> {
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    pub clip_skip: i32,
    pub width: u32,
    pub height: u32,
    pub sample: SampleParams,
    pub seed: i64,
    pub strength: f32,
    pub frames: u32,
    /// Start keyframe anchoring the sequence.
    pub init_image: Option<ImageRef<'a>>,
    /// End keyframe, when two anchors were supplied.
    pub end_image: Option<ImageRef<'a>>,
    pub control_frames: Vec<ImageRef<'a>>,
    pub loras: &'a [LoraSpec],
}

/// The generation engine. Calls are synchronous and atomic from the
/// orchestrator's perspective; the engine may thread internally.
pub trait DiffusionEngine {
    /// Which model family was loaded.
    fn family(&self) -> ModelFamily;

    /// Sampler the loaded model prefers when the request names none.
    fn default_sampler(&self) -> SampleMethod;

    /// Whether an identity-conditioning (persona) stack is loaded alongside
    /// the base model.
    fn identity_conditioning(&self) -> bool {
        false
    }

    fn apply_loras(&mut self, specs: &[LoraSpec]) -> Result<()>;

    fn run_image(&mut self, job: &ImageJob<'_>) -> Result<Vec<Frame>>;

    fn run_video(&mut self, job: &VideoJob<'_>) -> Result<Vec<Frame>>;
}

/// Standalone super-resolution model.
pub trait Upscaler {
    fn upscale(&mut self, source: ImageRef<'_>, factor: u32) -> Result<Frame>;
}
