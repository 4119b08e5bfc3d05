use serde::Serialize;

use crate::encode::VideoOutputKind;
use crate::samplers::{SampleMethod, Scheduler};

/// A loosely-typed generation request as received from a caller.
///
/// Every field is untrusted: dimensions may be arbitrary, sampler and
/// scheduler names may be aliases or garbage, images are undecoded blobs.
/// The request is never mutated; all corrections land in a working copy.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f32,
    /// `None` leaves the engine's distilled-guidance default untouched.
    pub distilled_guidance: Option<f32>,
    /// 0 disables timestep shifting.
    pub shifted_timestep: f32,
    pub seed: i64,
    /// Sampler name, case- and alias-tolerant. Unknown names fall back to
    /// the engine's model default.
    pub sampler: String,
    /// Scheduler name; unknown or empty selects the model default.
    pub scheduler: String,
    /// Denoising strength, img2img only.
    pub strength: f32,
    /// `<= 0` means the model default.
    pub clip_skip: i32,
    /// Encoded primary input image; selects img2img when non-empty.
    pub init_image: Option<Vec<u8>>,
    /// Encoded inpainting mask.
    pub mask: Option<Vec<u8>>,
    pub flip_mask: bool,
    /// Encoded auxiliary reference images, capped at
    /// [`MAX_REFERENCE_IMAGES`](super::MAX_REFERENCE_IMAGES).
    pub reference_images: Vec<Vec<u8>>,
    /// Run the 2x upscaler over the finished frame before encoding.
    pub upscale: bool,
    /// Requested video frame count; above 1 a video model yields an
    /// animated payload.
    pub video_frames: u32,
    pub video_output: VideoOutputKind,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            width: 512,
            height: 512,
            steps: 20,
            cfg_scale: 7.0,
            distilled_guidance: None,
            shifted_timestep: 0.0,
            seed: 42,
            sampler: String::new(),
            scheduler: String::new(),
            strength: 0.75,
            clip_skip: -1,
            init_image: None,
            mask: None,
            flip_mask: false,
            reference_images: Vec::new(),
            upscale: false,
            video_frames: 1,
            video_output: VideoOutputKind::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Success,
    Failure,
}

/// The values a job actually ran with, after alias resolution, per-family
/// corrections and resolution fitting. Reported back alongside the payload
/// whenever they differ from the request.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSettings {
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f32,
    pub distilled_guidance: Option<f32>,
    pub shifted_timestep: f32,
    pub sampler: SampleMethod,
    pub scheduler: Option<Scheduler>,
    pub seed: i64,
    pub clip_skip: i32,
    pub vae_tiling: bool,
}

impl ResolvedSettings {
    /// One-line parameter record attached to still-image outputs.
    pub fn parameter_record(&self, prompt: &str, negative_prompt: &str, model: &str) -> String {
        let mut record = format!(
            "Prompt: {} | NegativePrompt: {} | Steps: {} | CFGScale: {} | Guidance: {} | Seed: {} | Size: {}x{} | Sampler: {}",
            prompt,
            negative_prompt,
            self.steps,
            self.cfg_scale,
            self.distilled_guidance
                .map_or_else(|| "default".to_string(), |g| g.to_string()),
            self.seed,
            self.width,
            self.height,
            self.sampler,
        );
        if let Some(scheduler) = self.scheduler {
            record.push_str(&format!(" {scheduler}"));
        }
        if self.shifted_timestep != 0.0 {
            record.push_str(&format!(" | Timestep Shift: {}", self.shifted_timestep));
        }
        record.push_str(&format!(" | Clip skip: {} | Model: {}", self.clip_skip, model));
        record
    }
}

/// Response of [`generate`](super::GenerationSession::generate) and
/// [`upscale_only`](super::GenerationSession::upscale_only). Failures carry
/// empty payloads; partial output is never returned.
#[derive(Debug)]
pub struct GenerationOutput {
    pub payload: Vec<u8>,
    /// Second container when two were requested (e.g. GIF + AVI).
    pub secondary_payload: Vec<u8>,
    pub animated: bool,
    pub status: GenerationStatus,
    pub resolved: Option<ResolvedSettings>,
}

impl GenerationOutput {
    pub(crate) fn failure() -> Self {
        Self {
            payload: Vec::new(),
            secondary_payload: Vec::new(),
            animated: false,
            status: GenerationStatus::Failure,
            resolved: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == GenerationStatus::Success
    }
}

/// What callers may ask for, independent of the loaded model.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub available_schedulers: Vec<String>,
}

/// Enumerate the scheduler names callers may request. "default" selects the
/// model's own schedule.
pub fn query_capabilities() -> Capabilities {
    let mut available_schedulers = vec!["default".to_string()];
    available_schedulers.extend(Scheduler::ALL.iter().map(ToString::to_string));
    Capabilities {
        available_schedulers,
    }
}
