//! Generation dispatch.
//!
//! Takes a loosely-typed [`GenerationRequest`], classifies it against the
//! loaded model family, applies per-family parameter corrections, fits the
//! resolution, assembles reference image sets, invokes the engine and shapes
//! the output payload. The session owns all scratch pixel buffers; slots are
//! released just in time, immediately before their next write.

mod request;

use std::fmt::Display;

use anyhow::anyhow;
use serde::Deserialize;
use tracing::{debug, info, warn};

pub use request::{
    query_capabilities, Capabilities, GenerationOutput, GenerationRequest, GenerationStatus,
    ResolvedSettings,
};

use crate::encode::{ImageCrateEncoder, OutputEncoder, VIDEO_FPS};
use crate::engine::{
    DiffusionEngine, ImageJob, ImageRef, LoraSpec, ModelFamily, SampleParams, Upscaler, VideoJob,
};
use crate::error::GenerationError;
use crate::preprocess::{prepare_image, resize_exact, DecodedImage};
use crate::resolution::fix_resolution;
use crate::samplers::{SampleMethod, Scheduler};

/// Auxiliary reference images beyond this count are ignored.
pub const MAX_REFERENCE_IMAGES: usize = 4;

/// Factor applied by the post-generation upscale stage.
const POST_UPSCALE_FACTOR: u32 = 2;

/// Reference images above this pixel count are downscaled before use on
/// families that crash when fed larger ones.
const REFERENCE_AREA_LIMIT: u64 = 512 * 512;

const MAX_PROMPT_CHARS: usize = 800;

/// Ceiling for the configurable soft area limit, no matter the config.
const HARD_AREA_SIDE_LIMIT: u32 = 2048;

const MAX_SIDE: u32 = 8192;

/// How a request will be executed. Selected once per request from the loaded
/// model family and the request shape, never from request content alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    TextToImage,
    ImageToImage,
    MultiReferenceCompose,
    VideoGeneration,
    UpscaleOnly,
}

impl GenerationMode {
    /// Classify a generation request. A video family always routes to video
    /// generation: its keyframes are anchors, not a canvas. Otherwise a
    /// primary image selects img2img, and auxiliary references alone select
    /// multi-reference composition.
    pub fn classify(family: ModelFamily, has_primary: bool, aux_images: usize) -> Self {
        if family.is_video() {
            Self::VideoGeneration
        } else if has_primary {
            Self::ImageToImage
        } else if aux_images > 0 {
            Self::MultiReferenceCompose
        } else {
            Self::TextToImage
        }
    }
}

impl Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::TextToImage => "txt2img",
            Self::ImageToImage => "img2img",
            Self::MultiReferenceCompose => "multi-reference",
            Self::VideoGeneration => "video",
            Self::UpscaleOnly => "upscale",
        };
        write!(f, "{name}")
    }
}

/// Role auxiliary images play for the loaded model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReferenceRole {
    /// Conditions multi-image composition directly.
    Plain,
    /// Persona/identity conditioning.
    Identity,
    /// Video start/end anchor.
    Keyframe,
}

/// Session-wide configuration captured when the engine is loaded.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Side length whose square is the pixel count above which VAE tiling
    /// engages. 0 disables tiling.
    pub tiled_vae_threshold: u32,
    /// Per-side hard limit for generated dimensions. 0 means unlimited.
    pub side_limit: u32,
    /// Soft area limit expressed as a square side. 0 selects the
    /// model-family default.
    pub square_limit: u32,
    /// Lift quality-preserving parameter caps.
    pub remove_limits: bool,
    /// Model name echoed into the generation parameter record.
    pub model_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tiled_vae_threshold: 768,
            side_limit: 0,
            square_limit: 0,
            remove_limits: false,
            model_name: String::new(),
        }
    }
}

impl SessionConfig {
    fn effective_tile_threshold(&self) -> u32 {
        if self.tiled_vae_threshold == 0 {
            MAX_SIDE
        } else {
            self.tiled_vae_threshold.min(MAX_SIDE)
        }
    }
}

/// Named pixel-buffer slots reused across successive calls. A slot holds at
/// most one owned buffer; replacing it releases the previous occupant first.
#[derive(Default)]
struct ScratchSlots {
    primary: Option<DecodedImage>,
    mask: Option<DecodedImage>,
    references: Vec<DecodedImage>,
    upscale_src: Option<DecodedImage>,
}

impl ScratchSlots {
    fn replace(slot: &mut Option<DecodedImage>, image: DecodedImage) {
        // just-in-time free: the previous occupant goes before the new one lands
        slot.take();
        *slot = Some(image);
    }

    fn replace_primary(&mut self, image: DecodedImage) {
        Self::replace(&mut self.primary, image);
    }

    fn replace_mask(&mut self, image: DecodedImage) {
        Self::replace(&mut self.mask, image);
    }

    fn replace_upscale_src(&mut self, image: DecodedImage) -> &DecodedImage {
        // just-in-time free, then park the new buffer
        self.upscale_src.take();
        self.upscale_src.insert(image)
    }

    fn clear_references(&mut self) {
        self.references.clear();
    }

    fn push_reference(&mut self, image: DecodedImage) {
        self.references.push(image);
    }

    fn reference(&self, index: usize) -> Option<&DecodedImage> {
        self.references.get(index)
    }

    fn reference_views(&self) -> Vec<ImageRef<'_>> {
        self.references.iter().map(DecodedImage::view).collect()
    }
}

/// One loaded engine plus the process-wide scratch state for driving it.
///
/// The session is strictly one-request-in-flight: every entry point takes
/// `&mut self`, so the scratch registry can never see concurrent callers.
pub struct GenerationSession {
    engine: Box<dyn DiffusionEngine>,
    upscaler: Option<Box<dyn Upscaler>>,
    encoder: Box<dyn OutputEncoder>,
    config: SessionConfig,
    loras: Vec<LoraSpec>,
    slots: ScratchSlots,
    completed: u64,
}

impl GenerationSession {
    pub fn new(engine: Box<dyn DiffusionEngine>, config: SessionConfig) -> Self {
        info!("generation session ready ({} model)", engine.family());
        Self {
            engine,
            upscaler: None,
            encoder: Box::new(ImageCrateEncoder),
            config,
            loras: Vec::new(),
            slots: ScratchSlots::default(),
            completed: 0,
        }
    }

    pub fn with_upscaler(mut self, upscaler: Box<dyn Upscaler>) -> Self {
        self.upscaler = Some(upscaler);
        self
    }

    pub fn with_encoder(mut self, encoder: Box<dyn OutputEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Merge LoRAs into the loaded model. The specs are remembered and
    /// reattached to every job, since the engine applies weight differences
    /// relative to the previous generation.
    pub fn apply_loras(&mut self, specs: Vec<LoraSpec>) -> anyhow::Result<()> {
        if !specs.is_empty() {
            info!("applying {} LoRA(s)", specs.len());
        }
        self.engine.apply_loras(&specs)?;
        self.loras = specs;
        Ok(())
    }

    pub fn model_family(&self) -> ModelFamily {
        self.engine.family()
    }

    /// Generations completed successfully over the session lifetime.
    pub fn completed_generations(&self) -> u64 {
        self.completed
    }

    /// Run one generation request to completion. Never panics and never
    /// leaks: failures come back as a failure-status output with empty
    /// payloads, with every buffer this call allocated already released.
    pub fn generate(&mut self, request: &GenerationRequest) -> GenerationOutput {
        match self.try_generate(request) {
            Ok(output) => {
                self.completed += 1;
                output
            }
            Err(e) => {
                warn!("image generation failed: {e}");
                GenerationOutput::failure()
            }
        }
    }

    /// [`generate`](Self::generate) with the typed error surfaced.
    pub fn try_generate(
        &mut self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        let family = self.engine.family();

        // Working copy: the request itself stays untouched.
        let mut prompt = sanitize_prompt(&request.prompt);
        let negative_prompt = sanitize_prompt(&request.negative_prompt);
        let mut steps = request.steps;
        let mut cfg_scale = request.cfg_scale;
        let mut sampler = SampleMethod::from_name(&request.sampler)
            .unwrap_or_else(|| self.engine.default_sampler());
        let scheduler = Scheduler::from_name(&request.scheduler);

        // Per-family corrections: silent policy adjustments, not errors.
        match family {
            ModelFamily::Flux => {
                if cfg_scale != 1.0 {
                    debug!("Flux: clamping CFG scale to 1");
                    cfg_scale = 1.0;
                }
                if sampler == SampleMethod::EulerA {
                    debug!("Flux: switching Euler A to Euler");
                    sampler = SampleMethod::Euler;
                }
            }
            ModelFamily::Chroma => {
                if sampler == SampleMethod::EulerA {
                    debug!("Chroma: switching Euler A to Euler");
                    sampler = SampleMethod::Euler;
                }
            }
            ModelFamily::ZImage => {
                if !self.config.remove_limits && cfg_scale > 4.0 {
                    debug!("Z-Image: clamping CFG scale to 4 to preserve quality");
                    cfg_scale = 4.0;
                }
            }
            ModelFamily::Sdxs => {
                if cfg_scale > 1.0 || steps > 1 {
                    debug!("SDXS: clamping steps and CFG to 1");
                    cfg_scale = 1.0;
                    steps = 1;
                }
            }
            _ => {}
        }

        // Effective limits for this call.
        let hard_limit = if self.config.side_limit > 0 {
            self.config.side_limit.clamp(64, MAX_SIDE)
        } else {
            MAX_SIDE
        };
        let soft_limit = if self.config.square_limit == 0 {
            family.default_soft_limit()
        } else {
            self.config.square_limit.clamp(64, HARD_AREA_SIDE_LIMIT)
        };

        let (width, height) = fix_resolution(request.width, request.height, hard_limit, soft_limit);
        if (width, height) != (request.width, request.height) {
            info!(
                "requested dimensions {}x{} changed to {}x{}",
                request.width, request.height, width, height
            );
        }

        let tile_threshold = self.config.effective_tile_threshold();
        let vae_tiling =
            width as u64 * height as u64 > tile_threshold as u64 * tile_threshold as u64;

        let has_primary = request.init_image.as_deref().is_some_and(|b| !b.is_empty());
        let has_mask = request.mask.as_deref().is_some_and(|b| !b.is_empty());
        let aux_count = request
            .reference_images
            .iter()
            .filter(|b| !b.is_empty())
            .count();
        let mode = GenerationMode::classify(family, has_primary, aux_count);
        info!("[{mode}] generating ({steps} steps)");

        // Auxiliary images. A video model given a primary canvas and no
        // explicit keyframes treats the canvas as keyframe 0.
        let mut aux_encoded: Vec<&[u8]> = request
            .reference_images
            .iter()
            .filter(|b| !b.is_empty())
            .map(|b| b.as_slice())
            .collect();
        if family.is_video() && aux_encoded.is_empty() && has_primary {
            if let Some(init) = request.init_image.as_deref() {
                aux_encoded.push(init);
            }
        }

        let role = if family.is_video() {
            Some(ReferenceRole::Keyframe)
        } else if family.composes_references() {
            Some(ReferenceRole::Plain)
        } else if self.engine.identity_conditioning() {
            Some(ReferenceRole::Identity)
        } else {
            None
        };

        self.slots.clear_references();
        if !aux_encoded.is_empty() {
            match role {
                Some(role) => {
                    if aux_encoded.len() > MAX_REFERENCE_IMAGES {
                        debug!("keeping only the first {MAX_REFERENCE_IMAGES} reference images");
                    }
                    for bytes in aux_encoded.iter().take(MAX_REFERENCE_IMAGES) {
                        let prepared = match role {
                            // keyframes anchor the canvas: fit them to it
                            ReferenceRole::Keyframe => prepare_image(bytes, width, height, 3),
                            ReferenceRole::Plain | ReferenceRole::Identity => {
                                prepare_image(bytes, 0, 0, 3).and_then(|image| {
                                    if family.needs_reference_downscale() {
                                        bound_reference_area(image)
                                    } else {
                                        Ok(image)
                                    }
                                })
                            }
                        };
                        match prepared {
                            Ok(image) => self.slots.push_reference(image),
                            Err(e) => warn!("skipping reference image: {e}"),
                        }
                    }
                    if role == ReferenceRole::Identity {
                        prompt = ensure_identity_trigger(prompt);
                    }
                    debug!(
                        "ingested {} reference image(s) as {role:?}",
                        self.slots.references.len()
                    );
                }
                None => debug!(
                    "{family} models take no reference images; ignoring {}",
                    aux_encoded.len()
                ),
            }
        }

        if mode == GenerationMode::ImageToImage {
            if width == 0 || width % 64 != 0 || height == 0 || height % 64 != 0 {
                return Err(GenerationError::Dimension(width, height));
            }
            let init_bytes = request.init_image.as_deref().unwrap_or_default();
            let primary = prepare_image(init_bytes, width, height, 3)?;
            self.slots.replace_primary(primary);

            if has_mask {
                let mask_bytes = request.mask.as_deref().unwrap_or_default();
                let mut mask = prepare_image(mask_bytes, width, height, 1)?;
                if request.flip_mask {
                    mask.invert();
                }
                self.slots.replace_mask(mask);
            }
        }

        let sample = SampleParams {
            sample_method: sampler,
            scheduler,
            steps,
            cfg_scale,
            distilled_guidance: request.distilled_guidance.filter(|g| *g >= 0.0),
            shifted_timestep: request.shifted_timestep,
        };
        let resolved = ResolvedSettings {
            width,
            height,
            steps,
            cfg_scale,
            distilled_guidance: sample.distilled_guidance,
            shifted_timestep: request.shifted_timestep,
            sampler,
            scheduler,
            seed: request.seed,
            clip_skip: request.clip_skip,
            vae_tiling,
        };

        let frames = if mode == GenerationMode::VideoGeneration {
            let job = VideoJob {
                prompt: &prompt,
                negative_prompt: &negative_prompt,
                clip_skip: request.clip_skip,
                width,
                height,
                sample,
                seed: request.seed,
                strength: request.strength,
                frames: request.video_frames,
                init_image: self.slots.reference(0).map(DecodedImage::view),
                end_image: self.slots.reference(1).map(DecodedImage::view),
                control_frames: Vec::new(),
                loras: &self.loras,
            };
            debug!(
                "video job: {}x{}, {} frame(s) requested, {} keyframe(s)",
                job.width,
                job.height,
                job.frames,
                usize::from(job.init_image.is_some()) + usize::from(job.end_image.is_some()),
            );
            self.engine
                .run_video(&job)
                .map_err(GenerationError::Engine)?
        } else {
            let init_image = match mode {
                GenerationMode::ImageToImage => {
                    self.slots.primary.as_ref().map(DecodedImage::view)
                }
                _ => None,
            };
            let default_mask: Vec<u8>;
            let mask_image = if mode == GenerationMode::ImageToImage {
                if has_mask {
                    self.slots.mask.as_ref().map(DecodedImage::view)
                } else {
                    // the engine expects a mask with every canvas; all-255
                    // keeps it a plain img2img
                    default_mask = vec![255u8; (width * height) as usize];
                    Some(ImageRef {
                        width,
                        height,
                        channels: 1,
                        data: &default_mask,
                    })
                }
            } else {
                None
            };
            let (ref_images, id_images) = match role {
                Some(ReferenceRole::Plain) => (self.slots.reference_views(), Vec::new()),
                Some(ReferenceRole::Identity) => (Vec::new(), self.slots.reference_views()),
                _ => (Vec::new(), Vec::new()),
            };
            let job = ImageJob {
                prompt: &prompt,
                negative_prompt: &negative_prompt,
                clip_skip: request.clip_skip,
                width,
                height,
                sample,
                seed: request.seed,
                strength: request.strength,
                batch_count: 1,
                vae_tiling,
                init_image,
                mask_image,
                ref_images,
                id_images,
                loras: &self.loras,
            };
            debug!(
                "image job: {}x{}, init={}, mask={}, refs={}, id refs={}, tiling={}",
                job.width,
                job.height,
                job.init_image.is_some(),
                job.mask_image.is_some(),
                job.ref_images.len(),
                job.id_images.len(),
                job.vae_tiling,
            );
            self.engine
                .run_image(&job)
                .map_err(GenerationError::Engine)?
        };

        if frames.is_empty() {
            return Err(GenerationError::Engine(anyhow!(
                "engine returned no frames"
            )));
        }

        let animated = mode == GenerationMode::VideoGeneration
            && request.video_frames > 1
            && frames.len() > 1;

        if animated {
            let kind = request.video_output;
            let mut payload = Vec::new();
            let mut secondary_payload = Vec::new();
            if kind.wants_gif() {
                match self.encoder.encode_gif(&frames, VIDEO_FPS) {
                    Ok(bytes) => payload = bytes,
                    Err(e) => warn!("GIF encode failed: {e}"),
                }
            }
            if kind.wants_avi() {
                match self.encoder.encode_avi(&frames, VIDEO_FPS) {
                    Ok(bytes) => {
                        if payload.is_empty() {
                            payload = bytes;
                        } else {
                            secondary_payload = bytes;
                        }
                    }
                    Err(e) => warn!("AVI encode failed: {e}"),
                }
            }
            // frames are released here whether or not encoding succeeded
            if payload.is_empty() {
                return Err(GenerationError::Encode(anyhow!(
                    "no animated payload produced"
                )));
            }
            return Ok(GenerationOutput {
                payload,
                secondary_payload,
                animated: true,
                status: GenerationStatus::Success,
                resolved: Some(resolved),
            });
        }

        // Single-frame path. Batch count is fixed at 1; take the first frame
        // that actually carries pixels.
        let Some(frame) = frames.into_iter().find(|f| !f.data.is_empty()) else {
            return Err(GenerationError::Engine(anyhow!(
                "engine returned only empty frames"
            )));
        };

        let record =
            resolved.parameter_record(&prompt, &negative_prompt, &self.config.model_name);

        let encoded = match (request.upscale, self.upscaler.as_mut()) {
            (true, Some(upscaler)) => {
                info!("upscaling output image");
                let upscaled = upscaler
                    .upscale(frame.view(), POST_UPSCALE_FACTOR)
                    .map_err(GenerationError::Engine)?;
                // the upscaled buffer is released after encoding either way
                self.encoder.encode_png(&upscaled, Some(&record))
            }
            _ => self.encoder.encode_png(&frame, Some(&record)),
        };
        let payload = encoded.map_err(GenerationError::Encode)?;

        Ok(GenerationOutput {
            payload,
            secondary_payload: Vec::new(),
            animated: false,
            status: GenerationStatus::Success,
            resolved: Some(resolved),
        })
    }

    /// Decode and upscale a single image without running generation.
    pub fn upscale_only(&mut self, encoded: &[u8], factor: u32) -> GenerationOutput {
        match self.try_upscale_only(encoded, factor) {
            Ok(output) => output,
            Err(e) => {
                warn!("image upscaling failed: {e}");
                GenerationOutput::failure()
            }
        }
    }

    /// [`upscale_only`](Self::upscale_only) with the typed error surfaced.
    pub fn try_upscale_only(
        &mut self,
        encoded: &[u8],
        factor: u32,
    ) -> Result<GenerationOutput, GenerationError> {
        let Some(upscaler) = self.upscaler.as_mut() else {
            return Err(GenerationError::Uninitialized("upscaler"));
        };
        let source = prepare_image(encoded, 0, 0, 3)?;
        let source = self.slots.replace_upscale_src(source);
        let upscaled = upscaler
            .upscale(source.view(), factor)
            .map_err(GenerationError::Engine)?;
        let payload = self
            .encoder
            .encode_png(&upscaled, None)
            .map_err(GenerationError::Encode)?;
        Ok(GenerationOutput {
            payload,
            secondary_payload: Vec::new(),
            animated: false,
            status: GenerationStatus::Success,
            resolved: None,
        })
    }
}

/// Strip control characters and bound the prompt length.
fn sanitize_prompt(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .take(MAX_PROMPT_CHARS)
        .collect()
}

/// Identity conditioning keys off an `img` trigger word in the prompt: add
/// it when missing, and push it off the first position when the prompt
/// starts with it.
fn ensure_identity_trigger(prompt: String) -> String {
    if !prompt.contains("img") {
        format!("{prompt} img")
    } else if prompt.starts_with("img") {
        format!("person {prompt}")
    } else {
        prompt
    }
}

/// Downscale a reference image to the crash-safe area bound, preserving its
/// aspect ratio.
fn bound_reference_area(image: DecodedImage) -> Result<DecodedImage, GenerationError> {
    let area = image.width() as u64 * image.height() as u64;
    if area <= REFERENCE_AREA_LIMIT {
        return Ok(image);
    }
    let factor = (REFERENCE_AREA_LIMIT as f32 / area as f32).sqrt();
    let target_w = (image.width() as f32 * factor) as u32;
    let target_h = (image.height() as f32 * factor) as u32;
    debug!(
        "downscaling reference image {}x{} to {target_w}x{target_h}",
        image.width(),
        image.height()
    );
    resize_exact(image, target_w, target_h)
}
