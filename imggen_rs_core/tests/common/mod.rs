#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use imggen_rs_core::{
    DiffusionEngine, Frame, ImageJob, ImageRef, LoraSpec, ModelFamily, SampleMethod, Scheduler,
    Upscaler, VideoJob,
};

/// Everything the mock engine saw on its most recent invocation.
#[derive(Debug, Default, Clone)]
pub struct Observed {
    pub image_jobs: u32,
    pub video_jobs: u32,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f32,
    pub sampler: Option<SampleMethod>,
    pub scheduler: Option<Scheduler>,
    pub prompt: String,
    pub had_init: bool,
    pub had_mask: bool,
    pub mask_first_byte: Option<u8>,
    pub ref_dims: Vec<(u32, u32)>,
    pub id_count: usize,
    pub vae_tiling: bool,
    pub had_start_keyframe: bool,
    pub had_end_keyframe: bool,
    pub keyframe_dims: Option<(u32, u32)>,
    pub requested_frames: u32,
}

pub struct MockEngine {
    pub family: ModelFamily,
    pub identity: bool,
    pub frames_to_return: usize,
    pub fail: bool,
    pub observed: Arc<Mutex<Observed>>,
}

impl MockEngine {
    pub fn new(family: ModelFamily) -> (Self, Arc<Mutex<Observed>>) {
        let observed = Arc::new(Mutex::new(Observed::default()));
        (
            Self {
                family,
                identity: false,
                frames_to_return: 1,
                fail: false,
                observed: observed.clone(),
            },
            observed,
        )
    }
}

pub fn solid_frame(width: u32, height: u32) -> Frame {
    Frame {
        width,
        height,
        channels: 3,
        data: vec![127; (width * height * 3) as usize],
    }
}

impl DiffusionEngine for MockEngine {
    fn family(&self) -> ModelFamily {
        self.family
    }

    fn default_sampler(&self) -> SampleMethod {
        SampleMethod::EulerA
    }

    fn identity_conditioning(&self) -> bool {
        self.identity
    }

    fn apply_loras(&mut self, _specs: &[LoraSpec]) -> anyhow::Result<()> {
        Ok(())
    }

    fn run_image(&mut self, job: &ImageJob<'_>) -> anyhow::Result<Vec<Frame>> {
        {
            let mut seen = self.observed.lock().unwrap();
            seen.image_jobs += 1;
            seen.width = job.width;
            seen.height = job.height;
            seen.steps = job.sample.steps;
            seen.cfg_scale = job.sample.cfg_scale;
            seen.sampler = Some(job.sample.sample_method);
            seen.scheduler = job.sample.scheduler;
            seen.prompt = job.prompt.to_string();
            seen.had_init = job.init_image.is_some();
            seen.had_mask = job.mask_image.is_some();
            seen.mask_first_byte = job.mask_image.and_then(|m| m.data.first().copied());
            seen.ref_dims = job.ref_images.iter().map(|r| (r.width, r.height)).collect();
            seen.id_count = job.id_images.len();
            seen.vae_tiling = job.vae_tiling;
        }
        if self.fail {
            anyhow::bail!("mock engine failure");
        }
        Ok((0..self.frames_to_return)
            .map(|_| solid_frame(job.width, job.height))
            .collect())
    }

    fn run_video(&mut self, job: &VideoJob<'_>) -> anyhow::Result<Vec<Frame>> {
        {
            let mut seen = self.observed.lock().unwrap();
            seen.video_jobs += 1;
            seen.width = job.width;
            seen.height = job.height;
            seen.steps = job.sample.steps;
            seen.cfg_scale = job.sample.cfg_scale;
            seen.sampler = Some(job.sample.sample_method);
            seen.prompt = job.prompt.to_string();
            seen.had_start_keyframe = job.init_image.is_some();
            seen.had_end_keyframe = job.end_image.is_some();
            seen.keyframe_dims = job.init_image.map(|k| (k.width, k.height));
            seen.requested_frames = job.frames;
        }
        if self.fail {
            anyhow::bail!("mock engine failure");
        }
        Ok((0..self.frames_to_return)
            .map(|_| solid_frame(job.width, job.height))
            .collect())
    }
}

/// Upscaler stub that multiplies the source dimensions.
pub struct DoublingUpscaler;

impl Upscaler for DoublingUpscaler {
    fn upscale(&mut self, source: ImageRef<'_>, factor: u32) -> anyhow::Result<Frame> {
        Ok(solid_frame(source.width * factor, source.height * factor))
    }
}

/// Encode a solid-color RGB PNG for use as request input.
pub fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for _ in 0..width * height {
        data.extend_from_slice(&color);
    }
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(&data, width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}
