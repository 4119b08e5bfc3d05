use std::fmt::Display;

/// Closed enumeration of the model families the orchestrator knows how to
/// drive. The engine reports which family it loaded; all branchy per-family
/// behavior keys off this enum rather than runtime type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    Sd1,
    Sd2,
    Sdxl,
    Sd3,
    /// Single-step distilled SD; rejects multi-step sampling outright.
    Sdxs,
    /// FLUX.1 with standard guidance distillation (Kontext-capable).
    Flux,
    /// FLUX.1 derivative with real CFG; not reference-capable.
    Chroma,
    Flux2,
    Flux2Klein,
    QwenImage,
    ZImage,
    Wan2,
    Wan2I2V,
    Wan2Ti2V,
}

impl ModelFamily {
    /// Video families produce frame sequences instead of a single canvas.
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Wan2 | Self::Wan2I2V | Self::Wan2Ti2V)
    }

    /// Families whose auxiliary reference images condition multi-image
    /// composition directly (as opposed to identity conditioning).
    pub fn composes_references(&self) -> bool {
        matches!(
            self,
            Self::Flux | Self::Flux2 | Self::Flux2Klein | Self::QwenImage
        )
    }

    /// Families that are known to crash when the combined reference image
    /// area grows too large, requiring a pre-downscale.
    pub fn needs_reference_downscale(&self) -> bool {
        matches!(self, Self::QwenImage | Self::Flux2 | Self::Flux2Klein)
    }

    /// Default soft area limit (as a square side length) when none is
    /// configured. The older UNet families misbehave above ~0.66 megapixels.
    pub fn default_soft_limit(&self) -> u32 {
        match self {
            Self::Sd1 | Self::Sd2 => 832,
            _ => 1024,
        }
    }
}

impl Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Sd1 => "SD 1.x",
            Self::Sd2 => "SD 2.x",
            Self::Sdxl => "SDXL",
            Self::Sd3 => "SD 3.x",
            Self::Sdxs => "SDXS",
            Self::Flux => "Flux",
            Self::Chroma => "Chroma",
            Self::Flux2 => "FLUX.2",
            Self::Flux2Klein => "FLUX.2 Klein",
            Self::QwenImage => "Qwen-Image",
            Self::ZImage => "Z-Image",
            Self::Wan2 => "Wan 2",
            Self::Wan2I2V => "Wan 2.2 I2V",
            Self::Wan2Ti2V => "Wan 2.2 TI2V",
        };
        write!(f, "{name}")
    }
}
