//! Sampler and scheduler identification.
//!
//! Callers name samplers with a mix of canonical names, k-diffusion style
//! `k_` prefixes and UI labels; all of them resolve through a single static
//! lookup table into one closed enum.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Sampling method requested for the denoising loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum SampleMethod {
    #[serde(rename = "euler_a")]
    EulerA,
    #[serde(rename = "euler")]
    Euler,
    #[serde(rename = "heun")]
    Heun,
    #[serde(rename = "dpm2")]
    Dpm2,
    #[serde(rename = "dpm++2s_a")]
    Dpmpp2sA,
    #[serde(rename = "dpm++2m")]
    Dpmpp2m,
    #[serde(rename = "dpm++2mv2")]
    Dpmpp2mv2,
    #[serde(rename = "ipndm")]
    Ipndm,
    #[serde(rename = "ipndm_v")]
    IpndmV,
    #[serde(rename = "lcm")]
    Lcm,
    #[serde(rename = "ddim_trailing")]
    DdimTrailing,
    #[serde(rename = "tcd")]
    Tcd,
    #[serde(rename = "res_multistep")]
    ResMultistep,
    #[serde(rename = "res_2s")]
    Res2s,
}

serde_plain::derive_display_from_serialize!(SampleMethod);
serde_plain::derive_fromstr_from_deserialize!(SampleMethod);

/// Alternate spellings accepted from callers, beyond the canonical names.
static SAMPLER_ALIASES: Lazy<HashMap<&'static str, SampleMethod>> = Lazy::new(|| {
    HashMap::from([
        ("euler a", SampleMethod::EulerA),
        ("k_euler_a", SampleMethod::EulerA),
        ("k_euler", SampleMethod::Euler),
        ("k_heun", SampleMethod::Heun),
        ("k_dpm_2", SampleMethod::Dpm2),
        ("k_lcm", SampleMethod::Lcm),
        ("ddim", SampleMethod::DdimTrailing),
        ("dpm++ 2m karras", SampleMethod::Dpmpp2m),
        ("dpm++ 2m", SampleMethod::Dpmpp2m),
        ("k_dpmpp_2m", SampleMethod::Dpmpp2m),
        ("res multistep", SampleMethod::ResMultistep),
        ("k_res_multistep", SampleMethod::ResMultistep),
        ("res 2s", SampleMethod::Res2s),
        ("k_res_2s", SampleMethod::Res2s),
    ])
});

impl SampleMethod {
    /// Resolve a caller-supplied sampler name, case-insensitively, through
    /// the canonical names and the alias table. `None` means the caller gets
    /// the engine's model-default sampler.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        if let Ok(method) = lower.parse() {
            return Some(method);
        }
        SAMPLER_ALIASES.get(lower.as_str()).copied()
    }
}

/// Noise schedule requested for the denoising loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum Scheduler {
    #[serde(rename = "discrete")]
    Discrete,
    #[serde(rename = "karras")]
    Karras,
    #[serde(rename = "exponential")]
    Exponential,
    #[serde(rename = "ays")]
    Ays,
    #[serde(rename = "gits")]
    Gits,
    #[serde(rename = "sgm_uniform")]
    SgmUniform,
    #[serde(rename = "simple")]
    Simple,
}

serde_plain::derive_display_from_serialize!(Scheduler);
serde_plain::derive_fromstr_from_deserialize!(Scheduler);

impl Scheduler {
    pub const ALL: [Scheduler; 7] = [
        Scheduler::Discrete,
        Scheduler::Karras,
        Scheduler::Exponential,
        Scheduler::Ays,
        Scheduler::Gits,
        Scheduler::SgmUniform,
        Scheduler::Simple,
    ];

    /// Resolve a caller-supplied scheduler name. `None` selects the engine's
    /// model-default schedule.
    pub fn from_name(name: &str) -> Option<Self> {
        name.trim().to_lowercase().parse().ok()
    }
}
