//! Sigma schedules for few-step distilled sampling.
//!
//! Both families produce `steps + 1` noise levels, non-increasing, with a
//! terminal `0.0` for the sampling loop to land on.

/// Timestep count the base models were trained with.
const TRAIN_TIMESTEPS: u32 = 1000;

/// Length of the reference schedule the distilled models were condensed from.
const REFERENCE_STEPS: usize = 50;

/// Karras `rho` used to build the reference schedule.
const KARRAS_RHO: f32 = 7.0;

/// How a requested step count maps onto noise levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScheduleFamily {
    /// Resample a fixed 50-point Karras reference curve at evenly spaced
    /// index positions. Defined directly in sigma space.
    KarrasResampled,
    /// Linearly spaced timesteps from `TRAIN_TIMESTEPS - 1` down to 0,
    /// mapped through the model's timestep-to-sigma conversion.
    LinearTimestep,
}

impl std::fmt::Display for ScheduleFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KarrasResampled => write!(f, "karras-resampled"),
            Self::LinearTimestep => write!(f, "linear-timestep"),
        }
    }
}

impl ScheduleFamily {
    /// Produce the sigma sequence for `steps` denoising steps.
    ///
    /// `t_to_sigma` is the model's timestep-to-noise-level conversion. The
    /// `KarrasResampled` family ignores it: that schedule is defined directly
    /// in sigma space, not via the model's timestep mapping.
    ///
    /// `steps == 0` is family policy: `KarrasResampled` returns an empty
    /// sequence, `LinearTimestep` a single `[0.0]`.
    pub fn sigmas(
        &self,
        steps: u32,
        sigma_min: f32,
        sigma_max: f32,
        t_to_sigma: impl Fn(f32) -> f32,
    ) -> Vec<f32> {
        match self {
            Self::KarrasResampled => karras_resampled(steps, sigma_min, sigma_max),
            Self::LinearTimestep => linear_timestep(steps, t_to_sigma),
        }
    }
}

fn karras_resampled(steps: u32, sigma_min: f32, sigma_max: f32) -> Vec<f32> {
    if steps == 0 {
        return Vec::new();
    }

    // Reference curve from sigma_max (i = 0) down to sigma_min (i = N-1):
    // sigma(i) = (max^(1/rho) + i/(N-1) * (min^(1/rho) - max^(1/rho)))^rho
    let min_inv_rho = sigma_min.powf(1.0 / KARRAS_RHO);
    let max_inv_rho = sigma_max.powf(1.0 / KARRAS_RHO);
    let reference: Vec<f32> = (0..REFERENCE_STEPS)
        .map(|i| {
            let frac = i as f32 / (REFERENCE_STEPS - 1) as f32;
            (max_inv_rho + frac * (min_inv_rho - max_inv_rho)).powf(KARRAS_RHO)
        })
        .collect();

    let mut result = Vec::with_capacity(steps as usize + 1);

    if steps == 1 {
        result.push(reference[0]);
        result.push(0.0);
        return result;
    }

    // Sample evenly spaced *index* positions from the reference, rounded and
    // clamped against floating point drift at the ends.
    let step_size = (REFERENCE_STEPS - 1) as f32 / (steps - 1) as f32;
    for i in 0..steps {
        let idx = (step_size * i as f32).round() as isize;
        let idx = idx.clamp(0, REFERENCE_STEPS as isize - 1) as usize;
        result.push(reference[idx]);
    }

    result.push(0.0);
    result
}

fn linear_timestep(steps: u32, t_to_sigma: impl Fn(f32) -> f32) -> Vec<f32> {
    if steps == 0 {
        return vec![0.0];
    }

    let mut result = Vec::with_capacity(steps as usize + 1);
    let start = (TRAIN_TIMESTEPS - 1) as f32;

    // A single step would divide by zero below; it is just the endpoints.
    if steps == 1 {
        result.push(t_to_sigma(start));
        result.push(0.0);
        return result;
    }

    let step = start / (steps - 1) as f32;
    for i in 0..steps {
        result.push(t_to_sigma(start - step * i as f32));
    }

    result.push(0.0);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_t_to_sigma(t: f32) -> f32 {
        // monotone in t, zero at t = 0
        t / (TRAIN_TIMESTEPS - 1) as f32 * 14.6
    }

    fn assert_non_increasing(sigmas: &[f32]) {
        for pair in sigmas.windows(2) {
            assert!(pair[0] >= pair[1], "{:?} increases", pair);
        }
    }

    #[test]
    fn karras_single_step_is_endpoints() {
        let sigmas = ScheduleFamily::KarrasResampled.sigmas(1, 0.1, 10.0, toy_t_to_sigma);
        assert_eq!(sigmas.len(), 2);
        assert!((sigmas[0] - 10.0).abs() < 1e-3, "{}", sigmas[0]);
        assert_eq!(sigmas[1], 0.0);
    }

    #[test]
    fn karras_full_length_schedule() {
        let sigmas = ScheduleFamily::KarrasResampled.sigmas(50, 0.1, 14.6, toy_t_to_sigma);
        assert_eq!(sigmas.len(), 51);
        assert!((sigmas[0] - 14.6).abs() < 1e-2);
        assert!((sigmas[49] - 0.1).abs() < 1e-3);
        assert_eq!(*sigmas.last().unwrap(), 0.0);
        assert_non_increasing(&sigmas);
    }

    #[test]
    fn karras_resample_hits_curve_ends() {
        // Fewer steps than the reference still starts at sigma_max and
        // reaches sigma_min before the terminal zero.
        let sigmas = ScheduleFamily::KarrasResampled.sigmas(4, 0.1, 10.0, toy_t_to_sigma);
        assert_eq!(sigmas.len(), 5);
        assert!((sigmas[0] - 10.0).abs() < 1e-3);
        assert!((sigmas[3] - 0.1).abs() < 1e-3);
        assert_eq!(sigmas[4], 0.0);
        assert_non_increasing(&sigmas);
    }

    #[test]
    fn karras_zero_steps_is_empty() {
        assert!(ScheduleFamily::KarrasResampled
            .sigmas(0, 0.1, 10.0, toy_t_to_sigma)
            .is_empty());
    }

    #[test]
    fn linear_zero_steps_is_single_zero() {
        let sigmas = ScheduleFamily::LinearTimestep.sigmas(0, 0.1, 10.0, toy_t_to_sigma);
        assert_eq!(sigmas, vec![0.0]);
    }

    #[test]
    fn linear_single_step_uses_last_timestep() {
        let sigmas = ScheduleFamily::LinearTimestep.sigmas(1, 0.1, 10.0, toy_t_to_sigma);
        assert_eq!(sigmas.len(), 2);
        assert!((sigmas[0] - 14.6).abs() < 1e-4);
        assert_eq!(sigmas[1], 0.0);
    }

    #[test]
    fn linear_schedule_spans_timesteps() {
        let sigmas = ScheduleFamily::LinearTimestep.sigmas(8, 0.1, 10.0, toy_t_to_sigma);
        assert_eq!(sigmas.len(), 9);
        assert!((sigmas[0] - 14.6).abs() < 1e-4);
        // last pre-terminal entry maps t = 0
        assert!(sigmas[7].abs() < 1e-4);
        assert_eq!(*sigmas.last().unwrap(), 0.0);
        assert_non_increasing(&sigmas);
    }
}
