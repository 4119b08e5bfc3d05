//! Diagnostic CLI over the pure request-shaping components: preview how a
//! request would be corrected without loading a model.

use clap::{Parser, Subcommand};
use imggen_rs_core::{
    fix_resolution, query_capabilities, SampleMethod, ScheduleFamily, Scheduler,
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Inspect imggen_rs request shaping")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show how a requested resolution and sampler resolve under the
    /// configured limits.
    Plan {
        #[arg(long, default_value_t = 512)]
        width: u32,

        #[arg(long, default_value_t = 512)]
        height: u32,

        /// Per-side hard limit.
        #[arg(long, default_value_t = 8192)]
        side_limit: u32,

        /// Soft area limit expressed as a square side.
        #[arg(long, default_value_t = 1024)]
        square_limit: u32,

        /// Side length whose square gates VAE tiling.
        #[arg(long, default_value_t = 768)]
        tiled_threshold: u32,

        /// Sampler name or alias to resolve.
        #[arg(long)]
        sampler: Option<String>,

        /// Scheduler name to resolve.
        #[arg(long)]
        scheduler: Option<String>,
    },

    /// Print the sigma schedule a step count expands to.
    Schedule {
        #[arg(long, value_enum, default_value_t = ScheduleFamily::KarrasResampled)]
        family: ScheduleFamily,

        #[arg(short, long, default_value_t = 20)]
        steps: u32,

        #[arg(long, default_value_t = 0.1)]
        sigma_min: f32,

        #[arg(long, default_value_t = 14.6146)]
        sigma_max: f32,
    },

    /// List the schedulers callers may request, as JSON.
    Capabilities,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Command::Plan {
            width,
            height,
            side_limit,
            square_limit,
            tiled_threshold,
            sampler,
            scheduler,
        } => {
            let (fixed_w, fixed_h) = fix_resolution(width, height, side_limit, square_limit);
            println!("requested resolution: {width}x{height}");
            println!("resolved resolution:  {fixed_w}x{fixed_h}");
            let tiling =
                fixed_w as u64 * fixed_h as u64 > tiled_threshold as u64 * tiled_threshold as u64;
            println!("vae tiling:           {tiling}");
            if let Some(name) = sampler {
                match SampleMethod::from_name(&name) {
                    Some(method) => println!("sampler:              {method}"),
                    None => println!("sampler:              model default (unknown name {name:?})"),
                }
            }
            if let Some(name) = scheduler {
                match Scheduler::from_name(&name) {
                    Some(scheduler) => println!("scheduler:            {scheduler}"),
                    None => {
                        println!("scheduler:            model default (unknown name {name:?})")
                    }
                }
            }
        }
        Command::Schedule {
            family,
            steps,
            sigma_min,
            sigma_max,
        } => {
            // Preview conversion only: real timestep-to-sigma mappings come
            // from the loaded model.
            let t_to_sigma = |t: f32| sigma_min + (sigma_max - sigma_min) * t / 999.0;
            let sigmas = family.sigmas(steps, sigma_min, sigma_max, t_to_sigma);
            println!("{} sigma(s) for {steps} step(s):", sigmas.len());
            for (i, sigma) in sigmas.iter().enumerate() {
                println!("  [{i:>3}] {sigma:.6}");
            }
        }
        Command::Capabilities => {
            println!("{}", serde_json::to_string_pretty(&query_capabilities())?);
        }
    }

    Ok(())
}
