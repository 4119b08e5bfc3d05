//! Resolution constraint solving.
//!
//! Requested dimensions are untrusted; the engine needs both sides aligned to
//! 64 and bounded by a per-side hard limit and a total-area soft limit, while
//! distorting the requested aspect ratio as little as possible. Rounding
//! direction is chosen by exhaustive comparison, not fixed, because every
//! caller sees the resulting geometry.

use tracing::debug;

/// Alignment quantum both sides must satisfy.
pub const DIMENSION_ALIGN: u32 = 64;

fn round_down_64(n: u32) -> u32 {
    n - n % DIMENSION_ALIGN
}

fn round_up_64(n: u32) -> u32 {
    (n + DIMENSION_ALIGN - 1) / DIMENSION_ALIGN * DIMENSION_ALIGN
}

/// Correct `(width, height)` so that both sides are positive multiples of 64,
/// no side exceeds `hard_side_limit`, and `width * height` stays within
/// `soft_area_limit²`, keeping the ratio as close to the request as the
/// constraints allow.
pub fn fix_resolution(
    width: u32,
    height: u32,
    hard_side_limit: u32,
    soft_area_limit: u32,
) -> (u32, u32) {
    // sanitize the original values
    let width = width.clamp(64, 8192);
    let height = height.clamp(64, 8192);

    let is_landscape = width > height;
    let (mut long_side, mut short_side) = if is_landscape {
        (width, height)
    } else {
        (height, width)
    };
    let original_ratio = long_side as f32 / short_side as f32;

    // For the initial rounding, don't bother comparing to the original
    // requested ratio, since the caller chose those values directly.
    long_side = round_down_64(long_side);
    short_side = round_down_64(short_side);
    let hard_side_limit = round_down_64(hard_side_limit);

    // enforce the per-side hard limit
    if long_side > hard_side_limit {
        short_side = ((short_side * hard_side_limit) as f32 / long_side as f32) as u32;
        long_side = hard_side_limit;
        if short_side <= 64 {
            short_side = 64;
        } else {
            let down = round_down_64(short_side);
            let up = round_up_64(short_side);
            let longf = long_side as f32;
            // Choose better ratio match between rounding up or down
            short_side = if longf / down as f32 - original_ratio
                < original_ratio - longf / up as f32
            {
                down
            } else {
                up
            };
        }
    }

    // enforce the area limit; a single side may be longer, but the total
    // pixel count is bounded by soft_area_limit²
    let area_limit = soft_area_limit as u64 * soft_area_limit as u64;
    if long_side as u64 * short_side as u64 > area_limit {
        let scale = (area_limit as f32 / (long_side * short_side) as f32).sqrt();
        let new_short = (short_side as f32 * scale) as u32;
        let new_long = (long_side as f32 * scale) as u32;

        if new_short <= 64 {
            short_side = 64;
            long_side = round_down_64((area_limit / short_side as u64) as u32);
        } else {
            let new_long_down = round_down_64(new_long);
            let new_short_down = round_down_64(new_short);
            let new_short_up = round_up_64(new_short);
            let new_long_up = round_up_64(new_long);
            long_side = new_long_down;
            short_side = new_short_down;

            // we may get a ratio closer to the original if we still stay
            // below the limit when rounding up one of the dimensions, so
            // check both cases
            let mut rdiff = (new_long_down as f32 / new_short_down as f32 - original_ratio).abs();

            if (new_long_down as u64 * new_short_up as u64) < area_limit {
                let newrdiff =
                    (new_long_down as f32 / new_short_up as f32 - original_ratio).abs();
                if newrdiff < rdiff {
                    long_side = new_long_down;
                    short_side = new_short_up;
                    rdiff = newrdiff;
                }
            }

            if (new_long_up as u64 * new_short_down as u64) < area_limit {
                let newrdiff =
                    (new_long_up as f32 / new_short_down as f32 - original_ratio).abs();
                if newrdiff < rdiff {
                    long_side = new_long_up;
                    short_side = new_short_down;
                }
            }
        }
    }

    let fixed = if is_landscape {
        (long_side, short_side)
    } else {
        (short_side, long_side)
    };
    if fixed != (width, height) {
        debug!(
            "resolution {}x{} corrected to {}x{}",
            width, height, fixed.0, fixed.1
        );
    }
    fixed
}
