//! Scratch-slot lifecycle: successive calls must release the previous
//! occupant of a slot exactly once, and failure paths must not leak.
//!
//! All assertions live in one test so the process-wide buffer gauge is not
//! disturbed by concurrent tests.

mod common;

use common::{png_bytes, DoublingUpscaler, MockEngine};
use imggen_rs_core::{
    live_buffer_count, GenerationRequest, GenerationSession, ModelFamily, SessionConfig,
};

#[test]
fn scratch_slots_release_exactly_once() {
    let baseline = live_buffer_count();

    let (engine, _observed) = MockEngine::new(ModelFamily::Sd1);
    let mut session = GenerationSession::new(Box::new(engine), SessionConfig::default())
        .with_upscaler(Box::new(DoublingUpscaler));

    // First img2img call parks one buffer in the primary slot.
    let output = session.generate(&GenerationRequest {
        init_image: Some(png_bytes(512, 512, [1, 2, 3])),
        ..GenerationRequest::default()
    });
    assert!(output.is_success());
    assert_eq!(live_buffer_count(), baseline + 1);

    // Second call replaces it: the first buffer is released, not leaked.
    let output = session.generate(&GenerationRequest {
        init_image: Some(png_bytes(512, 512, [4, 5, 6])),
        ..GenerationRequest::default()
    });
    assert!(output.is_success());
    assert_eq!(live_buffer_count(), baseline + 1);

    // A mask occupies its own slot.
    let output = session.generate(&GenerationRequest {
        init_image: Some(png_bytes(512, 512, [7, 8, 9])),
        mask: Some(png_bytes(512, 512, [255, 255, 255])),
        ..GenerationRequest::default()
    });
    assert!(output.is_success());
    assert_eq!(live_buffer_count(), baseline + 2);

    // A failing call releases everything it allocated itself; retained slots
    // from the previous call are untouched.
    let output = session.generate(&GenerationRequest {
        init_image: Some(b"garbage".to_vec()),
        ..GenerationRequest::default()
    });
    assert!(!output.is_success());
    assert_eq!(live_buffer_count(), baseline + 2);

    // Reference slots are cleared on the next call that brings none.
    let output = session.generate(&GenerationRequest::default());
    assert!(output.is_success());
    assert_eq!(live_buffer_count(), baseline + 2);

    // Upscale source gets its own slot, reused across calls.
    let output = session.upscale_only(&png_bytes(100, 80, [1, 1, 1]), 2);
    assert!(output.is_success());
    assert_eq!(live_buffer_count(), baseline + 3);
    let output = session.upscale_only(&png_bytes(100, 80, [2, 2, 2]), 2);
    assert!(output.is_success());
    assert_eq!(live_buffer_count(), baseline + 3);

    // Dropping the session releases every retained slot.
    drop(session);
    assert_eq!(live_buffer_count(), baseline);
}
