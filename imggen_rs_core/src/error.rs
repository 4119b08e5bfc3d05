use thiserror::Error;

/// Failure taxonomy for a single orchestrated request.
///
/// Every variant is recoverable: the public entry points surface these as a
/// failure payload, never a panic, and any buffers owned by the failing call
/// have already been released by the time one of these is returned.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("could not decode input image: {0}")]
    Decode(String),
    #[error("could not allocate image buffer: {0}")]
    Allocation(String),
    #[error("bad request image dimensions {0}x{1}")]
    Dimension(u32, u32),
    #[error("generation engine produced no result")]
    Engine(#[source] anyhow::Error),
    #[error("{0} is not initialized")]
    Uninitialized(&'static str),
    #[error("could not encode output payload")]
    Encode(#[source] anyhow::Error),
}
