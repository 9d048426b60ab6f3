use thiserror::Error;

/// Error type for rendering operations.
///
/// Errors at this layer are local to a single draw operator: the public
/// entry points report them and return, leaving tracked state unchanged, so
/// the caller can continue with the next operator.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// The pixel buffer for an image or mask could not be allocated.
    #[error("unable to allocate {bytes} bytes for image data")]
    ImageAllocation { bytes: usize },

    /// Image dimensions overflow the addressable buffer size.
    #[error("image dimensions {width}x{height} exceed the pixel buffer limit")]
    ImageTooLarge { width: usize, height: usize },

    /// The drawing surface could not complete an operation
    /// (surface or pattern allocation failure).
    #[error("drawing surface error: {0}")]
    Surface(String),
}

/// Result type alias for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;
