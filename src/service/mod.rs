pub mod gemini;
pub mod types;

use crate::error::ReconstructError;

pub use types::ServiceDiag;

/// The external text-correction capability.
///
/// One call corrects one chunk: `text` is the region to repair and
/// `overlap_context` the already-processed lines preceding it. Implementations
/// apply the engine's fixed system policy and report failures as
/// `ServiceTransient` (worth retrying later) or `ServiceInvalidResponse`.
pub trait CorrectionService: Send + Sync {
    fn submit(&self, text: &str, overlap_context: &str) -> Result<String, ReconstructError>;
}

impl<S: CorrectionService + ?Sized> CorrectionService for &S {
    fn submit(&self, text: &str, overlap_context: &str) -> Result<String, ReconstructError> {
        (**self).submit(text, overlap_context)
    }
}

impl<S: CorrectionService + ?Sized> CorrectionService for Box<S> {
    fn submit(&self, text: &str, overlap_context: &str) -> Result<String, ReconstructError> {
        (**self).submit(text, overlap_context)
    }
}
