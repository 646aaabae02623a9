//! Maps `Box<dyn Error>` from trait boundaries to typed `PackerError`.
//!
//! The traits in `packer_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `packer_hardware::HwError` downcasting.

use crate::error::PackerError;

/// Map a trait-boundary error to a typed `PackerError`.
///
/// Attempts to downcast known error types first, then falls back to the
/// error's message.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> PackerError {
    if let Some(pe) = e.downcast_ref::<PackerError>() {
        return pe.clone();
    }

    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        use packer_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Io(io) => PackerError::Io(io.to_string()),
                HwError::Image(img) => PackerError::Io(img.to_string()),
                other => PackerError::Hardware(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return PackerError::Io(io.to_string());
    }
    PackerError::Hardware(e.to_string())
}

/// `map_hw_error` lifted into an `eyre::Report`, for `map_err` chains.
pub(crate) fn hw_report(e: Box<dyn std::error::Error + Send + Sync>) -> eyre::Report {
    eyre::Report::new(map_hw_error(&*e))
}
