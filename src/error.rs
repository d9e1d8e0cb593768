//! Error types for probe, programming and discovery operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for zia-probe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the probe or running a discovery
#[derive(Debug, Error)]
pub enum Error {
    /// The probe rejected or failed a request. The TAP state is unknown afterwards.
    #[error("Transport failure: {reason}")]
    Transport {
        /// Reason for failure
        reason: String,
    },

    /// USB error from the control-transfer probe
    #[cfg(feature = "usb")]
    #[error("USB error: {source}")]
    Usb {
        /// Underlying libusb error
        #[from]
        source: rusb::Error,
    },

    /// No probe with the expected USB ids is attached
    #[error("Probe not found (vid {vid:#06x}, pid {pid:#06x})")]
    DeviceNotFound {
        /// Vendor id searched for
        vid: u16,
        /// Product id searched for
        pid: u16,
    },

    /// Cable name not recognised (or not compiled in)
    #[error("Unknown cable \"{name}\"")]
    UnknownCable {
        /// Name that was requested
        name: String,
    },

    /// The device answered with an unexpected IDCODE
    #[error("IDCODE mismatch: expected {expected:#010x} (mask {mask:#010x}), read {actual:#010x}")]
    IdcodeMismatch {
        /// IDCODE from the device profile
        expected: u32,
        /// Bits that are compared
        mask: u32,
        /// IDCODE read from the device
        actual: u32,
    },

    /// Configuration image does not have the device's row count or row width
    #[error("Image geometry mismatch: expected {expected_rows} rows of {expected_width} bits, got {rows} rows of {width} bits")]
    ImageGeometry {
        /// Rows required by the device
        expected_rows: usize,
        /// Row width required by the device
        expected_width: usize,
        /// Rows in the image
        rows: usize,
        /// Width of the first offending row
        width: usize,
    },

    /// Malformed crbit text
    #[error("Invalid crbit line {line}: {reason}")]
    ImageParse {
        /// 1-based line number
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Fuse map template is unusable
    #[error("Fuse map template error: {reason}")]
    Template {
        /// Reason for failure
        reason: String,
    },

    /// The external bitstream compiler failed
    #[error("Bitstream compiler {} failed: {reason}", program.display())]
    Compiler {
        /// Program that was invoked
        program: PathBuf,
        /// Reason for failure
        reason: String,
    },

    /// Device profile is inconsistent
    #[error("Invalid device profile: {reason}")]
    Profile {
        /// Reason for failure
        reason: String,
    },

    /// Checkpoint cannot be used with this profile, or a cell is outside the map
    #[error("Checkpoint error: {reason}")]
    Checkpoint {
        /// Reason for failure
        reason: String,
    },

    /// I/O error on files or subprocesses
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Checkpoint or profile (de)serialization failed
    #[error("JSON error: {source}")]
    Json {
        /// Underlying serde_json error
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a crbit parse error
    pub fn image_parse(line: usize, reason: impl Into<String>) -> Self {
        Self::ImageParse {
            line,
            reason: reason.into(),
        }
    }

    /// Create a template error
    pub fn template(reason: impl Into<String>) -> Self {
        Self::Template {
            reason: reason.into(),
        }
    }

    /// Create a compiler error
    pub fn compiler(program: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Compiler {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Create a profile error
    pub fn profile(reason: impl Into<String>) -> Self {
        Self::Profile {
            reason: reason.into(),
        }
    }

    /// Create a checkpoint error
    pub fn checkpoint(reason: impl Into<String>) -> Self {
        Self::Checkpoint {
            reason: reason.into(),
        }
    }
}
