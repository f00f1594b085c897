use thiserror::Error;

/// Errors reported by the JPEG-LS codec.
///
/// The first group covers malformed or truncated compressed streams, the
/// second unsupported or out-of-range coding parameters, the last incorrect
/// API usage.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpeglsError {
    #[error("Invalid compressed data")]
    InvalidCompressedData,
    #[error("Too much compressed data")]
    TooMuchCompressedData,
    #[error("JPEG marker start byte (0xFF) not found")]
    JpegMarkerStartByteNotFound,
    #[error("Start of image marker not found")]
    StartOfImageMarkerNotFound,
    #[error("End of image marker not found")]
    EndOfImageMarkerNotFound,
    #[error("Unknown JPEG marker found")]
    UnknownJpegMarkerFound,
    #[error("Encoding not supported")]
    EncodingNotSupported,
    #[error("Invalid marker segment size")]
    InvalidMarkerSegmentSize,
    #[error("Parameter value not supported")]
    ParameterValueNotSupported,
    #[error("Destination buffer too small")]
    DestinationTooSmall,
    #[error("Source buffer too small")]
    SourceTooSmall,

    // Logic errors: incorrect use of the API, not bad input.
    #[error("Invalid operation")]
    InvalidOperation,
    #[error("Invalid argument")]
    InvalidArgument,
}
