use thiserror::Error;

/// Errors produced while decoding a binary record.
///
/// Decoding never panics on adversarial input; every out-of-bounds read is
/// reported as `Truncated` with the field that could not be completed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerializationError {
    #[error("record truncated while reading {field}: needed {needed} more bytes")]
    Truncated { field: &'static str, needed: usize },

    /// Same as `Truncated`, but the input consisted entirely of base64
    /// characters — the caller most likely forgot to decode it first.
    #[error("record truncated while reading {field}: did you forget to base64-decode this value?")]
    TruncatedLikelyBase64 { field: &'static str },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
}
