//! Attachment decoding: data URIs to named binary files.

use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use thiserror::Error;

use crate::task::{Attachment, File};

/// Standard alphabet, tolerating non-zero bits in the final symbol.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Attachment {name} is not a data URI (no ',' separator)")]
    MissingPayload { name: String },

    #[error("Attachment {name} has an invalid base64 payload: {source}")]
    InvalidBase64 {
        name: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Decode every attachment, stopping at the first failure.
pub fn decode_attachments(attachments: &[Attachment]) -> Result<Vec<File>, DecodeError> {
    attachments.iter().map(decode_attachment).collect()
}

/// Decode a single attachment. Only the text after the first comma is used.
pub fn decode_attachment(attachment: &Attachment) -> Result<File, DecodeError> {
    let (_, payload) = attachment
        .url
        .split_once(',')
        .ok_or_else(|| DecodeError::MissingPayload {
            name: attachment.name.clone(),
        })?;

    let bytes = decode_base64(payload).map_err(|source| DecodeError::InvalidBase64 {
        name: attachment.name.clone(),
        source,
    })?;

    tracing::debug!(name = %attachment.name, bytes = bytes.len(), "Decoded attachment");
    Ok(File::binary(attachment.name.clone(), bytes))
}

/// Decode base64 after stripping whitespace and restoring missing `=` padding.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let mut cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let missing = cleaned.len() % 4;
    if missing != 0 {
        cleaned.extend(std::iter::repeat('=').take(4 - missing));
    }
    LENIENT.decode(cleaned)
}
