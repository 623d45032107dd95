//! `data:` URLs, the textual form images take inside a document.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::ImageFormat;

use crate::error::SignatureError;

/// A decoded `data:<mime>;base64,<payload>` reference.
#[derive(Debug, Clone, PartialEq)]
pub struct DataUrl {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn parse(url: &str) -> Result<Self, SignatureError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| SignatureError::DataUrl("missing data: scheme".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| SignatureError::DataUrl("missing payload separator".into()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| SignatureError::DataUrl("only base64 payloads are supported".into()))?;
        Ok(Self {
            mime: mime.to_string(),
            bytes: BASE64.decode(payload.trim())?,
        })
    }

    /// File extension matching the mime type, used when images are written out.
    pub fn extension(&self) -> &'static str {
        ImageFormat::from_mime_type(&self.mime)
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("png")
    }
}

pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Wraps raw image file bytes, sniffing the mime type from their content.
pub fn image_data_url(bytes: &[u8]) -> Result<String, SignatureError> {
    let format = image::guess_format(bytes)?;
    Ok(encode(format.to_mime_type(), bytes))
}
