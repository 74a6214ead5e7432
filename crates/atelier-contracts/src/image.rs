use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// An image held in memory: raw bytes plus the MIME type they decode as.
///
/// This is the one image shape that crosses module boundaries. Intake
/// produces it, the session stores it, generation clients inline it into
/// request payloads, and the CLI writes it back to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn base64_data(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data())
    }

    pub fn from_data_url(url: &str) -> anyhow::Result<Self> {
        let Some(rest) = url.strip_prefix("data:") else {
            bail!("not a data URL");
        };
        let Some((header, payload)) = rest.split_once(',') else {
            bail!("data URL has no payload separator");
        };
        let Some(mime_type) = header.strip_suffix(";base64") else {
            bail!("only base64 data URLs are supported");
        };
        if mime_type.is_empty() {
            bail!("data URL has no MIME type");
        }
        let bytes = BASE64
            .decode(payload.trim())
            .context("invalid base64 payload in data URL")?;
        Ok(Self::new(mime_type, bytes))
    }

    /// File extension matching the MIME type, for writing artifacts.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "bin",
        }
    }
}
