//! Multipart form encoding of a card into a complete HTTP/1.1 POST request.
//!
//! Part order is fixed: JSON metadata, optional document, optional photo, and
//! the trailing `upload` marker. Output depends only on the card contents, so
//! encoding the same card twice yields identical bytes.

pub mod filename;
pub mod filter;

pub use filename::encode_filename;
pub use filter::filter_non_finite;

use crate::card::{basename, Attachment, CardMetadata, ContextSnapshot, MetaValue};
use crate::error::EncodingError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Multipart boundary token used for every request
pub const BOUNDARY: &str = "-----CpB07xeql4ds";

const CRLF: &str = "\r\n";

/// Where cards are posted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: "postcards.example.org".to_string(),
            port: 80,
            path: "/upload.php".to_string(),
        }
    }
}

/// Photo read into memory for encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoPart {
    pub name: String,
    pub data: Vec<u8>,
}

/// Everything the encoder needs from a card, with the photo already loaded
#[derive(Debug, Clone, PartialEq)]
pub struct CardForm {
    pub metadata: CardMetadata,
    pub attachment: Option<Attachment>,
    pub photo: Option<PhotoPart>,
}

impl CardForm {
    /// Build the form from a card, reading the photo fully into memory.
    pub fn from_card(card: &ContextSnapshot) -> Result<Self, EncodingError> {
        let photo = match card.photo() {
            Some(path) => {
                let data = std::fs::read(path).map_err(|source| EncodingError::Photo {
                    path: path.to_path_buf(),
                    source,
                })?;
                let name = basename(path).unwrap_or_else(|| "photo.jpg".to_string());
                Some(PhotoPart { name, data })
            }
            None => None,
        };
        Ok(Self {
            metadata: card.prepare_for_sending(),
            attachment: card.attachment().cloned(),
            photo,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MultipartEncoder {
    endpoint: Endpoint,
}

impl MultipartEncoder {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Encode a card, reading its photo from disk.
    pub fn encode_card(&self, card: &ContextSnapshot) -> Result<Vec<u8>, EncodingError> {
        let form = CardForm::from_card(card)?;
        self.encode(&form)
    }

    /// Render the request line, headers and multipart body.
    pub fn encode(&self, form: &CardForm) -> Result<Vec<u8>, EncodingError> {
        let body = self.encode_body(form)?;
        let Endpoint { host, port, path } = &self.endpoint;
        let header = format!(
            "POST {path} HTTP/1.1\r\n\
             Host: {host}:{port}\r\n\
             Connection: close\r\n\
             Content-Type: multipart/form-data; boundary={BOUNDARY}\r\n\
             Content-Length: {}\r\n\
             \r\n",
            body.len()
        );

        let mut request = Vec::with_capacity(header.len() + body.len());
        request.extend_from_slice(header.as_bytes());
        request.extend_from_slice(&body);
        debug!(
            body_len = body.len(),
            has_attachment = form.attachment.is_some(),
            has_photo = form.photo.is_some(),
            "Encoded card"
        );
        Ok(request)
    }

    /// Multipart body only, without the HTTP request line and headers.
    pub fn encode_body(&self, form: &CardForm) -> Result<Vec<u8>, EncodingError> {
        let metadata = MetaValue::Map(filter_non_finite(form.metadata.as_map())).to_json();
        let metadata = serde_json::to_vec(&metadata)?;

        let mut parts: Vec<Vec<u8>> = Vec::with_capacity(4);
        parts.push(part(
            "Content-Disposition: form-data; name=\"metadata\"; filename=\"postcard-metadata.json\"\r\n\
             Content-Type: application/json; charset=UTF-8\r\n",
            &metadata,
        ));

        if let Some(attachment) = &form.attachment {
            let head = format!(
                "Content-Disposition: form-data; name=\"filedata\"; filename={}\r\n\
                 Content-Type: application/octet-stream\r\n\
                 Content-Transfer-Encoding: binary\r\n",
                encode_filename(&attachment.name)
            );
            parts.push(part(&head, &attachment.data));
        }

        if let Some(photo) = &form.photo {
            let head = format!(
                "Content-Disposition: form-data; name=\"picture\"; filename={}\r\n\
                 Content-Type: image/jpeg\r\n\
                 Content-Transfer-Encoding: binary\r\n",
                encode_filename(&photo.name)
            );
            parts.push(part(&head, &photo.data));
        }

        parts.push(part(
            "Content-Disposition: form-data; name=\"upload\"\r\n",
            b"Upload",
        ));

        let delimiter = format!("--{BOUNDARY}");
        let separator = format!("{CRLF}{delimiter}{CRLF}");
        let mut body = Vec::new();
        body.extend_from_slice(delimiter.as_bytes());
        body.extend_from_slice(CRLF.as_bytes());
        for (i, p) in parts.iter().enumerate() {
            if i > 0 {
                body.extend_from_slice(separator.as_bytes());
            }
            body.extend_from_slice(p);
        }
        body.extend_from_slice(format!("{CRLF}{delimiter}--{CRLF}").as_bytes());
        Ok(body)
    }
}

// A part is its header block, a blank line, and the raw body.
fn part(head: &str, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(head.len() + CRLF.len() + body.len());
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(CRLF.as_bytes());
    out.extend_from_slice(body);
    out
}
