//! Base64 conversions and MIME type resolution for uploads.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Input bytes per encoded chunk. A multiple of 3 so chunks never need padding.
const ENCODE_CHUNK_SIZE: usize = 3 * 64 * 1024;

/// File ready to be embedded in an upstream request.
#[derive(Debug, Clone)]
pub struct PreparedFile {
    pub base64_content: String,
    pub mime_type: String,
    pub filename: String,
}

impl PreparedFile {
    pub fn new(content: &[u8], filename: &str, declared_mime: Option<&str>) -> Self {
        Self {
            base64_content: to_base64(content),
            mime_type: resolve_mime_type(declared_mime, filename, content),
            filename: filename.to_string(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_content)
    }
}

/// Standard padded base64, built chunk by chunk.
pub fn to_base64(content: &[u8]) -> String {
    let mut out = String::with_capacity(content.len().div_ceil(3) * 4);
    for chunk in content.chunks(ENCODE_CHUNK_SIZE) {
        BASE64.encode_string(chunk, &mut out);
    }
    out
}

/// A decoded base64 payload, plus the media type if it came as a data URI.
#[derive(Debug)]
pub struct DecodedPayload {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Decode standard base64, accepting a `data:<mime>;base64,` prefix and embedded whitespace.
pub fn from_base64(input: &str) -> Result<DecodedPayload, base64::DecodeError> {
    let input = input.trim();
    let (mime_type, encoded) = match split_data_uri(input) {
        Some((mime, rest)) => (mime, rest),
        None => (None, input),
    };

    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64.decode(compact.as_bytes())?;

    Ok(DecodedPayload { bytes, mime_type })
}

fn split_data_uri(input: &str) -> Option<(Option<String>, &str)> {
    let rest = input.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta
        .split(';')
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| m.to_ascii_lowercase());
    Some((mime, payload))
}

/// Lower-cased extension of a filename, if it has one.
pub fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() || ext.contains(['/', '\\']) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Map a filename extension to one of the supported MIME types.
pub fn infer_mime_type(filename: &str) -> Option<&'static str> {
    let mime = match extension(filename)?.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}

/// Declared type first, then extension inference, then magic bytes, then the generic binary type.
///
/// A declared `application/octet-stream` carries no information and is skipped.
pub fn resolve_mime_type(declared: Option<&str>, filename: &str, content: &[u8]) -> String {
    declared
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty() && m != FALLBACK_MIME_TYPE)
        .or_else(|| infer_mime_type(filename).map(str::to_string))
        .or_else(|| infer::get(content).map(|kind| kind.mime_type().to_string()))
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunked_encoding_matches_one_shot() {
        let data: Vec<u8> = (0..(ENCODE_CHUNK_SIZE * 2 + 7))
            .map(|i| (i * 31 % 251) as u8)
            .collect();
        assert_eq!(to_base64(&data), BASE64.encode(&data));
    }

    #[test]
    fn test_decode_then_reencode_reproduces_input() {
        for len in [0usize, 1, 2, 3, 4, 5, 1000] {
            let data: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let encoded = to_base64(&data);
            let decoded = from_base64(&encoded).unwrap();
            assert_eq!(to_base64(&decoded.bytes), encoded);
        }
    }

    #[test]
    fn test_from_base64_strips_data_uri_and_whitespace() {
        let decoded = from_base64("data:image/PNG;base64,aGVs\n bG8=").unwrap();
        assert_eq!(decoded.bytes, b"hello");
        assert_eq!(decoded.mime_type.as_deref(), Some("image/png"));

        let plain = from_base64("  aGVsbG8=  ").unwrap();
        assert_eq!(plain.bytes, b"hello");
        assert_eq!(plain.mime_type, None);
    }

    #[test]
    fn test_from_base64_rejects_garbage() {
        assert!(from_base64("not base64!!").is_err());
    }

    #[test]
    fn test_infer_mime_type() {
        assert_eq!(infer_mime_type("scan.JPG"), Some("image/jpeg"));
        assert_eq!(infer_mime_type("a.jpeg"), Some("image/jpeg"));
        assert_eq!(infer_mime_type("chart.png"), Some("image/png"));
        assert_eq!(infer_mime_type("x.gif"), Some("image/gif"));
        assert_eq!(infer_mime_type("x.bmp"), Some("image/bmp"));
        assert_eq!(infer_mime_type("x.webp"), Some("image/webp"));
        assert_eq!(infer_mime_type("report.final.pdf"), Some("application/pdf"));
        assert_eq!(infer_mime_type("notes.txt"), None);
        assert_eq!(infer_mime_type("upload"), None);
        assert_eq!(infer_mime_type("trailing."), None);
    }

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\x0dIHDR";

    #[test]
    fn test_resolve_mime_type_order() {
        assert_eq!(resolve_mime_type(Some("image/gif"), "a.png", PNG_MAGIC), "image/gif");
        assert_eq!(resolve_mime_type(None, "a.pdf", PNG_MAGIC), "application/pdf");
        assert_eq!(
            resolve_mime_type(Some("application/octet-stream"), "a.pdf", b""),
            "application/pdf"
        );
        assert_eq!(resolve_mime_type(None, "upload", PNG_MAGIC), "image/png");
        assert_eq!(resolve_mime_type(None, "upload", b"plain"), FALLBACK_MIME_TYPE);
        assert_eq!(resolve_mime_type(Some(" "), "upload", b""), FALLBACK_MIME_TYPE);
    }

    #[test]
    fn test_prepared_file_data_url() {
        let file = PreparedFile::new(b"hi", "a.png", None);
        assert_eq!(file.data_url(), "data:image/png;base64,aGk=");
    }
}
