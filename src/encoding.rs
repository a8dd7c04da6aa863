//! Base64 data URIs for the captioning request

use crate::source::SourceFile;
use base64::{engine::general_purpose, Engine as _};

/// Encode a source file as `data:<mime>;base64,<payload>`
pub fn to_data_uri(source: &SourceFile) -> String {
    format!(
        "data:{};base64,{}",
        source.mime_type(),
        general_purpose::STANDARD.encode(source.data())
    )
}

/// The part of a data URI after the first comma.
///
/// A string without a comma is returned unchanged.
pub fn payload(data_uri: &str) -> &str {
    data_uri.split_once(',').map(|(_, data)| data).unwrap_or(data_uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uri_prefix_and_payload() {
        let source = SourceFile::new("a.png", "image/png", b"hello".to_vec());
        let uri = to_data_uri(&source);

        assert_eq!(uri, "data:image/png;base64,aGVsbG8=");
        assert_eq!(payload(&uri), "aGVsbG8=");
        assert_eq!(general_purpose::STANDARD.decode(payload(&uri)).unwrap(), b"hello");
    }

    #[test]
    fn test_payload_without_prefix() {
        assert_eq!(payload("aGVsbG8="), "aGVsbG8=");
    }
}
