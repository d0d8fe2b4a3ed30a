use chardetng::EncodingDetector;
use encoding_rs::Encoding;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding_label: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decode bytes with {encoding}: {message}")]
    DecodeFailure { encoding: String, message: String },
}

/// Decode raw bytes into UTF-8 using: BOM -> charset parameter -> chardetng guess.
pub fn decode_text(bytes: &[u8], content_type: Option<&str>) -> Result<DecodedText, DecodeError> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(label) = content_type.and_then(extract_charset) {
        if let Some(enc) = Encoding::for_label(label.as_bytes()) {
            return decode_with(bytes, enc);
        }
    }

    // Editor buffers are UTF-8 in practice; skip detection when that holds.
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(DecodedText {
            text: text.to_string(),
            encoding_label: encoding_rs::UTF_8.name().to_string(),
        });
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    decode_with(bytes, enc)
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim_matches([' ', '"', '\''].as_ref()).to_string())
        })
        .next()
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> Result<DecodedText, DecodeError> {
    // decode() strips a matching BOM itself.
    let (text, _, had_errors) = enc.decode(bytes);
    if had_errors {
        return Err(DecodeError::DecodeFailure {
            encoding: enc.name().to_string(),
            message: "malformed byte sequence".into(),
        });
    }
    Ok(DecodedText {
        text: text.into_owned(),
        encoding_label: enc.name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{decode_text, extract_charset};

    #[test]
    fn plain_utf8_passes_through() {
        let decoded = decode_text("<p>é</p>".as_bytes(), None).unwrap();
        assert_eq!(decoded.text, "<p>é</p>");
        assert_eq!(decoded.encoding_label, "UTF-8");
    }

    #[test]
    fn bom_wins_over_charset() {
        let bytes = [0xEF, 0xBB, 0xBF, b'h', b'i'];
        let decoded = decode_text(&bytes, Some("text/css; charset=windows-1252")).unwrap();
        assert_eq!(decoded.text, "hi");
    }

    #[test]
    fn charset_parameter_is_honoured() {
        let decoded = decode_text(&[0x63, 0x61, 0x66, 0xE9], Some("text/css; Charset=\"latin1\"")).unwrap();
        assert_eq!(decoded.text, "café");
    }

    #[test]
    fn charset_extraction_is_case_insensitive() {
        assert_eq!(
            extract_charset("text/html; CHARSET=utf-8").as_deref(),
            Some("utf-8")
        );
        assert_eq!(extract_charset("text/html"), None);
    }
}
