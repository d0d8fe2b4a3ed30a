/// Fallback type for names the container declares no type for.
pub const DEFAULT_MIME: &str = "application/octet-stream";

const DOCUMENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

const FONT_TYPES: &[&str] = &[
    "application/x-font-ttf",
    "application/x-font-truetype",
    "application/x-font-opentype",
    "application/x-font-otf",
    "application/font-sfnt",
    "application/vnd.ms-opentype",
    "application/font-woff",
    "application/x-font-woff",
    "font/ttf",
    "font/otf",
    "font/sfnt",
    "font/woff",
    "font/woff2",
];

/// How the router serves a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeKind {
    /// Markup that goes through the annotate transform before it is served.
    Document,
    Stylesheet,
    Script,
    Font,
    Image,
    Other,
}

impl MimeKind {
    pub fn from_mime(mime: &str) -> Self {
        let essence = essence(mime);
        if DOCUMENT_TYPES.iter().any(|t| t.eq_ignore_ascii_case(&essence)) {
            MimeKind::Document
        } else if FONT_TYPES.iter().any(|t| t.eq_ignore_ascii_case(&essence)) {
            MimeKind::Font
        } else if essence == "text/css" {
            MimeKind::Stylesheet
        } else if essence.contains("javascript") || essence.contains("ecmascript") {
            MimeKind::Script
        } else if essence.starts_with("image/") {
            MimeKind::Image
        } else {
            MimeKind::Other
        }
    }

    pub fn is_document(self) -> bool {
        self == MimeKind::Document
    }
}

/// Whether payloads of this type are text that should be served as UTF-8.
pub fn is_textual_mime(mime: &str) -> bool {
    let essence = essence(mime);
    essence.starts_with("text/")
        || essence.ends_with("+xml")
        || essence.ends_with("/xml")
        || essence.contains("javascript")
        || essence.contains("ecmascript")
        || essence.ends_with("/json")
}

fn essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or(mime)
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{is_textual_mime, MimeKind};

    #[test]
    fn classifies_markup_as_document() {
        assert_eq!(MimeKind::from_mime("text/html"), MimeKind::Document);
        assert_eq!(
            MimeKind::from_mime("application/xhtml+xml; charset=utf-8"),
            MimeKind::Document
        );
    }

    #[test]
    fn classifies_fonts_case_insensitively() {
        assert_eq!(MimeKind::from_mime("application/x-font-TTF"), MimeKind::Font);
        assert_eq!(MimeKind::from_mime("font/woff2"), MimeKind::Font);
    }

    #[test]
    fn classifies_remaining_kinds() {
        assert_eq!(MimeKind::from_mime("text/css"), MimeKind::Stylesheet);
        assert_eq!(MimeKind::from_mime("application/javascript"), MimeKind::Script);
        assert_eq!(MimeKind::from_mime("image/png"), MimeKind::Image);
        assert_eq!(MimeKind::from_mime("application/octet-stream"), MimeKind::Other);
    }

    #[test]
    fn textual_types() {
        assert!(is_textual_mime("text/css"));
        assert!(is_textual_mime("image/svg+xml"));
        assert!(is_textual_mime("application/x-dtbncx+xml"));
        assert!(is_textual_mime("text/javascript"));
        assert!(!is_textual_mime("image/jpeg"));
        assert!(!is_textual_mime("font/otf"));
    }
}
