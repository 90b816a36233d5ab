//! Line-ending detection and restoration.
//!
//! The pipeline works on LF internally and restores the source convention
//! on the assembled output.

/// Line-ending convention of a source document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// Any CRLF in the text marks the whole document as CRLF.
    pub fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            Self::CrLf
        } else {
            Self::Lf
        }
    }

    /// Rewrite LF-normalized text into this convention.
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Lf => text.to_string(),
            Self::CrLf => text.replace('\n', "\r\n"),
        }
    }
}

/// Convert CRLF to LF.
pub fn to_lf(text: &str) -> String {
    text.replace("\r\n", "\n")
}
