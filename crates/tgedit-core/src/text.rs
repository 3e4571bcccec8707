//! Rich text values and UTF-16 helpers.
//!
//! Telegram measures entity offsets in UTF-16 code units, so every position in
//! this crate is a UTF-16 index into the text, never a byte or char index.

use widestring::Utf16String;

use crate::{errors::Error, span::FormattingSpan, Result};

/// Immutable plain text plus its formatting spans.
///
/// Spans are validated on construction and stored sorted with duplicates
/// collapsed, so equality is "same text, same set of spans".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RichText {
    text: String,
    spans: Vec<FormattingSpan>,
}

impl RichText {
    pub fn new(
        text: impl Into<String>,
        spans: impl IntoIterator<Item = FormattingSpan>,
    ) -> Result<Self> {
        let text = text.into();
        let len = utf16_len(&text);
        let mut spans: Vec<FormattingSpan> = spans.into_iter().collect();
        for span in &spans {
            span.validate(len)?;
        }
        spans.sort();
        spans.dedup();
        Ok(Self { text, spans })
    }

    /// Text without any formatting.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            spans: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn spans(&self) -> &[FormattingSpan] {
        &self.spans
    }

    pub fn utf16_len(&self) -> usize {
        utf16_len(&self.text)
    }

    pub fn is_plain(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn into_parts(self) -> (String, Vec<FormattingSpan>) {
        (self.text, self.spans)
    }
}

pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

pub fn to_utf16(text: &str) -> Utf16String {
    Utf16String::from_str(text)
}

/// Decode UTF-16 units, reporting the first unpaired surrogate as an
/// [`Error::EncodingMismatch`].
pub fn from_utf16(units: &[u16]) -> Result<String> {
    let mut out = String::with_capacity(units.len());
    let mut at = 0usize;
    for decoded in char::decode_utf16(units.iter().copied()) {
        match decoded {
            Ok(c) => {
                out.push(c);
                at += c.len_utf16();
            }
            Err(_) => return Err(Error::EncodingMismatch { offset: at }),
        }
    }
    Ok(out)
}

/// True when `index` falls between the two halves of a surrogate pair.
pub fn splits_surrogate_pair(units: &[u16], index: usize) -> bool {
    index > 0
        && index < units.len()
        && is_high_surrogate(units[index - 1])
        && is_low_surrogate(units[index])
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}
