//! Formatting spans: one annotation over a UTF-16 range of a message text.

use crate::{errors::Error, Result};

/// The closed set of formatting kinds, with kind-specific attributes carried
/// by the variant that needs them.
///
/// Variant order is the tie-breaker when two spans share offset and length.
/// It only makes output deterministic and implies no priority.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpanKind {
    Bold,
    Italic,
    Strikethrough,
    Underline,
    Code,
    Pre { language: Option<String> },
    TextLink { url: String },
    Url,
    Mention,
    MentionName { user_ref: i64 },
    Hashtag,
    Cashtag,
    BotCommand,
    Email,
    Phone,
    Blockquote { collapsed: bool },
    Spoiler,
    CustomEmoji { emoji_ref: i64 },
    /// Opaque kind reported by a newer source; kept so it is not silently lost.
    Unknown,
}

impl SpanKind {
    /// Stable tag used in persisted span records.
    pub fn tag(&self) -> &'static str {
        match self {
            SpanKind::Bold => "bold",
            SpanKind::Italic => "italic",
            SpanKind::Strikethrough => "strikethrough",
            SpanKind::Underline => "underline",
            SpanKind::Code => "code",
            SpanKind::Pre { .. } => "pre",
            SpanKind::TextLink { .. } => "text_link",
            SpanKind::Url => "url",
            SpanKind::Mention => "mention",
            SpanKind::MentionName { .. } => "mention_name",
            SpanKind::Hashtag => "hashtag",
            SpanKind::Cashtag => "cashtag",
            SpanKind::BotCommand => "bot_command",
            SpanKind::Email => "email",
            SpanKind::Phone => "phone",
            SpanKind::Blockquote { .. } => "blockquote",
            SpanKind::Spoiler => "spoiler",
            SpanKind::CustomEmoji { .. } => "custom_emoji",
            SpanKind::Unknown => "unknown",
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self, SpanKind::TextLink { .. })
    }
}

/// A formatting annotation over `[offset, offset + length)` in UTF-16 code units.
///
/// Ordering is `(offset, length, kind)`, which is the canonical order spans
/// are stored in inside a [`crate::text::RichText`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormattingSpan {
    pub offset: usize,
    pub length: usize,
    pub kind: SpanKind,
}

impl FormattingSpan {
    pub fn new(offset: usize, length: usize, kind: SpanKind) -> Self {
        Self {
            offset,
            length,
            kind,
        }
    }

    /// Exclusive end offset (saturating, so it is usable before validation).
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.length)
    }

    /// Check the span against a text of `text_len` UTF-16 units.
    pub fn validate(&self, text_len: usize) -> Result<()> {
        let tag = self.kind.tag();

        if self.length == 0 {
            return Err(Error::MalformedSpan(format!(
                "{tag} span at {} has zero length",
                self.offset
            )));
        }

        match self.offset.checked_add(self.length) {
            Some(end) if end <= text_len => {}
            _ => {
                return Err(Error::MalformedSpan(format!(
                    "{tag} span [{}, +{}) exceeds text length {text_len}",
                    self.offset, self.length
                )))
            }
        }

        match &self.kind {
            SpanKind::TextLink { url } if url.trim().is_empty() => Err(Error::MalformedSpan(
                format!("text_link span at {} has no url", self.offset),
            )),
            SpanKind::Pre {
                language: Some(language),
            } if language.is_empty() => Err(Error::MalformedSpan(format!(
                "pre span at {} has an empty language tag",
                self.offset
            ))),
            _ => Ok(()),
        }
    }
}
