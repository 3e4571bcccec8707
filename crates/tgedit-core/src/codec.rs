//! Neutral, storage-ready span records.
//!
//! `encode` writes the kind tag, offset, length and only the attributes the
//! kind defines. `decode` is its exact inverse for every known tag and also
//! reads the field and type names found in older Telethon-based
//! archives (`_type: "MessageEntityBold"`, `user_id`, `document_id`).

use serde::{Deserialize, Serialize};

use crate::{
    errors::Error,
    span::{FormattingSpan, SpanKind},
    Result,
};

/// Persisted form of a [`FormattingSpan`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRecord {
    #[serde(alias = "_type")]
    pub kind: String,
    pub offset: i64,
    pub length: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, alias = "user_id", skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<i64>,
    #[serde(
        default,
        alias = "document_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub emoji_ref: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
}

impl SpanRecord {
    fn bare(kind: &str, offset: i64, length: i64) -> Self {
        Self {
            kind: kind.to_string(),
            offset,
            length,
            url: None,
            language: None,
            user_ref: None,
            emoji_ref: None,
            collapsed: None,
        }
    }
}

pub fn encode(span: &FormattingSpan) -> SpanRecord {
    let mut record = SpanRecord::bare(
        span.kind.tag(),
        to_i64(span.offset),
        to_i64(span.length),
    );

    match &span.kind {
        SpanKind::Pre { language } => record.language = language.clone(),
        SpanKind::TextLink { url } => record.url = Some(url.clone()),
        SpanKind::MentionName { user_ref } => record.user_ref = Some(*user_ref),
        SpanKind::CustomEmoji { emoji_ref } => record.emoji_ref = Some(*emoji_ref),
        SpanKind::Blockquote { collapsed } => record.collapsed = Some(*collapsed),
        SpanKind::Bold
        | SpanKind::Italic
        | SpanKind::Strikethrough
        | SpanKind::Underline
        | SpanKind::Code
        | SpanKind::Url
        | SpanKind::Mention
        | SpanKind::Hashtag
        | SpanKind::Cashtag
        | SpanKind::BotCommand
        | SpanKind::Email
        | SpanKind::Phone
        | SpanKind::Spoiler
        | SpanKind::Unknown => {}
    }

    record
}

pub fn decode(record: &SpanRecord) -> Result<FormattingSpan> {
    let kind = match record.kind.as_str() {
        "bold" | "MessageEntityBold" => SpanKind::Bold,
        "italic" | "MessageEntityItalic" => SpanKind::Italic,
        "strikethrough" | "MessageEntityStrike" => SpanKind::Strikethrough,
        "underline" | "MessageEntityUnderline" => SpanKind::Underline,
        "code" | "MessageEntityCode" => SpanKind::Code,
        "pre" | "MessageEntityPre" => SpanKind::Pre {
            // Older archives store "" for a fence without a language.
            language: record.language.clone().filter(|l| !l.is_empty()),
        },
        "text_link" | "MessageEntityTextUrl" => SpanKind::TextLink {
            url: required(record, "url", record.url.clone().filter(|u| !u.is_empty()))?,
        },
        "url" | "MessageEntityUrl" => SpanKind::Url,
        "mention" | "MessageEntityMention" => SpanKind::Mention,
        "mention_name" | "MessageEntityMentionName" => SpanKind::MentionName {
            user_ref: required(record, "user_ref", record.user_ref)?,
        },
        "hashtag" | "MessageEntityHashtag" => SpanKind::Hashtag,
        "cashtag" | "MessageEntityCashtag" => SpanKind::Cashtag,
        "bot_command" | "MessageEntityBotCommand" => SpanKind::BotCommand,
        "email" | "MessageEntityEmail" => SpanKind::Email,
        "phone" | "MessageEntityPhone" => SpanKind::Phone,
        "blockquote" | "MessageEntityBlockquote" => SpanKind::Blockquote {
            collapsed: record.collapsed.unwrap_or(false),
        },
        "spoiler" | "MessageEntitySpoiler" => SpanKind::Spoiler,
        "custom_emoji" | "MessageEntityCustomEmoji" => SpanKind::CustomEmoji {
            emoji_ref: required(record, "emoji_ref", record.emoji_ref)?,
        },
        "unknown" | "MessageEntityUnknown" => SpanKind::Unknown,
        other => return Err(Error::UnsupportedSpanKind(other.to_string())),
    };

    let offset = usize::try_from(record.offset).map_err(|_| {
        Error::MalformedSpan(format!(
            "{} span has negative offset {}",
            record.kind, record.offset
        ))
    })?;
    let length = match usize::try_from(record.length) {
        Ok(len) if len > 0 => len,
        _ => {
            return Err(Error::MalformedSpan(format!(
                "{} span at {} has non-positive length {}",
                record.kind, record.offset, record.length
            )))
        }
    };

    let ignored = foreign_attributes(record, &kind);
    if !ignored.is_empty() {
        tracing::debug!(
            kind = %record.kind,
            ?ignored,
            "ignoring attributes not defined for span kind"
        );
    }

    Ok(FormattingSpan::new(offset, length, kind))
}

pub fn encode_all(spans: &[FormattingSpan]) -> Vec<SpanRecord> {
    spans.iter().map(encode).collect()
}

/// Strict decode: the first unsupported or malformed record fails the batch.
pub fn decode_all(records: &[SpanRecord]) -> Result<Vec<FormattingSpan>> {
    records.iter().map(decode).collect()
}

fn required<T>(record: &SpanRecord, attribute: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| {
        Error::MalformedSpan(format!(
            "{} span at {} is missing required attribute `{attribute}`",
            record.kind, record.offset
        ))
    })
}

fn foreign_attributes(record: &SpanRecord, kind: &SpanKind) -> Vec<&'static str> {
    let mut out = Vec::new();
    if record.url.is_some() && !matches!(kind, SpanKind::TextLink { .. }) {
        out.push("url");
    }
    if record.language.is_some() && !matches!(kind, SpanKind::Pre { .. }) {
        out.push("language");
    }
    if record.user_ref.is_some() && !matches!(kind, SpanKind::MentionName { .. }) {
        out.push("user_ref");
    }
    if record.emoji_ref.is_some() && !matches!(kind, SpanKind::CustomEmoji { .. }) {
        out.push("emoji_ref");
    }
    if record.collapsed.is_some() && !matches!(kind, SpanKind::Blockquote { .. }) {
        out.push("collapsed");
    }
    out
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn every_kind() -> Vec<SpanKind> {
        vec![
            SpanKind::Bold,
            SpanKind::Italic,
            SpanKind::Strikethrough,
            SpanKind::Underline,
            SpanKind::Code,
            SpanKind::Pre { language: None },
            SpanKind::Pre {
                language: Some("rust".to_string()),
            },
            SpanKind::TextLink {
                url: "https://example.com".to_string(),
            },
            SpanKind::Url,
            SpanKind::Mention,
            SpanKind::MentionName { user_ref: 42 },
            SpanKind::Hashtag,
            SpanKind::Cashtag,
            SpanKind::BotCommand,
            SpanKind::Email,
            SpanKind::Phone,
            SpanKind::Blockquote { collapsed: false },
            SpanKind::Blockquote { collapsed: true },
            SpanKind::Spoiler,
            SpanKind::CustomEmoji {
                emoji_ref: 5_368_324_170_671_202_286,
            },
            SpanKind::Unknown,
        ]
    }

    #[test]
    fn decode_inverts_encode_for_every_kind() {
        for kind in every_kind() {
            let span = FormattingSpan::new(3, 7, kind);
            let back = decode(&encode(&span)).unwrap();
            assert_eq!(back, span);
        }
    }

    #[test]
    fn survives_a_json_round_trip() {
        let spans: Vec<FormattingSpan> = every_kind()
            .into_iter()
            .enumerate()
            .map(|(i, kind)| FormattingSpan::new(i, 1, kind))
            .collect();
        let json = serde_json::to_string(&encode_all(&spans)).unwrap();
        let records: Vec<SpanRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(decode_all(&records).unwrap(), spans);
    }

    #[test]
    fn encode_emits_only_the_kind_attributes() {
        let v = serde_json::to_value(encode(&FormattingSpan::new(0, 2, SpanKind::Bold))).unwrap();
        assert_eq!(v, json!({"kind": "bold", "offset": 0, "length": 2}));

        let v = serde_json::to_value(encode(&FormattingSpan::new(
            1,
            4,
            SpanKind::TextLink {
                url: "https://a.b".to_string(),
            },
        )))
        .unwrap();
        assert_eq!(
            v,
            json!({"kind": "text_link", "offset": 1, "length": 4, "url": "https://a.b"})
        );
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let record: SpanRecord =
            serde_json::from_value(json!({"kind": "sparkle", "offset": 0, "length": 1})).unwrap();
        match decode(&record) {
            Err(Error::UnsupportedSpanKind(tag)) => assert_eq!(tag, "sparkle"),
            other => panic!("expected UnsupportedSpanKind, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_attribute_is_malformed() {
        for value in [
            json!({"kind": "text_link", "offset": 0, "length": 1}),
            json!({"kind": "text_link", "offset": 0, "length": 1, "url": ""}),
            json!({"kind": "mention_name", "offset": 0, "length": 1}),
            json!({"kind": "custom_emoji", "offset": 0, "length": 1}),
        ] {
            let record: SpanRecord = serde_json::from_value(value).unwrap();
            assert!(matches!(decode(&record), Err(Error::MalformedSpan(_))));
        }
    }

    #[test]
    fn negative_offset_and_empty_length_are_malformed() {
        let mut record = encode(&FormattingSpan::new(0, 1, SpanKind::Italic));
        record.offset = -1;
        assert!(matches!(decode(&record), Err(Error::MalformedSpan(_))));

        let mut record = encode(&FormattingSpan::new(0, 1, SpanKind::Italic));
        record.length = 0;
        assert!(matches!(decode(&record), Err(Error::MalformedSpan(_))));
    }

    #[test]
    fn reads_legacy_telethon_records() {
        let records: Vec<SpanRecord> = serde_json::from_value(json!([
            {"_type": "MessageEntityBold", "offset": 0, "length": 4},
            {"_type": "MessageEntityTextUrl", "offset": 5, "length": 3, "url": "https://x.y"},
            {"_type": "MessageEntityMentionName", "offset": 9, "length": 2, "user_id": 7},
            {"_type": "MessageEntityCustomEmoji", "offset": 12, "length": 2, "document_id": 99},
            {"_type": "MessageEntityPre", "offset": 14, "length": 3, "language": ""},
            {"_type": "MessageEntityBlockquote", "offset": 17, "length": 3}
        ]))
        .unwrap();

        let spans = decode_all(&records).unwrap();
        assert_eq!(spans[0].kind, SpanKind::Bold);
        assert_eq!(
            spans[1].kind,
            SpanKind::TextLink {
                url: "https://x.y".to_string()
            }
        );
        assert_eq!(spans[2].kind, SpanKind::MentionName { user_ref: 7 });
        assert_eq!(spans[3].kind, SpanKind::CustomEmoji { emoji_ref: 99 });
        assert_eq!(spans[4].kind, SpanKind::Pre { language: None });
        assert_eq!(spans[5].kind, SpanKind::Blockquote { collapsed: false });
    }

    #[test]
    fn foreign_attributes_are_ignored() {
        let record: SpanRecord = serde_json::from_value(
            json!({"kind": "bold", "offset": 0, "length": 1, "url": "https://x.y"}),
        )
        .unwrap();
        assert_eq!(
            decode(&record).unwrap(),
            FormattingSpan::new(0, 1, SpanKind::Bold)
        );
    }
}
