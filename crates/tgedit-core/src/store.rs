//! Message records as persisted in the JSON archive, and the glue between a
//! record and the replacement engine.
//!
//! Records from older Telethon-based archives are read unchanged: `entities`
//! and `text` are accepted for `spans` and `markup_text`, and every field this
//! crate does not model (sender, date, media...) is carried through verbatim.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    codec::{self, SpanRecord},
    errors::Error,
    markup,
    replace::{self, ReplaceOutcome},
    text::RichText,
    Result,
};

pub const SEARCH_REPLACE_ACTION: &str = "search_replace";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EditHistoryEntry {
    pub date: String,
    pub action: String,
    pub search: String,
    pub replace: String,
    #[serde(default)]
    pub original_raw_text: String,
    #[serde(default, alias = "original_entities")]
    pub original_spans: Vec<SpanRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default, alias = "entities", skip_serializing_if = "Option::is_none")]
    pub spans: Option<Vec<SpanRecord>>,
    /// Legacy markdown rendering; also refreshed on every commit for display.
    #[serde(default, alias = "text", skip_serializing_if = "Option::is_none")]
    pub markup_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edit_history: Vec<EditHistoryEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A replacement computed for one record but not yet written to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preview {
    pub message_id: i64,
    pub search: String,
    pub replace: String,
    pub original: RichText,
    pub outcome: ReplaceOutcome,
}

impl Preview {
    pub fn markup_before(&self) -> String {
        markup::unparse(&self.original)
    }

    pub fn markup_after(&self) -> String {
        markup::unparse(&self.outcome.rich_text)
    }
}

impl MessageRecord {
    pub fn new(id: i64, rich: &RichText) -> Self {
        Self {
            id,
            raw_text: Some(rich.text().to_string()),
            spans: Some(codec::encode_all(rich.spans())),
            markup_text: None,
            last_update: None,
            edit_history: Vec::new(),
            extra: Map::new(),
        }
    }

    /// The record's rich text: native spans when stored, else the legacy
    /// markdown run through the adapter, else the raw text unformatted.
    ///
    /// Spans of kinds this crate does not know are dropped with a warning;
    /// any other undecodable span fails the record.
    pub fn rich_text(&self) -> Result<RichText> {
        if let (Some(raw), Some(records)) = (&self.raw_text, &self.spans) {
            let mut spans = Vec::with_capacity(records.len());
            for record in records {
                match codec::decode(record) {
                    Ok(span) => spans.push(span),
                    Err(Error::UnsupportedSpanKind(tag)) => {
                        tracing::warn!(
                            message_id = self.id,
                            %tag,
                            "dropping span of unsupported kind"
                        );
                    }
                    Err(err) => return Err(err),
                }
            }
            return RichText::new(raw.as_str(), spans);
        }

        if let Some(markup_text) = self.markup_text.as_deref().filter(|m| !m.is_empty()) {
            return Ok(markup::parse(markup_text));
        }

        Ok(RichText::plain(self.raw_text.clone().unwrap_or_default()))
    }

    /// Run the engine against this record. `None` when nothing would change.
    pub fn preview(
        &self,
        search: &str,
        replace: &str,
        case_sensitive: bool,
    ) -> Result<Option<Preview>> {
        let original = self.rich_text()?;
        let outcome = replace::replace(&original, search, replace, case_sensitive)?;
        if outcome.rich_text == original {
            return Ok(None);
        }
        Ok(Some(Preview {
            message_id: self.id,
            search: search.to_string(),
            replace: replace.to_string(),
            original,
            outcome,
        }))
    }

    /// Write a preview into the record, keeping the previous text and spans in
    /// `edit_history`.
    pub fn commit(&mut self, preview: &Preview, now: &str) -> Result<()> {
        if preview.message_id != self.id {
            return Err(Error::MessageNotFound(preview.message_id));
        }

        let original_spans = match &self.spans {
            Some(stored) => stored.clone(),
            None => codec::encode_all(preview.original.spans()),
        };
        self.edit_history.push(EditHistoryEntry {
            date: now.to_string(),
            action: SEARCH_REPLACE_ACTION.to_string(),
            search: preview.search.clone(),
            replace: preview.replace.clone(),
            original_raw_text: preview.original.text().to_string(),
            original_spans,
            extra: Map::new(),
        });

        let updated = &preview.outcome.rich_text;
        self.raw_text = Some(updated.text().to_string());
        self.spans = Some(codec::encode_all(updated.spans()));
        self.markup_text = Some(markup::unparse(updated));
        self.last_update = Some(now.to_string());
        Ok(())
    }
}

/// Messages of one channel, keyed by message id as a decimal string.
pub type ChannelMessages = BTreeMap<String, MessageRecord>;

/// The JSON database: `messages[channel_id][message_id]`, plus whatever else
/// the archiver keeps next to it (`active_channel`, sessions, users...).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageArchive {
    #[serde(default)]
    pub messages: BTreeMap<String, ChannelMessages>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessageArchive {
    /// Missing or empty files load as an empty archive.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let txt = std::fs::read_to_string(path)?;
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        let archive: Self = serde_json::from_str(&txt)?;
        tracing::debug!(
            path = %path.display(),
            channels = archive.messages.len(),
            "loaded archive"
        );
        Ok(archive)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let txt = serde_json::to_string_pretty(self)?;
        std::fs::write(path, txt)?;
        Ok(())
    }

    /// Id of the channel recorded as `active_channel.id`, if any.
    pub fn active_channel(&self) -> Option<String> {
        match self.extra.get("active_channel")?.get("id")? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// Pick the channel to work on: the requested one, else the active one,
    /// else the only channel in the archive.
    pub fn resolve_channel(&self, requested: Option<&str>) -> Result<String> {
        if let Some(channel) = requested {
            if !self.messages.contains_key(channel) {
                return Err(Error::ChannelNotFound(channel.to_string()));
            }
            return Ok(channel.to_string());
        }
        if let Some(active) = self.active_channel() {
            if self.messages.contains_key(&active) {
                return Ok(active);
            }
        }
        let mut channels = self.messages.keys();
        match (channels.next(), channels.next()) {
            (Some(only), None) => Ok(only.clone()),
            _ => Err(Error::NoChannelSelected),
        }
    }

    pub fn channel(&self, channel: &str) -> Result<&ChannelMessages> {
        self.messages
            .get(channel)
            .ok_or_else(|| Error::ChannelNotFound(channel.to_string()))
    }

    pub fn channel_mut(&mut self, channel: &str) -> Result<&mut ChannelMessages> {
        self.messages
            .get_mut(channel)
            .ok_or_else(|| Error::ChannelNotFound(channel.to_string()))
    }

    pub fn insert(&mut self, channel: &str, record: MessageRecord) {
        self.messages
            .entry(channel.to_string())
            .or_default()
            .insert(record.id.to_string(), record);
    }

    pub fn get(&self, channel: &str, id: i64) -> Option<&MessageRecord> {
        self.messages.get(channel)?.get(&id.to_string())
    }

    pub fn get_mut(&mut self, channel: &str, id: i64) -> Option<&mut MessageRecord> {
        self.messages.get_mut(channel)?.get_mut(&id.to_string())
    }

    pub fn require(&self, channel: &str, id: i64) -> Result<&MessageRecord> {
        self.channel(channel)?
            .get(&id.to_string())
            .ok_or(Error::MessageNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{FormattingSpan, SpanKind};
    use serde_json::json;
    use std::path::PathBuf;

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.json"))
    }

    fn legacy_record() -> MessageRecord {
        serde_json::from_value(json!({
            "id": 101,
            "date": "2024-03-01T10:00:00+00:00",
            "sender_id": 5,
            "raw_text": "Read the docs at example.com",
            "text": "Read the **docs** at [example.com](https://example.com/docs)",
            "entities": [
                {"_type": "MessageEntityBold", "offset": 9, "length": 4},
                {
                    "_type": "MessageEntityTextUrl",
                    "offset": 17,
                    "length": 11,
                    "url": "https://example.com/docs"
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn native_spans_win_over_markup() {
        let record = legacy_record();
        let rich = record.rich_text().unwrap();
        assert_eq!(rich.text(), "Read the docs at example.com");
        assert_eq!(rich.spans().len(), 2);
        assert_eq!(record.extra.get("sender_id"), Some(&json!(5)));
    }

    #[test]
    fn falls_back_to_markup_then_raw_text() {
        let record: MessageRecord = serde_json::from_value(json!({
            "id": 1,
            "raw_text": null,
            "text": "**hi** there"
        }))
        .unwrap();
        let rich = record.rich_text().unwrap();
        assert_eq!(rich.text(), "hi there");
        assert_eq!(rich.spans(), &[FormattingSpan::new(0, 2, SpanKind::Bold)]);

        let record: MessageRecord =
            serde_json::from_value(json!({"id": 2, "raw_text": "plain"})).unwrap();
        assert_eq!(record.rich_text().unwrap(), RichText::plain("plain"));
    }

    #[test]
    fn unsupported_spans_are_dropped_but_malformed_fail() {
        let record: MessageRecord = serde_json::from_value(json!({
            "id": 3,
            "raw_text": "hello",
            "spans": [
                {"kind": "future_thing", "offset": 0, "length": 5},
                {"kind": "italic", "offset": 1, "length": 2}
            ]
        }))
        .unwrap();
        assert_eq!(
            record.rich_text().unwrap().spans(),
            &[FormattingSpan::new(1, 2, SpanKind::Italic)]
        );

        let record: MessageRecord = serde_json::from_value(json!({
            "id": 4,
            "raw_text": "hello",
            "spans": [{"kind": "text_link", "offset": 0, "length": 5}]
        }))
        .unwrap();
        assert!(matches!(record.rich_text(), Err(Error::MalformedSpan(_))));
    }

    #[test]
    fn preview_is_none_without_changes() {
        let record = legacy_record();
        assert!(record.preview("absent", "x", true).unwrap().is_none());
        assert!(record.preview("docs", "docs", true).unwrap().is_none());
    }

    #[test]
    fn commit_records_history_and_rewrites_fields() {
        let mut record = legacy_record();
        let preview = record
            .preview("example.com", "site.org", true)
            .unwrap()
            .unwrap();
        assert_eq!(
            preview.markup_after(),
            "Read the **docs** at [site.org](https://site.org/docs)"
        );

        record.commit(&preview, "2024-05-01T00:00:00+00:00").unwrap();

        assert_eq!(record.raw_text.as_deref(), Some("Read the docs at site.org"));
        assert_eq!(
            record.markup_text.as_deref(),
            Some("Read the **docs** at [site.org](https://site.org/docs)")
        );
        assert_eq!(record.last_update.as_deref(), Some("2024-05-01T00:00:00+00:00"));

        let entry = &record.edit_history[0];
        assert_eq!(entry.action, SEARCH_REPLACE_ACTION);
        assert_eq!(entry.search, "example.com");
        assert_eq!(entry.original_raw_text, "Read the docs at example.com");
        assert_eq!(entry.original_spans[0].kind, "MessageEntityBold");

        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(
            v["spans"][1],
            json!({"kind": "text_link", "offset": 17, "length": 8, "url": "https://site.org/docs"})
        );
        assert_eq!(v["date"], json!("2024-03-01T10:00:00+00:00"));
        assert!(v.get("entities").is_none());
    }

    #[test]
    fn commit_rejects_foreign_preview() {
        let mut a = legacy_record();
        let mut b = legacy_record();
        b.id = 202;
        let preview = b.preview("docs", "guides", true).unwrap().unwrap();
        assert!(matches!(
            a.commit(&preview, "now"),
            Err(Error::MessageNotFound(202))
        ));
    }

    #[test]
    fn archive_round_trips_through_disk() {
        let path = tmp("tgedit-archive");
        assert_eq!(MessageArchive::load(&path).unwrap(), MessageArchive::default());

        let mut archive = MessageArchive::default();
        archive.insert("-100", legacy_record());
        archive
            .extra
            .insert("active_channel".to_string(), json!({"id": -100, "title": "news"}));
        archive.save(&path).unwrap();

        let loaded = MessageArchive::load(&path).unwrap();
        assert_eq!(loaded.channel("-100").unwrap().len(), 1);
        assert_eq!(loaded.require("-100", 101).unwrap().id, 101);
        assert!(matches!(loaded.require("-100", 7), Err(Error::MessageNotFound(7))));
        assert!(matches!(loaded.require("-5", 101), Err(Error::ChannelNotFound(_))));
        assert_eq!(loaded.extra["active_channel"]["title"], json!("news"));
        assert_eq!(
            loaded.get("-100", 101).unwrap().rich_text().unwrap(),
            archive.get("-100", 101).unwrap().rich_text().unwrap()
        );

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn loads_commits_and_saves_nested_channel_database() {
        let path = tmp("tgedit-nested");
        let db = json!({
            "sessions": {"+100": {"last_used": "2024-01-01"}},
            "active_channel": {"id": -100, "title": "news", "type": "channel"},
            "messages": {
                "-100": {
                    "7": {
                        "id": 7,
                        "views": 42,
                        "raw_text": "old news",
                        "entities": [{"_type": "MessageEntityBold", "offset": 0, "length": 3}]
                    },
                    "8": {"id": 8, "raw_text": "fresh", "entities": []}
                },
                "-200": {"1": {"id": 1, "raw_text": "old times"}}
            }
        });
        std::fs::write(&path, serde_json::to_string(&db).unwrap()).unwrap();

        let mut archive = MessageArchive::load(&path).unwrap();
        let channel = archive.resolve_channel(None).unwrap();
        assert_eq!(channel, "-100");

        let record = archive.get_mut(&channel, 7).unwrap();
        let preview = record.preview("old", "new", true).unwrap().unwrap();
        record.commit(&preview, "2024-05-01T00:00:00+00:00").unwrap();
        archive.save(&path).unwrap();

        let v: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let saved = &v["messages"]["-100"]["7"];
        assert_eq!(saved["raw_text"], json!("new news"));
        assert_eq!(saved["views"], json!(42));
        assert_eq!(saved["spans"][0], json!({"kind": "bold", "offset": 0, "length": 3}));
        assert_eq!(saved["edit_history"][0]["original_raw_text"], json!("old news"));
        assert_eq!(v["messages"]["-200"]["1"]["raw_text"], json!("old times"));
        assert_eq!(v["sessions"]["+100"]["last_used"], json!("2024-01-01"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn resolves_channel_from_request_active_or_single() {
        let mut archive = MessageArchive::default();
        assert!(matches!(archive.resolve_channel(None), Err(Error::NoChannelSelected)));

        archive.insert("-1", legacy_record());
        assert_eq!(archive.resolve_channel(None).unwrap(), "-1");

        archive.insert("-2", legacy_record());
        assert!(matches!(archive.resolve_channel(None), Err(Error::NoChannelSelected)));
        assert_eq!(archive.resolve_channel(Some("-2")).unwrap(), "-2");
        assert!(matches!(
            archive.resolve_channel(Some("-3")),
            Err(Error::ChannelNotFound(_))
        ));

        archive
            .extra
            .insert("active_channel".to_string(), json!({"id": "-2"}));
        assert_eq!(archive.resolve_channel(None).unwrap(), "-2");
    }
}
