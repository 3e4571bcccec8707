//! Archive-wide search and replace.

use crate::{
    errors::Error,
    store::{MessageArchive, MessageRecord},
    Result,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchRequest {
    /// Channel id key in the archive's `messages` map.
    pub channel: String,
    pub search: String,
    pub replace: String,
    pub case_sensitive: bool,
    pub dry_run: bool,
    pub allow_boundary_crossing: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchAction {
    Applied,
    /// Dry run: the change was computed but not written.
    WouldApply,
    SkippedBoundaryCrossing,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchItem {
    pub message_id: i64,
    pub action: BatchAction,
    pub matches: usize,
    pub links_rewritten: usize,
    pub before: String,
    pub after: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn applied(&self) -> usize {
        self.count(|a| matches!(a, BatchAction::Applied | BatchAction::WouldApply))
    }

    pub fn skipped(&self) -> usize {
        self.count(|a| matches!(a, BatchAction::SkippedBoundaryCrossing))
    }

    pub fn failed(&self) -> usize {
        self.count(|a| matches!(a, BatchAction::Failed(_)))
    }

    pub fn total_matches(&self) -> usize {
        self.items
            .iter()
            .filter(|i| !matches!(i.action, BatchAction::Failed(_)))
            .map(|i| i.matches)
            .sum()
    }

    fn count(&self, pred: impl Fn(&BatchAction) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.action)).count()
    }
}

/// Preview every message of the requested channel, in message id order, and
/// commit the ones that change.
///
/// A failure on one message is reported in its item and does not stop the
/// batch. An empty search term or an unknown channel fails the whole call
/// before any message is touched.
pub fn batch_replace(
    archive: &mut MessageArchive,
    request: &BatchRequest,
    now: &str,
) -> Result<BatchReport> {
    if request.search.is_empty() {
        return Err(Error::InvalidSearchTerm);
    }

    let mut records: Vec<&mut MessageRecord> =
        archive.channel_mut(&request.channel)?.values_mut().collect();
    records.sort_by_key(|r| r.id);

    let mut report = BatchReport::default();
    for record in records {
        let outcome = record.preview(&request.search, &request.replace, request.case_sensitive);
        let preview = match outcome {
            Ok(Some(preview)) => preview,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(message_id = record.id, error = %err, "replacement failed");
                report.items.push(BatchItem {
                    message_id: record.id,
                    action: BatchAction::Failed(err.to_string()),
                    matches: 0,
                    links_rewritten: 0,
                    before: record.raw_text.clone().unwrap_or_default(),
                    after: String::new(),
                });
                continue;
            }
        };

        let summary = &preview.outcome.summary;
        let action = if summary.has_boundary_crossing() && !request.allow_boundary_crossing {
            BatchAction::SkippedBoundaryCrossing
        } else if request.dry_run {
            BatchAction::WouldApply
        } else {
            record.commit(&preview, now)?;
            BatchAction::Applied
        };

        tracing::info!(
            message_id = record.id,
            matches = summary.match_count(),
            links = summary.links_rewritten,
            ?action,
            "message processed"
        );

        report.items.push(BatchItem {
            message_id: record.id,
            action,
            matches: summary.match_count(),
            links_rewritten: summary.links_rewritten,
            before: preview.markup_before(),
            after: preview.markup_after(),
        });
    }

    Ok(report)
}
