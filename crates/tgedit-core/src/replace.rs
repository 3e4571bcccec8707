//! Literal search-and-replace that keeps formatting spans attached to the
//! characters they annotate.
//!
//! Matches are found left to right in the original text and never overlap;
//! replacement text is not scanned again. Each match is applied in one pass:
//! the text is rewritten at the match position shifted by the length change of
//! all earlier matches, and every surviving span is reclassified against that
//! shifted window:
//!
//! | case | condition | effect |
//! |---|---|---|
//! | before | `span_end <= start` | unchanged |
//! | after | `span_start >= end` | `offset += delta` |
//! | contains | `span_start <= start && span_end >= end` | `length += delta` |
//! | head cut | `start < span_start < end` | moved behind the replacement, overlap removed |
//! | tail cut | `start < span_end <= end` | overlap removed |
//!
//! Head and tail cuts mark the match as boundary-crossing. Spans left with no
//! characters are dropped. Text-link urls get the same literal replacement,
//! under the same case rule as the text, independent of offsets.

use crate::{
    errors::Error,
    span::{FormattingSpan, SpanKind},
    text::{from_utf16, splits_surrogate_pair, to_utf16, RichText},
    Result,
};

/// One match, in UTF-16 units of the original text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchReport {
    pub start: usize,
    pub end: usize,
    /// A span had its start or end inside the matched range and was cut.
    pub boundary_crossing: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub matches: Vec<MatchReport>,
    /// Text-link spans whose url changed.
    pub links_rewritten: usize,
}

impl ChangeSummary {
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.matches.is_empty() || self.links_rewritten > 0
    }

    pub fn has_boundary_crossing(&self) -> bool {
        self.matches.iter().any(|m| m.boundary_crossing)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub rich_text: RichText,
    pub summary: ChangeSummary,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Overlap {
    Before,
    After,
    Contains,
    HeadCut,
    TailCut,
}

#[derive(Clone, Debug)]
struct WorkingSpan {
    offset: i64,
    length: i64,
    kind: SpanKind,
}

/// The match window in the coordinates of the partially rewritten text.
#[derive(Clone, Copy, Debug)]
struct Window {
    start: i64,
    end: i64,
    replace_len: i64,
}

impl Window {
    fn delta(&self) -> i64 {
        self.replace_len - (self.end - self.start)
    }

    fn classify(&self, span: &WorkingSpan) -> Overlap {
        let span_end = span.offset + span.length;
        if span_end <= self.start {
            Overlap::Before
        } else if span.offset >= self.end {
            Overlap::After
        } else if span.offset <= self.start && span_end >= self.end {
            Overlap::Contains
        } else if self.start < span.offset && span.offset < self.end {
            Overlap::HeadCut
        } else {
            Overlap::TailCut
        }
    }

    fn apply(&self, span: WorkingSpan) -> (WorkingSpan, Overlap) {
        let overlap = self.classify(&span);
        let adjusted = match overlap {
            Overlap::Before => span,
            Overlap::After => WorkingSpan {
                offset: span.offset + self.delta(),
                ..span
            },
            Overlap::Contains => WorkingSpan {
                length: span.length + self.delta(),
                ..span
            },
            Overlap::HeadCut => WorkingSpan {
                offset: self.start + self.replace_len,
                length: (span.length - (self.end - span.offset)).max(0),
                ..span
            },
            Overlap::TailCut => WorkingSpan {
                length: (span.length - (span.offset + span.length - self.start)).max(0),
                ..span
            },
        };
        (adjusted, overlap)
    }
}

/// Replace every literal occurrence of `search` with `replacement`.
///
/// With `case_sensitive == false` the comparison ignores case but the
/// replacement is inserted exactly as given; it never takes on the casing of
/// the text it replaces.
pub fn replace(
    rich: &RichText,
    search: &str,
    replacement: &str,
    case_sensitive: bool,
) -> Result<ReplaceOutcome> {
    if search.is_empty() {
        return Err(Error::InvalidSearchTerm);
    }

    let haystack = to_utf16(rich.text());
    let units = haystack.as_slice();
    let needle = to_utf16(search);
    let substitute = to_utf16(replacement);
    let substitute = substitute.as_slice();

    let found = if case_sensitive {
        find_matches(units, needle.as_slice())
    } else {
        find_matches(&fold_case(rich.text()), &fold_case(search))
    };

    let mut spans: Vec<WorkingSpan> = rich
        .spans()
        .iter()
        .map(|s| WorkingSpan {
            offset: s.offset as i64,
            length: s.length as i64,
            kind: s.kind.clone(),
        })
        .collect();

    let mut summary = ChangeSummary::default();
    let text = if found.is_empty() {
        rich.text().to_string()
    } else {
        check_boundaries(units, &found, rich.spans())?;

        let mut out: Vec<u16> = Vec::with_capacity(units.len());
        let mut cursor = 0usize;
        let mut shift = 0i64;

        for &(start, end) in &found {
            out.extend_from_slice(&units[cursor..start]);
            out.extend_from_slice(substitute);
            cursor = end;

            let mut crossing = false;
            // An occurrence already equal to its replacement changes nothing.
            if &units[start..end] != substitute {
                let window = Window {
                    start: start as i64 + shift,
                    end: end as i64 + shift,
                    replace_len: substitute.len() as i64,
                };
                let mut next = Vec::with_capacity(spans.len());
                for span in spans {
                    let (adjusted, overlap) = window.apply(span);
                    if matches!(overlap, Overlap::HeadCut | Overlap::TailCut) {
                        crossing = true;
                        tracing::debug!(
                            kind = adjusted.kind.tag(),
                            match_start = start,
                            ?overlap,
                            "span cut by replacement"
                        );
                    }
                    if adjusted.length > 0 {
                        next.push(adjusted);
                    }
                }
                spans = next;
                shift += window.delta();
            }

            summary.matches.push(MatchReport {
                start,
                end,
                boundary_crossing: crossing,
            });
        }
        out.extend_from_slice(&units[cursor..]);
        from_utf16(&out)?
    };

    let mut result = Vec::with_capacity(spans.len());
    for span in spans {
        if span.length <= 0 {
            continue;
        }
        let kind = match span.kind {
            SpanKind::TextLink { url } => {
                let rewritten = rewrite_url(&url, search, replacement, case_sensitive)?;
                if rewritten != url {
                    summary.links_rewritten += 1;
                }
                SpanKind::TextLink { url: rewritten }
            }
            other => other,
        };
        result.push(FormattingSpan::new(
            span.offset as usize,
            span.length as usize,
            kind,
        ));
    }

    let rich_text = RichText::new(text, result)?;
    if summary.has_changes() {
        tracing::debug!(
            matches = summary.match_count(),
            links = summary.links_rewritten,
            crossing = summary.has_boundary_crossing(),
            "replacement applied"
        );
    }

    Ok(ReplaceOutcome { rich_text, summary })
}

fn find_matches(haystack: &[u16], needle: &[u16]) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    if needle.is_empty() {
        return found;
    }
    let mut i = 0usize;
    while i + needle.len() <= haystack.len() {
        if haystack[i..i + needle.len()] == *needle {
            found.push((i, i + needle.len()));
            i += needle.len();
        } else {
            i += 1;
        }
    }
    found
}

/// Lowercase each char, keeping its UTF-16 width so positions in the folded
/// text are positions in the original.
fn fold_case(text: &str) -> Vec<u16> {
    let mut out = Vec::with_capacity(text.len());
    let mut buf = [0u16; 2];
    for c in text.chars() {
        let mut lower = c.to_lowercase();
        let folded = match (lower.next(), lower.next()) {
            (Some(l), None) if l.len_utf16() == c.len_utf16() => l,
            _ => c,
        };
        out.extend_from_slice(folded.encode_utf16(&mut buf));
    }
    out
}

/// Literal replacement inside a text-link url, matched exactly like the text.
fn rewrite_url(url: &str, search: &str, replacement: &str, case_sensitive: bool) -> Result<String> {
    if case_sensitive {
        return Ok(url.replace(search, replacement));
    }
    let found = find_matches(&fold_case(url), &fold_case(search));
    if found.is_empty() {
        return Ok(url.to_string());
    }
    let units = to_utf16(url);
    let units = units.as_slice();
    let substitute = to_utf16(replacement);
    let mut out = Vec::with_capacity(units.len());
    let mut cursor = 0usize;
    for (start, end) in found {
        out.extend_from_slice(&units[cursor..start]);
        out.extend_from_slice(substitute.as_slice());
        cursor = end;
    }
    out.extend_from_slice(&units[cursor..]);
    from_utf16(&out)
}

fn check_boundaries(
    units: &[u16],
    found: &[(usize, usize)],
    spans: &[FormattingSpan],
) -> Result<()> {
    let boundaries = found
        .iter()
        .flat_map(|&(start, end)| [start, end])
        .chain(spans.iter().flat_map(|s| [s.offset, s.end()]));
    for offset in boundaries {
        if splits_surrogate_pair(units, offset) {
            return Err(Error::EncodingMismatch { offset });
        }
    }
    Ok(())
}
