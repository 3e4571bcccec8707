//! Legacy markdown adapter: recover spans from Telegram-style markdown when a
//! message has no native entity data, and re-derive markdown for display.
//!
//! Supported syntax:
//! - `**bold**`, `__italic__`, `~~strike~~`, `--underline--`
//! - `` `code` `` and ```` ```lang\nblock``` ```` (contents are literal)
//! - `[text](url)`, with `tg://user?id=N` and `tg://emoji?id=N` targets mapped
//!   to user mentions and custom emoji
//!
//! Anything that does not form a complete construct is kept as literal text.

use std::sync::OnceLock;

use regex::Regex;

use crate::{
    span::{FormattingSpan, SpanKind},
    text::{from_utf16, to_utf16, utf16_len, RichText},
};

const FENCE: &str = "```";
const USER_LINK_PREFIX: &str = "tg://user?id=";
const EMOJI_LINK_PREFIX: &str = "tg://emoji?id=";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Wrapper {
    Bold,
    Italic,
    Strike,
    Underline,
}

const WRAPPERS: [Wrapper; 4] = [
    Wrapper::Bold,
    Wrapper::Italic,
    Wrapper::Strike,
    Wrapper::Underline,
];

impl Wrapper {
    fn delimiter(self) -> &'static str {
        match self {
            Wrapper::Bold => "**",
            Wrapper::Italic => "__",
            Wrapper::Strike => "~~",
            Wrapper::Underline => "--",
        }
    }

    fn kind(self) -> SpanKind {
        match self {
            Wrapper::Bold => SpanKind::Bold,
            Wrapper::Italic => SpanKind::Italic,
            Wrapper::Strike => SpanKind::Strikethrough,
            Wrapper::Underline => SpanKind::Underline,
        }
    }
}

#[derive(Debug)]
enum Token<'a> {
    Text(&'a str),
    Wrap(Wrapper),
    Code(&'a str),
    Pre {
        language: Option<&'a str>,
        body: &'a str,
    },
    LinkOpen,
    LinkClose(&'a str),
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // No nested brackets in the text, no `)` in the url.
    RE.get_or_init(|| Regex::new(r"^\[([^\]]+)\]\(([^)]+)\)").expect("valid regex"))
}

/// Parse markdown into plain text plus spans measured against that text.
pub fn parse(markup: &str) -> RichText {
    let mut tokens = Vec::new();
    tokenize(markup, true, &mut tokens);
    let partner = pair_wrappers(&tokens);

    let mut text = String::with_capacity(markup.len());
    let mut pos = 0usize;
    let mut spans = Vec::new();
    let mut opened_at = vec![0usize; tokens.len()];
    let mut links: Vec<usize> = Vec::new();

    let push = |text: &mut String, s: &str| -> usize {
        text.push_str(s);
        utf16_len(s)
    };

    for (idx, token) in tokens.iter().enumerate() {
        match token {
            Token::Text(s) => pos += push(&mut text, *s),
            Token::Wrap(w) => match partner[idx] {
                None => pos += push(&mut text, w.delimiter()),
                Some(other) if other > idx => opened_at[idx] = pos,
                Some(other) => {
                    let start = opened_at[other];
                    if pos > start {
                        spans.push(FormattingSpan::new(start, pos - start, w.kind()));
                    }
                }
            },
            Token::Code(body) => {
                let start = pos;
                pos += push(&mut text, *body);
                spans.push(FormattingSpan::new(start, pos - start, SpanKind::Code));
            }
            Token::Pre { language, body } => {
                let start = pos;
                pos += push(&mut text, *body);
                spans.push(FormattingSpan::new(
                    start,
                    pos - start,
                    SpanKind::Pre {
                        language: language.map(str::to_string),
                    },
                ));
            }
            Token::LinkOpen => links.push(pos),
            Token::LinkClose(target) => {
                if let Some(start) = links.pop() {
                    if pos > start {
                        spans.push(FormattingSpan::new(start, pos - start, link_kind(target)));
                    }
                }
            }
        }
    }

    match RichText::new(text.clone(), spans) {
        Ok(rich) => rich,
        Err(err) => {
            // Unreachable for spans built above; fall back to the plain text.
            tracing::warn!(error = %err, "discarding spans recovered from markup");
            RichText::plain(text)
        }
    }
}

/// Render rich text back into markdown.
///
/// Spans open in offset order, longer first at a shared offset, and the most
/// recently opened span closes first. Kinds without markdown syntax emit their
/// text unchanged. Spans that cross without nesting produce markdown that does
/// not parse back to the same spans.
pub fn unparse(rich: &RichText) -> String {
    let units = to_utf16(rich.text());
    let units = units.as_slice();

    // (position, closes-before-opens, tie, tie, marker)
    let mut events: Vec<(usize, u8, i64, i64, String)> = Vec::new();
    for (i, span) in rich.spans().iter().enumerate() {
        let Some((open, close)) = markers(&span.kind) else {
            continue;
        };
        let i = i as i64;
        events.push((span.offset, 1, -(span.length as i64), i, open));
        events.push((span.end(), 0, -(span.offset as i64), -i, close));
    }
    events.sort_by(|a, b| (a.0, a.1, a.2, a.3).cmp(&(b.0, b.1, b.2, b.3)));

    let mut out = String::with_capacity(rich.text().len() + events.len() * 2);
    let mut cursor = 0usize;
    for (at, _, _, _, marker) in events {
        let at = at.min(units.len());
        out.push_str(&slice_lossy(units, cursor, at));
        out.push_str(&marker);
        cursor = at;
    }
    out.push_str(&slice_lossy(units, cursor, units.len()));
    out
}

fn slice_lossy(units: &[u16], from: usize, to: usize) -> String {
    if from >= to {
        return String::new();
    }
    from_utf16(&units[from..to]).unwrap_or_else(|_| String::from_utf16_lossy(&units[from..to]))
}

fn markers(kind: &SpanKind) -> Option<(String, String)> {
    let pair = |open: &str, close: &str| Some((open.to_string(), close.to_string()));
    match kind {
        SpanKind::Bold => pair("**", "**"),
        SpanKind::Italic => pair("__", "__"),
        SpanKind::Strikethrough => pair("~~", "~~"),
        SpanKind::Underline => pair("--", "--"),
        SpanKind::Code => pair("`", "`"),
        SpanKind::Pre { language: None } => pair("```\n", FENCE),
        SpanKind::Pre {
            language: Some(language),
        } => Some((format!("```{language}\n"), FENCE.to_string())),
        SpanKind::TextLink { url } => Some(("[".to_string(), format!("]({url})"))),
        SpanKind::MentionName { user_ref } => Some((
            "[".to_string(),
            format!("]({USER_LINK_PREFIX}{user_ref})"),
        )),
        SpanKind::CustomEmoji { emoji_ref } => Some((
            "[".to_string(),
            format!("]({EMOJI_LINK_PREFIX}{emoji_ref})"),
        )),
        SpanKind::Url
        | SpanKind::Mention
        | SpanKind::Hashtag
        | SpanKind::Cashtag
        | SpanKind::BotCommand
        | SpanKind::Email
        | SpanKind::Phone
        | SpanKind::Blockquote { .. }
        | SpanKind::Spoiler
        | SpanKind::Unknown => None,
    }
}

fn link_kind(target: &str) -> SpanKind {
    if let Some(id) = target
        .strip_prefix(USER_LINK_PREFIX)
        .and_then(|id| id.parse::<i64>().ok())
    {
        return SpanKind::MentionName { user_ref: id };
    }
    if let Some(id) = target
        .strip_prefix(EMOJI_LINK_PREFIX)
        .and_then(|id| id.parse::<i64>().ok())
    {
        return SpanKind::CustomEmoji { emoji_ref: id };
    }
    SpanKind::TextLink {
        url: target.to_string(),
    }
}

fn tokenize<'a>(src: &'a str, allow_links: bool, out: &mut Vec<Token<'a>>) {
    let mut i = 0usize;
    let mut text_start = 0usize;

    let flush = move |out: &mut Vec<Token<'a>>, from: usize, to: usize| {
        if to > from {
            out.push(Token::Text(&src[from..to]));
        }
    };

    while i < src.len() {
        let rest = &src[i..];

        if rest.starts_with(FENCE) {
            if let Some((token, consumed)) = code_fence(rest) {
                flush(out, text_start, i);
                out.push(token);
                i += consumed;
                text_start = i;
            } else {
                i += FENCE.len();
            }
            continue;
        }

        if rest.starts_with('`') {
            if let Some((token, consumed)) = inline_code(rest) {
                flush(out, text_start, i);
                out.push(token);
                i += consumed;
                text_start = i;
                continue;
            }
        }

        if allow_links && rest.starts_with('[') {
            if let Some(caps) = link_re().captures(rest) {
                let groups = (caps.get(0), caps.get(1), caps.get(2));
                if let (Some(all), Some(label), Some(target)) = groups {
                    flush(out, text_start, i);
                    out.push(Token::LinkOpen);
                    tokenize(label.as_str(), false, out);
                    out.push(Token::LinkClose(target.as_str()));
                    i += all.end();
                    text_start = i;
                    continue;
                }
            }
        }

        if let Some(&w) = WRAPPERS.iter().find(|w| rest.starts_with(w.delimiter())) {
            flush(out, text_start, i);
            let run = delimiter_run(rest, w, out);
            i += run;
            text_start = i;
            continue;
        }

        i += rest.chars().next().map_or(1, char::len_utf8);
    }

    flush(out, text_start, src.len());
}

/// Split a run of a wrapper's delimiter character into wrapper tokens and at
/// most one literal character; returns the run's byte length.
///
/// Wrappers alternate close/open when a wrapper of this kind is open, and
/// open/close otherwise. A leftover odd character joins the span's text: it
/// goes before a closer (`--a---` is `a-` underlined) and after an opener
/// (`---a--` is `-a` underlined).
fn delimiter_run<'a>(rest: &'a str, w: Wrapper, out: &mut Vec<Token<'a>>) -> usize {
    let delimiter = w.delimiter();
    let unit = &delimiter[..1];
    let len = rest.bytes().take_while(|&b| b == delimiter.as_bytes()[0]).count();
    let wrappers = len / delimiter.len();
    let literal = len % delimiter.len() == 1;

    let closing = out
        .iter()
        .filter(|t| matches!(t, Token::Wrap(x) if *x == w))
        .count()
        % 2
        == 1;

    if literal && closing {
        out.push(Token::Text(unit));
    }
    for n in 0..wrappers {
        out.push(Token::Wrap(w));
        if n == 0 && literal && !closing {
            out.push(Token::Text(unit));
        }
    }
    len
}

/// ```` ```lang\nbody``` ````, ```` ```\nbody``` ```` or ```` ```body``` ````.
fn code_fence(rest: &str) -> Option<(Token<'_>, usize)> {
    let inner = &rest[FENCE.len()..];
    let close = inner.find(FENCE)?;
    let all = &inner[..close];

    let (language, body) = match all.find('\n') {
        Some(0) => (None, &all[1..]),
        Some(nl) if is_language_tag(&all[..nl]) => (Some(&all[..nl]), &all[nl + 1..]),
        _ => (None, all),
    };
    if body.is_empty() {
        return None;
    }

    Some((
        Token::Pre { language, body },
        FENCE.len() + close + FENCE.len(),
    ))
}

fn is_language_tag(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '#'))
}

fn inline_code(rest: &str) -> Option<(Token<'_>, usize)> {
    let inner = &rest[1..];
    let close = inner.find('`')?;
    if close == 0 {
        return None;
    }
    Some((Token::Code(&inner[..close]), close + 2))
}

/// Pair each wrapper with the most recent unmatched opener of the same kind.
///
/// A pair with nothing between it stays literal, as do unmatched wrappers.
fn pair_wrappers(tokens: &[Token<'_>]) -> Vec<Option<usize>> {
    let mut partner: Vec<Option<usize>> = vec![None; tokens.len()];
    let mut open: Vec<usize> = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        let Token::Wrap(w) = token else {
            continue;
        };
        let found = open
            .iter()
            .rposition(|&o| matches!(tokens[o], Token::Wrap(x) if x == *w));
        match found {
            Some(at) => {
                let opener = open.remove(at);
                let has_content = (opener + 1..idx).any(|between| {
                    !matches!(tokens[between], Token::Wrap(_)) || partner[between].is_none()
                });
                if has_content {
                    partner[opener] = Some(idx);
                    partner[idx] = Some(opener);
                }
            }
            None => open.push(idx),
        }
    }

    partner
}
