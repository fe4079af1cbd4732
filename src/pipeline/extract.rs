//! Field extraction from notification email HTML.
//!
//! NEO notification mail is a nest of presentation tables with no ids or
//! classes, so every field is located by structural landmark. Two layouts
//! have been seen in the wild: one with labelled `Subject:`/`From:` cells,
//! and one reachable only by fixed row/column paths. Each lookup tries the
//! labelled layout first and falls back to the fixed paths, so a layout
//! change on the LMS side degrades to an extraction error instead of a
//! panic.

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Utc};
use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractionError;
use crate::pipeline::markup;

/// Title prefix that marks an assessment hand-out notification.
const ASSESSMENT_GIVEN_PREFIX: &str = "Given: assessment";

/// The institution sits in a single fixed zone (UTC+8); notification
/// timestamps are wall-clock times in that zone.
fn event_offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).expect("UTC+8 is a valid offset")
}

/// A notification category that changes how the message is decorated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// An assessment was handed out ("Given: assessment ...").
    AssessmentGiven,
}

/// The structured fields pulled out of one notification email.
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    pub title: String,
    /// Sanitized Markdown body, not yet split to the sink's length limit.
    pub body_markup: String,
    pub sender_name: String,
    pub sender_avatar_url: Option<String>,
    pub event_timestamp: DateTime<FixedOffset>,
    pub kind: Option<NoticeKind>,
}

/// Raw strings found at the landmarks, before conversion and parsing.
struct RawLandmarks {
    title: String,
    body_html: String,
    sender_name: String,
    sender_avatar_url: Option<String>,
    timestamp: String,
}

/// Extract a [`NotificationRecord`] from one email's HTML body.
///
/// `received_at` is the carrying email's own date; the inline timestamp
/// format has no year field, so the year is assumed from it.
pub fn extract(
    html: &str,
    received_at: DateTime<Utc>,
) -> Result<NotificationRecord, ExtractionError> {
    let doc = Html::parse_document(html);
    let landmarks = locate(&doc)?;

    let body_markup = markup::render(&landmarks.body_html).trim().to_string();
    if body_markup.is_empty() {
        return Err(ExtractionError::EmptyBody);
    }

    let assumed_year = received_at.with_timezone(&event_offset()).year();
    let event_timestamp = parse_event_timestamp(&landmarks.timestamp, assumed_year)?;

    let kind = landmarks
        .title
        .starts_with(ASSESSMENT_GIVEN_PREFIX)
        .then_some(NoticeKind::AssessmentGiven);

    Ok(NotificationRecord {
        title: landmarks.title,
        body_markup,
        sender_name: landmarks.sender_name,
        sender_avatar_url: landmarks.sender_avatar_url,
        event_timestamp,
        kind,
    })
}

/// Try the labelled layout, then the fixed-path layout. When both fail,
/// the labelled layout's error is reported — it is the common shape and
/// names the most useful missing landmark.
fn locate(doc: &Html) -> Result<RawLandmarks, ExtractionError> {
    match labelled_layout(doc) {
        Ok(landmarks) => Ok(landmarks),
        Err(primary) => fixed_path_layout(doc).map_err(|_| primary),
    }
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// Collapse an element's text nodes into one whitespace-normalized string.
fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Labelled layout ─────────────────────────────────────────────────
//
// Fields live in cells labelled by a bold `Subject:` / `From:` cell next
// to them; the body is the last cell of the document's second table.

fn labelled_layout(doc: &Html) -> Result<RawLandmarks, ExtractionError> {
    let title =
        labelled_title(doc).ok_or(ExtractionError::MissingLandmark("subject cell"))?;
    let body_html =
        second_table_last_cell(doc).ok_or(ExtractionError::MissingLandmark("body cell"))?;
    let (sender_name, sender_avatar_url, timestamp) =
        labelled_sender(doc).ok_or(ExtractionError::MissingLandmark("sender row"))?;

    Ok(RawLandmarks {
        title,
        body_html,
        sender_name,
        sender_avatar_url,
        timestamp,
    })
}

/// The cell following the bold `Subject:` label cell holds the title.
fn labelled_title(doc: &Html) -> Option<String> {
    let bold = sel("td > b");
    for b in doc.select(&bold) {
        if !b.text().any(|t| t.contains("Subject:")) {
            continue;
        }
        let Some(label_cell) = b.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        if let Some(cell) = next_cell(label_cell) {
            let text = cell_text(cell);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// The last cell of the document's second table holds the body block.
fn second_table_last_cell(doc: &Html) -> Option<String> {
    let table = doc.select(&sel("table")).nth(1)?;
    let cell = table.select(&sel("td")).last()?;
    Some(cell.inner_html())
}

/// The row whose first bold cell reads `From:` carries the sender name,
/// the avatar image, and the event timestamp.
fn labelled_sender(doc: &Html) -> Option<(String, Option<String>, String)> {
    for row in doc.select(&sel("tr")) {
        let cells: Vec<ElementRef<'_>> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "td")
            .collect();
        let Some(first) = cells.first() else { continue };
        let labelled = first
            .select(&sel("b"))
            .any(|b| b.text().collect::<String>().trim() == "From:");
        if !labelled {
            continue;
        }

        let Some(info_cell) = cells.get(2) else { continue };
        let mut texts = info_cell
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let Some(name) = texts.next() else { continue };
        let Some(timestamp) = texts.next() else { continue };

        let avatar = cells
            .get(1)
            .and_then(|cell| cell.select(&sel("img")).next())
            .and_then(|img| img.value().attr("src"))
            .map(String::from);

        return Some((name.to_string(), avatar, timestamp.to_string()));
    }
    None
}

fn next_cell(cell: ElementRef<'_>) -> Option<ElementRef<'_>> {
    cell.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "td")
}

// ── Fixed-path layout ───────────────────────────────────────────────
//
// No labels; everything hangs off the second outer row. The sender/title
// table comes first inside it, the body table last.

fn fixed_path_layout(doc: &Html) -> Result<RawLandmarks, ExtractionError> {
    let title = doc
        .select(&sel(
            "tr:nth-child(2) table:first-child tr:nth-child(2) td:last-child",
        ))
        .next()
        .map(cell_text)
        .filter(|t| !t.is_empty())
        .ok_or(ExtractionError::MissingLandmark("title path"))?;

    let body_html = doc
        .select(&sel("tr:nth-child(2) table:last-child tr:last-child td"))
        .next()
        .map(|cell| cell.inner_html())
        .ok_or(ExtractionError::MissingLandmark("body path"))?;

    let info_cell = doc
        .select(&sel(
            "tr:nth-child(2) table:first-child tr:first-child td:last-child",
        ))
        .next()
        .ok_or(ExtractionError::MissingLandmark("sender path"))?;
    let mut texts = info_cell.text().map(str::trim).filter(|t| !t.is_empty());
    let sender_name = texts
        .next()
        .ok_or(ExtractionError::MissingLandmark("sender name"))?
        .to_string();
    let timestamp = texts
        .next()
        .ok_or(ExtractionError::MissingLandmark("sender timestamp"))?
        .to_string();

    let sender_avatar_url = doc
        .select(&sel(
            "tr:nth-child(2) table:first-child tr:first-child td:nth-child(2) img",
        ))
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(String::from);

    Ok(RawLandmarks {
        title,
        body_html,
        sender_name,
        sender_avatar_url,
        timestamp,
    })
}

// ── Timestamp parsing ───────────────────────────────────────────────

/// Parse the literal `@ MMM d, h:mm tt` form (e.g. `@ Jan 5, 3:45 PM`) as a
/// wall-clock time in the institution's zone. The format has no year, so
/// `assumed_year` supplies it.
fn parse_event_timestamp(
    raw: &str,
    assumed_year: i32,
) -> Result<DateTime<FixedOffset>, ExtractionError> {
    use chrono::format::{Parsed, StrftimeItems, parse};

    let bad = |reason: String| ExtractionError::BadTimestamp {
        raw: raw.to_string(),
        reason,
    };

    let mut parsed = Parsed::new();
    parse(
        &mut parsed,
        raw.trim(),
        StrftimeItems::new("@ %b %d, %I:%M %p"),
    )
    .map_err(|e| bad(e.to_string()))?;
    parsed
        .set_year(i64::from(assumed_year))
        .map_err(|e| bad(e.to_string()))?;

    let date = parsed.to_naive_date().map_err(|e| bad(e.to_string()))?;
    let time = parsed.to_naive_time().map_err(|e| bad(e.to_string()))?;

    event_offset()
        .from_local_datetime(&date.and_time(time))
        .single()
        .ok_or_else(|| bad("not a valid local time".to_string()))
}
