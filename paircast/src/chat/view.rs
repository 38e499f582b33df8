//! Read-only projections of session state for the presentation layer.

use chrono::{DateTime, NaiveDate, TimeZone};
use paircast_proto::message::ChatMessage;

/// Calendar label shown above the first message of each day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayLabel {
    /// Same local day as "today".
    Today,
    /// The local day before "today".
    Yesterday,
    /// Any other day.
    Date(NaiveDate),
}

impl std::fmt::Display for DayLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Today => f.write_str("Today"),
            Self::Yesterday => f.write_str("Yesterday"),
            Self::Date(date) => write!(f, "{}", date.format("%d/%m/%Y")),
        }
    }
}

/// One row of a rendered conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEntry {
    /// Start of a new calendar day.
    DayHeader(DayLabel),
    /// A message with display metadata.
    Message {
        /// Position of the message in its conversation log.
        index: usize,
        /// The stored message.
        message: ChatMessage,
        /// Sent by the active identity.
        outgoing: bool,
        /// Local time of day, `HH:MM`.
        time: String,
    },
}

/// A sidebar row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    /// Peer identity.
    pub name: String,
    /// Unread messages from this peer.
    pub unread: u32,
    /// Currently focused.
    pub focused: bool,
    /// In the active identity's added set.
    pub added: bool,
}

/// Interleave day headers with `log`, in log order.
///
/// A header is emitted before the first message and whenever the local
/// calendar day (in `tz`) differs from the previous message's day.
pub fn group_by_day<Tz: TimeZone>(
    log: &[ChatMessage],
    active: &str,
    tz: &Tz,
    today: NaiveDate,
) -> Vec<HistoryEntry>
where
    Tz::Offset: std::fmt::Display,
{
    let mut entries = Vec::with_capacity(log.len() + 1);
    let mut current_day: Option<NaiveDate> = None;

    for (index, message) in log.iter().enumerate() {
        let local: DateTime<Tz> = message.timestamp.with_timezone(tz);
        let day = local.date_naive();
        if current_day != Some(day) {
            entries.push(HistoryEntry::DayHeader(day_label(day, today)));
            current_day = Some(day);
        }
        entries.push(HistoryEntry::Message {
            index,
            outgoing: message.from == active,
            time: local.format("%H:%M").to_string(),
            message: message.clone(),
        });
    }
    entries
}

fn day_label(day: NaiveDate, today: NaiveDate) -> DayLabel {
    if day == today {
        DayLabel::Today
    } else if today.pred_opt() == Some(day) {
        DayLabel::Yesterday
    } else {
        DayLabel::Date(day)
    }
}
