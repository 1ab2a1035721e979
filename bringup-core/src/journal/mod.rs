//! Boot journal and log collaborator.
//!
//! Bring-up records two kinds of trail. The [`BootJournal`] is a fixed-size
//! ring of typed events kept in RAM for the current boot; the emulator prints
//! it and the tests assert stage ordering against it. The [`BootLog`]
//! collaborator receives human-readable lines and is the durable record of
//! why a boot ended early.

use core::fmt::{self, Write as _};
use core::time::Duration;

use heapless::{HistoryBuf, OldestOrdered, String};

use crate::clock::MonotonicInstant;
use crate::network::NetworkMode;
use crate::orchestrator::{BootPhase, RetreatKind};
use crate::reset::ResetCause;

/// Total number of journal entries retained in memory.
pub const JOURNAL_CAPACITY: usize = 64;

/// File the firmware appends log lines to, on the volume root.
pub const DEFAULT_LOG_FILE: &str = "TLC32.LOG";

/// Longest line forwarded to the [`BootLog`]; longer lines are truncated.
pub const MAX_LOG_LINE: usize = 160;

/// Sequential identifier attached to journal records.
pub type EventId = u32;

/// Append-only, best-effort log sink.
pub trait BootLog {
    /// Appends one line. Failures are swallowed by the implementation.
    fn append(&mut self, message: &str);
}

/// Log sink that drops everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullLog;

impl BootLog for NullLog {
    fn append(&mut self, _: &str) {}
}

/// Formats `args` into a bounded line and appends it to `log`.
pub fn append_fmt<L>(log: &mut L, args: fmt::Arguments<'_>)
where
    L: BootLog + ?Sized,
{
    let mut line: String<MAX_LOG_LINE> = String::new();
    // A full buffer truncates the line; the partial text is still useful.
    let _ = TruncatingWriter(&mut line).write_fmt(args);
    log.append(&line);
}

struct TruncatingWriter<'a, const N: usize>(&'a mut String<N>);

impl<const N: usize> fmt::Write for TruncatingWriter<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.0.push(ch).is_err() {
                return Err(fmt::Error);
            }
        }
        Ok(())
    }
}

/// Which network attempt a journal entry refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NetworkAttempt {
    Client,
    AccessPoint,
}

/// Discriminated journal events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootEventKind {
    BootCounted(u32),
    ResetClassified(ResetCause),
    PhaseEntered(BootPhase),
    StorageMounted,
    ConfigLoaded,
    ConfigDefaulted,
    NetworkAttemptStarted(NetworkAttempt),
    NetworkAttemptFailed(NetworkAttempt),
    NetworkAssociated(NetworkMode),
    TimeSynced { polls: u32 },
    TimeSyncTimedOut { polls: u32 },
    CollaboratorsStarted,
    PowerConfigured,
    Retreat(RetreatKind),
    SupervisorTick(u32),
}

impl fmt::Display for BootEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootEventKind::BootCounted(count) => write!(f, "boot-counted {count}"),
            BootEventKind::ResetClassified(cause) => write!(f, "reset-classified {cause}"),
            BootEventKind::PhaseEntered(phase) => write!(f, "phase {phase}"),
            BootEventKind::StorageMounted => f.write_str("storage-mounted"),
            BootEventKind::ConfigLoaded => f.write_str("config-loaded"),
            BootEventKind::ConfigDefaulted => f.write_str("config-defaulted"),
            BootEventKind::NetworkAttemptStarted(attempt) => {
                write!(f, "network-attempt {}", attempt_label(*attempt))
            }
            BootEventKind::NetworkAttemptFailed(attempt) => {
                write!(f, "network-failed {}", attempt_label(*attempt))
            }
            BootEventKind::NetworkAssociated(mode) => write!(f, "network-associated {mode}"),
            BootEventKind::TimeSynced { polls } => write!(f, "time-synced polls={polls}"),
            BootEventKind::TimeSyncTimedOut { polls } => {
                write!(f, "time-sync-timeout polls={polls}")
            }
            BootEventKind::CollaboratorsStarted => f.write_str("collaborators-started"),
            BootEventKind::PowerConfigured => f.write_str("power-configured"),
            BootEventKind::Retreat(kind) => write!(f, "retreat {kind}"),
            BootEventKind::SupervisorTick(tick) => write!(f, "supervisor-tick {tick}"),
        }
    }
}

fn attempt_label(attempt: NetworkAttempt) -> &'static str {
    match attempt {
        NetworkAttempt::Client => "client",
        NetworkAttempt::AccessPoint => "access-point",
    }
}

/// Journal record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct JournalRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: BootEventKind,
}

/// Records boot events into a fixed-size ring buffer.
pub struct BootJournal<TInstant, const CAPACITY: usize = JOURNAL_CAPACITY>
where
    TInstant: Copy,
{
    ring: HistoryBuf<JournalRecord<TInstant>, CAPACITY>,
    started_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> BootJournal<TInstant, CAPACITY>
where
    TInstant: MonotonicInstant,
{
    /// Creates an empty journal.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            started_at: None,
            next_event_id: 0,
        }
    }

    /// Records an event and returns its identifier.
    pub fn record(&mut self, event: BootEventKind, timestamp: TInstant) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        if self.started_at.is_none() {
            self.started_at = Some(timestamp);
        }

        self.ring.write(JournalRecord {
            id,
            timestamp,
            event,
        });

        id
    }

    /// Returns an iterator over the recorded events in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, JournalRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent record, if any.
    pub fn latest(&self) -> Option<&JournalRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Offset of `record` from the first event recorded in this journal.
    pub fn offset_of(&self, record: &JournalRecord<TInstant>) -> Duration {
        self.started_at
            .map_or(Duration::ZERO, |start| {
                record.timestamp.saturating_duration_since(start)
            })
    }

    /// Returns the phases entered so far, oldest first.
    pub fn phases(&self) -> impl Iterator<Item = BootPhase> + '_ {
        self.oldest_first().filter_map(|record| match record.event {
            BootEventKind::PhaseEntered(phase) => Some(phase),
            _ => None,
        })
    }

    /// Returns `true` when `phase` was entered during this boot.
    pub fn entered(&self, phase: BootPhase) -> bool {
        self.phases().any(|entered| entered == phase)
    }

    /// Position of the first record matching `event`, if any.
    pub fn position(&self, event: BootEventKind) -> Option<usize> {
        self.oldest_first().position(|record| record.event == event)
    }
}

impl<TInstant, const CAPACITY: usize> Default for BootJournal<TInstant, CAPACITY>
where
    TInstant: MonotonicInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockInstant;

    struct CaptureLog {
        lines: heapless::Vec<String<MAX_LOG_LINE>, 4>,
    }

    impl BootLog for CaptureLog {
        fn append(&mut self, message: &str) {
            let mut line = String::new();
            line.push_str(message).unwrap();
            self.lines.push(line).unwrap();
        }
    }

    #[test]
    fn records_are_numbered_and_ordered() {
        let mut journal: BootJournal<MockInstant, 4> = BootJournal::new();
        journal.record(BootEventKind::BootCounted(1), MockInstant::micros(0));
        journal.record(
            BootEventKind::PhaseEntered(BootPhase::ClassifyReset),
            MockInstant::micros(10),
        );

        let ids: heapless::Vec<EventId, 4> = journal.oldest_first().map(|r| r.id).collect();
        assert_eq!(ids.as_slice(), &[0, 1]);
        assert_eq!(
            journal.latest().map(|r| r.event),
            Some(BootEventKind::PhaseEntered(BootPhase::ClassifyReset))
        );
        assert!(journal.entered(BootPhase::ClassifyReset));
        assert!(!journal.entered(BootPhase::MountStorage));
    }

    #[test]
    fn ring_keeps_most_recent_entries() {
        let mut journal: BootJournal<MockInstant, 2> = BootJournal::new();
        for tick in 0..5 {
            journal.record(BootEventKind::SupervisorTick(tick), MockInstant::micros(0));
        }

        assert_eq!(journal.len(), 2);
        assert_eq!(journal.position(BootEventKind::SupervisorTick(3)), Some(0));
        assert_eq!(journal.position(BootEventKind::SupervisorTick(0)), None);
    }

    #[test]
    fn offsets_are_relative_to_first_record() {
        let mut journal: BootJournal<MockInstant, 4> = BootJournal::new();
        journal.record(BootEventKind::StorageMounted, MockInstant::micros(5_000));
        journal.record(BootEventKind::ConfigLoaded, MockInstant::micros(7_500));

        let latest = *journal.latest().unwrap();
        assert_eq!(journal.offset_of(&latest), Duration::from_micros(2_500));
    }

    #[test]
    fn long_log_lines_are_truncated_not_dropped() {
        const FILLER: &str = "0123456789012345678901234567890123456789012345678901234567890123";
        let mut log = CaptureLog {
            lines: heapless::Vec::new(),
        };
        append_fmt(&mut log, format_args!("{FILLER}{FILLER}{FILLER}"));

        assert_eq!(log.lines.len(), 1);
        assert_eq!(log.lines[0].len(), MAX_LOG_LINE);
        assert!(log.lines[0].starts_with("0123"));
    }
}
