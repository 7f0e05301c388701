use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Priority of a [`PrioritizedEvent`] - lower value is dequeued first.
///
/// Only [`EventPriority::Critical`] is exempt from backpressure shedding.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
    Background = 4,
}

impl EventPriority {
    /// Index into per-priority counter arrays.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventPriority::Critical => "critical",
            EventPriority::High => "high",
            EventPriority::Normal => "normal",
            EventPriority::Low => "low",
            EventPriority::Background => "background",
        }
    }
}

impl Display for EventPriority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record flowing through a dispatch queue.
///
/// The ordering key is `(priority, sequence)`. `sequence` is assigned from a monotonic counter
/// at enqueue time, guaranteeing FIFO order among equal-priority events. Equality and ordering
/// deliberately ignore the payload - within one queue the sequence alone is unique.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PrioritizedEvent<T> {
    pub priority: EventPriority,
    pub sequence: u64,
    pub time: DateTime<Utc>,
    pub event_type: SmolStr,
    pub symbol: Option<SmolStr>,
    pub payload: T,
}

impl<T> PartialEq for PrioritizedEvent<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<T> Eq for PrioritizedEvent<T> {}

impl<T> PartialOrd for PrioritizedEvent<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PrioritizedEvent<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.sequence).cmp(&(other.priority, other.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(priority: EventPriority, sequence: u64) -> PrioritizedEvent<&'static str> {
        PrioritizedEvent {
            priority,
            sequence,
            time: DateTime::<Utc>::MIN_UTC,
            event_type: SmolStr::new_static("test"),
            symbol: None,
            payload: "payload",
        }
    }

    #[test]
    fn test_priority_precedes_sequence_in_ordering() {
        let critical_late = event(EventPriority::Critical, 100);
        let normal_early = event(EventPriority::Normal, 1);

        assert!(critical_late < normal_early);
    }

    #[test]
    fn test_equal_priority_orders_by_sequence() {
        let first = event(EventPriority::Normal, 1);
        let second = event(EventPriority::Normal, 2);

        assert!(first < second);
    }

    #[test]
    fn test_priority_discriminants() {
        struct TestCase {
            input: EventPriority,
            expected: usize,
        }

        let tests = vec![
            TestCase {
                // TC0: Critical is highest priority
                input: EventPriority::Critical,
                expected: 0,
            },
            TestCase {
                // TC1: High
                input: EventPriority::High,
                expected: 1,
            },
            TestCase {
                // TC2: Normal is the default
                input: EventPriority::default(),
                expected: 2,
            },
            TestCase {
                // TC3: Low
                input: EventPriority::Low,
                expected: 3,
            },
            TestCase {
                // TC4: Background is lowest priority
                input: EventPriority::Background,
                expected: 4,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input.index(), test.expected, "TC{index} failed");
        }
    }
}
