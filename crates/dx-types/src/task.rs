use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::status::TaskStatus;

/// An operator-defined ingestion request: one calendar date with a
/// start/end wall-clock window, tracked through the status lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Inclusive start of the fetch window (date + start_time).
    pub fn window_start(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// End of the fetch window (date + end_time).
    pub fn window_end(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }
}

/// Payload for creating a task. Validation happens before any storage call;
/// the (date, start, end) uniqueness is enforced by the database constraint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl NewTask {
    pub fn new(date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            date,
            start_time,
            end_time,
        }
    }

    /// Rejects windows where `start_time >= end_time`.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.start_time >= self.end_time {
            return Err(TaskError::InvalidRange {
                start: self.start_time,
                end: self.end_time,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn validate_rejects_inverted_and_empty_windows() {
        assert!(NewTask::new(d(2024, 1, 1), t(9, 0), t(17, 0))
            .validate()
            .is_ok());
        assert!(matches!(
            NewTask::new(d(2024, 1, 1), t(17, 0), t(9, 0)).validate(),
            Err(TaskError::InvalidRange { .. })
        ));
        // start == end is also invalid
        assert!(NewTask::new(d(2024, 1, 1), t(9, 0), t(9, 0))
            .validate()
            .is_err());
    }

    #[test]
    fn window_combines_date_and_times() {
        let task = Task {
            id: 1,
            date: d(2024, 1, 1),
            start_time: t(0, 0),
            end_time: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        };
        assert_eq!(
            task.window_start(),
            d(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(
            task.window_end(),
            d(2024, 1, 1).and_hms_opt(23, 59, 0).unwrap()
        );
    }
}
