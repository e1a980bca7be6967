//! Writing schedules - automatic chapter production at a fixed time of day.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{ProjectId, ScheduleId};

/// Maximum chapters a schedule may produce per run.
pub const MAX_CHAPTERS_PER_RUN: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

impl std::str::FromStr for ScheduleStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            other => Err(DomainError::parse(format!(
                "Unknown schedule status: '{other}'"
            ))),
        }
    }
}

/// A recurring production schedule for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: ScheduleId,
    pub project_id: ProjectId,
    /// "HH:MM", interpreted as UTC. No per-project timezone binding.
    pub time_of_day: String,
    pub chapters_per_run: u32,
    pub status: ScheduleStatus,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn new(
        project_id: ProjectId,
        time_of_day: impl Into<String>,
        chapters_per_run: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let time_of_day = time_of_day.into();
        let parsed = parse_time_of_day(&time_of_day)?;
        if !(1..=MAX_CHAPTERS_PER_RUN).contains(&chapters_per_run) {
            return Err(DomainError::validation(format!(
                "Chapters per run must be in [1, {MAX_CHAPTERS_PER_RUN}], got {chapters_per_run}"
            )));
        }
        Ok(Self {
            id: ScheduleId::new(),
            project_id,
            time_of_day,
            chapters_per_run,
            status: ScheduleStatus::Active,
            next_run_at: next_occurrence(parsed, now),
            last_run_at: None,
        })
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Active && self.next_run_at <= now
    }

    /// Mark a completed run and roll the next occurrence forward.
    pub fn mark_ran(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        let time = parse_time_of_day(&self.time_of_day)?;
        self.last_run_at = Some(now);
        self.next_run_at = next_occurrence(time, now);
        Ok(())
    }
}

fn parse_time_of_day(s: &str) -> Result<NaiveTime, DomainError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| DomainError::parse(format!("Invalid time of day '{s}', expected HH:MM")))
}

fn next_occurrence(time: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive().and_time(time).and_utc();
    if today > now {
        today
    } else {
        (now.date_naive() + chrono::Days::new(1)).and_time(time).and_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).single().expect("valid")
    }

    #[test]
    fn schedules_next_run_later_today() {
        let s = Schedule::new(ProjectId::new(), "18:30", 2, at(9, 0)).expect("schedule");
        assert_eq!(s.next_run_at, at(18, 30));
        assert!(!s.is_due(at(10, 0)));
        assert!(s.is_due(at(18, 30)));
    }

    #[test]
    fn rolls_to_tomorrow_when_time_passed() {
        let s = Schedule::new(ProjectId::new(), "06:00", 1, at(9, 0)).expect("schedule");
        assert!(s.next_run_at > at(9, 0));
        assert_eq!(s.next_run_at.date_naive(), at(9, 0).date_naive() + chrono::Days::new(1));
    }

    #[test]
    fn invalid_inputs_rejected() {
        assert!(Schedule::new(ProjectId::new(), "25:00", 1, Utc::now()).is_err());
        assert!(Schedule::new(ProjectId::new(), "noon", 1, Utc::now()).is_err());
        assert!(Schedule::new(ProjectId::new(), "10:00", 0, Utc::now()).is_err());
        assert!(Schedule::new(ProjectId::new(), "10:00", 6, Utc::now()).is_err());
    }

    #[test]
    fn mark_ran_advances_next_run() {
        let mut s = Schedule::new(ProjectId::new(), "06:00", 1, at(9, 0)).expect("schedule");
        let due = s.next_run_at;
        s.mark_ran(due).expect("ran");
        assert!(s.next_run_at > due);
        assert_eq!(s.last_run_at, Some(due));
    }
}
