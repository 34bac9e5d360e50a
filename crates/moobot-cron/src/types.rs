use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Defines when a job fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire exactly once at an absolute instant (epoch milliseconds).
    OneShot { at_ms: i64 },

    /// Fire per a 5-field cron expression, evaluated in `tz` (IANA zone)
    /// or the local zone when unset.
    Recurring { expr: String, tz: Option<String> },
}

impl Schedule {
    pub fn one_shot_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Schedule::OneShot { at_ms } => Utc.timestamp_millis_opt(*at_ms).single(),
            Schedule::Recurring { .. } => None,
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, Schedule::Recurring { .. })
    }
}

/// A persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    /// UUID v4 string.
    pub id: String,
    /// Human-readable label, shown in listings and the failure apology.
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub schedule: Schedule,
    /// The user text fed to the agent loop when the job fires.
    pub message: String,
    /// Destination chat. Routes the outbound transport by shape.
    pub jid: String,
    /// Delivery mark for one-shots. A marked one-shot is never executed
    /// again, across any number of restarts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at_ms: Option<i64>,
}

impl CronJob {
    pub fn new(name: &str, schedule: Schedule, message: &str, jid: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            enabled: true,
            schedule,
            message: message.to_string(),
            jid: jid.to_string(),
            sent_at_ms: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_serde_tags() {
        let one_shot = Schedule::OneShot { at_ms: 1700000000000 };
        let json = serde_json::to_value(&one_shot).unwrap();
        assert_eq!(json["kind"], "one_shot");

        let recurring = Schedule::Recurring {
            expr: "*/5 * * * *".to_string(),
            tz: Some("Europe/Berlin".to_string()),
        };
        let json = serde_json::to_value(&recurring).unwrap();
        assert_eq!(json["kind"], "recurring");
        assert_eq!(json["expr"], "*/5 * * * *");
    }

    #[test]
    fn sent_mark_survives_round_trip() {
        let mut job = CronJob::new(
            "check lock",
            Schedule::OneShot { at_ms: 42 },
            "check the lock",
            "491700@s.whatsapp.net",
        );
        job.sent_at_ms = Some(99);
        let json = serde_json::to_string(&job).unwrap();
        let back: CronJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sent_at_ms, Some(99));
        assert!(back.enabled);
    }
}
