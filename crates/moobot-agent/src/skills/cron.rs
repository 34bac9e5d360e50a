//! `cron` skill: create, list, and remove scheduled jobs.
//!
//! The model supplies either a relative delay (`in_seconds`), an absolute
//! RFC-3339 instant (`at`), or a 5-field cron expression (`expr`) for
//! recurring jobs. The job lands in the store; the engine notices it on its
//! next poll.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use moobot_cron::{schedule, CronJob, Schedule};
use moobot_model::ToolDefinition;

use crate::context::AgentContext;
use crate::registry::{Skill, ToolResult};

pub struct CronSkill;

impl CronSkill {
    pub fn new() -> Self {
        Self
    }

    fn add(&self, ctx: &AgentContext, args: &Value) -> ToolResult {
        let message = match args.get("message").and_then(|v| v.as_str()) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => return ToolResult::error("'message' is required"),
        };
        let name = args
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(&message)
            .chars()
            .take(48)
            .collect::<String>();
        let jid = args
            .get("jid")
            .and_then(|v| v.as_str())
            .unwrap_or(&ctx.jid)
            .to_string();
        if jid.is_empty() {
            return ToolResult::error("no destination chat for this reminder");
        }

        // Priority: recurring expression > absolute instant > relative delay.
        let sched = if let Some(expr) = args.get("expr").and_then(|v| v.as_str()) {
            let tz = args
                .get("tz")
                .and_then(|v| v.as_str())
                .map(String::from)
                .or_else(|| Some(ctx.user_tz.name().to_string()));
            if let Err(e) = schedule::validate(expr, tz.as_deref()) {
                return ToolResult::error(e.to_string());
            }
            Schedule::Recurring {
                expr: expr.to_string(),
                tz,
            }
        } else if let Some(at) = args.get("at").and_then(|v| v.as_str()) {
            match chrono::DateTime::parse_from_rfc3339(at) {
                Ok(dt) => Schedule::OneShot {
                    at_ms: dt.timestamp_millis(),
                },
                Err(e) => return ToolResult::error(format!("invalid 'at' datetime: {e}")),
            }
        } else if let Some(secs) = args.get("in_seconds").and_then(|v| v.as_i64()) {
            if secs <= 0 {
                return ToolResult::error("'in_seconds' must be a positive integer");
            }
            Schedule::OneShot {
                at_ms: (Utc::now() + chrono::Duration::seconds(secs)).timestamp_millis(),
            }
        } else {
            return ToolResult::error("one of 'expr', 'at', or 'in_seconds' is required");
        };

        let fires = schedule::next_occurrence(&sched, Utc::now())
            .ok()
            .flatten()
            .map(|dt| dt.with_timezone(&ctx.user_tz).format("%Y-%m-%d %H:%M %Z").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let job = CronJob::new(&name, sched, &message, &jid);
        let id = job.id.clone();
        match ctx.cron.add_job(job) {
            Ok(()) => ToolResult::success(format!(
                "Reminder scheduled.\n- id: {id}\n- message: {message}\n- next fire: {fires}"
            )),
            Err(e) => ToolResult::error(format!("failed to schedule: {e}")),
        }
    }

    fn list(&self, ctx: &AgentContext) -> ToolResult {
        let jobs = ctx.cron.load_jobs();
        if jobs.is_empty() {
            return ToolResult::success("No reminders scheduled.");
        }
        let mut out = format!("Scheduled reminders ({}):\n", jobs.len());
        for job in &jobs {
            let when = match &job.schedule {
                Schedule::OneShot { .. } => schedule::next_occurrence(&job.schedule, Utc::now())
                    .ok()
                    .flatten()
                    .map(|dt| {
                        dt.with_timezone(&ctx.user_tz)
                            .format("once at %Y-%m-%d %H:%M")
                            .to_string()
                    })
                    .unwrap_or_else(|| "already fired".to_string()),
                Schedule::Recurring { expr, .. } => format!("recurring ({expr})"),
            };
            out.push_str(&format!("- {} | {} | {}\n", job.id, job.name, when));
        }
        ToolResult::success(out)
    }

    fn remove(&self, ctx: &AgentContext, args: &Value) -> ToolResult {
        let id = match args.get("job_id").and_then(|v| v.as_str()) {
            Some(id) if !id.is_empty() => id,
            _ => return ToolResult::error("'job_id' is required"),
        };
        match ctx.cron.remove_job(id) {
            Ok(()) => ToolResult::success(format!("Reminder {id} removed.")),
            Err(e) => ToolResult::error(format!("failed to remove: {e}")),
        }
    }
}

#[async_trait]
impl Skill for CronSkill {
    fn id(&self) -> &str {
        "cron"
    }

    fn doc(&self) -> &str {
        "schedules reminders: one-shot (in_seconds or at) or recurring (5-field cron expr); \
         also lists and removes them"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "cron_add".to_string(),
                description: "Schedule a reminder. Use in_seconds for relative one-shots, \
                              at (RFC-3339) for absolute ones, expr for recurring cron \
                              schedules like */5 * * * * or 0 8 * * *."
                    .to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "message": { "type": "string", "description": "Reminder text, in the user's words" },
                        "name": { "type": "string", "description": "Short label" },
                        "in_seconds": { "type": "integer" },
                        "at": { "type": "string", "description": "RFC-3339 timestamp" },
                        "expr": { "type": "string", "description": "5-field cron expression" },
                        "tz": { "type": "string", "description": "IANA timezone for expr" }
                    },
                    "required": ["message"]
                }),
            },
            ToolDefinition {
                name: "cron_list".to_string(),
                description: "List all scheduled reminders.".to_string(),
                parameters: serde_json::json!({ "type": "object", "properties": {} }),
            },
            ToolDefinition {
                name: "cron_remove".to_string(),
                description: "Remove a reminder by job id.".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "job_id": { "type": "string" } },
                    "required": ["job_id"]
                }),
            },
        ]
    }

    async fn execute(&self, ctx: &AgentContext, tool_name: &str, args: &Value) -> ToolResult {
        match tool_name {
            "cron_add" => self.add(ctx, args),
            "cron_list" => self.list(ctx),
            "cron_remove" => self.remove(ctx, args),
            other => ToolResult::error(format!("cron skill has no tool {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use moobot_cron::CronStore;

    fn ctx(dir: &std::path::Path) -> AgentContext {
        AgentContext::new(
            dir.to_path_buf(),
            dir.join("workspace"),
            "491700@s.whatsapp.net".to_string(),
            false,
            Arc::new(CronStore::open(dir.join("cron.json")).unwrap()),
            chrono_tz::UTC,
        )
    }

    #[tokio::test]
    async fn one_message_adds_exactly_one_job() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let result = CronSkill::new()
            .execute(
                &ctx,
                "cron_add",
                &serde_json::json!({
                    "message": "check the lock",
                    "name": "check lock",
                    "in_seconds": 120,
                }),
            )
            .await;
        assert!(!result.is_error, "{}", result.content);

        let jobs = ctx.cron.load_jobs();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].message.contains("check lock") || jobs[0].message.contains("lock"));
        let at = jobs[0].schedule.one_shot_at().unwrap();
        let delta = (at - Utc::now()).num_seconds();
        assert!((115..=125).contains(&delta), "delta was {delta}");
    }

    #[tokio::test]
    async fn two_one_shots_get_distinct_instants() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let skill = CronSkill::new();
        skill
            .execute(&ctx, "cron_add", &serde_json::json!({"message": "a", "in_seconds": 60}))
            .await;
        skill
            .execute(&ctx, "cron_add", &serde_json::json!({"message": "b", "in_seconds": 120}))
            .await;

        let jobs = ctx.cron.load_jobs();
        assert_eq!(jobs.len(), 2);
        let a = jobs[0].schedule.one_shot_at().unwrap();
        let b = jobs[1].schedule.one_shot_at().unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn recurring_expression_is_stored_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let result = CronSkill::new()
            .execute(
                &ctx,
                "cron_add",
                &serde_json::json!({"message": "stretch", "expr": "*/5 * * * *"}),
            )
            .await;
        assert!(!result.is_error);

        let jobs = ctx.cron.load_jobs();
        match &jobs[0].schedule {
            Schedule::Recurring { expr, tz } => {
                assert_eq!(expr, "*/5 * * * *");
                assert_eq!(tz.as_deref(), Some("UTC"));
            }
            _ => panic!("expected recurring"),
        }
    }

    #[tokio::test]
    async fn empty_store_lists_no_reminders() {
        let dir = tempfile::tempdir().unwrap();
        let result = CronSkill::new()
            .execute(&ctx(dir.path()), "cron_list", &serde_json::json!({}))
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("No reminders"));
    }

    #[tokio::test]
    async fn bad_expression_is_reported_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let result = CronSkill::new()
            .execute(
                &ctx,
                "cron_add",
                &serde_json::json!({"message": "x", "expr": "every five minutes"}),
            )
            .await;
        assert!(result.is_error);
        assert!(ctx.cron.load_jobs().is_empty());
    }

    #[tokio::test]
    async fn missing_message_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = CronSkill::new()
            .execute(&ctx(dir.path()), "cron_add", &serde_json::json!({"in_seconds": 5}))
            .await;
        assert!(result.is_error);
    }
}
