//! System prompt assembly for live turns, cron turns, and Tide nudges.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

pub struct PromptBuilder {
    user_tz: Tz,
    /// "24h" or "12h".
    time_format: String,
}

impl PromptBuilder {
    pub fn new(user_tz: Tz, time_format: impl Into<String>) -> Self {
        Self {
            user_tz,
            time_format: time_format.into(),
        }
    }

    fn now_line(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.user_tz);
        let stamp = if self.time_format == "12h" {
            local.format("%A %Y-%m-%d %I:%M %p").to_string()
        } else {
            local.format("%A %Y-%m-%d %H:%M").to_string()
        };
        format!("Current time: {stamp} ({})", self.user_tz)
    }

    /// The live-chat prompt; cron turns use the same one so a fired job
    /// reads exactly like a user message would.
    pub fn chat_prompt(&self, skill_docs: &str, now: DateTime<Utc>) -> String {
        let mut prompt = String::from(
            "You are Moobot, a personal assistant living in the user's own chat apps. \
             Keep replies short and conversational; this is a phone messenger, not a terminal.\n",
        );
        prompt.push_str(&self.now_line(now));
        prompt.push_str(
            "\n\nWhen a request needs a tool, call it instead of guessing. \
             If a scheduling request is ambiguous (unclear time, recipient, or wording), \
             ask a clarifying question instead of inventing the missing part. \
             Never invent reminder text the user did not give you.\n",
        );
        if !skill_docs.is_empty() {
            prompt.push_str("\n## Skills\n");
            prompt.push_str(skill_docs);
        }
        prompt
    }

    /// Tide runs without a user message; the prompt constrains the output
    /// to one short, context-tied nudge.
    pub fn tide_prompt(&self, now: DateTime<Utc>) -> String {
        let mut prompt = String::from(
            "You are Moobot. The chat has been quiet for a while and you may send \
             ONE short message to gently pick the thread back up. Tie it to the \
             recent conversation (\"still waiting on X?\", \"tests passed; what's \
             next?\"). One or two sentences, no greetings, no summaries. If there \
             is nothing worth saying, reply with just: PASS\n",
        );
        prompt.push_str(&self.now_line(now));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn time_renders_in_user_zone() {
        let builder = PromptBuilder::new(chrono_tz::Europe::Berlin, "24h");
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 6, 30, 0).unwrap();
        let prompt = builder.chat_prompt("", now);
        assert!(prompt.contains("07:30"));
        assert!(prompt.contains("Europe/Berlin"));
    }

    #[test]
    fn twelve_hour_format() {
        let builder = PromptBuilder::new(chrono_tz::UTC, "12h");
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 18, 5, 0).unwrap();
        assert!(builder.chat_prompt("", now).contains("06:05 PM"));
    }

    #[test]
    fn skill_docs_are_appended() {
        let builder = PromptBuilder::new(chrono_tz::UTC, "24h");
        let prompt = builder.chat_prompt("- cron: schedules reminders\n", Utc::now());
        assert!(prompt.contains("## Skills"));
        assert!(prompt.contains("schedules reminders"));
    }
}
