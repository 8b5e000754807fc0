// src/notify.rs
//! Best-effort outbound notification to a messaging bot on request
//! creation. Delivery failures are logged and swallowed; a submission never
//! fails because the bot was unreachable.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::config::NotifierConfig;

/// The slice of a freshly created request the notification message carries
#[derive(Debug, Clone)]
pub struct NewRequestSummary {
    pub id: String,
    pub who: String,
    pub what: String,
    pub when_: String,
    pub where_: String,
    pub type_name: String,
    pub due_at: Option<DateTime<Utc>>,
}

pub struct Notifier {
    http: reqwest::Client,
    config: NotifierConfig,
}

impl Notifier {
    pub fn new(config: NotifierConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    pub fn format_message(summary: &NewRequestSummary) -> String {
        let mut lines = vec![
            "New request submitted".to_string(),
            format!("Who: {}", summary.who),
            format!("What: {}", summary.what),
            format!("When: {}", summary.when_),
            format!("Where: {}", summary.where_),
            format!("Type: {}", summary.type_name),
        ];
        if let Some(due) = summary.due_at {
            lines.push(format!("Due: {}", due.format("%Y-%m-%d %H:%M UTC")));
        }
        lines.push(format!("Ref: {}", summary.id));
        lines.join("\n")
    }

    pub async fn request_created(&self, summary: &NewRequestSummary) -> anyhow::Result<()> {
        let (token, chat_id) = match (&self.config.bot_token, &self.config.chat_id) {
            (Some(token), Some(chat_id)) => (token, chat_id),
            _ => return Ok(()), // notifier disabled
        };

        let url = format!("{}/bot{}/sendMessage", self.config.api_base.trim_end_matches('/'), token);

        let mut body = json!({
            "chat_id": chat_id,
            "text": Self::format_message(summary),
        });
        if let Some(ref topic) = self.config.topic_id {
            body["message_thread_id"] = json!(topic);
        }

        let response = self.http.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("bot API returned {}", response.status());
        }

        Ok(())
    }
}

/// Fire-and-forget delivery on a detached task
pub fn spawn_request_created(notifier: Arc<Notifier>, summary: NewRequestSummary) {
    if !notifier.is_enabled() {
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = notifier.request_created(&summary).await {
            log::warn!("Request notification failed for {}: {}", summary.id, e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn summary(due_at: Option<DateTime<Utc>>) -> NewRequestSummary {
        NewRequestSummary {
            id: "req-1".to_string(),
            who: "Choir".to_string(),
            what: "Stage Lighting".to_string(),
            when_: "Saturday 19:00".to_string(),
            where_: "Main hall".to_string(),
            type_name: "Event Support".to_string(),
            due_at,
        }
    }

    #[test]
    fn test_format_message_contains_core_fields() {
        let msg = Notifier::format_message(&summary(None));
        assert!(msg.contains("Who: Choir"));
        assert!(msg.contains("What: Stage Lighting"));
        assert!(msg.contains("Type: Event Support"));
        assert!(msg.contains("Ref: req-1"));
        assert!(!msg.contains("Due:"));
    }

    #[test]
    fn test_format_message_with_due_date() {
        let due = Utc.with_ymd_and_hms(2024, 4, 5, 18, 30, 0).unwrap();
        let msg = Notifier::format_message(&summary(Some(due)));
        assert!(msg.contains("Due: 2024-04-05 18:30 UTC"));
    }

    #[test]
    fn test_disabled_notifier_sends_nothing() {
        let notifier = Notifier::new(NotifierConfig::default());
        assert!(!notifier.is_enabled());

        // request_created short-circuits without touching the network
        let result = tokio_test::block_on(notifier.request_created(&summary(None)));
        assert!(result.is_ok());
    }
}
