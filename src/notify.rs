//! Teams alerts built from outcome records.
//!
//! Alert selection is pure; only `TeamsNotifier::notify` touches the network.
use crate::outcome::OutcomeRecord;
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::time::Duration;
use ureq::Agent;

const INTUNE_APP_URL: &str =
    "https://intune.microsoft.com/#view/Microsoft_Intune_Apps/SettingsMenu/~/0/appId/";

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Separator Teams renders as a paragraph break inside a TextBlock.
const BREAK: &str = "\r \r";

/// Receives one outcome record per processed recipe.
pub trait Notifier {
    fn notify(&self, outcome: &OutcomeRecord) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamsAlert {
    pub title: String,
    pub message: String,
    pub error: bool,
    /// Intune app id for the "View App in Intune" action.
    pub app_id: Option<String>,
}

impl TeamsAlert {
    fn info(title: String, message: String) -> Self {
        Self {
            title,
            message,
            error: false,
            app_id: None,
        }
    }

    fn error(title: String, message: String) -> Self {
        Self {
            title,
            message,
            error: true,
            app_id: None,
        }
    }
}

/// Alerts for one outcome, in the order they are posted.
pub fn build_alerts(
    outcome: &OutcomeRecord,
    cleanup_configured: bool,
    promote_configured: bool,
) -> Vec<TeamsAlert> {
    let name = outcome.recipe_name.as_str();
    let mut alerts = Vec::new();

    if outcome.trust_failed() {
        let title = if name.is_empty() {
            "❌ Recipe failed trust verification".to_string()
        } else {
            format!("❌ {name} failed trust verification")
        };
        alerts.push(TeamsAlert::error(
            title,
            "Update trust verification manually".to_string(),
        ));
    } else if outcome.errored {
        let message = outcome
            .failure_message
            .clone()
            .unwrap_or_else(|| "Unknown error".to_string());
        alerts.push(TeamsAlert::error(format!("❌ {name} failed"), message));
    }

    if outcome.updated {
        let version = outcome.updated_version.as_deref().unwrap_or_default();
        let import = outcome.import.clone().unwrap_or_default();
        let message = format!(
            "**Name:** {}{BREAK}**Intune App ID:** {}{BREAK}**Content Version ID:** {}{BREAK}",
            import.name.unwrap_or_default(),
            import.intune_app_id.clone().unwrap_or_default(),
            import.content_version_id.unwrap_or_default(),
        );
        alerts.push(TeamsAlert {
            title: format!("✅ Imported {name} {version}"),
            message,
            error: false,
            app_id: import.intune_app_id,
        });
    }

    if cleanup_configured && outcome.removed {
        let removal = outcome.removal.clone().unwrap_or_default();
        let message = format!(
            "**Remove Count:** {}{BREAK}**Removed Versions:** {}{BREAK}**Keep Count:** {}",
            removal.removed_count.unwrap_or_default(),
            removal.removed_versions.unwrap_or_default(),
            removal.keep_count.unwrap_or_default(),
        );
        alerts.push(TeamsAlert::info(
            format!("🗑 Removed old versions of {name}"),
            message,
        ));
    }

    if promote_configured && outcome.promoted {
        let promotion = outcome.promotion.as_ref();
        let message = format!(
            "**Promotions:** {}{BREAK}**Blacklisted Versions:** {}",
            promotion
                .and_then(|d| d.promotions.clone())
                .unwrap_or_default(),
            promotion
                .and_then(|d| d.blacklisted_versions.clone())
                .unwrap_or_default(),
        );
        alerts.push(TeamsAlert::info(format!("🚀 Promoted {name}"), message));
    }

    alerts
}

/// Adaptive card message for one alert.
pub fn card_payload(alert: &TeamsAlert) -> Value {
    let style = if alert.error { "attention" } else { "good" };
    let mut content = json!({
        "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
        "type": "AdaptiveCard",
        "version": "1.6",
        "msteams": { "width": "Full" },
        "body": [
            {
                "type": "Container",
                "style": style,
                "bleed": true,
                "size": "stretch",
                "items": [{ "type": "TextBlock", "text": "" }]
            },
            {
                "type": "TextBlock",
                "text": "📦 AutoPkg",
                "wrap": true,
                "size": "large"
            },
            {
                "type": "ColumnSet",
                "columns": [{
                    "type": "Column",
                    "items": [
                        { "type": "TextBlock", "text": alert.title, "wrap": true, "isSubtle": true },
                        { "type": "TextBlock", "text": alert.message, "wrap": true }
                    ]
                }]
            }
        ]
    });
    if let Some(app_id) = &alert.app_id {
        content["actions"] = json!([{
            "type": "Action.OpenUrl",
            "title": "View App in Intune",
            "url": format!("{INTUNE_APP_URL}{app_id}")
        }]);
    }
    json!({
        "type": "message",
        "attachments": [{
            "contentType": "application/vnd.microsoft.card.adaptive",
            "contentUrl": null,
            "content": content
        }]
    })
}

/// Posts adaptive cards to a Teams incoming webhook.
pub struct TeamsNotifier {
    webhook: String,
    agent: Agent,
    cleanup_configured: bool,
    promote_configured: bool,
}

impl TeamsNotifier {
    pub fn new(webhook: String, cleanup_configured: bool, promote_configured: bool) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(WEBHOOK_TIMEOUT))
            .build()
            .into();
        Self {
            webhook,
            agent,
            cleanup_configured,
            promote_configured,
        }
    }

    /// Any 2xx counts as delivered; Workflows webhooks answer 202.
    fn post(&self, alert: &TeamsAlert) -> Result<()> {
        let mut response = self
            .agent
            .post(&self.webhook)
            .send_json(card_payload(alert))
            .with_context(|| format!("post Teams alert {:?}", alert.title))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(anyhow!(
                "Teams webhook rejected {:?}: {} {}",
                alert.title,
                status.as_u16(),
                body.trim()
            ));
        }
        tracing::debug!(
            status = status.as_u16(),
            title = %alert.title,
            "teams alert delivered"
        );
        Ok(())
    }
}

impl Notifier for TeamsNotifier {
    /// Posts every alert even when an earlier one fails; returns the first failure.
    fn notify(&self, outcome: &OutcomeRecord) -> Result<()> {
        let alerts = build_alerts(outcome, self.cleanup_configured, self.promote_configured);
        let mut first_error = None;
        for alert in &alerts {
            if let Err(err) = self.post(alert) {
                tracing::error!(
                    title = %alert.title,
                    error = %format!("{err:#}"),
                    "teams alert failed"
                );
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::RecipeStage;
    use crate::outcome::{ImportDetails, PromotionDetails, RemovalDetails};
    use crate::recipe::TrustState;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Answer `responses.len()` requests in order; yields the request bodies.
    fn serve(responses: &[(&str, &str)]) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let url = format!("http://{}/webhook", listener.local_addr().expect("addr"));
        let responses: Vec<(String, String)> = responses
            .iter()
            .map(|(status, body)| (status.to_string(), body.to_string()))
            .collect();
        let handle = std::thread::spawn(move || {
            let mut bodies = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
                let mut content_length: usize = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).expect("read header");
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().expect("content length");
                        }
                    }
                }
                let mut request = vec![0_u8; content_length];
                reader.read_exact(&mut request).expect("read body");
                bodies.push(String::from_utf8_lossy(&request).into_owned());
                write!(
                    stream,
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
                .expect("write response");
            }
            bodies
        });
        (url, handle)
    }

    fn notifier(webhook: String, cleanup_configured: bool) -> TeamsNotifier {
        TeamsNotifier {
            webhook,
            agent: Agent::config_builder()
                .http_status_as_error(false)
                .proxy(None)
                .build()
                .into(),
            cleanup_configured,
            promote_configured: false,
        }
    }

    fn outcome() -> OutcomeRecord {
        OutcomeRecord {
            recipe_name: "Foo".to_string(),
            identifier: "com.example.Foo".to_string(),
            verified: TrustState::Verified,
            errored: false,
            ran: true,
            stage: RecipeStage::Classified,
            updated: false,
            removed: false,
            promoted: false,
            updated_version: None,
            removed_count: None,
            promoted_versions: None,
            failure_message: None,
            import: None,
            removal: None,
            promotion: None,
        }
    }

    #[test]
    fn quiet_outcome_sends_nothing() {
        assert!(build_alerts(&outcome(), true, true).is_empty());
    }

    #[test]
    fn trust_failure_wins_over_run_error() {
        let mut failed = outcome();
        failed.verified = TrustState::Failed;
        failed.errored = true;
        failed.failure_message = Some("hash mismatch".to_string());
        let alerts = build_alerts(&failed, false, false);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "❌ Foo failed trust verification");
        assert_eq!(alerts[0].message, "Update trust verification manually");
        assert!(alerts[0].error);
    }

    #[test]
    fn unchecked_recipes_are_not_reported_as_untrusted() {
        let mut unchecked = outcome();
        unchecked.verified = TrustState::Unchecked;
        assert!(build_alerts(&unchecked, false, false).is_empty());
    }

    #[test]
    fn run_error_uses_failure_message() {
        let mut errored = outcome();
        errored.errored = true;
        errored.failure_message = Some("Download failed".to_string());
        let alerts = build_alerts(&errored, false, false);
        assert_eq!(alerts[0].title, "❌ Foo failed");
        assert_eq!(alerts[0].message, "Download failed");
    }

    #[test]
    fn import_alert_links_to_intune() {
        let mut updated = outcome();
        updated.updated = true;
        updated.updated_version = Some("2.0".to_string());
        updated.import = Some(ImportDetails {
            name: Some("Foo".to_string()),
            intune_app_id: Some("app-1".to_string()),
            content_version_id: Some("7".to_string()),
        });
        let alerts = build_alerts(&updated, false, false);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "✅ Imported Foo 2.0");
        assert!(alerts[0].message.contains("**Intune App ID:** app-1"));

        let payload = card_payload(&alerts[0]);
        let content = &payload["attachments"][0]["content"];
        assert_eq!(
            content["actions"][0]["url"],
            format!("{INTUNE_APP_URL}app-1")
        );
        assert_eq!(content["body"][0]["style"], "good");
    }

    #[test]
    fn removal_and_promotion_need_configured_lists() {
        let mut both = outcome();
        both.removed = true;
        both.promoted = true;
        both.removal = Some(RemovalDetails {
            removed_count: Some("2".to_string()),
            removed_versions: Some("1.0, 1.1".to_string()),
            keep_count: Some("3".to_string()),
        });
        both.promotion = Some(PromotionDetails {
            promotions: Some("1.2".to_string()),
            blacklisted_versions: None,
        });

        assert!(build_alerts(&both, false, false).is_empty());

        let alerts = build_alerts(&both, true, true);
        let titles: Vec<&str> = alerts.iter().map(|alert| alert.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["🗑 Removed old versions of Foo", "🚀 Promoted Foo"]
        );
        assert!(alerts[0].message.contains("**Removed Versions:** 1.0, 1.1"));
    }

    #[test]
    fn error_cards_use_attention_style_without_actions() {
        let alert = TeamsAlert::error("❌ Foo failed".to_string(), "boom".to_string());
        let payload = card_payload(&alert);
        let content = &payload["attachments"][0]["content"];
        assert_eq!(content["body"][0]["style"], "attention");
        assert!(content.get("actions").is_none());
    }

    #[test]
    fn accepted_webhook_delivers_the_card() {
        let (url, server) = serve(&[("202 Accepted", "")]);
        let alert = TeamsAlert::info("✅ Imported Foo 2.0".to_string(), "ok".to_string());

        notifier(url, false).post(&alert).expect("202 is delivered");

        let bodies = server.join().expect("server thread");
        let card: Value = serde_json::from_str(&bodies[0]).expect("card json");
        assert_eq!(card["type"], "message");
        assert_eq!(
            card["attachments"][0]["content"]["type"],
            "AdaptiveCard"
        );
    }

    #[test]
    fn rejected_webhook_reports_status_and_body() {
        let (url, server) = serve(&[("500 Internal Server Error", "workflow is disabled")]);
        let alert = TeamsAlert::error("❌ Foo failed".to_string(), "boom".to_string());

        let err = notifier(url, false).post(&alert).expect_err("500 is an error");
        server.join().expect("server thread");

        let message = format!("{err:#}");
        assert!(message.contains("500"), "{message}");
        assert!(message.contains("workflow is disabled"), "{message}");
    }

    #[test]
    fn failed_alert_does_not_drop_the_rest() {
        let (url, server) = serve(&[
            ("500 Internal Server Error", "throttled"),
            ("200 OK", "1"),
        ]);
        let mut both = outcome();
        both.errored = true;
        both.failure_message = Some("Upload failed".to_string());
        both.removed = true;

        let err = notifier(url, true).notify(&both).expect_err("first alert fails");

        let bodies = server.join().expect("server thread");
        assert_eq!(bodies.len(), 2, "removal card is still posted");
        assert!(bodies[1].contains("Removed old versions of Foo"));
        assert!(format!("{err:#}").contains("throttled"));
    }
}
