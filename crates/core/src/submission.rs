//! Scrape job submission payload and its validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Parameters a client submits to start a scrape job.
///
/// Credentials and the CAPTCHA key are required; the Discord webhook is
/// optional. Both `snake_case` and `camelCase` field names are accepted.
/// Missing fields deserialize as empty so validation can name them.
#[derive(Clone, Deserialize, Serialize, Validate)]
pub struct ScrapeRequest {
    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub username: String,

    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub password: String,

    #[serde(default, alias = "captchaApiKey")]
    #[validate(custom(function = "not_blank"))]
    pub captcha_api_key: String,

    #[serde(default, alias = "webhookUrl", alias = "discordWebhook")]
    #[validate(url)]
    pub discord_webhook: Option<String>,
}

// Credentials must never reach the logs.
impl std::fmt::Debug for ScrapeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeRequest")
            .field("username", &self.username)
            .field("password", &"***")
            .field("captcha_api_key", &"***")
            .field("discord_webhook", &self.discord_webhook.is_some())
            .finish()
    }
}

impl ScrapeRequest {
    /// Normalise and validate the submission.
    ///
    /// Blank webhooks are treated as absent. Returns
    /// [`CoreError::Validation`] naming every offending field.
    pub fn validated(mut self) -> Result<Self, CoreError> {
        if self
            .discord_webhook
            .as_deref()
            .is_some_and(|w| w.trim().is_empty())
        {
            self.discord_webhook = None;
        }

        self.validate().map_err(|errors| {
            let field_errors = errors.field_errors();
            let mut fields: Vec<&str> = field_errors.keys().map(|k| k.as_ref()).collect();
            fields.sort_unstable();
            CoreError::Validation(format!("Missing or invalid fields: {}", fields.join(", ")))
        })?;

        Ok(self)
    }
}

fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn request(username: &str, password: &str, key: &str) -> ScrapeRequest {
        ScrapeRequest {
            username: username.to_string(),
            password: password.to_string(),
            captcha_api_key: key.to_string(),
            discord_webhook: None,
        }
    }

    #[test]
    fn complete_request_is_accepted() {
        assert!(request("u", "p", "k").validated().is_ok());
    }

    #[test]
    fn blank_required_fields_are_named() {
        let result = request("u", "  ", "").validated();
        assert_matches!(
            result,
            Err(CoreError::Validation(msg)) if msg.contains("captcha_api_key") && msg.contains("password") && !msg.contains("username")
        );
    }

    #[test]
    fn blank_webhook_is_dropped() {
        let mut req = request("u", "p", "k");
        req.discord_webhook = Some("   ".to_string());
        let req = req.validated().unwrap();
        assert!(req.discord_webhook.is_none());
    }

    #[test]
    fn malformed_webhook_is_rejected() {
        let mut req = request("u", "p", "k");
        req.discord_webhook = Some("not a url".to_string());
        assert_matches!(req.validated(), Err(CoreError::Validation(msg)) if msg.contains("discord_webhook"));
    }

    #[test]
    fn camel_case_aliases_deserialize() {
        let req: ScrapeRequest = serde_json::from_value(serde_json::json!({
            "username": "u",
            "password": "p",
            "captchaApiKey": "k",
            "webhookUrl": "https://discord.com/api/webhooks/1/abc",
        }))
        .unwrap();
        assert_eq!(req.captcha_api_key, "k");
        assert!(req.discord_webhook.is_some());
    }

    #[test]
    fn missing_fields_are_reported_by_validation() {
        let req: ScrapeRequest = serde_json::from_value(serde_json::json!({"username": "u"})).unwrap();
        assert_matches!(
            req.validated(),
            Err(CoreError::Validation(msg)) if msg == "Missing or invalid fields: captcha_api_key, password"
        );
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", request("alice", "hunter2", "secret-key"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("secret-key"));
    }
}
