//! Pushover alert delivery.
//!
//! Posts an [`AlertMessage`] to the Pushover messages API. Emergency
//! priority requires Pushover's `retry`/`expire` pair; those are fixed
//! here so the caregiver is re-paged every minute for half an hour.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::alerts::notifier::{AlertMessage, DeliveryError, Notifier, Priority};

pub const DEFAULT_API_URL: &str = "https://api.pushover.net/1/messages.json";

const EMERGENCY_RETRY_SECONDS: u32 = 60;
const EMERGENCY_EXPIRE_SECONDS: u32 = 1800;

#[derive(Clone)]
pub struct PushoverNotifier {
    api_url: String,
    api_token: String,
    user_key: String,
    http: Client,
}

impl PushoverNotifier {
    pub fn new(
        api_url: String,
        api_token: String,
        user_key: String,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DeliveryError::Network {
                message: err.to_string(),
            })?;

        Ok(Self {
            api_url,
            api_token,
            user_key,
            http,
        })
    }

    fn form(&self, message: &AlertMessage) -> Vec<(&'static str, String)> {
        let level = match message.priority {
            Priority::Normal => 0,
            Priority::High => 1,
            Priority::Emergency => 2,
        };

        let mut form = vec![
            ("token", self.api_token.clone()),
            ("user", self.user_key.clone()),
            ("title", message.title.clone()),
            ("message", message.body.clone()),
            ("priority", level.to_string()),
        ];
        if message.priority == Priority::Emergency {
            form.push(("retry", EMERGENCY_RETRY_SECONDS.to_string()));
            form.push(("expire", EMERGENCY_EXPIRE_SECONDS.to_string()));
        }
        form
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(&self.api_url)
            .form(&self.form(message))
            .send()
            .await
            .map_err(|err| DeliveryError::Network {
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        tracing::info!("Pushover notification delivered: {}", message.title);
        Ok(())
    }

    fn notifier_name(&self) -> &str {
        "Pushover"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn notifier(server: &MockServer) -> PushoverNotifier {
        PushoverNotifier::new(
            format!("{}/1/messages.json", server.uri()),
            "app-token".to_string(),
            "user-key".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn message(priority: Priority) -> AlertMessage {
        AlertMessage {
            title: "Missed bolus?".to_string(),
            body: "Glucose rose 80 mg/dL".to_string(),
            priority,
        }
    }

    #[tokio::test]
    async fn send_posts_form_with_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1/messages.json"))
            .and(body_string_contains("token=app-token"))
            .and(body_string_contains("user=user-key"))
            .and(body_string_contains("priority=1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":1}"#))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server).send(&message(Priority::High)).await.unwrap();
    }

    #[tokio::test]
    async fn emergency_priority_carries_retry_and_expire() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("priority=2"))
            .and(body_string_contains("retry=60"))
            .and(body_string_contains("expire=1800"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server)
            .send(&message(Priority::Emergency))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejected_request_is_a_delivery_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"status":0}"#))
            .mount(&server)
            .await;

        let err = notifier(&server)
            .send(&message(Priority::Normal))
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Rejected { status: 400, .. }));
    }
}
