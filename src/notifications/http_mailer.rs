use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{EmailMessage, MailError, Mailer};

/// Sends mail through a transactional-email HTTP API that accepts
/// `{from, to, to_name, subject, text}` with a bearer key.
#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    to_name: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: String, from: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&SendRequest {
                from: &self.from,
                to: &message.to,
                to_name: &message.to_name,
                subject: &message.subject,
                text: &message.text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "ana@example.com".to_string(),
            to_name: "Ana".to_string(),
            subject: "Your purchase".to_string(),
            text: "Thanks".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_posts_message_with_bearer_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/send")
            .match_header("authorization", "Bearer mail-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "from": "shop@example.com",
                "to": "ana@example.com",
                "subject": "Your purchase"
            })))
            .with_status(202)
            .create_async()
            .await;

        let mailer = HttpMailer::new(
            format!("{}/send", server.url()),
            "mail-key".to_string(),
            "shop@example.com".to_string(),
        );
        mailer.send(&message()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_surfaces_rejections() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/send")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let mailer = HttpMailer::new(
            format!("{}/send", server.url()),
            "mail-key".to_string(),
            "shop@example.com".to_string(),
        );
        let result = mailer.send(&message()).await;
        assert!(matches!(result, Err(MailError::Rejected { status: 500, .. })));
    }
}
