//! Twilio WhatsApp gateway client.
//!
//! Posts to the Messages endpoint of the Twilio REST API; rejections are
//! surfaced as structured errors carrying Twilio's numeric error code.
//! Docs: <https://www.twilio.com/docs/messaging/api/message-resource>

use async_trait::async_trait;
use courier_core::{
    config::TwilioConfig,
    error::GatewayError,
    message::SendRequest,
    traits::GatewayClient,
};
use serde::Deserialize;
use tracing::debug;

/// Twilio implementation of the outbound gateway.
pub struct TwilioClient {
    config: TwilioConfig,
    client: reqwest::Client,
    messages_url: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

impl TwilioClient {
    /// Create a new client from config.
    pub fn new(config: TwilioConfig) -> Self {
        let messages_url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            config.account_sid
        );
        Self {
            config,
            client: reqwest::Client::new(),
            messages_url,
        }
    }
}

/// Build the form parameters for one send: a plain body or a template
/// reference, plus at most one media URL.
fn form_params(from: &str, request: &SendRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![("From", from.to_string()), ("To", request.to.clone())];

    if let Some(sid) = &request.template_sid {
        params.push(("ContentSid", sid.clone()));
        if let Some(vars) = &request.template_variables {
            params.push(("ContentVariables", vars.clone()));
        }
    } else {
        params.push(("Body", request.body.clone().unwrap_or_default()));
    }

    if let Some(url) = &request.media_url {
        params.push(("MediaUrl", url.clone()));
    }

    params
}

#[async_trait]
impl GatewayClient for TwilioClient {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn send(&self, request: &SendRequest) -> Result<(), GatewayError> {
        let params = form_params(&self.config.whatsapp_from, request);
        debug!("twilio send to {}", request.to);

        let resp = self
            .client
            .post(&self.messages_url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::transport(format!("twilio request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(parse_error_body(status.as_u16(), &body))
    }
}

/// Parse a Twilio error response into a structured gateway error.
fn parse_error_body(status: u16, body: &str) -> GatewayError {
    match serde_json::from_str::<TwilioErrorBody>(body) {
        Ok(parsed) => GatewayError {
            code: parsed.code,
            message: parsed
                .message
                .unwrap_or_else(|| format!("twilio returned status {status}")),
        },
        Err(_) => GatewayError {
            code: None,
            message: format!("twilio returned status {status}: {body}"),
        },
    }
}
