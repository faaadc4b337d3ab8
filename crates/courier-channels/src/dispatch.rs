//! Dispatch protocol — one send attempt per recipient, concurrently and
//! independently, with at most one template fallback when the gateway
//! reports that no conversation window is open.

use courier_core::{
    message::{DispatchOutcome, SendRequest},
    traits::GatewayClient,
};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Gateway error code: the recipient has no open conversation window, so
/// freeform sends are rejected and only approved templates go through.
pub const NO_OPEN_SESSION_CODE: i64 = 63016;

/// Optional template SIDs for the fallback path.
#[derive(Debug, Clone, Default)]
pub struct TemplateIds {
    /// Used when the send carries no media.
    pub text: Option<String>,
    /// Used when the send carries a media URL.
    pub media: Option<String>,
}

/// Sends one message to every configured recipient.
pub struct Dispatcher {
    gateway: Arc<dyn GatewayClient>,
    recipients: Vec<String>,
    templates: TemplateIds,
    max_body_len: usize,
}

impl Dispatcher {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        recipients: Vec<String>,
        templates: TemplateIds,
        max_body_len: usize,
    ) -> Self {
        Self {
            gateway,
            recipients,
            templates,
            max_body_len,
        }
    }

    /// Dispatch to every recipient concurrently.
    ///
    /// One recipient's failure never blocks or cancels another's attempt;
    /// every recipient gets exactly one plain attempt and at most one
    /// template fallback.
    pub async fn dispatch(
        &self,
        body: &str,
        media_url: Option<&str>,
    ) -> Vec<(String, DispatchOutcome)> {
        let mut set = JoinSet::new();

        for to in &self.recipients {
            let gateway = self.gateway.clone();
            let templates = self.templates.clone();
            let to = to.clone();
            let body = body.to_string();
            let media_url = media_url.map(str::to_string);
            let max_body_len = self.max_body_len;

            set.spawn(async move {
                let outcome = send_one(
                    gateway.as_ref(),
                    &to,
                    &body,
                    media_url.as_deref(),
                    &templates,
                    max_body_len,
                )
                .await;
                (to, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(self.recipients.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => outcomes.push(pair),
                Err(e) => error!("dispatch task panicked: {e}"),
            }
        }
        outcomes
    }
}

/// The per-recipient state machine: plain attempt, then on the
/// no-open-session code exactly one template attempt.
async fn send_one(
    gateway: &dyn GatewayClient,
    to: &str,
    body: &str,
    media_url: Option<&str>,
    templates: &TemplateIds,
    max_body_len: usize,
) -> DispatchOutcome {
    let plain = SendRequest {
        to: to.to_string(),
        body: Some(body.to_string()),
        media_url: media_url.map(str::to_string),
        ..Default::default()
    };

    let rejection = match gateway.send(&plain).await {
        Ok(()) => {
            info!("sent to {to}");
            return DispatchOutcome::Sent;
        }
        Err(e) => e,
    };

    if rejection.code != Some(NO_OPEN_SESSION_CODE) {
        error!("gateway error sending to {to}: {rejection}");
        return DispatchOutcome::Failed;
    }

    let template_sid = if media_url.is_some() {
        templates.media.clone()
    } else {
        templates.text.clone()
    };
    let Some(template_sid) = template_sid else {
        warn!("no conversation window for {to} and no template configured");
        return DispatchOutcome::Failed;
    };

    let templated = SendRequest {
        to: to.to_string(),
        template_sid: Some(template_sid),
        template_variables: Some(json!({ "1": truncate(body, max_body_len) }).to_string()),
        media_url: media_url.map(str::to_string),
        ..Default::default()
    };

    match gateway.send(&templated).await {
        Ok(()) => {
            info!("sent to {to} via template");
            DispatchOutcome::SentViaTemplate
        }
        Err(e) => {
            error!("template fallback to {to} failed: {e}");
            DispatchOutcome::Failed
        }
    }
}

/// Truncate to at most `max_len` bytes on a char boundary.
fn truncate(body: &str, max_len: usize) -> &str {
    if body.len() <= max_len {
        return body;
    }
    let mut end = max_len;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use courier_core::error::GatewayError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every request; plain sends fail with the configured code
    /// per recipient, template sends fail only when `fail_templates` is set.
    struct MockGateway {
        plain_failures: HashMap<String, i64>,
        fail_templates: bool,
        calls: Mutex<Vec<SendRequest>>,
    }

    impl MockGateway {
        fn new(plain_failures: &[(&str, i64)]) -> Self {
            Self {
                plain_failures: plain_failures
                    .iter()
                    .map(|(to, code)| (to.to_string(), *code))
                    .collect(),
                fail_templates: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<SendRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GatewayClient for MockGateway {
        fn name(&self) -> &str {
            "mock"
        }

        async fn send(&self, request: &SendRequest) -> Result<(), GatewayError> {
            self.calls.lock().unwrap().push(request.clone());
            if request.template_sid.is_some() {
                if self.fail_templates {
                    return Err(GatewayError {
                        code: Some(63018),
                        message: "rate limited".to_string(),
                    });
                }
                return Ok(());
            }
            match self.plain_failures.get(&request.to) {
                Some(code) => Err(GatewayError {
                    code: Some(*code),
                    message: "rejected".to_string(),
                }),
                None => Ok(()),
            }
        }
    }

    fn dispatcher(gateway: Arc<MockGateway>, recipients: &[&str]) -> Dispatcher {
        Dispatcher::new(
            gateway,
            recipients.iter().map(|r| r.to_string()).collect(),
            TemplateIds {
                text: Some("HXtext".to_string()),
                media: Some("HXmedia".to_string()),
            },
            1024,
        )
    }

    #[tokio::test]
    async fn test_plain_send_succeeds() {
        let gateway = Arc::new(MockGateway::new(&[]));
        let d = dispatcher(gateway.clone(), &["a"]);

        let outcomes = d.dispatch("hello", None).await;

        assert_eq!(outcomes, vec![("a".to_string(), DispatchOutcome::Sent)]);
        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body.as_deref(), Some("hello"));
        assert!(calls[0].template_sid.is_none());
    }

    #[tokio::test]
    async fn test_no_session_triggers_exactly_one_fallback() {
        let gateway = Arc::new(MockGateway::new(&[("a", NO_OPEN_SESSION_CODE)]));
        let d = dispatcher(gateway.clone(), &["a"]);

        let outcomes = d
            .dispatch("hello", Some("https://relay.example.com/media/x.jpg"))
            .await;

        assert_eq!(
            outcomes,
            vec![("a".to_string(), DispatchOutcome::SentViaTemplate)]
        );
        let calls = gateway.calls();
        assert_eq!(calls.len(), 2, "exactly one fallback attempt");
        assert_eq!(calls[1].template_sid.as_deref(), Some("HXmedia"));
        assert_eq!(
            calls[1].template_variables.as_deref(),
            Some(r#"{"1":"hello"}"#)
        );
        assert_eq!(
            calls[1].media_url.as_deref(),
            Some("https://relay.example.com/media/x.jpg")
        );
    }

    #[tokio::test]
    async fn test_text_template_picked_without_media() {
        let gateway = Arc::new(MockGateway::new(&[("a", NO_OPEN_SESSION_CODE)]));
        let d = dispatcher(gateway.clone(), &["a"]);

        d.dispatch("hello", None).await;

        let calls = gateway.calls();
        assert_eq!(calls[1].template_sid.as_deref(), Some("HXtext"));
        assert!(calls[1].media_url.is_none());
    }

    #[tokio::test]
    async fn test_other_codes_get_no_fallback() {
        let gateway = Arc::new(MockGateway::new(&[("a", 21610)]));
        let d = dispatcher(gateway.clone(), &["a"]);

        let outcomes = d.dispatch("hello", None).await;

        assert_eq!(outcomes, vec![("a".to_string(), DispatchOutcome::Failed)]);
        assert_eq!(gateway.calls().len(), 1, "no fallback for other codes");
    }

    #[tokio::test]
    async fn test_no_template_configured_means_no_retry() {
        let gateway = Arc::new(MockGateway::new(&[("a", NO_OPEN_SESSION_CODE)]));
        let d = Dispatcher::new(
            gateway.clone(),
            vec!["a".to_string()],
            TemplateIds::default(),
            1024,
        );

        let outcomes = d.dispatch("hello", None).await;

        assert_eq!(outcomes, vec![("a".to_string(), DispatchOutcome::Failed)]);
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_fallback_stops_after_second_attempt() {
        let mut gateway = MockGateway::new(&[("a", NO_OPEN_SESSION_CODE)]);
        gateway.fail_templates = true;
        let gateway = Arc::new(gateway);
        let d = dispatcher(gateway.clone(), &["a"]);

        let outcomes = d.dispatch("hello", None).await;

        assert_eq!(outcomes, vec![("a".to_string(), DispatchOutcome::Failed)]);
        assert_eq!(gateway.calls().len(), 2, "never a third attempt");
    }

    #[tokio::test]
    async fn test_one_failure_never_blocks_other_recipients() {
        let gateway = Arc::new(MockGateway::new(&[("b", 21610)]));
        let d = dispatcher(gateway.clone(), &["a", "b", "c"]);

        let mut outcomes = d.dispatch("hello", None).await;
        outcomes.sort_by(|x, y| x.0.cmp(&y.0));

        assert_eq!(
            outcomes,
            vec![
                ("a".to_string(), DispatchOutcome::Sent),
                ("b".to_string(), DispatchOutcome::Failed),
                ("c".to_string(), DispatchOutcome::Sent),
            ]
        );
        let attempted: Vec<String> = gateway.calls().into_iter().map(|c| c.to).collect();
        assert!(attempted.contains(&"a".to_string()));
        assert!(attempted.contains(&"b".to_string()));
        assert!(attempted.contains(&"c".to_string()));
    }

    #[tokio::test]
    async fn test_template_body_is_truncated() {
        let gateway = Arc::new(MockGateway::new(&[("a", NO_OPEN_SESSION_CODE)]));
        let d = Dispatcher::new(
            gateway.clone(),
            vec!["a".to_string()],
            TemplateIds {
                text: Some("HXtext".to_string()),
                media: None,
            },
            8,
        );

        d.dispatch("0123456789abcdef", None).await;

        let calls = gateway.calls();
        // Plain attempt keeps the full body; only the template truncates.
        assert_eq!(calls[0].body.as_deref(), Some("0123456789abcdef"));
        assert_eq!(
            calls[1].template_variables.as_deref(),
            Some(r#"{"1":"01234567"}"#)
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("héllo", 3), "hé");
        assert_eq!(truncate("short", 100), "short");
    }
}
