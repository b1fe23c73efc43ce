use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use sentinel_core::config::OutboundConfig;
use sentinel_core::domain::turn::Turn;
use sentinel_core::outbound::{CriticalAlert, OutboundSink};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, warn};

#[derive(Clone)]
struct AlertChannel {
    url: String,
    token: Option<SecretString>,
}

/// Delivers turns to the analytics endpoint and critical alerts to the alert
/// endpoint. Every call is spawned onto the runtime and never awaited by the
/// caller; failures are logged and dropped.
#[derive(Clone)]
pub struct HttpOutboundSink {
    client: Client,
    analytics_url: Option<String>,
    alerts: Option<AlertChannel>,
}

impl HttpOutboundSink {
    pub fn from_config(config: &OutboundConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        let analytics_url =
            config.analytics_url.clone().filter(|_| config.analytics_enabled);
        let alerts = config
            .alert_url
            .clone()
            .filter(|_| config.alerts_enabled)
            .map(|url| AlertChannel { url, token: config.alert_token.clone() });
        Ok(Self { client, analytics_url, alerts })
    }

    pub fn analytics_enabled(&self) -> bool {
        self.analytics_url.is_some()
    }

    pub fn alerts_enabled(&self) -> bool {
        self.alerts.is_some()
    }

    fn dispatch<T>(&self, channel: &'static str, url: String, token: Option<SecretString>, body: T)
    where
        T: Serialize + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            warn!(
                event_name = "outbound.dispatch.no_runtime",
                channel,
                "no async runtime available; outbound delivery dropped"
            );
            return;
        };
        let client = self.client.clone();
        runtime.spawn(async move {
            let mut request = client.post(&url).json(&body);
            if let Some(token) = &token {
                request = request.bearer_auth(token.expose_secret());
            }
            match request.send().await.and_then(|response| response.error_for_status()) {
                Ok(response) => debug!(
                    event_name = "outbound.delivery.sent",
                    channel,
                    status = response.status().as_u16(),
                    "outbound delivery accepted"
                ),
                Err(error) => warn!(
                    event_name = "outbound.delivery.failed",
                    channel,
                    error = %error,
                    "outbound delivery failed"
                ),
            }
        });
    }
}

impl OutboundSink for HttpOutboundSink {
    fn publish_turn(&self, turn: &Turn) {
        match &self.analytics_url {
            Some(url) => self.dispatch("analytics", url.clone(), None, turn.clone()),
            None => debug!(
                event_name = "outbound.analytics.disabled",
                turn_id = %turn.id,
                "analytics channel disabled; turn not published"
            ),
        }
    }

    fn raise_alert(&self, alert: &CriticalAlert) {
        match &self.alerts {
            Some(channel) => {
                self.dispatch("alerts", channel.url.clone(), channel.token.clone(), alert.clone())
            }
            None => debug!(
                event_name = "outbound.alerts.disabled",
                conversation_id = %alert.conversation_id,
                error_count = alert.errors.len(),
                "alert channel disabled; critical alert logged only"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sentinel_core::config::AppConfig;
    use sentinel_core::domain::turn::ConversationId;
    use sentinel_core::outbound::{CriticalAlert, OutboundSink};

    use super::HttpOutboundSink;

    #[test]
    fn disabled_channels_are_not_wired() {
        let sink = HttpOutboundSink::from_config(&AppConfig::default().outbound).expect("client");
        assert!(!sink.analytics_enabled());
        assert!(!sink.alerts_enabled());
    }

    #[test]
    fn url_without_flag_stays_disabled() {
        let mut config = AppConfig::default().outbound;
        config.alert_url = Some("http://127.0.0.1:9/alerts".to_string());
        let sink = HttpOutboundSink::from_config(&config).expect("client");
        assert!(!sink.alerts_enabled());
    }

    #[test]
    fn dispatch_outside_a_runtime_is_dropped_quietly() {
        let mut config = AppConfig::default().outbound;
        config.alerts_enabled = true;
        config.alert_url = Some("http://127.0.0.1:9/alerts".to_string());
        let sink = HttpOutboundSink::from_config(&config).expect("client");
        assert!(sink.alerts_enabled());

        sink.raise_alert(&CriticalAlert {
            conversation_id: ConversationId("conv-1".to_string()),
            errors: Vec::new(),
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn unreachable_endpoint_does_not_fail_the_caller() {
        let mut config = AppConfig::default().outbound;
        config.alerts_enabled = true;
        config.alert_url = Some("http://127.0.0.1:9/alerts".to_string());
        config.timeout_secs = 1;
        let sink = HttpOutboundSink::from_config(&config).expect("client");

        sink.raise_alert(&CriticalAlert {
            conversation_id: ConversationId("conv-2".to_string()),
            errors: Vec::new(),
            timestamp: Utc::now(),
        });
        tokio::task::yield_now().await;
    }
}
