//! Push-provider plumbing.
//!
//! [`PushProvider`] is the seam to whatever delivers pushes; [`PushClient`]
//! turns each of its calls into a [`NotificationChannel`]; [`Fanout`] drives
//! the provider from the outcome of datastore cascades.

mod fanout;
mod http;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use fanout::{Delivered, Fanout};
pub use http::HttpPushProvider;

use crate::{
    completion::{self, Completion, Dropped},
    config::PushConfig,
    ErrorKind,
};

pub type NotificationResult<T> = Result<T, NotificationError>;

/// Result channel of one push-provider call.
pub type NotificationChannel<T> = Completion<T, NotificationError>;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("An error occurred while {op}: {source}")]
    Http {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("An error occurred while {op}: {message}")]
    Provider { op: &'static str, message: String },

    #[error("push call dropped before delivering a result")]
    Dropped,
}

impl From<Dropped> for NotificationError {
    fn from(_: Dropped) -> Self {
        NotificationError::Dropped
    }
}

/// One failed push call and the provider-side id it was about.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub target: String,
    pub error: NotificationError,
}

/// Every push call of one fan-out that failed. Never rolls anything back:
/// the datastore change it accompanies is already committed.
#[derive(Debug, Error)]
pub struct NotificationDeliveryError {
    pub failures: Vec<DeliveryFailure>,
}

impl NotificationDeliveryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::NotificationDelivery
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for NotificationDeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} push notification call(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.target, failure.error)?;
        }
        Ok(())
    }
}

/// What a room topic publish carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    pub text: String,
    pub badge: i64,
}

/// The push service. Ids handed back are opaque provider-side identifiers;
/// `None` means the provider keeps no state for that object.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn create_topic(&self, room_id: &str) -> NotificationResult<Option<String>>;
    async fn delete_topic(&self, topic_id: &str) -> NotificationResult<()>;
    async fn create_endpoint(&self, token: &str) -> NotificationResult<Option<String>>;
    async fn delete_endpoint(&self, endpoint_id: &str) -> NotificationResult<()>;
    async fn subscribe(&self, topic_id: &str, endpoint_id: &str) -> NotificationResult<Option<String>>;
    async fn unsubscribe(&self, subscription_id: &str) -> NotificationResult<()>;
    async fn publish(&self, topic_id: &str, info: &MessageInfo) -> NotificationResult<()>;
}

/// Push disabled: every call succeeds without side effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPushProvider;

#[async_trait]
impl PushProvider for NoopPushProvider {
    async fn create_topic(&self, room_id: &str) -> NotificationResult<Option<String>> {
        debug!(target: "notification", room_id, "push disabled, skipping create topic");
        Ok(None)
    }

    async fn delete_topic(&self, _topic_id: &str) -> NotificationResult<()> {
        Ok(())
    }

    async fn create_endpoint(&self, _token: &str) -> NotificationResult<Option<String>> {
        debug!(target: "notification", "push disabled, skipping create endpoint");
        Ok(None)
    }

    async fn delete_endpoint(&self, _endpoint_id: &str) -> NotificationResult<()> {
        Ok(())
    }

    async fn subscribe(&self, _topic_id: &str, _endpoint_id: &str) -> NotificationResult<Option<String>> {
        Ok(None)
    }

    async fn unsubscribe(&self, _subscription_id: &str) -> NotificationResult<()> {
        Ok(())
    }

    async fn publish(&self, topic_id: &str, _info: &MessageInfo) -> NotificationResult<()> {
        debug!(target: "notification", topic_id, "push disabled, skipping publish");
        Ok(())
    }
}

/// Builds the provider named by `cfg`.
pub fn provider_from_config(cfg: &PushConfig) -> Arc<dyn PushProvider> {
    match cfg {
        PushConfig::None => Arc::new(NoopPushProvider),
        PushConfig::Http { endpoint, application } => {
            Arc::new(HttpPushProvider::new(endpoint.clone(), application.clone()))
        }
    }
}

/// Non-blocking face of a [`PushProvider`]: each call runs on its own task
/// and yields exactly one result.
#[derive(Clone)]
pub struct PushClient {
    provider: Arc<dyn PushProvider>,
}

impl PushClient {
    pub fn new(provider: Arc<dyn PushProvider>) -> Self {
        Self { provider }
    }

    pub fn create_topic(&self, room_id: String) -> NotificationChannel<Option<String>> {
        let provider = self.provider.clone();
        completion::spawn(async move { provider.create_topic(&room_id).await })
    }

    pub fn delete_topic(&self, topic_id: String) -> NotificationChannel<()> {
        let provider = self.provider.clone();
        completion::spawn(async move { provider.delete_topic(&topic_id).await })
    }

    pub fn create_endpoint(&self, token: String) -> NotificationChannel<Option<String>> {
        let provider = self.provider.clone();
        completion::spawn(async move { provider.create_endpoint(&token).await })
    }

    pub fn delete_endpoint(&self, endpoint_id: String) -> NotificationChannel<()> {
        let provider = self.provider.clone();
        completion::spawn(async move { provider.delete_endpoint(&endpoint_id).await })
    }

    pub fn subscribe(&self, topic_id: String, endpoint_id: String) -> NotificationChannel<Option<String>> {
        let provider = self.provider.clone();
        completion::spawn(async move { provider.subscribe(&topic_id, &endpoint_id).await })
    }

    pub fn unsubscribe(&self, subscription_id: String) -> NotificationChannel<()> {
        let provider = self.provider.clone();
        completion::spawn(async move { provider.unsubscribe(&subscription_id).await })
    }

    pub fn publish(&self, topic_id: String, info: MessageInfo) -> NotificationChannel<()> {
        let provider = self.provider.clone();
        completion::spawn(async move { provider.publish(&topic_id, &info).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_provider_keeps_no_state() {
        let client = PushClient::new(provider_from_config(&PushConfig::None));
        assert_eq!(client.create_endpoint("token".into()).await.unwrap(), None);
        client.unsubscribe("sub".into()).await.unwrap();
        client
            .publish("topic".into(), MessageInfo { text: "hi".into(), badge: 1 })
            .await
            .unwrap();
    }

    #[test]
    fn delivery_error_lists_every_failure() {
        let err = NotificationDeliveryError {
            failures: vec![
                DeliveryFailure {
                    target: "sub-1".into(),
                    error: NotificationError::Provider { op: "unsubscribing", message: "gone".into() },
                },
                DeliveryFailure { target: "ep-1".into(), error: NotificationError::Dropped },
            ],
        };
        assert_eq!(err.kind(), ErrorKind::NotificationDelivery);
        assert_eq!(err.len(), 2);
        let text = err.to_string();
        assert!(text.starts_with("2 push notification call(s) failed"));
        assert!(text.contains("sub-1: An error occurred while unsubscribing: gone"));
    }
}
