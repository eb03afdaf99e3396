use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use super::{MessageInfo, NotificationError, NotificationResult, PushProvider};

/// Push gateway reached over JSON/HTTP.
///
/// Routes, relative to `endpoint`:
/// `POST /v1/topics`, `DELETE /v1/topics/{id}`, `POST /v1/topics/{id}/publish`,
/// `POST /v1/endpoints`, `DELETE /v1/endpoints/{id}`,
/// `POST /v1/subscriptions`, `DELETE /v1/subscriptions/{id}`.
#[derive(Debug, Clone)]
pub struct HttpPushProvider {
    client: reqwest::Client,
    endpoint: String,
    application: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTopic<'a> {
    application: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateEndpoint<'a> {
    application: &'a str,
    token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Subscribe<'a> {
    topic_id: &'a str,
    endpoint_id: &'a str,
}

impl HttpPushProvider {
    pub fn new(endpoint: impl Into<String>, application: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            application: application.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.endpoint.trim_end_matches('/'), path)
    }

    async fn send(&self, op: &'static str, req: reqwest::RequestBuilder) -> NotificationResult<reqwest::Response> {
        let http = |source| NotificationError::Http { op, source };
        req.send().await.map_err(http)?.error_for_status().map_err(http)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        op: &'static str,
        path: &str,
        body: &B,
    ) -> NotificationResult<R> {
        let res = self.send(op, self.client.post(self.url(path)).json(body)).await?;
        res.json().await.map_err(|source| NotificationError::Http { op, source })
    }

    async fn delete(&self, op: &'static str, path: &str) -> NotificationResult<()> {
        self.send(op, self.client.delete(self.url(path))).await?;
        Ok(())
    }
}

/// The per-platform envelope the gateway forwards to APNs and FCM.
fn publish_body(info: &MessageInfo) -> serde_json::Value {
    json!({
        "default": info.text,
        "apns": { "aps": { "alert": info.text, "badge": info.badge } },
        "gcm": { "data": { "message": info.text, "badge": info.badge } },
    })
}

#[async_trait]
impl PushProvider for HttpPushProvider {
    #[instrument(target = "notification", skip(self), err)]
    async fn create_topic(&self, room_id: &str) -> NotificationResult<Option<String>> {
        let body = CreateTopic { application: &self.application, name: room_id };
        let created: Created = self.post("creating topic", "topics", &body).await?;
        Ok(Some(created.id))
    }

    #[instrument(target = "notification", skip(self), err)]
    async fn delete_topic(&self, topic_id: &str) -> NotificationResult<()> {
        self.delete("deleting topic", &format!("topics/{topic_id}")).await
    }

    #[instrument(target = "notification", skip_all, err)]
    async fn create_endpoint(&self, token: &str) -> NotificationResult<Option<String>> {
        let body = CreateEndpoint { application: &self.application, token };
        let created: Created = self.post("creating endpoint", "endpoints", &body).await?;
        Ok(Some(created.id))
    }

    #[instrument(target = "notification", skip(self), err)]
    async fn delete_endpoint(&self, endpoint_id: &str) -> NotificationResult<()> {
        self.delete("deleting endpoint", &format!("endpoints/{endpoint_id}")).await
    }

    #[instrument(target = "notification", skip(self), err)]
    async fn subscribe(&self, topic_id: &str, endpoint_id: &str) -> NotificationResult<Option<String>> {
        let body = Subscribe { topic_id, endpoint_id };
        let created: Created = self.post("subscribing", "subscriptions", &body).await?;
        Ok(Some(created.id))
    }

    #[instrument(target = "notification", skip(self), err)]
    async fn unsubscribe(&self, subscription_id: &str) -> NotificationResult<()> {
        self.delete("unsubscribing", &format!("subscriptions/{subscription_id}")).await
    }

    #[instrument(target = "notification", skip(self, info), err)]
    async fn publish(&self, topic_id: &str, info: &MessageInfo) -> NotificationResult<()> {
        let req = self
            .client
            .post(self.url(&format!("topics/{topic_id}/publish")))
            .json(&publish_body(info));
        self.send("publishing", req).await?;
        info!(target: "notification", topic_id, "published message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_without_double_slash() {
        let provider = HttpPushProvider::new("http://push.local/", "swagchat");
        assert_eq!(provider.url("topics/t1"), "http://push.local/v1/topics/t1");
    }

    #[test]
    fn publish_body_carries_both_platforms() {
        let body = publish_body(&MessageInfo { text: "hello".into(), badge: 3 });
        assert_eq!(body["default"], "hello");
        assert_eq!(body["apns"]["aps"]["badge"], 3);
        assert_eq!(body["gcm"]["data"]["message"], "hello");
    }
}
