//! Firebase Realtime Database client over the REST API.
//!
//! Reads use the streaming endpoint (`Accept: text/event-stream`). The server
//! sends `put`/`patch` events relative to the subscribed location, so a local
//! copy of the record is kept and the full record is forwarded after every
//! change.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::sse::{SseDecoder, SseEvent};
use crate::store::{DeviceStore, StoreError, StoreEvent};

pub struct FirebaseStore {
    http: Client,
    base_url: String,
    record_path: String,
    auth_token: Option<String>,
    request_timeout: Duration,
    reconnect_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

enum StreamEnd {
    InboxClosed,
    Disconnected,
}

impl FirebaseStore {
    pub fn new(config: &DashboardConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(transport)?;

        Ok(Self {
            http,
            base_url: config.database_url.trim_end_matches('/').to_string(),
            record_path: config.record_path().trim_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            request_timeout: config.request_timeout,
            reconnect_delay: config.reconnect_delay,
        })
    }

    fn url(&self, field: Option<&str>) -> String {
        match field {
            Some(field) => format!("{}/{}/{}.json", self.base_url, self.record_path, field),
            None => format!("{}/{}.json", self.base_url, self.record_path),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.query(&[("auth", token.as_str())]),
            None => request,
        }
    }

    async fn stream_once(
        &self,
        inbox: &mpsc::Sender<StoreEvent>,
        tree: &mut Value,
    ) -> Result<StreamEnd, StoreError> {
        let request = self
            .authorize(self.http.get(self.url(None)))
            .header(ACCEPT, "text/event-stream");
        let response = check_status(request.send().await.map_err(transport)?).await?;
        info!(path = %self.record_path, "subscribed to device record");

        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = SseDecoder::new();

        loop {
            let chunk = tokio::select! {
                chunk = body.next() => chunk,
                _ = inbox.closed() => return Ok(StreamEnd::InboxClosed),
            };
            let Some(chunk) = chunk else {
                return Ok(StreamEnd::Disconnected);
            };
            let chunk = chunk.map_err(|err| StoreError::Stream(err.to_string()))?;

            for event in decoder.feed(&chunk)? {
                if !apply_event(tree, &event)? {
                    continue;
                }
                let record = (!tree.is_null()).then(|| tree.clone());
                if inbox.send(StoreEvent::Snapshot(record)).await.is_err() {
                    return Ok(StreamEnd::InboxClosed);
                }
            }
        }
    }
}

#[async_trait]
impl DeviceStore for FirebaseStore {
    async fn fetch(&self) -> Result<Value, StoreError> {
        let request = self
            .authorize(self.http.get(self.url(None)))
            .timeout(self.request_timeout);
        let response = check_status(request.send().await.map_err(transport)?).await?;
        let body = response.bytes().await.map_err(transport)?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn subscribe(&self, inbox: mpsc::Sender<StoreEvent>) -> Result<(), StoreError> {
        loop {
            let mut tree = Value::Null;
            let reason = match self.stream_once(&inbox, &mut tree).await {
                Ok(StreamEnd::InboxClosed) => {
                    debug!("inbox closed, ending subscription");
                    return Ok(());
                }
                Ok(StreamEnd::Disconnected) => "stream ended".to_string(),
                Err(err) => err.to_string(),
            };

            warn!(%reason, retry_in_ms = %self.reconnect_delay.as_millis(), "subscription interrupted");
            if inbox.send(StoreEvent::Error(reason)).await.is_err() {
                return Ok(());
            }

            tokio::select! {
                _ = sleep(self.reconnect_delay) => {}
                _ = inbox.closed() => return Ok(()),
            }
        }
    }

    async fn set_field(&self, field: &str, value: Value) -> Result<(), StoreError> {
        let request = self
            .authorize(self.http.put(self.url(Some(field))))
            .timeout(self.request_timeout)
            .json(&value);
        check_status(request.send().await.map_err(transport)?).await?;
        debug!(%field, %value, "field written");
        Ok(())
    }

    async fn update_fields(&self, fields: Map<String, Value>) -> Result<(), StoreError> {
        let request = self
            .authorize(self.http.patch(self.url(None)))
            .timeout(self.request_timeout)
            .json(&fields);
        check_status(request.send().await.map_err(transport)?).await?;
        debug!(fields = fields.len(), "record updated");
        Ok(())
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);

    Err(StoreError::Http {
        status: status.as_u16(),
        message,
    })
}

/// Folds one stream event into `tree`. Returns whether the record changed.
pub(crate) fn apply_event(tree: &mut Value, event: &SseEvent) -> Result<bool, StoreError> {
    match event.event.as_str() {
        "put" | "patch" => {
            let update: PathData = serde_json::from_str(&event.data)?;
            if event.event == "put" {
                apply_put(tree, &update.path, update.data);
            } else {
                apply_patch(tree, &update.path, update.data);
            }
            if tree.as_object().is_some_and(Map::is_empty) {
                *tree = Value::Null;
            }
            Ok(true)
        }
        "keep-alive" => Ok(false),
        "cancel" => Err(StoreError::Stream(format!("cancelled by server: {}", event.data))),
        "auth_revoked" => Err(StoreError::Stream("auth token revoked".to_string())),
        other => {
            debug!(event = %other, "ignoring stream event");
            Ok(false)
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    let Value::Object(map) = value else {
        unreachable!("value was just replaced by an object");
    };
    map
}

fn set_at(tree: &mut Value, path: &[&str], data: Value) {
    let Some((last, parents)) = path.split_last() else {
        *tree = data;
        return;
    };

    let mut node = tree;
    for segment in parents {
        node = ensure_object(node)
            .entry(segment.to_string())
            .or_insert(Value::Null);
    }

    let map = ensure_object(node);
    if data.is_null() {
        map.remove(*last);
    } else {
        map.insert(last.to_string(), data);
    }
}

pub(crate) fn apply_put(tree: &mut Value, path: &str, data: Value) {
    set_at(tree, &segments(path), data);
}

pub(crate) fn apply_patch(tree: &mut Value, path: &str, data: Value) {
    let Value::Object(children) = data else {
        return;
    };
    let base = segments(path);
    for (key, value) in children {
        let mut full = base.clone();
        full.extend(segments(&key));
        set_at(tree, &full, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const STREAM_BODY: &str = concat!(
        "event: put\n",
        "data: {\"path\":\"/\",\"data\":{\"aqi\":10,\"fire\":true}}\n",
        "\n",
        "event: keep-alive\n",
        "data: null\n",
        "\n",
        "event: patch\n",
        "data: {\"path\":\"/\",\"data\":{\"fire\":false}}\n",
        "\n",
    );

    /// Serves every connection with the same short event stream, then hangs up.
    async fn serve_short_streams(listener: TcpListener) {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = "HTTP/1.1 200 OK\r\n\
                            Content-Type: text/event-stream\r\n\
                            Connection: close\r\n\r\n";
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(STREAM_BODY.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    }

    async fn next_event(inbox: &mut mpsc::Receiver<StoreEvent>) -> StoreEvent {
        timeout(Duration::from_secs(5), inbox.recv())
            .await
            .expect("event within timeout")
            .expect("subscription still running")
    }

    fn event(name: &str, data: Value) -> SseEvent {
        SseEvent {
            event: name.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn root_put_replaces_record() {
        let mut tree = json!({"aqi": 1, "buzzer": "on"});

        apply_put(&mut tree, "/", json!({"aqi": 42}));

        assert_eq!(tree, json!({"aqi": 42}));
    }

    #[test]
    fn child_put_sets_and_null_removes() {
        let mut tree = json!({"aqi": 1, "buzzer": "on"});

        apply_put(&mut tree, "/sprinkler", json!("on"));
        apply_put(&mut tree, "/buzzer", Value::Null);

        assert_eq!(tree, json!({"aqi": 1, "sprinkler": "on"}));
    }

    #[test]
    fn patch_merges_children_at_path() {
        let mut tree = json!({"aqi": 1, "fire": true, "smoke": true});

        apply_patch(&mut tree, "/", json!({"fire": false, "smoke": false}));
        apply_patch(&mut tree, "/meta", json!({"fw/version": "1.2"}));

        assert_eq!(
            tree,
            json!({"aqi": 1, "fire": false, "smoke": false, "meta": {"fw": {"version": "1.2"}}})
        );
    }

    #[test]
    fn put_into_empty_tree_builds_objects() {
        let mut tree = Value::Null;

        apply_put(&mut tree, "/aqi", json!(80));

        assert_eq!(tree, json!({"aqi": 80}));
    }

    #[test]
    fn deleting_last_field_clears_record() {
        // Arrange
        let mut tree = json!({"aqi": 3});

        // Act
        let changed = apply_event(&mut tree, &event("put", json!({"path": "/aqi", "data": null})))
            .expect("valid event");

        // Assert
        assert!(changed);
        assert!(tree.is_null());
    }

    #[test]
    fn keep_alive_and_unknown_events_change_nothing() {
        let mut tree = json!({"aqi": 3});

        assert!(!apply_event(&mut tree, &event("keep-alive", Value::Null)).expect("ok"));
        assert!(!apply_event(&mut tree, &event("rules_debug", json!("x"))).expect("ok"));
        assert_eq!(tree, json!({"aqi": 3}));
    }

    #[test]
    fn cancel_and_revocation_are_errors() {
        let mut tree = Value::Null;

        let cancelled = apply_event(&mut tree, &event("cancel", json!("Permission denied")));
        let revoked = apply_event(&mut tree, &event("auth_revoked", json!("token expired")));

        assert!(matches!(cancelled, Err(StoreError::Stream(msg)) if msg.contains("Permission denied")));
        assert!(matches!(revoked, Err(StoreError::Stream(_))));
    }

    #[test]
    fn malformed_payload_is_json_error() {
        let mut tree = Value::Null;
        let bad = SseEvent {
            event: "put".to_string(),
            data: "{not json".to_string(),
        };

        assert!(matches!(apply_event(&mut tree, &bad), Err(StoreError::Json(_))));
    }

    #[test]
    fn urls_point_at_record_and_fields() {
        let config = DashboardConfig {
            database_url: "https://demo.firebaseio.com/".to_string(),
            ..DashboardConfig::default()
        };
        let store = FirebaseStore::new(&config).expect("client");

        assert_eq!(store.url(None), "https://demo.firebaseio.com/devices/ESP32_001.json");
        assert_eq!(
            store.url(Some("sprinkler")),
            "https://demo.firebaseio.com/devices/ESP32_001/sprinkler.json"
        );
    }

    #[tokio::test]
    async fn subscription_reconnects_after_stream_ends() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(serve_short_streams(listener));
        let config = DashboardConfig {
            database_url: format!("http://{addr}"),
            reconnect_delay: Duration::from_millis(10),
            ..DashboardConfig::default()
        };
        let store = FirebaseStore::new(&config).expect("client");
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(async move { store.subscribe(tx).await });

        // Act
        let mut events = Vec::new();
        for _ in 0..5 {
            events.push(next_event(&mut rx).await);
        }

        // Assert
        let expected = vec![
            StoreEvent::Snapshot(Some(json!({"aqi": 10, "fire": true}))),
            StoreEvent::Snapshot(Some(json!({"aqi": 10, "fire": false}))),
            StoreEvent::Error("stream ended".to_string()),
            StoreEvent::Snapshot(Some(json!({"aqi": 10, "fire": true}))),
            StoreEvent::Snapshot(Some(json!({"aqi": 10, "fire": false}))),
        ];
        assert_eq!(events, expected);

        drop(rx);
        let result = timeout(Duration::from_secs(5), task)
            .await
            .expect("subscription stops once the inbox is closed")
            .expect("join");
        assert!(result.is_ok());
    }
}
