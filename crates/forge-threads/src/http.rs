use crate::sse::{SseDecoder, chunk_from_event};
use crate::{
    ChunkStream, ConnectionConfig, RunInput, StreamChunk, StreamRunOptions, Thread, ThreadClient,
    ThreadClientError,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use tracing::debug;

const API_KEY_HEADER: &str = "x-api-key";

/// `ThreadClient` over an agent server's REST API.
#[derive(Clone, Debug)]
pub struct HttpThreadClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpThreadClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Result<Self, ThreadClientError> {
        config.validate()?;
        Ok(Self::new(config.api_url.clone(), config.api_key.clone()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.endpoint(path));
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        resource: &'static str,
    ) -> Result<String, ThreadClientError> {
        let response = builder
            .send()
            .await
            .map_err(|err| ThreadClientError::Http(format!("{resource} request failed: {err}")))?;
        let status = response.status();
        let text = response.text().await.map_err(|err| {
            ThreadClientError::Http(format!("{resource} read body failed: {err}"))
        })?;
        if !status.is_success() {
            return Err(map_http_status(status, resource, text));
        }
        Ok(text)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        resource: &'static str,
    ) -> Result<T, ThreadClientError> {
        let text = self.send(builder, resource).await?;
        serde_json::from_str(&text)
            .map_err(|err| ThreadClientError::Decode(format!("{resource} json decode failed: {err}")))
    }
}

#[async_trait]
impl ThreadClient for HttpThreadClient {
    async fn create_thread(&self, metadata: Map<String, Value>) -> Result<Thread, ThreadClientError> {
        let builder = self
            .request(reqwest::Method::POST, "/threads")
            .json(&json!({ "metadata": metadata }));
        self.send_json(builder, "thread").await
    }

    async fn stream_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        input: RunInput,
        options: StreamRunOptions,
    ) -> Result<ChunkStream, ThreadClientError> {
        let body = run_request_body(assistant_id, input, options);
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/threads/{thread_id}/runs/stream"),
            )
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|err| ThreadClientError::Http(format!("run stream request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_http_status(status, "thread", text));
        }
        debug!(thread_id, assistant_id, "run stream opened");
        Ok(sse_chunk_stream(response.bytes_stream().boxed()))
    }

    async fn search_threads(
        &self,
        metadata: Map<String, Value>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Thread>, ThreadClientError> {
        let builder = self
            .request(reqwest::Method::POST, "/threads/search")
            .json(&json!({ "metadata": metadata, "limit": limit, "offset": offset }));
        self.send_json(builder, "threads").await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), ThreadClientError> {
        let builder = self.request(reqwest::Method::DELETE, &format!("/threads/{thread_id}"));
        self.send(builder, "thread").await.map(|_| ())
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Thread, ThreadClientError> {
        let builder = self.request(reqwest::Method::GET, &format!("/threads/{thread_id}"));
        self.send_json(builder, "thread").await
    }

    async fn update_thread_state(
        &self,
        thread_id: &str,
        values: Value,
        as_node: Option<&str>,
    ) -> Result<(), ThreadClientError> {
        let mut body = json!({ "values": values });
        if let Some(as_node) = as_node {
            body["as_node"] = Value::String(as_node.to_string());
        }
        let builder = self
            .request(reqwest::Method::POST, &format!("/threads/{thread_id}/state"))
            .json(&body);
        self.send(builder, "thread").await.map(|_| ())
    }

    async fn check_status(&self) -> Result<(), ThreadClientError> {
        let builder = self
            .request(reqwest::Method::POST, "/assistants/search")
            .json(&json!({ "limit": 1 }));
        self.send(builder, "assistants").await.map(|_| ())
    }
}

fn run_request_body(assistant_id: &str, input: RunInput, options: StreamRunOptions) -> Value {
    let mut body = json!({
        "assistant_id": assistant_id,
        "stream_mode": options.stream_mode,
    });
    if let Some(input) = input.input {
        body["input"] = input;
    }
    if let Some(command) = input.command {
        body["command"] = command;
    }
    if let Some(checkpoint) = options.checkpoint {
        body["checkpoint"] = json!(checkpoint);
    }
    body
}

struct SseBody {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: Option<SseDecoder>,
    ready: VecDeque<Result<StreamChunk, ThreadClientError>>,
}

fn sse_chunk_stream(body: BoxStream<'static, reqwest::Result<Bytes>>) -> ChunkStream {
    let state = SseBody {
        body,
        decoder: Some(SseDecoder::new()),
        ready: VecDeque::new(),
    };
    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            let decoder = state.decoder.as_mut()?;
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state
                        .ready
                        .extend(decoder.push_bytes(&bytes).into_iter().filter_map(chunk_from_event));
                }
                Some(Err(err)) => {
                    state.decoder = None;
                    return Some((
                        Err(ThreadClientError::Http(format!("run stream read failed: {err}"))),
                        state,
                    ));
                }
                None => {
                    let trailing = state.decoder.take().and_then(SseDecoder::finish);
                    state.ready.extend(trailing.and_then(chunk_from_event));
                }
            }
        }
    })
    .boxed()
}

fn map_http_status(
    status: reqwest::StatusCode,
    resource: &'static str,
    body: String,
) -> ThreadClientError {
    match status {
        reqwest::StatusCode::NOT_FOUND => ThreadClientError::NotFound { resource, id: body },
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            ThreadClientError::NotConfigured(format!("server rejected credentials ({status}): {body}"))
        }
        reqwest::StatusCode::UNPROCESSABLE_ENTITY | reqwest::StatusCode::BAD_REQUEST => {
            ThreadClientError::InvalidInput(body)
        }
        _ => ThreadClientError::Backend(format!("http request failed with status {status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Checkpoint;

    #[test]
    fn run_request_body_resume_with_checkpoint() {
        let options = StreamRunOptions::from_checkpoint(Checkpoint {
            thread_id: "t-1".to_string(),
            checkpoint_id: "c-9".to_string(),
            extra: Map::new(),
        });
        let body = run_request_body("agent", RunInput::resume(json!([{ "type": "accept" }])), options);
        assert_eq!(body["assistant_id"], "agent");
        assert_eq!(body["stream_mode"], json!(["values"]));
        assert_eq!(body["command"], json!({ "resume": [{ "type": "accept" }] }));
        assert_eq!(body["checkpoint"]["checkpoint_id"], "c-9");
        assert!(body.get("input").is_none());
    }

    #[test]
    fn map_http_status_variants() {
        assert!(matches!(
            map_http_status(reqwest::StatusCode::NOT_FOUND, "thread", "t-1".to_string()),
            ThreadClientError::NotFound { resource: "thread", .. }
        ));
        assert!(matches!(
            map_http_status(reqwest::StatusCode::UNPROCESSABLE_ENTITY, "thread", String::new()),
            ThreadClientError::InvalidInput(_)
        ));
        assert!(matches!(
            map_http_status(reqwest::StatusCode::BAD_GATEWAY, "thread", String::new()),
            ThreadClientError::Backend(_)
        ));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = HttpThreadClient::new("http://localhost:2024/", Some(String::new()));
        assert_eq!(client.endpoint("/threads"), "http://localhost:2024/threads");
        assert!(client.api_key.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn sse_chunk_stream_splits_events_across_body_chunks() {
        let parts: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"event: metadata\ndata: {\"run_id\":\"r\"}\n\nevent: val")),
            Ok(Bytes::from_static(b"ues\ndata: {\"messages\":[]}\n\n")),
            Ok(Bytes::from_static(b"event: error\ndata: boom\n\n")),
        ];
        let chunks: Vec<_> = sse_chunk_stream(futures::stream::iter(parts).boxed())
            .collect()
            .await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].as_ref().expect("metadata").event, "metadata");
        assert!(chunks[1].as_ref().expect("values").is_values());
        assert!(matches!(&chunks[2], Err(ThreadClientError::Stream(message)) if message == "boom"));
    }
}
