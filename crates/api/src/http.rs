use std::time::Duration;

use docdraft_domain::{ChatMessage, Conversation, ConversationId};
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::prelude::*;
use tokio::sync::{mpsc, oneshot};

use super::backend::{
    AccountBackend, BoxFuture, ConversationBackend, HistoryBackend, SectionBackend,
};
use super::error::{
    ApiResult, BuildClientSnafu, DecodeSnafu, InvalidBaseUrlSnafu, RejectedSnafu, StatusSnafu,
    TransportSnafu,
};
use super::events::{FrameEvent, FrameStreamHandle, StreamRoute, event_channel};
use super::frames::FrameParser;
use super::wire::{
    ConversationIdBody, ConversationRequest, DocumentContent, ErrorBody, HistoryHealth,
    HistoryListEntry, HistoryReadResponse, RenameBody, SectionGenerateBody,
    SectionGenerateResponse, UpdateBody, UserInfo,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub base_url: String,
    /// Applies to every call except streamed completions, which run until done or cancelled.
    pub request_timeout: Duration,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// [`Collaborator`](super::Collaborator) speaking the chat backend's JSON-over-HTTP API.
#[derive(Debug, Clone)]
pub struct HttpCollaborator {
    config: HttpConfig,
    client: reqwest::Client,
}

impl HttpCollaborator {
    pub fn new(config: HttpConfig) -> ApiResult<Self> {
        ensure!(
            config.base_url.starts_with("http://") || config.base_url.starts_with("https://"),
            InvalidBaseUrlSnafu {
                stage: "http-new",
                base_url: config.base_url.clone(),
            }
        );

        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .context(BuildClientSnafu { stage: "http-new" })?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// `path` followed by `segment` as a single percent-encoded path segment.
    fn segment_url(&self, path: &str, segment: &str) -> ApiResult<reqwest::Url> {
        let invalid = || {
            InvalidBaseUrlSnafu {
                stage: "segment-url",
                base_url: self.config.base_url.clone(),
            }
            .build()
        };

        let mut url = reqwest::Url::parse(&self.url(path)).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    fn open_stream(&self, route: StreamRoute, request: ConversationRequest) -> FrameStreamHandle {
        let (event_tx, stream, cancel_rx) = event_channel(route);
        let worker = Box::pin(run_stream_worker(
            self.client.clone(),
            self.url(route.path()),
            route,
            request,
            event_tx,
            cancel_rx,
        ));

        FrameStreamHandle { stream, worker }
    }

    async fn send_json<B>(
        &self,
        method: reqwest::Method,
        endpoint: &'static str,
        body: Option<&B>,
    ) -> ApiResult<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let mut builder = self
            .client
            .request(method, self.url(endpoint))
            .timeout(self.config.request_timeout);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.context(TransportSnafu {
            stage: "send-request",
            endpoint,
        })?;

        ensure_success(endpoint, response).await
    }

    async fn post<B>(&self, endpoint: &'static str, body: &B) -> ApiResult<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        self.send_json(reqwest::Method::POST, endpoint, Some(body)).await
    }
}

async fn ensure_success(
    endpoint: &'static str,
    response: reqwest::Response,
) -> ApiResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = error_detail(response)
        .await
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    tracing::warn!(endpoint, status = status.as_u16(), message = %message, "collaborator returned an error status");

    StatusSnafu {
        stage: "check-status",
        endpoint,
        status: status.as_u16(),
        message,
    }
    .fail()
}

async fn error_detail(response: reqwest::Response) -> Option<String> {
    let body = response.bytes().await.ok()?;
    serde_json::from_slice::<ErrorBody>(&body)
        .ok()
        .and_then(|body| body.message())
}

async fn decode<T>(endpoint: &'static str, response: reqwest::Response) -> ApiResult<T>
where
    T: DeserializeOwned,
{
    let body = response.bytes().await.context(TransportSnafu {
        stage: "read-body",
        endpoint,
    })?;
    serde_json::from_slice(&body).context(DecodeSnafu {
        stage: "decode-body",
        endpoint,
    })
}

async fn run_stream_worker(
    client: reqwest::Client,
    url: String,
    route: StreamRoute,
    request: ConversationRequest,
    event_tx: mpsc::UnboundedSender<FrameEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    tracing::debug!(
        route = ?route,
        message_count = request.messages.len(),
        conversation_id = ?request.conversation_id,
        "opening completion stream"
    );

    let sent = tokio::select! {
        _ = &mut cancel_rx => {
            tracing::debug!(route = ?route, "completion stream cancelled before response");
            return;
        }
        sent = client.post(&url).json(&request).send() => sent,
    };

    let response = match sent {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(route = ?route, error = %error, "failed to open completion stream");
            let _ = event_tx.send(FrameEvent::Failed {
                remote_message: None,
                reason: error.to_string(),
            });
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let detail = error_detail(response).await;
        tracing::warn!(route = ?route, status = status.as_u16(), detail = ?detail, "completion request rejected");
        let _ = event_tx.send(FrameEvent::Rejected {
            status: status.as_u16(),
            detail,
        });
        return;
    }

    let mut body = Box::pin(response.bytes_stream());
    let mut parser = FrameParser::new();

    loop {
        tokio::select! {
            _ = &mut cancel_rx => {
                // Dropping the body stream aborts the connection.
                tracing::debug!(route = ?route, "completion stream cancelled");
                return;
            }
            next_chunk = body.next() => {
                match next_chunk {
                    Some(Ok(chunk)) => {
                        for frame in parser.feed_bytes(&chunk) {
                            let event = match frame {
                                Ok(frame) => FrameEvent::Frame(frame),
                                Err(error) => {
                                    tracing::warn!(route = ?route, error = %error, "completion stream carried a failing frame");
                                    let _ = event_tx.send(FrameEvent::Failed {
                                        remote_message: error.remote_message().map(str::to_string),
                                        reason: error.to_string(),
                                    });
                                    return;
                                }
                            };
                            if event_tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Some(Err(error)) => {
                        tracing::warn!(route = ?route, error = %error, "completion stream read failed");
                        let _ = event_tx.send(FrameEvent::Failed {
                            remote_message: None,
                            reason: error.to_string(),
                        });
                        return;
                    }
                    None => break,
                }
            }
        }
    }

    if let Err(error) = parser.finish() {
        tracing::warn!(route = ?route, error = %error, "completion stream ended mid-frame");
        let _ = event_tx.send(FrameEvent::Failed {
            remote_message: None,
            reason: error.to_string(),
        });
        return;
    }

    tracing::debug!(route = ?route, "completion stream finished");
    let _ = event_tx.send(FrameEvent::Done);
}

impl ConversationBackend for HttpCollaborator {
    fn stream_conversation(&self, request: ConversationRequest) -> FrameStreamHandle {
        self.open_stream(StreamRoute::Conversation, request)
    }

    fn stream_history_generate(&self, request: ConversationRequest) -> FrameStreamHandle {
        self.open_stream(StreamRoute::HistoryGenerate, request)
    }
}

impl HistoryBackend for HttpCollaborator {
    fn ensure_history<'a>(&'a self) -> BoxFuture<'a, HistoryHealth> {
        Box::pin(async move {
            let endpoint = "/history/ensure";
            let response = match self
                .client
                .get(self.url(endpoint))
                .timeout(self.config.request_timeout)
                .send()
                .await
            {
                Ok(response) => response,
                Err(error) => {
                    tracing::warn!(endpoint, error = %error, "history health probe failed");
                    return HistoryHealth::NotWorking(error.to_string());
                }
            };

            if response.status().is_success() {
                return HistoryHealth::Working;
            }

            let status = response.status();
            let detail = error_detail(response)
                .await
                .unwrap_or_else(|| format!("status {}", status.as_u16()));
            let health = HistoryHealth::from_error_text(&detail);
            tracing::info!(endpoint, health = ?health, "history store unavailable");
            health
        })
    }

    fn list_history<'a>(&'a self, offset: usize) -> BoxFuture<'a, ApiResult<Vec<Conversation>>> {
        Box::pin(async move {
            let endpoint = "/history/list";
            let response = self
                .client
                .get(self.url(endpoint))
                .query(&[("offset", offset)])
                .timeout(self.config.request_timeout)
                .send()
                .await
                .context(TransportSnafu {
                    stage: "list-history-send",
                    endpoint,
                })?;
            let response = ensure_success(endpoint, response).await?;
            let entries = decode::<Vec<HistoryListEntry>>(endpoint, response).await?;

            tracing::debug!(offset, count = entries.len(), "listed history page");
            Ok(entries
                .into_iter()
                .map(HistoryListEntry::into_conversation)
                .collect())
        })
    }

    fn read_history<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<Vec<ChatMessage>>> {
        Box::pin(async move {
            let endpoint = "/history/read";
            let response = self
                .post(endpoint, &ConversationIdBody { conversation_id })
                .await?;
            let read = decode::<HistoryReadResponse>(endpoint, response).await?;

            Ok(read
                .messages
                .into_iter()
                .map(|message| message.into_chat_message())
                .collect())
        })
    }

    fn update_history<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            let endpoint = "/history/update";
            let response = self
                .post(
                    endpoint,
                    &UpdateBody {
                        conversation_id,
                        messages,
                    },
                )
                .await?;

            let body = decode::<serde_json::Value>(endpoint, response).await?;
            let rejected = body
                .get("success")
                .and_then(serde_json::Value::as_bool)
                .is_some_and(|success| !success);
            ensure!(
                !rejected,
                RejectedSnafu {
                    stage: "update-history",
                    endpoint,
                    details: body.to_string(),
                }
            );

            tracing::debug!(conversation_id = %conversation_id, message_count = messages.len(), "saved conversation");
            Ok(())
        })
    }

    fn clear_history_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.post("/history/clear", &ConversationIdBody { conversation_id })
                .await?;
            Ok(())
        })
    }

    fn delete_history<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.post("/history/delete", &ConversationIdBody { conversation_id })
                .await?;
            Ok(())
        })
    }

    fn delete_all_history<'a>(&'a self) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.post("/history/delete_all", &serde_json::json!({}))
                .await?;
            Ok(())
        })
    }

    fn rename_history<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        title: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.post(
                "/history/rename",
                &RenameBody {
                    conversation_id,
                    title,
                },
            )
            .await?;
            Ok(())
        })
    }
}

impl SectionBackend for HttpCollaborator {
    fn generate_section<'a>(
        &'a self,
        title: &'a str,
        description: &'a str,
    ) -> BoxFuture<'a, ApiResult<String>> {
        Box::pin(async move {
            let endpoint = "/section/generate";
            let response = self
                .post(
                    endpoint,
                    &SectionGenerateBody {
                        section_title: title,
                        section_description: description,
                    },
                )
                .await?;
            let generated = decode::<SectionGenerateResponse>(endpoint, response).await?;

            tracing::debug!(section = %title, chars = generated.section_content.chars().count(), "generated section");
            Ok(generated.section_content)
        })
    }
}

impl AccountBackend for HttpCollaborator {
    fn user_info<'a>(&'a self) -> BoxFuture<'a, ApiResult<Vec<UserInfo>>> {
        Box::pin(async move {
            let endpoint = "/user/info";
            let response = self
                .client
                .get(self.url(endpoint))
                .timeout(self.config.request_timeout)
                .send()
                .await
                .context(TransportSnafu {
                    stage: "user-info-send",
                    endpoint,
                })?;

            // Anonymous deployments answer with an error status; that means "no claims".
            if !response.status().is_success() {
                tracing::debug!(status = response.status().as_u16(), "no user info available");
                return Ok(Vec::new());
            }

            decode(endpoint, response).await
        })
    }

    fn document<'a>(&'a self, document_id: &'a str) -> BoxFuture<'a, ApiResult<DocumentContent>> {
        Box::pin(async move {
            let endpoint = "/document";
            let response = self
                .client
                .get(self.segment_url(endpoint, document_id)?)
                .timeout(self.config.request_timeout)
                .send()
                .await
                .context(TransportSnafu {
                    stage: "document-send",
                    endpoint,
                })?;
            let response = ensure_success(endpoint, response).await?;
            decode(endpoint, response).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_trimmed_and_validated() {
        let config = HttpConfig::new(" http://localhost:5000/ ");
        assert_eq!(config.base_url, "http://localhost:5000");
        assert!(HttpCollaborator::new(config).is_ok());

        let error = HttpCollaborator::new(HttpConfig::new("localhost")).unwrap_err();
        assert!(matches!(error, crate::ApiError::InvalidBaseUrl { .. }));
    }
}
