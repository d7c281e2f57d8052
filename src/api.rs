use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::TransportError;
use crate::models::{Caller, Message, OutgoingMessage, RelationshipRecord, ThreadAddress};
use crate::transport::{RelationshipDirectory, SessionProvider, ThreadTransport};

#[derive(Debug, Deserialize)]
struct OrganizationIdentity {
    id: String,
}

/// reqwest-backed relationship directory and thread transport.
///
/// A rejected credential is refreshed through the session once and the
/// request replayed; a second rejection surfaces as `Unauthorized`.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<dyn SessionProvider>,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, session: Arc<dyn SessionProvider>) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {e}")))?;
        let base_url: String = base_url.into();
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), session })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn messages_url(&self, address: &ThreadAddress) -> String {
        self.url(&format!("/api/chats/{}/messages", address.key))
    }

    async fn execute(&self, build: impl Fn() -> RequestBuilder) -> Result<Response, TransportError> {
        let resp = dispatch(authorize(build(), self.session.credential().as_deref())).await?;
        if !is_auth_rejection(resp.status()) {
            return ensure_success(resp).await;
        }

        debug!("Credential rejected, refreshing session");
        let token = self.session.refresh().await.map_err(|e| {
            warn!("Session refresh failed: {e}");
            TransportError::Unauthorized
        })?;
        let resp = dispatch(authorize(build(), Some(&token))).await?;
        if is_auth_rejection(resp.status()) {
            return Err(TransportError::Unauthorized);
        }
        ensure_success(resp).await
    }

    async fn request_json<T: DeserializeOwned>(&self, build: impl Fn() -> RequestBuilder) -> Result<T, TransportError> {
        self.execute(build)
            .await?
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RelationshipDirectory for HttpClient {
    async fn relationships(&self, caller: &Caller) -> Result<Vec<RelationshipRecord>, TransportError> {
        debug!("Fetching relationships for {}", caller.user_id);
        let url = self.url("/api/relationships");
        self.request_json(|| self.http.get(&url)).await
    }

    async fn organization_identity(&self, caller: &Caller) -> Result<String, TransportError> {
        debug!("Fetching organization identity for {}", caller.user_id);
        let url = self.url("/api/organizations/mine");
        let identity: OrganizationIdentity = self.request_json(|| self.http.get(&url)).await?;
        Ok(identity.id)
    }
}

#[async_trait]
impl ThreadTransport for HttpClient {
    async fn fetch_thread(&self, address: &ThreadAddress) -> Result<Vec<Message>, TransportError> {
        let url = self.messages_url(address);
        self.request_json(|| {
            let req = self.http.get(&url);
            match &address.counterpart_id {
                Some(counterpart) => req.query(&[("counterpart_id", counterpart)]),
                None => req,
            }
        })
        .await
    }

    async fn send_message(
        &self,
        address: &ThreadAddress,
        message: &OutgoingMessage,
    ) -> Result<Message, TransportError> {
        let url = self.messages_url(address);
        self.request_json(|| {
            let req = self.http.post(&url);
            match &message.attachment {
                Some(_) => req.multipart(multipart_body(message)),
                None => req.json(message),
            }
        })
        .await
    }
}

fn multipart_body(message: &OutgoingMessage) -> Form {
    let mut form = Form::new().text("kind", message.kind.as_str());
    let fields = [
        ("text", &message.text),
        ("order_ref", &message.order_ref),
        ("product_ref", &message.product_ref),
        ("counterpart_id", &message.counterpart_id),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            form = form.text(name, value.clone());
        }
    }
    if let Some(attachment) = &message.attachment {
        let part = Part::bytes(attachment.bytes.clone()).file_name(attachment.name.clone());
        form = form.part("file", part);
    }
    form
}

fn authorize(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => req.bearer_auth(token),
        None => req,
    }
}

async fn dispatch(req: RequestBuilder) -> Result<Response, TransportError> {
    req.send().await.map_err(|e| TransportError::Network(e.to_string()))
}

fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

async fn ensure_success(resp: Response) -> Result<Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

fn status_error(status: StatusCode, body: String) -> TransportError {
    if is_auth_rejection(status) {
        return TransportError::Unauthorized;
    }
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown").to_string()
    } else {
        body.trim().to_string()
    };
    TransportError::Server { status: status.as_u16(), message }
}
