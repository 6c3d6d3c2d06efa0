//! Authenticated Graph transport client.
//!
//! Every request goes through the same pipeline:
//!
//! 1. Resolve the resource-relative path against the configured base URL
//! 2. Ask the [`Authenticator`] for a bearer token (no network I/O if cached)
//! 3. Send through the [`HttpBackend`]
//! 4. Normalize any failure into a [`GraphError`] at the point the response
//!    is received
//! 5. Retry transient failures under the [`RetryPolicy`]
//!
//! Collection endpoints are walked page by page with [`PageStream`], which
//! follows `@odata.nextLink` until the remote stops advertising one or the
//! page cap is reached.

use std::sync::Arc;
use std::time::Duration;

use officecal_core::{GraphError, GraphResult};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::auth::Authenticator;
use crate::config::GraphConfig;
use crate::http::{Body, HttpBackend, HttpRequest, Method, ReqwestBackend};
use crate::normalize;
use crate::retry::RetryPolicy;

const NEXT_LINK: &str = "@odata.nextLink";

/// One logical call against the API.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    paginate: bool,
    deadline: Option<Instant>,
}

impl RequestDescriptor {
    /// Creates a descriptor for `path`, relative to the API base URL.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            paginate: false,
            deadline: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Adds a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds several query parameters.
    pub fn with_params(mut self, params: &[(&str, &str)]) -> Self {
        self.query
            .extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Marks the request as a collection listing whose pages are accumulated.
    pub fn paginated(mut self) -> Self {
        self.paginate = true;
        self
    }

    /// Aborts the request (including retries and further pages) at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Aborts the request after `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_paginated(&self) -> bool {
        self.paginate
    }
}

/// Graph API client.
pub struct GraphClient {
    base_url: Url,
    max_pages: usize,
    retry: RetryPolicy,
    backend: Arc<dyn HttpBackend>,
    auth: Arc<Authenticator>,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url.as_str())
            .field("max_pages", &self.max_pages)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    /// Creates a client that talks to the network with `reqwest`.
    pub fn new(config: GraphConfig) -> GraphResult<Self> {
        let backend = ReqwestBackend::new(config.timeout, &config.user_agent)?;
        Self::with_backend(config, Arc::new(backend))
    }

    /// Creates a client over an arbitrary backend.
    pub fn with_backend(config: GraphConfig, backend: Arc<dyn HttpBackend>) -> GraphResult<Self> {
        config.validate().map_err(GraphError::configuration)?;
        let base_url = config
            .parsed_base_url()
            .map_err(GraphError::configuration)?;
        let auth = Arc::new(Authenticator::new(&config, backend.clone()));

        debug!(base_url = %base_url, authority = %config.authority(), "graph client created");
        Ok(Self {
            base_url,
            max_pages: config.max_pages,
            retry: config.retry,
            backend,
            auth,
        })
    }

    /// Returns the authenticator shared by all requests of this client.
    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// GET a single resource.
    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> GraphResult<Value> {
        self.send(RequestDescriptor::get(path).with_params(params))
            .await
    }

    /// GET every item of a collection, following next links.
    pub async fn get_all(&self, path: &str, params: &[(&str, &str)]) -> GraphResult<Vec<Value>> {
        self.collect(RequestDescriptor::get(path).with_params(params))
            .await
    }

    /// POST a JSON body.
    pub async fn post(&self, path: &str, body: Value) -> GraphResult<Value> {
        self.send(RequestDescriptor::post(path, body)).await
    }

    /// PATCH a JSON body.
    pub async fn patch(&self, path: &str, body: Value) -> GraphResult<Value> {
        self.send(RequestDescriptor::patch(path, body)).await
    }

    /// DELETE a resource.
    pub async fn delete(&self, path: &str) -> GraphResult<()> {
        self.send(RequestDescriptor::delete(path)).await.map(|_| ())
    }

    /// Sends a descriptor.
    ///
    /// Paginated descriptors resolve to a JSON array of all items.
    pub async fn send(&self, request: RequestDescriptor) -> GraphResult<Value> {
        if request.paginate {
            return self.collect(request).await.map(Value::Array);
        }
        let url = self.resolve(&request.path, &request.query)?;
        self.execute(request.method, &url, request.body.as_ref(), request.deadline)
            .await
    }

    /// Fetches every page of a collection and concatenates the items in order.
    pub async fn collect(&self, request: RequestDescriptor) -> GraphResult<Vec<Value>> {
        let mut pages = self.pages(request)?;
        let mut items = Vec::new();
        while let Some(page) = pages.next_page().await? {
            items.extend(page);
        }
        debug!(
            pages = pages.pages_fetched(),
            items = items.len(),
            "collection complete"
        );
        Ok(items)
    }

    /// Returns a lazy sequence of pages for a collection GET.
    pub fn pages(&self, request: RequestDescriptor) -> GraphResult<PageStream<'_>> {
        if request.method != Method::Get {
            return Err(GraphError::configuration(format!(
                "only GET collections can be paginated, not {}",
                request.method.as_str()
            )));
        }
        let first = self.resolve(&request.path, &request.query)?;
        Ok(PageStream {
            client: self,
            next: Some(first),
            fetched: 0,
            deadline: request.deadline,
        })
    }

    /// Builds the absolute URL for a resource-relative path.
    fn resolve(&self, path: &str, query: &[(String, String)]) -> GraphResult<Url> {
        if path.contains("://") {
            return Err(GraphError::configuration(format!(
                "request paths must be relative to the API base URL, got {}",
                path
            )));
        }

        let (path, inline_query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };

        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            self.base_url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.set_query(inline_query);
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }

    /// Sends one request under the retry policy and decodes the result.
    async fn execute(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
        deadline: Option<Instant>,
    ) -> GraphResult<Value> {
        self.retry
            .run(deadline, |attempt| async move {
                let token = self.auth.get_valid_token().await?;

                debug!(
                    method = method.as_str(),
                    path = url.path(),
                    attempt,
                    "sending request"
                );
                let request = HttpRequest {
                    method,
                    url: url.clone(),
                    bearer: Some(token),
                    body: body.cloned().map(Body::Json),
                };

                let response = self
                    .backend
                    .execute(request)
                    .await
                    .map_err(normalize::error_from_transport)?;

                if !response.is_success() {
                    let err =
                        normalize::error_from_response(&response, &self.retry.retryable_statuses);
                    debug!(status = response.status, error = %err, "request failed");
                    return Err(err);
                }
                normalize::decode_success(&response)
            })
            .await
    }

    fn check_next_link(&self, link: &str) -> GraphResult<Url> {
        let url = Url::parse(link).map_err(|e| {
            GraphError::invalid_response(format!("unparseable next link {:?}: {}", link, e))
        })?;
        if url.origin() != self.base_url.origin() {
            return Err(GraphError::invalid_response(format!(
                "next link points outside {}: {}",
                self.base_url.origin().ascii_serialization(),
                url.origin().ascii_serialization()
            )));
        }
        Ok(url)
    }
}

/// Lazy, finite sequence of collection pages.
///
/// Each page is fetched under the retry policy. After an error the stream is
/// finished; a fresh call starts again from the first page.
#[derive(Debug)]
pub struct PageStream<'a> {
    client: &'a GraphClient,
    next: Option<Url>,
    fetched: usize,
    deadline: Option<Instant>,
}

impl PageStream<'_> {
    /// Fetches the next page, or returns `None` when the collection is exhausted.
    ///
    /// Fails with `PaginationLimitExceeded` instead of fetching a page beyond
    /// the configured cap.
    pub async fn next_page(&mut self) -> GraphResult<Option<Vec<Value>>> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };
        if self.fetched >= self.client.max_pages {
            return Err(GraphError::pagination_limit(self.client.max_pages));
        }

        let page = self
            .client
            .execute(Method::Get, &url, None, self.deadline)
            .await?;
        self.fetched += 1;

        let (items, next) = split_page(page)?;
        if let Some(link) = next {
            self.next = Some(self.client.check_next_link(&link)?);
        }

        debug!(
            page = self.fetched,
            items = items.len(),
            more = self.next.is_some(),
            "fetched page"
        );
        Ok(Some(items))
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.fetched
    }
}

fn split_page(page: Value) -> GraphResult<(Vec<Value>, Option<String>)> {
    let Value::Object(mut page) = page else {
        return Err(GraphError::invalid_response(
            "collection page is not a JSON object",
        ));
    };
    let items = match page.remove("value") {
        Some(Value::Array(items)) => items,
        _ => {
            return Err(GraphError::invalid_response(
                "collection page has no value array",
            ));
        }
    };
    let next = match page.remove(NEXT_LINK) {
        Some(Value::String(link)) if !link.is_empty() => Some(link),
        _ => None,
    };
    Ok((items, next))
}
