//! Cursor-linked pagination
//!
//! A collection endpoint returns one page of items plus a way to reach the
//! next page. How the next page is announced is declared per endpoint with
//! [`CursorLocation`]:
//!
//! - [`CursorLocation::LinkHeader`]: `Link: <https://...>; rel="next"`
//! - [`CursorLocation::BodyField`]: `{"items": [...], "next": "<cursor or URL>"}`
//!
//! [`Pages`] (async) and [`BlockingPages`] walk those pages lazily: page N+1
//! is requested only after every item of page N has been handed out.

mod pages;

#[cfg(feature = "blocking")]
mod blocking;

#[cfg(feature = "blocking")]
pub use blocking::BlockingPages;
pub use pages::Pages;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use url::Url;

use crate::error::{Error, Result};
use crate::http::{ApiResponse, Request};
use crate::observability::log_page;

/// Where an endpoint puts the pointer to its next page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CursorLocation {
    /// `rel="next"` entry of the `Link` response header.
    #[default]
    LinkHeader,
    /// A string field of the response body.
    ///
    /// A value that is an absolute `http(s)` URL, or a path starting with `/`,
    /// is requested as-is. Anything else is an opaque token sent back as the
    /// `query_param` query parameter alongside the original parameters.
    BodyField {
        /// Body field holding the cursor
        field: String,
        /// Query parameter the cursor is sent back in
        query_param: String,
    },
}

impl CursorLocation {
    /// Body cursor in `"next"`, sent back as `cursor`.
    pub fn body_field() -> Self {
        Self::BodyField {
            field: "next".to_string(),
            query_param: "cursor".to_string(),
        }
    }

    /// Body cursor with custom field and parameter names.
    pub fn body_field_named(field: impl Into<String>, query_param: impl Into<String>) -> Self {
        Self::BodyField {
            field: field.into(),
            query_param: query_param.into(),
        }
    }
}

/// Per-endpoint pagination convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageConfig {
    /// Body field holding the page's items array
    pub items_key: String,
    /// Where the next-page pointer lives
    pub cursor: CursorLocation,
}

impl PageConfig {
    /// Items under `items_key`, next page from the `Link` header.
    pub fn new(items_key: impl Into<String>) -> Self {
        Self {
            items_key: items_key.into(),
            cursor: CursorLocation::LinkHeader,
        }
    }

    /// Items under `items_key`, next cursor in the body field `"next"`.
    pub fn body_cursor(items_key: impl Into<String>) -> Self {
        Self {
            items_key: items_key.into(),
            cursor: CursorLocation::body_field(),
        }
    }

    /// Replace the cursor convention.
    pub fn with_cursor(mut self, cursor: CursorLocation) -> Self {
        self.cursor = cursor;
        self
    }
}

/// Where a traversal stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Nothing fetched yet.
    NotStarted,
    /// A page request is in flight (or was interrupted and will be retried on
    /// the next pull).
    FetchingPage,
    /// Items of the current page are being handed out.
    HasBufferedItems,
    /// Every page has been consumed. Terminal.
    Exhausted,
    /// A page or item failed; nothing more will be produced. Terminal.
    Failed,
}

impl PageState {
    /// Whether no more items will be produced.
    pub fn is_terminal(self) -> bool {
        matches!(self, PageState::Exhausted | PageState::Failed)
    }
}

/// URL of the `rel="next"` entry in a `Link` header value, if any.
///
/// Handles several comma-separated link values, parameters in any order,
/// unquoted and space-separated `rel` values, and case-insensitive names.
pub fn parse_link_next(header: &str) -> Option<&str> {
    let mut rest = header;

    loop {
        let start = rest.find('<')?;
        let after = &rest[start + 1..];
        let end = after.find('>')?;
        let target = &after[..end];

        let tail = &after[end + 1..];
        let params_end = tail.find('<').unwrap_or(tail.len());
        let params = &tail[..params_end];

        if params.split(';').any(is_rel_next) {
            return Some(target.trim());
        }
        rest = &tail[params_end..];
    }
}

fn is_rel_next(param: &str) -> bool {
    let Some((name, value)) = param.split_once('=') else {
        return false;
    };
    if !name.trim().eq_ignore_ascii_case("rel") {
        return false;
    }
    value
        .trim()
        .trim_end_matches(',')
        .trim_matches('"')
        .split_whitespace()
        .any(|rel| rel.eq_ignore_ascii_case("next"))
}

/// Next move of a traversal, shared by the async and blocking front-ends.
#[derive(Debug)]
pub(crate) enum Step<I> {
    /// Buffered data, ready to hand out.
    Ready(I),
    /// The buffer is empty; this request fetches the next page.
    Fetch(Request),
    /// Nothing more.
    Done,
}

/// The state machine behind [`Pages`] and [`BlockingPages`], without any I/O.
#[derive(Debug)]
pub(crate) struct Traversal {
    config: PageConfig,
    base_url: Url,
    buffer: VecDeque<Value>,
    next_request: Option<Request>,
    state: PageState,
    pages_fetched: usize,
    items_yielded: usize,
    page_status: Option<u16>,
    page_tracking_id: Option<String>,
}

impl Traversal {
    pub(crate) fn new(config: PageConfig, base_url: Url, first: Request) -> Self {
        Self {
            config,
            base_url,
            buffer: VecDeque::new(),
            next_request: Some(first),
            state: PageState::NotStarted,
            pages_fetched: 0,
            items_yielded: 0,
            page_status: None,
            page_tracking_id: None,
        }
    }

    pub(crate) fn state(&self) -> PageState {
        self.state
    }

    pub(crate) fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub(crate) fn items_yielded(&self) -> usize {
        self.items_yielded
    }

    /// Next single item, or the fetch that has to happen first.
    pub(crate) fn step_item(&mut self) -> Step<Value> {
        if self.state.is_terminal() {
            return Step::Done;
        }
        match self.buffer.pop_front() {
            Some(raw) => Step::Ready(raw),
            None => self.pending_fetch(),
        }
    }

    /// The rest of the current page, or the fetch that has to happen first.
    pub(crate) fn step_page(&mut self) -> Step<Vec<Value>> {
        if self.state.is_terminal() {
            return Step::Done;
        }
        if self.buffer.is_empty() {
            return self.pending_fetch();
        }
        Step::Ready(self.buffer.drain(..).collect())
    }

    /// The request for the next page, if there is one.
    ///
    /// The cursor stays in place until the page it points at has arrived, so
    /// an interrupted fetch is simply repeated on the next pull.
    pub(crate) fn pending_fetch<I>(&mut self) -> Step<I> {
        match &self.next_request {
            Some(request) => {
                self.state = PageState::FetchingPage;
                Step::Fetch(request.clone())
            }
            None => {
                self.state = PageState::Exhausted;
                Step::Done
            }
        }
    }

    /// Record the outcome of a page fetch.
    ///
    /// The first page's errors are returned unchanged; later pages are wrapped
    /// in [`Error::PaginationBroken`]. Either way the traversal is `Failed`.
    pub(crate) fn accept(&mut self, request: &Request, fetched: Result<ApiResponse>) -> Result<()> {
        let parsed = fetched.and_then(|response| {
            let status = response.status().as_u16();
            let tracking_id = response.tracking_id().map(String::from);
            self.parse_page(request, response)
                .map(|(items, next)| (items, next, status, tracking_id))
        });
        match parsed {
            Ok((items, next, status, tracking_id)) => {
                self.pages_fetched += 1;
                self.page_status = Some(status);
                self.page_tracking_id = tracking_id;
                log_page(self.pages_fetched, items.len(), next.is_some());
                self.buffer = items;
                self.next_request = next;
                self.state = if !self.buffer.is_empty() {
                    PageState::HasBufferedItems
                } else if self.next_request.is_some() {
                    PageState::FetchingPage
                } else {
                    PageState::Exhausted
                };
                Ok(())
            }
            Err(err) => {
                self.state = PageState::Failed;
                self.next_request = None;
                if self.pages_fetched == 0 {
                    Err(err)
                } else {
                    Err(Error::PaginationBroken {
                        page: self.pages_fetched + 1,
                        items_yielded: self.items_yielded,
                        source: Box::new(err),
                    })
                }
            }
        }
    }

    /// Decode a drained page. Nothing is counted unless every item decodes.
    pub(crate) fn decode_page<T: DeserializeOwned>(&mut self, raw: Vec<Value>) -> Result<Vec<T>> {
        let mut items = Vec::with_capacity(raw.len());
        for (offset, value) in raw.into_iter().enumerate() {
            match serde_json::from_value(value) {
                Ok(item) => items.push(item),
                Err(err) => return Err(self.fail_decode(self.items_yielded + offset + 1, err)),
            }
        }
        self.items_yielded += items.len();
        self.mark_exhausted_if_drained();
        Ok(items)
    }

    /// Decode one raw item, tracking the yielded count and terminal states.
    pub(crate) fn decode<T: DeserializeOwned>(&mut self, raw: Value) -> Result<T> {
        match serde_json::from_value(raw) {
            Ok(item) => {
                self.items_yielded += 1;
                self.mark_exhausted_if_drained();
                Ok(item)
            }
            Err(err) => Err(self.fail_decode(self.items_yielded + 1, err)),
        }
    }

    fn mark_exhausted_if_drained(&mut self) {
        if self.buffer.is_empty() && self.next_request.is_none() {
            self.state = PageState::Exhausted;
        }
    }

    /// Stop the traversal on an undecodable item, blaming the page it came from.
    fn fail_decode(&mut self, position: usize, err: serde_json::Error) -> Error {
        self.state = PageState::Failed;
        self.buffer.clear();
        self.next_request = None;
        Error::decode(
            format!("item {}: {}", position, err),
            self.page_status,
            self.page_tracking_id.clone(),
        )
    }

    fn parse_page(
        &self,
        request: &Request,
        response: ApiResponse,
    ) -> Result<(VecDeque<Value>, Option<Request>)> {
        let status = Some(response.status().as_u16());
        let tracking_id = response.tracking_id().map(String::from);
        let next = self.next_page_request(request, &response)?;

        let items = match response.into_body() {
            Some(Value::Object(mut body)) => match body.remove(&self.config.items_key) {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(Error::decode(
                        format!("'{}' is not an array", self.config.items_key),
                        status,
                        tracking_id,
                    ));
                }
                None => {
                    return Err(Error::decode(
                        format!("missing '{}' in page body", self.config.items_key),
                        status,
                        tracking_id,
                    ));
                }
            },
            _ => {
                return Err(Error::decode(
                    "page body is not a JSON object",
                    status,
                    tracking_id,
                ));
            }
        };

        Ok((items.into(), next))
    }

    fn next_page_request(&self, request: &Request, response: &ApiResponse) -> Result<Option<Request>> {
        match &self.config.cursor {
            CursorLocation::LinkHeader => {
                let next = response
                    .headers()
                    .get_all(http::header::LINK)
                    .iter()
                    .filter_map(|value| value.to_str().ok())
                    .find_map(parse_link_next);

                let Some(next) = next else {
                    return Ok(None);
                };
                // Relative references resolve against the page that carried them.
                let current = request.resolve_url(&self.base_url)?;
                let url = current.join(next).map_err(|e| {
                    Error::InvalidUrl(format!("Link rel=\"next\" target '{}': {}", next, e))
                })?;
                Ok(Some(request.with_url(&url)))
            }
            CursorLocation::BodyField { field, query_param } => {
                let cursor = match response.body().and_then(|body| body.get(field)) {
                    None | Some(Value::Null) => return Ok(None),
                    Some(Value::String(s)) if s.is_empty() => return Ok(None),
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    Some(other) => {
                        return Err(Error::decode(
                            format!("cursor field '{}' is not a string: {}", field, other),
                            Some(response.status().as_u16()),
                            response.tracking_id().map(String::from),
                        ));
                    }
                };

                if cursor.starts_with("http://") || cursor.starts_with("https://") {
                    let url = Url::parse(&cursor)
                        .map_err(|e| Error::InvalidUrl(format!("{}: {}", cursor, e)))?;
                    Ok(Some(request.with_url(&url)))
                } else if cursor.starts_with('/') {
                    let url = self
                        .base_url
                        .join(&cursor)
                        .map_err(|e| Error::InvalidUrl(format!("{}: {}", cursor, e)))?;
                    Ok(Some(request.with_url(&url)))
                } else {
                    let current = request.resolve_url(&self.base_url)?;
                    Ok(Some(request.with_query_param(&current, query_param, &cursor)))
                }
            }
        }
    }
}
