use futures::Stream;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use super::{PageConfig, PageState, Step, Traversal};
use crate::error::Result;
use crate::http::Request;
use crate::session::Session;

/// Lazy async traversal of a paginated collection.
///
/// Each page is fetched through the owning [`Session`], so it gets the same
/// retry, auth-refresh and logging behaviour as any other call. Dropping a
/// pending `next()` leaves the traversal resumable: the interrupted page is
/// requested again on the next pull.
#[derive(Debug)]
pub struct Pages<T> {
    session: Session,
    traversal: Traversal,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Pages<T> {
    /// Next item, fetching the next page when the current one is used up.
    ///
    /// `None` once the collection is exhausted or after an error.
    pub async fn next(&mut self) -> Option<Result<T>> {
        loop {
            match self.traversal.step_item() {
                Step::Ready(raw) => return Some(self.traversal.decode(raw)),
                Step::Fetch(request) => {
                    if let Err(err) = self.fetch(request).await {
                        return Some(Err(err));
                    }
                }
                Step::Done => return None,
            }
        }
    }

    /// Remaining items of the current page, or the whole next page.
    ///
    /// Empty pages that still point at a next page are skipped.
    pub async fn next_page(&mut self) -> Option<Result<Vec<T>>> {
        loop {
            match self.traversal.step_page() {
                Step::Ready(raw) => return Some(self.traversal.decode_page(raw)),
                Step::Fetch(request) => {
                    if let Err(err) = self.fetch(request).await {
                        return Some(Err(err));
                    }
                }
                Step::Done => return None,
            }
        }
    }

    /// Drain every remaining item.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await {
            items.extend(page?);
        }
        Ok(items)
    }

    /// Consume the traversal as a [`Stream`] of items.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        futures::stream::unfold(self, |mut pages| async move {
            pages.next().await.map(|item| (item, pages))
        })
    }

    /// Current traversal state.
    pub fn state(&self) -> PageState {
        self.traversal.state()
    }

    /// Pages successfully fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.traversal.pages_fetched()
    }

    /// Items handed out so far.
    pub fn items_yielded(&self) -> usize {
        self.traversal.items_yielded()
    }

    async fn fetch(&mut self, request: Request) -> Result<()> {
        let fetched = self.session.execute_ref(&request).await;
        self.traversal.accept(&request, fetched)
    }
}

impl Session {
    /// Walk a paginated collection starting at `request`.
    ///
    /// The first page is fetched before this returns, so a bad first request
    /// fails here with the call's own error.
    pub async fn follow_pagination<T: DeserializeOwned>(
        &self,
        request: Request,
        config: PageConfig,
    ) -> Result<Pages<T>> {
        let mut pages = Pages {
            session: self.clone(),
            traversal: Traversal::new(config, self.base_url().clone(), request),
            _item: PhantomData,
        };
        if let Step::Fetch(first) = pages.traversal.pending_fetch::<()>() {
            pages.fetch(first).await?;
        }
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use dialtone_core::sleep::RecordingSleeper;
    use dialtone_transport::{HttpRequest, HttpResponse, Transport, TransportError};
    use futures::StreamExt;
    use http::{HeaderMap, StatusCode};
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct PagedTransport {
        replies: Mutex<VecDeque<(u16, String)>>,
        urls: Mutex<Vec<String>>,
    }

    impl PagedTransport {
        fn new(replies: &[(u16, &str)]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .iter()
                        .map(|(status, body)| (*status, body.to_string()))
                        .collect(),
                ),
                urls: Mutex::default(),
            })
        }

        fn urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for PagedTransport {
        async fn send(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpResponse, TransportError> {
            self.urls.lock().unwrap().push(request.url.clone());
            let (status, body) = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected request");
            Ok(HttpResponse::new(
                StatusCode::from_u16(status).unwrap(),
                HeaderMap::new(),
                body,
            ))
        }
    }

    fn session(transport: Arc<PagedTransport>) -> Session {
        Session::builder()
            .access_token("token")
            .base_url("https://api.example.com/v1")
            .transport(transport)
            .sleeper(Arc::new(RecordingSleeper::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_items_in_order_across_pages() {
        let transport = PagedTransport::new(&[
            (200, r#"{"items":["a","b"],"next":"c2"}"#),
            (200, r#"{"items":["c"],"next":null}"#),
        ]);
        let session = session(transport.clone());

        let mut pages = session
            .follow_pagination::<String>(Request::get("items"), PageConfig::body_cursor("items"))
            .await
            .unwrap();
        assert_eq!(pages.pages_fetched(), 1);
        assert_eq!(pages.state(), PageState::HasBufferedItems);

        let mut seen = Vec::new();
        while let Some(item) = pages.next().await {
            seen.push(item.unwrap());
        }

        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(pages.state(), PageState::Exhausted);
        assert_eq!(pages.items_yielded(), 3);
        assert_eq!(
            transport.urls(),
            vec![
                "https://api.example.com/v1/items",
                "https://api.example.com/v1/items?cursor=c2",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let transport = PagedTransport::new(&[(200, r#"{"items":[]}"#)]);
        let mut pages = session(transport)
            .follow_pagination::<String>(Request::get("items"), PageConfig::body_cursor("items"))
            .await
            .unwrap();

        assert_eq!(pages.state(), PageState::Exhausted);
        assert!(pages.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_middle_page_is_skipped() {
        let transport = PagedTransport::new(&[
            (200, r#"{"items":[1],"next":"p2"}"#),
            (200, r#"{"items":[],"next":"p3"}"#),
            (200, r#"{"items":[2]}"#),
        ]);
        let pages = session(transport)
            .follow_pagination::<u32>(Request::get("items"), PageConfig::body_cursor("items"))
            .await
            .unwrap();

        assert_eq!(pages.collect_all().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_next_page_and_stream() {
        let transport = PagedTransport::new(&[
            (200, r#"{"items":[1,2],"next":"p2"}"#),
            (200, r#"{"items":[3]}"#),
        ]);
        let mut pages = session(transport.clone())
            .follow_pagination::<u32>(Request::get("items"), PageConfig::body_cursor("items"))
            .await
            .unwrap();

        assert_eq!(pages.next_page().await.unwrap().unwrap(), vec![1, 2]);

        let rest: Vec<u32> = pages
            .into_stream()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(rest, vec![3]);
        assert_eq!(transport.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_first_page_failure_surfaces_call_error() {
        let transport = PagedTransport::new(&[(404, r#"{"message":"not found"}"#)]);
        let err = session(transport)
            .follow_pagination::<u32>(Request::get("items"), PageConfig::new("items"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Client(ref api) if api.status == 404));
    }

    #[tokio::test]
    async fn test_later_page_failure_is_pagination_broken() {
        let transport = PagedTransport::new(&[
            (200, r#"{"items":[1,2],"next":"p2"}"#),
            (400, r#"{"message":"bad cursor"}"#),
        ]);
        let mut pages = session(transport.clone())
            .follow_pagination::<u32>(Request::get("items"), PageConfig::body_cursor("items"))
            .await
            .unwrap();

        assert_eq!(pages.next().await.unwrap().unwrap(), 1);
        assert_eq!(pages.next().await.unwrap().unwrap(), 2);

        let err = pages.next().await.unwrap().unwrap_err();
        match err {
            Error::PaginationBroken {
                page,
                items_yielded,
                source,
            } => {
                assert_eq!(page, 2);
                assert_eq!(items_yielded, 2);
                assert!(matches!(*source, Error::Client(_)));
            }
            other => panic!("Expected PaginationBroken, got {other:?}"),
        }

        assert_eq!(pages.state(), PageState::Failed);
        assert!(pages.next().await.is_none());
        assert_eq!(transport.urls().len(), 2);
    }
}
