use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use super::{PageConfig, PageState, Step, Traversal};
use crate::blocking::BlockingSession;
use crate::error::Result;
use crate::http::Request;

/// Lazy blocking traversal of a paginated collection.
///
/// Iterates items; each page is fetched on demand through the owning
/// [`BlockingSession`].
#[derive(Debug)]
pub struct BlockingPages<T> {
    session: BlockingSession,
    traversal: Traversal,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> BlockingPages<T> {
    /// Remaining items of the current page, or the whole next page.
    pub fn next_page(&mut self) -> Option<Result<Vec<T>>> {
        loop {
            match self.traversal.step_page() {
                Step::Ready(raw) => return Some(self.traversal.decode_page(raw)),
                Step::Fetch(request) => {
                    if let Err(err) = self.fetch(request) {
                        return Some(Err(err));
                    }
                }
                Step::Done => return None,
            }
        }
    }

    /// Drain every remaining item.
    pub fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page() {
            items.extend(page?);
        }
        Ok(items)
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

    fn fetch(&mut self, request: Request) -> Result<()> {
        let fetched = self.session.execute_ref(&request);
        self.traversal.accept(&request, fetched)
    }
}

impl<T: DeserializeOwned> Iterator for BlockingPages<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.traversal.step_item() {
                Step::Ready(raw) => return Some(self.traversal.decode(raw)),
                Step::Fetch(request) => {
                    if let Err(err) = self.fetch(request) {
                        return Some(Err(err));
                    }
                }
                Step::Done => return None,
            }
        }
    }
}

impl BlockingSession {
    /// Walk a paginated collection starting at `request`.
    ///
    /// The first page is fetched before this returns.
    pub fn follow_pagination<T: DeserializeOwned>(
        &self,
        request: Request,
        config: PageConfig,
    ) -> Result<BlockingPages<T>> {
        let mut pages = BlockingPages {
            session: self.clone(),
            traversal: Traversal::new(config, self.base_url().clone(), request),
            _item: PhantomData,
        };
        if let Step::Fetch(first) = pages.traversal.pending_fetch::<()>() {
            pages.fetch(first)?;
        }
        Ok(pages)
    }
}
