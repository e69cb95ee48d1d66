use crate::error::StoreError;
use crate::store::ObjectStore;

/// Walks every key of a bucket, fetching pages lazily with continuation tokens.
pub struct KeyIter<'a, S: ?Sized> {
    bucket: &'a str,
    store: &'a S,
    page_size: i32,

    next_continuation_token: Option<String>,
    keys: Vec<String>,
    truncated: Truncation,
    pages_fetched: usize,
}

#[derive(Clone, Copy)]
enum Truncation {
    NotYetKnown,
    Truncated,
    NotTruncated,
}

impl<'a, S: ObjectStore + ?Sized> KeyIter<'a, S> {
    pub fn new(store: &'a S, bucket: &'a str, page_size: i32) -> Self {
        KeyIter {
            bucket,
            store,
            page_size,
            next_continuation_token: None,
            keys: Vec::new(),
            truncated: Truncation::NotYetKnown,
            pages_fetched: 0,
        }
    }

    async fn fetch(&mut self) -> Result<(), StoreError> {
        let page = self
            .store
            .list_objects(
                self.bucket,
                self.page_size,
                self.next_continuation_token.take(),
            )
            .await?;

        self.truncated = if page.next_token.is_some() {
            Truncation::Truncated
        } else {
            Truncation::NotTruncated
        };
        self.next_continuation_token = page.next_token;
        self.pages_fetched += 1;

        self.keys = page.keys;
        // Pop from the back while keeping listing order.
        self.keys.reverse();

        Ok(())
    }

    pub async fn next(&mut self) -> Result<Option<String>, StoreError> {
        loop {
            match (self.keys.pop(), self.truncated) {
                (Some(key), _) => return Ok(Some(key)),

                // First page, or the last page said there is more. An empty
                // page with a token just means fetching again.
                (None, Truncation::Truncated | Truncation::NotYetKnown) => self.fetch().await?,

                (None, Truncation::NotTruncated) => return Ok(None),
            }
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }
}
