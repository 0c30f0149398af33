//! Lazy, page-at-a-time iteration over a paginated source.

use std::future::Future;

/// Streams items out of a paginated source one page at a time.
///
/// The fetch function receives the index of the page to load (starting at 0)
/// and the previous page exactly as it was returned, which lets keyset
/// callers derive the next cursor from its last element. An empty page ends
/// the iteration; it is never reported as an error.
///
/// The fetch future cannot borrow the previous page. Callers compute whatever
/// they need from it (usually a cursor) before building the future.
pub struct Pager<T, F> {
    fetch: F,
    buf: Vec<T>,
    idx: usize,
    page: usize,
    done: bool,
}

impl<T, F, Fut, E> Pager<T, F>
where
    T: Clone,
    F: FnMut(usize, &[T]) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            buf: Vec::new(),
            idx: 0,
            page: 0,
            done: false,
        }
    }

    /// Returns the next item, `Ok(None)` once the source is exhausted.
    ///
    /// Exhaustion is sticky: later calls return `Ok(None)` without touching
    /// the source. A fetch error leaves the pager as it was, so the next call
    /// asks for the same page again.
    pub async fn next(&mut self) -> Result<Option<T>, E> {
        if self.done {
            return Ok(None);
        }

        if self.idx >= self.buf.len() {
            let page = (self.fetch)(self.page, &self.buf).await?;
            if page.is_empty() {
                self.done = true;
                return Ok(None);
            }

            self.buf = page;
            self.idx = 0;
            self.page += 1;
        }

        let item = self.buf[self.idx].clone();
        self.idx += 1;
        Ok(Some(item))
    }

    /// True once an empty page has been seen.
    pub fn is_exhausted(&self) -> bool {
        self.done
    }
}
