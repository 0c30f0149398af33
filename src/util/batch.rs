//! Size-bounded batching in front of an async sink.
//!
//! Both batchers are fail-fast: the buffer is handed to the sink and cleared
//! before the sink runs, so items of a failed flush are gone. Callers must
//! call `flush` after their last `add` to emit a trailing partial batch.

use std::future::Future;
use std::mem;

/// Accumulates items and flushes them through `flush_fn` once `limit` is reached.
pub struct Batcher<T, F> {
    limit: usize,
    buf: Vec<T>,
    flush_fn: F,
}

impl<T, F, Fut, E> Batcher<T, F>
where
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    pub fn new(limit: usize, flush_fn: F) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            buf: Vec::with_capacity(limit),
            flush_fn,
        }
    }

    pub async fn add(&mut self, item: T) -> Result<(), E> {
        self.buf.push(item);
        if self.buf.len() >= self.limit {
            return self.flush().await;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), E> {
        if self.buf.is_empty() {
            return Ok(());
        }

        let batch = mem::replace(&mut self.buf, Vec::with_capacity(self.limit));
        (self.flush_fn)(batch).await
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Two index-aligned buffers flushed together.
///
/// `add(a, b)` pushes onto both sides, so `left[i]` always belongs with
/// `right[i]` when the sink sees them.
pub struct DualBatcher<A, B, F> {
    limit: usize,
    left: Vec<A>,
    right: Vec<B>,
    flush_fn: F,
}

impl<A, B, F, Fut, E> DualBatcher<A, B, F>
where
    F: FnMut(Vec<A>, Vec<B>) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    pub fn new(limit: usize, flush_fn: F) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            left: Vec::with_capacity(limit),
            right: Vec::with_capacity(limit),
            flush_fn,
        }
    }

    pub async fn add(&mut self, a: A, b: B) -> Result<(), E> {
        self.left.push(a);
        self.right.push(b);
        if self.left.len() >= self.limit {
            return self.flush().await;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), E> {
        if self.left.is_empty() {
            return Ok(());
        }

        let left = mem::replace(&mut self.left, Vec::with_capacity(self.limit));
        let right = mem::replace(&mut self.right, Vec::with_capacity(self.limit));
        (self.flush_fn)(left, right).await
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}
