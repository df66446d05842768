//! [`BodyTap`]: a transparent body wrapper that captures the full response
//! body as it is consumed and commits it to the cache exactly once, on a
//! genuine end-of-stream -- never on early abandonment.

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame};
use pin_project_lite::pin_project;

use crate::error::StreamingError;

pin_project! {
    /// Wraps a response body `B`, yielding identical frames to the consumer
    /// while accumulating the bytes seen so far. When the wrapped body
    /// reaches a genuine end-of-stream -- the terminating zero-length chunk
    /// in the chunked-encoding case, or a plain `None` frame otherwise --
    /// the capture is handed to `commit` exactly once.
    pub struct BodyTap<B, F> {
        #[pin]
        inner: B,
        buffer: BytesMut,
        done: bool,
        commit: Option<F>,
    }
}

impl<B, F> BodyTap<B, F>
where
    F: FnOnce(Bytes),
{
    pub fn new(inner: B, commit: F) -> Self {
        BodyTap { inner, buffer: BytesMut::new(), done: false, commit: Some(commit) }
    }
}

impl<B, F> Body for BodyTap<B, F>
where
    B: Body,
    B::Data: Into<Bytes>,
    B::Error: Into<StreamingError>,
    F: FnOnce(Bytes),
{
    type Data = Bytes;
    type Error = StreamingError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                let frame = frame.map_data(Into::into);
                if let Some(data) = frame.data_ref() {
                    this.buffer.extend_from_slice(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                // Stream aborted abnormally: no commit, matching early-abandonment rules.
                *this.done = true;
                this.commit.take();
                Poll::Ready(Some(Err(e.into())))
            }
            Poll::Ready(None) => {
                *this.done = true;
                if let Some(commit) = this.commit.take() {
                    commit(this.buffer.split().freeze());
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}

impl<B: fmt::Debug, F> fmt::Debug for BodyTap<B, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyTap")
            .field("inner", &self.inner)
            .field("captured", &self.buffer.len())
            .field("done", &self.done)
            .finish()
    }
}
