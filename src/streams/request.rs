//! Pending read requests and the futures that observe them.
//!
//! Every request is registered with the stream at the moment it is issued and
//! completed through a oneshot channel while the stream lock is held, so
//! completions happen in the order the requests were made.

use super::{buffer::ByteView, error::StreamError};
use crate::platform::SharedPtr;
use futures::channel::oneshot;
use parking_lot::Mutex;
use pin_project::pin_project;
use std::{
    pin::Pin,
    task::{Context, Poll, Waker},
};

type StreamResult<T> = Result<T, StreamError>;

/// Outcome of a BYOB read.
///
/// `value` is a view over the caller's (transferred) destination memory. It is
/// `None` only when the stream was canceled while the read was pending.
#[derive(Debug)]
pub struct ReadIntoResult {
    pub value: Option<ByteView>,
    pub done: bool,
}

/// Future returned by reads, BYOB reads and cancellation.
#[pin_project(project = RequestFutureProj)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub enum RequestFuture<V> {
    Ready(Option<StreamResult<V>>),
    Waiting(#[pin] oneshot::Receiver<StreamResult<V>>),
}

pub type ReadFuture<T> = RequestFuture<Option<T>>;
pub type ReadIntoFuture = RequestFuture<ReadIntoResult>;
pub type CancelFuture = RequestFuture<()>;

impl<V> RequestFuture<V> {
    pub(crate) fn channel() -> (oneshot::Sender<StreamResult<V>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, RequestFuture::Waiting(rx))
    }

    pub(crate) fn ready(result: StreamResult<V>) -> Self {
        RequestFuture::Ready(Some(result))
    }
}

impl<V> Future for RequestFuture<V> {
    type Output = StreamResult<V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            RequestFutureProj::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(StreamError::TaskDropped)))
            }
            RequestFutureProj::Waiting(rx) => rx
                .poll(cx)
                .map(|result| result.unwrap_or(Err(StreamError::TaskDropped))),
        }
    }
}

/// A default reader's pending read.
pub struct ReadRequest<T> {
    completion: oneshot::Sender<StreamResult<Option<T>>>,
}

impl<T> ReadRequest<T> {
    pub(crate) fn new() -> (Self, ReadFuture<T>) {
        let (completion, future) = RequestFuture::channel();
        (Self { completion }, future)
    }

    pub(crate) fn chunk_steps(self, chunk: T) {
        let _ = self.completion.send(Ok(Some(chunk)));
    }

    pub(crate) fn close_steps(self) {
        let _ = self.completion.send(Ok(None));
    }

    pub(crate) fn error_steps(self, error: StreamError) {
        let _ = self.completion.send(Err(error));
    }
}

/// A BYOB reader's pending read.
pub struct ReadIntoRequest {
    completion: oneshot::Sender<StreamResult<ReadIntoResult>>,
}

impl ReadIntoRequest {
    pub(crate) fn new() -> (Self, ReadIntoFuture) {
        let (completion, future) = RequestFuture::channel();
        (Self { completion }, future)
    }

    pub(crate) fn chunk_steps(self, view: ByteView) {
        let _ = self.completion.send(Ok(ReadIntoResult {
            value: Some(view),
            done: false,
        }));
    }

    pub(crate) fn close_steps(self, view: Option<ByteView>) {
        let _ = self.completion.send(Ok(ReadIntoResult { value: view, done: true }));
    }

    pub(crate) fn error_steps(self, error: StreamError) {
        let _ = self.completion.send(Err(error));
    }
}

#[derive(Default)]
pub(crate) struct WakerSet(Vec<Waker>);

impl WakerSet {
    pub(crate) fn register(&mut self, waker: &Waker) {
        if !self.0.iter().any(|w| w.will_wake(waker)) {
            self.0.push(waker.clone());
        }
    }

    pub(crate) fn wake_all(&mut self) {
        for waker in self.0.drain(..) {
            waker.wake();
        }
    }
}

#[derive(Default)]
struct ClosedState {
    outcome: Option<StreamResult<()>>,
    wakers: WakerSet,
}

/// The reader's closed promise: settles once, on close, error or release.
#[derive(Clone)]
pub(crate) struct ClosedSignal(SharedPtr<Mutex<ClosedState>>);

impl ClosedSignal {
    pub(crate) fn pending() -> Self {
        Self(SharedPtr::new(Mutex::new(ClosedState::default())))
    }

    pub(crate) fn settled(outcome: StreamResult<()>) -> Self {
        Self(SharedPtr::new(Mutex::new(ClosedState {
            outcome: Some(outcome),
            wakers: WakerSet::default(),
        })))
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.0.lock().outcome.is_none()
    }

    pub(crate) fn resolve(&self) {
        self.settle(Ok(()));
    }

    pub(crate) fn reject(&self, error: StreamError) {
        self.settle(Err(error));
    }

    fn settle(&self, outcome: StreamResult<()>) {
        let mut state = self.0.lock();
        if state.outcome.is_some() {
            return;
        }
        state.outcome = Some(outcome);
        state.wakers.wake_all();
    }

    pub(crate) fn wait(&self) -> ClosedFuture {
        ClosedFuture(self.clone())
    }
}

/// Resolves when the stream closes; fails when it errors or the reader is released.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct ClosedFuture(ClosedSignal);

impl Future for ClosedFuture {
    type Output = StreamResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.0.0.lock();
        match &state.outcome {
            Some(outcome) => Poll::Ready(outcome.clone()),
            None => {
                state.wakers.register(cx.waker());
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn request_futures_resolve_with_the_steps_taken() {
        let (request, future) = ReadRequest::new();
        request.chunk_steps(7);
        assert_eq!(future.now_or_never().unwrap().unwrap(), Some(7));

        let (request, future) = ReadRequest::<u8>::new();
        request.close_steps();
        assert_eq!(future.now_or_never().unwrap().unwrap(), None);

        let (request, future) = ReadRequest::<u8>::new();
        request.error_steps(StreamError::type_error("released"));
        assert!(future.now_or_never().unwrap().unwrap_err().is_type_error());
    }

    #[test]
    fn dropped_request_reports_task_dropped() {
        let (request, future) = ReadRequest::<u8>::new();
        drop(request);
        assert!(matches!(
            future.now_or_never().unwrap(),
            Err(StreamError::TaskDropped)
        ));
    }

    #[test]
    fn closed_signal_settles_once() {
        let signal = ClosedSignal::pending();
        let mut waiting = signal.wait();
        assert!((&mut waiting).now_or_never().is_none());
        assert!(signal.is_pending());

        signal.resolve();
        signal.reject(StreamError::from("too late"));
        assert!(waiting.now_or_never().unwrap().is_ok());
        assert!(signal.wait().now_or_never().unwrap().is_ok());
    }
}
