//! State shared by a stream, its controller and its reader.
//!
//! One `ReadableStreamInner` sits behind a mutex per stream. Every transition
//! (enqueue, dequeue, close, error, reader attach and release, pull
//! bookkeeping) runs with that lock held. The underlying source is never
//! called from here: pull and cancel are signalled to the driver task, which
//! runs them outside the lock.

use super::{
    buffer::ByteView,
    error::StreamError,
    readable::StreamState,
    request::{CancelFuture, ClosedSignal, ReadIntoRequest, ReadRequest, RequestFuture},
};
use crate::platform::{MaybeSend, SharedPtr};
use futures::channel::oneshot;
use parking_lot::Mutex;
use std::{collections::VecDeque, task::Waker};
use tracing::{debug, trace};

type StreamResult<T> = Result<T, StreamError>;

pub(crate) type SharedInner<T, C> = SharedPtr<Mutex<ReadableStreamInner<T, C>>>;

/// Pull bookkeeping common to both controller variants.
#[derive(Debug, Default)]
pub struct PullState {
    pub(crate) started: bool,
    pub(crate) pulling: bool,
    pub(crate) pull_again: bool,
    pub(crate) close_requested: bool,
}

pub(crate) enum PendingRequests<T> {
    Default(VecDeque<ReadRequest<T>>),
    Byob(VecDeque<ReadIntoRequest>),
}

pub(crate) struct AttachedReader<T> {
    pub(crate) closed: ClosedSignal,
    pub(crate) requests: PendingRequests<T>,
}

pub(crate) struct PendingSourceCancel {
    pub(crate) reason: Option<String>,
    pub(crate) completion: oneshot::Sender<StreamResult<()>>,
}

/// Work the stream asks of its driver task.
#[derive(Default)]
pub struct SourceSignals {
    pull_requested: bool,
    cancel: Option<PendingSourceCancel>,
    algorithms_cleared: bool,
    waker: Option<Waker>,
}

impl SourceSignals {
    pub(crate) fn request_pull(&mut self) {
        self.pull_requested = true;
        self.wake();
    }

    pub(crate) fn request_cancel(&mut self, reason: Option<String>) -> CancelFuture {
        let (completion, future) = RequestFuture::channel();
        self.cancel = Some(PendingSourceCancel { reason, completion });
        self.wake();
        future
    }

    /// Drops the source algorithms: no further start or pull results matter.
    pub(crate) fn clear_algorithms(&mut self) {
        self.algorithms_cleared = true;
        self.pull_requested = false;
        self.wake();
    }

    pub(crate) fn algorithms_cleared(&self) -> bool {
        self.algorithms_cleared
    }

    pub(crate) fn take_pull_request(&mut self) -> bool {
        std::mem::take(&mut self.pull_requested)
    }

    pub(crate) fn take_cancel(&mut self) -> Option<PendingSourceCancel> {
        self.cancel.take()
    }

    pub(crate) fn register(&mut self, waker: &Waker) {
        match &self.waker {
            Some(existing) if existing.will_wake(waker) => {}
            _ => self.waker = Some(waker.clone()),
        }
    }

    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// Steps that differ between the default and the byte controller.
pub trait ControllerSteps<T>: Sized + MaybeSend + 'static {
    fn pull_state(&self) -> &PullState;
    fn pull_state_mut(&mut self) -> &mut PullState;
    fn high_water_mark(&self) -> f64;
    fn queue_total_size(&self) -> f64;

    fn should_call_pull(inner: &ReadableStreamInner<T, Self>) -> bool;
    fn pull_steps(inner: &mut ReadableStreamInner<T, Self>, request: ReadRequest<T>);
    fn cancel_steps(inner: &mut ReadableStreamInner<T, Self>, reason: Option<String>) -> CancelFuture;
    fn release_steps(inner: &mut ReadableStreamInner<T, Self>);
    /// Errors the controller, cleaning up its queue before erroring the stream.
    fn error_steps(inner: &mut ReadableStreamInner<T, Self>, error: StreamError);
}

pub struct ReadableStreamInner<T, C> {
    pub(crate) state: StreamState,
    stored_error: Option<StreamError>,
    pub(crate) disturbed: bool,
    pub(crate) reader: Option<AttachedReader<T>>,
    pub(crate) controller: C,
    pub(crate) signals: SourceSignals,
}

impl<T, C> ReadableStreamInner<T, C> {
    pub(crate) fn new_shared(controller: C) -> SharedInner<T, C> {
        SharedPtr::new(Mutex::new(Self {
            state: StreamState::Readable,
            stored_error: None,
            disturbed: false,
            reader: None,
            controller,
            signals: SourceSignals::default(),
        }))
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.reader.is_some()
    }

    pub(crate) fn stored_error(&self) -> StreamError {
        self.stored_error
            .clone()
            .unwrap_or_else(|| StreamError::assertion("errored stream has no stored error"))
    }

    pub(crate) fn has_default_reader(&self) -> bool {
        matches!(
            self.reader,
            Some(AttachedReader {
                requests: PendingRequests::Default(_),
                ..
            })
        )
    }

    pub(crate) fn has_byob_reader(&self) -> bool {
        matches!(
            self.reader,
            Some(AttachedReader {
                requests: PendingRequests::Byob(_),
                ..
            })
        )
    }

    pub(crate) fn num_read_requests(&self) -> usize {
        match &self.reader {
            Some(AttachedReader {
                requests: PendingRequests::Default(requests),
                ..
            }) => requests.len(),
            _ => 0,
        }
    }

    pub(crate) fn num_read_into_requests(&self) -> usize {
        match &self.reader {
            Some(AttachedReader {
                requests: PendingRequests::Byob(requests),
                ..
            }) => requests.len(),
            _ => 0,
        }
    }

    pub(crate) fn add_read_request(&mut self, request: ReadRequest<T>) {
        debug_assert_ne!(self.state, StreamState::Errored);
        match &mut self.reader {
            Some(AttachedReader {
                requests: PendingRequests::Default(requests),
                ..
            }) => requests.push_back(request),
            _ => request.error_steps(StreamError::assertion("no default reader to park the read on")),
        }
    }

    pub(crate) fn add_read_into_request(&mut self, request: ReadIntoRequest) {
        debug_assert_ne!(self.state, StreamState::Errored);
        match &mut self.reader {
            Some(AttachedReader {
                requests: PendingRequests::Byob(requests),
                ..
            }) => requests.push_back(request),
            _ => request.error_steps(StreamError::assertion("no BYOB reader to park the read on")),
        }
    }

    /// Hands `chunk` to the oldest pending read request.
    pub(crate) fn fulfill_read_request(&mut self, chunk: T, done: bool) {
        let request = match &mut self.reader {
            Some(AttachedReader {
                requests: PendingRequests::Default(requests),
                ..
            }) => requests.pop_front(),
            _ => None,
        };
        debug_assert!(request.is_some(), "fulfilled a read with no request pending");
        if let Some(request) = request {
            if done {
                request.close_steps();
            } else {
                request.chunk_steps(chunk);
            }
        }
    }

    pub(crate) fn fulfill_read_into_request(&mut self, view: ByteView, done: bool) {
        let request = match &mut self.reader {
            Some(AttachedReader {
                requests: PendingRequests::Byob(requests),
                ..
            }) => requests.pop_front(),
            _ => None,
        };
        debug_assert!(request.is_some(), "fulfilled a read-into with no request pending");
        if let Some(request) = request {
            if done {
                request.close_steps(Some(view));
            } else {
                request.chunk_steps(view);
            }
        }
    }

    /// Transitions Readable to Closed, resolving the closed signal and every
    /// pending default read with done.
    pub(crate) fn close_stream(&mut self) {
        debug_assert_eq!(self.state, StreamState::Readable);
        if self.state != StreamState::Readable {
            return;
        }
        self.state = StreamState::Closed;
        debug!("readable stream closed");

        let Some(reader) = self.reader.as_mut() else {
            return;
        };
        reader.closed.resolve();
        if let PendingRequests::Default(requests) = &mut reader.requests {
            for request in requests.drain(..) {
                request.close_steps();
            }
        }
    }

    /// Transitions Readable to Errored, rejecting the closed signal and every
    /// pending request with `error`.
    pub(crate) fn error_stream(&mut self, error: StreamError) {
        debug_assert_eq!(self.state, StreamState::Readable);
        if self.state != StreamState::Readable {
            return;
        }
        self.state = StreamState::Errored;
        debug!(error = %error, "readable stream errored");
        self.stored_error = Some(error.clone());

        let Some(reader) = self.reader.as_mut() else {
            return;
        };
        reader.closed.reject(error.clone());
        match &mut reader.requests {
            PendingRequests::Default(requests) => {
                for request in requests.drain(..) {
                    request.error_steps(error.clone());
                }
            }
            PendingRequests::Byob(requests) => {
                for request in requests.drain(..) {
                    request.error_steps(error.clone());
                }
            }
        }
    }

    pub(crate) fn attach_reader(&mut self, requests: PendingRequests<T>) -> StreamResult<ClosedSignal> {
        if self.is_locked() {
            return Err(StreamError::type_error("stream is already locked to a reader"));
        }
        let closed = match self.state {
            StreamState::Readable => ClosedSignal::pending(),
            StreamState::Closed => ClosedSignal::settled(Ok(())),
            StreamState::Errored => ClosedSignal::settled(Err(self.stored_error())),
        };
        self.reader = Some(AttachedReader {
            closed: closed.clone(),
            requests,
        });
        Ok(closed)
    }
}

impl<T, C: ControllerSteps<T>> ReadableStreamInner<T, C> {
    /// `None` while errored, `0` once closed.
    pub(crate) fn desired_size(&self) -> Option<f64> {
        match self.state {
            StreamState::Errored => None,
            StreamState::Closed => Some(0.0),
            StreamState::Readable => {
                Some(self.controller.high_water_mark() - self.controller.queue_total_size())
            }
        }
    }

    pub(crate) fn call_pull_if_needed(&mut self) {
        if !C::should_call_pull(self) {
            return;
        }
        let pull = self.controller.pull_state_mut();
        if pull.pulling {
            trace!("pull already in flight, coalescing");
            pull.pull_again = true;
            return;
        }
        debug_assert!(!pull.pull_again);
        pull.pulling = true;
        trace!("requesting pull from underlying source");
        self.signals.request_pull();
    }

    pub(crate) fn start_settled(&mut self, result: StreamResult<()>) {
        match result {
            Ok(()) => {
                let pull = self.controller.pull_state_mut();
                pull.started = true;
                debug_assert!(!pull.pulling && !pull.pull_again);
                self.call_pull_if_needed();
            }
            Err(error) => {
                debug!(error = %error, "underlying source failed to start");
                C::error_steps(self, error);
            }
        }
    }

    pub(crate) fn pull_settled(&mut self, result: StreamResult<()>) {
        match result {
            Ok(()) => {
                let pull = self.controller.pull_state_mut();
                pull.pulling = false;
                if std::mem::take(&mut pull.pull_again) {
                    self.call_pull_if_needed();
                }
            }
            Err(error) => {
                debug!(error = %error, "underlying source pull failed");
                C::error_steps(self, error);
            }
        }
    }

    /// A default reader's read: marks the stream disturbed and settles the
    /// request now if the stream is finished, otherwise hands it to the controller.
    pub(crate) fn read(&mut self, request: ReadRequest<T>) {
        self.disturbed = true;
        match self.state {
            StreamState::Closed => request.close_steps(),
            StreamState::Errored => request.error_steps(self.stored_error()),
            StreamState::Readable => C::pull_steps(self, request),
        }
    }

    pub(crate) fn cancel(&mut self, reason: Option<String>) -> CancelFuture {
        self.disturbed = true;
        match self.state {
            StreamState::Closed => return RequestFuture::ready(Ok(())),
            StreamState::Errored => return RequestFuture::ready(Err(self.stored_error())),
            StreamState::Readable => {}
        }
        debug!(reason = ?reason, "canceling readable stream");
        self.close_stream();
        if let Some(AttachedReader {
            requests: PendingRequests::Byob(requests),
            ..
        }) = self.reader.as_mut()
        {
            for request in requests.drain(..) {
                request.close_steps(None);
            }
        }
        C::cancel_steps(self, reason)
    }

    /// Detaches the reader, rejecting its closed signal (if still pending) and
    /// every outstanding request with a TypeError.
    pub(crate) fn release_reader(&mut self) {
        let Some(reader) = self.reader.as_ref() else {
            return;
        };
        let released = || StreamError::type_error("reader was released");
        if reader.closed.is_pending() {
            reader.closed.reject(released());
        }
        C::release_steps(self);

        let Some(reader) = self.reader.take() else {
            return;
        };
        trace!("reader released");
        match reader.requests {
            PendingRequests::Default(requests) => {
                for request in requests {
                    request.error_steps(released());
                }
            }
            PendingRequests::Byob(requests) => {
                for request in requests {
                    request.error_steps(released());
                }
            }
        }
    }
}
