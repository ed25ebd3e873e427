use super::{
    error::StreamError,
    inner::{ControllerSteps, PullState, ReadableStreamInner, SharedInner},
    queue::SizedQueue,
    readable::StreamState,
    request::{CancelFuture, ReadRequest},
};
use crate::platform::{BoxedStrategy, MaybeSend};
use tracing::trace;

type StreamResult<T> = Result<T, StreamError>;

/// Queue and flow-control state of a default (opaque chunk) controller.
pub struct DefaultControllerState<T> {
    pub(crate) queue: SizedQueue<T>,
    strategy_hwm: f64,
    size_algorithm: Option<BoxedStrategy<T>>,
    pub(crate) pull: PullState,
}

impl<T> DefaultControllerState<T> {
    pub(crate) fn new(strategy_hwm: f64, size_algorithm: BoxedStrategy<T>) -> Self {
        Self {
            queue: SizedQueue::new(),
            strategy_hwm,
            size_algorithm: Some(size_algorithm),
            pull: PullState::default(),
        }
    }
}

type DefaultInner<T> = ReadableStreamInner<T, DefaultControllerState<T>>;

impl<T: MaybeSend + 'static> DefaultInner<T> {
    fn can_close_or_enqueue(&self) -> bool {
        !self.controller.pull.close_requested && self.state == StreamState::Readable
    }

    fn clear_algorithms(&mut self) {
        self.controller.size_algorithm = None;
        self.signals.clear_algorithms();
    }

    pub(crate) fn close_controller(&mut self) {
        if !self.can_close_or_enqueue() {
            return;
        }
        self.controller.pull.close_requested = true;
        if self.controller.queue.is_empty() {
            self.clear_algorithms();
            self.close_stream();
        }
    }

    pub(crate) fn enqueue_chunk(&mut self, chunk: T) -> StreamResult<()> {
        if !self.can_close_or_enqueue() {
            trace!("enqueue ignored on a stream that is closing or finished");
            return Ok(());
        }

        if self.is_locked() && self.num_read_requests() > 0 {
            self.fulfill_read_request(chunk, false);
        } else {
            let size = match self.controller.size_algorithm.as_ref() {
                Some(strategy) => strategy.size(&chunk),
                None => Ok(1.0),
            };
            if let Err(error) = size.and_then(|size| self.controller.queue.enqueue(chunk, size)) {
                self.error_controller(error.clone());
                return Err(error);
            }
        }

        self.call_pull_if_needed();
        Ok(())
    }

    pub(crate) fn error_controller(&mut self, error: StreamError) {
        if self.state != StreamState::Readable {
            return;
        }
        self.controller.queue.reset();
        self.clear_algorithms();
        self.error_stream(error);
    }
}

impl<T: MaybeSend + 'static> ControllerSteps<T> for DefaultControllerState<T> {
    fn pull_state(&self) -> &PullState {
        &self.pull
    }

    fn pull_state_mut(&mut self) -> &mut PullState {
        &mut self.pull
    }

    fn high_water_mark(&self) -> f64 {
        self.strategy_hwm
    }

    fn queue_total_size(&self) -> f64 {
        self.queue.total_size()
    }

    fn should_call_pull(inner: &DefaultInner<T>) -> bool {
        if !inner.can_close_or_enqueue() || !inner.controller.pull.started {
            return false;
        }
        if inner.is_locked() && inner.num_read_requests() > 0 {
            return true;
        }
        inner.desired_size().is_some_and(|size| size > 0.0)
    }

    fn pull_steps(inner: &mut DefaultInner<T>, request: ReadRequest<T>) {
        if inner.controller.queue.is_empty() {
            inner.add_read_request(request);
            inner.call_pull_if_needed();
            return;
        }

        match inner.controller.queue.dequeue() {
            Ok(chunk) => {
                if inner.controller.pull.close_requested && inner.controller.queue.is_empty() {
                    inner.clear_algorithms();
                    inner.close_stream();
                } else {
                    inner.call_pull_if_needed();
                }
                request.chunk_steps(chunk);
            }
            Err(error) => request.error_steps(error),
        }
    }

    fn cancel_steps(inner: &mut DefaultInner<T>, reason: Option<String>) -> CancelFuture {
        inner.controller.queue.reset();
        let cancel = inner.signals.request_cancel(reason);
        inner.clear_algorithms();
        cancel
    }

    fn release_steps(_inner: &mut DefaultInner<T>) {}

    fn error_steps(inner: &mut DefaultInner<T>, error: StreamError) {
        inner.error_controller(error);
    }
}

/// Handle the underlying source uses to feed a default stream.
pub struct ReadableStreamDefaultController<T: MaybeSend + 'static> {
    inner: SharedInner<T, DefaultControllerState<T>>,
}

impl<T: MaybeSend + 'static> Clone for ReadableStreamDefaultController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: MaybeSend + 'static> ReadableStreamDefaultController<T> {
    pub(crate) fn new(inner: SharedInner<T, DefaultControllerState<T>>) -> Self {
        Self { inner }
    }

    /// `None` once the stream has errored, `0` once it has closed.
    pub fn desired_size(&self) -> Option<f64> {
        self.inner.lock().desired_size()
    }

    /// Requests close; the stream closes once queued chunks are read.
    /// Does nothing if the stream is already closing or finished.
    pub fn close(&self) -> StreamResult<()> {
        self.inner.lock().close_controller();
        Ok(())
    }

    /// Queues `chunk`, or delivers it directly to a waiting read.
    ///
    /// A failing or invalid chunk size errors the stream and is returned.
    pub fn enqueue(&self, chunk: T) -> StreamResult<()> {
        self.inner.lock().enqueue_chunk(chunk)
    }

    /// Errors the stream; pending reads and the reader's closed signal reject with `error`.
    pub fn error(&self, error: StreamError) {
        self.inner.lock().error_controller(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::{
        CountQueuingStrategy, QueuingStrategy,
        inner::PendingRequests,
        request::ReadRequest,
    };
    use futures::FutureExt;
    use std::collections::VecDeque;

    struct LengthStrategy;

    impl QueuingStrategy<&'static str> for LengthStrategy {
        fn size(&self, chunk: &&'static str) -> StreamResult<f64> {
            match *chunk {
                "bad" => Err(StreamError::from("size failed")),
                "negative" => Ok(-1.0),
                other => Ok(other.len() as f64),
            }
        }

        fn high_water_mark(&self) -> f64 {
            4.0
        }
    }

    fn started_inner(
        hwm: f64,
        strategy: BoxedStrategy<&'static str>,
    ) -> SharedInner<&'static str, DefaultControllerState<&'static str>> {
        let inner = ReadableStreamInner::new_shared(DefaultControllerState::new(hwm, strategy));
        inner.lock().controller.pull.started = true;
        inner
    }

    #[test]
    fn desired_size_tracks_queued_sizes() {
        let inner = started_inner(4.0, Box::new(LengthStrategy));
        let mut guard = inner.lock();
        assert_eq!(guard.desired_size(), Some(4.0));
        guard.enqueue_chunk("ab").unwrap();
        assert_eq!(guard.desired_size(), Some(2.0));
        guard.enqueue_chunk("abc").unwrap();
        assert_eq!(guard.desired_size(), Some(-1.0));
    }

    #[test]
    fn pull_requested_only_while_there_is_room() {
        let inner = started_inner(2.0, Box::new(CountQueuingStrategy::new(2.0)));
        let mut guard = inner.lock();
        guard.call_pull_if_needed();
        assert!(guard.controller.pull.pulling);
        assert!(guard.signals.take_pull_request());

        guard.enqueue_chunk("a").unwrap();
        guard.enqueue_chunk("b").unwrap();
        assert!(guard.controller.pull.pull_again);

        guard.pull_settled(Ok(()));
        assert!(!guard.controller.pull.pulling);
        assert!(!guard.signals.take_pull_request());
        assert_eq!(guard.desired_size(), Some(0.0));
    }

    #[test]
    fn size_failure_errors_the_stream() {
        let inner = started_inner(4.0, Box::new(LengthStrategy));
        let mut guard = inner.lock();
        guard.enqueue_chunk("ok").unwrap();
        let err = guard.enqueue_chunk("bad").unwrap_err();
        assert_eq!(err.to_string(), "size failed");
        assert_eq!(guard.state, StreamState::Errored);
        assert_eq!(guard.desired_size(), None);
        assert!(guard.controller.queue.is_empty());
        assert!(guard.signals.algorithms_cleared());

        assert!(guard.enqueue_chunk("late").is_ok());
        assert!(guard.controller.queue.is_empty());
    }

    #[test]
    fn negative_size_is_a_range_error() {
        let inner = started_inner(4.0, Box::new(LengthStrategy));
        let mut guard = inner.lock();
        let err = guard.enqueue_chunk("negative").unwrap_err();
        assert!(err.is_range_error());
        assert_eq!(guard.state, StreamState::Errored);
    }

    #[test]
    fn waiting_read_bypasses_the_queue() {
        let inner = started_inner(1.0, Box::new(CountQueuingStrategy::new(1.0)));
        let mut guard = inner.lock();
        guard
            .attach_reader(PendingRequests::Default(VecDeque::new()))
            .unwrap();
        let (request, future) = ReadRequest::new();
        guard.read(request);
        assert_eq!(guard.num_read_requests(), 1);

        guard.enqueue_chunk("direct").unwrap();
        assert!(guard.controller.queue.is_empty());
        assert_eq!(future.now_or_never().unwrap().unwrap(), Some("direct"));
    }

    #[test]
    fn close_waits_for_the_queue_to_drain() {
        let inner = started_inner(4.0, Box::new(CountQueuingStrategy::new(4.0)));
        let mut guard = inner.lock();
        guard.enqueue_chunk("a").unwrap();
        guard.close_controller();
        guard.close_controller();
        assert_eq!(guard.state, StreamState::Readable);
        assert!(guard.controller.pull.close_requested);

        let (request, future) = ReadRequest::new();
        guard.read(request);
        assert_eq!(future.now_or_never().unwrap().unwrap(), Some("a"));
        assert_eq!(guard.state, StreamState::Closed);
        assert_eq!(guard.desired_size(), Some(0.0));
    }
}
