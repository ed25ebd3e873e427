use super::{
    byte_source_trait::ReadableByteSource,
    byte_state::ReadableByteStreamController,
    default_controller::ReadableStreamDefaultController,
    error::StreamError,
    inner::{ControllerSteps, PendingSourceCancel, SharedInner},
    readable::ReadableSource,
};
use crate::platform::{MaybeSend, PlatformBoxFuture, PlatformBoxFutureStatic, SharedPtr};
use futures::{channel::oneshot, future::poll_fn, lock::Mutex as AsyncMutex};
use std::{marker::PhantomData, task::Poll};
use tracing::{debug, trace};

type StreamResult<T> = Result<T, StreamError>;
type SourceFuture = PlatformBoxFutureStatic<StreamResult<()>>;

/// Source steps the driver task can run, independent of the controller kind.
pub trait SourceAlgorithms: MaybeSend + 'static {
    type Controller: Clone + MaybeSend + 'static;

    fn start<'a>(&'a mut self, controller: &'a mut Self::Controller) -> PlatformBoxFuture<'a, StreamResult<()>>;
    fn pull<'a>(&'a mut self, controller: &'a mut Self::Controller) -> PlatformBoxFuture<'a, StreamResult<()>>;
    fn cancel<'a>(&'a mut self, reason: Option<String>) -> PlatformBoxFuture<'a, StreamResult<()>>;
}

pub struct DefaultSourceAlgorithms<S, T> {
    source: S,
    _chunk: PhantomData<fn() -> T>,
}

impl<S, T> DefaultSourceAlgorithms<S, T> {
    pub(crate) fn new(source: S) -> Self {
        Self {
            source,
            _chunk: PhantomData,
        }
    }
}

impl<S, T> SourceAlgorithms for DefaultSourceAlgorithms<S, T>
where
    T: MaybeSend + 'static,
    S: ReadableSource<T>,
{
    type Controller = ReadableStreamDefaultController<T>;

    fn start<'a>(&'a mut self, controller: &'a mut Self::Controller) -> PlatformBoxFuture<'a, StreamResult<()>> {
        Box::pin(self.source.start(controller))
    }

    fn pull<'a>(&'a mut self, controller: &'a mut Self::Controller) -> PlatformBoxFuture<'a, StreamResult<()>> {
        Box::pin(self.source.pull(controller))
    }

    fn cancel<'a>(&'a mut self, reason: Option<String>) -> PlatformBoxFuture<'a, StreamResult<()>> {
        Box::pin(self.source.cancel(reason))
    }
}

pub struct ByteSourceAlgorithms<S>(pub(crate) S);

impl<S: ReadableByteSource> SourceAlgorithms for ByteSourceAlgorithms<S> {
    type Controller = ReadableByteStreamController;

    fn start<'a>(&'a mut self, controller: &'a mut Self::Controller) -> PlatformBoxFuture<'a, StreamResult<()>> {
        Box::pin(self.0.start(controller))
    }

    fn pull<'a>(&'a mut self, controller: &'a mut Self::Controller) -> PlatformBoxFuture<'a, StreamResult<()>> {
        Box::pin(self.0.pull(controller))
    }

    fn cancel<'a>(&'a mut self, reason: Option<String>) -> PlatformBoxFuture<'a, StreamResult<()>> {
        Box::pin(self.0.cancel(reason))
    }
}

// Steps handled per wakeup before yielding back to the executor.
const PROGRESS_BUDGET: usize = 64;

fn start_source<S: SourceAlgorithms>(source: SharedPtr<AsyncMutex<S>>, mut controller: S::Controller) -> SourceFuture {
    Box::pin(async move {
        let mut source = source.lock().await;
        source.start(&mut controller).await
    })
}

fn pull_source<S: SourceAlgorithms>(source: SharedPtr<AsyncMutex<S>>, mut controller: S::Controller) -> SourceFuture {
    Box::pin(async move {
        let mut source = source.lock().await;
        source.pull(&mut controller).await
    })
}

fn cancel_source<S: SourceAlgorithms>(source: SharedPtr<AsyncMutex<S>>, reason: Option<String>) -> SourceFuture {
    Box::pin(async move {
        let mut source = source.lock().await;
        source.cancel(reason).await
    })
}

/// Drives one stream's underlying source.
///
/// Start runs first. Afterwards the task waits for pull and cancel signals
/// from the stream state, polls the source's futures without the state lock
/// held and applies their results under it. A cancel abandons any in-flight
/// start or pull. The task ends once the source algorithms are cleared and
/// nothing is left running.
pub(crate) async fn readable_stream_task<T, C, S>(inner: SharedInner<T, C>, source: S, controller: S::Controller)
where
    T: MaybeSend + 'static,
    C: ControllerSteps<T>,
    S: SourceAlgorithms,
{
    let source = SharedPtr::new(AsyncMutex::new(source));
    let mut start: Option<SourceFuture> = Some(start_source(source.clone(), controller.clone()));
    let mut pull: Option<SourceFuture> = None;
    let mut cancel: Option<(SourceFuture, oneshot::Sender<StreamResult<()>>)> = None;

    poll_fn(move |cx| {
        for _ in 0..PROGRESS_BUDGET {
            {
                let mut state = inner.lock();
                state.signals.register(cx.waker());

                if let Some(PendingSourceCancel { reason, completion }) = state.signals.take_cancel() {
                    if start.take().is_some() | pull.take().is_some() {
                        debug!("abandoning in-flight source call for cancel");
                    }
                    cancel = Some((cancel_source(source.clone(), reason), completion));
                }

                if state.signals.algorithms_cleared() {
                    if start.take().is_some() | pull.take().is_some() {
                        trace!("dropping source call on a finished stream");
                    }
                    if cancel.is_none() {
                        trace!("readable stream task finished");
                        return Poll::Ready(());
                    }
                } else if start.is_none() && pull.is_none() && state.signals.take_pull_request() {
                    pull = Some(pull_source(source.clone(), controller.clone()));
                }
            }

            let mut progressed = false;

            if let Some(future) = start.as_mut() {
                if let Poll::Ready(result) = future.as_mut().poll(cx) {
                    start = None;
                    inner.lock().start_settled(result);
                    progressed = true;
                }
            }

            if let Some(future) = pull.as_mut() {
                if let Poll::Ready(result) = future.as_mut().poll(cx) {
                    pull = None;
                    inner.lock().pull_settled(result);
                    progressed = true;
                }
            }

            if let Some((future, _)) = cancel.as_mut() {
                if let Poll::Ready(result) = future.as_mut().poll(cx) {
                    if let Some((_, completion)) = cancel.take() {
                        let _ = completion.send(result);
                    }
                    progressed = true;
                }
            }

            if !progressed {
                return Poll::Pending;
            }
        }

        cx.waker().wake_by_ref();
        Poll::Pending
    })
    .await;
}
