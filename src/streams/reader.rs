use super::{
    Unlocked,
    buffer::ByteView,
    byte_state::ByteControllerState,
    error::StreamError,
    inner::{ControllerSteps, PendingRequests, SharedInner},
    readable::{ByteStream, DefaultStream, ReadableStream, StreamState, StreamTypeMarker},
    request::{CancelFuture, ClosedFuture, ClosedSignal, ReadFuture, ReadIntoFuture, ReadIntoRequest, ReadRequest, RequestFuture},
};
use crate::platform::MaybeSend;
use futures::{AsyncRead, Stream};
use pin_project::pin_project;
use std::{
    collections::VecDeque,
    io::Result as IoResult,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll, ready},
};

type StreamResult<T> = Result<T, StreamError>;

/// Lock bookkeeping shared by both reader kinds. Dropping it releases the lock.
pub(crate) struct GenericReader<T, C>
where
    T: MaybeSend + 'static,
    C: ControllerSteps<T>,
{
    inner: SharedInner<T, C>,
    closed: ClosedSignal,
    released: bool,
}

impl<T, C> GenericReader<T, C>
where
    T: MaybeSend + 'static,
    C: ControllerSteps<T>,
{
    fn attach(inner: SharedInner<T, C>, requests: PendingRequests<T>) -> StreamResult<Self> {
        let closed = inner.lock().attach_reader(requests)?;
        Ok(Self {
            inner,
            closed,
            released: false,
        })
    }

    fn closed(&self) -> ClosedFuture {
        self.closed.wait()
    }

    fn cancel(&self, reason: Option<String>) -> CancelFuture {
        self.inner.lock().cancel(reason)
    }

    fn release(&mut self) -> SharedInner<T, C> {
        if !std::mem::replace(&mut self.released, true) {
            self.inner.lock().release_reader();
        }
        self.inner.clone()
    }
}

impl<T, C> Drop for GenericReader<T, C>
where
    T: MaybeSend + 'static,
    C: ControllerSteps<T>,
{
    fn drop(&mut self) {
        self.release();
    }
}

// ----------- Default Reader -----------
/// Reads whole chunks. Also usable as a `futures::Stream` of chunks.
#[pin_project]
pub struct ReadableStreamDefaultReader<T, StreamType = DefaultStream>
where
    T: MaybeSend + 'static,
    StreamType: StreamTypeMarker,
    StreamType::Controller<T>: ControllerSteps<T>,
{
    base: GenericReader<T, StreamType::Controller<T>>,
    #[pin]
    in_flight: Option<ReadFuture<T>>,
    _kind: PhantomData<StreamType>,
}

impl<T, StreamType> std::fmt::Debug for ReadableStreamDefaultReader<T, StreamType>
where
    T: MaybeSend + 'static,
    StreamType: StreamTypeMarker,
    StreamType::Controller<T>: ControllerSteps<T>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadableStreamDefaultReader").finish_non_exhaustive()
    }
}

impl<T, StreamType> ReadableStreamDefaultReader<T, StreamType>
where
    T: MaybeSend + 'static,
    StreamType: StreamTypeMarker,
    StreamType::Controller<T>: ControllerSteps<T>,
{
    pub(crate) fn attach(inner: SharedInner<T, StreamType::Controller<T>>) -> StreamResult<Self> {
        Ok(Self {
            base: GenericReader::attach(inner, PendingRequests::Default(VecDeque::new()))?,
            in_flight: None,
            _kind: PhantomData,
        })
    }

    /// Resolves to `Some(chunk)`, or `None` once the stream is closed.
    ///
    /// The read is queued on the stream immediately, so reads complete in the
    /// order they were issued regardless of polling order.
    pub fn read(&self) -> ReadFuture<T> {
        let (request, future) = ReadRequest::new();
        self.base.inner.lock().read(request);
        future
    }

    pub fn closed(&self) -> ClosedFuture {
        self.base.closed()
    }

    pub fn cancel(&self, reason: Option<String>) -> CancelFuture {
        self.base.cancel(reason)
    }

    /// Detaches from the stream. Pending reads fail with a TypeError.
    pub fn release_lock(mut self) -> ReadableStream<T, StreamType, Unlocked> {
        ReadableStream::from_inner(self.base.release())
    }
}

impl<T, StreamType> Stream for ReadableStreamDefaultReader<T, StreamType>
where
    T: MaybeSend + 'static,
    StreamType: StreamTypeMarker,
    StreamType::Controller<T>: ControllerSteps<T>,
{
    type Item = StreamResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if this.in_flight.is_none() {
            let (request, future) = ReadRequest::new();
            this.base.inner.lock().read(request);
            this.in_flight.set(Some(future));
        }

        let Some(read) = this.in_flight.as_mut().as_pin_mut() else {
            return Poll::Ready(None);
        };
        let result = ready!(read.poll(cx));
        this.in_flight.set(None);
        Poll::Ready(result.transpose())
    }
}

// ----------- BYOB Reader -----------
/// Reads into caller-supplied buffers. Also usable as a `futures::io::AsyncRead`.
#[pin_project]
pub struct ReadableStreamBYOBReader {
    base: GenericReader<ByteView, ByteControllerState>,
    #[pin]
    in_flight: Option<ReadIntoFuture>,
    // Bytes of the last read that did not fit the caller's buffer.
    leftover: VecDeque<u8>,
}

impl ReadableStreamBYOBReader {
    pub(crate) fn attach(inner: SharedInner<ByteView, ByteControllerState>) -> StreamResult<Self> {
        Ok(Self {
            base: GenericReader::attach(inner, PendingRequests::Byob(VecDeque::new()))?,
            in_flight: None,
            leftover: VecDeque::new(),
        })
    }

    /// Reads at least one element into `view`.
    pub fn read(&self, view: ByteView) -> ReadIntoFuture {
        self.read_with_min(view, 1)
    }

    /// Resolves once at least `min` elements of `view` are filled, or the stream ends.
    ///
    /// `view`'s buffer is transferred: the caller's handle is detached and the
    /// bytes come back as the result's `value`.
    pub fn read_with_min(&self, view: ByteView, min: usize) -> ReadIntoFuture {
        if let Err(error) = validate_read_into(&view, min) {
            return RequestFuture::ready(Err(error));
        }

        let (request, future) = ReadIntoRequest::new();
        let mut inner = self.base.inner.lock();
        inner.disturbed = true;
        if inner.state == StreamState::Errored {
            request.error_steps(inner.stored_error());
        } else {
            inner.pull_into(view, min, request);
        }
        future
    }

    pub fn closed(&self) -> ClosedFuture {
        self.base.closed()
    }

    pub fn cancel(&self, reason: Option<String>) -> CancelFuture {
        self.base.cancel(reason)
    }

    /// Detaches from the stream. Pending reads fail with a TypeError; a
    /// partially filled buffer stays with the stream for the next reader.
    pub fn release_lock(mut self) -> ReadableStream<ByteView, ByteStream, Unlocked> {
        ReadableStream::from_inner(self.base.release())
    }
}

fn validate_read_into(view: &ByteView, min: usize) -> StreamResult<()> {
    if view.is_detached() {
        return Err(StreamError::type_error("view's buffer has been detached"));
    }
    if view.byte_length() == 0 {
        return Err(StreamError::type_error("view must have non-zero byte length"));
    }
    if view.buffer().byte_length() == 0 {
        return Err(StreamError::type_error("view's buffer must have non-zero byte length"));
    }
    if min == 0 {
        return Err(StreamError::type_error("min must be greater than 0"));
    }
    if min > view.len() {
        return Err(StreamError::range_error(format!(
            "min {min} exceeds the view's length {}",
            view.len()
        )));
    }
    Ok(())
}

fn drain_into(leftover: &mut VecDeque<u8>, buf: &mut [u8]) -> usize {
    let n = leftover.len().min(buf.len());
    for (slot, byte) in buf.iter_mut().zip(leftover.drain(..n)) {
        *slot = byte;
    }
    n
}

impl AsyncRead for ReadableStreamBYOBReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<IoResult<usize>> {
        let mut this = self.project();
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if !this.leftover.is_empty() {
            return Poll::Ready(Ok(drain_into(this.leftover, buf)));
        }

        if this.in_flight.is_none() {
            let (request, future) = ReadIntoRequest::new();
            {
                let mut inner = this.base.inner.lock();
                inner.disturbed = true;
                if inner.state == StreamState::Errored {
                    request.error_steps(inner.stored_error());
                } else {
                    inner.pull_into(ByteView::new(buf.len()), 1, request);
                }
            }
            this.in_flight.set(Some(future));
        }

        let Some(read) = this.in_flight.as_mut().as_pin_mut() else {
            return Poll::Ready(Ok(0));
        };
        let result = ready!(read.poll(cx));
        this.in_flight.set(None);

        let filled = result.map_err(std::io::Error::other)?;
        if let Some(view) = filled.value {
            this.leftover.extend(view.to_vec());
        }
        Poll::Ready(Ok(drain_into(this.leftover, buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::{
        ReadableByteSource, ReadableByteStreamController,
        test_util::{local_test, settle},
    };
    use futures::{AsyncReadExt, StreamExt};

    struct Chunks(Vec<&'static [u8]>);

    struct Idle;

    impl ReadableByteSource for Idle {}

    impl ReadableByteSource for Chunks {
        async fn pull(&mut self, controller: &mut ReadableByteStreamController) -> StreamResult<()> {
            if self.0.is_empty() {
                controller.close()?;
                // A pending BYOB read is finished by responding with zero bytes.
                if let Some(request) = controller.byob_request() {
                    request.respond(0)?;
                }
                Ok(())
            } else {
                controller.enqueue(self.0.remove(0))
            }
        }
    }

    #[test]
    fn default_reader_is_a_stream_of_chunks() {
        local_test(async {
            let stream = ReadableStream::from_vec(vec![1, 2, 3])
                .spawn(tokio::task::spawn_local)
                .unwrap();
            let (_locked, reader) = stream.get_reader().unwrap();
            let items: Vec<i32> = reader.map(|item| item.unwrap()).collect().await;
            assert_eq!(items, vec![1, 2, 3]);
        });
    }

    #[test]
    fn byob_reader_rejects_invalid_views() {
        local_test(async {
            let stream = ReadableStream::builder_bytes(Chunks(vec![b"abc"]))
                .spawn(tokio::task::spawn_local)
                .unwrap();
            let (_locked, reader) = stream.get_byob_reader().unwrap();

            assert!(reader.read(ByteView::new(0)).await.unwrap_err().is_type_error());
            assert!(reader.read_with_min(ByteView::new(4), 0).await.unwrap_err().is_type_error());
            assert!(reader.read_with_min(ByteView::new(4), 5).await.unwrap_err().is_range_error());

            let detached = ByteView::new(4);
            detached.buffer().detach();
            assert!(reader.read(detached).await.unwrap_err().is_type_error());
            assert!(!stream.is_disturbed());
        });
    }

    #[test]
    fn byob_read_transfers_the_callers_buffer() {
        local_test(async {
            let stream = ReadableStream::builder_bytes(Chunks(vec![b"hello"]))
                .spawn(tokio::task::spawn_local)
                .unwrap();
            let (_locked, reader) = stream.get_byob_reader().unwrap();

            let view = ByteView::new(8);
            let result = reader.read(view.clone()).await.unwrap();
            assert!(view.is_detached());
            assert!(!result.done);
            let value = result.value.unwrap();
            assert_eq!(value.to_vec(), b"hello");
            assert_eq!(value.buffer().byte_length(), 8);

            let result = reader.read(ByteView::with_buffer(value.buffer().clone(), 0, 8).unwrap()).await.unwrap();
            assert!(result.done);
            assert_eq!(result.value.unwrap().byte_length(), 0);
        });
    }

    #[test]
    fn async_read_keeps_bytes_that_did_not_fit() {
        local_test(async {
            let stream = ReadableStream::builder_bytes(Chunks(vec![b"abcdef", b"gh"]))
                .spawn(tokio::task::spawn_local)
                .unwrap();
            let (_locked, mut reader) = stream.get_byob_reader().unwrap();

            let mut small = [0u8; 4];
            let n = AsyncReadExt::read(&mut reader, &mut small).await.unwrap();
            assert_eq!(&small[..n], b"abcd");

            let mut rest = Vec::new();
            reader.read_to_end(&mut rest).await.unwrap();
            assert_eq!(rest, b"efgh");
        });
    }

    #[test]
    fn byob_release_rejects_pending_read() {
        local_test(async {
            let stream = ReadableStream::builder_bytes(Idle)
                .spawn(tokio::task::spawn_local)
                .unwrap();
            settle().await;
            let stream = {
                let (_locked, reader) = stream.get_byob_reader().unwrap();
                let closed = reader.closed();
                let pending = reader.read(ByteView::new(4));
                let stream = reader.release_lock();
                assert!(pending.await.unwrap_err().is_type_error());
                assert!(closed.await.unwrap_err().is_type_error());
                assert_eq!(stream.state(), StreamState::Readable);
                stream
            };
            assert!(!stream.locked());
        });
    }
}
