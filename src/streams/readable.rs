use super::{
    CountQueuingStrategy, Locked, QueuingStrategy, Unlocked,
    buffer::ByteView,
    byte_source_trait::ReadableByteSource,
    byte_state::{ByteControllerState, ReadableByteStreamController},
    default_controller::{DefaultControllerState, ReadableStreamDefaultController},
    error::StreamError,
    inner::{ControllerSteps, ReadableStreamInner, SharedInner},
    reader::{ReadableStreamBYOBReader, ReadableStreamDefaultReader},
    request::{CancelFuture, RequestFuture},
    task::{ByteSourceAlgorithms, DefaultSourceAlgorithms, readable_stream_task},
};
use crate::platform::{BoxedStrategy, MaybeSend, PlatformBoxFutureStatic};
use futures::{Stream, StreamExt};
use std::marker::PhantomData;

type StreamResult<T> = Result<T, StreamError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Readable,
    Closed,
    Errored,
}

// ----------- Stream Type Markers -----------
pub struct DefaultStream;
pub struct ByteStream;

/// Maps a stream kind to the controller state it is built around.
pub trait StreamTypeMarker: MaybeSend + 'static {
    type Controller<T: MaybeSend + 'static>: MaybeSend + 'static;
}

impl StreamTypeMarker for DefaultStream {
    type Controller<T: MaybeSend + 'static> = DefaultControllerState<T>;
}

impl StreamTypeMarker for ByteStream {
    type Controller<T: MaybeSend + 'static> = ByteControllerState;
}

// ----------- Source Traits -----------
/// Underlying source of a default stream.
///
/// `start` runs once before anything else. `pull` runs whenever the queue has
/// room or a reader waits, never twice at the same time. `cancel` runs at most
/// once, after which the source is never called again.
pub trait ReadableSource<T: MaybeSend + 'static>: MaybeSend + 'static {
    fn start(
        &mut self,
        controller: &mut ReadableStreamDefaultController<T>,
    ) -> impl Future<Output = StreamResult<()>> + MaybeSend {
        let _ = controller;
        async { Ok(()) }
    }

    fn pull(
        &mut self,
        controller: &mut ReadableStreamDefaultController<T>,
    ) -> impl Future<Output = StreamResult<()>> + MaybeSend;

    fn cancel(&mut self, reason: Option<String>) -> impl Future<Output = StreamResult<()>> + MaybeSend {
        let _ = reason;
        async { Ok(()) }
    }
}

// ----------- ReadableStream -----------
pub struct ReadableStream<T, StreamType = DefaultStream, LockState = Unlocked>
where
    T: MaybeSend + 'static,
    StreamType: StreamTypeMarker,
{
    inner: SharedInner<T, StreamType::Controller<T>>,
    _lock: PhantomData<LockState>,
}

impl<T, StreamType, LockState> std::fmt::Debug for ReadableStream<T, StreamType, LockState>
where
    T: MaybeSend + 'static,
    StreamType: StreamTypeMarker,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadableStream").finish_non_exhaustive()
    }
}

/// A byte stream handle; its default reader yields [`ByteView`] chunks.
pub type ReadableByteStream<LockState = Unlocked> = ReadableStream<ByteView, ByteStream, LockState>;

impl<T, StreamType, LockState> ReadableStream<T, StreamType, LockState>
where
    T: MaybeSend + 'static,
    StreamType: StreamTypeMarker,
{
    pub(crate) fn from_inner(inner: SharedInner<T, StreamType::Controller<T>>) -> Self {
        Self {
            inner,
            _lock: PhantomData,
        }
    }

    pub fn locked(&self) -> bool {
        self.inner.lock().is_locked()
    }

    pub fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    /// True once a read or cancel has been attempted.
    pub fn is_disturbed(&self) -> bool {
        self.inner.lock().disturbed
    }
}

impl<T, StreamType> ReadableStream<T, StreamType, Unlocked>
where
    T: MaybeSend + 'static,
    StreamType: StreamTypeMarker,
    StreamType::Controller<T>: ControllerSteps<T>,
{
    /// Cancels the stream and its source. Fails with a TypeError while a reader is attached.
    pub fn cancel(&self, reason: Option<String>) -> CancelFuture {
        let mut inner = self.inner.lock();
        if inner.is_locked() {
            return RequestFuture::ready(Err(StreamError::type_error("cannot cancel a locked stream")));
        }
        inner.cancel(reason)
    }

    pub fn get_reader(
        &self,
    ) -> StreamResult<(
        ReadableStream<T, StreamType, Locked>,
        ReadableStreamDefaultReader<T, StreamType>,
    )> {
        let reader = ReadableStreamDefaultReader::attach(self.inner.clone())?;
        Ok((ReadableStream::from_inner(self.inner.clone()), reader))
    }
}

impl ReadableStream<ByteView, ByteStream, Unlocked> {
    pub fn get_byob_reader(&self) -> StreamResult<(ReadableByteStream<Locked>, ReadableStreamBYOBReader)> {
        let reader = ReadableStreamBYOBReader::attach(self.inner.clone())?;
        Ok((ReadableStream::from_inner(self.inner.clone()), reader))
    }
}

// ----------- Builders -----------
fn validate_high_water_mark(high_water_mark: f64) -> StreamResult<f64> {
    if high_water_mark.is_nan() || high_water_mark < 0.0 {
        return Err(StreamError::range_error(format!(
            "invalid high water mark {high_water_mark}"
        )));
    }
    Ok(high_water_mark)
}

pub struct ReadableStreamBuilder<T, Source, StreamType = DefaultStream>
where
    T: MaybeSend + 'static,
    StreamType: StreamTypeMarker,
{
    source: Source,
    strategy: Option<BoxedStrategy<T>>,
    high_water_mark: Option<f64>,
    auto_allocate_chunk_size: Option<usize>,
    _kind: PhantomData<StreamType>,
}

impl<T, Source, StreamType> ReadableStreamBuilder<T, Source, StreamType>
where
    T: MaybeSend + 'static,
    StreamType: StreamTypeMarker,
{
    fn with_source(source: Source) -> Self {
        Self {
            source,
            strategy: None,
            high_water_mark: None,
            auto_allocate_chunk_size: None,
            _kind: PhantomData,
        }
    }
}

impl<T, Source> ReadableStreamBuilder<T, Source, DefaultStream>
where
    T: MaybeSend + 'static,
    Source: ReadableSource<T>,
{
    /// Sets the size function and high water mark. Defaults to a count strategy of 1.
    pub fn strategy<S>(mut self, strategy: S) -> Self
    where
        S: QueuingStrategy<T> + MaybeSend + 'static,
    {
        self.strategy = Some(Box::new(strategy));
        self
    }

    /// Return stream + driver future without spawning
    pub fn prepare(self) -> StreamResult<(ReadableStream<T>, PlatformBoxFutureStatic<()>)> {
        let strategy: BoxedStrategy<T> = match self.strategy {
            Some(strategy) => strategy,
            None => Box::new(CountQueuingStrategy::new(1.0)),
        };
        let high_water_mark = validate_high_water_mark(strategy.high_water_mark())?;

        let inner = ReadableStreamInner::new_shared(DefaultControllerState::new(high_water_mark, strategy));
        let controller = ReadableStreamDefaultController::new(inner.clone());
        let driver: PlatformBoxFutureStatic<()> = Box::pin(readable_stream_task(
            inner.clone(),
            DefaultSourceAlgorithms::new(self.source),
            controller,
        ));
        Ok((ReadableStream::from_inner(inner), driver))
    }

    /// Spawn bundled into one task
    pub fn spawn<F, R>(self, spawn_fn: F) -> StreamResult<ReadableStream<T>>
    where
        F: FnOnce(PlatformBoxFutureStatic<()>) -> R,
    {
        let (stream, driver) = self.prepare()?;
        spawn_fn(driver);
        Ok(stream)
    }

    /// Spawn using a static function reference
    pub fn spawn_ref<F, R>(self, spawn_fn: &'static F) -> StreamResult<ReadableStream<T>>
    where
        F: Fn(PlatformBoxFutureStatic<()>) -> R,
    {
        let (stream, driver) = self.prepare()?;
        spawn_fn(driver);
        Ok(stream)
    }
}

impl<Source> ReadableStreamBuilder<ByteView, Source, ByteStream>
where
    Source: ReadableByteSource,
{
    /// Byte streams count queued bytes; the default high water mark is 0.
    pub fn high_water_mark(mut self, high_water_mark: f64) -> Self {
        self.high_water_mark = Some(high_water_mark);
        self
    }

    /// Lets default readers pull through BYOB requests of `chunk_size` bytes.
    pub fn auto_allocate_chunk_size(mut self, chunk_size: usize) -> Self {
        self.auto_allocate_chunk_size = Some(chunk_size);
        self
    }

    pub fn prepare(self) -> StreamResult<(ReadableByteStream, PlatformBoxFutureStatic<()>)> {
        let high_water_mark = validate_high_water_mark(self.high_water_mark.unwrap_or(0.0))?;
        if self.auto_allocate_chunk_size == Some(0) {
            return Err(StreamError::type_error("auto_allocate_chunk_size must be greater than 0"));
        }

        let inner = ReadableStreamInner::new_shared(ByteControllerState::new(
            high_water_mark,
            self.auto_allocate_chunk_size,
        ));
        let controller = ReadableByteStreamController::new(inner.clone());
        let driver: PlatformBoxFutureStatic<()> = Box::pin(readable_stream_task(
            inner.clone(),
            ByteSourceAlgorithms(self.source),
            controller,
        ));
        Ok((ReadableStream::from_inner(inner), driver))
    }

    pub fn spawn<F, R>(self, spawn_fn: F) -> StreamResult<ReadableByteStream>
    where
        F: FnOnce(PlatformBoxFutureStatic<()>) -> R,
    {
        let (stream, driver) = self.prepare()?;
        spawn_fn(driver);
        Ok(stream)
    }

    pub fn spawn_ref<F, R>(self, spawn_fn: &'static F) -> StreamResult<ReadableByteStream>
    where
        F: Fn(PlatformBoxFutureStatic<()>) -> R,
    {
        let (stream, driver) = self.prepare()?;
        spawn_fn(driver);
        Ok(stream)
    }
}

impl<T: MaybeSend + 'static> ReadableStream<T, DefaultStream, Unlocked> {
    /// Returns a builder for this readable stream
    pub fn builder<Source>(source: Source) -> ReadableStreamBuilder<T, Source, DefaultStream>
    where
        Source: ReadableSource<T>,
    {
        ReadableStreamBuilder::with_source(source)
    }

    /// Create from Vec - shortcut for ReadableStreamBuilder::from_vec()
    pub fn from_vec(vec: Vec<T>) -> ReadableStreamBuilder<T, IteratorSource<std::vec::IntoIter<T>>> {
        ReadableStreamBuilder::from_vec(vec)
    }

    pub fn from_iterator<I>(iter: I) -> ReadableStreamBuilder<T, IteratorSource<I>>
    where
        I: Iterator<Item = T> + MaybeSend + 'static,
    {
        ReadableStreamBuilder::from_iterator(iter)
    }

    pub fn from_stream<S>(stream: S) -> ReadableStreamBuilder<T, AsyncStreamSource<S>>
    where
        S: Stream<Item = T> + Unpin + MaybeSend + 'static,
    {
        ReadableStreamBuilder::from_stream(stream)
    }
}

impl ReadableStream<ByteView, ByteStream, Unlocked> {
    /// Returns a builder for byte streams
    pub fn builder_bytes<Source>(source: Source) -> ReadableStreamBuilder<ByteView, Source, ByteStream>
    where
        Source: ReadableByteSource,
    {
        ReadableStreamBuilder::with_source(source)
    }
}

impl<T: MaybeSend + 'static> ReadableStreamBuilder<T, IteratorSource<std::vec::IntoIter<T>>> {
    pub fn from_vec(vec: Vec<T>) -> Self {
        Self::with_source(IteratorSource { iter: vec.into_iter() })
    }
}

impl<T: MaybeSend + 'static, I> ReadableStreamBuilder<T, IteratorSource<I>>
where
    I: Iterator<Item = T> + MaybeSend + 'static,
{
    pub fn from_iterator(iter: I) -> Self {
        Self::with_source(IteratorSource { iter })
    }
}

impl<T: MaybeSend + 'static, S> ReadableStreamBuilder<T, AsyncStreamSource<S>>
where
    S: Stream<Item = T> + Unpin + MaybeSend + 'static,
{
    pub fn from_stream(stream: S) -> Self {
        Self::with_source(AsyncStreamSource { stream })
    }
}

// ----------- Example Source Implementations  -----------
/// Enqueues one item per pull and closes when the iterator runs out.
pub struct IteratorSource<I> {
    iter: I,
}

impl<I, T> ReadableSource<T> for IteratorSource<I>
where
    T: MaybeSend + 'static,
    I: Iterator<Item = T> + MaybeSend + 'static,
{
    async fn pull(&mut self, controller: &mut ReadableStreamDefaultController<T>) -> StreamResult<()> {
        match self.iter.next() {
            Some(item) => controller.enqueue(item),
            None => controller.close(),
        }
    }
}

/// Forwards the items of a `futures::Stream`.
pub struct AsyncStreamSource<S> {
    stream: S,
}

impl<S, T> ReadableSource<T> for AsyncStreamSource<S>
where
    T: MaybeSend + 'static,
    S: Stream<Item = T> + Unpin + MaybeSend + 'static,
{
    async fn pull(&mut self, controller: &mut ReadableStreamDefaultController<T>) -> StreamResult<()> {
        match self.stream.next().await {
            Some(item) => controller.enqueue(item),
            None => controller.close(),
        }
    }
}
