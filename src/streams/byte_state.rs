//! Byte stream controller: a byte queue plus pull-into descriptors for
//! reads that bring their own buffer.

use super::{
    buffer::{ArrayBuffer, ByteView},
    error::StreamError,
    inner::{ControllerSteps, PendingRequests, PullState, ReadableStreamInner, SharedInner},
    queue::SizedQueue,
    readable::StreamState,
    request::{CancelFuture, ReadIntoRequest, ReadRequest},
};
use std::collections::VecDeque;
use tracing::trace;

type StreamResult<T> = Result<T, StreamError>;

/// Which kind of reader a pull-into descriptor is filling for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderType {
    Default,
    Byob,
    /// The reader was released while the descriptor was pending.
    None,
}

#[derive(Debug)]
pub(crate) struct ByteQueueEntry {
    buffer: ArrayBuffer,
    byte_offset: usize,
    byte_length: usize,
}

/// Bookkeeping for an in-progress read into a caller-supplied buffer.
#[derive(Debug)]
pub struct PullIntoDescriptor {
    pub(crate) buffer: ArrayBuffer,
    pub(crate) buffer_byte_length: usize,
    pub(crate) byte_offset: usize,
    pub(crate) byte_length: usize,
    pub(crate) bytes_filled: usize,
    pub(crate) minimum_fill: usize,
    pub(crate) element_size: usize,
    pub(crate) reader_type: ReaderType,
}

pub struct ByteControllerState {
    pub(crate) queue: SizedQueue<ByteQueueEntry>,
    strategy_hwm: f64,
    pub(crate) pending_pull_intos: VecDeque<PullIntoDescriptor>,
    /// Generation of the live BYOB request, if any.
    byob_request: Option<u64>,
    byob_generation: u64,
    auto_allocate_chunk_size: Option<usize>,
    pub(crate) pull: PullState,
}

impl ByteControllerState {
    pub(crate) fn new(strategy_hwm: f64, auto_allocate_chunk_size: Option<usize>) -> Self {
        Self {
            queue: SizedQueue::new(),
            strategy_hwm,
            pending_pull_intos: VecDeque::new(),
            byob_request: None,
            byob_generation: 0,
            auto_allocate_chunk_size,
            pull: PullState::default(),
        }
    }

    fn queue_bytes(&self) -> usize {
        self.queue.total_size() as usize
    }
}

type ByteInner = ReadableStreamInner<ByteView, ByteControllerState>;

fn unaligned_close_error() -> StreamError {
    StreamError::type_error("insufficient bytes to fill elements in the given buffer")
}

/// Copies queued bytes into `descriptor` until the queue runs dry or the
/// descriptor holds an element-aligned amount of at least `minimum_fill`.
/// Returns whether the descriptor is ready to commit.
fn fill_pull_into_descriptor_from_queue(
    queue: &mut SizedQueue<ByteQueueEntry>,
    descriptor: &mut PullIntoDescriptor,
) -> StreamResult<bool> {
    let max_bytes_to_copy =
        (queue.total_size() as usize).min(descriptor.byte_length - descriptor.bytes_filled);
    let max_bytes_filled = descriptor.bytes_filled + max_bytes_to_copy;
    let mut remaining_to_copy = max_bytes_to_copy;
    let mut ready = false;

    let max_aligned_bytes = max_bytes_filled - max_bytes_filled % descriptor.element_size;
    if max_aligned_bytes >= descriptor.minimum_fill {
        remaining_to_copy = max_aligned_bytes - descriptor.bytes_filled;
        ready = true;
    }

    while remaining_to_copy > 0 {
        let mut head = queue.dequeue()?;
        let bytes_to_copy = remaining_to_copy.min(head.byte_length);
        let dest_start = descriptor.byte_offset + descriptor.bytes_filled;
        ArrayBuffer::copy_bytes(
            &descriptor.buffer,
            dest_start,
            &head.buffer,
            head.byte_offset,
            bytes_to_copy,
        )?;
        if head.byte_length > bytes_to_copy {
            head.byte_offset += bytes_to_copy;
            head.byte_length -= bytes_to_copy;
            let size = head.byte_length as f64;
            queue.push_front(head, size);
        }
        descriptor.bytes_filled += bytes_to_copy;
        remaining_to_copy -= bytes_to_copy;
    }

    if !ready {
        debug_assert!(queue.is_empty());
        debug_assert!(descriptor.bytes_filled < descriptor.minimum_fill);
    }
    Ok(ready)
}

/// The view handed to the reader: the filled, element-aligned part of the
/// descriptor over a freshly transferred buffer.
fn convert_pull_into_descriptor(descriptor: PullIntoDescriptor) -> StreamResult<ByteView> {
    debug_assert!(descriptor.bytes_filled <= descriptor.byte_length);
    debug_assert_eq!(descriptor.bytes_filled % descriptor.element_size, 0);
    let buffer = descriptor.buffer.transfer()?;
    ByteView::with_element_size(
        buffer,
        descriptor.byte_offset,
        descriptor.bytes_filled / descriptor.element_size,
        descriptor.element_size,
    )
}

impl ByteInner {
    fn clear_algorithms(&mut self) {
        self.signals.clear_algorithms();
    }

    fn invalidate_byob_request(&mut self) {
        if self.controller.byob_request.take().is_some() {
            trace!("BYOB request invalidated");
        }
    }

    fn clear_pending_pull_intos(&mut self) {
        self.invalidate_byob_request();
        self.controller.pending_pull_intos.clear();
    }

    fn shift_pending_pull_into(&mut self) -> Option<PullIntoDescriptor> {
        debug_assert!(self.controller.byob_request.is_none());
        self.controller.pending_pull_intos.pop_front()
    }

    fn enqueue_chunk_to_queue(&mut self, buffer: ArrayBuffer, byte_offset: usize, byte_length: usize) {
        let size = byte_length as f64;
        let entry = ByteQueueEntry {
            buffer,
            byte_offset,
            byte_length,
        };
        if let Err(error) = self.controller.queue.enqueue(entry, size) {
            self.error_controller(error);
        }
    }

    fn enqueue_cloned_chunk_to_queue(
        &mut self,
        buffer: &ArrayBuffer,
        byte_offset: usize,
        byte_length: usize,
    ) -> StreamResult<()> {
        match buffer.clone_range(byte_offset, byte_length) {
            Ok(clone) => {
                self.enqueue_chunk_to_queue(clone, 0, byte_length);
                Ok(())
            }
            Err(error) => {
                self.error_controller(error.clone());
                Err(error)
            }
        }
    }

    /// Moves whatever a released reader's head descriptor received into the
    /// queue, then drops the descriptor.
    fn enqueue_detached_pull_into_to_queue(&mut self) -> StreamResult<()> {
        let Some(head) = self.controller.pending_pull_intos.front() else {
            return Ok(());
        };
        debug_assert_eq!(head.reader_type, ReaderType::None);
        if head.bytes_filled > 0 {
            let (buffer, byte_offset, bytes_filled) =
                (head.buffer.clone(), head.byte_offset, head.bytes_filled);
            self.enqueue_cloned_chunk_to_queue(&buffer, byte_offset, bytes_filled)?;
        }
        self.shift_pending_pull_into();
        Ok(())
    }

    fn process_pull_into_descriptors_using_queue(&mut self) -> StreamResult<Vec<PullIntoDescriptor>> {
        let mut filled = Vec::new();
        while !self.controller.pending_pull_intos.is_empty() {
            if self.controller.queue_bytes() == 0 {
                break;
            }
            let ByteControllerState {
                queue,
                pending_pull_intos,
                ..
            } = &mut self.controller;
            let Some(head) = pending_pull_intos.front_mut() else {
                break;
            };
            if fill_pull_into_descriptor_from_queue(queue, head)? {
                if let Some(descriptor) = self.shift_pending_pull_into() {
                    filled.push(descriptor);
                }
            }
        }
        Ok(filled)
    }

    fn process_read_requests_using_queue(&mut self) {
        while self.num_read_requests() > 0 {
            if self.controller.queue_bytes() == 0 {
                return;
            }
            let request = match self.reader.as_mut().map(|reader| &mut reader.requests) {
                Some(PendingRequests::Default(requests)) => requests.pop_front(),
                _ => None,
            };
            let Some(request) = request else {
                return;
            };
            self.fill_read_request_from_queue(request);
        }
    }

    fn fill_read_request_from_queue(&mut self, request: ReadRequest<ByteView>) {
        let entry = match self.controller.queue.dequeue() {
            Ok(entry) => entry,
            Err(error) => {
                request.error_steps(error);
                return;
            }
        };
        self.handle_queue_drain();
        match ByteView::with_buffer(entry.buffer, entry.byte_offset, entry.byte_length) {
            Ok(view) => request.chunk_steps(view),
            Err(error) => request.error_steps(error),
        }
    }

    fn handle_queue_drain(&mut self) {
        debug_assert_eq!(self.state, StreamState::Readable);
        if self.controller.queue_bytes() == 0 && self.controller.pull.close_requested {
            self.clear_algorithms();
            self.close_stream();
        } else {
            self.call_pull_if_needed();
        }
    }

    fn commit_pull_into_descriptor(&mut self, descriptor: PullIntoDescriptor) -> StreamResult<()> {
        debug_assert_ne!(self.state, StreamState::Errored);
        debug_assert_ne!(descriptor.reader_type, ReaderType::None);
        let mut done = false;
        if self.state == StreamState::Closed {
            debug_assert_eq!(descriptor.bytes_filled % descriptor.element_size, 0);
            done = true;
        }
        let reader_type = descriptor.reader_type;
        let view = match convert_pull_into_descriptor(descriptor) {
            Ok(view) => view,
            Err(error) => {
                self.error_controller(error.clone());
                return Err(error);
            }
        };
        match reader_type {
            ReaderType::Default => self.fulfill_read_request(view, done),
            ReaderType::Byob => self.fulfill_read_into_request(view, done),
            ReaderType::None => {}
        }
        Ok(())
    }

    fn commit_all(&mut self, descriptors: Vec<PullIntoDescriptor>) -> StreamResult<()> {
        for descriptor in descriptors {
            self.commit_pull_into_descriptor(descriptor)?;
        }
        Ok(())
    }

    pub(crate) fn close_controller(&mut self) -> StreamResult<()> {
        if self.controller.pull.close_requested || self.state != StreamState::Readable {
            return Ok(());
        }
        if self.controller.queue_bytes() > 0 {
            self.controller.pull.close_requested = true;
            return Ok(());
        }
        if let Some(first) = self.controller.pending_pull_intos.front() {
            if first.bytes_filled % first.element_size != 0 {
                let error = unaligned_close_error();
                self.error_controller(error.clone());
                return Err(error);
            }
        }
        self.clear_algorithms();
        self.close_stream();
        Ok(())
    }

    pub(crate) fn error_controller(&mut self, error: StreamError) {
        if self.state != StreamState::Readable {
            return;
        }
        self.clear_pending_pull_intos();
        self.controller.queue.reset();
        self.clear_algorithms();
        self.error_stream(error);
    }

    pub(crate) fn enqueue_chunk(&mut self, chunk: ByteView) -> StreamResult<()> {
        if chunk.byte_length() == 0 {
            return Err(StreamError::type_error("chunk must have a non-zero byte length"));
        }
        if chunk.buffer().byte_length() == 0 {
            return Err(StreamError::type_error("chunk's buffer must have a non-zero byte length"));
        }
        if self.controller.pull.close_requested || self.state != StreamState::Readable {
            trace!("enqueue ignored on a byte stream that is closing or finished");
            return Ok(());
        }

        let byte_offset = chunk.byte_offset();
        let byte_length = chunk.byte_length();
        if chunk.buffer().is_detached() {
            return Err(StreamError::type_error("chunk's buffer is detached"));
        }
        let transferred = chunk.buffer().transfer()?;

        if let Some(first) = self.controller.pending_pull_intos.front() {
            if first.buffer.is_detached() {
                return Err(StreamError::type_error(
                    "the BYOB request's buffer has been detached",
                ));
            }
            self.invalidate_byob_request();
            if let Some(first) = self.controller.pending_pull_intos.front_mut() {
                first.buffer = first.buffer.transfer()?;
                if first.reader_type == ReaderType::None {
                    self.enqueue_detached_pull_into_to_queue()?;
                }
            }
        }

        if self.has_default_reader() {
            self.process_read_requests_using_queue();
            if self.num_read_requests() == 0 {
                debug_assert!(self.controller.pending_pull_intos.is_empty());
                self.enqueue_chunk_to_queue(transferred, byte_offset, byte_length);
            } else {
                debug_assert!(self.controller.queue.is_empty());
                if let Some(first) = self.controller.pending_pull_intos.front() {
                    debug_assert_eq!(first.reader_type, ReaderType::Default);
                    self.shift_pending_pull_into();
                }
                let view = ByteView::with_buffer(transferred, byte_offset, byte_length)?;
                self.fulfill_read_request(view, false);
            }
        } else if self.has_byob_reader() {
            self.enqueue_chunk_to_queue(transferred, byte_offset, byte_length);
            let filled = self.process_pull_into_descriptors_using_queue()?;
            self.commit_all(filled)?;
        } else {
            debug_assert!(!self.is_locked());
            self.enqueue_chunk_to_queue(transferred, byte_offset, byte_length);
        }

        self.call_pull_if_needed();
        Ok(())
    }

    /// A BYOB read of `min` elements into `view`.
    pub(crate) fn pull_into(&mut self, view: ByteView, min: usize, request: ReadIntoRequest) {
        let element_size = view.element_size();
        let byte_offset = view.byte_offset();
        let byte_length = view.byte_length();
        let buffer = match view.buffer().transfer() {
            Ok(buffer) => buffer,
            Err(error) => {
                request.error_steps(error);
                return;
            }
        };
        let mut descriptor = PullIntoDescriptor {
            buffer_byte_length: buffer.byte_length(),
            buffer,
            byte_offset,
            byte_length,
            bytes_filled: 0,
            minimum_fill: min * element_size,
            element_size,
            reader_type: ReaderType::Byob,
        };

        if !self.controller.pending_pull_intos.is_empty() {
            self.controller.pending_pull_intos.push_back(descriptor);
            self.add_read_into_request(request);
            return;
        }

        if self.state == StreamState::Closed {
            match ByteView::with_element_size(descriptor.buffer, byte_offset, 0, element_size) {
                Ok(empty) => request.close_steps(Some(empty)),
                Err(error) => request.error_steps(error),
            }
            return;
        }

        if self.controller.queue_bytes() > 0 {
            match fill_pull_into_descriptor_from_queue(&mut self.controller.queue, &mut descriptor) {
                Ok(true) => {
                    match convert_pull_into_descriptor(descriptor) {
                        Ok(filled) => {
                            self.handle_queue_drain();
                            request.chunk_steps(filled);
                        }
                        Err(error) => request.error_steps(error),
                    }
                    return;
                }
                Ok(false) => {}
                Err(error) => {
                    request.error_steps(error);
                    return;
                }
            }
            if self.controller.pull.close_requested {
                let error = unaligned_close_error();
                self.error_controller(error.clone());
                request.error_steps(error);
                return;
            }
        }

        self.controller.pending_pull_intos.push_back(descriptor);
        self.add_read_into_request(request);
        self.call_pull_if_needed();
    }

    fn get_byob_request(&mut self) -> Option<(u64, ByteView)> {
        if self.controller.byob_request.is_none() {
            if self.controller.pending_pull_intos.is_empty() {
                return None;
            }
            self.controller.byob_generation += 1;
            self.controller.byob_request = Some(self.controller.byob_generation);
            trace!(generation = self.controller.byob_generation, "BYOB request created");
        }
        let generation = self.controller.byob_request?;
        let first = self.controller.pending_pull_intos.front()?;
        let view = ByteView::with_buffer(
            first.buffer.clone(),
            first.byte_offset + first.bytes_filled,
            first.byte_length - first.bytes_filled,
        )
        .ok()?;
        Some((generation, view))
    }

    fn check_byob_request(&self, generation: u64) -> StreamResult<()> {
        if self.controller.byob_request == Some(generation) {
            Ok(())
        } else {
            Err(StreamError::type_error(
                "BYOB request was already responded to or invalidated",
            ))
        }
    }

    pub(crate) fn respond(&mut self, bytes_written: usize) -> StreamResult<()> {
        let state = self.state;
        let Some(first) = self.controller.pending_pull_intos.front_mut() else {
            return Err(StreamError::type_error("no pending read to respond to"));
        };
        if state == StreamState::Closed {
            if bytes_written != 0 {
                return Err(StreamError::type_error(
                    "bytes_written must be 0 when responding on a closed stream",
                ));
            }
        } else {
            debug_assert_eq!(state, StreamState::Readable);
            if bytes_written == 0 {
                return Err(StreamError::type_error(
                    "bytes_written must be greater than 0 when responding on a readable stream",
                ));
            }
            if bytes_written > first.byte_length - first.bytes_filled {
                return Err(StreamError::range_error("bytes_written out of range"));
            }
        }
        first.buffer = first.buffer.transfer()?;
        self.respond_internal(bytes_written)
    }

    pub(crate) fn respond_with_new_view(&mut self, view: ByteView) -> StreamResult<()> {
        let state = self.state;
        let Some(first) = self.controller.pending_pull_intos.front_mut() else {
            return Err(StreamError::type_error("no pending read to respond to"));
        };
        if view.is_detached() {
            return Err(StreamError::type_error("view's buffer is detached"));
        }
        let view_byte_length = view.byte_length();
        if state == StreamState::Closed {
            if view_byte_length != 0 {
                return Err(StreamError::type_error(
                    "view must have a zero byte length when responding on a closed stream",
                ));
            }
        } else if view_byte_length == 0 {
            return Err(StreamError::type_error(
                "view must have a non-zero byte length when responding on a readable stream",
            ));
        }
        if first.byte_offset + first.bytes_filled != view.byte_offset() {
            return Err(StreamError::range_error(
                "the region specified by view does not match the BYOB request",
            ));
        }
        if first.buffer_byte_length != view.buffer().byte_length() {
            return Err(StreamError::range_error(
                "the buffer of view has a different capacity than the BYOB request",
            ));
        }
        if view_byte_length > first.byte_length - first.bytes_filled {
            return Err(StreamError::range_error(
                "the region specified by view is larger than the BYOB request",
            ));
        }
        first.buffer = view.buffer().transfer()?;
        self.respond_internal(view_byte_length)
    }

    fn respond_internal(&mut self, bytes_written: usize) -> StreamResult<()> {
        self.invalidate_byob_request();
        if self.state == StreamState::Closed {
            debug_assert_eq!(bytes_written, 0);
            self.respond_in_closed_state()?;
        } else {
            debug_assert!(bytes_written > 0);
            self.respond_in_readable_state(bytes_written)?;
        }
        self.call_pull_if_needed();
        Ok(())
    }

    fn respond_in_closed_state(&mut self) -> StreamResult<()> {
        let Some(first) = self.controller.pending_pull_intos.front() else {
            return Ok(());
        };
        debug_assert_eq!(first.bytes_filled % first.element_size, 0);
        if first.reader_type == ReaderType::None {
            self.shift_pending_pull_into();
        }
        if self.has_byob_reader() {
            while self.num_read_into_requests() > 0 {
                let Some(descriptor) = self.shift_pending_pull_into() else {
                    break;
                };
                self.commit_pull_into_descriptor(descriptor)?;
            }
        }
        Ok(())
    }

    fn respond_in_readable_state(&mut self, bytes_written: usize) -> StreamResult<()> {
        let Some(first) = self.controller.pending_pull_intos.front_mut() else {
            return Ok(());
        };
        debug_assert!(bytes_written <= first.byte_length - first.bytes_filled);
        first.bytes_filled += bytes_written;

        if first.reader_type == ReaderType::None {
            self.enqueue_detached_pull_into_to_queue()?;
            let filled = self.process_pull_into_descriptors_using_queue()?;
            return self.commit_all(filled);
        }
        if first.bytes_filled < first.minimum_fill {
            return Ok(());
        }

        let Some(mut descriptor) = self.shift_pending_pull_into() else {
            return Ok(());
        };
        let remainder = descriptor.bytes_filled % descriptor.element_size;
        if remainder > 0 {
            let end = descriptor.byte_offset + descriptor.bytes_filled;
            self.enqueue_cloned_chunk_to_queue(&descriptor.buffer, end - remainder, remainder)?;
        }
        descriptor.bytes_filled -= remainder;

        let filled = self.process_pull_into_descriptors_using_queue()?;
        self.commit_pull_into_descriptor(descriptor)?;
        self.commit_all(filled)
    }
}

impl ControllerSteps<ByteView> for ByteControllerState {
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

    fn should_call_pull(inner: &ByteInner) -> bool {
        if inner.state != StreamState::Readable
            || inner.controller.pull.close_requested
            || !inner.controller.pull.started
        {
            return false;
        }
        if inner.has_default_reader() && inner.num_read_requests() > 0 {
            return true;
        }
        if inner.has_byob_reader() && inner.num_read_into_requests() > 0 {
            return true;
        }
        inner.desired_size().is_some_and(|size| size > 0.0)
    }

    fn pull_steps(inner: &mut ByteInner, request: ReadRequest<ByteView>) {
        debug_assert!(inner.has_default_reader());
        if inner.controller.queue_bytes() > 0 {
            debug_assert_eq!(inner.num_read_requests(), 0);
            inner.fill_read_request_from_queue(request);
            return;
        }
        if let Some(chunk_size) = inner.controller.auto_allocate_chunk_size {
            inner.controller.pending_pull_intos.push_back(PullIntoDescriptor {
                buffer: ArrayBuffer::new(chunk_size),
                buffer_byte_length: chunk_size,
                byte_offset: 0,
                byte_length: chunk_size,
                bytes_filled: 0,
                minimum_fill: 1,
                element_size: 1,
                reader_type: ReaderType::Default,
            });
        }
        inner.add_read_request(request);
        inner.call_pull_if_needed();
    }

    fn cancel_steps(inner: &mut ByteInner, reason: Option<String>) -> CancelFuture {
        inner.clear_pending_pull_intos();
        inner.controller.queue.reset();
        let cancel = inner.signals.request_cancel(reason);
        inner.clear_algorithms();
        cancel
    }

    fn release_steps(inner: &mut ByteInner) {
        let pending = &mut inner.controller.pending_pull_intos;
        if let Some(mut first) = pending.pop_front() {
            first.reader_type = ReaderType::None;
            pending.clear();
            pending.push_back(first);
        }
    }

    fn error_steps(inner: &mut ByteInner, error: StreamError) {
        inner.error_controller(error);
    }
}

/// Handle the underlying source uses to feed a byte stream.
#[derive(Clone)]
pub struct ReadableByteStreamController {
    inner: SharedInner<ByteView, ByteControllerState>,
}

impl ReadableByteStreamController {
    pub(crate) fn new(inner: SharedInner<ByteView, ByteControllerState>) -> Self {
        Self { inner }
    }

    /// `None` once the stream has errored, `0` once it has closed.
    pub fn desired_size(&self) -> Option<f64> {
        self.inner.lock().desired_size()
    }

    /// The live request for the oldest pending pull-into, if any.
    pub fn byob_request(&self) -> Option<ReadableStreamBYOBRequest> {
        let (generation, view) = self.inner.lock().get_byob_request()?;
        Some(ReadableStreamBYOBRequest {
            controller: self.clone(),
            generation,
            view,
        })
    }

    /// Requests close. Fails (and errors the stream) if a pending BYOB read
    /// holds a partial element that can never be completed.
    pub fn close(&self) -> StreamResult<()> {
        self.inner.lock().close_controller()
    }

    /// Transfers `chunk`'s buffer into the stream.
    pub fn enqueue(&self, chunk: impl Into<ByteView>) -> StreamResult<()> {
        self.inner.lock().enqueue_chunk(chunk.into())
    }

    pub fn error(&self, error: StreamError) {
        self.inner.lock().error_controller(error);
    }
}

/// Window into the oldest pending BYOB destination.
///
/// The source writes into [`view`](Self::view) and reports how many bytes it
/// wrote with [`respond`](Self::respond). Any other change to the pending
/// reads invalidates the request.
pub struct ReadableStreamBYOBRequest {
    controller: ReadableByteStreamController,
    generation: u64,
    view: ByteView,
}

impl ReadableStreamBYOBRequest {
    /// The destination view, or `None` once the request is no longer live.
    pub fn view(&self) -> Option<ByteView> {
        let inner = self.controller.inner.lock();
        if inner.check_byob_request(self.generation).is_err() || self.view.is_detached() {
            return None;
        }
        Some(self.view.clone())
    }

    pub fn respond(&self, bytes_written: usize) -> StreamResult<()> {
        let mut inner = self.controller.inner.lock();
        inner.check_byob_request(self.generation)?;
        if self.view.is_detached() {
            return Err(StreamError::type_error("BYOB request view is detached"));
        }
        inner.respond(bytes_written)
    }

    /// Responds with a view over the same region of a (possibly transferred) buffer.
    pub fn respond_with_new_view(&self, view: ByteView) -> StreamResult<()> {
        let mut inner = self.controller.inner.lock();
        inner.check_byob_request(self.generation)?;
        inner.respond_with_new_view(view)
    }
}
