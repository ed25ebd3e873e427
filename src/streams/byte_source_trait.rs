use super::{byte_state::ReadableByteStreamController, error::StreamError};
use crate::platform::MaybeSend;

type StreamResult<T> = Result<T, StreamError>;

/// Underlying source of a byte stream.
///
/// During `pull` the source either enqueues chunks through the controller or,
/// when [`ReadableByteStreamController::byob_request`] is set, writes straight
/// into the reader's buffer and calls `respond`.
pub trait ReadableByteSource: MaybeSend + 'static {
    fn start(
        &mut self,
        controller: &mut ReadableByteStreamController,
    ) -> impl Future<Output = StreamResult<()>> + MaybeSend {
        let _ = controller;
        async { Ok(()) }
    }

    fn pull(
        &mut self,
        controller: &mut ReadableByteStreamController,
    ) -> impl Future<Output = StreamResult<()>> + MaybeSend {
        let _ = controller;
        async { Ok(()) }
    }

    fn cancel(&mut self, reason: Option<String>) -> impl Future<Output = StreamResult<()>> + MaybeSend {
        let _ = reason;
        async { Ok(()) }
    }
}
