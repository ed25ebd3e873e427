/// Compile-time tests to verify Send/Sync bounds are correct for each feature
///
/// Run with:
///   cargo test --features send  (default)
///   cargo test --no-default-features --features local
use readable_streams::{
    ByteView, ReadableByteStream, ReadableByteStreamController, ReadableStream, ReadableStreamBYOBReader,
    ReadableStreamDefaultController, ReadableStreamDefaultReader, StreamError,
};

fn assert_send<T: Send>() {}

fn assert_sync<T: Sync>() {}

#[cfg(feature = "send")]
#[test]
fn send_feature_handles_are_send_and_sync() {
    assert_send::<ReadableStream<i32>>();
    assert_sync::<ReadableStream<i32>>();
    assert_send::<ReadableByteStream>();
    assert_sync::<ReadableByteStream>();

    assert_send::<ReadableStreamDefaultController<String>>();
    assert_sync::<ReadableStreamDefaultController<String>>();
    assert_send::<ReadableByteStreamController>();
    assert_sync::<ReadableByteStreamController>();

    assert_send::<ReadableStreamDefaultReader<i32>>();
    assert_send::<ReadableStreamBYOBReader>();
    assert_send::<ByteView>();
    assert_sync::<ByteView>();
}

#[cfg(feature = "local")]
#[test]
fn local_feature_accepts_non_send_chunks() {
    use std::rc::Rc;

    // Rc chunks satisfy `MaybeSend` only without the `send` feature.
    let _: Option<ReadableStream<Rc<i32>>> = None;
    let _: Option<ReadableStreamDefaultReader<Rc<i32>>> = None;
}

#[test]
fn errors_are_send_sync_and_clone() {
    fn assert_clone<T: Clone>() {}
    assert_send::<StreamError>();
    assert_sync::<StreamError>();
    assert_clone::<StreamError>();
}
