mod common;

use common::{local_test, settle};
use futures::StreamExt;
use parking_lot::Mutex;
use readable_streams::{
    ByteLengthQueuingStrategy, CountQueuingStrategy, QueuingStrategy, ReadableSource, ReadableStream,
    ReadableStreamDefaultController, StreamError, StreamResult, StreamState,
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

type Slot<T> = Arc<Mutex<Option<ReadableStreamDefaultController<T>>>>;

/// Enqueues `initial` on start, then only counts pulls.
struct Scripted<T: Send + 'static> {
    initial: Vec<T>,
    slot: Slot<T>,
    pulls: Arc<AtomicUsize>,
}

impl<T: Send + 'static> Scripted<T> {
    fn new(initial: Vec<T>) -> (Self, Slot<T>, Arc<AtomicUsize>) {
        let slot = Arc::new(Mutex::new(None));
        let pulls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                initial,
                slot: slot.clone(),
                pulls: pulls.clone(),
            },
            slot,
            pulls,
        )
    }
}

impl<T: Send + 'static> ReadableSource<T> for Scripted<T> {
    async fn start(&mut self, controller: &mut ReadableStreamDefaultController<T>) -> StreamResult<()> {
        for chunk in self.initial.drain(..) {
            controller.enqueue(chunk)?;
        }
        *self.slot.lock() = Some(controller.clone());
        Ok(())
    }

    async fn pull(&mut self, _controller: &mut ReadableStreamDefaultController<T>) -> StreamResult<()> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn chunks_are_delivered_in_enqueue_order() {
    local_test(async {
        let chunks: Vec<String> = (1..=5).map(|i| format!("c{i}")).collect();
        let (source, _slot, _pulls) = Scripted::new(chunks.clone());
        let stream = ReadableStream::builder(source)
            .strategy(CountQueuingStrategy::new(10.0))
            .spawn(tokio::task::spawn_local)
            .unwrap();
        let (_locked, reader) = stream.get_reader().unwrap();

        for expected in &chunks {
            assert_eq!(reader.read().await.unwrap().as_ref(), Some(expected));
        }
    });
}

#[test]
fn close_takes_effect_once_the_queue_drains() {
    local_test(async {
        let (source, slot, _pulls) = Scripted::new(vec!["c1", "c2"]);
        let stream = ReadableStream::builder(source)
            .strategy(CountQueuingStrategy::new(4.0))
            .spawn(tokio::task::spawn_local)
            .unwrap();
        settle().await;
        let controller = slot.lock().clone().unwrap();
        controller.close().unwrap();

        let (_locked, reader) = stream.get_reader().unwrap();
        assert_eq!(reader.read().await.unwrap(), Some("c1"));
        assert_eq!(stream.state(), StreamState::Readable);
        assert_eq!(reader.read().await.unwrap(), Some("c2"));
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(reader.read().await.unwrap(), None);
        reader.closed().await.unwrap();
    });
}

#[test]
fn byte_length_strategy_holds_back_pulls() {
    local_test(async {
        let (source, slot, pulls) = Scripted::new(vec![vec![0u8; 5], vec![0u8; 4]]);
        let stream = ReadableStream::builder(source)
            .strategy(ByteLengthQueuingStrategy::new(8.0))
            .spawn(tokio::task::spawn_local)
            .unwrap();
        settle().await;
        let controller = slot.lock().clone().unwrap();
        assert_eq!(controller.desired_size(), Some(-1.0));
        assert_eq!(pulls.load(Ordering::SeqCst), 0);

        let (_locked, reader) = stream.get_reader().unwrap();
        assert_eq!(reader.read().await.unwrap().map(|chunk| chunk.len()), Some(5));
        settle().await;
        assert_eq!(controller.desired_size(), Some(4.0));
        assert_eq!(pulls.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn failing_size_function_errors_the_stream() {
    struct Picky;

    impl QueuingStrategy<&'static str> for Picky {
        fn size(&self, chunk: &&'static str) -> StreamResult<f64> {
            if *chunk == "bad" {
                Err(StreamError::from("unsizable chunk"))
            } else {
                Ok(1.0)
            }
        }

        fn high_water_mark(&self) -> f64 {
            4.0
        }
    }

    local_test(async {
        let (source, _slot, _pulls) = Scripted::new(vec!["ok", "bad", "never"]);
        let stream = ReadableStream::builder(source)
            .strategy(Picky)
            .spawn(tokio::task::spawn_local)
            .unwrap();
        // Without a waiting read, "ok" is queued and then discarded by the error.
        settle().await;
        let (_locked, reader) = stream.get_reader().unwrap();

        let err = reader.read().await.unwrap_err();
        assert_eq!(err.to_string(), "unsizable chunk");
        assert_eq!(stream.state(), StreamState::Errored);
        assert_eq!(reader.closed().await.unwrap_err().to_string(), "unsizable chunk");
    });
}

#[test]
fn negative_chunk_size_is_a_range_error() {
    struct Negative;

    impl QueuingStrategy<u8> for Negative {
        fn size(&self, _chunk: &u8) -> StreamResult<f64> {
            Ok(-2.0)
        }

        fn high_water_mark(&self) -> f64 {
            1.0
        }
    }

    local_test(async {
        let stream = ReadableStream::from_vec(vec![1u8])
            .strategy(Negative)
            .spawn(tokio::task::spawn_local)
            .unwrap();
        settle().await;
        let (_locked, reader) = stream.get_reader().unwrap();
        assert!(reader.read().await.unwrap_err().is_range_error());
    });
}

#[test]
fn pull_failure_errors_every_pending_read() {
    struct FailsOnPull;

    impl ReadableSource<u32> for FailsOnPull {
        async fn pull(&mut self, _controller: &mut ReadableStreamDefaultController<u32>) -> StreamResult<()> {
            Err(StreamError::from("pull failed"))
        }
    }

    local_test(async {
        let stream = ReadableStream::builder(FailsOnPull)
            .strategy(CountQueuingStrategy::new(0.0))
            .spawn(tokio::task::spawn_local)
            .unwrap();
        let (_locked, reader) = stream.get_reader().unwrap();
        let first = reader.read();
        let second = reader.read();
        assert_eq!(first.await.unwrap_err().to_string(), "pull failed");
        assert_eq!(second.await.unwrap_err().to_string(), "pull failed");
    });
}

#[test]
fn read_then_cancel_settles_the_read_exactly_once() {
    local_test(async {
        let (source, _slot, _pulls) = Scripted::new(vec![7u32]);
        let stream = ReadableStream::builder(source)
            .spawn(tokio::task::spawn_local)
            .unwrap();
        settle().await;

        let (_locked, reader) = stream.get_reader().unwrap();
        let queued = reader.read();
        let pending = reader.read();
        let cancel = reader.cancel(Some("enough".into()));

        assert_eq!(queued.await.unwrap(), Some(7));
        assert_eq!(pending.await.unwrap(), None);
        cancel.await.unwrap();
        assert_eq!(stream.state(), StreamState::Closed);
    });
}

#[test]
fn default_reader_streams_chunks() {
    local_test(async {
        let stream = ReadableStream::from_iterator(1..=4)
            .spawn(tokio::task::spawn_local)
            .unwrap();
        let (_locked, reader) = stream.get_reader().unwrap();
        let doubled: Vec<i32> = reader.map(|chunk| chunk.unwrap() * 2).collect().await;
        assert_eq!(doubled, vec![2, 4, 6, 8]);
    });
}
