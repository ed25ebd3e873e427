//! WHATWG-style readable streams.
//!
//! A [`ReadableStream`] wraps an underlying source behind a controller with a
//! sized queue and backpressure. Default streams carry arbitrary chunks and
//! are read with a [`ReadableStreamDefaultReader`]. Byte streams additionally
//! support [`ReadableStreamBYOBReader`], which reads straight into
//! caller-supplied buffers.
//!
//! ```
//! use readable_streams::ReadableStream;
//!
//! # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # tokio::task::LocalSet::new().block_on(&runtime, async {
//! let stream = ReadableStream::from_vec(vec![1, 2, 3])
//!     .spawn(tokio::task::spawn_local)
//!     .unwrap();
//! let (_locked, reader) = stream.get_reader().unwrap();
//! while let Some(value) = reader.read().await.unwrap() {
//!     println!("{value}");
//! }
//! # });
//! ```

pub mod platform;
pub mod streams;

pub use streams::*;
