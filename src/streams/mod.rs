pub mod buffer;
pub mod byte_source_trait;
pub mod byte_state;
pub mod default_controller;
pub mod error;
pub mod inner;
pub mod queue;
pub mod readable;
pub mod reader;
pub mod request;
pub mod task;

// Re-export main types
pub use buffer::*;
pub use byte_source_trait::*;
pub use byte_state::*;
pub use default_controller::*;
pub use error::*;
pub use queue::*;
pub use readable::*;
pub use reader::*;
pub use request::{
    CancelFuture, ClosedFuture, ReadFuture, ReadIntoFuture, ReadIntoResult, RequestFuture,
};

/// Type-level marker for unlocked streams
pub struct Unlocked;
/// Type-level marker for locked streams
pub struct Locked;

/// Generic queuing strategy trait
pub trait QueuingStrategy<T> {
    /// Return the size of the chunk. Must be finite and non-negative.
    fn size(&self, chunk: &T) -> StreamResult<f64>;
    /// Return high water mark (desired max queue size)
    fn high_water_mark(&self) -> f64;
}

/// Count-based strategy
#[derive(Debug, Clone)]
pub struct CountQueuingStrategy {
    high_water_mark: f64,
}

impl CountQueuingStrategy {
    pub const fn new(high_water_mark: f64) -> Self {
        Self { high_water_mark }
    }
}

impl<T> QueuingStrategy<T> for CountQueuingStrategy {
    fn size(&self, _chunk: &T) -> StreamResult<f64> {
        Ok(1.0)
    }

    fn high_water_mark(&self) -> f64 {
        self.high_water_mark
    }
}

/// Byte length strategy for types with known byte sizes
#[derive(Debug, Clone)]
pub struct ByteLengthQueuingStrategy {
    high_water_mark: f64,
}

impl ByteLengthQueuingStrategy {
    pub const fn new(high_water_mark: f64) -> Self {
        Self { high_water_mark }
    }
}

macro_rules! byte_length_strategy {
    ($($chunk:ty => $len:expr),* $(,)?) => {
        $(
            impl QueuingStrategy<$chunk> for ByteLengthQueuingStrategy {
                fn size(&self, chunk: &$chunk) -> StreamResult<f64> {
                    let len: fn(&$chunk) -> usize = $len;
                    Ok(len(chunk) as f64)
                }

                fn high_water_mark(&self) -> f64 {
                    self.high_water_mark
                }
            }
        )*
    };
}

byte_length_strategy! {
    Vec<u8> => |chunk| chunk.len(),
    String => |chunk| chunk.len(),
    &'static [u8] => |chunk| chunk.len(),
    &'static str => |chunk| chunk.len(),
    ByteView => |chunk| chunk.byte_length(),
}
