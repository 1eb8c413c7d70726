//! Entity producers: application data staged and released to the transport
//! in bounded fragments.
//!
//! - [`BinaryEntityProducer`] for raw bytes
//! - [`TextEntityProducer`] for text, encoded with the content type's charset

mod binary;
mod details;
mod producer;
mod staging;
mod text;

pub use binary::{BinaryCoder, BinaryEntityProducer};
pub use details::{AsyncEntityProducer, ContentType, EntityDescriptor, EntityDetails};
pub use producer::{BufferedProducer, ChunkCoder, ContentSource, EntityWriter, StreamState};
pub use staging::StagingBuffer;
pub use text::{TextCoder, TextEntityProducer};
