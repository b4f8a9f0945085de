pub mod chunker;
pub mod pdf;

pub use chunker::{ChunkSlice, TextChunker};
pub use pdf::{ExtractedManual, PageSpan};
