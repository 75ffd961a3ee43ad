//! Chunking, embedding, vector storage, and hybrid retrieval
//! (`spec.md` §3, §4.3–§4.5).

mod chunk;
mod error;
mod ids;
mod indexer;
mod retriever;
mod sidecar;
mod vectorstore;

pub use chunk::{chunk_file, chunk_repository, Chunk, ChunkStats, ChunkType};
pub use error::{IndexError, Result};
pub use indexer::{IndexOutcome, Indexer, IndexerConfig};
pub use retriever::{Retriever, DEFAULT_K};
pub use sidecar::{read_sidecar, write_sidecar, IndexSidecar};
pub use vectorstore::{
    CollectionInfo, EphemeralVectorStore, PersistentVectorStore, ScoredChunk, StoredChunk,
    VectorStore,
};
