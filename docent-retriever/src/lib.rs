//! # docent-retriever
//!
//! The retrieval half of docent: an exact-search vector index that persists to a
//! pair of local artifacts, the [`Retriever`] that answers queries against it,
//! and the [`IngestionPipeline`] that fills it.
//!
//! ## Architecture
//!
//! - [`index`]: [`VectorIndex`], copy-on-write snapshots behind a tokio `RwLock`
//! - [`store`]: save/load of the `.vectors` and `.meta.db` artifacts
//! - [`retriever`]: query embedding, search and optional reranking
//! - [`ingest`]: chunk → embed → insert with the duplicate policy
//! - [`entry`]: index entries and retrieval results
//!
//! The pipeline types are generic over [`docent_embed::EmbeddingProvider`], so
//! tests plug in deterministic embedders and production uses
//! [`docent_embed::Embedder`].

pub mod entry;
pub mod error;
pub mod index;
pub mod ingest;
pub mod retriever;
pub mod store;

pub use entry::{IndexEntry, RetrievalResult, ScoredChunk, chunk_id};
pub use error::{IndexError, IngestError, Result, RetrieveError};
pub use index::{IndexStats, Metric, Snapshot, VectorIndex};
pub use ingest::{IngestOutcome, IngestReport, IngestionPipeline, RebuildSummary};
pub use retriever::{DEFAULT_CANDIDATE_MULTIPLIER, Retriever};
pub use store::StorePaths;
