//! Transaction history: normalization of raw indexer records and the aggregator that
//! merges all categories into one descending timeline.

pub mod aggregator;
pub mod normalizer;

pub use aggregator::{merge_event_batches, HistoryAggregator, HistoryFetch, MERGE_ORDER};
pub use normalizer::normalize;
