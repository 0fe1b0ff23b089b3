//! Byte streams over vector sources.
//!
//! Blob uploads want a `Read` with a known length; vector sources are
//! single-pass iterators. `RecordStream` bridges the two, one fixed-width
//! record at a time, and can start at an arbitrary byte offset so each part of
//! a multipart upload gets its own independent stream.

pub mod doc_id;
pub mod record;
pub mod vector;

pub use doc_id::{DocIdRecords, DocIdStream, DOC_ID_BYTES};
pub use record::{RecordEncoder, RecordStream};
pub use vector::{VectorRecords, VectorValuesStream};
