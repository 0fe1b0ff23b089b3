use crate::error::{Result, ZeppelinError};
use crate::vectors::{KnnVectorValues, KnnVectorValuesSupplier};

use super::record::{RecordEncoder, RecordStream};

/// Width of one doc id record.
pub const DOC_ID_BYTES: usize = 4;

/// Byte stream over the doc id blob (`.did`).
pub type DocIdStream = RecordStream<DocIdRecords>;

/// Encodes each doc id as a 4-byte little-endian integer.
pub struct DocIdRecords {
    values: Box<dyn KnnVectorValues>,
}

impl DocIdRecords {
    pub fn new(values: Box<dyn KnnVectorValues>) -> Self {
        Self { values }
    }
}

impl RecordEncoder for DocIdRecords {
    fn record_width(&self) -> usize {
        DOC_ID_BYTES
    }

    fn advance(&mut self) -> Result<bool> {
        Ok(self.values.next_doc()?.is_some())
    }

    fn encode(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        let doc = self.values.doc_id().ok_or_else(|| {
            ZeppelinError::Internal("doc id requested while not positioned on a doc".into())
        })?;
        buf.extend_from_slice(&doc.to_le_bytes());
        Ok(())
    }
}

impl RecordStream<DocIdRecords> {
    /// Stream every doc id from a fresh iterator.
    pub fn open(supplier: &dyn KnnVectorValuesSupplier) -> Result<Self> {
        Ok(Self::new(DocIdRecords::new(supplier.get()?)))
    }
}
