use crate::error::{Result, ZeppelinError};
use crate::types::VectorDataType;
use crate::vectors::{KnnVectorValues, KnnVectorValuesSupplier, VectorValue};

use super::record::{RecordEncoder, RecordStream};

/// Byte stream over the vector blob (`.vec`).
pub type VectorValuesStream = RecordStream<VectorRecords>;

/// Encodes each vector as little-endian bytes of its declared element type.
pub struct VectorRecords {
    values: Box<dyn KnnVectorValues>,
    data_type: VectorDataType,
    width: usize,
}

impl VectorRecords {
    pub fn new(values: Box<dyn KnnVectorValues>, data_type: VectorDataType) -> Result<Self> {
        let width = values.bytes_per_vector();
        let expected = data_type.bytes_per_vector(values.dimension());
        if width == 0 || width != expected {
            return Err(ZeppelinError::Config(format!(
                "source reports {width} bytes per vector, but {} vectors of dimension {} take {expected}",
                data_type,
                values.dimension()
            )));
        }
        Ok(Self {
            values,
            data_type,
            width,
        })
    }
}

impl RecordEncoder for VectorRecords {
    fn record_width(&self) -> usize {
        self.width
    }

    fn advance(&mut self) -> Result<bool> {
        Ok(self.values.next_doc()?.is_some())
    }

    fn encode(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        match (self.data_type, self.values.vector_value()?) {
            (VectorDataType::Float, VectorValue::Float(v)) => {
                for x in v {
                    buf.extend_from_slice(&x.to_le_bytes());
                }
            }
            (VectorDataType::Byte, VectorValue::Byte(v)) => {
                buf.extend(v.into_iter().map(|b| b as u8));
            }
            (VectorDataType::Binary, VectorValue::Binary(v)) => {
                buf.extend_from_slice(&v);
            }
            (expected, other) => {
                return Err(ZeppelinError::Config(format!(
                    "cannot encode a {} vector as {expected}",
                    other.data_type()
                )));
            }
        }
        Ok(())
    }
}

impl RecordStream<VectorRecords> {
    /// Stream the whole vector blob from a fresh iterator.
    pub fn open(
        supplier: &dyn KnnVectorValuesSupplier,
        data_type: VectorDataType,
    ) -> Result<Self> {
        Ok(Self::new(VectorRecords::new(supplier.get()?, data_type)?))
    }

    /// Stream `size` bytes of the vector blob starting at byte `start`, from a
    /// fresh iterator.
    pub fn open_range(
        supplier: &dyn KnnVectorValuesSupplier,
        data_type: VectorDataType,
        start: u64,
        size: u64,
    ) -> Result<Self> {
        let records = VectorRecords::new(supplier.get()?, data_type)?;
        Self::positioned(records, start, size)
    }
}
