//! Forward-only vector sources.
//!
//! A `KnnVectorValues` walks the vectors of one segment field exactly once, in
//! ascending doc id order. Anything that needs a second pass (or a pass per
//! upload part) asks the `KnnVectorValuesSupplier` for a fresh iterator.

use std::sync::Arc;

use crate::error::{Result, ZeppelinError};
use crate::types::VectorDataType;

/// One decoded vector.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorValue {
    Float(Vec<f32>),
    Byte(Vec<i8>),
    /// Packed bits, 8 dimensions per byte.
    Binary(Vec<u8>),
}

impl VectorValue {
    pub fn data_type(&self) -> VectorDataType {
        match self {
            VectorValue::Float(_) => VectorDataType::Float,
            VectorValue::Byte(_) => VectorDataType::Byte,
            VectorValue::Binary(_) => VectorDataType::Binary,
        }
    }

    /// Number of logical dimensions.
    pub fn dimension(&self) -> usize {
        match self {
            VectorValue::Float(v) => v.len(),
            VectorValue::Byte(v) => v.len(),
            VectorValue::Binary(v) => v.len() * 8,
        }
    }
}

/// Single-pass iterator over the vectors of one field.
pub trait KnnVectorValues: Send {
    /// Dimensionality of every vector in this source.
    fn dimension(&self) -> usize;

    /// Encoded width of one vector; constant for the lifetime of the iterator.
    fn bytes_per_vector(&self) -> usize;

    /// Move to the next document. Returns its doc id, or `None` when exhausted.
    /// Must not decode the vector payload.
    fn next_doc(&mut self) -> Result<Option<u32>>;

    /// Doc id the iterator is positioned on, `None` before the first
    /// `next_doc` and after exhaustion.
    fn doc_id(&self) -> Option<u32>;

    /// Decode the vector of the current document.
    fn vector_value(&mut self) -> Result<VectorValue>;
}

/// Hands out independent iterators over the same vectors.
pub trait KnnVectorValuesSupplier: Send + Sync {
    fn get(&self) -> Result<Box<dyn KnnVectorValues>>;
}

impl<F> KnnVectorValuesSupplier for F
where
    F: Fn() -> Result<Box<dyn KnnVectorValues>> + Send + Sync,
{
    fn get(&self) -> Result<Box<dyn KnnVectorValues>> {
        self()
    }
}

/// Vectors held in memory, e.g. a freshly flushed segment buffer.
#[derive(Debug, Clone)]
pub struct InMemoryVectors {
    data_type: VectorDataType,
    dimension: usize,
    docs: Arc<[(u32, VectorValue)]>,
}

impl InMemoryVectors {
    /// Build from `(doc id, vector)` pairs. Doc ids must be strictly
    /// ascending and every vector must match `data_type` and `dimension`.
    pub fn new(
        data_type: VectorDataType,
        dimension: usize,
        docs: Vec<(u32, VectorValue)>,
    ) -> Result<Self> {
        if data_type == VectorDataType::Binary && dimension % 8 != 0 {
            return Err(ZeppelinError::Validation(format!(
                "binary dimension must be a multiple of 8, got {dimension}"
            )));
        }
        let mut previous: Option<u32> = None;
        for (doc, value) in &docs {
            if previous.is_some_and(|p| p >= *doc) {
                return Err(ZeppelinError::Validation(format!(
                    "doc ids must be strictly ascending, {doc} follows {}",
                    previous.unwrap_or_default()
                )));
            }
            if value.data_type() != data_type {
                return Err(ZeppelinError::Validation(format!(
                    "doc {doc} holds a {} vector, expected {data_type}",
                    value.data_type()
                )));
            }
            if value.dimension() != dimension {
                return Err(ZeppelinError::Validation(format!(
                    "doc {doc} has dimension {}, expected {dimension}",
                    value.dimension()
                )));
            }
            previous = Some(*doc);
        }
        Ok(Self {
            data_type,
            dimension,
            docs: docs.into(),
        })
    }

    /// Float vectors with doc ids `0..n`.
    pub fn from_floats(dimension: usize, vectors: Vec<Vec<f32>>) -> Result<Self> {
        let docs = vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i as u32, VectorValue::Float(v)))
            .collect();
        Self::new(VectorDataType::Float, dimension, docs)
    }

    pub fn data_type(&self) -> VectorDataType {
        self.data_type
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Length in bytes of the vector blob for these vectors.
    pub fn vector_blob_length(&self) -> u64 {
        self.data_type.bytes_per_vector(self.dimension) as u64 * self.docs.len() as u64
    }
}

impl KnnVectorValuesSupplier for InMemoryVectors {
    fn get(&self) -> Result<Box<dyn KnnVectorValues>> {
        Ok(Box::new(InMemoryVectorValues {
            data_type: self.data_type,
            dimension: self.dimension,
            docs: self.docs.clone(),
            cursor: None,
        }))
    }
}

struct InMemoryVectorValues {
    data_type: VectorDataType,
    dimension: usize,
    docs: Arc<[(u32, VectorValue)]>,
    /// Index into `docs`; `Some(len)` once exhausted.
    cursor: Option<usize>,
}

impl KnnVectorValues for InMemoryVectorValues {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn bytes_per_vector(&self) -> usize {
        self.data_type.bytes_per_vector(self.dimension)
    }

    fn next_doc(&mut self) -> Result<Option<u32>> {
        let next = match self.cursor {
            None => 0,
            Some(i) if i >= self.docs.len() => return Ok(None),
            Some(i) => i + 1,
        };
        self.cursor = Some(next);
        Ok(self.docs.get(next).map(|(doc, _)| *doc))
    }

    fn doc_id(&self) -> Option<u32> {
        self.cursor
            .and_then(|i| self.docs.get(i))
            .map(|(doc, _)| *doc)
    }

    fn vector_value(&mut self) -> Result<VectorValue> {
        self.cursor
            .and_then(|i| self.docs.get(i))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| {
                ZeppelinError::Internal("vector_value called while not positioned on a doc".into())
            })
    }
}
