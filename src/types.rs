use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ZeppelinError;

/// Element type of the vectors being indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorDataType {
    /// 32-bit floats, 4 bytes per dimension.
    Float,
    /// Signed bytes, 1 byte per dimension.
    Byte,
    /// Packed bits, 1 byte per 8 dimensions.
    Binary,
}

impl VectorDataType {
    /// Width in bytes of one encoded vector of `dimension` elements.
    pub fn bytes_per_vector(&self, dimension: usize) -> usize {
        match self {
            VectorDataType::Float => dimension * 4,
            VectorDataType::Byte => dimension,
            VectorDataType::Binary => dimension / 8,
        }
    }
}

impl std::fmt::Display for VectorDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorDataType::Float => write!(f, "float"),
            VectorDataType::Byte => write!(f, "byte"),
            VectorDataType::Binary => write!(f, "binary"),
        }
    }
}

impl FromStr for VectorDataType {
    type Err = ZeppelinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "float" => Ok(VectorDataType::Float),
            "byte" => Ok(VectorDataType::Byte),
            "binary" => Ok(VectorDataType::Binary),
            other => Err(ZeppelinError::Config(format!(
                "unsupported vector data type: {other}"
            ))),
        }
    }
}

/// Distance space the remote index is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpaceType {
    #[serde(rename = "l2")]
    L2,
    #[serde(rename = "innerproduct")]
    InnerProduct,
    #[serde(rename = "cosinesimil")]
    CosineSimil,
    #[serde(rename = "hamming")]
    Hamming,
}

impl std::fmt::Display for SpaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpaceType::L2 => write!(f, "l2"),
            SpaceType::InnerProduct => write!(f, "innerproduct"),
            SpaceType::CosineSimil => write!(f, "cosinesimil"),
            SpaceType::Hamming => write!(f, "hamming"),
        }
    }
}

/// Native engine that produces the index file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnnEngine {
    #[default]
    Faiss,
}

impl KnnEngine {
    pub fn name(&self) -> &'static str {
        match self {
            KnnEngine::Faiss => "faiss",
        }
    }

    /// Extension every index file produced by this engine carries.
    pub fn extension(&self) -> &'static str {
        match self {
            KnnEngine::Faiss => ".faiss",
        }
    }
}

impl std::fmt::Display for KnnEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What triggered the index build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Flush,
    Merge,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Flush => "flush",
            OperationKind::Merge => "merge",
        }
    }
}

/// HNSW construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParameters {
    pub ef_construction: usize,
    pub m: usize,
}

impl Default for HnswParameters {
    fn default() -> Self {
        Self {
            ef_construction: 100,
            m: 16,
        }
    }
}

/// Engine-specific build parameters forwarded to the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum IndexParameters {
    Hnsw {
        space_type: SpaceType,
        algorithm_parameters: HnswParameters,
    },
}

impl Default for IndexParameters {
    fn default() -> Self {
        IndexParameters::Hnsw {
            space_type: SpaceType::L2,
            algorithm_parameters: HnswParameters::default(),
        }
    }
}
