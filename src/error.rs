use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("signature mismatch: expected {expected:?}, found {found:?}")]
    SignatureMismatch { expected: [u8; 4], found: [u8; 4] },

    #[error("offset {offset:#x} (+{len} bytes) is outside the {size}-byte buffer")]
    OffsetOutOfBounds { offset: usize, len: usize, size: usize },

    #[error("declared stride {declared} does not match the {expected} bytes its flags imply")]
    StrideMismatch { declared: usize, expected: usize },

    #[error("sanity check failed: {0}")]
    SanityCheckFailed(String),

    #[error("triangle group {group} holds {bones} palette bones, above the 24 bone limit")]
    PaletteCapacityExceeded { group: usize, bones: usize },

    #[error("bone '{0}' is not present in the skeleton")]
    UnknownBone(String),

    #[error("vertex {vertex} has {count} bone influences, at most 4 can be stored")]
    TooManyInfluences { vertex: usize, count: usize },

    #[error("cannot encode {entity}: {detail}")]
    Unencodable { entity: String, detail: String },

    #[error("relative offset for position {0:#x} does not fit in 32 bits")]
    OffsetOverflow(usize),

    #[error("an i/o error occurred: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse obj file: {0}")]
    ObjParse(#[from] tobj::LoadError),

    #[error("failed to find processable mesh data in obj file")]
    NoMeshData,

    #[error("an unsupported operation was attempted: {0}")]
    Unsupported(String),
}

impl CodecError {
    /// Prefixes an `Unencodable` error with the entity that owns the bad value,
    /// e.g. `model 0 > mesh 2 > vertex color`.
    pub fn within(self, owner: impl Into<String>) -> Self {
        match self {
            CodecError::Unencodable { entity, detail } => CodecError::Unencodable {
                entity: format!("{} > {entity}", owner.into()),
                detail,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

pub(crate) fn sanity(message: impl Into<String>) -> CodecError {
    CodecError::SanityCheckFailed(message.into())
}

pub(crate) fn unencodable(entity: impl Into<String>, detail: impl Into<String>) -> CodecError {
    CodecError::Unencodable {
        entity: entity.into(),
        detail: detail.into(),
    }
}
