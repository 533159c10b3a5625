//! Readers and writers for the Xenoverse 2 model, skeleton, animation,
//! texture, material and character build formats.

pub mod bcs;
pub mod document;
pub mod ean;
pub mod emb;
pub mod emd;
pub mod emm;
pub mod error;
pub mod importer;
pub mod io;
pub mod obj_export;
pub mod offsets;
pub mod options;
pub mod skeleton;
pub mod vertex;

pub use document::{Document, Format, decode, encode};
pub use error::{CodecError, Result};
