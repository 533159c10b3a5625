//! Format detection and the typed-tree boundary shared by every codec.

use crate::bcs::{BCS_MAGIC, BcsFile, parse_bcs, write_bcs};
use crate::ean::{EAN_MAGIC, EanFile, parse_ean, write_ean};
use crate::emb::{EMB_MAGIC, EmbFile, parse_emb, write_emb};
use crate::emd::{EMD_MAGIC, EmdFile, parse_emd, write_emd};
use crate::emm::{EMM_MAGIC, EmmFile, parse_emm, write_emm};
use crate::error::{CodecError, Result};
use crate::io::{Magic, Reader};
use crate::skeleton::{ESK_MAGIC, EskFile, parse_esk, write_esk};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    Esk,
    Emd,
    Ean,
    Emb,
    Emm,
    Bcs,
}

impl Format {
    pub const ALL: [Format; 6] = [
        Format::Esk,
        Format::Emd,
        Format::Ean,
        Format::Emb,
        Format::Emm,
        Format::Bcs,
    ];

    pub fn magic(self) -> Magic {
        match self {
            Format::Esk => ESK_MAGIC,
            Format::Emd => EMD_MAGIC,
            Format::Ean => EAN_MAGIC,
            Format::Emb => EMB_MAGIC,
            Format::Emm => EMM_MAGIC,
            Format::Bcs => BCS_MAGIC,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Esk => "esk",
            Format::Emd => "emd",
            Format::Ean => "ean",
            Format::Emb => "emb",
            Format::Emm => "emm",
            Format::Bcs => "bcs",
        }
    }

    /// Picks the format from the leading signature.
    pub fn detect(data: &[u8]) -> Result<Format> {
        let found: Magic = match Reader::new(data).slice(0, 4)?.try_into() {
            Ok(found) => found,
            Err(_) => return Err(CodecError::Unsupported("signature is not 4 bytes".into())),
        };
        Self::ALL
            .into_iter()
            .find(|format| format.magic() == found)
            .ok_or_else(|| {
                CodecError::Unsupported(format!(
                    "unrecognised signature {:?}",
                    String::from_utf8_lossy(&found)
                ))
            })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A decoded file of any supported kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "data", rename_all = "lowercase")]
pub enum Document {
    Esk(EskFile),
    Emd(EmdFile),
    Ean(EanFile),
    Emb(EmbFile),
    Emm(EmmFile),
    Bcs(BcsFile),
}

impl Document {
    pub fn format(&self) -> Format {
        match self {
            Document::Esk(_) => Format::Esk,
            Document::Emd(_) => Format::Emd,
            Document::Ean(_) => Format::Ean,
            Document::Emb(_) => Format::Emb,
            Document::Emm(_) => Format::Emm,
            Document::Bcs(_) => Format::Bcs,
        }
    }

    /// One-line description for `info`.
    pub fn summary(&self) -> String {
        match self {
            Document::Esk(esk) => format!(
                "skeleton, version {}, {} bones",
                esk.version,
                esk.skeleton.bones.len()
            ),
            Document::Emd(emd) => {
                let meshes: usize = emd.models.iter().map(|m| m.meshes.len()).sum();
                let submeshes: Vec<_> = emd.submeshes().collect();
                let vertices: usize = submeshes.iter().map(|s| s.vertices.len()).sum();
                let triangles: usize = submeshes.iter().map(|s| s.faces().count()).sum();
                format!(
                    "model, version {:#x}, {} models, {meshes} meshes, {} submeshes, \
                     {vertices} vertices, {triangles} triangles",
                    emd.version,
                    emd.models.len(),
                    submeshes.len()
                )
            }
            Document::Ean(ean) => format!(
                "{} animation, {} clips over {} bones",
                if ean.is_camera { "camera" } else { "character" },
                ean.animations.len(),
                ean.skeleton.bones.len()
            ),
            Document::Emb(emb) => format!(
                "texture container, {} entries, {} bytes of data{}",
                emb.entries.len(),
                emb.entries.iter().map(|e| e.data.len()).sum::<usize>(),
                if emb.use_file_names { "" } else { ", unnamed" }
            ),
            Document::Emm(emm) => format!(
                "material library, version {:#x}, {} materials",
                emm.version,
                emm.materials.len()
            ),
            Document::Bcs(bcs) => format!(
                "character build ({:?} layout), {:?} {:?}, {} part sets, {} part colors, {} bodies",
                bcs.version,
                bcs.race,
                bcs.gender,
                bcs.part_sets.len(),
                bcs.part_colors.len(),
                bcs.bodies.len()
            ),
        }
    }
}

pub fn decode(data: &[u8]) -> Result<Document> {
    Ok(match Format::detect(data)? {
        Format::Esk => Document::Esk(parse_esk(data)?),
        Format::Emd => Document::Emd(parse_emd(data)?),
        Format::Ean => Document::Ean(parse_ean(data)?),
        Format::Emb => Document::Emb(parse_emb(data)?),
        Format::Emm => Document::Emm(parse_emm(data)?),
        Format::Bcs => Document::Bcs(parse_bcs(data)?),
    })
}

pub fn encode(document: &Document) -> Result<Vec<u8>> {
    match document {
        Document::Esk(esk) => write_esk(esk),
        Document::Emd(emd) => write_emd(emd),
        Document::Ean(ean) => write_ean(ean),
        Document::Emb(emb) => write_emb(emb),
        Document::Emm(emm) => write_emm(emm),
        Document::Bcs(bcs) => write_bcs(bcs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bcs::BcsVersion;
    use crate::emb::EmbEntry;
    use crate::skeleton::{Skeleton, Transform};
    use pretty_assertions::assert_eq;

    fn skeleton() -> Skeleton {
        Skeleton::from_parents(vec![
            ("b_C_Base".into(), -1, Transform::default()),
            ("b_C_Pelvis".into(), 0, Transform::default()),
        ])
        .unwrap()
    }

    #[test]
    fn every_format_is_detected_from_its_signature() {
        let documents = [
            Document::Esk(EskFile::new(skeleton())),
            Document::Emb(EmbFile::new(vec![EmbEntry {
                name: "a.dds".into(),
                data: vec![1, 2, 3],
            }])),
            Document::Bcs(BcsFile::new(BcsVersion::Current)),
            Document::Ean(EanFile::character(skeleton(), Vec::new())),
        ];
        for document in documents {
            let bytes = encode(&document).unwrap();
            assert_eq!(Format::detect(&bytes).unwrap(), document.format());
            assert_eq!(decode(&bytes).unwrap(), document);
        }
    }

    #[test]
    fn unknown_signature_is_unsupported() {
        assert!(matches!(decode(b"#XYZ\xFE\xFF"), Err(CodecError::Unsupported(_))));
        assert!(matches!(
            Format::detect(b"#E"),
            Err(CodecError::OffsetOutOfBounds { .. })
        ));
    }

    #[test]
    fn json_dump_is_tagged_by_format() {
        let document = Document::Esk(EskFile::new(skeleton()));
        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(json["format"], "esk");
        assert_eq!(json["data"]["skeleton"]["bones"][1]["name"], "b_C_Pelvis");
        let back: Document = serde_json::from_value(json).unwrap();
        assert_eq!(back, document);
    }

    #[test]
    fn summary_mentions_counts() {
        let document = Document::Esk(EskFile::new(skeleton()));
        assert_eq!(document.summary(), "skeleton, version 1, 2 bones");
        assert_eq!(document.format().to_string(), "esk");
    }
}
