//! `#BCS` character builds: equipment part sets, colour palettes, body
//! scales and the skeleton tweaks a character applies on top of its `.esk`.

mod parse;
mod ser;
mod types;

use crate::io::Magic;

pub use parse::parse_bcs;
pub use ser::write_bcs;
pub use types::*;

pub const BCS_MAGIC: Magic = *b"#BCS";

pub const PARTS_PER_SET: usize = 10;
pub const MAX_PART_HIDE_FLAGS: u32 = 0x3FF;
pub const MAX_PHYSICS_HIDE_FLAGS: u32 = 0x200;

const PHYSICS_PART_SIZE: usize = 72;
const COLORS_SIZE: usize = 80;
const BCS_BONE_SIZE: usize = 52;
/// The legacy header embeds the first skeleton's header at a fixed position.
const LEGACY_SKELETON_OFFSET: usize = 64;
/// Legacy bone table pointers count from here rather than from the skeleton.
const LEGACY_SKELETON_BASE: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::io::Reader;
    use pretty_assertions::assert_eq;

    fn bust() -> Part {
        let mut part = Part::new("GOK");
        part.model = 0;
        part.texture = 0;
        part.shader = 3;
        part.flags = PartFlags::DYT_FROM_TEXTURE_EMB;
        part.hide_flags = PartTypeFlags::PANTS;
        part.f_36 = 0.5;
        part.emd_path = "GOK_000_Bust".into();
        part.emb_path = "GOK_000_Bust".into();
        part.color_selectors = vec![ColorSelector {
            part_color_group: 1,
            color_index: 4,
        }];
        part.physics_parts = vec![PhysicsPart {
            model1: 2,
            model2: -1,
            texture: 0,
            flags: PartFlags::empty(),
            hide_flags: PartTypeFlags::empty(),
            hide_mat_flags: PartTypeFlags::BOOTS,
            chara_code: "GOK".into(),
            emd_path: "GOK_000_Tail".into(),
            emm_path: String::new(),
            emb_path: String::new(),
            ean_path: "GOK_000_Tail".into(),
            bone_to_attach: "b_C_Pelvis".into(),
            scd_path: "GOK_000_Tail".into(),
        }];
        part
    }

    fn build(version: BcsVersion) -> BcsFile {
        let mut bcs = BcsFile::new(version);
        bcs.race = Race::Saiyan;
        bcs.gender = Gender::Male;
        bcs.f_48 = [1.0, 0.0, 0.5, 0.0, 0.0, 0.0, 2.0];

        let mut set = PartSet::new(2);
        set.set(PartType::Bust, bust());
        set.set(PartType::Hair, Part::new("GOK"));
        bcs.part_sets.push(set);

        bcs.part_colors.push(PartColor {
            id: 1,
            name: "eye_".into(),
            colors: vec![Colors {
                id: 2,
                colors: [[0.1, 0.2, 0.3, 1.0], [0.0; 4], [1.0; 4], [0.5, 0.5, 0.5, 0.0]],
            }],
        });
        bcs.bodies.push(Body {
            id: 0,
            scales: vec![BoneScale {
                bone_name: "b_C_Head".into(),
                scale: [1.1, 1.1, 1.0],
            }],
        });
        bcs.skeleton1 = Some(BcsSkeleton {
            i_00: 0,
            bones: vec![BcsBone {
                name: "b_C_Spine1".into(),
                i_00: 1,
                i_04: 0,
                i_08: 0,
                values: [1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            }],
        });
        bcs
    }

    fn current_with_unk3() -> BcsFile {
        let mut bcs = build(BcsVersion::Current);
        if let Some(Some(part)) = bcs.part_sets[0].parts.get_mut(PartType::Bust.slot()) {
            part.unk3 = vec![Unk3 {
                values: [1, 2, 3, 4, 5, 6],
            }];
        }
        bcs.skeleton2 = Some(BcsSkeleton {
            i_00: 7,
            bones: Vec::new(),
        });
        bcs
    }

    #[test]
    fn current_round_trip() {
        let bcs = current_with_unk3();
        let bytes = write_bcs(&bcs).unwrap();
        let decoded = parse_bcs(&bytes).unwrap();
        assert_eq!(decoded, bcs);
        assert_eq!(write_bcs(&decoded).unwrap(), bytes);
    }

    #[test]
    fn legacy_round_trip() {
        let bcs = build(BcsVersion::Legacy);
        let bytes = write_bcs(&bcs).unwrap();
        let reader = Reader::new(&bytes);
        assert_eq!(reader.i16(6).unwrap(), 72);
        assert_eq!(reader.u8(32).unwrap(), 1);
        assert_eq!(reader.u16(66).unwrap(), 1);
        assert_eq!(parse_bcs(&bytes).unwrap(), bcs);
    }

    #[test]
    fn null_colors_and_empty_bodies_are_dropped_but_keep_ids() {
        let mut bcs = build(BcsVersion::Current);
        bcs.bodies.push(Body {
            id: 3,
            scales: Vec::new(),
        });
        let decoded = parse_bcs(&write_bcs(&bcs).unwrap()).unwrap();
        assert_eq!(decoded.bodies.len(), 1);
        let colors = &decoded.part_color("eye_").unwrap().colors;
        assert_eq!(colors.len(), 1);
        assert_eq!(colors[0].id, 2);
        assert_eq!(Reader::new(&write_bcs(&bcs).unwrap()).u16(16).unwrap(), 4);
    }

    #[test]
    fn unknown_signature_fails() {
        let mut bytes = write_bcs(&build(BcsVersion::Current)).unwrap();
        bytes[6..8].copy_from_slice(&80i16.to_le_bytes());
        assert!(matches!(parse_bcs(&bytes), Err(CodecError::SanityCheckFailed(_))));
    }

    #[test]
    fn part_count_other_than_ten_fails() {
        let mut bytes = write_bcs(&build(BcsVersion::Current)).unwrap();
        let reader = Reader::new(&bytes);
        let table = reader.u32(24).unwrap() as usize;
        let set = reader.u32(table + 8).unwrap() as usize;
        bytes[set + 20..set + 24].copy_from_slice(&9i32.to_le_bytes());
        match parse_bcs(&bytes) {
            Err(CodecError::SanityCheckFailed(message)) => assert!(message.contains("part set 2")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn hide_flags_beyond_range_fail_both_ways() {
        let mut bcs = build(BcsVersion::Current);
        if let Some(Some(part)) = bcs.part_sets[0].parts.get_mut(PartType::Hair.slot()) {
            part.hide_flags = PartTypeFlags::from_bits_retain(0x400);
        }
        assert!(matches!(write_bcs(&bcs), Err(CodecError::Unencodable { .. })));

        let mut bytes = write_bcs(&build(BcsVersion::Current)).unwrap();
        let reader = Reader::new(&bytes);
        let table = reader.u32(24).unwrap() as usize;
        let set = reader.u32(table + 8).unwrap() as usize;
        let parts = set + reader.u32(set + 24).unwrap() as usize;
        let hair = set + reader.u32(parts + 4 * PartType::Hair.slot()).unwrap() as usize;
        bytes[hair + 28..hair + 32].copy_from_slice(&0x800u32.to_le_bytes());
        assert!(matches!(parse_bcs(&bytes), Err(CodecError::SanityCheckFailed(_))));
    }

    #[test]
    fn legacy_cannot_store_unk3() {
        let mut bcs = current_with_unk3();
        bcs.version = BcsVersion::Legacy;
        bcs.skeleton2 = None;
        assert!(matches!(write_bcs(&bcs), Err(CodecError::Unencodable { .. })));
    }

    #[test]
    fn truncated_file_is_out_of_bounds() {
        let bytes = write_bcs(&build(BcsVersion::Current)).unwrap();
        for cut in [30, bytes.len() / 2, bytes.len() - 20] {
            assert!(
                matches!(parse_bcs(&bytes[..cut]), Err(CodecError::OffsetOutOfBounds { .. })),
                "cut at {cut}"
            );
        }
    }
}
