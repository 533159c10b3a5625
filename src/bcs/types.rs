use crate::error::{Result, sanity};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Header layout, selected by the signature at byte 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BcsVersion {
    Legacy,
    Current,
}

impl BcsVersion {
    pub const LEGACY_SIGNATURE: i16 = 72;
    pub const CURRENT_SIGNATURE: i16 = 76;

    pub fn from_signature(signature: i16) -> Result<Self> {
        match signature {
            Self::LEGACY_SIGNATURE => Ok(BcsVersion::Legacy),
            0 | Self::CURRENT_SIGNATURE => Ok(BcsVersion::Current),
            other => Err(sanity(format!("unknown bcs signature {other}"))),
        }
    }

    pub fn signature(self) -> i16 {
        match self {
            BcsVersion::Legacy => Self::LEGACY_SIGNATURE,
            BcsVersion::Current => Self::CURRENT_SIGNATURE,
        }
    }

    pub fn part_size(self) -> usize {
        match self {
            BcsVersion::Legacy => 80,
            BcsVersion::Current => 88,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartType {
    FaceBase,
    FaceForehead,
    FaceEye,
    FaceNose,
    FaceEar,
    Hair,
    Bust,
    Pants,
    Rist,
    Boots,
}

impl PartType {
    /// Slot order inside a part set's table.
    pub const ALL: [PartType; 10] = [
        PartType::FaceBase,
        PartType::FaceForehead,
        PartType::FaceEye,
        PartType::FaceNose,
        PartType::FaceEar,
        PartType::Hair,
        PartType::Bust,
        PartType::Pants,
        PartType::Rist,
        PartType::Boots,
    ];

    pub fn slot(self) -> usize {
        self as usize
    }

    pub fn flag(self) -> PartTypeFlags {
        PartTypeFlags::from_bits_retain(1 << self.slot())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PartTypeFlags: u32 {
        const FACE_BASE = 0x1;
        const FACE_FOREHEAD = 0x2;
        const FACE_EYE = 0x4;
        const FACE_NOSE = 0x8;
        const FACE_EAR = 0x10;
        const HAIR = 0x20;
        const BUST = 0x40;
        const PANTS = 0x80;
        const RIST = 0x100;
        const BOOTS = 0x200;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PartFlags: u32 {
        const UNK1 = 0x1;
        const DYT_FROM_TEXTURE_EMB = 0x2;
        const DYT_RAMPS_FROM_TEXTURE_EMB = 0x4;
        const GREEN_SCOUTER_OVERLAY = 0x8;
        const RED_SCOUTER_OVERLAY = 0x10;
        const BLUE_SCOUTER_OVERLAY = 0x20;
        const PURPLE_SCOUTER_OVERLAY = 0x40;
        const UNK8 = 0x80;
        const UNK9 = 0x100;
        const ORANGE_SCOUTER_OVERLAY = 0x200;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Race {
    Human,
    Saiyan,
    Namekian,
    FriezaRace,
    Majin,
    Other,
    Unknown(u8),
}

impl Race {
    pub fn from_byte(value: u8) -> Self {
        match value {
            0 => Race::Human,
            1 => Race::Saiyan,
            2 => Race::Namekian,
            3 => Race::FriezaRace,
            4 => Race::Majin,
            5 => Race::Other,
            other => Race::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Race::Human => 0,
            Race::Saiyan => 1,
            Race::Namekian => 2,
            Race::FriezaRace => 3,
            Race::Majin => 4,
            Race::Other => 5,
            Race::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Unknown(u8),
}

impl Gender {
    pub fn from_byte(value: u8) -> Self {
        match value {
            0 => Gender::Male,
            1 => Gender::Female,
            other => Gender::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Gender::Male => 0,
            Gender::Female => 1,
            Gender::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSelector {
    pub part_color_group: u16,
    pub color_index: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsPart {
    pub model1: i16,
    pub model2: i16,
    pub texture: i16,
    pub flags: PartFlags,
    pub hide_flags: PartTypeFlags,
    pub hide_mat_flags: PartTypeFlags,
    pub chara_code: String,
    pub emd_path: String,
    pub emm_path: String,
    pub emb_path: String,
    pub ean_path: String,
    pub bone_to_attach: String,
    pub scd_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unk3 {
    pub values: [i16; 6],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub model: i16,
    pub model2: i16,
    pub texture: i16,
    pub shader: i16,
    pub flags: PartFlags,
    pub hide_flags: PartTypeFlags,
    pub hide_mat_flags: PartTypeFlags,
    pub f_36: f32,
    pub f_40: f32,
    pub i_44: i32,
    pub i_48: i32,
    pub chara_code: String,
    pub emd_path: String,
    pub emm_path: String,
    pub emb_path: String,
    pub ean_path: String,
    pub color_selectors: Vec<ColorSelector>,
    pub physics_parts: Vec<PhysicsPart>,
    /// Only stored by the current layout.
    pub unk3: Vec<Unk3>,
}

impl Part {
    pub fn new(chara_code: impl Into<String>) -> Self {
        Self {
            model: -1,
            model2: -1,
            texture: -1,
            shader: -1,
            flags: PartFlags::empty(),
            hide_flags: PartTypeFlags::empty(),
            hide_mat_flags: PartTypeFlags::empty(),
            f_36: 0.0,
            f_40: 0.0,
            i_44: 0,
            i_48: 0,
            chara_code: chara_code.into(),
            emd_path: String::new(),
            emm_path: String::new(),
            emb_path: String::new(),
            ean_path: String::new(),
            color_selectors: Vec::new(),
            physics_parts: Vec::new(),
            unk3: Vec::new(),
        }
    }
}

/// One equipment loadout. Slots follow [`PartType::ALL`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSet {
    pub id: usize,
    pub parts: [Option<Part>; 10],
}

impl PartSet {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            parts: Default::default(),
        }
    }

    pub fn part(&self, part_type: PartType) -> Option<&Part> {
        self.parts[part_type.slot()].as_ref()
    }

    pub fn set(&mut self, part_type: PartType, part: Part) {
        self.parts[part_type.slot()] = Some(part);
    }
}

/// Four RGBA colours making up one selectable palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Colors {
    pub id: usize,
    pub colors: [[f32; 4]; 4],
}

impl Colors {
    pub fn is_null(&self) -> bool {
        self.colors.iter().flatten().all(|&c| c == 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartColor {
    pub id: usize,
    pub name: String,
    pub colors: Vec<Colors>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneScale {
    pub bone_name: String,
    pub scale: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub id: usize,
    pub scales: Vec<BoneScale>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcsBone {
    pub name: String,
    pub i_00: i32,
    pub i_04: i32,
    pub i_08: i32,
    pub values: [f32; 9],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcsSkeleton {
    pub i_00: i16,
    pub bones: Vec<BcsBone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcsFile {
    pub version: BcsVersion,
    pub race: Race,
    pub gender: Gender,
    pub f_48: [f32; 7],
    pub part_sets: Vec<PartSet>,
    pub part_colors: Vec<PartColor>,
    pub bodies: Vec<Body>,
    pub skeleton1: Option<BcsSkeleton>,
    pub skeleton2: Option<BcsSkeleton>,
}

impl BcsFile {
    pub fn new(version: BcsVersion) -> Self {
        Self {
            version,
            race: Race::Human,
            gender: Gender::Male,
            f_48: [0.0; 7],
            part_sets: Vec::new(),
            part_colors: Vec::new(),
            bodies: Vec::new(),
            skeleton1: None,
            skeleton2: None,
        }
    }

    pub fn part_set(&self, id: usize) -> Option<&PartSet> {
        self.part_sets.iter().find(|s| s.id == id)
    }

    pub fn part_color(&self, name: &str) -> Option<&PartColor> {
        self.part_colors.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_select_layouts() {
        assert_eq!(BcsVersion::from_signature(72).unwrap(), BcsVersion::Legacy);
        assert_eq!(BcsVersion::from_signature(0).unwrap(), BcsVersion::Current);
        assert_eq!(BcsVersion::from_signature(76).unwrap(), BcsVersion::Current);
        assert!(BcsVersion::from_signature(80).is_err());
    }

    #[test]
    fn part_type_flags_follow_slot_order() {
        assert_eq!(PartType::FaceBase.flag(), PartTypeFlags::FACE_BASE);
        assert_eq!(PartType::Boots.flag(), PartTypeFlags::BOOTS);
        assert_eq!(PartType::ALL[5], PartType::Hair);
        assert_eq!(
            PartType::ALL.iter().fold(PartTypeFlags::empty(), |acc, p| acc | p.flag()),
            PartTypeFlags::all()
        );
    }

    #[test]
    fn unknown_race_is_preserved() {
        assert_eq!(Race::from_byte(9), Race::Unknown(9));
        assert_eq!(Race::from_byte(9).to_byte(), 9);
        assert_eq!(Gender::from_byte(1), Gender::Female);
    }
}
