//! Session settings and the per-title override table.

use crate::cpu::BackendKind;
use crate::error::OverridesError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Audio DSP emulation strategy, chosen once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DspKind {
    /// High-level emulation of the DSP firmware.
    Hle,
    /// Low-level emulation, optionally on its own host thread.
    Lle { multithread: bool },
}

/// User-facing configuration read at session construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Emulate the New 3DS (4 cores instead of 2).
    pub is_new_3ds: bool,
    pub use_cpu_jit: bool,
    pub enable_dsp_lle: bool,
    pub enable_dsp_lle_multithread: bool,
    pub custom_textures: bool,
    pub preload_textures: bool,
    pub display_transfer_hack: bool,
    pub skip_slow_draw: bool,
    pub texture_load_hack: bool,
    pub use_frame_limit: bool,
    /// Speed limit in percent of native speed.
    pub frame_limit: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            is_new_3ds: false,
            use_cpu_jit: true,
            enable_dsp_lle: false,
            enable_dsp_lle_multithread: false,
            custom_textures: false,
            preload_textures: false,
            display_transfer_hack: false,
            skip_slow_draw: false,
            texture_load_hack: true,
            use_frame_limit: true,
            frame_limit: 100,
        }
    }
}

impl Settings {
    /// Number of application cores for the configured hardware model.
    pub fn num_cores(&self) -> usize {
        if self.is_new_3ds { 4 } else { 2 }
    }

    pub fn backend_kind(&self) -> BackendKind {
        BackendKind::select(self.use_cpu_jit)
    }

    pub fn dsp_kind(&self) -> DspKind {
        if self.enable_dsp_lle {
            DspKind::Lle {
                multithread: self.enable_dsp_lle_multithread,
            }
        } else {
            DspKind::Hle
        }
    }

    /// Overlay every flag the override record sets.
    pub fn apply(&mut self, overrides: &OverrideSettings) {
        let fields = [
            (&mut self.display_transfer_hack, overrides.display_transfer_hack),
            (&mut self.skip_slow_draw, overrides.skip_slow_draw),
            (&mut self.texture_load_hack, overrides.texture_load_hack),
            (&mut self.custom_textures, overrides.custom_textures),
            (&mut self.preload_textures, overrides.preload_textures),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }
    }
}

/// Optional settings a title entry forces on or off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_transfer_hack: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_slow_draw: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub texture_load_hack: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_textures: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preload_textures: Option<bool>,
}

/// One row of the override table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleOverride {
    /// Program id as 16 hex digits, optionally prefixed with `0x`.
    pub program_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub settings: OverrideSettings,
}

impl TitleOverride {
    /// Parsed program id, or `None` if the entry's id is not valid hex.
    pub fn id(&self) -> Option<u64> {
        parse_program_id(&self.program_id)
    }
}

/// Program id to override-settings table, consulted once per `Load`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleOverrides {
    #[serde(default)]
    pub titles: Vec<TitleOverride>,
}

/// Titles that need the display-transfer workaround.
const DISPLAY_TRANSFER_TITLES: [&str; 3] = ["0004000000068B00", "0004000000061300", "000400000004A700"];

impl TitleOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table shipped with the emulator.
    pub fn builtin() -> Self {
        let titles = DISPLAY_TRANSFER_TITLES
            .iter()
            .map(|id| TitleOverride {
                program_id: (*id).to_string(),
                name: Some("Tales of the Abyss / Pac-Man Party 3D".to_string()),
                settings: OverrideSettings {
                    display_transfer_hack: Some(true),
                    skip_slow_draw: Some(true),
                    texture_load_hack: Some(false),
                    ..OverrideSettings::default()
                },
            })
            .collect();
        Self { titles }
    }

    pub fn from_json(text: &str) -> Result<Self, OverridesError> {
        let table: TitleOverrides = serde_json::from_str(text)?;
        for entry in &table.titles {
            if entry.id().is_none() {
                log::warn!("Ignoring override entry with invalid program id {:?}", entry.program_id);
            }
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, OverridesError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Override record for `program_id`. Later entries win over earlier ones.
    pub fn lookup(&self, program_id: u64) -> Option<&TitleOverride> {
        self.titles.iter().rev().find(|entry| entry.id() == Some(program_id))
    }

    /// Append `other`'s entries so they take precedence over ours.
    pub fn merge(&mut self, other: TitleOverrides) {
        self.titles.extend(other.titles);
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// Parse a 64-bit program id written as 16 hex digits.
pub fn parse_program_id(text: &str) -> Option<u64> {
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
    if digits.len() != 16 {
        return None;
    }
    let mut bytes = [0u8; 8];
    hex::decode_to_slice(digits, &mut bytes).ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Format a program id the way the override table writes it.
pub fn format_program_id(program_id: u64) -> String {
    hex::encode_upper(program_id.to_be_bytes())
}
