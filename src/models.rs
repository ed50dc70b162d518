//! Segmentation models understood by the rembg command-line tool
//!
//! The model list is positional: configuration files refer to the default
//! model by its index, while the command line and the dialog use names.

use crate::error::{RemovalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A rembg segmentation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Model {
    /// General purpose model
    #[default]
    U2Net,
    /// Human segmentation
    U2NetHumanSeg,
    /// Clothes parsing from human portraits
    U2NetClothSeg,
    /// Lightweight `u2net`
    U2NetP,
    /// Same as `u2net` with reduced size
    Silueta,
    /// `IS-Net` general use
    IsNetGeneralUse,
    /// `IS-Net` trained on anime characters
    IsNetAnime,
    /// Segment Anything
    Sam,
}

impl Model {
    /// All models in configuration index order
    pub const ALL: [Model; 8] = [
        Model::U2Net,
        Model::U2NetHumanSeg,
        Model::U2NetClothSeg,
        Model::U2NetP,
        Model::Silueta,
        Model::IsNetGeneralUse,
        Model::IsNetAnime,
        Model::Sam,
    ];

    /// Name passed to `rembg -m`
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Model::U2Net => "u2net",
            Model::U2NetHumanSeg => "u2net_human_seg",
            Model::U2NetClothSeg => "u2net_cloth_seg",
            Model::U2NetP => "u2netp",
            Model::Silueta => "silueta",
            Model::IsNetGeneralUse => "isnet-general-use",
            Model::IsNetAnime => "isnet-anime",
            Model::Sam => "sam",
        }
    }

    /// Look a model up by its configuration index
    #[must_use]
    pub fn from_index(index: usize) -> Option<Model> {
        Self::ALL.get(index).copied()
    }

    /// Position of this model in [`Model::ALL`]
    #[must_use]
    pub fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|m| *m == self)
            .unwrap_or_default()
    }

    /// Comma separated list of every known model name
    #[must_use]
    pub fn known_names() -> String {
        Self::ALL
            .iter()
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Model {
    type Err = RemovalError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                RemovalError::invalid_parameter(format!(
                    "Unknown model '{}'. Known models: {}",
                    wanted,
                    Self::known_names()
                ))
            })
    }
}

impl From<Model> for String {
    fn from(model: Model) -> Self {
        model.name().to_string()
    }
}

impl TryFrom<String> for Model {
    type Error = RemovalError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}
