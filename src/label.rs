use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Basketball,
    Hoop,
    Net,
    Backboard,
    Player,
}

impl Label {
    pub const ALL: [Label; 5] = [
        Label::Basketball,
        Label::Hoop,
        Label::Net,
        Label::Backboard,
        Label::Player,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Basketball => "basketball",
            Label::Hoop => "hoop",
            Label::Net => "net",
            Label::Backboard => "backboard",
            Label::Player => "player",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basketball" => Ok(Label::Basketball),
            "hoop" => Ok(Label::Hoop),
            "net" => Ok(Label::Net),
            "backboard" => Ok(Label::Backboard),
            "player" => Ok(Label::Player),
            other => Err(Error::config(format!("unknown label `{}`", other))),
        }
    }
}

/// Detector class id -> label, in training order.
///
/// Slots holding a name outside [`Label`] stay `None`, so detections of that
/// class are dropped by the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMap {
    classes: Vec<Option<Label>>,
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    classes: Vec<String>,
    #[serde(default)]
    names: Vec<String>,
}

impl ClassMap {
    pub fn new(classes: Vec<Option<Label>>) -> Self {
        Self { classes }
    }

    /// Parses a labels manifest, either `{"classes": [...]}` or `{"names": [...]}`.
    pub fn from_manifest_json(json: &str) -> Result<Self, Error> {
        let manifest: Manifest = serde_json::from_str(json)?;
        let names = if manifest.classes.is_empty() {
            manifest.names
        } else {
            manifest.classes
        };

        if names.is_empty() {
            return Err(Error::config("labels manifest has no classes/names"));
        }

        Ok(Self {
            classes: names.iter().map(|n| n.parse().ok()).collect(),
        })
    }

    pub fn from_manifest_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_manifest_json(&text)
    }

    #[inline]
    pub fn label(&self, class: i32) -> Option<Label> {
        if class < 0 {
            return None;
        }

        self.classes.get(class as usize).copied().flatten()
    }

    pub fn class_id(&self, label: Label) -> Option<i32> {
        self.classes
            .iter()
            .position(|c| *c == Some(label))
            .map(|idx| idx as i32)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ClassMap {
    fn default() -> Self {
        Self {
            classes: Label::ALL.iter().copied().map(Some).collect(),
        }
    }
}
