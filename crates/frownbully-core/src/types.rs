use serde::Serialize;
use std::collections::HashMap;

/// Wrinkle classes reported by the remote model that have a storage column.
///
/// This is the whitelist for dynamic columns: only these names ever reach SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    BunnyLine,
    Chin,
    CrowsFeet,
    Forehead,
    FrownLine,
    GummySmile,
    Masseter,
    SadSmile,
    SmokerLines,
}

impl Label {
    pub const ALL: [Label; 9] = [
        Label::BunnyLine,
        Label::Chin,
        Label::CrowsFeet,
        Label::Forehead,
        Label::FrownLine,
        Label::GummySmile,
        Label::Masseter,
        Label::SadSmile,
        Label::SmokerLines,
    ];

    /// Column name in the `detections` table.
    pub fn column(self) -> &'static str {
        match self {
            Label::BunnyLine => "bunny_line",
            Label::Chin => "chin",
            Label::CrowsFeet => "crows_feet",
            Label::Forehead => "forehead",
            Label::FrownLine => "frown_line",
            Label::GummySmile => "gummy_smile",
            Label::Masseter => "masseter",
            Label::SadSmile => "sad_smile",
            Label::SmokerLines => "smoker_lines",
        }
    }

    /// Human-readable name as the model reports it.
    pub fn display_name(self) -> &'static str {
        match self {
            Label::BunnyLine => "Bunny Line",
            Label::Chin => "Chin",
            Label::CrowsFeet => "Crows Feet",
            Label::Forehead => "Forehead",
            Label::FrownLine => "Frown Line",
            Label::GummySmile => "Gummy Smile",
            Label::Masseter => "Masseter",
            Label::SadSmile => "Sad Smile",
            Label::SmokerLines => "Smoker Lines",
        }
    }

    /// Resolve a label as it appears in a report ("Frown Line", "frown-line",
    /// "FROWN_LINE") to a known class.
    pub fn from_report_label(raw: &str) -> Option<Self> {
        let key = normalize(raw);
        Self::ALL.into_iter().find(|label| label.column() == key)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Lowercase, drop apostrophes, collapse any other separator run into `_`.
fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.trim().chars().filter(|&c| c != '\'') {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Per-cycle mapping from reported label to confidence in [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PredictionSet {
    scores: HashMap<String, f64>,
}

impl PredictionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a label's confidence, clamped to [0, 1].
    pub fn insert(&mut self, label: impl Into<String>, confidence: f64) {
        self.scores.insert(label.into(), confidence.clamp(0.0, 1.0));
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.scores.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().map(|(label, &conf)| (label.as_str(), conf))
    }

    /// Labels whose confidence is strictly greater than `threshold`.
    pub fn above(&self, threshold: f64) -> impl Iterator<Item = (&str, f64)> {
        self.iter().filter(move |&(_, conf)| conf > threshold)
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for PredictionSet {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (label, conf) in iter {
            set.insert(label, conf);
        }
        set
    }
}
