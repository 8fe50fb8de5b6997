// Classification domain models.
//
// The external classifier scores an image on five independent categories,
// each on a totally ordered six-point likelihood scale. The verdict rule
// lives here so it can be tested without touching the network.

use serde::{Deserialize, Serialize};

/// Likelihood scale as reported by the classifier, lowest to highest.
/// `Unknown` is the bottom rank and never blocks an image on its own.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Likelihood {
    #[default]
    Unknown,
    VeryUnlikely,
    Unlikely,
    Possible,
    Likely,
    VeryLikely,
}

impl Likelihood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Likelihood::Unknown => "UNKNOWN",
            Likelihood::VeryUnlikely => "VERY_UNLIKELY",
            Likelihood::Unlikely => "UNLIKELY",
            Likelihood::Possible => "POSSIBLE",
            Likelihood::Likely => "LIKELY",
            Likelihood::VeryLikely => "VERY_LIKELY",
        }
    }
}

/// Per-category likelihoods for one image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeSearchScores {
    pub adult: Likelihood,
    pub spoof: Likelihood,
    pub medical: Likelihood,
    pub violence: Likelihood,
    pub racy: Likelihood,
}

impl SafeSearchScores {
    /// Categories at or above the blocking rank, in a fixed order.
    pub fn flagged(&self) -> Vec<(&'static str, Likelihood)> {
        [
            ("adult", self.adult),
            ("spoof", self.spoof),
            ("medical", self.medical),
            ("violence", self.violence),
            ("racy", self.racy),
        ]
        .into_iter()
        .filter(|(_, likelihood)| *likelihood >= Likelihood::Likely)
        .collect()
    }
}

/// Normalized moderation verdict for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub approved: bool,
    pub details: String,
}

impl Verdict {
    /// Derive the verdict from raw scores: rejected iff any category is at
    /// or above `Likely`.
    pub fn from_scores(scores: &SafeSearchScores) -> Self {
        let flagged = scores.flagged();
        if flagged.is_empty() {
            Self {
                approved: true,
                details: "Imagen verificada por SafeSearch".to_string(),
            }
        } else {
            let listed: Vec<String> = flagged
                .iter()
                .map(|(category, likelihood)| format!("{}={}", category, likelihood.as_str()))
                .collect();
            Self {
                approved: false,
                details: format!("SafeSearch: {}", listed.join(", ")),
            }
        }
    }
}
