//! The four assessment quadrants and the score scale they are marked on
//!
//! Every analysis variant (video or transcript) scores the same four
//! quadrants on [`CANONICAL_SCALE`]. Stored profile rows use the quadrant
//! keys from [`Quadrant::key`] as attribute names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four fixed evaluation dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Quadrant {
    /// Technique, timing, accuracy
    TechnicalSkillsCompetence,
    /// Musical understanding, phrasing
    CompositionalMusicianshipKnowledge,
    /// Identification of the piece, stylistic appropriateness
    RepertoireCulturalKnowledge,
    /// Expression and artistic interpretation
    PerformingArtistry,
}

impl Quadrant {
    /// All quadrants in prompt order
    pub const ALL: [Quadrant; 4] = [
        Quadrant::TechnicalSkillsCompetence,
        Quadrant::CompositionalMusicianshipKnowledge,
        Quadrant::RepertoireCulturalKnowledge,
        Quadrant::PerformingArtistry,
    ];

    /// Attribute key used in source records, stored rows and JSON reports
    pub fn key(self) -> &'static str {
        match self {
            Quadrant::TechnicalSkillsCompetence => "technicalSkillsCompetence",
            Quadrant::CompositionalMusicianshipKnowledge => "compositionalMusicianshipKnowledge",
            Quadrant::RepertoireCulturalKnowledge => "repertoireCulturalKnowledge",
            Quadrant::PerformingArtistry => "performingArtistry",
        }
    }

    /// Human-readable heading used in prompts and text reports
    pub fn title(self) -> &'static str {
        match self {
            Quadrant::TechnicalSkillsCompetence => "Technical Skills & Competence",
            Quadrant::CompositionalMusicianshipKnowledge => "Compositional & Musicianship Knowledge",
            Quadrant::RepertoireCulturalKnowledge => "Repertoire & Cultural Knowledge",
            Quadrant::PerformingArtistry => "Performing Artistry",
        }
    }

    /// What the evaluator is asked to look at
    pub fn focus(self) -> &'static str {
        match self {
            Quadrant::TechnicalSkillsCompetence => "Evaluate technique, timing, accuracy",
            Quadrant::CompositionalMusicianshipKnowledge => {
                "Assess musical understanding, phrasing"
            }
            Quadrant::RepertoireCulturalKnowledge => {
                "Identify piece and stylistic appropriateness"
            }
            Quadrant::PerformingArtistry => "Evaluate expression and artistic interpretation",
        }
    }

    /// Look up a quadrant by its attribute key
    pub fn from_key(key: &str) -> Option<Quadrant> {
        Quadrant::ALL.into_iter().find(|q| q.key() == key)
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Inclusive numeric range a quadrant score must fall in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreScale {
    pub min: u32,
    pub max: u32,
}

/// Scale used by every analysis variant
pub const CANONICAL_SCALE: ScoreScale = ScoreScale { min: 1, max: 100 };

impl ScoreScale {
    /// Check whether a score lies on this scale
    pub fn contains(&self, score: u32) -> bool {
        (self.min..=self.max).contains(&score)
    }

    /// Prompt fragment, e.g. `1-100`
    pub fn label(&self) -> String {
        format!("{}-{}", self.min, self.max)
    }
}
