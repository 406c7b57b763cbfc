//! Four-quadrant assessment report
//!
//! Generated report text is free-form. [`AssessmentReport::parse`] accepts
//! either the JSON object the prompts ask for (optionally inside a markdown
//! fence) or a heading-per-quadrant text layout. A report that lacks any
//! quadrant, or scores off the scale, is rejected.

use crate::error::{PipelineError, PipelineResult};
use crate::models::value::AttributeValue;
use accordo_common::{Quadrant, ScoreScale};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Score and feedback for one quadrant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadrantAssessment {
    pub score: u32,
    pub feedback: String,
}

/// Complete evaluation: all four quadrants present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentReport {
    pub technical_skills_competence: QuadrantAssessment,
    pub compositional_musicianship_knowledge: QuadrantAssessment,
    pub repertoire_cultural_knowledge: QuadrantAssessment,
    pub performing_artistry: QuadrantAssessment,
    pub scale: ScoreScale,
}

impl AssessmentReport {
    pub fn get(&self, quadrant: Quadrant) -> &QuadrantAssessment {
        match quadrant {
            Quadrant::TechnicalSkillsCompetence => &self.technical_skills_competence,
            Quadrant::CompositionalMusicianshipKnowledge => {
                &self.compositional_musicianship_knowledge
            }
            Quadrant::RepertoireCulturalKnowledge => &self.repertoire_cultural_knowledge,
            Quadrant::PerformingArtistry => &self.performing_artistry,
        }
    }

    /// Build from per-quadrant parts, failing if any is missing or off-scale
    pub fn from_parts(
        mut parts: BTreeMap<Quadrant, QuadrantAssessment>,
        scale: ScoreScale,
    ) -> PipelineResult<Self> {
        let missing: Vec<&str> = Quadrant::ALL
            .iter()
            .filter(|q| !parts.contains_key(*q))
            .map(|q| q.key())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::IncompleteReport(format!(
                "missing quadrant(s): {}",
                missing.join(", ")
            )));
        }

        for (quadrant, part) in &parts {
            if !scale.contains(part.score) {
                return Err(PipelineError::IncompleteReport(format!(
                    "{} score {} outside {}",
                    quadrant.key(),
                    part.score,
                    scale.label()
                )));
            }
        }

        let mut take = |q: Quadrant| {
            parts
                .remove(&q)
                .ok_or_else(|| PipelineError::IncompleteReport(format!("missing {}", q.key())))
        };

        Ok(Self {
            technical_skills_competence: take(Quadrant::TechnicalSkillsCompetence)?,
            compositional_musicianship_knowledge: take(Quadrant::CompositionalMusicianshipKnowledge)?,
            repertoire_cultural_knowledge: take(Quadrant::RepertoireCulturalKnowledge)?,
            performing_artistry: take(Quadrant::PerformingArtistry)?,
            scale,
        })
    }

    /// Parse generated report text
    pub fn parse(text: &str, scale: ScoreScale) -> PipelineResult<Self> {
        if let Some(json) = extract_json_object(text) {
            return Self::from_json(&json, scale);
        }
        Self::from_parts(parse_sections(text), scale)
    }

    fn from_json(json: &JsonValue, scale: ScoreScale) -> PipelineResult<Self> {
        let mut parts = BTreeMap::new();
        for quadrant in Quadrant::ALL {
            let Some(entry) = json.get(quadrant.key()) else {
                continue;
            };
            let score = entry
                .get("score")
                .and_then(JsonValue::as_f64)
                .filter(|s| s.is_finite() && *s >= 0.0)
                .ok_or_else(|| {
                    PipelineError::IncompleteReport(format!(
                        "{} has no numeric score",
                        quadrant.key()
                    ))
                })?;
            let feedback = entry
                .get("feedback")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            parts.insert(
                quadrant,
                QuadrantAssessment {
                    score: score.round() as u32,
                    feedback,
                },
            );
        }
        Self::from_parts(parts, scale)
    }

    /// Store attribute: `{quadrantKey: {score, feedback}}` plus the scale
    pub fn to_attribute_value(&self) -> AttributeValue {
        let mut map = BTreeMap::new();
        for quadrant in Quadrant::ALL {
            let part = self.get(quadrant);
            let mut entry = BTreeMap::new();
            entry.insert("score".to_string(), AttributeValue::Integer(i64::from(part.score)));
            entry.insert("feedback".to_string(), AttributeValue::text(part.feedback.clone()));
            map.insert(quadrant.key().to_string(), AttributeValue::Map(entry));
        }
        map.insert("scale".to_string(), AttributeValue::text(self.scale.label()));
        AttributeValue::Map(map)
    }
}

/// First `{ ... }` span in the text that parses as a JSON object
fn extract_json_object(text: &str) -> Option<JsonValue> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<JsonValue>(&text[start..=end])
        .ok()
        .filter(JsonValue::is_object)
}

/// Quadrant named by a heading line
///
/// A heading starts with the quadrant title or key, after optional list
/// numbering or markdown markers, and the title is followed by nothing but
/// punctuation or a score. Prose that merely mentions a quadrant is body
/// text.
fn heading_quadrant(line: &str) -> Option<Quadrant> {
    let stripped = line
        .trim_start()
        .trim_start_matches(|c: char| c == '#' || c == '*' || c == '_' || c.is_whitespace());
    let stripped = strip_list_number(stripped).trim_start_matches(['*', '_', ' ']);

    let key_token: String = stripped
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if let Some(quadrant) = Quadrant::from_key(&key_token) {
        return heading_tail_ok(&stripped[key_token.len()..]).then_some(quadrant);
    }

    let lowered = stripped.to_lowercase().replace(" and ", " & ");
    Quadrant::ALL.into_iter().find(|q| {
        let title = q.title().to_lowercase();
        lowered.starts_with(&title) && heading_tail_ok(&lowered[title.len()..])
    })
}

/// `1.`, `2)` and similar list prefixes
fn strip_list_number(s: &str) -> &str {
    let digits = s.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return s;
    }
    match s[digits..].chars().next() {
        Some('.') | Some(')') | Some(':') => s[digits + 1..].trim_start(),
        _ => s,
    }
}

fn heading_tail_ok(tail: &str) -> bool {
    let tail = tail.trim_start_matches(['*', '_']).trim();
    tail.is_empty()
        || tail.starts_with([':', '(', '-', '\u{2013}', '#', '['])
        || tail.to_lowercase().contains("score")
}

/// Split text into quadrant sections keyed by their heading
fn parse_sections(text: &str) -> BTreeMap<Quadrant, QuadrantAssessment> {
    let mut sections: Vec<(Quadrant, Vec<&str>)> = Vec::new();

    for line in text.lines() {
        match heading_quadrant(line) {
            Some(quadrant) if !sections.iter().any(|(q, _)| *q == quadrant) => {
                sections.push((quadrant, vec![line]));
            }
            _ => {
                if let Some((_, body)) = sections.last_mut() {
                    body.push(line);
                }
            }
        }
    }

    sections
        .into_iter()
        .filter_map(|(quadrant, lines)| {
            let score = lines.iter().find_map(|l| find_score(l))?;
            let feedback = lines
                .iter()
                .skip(1)
                .map(|l| l.trim())
                .filter(|l| !l.is_empty() && find_score(l).is_none())
                .map(|l| l.trim_start_matches(['-', '*', ' ']).trim_start_matches("Feedback:").trim())
                .collect::<Vec<_>>()
                .join(" ");
            Some((quadrant, QuadrantAssessment { score, feedback }))
        })
        .collect()
}

/// Score on a line: `Score: 85`, `Score (1-100): 85`, `85/100`, `(85 / 100)`
///
/// Scale labels such as `(1-100)` are ignored. A line that still offers more
/// than one candidate yields no score.
fn find_score(line: &str) -> Option<u32> {
    let lowered = strip_scale_labels(&line.to_lowercase());
    if let Some(pos) = lowered.find("score") {
        let numbers = scan_numbers(&lowered[pos + "score".len()..]);
        let candidates: Vec<u32> = numbers
            .iter()
            .filter(|n| !n.after_slash)
            .map(|n| n.value)
            .collect();
        if let [score] = candidates.as_slice() {
            return Some(*score);
        }
        if !candidates.is_empty() {
            return None;
        }
    }
    let numerators: Vec<u32> = scan_numbers(&lowered)
        .iter()
        .filter(|n| n.before_slash)
        .map(|n| n.value)
        .collect();
    match numerators.as_slice() {
        [score] => Some(*score),
        _ => None,
    }
}

/// Integer found on a line, with its neighbouring `/` if any
struct LineNumber {
    value: u32,
    before_slash: bool,
    after_slash: bool,
}

/// Integers in `s`; a fractional part is truncated
fn scan_numbers(s: &str) -> Vec<LineNumber> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::new();
    let mut last_symbol: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !c.is_ascii_digit() {
            if !c.is_whitespace() {
                last_symbol = Some(c);
            }
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let digits: String = chars[start..i].iter().collect();
        if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
            i += 1;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
        let before_slash = chars[i..]
            .iter()
            .find(|c| !c.is_whitespace())
            .is_some_and(|c| *c == '/');

        if let Ok(value) = digits.parse() {
            out.push(LineNumber {
                value,
                before_slash,
                after_slash: last_symbol == Some('/'),
            });
        }
        last_symbol = Some('0');
    }
    out
}

/// Drop parenthesised scale labels: `(1-100)`, `(1 - 10)`, `(out of 100)`
fn strip_scale_labels(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find('(') {
        let Some(close) = rest[open..].find(')').map(|c| open + c) else {
            break;
        };
        out.push_str(&rest[..open]);
        if !is_scale_label(&rest[open + 1..close]) {
            out.push_str(&rest[open..=close]);
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

fn is_scale_label(inner: &str) -> bool {
    let inner = inner.trim();
    if inner.starts_with("out of") {
        return true;
    }
    let mut bounds = inner.split(['-', '\u{2013}']);
    match (bounds.next(), bounds.next(), bounds.next()) {
        (Some(lo), Some(hi), None) => {
            let numeric = |b: &str| {
                let b = b.trim();
                !b.is_empty() && b.chars().all(|c| c.is_ascii_digit())
            };
            numeric(lo) && numeric(hi)
        }
        _ => false,
    }
}
