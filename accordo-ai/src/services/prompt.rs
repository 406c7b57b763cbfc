//! Assessment prompt templates
//!
//! Both variants list the four quadrants with their focus, name the score
//! scale and ask for a JSON object keyed by quadrant so the reply can be
//! parsed into an `AssessmentReport`.

use accordo_common::{Quadrant, ScoreScale};

fn quadrant_block(scale: ScoreScale) -> String {
    let mut out = String::new();
    for (i, quadrant) in Quadrant::ALL.iter().enumerate() {
        out.push_str(&format!("{}. {}: {}\n", i + 1, quadrant.title(), quadrant.focus()));
    }
    out.push_str(&format!(
        "\nProvide scores ({}) and feedback for each quadrant.\n",
        scale.label()
    ));
    out.push_str("Respond with a single JSON object of this shape:\n{\n");
    let keys: Vec<String> = Quadrant::ALL
        .iter()
        .map(|q| format!("  \"{}\": {{\"score\": <integer>, \"feedback\": \"<text>\"}}", q.key()))
        .collect();
    out.push_str(&keys.join(",\n"));
    out.push_str("\n}\n");
    out
}

/// Prompt sent alongside a performance video or audio file
pub fn media_prompt(instrument: &str, scale: ScoreScale) -> String {
    format!(
        "Analyze this {instrument} performance for a music student across 4 quadrants:\n\n{}",
        quadrant_block(scale)
    )
}

/// Prompt embedding a performance transcript
pub fn transcript_prompt(instrument: &str, transcript: &str, scale: ScoreScale) -> String {
    format!(
        "Analyze this {instrument} performance transcript for a music student across 4 quadrants:\n\n\
         Transcript: {transcript}\n\n{}",
        quadrant_block(scale)
    )
}
