//! Source records used across import tests

use serde_json::{json, Value};

/// Fully populated record with two aural evidence recordings
pub fn student_s001() -> Value {
    json!({
        "studentId": "S001",
        "profile": {
            "email": "a@x.com",
            "name": {"first": "A", "last": "B"},
            "age": 14,
            "stage": "Grade 5",
            "programme": "Junior Academy",
            "instrument": "Piano",
            "teacher": "Ms. Byrne",
            "enrollmentDate": "2022-09-01",
            "piecesInProgress": ["Clair de Lune", "Für Elise"]
        },
        "technicalSkillsCompetence": {"overallScore": 7.5, "scaleAccuracy": 8.25},
        "compositionalMusicianshipKnowledge": {
            "overallScore": 6.8,
            "auralEvidenceRecordings": [
                "s3://accordo-recordings/S001/clip1.mp3",
                "s3://accordo-recordings/S001/clip2.mp3"
            ]
        },
        "repertoireCulturalKnowledge": {"overallScore": 8.1},
        "performingArtistry": {"overallScore": 0.1}
    })
}

/// Minimal valid record with no recordings
pub fn student(id: &str) -> Value {
    json!({
        "studentId": id,
        "profile": {"email": format!("{}@x.com", id.to_lowercase()), "name": id},
        "compositionalMusicianshipKnowledge": {"auralEvidenceRecordings": []}
    })
}

/// Record with `n` recordings
pub fn student_with_recordings(id: &str, n: usize) -> Value {
    let uris: Vec<String> = (1..=n)
        .map(|i| format!("s3://accordo-recordings/{id}/take{i}.wav"))
        .collect();
    json!({
        "studentId": id,
        "profile": {"email": "x@x.com", "name": id, "stage": "Grade 3"},
        "compositionalMusicianshipKnowledge": {"auralEvidenceRecordings": uris}
    })
}
