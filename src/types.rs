use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Shown when the server rejects a request without saying why.
pub const GENERATION_FAILED_FALLBACK: &str = "Failed to generate music";

/// Extensions the preview player knows how to handle. Anything else falls
/// back to the MIDI panel.
pub const AUDIO_EXTENSIONS: &[&str] = &[".wav"];

/// Body of `POST /generate`. `temperature` is passed through unvalidated;
/// a non-finite value serializes as JSON `null`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub num_notes: u32,
    pub temperature: f64,
    pub tempo: u32,
    pub seed: Option<String>,
}

/// Parameter subset the server echoes back alongside a successful render.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EchoedParameters {
    pub temperature: f64,
    pub tempo: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub midi_url: String,
    pub audio_url: Option<String>,
    pub total_notes: u32,
    pub parameters: EchoedParameters,
    pub notes_preview: Vec<String>,
}

impl GenerationResult {
    /// True when the server rendered a preview the audio player can drive.
    pub fn has_playable_audio(&self) -> bool {
        self.audio_url
            .as_deref()
            .is_some_and(|url| AUDIO_EXTENSIONS.iter().any(|ext| url.ends_with(ext)))
    }

    /// Preview line rendered under the composition details.
    pub fn preview_line(&self) -> String {
        let mut line = self.notes_preview.join(" → ");
        line.push_str(" → ...");
        line
    }
}

/// `/generate` response payload as it appears on the wire. Every field other
/// than `success` is optional; [`GenerationOutcome::from_wire`] sorts out
/// which side of the exchange actually arrived.
#[derive(Debug, Clone, Deserialize)]
pub struct WireResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub midi_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub total_notes: Option<u32>,
    #[serde(default)]
    pub parameters: Option<EchoedParameters>,
    #[serde(default)]
    pub notes_preview: Vec<String>,
}

/// Outcome of one generation exchange. Exactly one arm is populated,
/// governed by the wire payload's `success` flag.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Success(GenerationResult),
    Failure { message: String },
}

impl GenerationOutcome {
    pub fn from_wire(payload: WireResponse) -> Result<Self> {
        if !payload.success {
            let message = payload
                .error
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| GENERATION_FAILED_FALLBACK.to_string());
            return Ok(Self::Failure { message });
        }

        let midi_url = payload.midi_url.context("successful response missing midi_url")?;
        let parameters = payload.parameters.context("successful response missing parameters")?;
        Ok(Self::Success(GenerationResult {
            midi_url,
            audio_url: payload.audio_url,
            total_notes: payload.total_notes.unwrap_or(0),
            parameters,
            notes_preview: payload.notes_preview,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(value: serde_json::Value) -> WireResponse {
        serde_json::from_value(value).expect("wire payload should deserialize")
    }

    #[test]
    fn request_serializes_absent_seed_as_null() {
        let request = GenerationRequest {
            num_notes: 80,
            temperature: 1.0,
            tempo: 120,
            seed: None,
        };
        let body = serde_json::to_string(&request).unwrap();
        assert!(body.contains("\"seed\":null"));
        assert!(body.contains("\"num_notes\":80"));
        assert!(body.contains("\"tempo\":120"));
    }

    #[test]
    fn request_serializes_non_finite_temperature_as_null() {
        let request = GenerationRequest {
            num_notes: 80,
            temperature: f64::NAN,
            tempo: 120,
            seed: Some("42".into()),
        };
        let body = serde_json::to_string(&request).unwrap();
        assert!(body.contains("\"temperature\":null"));
        assert!(body.contains("\"seed\":\"42\""));
    }

    #[test]
    fn successful_payload_becomes_success_outcome() {
        let payload = wire(json!({
            "success": true,
            "midi_url": "/static/generated_music_ab12cd34.mid",
            "audio_url": "/static/generated_music_ab12cd34.wav",
            "total_notes": 80,
            "parameters": { "temperature": 1.2, "tempo": 120 },
            "notes_preview": ["C4", "E4", "G4"]
        }));

        let outcome = GenerationOutcome::from_wire(payload).unwrap();
        let GenerationOutcome::Success(result) = outcome else {
            panic!("expected success outcome");
        };
        assert_eq!(result.midi_url, "/static/generated_music_ab12cd34.mid");
        assert_eq!(result.total_notes, 80);
        assert_eq!(result.parameters.tempo, 120);
        assert!(result.has_playable_audio());
    }

    #[test]
    fn failure_payload_carries_server_message() {
        let payload = wire(json!({ "success": false, "error": "model not loaded" }));
        let outcome = GenerationOutcome::from_wire(payload).unwrap();
        assert_eq!(outcome, GenerationOutcome::Failure { message: "model not loaded".into() });
    }

    #[test]
    fn failure_payload_without_message_uses_fallback() {
        let payload = wire(json!({ "success": false }));
        let outcome = GenerationOutcome::from_wire(payload).unwrap();
        assert_eq!(
            outcome,
            GenerationOutcome::Failure { message: GENERATION_FAILED_FALLBACK.into() }
        );
    }

    #[test]
    fn successful_payload_missing_midi_url_is_rejected() {
        let payload = wire(json!({
            "success": true,
            "parameters": { "temperature": 1.0, "tempo": 120 }
        }));
        assert!(GenerationOutcome::from_wire(payload).is_err());
    }

    #[test]
    fn audio_without_recognized_extension_is_not_playable() {
        let payload = wire(json!({
            "success": true,
            "midi_url": "/static/a.mid",
            "audio_url": "/static/a.ogg",
            "parameters": { "temperature": 1.0, "tempo": 120 }
        }));
        let GenerationOutcome::Success(result) = GenerationOutcome::from_wire(payload).unwrap()
        else {
            panic!("expected success outcome");
        };
        assert!(!result.has_playable_audio());
        assert!(result.audio_url.is_some());
    }

    #[test]
    fn preview_line_joins_notes_with_arrows() {
        let result = GenerationResult {
            midi_url: "/static/a.mid".into(),
            audio_url: None,
            total_notes: 3,
            parameters: EchoedParameters { temperature: 1.0, tempo: 120 },
            notes_preview: vec!["C4".into(), "E4".into(), "G4".into()],
        };
        assert_eq!(result.preview_line(), "C4 → E4 → G4 → ...");
    }
}
