//! Text-to-speech over an HTTP TTS server.
//!
//! Speaks with the server's reference voices and re-encodes the WAV it
//! returns to OGG Opus, the only format Telegram plays as a voice note.

use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::broadcast::error::GenerationError;
use crate::broadcast::traits::VoiceGenerator;

pub const SAMPLE_RATE: u32 = 48000;
/// Synthesis of a long post can take a while on CPU.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Response from /v1/references/list.
#[derive(Debug, Deserialize)]
struct ListReferencesResponse {
    success: bool,
    reference_ids: Vec<String>,
}

pub struct TtsClient {
    endpoint: String,
    client: reqwest::Client,
}

impl TtsClient {
    /// `endpoint` is the server's base URL, e.g. "http://localhost:8880".
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

#[async_trait]
impl VoiceGenerator for TtsClient {
    async fn list_voices(&self) -> Vec<String> {
        let response = match self
            .client
            .get(format!("{}/v1/references/list", self.endpoint))
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to fetch voice list: {}", e);
                return vec![];
            }
        };

        if !response.status().is_success() {
            warn!("Voice list request failed: {}", response.status());
            return vec![];
        }
        match response.json::<ListReferencesResponse>().await {
            Ok(resp) if resp.success => resp.reference_ids,
            Ok(_) => {
                warn!("Voice list API returned success=false");
                vec![]
            }
            Err(e) => {
                warn!("Failed to parse voice list response: {}", e);
                vec![]
            }
        }
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, GenerationError> {
        let preview: String = text.chars().take(50).collect();
        info!("TTS ({}): \"{}\"", voice_id, preview);

        let response = self
            .client
            .post(format!("{}/v1/tts", self.endpoint))
            .json(&serde_json::json!({
                "text": text,
                "format": "wav",
                "sample_rate": SAMPLE_RATE,
                "reference_id": voice_id
            }))
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(format!("{status}: {body}")));
        }

        let wav_data = response
            .bytes()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;
        if wav_data.is_empty() {
            return Err(GenerationError::Empty);
        }
        debug!("Got {} bytes of WAV audio", wav_data.len());

        let wav_data = wav_data.to_vec();
        let ogg_data = tokio::task::spawn_blocking(move || convert_wav_to_ogg(&wav_data))
            .await
            .map_err(|e| GenerationError::Audio(e.to_string()))??;

        info!("Generated {} bytes of voice audio", ogg_data.len());
        Ok(ogg_data)
    }
}

/// Convert WAV to OGG Opus with ffmpeg.
fn convert_wav_to_ogg(wav_data: &[u8]) -> Result<Vec<u8>, GenerationError> {
    let temp_dir = std::env::temp_dir();
    let stamp = format!("{}_{}", std::process::id(), rand::random::<u32>());
    let input_path = temp_dir.join(format!("tts_input_{stamp}.wav"));
    let output_path = temp_dir.join(format!("tts_output_{stamp}.ogg"));

    std::fs::write(&input_path, wav_data)
        .map_err(|e| GenerationError::Audio(format!("failed to write temp WAV: {e}")))?;

    // 300ms of leading silence: Telegram clips the start of voice notes.
    let output = Command::new("ffmpeg")
        .args(["-y", "-f", "lavfi", "-i", "anullsrc=r=48000:cl=mono", "-i"])
        .arg(&input_path)
        .args([
            "-filter_complex",
            "[0]atrim=0:0.3[silence];[silence][1:a]concat=n=2:v=0:a=1",
            "-c:a",
            "libopus",
            "-b:a",
            "64k",
        ])
        .arg(&output_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let _ = std::fs::remove_file(&input_path);
    let output = output.map_err(|e| GenerationError::Audio(format!("failed to run ffmpeg: {e}")))?;

    if !output.status.success() {
        let _ = std::fs::remove_file(&output_path);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GenerationError::Audio(format!("ffmpeg conversion failed: {stderr}")));
    }

    let ogg_data = std::fs::read(&output_path)
        .map_err(|e| GenerationError::Audio(format!("failed to read OGG output: {e}")));
    let _ = std::fs::remove_file(&output_path);
    let ogg_data = ogg_data?;

    debug!("Converted WAV ({} bytes) to OGG ({} bytes)", wav_data.len(), ogg_data.len());
    Ok(ogg_data)
}
