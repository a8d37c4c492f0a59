//! Local (offline) speech synthesis through an eSpeak-compatible engine

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::{Error, Result};

/// Engine binaries probed when none is configured
const ENGINE_CANDIDATES: [&str; 2] = ["espeak-ng", "espeak"];

/// Offline synthesis backend writing audio straight to a file
///
/// Implementations are not assumed to be reentrant; callers serialize access.
#[async_trait]
pub trait LocalSynthesizer: Send + Sync {
    /// Render `text` into `output`
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails
    async fn synthesize_to_file(&self, text: &str, output: &Path) -> Result<()>;

    /// Engine name for logging
    fn name(&self) -> &'static str;
}

/// Runs `espeak-ng` (or `espeak`) as a subprocess
#[derive(Debug, Clone)]
pub struct EspeakSynthesizer {
    program: PathBuf,
    /// Words per minute
    rate: u32,
    /// Amplitude, 0-200
    amplitude: u32,
    voice: Option<String>,
}

impl EspeakSynthesizer {
    #[must_use]
    pub const fn new(program: PathBuf) -> Self {
        Self {
            program,
            rate: 150,
            amplitude: 180,
            voice: None,
        }
    }

    /// Locate an engine on `PATH`
    #[must_use]
    pub fn detect() -> Option<Self> {
        ENGINE_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::new)
    }

    /// Use a specific eSpeak voice (e.g. "en-us+f3")
    #[must_use]
    pub fn with_voice(mut self, voice: Option<String>) -> Self {
        self.voice = voice;
        self
    }

    fn args(&self, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-s".to_string(),
            self.rate.to_string(),
            "-a".to_string(),
            self.amplitude.to_string(),
            "-w".to_string(),
            output.display().to_string(),
        ];
        if let Some(voice) = &self.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        args.push("--stdin".to_string());
        args
    }
}

#[async_trait]
impl LocalSynthesizer for EspeakSynthesizer {
    async fn synthesize_to_file(&self, text: &str, output: &Path) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(self.args(output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Tts(format!("failed to spawn {}: {e}", self.program.display())))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
        }

        let output_status = child.wait_with_output().await?;
        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            let code = output_status.status.code().unwrap_or(-1);
            return Err(Error::Tts(format!("engine exited with code {code}: {stderr}")));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "espeak"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_read_text_from_stdin() {
        let engine = EspeakSynthesizer::new(PathBuf::from("espeak-ng"));
        let args = engine.args(Path::new("/tmp/out.mp3"));
        assert_eq!(args, ["-s", "150", "-a", "180", "-w", "/tmp/out.mp3", "--stdin"]);
    }

    #[test]
    fn voice_is_passed_through() {
        let engine =
            EspeakSynthesizer::new(PathBuf::from("espeak-ng")).with_voice(Some("en+f3".into()));
        let args = engine.args(Path::new("out.mp3"));
        assert!(args.windows(2).any(|w| w == ["-v", "en+f3"]));
    }

    #[tokio::test]
    async fn missing_engine_is_an_error() {
        let engine = EspeakSynthesizer::new(PathBuf::from("/nonexistent/espeak-ng"));
        let dir = tempfile::tempdir().unwrap();
        let result = engine
            .synthesize_to_file("hello", &dir.path().join("out.mp3"))
            .await;
        assert!(matches!(result, Err(Error::Tts(_))));
    }
}
