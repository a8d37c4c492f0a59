//! Bag-of-words matching of spoken commands against scene choices

use std::collections::HashSet;

use crate::story::Choice;

/// Why a voice command did not resolve to a choice
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoiceCommandError {
    /// The scene offers nothing to choose from
    #[error("No available choices provided")]
    NoCandidates,
    /// The transcript shares no words with any choice
    #[error("Could not match voice command to any available choice")]
    NoMatch,
    /// Speech was present but could not be understood
    #[error("Speech recognition could not understand audio")]
    Unintelligible,
    /// The transcription service failed
    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),
}

impl VoiceCommandError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoCandidates => "no_candidates",
            Self::NoMatch => "no_match",
            Self::Unintelligible => "unintelligible",
            Self::TranscriptionFailed(_) => "transcription_failed",
        }
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Pick the candidate sharing the most distinct words with `transcript`
///
/// Ties go to the earliest candidate. Returns `None` when nothing overlaps.
#[must_use]
pub fn match_choice<'a>(transcript: &str, candidates: &'a [Choice]) -> Option<&'a Choice> {
    let spoken = words(transcript);
    let mut best: Option<(&Choice, usize)> = None;

    for candidate in candidates {
        let overlap = words(&candidate.text).intersection(&spoken).count();
        if overlap > best.map_or(0, |(_, n)| n) {
            best = Some((candidate, overlap));
        }
    }

    best.map(|(choice, _)| choice)
}

/// Resolve a transcription attempt against the candidates
///
/// # Errors
///
/// Returns the reason the command could not be resolved
pub fn resolve_voice_command(
    transcript: Result<&str, &str>,
    candidates: &[Choice],
) -> Result<Choice, VoiceCommandError> {
    if candidates.is_empty() {
        return Err(VoiceCommandError::NoCandidates);
    }

    let transcript =
        transcript.map_err(|e| VoiceCommandError::TranscriptionFailed(e.to_string()))?;
    if transcript.trim().is_empty() {
        return Err(VoiceCommandError::Unintelligible);
    }

    match_choice(transcript, candidates)
        .cloned()
        .ok_or(VoiceCommandError::NoMatch)
}
