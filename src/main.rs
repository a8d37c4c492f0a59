use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use audio_quest::voice::AMBIENCE_LIBRARY;
use audio_quest::{ArtifactState, Config, Daemon, StoryStore};

/// Audio Quest - branching audio adventures with spoken narration
#[derive(Parser)]
#[command(name = "audio-quest", version, about)]
struct Cli {
    /// Port to listen on; overrides AUDIO_QUEST_PORT and the config file
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Load the configured story and report broken choice links
    CheckStory,
    /// Synthesize one clip into the audio directory
    TestTts {
        /// Text to speak
        #[arg(default_value = "Welcome to the interactive audio quest.")]
        text: String,
    },
    /// Download the ambience library into the audio directory
    FetchAmbience,
}

/// How long `test-tts` waits for local synthesis to finish
const LOCAL_SYNTHESIS_WAIT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,audio_quest=info",
        1 => "info,audio_quest=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::CheckStory => check_story(&config),
            Command::TestTts { text } => test_tts(config, &text).await,
            Command::FetchAmbience => fetch_ambience(config).await,
        };
    }

    tracing::info!(port = config.server.port, "starting audio quest");

    let daemon = Daemon::new(config)?;
    daemon.run().await?;

    Ok(())
}

/// Load the story and list choices leading nowhere
fn check_story(config: &Config) -> anyhow::Result<()> {
    let story = match &config.story_path {
        Some(path) => StoryStore::load(path)?,
        None => StoryStore::sample()?,
    };

    println!(
        "{}: {} scenes, starting at \"{}\"",
        story.title().unwrap_or("untitled story"),
        story.len(),
        story.initial_scene().id
    );

    let dangling = story.dangling_references();
    if dangling.is_empty() {
        println!("All choices lead to known scenes.");
        return Ok(());
    }

    for link in &dangling {
        println!(
            "  {} -> {} -> {} (missing)",
            link.scene_id, link.choice_id, link.target
        );
    }
    println!("{} choice(s) lead to generated scenes.", dangling.len());

    Ok(())
}

/// Synthesize `text` with the configured engines
async fn test_tts(config: Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let prefer_online = config.voice.prefer_online;
    let daemon = Daemon::new(config)?;
    let audio = daemon.quest().audio();

    let key = format!("test_tts_{}", uuid::Uuid::new_v4().simple());
    let artifact = audio.ensure_audio(text, &key, prefer_online).await;

    match artifact.state {
        ArtifactState::Unavailable => anyhow::bail!("no speech engine is available"),
        ArtifactState::Pending => {
            println!("Waiting for local synthesis...");
            let deadline = tokio::time::Instant::now() + LOCAL_SYNTHESIS_WAIT;
            while audio.is_pending(&artifact.file_name()) {
                if tokio::time::Instant::now() >= deadline {
                    anyhow::bail!("local synthesis did not finish in time");
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
        ArtifactState::Ready => {}
    }

    if !artifact.file_path.exists() {
        anyhow::bail!("synthesis failed, see the log for details");
    }

    let size = std::fs::metadata(&artifact.file_path)?.len();
    println!("Wrote {size} bytes to {}", artifact.file_path.display());

    Ok(())
}

/// Prefetch every ambience track
async fn fetch_ambience(config: Config) -> anyhow::Result<()> {
    let daemon = Daemon::new(config)?;
    let audio = daemon.quest().audio();

    println!(
        "Fetching {} tracks into {}...",
        AMBIENCE_LIBRARY.len(),
        audio.audio_dir().display()
    );
    let fetched = audio.prefetch_ambience().await;
    println!("{fetched}/{} tracks available", AMBIENCE_LIBRARY.len());

    if fetched < AMBIENCE_LIBRARY.len() {
        anyhow::bail!("some ambience tracks could not be downloaded");
    }

    Ok(())
}
