use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use buddy_voice::persona::PREBUILT_VOICES;
use buddy_voice::voice::{
    AudioFrame, CpalInput, CpalOutput, HttpSynthesizer, INPUT_FORMAT, InputDevice,
    OUTPUT_FORMAT, PlaybackScheduler, calculate_rms,
};
use buddy_voice::{
    Config, LiveTransport, SessionController, SessionState, SpeakOutcome, SpeechPlayer,
};

/// Buddy - Talk with a companion character
#[derive(Parser)]
#[command(name = "buddy", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hold a live voice conversation
    Chat {
        /// Voice to speak with (e.g. "Puck")
        #[arg(long, env = "BUDDY_VOICE")]
        voice: Option<String>,
    },
    /// Speak a piece of text once
    Say {
        /// Text to speak
        text: String,
        /// Voice to speak with
        #[arg(long)]
        voice: Option<String>,
    },
    /// List the prebuilt voices
    Voices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,buddy_voice=info",
        1 => "info,buddy_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Chat { voice } => chat(Config::load(), voice.as_deref()).await,
        Command::Say { text, voice } => say(Config::load(), &text, voice.as_deref()).await,
        Command::Voices => {
            list_voices();
            Ok(())
        }
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
    }
}

/// Live conversation until Ctrl-C or the remote side hangs up
#[allow(clippy::future_not_send)]
async fn chat(config: Config, voice: Option<&str>) -> anyhow::Result<()> {
    if config.api_key.is_none() {
        anyhow::bail!("no API key configured (set BUDDY_API_KEY or GEMINI_API_KEY)");
    }

    let profile = config.profile_with_voice(voice);
    let options = config.live.session_options();
    let transport = LiveTransport::new(config.live.url, config.api_key);
    let mut controller = SessionController::new(
        transport,
        CpalInput::new(),
        CpalOutput::new(OUTPUT_FORMAT.sample_rate),
        options,
    );

    let mut states = controller.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            println!("[{state}]");
        }
    });

    println!("Talking to {profile}. Press Ctrl-C to stop.");
    controller
        .connect(profile, || tracing::info!("conversation ended by remote side"))
        .await
        .context("failed to start conversation")?;

    loop {
        tokio::select! {
            live = controller.next_event() => {
                if !live {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let ended = controller.state();
    controller.disconnect();

    if ended == SessionState::Errored {
        anyhow::bail!("conversation ended with an error");
    }
    Ok(())
}

/// One-shot speech, waits until the utterance has played
#[allow(clippy::future_not_send)]
async fn say(config: Config, text: &str, voice: Option<&str>) -> anyhow::Result<()> {
    let profile = config.profile_with_voice(voice);
    let synthesizer =
        HttpSynthesizer::new(config.api_key, config.speech.api_url, config.speech.model)?;
    let player = SpeechPlayer::new(synthesizer, CpalOutput::new(OUTPUT_FORMAT.sample_rate));

    match player.speak(text, &profile).await {
        SpeakOutcome::Played => {}
        SpeakOutcome::Silent => anyhow::bail!("no audio was produced"),
        SpeakOutcome::Superseded => return Ok(()),
    }

    let wait = async {
        while player.is_playing() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };
    tokio::select! {
        () = wait => {}
        _ = tokio::signal::ctrl_c() => player.stop(),
    }

    player.shutdown();
    Ok(())
}

fn list_voices() {
    println!("Prebuilt voices:");
    for voice in PREBUILT_VOICES {
        println!("  {voice}");
    }
    println!("\nOther voice identifiers are passed to the service unchanged.");
}

/// Test microphone input with an RMS meter
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut input = CpalInput::new();
    input.open(INPUT_FORMAT, tx)?;

    println!("Sample rate: {} Hz", INPUT_FORMAT.sample_rate);
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut samples = Vec::new();
        while let Ok(block) = rx.try_recv() {
            samples.extend(block);
        }
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    input.close();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check your input device and its levels.");

    Ok(())
}

/// Test speaker output with a sine wave split across two buffers
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear an unbroken 440Hz tone for 2 seconds\n");

    let sample_rate = OUTPUT_FORMAT.sample_rate;
    let frequency = 440.0_f32;
    let half = sample_rate as usize;

    #[allow(clippy::cast_precision_loss)]
    let tone: Vec<f32> = (0..half * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    let mut scheduler = PlaybackScheduler::new(CpalOutput::new(sample_rate));
    for part in tone.chunks(half) {
        let frame = AudioFrame::mono(sample_rate, part.to_vec());
        if let Some(entry) = scheduler.enqueue(&frame)? {
            println!(
                "scheduled {} at {:?} for {:?}",
                entry.handle, entry.start_at, entry.duration
            );
        }
    }

    while scheduler.is_playing() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    scheduler.shutdown();

    println!("Done!");
    Ok(())
}
