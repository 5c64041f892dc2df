use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::info;

use voxhost::cli::Cli;
use voxhost::{
    CommandRecorder, CommandSynthesizer, FallbackDispatcher, InteractionLoop, ProcessSession,
    PtyAutomator, SessionEnd, SpeechQueue, WhisperCli,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();

    let session = Arc::new(cli.session_config());
    let voice = cli.voice_config();

    let init = async {
        info!("Loading Whisper model '{}'...", voice.whisper_model);
        let transcriber = WhisperCli::load(&voice.whisper_program, voice.whisper_model_path())?;
        let speech = SpeechQueue::start(CommandSynthesizer::espeak(&voice.tts_program)?)?;
        let recorder = CommandRecorder::arecord(&voice.recorder_program)?;
        let dispatcher = FallbackDispatcher::new(
            ProcessSession::new(Arc::clone(&session)),
            PtyAutomator::new(Arc::clone(&session))?,
        );
        Ok::<_, voxhost::Error>((recorder, transcriber, dispatcher, speech))
    };

    let (recorder, transcriber, dispatcher, speech) = match init.await {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("Failed to initialize: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Agent: {} -m {} --config {} (timeout {}s)",
        session.program,
        session.model,
        session.config_path.display(),
        session.response_timeout.as_secs()
    );

    let end = InteractionLoop::new(recorder, transcriber, dispatcher, speech, voice)
        .run()
        .await;
    info!("Session ended: {:?}", end);
    match end {
        SessionEnd::CaptureUnavailable => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}
