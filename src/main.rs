use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use jarvis_lib::assistant::{build_router, Assistant, DirectCommands, Services};
use jarvis_lib::audio::playback::{CpalPlayer, SoundPlayer};
use jarvis_lib::bridge::endpoint::{update_endpoint, Credentials};
use jarvis_lib::bridge::server::{self, SkillService};
use jarvis_lib::bridge::tunnel::Tunnel;
use jarvis_lib::config::AppConfig;
use jarvis_lib::llm::LlmClient;
use jarvis_lib::paths::AppPaths;
use jarvis_lib::preflight::{run_preflight, CheckStatus};
use jarvis_lib::reminders::poller::{DesktopAlert, ReminderPoller};
use jarvis_lib::reminders::ReminderStore;
use jarvis_lib::router::{CommandRouter, Reply};
use jarvis_lib::speech::ducking::VolumeDucker;
use jarvis_lib::speech::{
    CommandSpeaker, ConsoleListener, ListenerKind, MicListener, PactlDucker, Speaker,
    WakeWordGate, WhisperHttpTranscriber,
};
use jarvis_lib::system::SessionInhibitor;

#[derive(Parser, Debug)]
#[command(name = "jarvis", version, about = "Voice-driven desktop assistant")]
struct Cli {
    /// Path to config.toml (defaults to the OS config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Listen for commands and answer out loud (default)
    Run {
        /// Read commands from stdin instead of the microphone
        #[arg(long)]
        text: bool,
    },
    /// Handle a single command and print the reply
    Command {
        #[arg(required = true, trailing_var_arg = true)]
        words: Vec<String>,
    },
    /// Serve the voice-platform skill webhook
    Serve {
        /// Serve locally without a public tunnel
        #[arg(long)]
        no_tunnel: bool,
        /// Do not push the tunnel URL into the skill console
        #[arg(long)]
        no_endpoint_update: bool,
    },
    /// Point the skill at a public webhook URL
    UpdateEndpoint { url: String },
    /// Check devices and external tools
    Doctor,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    log::info!("Jarvis starting...");

    if let Err(e) = run(cli).await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::new()?;
    paths.ensure_directories()?;

    let config_path = cli.config.unwrap_or_else(|| paths.config_file());
    let config = AppConfig::load_or_create(&config_path)?;
    log::info!("Configuration loaded");

    match cli.command.unwrap_or(Cmd::Run { text: false }) {
        Cmd::Run { text } => {
            let runtime = tokio::runtime::Handle::current();
            tokio::task::spawn_blocking(move || run_assistant(paths, config, text, runtime))
                .await
                .context("Assistant thread panicked")?
        }
        Cmd::Command { words } => run_once(paths, config, words.join(" ")).await,
        Cmd::Serve {
            no_tunnel,
            no_endpoint_update,
        } => serve(paths, config, !no_tunnel, !no_endpoint_update).await,
        Cmd::UpdateEndpoint { url } => {
            let endpoint = &config.bridge.endpoint;
            let credentials = Credentials::from_env(endpoint)?;
            update_endpoint(endpoint, &credentials, &url).await
        }
        Cmd::Doctor => doctor(&config),
    }
}

fn local_router(
    paths: &AppPaths,
    config: &AppConfig,
) -> Result<(Services, Arc<ReminderStore>, CommandRouter)> {
    let services = Services::from_config(config);
    let reminders = Arc::new(ReminderStore::open(paths.reminders_file())?);
    let router = build_router(config, paths, &services, Arc::clone(&reminders))?;
    Ok((services, reminders, router))
}

/// Voice (or typed) session. Runs on a blocking thread: capture, playback
/// and every handler block.
fn run_assistant(
    paths: AppPaths,
    config: AppConfig,
    text: bool,
    runtime: tokio::runtime::Handle,
) -> Result<()> {
    let (services, reminders, router) = local_router(&paths, &config)?;
    let llm = Arc::new(LlmClient::from_env(config.llm.clone())?);

    let speaker: Arc<dyn Speaker> = Arc::new(CommandSpeaker::new(
        config.assistant.name.clone(),
        config.speech.tts_command.clone(),
        config.speech.rate,
    ));
    let sound: Arc<dyn SoundPlayer> =
        Arc::new(CpalPlayer::new(config.audio.output_device_name.clone()));

    let alarm_sound = config
        .reminders
        .alarm_sound
        .clone()
        .or_else(|| Some(paths.alarm_sound()).filter(|p| p.exists()));
    let alert = Arc::new(DesktopAlert::new(
        Arc::clone(&services.overlay),
        Arc::clone(&sound),
        Arc::clone(&speaker),
        alarm_sound,
        Duration::from_secs(config.reminders.notification_secs),
    ));
    let poller = ReminderPoller::start(
        reminders,
        alert,
        Duration::from_secs(config.reminders.poll_interval_secs),
    )?;
    let _inhibitor = SessionInhibitor::start(&config.system);

    let assistant = Assistant::new(Arc::new(router), llm, runtime);
    let greeting = config.assistant.greeting();

    let result = if text || config.speech.listener == ListenerKind::Console {
        log::info!("✓ Text mode: one command per line, Ctrl-D to quit");
        let mut source = DirectCommands::new(ConsoleListener::stdin());
        assistant.run(&mut source, speaker.as_ref(), &greeting)
    } else {
        let transcriber = WhisperHttpTranscriber::new(&config.speech)?;
        let listener = MicListener::new(
            config.audio.clone(),
            config.vad.clone(),
            &config.speech,
            Box::new(transcriber),
            paths.recordings_dir(),
        )?;
        let ducker: Arc<dyn VolumeDucker> =
            Arc::new(PactlDucker::new(config.speech.ducking.clone()));
        let mut gate = WakeWordGate::new(
            Box::new(listener),
            config.assistant.wake_words.clone(),
            sound,
            ducker,
            config.speech.clone(),
        );
        assistant.run(&mut gate, speaker.as_ref(), &greeting)
    };

    poller.stop();
    result
}

async fn run_once(paths: AppPaths, config: AppConfig, command: String) -> Result<()> {
    let runtime = tokio::runtime::Handle::current();
    let reply = tokio::task::spawn_blocking(move || -> Result<Reply> {
        let (_services, _reminders, router) = local_router(&paths, &config)?;
        let llm = Arc::new(LlmClient::from_env(config.llm.clone())?);
        Ok(Assistant::new(Arc::new(router), llm, runtime).handle(&command))
    })
    .await
    .context("Command thread panicked")??;

    for line in reply.lines {
        println!("{}", line);
    }
    Ok(())
}

async fn serve(
    paths: AppPaths,
    config: AppConfig,
    tunnel: bool,
    push_endpoint: bool,
) -> Result<()> {
    let (_services, _reminders, router) = local_router(&paths, &config)?;
    let llm = Arc::new(LlmClient::from_env(config.llm.clone())?);
    let service = Arc::new(SkillService::new(Arc::new(router), llm));

    let bridge = &config.bridge;
    let addr = SocketAddr::from((bridge.host, bridge.port));

    // Dropping the tunnel kills it, so it lives until the server stops
    let _tunnel = if tunnel && bridge.tunnel.enable {
        match Tunnel::start(&bridge.tunnel, bridge.port, &bridge.route).await {
            Ok(tunnel) => {
                if push_endpoint && bridge.endpoint.enable {
                    let endpoint = bridge.endpoint.clone();
                    let url = tunnel.public_url.clone();
                    tokio::spawn(async move {
                        let result = match Credentials::from_env(&endpoint) {
                            Ok(credentials) => {
                                update_endpoint(&endpoint, &credentials, &url).await
                            }
                            Err(e) => Err(e),
                        };
                        if let Err(e) = result {
                            log::error!("Skill endpoint not updated: {:#}", e);
                        }
                    });
                }
                Some(tunnel)
            }
            Err(e) => {
                log::error!("Tunnel failed, serving locally only: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    server::serve(addr, bridge.route.clone(), service).await
}

fn doctor(config: &AppConfig) -> Result<()> {
    let report = run_preflight(config);

    for item in &report.items {
        let mark = match item.status {
            CheckStatus::Pass => "✓",
            CheckStatus::Warn => "!",
            CheckStatus::Fail => "✗",
        };
        println!("{} {:<14} {}", mark, item.name, item.message);
        if let Some(hint) = &item.fix_hint {
            for line in hint.lines() {
                println!("    {}", line);
            }
        }
    }
    println!("Overall: {:?}", report.overall);

    if !report.can_proceed {
        bail!("Preflight failed");
    }
    Ok(())
}
