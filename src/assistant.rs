//! The assistant proper: handler wiring and the listen-route-speak loop

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::llm::LlmClient;
use crate::media::vlc::MediaPlayer;
use crate::media::{MediaTask, VlcPlayer};
use crate::paths::AppPaths;
use crate::pictures::{CommandViewer, PictureTask, SlideViewer};
use crate::reminders::{ReminderStore, ReminderTask};
use crate::router::{CommandHandler, CommandRouter, Reply};
use crate::speech::{Heard, Listener, Speaker, WakeWordGate};
use crate::system::{HostProcesses, ProcessControl, SystemTask};
use crate::todo::{TodoStore, TodoTask};
use crate::ui::{CommandOverlay, Overlay};
use crate::youtube::{Browser, CommandBrowser, YoutubeTask};

/// Spoken when nothing local matched and no model is configured
pub const NOT_UNDERSTOOD: &str = "Sorry, I didn't understand that command.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub name: String,
    pub wake_words: Vec<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "Jarvis".into(),
            wake_words: vec!["ok jarvis".into(), "ok bro".into()],
        }
    }
}

impl AssistantConfig {
    pub fn greeting(&self) -> String {
        let quoted: Vec<String> = self
            .wake_words
            .iter()
            .map(|w| format!("'{}'", w))
            .collect();
        format!(
            "{} ready. Say {} followed by your command.",
            self.name,
            quoted.join(" or ")
        )
    }
}

/// Side-effecting collaborators the handlers drive
#[derive(Clone)]
pub struct Services {
    pub overlay: Arc<dyn Overlay>,
    pub media_player: Arc<dyn MediaPlayer>,
    pub browser: Arc<dyn Browser>,
    pub processes: Arc<dyn ProcessControl>,
    pub viewer: Arc<dyn SlideViewer>,
}

impl Services {
    /// Real desktop implementations from config
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            overlay: Arc::new(CommandOverlay::new(config.ui.clone())),
            media_player: Arc::new(VlcPlayer::new(
                config.media.player.clone(),
                config.media.control_host.clone(),
                config.media.control_port,
            )),
            browser: Arc::new(CommandBrowser::new(config.browser.clone())),
            processes: Arc::new(HostProcesses),
            viewer: Arc::new(CommandViewer::new(config.pictures.viewer_command.clone())),
        }
    }
}

/// Build the router with every handler in matching order:
/// youtube, media, system, to-do, reminder, pictures.
pub fn build_router(
    config: &AppConfig,
    paths: &AppPaths,
    services: &Services,
    reminders: Arc<ReminderStore>,
) -> Result<CommandRouter> {
    let todos = Arc::new(TodoStore::open(paths.todo_file())?);
    let pictures_folder = config
        .pictures
        .folder
        .clone()
        .unwrap_or_else(|| paths.pictures_dir());

    let handlers: Vec<Arc<dyn CommandHandler>> = vec![
        Arc::new(YoutubeTask::new(Arc::clone(&services.browser))),
        Arc::new(MediaTask::new(
            config.media.clone(),
            paths.media_root(),
            paths.media_state_file(),
            Arc::clone(&services.media_player),
        )?),
        Arc::new(SystemTask::new(
            config.system.player_process.clone(),
            Arc::clone(&services.processes),
        )),
        Arc::new(TodoTask::new(todos, Arc::clone(&services.overlay))),
        Arc::new(ReminderTask::new(
            reminders,
            Arc::clone(&services.overlay),
            config.reminders.clone(),
        )),
        Arc::new(PictureTask::new(
            pictures_folder,
            config.pictures.clone(),
            Arc::clone(&services.viewer),
        )),
    ];

    let router = CommandRouter::new(handlers);
    log::info!("✓ Handlers ready: {}", router.handler_names().join(", "));
    Ok(router)
}

/// Where commands come from
pub trait CommandSource {
    fn next_command(&mut self) -> Result<Heard>;
}

impl CommandSource for WakeWordGate {
    fn next_command(&mut self) -> Result<Heard> {
        WakeWordGate::next_command(self)
    }
}

/// Every phrase is a command (typed input)
pub struct DirectCommands<L> {
    listener: L,
}

impl<L: Listener> DirectCommands<L> {
    pub fn new(listener: L) -> Self {
        Self { listener }
    }
}

impl<L: Listener> CommandSource for DirectCommands<L> {
    fn next_command(&mut self) -> Result<Heard> {
        self.listener.listen(None, Duration::from_secs(60))
    }
}

/// Routes commands locally, falling back to the language model
pub struct Assistant {
    router: Arc<CommandRouter>,
    llm: Arc<LlmClient>,
    runtime: tokio::runtime::Handle,
}

impl Assistant {
    /// `runtime` drives model requests; `handle` must not be called from
    /// inside that runtime's async context.
    pub fn new(router: Arc<CommandRouter>, llm: Arc<LlmClient>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            router,
            llm,
            runtime,
        }
    }

    pub fn handle(&self, command: &str) -> Reply {
        let command = CommandRouter::normalize(command);
        if command.is_empty() {
            return Reply::default();
        }

        if let Some(routed) = self.router.dispatch(&command) {
            return routed.reply;
        }

        if !self.llm.is_configured() {
            log::warn!("No local handler and no language model for '{}'", command);
            return Reply::say(NOT_UNDERSTOOD);
        }

        log::info!("Asking the language model...");
        Reply::say(self.runtime.block_on(self.llm.answer(&command)))
    }

    /// Greet, then listen, route and speak until the source closes
    pub fn run(&self, source: &mut dyn CommandSource, speaker: &dyn Speaker, greeting: &str) -> Result<()> {
        say(speaker, greeting);

        loop {
            match source.next_command() {
                Ok(Heard::Phrase(command)) => {
                    for line in self.handle(&command).lines {
                        say(speaker, &line);
                    }
                }
                Ok(Heard::Nothing) => continue,
                Ok(Heard::Closed) => {
                    log::info!("Input closed, shutting down");
                    return Ok(());
                }
                Err(e) => {
                    log::error!("Listening failed: {:#}", e);
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
    }
}

fn say(speaker: &dyn Speaker, line: &str) {
    if line.is_empty() {
        return;
    }
    if let Err(e) = speaker.speak(line) {
        log::warn!("Could not speak '{}': {:#}", line, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmConfig;
    use crate::media::testing::RecordingPlayer;
    use crate::speech::ducking::testing::RecordingDucker;
    use crate::speech::testing::{CountingSound, RecordingSpeaker, ScriptedListener};
    use crate::speech::SpeechConfig;
    use crate::ui::testing::RecordingOverlay;
    use std::sync::Mutex;

    #[derive(Default)]
    struct NullBrowser(Mutex<Vec<String>>);

    impl Browser for NullBrowser {
        fn open(&self, url: &url::Url) -> Result<()> {
            self.0.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct NullProcesses(Mutex<Vec<String>>);

    impl ProcessControl for NullProcesses {
        fn kill_by_name(&self, name: &str) -> Result<()> {
            self.0.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    struct NullViewer;

    impl SlideViewer for NullViewer {
        fn show(&self, _image: &std::path::Path) -> Result<()> {
            Ok(())
        }

        fn close(&self) {}
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        runtime: tokio::runtime::Runtime,
        router: Arc<CommandRouter>,
        processes: Arc<NullProcesses>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted_at(dir.path());
        paths.ensure_directories().unwrap();

        let mut config = AppConfig::default();
        config.pictures.folder = Some(dir.path().join("pictures"));

        let processes = Arc::new(NullProcesses::default());
        let services = Services {
            overlay: Arc::new(RecordingOverlay::default()),
            media_player: Arc::new(RecordingPlayer::default()),
            browser: Arc::new(NullBrowser::default()),
            processes: processes.clone(),
            viewer: Arc::new(NullViewer),
        };
        let reminders = Arc::new(ReminderStore::open(paths.reminders_file()).unwrap());
        let router = build_router(&config, &paths, &services, reminders).unwrap();

        Fixture {
            _dir: dir,
            runtime: tokio::runtime::Runtime::new().unwrap(),
            router: Arc::new(router),
            processes,
        }
    }

    fn assistant(fixture: &Fixture) -> Assistant {
        let llm = Arc::new(LlmClient::new(LlmConfig::default(), None).unwrap());
        Assistant::new(fixture.router.clone(), llm, fixture.runtime.handle().clone())
    }

    #[test]
    fn test_handler_order() {
        let fixture = fixture();
        assert_eq!(
            fixture.router.handler_names(),
            vec!["youtube", "media", "system", "to-do", "reminder", "picture"]
        );
    }

    #[test]
    fn test_greeting() {
        assert_eq!(
            AssistantConfig::default().greeting(),
            "Jarvis ready. Say 'ok jarvis' or 'ok bro' followed by your command."
        );
    }

    #[test]
    fn test_local_and_fallback_replies() {
        let fixture = fixture();
        let assistant = assistant(&fixture);

        let reply = assistant.handle("Add Task buy milk");
        assert_eq!(reply.lines, vec!["task-1 added: buy milk".to_string()]);

        assert_eq!(assistant.handle("what is the meaning of life").lines, vec![NOT_UNDERSTOOD.to_string()]);
        assert_eq!(NOT_UNDERSTOOD, "Sorry, I didn't understand that command.");
        assert!(assistant.handle("   ").lines.is_empty());
    }

    #[test]
    fn test_run_loop_speaks_replies_until_closed() {
        let fixture = fixture();
        let assistant = assistant(&fixture);

        let listener = ScriptedListener::new(vec![
            Heard::Phrase("hello there".into()),
            Heard::Phrase("ok jarvis close player".into()),
            Heard::Nothing,
            Heard::Phrase("ok bro".into()),
            Heard::Phrase("add task call mom".into()),
            Heard::Closed,
        ]);
        let sound = Arc::new(CountingSound::default());
        let ducker = Arc::new(RecordingDucker::default());
        let mut gate = WakeWordGate::new(
            Box::new(listener),
            AssistantConfig::default().wake_words,
            sound.clone(),
            ducker.clone(),
            SpeechConfig::default(),
        );
        let speaker = RecordingSpeaker::default();

        assistant.run(&mut gate, &speaker, "ready").unwrap();

        assert_eq!(fixture.processes.0.lock().unwrap().as_slice(), ["vlc".to_string()]);
        let spoken = speaker.lines();
        assert_eq!(spoken.first().map(String::as_str), Some("ready"));
        assert_eq!(spoken.last().map(String::as_str), Some("task-1 added: call mom"));
        assert_eq!(ducker.events(), vec!["lower", "restore"]);
    }

    #[test]
    fn test_direct_commands_skip_wake_word() {
        let fixture = fixture();
        let assistant = assistant(&fixture);
        let mut source = DirectCommands::new(ScriptedListener::new(vec![
            Heard::Phrase("add task water plants".into()),
            Heard::Closed,
        ]));
        let speaker = RecordingSpeaker::default();

        assistant.run(&mut source, &speaker, "").unwrap();
        assert_eq!(speaker.lines(), vec!["task-1 added: water plants".to_string()]);
    }
}
