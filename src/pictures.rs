//! Full-screen picture slideshow
//!
//! A worker thread walks the sorted picture list, handing each image to an
//! external viewer for the slide interval. Pause, resume and stop arrive over
//! a crossbeam channel; the worker never touches the handler's state.

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::media::has_extension;
use crate::router::{CommandHandler, Reply};

/// Slideshow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PicturesConfig {
    /// Defaults to the user's Pictures directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<PathBuf>,
    pub interval_secs: u64,
    pub extensions: Vec<String>,
    /// Viewer command. Placeholder: `{image}`
    pub viewer_command: Vec<String>,
}

impl Default for PicturesConfig {
    fn default() -> Self {
        Self {
            folder: None,
            interval_secs: 5,
            extensions: ["jpg", "jpeg", "png"].iter().map(|s| s.to_string()).collect(),
            viewer_command: ["feh", "--fullscreen", "--auto-zoom", "--hide-pointer", "{image}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Shows one picture at a time
pub trait SlideViewer: Send + Sync {
    /// Replace whatever is on screen with `image`
    fn show(&self, image: &Path) -> Result<()>;

    fn close(&self);
}

/// Viewer that restarts an external image viewer per slide
pub struct CommandViewer {
    command: Vec<String>,
    current: Mutex<Option<Child>>,
}

impl CommandViewer {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            current: Mutex::new(None),
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<Child>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SlideViewer for CommandViewer {
    fn show(&self, image: &Path) -> Result<()> {
        let image = image.to_string_lossy();
        let args: Vec<String> = self
            .command
            .iter()
            .map(|arg| arg.replace("{image}", &image))
            .collect();
        let (program, rest) = args.split_first().context("Empty viewer command")?;

        let child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start viewer '{}'", program))?;

        // New window first, then drop the old one, so the screen never flashes empty
        if let Some(mut previous) = self.current().replace(child) {
            let _ = previous.kill();
            let _ = previous.wait();
        }
        Ok(())
    }

    fn close(&self) {
        if let Some(mut child) = self.current().take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Images in `folder`, sorted
pub fn find_pictures(folder: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(folder) else {
        return Vec::new();
    };
    let mut images: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_extension(p, extensions))
        .collect();
    images.sort();
    images
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Pause,
    Resume,
    Stop,
}

struct Running {
    control: Sender<Control>,
    paused: bool,
    thread: Option<JoinHandle<()>>,
}

fn run_slideshow(
    images: Vec<PathBuf>,
    viewer: Arc<dyn SlideViewer>,
    interval: Duration,
    control: Receiver<Control>,
) {
    let mut index = 0;
    'slides: loop {
        if let Err(e) = viewer.show(&images[index]) {
            log::warn!("Could not display {:?}: {:#}", images[index], e);
        }
        index = (index + 1) % images.len();

        match control.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) | Ok(Control::Resume) => continue,
            Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Control::Pause) => loop {
                match control.recv() {
                    Ok(Control::Resume) => continue 'slides,
                    Ok(Control::Pause) => {}
                    Ok(Control::Stop) | Err(_) => break 'slides,
                }
            },
        }
    }

    viewer.close();
    log::info!("Slideshow stopped");
}

/// Handles the slideshow commands
pub struct PictureTask {
    folder: PathBuf,
    config: PicturesConfig,
    viewer: Arc<dyn SlideViewer>,
    running: Mutex<Option<Running>>,
}

impl PictureTask {
    pub fn new(folder: PathBuf, config: PicturesConfig, viewer: Arc<dyn SlideViewer>) -> Self {
        Self {
            folder,
            config,
            viewer,
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start(&self) -> Result<Reply> {
        let images = find_pictures(&self.folder, &self.config.extensions);
        log::info!("Found {} image(s) in {:?}", images.len(), self.folder);
        if images.is_empty() {
            return Ok(Reply::say("No pictures found in your Pictures folder."));
        }

        // A new slideshow replaces the current one
        self.stop_running();

        let (control, receiver) = unbounded();
        let viewer = Arc::clone(&self.viewer);
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let thread = std::thread::Builder::new()
            .name("slideshow".into())
            .spawn(move || run_slideshow(images, viewer, interval, receiver))
            .context("Failed to spawn slideshow thread")?;

        *self.running() = Some(Running {
            control,
            paused: false,
            thread: Some(thread),
        });
        Ok(Reply::say("Starting slideshow now."))
    }

    fn pause(&self) -> Reply {
        let mut running = self.running();
        match running.as_mut() {
            Some(show) if !show.paused && show.control.send(Control::Pause).is_ok() => {
                show.paused = true;
                Reply::say("Slideshow paused.")
            }
            _ => Reply::say("Slideshow is not running or already paused."),
        }
    }

    fn resume(&self) -> Reply {
        let mut running = self.running();
        match running.as_mut() {
            Some(show) if show.paused && show.control.send(Control::Resume).is_ok() => {
                show.paused = false;
                Reply::say("Resuming slideshow.")
            }
            _ => Reply::say("Slideshow is not paused or not running."),
        }
    }

    fn stop(&self) -> Reply {
        if self.stop_running() {
            Reply::say("Stopping slideshow.")
        } else {
            Reply::say("No slideshow is currently running.")
        }
    }

    fn stop_running(&self) -> bool {
        let Some(mut show) = self.running().take() else {
            return false;
        };
        let _ = show.control.send(Control::Stop);
        if let Some(thread) = show.thread.take() {
            let _ = thread.join();
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }
}

impl Drop for PictureTask {
    fn drop(&mut self) {
        self.stop_running();
    }
}

impl CommandHandler for PictureTask {
    fn name(&self) -> &'static str {
        "picture"
    }

    fn handle(&self, command: &str) -> Result<Option<Reply>> {
        let reply = match command {
            "play pictures" | "show pictures" | "start slideshow" => self.start()?,
            "pause picture" => self.pause(),
            "continue picture" => self.resume(),
            "stop picture" | "close pictures" => self.stop(),
            _ => return Ok(None),
        };
        Ok(Some(reply))
    }
}
