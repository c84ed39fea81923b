//! Spoken/visible feedback for recognition and quiz events.
//!
//! `announce` is fire-and-forget. A new message supersedes whatever is
//! still playing; nothing is queued.

use std::sync::Mutex;

use log::{info, warn};
use tokio::process::{Child, Command};

pub trait Announcer: Send + Sync {
    fn announce(&self, text: &str);
}

/// Writes announcements to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn announce(&self, text: &str) {
        info!("[announce] {text}");
    }
}

/// Prints announcements on stdout, one per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleAnnouncer;

impl Announcer for ConsoleAnnouncer {
    fn announce(&self, text: &str) {
        println!(">> {text}");
    }
}

/// Speaks through an external text-to-speech program (`say`, `espeak`, ...),
/// passing the message as the last argument. The previous utterance is
/// killed before the next one starts.
pub struct SpeechCommandAnnouncer {
    program: String,
    args: Vec<String>,
    current: Mutex<Option<Child>>,
}

impl SpeechCommandAnnouncer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current: Mutex::new(None),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Announcer for SpeechCommandAnnouncer {
    /// Must be called from within a tokio runtime.
    fn announce(&self, text: &str) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(mut previous) = current.take() {
            if let Err(err) = previous.start_kill() {
                // Already exited; nothing to interrupt.
                log::debug!("previous utterance not killed: {err}");
            }
        }

        let spawned = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(child) => *current = Some(child),
            Err(err) => warn!("failed to run speech command '{}': {err}", self.program),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_speech_program_is_not_fatal() {
        let announcer = SpeechCommandAnnouncer::new("signcoach-no-such-tts-binary", Vec::new());
        announcer.announce("hello");
        announcer.announce("again");
        assert!(announcer.current.lock().unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn new_message_replaces_running_one() {
        let announcer = SpeechCommandAnnouncer::new("sleep", Vec::new());
        announcer.announce("5");
        let first = announcer.current.lock().unwrap().as_ref().and_then(Child::id);
        announcer.announce("5");
        let second = announcer.current.lock().unwrap().as_ref().and_then(Child::id);

        assert!(first.is_some());
        assert!(second.is_some());
        assert_ne!(first, second);
    }
}
