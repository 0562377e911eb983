//! Start/stop signal sources
//!
//! A desktop session usually has a global hotkey collaborator that pushes
//! signals into a channel. Without one, the terminal stands in: Enter toggles
//! listening and `q` quits. The choice is made once, at startup, by
//! [`select_trigger_source`].

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

/// A request from the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSignal {
    Toggle,
    Start,
    Stop,
    Quit,
}

/// Produces [`TriggerSignal`]s until exhausted
#[async_trait]
pub trait TriggerSource: Send {
    /// Next signal, or `None` once the source is closed
    async fn next(&mut self) -> Option<TriggerSignal>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Signals pushed by an OS-level hotkey listener
pub struct GlobalHotkeySource {
    rx: mpsc::Receiver<TriggerSignal>,
}

impl GlobalHotkeySource {
    #[must_use]
    pub const fn new(rx: mpsc::Receiver<TriggerSignal>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl TriggerSource for GlobalHotkeySource {
    async fn next(&mut self) -> Option<TriggerSignal> {
        self.rx.recv().await
    }

    fn name(&self) -> &'static str {
        "global-hotkey"
    }
}

/// Line-based key input from a terminal
pub struct TerminalKeySource<R = BufReader<Stdin>> {
    lines: Lines<R>,
}

impl TerminalKeySource {
    /// Read from the process's stdin
    #[must_use]
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> TerminalKeySource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

/// Map one input line to a signal; unknown input yields `None`
#[must_use]
pub fn parse_key_line(line: &str) -> Option<TriggerSignal> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "t" | "toggle" => Some(TriggerSignal::Toggle),
        "s" | "start" => Some(TriggerSignal::Start),
        "x" | "stop" => Some(TriggerSignal::Stop),
        "q" | "quit" | "exit" => Some(TriggerSignal::Quit),
        _ => None,
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TriggerSource for TerminalKeySource<R> {
    async fn next(&mut self) -> Option<TriggerSignal> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(signal) = parse_key_line(&line) {
                        return Some(signal);
                    }
                    tracing::debug!(input = %line.trim(), "unrecognized key input");
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "terminal input failed");
                    return None;
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "terminal"
    }
}

/// Pick the trigger source for this host
///
/// A connected hotkey channel wins; otherwise the terminal is used when stdin
/// is interactive. Returns `None` when neither is available.
#[must_use]
pub fn select_trigger_source(
    hotkeys: Option<mpsc::Receiver<TriggerSignal>>,
    stdin_is_terminal: bool,
) -> Option<Box<dyn TriggerSource>> {
    if let Some(rx) = hotkeys {
        tracing::info!("using global hotkey trigger");
        return Some(Box::new(GlobalHotkeySource::new(rx)));
    }
    if stdin_is_terminal {
        tracing::info!("global hotkeys unavailable, using terminal keys (Enter toggles, q quits)");
        return Some(Box::new(TerminalKeySource::stdin()));
    }
    tracing::warn!("no trigger source available");
    None
}
