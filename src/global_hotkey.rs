//! Global toggle hotkey.
//!
//! The engine only needs one signal from the keyboard: "activated". The
//! controller reacts by toggling between running and idle.

use anyhow::{anyhow, Result};
use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// The only event a hotkey listener produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    Activated,
}

/// Source of toggle activations.
pub trait HotkeyListener {
    /// Starts forwarding activations to `events` until the receiver is dropped.
    fn listen(&self, events: UnboundedSender<HotkeyEvent>) -> JoinHandle<()>;
}

pub struct HotkeyManager {
    manager: GlobalHotKeyManager,
    registered: Option<(String, HotKey)>,
}

impl HotkeyManager {
    pub fn new() -> Result<Self> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| anyhow!("Failed to create GlobalHotKeyManager: {}", e))?;

        Ok(Self {
            manager,
            registered: None,
        })
    }

    /// Replaces any previously registered toggle hotkey.
    pub fn register_toggle_hotkey(&mut self, hotkey_str: &str) -> Result<()> {
        let hotkey = parse_hotkey(hotkey_str)?;
        self.unregister();

        self.manager
            .register(hotkey)
            .map_err(|e| anyhow!("Failed to register hotkey '{}': {}", hotkey_str, e))?;

        info!(hotkey = hotkey_str, "toggle hotkey registered");
        self.registered = Some((hotkey_str.to_string(), hotkey));
        Ok(())
    }

    pub fn unregister(&mut self) {
        if let Some((name, hotkey)) = self.registered.take() {
            if let Err(e) = self.manager.unregister(hotkey) {
                debug!(hotkey = %name, error = %e, "failed to unregister hotkey");
            }
        }
    }

    pub fn current_hotkey(&self) -> Option<&str> {
        self.registered.as_ref().map(|(name, _)| name.as_str())
    }
}

impl HotkeyListener for HotkeyManager {
    fn listen(&self, events: UnboundedSender<HotkeyEvent>) -> JoinHandle<()> {
        let receiver = GlobalHotKeyEvent::receiver();
        let wanted = self.registered.as_ref().map(|(_, hotkey)| hotkey.id());

        tokio::task::spawn_blocking(move || {
            while !events.is_closed() {
                let Ok(event) = receiver.recv_timeout(Duration::from_millis(50)) else {
                    continue;
                };
                if event.state != HotKeyState::Pressed || Some(event.id) != wanted {
                    continue;
                }
                debug!("toggle hotkey pressed");
                if events.send(HotkeyEvent::Activated).is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for HotkeyManager {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Parses strings such as `"f6"`, `"ctrl+alt+s"` or `"shift+pageup"`.
pub fn parse_hotkey(hotkey_str: &str) -> Result<HotKey> {
    let binding = hotkey_str.to_lowercase();
    let mut modifiers = Modifiers::empty();
    let mut code = None;

    for part in binding.split('+').map(str::trim) {
        match part {
            "" => return Err(anyhow!("Empty component in hotkey: '{}'", hotkey_str)),
            "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
            "alt" | "option" => modifiers |= Modifiers::ALT,
            "shift" => modifiers |= Modifiers::SHIFT,
            "meta" | "cmd" | "super" | "win" => modifiers |= Modifiers::SUPER,
            key => {
                if code.is_some() {
                    return Err(anyhow!("Multiple keys specified in hotkey: {}", hotkey_str));
                }
                code = Some(parse_key_code(key)?);
            }
        }
    }

    let code = code.ok_or_else(|| anyhow!("No key specified in hotkey: {}", hotkey_str))?;
    let modifiers = (!modifiers.is_empty()).then_some(modifiers);
    Ok(HotKey::new(modifiers, code))
}

/// Maps a lowercase key name onto its W3C `Code` name and parses it.
fn parse_key_code(key: &str) -> Result<Code> {
    let canonical = match key {
        k if k.len() == 1 && k.chars().all(|c| c.is_ascii_lowercase()) => {
            format!("Key{}", k.to_uppercase())
        }
        k if k.len() == 1 && k.chars().all(|c| c.is_ascii_digit()) => format!("Digit{k}"),
        k if is_function_key(k) => k.to_uppercase(),
        "space" => "Space".into(),
        "enter" | "return" => "Enter".into(),
        "tab" => "Tab".into(),
        "escape" | "esc" => "Escape".into(),
        "backspace" => "Backspace".into(),
        "delete" | "del" => "Delete".into(),
        "insert" | "ins" => "Insert".into(),
        "home" => "Home".into(),
        "end" => "End".into(),
        "pageup" => "PageUp".into(),
        "pagedown" => "PageDown".into(),
        "pause" => "Pause".into(),
        "up" | "arrowup" => "ArrowUp".into(),
        "down" | "arrowdown" => "ArrowDown".into(),
        "left" | "arrowleft" => "ArrowLeft".into(),
        "right" | "arrowright" => "ArrowRight".into(),
        _ => return Err(anyhow!("Unsupported key: {}", key)),
    };

    Code::from_str(&canonical).map_err(|_| anyhow!("Unsupported key: {}", key))
}

fn is_function_key(key: &str) -> bool {
    key.strip_prefix('f')
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=24).contains(&n))
}
