//! Input injection.
//!
//! The loop talks to the game only through [`InputSimulator`]: a pointer
//! read (for the failsafe), a left click at an absolute screen point, and
//! key press / down / up. Two implementations ship with the crate:
//! - [`mock::MockSimulator`] records everything and never touches the desktop
//! - [`enigo_backend::EnigoSimulator`] drives the real mouse and keyboard
//!   (feature `input`)

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during input simulation.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Input simulation not available on this platform")]
    NotAvailable,

    #[error("Failed to simulate input: {0}")]
    SimulationFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Failed to read pointer position: {0}")]
    PointerUnavailable(String),
}

/// Result type for input operations.
pub type InputResult<T> = Result<T, InputError>;

// ============================================================================
// Keys
// ============================================================================

/// A keyboard key as named in the configuration (`"z"`, `"space"`, `"ctrl"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    Char(char),
    Space,
    Enter,
    Escape,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Control,
    Alt,
    Shift,
    F(u8),
}

impl FromStr for Key {
    type Err = InputError;

    fn from_str(s: &str) -> InputResult<Self> {
        let lower = s.trim().to_lowercase();
        let key = match lower.as_str() {
            "space" | " " => Key::Space,
            "enter" | "return" => Key::Enter,
            "escape" | "esc" => Key::Escape,
            "tab" => Key::Tab,
            "left" | "leftarrow" => Key::Left,
            "right" | "rightarrow" => Key::Right,
            "up" | "uparrow" => Key::Up,
            "down" | "downarrow" => Key::Down,
            "ctrl" | "control" => Key::Control,
            "alt" => Key::Alt,
            "shift" => Key::Shift,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    (Some('f'), Some(_)) => match other[1..].parse::<u8>() {
                        Ok(n) if (1..=12).contains(&n) => Key::F(n),
                        _ => return Err(InputError::InvalidKey(s.to_string())),
                    },
                    _ => return Err(InputError::InvalidKey(s.to_string())),
                }
            }
        };
        Ok(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c),
            Key::Space => write!(f, "space"),
            Key::Enter => write!(f, "enter"),
            Key::Escape => write!(f, "esc"),
            Key::Tab => write!(f, "tab"),
            Key::Left => write!(f, "left"),
            Key::Right => write!(f, "right"),
            Key::Up => write!(f, "up"),
            Key::Down => write!(f, "down"),
            Key::Control => write!(f, "ctrl"),
            Key::Alt => write!(f, "alt"),
            Key::Shift => write!(f, "shift"),
            Key::F(n) => write!(f, "f{}", n),
        }
    }
}

impl TryFrom<String> for Key {
    type Error = InputError;

    fn try_from(value: String) -> InputResult<Self> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

// ============================================================================
// Simulator trait
// ============================================================================

/// Primitive input actions. One call is one primitive.
#[async_trait]
pub trait InputSimulator: Send + Sync {
    /// Check if input simulation is available.
    fn is_available(&self) -> bool;

    /// Current pointer position in screen pixels.
    async fn pointer_position(&self) -> InputResult<(i32, i32)>;

    /// Left click at an absolute screen position.
    async fn click(&self, x: i32, y: i32) -> InputResult<()>;

    async fn key_press(&self, key: Key) -> InputResult<()>;

    async fn key_down(&self, key: Key) -> InputResult<()>;

    async fn key_up(&self, key: Key) -> InputResult<()>;
}

// ============================================================================
// Mock Implementation (for testing and dry runs)
// ============================================================================

pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::{Mutex, RwLock};

    /// Mock input simulator that records calls but doesn't actually simulate input.
    pub struct MockSimulator {
        /// Simulated pointer position
        position: Arc<RwLock<(i32, i32)>>,
        /// Action log for verification
        actions: Arc<Mutex<VecDeque<String>>>,
        /// Maximum actions to keep in log
        max_log_size: usize,
        /// When set, every action fails
        failing: AtomicBool,
        /// When set, pointer reads fail
        pointer_failing: AtomicBool,
    }

    impl MockSimulator {
        pub fn new() -> Self {
            Self {
                position: Arc::new(RwLock::new((0, 0))),
                actions: Arc::new(Mutex::new(VecDeque::new())),
                max_log_size: 1000,
                failing: AtomicBool::new(false),
                pointer_failing: AtomicBool::new(false),
            }
        }

        /// Start with the pointer somewhere other than the origin.
        pub fn with_position(x: i32, y: i32) -> Self {
            let mut sim = Self::new();
            sim.position = Arc::new(RwLock::new((x, y)));
            sim
        }

        /// Get the action log.
        pub async fn actions(&self) -> Vec<String> {
            self.actions.lock().await.iter().cloned().collect()
        }

        /// Move the simulated pointer, as a user grabbing the mouse would.
        pub async fn set_position(&self, x: i32, y: i32) {
            *self.position.write().await = (x, y);
        }

        /// Make every following action fail until reset.
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn set_pointer_failing(&self, failing: bool) {
            self.pointer_failing.store(failing, Ordering::SeqCst);
        }

        async fn log(&self, action: String) -> InputResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(InputError::SimulationFailed(format!("mock refused {}", action)));
            }
            let mut actions = self.actions.lock().await;
            if actions.len() >= self.max_log_size {
                actions.pop_front();
            }
            actions.push_back(action);
            Ok(())
        }
    }

    impl Default for MockSimulator {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl InputSimulator for MockSimulator {
        fn is_available(&self) -> bool {
            true // Mock is always available
        }

        async fn pointer_position(&self) -> InputResult<(i32, i32)> {
            if self.pointer_failing.load(Ordering::SeqCst) {
                return Err(InputError::PointerUnavailable("mock pointer offline".into()));
            }
            Ok(*self.position.read().await)
        }

        async fn click(&self, x: i32, y: i32) -> InputResult<()> {
            self.log(format!("click({}, {})", x, y)).await?;
            *self.position.write().await = (x, y);
            Ok(())
        }

        async fn key_press(&self, key: Key) -> InputResult<()> {
            self.log(format!("key_press({})", key)).await
        }

        async fn key_down(&self, key: Key) -> InputResult<()> {
            self.log(format!("key_down({})", key)).await
        }

        async fn key_up(&self, key: Key) -> InputResult<()> {
            self.log(format!("key_up({})", key)).await
        }
    }
}

// ============================================================================
// Real input (enigo)
// ============================================================================

#[cfg(feature = "input")]
pub mod enigo_backend {
    use super::*;
    use enigo::{Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};

    /// Drives the real mouse and keyboard.
    ///
    /// A connection is opened per primitive so the simulator stays `Send + Sync`
    /// on every platform enigo supports.
    #[derive(Debug, Default)]
    pub struct EnigoSimulator;

    impl EnigoSimulator {
        pub fn new() -> InputResult<Self> {
            // Probe once so a missing display fails at startup, not mid-hunt.
            Enigo::new(&Settings::default())
                .map_err(|e| InputError::SimulationFailed(e.to_string()))?;
            Ok(Self)
        }

        fn with_enigo<T>(f: impl FnOnce(&mut Enigo) -> InputResult<T>) -> InputResult<T> {
            let mut enigo = Enigo::new(&Settings::default())
                .map_err(|e| InputError::SimulationFailed(e.to_string()))?;
            f(&mut enigo)
        }

        fn to_enigo(key: Key) -> enigo::Key {
            match key {
                Key::Char(c) => enigo::Key::Unicode(c),
                Key::Space => enigo::Key::Space,
                Key::Enter => enigo::Key::Return,
                Key::Escape => enigo::Key::Escape,
                Key::Tab => enigo::Key::Tab,
                Key::Left => enigo::Key::LeftArrow,
                Key::Right => enigo::Key::RightArrow,
                Key::Up => enigo::Key::UpArrow,
                Key::Down => enigo::Key::DownArrow,
                Key::Control => enigo::Key::Control,
                Key::Alt => enigo::Key::Alt,
                Key::Shift => enigo::Key::Shift,
                Key::F(1) => enigo::Key::F1,
                Key::F(2) => enigo::Key::F2,
                Key::F(3) => enigo::Key::F3,
                Key::F(4) => enigo::Key::F4,
                Key::F(5) => enigo::Key::F5,
                Key::F(6) => enigo::Key::F6,
                Key::F(7) => enigo::Key::F7,
                Key::F(8) => enigo::Key::F8,
                Key::F(9) => enigo::Key::F9,
                Key::F(10) => enigo::Key::F10,
                Key::F(11) => enigo::Key::F11,
                Key::F(_) => enigo::Key::F12,
            }
        }

        fn key(key: Key, direction: Direction) -> InputResult<()> {
            Self::with_enigo(|enigo| {
                enigo
                    .key(Self::to_enigo(key), direction)
                    .map_err(|e| InputError::SimulationFailed(e.to_string()))
            })
        }
    }

    #[async_trait]
    impl InputSimulator for EnigoSimulator {
        fn is_available(&self) -> bool {
            Enigo::new(&Settings::default()).is_ok()
        }

        async fn pointer_position(&self) -> InputResult<(i32, i32)> {
            Self::with_enigo(|enigo| {
                enigo
                    .location()
                    .map_err(|e| InputError::PointerUnavailable(e.to_string()))
            })
        }

        async fn click(&self, x: i32, y: i32) -> InputResult<()> {
            Self::with_enigo(|enigo| {
                enigo
                    .move_mouse(x, y, Coordinate::Abs)
                    .map_err(|e| InputError::SimulationFailed(e.to_string()))?;
                enigo
                    .button(Button::Left, Direction::Click)
                    .map_err(|e| InputError::SimulationFailed(e.to_string()))
            })
        }

        async fn key_press(&self, key: Key) -> InputResult<()> {
            Self::key(key, Direction::Click)
        }

        async fn key_down(&self, key: Key) -> InputResult<()> {
            Self::key(key, Direction::Press)
        }

        async fn key_up(&self, key: Key) -> InputResult<()> {
            Self::key(key, Direction::Release)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockSimulator;
    use super::*;

    #[test]
    fn test_key_parse() {
        assert_eq!("z".parse::<Key>().unwrap(), Key::Char('z'));
        assert_eq!("SPACE".parse::<Key>().unwrap(), Key::Space);
        assert_eq!("ctrl".parse::<Key>().unwrap(), Key::Control);
        assert_eq!("f5".parse::<Key>().unwrap(), Key::F(5));
        assert_eq!("f".parse::<Key>().unwrap(), Key::Char('f'));
        assert!("f13".parse::<Key>().is_err());
        assert!("hyperdrive".parse::<Key>().is_err());
        assert!("".parse::<Key>().is_err());
    }

    #[test]
    fn test_key_display_parses_back() {
        for key in [Key::Char('z'), Key::Space, Key::Alt, Key::Left, Key::F(11)] {
            assert_eq!(key.to_string().parse::<Key>().unwrap(), key);
        }
    }

    #[tokio::test]
    async fn test_mock_simulator() {
        let sim = MockSimulator::new();
        assert!(sim.is_available());

        sim.click(100, 200).await.unwrap();
        assert_eq!(sim.pointer_position().await.unwrap(), (100, 200));

        sim.key_press(Key::Char('z')).await.unwrap();
        sim.key_down(Key::Left).await.unwrap();
        sim.key_up(Key::Left).await.unwrap();

        let actions = sim.actions().await;
        assert_eq!(
            actions,
            vec!["click(100, 200)", "key_press(z)", "key_down(left)", "key_up(left)"]
        );
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let sim = MockSimulator::new();
        sim.set_failing(true);
        assert!(matches!(
            sim.key_press(Key::Space).await,
            Err(InputError::SimulationFailed(_))
        ));
        assert!(sim.actions().await.is_empty());

        sim.set_pointer_failing(true);
        assert!(sim.pointer_position().await.is_err());
    }
}
