//! Configuration for the hunt loop.
//!
//! A single TOML document, read once at startup and immutable afterwards.
//! Every section has defaults, so a partial file is fine. Durations are kept
//! as plain numbers in the document and exposed as [`Duration`] accessors.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detection::{ObjectClass, Point};
use crate::error::{Error, Result};
use crate::input::Key;
use crate::search::SearchPattern;

// ============================================================================
// Sections
// ============================================================================

/// Root of the configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuntConfig {
    pub automation: AutomationConfig,
    pub controls: ControlsConfig,
    pub detection_behavior: DetectionBehavior,
    pub mob_hunting: MobHuntingConfig,
    pub safety: SafetyConfig,
    pub capture_region: CaptureRegion,
    pub stats: StatsConfig,
    pub logging: LoggingConfig,
}

/// Target selection and pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Detections below this score are never materialized
    pub confidence_threshold: f32,
    /// Baseline cooldown after an action
    pub action_delay_ms: u64,
    /// Target cycle period
    pub scan_interval_ms: u64,
    /// Pixels from the anchor beyond which a detection is ignored
    pub max_detection_distance: f32,
    /// Most wanted class first
    pub priority_targets: Vec<ObjectClass>,
    /// Distance reference in frame pixels; frame centre when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_anchor: Option<Point>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            action_delay_ms: 100,
            scan_interval_ms: 500,
            max_detection_distance: 150.0,
            priority_targets: vec![ObjectClass::Item, ObjectClass::Mob, ObjectClass::Npc],
            player_anchor: None,
        }
    }
}

impl AutomationConfig {
    pub fn action_delay(&self) -> Duration {
        Duration::from_millis(self.action_delay_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

/// How mobs get hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackMethod {
    /// Left click on the mob
    #[default]
    Click,
    /// Press `controls.attack_key`
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementKeys {
    pub left: Key,
    pub right: Key,
    pub jump: Key,
    pub down: Key,
}

impl Default for MovementKeys {
    fn default() -> Self {
        Self {
            left: Key::Left,
            right: Key::Right,
            jump: Key::Alt,
            down: Key::Down,
        }
    }
}

/// Key bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub pickup_key: Key,
    pub interact_key: Key,
    pub interact_delay_ms: u64,
    pub attack_method: AttackMethod,
    pub attack_key: Key,
    pub movement_keys: MovementKeys,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            pickup_key: Key::Char('z'),
            interact_key: Key::Space,
            interact_delay_ms: 500,
            attack_method: AttackMethod::Click,
            attack_key: Key::Control,
            movement_keys: MovementKeys::default(),
        }
    }
}

impl ControlsConfig {
    pub fn interact_delay(&self) -> Duration {
        Duration::from_millis(self.interact_delay_ms)
    }
}

/// Optional per-class overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassBehavior {
    /// Replaces `automation.max_detection_distance` for this class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f32>,
    /// Cooldown after attacking (mob only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionBehavior {
    pub mob: ClassBehavior,
    pub item: ClassBehavior,
    pub npc: ClassBehavior,
}

impl DetectionBehavior {
    pub fn for_class(&self, class: ObjectClass) -> Option<&ClassBehavior> {
        match class {
            ObjectClass::Mob => Some(&self.mob),
            ObjectClass::Item => Some(&self.item),
            ObjectClass::Npc => Some(&self.npc),
            _ => None,
        }
    }
}

/// Idle search ("mob hunting").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MobHuntingConfig {
    pub enable: bool,
    pub search_pattern: SearchPattern,
    /// Idle time without a mob before searching starts
    pub search_delay_seconds: f64,
    pub max_search_time_seconds: f64,
    pub return_to_center: bool,
    /// Length of one movement burst
    pub move_duration_ms: u64,
    /// Horizontal sweeps reverse after this many bursts
    pub sweep_moves: u32,
    /// Upper bound on the walk back
    pub return_timeout_seconds: f64,
}

impl Default for MobHuntingConfig {
    fn default() -> Self {
        Self {
            enable: false,
            search_pattern: SearchPattern::Horizontal,
            search_delay_seconds: 5.0,
            max_search_time_seconds: 20.0,
            return_to_center: true,
            move_duration_ms: 300,
            sweep_moves: 5,
            return_timeout_seconds: 10.0,
        }
    }
}

impl MobHuntingConfig {
    pub fn search_delay(&self) -> Duration {
        Duration::from_secs_f64(self.search_delay_seconds)
    }

    pub fn max_search_time(&self) -> Duration {
        Duration::from_secs_f64(self.max_search_time_seconds)
    }

    pub fn move_duration(&self) -> Duration {
        Duration::from_millis(self.move_duration_ms)
    }

    pub fn return_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.return_timeout_seconds)
    }
}

/// Which screen corner trips the pointer failsafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailsafeCorner {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub enable_failsafe: bool,
    /// 0 disables the runtime ceiling
    pub max_runtime_hours: f64,
    pub failsafe_corner: FailsafeCorner,
    pub failsafe_margin_px: u32,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enable_failsafe: true,
            max_runtime_hours: 0.0,
            failsafe_corner: FailsafeCorner::TopLeft,
            failsafe_margin_px: 5,
            screen_width: 1920,
            screen_height: 1080,
        }
    }
}

impl SafetyConfig {
    /// `None` when no ceiling is configured.
    pub fn max_runtime(&self) -> Option<Duration> {
        if self.max_runtime_hours > 0.0 {
            Some(Duration::from_secs_f64(self.max_runtime_hours * 3600.0))
        } else {
            None
        }
    }
}

/// Screen rectangle frames are captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureRegion {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub flush_interval_seconds: u64,
    /// JSON-lines monitoring artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            flush_interval_seconds: 30,
            path: None,
        }
    }
}

impl StatsConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            file: None,
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

impl HuntConfig {
    /// Reject anything the loop cannot run with. Called once before the loop.
    pub fn validate(&self) -> Result<()> {
        let a = &self.automation;
        if !a.confidence_threshold.is_finite() || !(0.0..=1.0).contains(&a.confidence_threshold) {
            return Err(Error::config(format!(
                "automation.confidence_threshold must be within [0, 1], got {}",
                a.confidence_threshold
            )));
        }
        if !a.max_detection_distance.is_finite() || a.max_detection_distance <= 0.0 {
            return Err(Error::config("automation.max_detection_distance must be positive"));
        }
        if a.scan_interval_ms == 0 {
            return Err(Error::config("automation.scan_interval_ms must be positive"));
        }
        if a.priority_targets.is_empty() {
            return Err(Error::config("automation.priority_targets is empty"));
        }
        let mut seen = HashSet::new();
        for class in &a.priority_targets {
            if !class.is_actionable() {
                return Err(Error::config(format!(
                    "automation.priority_targets: '{}' has no action and cannot be targeted",
                    class
                )));
            }
            if !seen.insert(*class) {
                return Err(Error::config(format!(
                    "automation.priority_targets: '{}' listed twice",
                    class
                )));
            }
        }
        if let Some(anchor) = a.player_anchor {
            if !anchor.is_finite() {
                return Err(Error::config("automation.player_anchor must be finite"));
            }
        }

        for class in [ObjectClass::Mob, ObjectClass::Item, ObjectClass::Npc] {
            let limit = self
                .detection_behavior
                .for_class(class)
                .and_then(|b| b.max_distance);
            if let Some(limit) = limit {
                if !limit.is_finite() || limit <= 0.0 {
                    return Err(Error::config(format!(
                        "detection_behavior.{}.max_distance must be positive",
                        class
                    )));
                }
            }
        }

        let m = &self.mob_hunting;
        if !m.search_delay_seconds.is_finite() || m.search_delay_seconds < 0.0 {
            return Err(Error::config("mob_hunting.search_delay_seconds must be >= 0"));
        }
        if !m.max_search_time_seconds.is_finite() || m.max_search_time_seconds <= 0.0 {
            return Err(Error::config("mob_hunting.max_search_time_seconds must be positive"));
        }
        if !m.return_timeout_seconds.is_finite() || m.return_timeout_seconds <= 0.0 {
            return Err(Error::config("mob_hunting.return_timeout_seconds must be positive"));
        }
        check_secs("mob_hunting.search_delay_seconds", m.search_delay_seconds)?;
        check_secs("mob_hunting.max_search_time_seconds", m.max_search_time_seconds)?;
        check_secs("mob_hunting.return_timeout_seconds", m.return_timeout_seconds)?;
        if m.move_duration_ms == 0 {
            return Err(Error::config("mob_hunting.move_duration_ms must be positive"));
        }
        if m.sweep_moves == 0 {
            return Err(Error::config("mob_hunting.sweep_moves must be at least 1"));
        }

        let s = &self.safety;
        if !s.max_runtime_hours.is_finite() || s.max_runtime_hours < 0.0 {
            return Err(Error::config("safety.max_runtime_hours must be >= 0"));
        }
        check_secs("safety.max_runtime_hours", s.max_runtime_hours * 3600.0)?;
        if s.screen_width == 0 || s.screen_height == 0 {
            return Err(Error::config("safety.screen_width/screen_height must be positive"));
        }

        if self.capture_region.width == 0 || self.capture_region.height == 0 {
            return Err(Error::config("capture_region width and height must be positive"));
        }
        if self.stats.flush_interval_seconds == 0 {
            return Err(Error::config("stats.flush_interval_seconds must be positive"));
        }

        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: HuntConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Seconds must fit in a [`Duration`]; the accessors rely on it.
fn check_secs(field: &str, secs: f64) -> Result<()> {
    Duration::try_from_secs_f64(secs)
        .map(|_| ())
        .map_err(|_| Error::config(format!("{} is out of range", field)))
}

// ============================================================================
// Manager
// ============================================================================

/// Locates, loads and saves the configuration file.
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// `<config dir>/mobhunt/config.toml`
    pub fn new() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mobhunt")
            .join("config.toml");
        Self { path }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load and validate. A missing file is created with defaults.
    pub fn load(&self) -> Result<HuntConfig> {
        if !self.path.exists() {
            let config = HuntConfig::default();
            self.save(&config)?;
            info!(path = %self.path.display(), "Wrote default configuration");
            return Ok(config);
        }
        let content = fs::read_to_string(&self.path)?;
        HuntConfig::from_toml(&content)
    }

    pub fn save(&self, config: &HuntConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, config.to_toml()?)?;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = HuntConfig::default();
        config.validate().unwrap();
        assert_eq!(config.automation.scan_interval(), Duration::from_millis(500));
        assert_eq!(config.safety.max_runtime(), None);
        assert_eq!(config.mob_hunting.search_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_document() {
        let config = HuntConfig::from_toml(
            r#"
            [automation]
            priority_targets = ["mob", "item"]
            action_delay_ms = 250

            [controls]
            pickup_key = "x"
            attack_method = "key"

            [mob_hunting]
            enable = true
            search_pattern = "vertical"

            [safety]
            max_runtime_hours = 2
            "#,
        )
        .unwrap();

        assert_eq!(
            config.automation.priority_targets,
            vec![ObjectClass::Mob, ObjectClass::Item]
        );
        assert_eq!(config.automation.action_delay(), Duration::from_millis(250));
        assert_eq!(config.automation.scan_interval_ms, 500);
        assert_eq!(config.controls.pickup_key, Key::Char('x'));
        assert_eq!(config.controls.attack_method, AttackMethod::Key);
        assert_eq!(config.mob_hunting.search_pattern, SearchPattern::Vertical);
        assert_eq!(config.safety.max_runtime(), Some(Duration::from_secs(7200)));
    }

    #[test]
    fn test_unknown_class_rejected_at_parse() {
        let err = HuntConfig::from_toml(
            r#"
            [automation]
            priority_targets = ["item", "dragon"]
            "#,
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_detection_only_class_rejected() {
        let mut config = HuntConfig::default();
        config.automation.priority_targets = vec![ObjectClass::Mob, ObjectClass::Ui];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'ui'"));
    }

    #[test]
    fn test_duplicate_and_empty_priorities_rejected() {
        let mut config = HuntConfig::default();
        config.automation.priority_targets = vec![ObjectClass::Mob, ObjectClass::Mob];
        assert!(config.validate().is_err());

        config.automation.priority_targets.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_range_checks() {
        let mut config = HuntConfig::default();
        config.automation.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = HuntConfig::default();
        config.mob_hunting.max_search_time_seconds = 0.0;
        assert!(config.validate().is_err());

        let mut config = HuntConfig::default();
        config.detection_behavior.item.max_distance = Some(-1.0);
        assert!(config.validate().is_err());

        let mut config = HuntConfig::default();
        config.safety.max_runtime_hours = -1.0;
        assert!(config.validate().is_err());

        let mut config = HuntConfig::default();
        config.safety.max_runtime_hours = 1e16;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_runtime_hours"));

        let mut config = HuntConfig::default();
        config.mob_hunting.search_delay_seconds = 1e30;
        assert!(config.validate().is_err());

        let mut config = HuntConfig::default();
        config.mob_hunting.max_search_time_seconds = f64::MAX;
        assert!(config.validate().is_err());

        let mut config = HuntConfig::default();
        config.mob_hunting.return_timeout_seconds = 1e25;
        assert!(config.validate().is_err());

        // Large but representable is fine
        let mut config = HuntConfig::default();
        config.safety.max_runtime_hours = 24.0 * 365.0;
        config.mob_hunting.search_delay_seconds = 1e9;
        config.validate().unwrap();
    }

    #[test]
    fn test_bad_key_rejected() {
        assert!(HuntConfig::from_toml("[controls]\npickup_key = \"warp\"\n").is_err());
    }

    #[test]
    fn test_manager_writes_defaults_then_round_trips() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("config.toml"));
        assert!(!manager.exists());

        let config = manager.load().unwrap();
        assert!(manager.exists());
        assert_eq!(config, HuntConfig::default());

        let mut changed = config.clone();
        changed.mob_hunting.enable = true;
        changed.automation.player_anchor = Some(Point::new(400.0, 500.0));
        changed.detection_behavior.mob.attack_delay_ms = Some(700);
        manager.save(&changed).unwrap();

        assert_eq!(manager.load().unwrap(), changed);
    }

    #[test]
    fn test_manager_surfaces_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[automation]\nscan_interval_ms = 0\n").unwrap();
        let err = ConfigManager::with_path(&path).load().unwrap_err();
        assert!(err.to_string().contains("scan_interval_ms"));
    }
}
