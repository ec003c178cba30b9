//! Configuration Vault – reads/writes `~/.chroma/config.toml`.
//!
//! The file has two sections: `[connection]` says how to reach the
//! executor, `[robot]` is the [`RobotConfig`] handed to the controller.
//! Every field has a default, so a partial file is fine.

use chroma_types::RobotConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the controller reaches the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorMode {
    /// In-process simulated arm.
    #[default]
    Sim,
    /// Dial an executor listening on `executor_addr`.
    Connect,
    /// Listen on `bind_addr` and wait for the executor to dial in.
    Listen,
}

impl std::fmt::Display for ExecutorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorMode::Sim => write!(f, "sim"),
            ExecutorMode::Connect => write!(f, "connect"),
            ExecutorMode::Listen => write!(f, "listen"),
        }
    }
}

impl std::str::FromStr for ExecutorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sim" => Ok(ExecutorMode::Sim),
            "connect" | "tcp" => Ok(ExecutorMode::Connect),
            "listen" => Ok(ExecutorMode::Listen),
            other => Err(format!("unknown executor mode '{other}' (sim / connect / listen)")),
        }
    }
}

/// `[connection]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub mode: ExecutorMode,

    /// Where the executor listens in `connect` mode.
    #[serde(default = "default_executor_addr")]
    pub executor_addr: String,

    /// Where the controller listens in `listen` mode, and the default
    /// address of `chroma executor`.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Bound on each wait for a reply. Unset waits forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_timeout_ms: Option<u64>,
}

impl ConnectionConfig {
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }
}

fn default_executor_addr() -> String {
    "127.0.0.1:9999".to_string()
}
fn default_bind_addr() -> String {
    "0.0.0.0:9999".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutorMode::default(),
            executor_addr: default_executor_addr(),
            bind_addr: default_bind_addr(),
            response_timeout_ms: None,
        }
    }
}

/// Persisted user configuration stored in `~/.chroma/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub robot: RobotConfig,
}

/// Return the path to `~/.chroma/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".chroma").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load, apply `CHROMA_*` overrides and validate the robot section.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.robot.validate().map_err(|e| e.to_string())?;
    Ok(Some(cfg))
}

/// Apply `CHROMA_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `CHROMA_MODE` | `connection.mode` |
/// | `CHROMA_EXECUTOR_ADDR` | `connection.executor_addr` |
/// | `CHROMA_BIND_ADDR` | `connection.bind_addr` |
/// | `CHROMA_RESPONSE_TIMEOUT_MS` | `connection.response_timeout_ms` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    let conn = &mut cfg.connection;
    if let Ok(v) = std::env::var("CHROMA_MODE")
        && let Ok(mode) = v.parse::<ExecutorMode>()
    {
        conn.mode = mode;
    }
    if let Ok(v) = std::env::var("CHROMA_EXECUTOR_ADDR") {
        conn.executor_addr = v;
    }
    if let Ok(v) = std::env::var("CHROMA_BIND_ADDR") {
        conn.bind_addr = v;
    }
    if let Ok(v) = std::env::var("CHROMA_RESPONSE_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        conn.response_timeout_ms = (ms > 0).then_some(ms);
    }
}

/// Save the config to disk, creating `~/.chroma/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Env-var tests share process state.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.robot, RobotConfig::default());
        assert_eq!(loaded.connection.executor_addr, "127.0.0.1:9999");
        assert_eq!(loaded.connection.response_timeout(), None);
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[connection]\nmode = \"connect\"\n\n[robot.servo]\nmax_iterations = 20\n",
        )
        .unwrap();

        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.connection.mode, ExecutorMode::Connect);
        assert_eq!(cfg.robot.servo.max_iterations, 20);
        assert_eq!(cfg.robot.servo.damping, 0.5);
        assert_eq!(cfg.robot.drop_zones.len(), 3);
    }

    #[test]
    fn invalid_robot_section_is_rejected() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[robot.servo]\ndamping = 2.0\n").unwrap();

        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("damping"), "{err}");
    }

    #[test]
    fn config_path_points_to_chroma_dir() {
        let p = config_path_for_home("/home/operator");
        assert_eq!(p, PathBuf::from("/home/operator/.chroma/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn env_overrides_connection_fields() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: serialised by ENV_LOCK.
        unsafe {
            std::env::set_var("CHROMA_MODE", "listen");
            std::env::set_var("CHROMA_EXECUTOR_ADDR", "10.0.0.7:9999");
            std::env::set_var("CHROMA_BIND_ADDR", "0.0.0.0:7000");
            std::env::set_var("CHROMA_RESPONSE_TIMEOUT_MS", "2500");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("CHROMA_MODE");
            std::env::remove_var("CHROMA_EXECUTOR_ADDR");
            std::env::remove_var("CHROMA_BIND_ADDR");
            std::env::remove_var("CHROMA_RESPONSE_TIMEOUT_MS");
        }
        assert_eq!(cfg.connection.mode, ExecutorMode::Listen);
        assert_eq!(cfg.connection.executor_addr, "10.0.0.7:9999");
        assert_eq!(cfg.connection.bind_addr, "0.0.0.0:7000");
        assert_eq!(
            cfg.connection.response_timeout(),
            Some(Duration::from_millis(2500))
        );
    }

    #[test]
    fn env_overrides_ignore_garbage() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: serialised by ENV_LOCK.
        unsafe {
            std::env::set_var("CHROMA_MODE", "teleport");
            std::env::set_var("CHROMA_RESPONSE_TIMEOUT_MS", "soon");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("CHROMA_MODE");
            std::env::remove_var("CHROMA_RESPONSE_TIMEOUT_MS");
        }
        assert_eq!(cfg.connection, ConnectionConfig::default());
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("SIM".parse::<ExecutorMode>(), Ok(ExecutorMode::Sim));
        assert_eq!("tcp".parse::<ExecutorMode>(), Ok(ExecutorMode::Connect));
        assert!("usb".parse::<ExecutorMode>().is_err());
        assert_eq!(ExecutorMode::Listen.to_string(), "listen");
    }
}
