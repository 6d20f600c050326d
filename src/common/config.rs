use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Global TraceSweep configuration (`~/.tracesweep/config.toml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Where backup sessions are written
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Take a write-ahead backup before destroying anything
    #[serde(default = "default_true")]
    pub create_backup: bool,

    /// Worker pool size for parallel runs (0 = available parallelism)
    #[serde(default)]
    pub max_workers: usize,

    /// Run full sweeps in parallel by default
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Cancel a run after this many seconds (0 = no deadline)
    #[serde(default)]
    pub timeout_secs: u64,

    /// Maximum directory depth walked by the filesystem driver
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Roots searched for leftover files and folders
    #[serde(default = "default_filesystem_roots")]
    pub filesystem_roots: Vec<PathBuf>,

    /// launchd agent directories
    #[serde(default = "default_startup_dirs")]
    pub startup_dirs: Vec<PathBuf>,

    /// Service unit directories
    #[serde(default = "default_service_dirs")]
    pub service_dirs: Vec<PathBuf>,

    /// Scheduled task definitions (timers, cron entries)
    #[serde(default = "default_task_dirs")]
    pub task_dirs: Vec<PathBuf>,

    /// Kernel module load configuration
    #[serde(default = "default_module_dirs")]
    pub module_dirs: Vec<PathBuf>,

    /// Network connection profiles
    #[serde(default = "default_network_dirs")]
    pub network_dirs: Vec<PathBuf>,

    /// Persistent preference/config entries
    #[serde(default = "default_config_dirs")]
    pub config_dirs: Vec<PathBuf>,

    /// Paths to exclude from scanning
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    /// Additional protected names, keyed by resource kind
    #[serde(default)]
    pub extra_protected: BTreeMap<String, Vec<String>>,
}

fn default_true() -> bool {
    true
}
fn default_backup_dir() -> PathBuf {
    Settings::data_dir().join("backups")
}
fn default_max_depth() -> usize {
    4
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

fn default_filesystem_roots() -> Vec<PathBuf> {
    let home = home();
    let mut roots = vec![
        home.join("Library/Application Support"),
        home.join("Library/Caches"),
        home.join(".local/share"),
        home.join(".cache"),
        PathBuf::from("/opt"),
    ];
    if let Some(config) = dirs::config_dir() {
        roots.push(config);
    }
    roots.dedup();
    roots
}
fn default_startup_dirs() -> Vec<PathBuf> {
    vec![
        home().join("Library/LaunchAgents"),
        PathBuf::from("/Library/LaunchAgents"),
        PathBuf::from("/Library/LaunchDaemons"),
    ]
}
fn default_service_dirs() -> Vec<PathBuf> {
    vec![
        home().join(".config/systemd/user"),
        PathBuf::from("/etc/systemd/system"),
    ]
}
fn default_task_dirs() -> Vec<PathBuf> {
    vec![
        home().join(".config/systemd/user"),
        PathBuf::from("/etc/systemd/system"),
        PathBuf::from("/etc/cron.d"),
    ]
}
fn default_module_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/etc/modules-load.d"),
        PathBuf::from("/etc/modprobe.d"),
    ]
}
fn default_network_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("/etc/NetworkManager/system-connections")]
}
fn default_config_dirs() -> Vec<PathBuf> {
    vec![home().join("Library/Preferences")]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            create_backup: true,
            max_workers: 0,
            parallel: true,
            timeout_secs: 0,
            max_depth: default_max_depth(),
            filesystem_roots: default_filesystem_roots(),
            startup_dirs: default_startup_dirs(),
            service_dirs: default_service_dirs(),
            task_dirs: default_task_dirs(),
            module_dirs: default_module_dirs(),
            network_dirs: default_network_dirs(),
            config_dirs: default_config_dirs(),
            exclude_paths: Vec::new(),
            extra_protected: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Get the TraceSweep data directory (~/.tracesweep)
    pub fn data_dir() -> PathBuf {
        home().join(".tracesweep")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Get the logs directory
    pub fn logs_dir() -> PathBuf {
        Self::data_dir().join("logs")
    }

    /// Load config from file, or defaults if it does not exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(settings)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save config to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Initialize data, log and backup directories
    pub fn init_dirs(&self) -> Result<()> {
        for dir in [Self::data_dir(), Self::logs_dir(), self.backup_dir.clone()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Worker count for the parallel pool, never zero
    pub fn worker_count(&self) -> usize {
        if self.max_workers > 0 {
            return self.max_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    /// Check if a path should be excluded
    pub fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.display().to_string();
        self.exclude_paths.iter().any(|p| path_str.contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.create_backup);
        assert!(settings.parallel);
        assert_eq!(settings.max_depth, 4);
        assert!(settings.backup_dir.ends_with("backups"));
        assert!(settings.worker_count() >= 1);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            max_workers = 2
            exclude_paths = ["node_modules"]

            [extra_protected]
            services = ["corp-agent"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.worker_count(), 2);
        assert!(settings.create_backup);
        assert_eq!(settings.extra_protected["services"], vec!["corp-agent"]);
        assert!(settings.is_excluded(Path::new("/work/app/node_modules")));
        assert!(!settings.is_excluded(Path::new("/work/app/src")));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let settings = Settings::load_from(Path::new("/nonexistent/tracesweep.toml")).unwrap();
        assert_eq!(settings.max_workers, 0);
    }
}
