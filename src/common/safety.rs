use std::collections::BTreeMap;
use std::path::Path;

use crate::engine::model::{ResourceKind, ScanResult};

/// Paths that must never be deleted. Matched exactly, not as prefixes:
/// a cache *under* /Library is fine, /Library itself is not.
const PROTECTED_PATHS: &[&str] = &[
    "/",
    "/System",
    "/Applications",
    "/Users",
    "/Library",
    "/home",
    "/root",
    "/boot",
    "/usr",
    "/bin",
    "/sbin",
    "/lib",
    "/lib64",
    "/var",
    "/etc",
    "/opt",
    "/private",
    "/cores",
    "/Volumes",
    "c:\\",
    "c:\\windows",
    "c:\\windows\\system32",
    "c:\\program files",
    "c:\\program files (x86)",
    "c:\\programdata",
    "c:\\users",
];

/// Paths under home that must never be deleted entirely
const PROTECTED_HOME_DIRS: &[&str] = &[
    "", // home dir itself
    "Desktop",
    "Documents",
    "Downloads",
    "Pictures",
    "Music",
    "Movies",
    "Library",
    "Applications",
    ".config",
    ".local",
    ".local/share",
    ".cache",
    ".ssh",
    ".gnupg",
];

/// Core service definitions (network stack, update, security, RPC)
const PROTECTED_SERVICES: &[&str] = &[
    "wuauserv", "bits", "cryptsvc", "msiserver", "trustedinstaller",
    "windefend", "mpssvc", "eventlog", "lanmanserver", "lanmanworkstation",
    "rpcss", "plugplay", "dhcp", "dnscache", "netlogon", "w32time",
    "schedule", "spooler", "themes", "audiosrv", "winmgmt",
    "sshd", "ssh", "dbus", "networkmanager", "cron", "crond", "udev",
    "getty@", "polkit", "rsyslog", "apparmor", "firewalld", "ufw",
];

const PROTECTED_SERVICE_PREFIXES: &[&str] = &["systemd-", "com.apple."];

/// Kernel-loadable modules the system cannot boot or network without
const PROTECTED_DRIVERS: &[&str] = &[
    "disk", "ntfs", "volmgr", "partmgr", "volume", "mountmgr",
    "fltmgr", "ksecdd", "tcpip", "afd", "netbt", "mrxsmb", "rdbss",
    "ndis", "http", "dfsc", "classpnp", "storport", "acpi", "pci",
    "wdf01000", "wudfpf", "wudfrd", "usbhub", "usbehci", "usbxhci",
    "ext4", "xfs", "btrfs", "vfat", "nvme", "ahci", "sd_mod", "dm_mod",
    "usbcore", "xhci_hcd", "ipv6", "nf_tables",
];

/// Reserved scheduler namespaces
const PROTECTED_TASK_NAMESPACES: &[&str] = &[
    "\\microsoft\\",
    "\\windows\\",
    "com.apple.",
    "systemd-",
    "apt-daily",
    "logrotate",
    "fstrim",
    "e2scrub",
    "man-db",
    "anacron",
];

/// Configuration hives and preference domains owned by the OS
const PROTECTED_CONFIG_PREFIXES: &[&str] = &[
    "software\\microsoft\\windows nt",
    "software\\microsoft\\windows\\currentversion\\component based servicing",
    "system\\currentcontrolset\\control",
    "system\\currentcontrolset\\enum",
    "system\\setup",
    "security",
    "sam",
    "com.apple.",
    ".globalpreferences",
];

/// Network entries that keep loopback and core networking alive
const PROTECTED_NETWORK: &[&str] = &[
    "localhost",
    "broadcasthost",
    "local",
    "ip6-localhost",
    "ip6-loopback",
    "lo",
    "loopback",
    "core networking",
    "remote desktop",
    "windows defender",
    "windows update",
    "file and printer sharing",
    "network discovery",
];

const PROTECTED_STARTUP_PREFIXES: &[&str] = &["com.apple.", "securityhealth", "windows defender"];

/// Authoritative classifier of operating-system-critical items.
///
/// Consulted by the orchestrator before any driver sees an item. Pure:
/// the same item always classifies the same way for a given policy.
#[derive(Debug, Clone, Default)]
pub struct ProtectedItemPolicy {
    extra: BTreeMap<ResourceKind, Vec<String>>,
}

impl ProtectedItemPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add user-configured names (matched exactly against name or location).
    /// Unknown kind keys are ignored with a warning.
    pub fn with_extra(mut self, extra: &BTreeMap<String, Vec<String>>) -> Self {
        for (kind, names) in extra {
            match kind.parse::<ResourceKind>() {
                Ok(kind) => self
                    .extra
                    .entry(kind)
                    .or_default()
                    .extend(names.iter().map(|n| n.to_lowercase())),
                Err(e) => tracing::warn!("ignoring extra_protected entry: {}", e),
            }
        }
        self
    }

    pub fn is_protected(&self, kind: ResourceKind, item: &ScanResult) -> bool {
        let name = item.name.to_lowercase();
        let location = item.location.to_lowercase();

        if let Some(extra) = self.extra.get(&kind) {
            if extra.iter().any(|e| *e == name || *e == location) {
                return true;
            }
        }

        match kind {
            ResourceKind::Filesystem => is_protected_path(Path::new(&item.location)),
            ResourceKind::Services => {
                let stem = unit_stem(&name);
                PROTECTED_SERVICES.contains(&stem)
                    || PROTECTED_SERVICE_PREFIXES.iter().any(|p| stem.starts_with(p))
            }
            ResourceKind::Drivers => PROTECTED_DRIVERS.contains(&unit_stem(&name)),
            ResourceKind::ScheduledTasks => PROTECTED_TASK_NAMESPACES
                .iter()
                .any(|ns| location.contains(ns) || name.starts_with(ns)),
            ResourceKind::ConfigEntries => PROTECTED_CONFIG_PREFIXES
                .iter()
                .any(|p| under_prefix(&location, p) || under_prefix(&name, p)),
            ResourceKind::Network => PROTECTED_NETWORK.contains(&unit_stem(&name)),
            ResourceKind::StartupItems => PROTECTED_STARTUP_PREFIXES
                .iter()
                .any(|p| name.starts_with(p) || file_name(&location).starts_with(p)),
        }
    }
}

/// Strip a definition-file extension: `sshd.service` → `sshd`
fn unit_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            stem
        }
        _ => name,
    }
}

/// `p` ending in '.' is a domain prefix; otherwise it names a whole
/// hive/key and must end at a separator.
fn under_prefix(value: &str, p: &str) -> bool {
    if p.ends_with('.') {
        return value.starts_with(p);
    }
    value == p || value.strip_prefix(p).is_some_and(|rest| rest.starts_with('\\'))
}

fn file_name(location: &str) -> &str {
    location.rsplit(['/', '\\']).next().unwrap_or(location)
}

/// Check if a filesystem path is protected and should NEVER be deleted
pub fn is_protected_path(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    let trimmed = if path_str.len() > 1 {
        path_str.trim_end_matches(['/', '\\'])
    } else {
        &path_str
    };
    let lower = trimmed.to_lowercase();

    if PROTECTED_PATHS
        .iter()
        .any(|p| *p == trimmed || p.trim_end_matches('\\') == lower.trim_end_matches('\\'))
    {
        return true;
    }

    if let Some(home) = dirs::home_dir() {
        let home_str = home.to_string_lossy().to_string();
        for dir in PROTECTED_HOME_DIRS {
            let protected_path = if dir.is_empty() {
                home_str.clone()
            } else {
                format!("{}/{}", home_str, dir)
            };
            if trimmed == protected_path {
                return true;
            }
        }
    }

    false
}
