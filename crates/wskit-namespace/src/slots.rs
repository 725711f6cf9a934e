//! Descriptor set and slot table shared by the helper parent and child.
//!
//! The parent opens one descriptor per entry of the set and places them at
//! consecutive slots starting at [`FIRST_SLOT`]. The child learns which slot
//! holds which handle from environment variables. Both sides go through
//! [`SlotTable`], so the mapping is produced and parsed in one place.

use std::os::fd::RawFd;
use std::path::PathBuf;

use nix::unistd::Pid;
use wskit_core::{Result, WskitError};

use crate::config::NamespaceKind;

/// Marks a process started by the namespace runner
pub const INIT_ENV: &str = "_WSKIT_INIT";
/// Version of the slot table layout
pub const VERSION_ENV: &str = "_WSKIT_SLOTS_VERSION";
pub const SLOT_TABLE_VERSION: u32 = 1;

/// First inherited slot, right after stdio
pub const FIRST_SLOT: RawFd = 3;

/// A handle the helper child receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DescriptorKind {
    RootDir,
    WorkDir,
    Namespace(NamespaceKind),
}

impl DescriptorKind {
    /// Every kind, in slot order
    pub fn all() -> [DescriptorKind; 5] {
        [
            DescriptorKind::RootDir,
            DescriptorKind::WorkDir,
            DescriptorKind::Namespace(NamespaceKind::Mount),
            DescriptorKind::Namespace(NamespaceKind::Net),
            DescriptorKind::Namespace(NamespaceKind::Pid),
        ]
    }

    pub fn env_name(&self) -> &'static str {
        match self {
            DescriptorKind::RootDir => "_WSKIT_ROOTFD",
            DescriptorKind::WorkDir => "_WSKIT_CWDFD",
            DescriptorKind::Namespace(NamespaceKind::Mount) => "_WSKIT_MNTNSFD",
            DescriptorKind::Namespace(NamespaceKind::Net) => "_WSKIT_NETNSFD",
            DescriptorKind::Namespace(NamespaceKind::Pid) => "_WSKIT_PIDNSFD",
        }
    }

    pub fn source_path(&self, pid: Pid) -> PathBuf {
        match self {
            DescriptorKind::RootDir => PathBuf::from(format!("/proc/{}/root", pid.as_raw())),
            DescriptorKind::WorkDir => PathBuf::from(format!("/proc/{}/cwd", pid.as_raw())),
            DescriptorKind::Namespace(ns) => ns.handle_path(pid),
        }
    }

    /// Directories are opened path-only; namespace handles read-only
    pub fn open_flags(&self) -> libc::c_int {
        match self {
            DescriptorKind::RootDir | DescriptorKind::WorkDir => {
                libc::O_PATH | libc::O_DIRECTORY | libc::O_NONBLOCK
            }
            DescriptorKind::Namespace(_) => libc::O_RDONLY | libc::O_NONBLOCK,
        }
    }
}

/// One entry of a namespace descriptor set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSpec {
    pub kind: DescriptorKind,
    pub source: PathBuf,
    pub flags: libc::c_int,
}

/// Build the descriptor set for `pid`: root and cwd always, then each
/// requested namespace in slot order.
pub fn descriptor_set(pid: Pid, namespaces: &[NamespaceKind]) -> Vec<DescriptorSpec> {
    DescriptorKind::all()
        .into_iter()
        .filter(|kind| match kind {
            DescriptorKind::Namespace(ns) => namespaces.contains(ns),
            _ => true,
        })
        .map(|kind| DescriptorSpec {
            kind,
            source: kind.source_path(pid),
            flags: kind.open_flags(),
        })
        .collect()
}

/// Mapping from descriptor kind to inherited slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    entries: Vec<(DescriptorKind, RawFd)>,
}

impl SlotTable {
    /// Assign consecutive slots to `specs` in order
    pub fn positional(specs: &[DescriptorSpec]) -> Self {
        let entries = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.kind, FIRST_SLOT + i as RawFd))
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[(DescriptorKind, RawFd)] {
        &self.entries
    }

    pub fn slot(&self, kind: DescriptorKind) -> Option<RawFd> {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, slot)| *slot)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = (NamespaceKind, RawFd)> + '_ {
        self.entries.iter().filter_map(|(kind, slot)| match kind {
            DescriptorKind::Namespace(ns) => Some((*ns, *slot)),
            _ => None,
        })
    }

    /// Environment handed to the helper child
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            (INIT_ENV.to_string(), "1".to_string()),
            (VERSION_ENV.to_string(), SLOT_TABLE_VERSION.to_string()),
        ];
        env.extend(
            self.entries
                .iter()
                .map(|(kind, slot)| (kind.env_name().to_string(), slot.to_string())),
        );
        env
    }

    /// Parse the table from the helper child's environment
    pub fn from_env<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        let lookup = |name: &str| {
            vars.iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };

        if lookup(INIT_ENV) != Some("1") {
            return Err(WskitError::Namespace(format!(
                "{} is not set; not started by the namespace runner",
                INIT_ENV
            )));
        }
        match lookup(VERSION_ENV).map(str::parse::<u32>) {
            Some(Ok(SLOT_TABLE_VERSION)) => {}
            other => {
                return Err(WskitError::Namespace(format!(
                    "unsupported slot table version: {:?}",
                    other
                )))
            }
        }

        let mut entries = Vec::new();
        for kind in DescriptorKind::all() {
            let Some(raw) = lookup(kind.env_name()) else {
                continue;
            };
            let slot: RawFd = raw.parse().map_err(|_| {
                WskitError::Namespace(format!("invalid slot {}={}", kind.env_name(), raw))
            })?;
            if slot < FIRST_SLOT {
                return Err(WskitError::Namespace(format!(
                    "slot {}={} overlaps stdio",
                    kind.env_name(),
                    slot
                )));
            }
            if entries.iter().any(|(_, s)| *s == slot) {
                return Err(WskitError::Namespace(format!(
                    "slot {} assigned twice",
                    slot
                )));
            }
            entries.push((kind, slot));
        }

        let table = Self { entries };
        for required in [DescriptorKind::RootDir, DescriptorKind::WorkDir] {
            if table.slot(required).is_none() {
                return Err(WskitError::Namespace(format!(
                    "missing {}",
                    required.env_name()
                )));
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_descriptor_set_always_has_root_and_cwd() {
        let set = descriptor_set(Pid::from_raw(7), &[]);
        assert_eq!(set.len(), 2);
        assert_eq!(set[0].kind, DescriptorKind::RootDir);
        assert_eq!(set[0].source, PathBuf::from("/proc/7/root"));
        assert_eq!(set[1].kind, DescriptorKind::WorkDir);
        assert_ne!(set[0].flags & libc::O_PATH, 0);
    }

    #[test]
    fn test_descriptor_set_orders_namespaces() {
        let set = descriptor_set(Pid::from_raw(7), &[NamespaceKind::Pid, NamespaceKind::Mount]);
        let kinds: Vec<_> = set.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DescriptorKind::RootDir,
                DescriptorKind::WorkDir,
                DescriptorKind::Namespace(NamespaceKind::Mount),
                DescriptorKind::Namespace(NamespaceKind::Pid),
            ]
        );
        assert_eq!(set[3].source, PathBuf::from("/proc/7/ns/pid"));
        assert_eq!(set[3].flags & libc::O_PATH, 0);
    }

    #[test]
    fn test_parent_and_child_agree_on_slots() {
        let set = descriptor_set(Pid::from_raw(7), &[NamespaceKind::Mount]);
        let table = SlotTable::positional(&set);
        let parsed = SlotTable::from_env(table.to_env()).unwrap();

        assert_eq!(parsed, table);
        assert_eq!(parsed.slot(DescriptorKind::RootDir), Some(3));
        assert_eq!(parsed.slot(DescriptorKind::WorkDir), Some(4));
        assert_eq!(
            parsed.slot(DescriptorKind::Namespace(NamespaceKind::Mount)),
            Some(5)
        );
        assert_eq!(parsed.namespaces().count(), 1);
    }

    #[test]
    fn test_missing_init_marker_rejected() {
        let err = SlotTable::from_env(env(&[
            ("_WSKIT_SLOTS_VERSION", "1"),
            ("_WSKIT_ROOTFD", "3"),
            ("_WSKIT_CWDFD", "4"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(INIT_ENV));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let result = SlotTable::from_env(env(&[
            ("_WSKIT_INIT", "1"),
            ("_WSKIT_SLOTS_VERSION", "2"),
            ("_WSKIT_ROOTFD", "3"),
            ("_WSKIT_CWDFD", "4"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_and_stdio_slots_rejected() {
        let duplicate = SlotTable::from_env(env(&[
            ("_WSKIT_INIT", "1"),
            ("_WSKIT_SLOTS_VERSION", "1"),
            ("_WSKIT_ROOTFD", "3"),
            ("_WSKIT_CWDFD", "3"),
        ]));
        assert!(duplicate.is_err());

        let stdio = SlotTable::from_env(env(&[
            ("_WSKIT_INIT", "1"),
            ("_WSKIT_SLOTS_VERSION", "1"),
            ("_WSKIT_ROOTFD", "1"),
            ("_WSKIT_CWDFD", "4"),
        ]));
        assert!(stdio.is_err());
    }

    #[test]
    fn test_missing_root_rejected() {
        let result = SlotTable::from_env(env(&[
            ("_WSKIT_INIT", "1"),
            ("_WSKIT_SLOTS_VERSION", "1"),
            ("_WSKIT_CWDFD", "4"),
            ("_WSKIT_MNTNSFD", "5"),
        ]));
        assert!(result.is_err());
    }
}
