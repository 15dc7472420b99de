use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::{debug, warn};

use super::PathTranslator;
use crate::errors::PathError;
use crate::once::ResettableOnce;
use crate::paths::{clean_native_path, to_backslashes, to_forward_slashes};

const PROC_MOUNTS: &str = "/proc/mounts";
const DEFAULT_MOUNT_ROOT: &str = "/mnt/";
const DEFAULT_DISTRO: &str = "Ubuntu";
const DISTRO_ENV: &str = "WSL_DISTRO_NAME";
const UNC_LOCALHOST: &str = r"\\wsl.localhost\";
const UNC_LEGACY: &str = r"\\wsl$\";

/// A Windows drive exposed inside the Linux namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Upper-case drive letter, e.g. `C`.
    pub drive_letter: char,
    /// Linux mount point, e.g. `/mnt/c`.
    pub mount_point: String,
}

impl MountEntry {
    /// Parse mount table content, keeping the `9p`/`drvfs` mounts placed
    /// directly under `mount_root` with a single-letter name.
    pub fn parse_table(content: &str, mount_root: &str) -> Vec<Self> {
        content
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let _device = fields.next()?;
                let mount_point = fields.next()?;
                let fs_type = fields.next()?;
                if fs_type != "9p" && fs_type != "drvfs" {
                    return None;
                }
                let suffix = mount_point.strip_prefix(mount_root)?;
                let mut chars = suffix.chars();
                let letter = chars.next().filter(char::is_ascii_alphabetic)?;
                if chars.next().is_some() {
                    return None;
                }
                Some(Self {
                    drive_letter: letter.to_ascii_uppercase(),
                    mount_point: mount_point.to_string(),
                })
            })
            .collect()
    }
}

/// Where the mount table text comes from.
pub trait MountSource: Send + Sync + fmt::Debug {
    fn read_mounts(&self) -> io::Result<String>;
}

/// Reads `/proc/mounts`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcMounts;

impl MountSource for ProcMounts {
    fn read_mounts(&self) -> io::Result<String> {
        std::fs::read_to_string(PROC_MOUNTS)
    }
}

/// Fixed mount table text.
#[derive(Debug, Clone, Default)]
pub struct StaticMounts(pub String);

impl MountSource for StaticMounts {
    fn read_mounts(&self) -> io::Result<String> {
        Ok(self.0.clone())
    }
}

/// Table-driven translator.
///
/// The mount table and the distro name are read lazily and cached for the
/// lifetime of the translator; [`MountTableTranslator::reset`] drops both.
#[derive(Debug)]
pub struct MountTableTranslator {
    source: Arc<dyn MountSource>,
    mount_root: String,
    distro_override: Option<String>,
    mounts: ResettableOnce<Arc<Vec<MountEntry>>>,
    distro: ResettableOnce<String>,
}

impl MountTableTranslator {
    pub fn new(source: Arc<dyn MountSource>) -> Self {
        Self {
            source,
            mount_root: DEFAULT_MOUNT_ROOT.to_string(),
            distro_override: None,
            mounts: ResettableOnce::new(),
            distro: ResettableOnce::new(),
        }
    }

    /// Translator over the live `/proc/mounts`.
    pub fn system() -> Self {
        Self::new(Arc::new(ProcMounts))
    }

    /// Use a fixed distro name instead of `WSL_DISTRO_NAME`.
    pub fn with_distro_name(mut self, distro: impl Into<String>) -> Self {
        self.distro_override = Some(distro.into());
        self
    }

    /// Directory under which drive letters are mounted. Normalised to end in `/`.
    pub fn with_mount_root(mut self, root: impl Into<String>) -> Self {
        let mut root = root.into();
        if !root.ends_with('/') {
            root.push('/');
        }
        self.mount_root = root;
        self
    }

    /// Forget the cached mount table and distro name.
    pub fn reset(&self) {
        self.mounts.reset();
        self.distro.reset();
    }

    pub fn mounts(&self) -> Arc<Vec<MountEntry>> {
        self.mounts.get_or_init(|| match self.source.read_mounts() {
            Ok(content) => {
                let entries = MountEntry::parse_table(&content, &self.mount_root);
                debug!(drives = entries.len(), "parsed mount table");
                Arc::new(entries)
            }
            Err(error) => {
                warn!(%error, "mount table unreadable; every path will map to the distro share");
                Arc::new(Vec::new())
            }
        })
    }

    fn distro_name(&self) -> String {
        self.distro.get_or_init(|| {
            self.distro_override
                .clone()
                .or_else(|| std::env::var(DISTRO_ENV).ok().filter(|name| !name.is_empty()))
                .unwrap_or_else(|| DEFAULT_DISTRO.to_string())
        })
    }

    fn absolute(native_path: &str) -> Result<String, PathError> {
        if native_path.starts_with('/') {
            return Ok(native_path.to_string());
        }
        let cwd = std::env::current_dir().map_err(|error| PathError::Relative {
            path: native_path.to_string(),
            reason: error.to_string(),
        })?;
        Ok(format!("{}/{native_path}", cwd.to_string_lossy()))
    }

    fn host_path_for(&self, cleaned: &str) -> String {
        for mount in self.mounts().iter() {
            if cleaned == mount.mount_point {
                return format!("{}:\\", mount.drive_letter);
            }
            if let Some(rest) = cleaned
                .strip_prefix(mount.mount_point.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                return format!("{}:\\{}", mount.drive_letter, to_backslashes(rest));
            }
        }
        format!("{UNC_LOCALHOST}{}{}", self.distro_name(), to_backslashes(cleaned))
    }

    fn native_path_for(&self, host_path: &str) -> Result<String, PathError> {
        if let Some(rest) = host_path
            .strip_prefix(UNC_LOCALHOST)
            .or_else(|| host_path.strip_prefix(UNC_LEGACY))
        {
            // Skip the distro component.
            return Ok(match rest.find('\\') {
                Some(index) => clean_native_path(&to_forward_slashes(&rest[index..])),
                None => "/".to_string(),
            });
        }

        let mut chars = host_path.chars();
        if let (Some(letter), Some(':')) = (chars.next(), chars.next())
            && letter.is_ascii_alphabetic()
        {
            let drive = format!("{}{}", self.mount_root, letter.to_ascii_lowercase());
            let rest = chars.as_str();
            let rest = rest.strip_prefix('\\').unwrap_or(rest);
            if rest.is_empty() {
                return Ok(drive);
            }
            return Ok(clean_native_path(&format!("{drive}/{}", to_forward_slashes(rest))));
        }

        Err(PathError::UnrecognizedHostPath(host_path.to_string()))
    }
}

impl PathTranslator for MountTableTranslator {
    fn to_host_path(&self, native_path: &str) -> Result<String, PathError> {
        if native_path.is_empty() {
            return Err(PathError::Empty);
        }
        let cleaned = clean_native_path(&Self::absolute(native_path)?);
        Ok(self.host_path_for(&cleaned))
    }

    fn to_native_path(&self, host_path: &str) -> Result<String, PathError> {
        if host_path.is_empty() {
            return Err(PathError::Empty);
        }
        self.native_path_for(host_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MOUNTS: &str = "\
none /mnt/wsl tmpfs rw,relatime 0 0
C:\\ /mnt/c 9p rw,dirsync,noatime,aname=drvfs;path=C:\\;uid=1000 0 0
drvfs /mnt/d drvfs rw,noatime 0 0
/dev/sdc / ext4 rw,relatime,discard 0 0
tools /mnt/tools 9p rw 0 0
";

    fn translator() -> MountTableTranslator {
        MountTableTranslator::new(Arc::new(StaticMounts(MOUNTS.to_string())))
            .with_distro_name("Ubuntu")
    }

    #[test]
    fn parses_only_single_letter_drive_mounts() {
        let entries = MountEntry::parse_table(MOUNTS, "/mnt/");
        assert_eq!(
            entries,
            vec![
                MountEntry {
                    drive_letter: 'C',
                    mount_point: "/mnt/c".to_string()
                },
                MountEntry {
                    drive_letter: 'D',
                    mount_point: "/mnt/d".to_string()
                },
            ]
        );
    }

    #[test]
    fn translates_drive_mounts_and_distro_paths() {
        let translator = translator();
        let cases = [
            ("/mnt/c", r"C:\"),
            ("/mnt/c/Users/test", r"C:\Users\test"),
            ("/mnt/d/data/../logs/./today", r"D:\logs\today"),
            ("/home/user", r"\\wsl.localhost\Ubuntu\home\user"),
            ("/", r"\\wsl.localhost\Ubuntu\"),
            ("/mnt/cdrom/x", r"\\wsl.localhost\Ubuntu\mnt\cdrom\x"),
        ];
        for (native, host) in cases {
            assert_eq!(translator.to_host_path(native).unwrap(), host, "{native}");
        }
    }

    #[test]
    fn translates_host_paths_back() {
        let translator = translator();
        let cases = [
            (r"C:\Users\test", "/mnt/c/Users/test"),
            (r"C:\", "/mnt/c"),
            ("D:", "/mnt/d"),
            (r"c:\a\..\b", "/mnt/c/b"),
            (r"\\wsl.localhost\Ubuntu\home\user", "/home/user"),
            (r"\\wsl$\Debian\etc\.\hosts", "/etc/hosts"),
            (r"\\wsl.localhost\Ubuntu", "/"),
        ];
        for (host, native) in cases {
            assert_eq!(translator.to_native_path(host).unwrap(), native, "{host}");
        }
    }

    #[test]
    fn rejects_empty_and_unknown_paths() {
        let translator = translator();
        assert_eq!(translator.to_host_path(""), Err(PathError::Empty));
        assert_eq!(translator.to_native_path(""), Err(PathError::Empty));
        assert!(matches!(
            translator.to_native_path("relative\\dir"),
            Err(PathError::UnrecognizedHostPath(_))
        ));
    }

    #[test]
    fn round_trip_matches_cleaned_input() {
        let translator = translator();
        for native in [
            "/home/user/project",
            "/home/user/../shared/./file.txt",
            "/mnt/c/Windows/System32",
            "/mnt/d",
            "/var//log/",
            "/",
        ] {
            let host = translator.to_host_path(native).unwrap();
            assert_eq!(
                translator.to_native_path(&host).unwrap(),
                clean_native_path(native),
                "{native} via {host}"
            );
        }
    }

    #[test]
    fn relative_paths_resolve_against_current_dir() {
        let translator = translator();
        let cwd = std::env::current_dir().unwrap();
        let expected = translator
            .to_host_path(&format!("{}/notes.txt", cwd.to_string_lossy()))
            .unwrap();
        assert_eq!(translator.to_host_path("./notes.txt").unwrap(), expected);
    }

    #[derive(Debug)]
    struct FailingMounts;

    impl MountSource for FailingMounts {
        fn read_mounts(&self) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no procfs"))
        }
    }

    #[test]
    fn unreadable_mount_table_falls_back_to_distro_share() {
        let translator =
            MountTableTranslator::new(Arc::new(FailingMounts)).with_distro_name("Arch");
        assert_eq!(
            translator.to_host_path("/mnt/c/x").unwrap(),
            r"\\wsl.localhost\Arch\mnt\c\x"
        );
    }

    #[test]
    fn custom_mount_root_is_honoured() {
        let translator = MountTableTranslator::new(Arc::new(StaticMounts(
            "C:\\ /c 9p rw 0 0\n".to_string(),
        )))
        .with_mount_root("/")
        .with_distro_name("Ubuntu");
        assert_eq!(translator.to_host_path("/c/tmp").unwrap(), r"C:\tmp");
        assert_eq!(translator.to_native_path(r"C:\tmp").unwrap(), "/c/tmp");
    }
}
