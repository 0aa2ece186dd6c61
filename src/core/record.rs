//! Build records
//!
//! One small binary record per package under `pkginfo/` tracks how far the
//! package got through fetch, configure, build and install. Records are
//! rewritten after every completed stage so that an interrupted run resumes
//! where it stopped.
//!
//! Layout (little-endian):
//!
//! ```text
//! 0   magic "SKRC"
//! 4   format version
//! 5   state
//! 6   cross compiled flag
//! 7   reserved
//! 8   packed version (u32)
//! 12  configured/built/installed stamps (u64 secs + u32 nanos each)
//! 48  triplet length (u32)
//! 52  triplet bytes
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::config::defaults;
use crate::core::config::Config;
use crate::core::version::Version;
use crate::error::RecordError;

const MAGIC: &[u8; 4] = b"SKRC";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 52;

/// How far a package has progressed, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum BuildState {
    #[default]
    Clean = 0,
    Fetched = 1,
    Configured = 2,
    Built = 3,
    Installed = 4,
}

impl BuildState {
    /// All states in order
    pub const ALL: [Self; 5] = [
        Self::Clean,
        Self::Fetched,
        Self::Configured,
        Self::Built,
        Self::Installed,
    ];

    fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Fetched => "fetched",
            Self::Configured => "configured",
            Self::Built => "built",
            Self::Installed => "installed",
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted build progress of one package
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildRecord {
    pub state: BuildState,
    pub configured_at: Option<SystemTime>,
    pub built_at: Option<SystemTime>,
    pub installed_at: Option<SystemTime>,
    /// Version the package was built at
    pub version: Version,
    /// Triplet the package was built for
    pub host_triplet: String,
    /// Whether the package was built while cross compiling
    pub cross_compiled: bool,
}

impl BuildRecord {
    /// A record for a package nothing has been done for
    pub fn clean() -> Self {
        Self::default()
    }

    /// Forget all progress
    pub fn reset(&mut self) {
        *self = Self::clean();
    }

    /// Record completion of the stage that leads to `state`
    pub fn complete(
        &mut self,
        state: BuildState,
        at: SystemTime,
        version: Version,
        triplet: &str,
        cross_compiled: bool,
    ) {
        self.state = state;
        match state {
            BuildState::Configured => self.configured_at = Some(at),
            BuildState::Built => self.built_at = Some(at),
            BuildState::Installed => self.installed_at = Some(at),
            BuildState::Clean | BuildState::Fetched => {}
        }
        self.version = version;
        self.host_triplet = triplet.to_string();
        self.cross_compiled = cross_compiled;
    }

    /// Most recent stage stamp
    pub fn newest_stamp(&self) -> Option<SystemTime> {
        [self.configured_at, self.built_at, self.installed_at]
            .into_iter()
            .flatten()
            .max()
    }

    /// Serialize into the on-disk layout
    pub fn encode(&self) -> Vec<u8> {
        let triplet = self.host_triplet.as_bytes();
        let mut out = Vec::with_capacity(HEADER_LEN + triplet.len());

        out.extend_from_slice(MAGIC);
        out.push(FORMAT_VERSION);
        out.push(self.state as u8);
        out.push(u8::from(self.cross_compiled));
        out.push(0);
        out.extend_from_slice(&self.version.packed().to_le_bytes());
        for stamp in [self.configured_at, self.built_at, self.installed_at] {
            let since_epoch = stamp
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .unwrap_or_default();
            out.extend_from_slice(&since_epoch.as_secs().to_le_bytes());
            out.extend_from_slice(&since_epoch.subsec_nanos().to_le_bytes());
        }
        // Triplets are short; anything past u32::MAX is truncated by the length prefix.
        let len = u32::try_from(triplet.len()).unwrap_or(u32::MAX);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(triplet);
        out
    }
}

/// Fields exactly as stored, before any integrity check
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawRecord {
    format: u8,
    state: u8,
    cross: u8,
    version: u32,
    stamps: [Option<SystemTime>; 3],
    triplet: String,
}

impl RawRecord {
    fn decode(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("record is truncated ({} bytes)", bytes.len()));
        }
        if &bytes[0..4] != MAGIC {
            return Err("bad magic".to_string());
        }

        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let u64_at = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(buf)
        };

        let mut stamps = [None; 3];
        for (i, stamp) in stamps.iter_mut().enumerate() {
            let at = 12 + i * 12;
            let (secs, nanos) = (u64_at(at), u32_at(at + 8));
            if secs == 0 && nanos == 0 {
                continue;
            }
            if nanos >= 1_000_000_000 {
                return Err(format!("invalid timestamp nanoseconds {nanos}"));
            }
            *stamp = Some(
                UNIX_EPOCH
                    .checked_add(Duration::new(secs, nanos))
                    .ok_or_else(|| "timestamp out of range".to_string())?,
            );
        }

        let len = u32_at(48) as usize;
        let triplet = bytes
            .get(HEADER_LEN..)
            .filter(|rest| rest.len() == len)
            .ok_or_else(|| format!("triplet length {len} does not match record size"))?;
        let triplet = String::from_utf8(triplet.to_vec())
            .map_err(|_| "triplet is not valid UTF-8".to_string())?;

        Ok(Self {
            format: bytes[4],
            state: bytes[5],
            cross: bytes[6],
            version: u32_at(8),
            stamps,
            triplet,
        })
    }

    /// Convert without checks; fails only when the state is unrepresentable
    fn into_record(self) -> Result<BuildRecord, String> {
        let state = BuildState::from_byte(self.state)
            .ok_or_else(|| format!("state {} is past installed", self.state))?;
        let [configured_at, built_at, installed_at] = self.stamps;
        Ok(BuildRecord {
            state,
            configured_at,
            built_at,
            installed_at,
            version: Version::from_packed(self.version),
            host_triplet: self.triplet,
            cross_compiled: self.cross != 0,
        })
    }
}

/// Reads and writes build records in the pkginfo directory
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
    host_triplet: String,
    target_triplet: String,
    cross_compiling: bool,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>, host_triplet: &str, target_triplet: &str) -> Self {
        Self {
            dir: dir.into(),
            host_triplet: host_triplet.to_string(),
            target_triplet: target_triplet.to_string(),
            cross_compiling: host_triplet != target_triplet,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.dirs.pkginfo,
            &config.host_triplet,
            &config.target_triplet,
        )
    }

    /// Record file of a package
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{name}.{}", defaults::RECORD_EXTENSION))
    }

    /// Read the record of `name`, creating a clean one if none exists.
    ///
    /// A structurally inconsistent record is an error that must stop the run.
    /// A record built for a different triplet or cross mode is returned as a
    /// clean record so the package gets rebuilt.
    pub fn read(&self, name: &str) -> Result<BuildRecord, RecordError> {
        let path = self.path(name);
        let Some(bytes) = read_optional(&path)? else {
            let record = BuildRecord::clean();
            self.write(name, &record)?;
            return Ok(record);
        };

        let corrupt = |reason: String| RecordError::Corrupt {
            package: name.to_string(),
            reason,
        };

        let raw = RawRecord::decode(&bytes).map_err(corrupt)?;
        if raw.format != FORMAT_VERSION {
            return Err(RecordError::Outdated {
                package: name.to_string(),
            });
        }
        if raw.cross > 1 {
            return Err(corrupt(format!("cross compiled flag is {}", raw.cross)));
        }

        let now = SystemTime::now();
        if raw.stamps.iter().flatten().any(|stamp| *stamp > now) {
            return Err(corrupt("timestamp lies in the future".to_string()));
        }

        let mut record = raw.into_record().map_err(corrupt)?;
        if record.state >= BuildState::Configured && record.host_triplet.is_empty() {
            return Err(RecordError::Outdated {
                package: name.to_string(),
            });
        }

        if record.state > BuildState::Configured
            && record.host_triplet != self.host_triplet
            && record.host_triplet != self.target_triplet
        {
            warn!(
                "Package '{}' was built for '{}', rebuilding for '{}'",
                name, record.host_triplet, self.target_triplet
            );
            record.reset();
        } else if record.state >= BuildState::Configured
            && record.cross_compiled != self.cross_compiling
        {
            return Err(RecordError::CrossModeMismatch {
                package: name.to_string(),
                recorded: record.cross_compiled,
                current: self.cross_compiling,
            });
        }

        Ok(record)
    }

    /// Decode whatever is on disk without checking it; never creates a record
    pub fn read_unvalidated(&self, name: &str) -> Result<Option<BuildRecord>, RecordError> {
        let Some(bytes) = read_optional(&self.path(name))? else {
            return Ok(None);
        };

        RawRecord::decode(&bytes)
            .and_then(RawRecord::into_record)
            .map(Some)
            .map_err(|reason| RecordError::Corrupt {
                package: name.to_string(),
                reason,
            })
    }

    /// Persist a record, replacing the old one atomically
    pub fn write(&self, name: &str, record: &BuildRecord) -> Result<(), RecordError> {
        let io_error = |path: &Path, e: std::io::Error| RecordError::IoError {
            path: path.to_path_buf(),
            error: e.to_string(),
        };

        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;

        let path = self.path(name);
        let tmp = path.with_extension(format!("{}.tmp", defaults::RECORD_EXTENSION));
        fs::write(&tmp, record.encode()).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;

        debug!("Wrote record of '{}': {}", name, record.state);
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, RecordError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RecordError::IoError {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}
