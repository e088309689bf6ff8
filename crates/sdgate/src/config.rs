//! Command line parsing and the validated gateway configuration.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, ValueEnum};
use sdgate_core::store::StoreSpec;
use sdgate_proto::constants::{
    SD_DEFAULT_BLOCK_SIZE_SHIFT, SD_DEFAULT_COPIES, SD_FORMAT_VERSION, SD_LISTEN_PORT,
    SD_MAX_BLOCK_SIZE_SHIFT, SD_MAX_COPIES, SD_MIN_BLOCK_SIZE_SHIFT,
};
use sdgate_proto::defaults::*;

/// Invalid command line or configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one --store is required")]
    NoStores,
    #[error("copies must be between 1 and {max}, got {got}")]
    Copies { got: u8, max: u8 },
    #[error("block size shift must be between 20 and 31, got {0}")]
    BlockSizeShift(u8),
    #[error("allowed write failures ({allowed}) must be below copies ({copies})")]
    AllowedFailures { allowed: usize, copies: u8 },
    #[error("{0} must be positive")]
    Zero(&'static str),
}

/// Storage backend variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Objects replicated over local directories
    Filesystem,
}

/// Handle cache variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheKind {
    None,
    Lru,
}

/// Cluster lifecycle driver variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClusterKind {
    /// No coordination at all
    None,
    /// Single node, guarded by a lock file in the work directory
    Local,
}

/// Storage gateway speaking the sheepdog client protocol
#[derive(Parser, Debug)]
#[command(name = "sdgate", version, about = "Sheepdog protocol storage gateway")]
pub struct Args {
    /// Listen address
    #[arg(short = 'b', long, default_value = DEFAULT_BIND_ADDR)]
    pub bind_addr: String,

    /// Listen port
    #[arg(short = 'p', long, default_value_t = SD_LISTEN_PORT)]
    pub port: u16,

    /// Storage location as PATH or PATH:WEIGHT (weight 0 derives it from capacity).
    /// Can be specified multiple times.
    #[arg(short = 's', long = "store", value_name = "PATH[:WEIGHT]", value_parser = parse_store_spec)]
    pub stores: Vec<StoreSpec>,

    /// Storage backend
    #[arg(long, value_enum, default_value_t = BackendKind::Filesystem)]
    pub backend: BackendKind,

    /// Default number of replicas
    #[arg(short = 'c', long, default_value_t = SD_DEFAULT_COPIES)]
    pub copies: u8,

    /// Object size as a power of two
    #[arg(long, default_value_t = SD_DEFAULT_BLOCK_SIZE_SHIFT)]
    pub block_size_shift: u8,

    /// Reported cluster format version (0 starts unformatted)
    #[arg(long, default_value_t = SD_FORMAT_VERSION)]
    pub cluster_version: u8,

    /// Replica writes allowed to fail before a write is rejected
    #[arg(long, default_value_t = DEFAULT_ALLOWED_WRITE_FAILURES)]
    pub allowed_write_failures: usize,

    /// File handle cache
    #[arg(long, value_enum, default_value_t = CacheKind::None)]
    pub cache: CacheKind,

    /// Handle cache size in entries
    #[arg(long, default_value_t = DEFAULT_CACHE_ENTRIES)]
    pub cache_size: usize,

    /// Cluster lifecycle driver
    #[arg(long, value_enum, default_value_t = ClusterKind::None)]
    pub cluster_driver: ClusterKind,

    /// Directory for the cluster driver's runtime files
    #[arg(short = 'w', long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Seconds to read a payload or write a response
    #[arg(long, default_value_t = DEFAULT_IO_TIMEOUT_SECS)]
    pub io_timeout: u64,

    /// Seconds a connection may idle between requests
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    pub idle_timeout: u64,

    /// Seconds open connections get to finish on shutdown
    #[arg(long, default_value_t = DEFAULT_DRAIN_TIMEOUT_SECS)]
    pub drain_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,
}

/// Parse `PATH[:WEIGHT]`. A suffix that is not a number is part of the path.
pub fn parse_store_spec(s: &str) -> Result<StoreSpec, String> {
    if s.is_empty() {
        return Err("empty store path".to_string());
    }
    if let Some((path, weight)) = s.rsplit_once(':') {
        if let Ok(weight) = weight.parse::<u64>() {
            if path.is_empty() {
                return Err(format!("missing path in {:?}", s));
            }
            return Ok(StoreSpec {
                path: PathBuf::from(path),
                weight,
            });
        }
    }
    Ok(StoreSpec {
        path: PathBuf::from(s),
        weight: 0,
    })
}

/// Static cluster parameters reported to clients.
///
/// Built once at startup and never changed; there is no online format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub epoch: u32,
    /// Creation time, seconds since the Unix epoch
    pub ctime: u64,
    pub nr_copies: u8,
    pub copy_policy: u8,
    pub block_size_shift: u8,
    /// Format version; 0 means unformatted
    pub version: u8,
    pub flags: u16,
}

impl ClusterConfig {
    pub fn is_formatted(&self) -> bool {
        self.version != 0
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            epoch: DEFAULT_EPOCH,
            ctime: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            nr_copies: SD_DEFAULT_COPIES,
            copy_policy: 0,
            block_size_shift: SD_DEFAULT_BLOCK_SIZE_SHIFT,
            version: SD_FORMAT_VERSION,
            flags: 0,
        }
    }
}

/// Validated gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub port: u16,
    pub stores: Vec<StoreSpec>,
    pub backend: BackendKind,
    pub cluster: ClusterConfig,
    pub allowed_write_failures: usize,
    pub cache: CacheKind,
    pub cache_size: usize,
    pub cluster_driver: ClusterKind,
    pub work_dir: PathBuf,
    pub io_timeout: Duration,
    pub idle_timeout: Duration,
    pub drain_timeout: Duration,
    pub max_payload: u32,
}

impl GatewayConfig {
    /// Configuration with default settings over `stores`.
    pub fn new(stores: Vec<StoreSpec>) -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: SD_LISTEN_PORT,
            stores,
            backend: BackendKind::Filesystem,
            cluster: ClusterConfig::default(),
            allowed_write_failures: DEFAULT_ALLOWED_WRITE_FAILURES,
            cache: CacheKind::None,
            cache_size: DEFAULT_CACHE_ENTRIES,
            cluster_driver: ClusterKind::None,
            work_dir: PathBuf::from("."),
            io_timeout: Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stores.is_empty() {
            return Err(ConfigError::NoStores);
        }
        let copies = self.cluster.nr_copies;
        if copies == 0 || copies > SD_MAX_COPIES {
            return Err(ConfigError::Copies {
                got: copies,
                max: SD_MAX_COPIES,
            });
        }
        let shift = self.cluster.block_size_shift;
        if !(SD_MIN_BLOCK_SIZE_SHIFT..=SD_MAX_BLOCK_SIZE_SHIFT).contains(&shift) {
            return Err(ConfigError::BlockSizeShift(shift));
        }
        if self.allowed_write_failures >= copies as usize {
            return Err(ConfigError::AllowedFailures {
                allowed: self.allowed_write_failures,
                copies,
            });
        }
        if self.cache == CacheKind::Lru && self.cache_size == 0 {
            return Err(ConfigError::Zero("cache size"));
        }
        if self.io_timeout.is_zero() {
            return Err(ConfigError::Zero("io timeout"));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Zero("idle timeout"));
        }
        Ok(())
    }
}

impl TryFrom<Args> for GatewayConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let config = GatewayConfig {
            bind_addr: args.bind_addr,
            port: args.port,
            backend: args.backend,
            cluster: ClusterConfig {
                nr_copies: args.copies,
                block_size_shift: args.block_size_shift,
                version: args.cluster_version,
                ..ClusterConfig::default()
            },
            allowed_write_failures: args.allowed_write_failures,
            cache: args.cache,
            cache_size: args.cache_size,
            cluster_driver: args.cluster_driver,
            work_dir: args.work_dir,
            io_timeout: Duration::from_secs(args.io_timeout),
            idle_timeout: Duration::from_secs(args.idle_timeout),
            drain_timeout: Duration::from_secs(args.drain_timeout),
            ..GatewayConfig::new(args.stores)
        };
        config.validate()?;
        Ok(config)
    }
}
