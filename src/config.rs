use crate::constants::{DEFAULT_BASE_ADDRESS, DEFAULT_MEM_PATH, REGION_SIZE};
use crate::error::Error;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_MEM_PATH: &str = "BPMP_GUEST_MEM";
pub const ENV_BASE_ADDRESS: &str = "BPMP_GUEST_BASE";
pub const ENV_ACK_TIMEOUT_MS: &str = "BPMP_GUEST_ACK_TIMEOUT_MS";
pub const ENV_POLL_US: &str = "BPMP_GUEST_POLL_US";

/// Where the shared window lives and how long to wait on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// File the window is mapped from, /dev/mem for a physical window
    pub mem_path: PathBuf,
    /// Physical address (file offset) of the window, must be page aligned
    pub base_address: u64,
    pub region_size: usize,

    // None keeps the plain write-then-read exchange, Some switches on the
    // sequence/ack handshake and fails with Timeout once it runs out
    pub ack_timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        return ProxyConfig {
            mem_path: PathBuf::from(DEFAULT_MEM_PATH),
            base_address: DEFAULT_BASE_ADDRESS,
            region_size: REGION_SIZE,
            ack_timeout: None,
            poll_interval: Duration::from_micros(50),
        };
    }
}

fn parse_u64(name: &str, value: &str) -> Result<u64, Error> {
    let trimmed = value.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    return parsed.map_err(|err| {
        Error::InvalidArgument(format!("{}={:?} is not a number: {}", name, value, err))
    });
}

impl ProxyConfig {
    /// Defaults, overridden by whatever BPMP_GUEST_* variables are set.
    pub fn from_env() -> Result<ProxyConfig, Error> {
        return ProxyConfig::from_lookup(|name| std::env::var(name).ok());
    }

    pub fn from_lookup<F>(lookup: F) -> Result<ProxyConfig, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ProxyConfig::default();
        if let Some(path) = lookup(ENV_MEM_PATH) {
            config.mem_path = PathBuf::from(path);
        }
        if let Some(base) = lookup(ENV_BASE_ADDRESS) {
            config.base_address = parse_u64(ENV_BASE_ADDRESS, &base)?;
        }
        if let Some(timeout) = lookup(ENV_ACK_TIMEOUT_MS) {
            let ms = parse_u64(ENV_ACK_TIMEOUT_MS, &timeout)?;
            // 0 means "don't wait", same as unset
            config.ack_timeout = if ms == 0 {
                None
            } else {
                Some(Duration::from_millis(ms))
            };
        }
        if let Some(poll) = lookup(ENV_POLL_US) {
            config.poll_interval = Duration::from_micros(parse_u64(ENV_POLL_US, &poll)?);
        }
        config.validate()?;
        info!(
            "Proxy config: {} @ {:#x}, {} bytes, ack timeout {:?}",
            config.mem_path.display(),
            config.base_address,
            config.region_size,
            config.ack_timeout
        );
        return Ok(config);
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.region_size < REGION_SIZE {
            return Err(Error::InvalidArgument(format!(
                "region of {} bytes cannot hold the {} byte layout",
                self.region_size, REGION_SIZE
            )));
        }
        if self.ack_timeout.is_some() && self.poll_interval.is_zero() {
            return Err(Error::InvalidArgument(format!(
                "poll interval must be non-zero when waiting for acks"
            )));
        }
        return Ok(());
    }
}
