use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use udcn_common::*;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FwConfig {
    pub pcct: PcctConfig,
    pub pit: PitConfig,
    pub cs: CsConfig,
    pub fwd: FwdConfig,
    pub input: InputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcctConfig {
    /// PCC entries per forwarding core
    pub capacity: usize,
    /// Extension blocks shared by long keys and PIT record overflow
    pub key_ext_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitConfig {
    pub max_lifetime_ms: u64,
    pub dn_inline: usize,
    pub up_inline: usize,
    pub dn_ext: usize,
    pub up_ext: usize,
    pub max_ext_hops: usize,
    pub rejected_nonces: usize,
    pub suppress_min_ms: u64,
    pub suppress_max_ms: u64,
    pub suppress_multiplier: f64,
    pub timer_slot_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsConfig {
    /// ARC capacity `c`, in direct entries holding Data
    pub capacity: usize,
    pub indirect_capacity: usize,
    pub evict_bulk: usize,
    pub max_indirects: usize,
    /// Disk slots; 0 disables the disk tier
    pub disk_slots: u64,
    pub disk_slot_size: usize,
    /// Slot file prefix; the disk tier is kept in memory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FwdConfig {
    pub n_cores: usize,
    pub burst_size: usize,
    pub input_ring_capacity: usize,
    pub default_strategy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Name components hashed by the NDT
    pub ndt_prefix_len: usize,
    /// log2 of the NDT bucket count
    pub ndt_bits: u32,
}

impl Default for PcctConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_PCCT_CAPACITY,
            key_ext_capacity: DEFAULT_PCCT_EXT_CAPACITY,
        }
    }
}

impl Default for PitConfig {
    fn default() -> Self {
        Self {
            max_lifetime_ms: PIT_MAX_LIFETIME_MS,
            dn_inline: PIT_DN_INLINE,
            up_inline: PIT_UP_INLINE,
            dn_ext: PIT_DN_EXT,
            up_ext: PIT_UP_EXT,
            max_ext_hops: PIT_MAX_EXT_HOPS,
            rejected_nonces: PIT_UP_REJECTED_NONCES,
            suppress_min_ms: PIT_SUPPRESS_MIN_MS,
            suppress_max_ms: PIT_SUPPRESS_MAX_MS,
            suppress_multiplier: PIT_SUPPRESS_MULTIPLIER,
            timer_slot_ms: 10,
        }
    }
}

impl Default for CsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CS_CAPACITY,
            indirect_capacity: DEFAULT_CS_INDIRECT_CAPACITY,
            evict_bulk: CS_EVICT_BULK,
            max_indirects: CS_MAX_INDIRECTS,
            disk_slots: 0,
            disk_slot_size: 8192,
            disk_path: None,
        }
    }
}

impl Default for FwdConfig {
    fn default() -> Self {
        Self {
            n_cores: 1,
            burst_size: 64,
            input_ring_capacity: 4096,
            default_strategy: "multicast".to_string(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            ndt_prefix_len: 2,
            ndt_bits: 16,
        }
    }
}

impl PitConfig {
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_millis(self.max_lifetime_ms)
    }

    pub fn timer_slot(&self) -> Duration {
        Duration::from_millis(self.timer_slot_ms)
    }
}

impl FwConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config = Self::from_toml(&contents).with_context(|| format!("loading {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: FwConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pcct.capacity == 0 {
            return Err(ConfigError::invalid("pcct", "capacity", "must be positive"));
        }

        let pit = &self.pit;
        for (field, value) in [
            ("dn_inline", pit.dn_inline),
            ("up_inline", pit.up_inline),
            ("dn_ext", pit.dn_ext),
            ("up_ext", pit.up_ext),
            ("rejected_nonces", pit.rejected_nonces),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid("pit", field, "must be positive"));
            }
        }
        if pit.max_lifetime_ms == 0 {
            return Err(ConfigError::invalid("pit", "max_lifetime_ms", "must be positive"));
        }
        if pit.timer_slot_ms == 0 || pit.timer_slot_ms > pit.max_lifetime_ms {
            return Err(ConfigError::invalid(
                "pit",
                "timer_slot_ms",
                "must be between 1 and max_lifetime_ms",
            ));
        }
        if pit.suppress_min_ms > pit.suppress_max_ms {
            return Err(ConfigError::invalid("pit", "suppress_min_ms", "exceeds suppress_max_ms"));
        }
        if pit.suppress_multiplier.is_nan() || pit.suppress_multiplier < 1.0 {
            return Err(ConfigError::invalid("pit", "suppress_multiplier", "must be at least 1.0"));
        }

        let cs = &self.cs;
        if cs.capacity == 0 {
            return Err(ConfigError::invalid("cs", "capacity", "must be positive"));
        }
        if cs.evict_bulk == 0 {
            return Err(ConfigError::invalid("cs", "evict_bulk", "must be positive"));
        }
        if cs.disk_slots > 0 && cs.disk_slot_size < 64 {
            return Err(ConfigError::invalid("cs", "disk_slot_size", "must be at least 64"));
        }

        let fwd = &self.fwd;
        if fwd.n_cores == 0 || fwd.n_cores > MAX_FWD_CORES {
            return Err(ConfigError::invalid(
                "fwd",
                "n_cores",
                format!("must be between 1 and {}", MAX_FWD_CORES),
            ));
        }
        if fwd.burst_size == 0 {
            return Err(ConfigError::invalid("fwd", "burst_size", "must be positive"));
        }
        if fwd.input_ring_capacity == 0 {
            return Err(ConfigError::invalid("fwd", "input_ring_capacity", "must be positive"));
        }

        if self.input.ndt_bits == 0 || self.input.ndt_bits > 24 {
            return Err(ConfigError::invalid("input", "ndt_bits", "must be between 1 and 24"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FwConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pit.up_inline, PIT_UP_INLINE);
        assert_eq!(config.cs.max_indirects, CS_MAX_INDIRECTS);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FwConfig::from_toml(
            r#"
            [cs]
            capacity = 4

            [fwd]
            n_cores = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.cs.capacity, 4);
        assert_eq!(config.cs.evict_bulk, CS_EVICT_BULK);
        assert_eq!(config.fwd.n_cores, 3);
        assert_eq!(config.pit, PitConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = FwConfig::default();
        config.pit.suppress_min_ms = 500;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "suppress_min_ms", .. })
        ));

        let mut config = FwConfig::default();
        config.fwd.n_cores = 300;
        assert!(config.validate().is_err());

        assert!(FwConfig::from_toml("[cs]\ncapacity = 0\n").is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FwConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, FwConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.toml");
        let mut config = FwConfig::default();
        config.input.ndt_prefix_len = 3;
        config.cs.disk_slots = 128;
        config.save(&path).unwrap();
        assert_eq!(FwConfig::load(&path).unwrap(), config);
    }
}
