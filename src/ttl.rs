//! TTL classes and the policy table that resolves them to durations.
//!
//! Call sites name a [`TtlClass`]; only [`TtlPolicy`] knows the concrete
//! durations, so they can change without touching any caller.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::{HoardError, Result};

/// Symbolic cache lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlClass {
    /// Frequently-changing lists. Default: 5 minutes.
    Short,
    /// Dashboard counters and KPIs. Default: 10 minutes.
    Dashboard,
    /// Paginated or searchable views. Default: 30 minutes.
    Medium,
    /// Slow-changing aggregates. Default: 2 hours.
    Long,
    /// Near-static reference data, kept until explicitly invalidated.
    Durable,
    /// One-off raw duration.
    Custom(Duration),
}

impl TtlClass {
    /// The named classes, in ascending lifetime order.
    pub const NAMED: [TtlClass; 5] = [
        TtlClass::Short,
        TtlClass::Dashboard,
        TtlClass::Medium,
        TtlClass::Long,
        TtlClass::Durable,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TtlClass::Short => "short",
            TtlClass::Dashboard => "dashboard",
            TtlClass::Medium => "medium",
            TtlClass::Long => "long",
            TtlClass::Durable => "durable",
            TtlClass::Custom(_) => "custom",
        }
    }
}

impl fmt::Display for TtlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtlClass::Custom(d) => write!(f, "{}s", d.as_secs()),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for TtlClass {
    type Err = HoardError;

    /// Parses a class name, or a raw second count (`"90"` / `"90s"`).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "short" => Ok(TtlClass::Short),
            "dashboard" => Ok(TtlClass::Dashboard),
            "medium" => Ok(TtlClass::Medium),
            "long" => Ok(TtlClass::Long),
            "durable" => Ok(TtlClass::Durable),
            other => other
                .strip_suffix('s')
                .unwrap_or(other)
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(|secs| TtlClass::Custom(Duration::from_secs(secs)))
                .ok_or_else(|| HoardError::UnknownTtlClass(s.to_owned())),
        }
    }
}

impl<'de> Deserialize<'de> for TtlClass {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Class → duration table.
///
/// Deserializes from seconds per class; unknown fields are rejected so a
/// misspelled class name fails at startup.
///
/// ```rust
/// # use hoard::{TtlClass, TtlPolicy};
/// # use std::time::Duration;
/// let policy = TtlPolicy::default().with(TtlClass::Short, Duration::from_secs(120));
/// assert_eq!(policy.resolve(TtlClass::Short), Some(Duration::from_secs(120)));
/// assert_eq!(policy.resolve(TtlClass::Durable), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TtlPolicy {
    #[serde(rename = "short_secs", with = "secs")]
    pub short: Duration,
    #[serde(rename = "dashboard_secs", with = "secs")]
    pub dashboard: Duration,
    #[serde(rename = "medium_secs", with = "secs")]
    pub medium: Duration,
    #[serde(rename = "long_secs", with = "secs")]
    pub long: Duration,
    /// `None` keeps durable entries until they are invalidated.
    #[serde(rename = "durable_secs", with = "opt_secs")]
    pub durable: Option<Duration>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(5 * 60),
            dashboard: Duration::from_secs(10 * 60),
            medium: Duration::from_secs(30 * 60),
            long: Duration::from_secs(2 * 3600),
            durable: None,
        }
    }
}

impl TtlPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the duration for one named class (builder pattern).
    ///
    /// Setting `Durable` bounds durable entries; `Custom` is ignored since
    /// it carries its own duration.
    pub fn with(mut self, class: TtlClass, ttl: Duration) -> Self {
        match class {
            TtlClass::Short => self.short = ttl,
            TtlClass::Dashboard => self.dashboard = ttl,
            TtlClass::Medium => self.medium = ttl,
            TtlClass::Long => self.long = ttl,
            TtlClass::Durable => self.durable = Some(ttl),
            TtlClass::Custom(_) => {}
        }
        self
    }

    /// Resolve a class to its store expiry. `None` means no expiry.
    pub fn resolve(&self, class: TtlClass) -> Option<Duration> {
        match class {
            TtlClass::Short => Some(self.short),
            TtlClass::Dashboard => Some(self.dashboard),
            TtlClass::Medium => Some(self.medium),
            TtlClass::Long => Some(self.long),
            TtlClass::Durable => self.durable,
            TtlClass::Custom(d) => Some(d),
        }
    }

    /// Reject zero durations; a zero TTL would make every write a miss.
    pub fn validate(&self) -> Result<()> {
        for class in TtlClass::NAMED {
            if self.resolve(class) == Some(Duration::ZERO) {
                return Err(HoardError::Configuration(format!(
                    "TTL class '{class}' resolves to zero"
                )));
            }
        }
        Ok(())
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|o| o.map(Duration::from_secs))
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
