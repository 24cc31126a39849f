use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The agent health metrics evaluated by the confluence engine.
///
/// # Examples
///
/// ```
/// use oxsignal_common::types::MetricType;
///
/// let metric: MetricType = "memory".parse().unwrap();
/// assert_eq!(metric, MetricType::Memory);
/// assert_eq!(metric.to_string(), "memory");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Cpu,
    Memory,
    Disk,
}

impl MetricType {
    pub const ALL: [MetricType; 3] = [MetricType::Cpu, MetricType::Memory, MetricType::Disk];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Cpu => "cpu",
            MetricType::Memory => "memory",
            MetricType::Disk => "disk",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(MetricType::Cpu),
            "memory" | "mem" => Ok(MetricType::Memory),
            "disk" => Ok(MetricType::Disk),
            _ => Err(format!("unknown metric type: {s}")),
        }
    }
}

/// A single reading of one metric on one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub agent_id: String,
    pub metric: MetricType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregation level of a metric window: raw samples, or fixed-width
/// candles whose close is used as the window value.
///
/// Parsed from `"raw"` or a width such as `"300s"`, `"5m"`, `"1h"`, `"1d"`.
///
/// # Examples
///
/// ```
/// use oxsignal_common::types::Resolution;
///
/// let r: Resolution = "5m".parse().unwrap();
/// assert_eq!(r, Resolution::Candle { secs: 300 });
/// assert_eq!(r.to_string(), "5m");
/// assert_eq!("raw".parse::<Resolution>().unwrap(), Resolution::Raw);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Resolution {
    #[default]
    Raw,
    Candle {
        secs: u64,
    },
}

impl Resolution {
    /// Widest candle accepted when parsing (30 days).
    pub const MAX_CANDLE_SECS: u64 = 30 * 86_400;
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Resolution::Raw => f.write_str("raw"),
            Resolution::Candle { secs } if secs % 86_400 == 0 => write!(f, "{}d", secs / 86_400),
            Resolution::Candle { secs } if secs % 3_600 == 0 => write!(f, "{}h", secs / 3_600),
            Resolution::Candle { secs } if secs % 60 == 0 => write!(f, "{}m", secs / 60),
            Resolution::Candle { secs } => write!(f, "{secs}s"),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "raw" {
            return Ok(Resolution::Raw);
        }
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("resolution '{s}' is missing a unit"))?;
        let (num, unit) = s.split_at(split);
        let n: u64 = num
            .parse()
            .map_err(|_| format!("invalid resolution: {s}"))?;
        let factor = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            _ => return Err(format!("unknown resolution unit '{unit}' in {s}")),
        };
        if n == 0 {
            return Err("resolution width must be positive".to_string());
        }
        match n.checked_mul(factor) {
            Some(secs) if secs <= Resolution::MAX_CANDLE_SECS => Ok(Resolution::Candle { secs }),
            _ => Err(format!("resolution '{s}' exceeds the 30d maximum")),
        }
    }
}

impl TryFrom<String> for Resolution {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

/// An OHLC bucket of raw samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub count: usize,
}

/// Oldest-first history of one metric on one agent, as handed to the
/// indicator calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricWindow {
    pub agent_id: String,
    pub metric: MetricType,
    pub resolution: Resolution,
    pub samples: Vec<MetricSample>,
}

impl MetricWindow {
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The agent's most recent report, attached to emitted alerts for context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricSnapshot {
    pub fn value(&self, metric: MetricType) -> f64 {
        match metric {
            MetricType::Cpu => self.cpu_percent,
            MetricType::Memory => self.memory_percent,
            MetricType::Disk => self.disk_percent,
        }
    }
}

/// Alert severity, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use oxsignal_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert!(Severity::Critical > Severity::Medium);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// The kind of confluence an alert configuration looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HighUtilization,
    LowUtilization,
    RisingTrend,
    DecliningTrend,
    VolatilitySpike,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::HighUtilization => "high_utilization",
            AlertType::LowUtilization => "low_utilization",
            AlertType::RisingTrend => "rising_trend",
            AlertType::DecliningTrend => "declining_trend",
            AlertType::VolatilitySpike => "volatility_spike",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high_utilization" => Ok(AlertType::HighUtilization),
            "low_utilization" => Ok(AlertType::LowUtilization),
            "rising_trend" => Ok(AlertType::RisingTrend),
            "declining_trend" => Ok(AlertType::DecliningTrend),
            "volatility_spike" => Ok(AlertType::VolatilitySpike),
            _ => Err(format!("unknown alert type: {s}")),
        }
    }
}

/// The six indicators computed per evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Rsi,
    Stochastic,
    WilliamsR,
    Macd,
    Roc,
    Atr,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 6] = [
        IndicatorKind::Rsi,
        IndicatorKind::Stochastic,
        IndicatorKind::WilliamsR,
        IndicatorKind::Macd,
        IndicatorKind::Roc,
        IndicatorKind::Atr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Stochastic => "stochastic",
            IndicatorKind::WilliamsR => "williams_r",
            IndicatorKind::Macd => "macd",
            IndicatorKind::Roc => "roc",
            IndicatorKind::Atr => "atr",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative reading of an indicator value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    HighExtreme,
    HighModerate,
    LowExtreme,
    LowModerate,
    RisingCrossover,
    DecliningCrossover,
    RisingMomentum,
    DecliningMomentum,
    VolatilitySpike,
    Neutral,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::HighExtreme => "high_extreme",
            Signal::HighModerate => "high_moderate",
            Signal::LowExtreme => "low_extreme",
            Signal::LowModerate => "low_moderate",
            Signal::RisingCrossover => "rising_crossover",
            Signal::DecliningCrossover => "declining_crossover",
            Signal::RisingMomentum => "rising_momentum",
            Signal::DecliningMomentum => "declining_momentum",
            Signal::VolatilitySpike => "volatility_spike",
            Signal::Neutral => "neutral",
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Signal::HighExtreme | Signal::HighModerate)
    }

    pub fn is_low(&self) -> bool {
        matches!(self, Signal::LowExtreme | Signal::LowModerate)
    }

    pub fn is_rising(&self) -> bool {
        matches!(self, Signal::RisingCrossover | Signal::RisingMomentum)
    }

    pub fn is_declining(&self) -> bool {
        matches!(self, Signal::DecliningCrossover | Signal::DecliningMomentum)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery channels requested by an alert configuration. Delivery itself
/// happens outside this workspace; the flags travel with the alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRouting {
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub sms: bool,
    #[serde(default)]
    pub websocket: bool,
    #[serde(default)]
    pub browser: bool,
}

/// One indicator that agreed with an alert configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingIndicator {
    pub indicator: IndicatorKind,
    pub value: f64,
    pub signal: Signal,
    pub is_extreme: bool,
}

/// A persisted confluence alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    pub agent_id: String,
    pub configuration_id: String,
    pub configuration_name: String,
    pub alert_type: AlertType,
    pub metric: MetricType,
    pub severity: Severity,
    pub message: String,
    pub indicators: Vec<ContributingIndicator>,
    pub notifications: NotificationRouting,
    pub snapshot: MetricSnapshot,
    pub created_at: DateTime<Utc>,
}

/// What the caller of the detector gets back for each emitted alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub id: String,
    pub name: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub indicator_count: usize,
}

impl From<&AlertRecord> for AlertSummary {
    fn from(record: &AlertRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.configuration_name.clone(),
            alert_type: record.alert_type,
            severity: record.severity,
            indicator_count: record.indicators.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_parses_units() {
        assert_eq!("300s".parse::<Resolution>(), Ok(Resolution::Candle { secs: 300 }));
        assert_eq!("1h".parse::<Resolution>(), Ok(Resolution::Candle { secs: 3_600 }));
        assert_eq!("1d".parse::<Resolution>(), Ok(Resolution::Candle { secs: 86_400 }));
        assert!("0m".parse::<Resolution>().is_err());
        assert!("15".parse::<Resolution>().is_err());
        assert!("5w".parse::<Resolution>().is_err());
    }

    #[test]
    fn resolution_rejects_oversized_widths() {
        assert_eq!("30d".parse::<Resolution>(), Ok(Resolution::Candle { secs: 2_592_000 }));
        assert!("31d".parse::<Resolution>().is_err());
        assert!("999999999999999d".parse::<Resolution>().is_err());
        assert!(serde_json::from_str::<Resolution>("\"18446744073709551615h\"").is_err());
    }

    #[test]
    fn resolution_serializes_as_string() {
        let json = serde_json::to_string(&Resolution::Candle { secs: 60 }).unwrap();
        assert_eq!(json, "\"1m\"");
        let back: Resolution = serde_json::from_str("\"raw\"").unwrap();
        assert_eq!(back, Resolution::Raw);
    }

    #[test]
    fn signal_families() {
        assert!(Signal::HighModerate.is_high());
        assert!(Signal::LowExtreme.is_low());
        assert!(Signal::RisingMomentum.is_rising());
        assert!(Signal::DecliningCrossover.is_declining());
        assert!(!Signal::VolatilitySpike.is_high());
        assert!(!Signal::Neutral.is_rising());
    }

    #[test]
    fn alert_type_round_trips_through_serde_names() {
        for t in [
            AlertType::HighUtilization,
            AlertType::LowUtilization,
            AlertType::RisingTrend,
            AlertType::DecliningTrend,
            AlertType::VolatilitySpike,
        ] {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            assert_eq!(t.as_str().parse::<AlertType>(), Ok(t));
        }
    }
}
