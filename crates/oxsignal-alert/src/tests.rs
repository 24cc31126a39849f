use crate::configuration::AlertConfiguration;
use crate::confluence::{
    analyze_confluence, evaluate_configuration, match_signal, matching_signals, severity_for_count,
};
use crate::detector::{AlertDetector, DetectorSettings};
use crate::indicator_set::{IndicatorResult, IndicatorSet};
use crate::{AlertHistory, ConfigurationSource, MetricWindowProvider};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use oxsignal_common::types::{
    AlertRecord, AlertType, IndicatorKind, MetricSample, MetricSnapshot, MetricType, MetricWindow,
    Resolution, Severity, Signal,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

// ── Fixtures ──

fn config(id: &str, alert_type: AlertType, metric: MetricType) -> AlertConfiguration {
    AlertConfiguration::from_json(&format!(
        r#"{{"id":"{id}","name":"{id} rule","alert_type":"{}","metric_type":"{}"}}"#,
        alert_type, metric
    ))
    .unwrap()
}

fn unavailable(kind: IndicatorKind) -> IndicatorResult {
    IndicatorResult {
        kind,
        value: None,
        signal: None,
        detail: None,
    }
}

/// An indicator set where only the listed indicators are available.
fn set_with(metric: MetricType, readings: &[(IndicatorKind, f64, Signal)]) -> IndicatorSet {
    let result = |kind: IndicatorKind| {
        readings
            .iter()
            .find(|(k, _, _)| *k == kind)
            .map(|&(kind, value, signal)| IndicatorResult {
                kind,
                value: Some(value),
                signal: Some(signal),
                detail: None,
            })
            .unwrap_or_else(|| unavailable(kind))
    };
    IndicatorSet {
        agent_id: "web-01".into(),
        metric,
        resolution: Resolution::Raw,
        sample_count: 30,
        latest_value: 90.0,
        rsi: result(IndicatorKind::Rsi),
        stochastic: result(IndicatorKind::Stochastic),
        williams_r: result(IndicatorKind::WilliamsR),
        macd: result(IndicatorKind::Macd),
        roc: result(IndicatorKind::Roc),
        atr: result(IndicatorKind::Atr),
    }
}

fn snapshot() -> MetricSnapshot {
    MetricSnapshot {
        cpu_percent: 91.0,
        memory_percent: 40.0,
        disk_percent: 55.0,
        timestamp: Utc::now(),
    }
}

// ── Confluence ──

#[test]
fn two_high_signals_with_min_two_is_one_low_alert() {
    let set = set_with(
        MetricType::Cpu,
        &[
            (IndicatorKind::Rsi, 75.0, Signal::HighModerate),
            (IndicatorKind::Stochastic, 85.0, Signal::HighModerate),
            (IndicatorKind::WilliamsR, -50.0, Signal::Neutral),
        ],
    );
    let cfg = config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu);

    let candidates = analyze_confluence(&set, &[cfg]);
    assert_eq!(candidates.len(), 1);
    let c = &candidates[0];
    assert_eq!(c.severity, Severity::Low);
    assert_eq!(c.indicators.len(), 2);
    assert!(c.indicators.iter().all(|i| !i.is_extreme));
    assert_eq!(c.configuration_id, "cpu-hot");
}

#[test]
fn severity_steps_on_indicator_count() {
    assert_eq!(severity_for_count(1), Severity::Low);
    assert_eq!(severity_for_count(2), Severity::Low);
    assert_eq!(severity_for_count(3), Severity::Medium);
    assert_eq!(severity_for_count(4), Severity::High);
    assert_eq!(severity_for_count(5), Severity::Critical);
    assert_eq!(severity_for_count(6), Severity::Critical);
}

#[test]
fn three_extreme_highs_are_medium() {
    let set = set_with(
        MetricType::Memory,
        &[
            (IndicatorKind::Rsi, 88.0, Signal::HighExtreme),
            (IndicatorKind::Stochastic, 97.0, Signal::HighExtreme),
            (IndicatorKind::WilliamsR, -2.0, Signal::HighExtreme),
        ],
    );
    let cfg = config("mem-hot", AlertType::HighUtilization, MetricType::Memory);
    let c = evaluate_configuration(&set, &cfg).unwrap();
    assert_eq!(c.severity, Severity::Medium);
    assert!(c.indicators.iter().all(|i| i.is_extreme));
}

#[test]
fn volatility_spike_is_always_extreme() {
    let set = set_with(
        MetricType::Disk,
        &[(IndicatorKind::Atr, 12.5, Signal::VolatilitySpike)],
    );
    for min in [1, 2, 5] {
        let mut cfg = config("disk-vol", AlertType::VolatilitySpike, MetricType::Disk);
        cfg.min_indicator_count = min;
        let signals = matching_signals(&set, &cfg);
        assert_eq!(signals.len(), 1);
        assert!(signals[0].is_extreme);
        assert_eq!(signals[0].indicator, IndicatorKind::Atr);
    }

    let mut cfg = config("disk-vol", AlertType::VolatilitySpike, MetricType::Disk);
    cfg.require_extreme_for_single = true;
    let c = evaluate_configuration(&set, &cfg).unwrap();
    assert!(c.indicators[0].is_extreme);
    assert_eq!(c.severity, Severity::Low);
}

#[test]
fn single_signal_needs_extreme_and_opt_in() {
    let moderate = set_with(
        MetricType::Cpu,
        &[(IndicatorKind::Rsi, 72.0, Signal::HighModerate)],
    );
    let extreme = set_with(
        MetricType::Cpu,
        &[(IndicatorKind::Rsi, 91.0, Signal::HighExtreme)],
    );

    let mut cfg = config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu);
    assert!(evaluate_configuration(&extreme, &cfg).is_none());

    cfg.require_extreme_for_single = true;
    assert!(evaluate_configuration(&moderate, &cfg).is_none());
    assert!(evaluate_configuration(&extreme, &cfg).is_some());
}

#[test]
fn trend_matching_follows_indicator_families() {
    assert_eq!(
        match_signal(AlertType::RisingTrend, IndicatorKind::Stochastic, Signal::RisingCrossover),
        Some(false)
    );
    assert_eq!(
        match_signal(AlertType::RisingTrend, IndicatorKind::Macd, Signal::RisingMomentum),
        Some(false)
    );
    assert_eq!(
        match_signal(AlertType::RisingTrend, IndicatorKind::Roc, Signal::RisingMomentum),
        Some(false)
    );
    assert_eq!(
        match_signal(AlertType::DecliningTrend, IndicatorKind::Macd, Signal::DecliningCrossover),
        Some(false)
    );
    assert_eq!(
        match_signal(AlertType::RisingTrend, IndicatorKind::Stochastic, Signal::RisingMomentum),
        None
    );
    assert_eq!(
        match_signal(AlertType::HighUtilization, IndicatorKind::Rsi, Signal::Neutral),
        None
    );
    assert_eq!(
        match_signal(AlertType::LowUtilization, IndicatorKind::WilliamsR, Signal::LowExtreme),
        Some(true)
    );
    assert_eq!(
        match_signal(AlertType::VolatilitySpike, IndicatorKind::Roc, Signal::VolatilitySpike),
        None
    );
}

#[test]
fn disabled_indicators_do_not_count() {
    let set = set_with(
        MetricType::Cpu,
        &[
            (IndicatorKind::Rsi, 75.0, Signal::HighModerate),
            (IndicatorKind::Stochastic, 85.0, Signal::HighModerate),
        ],
    );
    let mut cfg = config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu);
    cfg.stochastic_settings.enabled = false;
    assert!(evaluate_configuration(&set, &cfg).is_none());
}

#[test]
fn other_metrics_and_disabled_configs_are_ignored() {
    let set = set_with(
        MetricType::Cpu,
        &[
            (IndicatorKind::Rsi, 75.0, Signal::HighModerate),
            (IndicatorKind::Stochastic, 85.0, Signal::HighModerate),
        ],
    );
    let memory = config("mem-hot", AlertType::HighUtilization, MetricType::Memory);
    let mut disabled = config("cpu-off", AlertType::HighUtilization, MetricType::Cpu);
    disabled.enabled = false;
    assert!(analyze_confluence(&set, &[memory, disabled]).is_empty());
}

#[test]
fn routing_flags_and_message_carry_over() {
    let set = set_with(
        MetricType::Cpu,
        &[
            (IndicatorKind::Rsi, 84.2, Signal::HighExtreme),
            (IndicatorKind::WilliamsR, -3.1, Signal::HighExtreme),
        ],
    );
    let mut cfg = config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu);
    cfg.notifications.email = true;
    cfg.notifications.websocket = true;

    let candidate = evaluate_configuration(&set, &cfg).unwrap();
    let record = candidate.into_record("web-01", &snapshot(), Utc::now());
    assert!(record.notifications.email);
    assert!(record.notifications.websocket);
    assert!(!record.notifications.sms);
    assert_eq!(record.snapshot.cpu_percent, 91.0);
    assert_eq!(
        record.message,
        "cpu high_utilization confluence on web-01: 2 indicators (rsi=84.2, williams_r=-3.1)"
    );
}

// ── Fake collaborators ──

#[derive(Default)]
struct FakeWindows {
    series: HashMap<MetricType, Vec<f64>>,
    delay: Option<std::time::Duration>,
    fail: bool,
    fetched: Arc<std::sync::Mutex<Vec<MetricType>>>,
}

#[async_trait]
impl MetricWindowProvider for FakeWindows {
    async fn effective_resolution(&self, _agent_id: &str) -> Result<Resolution> {
        Ok(Resolution::Raw)
    }

    async fn window(
        &self,
        agent_id: &str,
        metric: MetricType,
        resolution: Resolution,
        lookback: usize,
    ) -> Result<MetricWindow> {
        self.fetched.lock().unwrap().push(metric);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("metrics backend unavailable");
        }
        let values = self.series.get(&metric).cloned().unwrap_or_default();
        let start = values.len().saturating_sub(lookback);
        let base = Utc::now() - Duration::minutes(values.len() as i64);
        Ok(MetricWindow {
            agent_id: agent_id.to_string(),
            metric,
            resolution,
            samples: values[start..]
                .iter()
                .enumerate()
                .map(|(i, &value)| MetricSample {
                    agent_id: agent_id.to_string(),
                    metric,
                    value,
                    timestamp: base + Duration::minutes(i as i64),
                })
                .collect(),
        })
    }
}

struct FakeConfigs {
    configs: Vec<AlertConfiguration>,
    fail: bool,
}

#[async_trait]
impl ConfigurationSource for FakeConfigs {
    async fn enabled_configurations(&self) -> Result<Vec<AlertConfiguration>> {
        if self.fail {
            anyhow::bail!("config store unavailable");
        }
        Ok(self.configs.clone())
    }
}

#[derive(Default)]
struct FakeHistory {
    records: Mutex<Vec<AlertRecord>>,
    fail_for: Option<String>,
    fail_check: bool,
    check_delay: Option<std::time::Duration>,
    saves: AtomicUsize,
}

impl FakeHistory {
    fn recent(records: &[AlertRecord], agent_id: &str, configuration_id: &str, window: Duration) -> bool {
        let cutoff = Utc::now() - window;
        records.iter().any(|r| {
            r.agent_id == agent_id && r.configuration_id == configuration_id && r.created_at >= cutoff
        })
    }
}

#[async_trait]
impl AlertHistory for FakeHistory {
    async fn has_recent_similar_alert(
        &self,
        agent_id: &str,
        configuration_id: &str,
        window: Duration,
    ) -> Result<bool> {
        if let Some(delay) = self.check_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_check {
            anyhow::bail!("history table locked");
        }
        let records = self.records.lock().await;
        Ok(Self::recent(&records, agent_id, configuration_id, window))
    }

    async fn save_alert(&self, record: &AlertRecord) -> Result<AlertRecord> {
        self.records.lock().await.push(record.clone());
        Ok(record.clone())
    }

    async fn save_alert_if_absent(
        &self,
        record: &AlertRecord,
        window: Duration,
    ) -> Result<Option<AlertRecord>> {
        if self.fail_for.as_deref() == Some(record.configuration_id.as_str()) {
            anyhow::bail!("disk full");
        }
        let mut records = self.records.lock().await;
        if Self::recent(&records, &record.agent_id, &record.configuration_id, window) {
            return Ok(None);
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        records.push(record.clone());
        Ok(Some(record.clone()))
    }
}

fn rising_cpu(len: usize) -> HashMap<MetricType, Vec<f64>> {
    let values = (0..len).map(|i| 40.0 + i as f64 * 1.5).collect();
    HashMap::from([(MetricType::Cpu, values)])
}

fn detector(
    windows: FakeWindows,
    configs: Vec<AlertConfiguration>,
    history: Arc<FakeHistory>,
) -> AlertDetector {
    AlertDetector::new(
        Arc::new(windows),
        Arc::new(FakeConfigs {
            configs,
            fail: false,
        }),
        history,
        DetectorSettings::default(),
    )
}

// ── Detector ──

#[tokio::test]
async fn detector_alerts_on_sustained_rise() {
    let history = Arc::new(FakeHistory::default());
    let windows = FakeWindows {
        series: rising_cpu(30),
        ..FakeWindows::default()
    };
    let d = detector(
        windows,
        vec![config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu)],
        history.clone(),
    );

    let summaries = d.detect_and_create_alerts("web-01", &snapshot()).await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].name, "cpu-hot rule");
    assert_eq!(summaries[0].alert_type, AlertType::HighUtilization);
    // RSI, Stochastic and Williams %R all pin at their extremes.
    assert_eq!(summaries[0].indicator_count, 3);
    assert_eq!(summaries[0].severity, Severity::Medium);

    let records = history.records.lock().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].agent_id, "web-01");
    assert_eq!(records[0].snapshot.cpu_percent, 91.0);
}

#[tokio::test]
async fn detector_returns_nothing_for_short_window() {
    let history = Arc::new(FakeHistory::default());
    let windows = FakeWindows {
        series: rising_cpu(13),
        ..FakeWindows::default()
    };
    let d = detector(
        windows,
        vec![config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu)],
        history.clone(),
    );
    assert!(d.detect_and_create_alerts("web-01", &snapshot()).await.is_empty());
    assert!(history.records.lock().await.is_empty());
}

#[tokio::test]
async fn detector_returns_nothing_without_configurations() {
    let history = Arc::new(FakeHistory::default());
    let windows = FakeWindows {
        series: rising_cpu(30),
        ..FakeWindows::default()
    };
    let d = detector(windows, Vec::new(), history);
    assert!(d.detect_and_create_alerts("web-01", &snapshot()).await.is_empty());
}

#[tokio::test]
async fn second_detection_within_cooldown_is_suppressed() {
    let history = Arc::new(FakeHistory::default());
    let windows = FakeWindows {
        series: rising_cpu(30),
        ..FakeWindows::default()
    };
    let d = detector(
        windows,
        vec![config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu)],
        history.clone(),
    );

    assert_eq!(d.detect_and_create_alerts("web-01", &snapshot()).await.len(), 1);
    assert!(d.detect_and_create_alerts("web-01", &snapshot()).await.is_empty());
    assert_eq!(history.records.lock().await.len(), 1);

    // A different agent has its own cooldown.
    assert_eq!(d.detect_and_create_alerts("web-02", &snapshot()).await.len(), 1);
}

#[tokio::test]
async fn alerts_older_than_cooldown_do_not_suppress() {
    let history = Arc::new(FakeHistory::default());
    let windows = FakeWindows {
        series: rising_cpu(30),
        ..FakeWindows::default()
    };
    let d = detector(
        windows,
        vec![config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu)],
        history.clone(),
    );

    assert_eq!(d.detect_and_create_alerts("web-01", &snapshot()).await.len(), 1);
    {
        let mut records = history.records.lock().await;
        records[0].created_at = Utc::now() - Duration::minutes(16);
    }
    assert_eq!(d.detect_and_create_alerts("web-01", &snapshot()).await.len(), 1);
}

#[tokio::test]
async fn concurrent_reports_persist_one_alert() {
    let history = Arc::new(FakeHistory::default());
    let windows = FakeWindows {
        series: rising_cpu(30),
        ..FakeWindows::default()
    };
    let d = Arc::new(detector(
        windows,
        vec![config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu)],
        history.clone(),
    ));

    let snap = snapshot();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let d = d.clone();
            tokio::spawn(async move { d.detect_and_create_alerts("web-01", &snap).await })
        })
        .collect();

    let mut emitted = 0;
    for h in handles {
        emitted += h.await.unwrap().len();
    }
    assert_eq!(emitted, 1);
    assert_eq!(history.saves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn config_fetch_failure_fails_closed() {
    let history = Arc::new(FakeHistory::default());
    let d = AlertDetector::new(
        Arc::new(FakeWindows {
            series: rising_cpu(30),
            ..FakeWindows::default()
        }),
        Arc::new(FakeConfigs {
            configs: vec![config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu)],
            fail: true,
        }),
        history.clone(),
        DetectorSettings::default(),
    );
    assert!(d.detect_and_create_alerts("web-01", &snapshot()).await.is_empty());
    assert!(history.records.lock().await.is_empty());
}

#[tokio::test]
async fn window_failure_fails_closed_for_every_metric() {
    let history = Arc::new(FakeHistory::default());
    let windows = FakeWindows {
        series: rising_cpu(30),
        fail: true,
        ..FakeWindows::default()
    };
    let d = detector(
        windows,
        vec![
            config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu),
            config("mem-hot", AlertType::HighUtilization, MetricType::Memory),
        ],
        history.clone(),
    );
    assert!(d.evaluate("web-01").await.is_err());
    assert!(d.detect_and_create_alerts("web-01", &snapshot()).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_window_fetch_times_out() {
    let history = Arc::new(FakeHistory::default());
    let windows = FakeWindows {
        series: rising_cpu(30),
        delay: Some(std::time::Duration::from_secs(60)),
        ..FakeWindows::default()
    };
    let d = detector(
        windows,
        vec![config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu)],
        history.clone(),
    );

    let err = d.evaluate("web-01").await.unwrap_err();
    assert!(err.to_string().contains("timed out"), "{err}");
    assert!(d.detect_and_create_alerts("web-01", &snapshot()).await.is_empty());
}

fn two_cpu_configs() -> Vec<AlertConfiguration> {
    vec![
        config("cpu-a", AlertType::HighUtilization, MetricType::Cpu),
        config("cpu-b", AlertType::HighUtilization, MetricType::Cpu),
    ]
}

#[tokio::test]
async fn persistence_failure_fails_closed() {
    let history = Arc::new(FakeHistory {
        fail_for: Some("cpu-a".into()),
        ..FakeHistory::default()
    });
    let windows = FakeWindows {
        series: rising_cpu(30),
        ..FakeWindows::default()
    };
    let d = detector(windows, two_cpu_configs(), history.clone());

    assert!(d.detect_and_create_alerts("web-01", &snapshot()).await.is_empty());
    // cpu-b is never attempted once cpu-a fails.
    assert_eq!(history.saves.load(Ordering::SeqCst), 0);
    assert!(history.records.lock().await.is_empty());
}

#[tokio::test]
async fn history_check_failure_fails_closed() {
    let history = Arc::new(FakeHistory {
        fail_check: true,
        ..FakeHistory::default()
    });
    let windows = FakeWindows {
        series: rising_cpu(30),
        ..FakeWindows::default()
    };
    let d = detector(windows, two_cpu_configs(), history.clone());

    assert!(d.detect_and_create_alerts("web-01", &snapshot()).await.is_empty());
    assert_eq!(history.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_history_check_times_out() {
    let history = Arc::new(FakeHistory {
        check_delay: Some(std::time::Duration::from_secs(60)),
        ..FakeHistory::default()
    });
    let windows = FakeWindows {
        series: rising_cpu(30),
        ..FakeWindows::default()
    };
    let d = detector(windows, two_cpu_configs(), history.clone());

    assert!(d.detect_and_create_alerts("web-01", &snapshot()).await.is_empty());
    assert_eq!(history.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_configuration_is_skipped_before_fetching() {
    let history = Arc::new(FakeHistory::default());
    let fetched = Arc::new(std::sync::Mutex::new(Vec::new()));
    let windows = FakeWindows {
        series: rising_cpu(30),
        fetched: fetched.clone(),
        ..FakeWindows::default()
    };
    let mut broken = config("broken", AlertType::HighUtilization, MetricType::Memory);
    broken.min_indicator_count = 0;
    let good = config("good", AlertType::HighUtilization, MetricType::Cpu);
    let d = detector(windows, vec![broken, good], history);

    let summaries = d.detect_and_create_alerts("web-01", &snapshot()).await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].name, "good rule");
    assert_eq!(*fetched.lock().unwrap(), vec![MetricType::Cpu]);
}

#[tokio::test]
async fn agent_pattern_limits_configurations() {
    let history = Arc::new(FakeHistory::default());
    let windows = FakeWindows {
        series: rising_cpu(30),
        ..FakeWindows::default()
    };
    let mut cfg = config("cpu-hot", AlertType::HighUtilization, MetricType::Cpu);
    cfg.agent_pattern = "db-*".into();
    let d = detector(windows, vec![cfg], history);

    assert!(d.detect_and_create_alerts("web-01", &snapshot()).await.is_empty());
    assert_eq!(d.detect_and_create_alerts("db-01", &snapshot()).await.len(), 1);
}
