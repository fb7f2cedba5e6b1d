use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const ENV_PREFIX: &str = "TETHER_";

/// Demo parameters. Read from `TETHER_*` environment variables at startup;
/// anything missing or unparsable falls back to the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoCfg {
    // producer pacing (ms between emitted values)
    pub counter_pace_ms: u64,

    // cancel scenario: values read before cancelling
    pub cancel_after: usize,

    // timeout scenario
    pub timeout_ms: u64,

    // deadline scenario: how far in the past the deadline lies
    pub past_deadline_ms: u64,

    // leak scenario: values read before abandoning the stream
    pub leak_reads: usize,

    // time allowed for a worker to wind down after cancel
    pub grace_ms: u64,

    // logging
    pub log_json: bool,
}

impl Default for DemoCfg {
    fn default() -> Self {
        Self {
            counter_pace_ms: 20,
            cancel_after: 5,
            timeout_ms: 200,
            past_deadline_ms: 1000,
            leak_reads: 10,
            grace_ms: 500,
            log_json: false,
        }
    }
}

impl DemoCfg {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        let map: HashMap<String, String> = std::env::vars()
            .filter_map(|(k, v)| {
                k.strip_prefix(ENV_PREFIX)
                    .map(|key| (key.to_ascii_lowercase(), v))
            })
            .collect();
        Self::from_map(&map)
    }

    fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            counter_pace_ms: get_or(m, "counter_pace_ms", d.counter_pace_ms),
            cancel_after: get_or(m, "cancel_after", d.cancel_after),
            timeout_ms: get_or(m, "timeout_ms", d.timeout_ms),
            past_deadline_ms: get_or(m, "past_deadline_ms", d.past_deadline_ms),
            leak_reads: get_or(m, "leak_reads", d.leak_reads),
            grace_ms: get_or(m, "grace_ms", d.grace_ms),
            log_json: get_or(m, "log_json", d.log_json),
        }
    }

    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.counter_pace_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn past_deadline(&self) -> Duration {
        Duration::from_millis(self.past_deadline_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// (key, value, description) triples for the startup log.
    pub fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("counter_pace_ms", self.counter_pace_ms.to_string(), "Delay between counter values ms"),
            ("cancel_after", self.cancel_after.to_string(), "Values read before cancelling"),
            ("timeout_ms", self.timeout_ms.to_string(), "Timeout scenario duration ms"),
            ("past_deadline_ms", self.past_deadline_ms.to_string(), "Age of the already elapsed deadline ms"),
            ("leak_reads", self.leak_reads.to_string(), "Values read before abandoning the leaky stream"),
            ("grace_ms", self.grace_ms.to_string(), "Worker wind-down allowance ms"),
            ("log_json", self.log_json.to_string(), "Emit JSON log lines"),
        ]
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_yields_defaults() {
        let cfg = DemoCfg::from_map(&HashMap::new());
        assert_eq!(cfg.timeout_ms, 200);
        assert_eq!(cfg.cancel_after, 5);
        assert!(!cfg.log_json);
    }

    #[test]
    fn overrides_and_bad_values() {
        let m: HashMap<String, String> = [
            ("timeout_ms", "750"),
            ("cancel_after", "not-a-number"),
            ("log_json", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let cfg = DemoCfg::from_map(&m);
        assert_eq!(cfg.timeout(), Duration::from_millis(750));
        assert_eq!(cfg.cancel_after, 5);
        assert!(cfg.log_json);
    }

    #[test]
    fn entries_cover_every_field() {
        let cfg = DemoCfg::default();
        let json = serde_json::to_value(&cfg).unwrap();
        let fields = json.as_object().unwrap().len();
        assert_eq!(cfg.to_entries().len(), fields);
    }
}
