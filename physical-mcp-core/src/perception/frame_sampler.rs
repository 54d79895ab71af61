//! The cost gate: decides whether a frame is worth a VLM call.

use chrono::{DateTime, Utc};

use super::change_detector::ChangeLevel;
use super::ChangeResult;

/// `MINOR` debounce is 1.5x the `MODERATE` debounce: a minor change is
/// worth a longer cooldown before re-analyzing, but not as long as
/// waiting for the next heartbeat.
const MINOR_DEBOUNCE_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    pub heartbeat_interval_secs: f64,
    pub debounce_secs: f64,
    pub cooldown_secs: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            heartbeat_interval_secs: 300.0,
            debounce_secs: 3.0,
            cooldown_secs: 10.0,
        }
    }
}

/// Per-camera debounce/cooldown state machine. See the component design's
/// numbered decision list — the ordering there is load-bearing, not just
/// documentation, and this implementation follows it step for step.
pub struct FrameSampler {
    config: SamplerConfig,
    last_analysis: Option<DateTime<Utc>>,
    pending_moderate: bool,
    moderate_ts: Option<DateTime<Utc>>,
    pending_minor: bool,
    minor_ts: Option<DateTime<Utc>>,
}

impl FrameSampler {
    pub fn new(config: SamplerConfig) -> Self {
        FrameSampler {
            config,
            last_analysis: None,
            pending_moderate: false,
            moderate_ts: None,
            pending_minor: false,
            minor_ts: None,
        }
    }

    /// Returns `(should_call_vlm, change)`. `now` is threaded through
    /// explicitly so tests can drive exact timing without sleeping.
    pub fn should_analyze_at(
        &mut self,
        change: ChangeResult,
        has_active_rules: bool,
        now: DateTime<Utc>,
    ) -> (bool, ChangeResult) {
        if !has_active_rules {
            return (false, change);
        }

        if let Some(last) = self.last_analysis {
            let elapsed = (now - last).num_milliseconds() as f64 / 1000.0;
            if elapsed < self.config.cooldown_secs {
                return (false, change);
            }
        }

        if self.pending_moderate {
            if let Some(ts) = self.moderate_ts {
                let elapsed = (now - ts).num_milliseconds() as f64 / 1000.0;
                if elapsed >= self.config.debounce_secs {
                    self.clear_pending();
                    self.last_analysis = Some(now);
                    return (true, change);
                }
            }
        } else if self.pending_minor {
            if let Some(ts) = self.minor_ts {
                let elapsed = (now - ts).num_milliseconds() as f64 / 1000.0;
                if elapsed >= self.config.debounce_secs * MINOR_DEBOUNCE_MULTIPLIER {
                    self.clear_pending();
                    self.last_analysis = Some(now);
                    return (true, change);
                }
            }
        }

        match change.level {
            ChangeLevel::Major => {
                self.clear_pending();
                self.last_analysis = Some(now);
                (true, change)
            }
            ChangeLevel::Moderate => {
                self.pending_moderate = true;
                self.moderate_ts = Some(now);
                self.pending_minor = false;
                self.minor_ts = None;
                (false, change)
            }
            ChangeLevel::Minor => {
                if !self.pending_moderate {
                    self.pending_minor = true;
                    self.minor_ts = Some(now);
                }
                (false, change)
            }
            ChangeLevel::None => {
                if let Some(last) = self.last_analysis {
                    let elapsed = (now - last).num_milliseconds() as f64 / 1000.0;
                    if elapsed >= self.config.heartbeat_interval_secs {
                        self.last_analysis = Some(now);
                        return (true, change);
                    }
                } else if self.config.heartbeat_interval_secs <= 0.0 {
                    self.last_analysis = Some(now);
                    return (true, change);
                }
                (false, change)
            }
        }
    }

    /// Convenience wrapper using the wall clock.
    pub fn should_analyze(
        &mut self,
        change: ChangeResult,
        has_active_rules: bool,
    ) -> (bool, ChangeResult) {
        self.should_analyze_at(change, has_active_rules, Utc::now())
    }

    fn clear_pending(&mut self) {
        self.pending_moderate = false;
        self.moderate_ts = None;
        self.pending_minor = false;
        self.minor_ts = None;
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        FrameSampler::new(SamplerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn change(level: ChangeLevel) -> ChangeResult {
        ChangeResult {
            level,
            hash_distance: 0,
            pixel_diff_pct: 0.0,
            description: String::new(),
        }
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn no_active_rules_never_triggers() {
        let mut sampler = FrameSampler::new(SamplerConfig {
            heartbeat_interval_secs: 0.0,
            debounce_secs: 0.0,
            cooldown_secs: 0.0,
        });
        let t0 = epoch();
        for level in [
            ChangeLevel::None,
            ChangeLevel::Minor,
            ChangeLevel::Moderate,
            ChangeLevel::Major,
        ] {
            let (should, _) = sampler.should_analyze_at(change(level), false, t0);
            assert!(!should);
        }
    }

    /// A moderate change that reverts to `None` before the debounce window
    /// elapses still fires once the window passes, rather than being
    /// silently dropped because the scene looked calm again by then.
    #[test]
    fn brief_sip_fires_on_debounced_pending_moderate() {
        let mut sampler = FrameSampler::new(SamplerConfig {
            heartbeat_interval_secs: f64::MAX,
            debounce_secs: 0.3,
            cooldown_secs: 0.0,
        });
        let t0 = epoch();

        let (should_1, _) =
            sampler.should_analyze_at(change(ChangeLevel::Moderate), true, t0 + ChronoDuration::milliseconds(1000));
        let (should_2, _) =
            sampler.should_analyze_at(change(ChangeLevel::None), true, t0 + ChronoDuration::milliseconds(1100));
        let (should_3, _) =
            sampler.should_analyze_at(change(ChangeLevel::None), true, t0 + ChronoDuration::milliseconds(1400));

        assert_eq!((should_1, should_2, should_3), (false, false, true));
    }

    #[test]
    fn major_change_fires_immediately() {
        let mut sampler = FrameSampler::default();
        let (should, _) = sampler.should_analyze_at(change(ChangeLevel::Major), true, epoch());
        assert!(should);
    }

    #[test]
    fn cooldown_blocks_calls_within_window() {
        let mut sampler = FrameSampler::new(SamplerConfig {
            heartbeat_interval_secs: f64::MAX,
            debounce_secs: 0.0,
            cooldown_secs: 10.0,
        });
        let t0 = epoch();
        let (first, _) = sampler.should_analyze_at(change(ChangeLevel::Major), true, t0);
        assert!(first);
        let (second, _) = sampler.should_analyze_at(
            change(ChangeLevel::Major),
            true,
            t0 + ChronoDuration::seconds(5),
        );
        assert!(!second);
    }

    #[test]
    fn moderate_supersedes_pending_minor() {
        let mut sampler = FrameSampler::new(SamplerConfig {
            heartbeat_interval_secs: f64::MAX,
            debounce_secs: 1.0,
            cooldown_secs: 0.0,
        });
        let t0 = epoch();
        sampler.should_analyze_at(change(ChangeLevel::Minor), true, t0);
        sampler.should_analyze_at(
            change(ChangeLevel::Moderate),
            true,
            t0 + ChronoDuration::milliseconds(100),
        );
        assert!(sampler.pending_moderate);
        assert!(!sampler.pending_minor);
    }

    #[test]
    fn heartbeat_fires_after_long_silence() {
        let mut sampler = FrameSampler::new(SamplerConfig {
            heartbeat_interval_secs: 5.0,
            debounce_secs: 0.0,
            cooldown_secs: 0.0,
        });
        let t0 = epoch();
        sampler.should_analyze_at(change(ChangeLevel::Major), true, t0);
        let (should, _) =
            sampler.should_analyze_at(change(ChangeLevel::None), true, t0 + ChronoDuration::seconds(6));
        assert!(should);
    }
}
