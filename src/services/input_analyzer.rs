use std::collections::VecDeque;

use crate::config::AnalyzerConfig;

/// One observed client action: a timestamp plus optional pointer position.
#[derive(Debug, Clone, Copy)]
pub struct InputSample {
    /// Milliseconds since the Unix epoch.
    pub at_ms: u64,
    /// Pointer position, when the client supplies one.
    pub position: Option<(f32, f32)>,
}

/// Escalation level attached to a flagged action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FlagSeverity {
    Warning,
    Moderate,
    Severe,
}

/// Which heuristic rejected the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagReason {
    /// Two consecutive actions closer together than the floor.
    IntervalTooShort,
    /// Too many actions inside the trailing second.
    RateExceeded,
    /// Inter-action intervals too regular to be human.
    UniformTiming,
    /// Pointer positions barely vary across the trailing window.
    RepeatedPosition,
}

/// Verdict for a flagged action. Every flagged action is rejected from
/// reward processing; `should_report` only limits log/report volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFlag {
    pub reason: FlagReason,
    pub severity: FlagSeverity,
    /// Whether this flag falls inside the reporting budget.
    pub should_report: bool,
}

/// Session-local analysis state for one player.
///
/// Holds a bounded ring of recent samples; not shared across processes. The
/// cumulative warning counter outlives individual flags and is consulted at
/// duel settlement to invalidate results.
#[derive(Default)]
pub struct InputSession {
    samples: VecDeque<InputSample>,
    warnings: u32,
    last_report_at_ms: Option<u64>,
}

impl InputSession {
    /// Fresh session with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one action and evaluate it against every heuristic.
    ///
    /// Returns `None` for clean input. Each check runs independently; when
    /// several fire at once the most severe verdict wins.
    pub fn observe(&mut self, sample: InputSample, config: &AnalyzerConfig) -> Option<InputFlag> {
        let verdict = self.evaluate(&sample, config);

        self.samples.push_back(sample);
        while self.samples.len() > config.sample_capacity {
            self.samples.pop_front();
        }

        let (reason, severity) = verdict?;
        self.warnings += 1;

        let should_report = match self.last_report_at_ms {
            Some(last) if sample.at_ms.saturating_sub(last) < config.report_interval_ms => false,
            _ => {
                self.last_report_at_ms = Some(sample.at_ms);
                true
            }
        };

        Some(InputFlag {
            reason,
            severity,
            should_report,
        })
    }

    /// Cumulative flag count for this session.
    pub fn warnings(&self) -> u32 {
        self.warnings
    }

    /// Whether this session crossed the threshold that invalidates a duel
    /// result regardless of how plausible the final score looks.
    pub fn is_compromised(&self, config: &AnalyzerConfig) -> bool {
        self.warnings >= config.invalidation_warnings
    }

    fn evaluate(
        &self,
        sample: &InputSample,
        config: &AnalyzerConfig,
    ) -> Option<(FlagReason, FlagSeverity)> {
        let mut worst: Option<(FlagReason, FlagSeverity)> = None;
        let mut flag = |reason, severity| {
            if worst.is_none_or(|(_, current)| severity > current) {
                worst = Some((reason, severity));
            }
        };

        if let Some(last) = self.samples.back()
            && sample.at_ms.saturating_sub(last.at_ms) < config.min_interval_ms
        {
            flag(FlagReason::IntervalTooShort, FlagSeverity::Moderate);
        }

        let trailing_second = self
            .samples
            .iter()
            .filter(|existing| sample.at_ms.saturating_sub(existing.at_ms) < 1_000)
            .count()
            + 1;
        if trailing_second > config.max_taps_per_second as usize {
            flag(FlagReason::RateExceeded, FlagSeverity::Moderate);
        }

        if let Some(cv) = self.interval_variation(sample, config.regularity_window)
            && cv < config.min_interval_cv
        {
            flag(FlagReason::UniformTiming, FlagSeverity::Severe);
        }

        if sample.position.is_some()
            && let Some(ratio) = self.distinct_position_ratio(sample, config.position_window)
            && ratio < config.min_distinct_position_ratio
        {
            flag(FlagReason::RepeatedPosition, FlagSeverity::Warning);
        }

        worst
    }

    /// Coefficient of variation of the last `window` inter-action intervals,
    /// including the candidate sample. `None` until enough history exists.
    fn interval_variation(&self, sample: &InputSample, window: usize) -> Option<f64> {
        let timestamps: Vec<u64> = self
            .samples
            .iter()
            .map(|existing| existing.at_ms)
            .chain(std::iter::once(sample.at_ms))
            .collect();
        if timestamps.len() < window + 1 {
            return None;
        }

        let intervals: Vec<f64> = timestamps[timestamps.len() - (window + 1)..]
            .windows(2)
            .map(|pair| (pair[1].saturating_sub(pair[0])) as f64)
            .collect();
        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        if mean <= 0.0 {
            // Zero-width intervals are maximally regular.
            return Some(0.0);
        }

        let variance = intervals
            .iter()
            .map(|interval| (interval - mean).powi(2))
            .sum::<f64>()
            / intervals.len() as f64;
        Some(variance.sqrt() / mean)
    }

    /// Ratio of distinct pointer positions to positioned samples over the
    /// trailing window. `None` until enough positioned history exists.
    fn distinct_position_ratio(&self, sample: &InputSample, window: usize) -> Option<f64> {
        const MIN_POSITIONED_SAMPLES: usize = 10;

        let positions: Vec<(i64, i64)> = self
            .samples
            .iter()
            .rev()
            .take(window.saturating_sub(1))
            .filter_map(|existing| existing.position)
            .chain(sample.position)
            .map(|(x, y)| (x.round() as i64, y.round() as i64))
            .collect();
        if positions.len() < MIN_POSITIONED_SAMPLES {
            return None;
        }

        let mut distinct = positions.clone();
        distinct.sort_unstable();
        distinct.dedup();
        Some(distinct.len() as f64 / positions.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn config() -> AnalyzerConfig {
        AppConfig::default().analyzer
    }

    fn observe_all(
        session: &mut InputSession,
        config: &AnalyzerConfig,
        timestamps: &[u64],
    ) -> Vec<Option<InputFlag>> {
        timestamps
            .iter()
            .map(|&at_ms| {
                session.observe(
                    InputSample {
                        at_ms,
                        position: None,
                    },
                    config,
                )
            })
            .collect()
    }

    #[test]
    fn constant_sub_threshold_intervals_flag_severe() {
        let config = config();
        let mut session = InputSession::new();

        // 25ms metronome taps: below the interval floor and perfectly regular.
        let timestamps: Vec<u64> = (0..16).map(|index| 1_000 + index * 25).collect();
        let flags = observe_all(&mut session, &config, &timestamps);

        let last = flags.last().unwrap().expect("scripted input must flag");
        assert_eq!(last.severity, FlagSeverity::Severe);
        assert!(session.warnings() > 0);
    }

    #[test]
    fn human_like_variation_is_never_flagged_for_regularity() {
        let config = config();
        let mut session = InputSession::new();

        // Alternating 150/250ms cadence: CV = 0.25, well above the floor.
        let mut at_ms = 10_000;
        let mut timestamps = Vec::new();
        for index in 0..14 {
            at_ms += if index % 2 == 0 { 150 } else { 250 };
            timestamps.push(at_ms);
        }

        let flags = observe_all(&mut session, &config, &timestamps);
        assert!(flags.iter().all(Option::is_none));
        assert_eq!(session.warnings(), 0);
    }

    #[test]
    fn trailing_second_rate_ceiling_flags() {
        let config = config();
        let mut session = InputSession::new();

        // Irregular cadence (CV above threshold) but 14 taps inside one second.
        let offsets = [0, 71, 45, 82, 50, 77, 66, 90, 48, 73, 59, 85, 69];
        let mut at_ms = 5_000;
        let mut last_flag = None;
        for offset in offsets {
            at_ms += offset;
            last_flag = session.observe(
                InputSample {
                    at_ms,
                    position: None,
                },
                &config,
            );
        }

        let flag = last_flag.expect("burst above the rate ceiling must flag");
        assert_eq!(flag.reason, FlagReason::RateExceeded);
    }

    #[test]
    fn repeated_positions_flag_when_supplied() {
        let config = config();
        let mut session = InputSession::new();

        // Jittered human-like timing, but the pointer never moves.
        let mut at_ms = 0;
        let mut last_flag = None;
        for index in 0..12 {
            at_ms += if index % 2 == 0 { 160 } else { 240 };
            last_flag = session.observe(
                InputSample {
                    at_ms,
                    position: Some((240.0, 400.0)),
                },
                &config,
            );
        }

        let flag = last_flag.expect("frozen pointer must flag");
        assert_eq!(flag.reason, FlagReason::RepeatedPosition);
        assert_eq!(flag.severity, FlagSeverity::Warning);
    }

    #[test]
    fn warning_accumulation_compromises_the_session() {
        let config = config();
        let mut session = InputSession::new();

        let timestamps: Vec<u64> = (0..=config.invalidation_warnings as u64 + 1)
            .map(|index| index * 10)
            .collect();
        observe_all(&mut session, &config, &timestamps);

        assert!(session.is_compromised(&config));
    }

    #[test]
    fn reports_are_rate_limited_but_every_flag_rejects() {
        let config = config();
        let mut session = InputSession::new();

        let first = session
            .observe(
                InputSample {
                    at_ms: 1_000,
                    position: None,
                },
                &config,
            )
            .or(session.observe(
                InputSample {
                    at_ms: 1_010,
                    position: None,
                },
                &config,
            ))
            .expect("sub-floor interval must flag");
        assert!(first.should_report);

        let second = session
            .observe(
                InputSample {
                    at_ms: 1_020,
                    position: None,
                },
                &config,
            )
            .expect("still flagged while inside the report budget");
        assert!(!second.should_report);
        assert_eq!(session.warnings(), 2);
    }
}
