use crate::buffer::{SampleBuffer, ToneWindow};
use crate::config::{EnvelopeParams, SegmentParams, SplitParams};
use crate::goertzel::GoertzelEstimator;
use log::debug;

/// Located tone windows; tone2 is only ever present alongside tone1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentPair {
    pub tone1: Option<ToneWindow>,
    pub tone2: Option<ToneWindow>,
}

/// How envelope frames map back onto the sample buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub frame_len: usize,
    pub hop: usize,
    pub total_samples: usize,
}

impl FrameLayout {
    pub fn for_buffer(buffer: &SampleBuffer, envelope: &EnvelopeParams) -> Self {
        let rate = buffer.sample_rate_hz() as f64;
        let frame_len = ((envelope.frame_ms * rate / 1000.0).round() as usize).max(1);
        let hop = ((envelope.hop_ms * rate / 1000.0).round() as usize).clamp(1, frame_len);
        Self {
            frame_len,
            hop,
            total_samples: buffer.len(),
        }
    }

    /// Sample range covered by frames `[start_frame, end_frame)`
    pub fn frames_to_window(&self, start_frame: usize, end_frame: usize) -> Option<ToneWindow> {
        if end_frame <= start_frame {
            return None;
        }
        let start = (start_frame * self.hop).min(self.total_samples);
        let end = ((end_frame - 1) * self.hop + self.frame_len).min(self.total_samples);
        ToneWindow::new(start, end)
    }
}

/// Maximal run of consecutive active frames, `end_frame` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub start_frame: usize,
    pub end_frame: usize,
}

/// Find the first tone1 -> gap -> tone2 sequence in `buffer`
///
/// Energy runs come from the RMS envelope; each run is then cut where its
/// dominant frequency settles on a new value, so tones that follow each
/// other without a silent gap still form two windows. `band_lo_hz` and
/// `band_hi_hz` bound the per-frame frequency track.
pub fn locate(buffer: &SampleBuffer, params: &SegmentParams, band_lo_hz: f64, band_hi_hz: f64) -> SegmentPair {
    let rate = buffer.sample_rate_hz();
    let layout = FrameLayout::for_buffer(buffer, &params.envelope);
    let envelope = rms_envelope(buffer.samples(), layout.frame_len, layout.hop);
    let estimator = frame_estimator(rate, layout, band_lo_hz, band_hi_hz);

    let runs: Vec<Run> = active_runs(&envelope, &params.envelope)
        .into_iter()
        .flat_map(|run| {
            let track = frequency_track(buffer.samples(), layout, run, &estimator);
            split_run(run, &track, &params.split)
        })
        .collect();

    let windows = runs_to_windows(&runs, layout);
    debug!("{} candidate windows: {:?}", windows.len(), windows);

    pair_windows(&windows, rate, params)
}

/// Runs of frames whose smoothed RMS clears the activity threshold
pub fn active_runs(envelope: &[f32], params: &EnvelopeParams) -> Vec<Run> {
    let smoothed = median_smooth(envelope, params.median_kernel);
    let Some(threshold) = active_threshold(&smoothed, params) else {
        debug!("envelope never rises above the noise floor");
        return Vec::new();
    };

    let runs = find_runs(&smoothed, threshold);
    debug!("{} active runs above threshold {:.4}", runs.len(), threshold);
    runs
}

/// Sample windows for `runs`; pieces cut from one run meet end to start
pub fn runs_to_windows(runs: &[Run], layout: FrameLayout) -> Vec<ToneWindow> {
    runs.iter()
        .enumerate()
        .filter_map(|(k, run)| {
            let window = layout.frames_to_window(run.start_frame, run.end_frame)?;
            match runs.get(k + 1) {
                Some(next) if next.start_frame == run.end_frame => {
                    let end = (next.start_frame * layout.hop).min(window.end_sample);
                    ToneWindow::new(window.start_sample, end)
                }
                _ => Some(window),
            }
        })
        .collect()
}

/// Estimator for single envelope frames, swept at half-bin spacing only
fn frame_estimator(sample_rate_hz: u32, layout: FrameLayout, band_lo_hz: f64, band_hi_hz: f64) -> GoertzelEstimator {
    let half_bin_hz = sample_rate_hz as f64 / layout.frame_len as f64 / 2.0;
    GoertzelEstimator::new(sample_rate_hz, band_lo_hz, band_hi_hz, half_bin_hz)
}

/// Dominant frequency of every frame in `run`, None where nothing resolves
pub fn frequency_track(
    samples: &[f32],
    layout: FrameLayout,
    run: Run,
    estimator: &GoertzelEstimator,
) -> Vec<Option<f64>> {
    (run.start_frame..run.end_frame)
        .map(|k| {
            let start = (k * layout.hop).min(samples.len());
            let end = (start + layout.frame_len).min(samples.len());
            let estimate = estimator.estimate(&samples[start..end]);
            estimate.is_tone(0.0).then_some(estimate.frequency_hz)
        })
        .collect()
}

/// Cut `run` where its frequency track moves to a new, stable value
///
/// `track` holds one entry per frame of the run. A cut lands on the first of
/// `confirm_frames` consecutive frames that agree with each other within
/// `split_hz` and all sit more than `split_hz` from the current piece.
pub fn split_run(run: Run, track: &[Option<f64>], params: &SplitParams) -> Vec<Run> {
    let confirm = params.confirm_frames.max(1);
    let frames = track.len().min(run.end_frame.saturating_sub(run.start_frame));
    let mut pieces = Vec::new();
    let mut piece_start = 0;
    let mut current = settled_frequency(&track[..confirm.min(frames)], params.split_hz);
    let mut i = confirm;

    while i + confirm <= frames {
        let candidate = &track[i..i + confirm];
        let Some(next) = settled_frequency(candidate, params.split_hz) else {
            i += 1;
            continue;
        };
        match current {
            None => current = Some(next),
            Some(hz) if candidate.iter().flatten().all(|f| (f - hz).abs() > params.split_hz) => {
                debug!(
                    "frequency moves {:.1} -> {:.1} Hz at frame {}",
                    hz,
                    next,
                    run.start_frame + i
                );
                pieces.push(Run {
                    start_frame: run.start_frame + piece_start,
                    end_frame: run.start_frame + i,
                });
                piece_start = i;
                current = Some(next);
                i += confirm;
                continue;
            }
            Some(_) => {}
        }
        i += 1;
    }

    pieces.push(Run {
        start_frame: run.start_frame + piece_start,
        end_frame: run.end_frame,
    });
    pieces
}

/// Median of `frames` when every frame resolved and all lie within `spread_hz` of it
fn settled_frequency(frames: &[Option<f64>], spread_hz: f64) -> Option<f64> {
    let mut values: Vec<f64> = frames.iter().copied().collect::<Option<_>>()?;
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let median = values[values.len() / 2];
    values
        .iter()
        .all(|v| (v - median).abs() <= spread_hz)
        .then_some(median)
}

/// Pick the first window that fits tone1, then the first later window that
/// starts inside the gap window and fits tone2
///
/// Only the first qualifying tone1 is considered. Windows that start after
/// the gap window closes end the search.
pub fn pair_windows(windows: &[ToneWindow], sample_rate_hz: u32, params: &SegmentParams) -> SegmentPair {
    let rate = sample_rate_hz as f64;
    let duration = |w: &ToneWindow| w.duration_s(sample_rate_hz);

    for (i, first) in windows.iter().enumerate() {
        if !params.tone1.accepts(duration(first)) {
            continue;
        }

        let gap_after = |w: &ToneWindow| ((w.start_sample as f64 - first.end_sample as f64) / rate).max(0.0);
        let tone2 = windows[i + 1..]
            .iter()
            .take_while(|w| gap_after(w) <= params.gap.max_s)
            .find(|w| params.gap.accepts(gap_after(w)) && params.tone2.accepts(duration(w)))
            .copied();

        return SegmentPair {
            tone1: Some(*first),
            tone2,
        };
    }

    SegmentPair::default()
}

/// How closely the located windows match the nominal timing, in [0, 1]
///
/// Mean of the tone1, gap and tone2 conformances. The gap term needs both
/// tones; anything absent contributes 0.
pub fn timing_conformance(pair: &SegmentPair, sample_rate_hz: u32, params: &SegmentParams) -> f64 {
    let rate = sample_rate_hz as f64;
    let c1 = pair
        .tone1
        .map(|w| params.tone1.conformance(w.duration_s(sample_rate_hz)))
        .unwrap_or(0.0);
    let c2 = pair
        .tone2
        .map(|w| params.tone2.conformance(w.duration_s(sample_rate_hz)))
        .unwrap_or(0.0);
    let c_gap = match (pair.tone1, pair.tone2) {
        (Some(t1), Some(t2)) => {
            let gap_s = (t2.start_sample as f64 - t1.end_sample as f64).max(0.0) / rate;
            params.gap.conformance(gap_s)
        }
        _ => 0.0,
    };
    (c1 + c_gap + c2) / 3.0
}

/// RMS over frames of `frame_len` samples advanced by `hop`
///
/// A buffer shorter than one frame yields a single frame over all of it.
pub fn rms_envelope(samples: &[f32], frame_len: usize, hop: usize) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let frame_len = frame_len.max(1);
    let hop = hop.max(1);
    if samples.len() <= frame_len {
        return vec![rms(samples)];
    }

    let count = (samples.len() - frame_len) / hop + 1;
    (0..count)
        .map(|k| rms(&samples[k * hop..k * hop + frame_len]))
        .collect()
}

fn rms(frame: &[f32]) -> f32 {
    let energy: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (energy / frame.len() as f64).sqrt() as f32
}

/// Running median; the window shrinks symmetrically at the edges
pub fn median_smooth(values: &[f32], kernel: usize) -> Vec<f32> {
    if kernel <= 1 || values.len() < 3 {
        return values.to_vec();
    }
    let half = kernel / 2;
    let mut scratch = Vec::with_capacity(kernel);

    (0..values.len())
        .map(|i| {
            let radius = half.min(i).min(values.len() - 1 - i);
            scratch.clear();
            scratch.extend_from_slice(&values[i - radius..=i + radius]);
            scratch.sort_by(|a, b| a.total_cmp(b));
            scratch[radius]
        })
        .collect()
}

/// Activity threshold, or None when the envelope never clears the floor
///
/// Tracks the noise floor rather than the loudest frame, so a quiet tone
/// next to a loud one stays active. The peak only bounds the result.
pub fn active_threshold(envelope: &[f32], params: &EnvelopeParams) -> Option<f32> {
    let peak = envelope.iter().copied().fold(0.0f32, f32::max) as f64;
    if peak <= params.min_rms {
        return None;
    }
    let floor = noise_floor(envelope, params.noise_percentile);
    let threshold = (floor * params.floor_factor).clamp(peak * params.min_peak_ratio, peak * params.max_peak_ratio);
    Some(threshold.max(params.min_rms) as f32)
}

/// Envelope value at the given quantile
pub fn noise_floor(envelope: &[f32], percentile: f64) -> f64 {
    if envelope.is_empty() {
        return 0.0;
    }
    let mut sorted = envelope.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((sorted.len() - 1) as f64 * percentile.clamp(0.0, 1.0)).floor() as usize;
    sorted[idx] as f64
}

/// Maximal runs of frames strictly above `threshold`
pub fn find_runs(envelope: &[f32], threshold: f32) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut start = None;

    for (i, &value) in envelope.iter().enumerate() {
        match (value > threshold, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(Run {
                    start_frame: s,
                    end_frame: i,
                });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(Run {
            start_frame: s,
            end_frame: envelope.len(),
        });
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToneTiming;

    const RATE: u32 = 8000;

    /// 10 ms hop and 20 ms frames at 8 kHz
    fn layout(total_frames: usize) -> FrameLayout {
        FrameLayout {
            frame_len: 160,
            hop: 80,
            total_samples: total_frames * 80 + 80,
        }
    }

    /// Envelope built from (level, frames) segments
    fn envelope(segments: &[(f32, usize)]) -> Vec<f32> {
        segments
            .iter()
            .flat_map(|&(level, frames)| std::iter::repeat(level).take(frames))
            .collect()
    }

    fn params() -> SegmentParams {
        SegmentParams::default()
    }

    /// Energy-only search, no frequency splitting
    fn pair_from_envelope(env: &[f32], layout: FrameLayout, rate: u32, params: &SegmentParams) -> SegmentPair {
        let runs = active_runs(env, &params.envelope);
        pair_windows(&runs_to_windows(&runs, layout), rate, params)
    }

    fn sine(freq_hz: f64, seconds: f64) -> Vec<f32> {
        let len = (seconds * RATE as f64) as usize;
        (0..len)
            .map(|n| (0.5 * (2.0 * std::f64::consts::PI * freq_hz * n as f64 / RATE as f64).sin()) as f32)
            .collect()
    }

    #[test]
    fn test_find_runs() {
        let env = vec![0.0, 0.5, 0.6, 0.0, 0.0, 0.7, 0.7];
        let runs = find_runs(&env, 0.3);
        assert_eq!(
            runs,
            vec![
                Run { start_frame: 1, end_frame: 3 },
                Run { start_frame: 5, end_frame: 7 },
            ]
        );
    }

    #[test]
    fn test_find_runs_threshold_is_strict() {
        let env = vec![0.3, 0.3, 0.3];
        assert!(find_runs(&env, 0.3).is_empty());
    }

    #[test]
    fn test_median_smooth_removes_single_frame_spikes() {
        let env = vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.8, 0.8, 0.0, 0.8, 0.8];
        let smoothed = median_smooth(&env, 3);
        assert_eq!(smoothed[2], 0.0);
        // Single-frame dropout inside a tone is filled
        assert_eq!(smoothed[7], 0.8);
        assert_eq!(smoothed.len(), env.len());
    }

    #[test]
    fn test_rms_envelope_frame_count() {
        let samples = vec![0.5f32; 1000];
        let env = rms_envelope(&samples, 160, 80);
        assert_eq!(env.len(), (1000 - 160) / 80 + 1);
        assert!(env.iter().all(|&v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_rms_envelope_short_buffer_is_one_frame() {
        let samples = vec![0.5f32; 10];
        assert_eq!(rms_envelope(&samples, 160, 80).len(), 1);
    }

    #[test]
    fn test_frames_to_window() {
        let layout = layout(100);
        let window = layout.frames_to_window(10, 20).unwrap();
        assert_eq!(window.start_sample, 800);
        assert_eq!(window.end_sample, 19 * 80 + 160);
        assert!(layout.frames_to_window(5, 5).is_none());
    }

    #[test]
    fn test_locate_tone_gap_tone() {
        // 50 silent, 100 tone (1 s), 20 gap, 300 tone (3 s), 50 silent
        let env = envelope(&[(0.0, 50), (0.7, 100), (0.0, 20), (0.7, 300), (0.0, 50)]);
        let pair = pair_from_envelope(&env, layout(env.len()), RATE, &params());

        let tone1 = pair.tone1.expect("tone1");
        let tone2 = pair.tone2.expect("tone2");
        assert_eq!(tone1.start_sample, 50 * 80);
        assert_eq!(tone2.start_sample, 170 * 80);
        assert!((tone1.duration_s(RATE) - 1.01).abs() < 0.02);
        assert!((tone2.duration_s(RATE) - 3.01).abs() < 0.02);
    }

    #[test]
    fn test_silent_envelope_has_no_tones() {
        let env = vec![0.0; 400];
        let pair = pair_from_envelope(&env, layout(env.len()), RATE, &params());
        assert_eq!(pair, SegmentPair::default());
    }

    #[test]
    fn test_short_burst_is_not_tone1() {
        let env = envelope(&[(0.0, 50), (0.7, 30), (0.0, 300)]);
        let pair = pair_from_envelope(&env, layout(env.len()), RATE, &params());
        assert!(pair.tone1.is_none());
        assert!(pair.tone2.is_none());
    }

    #[test]
    fn test_tone2_beyond_gap_is_incomplete() {
        // 800 ms gap exceeds the 500 ms maximum
        let env = envelope(&[(0.0, 20), (0.7, 100), (0.0, 80), (0.7, 300), (0.0, 20)]);
        let pair = pair_from_envelope(&env, layout(env.len()), RATE, &params());
        assert!(pair.tone1.is_some());
        assert!(pair.tone2.is_none());
    }

    #[test]
    fn test_tone2_wrong_duration_is_incomplete() {
        let env = envelope(&[(0.0, 20), (0.7, 100), (0.0, 20), (0.7, 100), (0.0, 20)]);
        let pair = pair_from_envelope(&env, layout(env.len()), RATE, &params());
        assert!(pair.tone1.is_some());
        assert!(pair.tone2.is_none());
    }

    #[test]
    fn test_click_inside_gap_is_skipped() {
        // A 50 ms click between the tones does not hide tone2
        let env = envelope(&[
            (0.0, 20),
            (0.7, 100),
            (0.0, 10),
            (0.7, 5),
            (0.0, 10),
            (0.7, 300),
            (0.0, 20),
        ]);
        let pair = pair_from_envelope(&env, layout(env.len()), RATE, &params());
        let tone2 = pair.tone2.expect("tone2 after click");
        assert_eq!(tone2.start_sample, 145 * 80);
    }

    #[test]
    fn test_only_first_sequence_is_reported() {
        let env = envelope(&[
            (0.0, 20),
            (0.7, 100),
            (0.0, 20),
            (0.7, 300),
            (0.0, 100),
            (0.7, 100),
            (0.0, 20),
            (0.7, 300),
        ]);
        let pair = pair_from_envelope(&env, layout(env.len()), RATE, &params());
        assert_eq!(pair.tone1.map(|w| w.start_sample), Some(20 * 80));
        assert_eq!(pair.tone2.map(|w| w.start_sample), Some(140 * 80));
    }

    #[test]
    fn test_tone1_is_searched_past_non_conforming_runs() {
        // Leading 300 ms burst is too short to be tone1
        let env = envelope(&[(0.0, 10), (0.7, 30), (0.0, 40), (0.7, 100), (0.0, 20), (0.7, 300)]);
        let pair = pair_from_envelope(&env, layout(env.len()), RATE, &params());
        assert_eq!(pair.tone1.map(|w| w.start_sample), Some(80 * 80));
        assert!(pair.tone2.is_some());
    }

    #[test]
    fn test_pair_windows_respects_custom_timing() {
        let mut custom = params();
        custom.tone1 = ToneTiming::new(0.5, 0.4, 0.6);
        custom.tone2 = ToneTiming::new(0.5, 0.4, 0.6);

        let windows = [
            ToneWindow::new(0, 4000).unwrap(),
            ToneWindow::new(4800, 8800).unwrap(),
        ];
        let pair = pair_windows(&windows, RATE, &custom);
        assert_eq!(pair.tone1, Some(windows[0]));
        assert_eq!(pair.tone2, Some(windows[1]));

        let defaults = pair_windows(&windows, RATE, &params());
        assert_eq!(defaults, SegmentPair::default());
    }

    #[test]
    fn test_timing_conformance() {
        let p = params();
        let exact = SegmentPair {
            tone1: ToneWindow::new(0, 8000),
            tone2: ToneWindow::new(8000, 8000 + 24000),
        };
        assert!((timing_conformance(&exact, RATE, &p) - 1.0).abs() < 1e-9);

        // 200 ms gap scores 0.6 on its own
        let gapped = SegmentPair {
            tone1: ToneWindow::new(0, 8000),
            tone2: ToneWindow::new(9600, 9600 + 24000),
        };
        assert!((timing_conformance(&gapped, RATE, &p) - 2.6 / 3.0).abs() < 1e-9);

        let partial = SegmentPair {
            tone1: ToneWindow::new(0, 8000),
            tone2: None,
        };
        assert!((timing_conformance(&partial, RATE, &p) - 1.0 / 3.0).abs() < 1e-9);

        assert_eq!(timing_conformance(&SegmentPair::default(), RATE, &p), 0.0);
    }

    #[test]
    fn test_longer_gap_lowers_timing_conformance() {
        let p = params();
        let with_gap = |gap_samples: usize| SegmentPair {
            tone1: ToneWindow::new(0, 8000),
            tone2: ToneWindow::new(8000 + gap_samples, 8000 + gap_samples + 24000),
        };
        let short = timing_conformance(&with_gap(400), RATE, &p);
        let long = timing_conformance(&with_gap(3600), RATE, &p);
        assert!(short > long, "short {:.3} vs long {:.3}", short, long);
    }

    #[test]
    fn test_threshold_tracks_noise_floor() {
        // 40 noise frames at 0.1, tone at 0.6
        let env = envelope(&[(0.1, 40), (0.6, 200), (0.1, 40)]);
        let threshold = active_threshold(&env, &params().envelope).unwrap();
        assert!((threshold - 0.2).abs() < 1e-6, "threshold {}", threshold);

        // Silent floor: the peak bound takes over
        let env = envelope(&[(0.0, 40), (0.6, 200), (0.0, 40)]);
        let threshold = active_threshold(&env, &params().envelope).unwrap();
        assert!((threshold - 0.06).abs() < 1e-6, "threshold {}", threshold);
    }

    #[test]
    fn test_threshold_capped_when_clip_has_no_silence() {
        let env = vec![0.4; 300];
        let threshold = active_threshold(&env, &params().envelope).unwrap();
        assert!((threshold - 0.2).abs() < 1e-6);
        assert_eq!(find_runs(&env, threshold).len(), 1);
    }

    #[test]
    fn test_quiet_tone1_next_to_loud_tone2() {
        let env = envelope(&[(0.0, 50), (0.14, 100), (0.0, 20), (0.42, 300), (0.0, 50)]);
        let pair = pair_from_envelope(&env, layout(env.len()), RATE, &params());
        assert_eq!(pair.tone1.map(|w| w.start_sample), Some(50 * 80));
        assert_eq!(pair.tone2.map(|w| w.start_sample), Some(170 * 80));
    }

    #[test]
    fn test_quiet_tone2_after_loud_tone1() {
        let env = envelope(&[(0.0, 50), (0.42, 100), (0.0, 20), (0.14, 300), (0.0, 50)]);
        let pair = pair_from_envelope(&env, layout(env.len()), RATE, &params());
        assert!(pair.tone1.is_some());
        assert_eq!(pair.tone2.map(|w| w.start_sample), Some(170 * 80));
    }

    #[test]
    fn test_noise_floor_percentile() {
        let env = envelope(&[(0.0, 10), (0.5, 90)]);
        assert_eq!(noise_floor(&env, 0.05), 0.0);
        assert_eq!(noise_floor(&env, 0.5), 0.5);
        assert_eq!(noise_floor(&[], 0.1), 0.0);
    }

    #[test]
    fn test_split_run_at_frequency_change() {
        let run = Run { start_frame: 20, end_frame: 420 };
        let track: Vec<Option<f64>> = std::iter::repeat(Some(600.0))
            .take(100)
            .chain(std::iter::repeat(Some(1092.0)).take(300))
            .collect();

        let pieces = split_run(run, &track, &params().split);
        assert_eq!(
            pieces,
            vec![
                Run { start_frame: 20, end_frame: 120 },
                Run { start_frame: 120, end_frame: 420 },
            ]
        );
    }

    #[test]
    fn test_split_run_ignores_jitter_and_dropouts() {
        let run = Run { start_frame: 0, end_frame: 200 };
        let mut track: Vec<Option<f64>> = (0..200).map(|k| Some(600.0 + (k % 5) as f64 - 2.0)).collect();
        track[50] = None;
        track[51] = Some(1400.0);
        track[120] = Some(900.0);
        track[121] = Some(900.0);

        assert_eq!(split_run(run, &track, &params().split), vec![run]);
    }

    #[test]
    fn test_split_run_takes_reference_after_unresolved_onset() {
        let run = Run { start_frame: 0, end_frame: 150 };
        let mut track = vec![Some(600.0); 150];
        track[0] = None;
        track[1] = None;

        assert_eq!(split_run(run, &track, &params().split), vec![run]);
    }

    #[test]
    fn test_split_run_separates_close_tones() {
        // Adjacent table tones can be 20 Hz apart
        let run = Run { start_frame: 0, end_frame: 400 };
        let track: Vec<Option<f64>> = (0..400)
            .map(|k| Some(if k < 100 { 349.0 } else { 368.5 }))
            .collect();
        assert_eq!(split_run(run, &track, &params().split).len(), 2);
    }

    #[test]
    fn test_runs_to_windows_joins_split_pieces() {
        let layout = layout(500);
        let runs = [
            Run { start_frame: 10, end_frame: 110 },
            Run { start_frame: 110, end_frame: 410 },
        ];
        let windows = runs_to_windows(&runs, layout);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].end_sample, windows[1].start_sample);
        assert_eq!(windows[0].start_sample, 10 * 80);
        assert_eq!(windows[1].end_sample, 409 * 80 + 160);
    }

    #[test]
    fn test_locate_tones_without_gap() {
        let mut samples = vec![0.0f32; 1600];
        samples.extend(sine(600.9, 1.0));
        samples.extend(sine(1092.4, 3.0));
        samples.extend(vec![0.0f32; 1600]);
        let buffer = SampleBuffer::new(samples, RATE).unwrap();

        let pair = locate(&buffer, &params(), 200.0, 3000.0);

        let tone1 = pair.tone1.expect("tone1");
        let tone2 = pair.tone2.expect("tone2");
        assert!((tone1.duration_s(RATE) - 1.0).abs() < 0.05, "tone1 {:?}", tone1);
        assert!((tone2.duration_s(RATE) - 3.0).abs() < 0.05, "tone2 {:?}", tone2);
        assert_eq!(tone1.end_sample, tone2.start_sample);
        assert!((tone2.start_sample as i64 - (1600 + 8000)).abs() <= 160);
    }

    #[test]
    fn test_frequency_track_follows_the_tone() {
        let samples = sine(1000.0, 0.5);
        let buffer = SampleBuffer::new(samples, RATE).unwrap();
        let layout = FrameLayout::for_buffer(&buffer, &params().envelope);
        let estimator = frame_estimator(RATE, layout, 200.0, 3000.0);
        let run = Run { start_frame: 0, end_frame: 20 };

        let track = frequency_track(buffer.samples(), layout, run, &estimator);
        assert_eq!(track.len(), 20);
        assert!(track.iter().all(|f| f.map_or(false, |hz| (hz - 1000.0).abs() < 5.0)), "{:?}", track);
    }
}
