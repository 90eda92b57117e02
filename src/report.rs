use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use crate::evaluate::SequenceErrors;

/// Growing cross-sequence state of one benchmark run: the per-sequence error
/// reports plus run totals that accumulate for every sequence, with or
/// without ground truth.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// One entry per evaluated sequence; recording the same name twice
    /// overwrites the previous entry.
    pub sequence_errors: BTreeMap<String, SequenceErrors>,
    pub total_registration_elapsed_ms: f64,
    pub total_frames: usize,
}

/// Cross-sequence aggregate, in the units of the KITTI leaderboard.
#[derive(Clone, Copy, Debug)]
pub struct BenchmarkSummary {
    /// Segment-weighted mean translation error, percent.
    pub translation_error_pct: f64,
    /// Segment-weighted mean rotation error, degrees per meter.
    pub rotation_error_deg_per_meter: f64,
    /// Unweighted mean of the per-sequence mean RPE.
    pub mean_rpe: f64,
}

/// Persists the benchmark report. Implementations rewrite the whole report on
/// every call; a `false` return is a warning for the caller to escalate or
/// ignore.
pub trait ReportSink {
    fn save(&self, report: &BenchmarkReport) -> bool;
}

/// Sink that discards the report. For runs that only print to stdout.
pub struct NullReportSink;

impl ReportSink for NullReportSink {
    fn save(&self, _report: &BenchmarkReport) -> bool {
        true
    }
}

/// Writes the report as pretty-printed JSON, truncating any previous file.
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ReportSink for JsonReportSink {
    fn save(&self, report: &BenchmarkReport) -> bool {
        let file = match File::create(&self.path) {
            Ok(file) => file,
            Err(err) => {
                log::warn!(
                    "Could not create report file {}: {err}",
                    self.path.display()
                );
                return false;
            }
        };

        match serde_json::to_writer_pretty(BufWriter::new(file), report) {
            Ok(()) => true,
            Err(err) => {
                log::warn!(
                    "Could not write report file {}: {err}",
                    self.path.display()
                );
                false
            }
        }
    }
}

impl BenchmarkReport {
    /// Folds one sequence's contribution into the run totals. Called for
    /// every sequence, evaluated or not.
    pub fn add_run_totals(&mut self, registration_elapsed_ms: f64, frames: usize) {
        self.total_registration_elapsed_ms += registration_elapsed_ms;
        self.total_frames += frames;
    }

    /// Inserts or overwrites the entry for `name` and immediately rewrites
    /// the persisted report, so a crash after any sequence loses at most the
    /// one in progress. Returns the sink's save outcome.
    pub fn record_sequence(
        &mut self,
        name: &str,
        errors: SequenceErrors,
        sink: &dyn ReportSink,
    ) -> bool {
        self.sequence_errors.insert(name.to_string(), errors);
        sink.save(self)
    }

    /// Whole-run average registration time per frame, milliseconds.
    pub fn average_registration_ms(&self) -> f64 {
        if self.total_frames == 0 {
            0.0
        } else {
            self.total_registration_elapsed_ms / self.total_frames as f64
        }
    }

    /// Aggregates every segment error across all recorded sequences.
    ///
    /// The translation/rotation figures divide by the total segment count,
    /// so sequences with more valid segments weigh proportionally more;
    /// `mean_rpe` is the plain mean over sequences. `None` when no sequence
    /// was recorded.
    pub fn finalize_summary(&self) -> Option<BenchmarkSummary> {
        if self.sequence_errors.is_empty() {
            return None;
        }

        let mut t_err_sum = 0.0;
        let mut r_err_sum = 0.0;
        let mut num_segments = 0usize;
        let mut rpe_sum = 0.0;
        for errors in self.sequence_errors.values() {
            for segment in &errors.segments {
                t_err_sum += segment.t_err;
                r_err_sum += segment.r_err;
                num_segments += 1;
            }
            rpe_sum += errors.mean_rpe;
        }

        let (translation_error_pct, rotation_error_deg_per_meter) = if num_segments > 0 {
            (
                100.0 * t_err_sum / num_segments as f64,
                (r_err_sum / num_segments as f64).to_degrees(),
            )
        } else {
            (0.0, 0.0)
        };

        Some(BenchmarkSummary {
            translation_error_pct,
            rotation_error_deg_per_meter,
            mean_rpe: rpe_sum / self.sequence_errors.len() as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::SegmentError;
    use approx::assert_relative_eq;

    fn errors_with_segments(segments: Vec<SegmentError>, mean_rpe: f64) -> SequenceErrors {
        SequenceErrors {
            mean_rpe,
            mean_ape: 0.0,
            max_ape: 0.0,
            mean_local_err: 0.0,
            max_local_err: 0.0,
            index_max_local_err: None,
            average_elapsed_ms: 0.0,
            mean_num_attempts: 1.0,
            num_poses: 0,
            segments,
            valid: true,
        }
    }

    fn segment(t_err: f64, r_err: f64) -> SegmentError {
        SegmentError { t_err, r_err }
    }

    #[test]
    fn test_record_overwrites() {
        let mut report = BenchmarkReport::default();
        report.record_sequence("00", errors_with_segments(vec![], 1.0), &NullReportSink);
        report.record_sequence("00", errors_with_segments(vec![], 2.0), &NullReportSink);

        assert_eq!(report.sequence_errors.len(), 1);
        assert_relative_eq!(report.sequence_errors["00"].mean_rpe, 2.0);
    }

    #[test]
    fn test_summary_weights_by_segment_count() {
        // Two sequences with 2 and 3 segments: the aggregate divides by 5,
        // not by the mean of two per-sequence means.
        let mut report = BenchmarkReport::default();
        report.record_sequence(
            "00",
            errors_with_segments(vec![segment(0.01, 0.001), segment(0.03, 0.003)], 2.0),
            &NullReportSink,
        );
        report.record_sequence(
            "01",
            errors_with_segments(
                vec![
                    segment(0.02, 0.002),
                    segment(0.04, 0.004),
                    segment(0.06, 0.006),
                ],
                4.0,
            ),
            &NullReportSink,
        );

        let summary = report.finalize_summary().unwrap();
        let expected_t: f64 = (0.01 + 0.03 + 0.02 + 0.04 + 0.06) / 5.0;
        let expected_r: f64 = (0.001 + 0.003 + 0.002 + 0.004 + 0.006) / 5.0;
        assert_relative_eq!(summary.translation_error_pct, 100.0 * expected_t);
        assert_relative_eq!(
            summary.rotation_error_deg_per_meter,
            expected_r.to_degrees()
        );
        assert_relative_eq!(summary.mean_rpe, 3.0);
    }

    #[test]
    fn test_summary_empty_report() {
        let report = BenchmarkReport::default();
        assert!(report.finalize_summary().is_none());
    }

    #[test]
    fn test_average_registration_guarded() {
        let mut report = BenchmarkReport::default();
        assert_relative_eq!(report.average_registration_ms(), 0.0);

        report.add_run_totals(100.0, 4);
        assert_relative_eq!(report.average_registration_ms(), 25.0);
    }

    #[test]
    fn test_json_sink_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let sink = JsonReportSink::new(&path);

        let mut report = BenchmarkReport::default();
        report.add_run_totals(10.0, 2);
        assert!(report.record_sequence("00", errors_with_segments(vec![], 1.5), &sink));

        let loaded: BenchmarkReport =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(loaded.sequence_errors.len(), 1);
        assert_eq!(loaded.total_frames, 2);
        assert_relative_eq!(loaded.sequence_errors["00"].mean_rpe, 1.5);
    }

    #[test]
    fn test_json_sink_unwritable_path_is_warning() {
        let sink = JsonReportSink::new("/nonexistent-dir/metrics.json");
        assert!(!sink.save(&BenchmarkReport::default()));
    }
}
