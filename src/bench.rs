use crate::{
    dataset::{SequenceDataset, SequenceInfo},
    error::BenchError,
    evaluate::{evaluate, SequenceErrors},
    registration::RegistrationEngine,
    report::{BenchmarkReport, ReportSink},
    runner::{run_sequence, SequenceOutcome},
    trajectory::Trajectory,
    viz::VizSink,
};

/// Run-level options, mirroring the benchmark configuration file.
#[derive(Clone, Debug)]
pub struct BenchOptions {
    /// Escalate registration and persistence failures to a run abort.
    pub suspend_on_failure: bool,
    /// Save each sequence's estimated trajectory through the writer.
    pub save_trajectory: bool,
    /// Run every sequence of the dataset; when false, only `sequence`.
    pub all_sequences: bool,
    /// The desired sequence (only applicable if `all_sequences` is false).
    pub sequence: String,
    /// Start frame of the sequence (only applicable if `all_sequences` is
    /// false).
    pub start_index: usize,
    /// Maximum number of frames to register per sequence.
    pub max_frames: Option<usize>,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            suspend_on_failure: false,
            save_trajectory: true,
            all_sequences: true,
            sequence: String::new(),
            start_index: 0,
            max_frames: None,
        }
    }
}

/// Persists estimated trajectories. The on-disk pose format is the
/// implementation's concern; a `false` return is a warning for the caller.
pub trait TrajectoryWriter {
    fn save_poses(&self, sequence_name: &str, trajectory: &Trajectory) -> bool;
}

/// Writer that discards trajectories.
pub struct NullTrajectoryWriter;

impl TrajectoryWriter for NullTrajectoryWriter {
    fn save_poses(&self, _sequence_name: &str, _trajectory: &Trajectory) -> bool {
        true
    }
}

fn select_sequences(
    dataset: &dyn SequenceDataset,
    options: &BenchOptions,
) -> Result<Vec<SequenceInfo>, BenchError> {
    let mut sequences = dataset.sequences();
    if options.all_sequences {
        return Ok(sequences);
    }

    let position = sequences
        .iter()
        .position(|sequence| sequence.name == options.sequence)
        .ok_or_else(|| BenchError::SequenceNotFound(options.sequence.clone()))?;
    Ok(vec![sequences.swap_remove(position)])
}

fn print_sequence_results(sequence: &SequenceInfo, errors: &SequenceErrors) {
    println!("[RESULTS] Sequence {}", sequence.name);
    if !errors.valid {
        println!(
            "Invalid trajectory, evaluated on the first {} poses",
            errors.num_poses
        );
    }
    println!("Average Number of Attempts : {:.2}", errors.mean_num_attempts);
    println!("Mean RPE : {:.4}", errors.mean_rpe);
    println!("Mean APE : {:.4}", errors.mean_ape);
    println!("Max APE : {:.4}", errors.max_ape);
    println!("Mean Local Error : {:.6}", errors.mean_local_err);
    println!("Max Local Error : {:.6}", errors.max_local_err);
    match errors.index_max_local_err {
        Some(index) => println!("Index Max Local Error : {index}"),
        None => println!("Index Max Local Error : n/a"),
    }
    println!("Average Duration (ms) : {:.4}", errors.average_elapsed_ms);
    println!();
}

/// Runs the benchmark over the selected sequences and aggregates the report.
///
/// All fatal conditions bubble up as [`BenchError`] to this single decision
/// point; the caller owns the visualization thread and must join it before
/// turning the result into an exit code.
pub fn run_benchmark(
    dataset: &dyn SequenceDataset,
    engine_factory: &mut dyn FnMut() -> Box<dyn RegistrationEngine>,
    viz: Option<&dyn VizSink>,
    report_sink: &dyn ReportSink,
    trajectory_writer: &dyn TrajectoryWriter,
    options: &BenchOptions,
) -> Result<BenchmarkReport, BenchError> {
    let sequences = select_sequences(dataset, options)?;
    log::info!("Benchmarking {} sequence(s)", sequences.len());

    let mut report = BenchmarkReport::default();
    for sequence in &sequences {
        let mut source = dataset.frame_source(sequence)?;
        if !options.all_sequences && options.start_index > 0 {
            log::info!("Starting at frame {}", options.start_index);
            source.set_init_frame(options.start_index);
        }

        let mut engine = engine_factory();
        let run = run_sequence(
            &sequence.name,
            source.as_mut(),
            engine.as_mut(),
            viz,
            options.max_frames,
        )?;
        report.add_run_totals(run.registration_elapsed_ms, run.frames_processed);

        if let SequenceOutcome::Failed {
            frame_index,
            message,
        } = &run.outcome
        {
            if options.suspend_on_failure {
                return Err(BenchError::RegistrationAborted {
                    sequence: sequence.name.clone(),
                    frame_index: *frame_index,
                    message: message.clone(),
                });
            }
        }

        if options.save_trajectory
            && !trajectory_writer.save_poses(&sequence.name, &run.trajectory)
        {
            log::warn!(
                "Error while saving the poses of sequence {}; check that the output directory exists",
                sequence.name
            );
            if options.suspend_on_failure {
                return Err(BenchError::PersistenceFailed(format!(
                    "could not save the poses of sequence {}",
                    sequence.name
                )));
            }
        }

        if dataset.has_ground_truth(sequence) {
            let ground_truth = dataset.load_ground_truth(sequence)?;
            let average_elapsed_ms = if run.frames_processed > 0 {
                run.registration_elapsed_ms / run.frames_processed as f64
            } else {
                0.0
            };
            let errors = evaluate(&ground_truth, &run.trajectory)
                .with_timing(average_elapsed_ms, run.avg_attempts);

            print_sequence_results(sequence, &errors);
            if !report.record_sequence(&sequence.name, errors, report_sink) {
                log::warn!(
                    "Error while saving the benchmark report after sequence {}",
                    sequence.name
                );
                if options.suspend_on_failure {
                    return Err(BenchError::PersistenceFailed(
                        "could not save the benchmark report".to_string(),
                    ));
                }
            }
        }
    }

    if let Some(summary) = report.finalize_summary() {
        println!(
            "KITTI metric translation/rotation : {:.4} {:.4}",
            summary.translation_error_pct, summary.rotation_error_deg_per_meter
        );
        println!("Average RPE on sequences : {:.4}", summary.mean_rpe);
    }
    println!(
        "Average registration time for all sequences (ms) : {:.4}",
        report.average_registration_ms()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FrameSource, VecFrameSource};
    use crate::registration::{Frame, RegistrationSummary};
    use crate::report::NullReportSink;
    use crate::trajectory::PoseInterval;
    use crate::transform::Transform;
    use nalgebra::{UnitQuaternion, Vector3};
    use ndarray::Array2;

    struct FakeDataset {
        sequences: Vec<SequenceInfo>,
        frames_per_sequence: usize,
        ground_truth: Vec<String>,
    }

    impl SequenceDataset for FakeDataset {
        fn sequences(&self) -> Vec<SequenceInfo> {
            self.sequences.clone()
        }

        fn frame_source(
            &self,
            _sequence: &SequenceInfo,
        ) -> Result<Box<dyn FrameSource>, BenchError> {
            let frames = (0..self.frames_per_sequence)
                .map(|i| Frame::new(Array2::zeros((1, 3)), i as f64, i as f64 + 0.1))
                .collect();
            Ok(Box::new(VecFrameSource::new(frames)))
        }

        fn has_ground_truth(&self, sequence: &SequenceInfo) -> bool {
            self.ground_truth.contains(&sequence.name)
        }

        fn load_ground_truth(&self, _sequence: &SequenceInfo) -> Result<Trajectory, BenchError> {
            // Matches StraightEngine's mid poses.
            Ok((0..self.frames_per_sequence)
                .map(|i| {
                    Transform::new(
                        &Vector3::new(i as f64 + 0.5, 0.0, 0.0),
                        &UnitQuaternion::from_scaled_axis(Vector3::zeros()),
                    )
                })
                .collect())
        }
    }

    struct StraightEngine {
        pose: Transform,
        fail_at: Option<usize>,
        calls: usize,
    }

    impl RegistrationEngine for StraightEngine {
        fn register_frame(&mut self, _frame: &Frame) -> RegistrationSummary {
            if self.fail_at == Some(self.calls) {
                self.calls += 1;
                return RegistrationSummary::failure("lost track");
            }
            self.calls += 1;

            let step = Transform::new(
                &Vector3::new(1.0, 0.0, 0.0),
                &UnitQuaternion::from_scaled_axis(Vector3::zeros()),
            );
            let begin = self.pose.clone();
            self.pose = &self.pose * &step;
            RegistrationSummary {
                success: true,
                error_message: String::new(),
                number_of_attempts: 1,
                frame: PoseInterval::new(begin, self.pose.clone()),
                corrected_points: Array2::zeros((1, 3)),
            }
        }
    }

    fn straight_factory(fail_at: Option<usize>) -> impl FnMut() -> Box<dyn RegistrationEngine> {
        move || {
            Box::new(StraightEngine {
                pose: Transform::eye(),
                fail_at,
                calls: 0,
            }) as Box<dyn RegistrationEngine>
        }
    }

    fn sequence(id: usize, name: &str) -> SequenceInfo {
        SequenceInfo {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_only_ground_truth_sequences_are_evaluated() {
        let dataset = FakeDataset {
            sequences: vec![sequence(0, "A"), sequence(1, "B")],
            frames_per_sequence: 10,
            ground_truth: vec!["A".to_string()],
        };
        let mut factory = straight_factory(None);

        let report = run_benchmark(
            &dataset,
            &mut factory,
            None,
            &NullReportSink,
            &NullTrajectoryWriter,
            &BenchOptions::default(),
        )
        .unwrap();

        assert_eq!(report.sequence_errors.len(), 1);
        assert!(report.sequence_errors.contains_key("A"));
        // Both sequences contribute to the run totals.
        assert_eq!(report.total_frames, 20);
        assert!(report.sequence_errors["A"].valid);
    }

    #[test]
    fn test_sequence_not_found_is_fatal() {
        let dataset = FakeDataset {
            sequences: vec![sequence(0, "A")],
            frames_per_sequence: 1,
            ground_truth: vec![],
        };
        let mut factory = straight_factory(None);

        let result = run_benchmark(
            &dataset,
            &mut factory,
            None,
            &NullReportSink,
            &NullTrajectoryWriter,
            &BenchOptions {
                all_sequences: false,
                sequence: "Z".to_string(),
                ..BenchOptions::default()
            },
        );

        assert!(matches!(result, Err(BenchError::SequenceNotFound(name)) if name == "Z"));
    }

    #[test]
    fn test_failure_without_suspend_continues() {
        let dataset = FakeDataset {
            sequences: vec![sequence(0, "A"), sequence(1, "B")],
            frames_per_sequence: 10,
            ground_truth: vec![],
        };
        let mut factory = straight_factory(Some(4));

        let report = run_benchmark(
            &dataset,
            &mut factory,
            None,
            &NullReportSink,
            &NullTrajectoryWriter,
            &BenchOptions::default(),
        )
        .unwrap();

        // Both sequences break at frame 4 but the run completes.
        assert_eq!(report.total_frames, 8);
    }

    #[test]
    fn test_failure_with_suspend_aborts() {
        let dataset = FakeDataset {
            sequences: vec![sequence(0, "A"), sequence(1, "B")],
            frames_per_sequence: 10,
            ground_truth: vec![],
        };
        let mut factory = straight_factory(Some(4));

        let result = run_benchmark(
            &dataset,
            &mut factory,
            None,
            &NullReportSink,
            &NullTrajectoryWriter,
            &BenchOptions {
                suspend_on_failure: true,
                ..BenchOptions::default()
            },
        );

        assert!(matches!(
            result,
            Err(BenchError::RegistrationAborted { frame_index: 4, .. })
        ));
    }

    #[test]
    fn test_partial_trajectory_is_evaluated_as_invalid() {
        let dataset = FakeDataset {
            sequences: vec![sequence(0, "A")],
            frames_per_sequence: 10,
            ground_truth: vec!["A".to_string()],
        };
        let mut factory = straight_factory(Some(6));

        let report = run_benchmark(
            &dataset,
            &mut factory,
            None,
            &NullReportSink,
            &NullTrajectoryWriter,
            &BenchOptions::default(),
        )
        .unwrap();

        let errors = &report.sequence_errors["A"];
        assert!(!errors.valid);
        assert_eq!(report.total_frames, 6);
    }
}
