use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use nalgebra::{Matrix4, UnitQuaternion, Vector3};
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};

use odobench::{
    bench::{run_benchmark, BenchOptions, TrajectoryWriter},
    dataset::{FrameSource, SequenceDataset, SequenceInfo, VecFrameSource},
    error::BenchError,
    registration::{Frame, RegistrationEngine, RegistrationSummary},
    report::JsonReportSink,
    trajectory::{PoseInterval, Trajectory},
    transform::Transform,
    viz::{VizCoordinator, VizScene, VizSink},
};

/// Runs the odometry benchmark on a synthetic dataset: circular ground-truth
/// motion registered by a noisy mock engine.
#[derive(Parser)]
struct Args {
    /// Number of synthetic sequences to generate
    #[clap(long, default_value_t = 3)]
    num_sequences: usize,
    /// Frames per sequence
    #[clap(long, default_value_t = 2000)]
    num_frames: usize,
    /// Directory for the metrics report and the estimated poses
    #[clap(long, default_value = "./outputs")]
    output_dir: PathBuf,
    /// Run only this sequence instead of all of them
    #[clap(long)]
    sequence: Option<String>,
    /// Start frame index, used with --sequence
    #[clap(long, default_value_t = 0)]
    start_index: usize,
    /// Maximum number of frames to register per sequence
    #[clap(long)]
    max_frames: Option<usize>,
    /// Abort the whole run on the first registration or save failure
    #[clap(long, action)]
    suspend_on_failure: bool,
    /// Simulate a registration failure at this frame index
    #[clap(long)]
    fail_at: Option<usize>,
    /// Translation noise of the mock engine, meters
    #[clap(long, default_value_t = 0.02)]
    noise: f64,
    /// Mirror progress to a logging render consumer
    #[clap(long, short, action)]
    with_viz: bool,
}

const FRAME_DT: f64 = 0.1;
const SPEED_M_S: f64 = 10.0;
const CIRCLE_RADIUS_M: f64 = 300.0;

/// Pose on the reference circle at time `t`.
fn circle_pose(t: f64) -> Transform {
    let angle = SPEED_M_S * t / CIRCLE_RADIUS_M;
    let translation = Vector3::new(
        CIRCLE_RADIUS_M * angle.sin(),
        CIRCLE_RADIUS_M * (1.0 - angle.cos()),
        0.0,
    );
    Transform::new(
        &translation,
        &UnitQuaternion::from_scaled_axis(Vector3::z() * angle),
    )
}

struct SyntheticDataset {
    num_sequences: usize,
    num_frames: usize,
}

impl SequenceDataset for SyntheticDataset {
    fn sequences(&self) -> Vec<SequenceInfo> {
        (0..self.num_sequences)
            .map(|id| SequenceInfo {
                id,
                name: format!("{id:02}"),
            })
            .collect()
    }

    fn frame_source(&self, sequence: &SequenceInfo) -> Result<Box<dyn FrameSource>, BenchError> {
        let mut rng = StdRng::seed_from_u64(sequence.id as u64);
        let frames = (0..self.num_frames)
            .map(|i| {
                let mut points = Array2::<f32>::zeros((100, 3));
                for value in points.iter_mut() {
                    *value = rng.gen_range(-20.0..20.0);
                }
                Frame::new(points, i as f64 * FRAME_DT, (i + 1) as f64 * FRAME_DT)
            })
            .collect();
        Ok(Box::new(VecFrameSource::new(frames)))
    }

    fn has_ground_truth(&self, sequence: &SequenceInfo) -> bool {
        // The last sequence plays the role of a dataset split without ground
        // truth; it still contributes to the run totals.
        self.num_sequences == 1 || sequence.id + 1 < self.num_sequences
    }

    fn load_ground_truth(&self, _sequence: &SequenceInfo) -> Result<Trajectory, BenchError> {
        Ok((0..self.num_frames)
            .map(|i| circle_pose((i as f64 + 0.5) * FRAME_DT))
            .collect())
    }
}

/// Mock engine: replays the circle with additive pose noise.
struct NoisyCircleEngine {
    rng: StdRng,
    noise: f64,
    fail_at: Option<usize>,
    calls: usize,
}

impl NoisyCircleEngine {
    fn new(noise: f64, fail_at: Option<usize>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(42),
            noise,
            fail_at,
            calls: 0,
        }
    }

    fn perturbed(&mut self, t: f64) -> Transform {
        let jitter = Vector3::new(
            self.rng.gen_range(-self.noise..self.noise),
            self.rng.gen_range(-self.noise..self.noise),
            self.rng.gen_range(-self.noise..self.noise),
        );
        let pose = circle_pose(t);
        Transform::new(&(pose.translation() + jitter), &pose.rotation())
    }
}

impl RegistrationEngine for NoisyCircleEngine {
    fn register_frame(&mut self, frame: &Frame) -> RegistrationSummary {
        if self.fail_at == Some(self.calls) {
            self.calls += 1;
            return RegistrationSummary::failure("simulated registration failure");
        }
        self.calls += 1;

        let interval = PoseInterval::new(
            self.perturbed(frame.begin_timestamp),
            self.perturbed(frame.end_timestamp),
        );
        let corrected_points = interval.mid_pose().transform(frame.points.clone());
        RegistrationSummary {
            success: true,
            error_message: String::new(),
            number_of_attempts: if self.rng.gen_bool(0.05) { 2 } else { 1 },
            frame: interval,
            corrected_points,
        }
    }
}

/// Writes each pose as one line of its 3×4 matrix, row major.
struct TextPoseWriter {
    output_dir: PathBuf,
}

impl TrajectoryWriter for TextPoseWriter {
    fn save_poses(&self, sequence_name: &str, trajectory: &Trajectory) -> bool {
        let path = self.output_dir.join(format!("{sequence_name}_poses.txt"));
        let file = match File::create(&path) {
            Ok(file) => file,
            Err(err) => {
                log::warn!("Could not create {}: {err}", path.display());
                return false;
            }
        };

        let mut writer = BufWriter::new(file);
        for pose in trajectory.iter() {
            let matrix: Matrix4<f64> = pose.clone().into();
            let mut row = Vec::with_capacity(12);
            for r in 0..3 {
                for c in 0..4 {
                    row.push(format!("{:.9}", matrix[(r, c)]));
                }
            }
            if writeln!(writer, "{}", row.join(" ")).is_err() {
                return false;
            }
        }
        true
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(err) = std::fs::create_dir_all(&args.output_dir) {
        log::error!(
            "Could not create output directory {}: {err}",
            args.output_dir.display()
        );
        std::process::exit(1);
    }

    let dataset = SyntheticDataset {
        num_sequences: args.num_sequences,
        num_frames: args.num_frames,
    };
    let report_sink = JsonReportSink::new(args.output_dir.join("metrics.json"));
    let pose_writer = TextPoseWriter {
        output_dir: args.output_dir.clone(),
    };

    let options = BenchOptions {
        suspend_on_failure: args.suspend_on_failure,
        save_trajectory: true,
        all_sequences: args.sequence.is_none(),
        sequence: args.sequence.clone().unwrap_or_default(),
        start_index: args.start_index,
        max_frames: args.max_frames,
    };

    let viz = args.with_viz.then(|| {
        VizCoordinator::spawn(
            |scene: &VizScene| {
                log::debug!(
                    "render: {} poses, {} point clouds",
                    scene.trajectory.len(),
                    scene.point_clouds.len()
                );
            },
            Duration::from_millis(50),
        )
    });

    let mut engine_factory =
        || Box::new(NoisyCircleEngine::new(args.noise, args.fail_at)) as Box<dyn RegistrationEngine>;

    let result = run_benchmark(
        &dataset,
        &mut engine_factory,
        viz.as_ref().map(|coordinator| coordinator as &dyn VizSink),
        &report_sink,
        &pose_writer,
        &options,
    );

    // The render thread is joined before the exit code is decided, on the
    // failure path as well.
    if let Some(coordinator) = viz {
        coordinator.join();
    }

    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}
