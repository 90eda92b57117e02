use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ndarray::Array2;

use crate::trajectory::Trajectory;

/// Number of point-cloud upload slots. Slot indices wrap modulo this bound so
/// the scene keeps a ring of the most recent clouds.
pub const POINT_CLOUD_SLOTS: usize = 500;

/// Capability handed to the sequence loop when visualization is enabled.
///
/// Uploads are write-only from the producer's perspective and eventually
/// consistent; `is_paused` is an advisory flag the producer polls between
/// frames.
pub trait VizSink {
    fn upload_trajectory(&self, trajectory: &Trajectory);
    /// Uploads a point cloud into `slot`, overwriting any prior content.
    fn upload_point_cloud(&self, slot: usize, points: &Array2<f32>);
    fn is_paused(&self) -> bool;
}

/// Sink that drops every upload and never pauses. Satisfies all call sites
/// when visualization is disabled.
pub struct NullViz;

impl VizSink for NullViz {
    fn upload_trajectory(&self, _trajectory: &Trajectory) {}

    fn upload_point_cloud(&self, _slot: usize, _points: &Array2<f32>) {}

    fn is_paused(&self) -> bool {
        false
    }
}

/// State shared with the render consumer: the latest trajectory and the ring
/// of uploaded point clouds.
#[derive(Default)]
pub struct VizScene {
    pub trajectory: Trajectory,
    pub point_clouds: HashMap<usize, Array2<f32>>,
    /// Bumped on every upload; the render thread redraws when it changes.
    pub revision: u64,
}

/// The render side of the bridge. Runs on the coordinator's thread and is
/// called with the scene whenever it changed since the last poll.
pub trait RenderConsumer: Send {
    fn draw(&mut self, scene: &VizScene);
}

impl<F: FnMut(&VizScene) + Send> RenderConsumer for F {
    fn draw(&mut self, scene: &VizScene) {
        self(scene)
    }
}

struct Shared {
    paused: AtomicBool,
    stop: AtomicBool,
    scene: Mutex<VizScene>,
}

/// Bridge between the synchronous sequence loop and an independently
/// scheduled render consumer.
///
/// The coordinator owns the render thread: it is spawned by
/// [`VizCoordinator::spawn`] and joined by [`VizCoordinator::join`] or on
/// drop, so no exit path leaves it orphaned.
pub struct VizCoordinator {
    shared: Arc<Shared>,
    render_thread: Option<JoinHandle<()>>,
}

impl VizCoordinator {
    /// Starts the render thread. The consumer is polled every
    /// `poll_interval` and redrawn when the scene changed.
    pub fn spawn<C: RenderConsumer + 'static>(mut consumer: C, poll_interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            paused: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            scene: Mutex::new(VizScene::default()),
        });

        let thread_shared = shared.clone();
        let render_thread = thread::spawn(move || {
            let mut last_revision = 0u64;
            while !thread_shared.stop.load(Ordering::Relaxed) {
                thread::sleep(poll_interval);
                let scene = match thread_shared.scene.lock() {
                    Ok(scene) => scene,
                    Err(_) => break,
                };
                if scene.revision != last_revision {
                    last_revision = scene.revision;
                    consumer.draw(&scene);
                }
            }
        });

        Self {
            shared,
            render_thread: Some(render_thread),
        }
    }

    /// Handle for the consumer side to pause and resume the producer.
    pub fn pause_handle(&self) -> PauseHandle {
        PauseHandle(self.shared.clone())
    }

    /// Signals the render thread to stop and waits for it.
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.render_thread.take() {
            if handle.join().is_err() {
                log::warn!("Render consumer panicked");
            }
        }
    }
}

impl Drop for VizCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl VizSink for VizCoordinator {
    fn upload_trajectory(&self, trajectory: &Trajectory) {
        if let Ok(mut scene) = self.shared.scene.lock() {
            scene.trajectory = trajectory.clone();
            scene.revision += 1;
        }
    }

    fn upload_point_cloud(&self, slot: usize, points: &Array2<f32>) {
        if let Ok(mut scene) = self.shared.scene.lock() {
            scene.point_clouds.insert(slot, points.clone());
            scene.revision += 1;
        }
    }

    fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }
}

/// Flips the advisory pause flag. Cloneable into GUI callbacks.
#[derive(Clone)]
pub struct PauseHandle(Arc<Shared>);

impl PauseHandle {
    pub fn set_paused(&self, paused: bool) {
        self.0.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.0.paused.load(Ordering::Relaxed)
    }
}
