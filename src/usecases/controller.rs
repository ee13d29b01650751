//! Controller - Pause Flag and Stop Fan-out for Poll Loops
//!
//! Every periodic loop in the pipeline is spawned through
//! `Controller::spawn_loop`. The loop checks `paused()` right before
//! each tick and skips it while paused (its timer keeps running).
//! `stop()` wakes every loop through a broadcast channel; loops exit
//! without waiting for an in-flight tick to finish.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Whether a loop honours the pause flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
  /// Skipped while paused (pipeline stages).
  Pausable,
  /// Keeps running while paused (price refresh, status logging).
  Always,
}

/// Shared pause/stop state.
pub struct Controller {
  paused: AtomicBool,
  stopped: AtomicBool,
  stop_tx: broadcast::Sender<()>,
}

impl Default for Controller {
  fn default() -> Self {
    Self::new(false)
  }
}

impl Controller {
  pub fn new(paused: bool) -> Self {
    let (stop_tx, _) = broadcast::channel(1);
    Self {
      paused: AtomicBool::new(paused),
      stopped: AtomicBool::new(false),
      stop_tx,
    }
  }

  pub fn pause(&self) {
    if !self.paused.swap(true, Ordering::SeqCst) {
      info!("Pipeline paused");
    }
  }

  pub fn unpause(&self) {
    if self.paused.swap(false, Ordering::SeqCst) {
      info!("Pipeline resumed");
    }
  }

  pub fn paused(&self) -> bool {
    self.paused.load(Ordering::SeqCst)
  }

  /// Signal every loop to exit.
  pub fn stop(&self) {
    self.stopped.store(true, Ordering::SeqCst);
    // No receivers just means no loop is running.
    let _ = self.stop_tx.send(());
    info!("Stop signalled");
  }

  pub fn is_stopped(&self) -> bool {
    self.stopped.load(Ordering::SeqCst)
  }

  pub fn subscribe(&self) -> broadcast::Receiver<()> {
    self.stop_tx.subscribe()
  }

  /// Spawn a periodic loop that runs `tick` every `interval`.
  pub fn spawn_loop<F, Fut>(
    self: &Arc<Self>,
    name: &'static str,
    interval: Duration,
    mode: LoopMode,
    mut tick: F,
  ) -> JoinHandle<()>
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let controller = Arc::clone(self);
    let mut stop_rx = self.subscribe();

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      debug!(task = name, interval_ms = interval.as_millis() as u64, "Loop started");

      loop {
        tokio::select! {
          biased;

          _ = stop_rx.recv() => break,

          _ = ticker.tick() => {
            if controller.is_stopped() {
              break;
            }
            if mode == LoopMode::Pausable && controller.paused() {
              continue;
            }
            tokio::select! {
              biased;
              _ = stop_rx.recv() => break,
              () = tick() => {}
            }
          }
        }
      }

      debug!(task = name, "Loop stopped");
    })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_paused_loop_skips_ticks() {
    let controller = Arc::new(Controller::default());
    let ticks = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&ticks);
    let handle = controller.spawn_loop("test", Duration::from_millis(10), LoopMode::Pausable, move || {
      let counter = Arc::clone(&counter);
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
      }
    });

    tokio::time::sleep(Duration::from_millis(35)).await;
    let before = ticks.load(Ordering::SeqCst);
    assert!(before >= 3);

    controller.pause();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), before);

    controller.unpause();
    tokio::time::sleep(Duration::from_millis(35)).await;
    assert!(ticks.load(Ordering::SeqCst) > before);

    controller.stop();
    handle.await.unwrap();
  }

  #[tokio::test(start_paused = true)]
  async fn test_always_loop_ignores_pause() {
    let controller = Arc::new(Controller::new(true));
    let ticks = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&ticks);
    let handle = controller.spawn_loop("test", Duration::from_millis(10), LoopMode::Always, move || {
      let counter = Arc::clone(&counter);
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
      }
    });

    tokio::time::sleep(Duration::from_millis(35)).await;
    assert!(ticks.load(Ordering::SeqCst) >= 3);

    controller.stop();
    handle.await.unwrap();
  }

  #[tokio::test(start_paused = true)]
  async fn test_stop_interrupts_slow_tick() {
    let controller = Arc::new(Controller::default());
    let handle = controller.spawn_loop("slow", Duration::from_millis(10), LoopMode::Pausable, || async {
      tokio::time::sleep(Duration::from_secs(3600)).await;
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    controller.stop();
    tokio::time::timeout(Duration::from_secs(1), handle)
      .await
      .expect("loop did not stop")
      .unwrap();
  }
}
