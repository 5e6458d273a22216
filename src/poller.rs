//! Fixed-interval repeating task with an explicit start/stop lifecycle.

use std::future::Future;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

pub struct Poller {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Runs `task` immediately and then every `period`.
    ///
    /// A tick that fires while `task` is still running is dropped, not queued.
    pub fn start<F, Fut>(name: &'static str, period: Duration, mut task: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        debug!("Poller {} tick", name);
                        task().await;
                    }
                }
            }
            debug!("Poller {} exited", name);
        });
        info!("Started poller {} every {:?}", name, period);
        Poller {
            name,
            stop_tx,
            handle,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signals the loop to exit and waits for it. A task already running is
    /// allowed to finish first.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
        info!("Stopped poller {}", self.name);
    }
}
