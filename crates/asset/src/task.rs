//! Background asset loads with a one-shot completion channel.
//!
//! The event loop owns an [`AssetTask`] and polls it once per frame; the load
//! itself runs on a named worker thread and never touches scene state.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};

pub struct AssetTask<T> {
    label: String,
    rx: Receiver<Result<T>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> AssetTask<T> {
    /// Run `job` on a worker thread.
    pub fn spawn<F>(label: impl Into<String>, job: F) -> Result<Self>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = mpsc::sync_channel(1);
        let handle = thread::Builder::new()
            .name(format!("load:{label}"))
            .spawn(move || {
                // Receiver may be gone after dispose(); nothing to report then.
                let _ = tx.send(job());
            })
            .with_context(|| format!("Failed to spawn loader thread for {label}"))?;
        log::debug!("Started asset task '{}'", label);
        Ok(Self {
            label,
            rx,
            handle: Some(handle),
        })
    }

    /// Already-resolved task, for synchronous callers and tests.
    pub fn ready(label: impl Into<String>, value: Result<T>) -> Self {
        let (tx, rx) = mpsc::sync_channel(1);
        let _ = tx.send(value);
        Self {
            label: label.into(),
            rx,
            handle: None,
        }
    }
}

impl<T> AssetTask<T> {
    #[cfg(test)]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Non-blocking check. `Some` exactly once, when the load finished.
    pub fn poll(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => {
                self.join();
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join();
                Some(Err(anyhow!(
                    "loader thread for '{}' exited without a result",
                    self.label
                )))
            }
        }
    }

    /// Block until the load finishes.
    #[cfg(test)]
    pub fn wait(mut self) -> Result<T> {
        let result = self
            .rx
            .recv()
            .map_err(|_| anyhow!("loader thread for '{}' exited without a result", self.label))
            .and_then(|r| r);
        self.join();
        result
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Loader thread for '{}' panicked", self.label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn poll_is_empty_until_the_job_completes() {
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let mut task = AssetTask::spawn("gated", move || {
            gate_rx.recv().ok();
            Ok(5u32)
        })
        .unwrap();
        assert!(task.poll().is_none());

        gate_tx.send(()).unwrap();
        let mut got = None;
        for _ in 0..500 {
            if let Some(r) = task.poll() {
                got = Some(r.unwrap());
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(got, Some(5));
    }

    #[test]
    fn job_errors_are_delivered() {
        let task: AssetTask<u8> = AssetTask::spawn("broken", || anyhow::bail!("nope")).unwrap();
        let err = task.wait().unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn panicking_job_reports_disconnect() {
        let task: AssetTask<u8> =
            AssetTask::spawn("panics", || panic!("loader blew up")).unwrap();
        assert!(task.wait().is_err());
    }

    #[test]
    fn ready_task_resolves_on_first_poll() {
        let mut task = AssetTask::ready("now", Ok("done"));
        assert_eq!(task.label(), "now");
        assert_eq!(task.poll().unwrap().unwrap(), "done");
    }
}
