use crate::error::{Error, Result};
use crate::ui::prelude::*;
use std::sync::Mutex;
use std::time::Duration;
use sysinfo::{Pid, System};
use tokio_util::sync::CancellationToken;

pub const GATE_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Process CPU use as a share of the whole machine, 0-100.
    pub cpu_pct: f32,
    pub available_memory: u64,
}

/// Holds back new records while the process is busy or memory is short.
pub struct ResourceGate {
    max_cpu_pct: f32,
    min_free_mem: u64,
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl ResourceGate {
    pub fn new(max_cpu_pct: f32, min_free_mem: u64) -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            max_cpu_pct,
            min_free_mem,
            pid: sysinfo::get_current_pid().ok(),
            system: Mutex::new(system),
        }
    }

    /// Limits that can never hold anything back.
    pub fn is_open(&self) -> bool {
        self.max_cpu_pct >= 100.0 && self.min_free_mem == 0
    }

    pub fn admits(&self, sample: Sample) -> bool {
        sample.cpu_pct <= self.max_cpu_pct && sample.available_memory >= self.min_free_mem
    }

    fn sample(&self) -> Option<Sample> {
        let mut system = self.system.lock().ok()?;
        system.refresh_memory();
        let cpu_count = system.cpus().len().max(1) as f32;
        let cpu_pct = match self.pid {
            Some(pid) if system.refresh_process(pid) => system
                .process(pid)
                .map(|p| p.cpu_usage() / cpu_count)
                .unwrap_or(0.0),
            _ => 0.0,
        };
        Some(Sample {
            cpu_pct,
            available_memory: system.available_memory(),
        })
    }

    /// Wait until a sample passes the limits, polling every 500 ms.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let mut announced = false;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::OperationCanceled);
            }
            let Some(sample) = self.sample() else {
                return Ok(());
            };
            if self.admits(sample) {
                return Ok(());
            }
            if !announced {
                emit(
                    Level::Debug,
                    "batch.gate.wait",
                    &format!(
                        "Waiting for resources (cpu {:.0}%, {} bytes free)",
                        sample.cpu_pct, sample.available_memory
                    ),
                    None,
                );
                announced = true;
            }
            tokio::select! {
                _ = tokio::time::sleep(GATE_BACKOFF) => {}
                _ = cancel.cancelled() => return Err(Error::OperationCanceled),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_within_limits() {
        let gate = ResourceGate::new(50.0, 1024);
        assert!(gate.admits(Sample {
            cpu_pct: 10.0,
            available_memory: 4096
        }));
        assert!(!gate.admits(Sample {
            cpu_pct: 75.0,
            available_memory: 4096
        }));
        assert!(!gate.admits(Sample {
            cpu_pct: 10.0,
            available_memory: 512
        }));
    }

    #[tokio::test]
    async fn test_open_gate_never_waits() {
        let gate = ResourceGate::new(100.0, 0);
        assert!(gate.is_open());
        gate.wait(&CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_gate_gives_up_on_cancel() {
        let gate = ResourceGate::new(100.0, u64::MAX);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(gate.wait(&cancel).await, Err(Error::OperationCanceled)));
    }
}
