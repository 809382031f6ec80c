use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use crate::error::ProcError;
use crate::models::ProcessRecord;
use crate::services::procfs::{page_size, ProcFs};

/// 两次采样之间的间隔
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// 内核每秒 tick 数
pub const CLOCK_TICKS_PER_SECOND: f64 = 100.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// 一次统计请求内的采样窗口，不跨请求共享
#[derive(Debug, Clone, Default)]
pub struct SamplingWindow {
    pub system_cpu_time_start: u64,
    pub system_cpu_time_end: u64,
    /// 按发现顺序保存的 pid
    pids: Vec<String>,
    pub process_cpu_time_start: HashMap<String, u64>,
    pub process_cpu_time_end: HashMap<String, u64>,
}

impl SamplingWindow {
    #[cfg(test)]
    pub(crate) fn pids(&self) -> &[String] {
        &self.pids
    }

    /// 窗口内系统总 CPU 时间增量，非正数时返回 `None`
    pub fn system_delta(&self) -> Option<u64> {
        self.system_cpu_time_end
            .checked_sub(self.system_cpu_time_start)
            .filter(|delta| *delta > 0)
    }

    /// 未按核数归一化，多线程进程可能超过 100
    pub fn cpu_percent(&self, pid: &str) -> f64 {
        let Some(system_delta) = self.system_delta() else {
            return 0.0;
        };
        let start = self.process_cpu_time_start.get(pid).copied().unwrap_or_default() as f64;
        let end = self.process_cpu_time_end.get(pid).copied().unwrap_or_default() as f64;
        100.0 * (end - start) / system_delta as f64
    }

    fn insert_start(&mut self, pid: String, ticks: u64) {
        if self.process_cpu_time_start.insert(pid.clone(), ticks).is_none() {
            self.pids.push(pid);
        }
    }
}

/// 基于 /proc 两次采样计算进程 CPU 使用率
#[derive(Debug, Clone)]
pub struct StatsCollector {
    procfs: ProcFs,
    interval: Duration,
    page_size: u64,
    clock_ticks: f64,
}

impl StatsCollector {
    pub fn new(procfs: ProcFs) -> Self {
        Self {
            procfs,
            interval: SAMPLE_INTERVAL,
            page_size: page_size(),
            clock_ticks: CLOCK_TICKS_PER_SECOND,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn procfs(&self) -> &ProcFs {
        &self.procfs
    }

    /// 采样命令行包含 `pattern` 的所有进程，阻塞一个采样间隔
    pub fn sample(&self, pattern: &str) -> Result<Vec<ProcessRecord>, ProcError> {
        let mut window = self.open_window(pattern)?;
        thread::sleep(self.interval);
        self.close_window(&mut window)?;
        Ok(self.collect(&window))
    }

    /// 第一次采样：系统 CPU 时间 + 匹配进程的 CPU ticks
    pub fn open_window(&self, pattern: &str) -> Result<SamplingWindow, ProcError> {
        let mut window = SamplingWindow {
            system_cpu_time_start: self.procfs.read_system_cpu_time()?,
            ..Default::default()
        };

        for pid in self.procfs.list_pids()? {
            let command = match self.procfs.read_command_line(&pid) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    log_skip(&pid, &e);
                    continue;
                }
            };
            if !command.contains(pattern) {
                continue;
            }
            match self.procfs.read_process_cpu_time(&pid) {
                Ok(ticks) => window.insert_start(pid, ticks),
                Err(e) => log_skip(&pid, &e),
            }
        }

        Ok(window)
    }

    /// 第二次采样；重读失败的进程记为 0 而不是丢弃
    pub fn close_window(&self, window: &mut SamplingWindow) -> Result<(), ProcError> {
        window.system_cpu_time_end = self.procfs.read_system_cpu_time()?;

        for pid in &window.pids {
            let ticks = match self.procfs.read_process_cpu_time(pid) {
                Ok(ticks) => ticks,
                Err(e) => {
                    log::debug!("pid {} re-read failed, recording zero: {}", pid, e);
                    0
                }
            };
            window.process_cpu_time_end.insert(pid.clone(), ticks);
        }

        Ok(())
    }

    /// 第三次读取命令行与内存并计算结果，消失的进程直接跳过
    pub fn collect(&self, window: &SamplingWindow) -> Vec<ProcessRecord> {
        let mut records = Vec::with_capacity(window.pids.len());

        for pid in &window.pids {
            let snapshot = match self.procfs.read_process_snapshot(pid) {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => continue,
                Err(e) => {
                    log_skip(pid, &e);
                    continue;
                }
            };

            let end_ticks = window.process_cpu_time_end.get(pid).copied().unwrap_or_default();

            records.push(ProcessRecord {
                pid: pid.clone(),
                command: snapshot.command,
                resident_memory_mb: self.resident_memory_mb(snapshot.resident_pages),
                cpu_time_seconds: end_ticks as f64 / self.clock_ticks,
                cpu_percent: window.cpu_percent(pid),
            });
        }

        records
    }

    pub fn resident_memory_mb(&self, pages: u64) -> f64 {
        (pages as f64) * (self.page_size as f64) / BYTES_PER_MB
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new(ProcFs::default())
    }
}

fn log_skip(pid: &str, err: &ProcError) {
    if err.is_not_found() {
        log::trace!("pid {} exited during scan", pid);
    } else {
        log::debug!("skipping pid {}: {}", pid, err);
    }
}
