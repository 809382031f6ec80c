//! /proc 读取：系统总 CPU 时间与单个进程快照

use std::fs;
use std::path::PathBuf;

use crate::error::ProcError;

/// `cpu` 标签后至少需要的数值字段数 (user nice system idle iowait irq softirq)
const MIN_SYSTEM_CPU_FIELDS: usize = 7;

/// `)` 之后的字段下标：stat 第 14/15/24 个字段 (utime, stime, rss)
const UTIME_INDEX: usize = 11;
const STIME_INDEX: usize = 12;
const RSS_INDEX: usize = 21;

/// 单个进程在某一时刻的快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub command: String,
    pub cpu_ticks: u64,
    pub resident_pages: u64,
}

/// 以某个根目录为 /proc 的只读视图，测试时可指向临时目录
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[cfg(test)]
    pub(crate) fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// 读取 /proc/stat 第一行所有数值字段之和
    pub fn read_system_cpu_time(&self) -> Result<u64, ProcError> {
        let content = fs::read_to_string(self.root.join("stat"))?;
        parse_system_cpu_time(&content)
    }

    /// 列出所有数字命名的目录项，按目录返回顺序
    pub fn list_pids(&self) -> Result<Vec<String>, ProcError> {
        let mut pids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_numeric(&name) {
                continue;
            }
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                pids.push(name);
            }
        }
        Ok(pids)
    }

    /// 读取命令行，NUL 替换为空格；空命令行（如内核线程）返回 `None`
    pub fn read_command_line(&self, pid: &str) -> Result<Option<String>, ProcError> {
        let bytes = fs::read(self.pid_path(pid, "cmdline")).map_err(|e| ProcError::from_pid_io(pid, e))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&bytes).replace('\0', " ")))
    }

    /// utime + stime (ticks)
    pub fn read_process_cpu_time(&self, pid: &str) -> Result<u64, ProcError> {
        let stat = self.read_stat(pid)?;
        let (cpu_ticks, _) = parse_process_stat(&stat, false)?;
        Ok(cpu_ticks)
    }

    /// 命令行、CPU ticks 与常驻内存页数；命令行为空时返回 `None`
    pub fn read_process_snapshot(&self, pid: &str) -> Result<Option<ProcessSnapshot>, ProcError> {
        let Some(command) = self.read_command_line(pid)? else {
            return Ok(None);
        };
        let stat = self.read_stat(pid)?;
        let (cpu_ticks, resident_pages) = parse_process_stat(&stat, true)?;
        Ok(Some(ProcessSnapshot {
            command,
            cpu_ticks,
            resident_pages: resident_pages.unwrap_or_default(),
        }))
    }

    fn read_stat(&self, pid: &str) -> Result<String, ProcError> {
        fs::read_to_string(self.pid_path(pid, "stat")).map_err(|e| ProcError::from_pid_io(pid, e))
    }

    fn pid_path(&self, pid: &str, file: &str) -> PathBuf {
        self.root.join(pid).join(file)
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

pub fn parse_system_cpu_time(content: &str) -> Result<u64, ProcError> {
    let line = content
        .lines()
        .next()
        .ok_or_else(|| ProcError::Format("system stat is empty".to_string()))?;

    let mut fields = line.split_whitespace();
    if fields.next() != Some("cpu") {
        return Err(ProcError::Format("missing aggregate cpu label".to_string()));
    }

    let values = fields
        .map(|f| {
            f.parse::<u64>()
                .map_err(|e| ProcError::Format(format!("invalid cpu field {f:?}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if values.len() < MIN_SYSTEM_CPU_FIELDS {
        return Err(ProcError::Format(format!(
            "expected at least {MIN_SYSTEM_CPU_FIELDS} cpu fields, got {}",
            values.len()
        )));
    }

    Ok(values.iter().sum())
}

/// 解析 /proc/<pid>/stat，返回 (utime+stime, rss)；`comm` 可能含空格，从最后一个 `)` 之后开始计数
pub fn parse_process_stat(content: &str, with_rss: bool) -> Result<(u64, Option<u64>), ProcError> {
    let rest = match content.rfind(')') {
        Some(idx) => &content[idx + 1..],
        None => content
            .split_once(char::is_whitespace)
            .and_then(|(_, rest)| rest.trim_start().split_once(char::is_whitespace))
            .map(|(_, rest)| rest)
            .unwrap_or_default(),
    };
    let fields: Vec<&str> = rest.split_whitespace().collect();

    let required = if with_rss { RSS_INDEX } else { STIME_INDEX } + 1;
    if fields.len() < required {
        return Err(ProcError::Format(format!(
            "expected at least {} stat fields, got {}",
            required + 2,
            fields.len() + 2
        )));
    }

    let field = |idx: usize| -> Result<u64, ProcError> {
        fields[idx]
            .parse::<u64>()
            .map_err(|e| ProcError::Format(format!("invalid stat field {:?}: {e}", fields[idx])))
    };

    let cpu_ticks = field(UTIME_INDEX)? + field(STIME_INDEX)?;
    let rss = if with_rss { Some(field(RSS_INDEX)?) } else { None };
    Ok((cpu_ticks, rss))
}

fn is_numeric(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

/// 运行时的内存页大小 (字节)
pub fn page_size() -> u64 {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}
