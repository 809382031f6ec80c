use serde::Serialize;
use std::collections::BTreeMap;

/// 单个进程在一次采样窗口内的统计
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProcessRecord {
    /// 进程 ID（字符串形式）
    pub pid: String,

    /// 命令行，NUL 分隔符替换为空格
    pub command: String,

    /// 常驻内存 (MB)
    #[serde(rename = "rss_mb")]
    pub resident_memory_mb: f64,

    /// 进程启动以来累计的 user+system CPU 时间 (秒)
    #[serde(rename = "cpu_time")]
    pub cpu_time_seconds: f64,

    /// 采样窗口内占系统总 CPU 时间的百分比，未按核数归一化
    pub cpu_percent: f64,
}

/// 分组名 -> 该组匹配到的进程
pub type ProcStatsReport = BTreeMap<String, Vec<ProcessRecord>>;
