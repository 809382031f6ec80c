use serde::Serialize;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};

/// `__get_metrics__` 的响应
#[derive(Debug, Clone, Serialize)]
pub struct HostMetrics {
    /// 全局 CPU 使用率，单元素列表
    pub cpu_percent: Vec<f64>,
    /// 总内存 (字节)
    pub mem_total: u64,
    /// 已用内存 (字节)
    pub mem_used: u64,
}

/// 采集主机 CPU 与内存，会阻塞一个 sysinfo 最小刷新间隔
pub fn collect_host_metrics() -> HostMetrics {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    HostMetrics {
        cpu_percent: vec![sys.global_cpu_usage() as f64],
        mem_total: sys.total_memory(),
        mem_used: sys.used_memory(),
    }
}
