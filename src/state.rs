use crate::services::{ProcFs, StatsCollector};
use std::path::PathBuf;
use std::sync::Arc;

/// 所有连接共享的只读配置，启动后不再修改
#[derive(Debug, Clone)]
pub struct AppStateInner {
    /// 名称 -> 匹配子串的配置文件
    pub procs_file: PathBuf,
    /// 请求未指定 `dir` 时的工作目录
    pub home_dir: PathBuf,
    pub stats_collector: StatsCollector,
}

pub type AppState = Arc<AppStateInner>;

pub fn new_state(procs_file: impl Into<PathBuf>) -> AppState {
    Arc::new(AppStateInner {
        procs_file: procs_file.into(),
        home_dir: resolve_home_dir(),
        stats_collector: StatsCollector::new(ProcFs::default()),
    })
}

/// 用户 home 目录，其次 $HOME，最后退回当前目录
pub fn resolve_home_dir() -> PathBuf {
    if let Some(home) = dirs::home_dir().filter(|p| !p.as_os_str().is_empty()) {
        return home;
    }
    match std::env::var_os("HOME").filter(|h| !h.is_empty()) {
        Some(home) => PathBuf::from(home),
        None => {
            log::warn!("Cannot determine home directory, defaulting to current directory '.'");
            PathBuf::from(".")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_new_state() {
        let state = new_state("procs.txt");
        assert_eq!(state.procs_file, PathBuf::from("procs.txt"));
        assert!(!state.home_dir.as_os_str().is_empty());
        assert_eq!(state.stats_collector.procfs().root(), Path::new("/proc"));
    }
}
