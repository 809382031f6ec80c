use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::AgentError;

/// 逻辑名称与命令行匹配子串
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessGroup {
    /// 分组名称（如 "worker"）
    pub name: String,
    /// 命令行包含该子串即视为匹配
    pub pattern: String,
}

impl ProcessGroup {
    /// 解析一行 `<name> > <pattern>`，只按第一个 `>` 切分
    pub fn parse_line(line: &str) -> Option<Self> {
        let (name, pattern) = line.split_once('>')?;
        Some(Self {
            name: name.trim().to_string(),
            pattern: pattern.trim().to_string(),
        })
    }
}

/// 解析 procs 文件内容，空行和格式错误的行被忽略，同名分组后者覆盖前者
pub fn parse_groups(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter_map(ProcessGroup::parse_line)
        .map(|group| (group.name, group.pattern))
        .collect()
}

/// 每次 `__get_procs__` 请求都重新读取
pub fn load_groups(path: &Path) -> Result<BTreeMap<String, String>, AgentError> {
    let content = fs::read_to_string(path).map_err(|source| AgentError::ConfigUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_groups(&content))
}
