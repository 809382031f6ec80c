use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::AgentError;

pub const EXIT_TOKEN: &str = "__exit__";
pub const GET_METRICS_TOKEN: &str = "__get_metrics__";
pub const GET_PROCS_TOKEN: &str = "__get_procs__";

/// `cmd` 字段：先尝试字符串列表，再回退为单个字符串
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandList {
    Many(Vec<String>),
    One(String),
}

impl CommandList {
    #[cfg(test)]
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            CommandList::Many(commands) => commands,
            CommandList::One(command) => vec![command],
        }
    }
}

/// 一行请求解码后的结果
#[derive(Debug, Clone, Deserialize)]
pub struct CommandBatch {
    /// 工作目录，为空时使用 agent 的 home 目录
    #[serde(default)]
    pub dir: Option<String>,

    pub cmd: CommandList,

    /// bin[0] 为程序路径，其余为参数
    #[serde(default)]
    pub bin: Option<Vec<String>>,
}

impl CommandBatch {
    pub fn decode(line: &str) -> Result<Self, AgentError> {
        serde_json::from_str(line).map_err(|e| AgentError::Protocol(e.to_string()))
    }

    pub fn working_dir(&self, home: &Path) -> PathBuf {
        match self.dir.as_deref() {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => home.to_path_buf(),
        }
    }

    /// 非空时返回 (程序, 参数)
    pub fn background_binary(&self) -> Option<(&str, &[String])> {
        let (program, args) = self.bin.as_deref()?.split_first()?;
        Some((program.as_str(), args))
    }

    pub fn commands(&self) -> impl Iterator<Item = Command<'_>> {
        let commands: &[String] = match &self.cmd {
            CommandList::Many(commands) => commands,
            CommandList::One(command) => std::slice::from_ref(command),
        };
        commands.iter().map(|c| Command::classify(c))
    }
}

/// 命令列表中每一项的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Exit,
    GetMetrics,
    GetProcs,
    Shell(&'a str),
}

impl<'a> Command<'a> {
    pub fn classify(raw: &'a str) -> Self {
        match raw {
            EXIT_TOKEN => Command::Exit,
            GET_METRICS_TOKEN => Command::GetMetrics,
            GET_PROCS_TOKEN => Command::GetProcs,
            other => Command::Shell(other),
        }
    }

    /// 自身监控指标使用的标签
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Exit => "exit",
            Command::GetMetrics => "metrics",
            Command::GetProcs => "procs",
            Command::Shell(_) => "shell",
        }
    }
}
