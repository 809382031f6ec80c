use clap::Parser;
use std::path::PathBuf;

/// proc-agent - 行分隔 JSON 远程执行与进程监控 agent
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// 监听端口
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// 监听地址
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "0.0.0.0")]
    pub address: String,

    /// 名称 > 匹配子串 的进程分组文件，每次 __get_procs__ 时重新读取
    #[arg(long, env = "PROCS_FILE", default_value = "procs.txt")]
    pub procs_file: PathBuf,

    /// 设置后在该端口提供 /metrics 与 /health
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl CommandArgs {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
