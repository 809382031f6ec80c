//! 行分隔 JSON 命令协议的分发

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::metrics::METRICS;
use crate::models::{load_groups, Command, CommandBatch, ProcStatsReport};
use crate::services::{collect_host_metrics, launch_detached, run_shell, StatsCollector};
use crate::state::AppState;

pub const PROCS_CONFIG_ERROR: &str =
    r#"{"error":"failed to read procs.txt, have you setup a procs.txt for the slave to read?"}"#;
pub const PROCS_MARSHAL_ERROR: &str = r#"{"error":"failed to marshal process stats"}"#;
pub const EXIT_MESSAGE: &str = "Exiting connection.\n";

/// 一批命令执行完之后连接的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    AwaitLine,
    Close,
}

/// 逐行读取请求并按顺序写回结果；EOF 或读错误时结束
pub async fn handle_connection<S>(stream: S, state: AppState)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => return,
            // 末尾没有换行的残缺行直接丢弃
            Ok(_) if line.last() != Some(&b'\n') => return,
            Ok(_) => {}
            Err(e) => {
                log::error!("Read error: {}", e);
                return;
            }
        }

        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        let batch = match CommandBatch::decode(text) {
            Ok(batch) => batch,
            Err(e) => {
                log::warn!("Failed to parse JSON command: {}", e);
                METRICS.protocol_errors_total.inc();
                continue;
            }
        };

        match execute_batch(&batch, &state, &mut writer).await {
            Ok(Flow::AwaitLine) => {}
            Ok(Flow::Close) => {
                if let Err(e) = writer.shutdown().await {
                    log::debug!("Shutdown error: {}", e);
                }
                return;
            }
            Err(e) => {
                log::error!("Write error: {}", e);
                return;
            }
        }
    }
}

/// 按顺序执行命令列表，然后启动后台程序，最后处理退出标记
pub async fn execute_batch<W>(batch: &CommandBatch, state: &AppState, writer: &mut W) -> io::Result<Flow>
where
    W: AsyncWrite + Unpin,
{
    let dir = batch.working_dir(&state.home_dir);
    let mut should_exit = false;

    for command in batch.commands() {
        METRICS.record_command(command.kind());
        match command {
            Command::Exit => should_exit = true,
            Command::GetMetrics => {
                let metrics = tokio::task::spawn_blocking(collect_host_metrics)
                    .await
                    .map_err(io::Error::other)?;
                write_flush(writer, &serde_json::to_vec(&metrics)?).await?;
            }
            Command::GetProcs => {
                let body = procs_response(state).await;
                write_flush(writer, &body).await?;
            }
            Command::Shell(cmd) => {
                let body = shell_response(cmd, dir.clone()).await?;
                write_flush(writer, &body).await?;
            }
        }
    }

    if let Some((program, args)) = batch.background_binary() {
        METRICS.record_command("bin");
        log::info!("Launching binary from dir: {}", dir.display());
        let message = match launch_detached(program, args, &dir) {
            Ok(pid) => {
                log::info!("Launched {} in background with PID {}", program, pid);
                format!("Binary launched in background: PID {pid}\n")
            }
            Err(e) => {
                log::warn!("Failed to launch {}: {}", program, e);
                METRICS.record_failure("bin");
                format!("Error launching binary: {e}\n")
            }
        };
        writer.write_all(message.as_bytes()).await?;
        write_flush(writer, b"\n").await?;
    }

    if should_exit {
        write_flush(writer, EXIT_MESSAGE.as_bytes()).await?;
        return Ok(Flow::Close);
    }
    Ok(Flow::AwaitLine)
}

async fn shell_response(cmd: &str, dir: PathBuf) -> io::Result<Vec<u8>> {
    log::info!("Executing command in dir '{}': {}", dir.display(), cmd);
    let cmd = cmd.to_string();
    let output = tokio::task::spawn_blocking(move || run_shell(&cmd, &dir))
        .await
        .map_err(io::Error::other)?;
    if let Some(err) = &output.error {
        log::debug!("Command failed: {}", err);
        METRICS.record_failure("shell");
    }
    Ok(output.into_response())
}

async fn procs_response(state: &AppState) -> Vec<u8> {
    let groups = match load_groups(&state.procs_file) {
        Ok(groups) => groups,
        Err(e) => {
            log::warn!("{}", e);
            METRICS.record_failure("procs");
            return format!("{PROCS_CONFIG_ERROR}\n").into_bytes();
        }
    };

    let collector = state.stats_collector.clone();
    let report = tokio::task::spawn_blocking(move || sample_groups(&collector, groups))
        .await
        .unwrap_or_else(|e| {
            log::error!("Sampling task failed: {}", e);
            ProcStatsReport::new()
        });

    match serde_json::to_vec_pretty(&report) {
        Ok(mut body) => {
            body.push(b'\n');
            body
        }
        Err(e) => {
            log::error!("Failed to marshal process stats: {}", e);
            format!("{PROCS_MARSHAL_ERROR}\n").into_bytes()
        }
    }
}

/// 每个分组独立采样；失败的分组被记录并省略
pub fn sample_groups(collector: &StatsCollector, groups: BTreeMap<String, String>) -> ProcStatsReport {
    let mut report = ProcStatsReport::new();
    for (name, pattern) in groups {
        let started = Instant::now();
        match collector.sample(&pattern) {
            Ok(records) => {
                METRICS.record_sample(&name, started.elapsed(), records.len());
                report.insert(name, records);
            }
            Err(e) => {
                log::error!("Error exporting proc for {}: {}", name, e);
                METRICS.record_failure("procs");
            }
        }
    }
    report
}

async fn write_flush<W>(writer: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::procfs::testing::{write_process, write_system_stat};
    use crate::services::ProcFs;
    use crate::state::AppStateInner;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn state_with(procs_file: PathBuf, proc_root: &std::path::Path, home: &std::path::Path) -> AppState {
        Arc::new(AppStateInner {
            procs_file,
            home_dir: home.to_path_buf(),
            stats_collector: StatsCollector::new(ProcFs::new(proc_root))
                .with_interval(Duration::from_millis(1))
                .with_page_size(4096),
        })
    }

    async fn run(line: &str, state: &AppState) -> (Flow, String) {
        let batch = CommandBatch::decode(line).unwrap();
        let mut out = Vec::new();
        let flow = execute_batch(&batch, state, &mut out).await.unwrap();
        (flow, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_exit_only() {
        let tmp = TempDir::new().unwrap();
        let state = state_with(tmp.path().join("procs.txt"), tmp.path(), tmp.path());
        let (flow, out) = run(r#"{"cmd":"__exit__"}"#, &state).await;
        assert_eq!(flow, Flow::Close);
        assert_eq!(out, EXIT_MESSAGE);
    }

    #[tokio::test]
    async fn test_exit_waits_for_rest_of_batch() {
        let tmp = TempDir::new().unwrap();
        let state = state_with(tmp.path().join("procs.txt"), tmp.path(), tmp.path());
        let (flow, out) = run(r#"{"cmd":["__exit__","echo still here"]}"#, &state).await;
        assert_eq!(flow, Flow::Close);
        assert_eq!(out, "still here\nExiting connection.\n");
    }

    #[tokio::test]
    async fn test_shell_uses_home_when_dir_unset() {
        let tmp = TempDir::new().unwrap();
        let state = state_with(tmp.path().join("procs.txt"), tmp.path(), tmp.path());
        let (flow, out) = run(r#"{"cmd":"pwd"}"#, &state).await;
        assert_eq!(flow, Flow::AwaitLine);
        let expected = tmp.path().canonicalize().unwrap();
        assert_eq!(PathBuf::from(out.trim_end()).canonicalize().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_procs_without_config() {
        let tmp = TempDir::new().unwrap();
        let state = state_with(tmp.path().join("procs.txt"), tmp.path(), tmp.path());
        let (_, out) = run(r#"{"cmd":["__get_procs__","echo next"]}"#, &state).await;
        assert_eq!(out, format!("{PROCS_CONFIG_ERROR}\nnext\n"));
    }

    #[tokio::test]
    async fn test_procs_report() {
        let tmp = TempDir::new().unwrap();
        let proc_root = tmp.path().join("proc");
        std::fs::create_dir(&proc_root).unwrap();
        write_system_stat(&proc_root, 1000);
        write_process(&proc_root, 100, &["python", "worker.py"], 100, 0, 256);
        write_process(&proc_root, 200, &["nginx"], 10, 0, 512);
        let procs_file = tmp.path().join("procs.txt");
        std::fs::write(&procs_file, "worker > worker.py\nweb > nginx\nidle > nothing-matches\n").unwrap();

        let state = state_with(procs_file, &proc_root, tmp.path());
        let (_, out) = run(r#"{"cmd":"__get_procs__"}"#, &state).await;
        assert!(out.ends_with("}\n"));
        assert!(out.contains("\n  \"idle\": []"));

        let report: serde_json::Value = serde_json::from_str(&out).unwrap();
        let keys: Vec<_> = report.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["idle", "web", "worker"]);
        let worker = &report["worker"][0];
        assert_eq!(worker["pid"], "100");
        assert_eq!(worker["command"], "python worker.py ");
        assert_eq!(worker["rss_mb"], 1.0);
        assert_eq!(worker["cpu_time"], 1.0);
        assert_eq!(worker["cpu_percent"], 0.0);
        assert_eq!(report["web"][0]["rss_mb"], 2.0);
    }

    #[tokio::test]
    async fn test_failed_group_is_omitted() {
        let tmp = TempDir::new().unwrap();
        let procs_file = tmp.path().join("procs.txt");
        std::fs::write(&procs_file, "worker > worker.py\n").unwrap();
        // proc 根目录下没有 stat，采样失败
        let state = state_with(procs_file, &tmp.path().join("empty"), tmp.path());
        let (_, out) = run(r#"{"cmd":"__get_procs__"}"#, &state).await;
        assert_eq!(out, "{}\n");
    }

    #[tokio::test]
    async fn test_background_binary_after_commands() {
        let tmp = TempDir::new().unwrap();
        let state = state_with(tmp.path().join("procs.txt"), tmp.path(), tmp.path());
        let (_, out) = run(r#"{"cmd":["echo first"],"bin":["true"]}"#, &state).await;
        assert!(out.starts_with("first\nBinary launched in background: PID "));
        assert!(out.ends_with("\n\n"));

        let (_, out) = run(r#"{"cmd":[],"bin":["/no/such/program"]}"#, &state).await;
        assert!(out.starts_with("Error launching binary: "));
        assert!(out.ends_with("\n\n"));
    }
}
