use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use crate::error::AgentError;

/// shell 命令的合并输出；`error` 非空时在输出后追加错误说明
#[derive(Debug)]
pub struct ShellOutput {
    pub output: Vec<u8>,
    pub error: Option<AgentError>,
}

impl ShellOutput {
    pub fn into_response(self) -> Vec<u8> {
        let mut output = self.output;
        if let Some(err) = self.error {
            output.extend_from_slice(format!("\nError: {err}").as_bytes());
        }
        output
    }
}

/// 在 `dir` 下执行 `bash -c <command>`，stdout 与 stderr 写入同一管道，阻塞直到结束
pub fn run_shell(command: &str, dir: &Path) -> ShellOutput {
    match spawn_and_capture(command, dir) {
        Ok((output, status)) if status.success() => ShellOutput { output, error: None },
        Ok((output, status)) => ShellOutput {
            output,
            error: Some(AgentError::Execution(describe_status(status))),
        },
        Err(e) => ShellOutput {
            output: Vec::new(),
            error: Some(AgentError::Execution(e.to_string())),
        },
    }
}

fn spawn_and_capture(command: &str, dir: &Path) -> io::Result<(Vec<u8>, ExitStatus)> {
    let (mut reader, writer) = io::pipe()?;
    // Command 临时值在语句结束时释放，父进程一侧的写端随之关闭
    let mut child = Command::new("bash")
        .arg("-c")
        .arg(command)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer)
        .spawn()?;

    let mut output = Vec::new();
    let read = reader.read_to_end(&mut output);
    let status = child.wait()?;
    read?;
    Ok((output, status))
}

fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal: {}", signal_name(signal));
        }
    }
    status.to_string()
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    let name = match signal {
        libc::SIGHUP => "hangup",
        libc::SIGINT => "interrupt",
        libc::SIGQUIT => "quit",
        libc::SIGILL => "illegal instruction",
        libc::SIGTRAP => "trace/breakpoint trap",
        libc::SIGABRT => "aborted",
        libc::SIGBUS => "bus error",
        libc::SIGFPE => "floating point exception",
        libc::SIGKILL => "killed",
        libc::SIGUSR1 => "user defined signal 1",
        libc::SIGSEGV => "segmentation fault",
        libc::SIGUSR2 => "user defined signal 2",
        libc::SIGPIPE => "broken pipe",
        libc::SIGALRM => "alarm clock",
        libc::SIGTERM => "terminated",
        other => return format!("signal {other}"),
    };
    name.to_string()
}

/// 在新会话中后台启动程序，不继承标准流、不等待，返回 PID
#[cfg(unix)]
pub fn launch_detached(program: &str, args: &[String], dir: &Path) -> Result<u32, AgentError> {
    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // SAFETY: setsid 是 async-signal-safe 的，fork 后调用不涉及内存分配
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    // 不等待子进程；Child 被释放后由 tokio 在后台回收
    let child = command.spawn()?;
    child
        .id()
        .ok_or_else(|| AgentError::Execution("process exited before its pid was read".to_string()))
}

#[cfg(not(unix))]
pub fn launch_detached(_program: &str, _args: &[String], _dir: &Path) -> Result<u32, AgentError> {
    Err(AgentError::Unsupported("detached process launch"))
}
