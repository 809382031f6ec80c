//! TCP 监听与每连接任务

pub mod dispatcher;

use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::metrics::METRICS;
use crate::state::AppState;

pub use dispatcher::handle_connection;

pub struct AgentServer {
    listener: TcpListener,
}

impl AgentServer {
    /// 绑定失败是启动阶段唯一的致命错误
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("Listening on {}...", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 接收连接，每个连接一个独立任务，连接之间不共享可变状态
    pub async fn run(self, state: AppState) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    log::info!("Accepted connection from {}", peer);
                    METRICS.connections_total.inc();
                    let state = state.clone();
                    tokio::spawn(async move {
                        METRICS.active_connections.inc();
                        handle_connection(stream, state).await;
                        METRICS.active_connections.dec();
                        log::info!("Connection from {} closed", peer);
                    });
                }
                Err(e) => log::error!("Connection error: {}", e),
            }
        }
    }
}
