use actix_web::{App, HttpServer};
use anyhow::Context;
use clap::Parser;

use proc_agent::api;
use proc_agent::cli::CommandArgs;
use proc_agent::server::AgentServer;
use proc_agent::state::new_state;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();
    let bind_address = args.bind_address();

    let state = new_state(&args.procs_file);
    log::info!("Default working directory: {}", state.home_dir.display());

    let server = AgentServer::bind(&bind_address)
        .await
        .with_context(|| format!("failed to listen on {bind_address}"))?;

    print_banner(&args);

    let Some(metrics_port) = args.metrics_port else {
        server.run(state).await;
        return Ok(());
    };

    let http = HttpServer::new(|| App::new().configure(api::configure))
        .bind((args.address.as_str(), metrics_port))
        .with_context(|| format!("failed to bind metrics endpoint on port {metrics_port}"))?
        .run();

    tokio::select! {
        _ = server.run(state) => Ok(()),
        res = http => res.context("metrics endpoint stopped"),
    }
}

fn print_banner(args: &CommandArgs) {
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║      proc-agent v{:<41}║", env!("CARGO_PKG_VERSION"));
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("🚀 Agent listening on tcp://{}", args.bind_address());
    println!("📄 Process groups: {}", args.procs_file.display());
    println!();
    println!("📋 Reserved commands:");
    println!("  __get_metrics__   - Host CPU and memory");
    println!("  __get_procs__     - Per-process CPU and memory for configured groups");
    println!("  __exit__          - Close the connection after the batch");
    if let Some(port) = args.metrics_port {
        println!();
        println!("📈 HTTP endpoints on {}:{}:", args.address, port);
        println!("  GET    /metrics                - Prometheus metrics");
        println!("  GET    /health                 - Health check");
    }
    println!("═══════════════════════════════════════════════════════════");
}
