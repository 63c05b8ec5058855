//! Gateway binary entry point.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;

use ws_pooler_gateway::bus::memory::InMemoryBus;
use ws_pooler_gateway::bus::redis::RedisBus;
use ws_pooler_gateway::bus::BusClient;
use ws_pooler_gateway::config::{BusBackend, Cli, Config};

/// Global allocator — better multi-threaded performance than the system
/// allocator under the gateway's many-short-lived-task workload.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {panic_info:?}");
        default_hook(panic_info);
    }));

    let cli = Cli::parse();
    let config = Config::resolve(cli)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let exit_code = runtime.block_on(run(config));
    std::process::exit(exit_code);
}

async fn run(config: Config) -> i32 {
    let bus: Arc<dyn BusClient> = match config.bus_backend {
        BusBackend::Memory => Arc::new(InMemoryBus::new()),
        BusBackend::Redis => match RedisBus::connect(&config.bus_addr).await {
            Ok(bus) => Arc::new(bus),
            Err(e) => {
                log::error!("failed to connect to bus at {}: {e}", config.bus_addr);
                return 2;
            }
        },
    };

    match ws_pooler_gateway::supervisor::run(config, bus).await {
        Ok(()) => 0,
        Err(e) => {
            log::error!("fatal error: {e:#}");
            1
        }
    }
}
