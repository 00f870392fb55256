// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use log::*;
use mimalloc::MiMalloc;
use stamina_node::chain::backend::create_rocksdb_backend;
use stamina_node::chain::*;
use stamina_node::global::*;
use stamina_node::node::*;
use stamina_node::primitives::*;
use stamina_node::settings::SETTINGS;

use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use tarpc::server::{self, Channel};
use tokio::runtime::Builder;
use tokio::time::sleep;
use tracing_subscriber::prelude::*;

#[cfg(not(windows))]
use signal_hook::consts::TERM_SIGNALS;
#[cfg(not(windows))]
use signal_hook::flag;

use warp::Filter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> anyhow::Result<()> {
    stamina_node::global::init();

    #[cfg(not(windows))]
    for sig in TERM_SIGNALS {
        // A second term signal exits with code 1 once the first one has set the flag
        flag::register_conditional_shutdown(*sig, 1, EXIT_SIGNAL.clone())?;
        flag::register(*sig, EXIT_SIGNAL.clone())?;
    }

    SETTINGS.validate().map_err(anyhow::Error::msg)?;
    start_runtime()
}

fn start_runtime() -> anyhow::Result<()> {
    let worker_threads = if SETTINGS.node.network_threads == 0 {
        num_cpus::get()
    } else {
        SETTINGS.node.network_threads as usize
    };

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_io()
        .enable_time()
        .build()?;

    runtime.block_on(async {
        init_tracing("StaminaNode", SETTINGS.node.jaeger_enabled)?;
        let config = ChainConfig::from_settings(&SETTINGS).map_err(anyhow::Error::msg)?;

        if SETTINGS.node.memory_only {
            info!(
                "Running Stamina Node v{} on {} in memory only mode",
                env!("CARGO_PKG_VERSION"),
                config.network_name()
            );
            run_node(Chain::new(MemoryBackend::new(), config)).await
        } else {
            info!(
                "Running Stamina Node v{} on {}",
                env!("CARGO_PKG_VERSION"),
                config.network_name()
            );
            let db = create_rocksdb_backend().map_err(|err| anyhow::anyhow!("{err:?}"))?;
            run_node(Chain::new(DiskBackend::new(db), config)).await
        }
    })
}

async fn run_node<B: StateBackend + 'static>(chain: Chain<B>) -> anyhow::Result<()> {
    let genesis = chain
        .init_genesis()
        .map_err(|err| anyhow::anyhow!("could not write genesis: {err:?}"))?;
    let genesis_hash = genesis
        .hash()
        .map_err(|err| anyhow::anyhow!("{err:?}"))?;
    info!("Genesis block {genesis_hash}");

    let mempool = Mempool::shared(SETTINGS.node.mempool_size as usize);
    let coinbase = match &SETTINGS.node.coinbase_address {
        Some(address) => Address::from_hex(address).map_err(anyhow::Error::msg)?,
        None => *chain.config.operator(),
    };
    let node = Node::new(
        chain.clone(),
        mempool.clone(),
        coinbase,
        Duration::from_millis(SETTINGS.node.block_interval_ms),
    );

    #[cfg(feature = "rpc")]
    let run_rpc = async move {
        if SETTINGS.network.rpc_enabled {
            // Create transports
            let (client_transport, server_transport) = tarpc::transport::channel::unbounded();
            let server = server::BaseChannel::with_defaults(server_transport);
            let client =
                RpcServerDefinitionClient::new(tarpc::client::Config::default(), client_transport)
                    .spawn();

            // Schedule rpc server
            tokio::spawn(server.execute(RpcServer::new(chain, mempool).serve()));

            // Set up http route
            let client_filter = warp::any().map(move || client.clone());
            let rpc_path = warp::post()
                .and(warp::path::end())
                .and(json_body())
                .and(client_filter.clone())
                .and(warp::header("authorization"))
                .and_then(handle_rpc_request);

            let addr: SocketAddr = format!(
                "{}:{}",
                SETTINGS.network.rpc_listen_addr, SETTINGS.network.rpc_listen_port
            )
            .parse()?;

            info!(
                "Stamina Node v{} RPC listening on {}",
                env!("CARGO_PKG_VERSION"),
                addr
            );

            warp::serve(rpc_path).run(addr).await;
        } else {
            loop {
                sleep(Duration::from_secs(1)).await;
            }
        }

        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(feature = "rpc"))]
    let run_rpc = async move {
        loop {
            sleep(Duration::from_secs(1)).await;
        }

        Ok::<(), anyhow::Error>(())
    };

    let run_producer = async move {
        if SETTINGS.node.produce_blocks {
            node.run().await
        } else {
            loop {
                sleep(Duration::from_secs(1)).await;
            }
        }
    };

    tokio::select!(
        res = tokio::spawn(run_rpc) => res??,
        res = run_producer => res?,
        _ = check_exit_signal() => (),
    );

    Ok(())
}

async fn check_exit_signal() {
    while !exit_requested() {
        sleep(Duration::from_millis(10)).await;
    }

    info!(
        "Stamina Node v{} shutting down...",
        env!("CARGO_PKG_VERSION")
    );
}

async fn handle_rpc_request(
    request: tarpc::Request<RpcServerDefinitionRequest>,
    client: RpcServerDefinitionClient,
    authorization: String,
) -> Result<impl warp::Reply, warp::Rejection> {
    if !check_authorization_header(
        &authorization,
        &SETTINGS.network.rpc_username,
        &SETTINGS.network.rpc_password,
    ) {
        return Ok(warp::reply::with_status(
            warp::reply::json(&"Forbidden".to_owned()),
            warp::http::status::StatusCode::FORBIDDEN,
        ));
    }

    match dispatch_rpc_request(request, client).await {
        Ok(resp) => Ok(warp::reply::with_status(
            warp::reply::json(&resp),
            warp::http::StatusCode::CREATED,
        )),

        Err(err) => Ok(warp::reply::with_status(
            warp::reply::json(&err),
            warp::http::StatusCode::BAD_REQUEST,
        )),
    }
}

/// Initializes the tracing subscriber. Spans are exported to Jaeger when enabled.
fn init_tracing(service_name: &str, jaeger_enabled: bool) -> anyhow::Result<()> {
    let telemetry = if jaeger_enabled {
        env::set_var("OTEL_BSP_MAX_EXPORT_BATCH_SIZE", "12");
        let tracer = opentelemetry_jaeger::new_pipeline()
            .with_service_name(service_name)
            .with_max_packet_size(2usize.pow(13))
            .install_batch(opentelemetry::runtime::Tokio)?;

        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .try_init()?;

    Ok(())
}

fn json_body(
) -> impl Filter<Extract = (tarpc::Request<RpcServerDefinitionRequest>,), Error = warp::Rejection> + Clone
{
    // Reject huge payloads
    warp::body::content_length_limit(1024 * 64)
        .and(warp::body::json::<tarpc::Request<RpcServerDefinitionRequest>>())
}
