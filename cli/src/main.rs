//! solarsim CLI: read, watch and tune a running simulation from the terminal.
//!
//! Usage:
//! ```bash
//! # Print every simulation parameter and result
//! solarsim get --url http://localhost:15702
//!
//! # Poll the server and print each refresh (Ctrl-C to stop)
//! solarsim watch --interval-ms 400
//!
//! # Change one slider parameter
//! solarsim set panel_area 2.5
//!
//! # Send a raw BRP call
//! solarsim call --method world.get_resources --params '{"resource":"solarsim_server::TestResource"}'
//! ```
//!
//! Without `--url`, the endpoint is read from `SOLARSIM_SERVER_HOST` and
//! `SOLARSIM_SERVER_PORT`.

use std::env;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use solarsim_core::config::{EndpointConfig, DEFAULT_TIMEOUT};
use solarsim_core::error::FetchError;
use solarsim_core::poll::{PollConfig, Poller, DEFAULT_INTERVAL};
use solarsim_core::request::{BrpMethod, JSONRPC_VERSION};
use solarsim_core::simulation::{
    load_fields, ControlPanel, LoadError, SimulationFields, SIMULATION_CONFIG_RESOURCE,
};
use solarsim_core::transport::Transport;
use solarsim_http::HttpGateway;

#[tokio::main]
async fn main() {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "get" => cmd_get(&args[2..]).await,
        "watch" => cmd_watch(&args[2..]).await,
        "set" => cmd_set(&args[2..]).await,
        "call" => cmd_call(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("solarsim {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing() {
    // RUST_LOG wins; otherwise "warn,solarsim=info".
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,solarsim=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!("solarsim {}", env!("CARGO_PKG_VERSION"));
    println!("Read, watch and tune a running solarsim server\n");
    println!("USAGE:");
    println!("    solarsim <COMMAND>\n");
    println!("COMMANDS:");
    println!("    get                    Print simulation parameters and results");
    println!("    watch                  Poll and print every refresh");
    println!("    set <field> <value>    Change one slider parameter");
    println!("    call                   Send a raw BRP call");
    println!("    version                Print version");
    println!("    help                   Print this help\n");
    println!("FLAGS:");
    println!("    --url <URL>            Server URL  [default: $SOLARSIM_SERVER_HOST:$SOLARSIM_SERVER_PORT]");
    println!("    --timeout-ms <MS>      Request timeout  [default: 10000]");
    println!("    --resource <PATH>      Resource type path  [default: {SIMULATION_CONFIG_RESOURCE}]");
    println!("    --interval-ms <MS>     Poll interval for watch  [default: 400]");
    println!("    --count <N>            Stop watch after N refreshes");
    println!("    --method <METHOD>      Method for call");
    println!("    --params <JSON>        Params for call");
}

async fn cmd_get(args: &[String]) -> anyhow::Result<()> {
    let gateway = gateway_from(args)?;
    let resource = resource_from(args);

    let fields = load_fields(&gateway, &resource).await.map_err(explain_load)?;
    print_fields(&fields);
    Ok(())
}

async fn cmd_watch(args: &[String]) -> anyhow::Result<()> {
    let gateway = Arc::new(gateway_from(args)?);
    let resource = Arc::new(resource_from(args));
    let interval = parse_u64_flag(args, "--interval-ms")?
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_INTERVAL);
    let count = parse_u64_flag(args, "--count")?;

    let producer = move || {
        let gateway = Arc::clone(&gateway);
        let resource = Arc::clone(&resource);
        async move { load_fields(gateway.as_ref(), &resource).await }
    };
    let config = PollConfig::default()
        .interval(interval)
        .on_error(|e: &LoadError| tracing::debug!(error = %e, "refresh failed"));
    let poller = Poller::spawn(producer, config);
    let mut updates = poller.subscribe();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printed = 0u64;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut ctrl_c => break,
        }

        let state = updates.borrow_and_update().clone();
        if state.loading {
            continue;
        }
        match (&state.error, &state.data) {
            (Some(e), _) => println!("! {}", e.user_message()),
            (None, Some(fields)) => print_fields(fields),
            (None, None) => continue,
        }
        println!();

        printed += 1;
        if count.is_some_and(|n| printed >= n) {
            break;
        }
    }

    poller.shutdown();
    Ok(())
}

async fn cmd_set(args: &[String]) -> anyhow::Result<()> {
    let (field, raw) = match positionals(args)[..] {
        [field, raw] => (field, raw),
        _ => return Err(anyhow!("usage: solarsim set <field> <value>")),
    };
    let value: f64 = raw
        .parse()
        .with_context(|| format!("value for {field} must be a number"))?;

    let gateway = gateway_from(args)?;
    let resource = resource_from(args);

    let fields = load_fields(&gateway, &resource).await.map_err(explain_load)?;
    let before = fields.get(field).map(|f| f.value);

    let mut panel = ControlPanel::new(resource);
    panel.apply_poll(fields);
    panel.begin_edit();
    let request = panel.commit(1, field, value)?;

    let reply = gateway.send(&request).await.map_err(explain_fetch)?;
    reply.data.into_result()?;

    let after = panel.fields().and_then(|f| f.get(field)).map(|f| f.value);
    println!(
        "{field}: {:.2} -> {:.2}",
        before.unwrap_or_default(),
        after.unwrap_or(value)
    );
    Ok(())
}

async fn cmd_call(args: &[String]) -> anyhow::Result<()> {
    let name = parse_flag(args, "--method").ok_or_else(|| anyhow!("--method is required"))?;
    let method = BrpMethod::from_name(&name).ok_or_else(|| anyhow!("unknown method: {name}"))?;
    if !method.is_supported() {
        return Err(anyhow!("{method} is reserved and not supported by this client"));
    }
    let params: Option<Value> = parse_flag(args, "--params")
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .context("--params must be valid JSON")?;

    let gateway = gateway_from(args)?;
    let mut body = json!({ "jsonrpc": JSONRPC_VERSION, "id": 1, "method": method.as_str() });
    if let Some(params) = params {
        body["params"] = params;
    }

    let reply = gateway.post(body).await.map_err(explain_fetch)?;
    println!("{}", serde_json::to_string_pretty(&reply.data).unwrap_or_default());
    Ok(())
}

fn gateway_from(args: &[String]) -> anyhow::Result<HttpGateway> {
    let timeout = parse_u64_flag(args, "--timeout-ms")?.map(Duration::from_millis);

    let gateway = match parse_flag(args, "--url") {
        Some(url) => HttpGateway::with_url(url, timeout.unwrap_or(DEFAULT_TIMEOUT))?,
        None => {
            let mut config = EndpointConfig::from_env()
                .context("no --url given and the endpoint environment is incomplete")?;
            if let Some(timeout) = timeout {
                config.request_timeout = timeout;
            }
            HttpGateway::new(&config)?
        }
    };
    tracing::debug!(url = gateway.url(), "using endpoint");
    Ok(gateway)
}

fn resource_from(args: &[String]) -> String {
    parse_flag(args, "--resource").unwrap_or_else(|| SIMULATION_CONFIG_RESOURCE.to_string())
}

fn print_fields(fields: &SimulationFields) {
    println!("Simulation Parameters");
    for (name, field) in fields.sliders() {
        println!(
            "  {name:<32} {:>10.2}  [{:.2} .. {:.2}]",
            field.value, field.min, field.max
        );
    }
    println!("Simulation Results");
    for (name, field) in fields.read_only() {
        println!("  {name:<32} {:>10.2}", field.value);
    }
}

fn explain_load(e: LoadError) -> anyhow::Error {
    anyhow!("{} ({e})", e.user_message())
}

fn explain_fetch(e: FetchError) -> anyhow::Error {
    anyhow!("{} ({e})", e.user_message())
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

/// Arguments that are neither a `--flag` nor the value following one.
fn positionals(args: &[String]) -> Vec<&str> {
    let mut found = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            iter.next();
        } else {
            found.push(arg.as_str());
        }
    }
    found
}

fn parse_u64_flag(args: &[String], flag: &str) -> anyhow::Result<Option<u64>> {
    parse_flag(args, flag)
        .map(|raw| {
            raw.parse::<u64>()
                .with_context(|| format!("{flag} expects a whole number, got {raw:?}"))
        })
        .transpose()
}
