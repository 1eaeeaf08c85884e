use std::{path::PathBuf, time::Duration};

use {
    agentfield_config::GatewayClientConfig,
    agentfield_gateway_client::{GatewayClient, RpcOptions, TenantContext},
    agentfield_protocol::subscriptions::WILDCARD,
    anyhow::{Context, Result},
    clap::{Parser, Subcommand},
    serde_json::{Value, json},
    tracing_subscriber::EnvFilter,
};

/// Operator CLI for AgentField gateways.
///
/// Connects with the same session client the console UI uses, so it is
/// also the quickest way to check credentials and tenant scoping.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Gateway WebSocket URL. Overrides the config file.
    #[arg(long)]
    url: Option<String>,

    /// Operator token. Falls back to AGENTFIELD_TOKEN or the config file.
    #[arg(long, env = "AGENTFIELD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(long)]
    org: Option<String>,

    #[arg(long)]
    project: Option<String>,

    /// Deployment environment, e.g. `prod`.
    #[arg(long = "env")]
    environment: Option<String>,

    /// Config file to load instead of the discovered one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log as JSON lines on stderr.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect, print what the gateway advertised, and exit.
    Status,
    /// Print events as JSON lines until interrupted.
    Watch {
        /// Event names to follow. Defaults to everything.
        #[arg(long = "event", default_value = WILDCARD)]
        events: Vec<String>,
    },
    /// Call a method and print the result.
    Call {
        method: String,
        /// Params as a JSON document.
        params: Option<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Attach a fresh idempotency key.
        #[arg(long)]
        idempotent: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(args: &Args) -> Result<GatewayClientConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = agentfield_config::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            agentfield_config::apply_env(&mut config);
            config
        },
        None => agentfield_config::discover_and_load(),
    };
    if let Some(url) = &args.url {
        config.url.clone_from(url);
    }
    config.validate().context("invalid gateway client config")?;
    Ok(config)
}

fn tenant_context(args: &Args, config: &GatewayClientConfig) -> TenantContext {
    let mut context = TenantContext::from_config(config);
    if let Some(token) = &args.token {
        context = context.with_token(token.clone());
    }
    if let Some(org) = &args.org {
        context = context.with_org(org.clone());
    }
    if let Some(project) = &args.project {
        context = context.with_project(project.clone());
    }
    if let Some(environment) = &args.environment {
        context = context.with_environment(environment.clone());
    }
    context
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json);

    let config = load_config(&args)?;
    let context = tenant_context(&args, &config);
    let url = config.url.clone();
    let client = GatewayClient::new(config).context("failed to build gateway client")?;

    match args.command {
        Command::Status => {
            client
                .connect(context)
                .await
                .with_context(|| format!("failed to connect to {url}"))?;
            print_json(&status_report(&client))?;
        },
        Command::Watch { events } => watch(&client, context, &events).await?,
        Command::Call {
            method,
            params,
            timeout_ms,
            idempotent,
        } => {
            let params = match params {
                Some(raw) => serde_json::from_str(&raw).context("params must be valid JSON")?,
                None => Value::Null,
            };
            let mut options = RpcOptions::default().no_queue();
            if let Some(ms) = timeout_ms {
                options.timeout = Some(Duration::from_millis(ms));
            }
            if idempotent {
                options = options.idempotent();
            }

            client
                .connect(context)
                .await
                .with_context(|| format!("failed to connect to {url}"))?;
            let result = client
                .rpc(&method, params, options)
                .await
                .with_context(|| format!("`{method}` failed"))?;
            print_json(&result)?;
        },
    }

    client.disconnect();
    Ok(())
}

fn status_report(client: &GatewayClient) -> Value {
    let connection = client.connection();
    json!({
        "state": client.state(),
        "connId": connection.as_ref().map(|c| c.conn_id.clone()),
        "protocol": connection.as_ref().map(|c| c.protocol_version),
        "server": client.server_info(),
        "features": client.features(),
        "policy": client.policy(),
        "stateVersion": client.last_state_version(),
    })
}

async fn watch(client: &GatewayClient, context: TenantContext, events: &[String]) -> Result<()> {
    for event in events {
        client.on(event.as_str(), |frame| match serde_json::to_string(frame) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(event = %frame.event, "unprintable event: {e}"),
        });
    }

    client
        .connect(context)
        .await
        .context("failed to connect to gateway")?;
    tracing::info!(events = ?events, "watching, ctrl-c to stop");

    let mut states = client.subscribe_state();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                return Ok(());
            },
            changed = states.changed() => {
                changed.context("state channel closed")?;
                let state = *states.borrow_and_update();
                tracing::info!(%state, "connection state changed");
                if state.is_idle() {
                    anyhow::bail!("session ended in state {state}");
                }
            },
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
