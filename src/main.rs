use clap::Parser;
use tokio::net::TcpListener;

use codecollab::config::Config;
use codecollab::gateway::hub::spawn_reaper;
use codecollab::state::AppState;
use codecollab::store::SessionStore;

#[derive(Parser, Debug)]
#[command(name = "codecollab", version, about = "Realtime collaborative code session server")]
struct Cli {
    /// Port to listen on (overrides PORT)
    #[arg(long, short)]
    port: Option<u16>,

    /// Address to bind (overrides CODECOLLAB_HOST)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codecollab=debug,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(host) = cli.host {
        config.host = host;
    }
    print_banner(&config);

    let store = SessionStore::new(config.snippets(), config.execution_history);
    let state = AppState::new(store, config.heartbeat);

    if let Some(ttl) = config.session_idle_ttl {
        spawn_reaper(state.hub.clone(), ttl, config.session_sweep_interval);
    }

    let app = codecollab::routes::router(state);

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .expect("failed to bind");

    let actual_port = listener
        .local_addr()
        .expect("failed to get local address")
        .port();
    eprintln!("  \x1b[32m→ listening on {}:{actual_port}\x1b[0m", config.host);
    eprintln!();

    axum::serve(listener, app).await.expect("server error");
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let idle = match config.session_idle_ttl {
        Some(ttl) => format!("{}s", ttl.as_secs()),
        None => "never".to_string(),
    };

    eprintln!();
    eprintln!("  \x1b[1;36mcodecollab\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mport\x1b[0m         {}", config.port);
    eprintln!(
        "  \x1b[2mheartbeat\x1b[0m    {}s / {}s",
        config.heartbeat.interval.as_secs(),
        config.heartbeat.timeout.as_secs()
    );
    eprintln!("  \x1b[2mexpiry\x1b[0m       {idle}");
    eprintln!("  \x1b[2mhistory\x1b[0m      {}", config.execution_history);

    if let Some(ref dir) = config.snippets_dir {
        eprintln!("  \x1b[2msnippets\x1b[0m     {}", dir.display());
    }

    eprintln!();
}
