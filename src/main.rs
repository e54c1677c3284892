use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use comfy_table::{modifiers, presets, ContentArrangement, Table};
use terminal_size::{terminal_size, Width};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use yansi::Paint;

use fleetwatch::api::{CheckStatus, HttpCloudApi};
use fleetwatch::{
    config, ActionOutcome, CacheEvent, Config, Engine, Instance, InstanceAction, InstanceState,
    ReadFilter,
};

#[derive(Parser)]
#[command(
    name = "fleetwatch",
    author,
    version,
    about = "Multi-region compute instance watcher",
    long_about = r#"fleetwatch — keep a local view of your compute instances across regions.

The engine periodically fetches per-region instance snapshots, merges them
into a local cache, and reconciles optimistic state after start/stop/reboot
commands. Use the `--env-file` option or environment variables to provide
API credentials.

Examples:
  1) List everything once:
      fleetwatch instances list
  2) Act on an instance:
      fleetwatch instances start us-east-1 i-0abc123
  3) Follow the cache live:
      fleetwatch watch
"#,
    after_help = "Use `fleetwatch <subcommand> --help` for subcommand specific options."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to .env file
    #[arg(long, global = true)]
    env_file: Option<String>,
    /// Disable colorized output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration (env vars / API credentials)
    #[command(
        about = "Validate configuration and ensure API connectivity.",
        long_about = "Validate the environment variables fleetwatch needs, then validate the configured API token by fetching the region catalog."
    )]
    CheckConfig,
    /// List the region catalog
    Regions,
    /// Inspect and control instances through the cache
    Instances {
        #[command(subcommand)]
        sub: InstanceCommands,
    },
    /// Run the refresh scheduler and stream cache-change events
    #[command(
        about = "Follow the cache live",
        long_about = "Start the periodic refresh scheduler and print every cache-change event until interrupted with Ctrl-C."
    )]
    Watch,
}

#[derive(Subcommand)]
enum InstanceCommands {
    /// List instances from a fresh snapshot
    List {
        /// Only show one region
        #[arg(long)]
        region: Option<String>,
        /// Only show instances in this confirmed state (e.g. running)
        #[arg(long)]
        state: Option<String>,
    },
    /// Start a stopped instance
    Start { region: String, instance_id: String },
    /// Stop a running instance
    Stop { region: String, instance_id: String },
    /// Reboot a running instance
    Reboot { region: String, instance_id: String },
    /// Show the current system/instance status checks
    Status { region: String, instance_id: String },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if cli.no_color {
        yansi::whenever(yansi::Condition::NEVER);
    }
    config::load_env_file(cli.env_file.as_deref());

    match cli.command {
        Commands::CheckConfig => check_config().await,
        Commands::Regions => {
            let engine = start_engine(false).await;
            match engine.regions().await {
                Ok(regions) => print_regions(&regions),
                Err(e) => fail(&format!("Failed to list regions: {}", e)),
            }
            engine.shutdown().await;
        }
        Commands::Instances { sub } => {
            let engine = start_engine(false).await;
            // Status goes straight to the remote; everything else validates
            // against a fresh snapshot first.
            if !matches!(sub, InstanceCommands::Status { .. }) {
                engine.refresh_and_wait().await;
            }
            match sub {
                InstanceCommands::List { region, state } => {
                    let mut filter = ReadFilter::default();
                    if let Some(region) = region {
                        filter = filter.region(&region);
                    }
                    if let Some(raw) = state {
                        match raw.parse::<InstanceState>() {
                            Ok(state) => filter = filter.state(state),
                            Err(e) => fail(&e),
                        }
                    }
                    print_instances(&engine.read(&filter));
                }
                InstanceCommands::Start { region, instance_id } => {
                    run_action(&engine, &region, &instance_id, InstanceAction::Start).await;
                }
                InstanceCommands::Stop { region, instance_id } => {
                    run_action(&engine, &region, &instance_id, InstanceAction::Stop).await;
                }
                InstanceCommands::Reboot { region, instance_id } => {
                    run_action(&engine, &region, &instance_id, InstanceAction::Reboot).await;
                }
                InstanceCommands::Status { region, instance_id } => {
                    match engine.instance_status(&region, &instance_id).await {
                        Ok(checks) => {
                            println!(
                                "{} {}",
                                Paint::new("system check:  ").dim(),
                                format_check(checks.system_status)
                            );
                            println!(
                                "{} {}",
                                Paint::new("instance check:").dim(),
                                format_check(checks.instance_status)
                            );
                        }
                        Err(e) => fail(&format!("Status query failed: {}", e)),
                    }
                }
            }
            engine.shutdown().await;
        }
        Commands::Watch => watch().await,
    }
}

async fn start_engine(auto_refresh: bool) -> Engine {
    let mut cfg = Config::from_env();
    cfg.auto_refresh = auto_refresh;
    let api = match HttpCloudApi::new(&cfg) {
        Ok(api) => api,
        Err(e) => fail(&format!("Failed to build API client: {}", e)),
    };
    Engine::start(cfg, Arc::new(api))
}

async fn check_config() {
    let cfg = Config::from_env();
    let mut ok = true;
    if cfg.api_base_url.trim().is_empty() {
        eprintln!("{}", Paint::new("API_BASE_URL is not configured").red());
        ok = false;
    }
    if cfg.api_token.trim().is_empty() {
        eprintln!("{}", Paint::new("API_TOKEN is not configured").red());
        ok = false;
    }
    if !ok {
        process::exit(1);
    }
    let engine = start_engine(false).await;
    match engine.regions().await {
        Ok(regions) => {
            println!(
                "{} {}",
                Paint::new("Configuration OK:").green(),
                Paint::new(format!("{} regions visible", regions.len())).cyan()
            );
        }
        Err(e) => fail(&format!("API check failed: {}", e)),
    }
    engine.shutdown().await;
}

async fn run_action(engine: &Engine, region: &str, id: &str, action: InstanceAction) {
    match engine.request_action(region, id, action).await {
        Ok(ActionOutcome::Accepted) => {
            println!(
                "{} {} {} {}",
                Paint::new(action.as_str()).green().bold(),
                Paint::new(id).cyan(),
                Paint::new("accepted; expected state:").dim(),
                Paint::new(display_after(engine, region, id)).yellow()
            );
        }
        Ok(ActionOutcome::Rejected(reason)) => {
            eprintln!("{} {}", Paint::new("Rejected:").yellow().bold(), reason);
            process::exit(1);
        }
        Err(e) => fail(&format!("Action failed: {}", e)),
    }
}

fn display_after(engine: &Engine, region: &str, id: &str) -> String {
    engine
        .read(&ReadFilter::default().region(region))
        .iter()
        .find(|i| i.id == id)
        .map(|i| i.display_state().to_string())
        .unwrap_or_else(|| "unknown".into())
}

async fn watch() {
    let engine = start_engine(true).await;
    let mut events = engine.subscribe();
    println!(
        "{}",
        Paint::new("Watching cache events; Ctrl-C to stop.").dim()
    );
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    eprintln!("{}", Paint::new(format!("(dropped {} events)", missed)).dim());
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    engine.shutdown().await;
}

fn print_event(event: &CacheEvent) {
    match event {
        CacheEvent::RegionRefreshed {
            region,
            instances,
            changed,
        } => {
            let marker = if *changed { "*" } else { " " };
            println!(
                "{} {} {} instances",
                Paint::new(format!("refreshed{}", marker)).green(),
                Paint::new(region).cyan(),
                instances
            );
        }
        CacheEvent::RegionFailed { region, error } => {
            println!(
                "{} {} {}",
                Paint::new("failed   ").red(),
                Paint::new(region).cyan(),
                error
            );
        }
        CacheEvent::InstanceEvicted { region, id } => {
            println!(
                "{} {}/{}",
                Paint::new("evicted  ").yellow(),
                Paint::new(region).cyan(),
                id
            );
        }
        CacheEvent::ActionAccepted { region, id, action } => {
            println!(
                "{} {} on {}/{}",
                Paint::new("action   ").magenta(),
                action,
                Paint::new(region).cyan(),
                id
            );
        }
        CacheEvent::ScanCompleted {
            tick,
            failed_regions,
        } => {
            println!(
                "{} tick {} ({} failed regions)",
                Paint::new("scan done").dim(),
                tick,
                failed_regions
            );
        }
        CacheEvent::SchedulerHalted { reason } => {
            println!("{} {}", Paint::new("HALTED   ").red().bold(), reason);
        }
    }
}

fn print_regions(regions: &[fleetwatch::Region]) {
    let mut table = new_table();
    table.set_header(vec!["Code", "Name", "Enabled"]);
    for region in regions {
        table.add_row(vec![
            region.code.clone(),
            region.display_name.clone(),
            if region.enabled { "yes".into() } else { "no".into() },
        ]);
    }
    println!("\n{table}\n");
}

fn print_instances(instances: &[Instance]) {
    if instances.is_empty() {
        println!("(no instances)");
        return;
    }
    let mut table = new_table();
    table.set_header(vec![
        "Region", "ID", "Name", "State", "Type", "Public IP", "Private IP", "Pinned",
    ]);
    for instance in instances {
        table.add_row(vec![
            instance.region.clone(),
            instance.id.clone(),
            instance.name.clone(),
            format_state(instance),
            instance.instance_type.clone(),
            instance.public_ip.clone().unwrap_or_else(|| "—".into()),
            instance.private_ip.clone().unwrap_or_else(|| "—".into()),
            if instance.pinned { "yes".into() } else { "—".into() },
        ]);
    }
    println!("\n{table}\n");
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    if let Some((Width(w), _)) = terminal_size() {
        table.set_width(w.saturating_sub(4));
    }
    table
}

fn format_state(instance: &Instance) -> String {
    let display = instance.display_state();
    let painted = match display {
        "running" => Paint::new(display).green().to_string(),
        "pending" | "stopping" | "rebooting" => Paint::new(display).yellow().to_string(),
        "stopped" => Paint::new(display).red().to_string(),
        "shutting-down" | "terminated" => Paint::new(display).dim().to_string(),
        other => other.to_string(),
    };
    if instance.optimistic.is_some() {
        format!("{} {}", painted, Paint::new("(optimistic)").dim())
    } else if instance.stale {
        format!("{} {}", painted, Paint::new("(stale)").dim())
    } else {
        painted
    }
}

fn format_check(status: CheckStatus) -> String {
    match status {
        CheckStatus::Ok => Paint::new(status.as_str()).green().to_string(),
        CheckStatus::Impaired => Paint::new(status.as_str()).red().bold().to_string(),
        _ => Paint::new(status.as_str()).yellow().to_string(),
    }
}

fn fail(msg: &str) -> ! {
    eprintln!("{}", Paint::new(msg).red());
    process::exit(1);
}
