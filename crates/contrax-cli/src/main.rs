//! `contrax`: command-line front end for the contract-analysis backend.

mod display;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use contrax_client::{
    Actions, ApiClient, ContractService, Level, Notification, Notifier, QueryCache, ReportFormat,
    Restored, Session, WatchRegistry, WatchUpdate, Watcher,
};
use contrax_core::config::normalize_base_url;
use contrax_core::{
    ClientConfig, ContractFilters, ContractStatus, LoginCredentials, NewContract, Registration,
    TerminalEvent,
};
use contrax_proxy::{ProxyConfig, config::parse_addr};
use contrax_store::{CredentialStore, FileStorage};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const ENV_SESSION_FILE: &str = "CONTRAX_SESSION_FILE";

#[derive(Parser)]
#[command(name = "contrax", version, about = "Analyze contracts for abusive clauses")]
struct Cli {
    /// Backend base URL.
    #[arg(long, global = true, env = "NEXT_PUBLIC_BACKEND_URL")]
    backend_url: Option<String>,

    /// Credential file.
    #[arg(long, global = true, env = ENV_SESSION_FILE, value_name = "PATH")]
    session_file: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session.
    Login {
        username: String,
        #[arg(long, env = "CONTRAX_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and store the session.
    Register {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CONTRAX_PASSWORD", hide_env_values = true)]
        password: String,
        /// Defaults to --password.
        #[arg(long)]
        password_confirm: Option<String>,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// Revoke the refresh token and forget the session.
    Logout,
    /// Validate the stored session and show the user.
    Whoami,
    /// List contract types.
    Types,
    /// Dashboard statistics.
    Stats,
    #[command(subcommand)]
    Contracts(ContractCommand),
    /// Run the development proxy.
    Proxy {
        #[arg(
            long,
            env = contrax_proxy::ENV_PROXY_ADDR,
            default_value = contrax_proxy::DEFAULT_PROXY_ADDR
        )]
        bind: String,
    },
}

#[derive(Subcommand)]
enum ContractCommand {
    List {
        #[arg(long)]
        status: Option<ContractStatus>,
        #[arg(long = "type")]
        contract_type: Option<i64>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
    },
    Show {
        id: String,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long = "type")]
        contract_type: i64,
        /// Read the contract text from a file.
        #[arg(long, conflicts_with = "text", required_unless_present = "text")]
        file: Option<PathBuf>,
        #[arg(long)]
        text: Option<String>,
    },
    Analyze {
        id: String,
        /// Follow the analysis until it settles.
        #[arg(long)]
        watch: bool,
    },
    Reanalyze {
        id: String,
        #[arg(long)]
        watch: bool,
    },
    Delete {
        id: String,
    },
    Export {
        id: String,
        #[arg(long)]
        format: Option<ReportFormat>,
        /// Defaults to the filename the backend suggests.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Follow a contract's analysis status.
    Watch {
        id: String,
    },
    Clauses {
        id: String,
    },
}

/// Prints notifications to stderr.
struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, n: Notification) {
        match n.level {
            Level::Success => eprintln!("{}", n.message),
            Level::Error => eprintln!("error: {}", n.message),
        }
    }
}

struct App {
    config: ClientConfig,
    client: ApiClient,
    service: ContractService,
    actions: Actions,
    watches: Arc<WatchRegistry>,
}

impl App {
    fn open(cli: &Cli) -> Result<Self> {
        let mut config = ClientConfig::from_env().context("reading client configuration")?;
        if let Some(url) = &cli.backend_url {
            config.backend_url = normalize_base_url(url)?;
        }
        let path = cli.session_file.clone().unwrap_or_else(default_session_file);
        let store = CredentialStore::new(Arc::new(FileStorage::open(&path)));
        let session = Arc::new(Session::new(store));
        session
            .load()
            .with_context(|| format!("reading session from {}", path.display()))?;

        let client = ApiClient::new(config.clone(), session);
        let cache = Arc::new(QueryCache::new());
        let notifier: Arc<dyn Notifier> = Arc::new(StderrNotifier);
        let service = ContractService::new(client.clone(), cache.clone());
        let watcher = Watcher::new(
            Arc::new(service.clone()),
            cache.clone(),
            notifier.clone(),
            config.poll_interval,
        );
        let watches = Arc::new(WatchRegistry::new(watcher));
        let actions = Actions::new(client.clone(), cache, notifier).with_watches(watches.clone());
        Ok(Self {
            config,
            client,
            service,
            actions,
            watches,
        })
    }
}

fn default_session_file() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".contrax").join("session.json"),
        None => PathBuf::from(".contrax").join("session.json"),
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    info!("contrax v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Proxy { bind } = &cli.command {
        let mut config = ProxyConfig::from_env()?;
        if let Some(url) = &cli.backend_url {
            config.backend_url = normalize_base_url(url)?;
        }
        config.bind = parse_addr(bind)?;
        contrax_proxy::serve(config).await?;
        return Ok(());
    }

    let app = App::open(&cli)?;
    let scale = app.config.risk_scale;

    match cli.command {
        Commands::Login { username, password } => {
            let user = app
                .client
                .login(&LoginCredentials { username, password })
                .await?;
            println!("Logged in as {}", user.display_name());
        }
        Commands::Register {
            username,
            email,
            password,
            password_confirm,
            first_name,
            last_name,
        } => {
            let registration = Registration {
                username,
                email,
                password_confirm: password_confirm.unwrap_or_else(|| password.clone()),
                password,
                first_name,
                last_name,
            };
            let user = app.client.register(&registration).await?;
            println!("Registered {}", user.username);
        }
        Commands::Logout => {
            app.client.logout().await;
            println!("Logged out");
        }
        Commands::Whoami => match app.client.restore_session().await? {
            Restored::Authenticated(user) => display::print_user(&user),
            Restored::Unauthenticated => bail!("not logged in"),
        },
        Commands::Types => {
            display::print_types(&app.service.contract_types().await?);
        }
        Commands::Stats => {
            display::print_stats(&app.service.dashboard_stats().await?, scale);
        }
        Commands::Contracts(cmd) => run_contract_command(&app, cmd).await?,
        Commands::Proxy { .. } => unreachable!("handled above"),
    }
    Ok(())
}

async fn run_contract_command(app: &App, cmd: ContractCommand) -> Result<()> {
    let scale = app.config.risk_scale;
    match cmd {
        ContractCommand::List {
            status,
            contract_type,
            search,
            page,
            page_size,
        } => {
            let filters = ContractFilters {
                status,
                contract_type,
                search,
                page,
                page_size,
            };
            display::print_contract_list(&app.service.contracts(&filters).await?, scale);
        }
        ContractCommand::Show { id } => {
            let (contract, clauses) = app.service.contract_with_clauses(&id).await?;
            display::print_contract_card(&contract, scale);
            if contract.status == ContractStatus::Completed {
                display::print_clauses(&clauses, scale);
            }
        }
        ContractCommand::Create {
            title,
            contract_type,
            file,
            text,
        } => {
            let original_text = match (file, text) {
                (Some(path), _) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, Some(text)) => text,
                (None, None) => bail!("either --file or --text is required"),
            };
            let created = app
                .actions
                .create(&NewContract {
                    title,
                    original_text,
                    contract_type,
                })
                .await?;
            println!("{}", created.id);
        }
        ContractCommand::Analyze { id, watch } => analyze(app, &id, false, watch).await?,
        ContractCommand::Reanalyze { id, watch } => analyze(app, &id, true, watch).await?,
        ContractCommand::Delete { id } => {
            app.actions.delete(&id).await?;
        }
        ContractCommand::Export { id, format, output } => {
            let report = app.client.export_report(&id, format).await?;
            let path = output
                .or_else(|| report.filename.as_ref().map(PathBuf::from))
                .unwrap_or_else(|| {
                    let ext = format.unwrap_or(ReportFormat::Pdf).as_str();
                    PathBuf::from(format!("contract_{id}_report.{ext}"))
                });
            std::fs::write(&path, &report.bytes)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{} ({} bytes, {})", path.display(), report.bytes.len(), report.content_type);
        }
        ContractCommand::Watch { id } => {
            let updates = app.watches.start(&id, false);
            follow(updates, true, scale).await?;
        }
        ContractCommand::Clauses { id } => {
            display::print_clauses(&app.service.clauses(&id).await?, scale);
        }
    }
    Ok(())
}

/// Why the request probably won't change anything, given the current status.
fn analysis_warning(status: ContractStatus, force: bool) -> Option<String> {
    if force && !status.can_reanalyze() {
        Some(format!(
            "contract is {status}; reanalysis applies to completed or failed contracts"
        ))
    } else if !force && !status.can_analyze() {
        Some(format!(
            "contract is {status}; analyze applies to pending contracts, try reanalyze"
        ))
    } else {
        None
    }
}

async fn analyze(app: &App, id: &str, force: bool, follow_up: bool) -> Result<()> {
    match app.client.get_contract(id).await {
        Ok(contract) => {
            if let Some(warning) = analysis_warning(contract.status, force) {
                warn!(id, "{warning}");
            }
        }
        Err(e) => debug!(id, error = %e, "status check before analysis failed"),
    }
    // Subscribe before the request so the invalidation it causes arms the watcher.
    let updates = follow_up.then(|| app.watches.start(id, false));
    if force {
        app.actions.reanalyze(id).await?;
    } else {
        app.actions.analyze(id).await?;
    }
    if let Some(updates) = updates {
        follow(updates, false, app.config.risk_scale).await?;
    }
    Ok(())
}

/// Print status changes until the analysis settles or Ctrl-C.
///
/// With `stop_when_idle`, also stop as soon as a non-analyzing status is
/// observed, since nothing else will change without a new request.
async fn follow(
    mut updates: watch::Receiver<WatchUpdate>,
    stop_when_idle: bool,
    scale: contrax_core::RiskScale,
) -> Result<()> {
    let mut last: Option<ContractStatus> = None;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    bail!("watcher stopped");
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
        let update = updates.borrow_and_update().clone();
        if let Some(err) = &update.last_error {
            eprintln!("fetch failed: {err}");
        }
        let Some(contract) = &update.contract else {
            continue;
        };
        if last != Some(contract.status) {
            println!("{}: {}", contract.title, contract.status);
            last = Some(contract.status);
        }
        match update.event {
            Some(TerminalEvent::Completed) => {
                println!();
                display::print_contract_card(contract, scale);
                return Ok(());
            }
            Some(TerminalEvent::Failed) => bail!("analysis of {} failed", contract.id),
            None if stop_when_idle && contract.status != ContractStatus::Analyzing => {
                return Ok(());
            }
            None => {}
        }
    }
}
