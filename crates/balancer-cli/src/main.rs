//! Balancer command-line client.
//!
//! Drives the same orchestrators and store a UI would, printing results
//! instead of rendering them.
//!
//! Usage:
//!   balancer sign-in --email me@example.com --password '...'
//!   BALANCER_TOKEN=... balancer errors --all
//!   BALANCER_TOKEN=... balancer blacklist add 203.0.113.7
//!   BALANCER_TOKEN=... balancer summary --poll
//!   BALANCER_TOKEN=... balancer watch

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use balancer_client::api::{
    ApiErrorsSource, BlacklistSource, DatabaseSummarySource, EssentialsSource, ServerSummarySource,
    TradesSource,
};
use balancer_client::lists::{ApiErrorsAction, BlacklistAction, trades};
use balancer_client::{
    BalancerApi, ClientConfig, Credentials, EventHub, FetchOutcome, ListOrchestrator,
    RealtimeBridge, ResourceOrchestrator, Store, Toast, Toaster, WsTransport, sync_essentials,
};
use balancer_types::{
    ApiErrorRecord, AppEssentials, BlacklistedIp, DatabaseSummary, Record, ServerSummary,
    SortDirection, Trade,
};

#[derive(Parser, Debug)]
#[command(name = "balancer")]
#[command(about = "Command-line client for the Balancer backend")]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/balancer/client.ron)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and print the session tokens
    SignIn {
        /// Account email
        #[arg(long)]
        email: String,
        /// Account password
        #[arg(long)]
        password: String,
        /// One-time password when 2FA is enabled
        #[arg(long)]
        otp: Option<String>,
    },
    /// List API errors recorded by the backend, newest first
    Errors {
        /// Keep loading pages until the log is exhausted
        #[arg(long)]
        all: bool,
        /// Delete this error before listing
        #[arg(long)]
        delete: Option<u64>,
    },
    /// Manage the IP blacklist
    Blacklist {
        #[command(subcommand)]
        action: BlacklistCommand,
    },
    /// List executed trades ordered by event time
    Trades {
        /// Oldest first instead of newest first
        #[arg(long)]
        ascending: bool,
        /// Keep loading pages until the trade history is exhausted
        #[arg(long)]
        all: bool,
    },
    /// Show database and server summaries
    Summary {
        /// Keep polling the server summary until Ctrl-C
        #[arg(long)]
        poll: bool,
    },
    /// Follow the realtime app essentials until Ctrl-C
    Watch,
}

#[derive(Subcommand, Debug)]
enum BlacklistCommand {
    /// List blacklisted addresses
    List,
    /// Blacklist an IP address
    Add {
        /// Address to block
        ip: String,
    },
    /// Remove a blacklist entry
    Remove {
        /// Entry id, as shown by `blacklist list`
        id: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = ClientConfig::load(args.config.as_deref()).context("loading config")?;
    debug!(api = %config.api_url, "config loaded");

    let api = Arc::new(BalancerApi::from_config(&config)?);
    let (toaster, toasts) = Toaster::channel();
    let cli = Cli { config, api, toaster, json: args.json };

    let result = match args.command {
        Command::SignIn { email, password, otp } => {
            cli.sign_in(Credentials { email, password, otp_token: otp }).await
        }
        Command::Errors { all, delete } => cli.errors(all, delete).await,
        Command::Blacklist { action } => cli.blacklist(action).await,
        Command::Trades { ascending, all } => cli.trades(ascending, all).await,
        Command::Summary { poll } => cli.summary(poll).await,
        Command::Watch => cli.watch().await,
    };
    // Failures already surface through `result`.
    if result.is_ok() {
        print_toasts(toasts);
    }
    result
}

struct Cli {
    config: ClientConfig,
    api: Arc<BalancerApi>,
    toaster: Toaster,
    json: bool,
}

impl Cli {
    async fn sign_in(&self, credentials: Credentials) -> Result<()> {
        let session = self.api.sign_in(&credentials).await?;
        println!("access_token={}", session.access_token);
        println!("refresh_token={}", session.refresh_token);
        Ok(())
    }

    async fn errors(&self, all: bool, delete: Option<u64>) -> Result<()> {
        let list = ListOrchestrator::<ApiErrorRecord>::builder(
            "api_errors",
            Arc::new(ApiErrorsSource(self.api.clone())),
            self.toaster.clone(),
        )
        .page_size(self.config.page_size)
        .build();
        load_list(&list, all).await?;

        if let Some(id) = delete {
            self.api.delete_api_error(id).await?;
            list.apply(ApiErrorsAction::DeleteError(id).into());
            self.toaster.success(format!("Deleted error {id}"));
        }

        let records = list.snapshot().records().to_vec();
        self.print(&records, |e| {
            let decoded = e.decoded();
            let code = decoded.code.map(|c| format!(" [{c}]")).unwrap_or_default();
            format!("{}\t{}\t{}\t{}{}", e.id, e.created_at, e.origin, decoded.message, code)
        })
    }

    async fn blacklist(&self, action: BlacklistCommand) -> Result<()> {
        let list = ListOrchestrator::<BlacklistedIp>::builder(
            "ip_blacklist",
            Arc::new(BlacklistSource(self.api.clone())),
            self.toaster.clone(),
        )
        .page_size(self.config.page_size)
        .build();
        load_list(&list, false).await?;

        match action {
            BlacklistCommand::List => {}
            BlacklistCommand::Add { ip } => {
                let entry = self.api.register_ip(&ip).await?;
                info!(id = entry.id, ip = %entry.ip, "registered");
                list.apply(BlacklistAction::RegisterIp(entry).into());
                self.toaster.success(format!("Blacklisted {ip}"));
            }
            BlacklistCommand::Remove { id } => {
                self.api.unregister_ip(id).await?;
                list.apply(BlacklistAction::UnregisterIp(id).into());
                self.toaster.success(format!("Removed blacklist entry {id}"));
            }
        }

        let records = list.snapshot().records().to_vec();
        self.print(&records, |e| format!("{}\t{}", e.id, e.ip))
    }

    async fn trades(&self, ascending: bool, all: bool) -> Result<()> {
        let direction = if ascending { SortDirection::Ascending } else { SortDirection::Descending };
        let list = ListOrchestrator::<Trade>::builder(
            "trades",
            Arc::new(TradesSource(self.api.clone())),
            self.toaster.clone(),
        )
        .page_size(self.config.page_size)
        .collection(trades::collection(direction))
        .build();
        load_list(&list, all).await?;

        let records = list.snapshot().records().to_vec();
        self.print(&records, |t| {
            format!(
                "{}\t{}\t{}\t{}\t{} @ {} ({:.2})",
                t.id, t.event_time, t.symbol, t.side, t.quantity, t.price, t.notional()
            )
        })
    }

    async fn summary(&self, poll: bool) -> Result<()> {
        let database = ResourceOrchestrator::<DatabaseSummary>::new(
            "database_summary",
            Arc::new(DatabaseSummarySource::new(
                self.api.clone(),
                self.config.database_summary_revalidate(),
            )),
            self.toaster.clone(),
        );
        let server = ResourceOrchestrator::<ServerSummary>::new(
            "server_summary",
            Arc::new(ServerSummarySource(self.api.clone())),
            self.toaster.clone(),
        );
        expect_applied(database.load().await)?;
        expect_applied(server.load().await)?;

        if let Some(db) = database.value() {
            self.print_one(&db, |db| {
                let mut out = format!(
                    "database {}: {} bytes, {} rows",
                    db.name,
                    db.size_bytes,
                    db.total_rows()
                );
                for table in &db.tables {
                    out.push_str(&format!("\n  {}\t{} rows\t{} bytes", table.name, table.rows, table.size_bytes));
                }
                out
            })?;
        }
        if let Some(summary) = server.value() {
            self.print_one(&summary, format_server)?;
        }
        if !poll {
            return Ok(());
        }

        let mut updates = server.subscribe();
        let poller = server.spawn_polling(self.config.poll_interval());
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = updates.borrow_and_update().value.clone();
                    if let Some(summary) = value {
                        self.print_one(&summary, format_server)?;
                    }
                }
            }
        }
        server.teardown();
        poller.await?;
        Ok(())
    }

    async fn watch(&self) -> Result<()> {
        if self.api.credential().is_none() {
            bail!("watch needs a token (set BALANCER_TOKEN or run sign-in)");
        }
        let store = Store::new();
        let hub = EventHub::new();
        let transport = WsTransport::new(&self.config.ws_url, hub.clone())
            .with_token(self.api.credential());
        let cancel = transport.cancel_token();
        let transport = transport.spawn();

        let bridge = RealtimeBridge::new(hub, store.auth().subscribe());
        let sync = sync_essentials(&bridge, store.essentials().clone());
        store.auth().sign_in();

        // Seed with the current snapshot so the first line does not wait for a push.
        let initial = ResourceOrchestrator::<AppEssentials>::new(
            "app_essentials",
            Arc::new(EssentialsSource(self.api.clone())),
            self.toaster.clone(),
        );
        if initial.load().await == FetchOutcome::Applied {
            if let Some(essentials) = initial.value() {
                store.essentials().replace(essentials);
            }
        }

        let mut updates = store.essentials().subscribe();
        if let Some(essentials) = updates.borrow_and_update().clone() {
            self.print_one(&essentials, format_essentials)?;
        }
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = updates.borrow_and_update().clone();
                    if let Some(essentials) = value {
                        self.print_one(&essentials, format_essentials)?;
                    }
                }
            }
        }

        store.auth().sign_out();
        sync.abort();
        cancel.cancel();
        transport.await?;
        Ok(())
    }

    fn print<T: serde::Serialize>(&self, records: &[T], line: impl Fn(&T) -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(records)?);
        } else {
            for record in records {
                println!("{}", line(record));
            }
        }
        Ok(())
    }

    fn print_one<T: serde::Serialize>(&self, value: &T, text: impl Fn(&T) -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(value)?);
        } else {
            println!("{}", text(value));
        }
        Ok(())
    }
}

/// Initial load, then (with `all`) pages until the source is exhausted.
async fn load_list<T>(list: &ListOrchestrator<T>, all: bool) -> Result<()>
where
    T: Record + Send + Sync + 'static,
    T::Key: Send + Sync,
{
    expect_applied(list.initial_load().await)?;
    while all {
        match list.load_more().await {
            FetchOutcome::Applied => {}
            FetchOutcome::Skipped(reason) => {
                debug!(?reason, "stopped paging");
                break;
            }
            other => expect_applied(other)?,
        }
    }
    Ok(())
}

fn expect_applied(outcome: FetchOutcome) -> Result<()> {
    match outcome {
        FetchOutcome::Applied => Ok(()),
        FetchOutcome::Failed(error) => Err(error.into()),
        other => bail!("fetch did not complete: {other:?}"),
    }
}

fn format_server(s: &ServerSummary) -> String {
    format!(
        "server: up {}s, cpu {:.2}, memory {:.1}%",
        s.uptime_secs,
        s.cpu_load,
        s.memory_usage() * 100.0
    )
}

fn format_essentials(e: &AppEssentials) -> String {
    let market = e
        .market_state
        .map(|m| format!("{:+.2} @ {}", m.average, m.event_time))
        .unwrap_or_else(|| "n/a".into());
    format!(
        "notifications {}\tapi errors {}\tmarket {}",
        e.unread_notifications, e.unread_api_errors, market
    )
}

fn print_toasts(mut toasts: mpsc::UnboundedReceiver<Toast>) {
    while let Ok(toast) = toasts.try_recv() {
        match toast.code {
            Some(code) => eprintln!("[{}] {} ({code})", toast.level, toast.message),
            None => eprintln!("[{}] {}", toast.level, toast.message),
        }
    }
}
