use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use feedscout::api::{NewSubscription, RadarClient};
use feedscout::config::Config;
use feedscout::feed::{self, LocalDiscovery};
use feedscout::import::{ImportFilter, ImportList};
use feedscout::resolver::{FeedResolver, SearchSession, Tagged};
use feedscout::search::HttpKeywordSearch;
use feedscout::slug::{title_to_slug, validate_slug};

const DEFAULT_TABLE_WIDTH: usize = 100;

#[derive(Parser, Debug)]
#[command(
    name = "feedscout",
    version,
    about = "Find feeds and manage radar mailbox subscriptions"
)]
struct Args {
    /// Config file (default: ~/.config/feedscout/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Mailbox server base URL, overriding the config file
    #[arg(long, global = true, value_name = "URL")]
    server: Option<String>,

    /// Probe feeds in-process instead of through the server
    #[arg(long, global = true)]
    local: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a URL or search terms to candidate feeds (Ctrl-C cancels)
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Subscribe this mailbox to the feeds found
        #[arg(long, value_name = "MAILBOX")]
        subscribe: Option<String>,

        /// With --subscribe, also submit rows where no feed was found
        #[arg(long)]
        all: bool,
    },
    /// Read queries from stdin, one per line; only the latest is shown
    /// ("cancel" drops the one in flight, "quit" exits)
    Interactive,
    /// Print the mailbox slug derived from a title
    Slug {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// Create, delete or check mailboxes
    Mailbox {
        #[command(subcommand)]
        action: MailboxAction,
    },
    /// Manage a mailbox's subscriptions
    Subs {
        /// Mailbox slug (default: default_mailbox from the config file)
        #[arg(long, short, value_name = "SLUG")]
        mailbox: Option<String>,

        #[command(subcommand)]
        action: SubsAction,
    },
    /// List the feeds in a local OPML file, optionally subscribing to them
    Opml {
        file: PathBuf,

        #[arg(long, value_name = "MAILBOX")]
        subscribe: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum MailboxAction {
    /// Create a mailbox; the slug is derived from the title unless given
    Create {
        #[arg(long)]
        title: String,
        slug: Option<String>,
    },
    Delete { slug: String },
    /// Report whether a slug is valid and still free
    Check { slug: String },
}

#[derive(Subcommand, Debug)]
enum SubsAction {
    List,
    Add {
        url: String,
        #[arg(long)]
        title: Option<String>,
    },
    Rename { sub: String, title: String },
    Remove { sub: String },
    /// Upload an OPML file to the mailbox
    Import {
        file: PathBuf,
        /// Delete subscriptions missing from the file
        #[arg(long)]
        replace: bool,
    },
    /// Download the mailbox's subscriptions as OPML
    Export {
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Shared handles for every command.
struct App {
    config: Config,
    client: RadarClient,
    http: reqwest::Client,
}

impl App {
    fn new(mut config: Config, args: &Args) -> Result<Self> {
        if let Some(server) = &args.server {
            config.server_url = server.clone();
        }
        if args.local {
            config.local_discovery = true;
        }

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout())
            .user_agent(concat!("feedscout/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        let client = RadarClient::with_client(http.clone(), &config.server_url)
            .with_context(|| format!("Invalid server URL '{}'", config.server_url))?;

        Ok(Self {
            config,
            client,
            http,
        })
    }

    /// Logs in when credentials are configured. The server decides whether
    /// anonymous access is allowed.
    async fn authenticate(&self) -> Result<()> {
        let Some(username) = &self.config.username else {
            tracing::debug!("No username configured, continuing anonymously");
            return Ok(());
        };
        let password = self
            .config
            .password
            .clone()
            .unwrap_or_else(|| SecretString::from(String::new()));
        self.client
            .login(username, &password)
            .await
            .context("Login failed")
    }

    fn mailbox(&self, given: Option<String>) -> Result<String> {
        given
            .or_else(|| self.config.default_mailbox.clone())
            .context("No mailbox given and no default_mailbox in the config file")
    }

    fn resolver(&self) -> FeedResolver {
        let local = Arc::new(
            LocalDiscovery::new(self.http.clone()).with_timeout(self.config.request_timeout()),
        );
        let search = Arc::new(HttpKeywordSearch::new(
            self.http.clone(),
            self.config.keyword_search_url.clone(),
        ));

        if self.config.local_discovery {
            FeedResolver::new(local.clone(), local.clone(), local, search)
        } else {
            let server = Arc::new(self.client.clone());
            FeedResolver::new(local, server.clone(), server, search)
        }
    }
}

fn table_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.parse().ok())
        .unwrap_or(DEFAULT_TABLE_WIDTH)
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries command output only
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_path().context("HOME environment variable not set")?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .with_env_password();

    let app = App::new(config, &args)?;

    match args.command {
        Command::Search {
            query,
            subscribe,
            all,
        } => {
            let filter = if all {
                ImportFilter::All
            } else {
                ImportFilter::FoundOnly
            };
            search(&app, &query.join(" "), subscribe, filter).await
        }
        Command::Interactive => interactive(&app).await,
        Command::Slug { title } => {
            let slug = title_to_slug(&title.join(" "));
            validate_slug(&slug)?;
            println!("{slug}");
            Ok(())
        }
        Command::Mailbox { action } => manage_mailbox(&app, action).await,
        Command::Subs { mailbox, action } => {
            let mailbox = app.mailbox(mailbox)?;
            manage_subscriptions(&app, &mailbox, action).await
        }
        Command::Opml { file, subscribe } => opml(&app, &file, subscribe).await,
    }
}

async fn search(
    app: &App,
    query: &str,
    subscribe: Option<String>,
    filter: ImportFilter,
) -> Result<()> {
    let resolver = app.resolver();
    let session = SearchSession::new();

    let found = resolver
        .resolve_until(&session, query, tokio::signal::ctrl_c(), |state| {
            eprintln!("... {state}");
        })
        .await;
    let Some(candidates) = found else {
        eprintln!("Cancelled.");
        return Ok(());
    };

    let mut table = ImportList::from_candidates(&candidates);
    print!("{}", table.render(table_width()));

    if let Some(mailbox) = subscribe {
        app.authenticate().await?;
        let summary = table.import_into(&app.client, &mailbox, filter).await;
        print!("{}", table.render(table_width()));
        println!(
            "Imported {}, failed {}, skipped {}.",
            summary.imported, summary.failed, summary.skipped
        );
    }
    Ok(())
}

async fn interactive(app: &App) -> Result<()> {
    let resolver = app.resolver();
    let session = SearchSession::new();
    let (tx, mut rx) = mpsc::channel::<Tagged>(8);
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    eprintln!("Enter a URL or search terms (\"cancel\", \"quit\").");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "quit" | "exit" => break,
                    "cancel" => {
                        session.cancel();
                        eprintln!("Cancelled.");
                    }
                    query => {
                        let token = session.begin();
                        let resolver = resolver.clone();
                        let session = session.clone();
                        let tx = tx.clone();
                        let query = query.to_owned();
                        tokio::spawn(async move {
                            let tagged = resolver.resolve_with(&session, token, &query).await;
                            // Receiver gone means we are shutting down.
                            let _ = tx.send(tagged).await;
                        });
                    }
                }
            }
            Some(tagged) = rx.recv() => {
                if let Some(candidates) = session.deliver(tagged) {
                    print!("{}", ImportList::from_candidates(&candidates).render(table_width()));
                }
            }
        }
    }
    Ok(())
}

async fn manage_mailbox(app: &App, action: MailboxAction) -> Result<()> {
    match action {
        MailboxAction::Create { title, slug } => {
            let slug = slug.unwrap_or_else(|| title_to_slug(&title));
            app.authenticate().await?;
            app.client.create_mailbox_checked(&slug, &title).await?;
            println!("Created mailbox /{slug}");
        }
        MailboxAction::Delete { slug } => {
            app.authenticate().await?;
            app.client.delete_mailbox(&slug).await?;
            println!("Deleted mailbox /{slug}");
        }
        MailboxAction::Check { slug } => {
            validate_slug(&slug)?;
            if app.client.slug_available(&slug).await? {
                println!("/{slug} is available");
            } else {
                println!("/{slug} is reserved or already in use");
            }
        }
    }
    Ok(())
}

async fn manage_subscriptions(app: &App, mailbox: &str, action: SubsAction) -> Result<()> {
    app.authenticate().await?;
    let client = &app.client;

    match action {
        SubsAction::List => {
            let subs = client.list_subscriptions(mailbox).await?;
            if subs.is_empty() {
                println!("/{mailbox} has no subscriptions.");
            }
            for sub in subs {
                println!("{:<12} {:<40} {}", sub.slug, sub.title, sub.url);
            }
        }
        SubsAction::Add { url, title } => {
            let title = title.unwrap_or_else(|| url.clone());
            let sub = NewSubscription::feed(title, url);
            let slug = client.add_subscription(mailbox, &sub).await?;
            match slug {
                Some(slug) => println!("Subscribed /{mailbox} to {} ({slug})", sub.url),
                None => println!("Subscribed /{mailbox} to {}", sub.url),
            }
        }
        SubsAction::Rename { sub, title } => {
            let stored = client.update_subscription(mailbox, &sub, &title).await?;
            println!("Renamed {sub} to \"{stored}\"");
        }
        SubsAction::Remove { sub } => {
            client.delete_subscription(mailbox, &sub).await?;
            println!("Removed {sub} from /{mailbox}");
        }
        SubsAction::Import { file, replace } => {
            let content = read_opml_file(&file)?;
            let report = if replace {
                client.replace_opml(mailbox, content).await?
            } else {
                client.import_opml(mailbox, content).await?
            };
            println!(
                "Imported {}, deleted {}, errors {}.",
                report.imported, report.deleted, report.errors
            );
        }
        SubsAction::Export { output } => {
            let opml = client.export_opml(mailbox).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, opml)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{opml}"),
            }
        }
    }
    Ok(())
}

async fn opml(app: &App, file: &Path, subscribe: Option<String>) -> Result<()> {
    let path = checked_opml_path(file)?;
    let feeds = feed::parse(&path)
        .await
        .with_context(|| format!("Failed to parse OPML file {}", path.display()))?;
    if feeds.is_empty() {
        eprintln!("Warning: No valid feeds found in OPML file");
    }

    let mut table = ImportList::from_opml(feeds);
    print!("{}", table.render(table_width()));

    if let Some(mailbox) = subscribe {
        app.authenticate().await?;
        let summary = table
            .import_into(&app.client, &mailbox, ImportFilter::FoundOnly)
            .await;
        println!(
            "Imported {}, failed {}, skipped {}.",
            summary.imported, summary.failed, summary.skipped
        );
    }
    Ok(())
}

/// SEC-008: Canonicalize to resolve symlinks and require a regular file.
fn checked_opml_path(file: &Path) -> Result<PathBuf> {
    let canonical = file
        .canonicalize()
        .with_context(|| format!("Failed to resolve OPML file: {}", file.display()))?;
    let metadata = std::fs::metadata(&canonical)?;
    if !metadata.is_file() {
        anyhow::bail!("OPML path must be a regular file");
    }
    Ok(canonical)
}

fn read_opml_file(file: &Path) -> Result<String> {
    let path = checked_opml_path(file)?;
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read OPML file: {}", path.display()))?;
    if !content.contains("<opml") && !content.contains("<outline") {
        anyhow::bail!("File does not appear to be valid OPML");
    }
    Ok(content)
}
