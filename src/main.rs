use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ldap_client::{
    Config, Connection, DiscreteSearchResult, ModifyDnRequest, PasswordModifyRequest, Scope,
    SearchRequest,
};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "ldap-client")]
#[command(about = "LDAPv3 client - search, delete, rename and password changes against a directory server")]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Server URL (overrides config; e.g. ldaps://ldap.example.com)
    #[arg(short, long, value_name = "URL")]
    url: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print client metrics to stderr on exit
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the authorization identity of the session
    Whoami,
    /// Search and print entries as LDIF
    Search {
        #[arg(short, long, default_value = "")]
        base: String,
        #[arg(short, long, value_enum, default_value_t = ScopeArg::Sub)]
        scope: ScopeArg,
        #[arg(short, long, default_value = "(objectClass=*)")]
        filter: String,
        /// Use simple paged results with this page size (overrides config)
        #[arg(long, value_name = "N")]
        page_size: Option<u32>,
        /// Attributes to return (all user attributes when empty)
        attributes: Vec<String>,
    },
    /// Delete an entry
    Delete { dn: String },
    /// Rename or move an entry
    Modrdn {
        dn: String,
        new_rdn: String,
        #[arg(long)]
        delete_old: bool,
        #[arg(long, value_name = "DN")]
        new_superior: Option<String>,
    },
    /// Change a password with the password modify extended operation
    Passwd {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        old: Option<String>,
        #[arg(long)]
        new: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Base,
    One,
    Sub,
}

impl From<ScopeArg> for Scope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Base => Scope::BaseObject,
            ScopeArg::One => Scope::SingleLevel,
            ScopeArg::Sub => Scope::WholeSubtree,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("ldap_client={},info", log_level))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Load configuration from {:?}", path))?,
        None => Config::default(),
    };
    if let Some(url) = args.url.clone() {
        config.url = url;
    }
    debug!(url = %config.url, "configuration loaded");

    let conn = Connection::connect(&config)
        .await
        .with_context(|| format!("Connect to {}", config.url))?;

    let outcome = run(&conn, &config, args.command).await;
    conn.close().await.context("Close connection")?;
    if args.metrics {
        eprint!("{}", conn.metrics().render());
    }
    outcome
}

async fn run(conn: &Connection, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Whoami => {
            let identity = conn.who_am_i().await.context("Who am I")?;
            if identity.is_empty() {
                println!("anonymous");
            } else {
                println!("{}", identity);
            }
        }
        Command::Search {
            base,
            scope,
            filter,
            page_size,
            attributes,
        } => {
            let request = SearchRequest::new(base, scope.into(), filter).with_attributes(attributes);
            match page_size.or(config.page_size) {
                Some(page_size) => {
                    let result = conn
                        .search_with_paging(&request, page_size)
                        .await
                        .context("Paged search")?;
                    for entry in &result.entries {
                        println!("{}", entry);
                    }
                    for url in &result.referrals {
                        println!("# refldap: {}", url);
                    }
                    info!(entries = result.entries.len(), "search complete");
                }
                None => {
                    let mut count = 0usize;
                    let mut print = |result: DiscreteSearchResult| -> ldap_client::Result<bool> {
                        match result {
                            DiscreteSearchResult::Entry(entry) => {
                                count += 1;
                                println!("{}", entry);
                            }
                            DiscreteSearchResult::Reference(urls) => {
                                for url in urls {
                                    println!("# refldap: {}", url);
                                }
                            }
                            DiscreteSearchResult::Done { .. } => {}
                        }
                        Ok(false)
                    };
                    conn.search_with_handler(&request, &mut print)
                        .await
                        .context("Search")?;
                    info!(entries = count, "search complete");
                }
            }
        }
        Command::Delete { dn } => {
            conn.delete(&dn)
                .await
                .with_context(|| format!("Delete {}", dn))?;
            info!(%dn, "deleted");
        }
        Command::Modrdn {
            dn,
            new_rdn,
            delete_old,
            new_superior,
        } => {
            let mut request = ModifyDnRequest::new(dn.clone(), new_rdn, delete_old);
            request.new_superior = new_superior;
            conn.modify_dn(&request)
                .await
                .with_context(|| format!("Rename {}", dn))?;
            info!(%dn, "renamed");
        }
        Command::Passwd { user, old, new } => {
            let request = PasswordModifyRequest::new(user, old, new);
            let result = conn
                .password_modify(&request)
                .await
                .context("Password modify")?;
            if let Some(generated) = result.generated_password {
                println!("New password: {}", generated);
            }
            info!("password changed");
        }
    }
    Ok(())
}
