//! dirauth command-line management tool.
//!
//! Provides subcommands for generating and validating configuration files,
//! testing directory connectivity step by step, running a full login through
//! the resolver, managing local fallback accounts, and viewing the
//! authentication audit log.

mod accounts;
mod ldap_test;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use dialoguer::Password;
use tracing_subscriber::EnvFilter;

use dirauth_core::auth::{DirectoryConnector, LdapDirectory, LocalAccountStore, LocalAuthenticator};
use dirauth_core::config::AppConfig;
use dirauth_core::db::Database;
use dirauth_core::AuthResolver;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// dirauth command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "dirauth",
    version,
    about = "Manage and test a dirauth directory authentication service"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "/etc/dirauth/config.toml")]
    config: PathBuf,

    /// Show debug logging from the resolver and directory client.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an example configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./dirauth.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Walk through connect, bind, search, and user bind against the directory.
    TestLdap {
        username: String,
        /// Password for the user bind; prompted when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Authenticate through the full resolver, including local fallback.
    Login {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// Manage local fallback accounts.
    Accounts {
        #[command(subcommand)]
        action: accounts::AccountsAction,
    },

    /// Show recent authentication attempts.
    Audit {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::TestLdap { username, password } => {
            let config = load_config(&cli.config)?;
            let password = password_or_prompt(password, &username)?;
            ldap_test::run(&config.directory, &username, &password).await
        }
        Commands::Login { username, password } => {
            let config = load_config(&cli.config)?;
            let password = password_or_prompt(password, &username)?;
            cmd_login(&config, &username, &password).await
        }
        Commands::Accounts { action } => {
            let config = load_config(&cli.config)?;
            let store = LocalAccountStore::new(open_database(&config)?);
            accounts::run(&store, action)
        }
        Commands::Audit { limit } => {
            let config = load_config(&cli.config)?;
            let db = open_database(&config)?;
            cmd_audit(&db, limit)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn open_database(config: &AppConfig) -> Result<Arc<Database>> {
    let db_path = config.server.database_path();
    let db = Database::open_initialized(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    Ok(Arc::new(db))
}

fn password_or_prompt(password: Option<String>, username: &str) -> Result<String> {
    match password {
        Some(password) => Ok(password),
        None => Password::new()
            .with_prompt(format!("Password for {username}"))
            .interact()
            .context("failed to read password"),
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

const EXAMPLE_CONFIG: &str = r#"# dirauth configuration
#
# Secrets are never written here. Fields ending in _env name an environment
# variable that holds the value.

[server]
listen = "127.0.0.1:3000"
log_level = "info"
data_dir = "/var/lib/dirauth"

[directory]
enabled = true
url = "ldap://ldap.example.com:389"
start_tls = true
skip_tls_verify = false
bind_dn = "cn=dirauth,ou=services,dc=example,dc=com"
bind_password_env = "DIRAUTH_BIND_PASSWORD"
search_base = "ou=people,dc=example,dc=com"
# Active Directory: "(sAMAccountName={{username}})"
search_filter = "(uid={{username}})"
# Permit local accounts when the directory is unreachable or the user is unknown.
allow_local_auth = false

[directory.attributes]
username = "uid"
full_name = "cn"
email = "mail"
groups = "memberOf"

[directory.options]
timeout_ms = 5000
connect_timeout_ms = 10000
reconnect = true

[directory.role_mapping]
enabled = false
# "deny" rejects users matching no rule; "none" lets them in with role none.
no_match = "deny"
# For directories without memberOf, search for groups instead:
# group_search_base = "ou=groups,dc=example,dc=com"
# group_search_filter = "(|(member={{dn}})(uniqueMember={{dn}}))"

# Evaluated in order; the first match wins.
[[directory.role_mapping.rules]]
group = "cn=dirauth-admins,ou=groups,dc=example,dc=com"
role = "admin"

[[directory.role_mapping.rules]]
group = "cn=staff,ou=groups,dc=example,dc=com"
role = "user"
"#;

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, EXAMPLE_CONFIG).context("failed to write config file")?;

    println!("{}", style::success(&format!("Example configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Edit the directory section for your server");
    println!("  2. export DIRAUTH_BIND_PASSWORD=...");
    println!("  3. Validate with: dirauth validate --config {}", output.display());
    println!("  4. Test with: dirauth test-ldap <username> --config {}", output.display());
    println!("  5. Start the service: dirauthd --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  {}", style::success("Environment variable references processed"));

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&format!("Validation error: {e}")));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All required fields are valid"));

    let d = &config.directory;
    println!();
    println!("{}", style::header("Configuration summary"));
    println!("  Directory      : {}", if d.enabled { "enabled" } else { "disabled" });
    println!("  URL            : {}", d.url);
    println!("  STARTTLS       : {}", d.start_tls);
    println!("  Bind DN        : {}", d.bind_dn);
    println!(
        "  Bind password  : {}",
        if d.bind_password.is_some() { "set" } else { "NOT SET" }
    );
    println!("  Search base    : {}", d.search_base);
    println!("  Search filter  : {}", d.search_filter);
    println!(
        "  Role mapping   : {}",
        if d.role_mapping.enabled {
            format!("{} rule(s), no match = {:?}", d.role_mapping.rules.len(), d.role_mapping.no_match)
        } else {
            "disabled".to_string()
        }
    );
    println!("  Local fallback : {}", d.allow_local_auth);
    println!("  Web listen     : {}", config.server.listen);
    println!("  Data directory : {}", config.server.data_dir.display());
    println!();
    println!("Configuration is valid.");

    Ok(())
}

async fn cmd_login(config: &AppConfig, username: &str, password: &str) -> Result<()> {
    let local: Option<Arc<dyn LocalAuthenticator>> = if config.directory.allow_local_auth {
        Some(Arc::new(LocalAccountStore::new(open_database(config)?)))
    } else {
        None
    };
    let connector: Arc<dyn DirectoryConnector> = Arc::new(LdapDirectory::new(&config.directory));
    let resolver = AuthResolver::new(config.directory.clone(), connector, local);

    match resolver.authenticate(username, password).await {
        Ok(identity) => {
            println!("{}", style::success("Authenticated"));
            println!("  Username  : {}", identity.username);
            println!("  Full name : {}", identity.full_name);
            println!("  Email     : {}", identity.email);
            println!("  Role      : {}", identity.role);
            println!("  Source    : {}", identity.source);
            if let Some(dn) = &identity.dn {
                println!("  DN        : {}", dn);
            }
            Ok(())
        }
        Err(e) => {
            println!("{}", style::error(&format!("{} ({})", e, e.kind())));
            anyhow::bail!("authentication failed")
        }
    }
}

fn cmd_audit(db: &Database, limit: u32) -> Result<()> {
    let entries = db
        .list_auth_events(limit)
        .context("failed to list audit entries")?;

    if entries.is_empty() {
        println!("No authentication attempts recorded.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Timestamp", "Action", "User", "Result", "Source / Error", "Details"]);

    for entry in &entries {
        let outcome = if entry.success { "ok" } else { "failed" };
        let source = if entry.success {
            entry.source.as_deref().unwrap_or("-")
        } else {
            entry.error_kind.as_deref().unwrap_or("-")
        };
        table.add_row(vec![
            Cell::new(&entry.created_at[..19.min(entry.created_at.len())]),
            Cell::new(&entry.action),
            Cell::new(&entry.username),
            Cell::new(outcome),
            Cell::new(source),
            Cell::new(truncate(entry.details.as_deref().unwrap_or(""), 50)),
        ]);
    }

    println!("{}", table);
    println!("{} entries shown", entries.len());

    Ok(())
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config = AppConfig::from_toml_str(EXAMPLE_CONFIG).unwrap();
        assert!(config.directory.enabled);
        assert_eq!(config.directory.bind_password_env.as_deref(), Some("DIRAUTH_BIND_PASSWORD"));
        assert!(config.directory.bind_password.is_none());
        assert_eq!(config.directory.role_mapping.rules.len(), 2);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirauth.toml");
        cmd_init(&path).unwrap();
        assert!(path.exists());
        assert!(cmd_init(&path).is_err());
    }

    #[test]
    fn test_validate_reports_missing_env_var() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirauth.toml");
        let contents = EXAMPLE_CONFIG.replace("DIRAUTH_BIND_PASSWORD", "DIRAUTH_CLI_TEST_UNSET_PW");
        std::fs::write(&path, contents).unwrap();
        assert!(cmd_validate(&path).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer string", 10), "a much ...");
    }
}
