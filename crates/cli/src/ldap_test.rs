//! Step-by-step directory connectivity check.
//!
//! Walks through the same stages as the resolver (connect, service bind,
//! user search, group lookup, user bind) and prints what it sees at each
//! one, so an operator can tell exactly where a directory setup goes wrong.

use std::time::Duration;

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};

use dirauth_core::auth::filter::build_user_filter;
use dirauth_core::auth::roles::{RoleDecision, RoleMapper};
use dirauth_core::auth::{
    collect_groups, DirectoryConnector, DirectoryEntry, DirectorySession, LdapDirectory,
};
use dirauth_core::config::DirectoryConfig;

use crate::style;

fn spinner(msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        spinner.set_style(
            template.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(msg.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Run the directory check for `username`.
pub async fn run(config: &DirectoryConfig, username: &str, password: &str) -> Result<()> {
    if !config.enabled {
        println!("{}", style::error("Directory authentication is disabled in the configuration"));
        bail!("set directory.enabled = true to test the directory");
    }

    println!();
    println!("{}", style::header("Directory connection test"));
    println!("  Server      : {}", config.url);
    println!("  Search base : {}", config.search_base);
    println!("  Username    : {}", username);
    println!("{}", style::dim("---"));

    println!("{}", style::step(1, "Connecting"));
    let directory = LdapDirectory::new(config);
    let progress = spinner(&format!("connecting to {}", config.url));
    let connected = directory.connect().await;
    progress.finish_and_clear();
    let mut session = match connected {
        Ok(session) => session,
        Err(e) => {
            println!("  {}", style::error(&format!("Connection failed: {e}")));
            bail!("could not connect to the directory");
        }
    };
    println!("  {}", style::success("Connected"));

    let result = walk_through(config, session.as_mut(), username, password).await;
    session.close().await;
    result
}

async fn walk_through(
    config: &DirectoryConfig,
    session: &mut dyn DirectorySession,
    username: &str,
    password: &str,
) -> Result<()> {
    println!("{}", style::step(2, "Binding with service account"));
    println!("  Bind DN: {}", config.bind_dn);
    let bind_password = config.bind_password.as_deref().unwrap_or_default();
    if let Err(e) = session.bind(&config.bind_dn, bind_password).await {
        println!("  {}", style::error(&format!("Service bind failed: {e}")));
        bail!("service account bind failed; check bind_dn and the password variable");
    }
    println!("  {}", style::success("Service account bind successful"));

    println!("{}", style::step(3, "Searching for user"));
    let filter = build_user_filter(&config.search_filter, username);
    println!("  Filter: {}", filter);
    let entries = session
        .search(&config.search_base, &filter, &config.attributes.requested())
        .await;
    let entry = match entries {
        Ok(mut entries) if entries.len() == 1 => entries.remove(0),
        Ok(entries) if entries.is_empty() => {
            println!("  {}", style::error("User not found"));
            bail!("no entry matched the search filter");
        }
        Ok(entries) => {
            println!(
                "  {}",
                style::error(&format!("{} entries matched; the filter must match exactly one", entries.len()))
            );
            for entry in &entries {
                println!("    {}", entry.dn);
            }
            bail!("ambiguous search filter");
        }
        Err(e) => {
            println!("  {}", style::error(&format!("Search failed: {e}")));
            bail!("user search failed");
        }
    };
    println!("  {}", style::success(&format!("User found: {}", entry.dn)));
    print_entry(config, &entry);

    println!("{}", style::step(4, "Evaluating groups and role"));
    let groups = match collect_groups(session, config, &entry, username).await {
        Ok(groups) => groups,
        Err(e) => {
            println!("  {}", style::error(&format!("Group search failed: {e}")));
            bail!("group search failed with the service account");
        }
    };
    if groups.is_empty() {
        println!("  {}", style::dim("(no group memberships)"));
    }
    for group in &groups {
        println!("  - {}", group);
    }
    match RoleMapper::from_config(&config.role_mapping).decide(groups.as_slice()) {
        RoleDecision::Assigned(role) => println!("  {}", style::success(&format!("Role: {role}"))),
        RoleDecision::Denied => println!(
            "  {}",
            style::warn("No role rule matched; login would be denied")
        ),
    }

    println!("{}", style::step(5, "Testing user authentication"));
    println!("  Binding as: {}", entry.dn);
    if let Err(e) = session.bind(&entry.dn, password).await {
        println!("  {}", style::error(&format!("Authentication failed: {e}")));
        bail!("user bind failed");
    }
    println!("  {}", style::success("Authentication successful"));
    println!("{}", style::dim("---"));
    println!("{}", style::success("Directory configuration is working"));
    println!();
    Ok(())
}

fn print_entry(config: &DirectoryConfig, entry: &DirectoryEntry) {
    println!("  All returned attributes:");
    let mut names: Vec<&String> = entry.attrs.keys().collect();
    names.sort();
    for name in names {
        println!("    {}: {}", name, entry.attrs[name].join(", "));
    }

    let attrs = &config.attributes;
    let show = |label: &str, attr: &str| {
        let value = entry.first(attr).unwrap_or("");
        let value = if value.is_empty() { "N/A" } else { value };
        println!("    {label:<10}: {value}  {}", style::dim(&format!("({attr})")));
    };
    println!("  Mapped attributes:");
    show("Username", &attrs.username);
    show("Full name", &attrs.full_name);
    show("Email", &attrs.email);
}
