//! Local account management.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use dialoguer::Password;

use dirauth_core::auth::LocalAccountStore;
use dirauth_core::models::NewLocalAccount;
use dirauth_core::Role;

use crate::style;

#[derive(Subcommand, Debug)]
pub enum AccountsAction {
    /// Create a local account.
    Add {
        username: String,
        /// superuser, admin, user, or none.
        #[arg(long, default_value = "user")]
        role: Role,
        #[arg(long, default_value = "")]
        full_name: String,
        #[arg(long, default_value = "")]
        email: String,
    },
    /// Set a new password.
    Passwd { username: String },
    /// Change the role of an account.
    Role { username: String, role: Role },
    /// Allow the account to log in.
    Enable { username: String },
    /// Block the account from logging in.
    Disable { username: String },
    /// Delete an account.
    Remove { username: String },
    /// List all local accounts.
    List,
}

fn prompt_new_password(username: &str) -> Result<String> {
    let password = Password::new()
        .with_prompt(format!("New password for {username}"))
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .context("failed to read password")?;
    if password.is_empty() {
        bail!("password must not be empty");
    }
    Ok(password)
}

pub fn run(store: &LocalAccountStore, action: AccountsAction) -> Result<()> {
    match action {
        AccountsAction::Add {
            username,
            role,
            full_name,
            email,
        } => {
            let password = prompt_new_password(&username)?;
            store
                .create(NewLocalAccount {
                    username: &username,
                    password: &password,
                    role,
                    full_name: &full_name,
                    email: &email,
                })
                .with_context(|| format!("failed to create account '{username}'"))?;
            println!("{}", style::success(&format!("Created {username} with role {role}")));
        }
        AccountsAction::Passwd { username } => {
            if store.database().get_local_account(&username)?.is_none() {
                bail!("no local account named '{username}'");
            }
            let password = prompt_new_password(&username)?;
            store
                .set_password(&username, &password)
                .context("failed to update password")?;
            println!("{}", style::success(&format!("Password updated for {username}")));
        }
        AccountsAction::Role { username, role } => {
            store.set_role(&username, role).context("failed to change role")?;
            println!("{}", style::success(&format!("{username} now has role {role}")));
        }
        AccountsAction::Enable { username } => {
            store.set_enabled(&username, true).context("failed to enable account")?;
            println!("{}", style::success(&format!("{username} enabled")));
        }
        AccountsAction::Disable { username } => {
            store.set_enabled(&username, false).context("failed to disable account")?;
            println!("{}", style::success(&format!("{username} disabled")));
        }
        AccountsAction::Remove { username } => {
            store.remove(&username).context("failed to remove account")?;
            println!("{}", style::success(&format!("{username} removed")));
        }
        AccountsAction::List => list(store)?,
    }
    Ok(())
}

fn list(store: &LocalAccountStore) -> Result<()> {
    let accounts = store.list().context("failed to list accounts")?;
    if accounts.is_empty() {
        println!("{}", style::warn("No local accounts"));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Username", "Role", "Full name", "Email", "Status", "Updated"]);

    for account in &accounts {
        table.add_row(vec![
            Cell::new(&account.username),
            Cell::new(account.role),
            Cell::new(&account.full_name),
            Cell::new(&account.email),
            Cell::new(style::enabled(account.enabled)),
            Cell::new(&account.updated_at[..10.min(account.updated_at.len())]),
        ]);
    }

    println!("{}", table);
    println!("{} account(s)", accounts.len());
    Ok(())
}
