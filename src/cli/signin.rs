use anyhow::{Result, bail};

use super::{CliFlags, bootstrap, build_notifier};
use crate::core::signin::job::SignInJob;
use crate::core::signin::SklandClient;
use crate::core::terminal;

/// Signs every configured account in once, right now.
pub async fn run_signin(flags: CliFlags) -> Result<()> {
    let config = bootstrap(&flags)?;

    if config.accounts.is_empty() {
        terminal::print_warn("No accounts configured");
        return Ok(());
    }

    let notifier = build_notifier(config.mail.as_ref()).await;
    if !notifier.is_enabled() {
        terminal::print_info("Failure notices will not be mailed");
    }
    let client = SklandClient::new(config.skland.clone())?;

    let mut failed = Vec::new();
    for account in &config.accounts {
        if let Err(e) = account.validate() {
            terminal::print_error(&e.to_string());
            failed.push(account.phone.clone());
            continue;
        }

        let job = SignInJob::new(client.clone(), account.clone(), notifier.clone());
        match job.execute().await {
            Ok(awards) => {
                let listed: Vec<String> = awards.iter().map(ToString::to_string).collect();
                terminal::print_success(&format!("[{}] signed in", account.phone));
                terminal::print_status("Awards", &listed.join(", "));
            }
            Err(e) => {
                terminal::print_error(&e.to_string());
                failed.push(account.phone.clone());
            }
        }
    }

    if !failed.is_empty() {
        bail!(
            "Daily sign-in failed for {} of {} account(s): {}",
            failed.len(),
            config.accounts.len(),
            failed.join(", ")
        );
    }
    Ok(())
}
