//! Sign-in commands.

use std::time::Duration;

use officecal_graph::{AuthStatus, Authenticator, DeviceCodeHandle};
use tracing::{info, warn};

use crate::error::CliResult;

/// Runs the device-code sign-in and waits for it to finish.
pub async fn login(
    auth: &Authenticator,
    timeout: Duration,
    open_browser: bool,
    force: bool,
) -> CliResult<()> {
    if !force && let AuthStatus::Valid { account, .. } = auth.status()? {
        println!(
            "Already signed in as {}.",
            account.as_deref().unwrap_or("an unknown account")
        );
        println!("Use --force to sign in again.");
        return Ok(());
    }

    let handle = auth.begin_device_code_flow().await?;
    wait_for_sign_in(auth, &handle, timeout, open_browser).await
}

/// Shows the sign-in instructions for `handle` and waits for the user.
pub async fn wait_for_sign_in(
    auth: &Authenticator,
    handle: &DeviceCodeHandle,
    timeout: Duration,
    open_browser: bool,
) -> CliResult<()> {
    eprintln!("{}", handle.message);
    eprintln!();
    if open_browser && let Err(e) = open::that(&handle.verification_uri) {
        warn!(error = %e, "could not open browser");
    }
    eprintln!("Waiting for sign-in to complete...");

    let record = auth.complete_device_code_flow(handle, timeout).await?;
    info!("device-code sign-in complete");
    eprintln!(
        "Signed in as {}.",
        record.account.as_deref().unwrap_or("an unknown account")
    );
    Ok(())
}

/// Prints the cached sign-in state.
pub fn status(auth: &Authenticator) -> CliResult<()> {
    match auth.status()? {
        AuthStatus::Unauthenticated => {
            println!("Not signed in. Run: officecal auth login");
        }
        AuthStatus::Valid {
            account,
            expires_at,
        } => {
            println!(
                "Signed in as {}.",
                account.as_deref().unwrap_or("an unknown account")
            );
            println!("Access token valid until {}.", expires_at.to_rfc3339());
        }
        AuthStatus::Stale { account } => {
            println!(
                "Signed in as {}; the access token will be refreshed on next use.",
                account.as_deref().unwrap_or("an unknown account")
            );
        }
    }
    println!("Credential file: {}", auth.store().path().display());
    Ok(())
}

/// Removes the cached credential.
pub fn logout(auth: &Authenticator) -> CliResult<()> {
    if auth.sign_out()? {
        println!("Signed out.");
    } else {
        println!("No cached credential to remove.");
    }
    Ok(())
}
