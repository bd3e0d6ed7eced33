use anyhow::{Context, Result};

use calori_core::models::Registration;
use calori_core::service::Tracker;

use super::helpers::print_json;
use super::profile::print_profile;
use crate::google::GoogleVerifier;

pub(crate) async fn cmd_register(tracker: &Tracker, reg: Registration, json: bool) -> Result<()> {
    let profile = tracker.register(&reg).await?;
    if json {
        return print_json(&profile);
    }
    println!("Welcome, {}! Your account is ready.\n", profile.name());
    print_profile(&profile, tracker.today());
    Ok(())
}

pub(crate) async fn cmd_login(
    tracker: &Tracker,
    email: &str,
    password: &str,
    json: bool,
) -> Result<()> {
    let profile = tracker.login(email, password).await?;
    if json {
        return print_json(&profile);
    }
    println!("Logged in as {} <{}>", profile.name(), profile.email);
    if !profile.profile_completed {
        println!("Profile incomplete. Run `calori profile edit` to finish it.");
    }
    Ok(())
}

pub(crate) async fn cmd_login_google(
    tracker: &Tracker,
    client_id: Option<&str>,
    id_token: &str,
    json: bool,
) -> Result<()> {
    let client_id = client_id
        .context("Google sign-in needs google_client_id in the config (or CALORI_GOOGLE_CLIENT_ID)")?;
    let claims = GoogleVerifier::new()?
        .verify(id_token.trim(), client_id)
        .await
        .context("Google ID token rejected")?;
    let (profile, needs_completion) = tracker.login_with_google(&claims, id_token.trim()).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "profile": profile, "needs_completion": needs_completion })
        );
        return Ok(());
    }
    println!("Logged in as {} <{}>", profile.name(), profile.email);
    if needs_completion {
        println!("Finish your profile with `calori profile edit` before tracking.");
    }
    Ok(())
}

pub(crate) async fn cmd_logout(tracker: &mut Tracker, json: bool) -> Result<()> {
    let was_signed_in = tracker.current_user_id()?.is_some();
    tracker.logout().await?;
    if json {
        println!("{}", serde_json::json!({ "logged_out": was_signed_in }));
    } else if was_signed_in {
        println!("Logged out. Local data for this account was removed.");
    } else {
        eprintln!("Not logged in");
    }
    Ok(())
}

pub(crate) async fn cmd_whoami(tracker: &Tracker, json: bool) -> Result<()> {
    let profile = tracker.resolve_current_user().await?;
    if json {
        return print_json(&profile);
    }
    match profile {
        Some(p) => {
            let pending = tracker.pending_sync_count()?;
            println!("{} <{}>", p.name(), p.email);
            if tracker.has_remote() {
                println!("{pending} change(s) waiting to sync");
            } else {
                println!("Local-only mode (no remote configured)");
            }
        }
        None => eprintln!("Not logged in"),
    }
    Ok(())
}
