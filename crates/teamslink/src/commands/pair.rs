//! `pair`: wait for Teams to issue a pairing token and keep it.

use std::time::Duration;

use teamslink_core::ClientEvent;

use crate::cli::{GlobalOpts, PairArgs};
use crate::config::Mode;
use crate::error::CliError;

use super::Session;

pub async fn handle(args: &PairArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.forget {
        teamslink_config::forget_token()?;
        if !global.quiet {
            eprintln!("Pairing token removed from the keyring");
        }
        return Ok(());
    }

    let mut session = Session::open(global, Mode::LongLived).await?;
    session.timeout = Duration::from_secs(args.wait);

    if !global.quiet {
        eprintln!(
            "Waiting up to {}s for pairing. Join a meeting and choose Allow when Teams asks.",
            args.wait
        );
    }

    let result = wait_for_token(&mut session, args.wait).await;
    session.close().await;
    let token = result?;

    if args.print {
        println!("{token}");
        return Ok(());
    }

    teamslink_config::store_token(&token)?;
    if !global.quiet {
        eprintln!("Paired. Token stored in the system keyring.");
    }
    if global.token.as_ref().is_some_and(|t| t != &token) {
        tracing::info!("--token / TEAMSLINK_TOKEN still overrides the stored token");
    }
    Ok(())
}

async fn wait_for_token(session: &mut Session, wait: u64) -> Result<String, CliError> {
    // Teams shows the pairing prompt in response to an action.
    session.client.refresh().await?;
    session
        .wait_for_event("pairing token", |event| {
            matches!(event, ClientEvent::TokenRefreshed).then_some(())
        })
        .await
        .map_err(|err| match err {
            CliError::Timeout { seconds, .. } => CliError::NotPaired { seconds },
            other => other,
        })?;
    session
        .client
        .token()
        .ok_or(CliError::NotPaired { seconds: wait })
}
