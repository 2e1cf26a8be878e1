//! One-shot meeting actions: send, wait for the acknowledgement, exit.

use teamslink_core::{Action, ClientEvent, Modifier, Reaction, SUCCESS_RESPONSE, UiPanel};

use crate::cli::{Command, GlobalOpts};
use crate::config::Mode;
use crate::error::CliError;

use super::Session;

/// The wire action and modifier behind an action subcommand.
fn wire_action(cmd: &Command) -> Option<(Action, Option<Modifier>)> {
    let pair = match cmd {
        Command::Mute => (Action::ToggleMute, None),
        Command::Video => (Action::ToggleVideo, None),
        Command::Blur => (Action::ToggleBackgroundBlur, None),
        Command::Hand => (Action::ToggleHand, None),
        Command::Chat => (Action::ToggleUi, Some(UiPanel::Chat.into())),
        Command::ShareTray => (Action::ToggleUi, Some(UiPanel::ShareTray.into())),
        Command::StopSharing => (Action::StopSharing, None),
        Command::Leave => (Action::LeaveCall, None),
        Command::React(args) => (Action::SendReaction, Some(args.reaction.into())),
        Command::State
        | Command::Watch
        | Command::Pair(_)
        | Command::Config(_)
        | Command::Completions(_) => return None,
    };
    Some(pair)
}

fn describe(action: Action, modifier: Option<Modifier>) -> String {
    match modifier {
        Some(m) => format!("{action} ({m})"),
        None => action.to_string(),
    }
}

pub async fn handle(cmd: &Command, global: &GlobalOpts) -> Result<(), CliError> {
    let Some((action, modifier)) = wire_action(cmd) else {
        return Ok(());
    };
    let label = describe(action, modifier);

    let mut session = Session::open(global, Mode::OneShot).await?;
    let result = send_and_confirm(&mut session, action, modifier, &label).await;
    session.close().await;
    result?;

    if !global.quiet {
        eprintln!("{label}: ok");
    }
    Ok(())
}

async fn send_and_confirm(
    session: &mut Session,
    action: Action,
    modifier: Option<Modifier>,
    label: &str,
) -> Result<(), CliError> {
    let request_id = session.client.send(action, modifier).await?;
    tracing::debug!(request_id, %label, "sent");

    let response = session
        .wait_for_event("acknowledgement", |event| match event {
            ClientEvent::Acknowledged {
                request_id: Some(id),
                response,
            } if id == request_id => Some(response),
            _ => None,
        })
        .await?;

    if response == SUCCESS_RESPONSE {
        Ok(())
    } else {
        Err(CliError::Rejected {
            action: label.to_owned(),
            response,
        })
    }
}
