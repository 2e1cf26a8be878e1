//! `state`: query the meeting application and print the reply.

use teamslink_core::{ClientEvent, Snapshot};

use crate::cli::GlobalOpts;
use crate::config::Mode;
use crate::error::CliError;
use crate::output;

use super::Session;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let mut session = Session::open(global, Mode::OneShot).await?;

    let result = query(&mut session).await;
    session.close().await;
    let snapshot = result?;

    let color = output::should_color(global.color);
    let out = output::render_single(global.output, &snapshot, |s| {
        output::snapshot_table(s, color)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn query(session: &mut Session) -> Result<Snapshot, CliError> {
    // Teams may push an update right after the handshake; any update
    // received after the query is current enough.
    session.client.refresh().await?;
    session
        .wait_for_event("meeting update", |event| match event {
            ClientEvent::MeetingUpdated(snapshot) => Some(snapshot),
            _ => None,
        })
        .await
}
