//! `watch`: stream meeting updates until Ctrl-C.

use teamslink_core::{ClientEvent, Snapshot};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::config::Mode;
use crate::error::CliError;
use crate::output;

use super::Session;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let mut session = Session::open(global, Mode::LongLived).await?;
    let color = output::should_color(global.color);

    let result = stream(&mut session, global, color).await;
    session.close().await;
    result
}

async fn stream(session: &mut Session, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    session.client.refresh().await?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return Ok(());
            }
            event = session.next_event() => match event? {
                ClientEvent::MeetingUpdated(snapshot) => print_update(&snapshot, global, color)?,
                ClientEvent::Disconnected { reason } => {
                    tracing::warn!(%reason, "connection lost, reconnecting");
                }
                ClientEvent::Connected => {
                    tracing::info!("reconnected");
                    session.client.refresh().await?;
                }
                ClientEvent::TokenRefreshed | ClientEvent::Acknowledged { .. } => {}
            }
        }
    }
}

fn print_update(snapshot: &Snapshot, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    // One object per line keeps the stream parseable.
    let format = match global.output {
        OutputFormat::Json => OutputFormat::JsonCompact,
        other => other,
    };
    let out = output::render_single(format, snapshot, |s| output::snapshot_line(s, color))?;
    output::print_output(&out, global.quiet);
    Ok(())
}
