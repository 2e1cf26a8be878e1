//! Output formatting: table or JSON.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use teamslink_core::Snapshot;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

fn yes_no(value: bool, color: bool) -> String {
    match (value, color) {
        (true, true) => "yes".green().to_string(),
        (false, true) => "no".dimmed().to_string(),
        (true, false) => "yes".into(),
        (false, false) => "no".into(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses `detail_fn`, which returns a pre-formatted string.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Meeting state ────────────────────────────────────────────────────

#[derive(Tabled)]
struct FlagRow {
    #[tabled(rename = "State")]
    state: &'static str,
    #[tabled(rename = "")]
    state_value: String,
    #[tabled(rename = "Permission")]
    permission: &'static str,
    #[tabled(rename = "")]
    permission_value: String,
}

/// Two-column table: meeting flags on the left, permissions on the right.
pub fn snapshot_table(snapshot: &Snapshot, color: bool) -> String {
    let s = snapshot.state();
    let p = snapshot.permissions();

    let states = [
        ("In meeting", s.is_in_meeting),
        ("Muted", s.is_muted),
        ("Video on", s.is_video_on),
        ("Hand raised", s.is_hand_raised),
        ("Blurred", s.is_background_blurred),
        ("Recording", s.is_recording_on),
        ("Sharing", s.is_sharing),
        ("Unread chat", s.has_unread_messages),
    ];
    let permissions = [
        ("Mute", p.can_toggle_mute),
        ("Video", p.can_toggle_video),
        ("Hand", p.can_toggle_hand),
        ("Blur", p.can_toggle_blur),
        ("Leave", p.can_leave),
        ("React", p.can_react),
        ("Share tray", p.can_toggle_share_tray),
        ("Chat", p.can_toggle_chat),
        ("Stop sharing", p.can_stop_sharing),
        ("Pair", p.can_pair),
    ];

    let rows: Vec<FlagRow> = (0..states.len().max(permissions.len()))
        .map(|i| {
            let (state, state_value) = states
                .get(i)
                .map_or(("", String::new()), |&(n, v)| (n, yes_no(v, color)));
            let (permission, permission_value) = permissions
                .get(i)
                .map_or(("", String::new()), |&(n, v)| (n, yes_no(v, color)));
            FlagRow {
                state,
                state_value,
                permission,
                permission_value,
            }
        })
        .collect();

    render_table(&rows)
}

/// One line per update for `watch` in table mode.
pub fn snapshot_line(snapshot: &Snapshot, color: bool) -> String {
    let s = snapshot.state();
    let flag = |name: &str, on: bool| -> String {
        match (on, color) {
            (true, true) => name.bold().to_string(),
            (true, false) => name.to_owned(),
            (false, true) => format!("!{name}").dimmed().to_string(),
            (false, false) => format!("!{name}"),
        }
    };

    [
        format!("#{}", snapshot.sequence),
        flag("meeting", s.is_in_meeting),
        flag("muted", s.is_muted),
        flag("video", s.is_video_on),
        flag("hand", s.is_hand_raised),
        flag("blur", s.is_background_blurred),
        flag("recording", s.is_recording_on),
        flag("sharing", s.is_sharing),
        flag("unread", s.has_unread_messages),
    ]
    .join(" ")
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let out = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use teamslink_core::{MeetingUpdate, StateCache};

    use super::*;

    fn muted_snapshot() -> Snapshot {
        let mut update = MeetingUpdate::default();
        update.meeting_state.is_muted = true;
        update.meeting_state.is_in_meeting = true;
        update.meeting_permissions.can_leave = true;
        StateCache::new().apply(update)
    }

    #[test]
    fn table_lists_flags_and_permissions() {
        let table = snapshot_table(&muted_snapshot(), false);
        assert!(table.contains("Muted"));
        assert!(table.contains("Stop sharing"));
        assert!(table.contains("yes"));
        assert!(!table.contains('\u{1b}'), "color leaked into plain output");
    }

    #[test]
    fn line_marks_inactive_flags() {
        let line = snapshot_line(&muted_snapshot(), false);
        assert!(line.starts_with("#1 meeting muted !video"));
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = render_single(OutputFormat::JsonCompact, &muted_snapshot(), |_| String::new())
            .unwrap();
        assert!(!out.contains('\n'));
        assert!(out.contains("\"sequence\":1"));
    }
}
