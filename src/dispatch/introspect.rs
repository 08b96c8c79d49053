//! Debug table of the engine's current parameter state.

use super::engine::ChannelView;
use std::fmt::Write;

const COLUMNS: usize = 2;

fn policy_tag(view: &ChannelView<'_>) -> &'static str {
    if view.toggle {
        "TGL"
    } else {
        view.config.policy.tag()
    }
}

fn cell(view: &ChannelView<'_>) -> String {
    let hold = match view.config.hold_duration() {
        Some(_) => format!("Hold: {}s", view.config.hold),
        None => String::new(),
    };
    format!(
        "{:<23}\t{:<6}\t{:<10}\t{}\t",
        view.config.parameter,
        view.last.to_string(),
        hold,
        policy_tag(view)
    )
}

/// Renders `views` as a table with two parameters per row.
pub fn render_table(views: &[ChannelView<'_>]) -> String {
    let mut table = String::new();
    for row in views.chunks(COLUMNS) {
        for view in row {
            table.push_str(&cell(view));
        }
        let _ = writeln!(table);
    }
    table
}
