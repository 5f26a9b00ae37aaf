use cascade_core::{Analysis, Checkpoint};

/// Longest proposed-content preview shown in a checkpoint, in characters.
pub const PREVIEW_CHARS: usize = 1500;

/// Render the reviewer-facing message for a pending analysis.
pub fn render_checkpoint(analysis: &Analysis) -> Checkpoint {
    let level = analysis.level.as_str().to_uppercase();
    let preview = preview(&analysis.proposed_content);

    let message = [
        format!("*Reverse Cascade: {level} level*"),
        String::new(),
        format!("*Impact:* {}", analysis.impact_summary),
        String::new(),
        "*Proposed changes:*".to_string(),
        "```".to_string(),
        preview,
        "```".to_string(),
        String::new(),
        "Reply with:".to_string(),
        "• *approve*: accept and continue cascading up".to_string(),
        "• *reject*: discard all changes and stop".to_string(),
        "• *stop*: accept this level but don't cascade further".to_string(),
        "• *modify* with feedback: revise the proposal".to_string(),
    ]
    .join("\n");

    Checkpoint {
        level: analysis.level,
        message,
    }
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}\n...", &content[..cut]),
        None => content.to_string(),
    }
}
