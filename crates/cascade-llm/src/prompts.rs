use cascade_core::{Document, FileChange, Level};
use std::collections::BTreeMap;

pub const CLASSIFY_SYSTEM: &str = "You are Cascade's change-level detector. Given a user's \
reprioritization request and their current planning files, determine which level the change \
originates at.

Cascade levels (lowest to highest): day, week, month, quarter, year

Rules:
- If the change is about today's tasks, answer \"day\"
- If the change is about this week's plan, answer \"week\"
- If the change affects monthly targets, answer \"month\"
- If the change affects quarterly milestones, answer \"quarter\"
- If the change affects yearly goals, answer \"year\"
- When in doubt, pick the LOWEST level that fully captures the change. Changes propagate up automatically.

Respond with ONLY a JSON object: { \"level\": \"week\", \"reasoning\": \"...\" }";

pub const ANALYZE_SYSTEM: &str = "You are Cascade's impact analyzer. Given a change at a lower \
level and a file at the current level, determine what changes are needed at this level to stay \
aligned.

Cascade methodology:
- Gravity: plans cascade down (year, quarter, month, week, day). Reality flows up. When lower-level priorities change, higher levels must adapt.
- Core/Flex: Core hours are the floor; the plan must succeed on Core alone. Flex is acceleration. Never overcommit Core.
- Checkpoints: every change requires human approval. Present changes clearly.

Rules:
- Preserve the file's overall structure and formatting
- Only change what's necessary to align with the lower-level changes
- If no changes are needed at this level, say so and return the file unchanged
- proposedContent is the FULL updated file, never a diff

Respond with a JSON object:
{
  \"impactSummary\": \"Brief description of what changes and why\",
  \"proposedContent\": \"The full updated file content\",
  \"requiresPropagation\": true,
  \"reasoning\": \"Why the level above does or doesn't need to change\"
}";

pub fn build_classify_prompt(request_text: &str, documents: &BTreeMap<Level, Document>) -> String {
    let files = documents
        .iter()
        .map(|(level, doc)| format!("## {level}\n```\n{}\n```", doc.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("User's request: \"{request_text}\"\n\nCurrent cascade files:\n{files}")
}

pub fn build_analyze_prompt(
    request_text: &str,
    level: Level,
    content: &str,
    prior_changes: &[FileChange],
    feedback: Option<&str>,
) -> String {
    let changes_below = if prior_changes.is_empty() {
        "No changes applied at lower levels yet.".to_string()
    } else {
        prior_changes
            .iter()
            .map(|c| {
                format!(
                    "### {} (approved)\nSummary: {}\n```\n{}\n```",
                    c.level, c.summary, c.new_content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let mut prompt = format!(
        "User's original request: \"{request_text}\"\n\n\
         Changes already applied at lower levels:\n{changes_below}\n\n\
         Current file at **{level}** level:\n```\n{content}\n```\n\n"
    );

    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "The reviewer asked for a revised proposal with this feedback:\n\"{feedback}\"\n\n"
        ));
    }

    prompt.push_str(&format!(
        "Analyze what changes (if any) are needed at the {level} level to stay aligned with the changes below."
    ));
    prompt
}
