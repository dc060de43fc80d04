// ABOUTME: Turns stored questionnaire answers into prompt text
// ABOUTME: One "Question/Answer" block per answered question, in answer order

use marketwise_questionnaire::{Answer, Catalog, StoredAnswer};

/// Format answers as `Question: …\nAnswer: …` blocks separated by blank lines.
///
/// Several rows for one question (multi-select) are joined into one answer.
/// Answers to questions missing from the catalog are skipped.
pub fn format_responses(catalog: &Catalog, answers: &[StoredAnswer]) -> String {
    let mut ordered: Vec<&StoredAnswer> = answers.iter().collect();
    ordered.sort_by_key(|a| a.created_at);

    let mut blocks: Vec<(&str, &str, Vec<String>)> = Vec::new();

    for stored in ordered {
        let Some(question) = catalog.find_question(&stored.question_id) else {
            continue;
        };

        let text = match &stored.answer {
            Answer::SelectedOption { option_id, text } => {
                let label = question
                    .option(option_id)
                    .map(|o| o.label().to_string())
                    .unwrap_or_else(|| option_id.clone());
                match text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                    Some(text) => format!("{} ({})", label, text),
                    None => label,
                }
            }
            Answer::FreeText { text } => text.trim().to_string(),
        };

        match blocks.iter_mut().find(|(id, _, _)| *id == question.id) {
            Some((_, _, parts)) => parts.push(text),
            None => blocks.push((question.id.as_str(), question.prompt(), vec![text])),
        }
    }

    blocks
        .into_iter()
        .map(|(_, prompt, parts)| format!("Question: {}\nAnswer: {}", prompt, parts.join(", ")))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split generated posts on `---`, dropping blank pieces
pub fn split_posts(text: &str) -> Vec<String> {
    text.split("---")
        .map(str::trim)
        .filter(|post| !post.is_empty())
        .map(str::to_string)
        .collect()
}
