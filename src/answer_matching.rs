use anyhow::{Result, anyhow};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn option_key_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Da-d])(?:[).:\s-]|$)").expect("option key pattern is valid")
    })
}

fn option_prefix_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-d](?:[).:\s-]+|$)").expect("option prefix pattern is valid")
    })
}

/// Extract a leading option letter (A-D, case-insensitive) from an answer
/// string. The letter must be followed by a separator or the end of the
/// trimmed input, so "Berlin" does not read as option B.
pub fn extract_option_key(value: &str) -> Option<char> {
    option_key_pattern()
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().chars().next())
        .map(|c| c.to_ascii_uppercase())
}

/// Lowercase, trim, and strip a single leading "a)"/"a."-style label so
/// free-text answers compare independently of letter labeling.
pub fn normalize_option_text(value: &str) -> String {
    let text = value.trim().to_lowercase();
    option_prefix_pattern().replace(&text, "").into_owned()
}

/// Compare an option against an answer string. Letter keys dominate when
/// both sides carry one; otherwise fall back to normalized text equality.
pub fn is_correct_option(option: &str, answer: &str) -> bool {
    match (extract_option_key(option), extract_option_key(answer)) {
        (Some(option_key), Some(answer_key)) => option_key == answer_key,
        _ => normalize_option_text(option) == normalize_option_text(answer),
    }
}

/// Resolve the index of the correct option from the model's answer string.
///
/// Resolution order: letter key mapped onto the option list, then exact
/// normalized-text match, then substring match in either direction. The
/// fallbacks exist because the model may echo the answer as "B", as
/// "B) Paris", or as plain "Paris".
pub fn resolve_correct_index(options: &[String], answer: &str) -> Option<usize> {
    if options.is_empty() {
        return None;
    }

    if let Some(key) = extract_option_key(answer) {
        let index = (key as usize) - ('A' as usize);
        if index < options.len() {
            return Some(index);
        }
    }

    let normalized_answer = normalize_option_text(answer);
    if normalized_answer.is_empty() {
        return None;
    }

    if let Some(index) = options
        .iter()
        .position(|option| normalize_option_text(option) == normalized_answer)
    {
        return Some(index);
    }

    options.iter().position(|option| {
        let normalized_option = normalize_option_text(option);
        normalized_option.contains(&normalized_answer) || normalized_answer.contains(&normalized_option)
    })
}

/// Resolve the index of the option the user selected. Selected answers are
/// verbatim option text chosen in the UI, so only exact and normalized
/// matches apply; substring matching here would invite false positives.
pub fn resolve_selected_index(options: &[String], selected_answer: &str) -> Option<usize> {
    if options.is_empty() {
        return None;
    }

    if let Some(index) = options.iter().position(|option| option == selected_answer) {
        return Some(index);
    }

    let normalized_selected = normalize_option_text(selected_answer);
    options
        .iter()
        .position(|option| normalize_option_text(option) == normalized_selected)
}

/// Pull a JSON array out of model output that may be wrapped in markdown
/// fences or surrounding prose: strip fence markers, take the span from the
/// first `[` to the last `]`, and parse that substring.
pub fn extract_json_array(raw_text: &str) -> Result<Value> {
    let cleaned = raw_text.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let start = cleaned
        .find('[')
        .ok_or_else(|| anyhow!("Model did not return a JSON array"))?;
    let end = cleaned
        .rfind(']')
        .ok_or_else(|| anyhow!("Model did not return a JSON array"))?;
    if end < start {
        return Err(anyhow!("Model did not return a JSON array"));
    }

    serde_json::from_str(&cleaned[start..=end])
        .map_err(|e| anyhow!("Model returned an unparseable JSON array: {}", e))
}
