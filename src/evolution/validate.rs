use super::types::FailureReason;

/// Structural well-formedness check for a proposed rewrite.
///
/// The artifact kind is inferred from the source being rewritten: a JSON
/// source must stay parseable JSON; anything else gets a bracket/fence
/// balance smoke check. This is deliberately not a parser for the target
/// language — the pipeline commits to an inert store, and real vetting
/// happens at the separate adoption step.
pub fn validate_rewrite(source: &str, candidate: &str) -> Result<(), FailureReason> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return Err(FailureReason::EmptyResult);
    }

    if looks_like_json(source) {
        if serde_json::from_str::<serde_json::Value>(trimmed).is_err() {
            return Err(FailureReason::StructurallyInvalid);
        }
        return Ok(());
    }

    if !brackets_balanced(trimmed) || !fences_balanced(trimmed) {
        return Err(FailureReason::StructurallyInvalid);
    }
    Ok(())
}

/// Strip a single outer code fence if the model wrapped its answer in one.
pub fn strip_outer_fence(candidate: &str) -> &str {
    let trimmed = candidate.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence line.
    match body.split_once('\n') {
        Some((_lang, content)) => content.trim_end_matches('\n'),
        None => body,
    }
}

fn looks_like_json(source: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(source.trim()).is_ok()
}

fn brackets_balanced(text: &str) -> bool {
    let mut stack = Vec::new();
    for c in text.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' => {
                if stack.pop() != Some('(') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}

fn fences_balanced(text: &str) -> bool {
    text.lines().filter(|l| l.trim_start().starts_with("```")).count() % 2 == 0
}
