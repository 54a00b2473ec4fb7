//! Step 1 of the Decision Engine (§4.D): extract the `Intent[]` JSON array
//! from the AI's raw text response. The contract is a JSON array, but the
//! engine tolerates it being wrapped in code-fences or surrounded by
//! explanatory prose — it scans for the first balanced `[...]` span instead
//! of requiring the whole response to be valid JSON on its own.

use core_types::Intent;

use crate::{Error, Result};

/// Extracts the first balanced top-level `[...]` span from `text`, ignoring
/// brackets that appear inside string literals.
fn extract_json_array(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('[')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes.iter().enumerate().skip(start) {
        let c = b as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses the AI's raw text into a list of `Intent`s. A malformed or empty
/// array is an `Err`, not a panic — the caller treats it as a no-op cycle
/// per §4.D step 1 ("the cycle becomes a no-op and is logged, not retried").
pub fn parse_intents(ai_text: &str) -> Result<Vec<Intent>> {
    let array_text = extract_json_array(ai_text)
        .ok_or_else(|| Error::ParseFailed("no JSON array found in AI response".to_string()))?;

    let intents: Vec<Intent> = serde_json::from_str(array_text)
        .map_err(|e| Error::ParseFailed(format!("invalid JSON array: {e}")))?;

    if intents.is_empty() {
        return Err(Error::ParseFailed("intent array was empty".to_string()));
    }

    Ok(intents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_array() {
        let text = r#"[{"symbol":"BTCUSDT","action":"HOLD"}]"#;
        assert_eq!(extract_json_array(text), Some(text));
    }

    #[test]
    fn extracts_array_wrapped_in_code_fence_and_prose() {
        let text = "Here is my analysis:\n```json\n[{\"symbol\":\"BTCUSDT\",\"action\":\"HOLD\"}]\n```\nLet me know if you have questions.";
        let extracted = extract_json_array(text).unwrap();
        assert_eq!(extracted, r#"[{"symbol":"BTCUSDT","action":"HOLD"}]"#);
    }

    #[test]
    fn ignores_brackets_inside_string_literals() {
        let text = r#"[{"symbol":"BTCUSDT","action":"HOLD","reason":"looks like a [range]"}]"#;
        let extracted = extract_json_array(text).unwrap();
        assert_eq!(extracted, text);
    }

    #[test]
    fn malformed_output_has_no_decisions() {
        let err = parse_intents("I think you should hold.").unwrap_err();
        assert!(matches!(err, Error::ParseFailed(_)));
    }

    #[test]
    fn empty_array_is_rejected() {
        assert!(parse_intents("[]").is_err());
    }

    #[test]
    fn parses_a_well_formed_intent() {
        let text = r#"[{"symbol":"ETHUSDT","action":"OPEN","side":"LONG","size-fraction":0.2,"stop-loss":"2900","take-profit":"3200","reason":"breakout"}]"#;
        let intents = parse_intents(text).unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].symbol, "ETHUSDT");
    }
}
