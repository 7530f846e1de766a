//! Final report payload and intent → title derivation.

use serde::{Deserialize, Serialize};

/// Intent prefix stripped when deriving a display title.
const CREATION_PREFIX: &str = "create_";

/// Title used when the backend supplies no usable intent.
pub const DEFAULT_REPORT_TITLE: &str = "Final Report";

/// Structured terminal output of a completed conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalReport {
    /// Intent tag as reported by the classifier.
    pub intent: String,
    /// Display title derived from the intent. Cosmetic metadata only —
    /// never parsed further.
    pub title: String,
    /// Free-form report payload.
    pub data: serde_json::Value,
}

impl FinalReport {
    pub fn new(intent: impl Into<String>, data: serde_json::Value) -> Self {
        let intent = intent.into();
        Self {
            title: title_from_intent(&intent),
            intent,
            data,
        }
    }
}

/// Derive a human-readable title from an intent tag.
///
/// `"create_traffic_offence_report"` → `"Traffic Offence Report"`.
/// Empty or separator-only intents fall back to [`DEFAULT_REPORT_TITLE`].
pub fn title_from_intent(intent: &str) -> String {
    if intent.is_empty() {
        return DEFAULT_REPORT_TITLE.into();
    }

    let stripped = intent.strip_prefix(CREATION_PREFIX).unwrap_or(intent);
    let title = stripped
        .split('_')
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        DEFAULT_REPORT_TITLE.into()
    } else {
        title
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_creation_prefix_and_title_cases() {
        assert_eq!(
            title_from_intent("create_traffic_offence_report"),
            "Traffic Offence Report"
        );
        assert_eq!(
            title_from_intent("create_investigation_report"),
            "Investigation Report"
        );
    }

    #[test]
    fn intent_without_prefix_is_still_title_cased() {
        assert_eq!(title_from_intent("witness_statement"), "Witness Statement");
    }

    #[test]
    fn empty_intent_falls_back_to_default() {
        assert_eq!(title_from_intent(""), DEFAULT_REPORT_TITLE);
        assert_eq!(title_from_intent("___"), DEFAULT_REPORT_TITLE);
    }

    #[test]
    fn report_constructor_derives_title() {
        let report = FinalReport::new(
            "create_traffic_offence_report",
            json!({ "location": "Main St" }),
        );
        assert_eq!(report.title, "Traffic Offence Report");
        assert_eq!(report.data["location"], "Main St");
    }
}
