use regex::Regex;

use crate::config::ReplyRules;
use crate::scanner::Verdict;

/// What the classifier concluded about a 200 response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    /// Body carried Cloudflare challenge markers instead of API output.
    pub cloudflare_blocked: bool,
}

impl Classification {
    fn ok() -> Self {
        Self { verdict: Verdict::Ok, cloudflare_blocked: false }
    }

    fn garbled() -> Self {
        Self { verdict: Verdict::Garbled, cloudflare_blocked: false }
    }

    fn unknown_format(cloudflare_blocked: bool) -> Self {
        Self { verdict: Verdict::UnknownFormat, cloudflare_blocked }
    }
}

/// Response-quality policy. Kept behind a trait so the heuristic can be
/// swapped without touching the pipeline.
pub trait ResponseClassifier: Send + Sync {
    fn classify(&self, body: &str) -> Classification;
}

/// Markers that identify a Cloudflare block/challenge page.
const CLOUDFLARE_MARKERS: &[&str] = &["Attention Required!", "Cloudflare"];

/// Non-whitespace control characters above this share of the text mean
/// the payload is binary junk rather than translated text.
const CONTROL_CHAR_RATIO: f64 = 0.05;

/// Rule-based classifier:
/// 1. the body must be JSON with a string `data` field, else `unknown-format`;
/// 2. the text must contain every `include_words` entry, else `unknown-format`;
/// 3. any U+FFFD replacement char, a control-char ratio above
///    `CONTROL_CHAR_RATIO`, or a `fail_regex` match means `garbled`;
/// 4. otherwise `ok`.
pub struct RuleClassifier {
    include_words: Vec<String>,
    fail_regex: Regex,
}

impl RuleClassifier {
    pub fn new(rules: &ReplyRules) -> anyhow::Result<Self> {
        Ok(Self {
            include_words: rules.include_words.clone(),
            fail_regex: Regex::new(&rules.fail_regex)?,
        })
    }

    fn looks_garbled(&self, text: &str) -> bool {
        if text.contains('\u{FFFD}') {
            return true;
        }

        let total = text.chars().count();
        if total > 0 {
            let control = text
                .chars()
                .filter(|c| c.is_control() && !c.is_whitespace())
                .count();
            if control as f64 / total as f64 > CONTROL_CHAR_RATIO {
                return true;
            }
        }

        self.fail_regex.is_match(text)
    }
}

impl ResponseClassifier for RuleClassifier {
    fn classify(&self, body: &str) -> Classification {
        let data = match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) => match value.get("data").and_then(|d| d.as_str()) {
                Some(data) => data.to_string(),
                None => return Classification::unknown_format(false),
            },
            Err(_) => {
                let cloudflare = CLOUDFLARE_MARKERS.iter().any(|m| body.contains(m));
                return Classification::unknown_format(cloudflare);
            }
        };

        if !self.include_words.iter().all(|word| data.contains(word)) {
            return Classification::unknown_format(false);
        }

        if self.looks_garbled(&data) {
            return Classification::garbled();
        }

        Classification::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RuleClassifier {
        RuleClassifier::new(&ReplyRules {
            include_words: vec!["你好".to_string(), "世界".to_string()],
            fail_regex: r"[\[\]{}()0-9]".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_well_formed_response_is_ok() {
        let c = classifier().classify(r#"{"data": "你好，世界！"}"#);
        assert_eq!(c.verdict, Verdict::Ok);
        assert!(!c.cloudflare_blocked);
    }

    #[test]
    fn test_non_json_is_unknown_format() {
        let c = classifier().classify("<html>hi</html>");
        assert_eq!(c.verdict, Verdict::UnknownFormat);
    }

    #[test]
    fn test_cloudflare_page_is_flagged() {
        let c = classifier()
            .classify("<html><title>Attention Required! | Cloudflare</title></html>");
        assert_eq!(c.verdict, Verdict::UnknownFormat);
        assert!(c.cloudflare_blocked);
    }

    #[test]
    fn test_missing_expected_words_is_unknown_format() {
        let c = classifier().classify(r#"{"data": "bonjour le monde"}"#);
        assert_eq!(c.verdict, Verdict::UnknownFormat);
    }

    #[test]
    fn test_replacement_char_is_garbled() {
        let c = classifier().classify("{\"data\": \"你好，世界\u{FFFD}\u{FFFD}\"}");
        assert_eq!(c.verdict, Verdict::Garbled);
    }

    #[test]
    fn test_fail_regex_match_is_garbled() {
        let c = classifier().classify(r#"{"data": "你好，世界 [37]"}"#);
        assert_eq!(c.verdict, Verdict::Garbled);
    }

    #[test]
    fn test_missing_data_field_is_unknown_format() {
        let c = classifier().classify(r#"{"result": "你好，世界"}"#);
        assert_eq!(c.verdict, Verdict::UnknownFormat);
    }
}
