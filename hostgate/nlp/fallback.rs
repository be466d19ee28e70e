use crate::interpretation::{Intent, Interpretation, SafetyLevel};

/// Confidence attached to every keyword-derived interpretation.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

struct Bucket {
    keywords: &'static [&'static str],
    intent: Intent,
    tier: SafetyLevel,
}

// priority order: first bucket with a hit wins
const INSTALL: &[&str] = &["install", "choco", "winget"];
const UNINSTALL: &[&str] = &["uninstall", "remove"];
const INFO: &[&str] = &["system", "info", "status"];
const SCAN: &[&str] = &["pentest", "scan", "zap", "burp"];

const FILLER: &[&str] = &["the", "a", "an", "package", "software", "app", "program"];

/// Deterministic keyword classifier used whenever the provider is absent or
/// unusable.
///
/// Matching is done on whole lowercase words, so `uninstall` never lands in
/// the install bucket and `information` is not `info`.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    /// Creates the classifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classifies `text`. Same input always yields the same interpretation.
    #[must_use]
    pub fn classify(&self, text: &str) -> Interpretation {
        let tokens = tokenize(text);
        let buckets = [
            Bucket {
                keywords: INSTALL,
                intent: Intent::InstallSoftware,
                tier: SafetyLevel::Caution,
            },
            Bucket {
                keywords: UNINSTALL,
                intent: Intent::UninstallSoftware,
                tier: SafetyLevel::Caution,
            },
            Bucket {
                keywords: INFO,
                intent: Intent::SystemInfo,
                tier: SafetyLevel::Safe,
            },
            Bucket {
                keywords: SCAN,
                intent: Intent::RunPentest,
                tier: SafetyLevel::Dangerous,
            },
        ];

        let (intent, tier, keywords) = buckets
            .into_iter()
            .find(|bucket| tokens.iter().any(|tok| bucket.keywords.contains(&tok.as_str())))
            .map_or((Intent::Unknown, SafetyLevel::Caution, &[][..]), |bucket| {
                (bucket.intent, bucket.tier, bucket.keywords)
            });

        let explanation = format!("Fallback interpretation: {intent}");
        let mut interp = Interpretation::new(intent.clone(), tier)
            .with_confidence(FALLBACK_CONFIDENCE)
            .with_parameter("raw_input", text)
            .with_explanation(explanation);

        if matches!(intent, Intent::InstallSoftware | Intent::UninstallSoftware) {
            if let Some(package) = package_after_keyword(text, keywords) {
                interp = interp.with_parameter("package", package);
            }
            if let Some(manager) = manager_hint(&tokens) {
                interp = interp.with_parameter("manager", manager);
            }
        }
        interp
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .map(str::to_string)
        .collect()
}

fn bare_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

// `notepad++` must survive, so package words are taken whitespace-delimited
fn package_after_keyword(text: &str, keywords: &[&str]) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words
        .iter()
        .position(|word| keywords.contains(&bare_word(word).as_str()))?;
    words[start + 1..]
        .iter()
        .map(|word| word.trim_end_matches([',', '.', ';', '!', '?']))
        .find(|word| {
            let bare = bare_word(word);
            !bare.is_empty()
                && !FILLER.contains(&bare.as_str())
                && !keywords.contains(&bare.as_str())
                && !matches!(bare.as_str(), "using" | "with" | "via" | "from")
        })
        .map(str::to_string)
}

fn manager_hint(tokens: &[String]) -> Option<&'static str> {
    if tokens.iter().any(|tok| tok == "winget") {
        Some("winget")
    } else if tokens.iter().any(|tok| tok == "choco" || tok == "chocolatey") {
        Some("chocolatey")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Interpretation {
        KeywordClassifier::new().classify(text)
    }

    #[test]
    fn install_request_is_caution_with_package() {
        let interp = classify("install notepad++");
        assert_eq!(interp.intent, Intent::InstallSoftware);
        assert_eq!(interp.safety_level, SafetyLevel::Caution);
        assert!(interp.requires_confirmation);
        assert!((interp.confidence - 0.3).abs() < 1e-6);
        assert_eq!(interp.parameter_text(&["package"]).as_deref(), Some("notepad++"));
        assert_eq!(
            interp.parameter_text(&["raw_input"]).as_deref(),
            Some("install notepad++")
        );
        assert_eq!(interp.explanation, "Fallback interpretation: install_software");
    }

    #[test]
    fn uninstall_is_not_mistaken_for_install() {
        let interp = classify("please uninstall the package firefox");
        assert_eq!(interp.intent, Intent::UninstallSoftware);
        assert_eq!(interp.parameter_text(&["package"]).as_deref(), Some("firefox"));
    }

    #[test]
    fn manager_hint_is_extracted() {
        let interp = classify("winget install Git.Git");
        assert_eq!(interp.intent, Intent::InstallSoftware);
        assert_eq!(interp.parameter_text(&["manager"]).as_deref(), Some("winget"));
        assert_eq!(interp.parameter_text(&["package"]).as_deref(), Some("Git.Git"));
    }

    #[test]
    fn info_bucket_is_safe_and_unconfirmed() {
        let interp = classify("show me the system status");
        assert_eq!(interp.intent, Intent::SystemInfo);
        assert_eq!(interp.safety_level, SafetyLevel::Safe);
        assert!(!interp.requires_confirmation);
    }

    #[test]
    fn scan_bucket_is_dangerous() {
        let interp = classify("run a ZAP scan against staging");
        assert_eq!(interp.intent, Intent::RunPentest);
        assert_eq!(interp.safety_level, SafetyLevel::Dangerous);
        assert!(interp.requires_confirmation);
    }

    #[test]
    fn install_outranks_later_buckets() {
        assert_eq!(classify("install status monitor").intent, Intent::InstallSoftware);
        assert_eq!(classify("remove old scan logs").intent, Intent::UninstallSoftware);
    }

    #[test]
    fn unmatched_input_is_unknown_caution() {
        let interp = classify("make me a sandwich");
        assert_eq!(interp.intent, Intent::Unknown);
        assert_eq!(interp.safety_level, SafetyLevel::Caution);
        assert!(interp.requires_confirmation);
        assert!(interp.parameter_text(&["package"]).is_none());
    }

    #[test]
    fn classification_is_deterministic() {
        let text = "install 7zip with choco";
        assert_eq!(classify(text), classify(text));
    }
}
