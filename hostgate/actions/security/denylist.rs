use regex::{Regex, RegexBuilder};

/// Scans script text for denylisted constructs.
#[derive(Debug, Clone)]
pub struct DenylistAnalyzer {
    patterns: Vec<(Regex, String)>,
}

impl DenylistAnalyzer {
    /// Compiles `patterns` case-insensitively.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                RegexBuilder::new(raw)
                    .case_insensitive(true)
                    .build()
                    .map(|regex| (regex, raw.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Patterns matching anywhere in `text`, in configuration order.
    #[must_use]
    pub fn scan(&self, text: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|(regex, _)| regex.is_match(text))
            .map(|(_, raw)| raw.clone())
            .collect()
    }

    /// Number of configured patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the denylist is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SafetyPolicy;

    fn analyzer() -> DenylistAnalyzer {
        DenylistAnalyzer::new(&SafetyPolicy::default().denylist).unwrap()
    }

    #[test]
    fn matches_case_insensitively() {
        assert_eq!(analyzer().scan("remove-item C:\\temp"), vec!["Remove-Item"]);
        assert_eq!(
            analyzer().scan("Get-ItemProperty HKLM:\\Software | Remove-Item"),
            vec!["Remove-Item", "HKLM:"]
        );
    }

    #[test]
    fn harmless_scripts_pass() {
        assert!(analyzer().scan("Get-Date").is_empty());
        assert!(analyzer().scan("Get-Service Spooler").is_empty());
    }

    #[test]
    fn invalid_pattern_is_reported() {
        assert!(DenylistAnalyzer::new(&["(unclosed"]).is_err());
    }
}
