//! Localized file detection.
//!
//! Localized game files carry a language code right before the extension,
//! e.g. `BioD_Cat002_LOC_DEU.pcc` or `Startup_FRA.pcc`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Languages shipped with the trilogy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    German,
    French,
    Italian,
    Spanish,
    Polish,
    Russian,
    Japanese,
    Czech,
    Hungarian,
}

impl Language {
    /// Parses a file-name language code. Some languages have two codes
    /// (text-only and voice-over builds).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "INT" => Some(Language::English),
            "DEU" | "GER" => Some(Language::German),
            "FRA" | "FRE" => Some(Language::French),
            "ITA" => Some(Language::Italian),
            "ESN" => Some(Language::Spanish),
            "POL" => Some(Language::Polish),
            "RUS" => Some(Language::Russian),
            "JPN" => Some(Language::Japanese),
            "CZE" => Some(Language::Czech),
            "HUN" => Some(Language::Hungarian),
            _ => None,
        }
    }
}

/// Returns the language a file is localized for, if its name carries a recognized suffix.
pub fn language_suffix(file_name: &str) -> Option<Language> {
    static SUFFIX_RE: OnceLock<Regex> = OnceLock::new();
    let re = SUFFIX_RE.get_or_init(|| {
        Regex::new(r"(?i)_(int|deu|ger|fra|fre|ita|esn|pol|rus|jpn|cze|hun)\.[a-z0-9]+$")
            .expect("language suffix regex is valid")
    });

    re.captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Language::from_code(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_suffix() {
        assert_eq!(language_suffix("BioD_Cat002_LOC_DEU.pcc"), Some(Language::German));
        assert_eq!(language_suffix("Startup_FRE.pcc"), Some(Language::French));
        assert_eq!(language_suffix("Coalesced_INT.bin"), Some(Language::English));
        assert_eq!(language_suffix("BioA_Nor_100.pcc"), None);
        assert_eq!(language_suffix("readme_deu"), None);
    }
}
