//! Game process detection.
//!
//! The detector samples the OS process list through a `ProcessLister` and
//! reports the first process whose lowercased name contains a configured
//! keyword. Listing failures are treated as "no game".

use std::sync::{Arc, Mutex, PoisonError};
use sysinfo::{ProcessRefreshKind, System};

pub const NO_GAME_TITLE: &str = "No game detected";

pub const DEFAULT_GAME_KEYWORDS: &[&str] = &[
    "steam",
    "epicgameslauncher",
    "riotclientservices",
    "valorant",
    "leagueclient",
    "dota2",
    "cs2",
    "csgo",
    "fortnite",
    "minecraft",
    "roblox",
    "gta",
    "fifa",
    "efootball",
    "pubg",
];

/// Source of running process names.
pub trait ProcessLister: Send + Sync {
    fn process_names(&self) -> Result<Vec<String>, String>;
}

/// Process lister backed by `sysinfo`, covering Linux, macOS and Windows.
pub struct SysinfoProcessLister {
    system: Mutex<System>,
}

impl SysinfoProcessLister {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProcessLister {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLister for SysinfoProcessLister {
    fn process_names(&self) -> Result<Vec<String>, String> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err("process listing is not supported on this platform".to_string());
        }

        let mut sys = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_processes_specifics(ProcessRefreshKind::new());

        // Sorted so repeated samples of the same process set match the same name.
        let mut names: Vec<String> = sys
            .processes()
            .values()
            .map(|process| process.name().to_string())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub matched: bool,
    pub label: String,
}

impl Detection {
    pub fn none() -> Self {
        Self {
            matched: false,
            label: NO_GAME_TITLE.to_string(),
        }
    }

    pub fn game(label: impl Into<String>) -> Self {
        Self {
            matched: true,
            label: label.into(),
        }
    }
}

pub struct GameDetector {
    lister: Arc<dyn ProcessLister>,
    keywords: Vec<String>,
}

impl GameDetector {
    pub fn new(lister: Arc<dyn ProcessLister>, keywords: Vec<String>) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|keyword| keyword.to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        Self { lister, keywords }
    }

    pub fn detect(&self) -> Detection {
        match self.lister.process_names() {
            Ok(names) => match match_processes(&names, &self.keywords) {
                Some(name) => Detection::game(name),
                None => Detection::none(),
            },
            Err(err) => {
                tracing::debug!(error = %err, "Process listing failed; reporting no game");
                Detection::none()
            }
        }
    }
}

/// Returns the first lowercased process name containing any keyword.
pub fn match_processes(names: &[String], keywords: &[String]) -> Option<String> {
    names.iter().find_map(|name| {
        let lowered = name.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }
        keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
            .then_some(lowered)
    })
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedLister;
    use super::*;

    fn default_keywords() -> Vec<String> {
        DEFAULT_GAME_KEYWORDS
            .iter()
            .map(|keyword| keyword.to_string())
            .collect()
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn matches_substring_case_insensitively() {
        let matched = match_processes(&names(&["bash", "Steam.exe"]), &default_keywords());
        assert_eq!(matched.as_deref(), Some("steam.exe"));
    }

    #[test]
    fn returns_first_matching_process_in_listing_order() {
        let matched = match_processes(
            &names(&["Minecraft.exe", "dota2.exe"]),
            &default_keywords(),
        );
        assert_eq!(matched.as_deref(), Some("minecraft.exe"));
    }

    #[test]
    fn no_match_yields_none() {
        assert_eq!(
            match_processes(&names(&["bash", "cargo", ""]), &default_keywords()),
            None
        );
    }

    #[test]
    fn detector_reports_sentinel_when_nothing_matches() {
        let lister = Arc::new(ScriptedLister::new());
        lister.push(&["systemd", "zsh"]);
        let detector = GameDetector::new(lister, default_keywords());

        let detection = detector.detect();
        assert!(!detection.matched);
        assert_eq!(detection.label, NO_GAME_TITLE);
    }

    #[test]
    fn detector_swallows_listing_errors() {
        let lister = Arc::new(ScriptedLister::new());
        lister.push_error("permission denied");
        let detector = GameDetector::new(lister, default_keywords());

        assert_eq!(detector.detect(), Detection::none());
    }

    #[test]
    fn detector_uses_configured_keywords() {
        let lister = Arc::new(ScriptedLister::new());
        lister.push(&["steam.exe", "MyIndieGame"]);
        let detector = GameDetector::new(lister, vec!["MYINDIE".to_string()]);

        assert_eq!(detector.detect(), Detection::game("myindiegame"));
    }

    #[test]
    fn sysinfo_lister_returns_current_processes() {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return;
        }
        let lister = SysinfoProcessLister::new();
        let names = lister.process_names().expect("process names");
        assert!(!names.is_empty());
    }
}
