//! Reference target roles

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::UnmixError;

/// Canonical stem roles evaluated against ground truth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Lead and backing vocals
    Vocals,
    /// Percussion
    Drums,
    /// Bass instruments
    Bass,
    /// Remaining instrumentation
    Other,
}

impl Target {
    /// Default assignment priority: earlier targets pick clusters first
    pub const PRIORITY: [Target; 4] = [Target::Vocals, Target::Drums, Target::Bass, Target::Other];

    /// File stem used by the dataset layout (`vocals.wav`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            Target::Vocals => "vocals",
            Target::Drums => "drums",
            Target::Bass => "bass",
            Target::Other => "other",
        }
    }

    /// Upper-case label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Target::Vocals => "VOCALS",
            Target::Drums => "DRUMS",
            Target::Bass => "BASS",
            Target::Other => "OTHER",
        }
    }

    /// Display name for plot titles
    pub fn display_name(&self) -> &'static str {
        match self {
            Target::Vocals => "Vocals",
            Target::Drums => "Drums",
            Target::Bass => "Bass",
            Target::Other => "Other",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Target {
    type Err = UnmixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vocals" => Ok(Target::Vocals),
            "drums" => Ok(Target::Drums),
            "bass" => Ok(Target::Bass),
            "other" => Ok(Target::Other),
            other => Err(UnmixError::Config(format!("unknown target '{}'", other))),
        }
    }
}

/// Ground-truth signal per target for one track
#[derive(Debug, Clone, Default)]
pub struct TrackReferences {
    sources: HashMap<Target, Vec<f64>>,
}

impl TrackReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reference for `target`, replacing any previous one
    pub fn insert(&mut self, target: Target, signal: Vec<f64>) {
        self.sources.insert(target, signal);
    }

    /// Builder form of [`Self::insert`]
    pub fn with(mut self, target: Target, signal: Vec<f64>) -> Self {
        self.insert(target, signal);
        self
    }

    pub fn get(&self, target: Target) -> Option<&[f64]> {
        self.sources.get(&target).map(Vec::as_slice)
    }

    pub fn contains(&self, target: Target) -> bool {
        self.sources.contains_key(&target)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert_eq!(Target::PRIORITY[0], Target::Vocals);
        assert_eq!(Target::PRIORITY[3], Target::Other);
    }

    #[test]
    fn test_parse_round_trip() {
        for target in Target::PRIORITY {
            assert_eq!(target.name().parse::<Target>().unwrap(), target);
        }
        assert!("VOCALS".parse::<Target>().is_ok());
        assert!("piano".parse::<Target>().is_err());
    }

    #[test]
    fn test_track_references() {
        let refs = TrackReferences::new()
            .with(Target::Bass, vec![0.1, 0.2])
            .with(Target::Vocals, vec![0.3]);

        assert_eq!(refs.len(), 2);
        assert_eq!(refs.get(Target::Bass), Some(&[0.1, 0.2][..]));
        assert!(refs.get(Target::Drums).is_none());
        assert!(refs.contains(Target::Vocals));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Target::Drums).unwrap();
        assert_eq!(json, "\"drums\"");
    }
}
