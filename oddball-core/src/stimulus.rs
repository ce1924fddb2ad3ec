use serde::{Deserialize, Serialize};

/// Stimulus categories of the oddball paradigm.
///
/// Standards are frequent (red circle, low tone); targets are rare
/// (green triangle, high tone) and require a space-bar response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StimulusKind {
    Standard,
    Target,
}

impl StimulusKind {
    pub fn is_target(&self) -> bool {
        matches!(self, StimulusKind::Target)
    }

    /// Label used in the session log's `stim_type` column.
    pub fn label(&self) -> &'static str {
        match self {
            StimulusKind::Standard => "standard",
            StimulusKind::Target => "target",
        }
    }
}

/// Which channels carry the stimuli.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Both,
    Audio,
    Visual,
}

impl Modality {
    pub fn has_audio(&self) -> bool {
        matches!(self, Modality::Both | Modality::Audio)
    }

    pub fn has_visual(&self) -> bool {
        matches!(self, Modality::Both | Modality::Visual)
    }

    /// Radio-group order on the parameter screen.
    pub const ALL: [Modality; 3] = [Modality::Both, Modality::Audio, Modality::Visual];

    pub fn label(&self) -> &'static str {
        match self {
            Modality::Both => "Both",
            Modality::Audio => "Audio",
            Modality::Visual => "Visual",
        }
    }
}

impl Default for Modality {
    fn default() -> Self {
        Modality::Both
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modality_channels() {
        assert!(Modality::Both.has_audio() && Modality::Both.has_visual());
        assert!(Modality::Audio.has_audio() && !Modality::Audio.has_visual());
        assert!(!Modality::Visual.has_audio() && Modality::Visual.has_visual());
    }

    #[test]
    fn kind_labels() {
        assert_eq!(StimulusKind::Standard.label(), "standard");
        assert_eq!(StimulusKind::Target.label(), "target");
        assert!(StimulusKind::Target.is_target());
    }
}
