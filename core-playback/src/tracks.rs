//! # Audio Track Selection
//!
//! Picks one audio track by label and group index from the engine's mapped
//! tracks.
//!
//! Matching runs renderer → group → element over audio renderers only, and
//! the first hit wins:
//! 1. label equals the requested name and the group index matches;
//! 2. no anomalous track, some element unlabeled, group index matches;
//! 3. anomalous track present and label equals the requested name.
//!
//! No match means no override; the engine keeps its current selection.

use std::fmt;

/// Renderer category reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererType {
    Audio,
    Video,
    Text,
    Other,
}

/// One selectable format inside a track group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFormat {
    pub id: Option<String>,
    pub label: Option<String>,
}

impl TrackFormat {
    pub fn new(id: Option<&str>, label: Option<&str>) -> Self {
        Self {
            id: id.map(str::to_string),
            label: label.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackGroup {
    pub formats: Vec<TrackFormat>,
}

impl TrackGroup {
    pub fn new(formats: Vec<TrackFormat>) -> Self {
        Self { formats }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererTracks {
    pub renderer_type: RendererType,
    pub groups: Vec<TrackGroup>,
}

/// Tracks currently mapped to the engine's renderers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedTrackInfo {
    pub renderers: Vec<RendererTracks>,
}

/// Selection to apply: enable `renderer_index` and force `group_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackOverride {
    pub renderer_index: usize,
    pub group_index: usize,
    pub element_index: usize,
}

/// Flags tracks whose ids come from a known-bad encoder profile.
pub trait TrackAnomalyDetector: Send + Sync {
    fn is_anomalous(&self, format: &TrackFormat) -> bool;
}

/// Track id emitted by the bad encoder profile.
pub const MALFORMED_TRACK_ID: &str = "1/15";

/// Matches tracks whose id equals a fixed sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelIdDetector {
    sentinel: String,
}

impl SentinelIdDetector {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
        }
    }
}

impl Default for SentinelIdDetector {
    fn default() -> Self {
        Self::new(MALFORMED_TRACK_ID)
    }
}

impl TrackAnomalyDetector for SentinelIdDetector {
    fn is_anomalous(&self, format: &TrackFormat) -> bool {
        format.id.as_deref() == Some(self.sentinel.as_str())
    }
}

/// Never flags anything; disables the label-only fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnomalies;

impl TrackAnomalyDetector for NoAnomalies {
    fn is_anomalous(&self, _format: &TrackFormat) -> bool {
        false
    }
}

pub struct TrackSelectionManager {
    detector: Box<dyn TrackAnomalyDetector>,
}

impl TrackSelectionManager {
    pub fn new(detector: Box<dyn TrackAnomalyDetector>) -> Self {
        Self { detector }
    }

    /// Find the override for audio track `name` in group `group_index`.
    pub fn select_audio_track(
        &self,
        tracks: &MappedTrackInfo,
        name: &str,
        group_index: usize,
    ) -> Option<TrackOverride> {
        tracks
            .renderers
            .iter()
            .enumerate()
            .filter(|(_, renderer)| renderer.renderer_type == RendererType::Audio)
            .find_map(|(renderer_index, renderer)| {
                self.select_in_renderer(renderer_index, renderer, name, group_index)
            })
    }

    fn select_in_renderer(
        &self,
        renderer_index: usize,
        renderer: &RendererTracks,
        name: &str,
        group_index: usize,
    ) -> Option<TrackOverride> {
        let formats = || renderer.groups.iter().flat_map(|group| group.formats.iter());
        let has_unlabeled = formats().any(|format| format.label.is_none());
        let has_anomalous = formats().any(|format| self.detector.is_anomalous(format));

        for (current_group, group) in renderer.groups.iter().enumerate() {
            for (element_index, format) in group.formats.iter().enumerate() {
                let label_matches = format.label.as_deref() == Some(name);
                let group_matches = current_group == group_index;

                let exact = label_matches && group_matches;
                let unlabeled_fallback = !has_anomalous && has_unlabeled && group_matches;
                let anomalous_fallback = has_anomalous && label_matches;

                if exact || unlabeled_fallback || anomalous_fallback {
                    return Some(TrackOverride {
                        renderer_index,
                        group_index: current_group,
                        element_index,
                    });
                }
            }
        }

        None
    }
}

impl Default for TrackSelectionManager {
    fn default() -> Self {
        Self::new(Box::new(SentinelIdDetector::default()))
    }
}

impl fmt::Debug for TrackSelectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackSelectionManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(groups: Vec<TrackGroup>) -> RendererTracks {
        RendererTracks {
            renderer_type: RendererType::Audio,
            groups,
        }
    }

    fn anomalous_tracks() -> MappedTrackInfo {
        MappedTrackInfo {
            renderers: vec![audio(vec![
                TrackGroup::new(vec![TrackFormat::new(Some("1/15"), Some("English"))]),
                TrackGroup::new(vec![TrackFormat::new(Some("x"), None)]),
            ])],
        }
    }

    #[test]
    fn test_anomalous_track_blocks_unlabeled_fallback() {
        let manager = TrackSelectionManager::default();
        assert_eq!(manager.select_audio_track(&anomalous_tracks(), "Other", 1), None);
    }

    #[test]
    fn test_anomalous_track_matches_by_label_only() {
        let manager = TrackSelectionManager::default();
        assert_eq!(
            manager.select_audio_track(&anomalous_tracks(), "English", 1),
            Some(TrackOverride {
                renderer_index: 0,
                group_index: 0,
                element_index: 0
            })
        );
    }

    #[test]
    fn test_exact_match() {
        let tracks = MappedTrackInfo {
            renderers: vec![audio(vec![
                TrackGroup::new(vec![TrackFormat::new(Some("a"), Some("English"))]),
                TrackGroup::new(vec![TrackFormat::new(Some("b"), Some("German"))]),
            ])],
        };
        let manager = TrackSelectionManager::default();

        assert_eq!(
            manager.select_audio_track(&tracks, "German", 1),
            Some(TrackOverride {
                renderer_index: 0,
                group_index: 1,
                element_index: 0
            })
        );
        // Label present but in another group, no fallback applies.
        assert_eq!(manager.select_audio_track(&tracks, "German", 0), None);
    }

    #[test]
    fn test_unlabeled_fallback_uses_group_index() {
        let tracks = MappedTrackInfo {
            renderers: vec![audio(vec![
                TrackGroup::new(vec![TrackFormat::new(Some("a"), None)]),
                TrackGroup::new(vec![TrackFormat::new(Some("b"), None)]),
            ])],
        };
        let manager = TrackSelectionManager::default();

        assert_eq!(
            manager.select_audio_track(&tracks, "anything", 1),
            Some(TrackOverride {
                renderer_index: 0,
                group_index: 1,
                element_index: 0
            })
        );
    }

    #[test]
    fn test_only_audio_renderers_are_scanned() {
        let tracks = MappedTrackInfo {
            renderers: vec![
                RendererTracks {
                    renderer_type: RendererType::Video,
                    groups: vec![TrackGroup::new(vec![TrackFormat::new(
                        Some("v"),
                        Some("English"),
                    )])],
                },
                audio(vec![TrackGroup::new(vec![TrackFormat::new(
                    Some("a"),
                    Some("English"),
                )])]),
            ],
        };

        let selected = TrackSelectionManager::default().select_audio_track(&tracks, "English", 0);
        assert_eq!(selected.map(|o| o.renderer_index), Some(1));
    }

    #[test]
    fn test_disabled_detector_restores_unlabeled_fallback() {
        let manager = TrackSelectionManager::new(Box::new(NoAnomalies));
        assert_eq!(
            manager.select_audio_track(&anomalous_tracks(), "Other", 1),
            Some(TrackOverride {
                renderer_index: 0,
                group_index: 1,
                element_index: 0
            })
        );
    }
}
