//! Track classification
//!
//! Pure functions over a snapshot of the project's tracks. Roles are found
//! by naming convention: the lead vocal is the track named exactly
//! `Vocals`; supplementary vocal samples carry `(vox)` in their name.

use std::collections::HashMap;

use crate::daw::{Track, TrackId};

/// Exact name of the lead vocal track.
pub const VOCALS: &str = "Vocals";
/// Case-insensitive marker of supplementary vocal-sample tracks.
pub const VOX_MARKER: &str = "(vox)";

/// Walks a track and its ancestors, nearest first.
struct Ancestry<'a> {
    by_id: HashMap<&'a TrackId, &'a Track>,
}

impl<'a> Ancestry<'a> {
    fn new(tracks: &'a [Track]) -> Self {
        Self {
            by_id: tracks.iter().map(|track| (&track.id, track)).collect(),
        }
    }

    /// The track itself, then each parent until a root. Iterative; a parent
    /// cycle ends the walk instead of looping.
    fn lineage(&self, track: &'a Track) -> Vec<&'a Track> {
        let mut lineage = vec![track];
        let mut parent = track.parent.as_ref();
        while let Some(id) = parent {
            let Some(next) = self.by_id.get(id).copied() else {
                break;
            };
            if lineage.iter().any(|seen| seen.id == next.id) {
                break;
            }
            lineage.push(next);
            parent = next.parent.as_ref();
        }
        lineage
    }
}

/// Tracks named exactly `Vocals`.
pub fn vocal_tracks(tracks: &[Track]) -> Vec<&Track> {
    tracks.iter().filter(|track| track.name == VOCALS).collect()
}

/// Unmuted vocal-sample tracks to mute for the instrumental.
pub fn vox_tracks_to_mute(tracks: &[Track]) -> Vec<&Track> {
    tracks
        .iter()
        .filter(|track| !track.muted && track.name.to_lowercase().contains(VOX_MARKER))
        .collect()
}

/// Tracks to mute so only the vocals remain.
///
/// Already-muted tracks are left alone so restoring doesn't unmute them.
/// Tracks without items of their own may be sends feeding the vocal chain,
/// so they stay audible. Anything inside a `Vocals` folder is vocal.
pub fn acappella_mute_set(tracks: &[Track]) -> Vec<&Track> {
    let ancestry = Ancestry::new(tracks);
    tracks
        .iter()
        .filter(|track| !track.muted && !track.items.is_empty())
        .filter(|track| {
            !ancestry
                .lineage(track)
                .iter()
                .any(|ancestor| ancestor.name == VOCALS)
        })
        .collect()
}

/// Unmuted tracks that contribute to the mix: they hold items or process audio.
pub fn stem_eligible_tracks(tracks: &[Track]) -> Vec<&Track> {
    tracks
        .iter()
        .filter(|track| !track.muted && (!track.items.is_empty() || !track.fxs.is_empty()))
        .collect()
}

/// Whether a track, or any folder it's nested in, is muted.
pub fn is_effectively_muted(tracks: &[Track], track: &Track) -> bool {
    Ancestry::new(tracks)
        .lineage(track)
        .iter()
        .any(|ancestor| ancestor.muted)
}

/// Time span covering every audible media item, as `(start, end)` seconds.
///
/// `(0.0, 0.0)` when nothing is audible.
pub fn audible_bounds(tracks: &[Track]) -> (f64, f64) {
    let ancestry = Ancestry::new(tracks);
    let items = tracks
        .iter()
        .filter(|track| !ancestry.lineage(track).iter().any(|t| t.muted))
        .flat_map(|track| track.items.iter())
        .filter(|item| !item.muted);

    let mut bounds: Option<(f64, f64)> = None;
    for item in items {
        bounds = Some(match bounds {
            Some((start, end)) => (start.min(item.position), end.max(item.end())),
            None => (item.position, item.end()),
        });
    }
    bounds.unwrap_or((0.0, 0.0))
}
