//! Picks the video to resume at process start.

use std::fmt;

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::{info, warn};

use crate::catalog::MediaCatalog;
use crate::error::Error;
use crate::store::{KeyValueStore, ProgressStore};

/// Why a video was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Requested,
    Resumed,
    Random,
}

impl fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requested => "requested",
            Self::Resumed => "resumed",
            Self::Random => "random",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub video_id: String,
    pub source: SelectionSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub video_id: String,
    pub position: u64,
    pub source: SelectionSource,
}

/// Choose between a requested video, the saved pointer and a random pick, in
/// that order. Entries that are not in the catalog are skipped.
///
/// # Errors
/// Returns [`Error::EmptyCatalog`] when there is nothing to play.
pub fn select<R: Rng + ?Sized>(
    catalog: &MediaCatalog,
    requested: Option<&str>,
    pointer: Option<&str>,
    rng: &mut R,
) -> Result<Selection, Error> {
    if let Some(requested) = requested {
        match catalog.lookup(requested) {
            Some(video_id) => {
                return Ok(Selection {
                    video_id: video_id.to_string(),
                    source: SelectionSource::Requested,
                });
            }
            None => warn!(requested, "requested video not found"),
        }
    }

    if let Some(pointer) = pointer {
        if catalog.contains(pointer) {
            return Ok(Selection {
                video_id: pointer.to_string(),
                source: SelectionSource::Resumed,
            });
        }
        info!(saved = pointer, "saved video is no longer in the library");
    }

    let video_id = catalog
        .videos()
        .choose(rng)
        .ok_or_else(|| Error::EmptyCatalog(catalog.root().to_path_buf()))?;
    Ok(Selection {
        video_id: video_id.clone(),
        source: SelectionSource::Random,
    })
}

/// Resolve the active video and its starting position, and persist the choice
/// as the new now-playing pointer.
///
/// `start` overrides whatever position was stored for the chosen video.
pub fn resolve<S, R>(
    catalog: &MediaCatalog,
    store: &mut ProgressStore<S>,
    requested: Option<&str>,
    start: Option<u64>,
    rng: &mut R,
) -> Result<Resolution, Error>
where
    S: KeyValueStore,
    R: Rng + ?Sized,
{
    let pointer = store.load_pointer()?;
    let Selection { video_id, source } = select(catalog, requested, pointer.as_deref(), rng)?;
    store.save_pointer(&video_id)?;

    let stored = store.load(&video_id)?;
    let position = match start {
        Some(frame) => {
            info!(frame, "starting at requested frame");
            frame
        }
        None => stored,
    };

    info!(video = %video_id, %source, position, "current video selected");
    Ok(Resolution {
        video_id,
        position,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn catalog(names: &[&str]) -> MediaCatalog {
        MediaCatalog::from_names("/videos", names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn request_beats_pointer_and_random() {
        let cat = catalog(&["a.mp4", "b.mp4", "c.mp4"]);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let sel = select(&cat, Some("c.mp4"), Some("a.mp4"), &mut rng).unwrap();
            assert_eq!(sel.video_id, "c.mp4");
            assert_eq!(sel.source, SelectionSource::Requested);
        }
    }

    #[test]
    fn missing_request_falls_back_to_pointer() {
        let cat = catalog(&["a.mp4", "b.mp4"]);
        let mut rng = StdRng::seed_from_u64(1);
        let sel = select(&cat, Some("notfound.mp4"), Some("b.mp4"), &mut rng).unwrap();
        assert_eq!(sel.video_id, "b.mp4");
        assert_eq!(sel.source, SelectionSource::Resumed);
    }

    #[test]
    fn missing_request_and_pointer_pick_randomly_from_catalog() {
        let cat = catalog(&["a.mp4", "b.mp4"]);
        let mut rng = StdRng::seed_from_u64(2);
        let sel = select(&cat, Some("notfound.mp4"), Some("gone.mp4"), &mut rng).unwrap();
        assert!(cat.contains(&sel.video_id));
        assert_eq!(sel.source, SelectionSource::Random);
    }

    #[test]
    fn single_entry_is_chosen_deterministically() {
        let cat = catalog(&["only.mp4"]);
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let sel = select(&cat, None, None, &mut rng).unwrap();
            assert_eq!(sel.video_id, "only.mp4");
        }
    }

    #[test]
    fn empty_catalog_is_fatal() {
        let cat = catalog(&[]);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            select(&cat, Some("a.mp4"), None, &mut rng),
            Err(Error::EmptyCatalog(_))
        ));
    }

    #[test]
    fn resolve_persists_pointer_and_honors_start_override() {
        let cat = catalog(&["a.mp4", "b.mp4"]);
        let mut store = ProgressStore::new(MemoryStore::new());
        store.save("b.mp4", 70).unwrap();
        store.save_pointer("b.mp4").unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        let resumed = resolve(&cat, &mut store, None, None, &mut rng).unwrap();
        assert_eq!(resumed.video_id, "b.mp4");
        assert_eq!(resumed.position, 70);

        let requested = resolve(&cat, &mut store, Some("a.mp4"), Some(500), &mut rng).unwrap();
        assert_eq!(requested.video_id, "a.mp4");
        assert_eq!(requested.position, 500);
        assert_eq!(store.load_pointer().unwrap().as_deref(), Some("a.mp4"));
        // the override is not written back until the first cycle completes
        assert_eq!(store.load("a.mp4").unwrap(), 0);
    }
}
