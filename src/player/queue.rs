// ==========================================
// QUEUE MANAGEMENT MODULE
// ==========================================
// This module holds the playback queue for the music player.
// It handles:
// - Replacing the queue with a single track (instant play)
// - Appending tracks (add to queue)
// - Tracking the current position inside the queue
// - Working out whether a next track exists
//
// The queue never drops played tracks: insertion order is playback order,
// and the position is just an index into that list.

use serde::{Deserialize, Serialize};

// ==========================================
// TRACK STRUCT
// ==========================================
// A single playable item as returned by the Search Service.
//
// video_id: String
//   - Opaque YouTube identifier, e.g. "dQw4w9WgXcQ"
//   - The only field the Stream Provider and Playback Engine care about
//
// name / artist: String
//   - Display strings for the UI
//
// thumbnail: Option<String>
//   - URL of the first thumbnail, when the search result carried one
//
// Serialized as {"videoId", "name", "artist", "thumbnail"} on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub video_id: String,
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl Track {
    pub fn new(video_id: String, name: String, artist: String, thumbnail: Option<String>) -> Self {
        Track {
            video_id,
            name,
            artist,
            thumbnail,
        }
    }
}

// ==========================================
// QUEUE STRUCT
// ==========================================
// tracks: Vec<Track>
//   - Planned playback order, front to back
//   - Mutated by append, clear and wholesale replacement
//
// position: Option<usize>
//   - None is the "nothing selected" sentinel
//   - Some(i) always points at a valid index of `tracks` at the time it
//     was set; every mutation that could break that resets it
#[derive(Debug, Default, Clone)]
pub struct Queue {
    tracks: Vec<Track>,
    position: Option<usize>,
}

impl Queue {
    pub fn new() -> Self {
        Queue {
            tracks: Vec::new(),
            position: None,
        }
    }

    // ==========================================
    // MUTATION: replace()
    // ==========================================
    // Discards the current queue and starts over with a single track.
    // Position is reset to the sentinel; the caller selects index 0.
    //
    // Example:
    // - Before: [A, B, C], position = Some(2)
    // - replace(D)
    // - After: [D], position = None
    pub fn replace(&mut self, track: Track) {
        self.tracks.clear();
        self.tracks.push(track);
        self.position = None;
    }

    // ==========================================
    // MUTATION: add()
    // ==========================================
    // Appends a track to the back of the queue and returns its index.
    // The current position is left untouched.
    pub fn add(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    // Empties the queue and resets the position to the sentinel.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.position = None;
    }

    // ==========================================
    // POSITION: select()
    // ==========================================
    // Moves the position to `index`.
    //
    // Returns: Option<&Track>
    // - Some(track): index was valid, position now points at it
    // - None: index out of bounds, position unchanged
    pub fn select(&mut self, index: usize) -> Option<&Track> {
        if index < self.tracks.len() {
            self.position = Some(index);
            self.tracks.get(index)
        } else {
            None
        }
    }

    // ==========================================
    // POSITION: next_index()
    // ==========================================
    // Index that a skip/auto-next would move to.
    //
    // - Position None: no next index (nothing is selected)
    // - Position at the last track: None (queue exhausted, no wraparound)
    // - Otherwise: Some(position + 1)
    pub fn next_index(&self) -> Option<usize> {
        let next = self.position? + 1;
        (next < self.tracks.len()).then_some(next)
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn current(&self) -> Option<&Track> {
        self.position.and_then(|i| self.tracks.get(i))
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
