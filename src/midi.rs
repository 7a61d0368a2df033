use std::{collections::HashMap, path::Path};

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tracing::debug;

use crate::error::{NotefallError, NotefallResult};

/// A closed note interval: `start <= stop`, seconds from the top of the
/// file. Immutable once emitted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Note {
    pub key: u8,
    pub start: f64,
    pub stop: f64,
}

/// A note event on the merged, seconds-based timeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KeyEvent {
    On(u8),
    Off(u8),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedEvent {
    pub time: f64,
    pub event: KeyEvent,
}

/// Parsed MIDI input: the extracted notes plus the file's total length
/// (the absolute time of its last event, across all tracks).
#[derive(Clone, Debug)]
pub struct Score {
    pub notes: Vec<Note>,
    pub duration: f64,
}

impl Score {
    pub fn from_path(path: impl AsRef<Path>) -> NotefallResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            NotefallError::media_read(format!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> NotefallResult<Self> {
        let smf = Smf::parse(bytes)
            .map_err(|e| NotefallError::media_read(format!("failed to parse MIDI: {e}")))?;
        let (events, duration) = merge_tracks(&smf);
        let notes = extract_notes(&events);
        debug!(
            tracks = smf.tracks.len(),
            notes = notes.len(),
            duration_s = duration,
            "parsed MIDI score"
        );
        Ok(Self { notes, duration })
    }
}

/// Convert a note-on/note-off event stream into closed note intervals.
///
/// Non-nesting semantics: a note-on for a key already held is ignored, as
/// is a note-off for a key that is not held. Output order is note-off
/// (emission) order.
pub fn extract_notes(events: &[TimedEvent]) -> Vec<Note> {
    let mut held: HashMap<u8, f64> = HashMap::new();
    let mut notes = Vec::new();

    for ev in events {
        match ev.event {
            KeyEvent::On(key) => {
                held.entry(key).or_insert(ev.time);
            }
            KeyEvent::Off(key) => {
                if let Some(start) = held.remove(&key) {
                    notes.push(Note {
                        key,
                        start,
                        stop: ev.time,
                    });
                }
            }
        }
    }

    notes
}

/// Flatten all tracks into one chronological list of note events with
/// absolute timestamps in seconds, and report the time of the last event
/// of any kind (the file's total length).
///
/// Ticks are converted through the header timing: metrical files use
/// PPQ plus tempo meta events (default 500 000 us per quarter), SMPTE
/// files use a fixed tick duration.
fn merge_tracks(smf: &Smf<'_>) -> (Vec<TimedEvent>, f64) {
    enum Kind {
        Note(KeyEvent),
        Tempo(u32),
        Other,
    }

    // Gather everything with absolute ticks first; tempo events from any
    // track apply globally once sorted.
    let mut timeline: Vec<(u64, usize, Kind)> = Vec::new();
    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut abs_ticks: u64 = 0;
        for ev in track {
            abs_ticks += u64::from(ev.delta.as_int());
            let kind = match ev.kind {
                TrackEventKind::Midi { message, .. } => match message {
                    // NoteOn with velocity 0 is a note-off by convention.
                    MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                        Kind::Note(KeyEvent::Off(key.as_int()))
                    }
                    MidiMessage::NoteOn { key, .. } => Kind::Note(KeyEvent::On(key.as_int())),
                    MidiMessage::NoteOff { key, .. } => Kind::Note(KeyEvent::Off(key.as_int())),
                    _ => Kind::Other,
                },
                TrackEventKind::Meta(MetaMessage::Tempo(us_per_qn)) => {
                    Kind::Tempo(us_per_qn.as_int())
                }
                _ => Kind::Other,
            };
            timeline.push((abs_ticks, track_idx, kind));
        }
    }
    timeline.sort_by_key(|&(ticks, track_idx, _)| (ticks, track_idx));

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(t) => f64::from(t.as_int()),
        Timing::Timecode(..) => 0.0, // unused below
    };
    let fixed_tick_secs = match smf.header.timing {
        Timing::Metrical(_) => None,
        Timing::Timecode(fps, subframe) => {
            Some(1.0 / (f64::from(fps.as_int()) * f64::from(subframe)))
        }
    };

    let mut us_per_qn: f64 = 500_000.0;
    let mut last_ticks: u64 = 0;
    let mut now: f64 = 0.0;
    let mut events = Vec::new();

    for (ticks, _, kind) in timeline {
        let delta_ticks = (ticks - last_ticks) as f64;
        now += match fixed_tick_secs {
            Some(tick_secs) => delta_ticks * tick_secs,
            None => delta_ticks * us_per_qn / 1_000_000.0 / ticks_per_beat,
        };
        last_ticks = ticks;

        match kind {
            Kind::Note(event) => events.push(TimedEvent { time: now, event }),
            Kind::Tempo(us) => us_per_qn = f64::from(us),
            Kind::Other => {}
        }
    }

    (events, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(time: f64, key: u8) -> TimedEvent {
        TimedEvent {
            time,
            event: KeyEvent::On(key),
        }
    }

    fn off(time: f64, key: u8) -> TimedEvent {
        TimedEvent {
            time,
            event: KeyEvent::Off(key),
        }
    }

    #[test]
    fn extracts_matched_pairs_in_off_order() {
        let events = [on(0.0, 60), on(0.5, 64), off(2.0, 64), off(3.0, 60)];
        let notes = extract_notes(&events);
        assert_eq!(
            notes,
            vec![
                Note { key: 64, start: 0.5, stop: 2.0 },
                Note { key: 60, start: 0.0, stop: 3.0 },
            ]
        );
    }

    #[test]
    fn retrigger_while_held_is_ignored() {
        let events = [on(0.0, 60), on(1.0, 60), off(2.0, 60), off(3.0, 60)];
        let notes = extract_notes(&events);
        // The second on and the second off are both dropped.
        assert_eq!(notes, vec![Note { key: 60, start: 0.0, stop: 2.0 }]);
    }

    #[test]
    fn unmatched_off_is_ignored() {
        let events = [off(0.5, 72), on(1.0, 72), off(2.0, 72)];
        let notes = extract_notes(&events);
        assert_eq!(notes, vec![Note { key: 72, start: 1.0, stop: 2.0 }]);
    }

    #[test]
    fn dangling_on_emits_nothing() {
        let events = [on(0.0, 60)];
        assert!(extract_notes(&events).is_empty());
    }

    #[test]
    fn intervals_never_invert_or_overlap_per_key() {
        let events = [
            on(0.0, 60),
            off(1.0, 60),
            on(1.0, 60),
            on(1.5, 60),
            off(4.0, 60),
        ];
        let notes = extract_notes(&events);
        for n in &notes {
            assert!(n.start <= n.stop);
        }
        for pair in notes.windows(2) {
            if pair[0].key == pair[1].key {
                assert!(pair[0].stop <= pair[1].start);
            }
        }
    }

    #[test]
    fn garbage_bytes_are_a_media_read_error() {
        let err = Score::from_bytes(b"not a midi file").unwrap_err();
        assert!(matches!(err, NotefallError::MediaRead(_)));
    }

    #[test]
    fn missing_file_is_a_media_read_error() {
        let err = Score::from_path("/definitely/missing.mid").unwrap_err();
        assert!(matches!(err, NotefallError::MediaRead(_)));
    }
}
