// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use tracing::{debug, info};

use crate::chip::{
    slot, CHANNELS, KEY_ON_ALL_OPERATORS, OPERATORS, REG_AMS_D1R, REG_D1L_RR, REG_DT1_MUL,
    REG_DT2_D2R, REG_KEY_CODE, REG_KEY_FRACTION, REG_KEY_ON, REG_KS_AR, REG_PMS_AMS,
    REG_RL_FB_CONNECT, REG_TOTAL_LEVEL,
};
use crate::events::EventStream;
use crate::timing::ChipTiming;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("channel {0} is out of range, the chip has channels 0-7")]
    InvalidChannel(u8),

    #[error("note {index} is on channel {note}, but the voice is loaded on channel {score}")]
    ChannelMismatch { index: usize, note: u8, score: u8 },
}

/// Maps a semitone above C# to the chip's note field, which skips codes 3, 7, 11 and 15.
const NOTE_TABLE: [u8; 12] = [0, 1, 2, 4, 5, 6, 8, 9, 10, 12, 13, 14];

const MAX_OCTAVE: u8 = 7;

/// Converts a MIDI note number into the chip's key code.
///
/// The chip's octave starts at C#, so the note is lowered by one semitone before
/// splitting it into octave and note. MIDI 69 (A4) maps to 0x4A. Out of range
/// octaves clamp instead of wrapping.
pub fn midi_to_key_code(midi_note: u8) -> u8 {
    let adjusted = midi_note.saturating_sub(1);
    let octave = (adjusted / 12).saturating_sub(1).min(MAX_OCTAVE);
    let note = NOTE_TABLE[usize::from(adjusted % 12)];
    (octave << 4) | note
}

/// Register values for one operator slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub dt1_mul: u8,
    pub total_level: u8,
    pub ks_ar: u8,
    pub ams_d1r: u8,
    pub dt2_d2r: u8,
    pub d1l_rr: u8,
}

/// A channel voice: routing, algorithm and the four operators' envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub rl_fb_connect: u8,
    pub pms_ams: u8,
    pub operators: [Operator; OPERATORS as usize],
}

impl Default for Voice {
    /// Both outputs, algorithm 7, with only operator 1 audible. Produces a
    /// plain sine at the key code's pitch.
    fn default() -> Self {
        let operator = |total_level| Operator {
            dt1_mul: 0x01,
            total_level,
            ks_ar: 0x1F,
            ams_d1r: 0x05,
            dt2_d2r: 0x05,
            d1l_rr: 0xF7,
        };

        Voice {
            rl_fb_connect: 0xC7,
            pms_ams: 0x00,
            operators: [operator(0x00), operator(0x7F), operator(0x7F), operator(0x7F)],
        }
    }
}

/// A single note. Times are native sample indices. The channel must match the
/// score's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub midi_note: u8,
    pub channel: u8,
    pub start: u32,
    pub duration: u32,
}

impl Note {
    pub fn end(&self) -> u32 {
        self.start.saturating_add(self.duration)
    }
}

/// A voice assigned to a channel (0-7) and the notes played on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    pub channel: u8,
    pub voice: Voice,
    pub notes: Vec<Note>,
}

impl Score {
    /// C4, E4, G4 and B4 as consecutive quarter notes on channel 0.
    pub fn demo(timing: &ChipTiming, bpm: u32) -> Score {
        let quarter = timing.quarter_note_samples(bpm);
        let notes = [60u8, 64, 67, 71]
            .into_iter()
            .zip(0u32..)
            .map(|(midi_note, i)| Note {
                midi_note,
                channel: 0,
                start: i * quarter,
                duration: quarter,
            })
            .collect();

        Score {
            channel: 0,
            voice: Voice::default(),
            notes,
        }
    }

    /// One note on channel 0 starting at sample 0.
    pub fn single_note(midi_note: u8, duration: u32) -> Score {
        Score {
            channel: 0,
            voice: Voice::default(),
            notes: vec![Note {
                midi_note,
                channel: 0,
                start: 0,
                duration,
            }],
        }
    }
}

/// Expands a score into logical register writes, ordered by time.
///
/// All channels are keyed off and the score's voice is loaded at sample 0. Each
/// note then sets its pitch and keys on at its start and keys off at its end.
///
/// Fails if the score's channel doesn't exist or a note is on a channel other
/// than the one the voice is loaded on.
pub fn compile_pass1(score: &Score) -> Result<EventStream, CompileError> {
    let channel = score.channel;
    if channel >= CHANNELS {
        return Err(CompileError::InvalidChannel(channel));
    }
    if let Some((index, note)) = score
        .notes
        .iter()
        .enumerate()
        .find(|(_, note)| note.channel != channel)
    {
        return Err(CompileError::ChannelMismatch {
            index,
            note: note.channel,
            score: channel,
        });
    }

    let mut events = EventStream::with_capacity(34 + score.notes.len() * 4);
    let voice = &score.voice;

    for ch in 0..CHANNELS {
        events.push_write(0, REG_KEY_ON, ch);
    }
    events.push_write(0, REG_RL_FB_CONNECT + channel, voice.rl_fb_connect);
    events.push_write(0, REG_PMS_AMS + channel, voice.pms_ams);
    for (op, operator) in (0..OPERATORS).zip(voice.operators.iter()) {
        let slot = slot(channel, op);
        events.push_write(0, REG_DT1_MUL + slot, operator.dt1_mul);
        events.push_write(0, REG_TOTAL_LEVEL + slot, operator.total_level);
        events.push_write(0, REG_KS_AR + slot, operator.ks_ar);
        events.push_write(0, REG_AMS_D1R + slot, operator.ams_d1r);
        events.push_write(0, REG_DT2_D2R + slot, operator.dt2_d2r);
        events.push_write(0, REG_D1L_RR + slot, operator.d1l_rr);
    }

    for note in &score.notes {
        let ch = note.channel;
        let key_code = midi_to_key_code(note.midi_note);
        debug!(
            midi_note = note.midi_note,
            start = note.start,
            key_code = format!("0x{:02X}", key_code),
            "Compiling note."
        );

        events.push_write(note.start, REG_KEY_CODE + ch, key_code);
        events.push_write(note.start, REG_KEY_FRACTION + ch, 0x00);
        events.push_write(note.start, REG_KEY_ON, KEY_ON_ALL_OPERATORS | ch);
        events.push_write(note.end(), REG_KEY_ON, ch);
    }

    events.sort_by_time();
    info!(events = events.len(), notes = score.notes.len(), "Pass 1 complete.");
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_to_key_code() {
        assert_eq!(midi_to_key_code(69), 0x4A);
        assert_eq!(midi_to_key_code(60), 0x3E);
        assert_eq!(midi_to_key_code(61), 0x40);
        assert_eq!(midi_to_key_code(64), 0x44);
        assert_eq!(midi_to_key_code(67), 0x48);
        assert_eq!(midi_to_key_code(71), 0x4D);
        assert_eq!(midi_to_key_code(81), 0x5A);
    }

    #[test]
    fn test_midi_to_key_code_clamps() {
        assert_eq!(midi_to_key_code(0), 0x00);
        assert_eq!(midi_to_key_code(1), 0x00);
        assert_eq!(midi_to_key_code(12), 0x0E);
        assert_eq!(midi_to_key_code(127) >> 4, 7);
        assert_eq!(midi_to_key_code(127), 0x78);
    }

    #[test]
    fn test_demo_setup() {
        let events = compile_pass1(&Score::demo(&ChipTiming::default(), 120)).unwrap();
        assert_eq!(events.len(), 50);
        assert!(events.is_time_ordered());

        for ch in 0..8u8 {
            let event = events.get(usize::from(ch)).unwrap();
            assert_eq!((event.sample_time, event.address, event.data), (0, 0x08, ch));
        }
        assert_eq!(events.get(8).unwrap().address, 0x20);
        assert_eq!(events.get(8).unwrap().data, 0xC7);
        assert_eq!(events.get(9).unwrap().address, 0x38);

        // Operator slots 0, 8, 16 and 24 are loaded in turn.
        let total_levels: Vec<(u8, u8)> = events
            .iter()
            .filter(|e| (0x60..0x80).contains(&e.address))
            .map(|e| (e.address, e.data))
            .collect();
        assert_eq!(
            total_levels,
            vec![(0x60, 0x00), (0x68, 0x7F), (0x70, 0x7F), (0x78, 0x7F)]
        );
        assert!(events.iter().take(34).all(|e| e.sample_time == 0));
        assert!(events.iter().all(|e| !e.is_data_phase));
    }

    #[test]
    fn test_demo_notes() {
        let timing = ChipTiming::default();
        let events = compile_pass1(&Score::demo(&timing, 120)).unwrap();
        let q = 27965;

        let key_ons: Vec<u32> = events
            .iter()
            .filter(|e| e.address == 0x08 && e.data == 0x78)
            .map(|e| e.sample_time)
            .collect();
        assert_eq!(key_ons, vec![0, q, 2 * q, 3 * q]);

        let key_offs: Vec<u32> = events
            .iter()
            .skip(34)
            .filter(|e| e.address == 0x08 && e.data == 0x00)
            .map(|e| e.sample_time)
            .collect();
        assert_eq!(key_offs, vec![q, 2 * q, 3 * q, 4 * q]);

        let key_codes: Vec<u8> = events
            .iter()
            .filter(|e| e.address == 0x28)
            .map(|e| e.data)
            .collect();
        assert_eq!(key_codes, vec![0x3E, 0x44, 0x48, 0x4D]);
        assert!(events
            .iter()
            .filter(|e| e.address == 0x30)
            .all(|e| e.data == 0));
    }

    #[test]
    fn test_key_off_precedes_next_note() {
        let events = compile_pass1(&Score::demo(&ChipTiming::default(), 120)).unwrap();
        let at_q: Vec<(u8, u8)> = events
            .iter()
            .filter(|e| e.sample_time == 27965)
            .map(|e| (e.address, e.data))
            .collect();
        assert_eq!(at_q, vec![(0x08, 0x00), (0x28, 0x44), (0x30, 0x00), (0x08, 0x78)]);
    }

    #[test]
    fn test_unordered_notes_are_sorted() {
        let mut score = Score::single_note(69, 100);
        score.notes.insert(
            0,
            Note {
                midi_note: 60,
                channel: 0,
                start: 500,
                duration: 100,
            },
        );

        let events = compile_pass1(&score).unwrap();
        assert!(events.is_time_ordered());
        let key_codes: Vec<u8> = events
            .iter()
            .filter(|e| e.address == 0x28)
            .map(|e| e.data)
            .collect();
        assert_eq!(key_codes, vec![0x4A, 0x3E]);
    }

    #[test]
    fn test_rejects_bad_channels() {
        let mut score = Score::single_note(69, 100);
        score.channel = 8;
        assert_eq!(compile_pass1(&score), Err(CompileError::InvalidChannel(8)));

        let mut score = Score::single_note(69, 100);
        score.notes.push(Note {
            midi_note: 60,
            channel: 3,
            start: 200,
            duration: 100,
        });
        assert_eq!(
            compile_pass1(&score),
            Err(CompileError::ChannelMismatch {
                index: 1,
                note: 3,
                score: 0
            })
        );
    }

    #[test]
    fn test_compiles_on_other_channels() {
        let mut score = Score::single_note(69, 100);
        score.channel = 5;
        score.notes[0].channel = 5;

        let events = compile_pass1(&score).unwrap();
        assert!(events
            .iter()
            .any(|e| (e.address, e.data) == (0x28 + 5, 0x4A)));
        assert!(events
            .iter()
            .any(|e| (e.address, e.data) == (0x08, 0x78 | 5)));
        assert!(events
            .iter()
            .any(|e| (e.address, e.data) == (0x20 + 5, 0xC7)));
    }
}
