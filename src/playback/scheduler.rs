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
use crate::chip::{BusPort, SynthCore};
use crate::events::{EventStream, RegisterEvent};

/// A forward-only position in a time ordered event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackCursor {
    next_index: usize,
    last_sample: u32,
}

impl PlaybackCursor {
    pub fn new() -> PlaybackCursor {
        PlaybackCursor::default()
    }

    /// Fires every pending event due at or before `current_sample`, in stream
    /// order, and returns how many fired. The cursor stops at the first event
    /// still in the future. Fired events are never revisited.
    ///
    /// Firing an event is a single bus write and does not clock the chip.
    pub fn advance<C: SynthCore + ?Sized>(
        &mut self,
        events: &EventStream,
        chip: &mut C,
        current_sample: u32,
    ) -> usize {
        self.last_sample = current_sample;

        let pending = events.as_slice().get(self.next_index..).unwrap_or(&[]);
        let mut fired = 0;
        for event in pending {
            if event.sample_time > current_sample {
                break;
            }
            apply(event, chip);
            fired += 1;
        }

        self.next_index += fired;
        fired
    }

    /// Index of the next event to fire.
    pub fn position(&self) -> usize {
        self.next_index
    }

    /// The sample index passed to the most recent `advance`.
    pub fn last_sample(&self) -> u32 {
        self.last_sample
    }

    pub fn is_finished(&self, events: &EventStream) -> bool {
        self.next_index >= events.len()
    }
}

fn apply<C: SynthCore + ?Sized>(event: &RegisterEvent, chip: &mut C) {
    if event.is_data_phase {
        chip.write(BusPort::Data, event.data);
    } else {
        chip.write(BusPort::Address, event.address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::mock::RecordingChip;
    use crate::compiler::compile_pass2;

    fn stream() -> EventStream {
        let mut pass1 = EventStream::new();
        pass1.push_write(0, 0x20, 0xC7);
        pass1.push_write(0, 0x28, 0x4A);
        pass1.push_write(10, 0x08, 0x78);
        compile_pass2(&pass1, 2)
    }

    #[test]
    fn test_fires_due_events_only() {
        let events = stream();
        let mut chip = RecordingChip::new();
        let mut cursor = PlaybackCursor::new();

        assert_eq!(cursor.advance(&events, &mut chip, 0), 1);
        assert_eq!(cursor.advance(&events, &mut chip, 1), 0);
        assert_eq!(cursor.advance(&events, &mut chip, 2), 1);
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.last_sample(), 2);

        let values: Vec<(BusPort, u8)> = chip.writes().iter().map(|w| (w.port, w.value)).collect();
        assert_eq!(values, vec![(BusPort::Address, 0x20), (BusPort::Data, 0xC7)]);
    }

    #[test]
    fn test_catches_up_in_order() {
        let events = stream();
        let mut chip = RecordingChip::new();
        let mut cursor = PlaybackCursor::new();

        // Samples 0-6 carry four events; jumping straight to 9 fires them all.
        assert_eq!(cursor.advance(&events, &mut chip, 9), 4);
        assert_eq!(chip.data_written_to(0x20), vec![0xC7]);
        assert_eq!(chip.data_written_to(0x28), vec![0x4A]);
        assert!(!cursor.is_finished(&events));

        assert_eq!(cursor.advance(&events, &mut chip, 12), 2);
        assert!(cursor.is_finished(&events));
        assert_eq!(chip.data_written_to(0x08), vec![0x78]);
    }

    #[test]
    fn test_never_refires() {
        let events = stream();
        let mut chip = RecordingChip::new();
        let mut cursor = PlaybackCursor::new();

        cursor.advance(&events, &mut chip, 100);
        assert_eq!(chip.writes().len(), 6);
        assert_eq!(cursor.advance(&events, &mut chip, 100), 0);
        assert_eq!(cursor.advance(&events, &mut chip, 200), 0);
        assert_eq!(chip.writes().len(), 6);
    }

    #[test]
    fn test_does_not_clock() {
        let events = stream();
        let mut chip = RecordingChip::new();
        let mut cursor = PlaybackCursor::new();

        cursor.advance(&events, &mut chip, 100);
        assert_eq!(chip.cycles(), 0);
    }

    #[test]
    fn test_empty_stream() {
        let events = EventStream::new();
        let mut chip = RecordingChip::new();
        let mut cursor = PlaybackCursor::new();
        assert_eq!(cursor.advance(&events, &mut chip, 0), 0);
        assert!(cursor.is_finished(&events));
    }
}
