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
use tracing::{info, warn};

use crate::events::{EventStream, RegisterEvent};

/// Splits logical writes into address and data bus events.
///
/// Writes sharing a timestamp form a batch. Within a batch every bus event is
/// `settle_delay` samples after the previous one, so a batch of n writes
/// occupies 2n consecutive slots starting at its timestamp. The offset resets
/// at each new timestamp. A batch that would start before the previous batch
/// has finished is pushed back to the first free slot so that the output
/// stays time ordered and no write is issued while the bus is still settling.
pub fn compile_pass2(pass1: &EventStream, settle_delay: u32) -> EventStream {
    let mut events = EventStream::with_capacity(pass1.len() * 2);

    let mut batch_time = None;
    let mut origin = 0u32;
    let mut offset = 0u32;
    let mut next_free = 0u32;

    for write in pass1 {
        if batch_time != Some(write.sample_time) {
            batch_time = Some(write.sample_time);
            offset = 0;
            origin = write.sample_time.max(next_free);
            if origin > write.sample_time {
                warn!(
                    time = write.sample_time,
                    deferred_by = origin - write.sample_time,
                    "Register writes overlap the previous batch, deferring."
                );
            }
        }

        events.push(RegisterEvent {
            sample_time: origin.saturating_add(offset),
            address: write.address,
            data: write.data,
            is_data_phase: false,
        });
        offset = offset.saturating_add(settle_delay);

        events.push(RegisterEvent {
            sample_time: origin.saturating_add(offset),
            address: write.address,
            data: write.data,
            is_data_phase: true,
        });
        offset = offset.saturating_add(settle_delay);

        next_free = origin.saturating_add(offset);
    }

    info!(
        events = events.len(),
        writes = pass1.len(),
        settle_delay,
        "Pass 2 complete."
    );
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile_pass1, Score};
    use crate::timing::ChipTiming;

    fn demo_pass2() -> (EventStream, EventStream) {
        let timing = ChipTiming::default();
        let pass1 = compile_pass1(&Score::demo(&timing, 120)).unwrap();
        let pass2 = compile_pass2(&pass1, timing.settle_delay_samples());
        (pass1, pass2)
    }

    #[test]
    fn test_demo_event_count() {
        let (pass1, pass2) = demo_pass2();
        assert_eq!(pass2.len(), 100);
        assert_eq!(pass2.len(), pass1.len() * 2);
        assert!(pass2.is_time_ordered());
    }

    #[test]
    fn test_phases_are_paired() {
        let (pass1, pass2) = demo_pass2();
        for (write, pair) in pass1.iter().zip(pass2.as_slice().chunks(2)) {
            let (address, data) = (pair[0], pair[1]);
            assert!(!address.is_data_phase);
            assert!(data.is_data_phase);
            assert_eq!(data.sample_time, address.sample_time + 2);
            assert_eq!((address.address, address.data), (write.address, write.data));
            assert_eq!((data.address, data.data), (write.address, write.data));
        }
    }

    #[test]
    fn test_batches_occupy_consecutive_slots() {
        let (pass1, pass2) = demo_pass2();
        let q = 27965;

        // Setup and the first note share sample 0: 37 writes, 74 events.
        for (i, event) in pass2.iter().take(74).enumerate() {
            assert_eq!(event.sample_time, 2 * i as u32);
        }

        // Each later note starts exactly on its beat. The offset never drifts.
        for beat in 1..4u32 {
            let start = pass2
                .iter()
                .position(|e| e.sample_time >= beat * q)
                .unwrap();
            let batch = &pass2.as_slice()[start..start + 8];
            for (i, event) in batch.iter().enumerate() {
                assert_eq!(event.sample_time, beat * q + 2 * i as u32);
            }
        }

        // The final key-off is alone in its batch.
        let last = pass1.get(pass1.len() - 1).unwrap();
        assert_eq!(last.sample_time, 4 * q);
        assert_eq!(pass2.last_sample_time(), Some(4 * q + 2));
    }

    #[test]
    fn test_overlapping_batch_is_deferred() {
        let mut pass1 = EventStream::new();
        pass1.push_write(0, 0x20, 0xC7);
        pass1.push_write(0, 0x28, 0x4A);
        pass1.push_write(0, 0x08, 0x78);
        pass1.push_write(5, 0x08, 0x00);
        pass1.push_write(5, 0x28, 0x3E);
        pass1.push_write(100, 0x08, 0x00);

        let pass2 = compile_pass2(&pass1, 2);
        let times: Vec<u32> = pass2.iter().map(|e| e.sample_time).collect();
        assert_eq!(
            times,
            vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 100, 102]
        );
        assert!(pass2.is_time_ordered());
    }

    #[test]
    fn test_empty_stream() {
        let pass2 = compile_pass2(&EventStream::new(), 2);
        assert!(pass2.is_empty());
    }
}
