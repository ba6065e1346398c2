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
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

const PRIORITY_ENV: &str = "OPMPLAY_THREAD_PRIORITY";
const DISABLE_RT_ENV: &str = "OPMPLAY_DISABLE_RT_AUDIO";

/// Priority for the render callback thread when OPMPLAY_THREAD_PRIORITY is unset.
const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

fn parse_priority(value: Option<&str>) -> u8 {
    value
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_CALLBACK_THREAD_PRIORITY)
}

/// Reads OPMPLAY_THREAD_PRIORITY (0-99). Called before the stream is built so
/// the render callback never touches the environment.
pub fn callback_thread_priority() -> Option<ThreadPriorityValue> {
    ThreadPriorityValue::try_from(parse_priority(std::env::var(PRIORITY_ENV).ok().as_deref())).ok()
}

fn is_truthy(value: &str) -> bool {
    value == "1"
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("yes")
        || value.eq_ignore_ascii_case("on")
}

/// Whether to try SCHED_FIFO for the render callback. Disabled with OPMPLAY_DISABLE_RT_AUDIO=1.
pub fn rt_audio_enabled() -> bool {
    !std::env::var(DISABLE_RT_ENV)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

/// Raises the calling thread's priority the first time it is called for a stream.
pub fn configure_audio_thread_priority(
    priority: Option<ThreadPriorityValue>,
    rt_audio: bool,
    priority_set: &mut bool,
) {
    if *priority_set {
        return;
    }
    *priority_set = true;
    let Some(priority) = priority else {
        return;
    };

    let tp = ThreadPriority::Crossplatform(priority);
    let _ = set_current_thread_priority(tp);

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        match set_thread_priority_and_policy(
            thread_native_id(),
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => info!("Enabled RT SCHED_FIFO for render callback thread"),
            Err(e) => warn!(
                error = %e,
                "Failed to set RT SCHED_FIFO for render callback thread"
            ),
        }
    }

    #[cfg(not(unix))]
    let _ = rt_audio;
}
