//! Text helpers for user-facing notices.

use std::time::Duration;

/// Mask the middle of `text`, keeping `head` leading and `tail` trailing
/// characters. Strings no longer than `head + tail` are returned unchanged.
///
/// Used to avoid leaking full group ids into moderator channels.
pub fn mask_middle(text: &str, head: usize, tail: usize, symbol: char) -> String {
    let count = text.chars().count();
    if count <= head + tail {
        return text.to_string();
    }
    text.chars()
        .enumerate()
        .map(|(i, c)| if i < head || i >= count - tail { c } else { symbol })
        .collect()
}

/// Human-readable rendering of a duration, largest units first
/// (e.g. `1 hour 30 minutes`). Sub-second precision is dropped.
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "0 seconds".to_string();
    }

    let units: [(u64, &str); 4] = [(86_400, "day"), (3_600, "hour"), (60, "minute"), (1, "second")];
    let mut parts = Vec::new();
    for (size, name) in units {
        let n = secs / size;
        if n > 0 {
            let plural = if n == 1 { "" } else { "s" };
            parts.push(format!("{n} {name}{plural}"));
            secs %= size;
        }
    }
    parts.join(" ")
}
