//! Text rendering for the activity report.

use crate::moderation::Profile;

/// Telegram's per-message text limit.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Render seconds as `25h0m0s`, `1m30s`, `45s`.
pub fn format_elapsed(secs: i64) -> String {
    let sign = if secs < 0 { "-" } else { "" };
    let secs = secs.unsigned_abs();
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);

    if h > 0 {
        format!("{sign}{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{sign}{m}m{s}s")
    } else {
        format!("{sign}{s}s")
    }
}

/// `@handle first last elapsed`; absent name parts leave their slot empty.
pub fn format_member_line(profile: &Profile, elapsed: &str) -> String {
    format!(
        "@{} {} {} {elapsed}",
        profile.username.as_deref().unwrap_or(""),
        profile.first_name.as_deref().unwrap_or(""),
        profile.last_name.as_deref().unwrap_or(""),
    )
}

/// Find the largest char-boundary index <= `pos` in `s`.
fn floor_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut i = pos;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split on line breaks so each chunk fits in one message.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let safe_end = floor_char_boundary(remaining, max_len);
        let split_at = match remaining[..safe_end].rfind('\n') {
            Some(0) | None => safe_end,
            Some(i) => i,
        };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start_matches('\n');
    }

    chunks
}
