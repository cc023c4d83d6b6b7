//! ANSI color removal for file output.

use std::borrow::Cow;

const RESET: &[u8] = b"\x1b[0m";
const CSI: &[u8] = b"\x1b[";

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Remove SGR color sequences (`ESC [ ... m`) from a formatted line.
///
/// Lines without a reset sequence are returned untouched. If any escape is not
/// terminated by an `m` within the expected window the whole line is returned
/// unmodified, since it is probably not a color sequence at all.
pub fn strip_ansi(line: &[u8]) -> Cow<'_, [u8]> {
    if find(line, RESET).is_none() {
        return Cow::Borrowed(line);
    }

    let mut out = Vec::with_capacity(line.len());
    let mut start = 0;
    loop {
        let Some(offset) = find(&line[start..], CSI) else {
            out.extend_from_slice(&line[start..]);
            break;
        };
        let esc = start + offset;
        out.extend_from_slice(&line[start..esc]);

        // The terminating 'm' sits 3..=6 bytes past ESC: `ESC[0m` up to `ESC[1001m`.
        let terminator = (esc + 3..=esc + 6)
            .take_while(|&i| i < line.len())
            .find(|&i| line[i] == b'm');
        match terminator {
            Some(m) => start = m + 1,
            None => return Cow::Borrowed(line),
        }
        if start == line.len() {
            break;
        }
    }
    Cow::Owned(out)
}

/// Owned variant of [`strip_ansi`] that avoids a copy when nothing was stripped.
pub fn strip_ansi_owned(line: Vec<u8>) -> Vec<u8> {
    let stripped = match strip_ansi(&line) {
        Cow::Owned(stripped) => Some(stripped),
        Cow::Borrowed(_) => None,
    };
    stripped.unwrap_or(line)
}
