//! String hygiene for untrusted `/proc` text.
//!
//! Process names and command lines come from whatever the traced process
//! chose to call `exec`/`prctl(PR_SET_NAME)` with, so they can contain
//! anything: shell metacharacters, control bytes, or truncated UTF-8 at
//! an arbitrary byte boundary. This module provides the two primitives
//! everything else sanitizes through.

/// Replace every byte outside `[A-Za-z0-9_.-]` with `_`, stopping at the
/// first NUL. The result is safe to interpolate into a shell command or a
/// notification argument list without quoting.
pub fn sanitize(s: &[u8]) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s {
        if b == 0 {
            break;
        }
        let c = b as char;
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out
}

/// Drop a trailing incomplete UTF-8 sequence, if any, so the result is
/// always valid UTF-8. Used after truncating `cmdline` to a fixed buffer,
/// since the cut can land in the middle of a multi-byte character.
///
/// The returned string differs from the input by at most 3 bytes: a
/// truncated 4-byte sequence can lose up to 3 trailing continuation
/// bytes.
pub fn fix_truncated_utf8(s: &[u8]) -> String {
    match std::str::from_utf8(s) {
        Ok(valid) => valid.to_string(),
        Err(e) => {
            let valid_len = e.valid_up_to();
            // valid_up_to() already guarantees s[..valid_len] is valid UTF-8.
            String::from_utf8_lossy(&s[..valid_len]).into_owned()
        }
    }
}
