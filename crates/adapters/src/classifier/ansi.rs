// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Escape-sequence boundaries and stripping

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// Longest incomplete tail that is held back between chunks.
pub(crate) const MAX_HELD_BYTES: usize = 512;

/// Length of the prefix of `data` that ends on a complete escape sequence
/// and a complete UTF-8 character. The rest must wait for more bytes.
pub(crate) fn complete_prefix_len(data: &[u8]) -> usize {
    let from = data.len().saturating_sub(MAX_HELD_BYTES);
    let window = &data[from..];
    let cut = window
        .windows(2)
        .rposition(|w| w[0] == ESC && is_string_intro(w[1]))
        .filter(|&rel| !string_terminated(&window[rel + 2..]))
        .or_else(|| {
            window
                .iter()
                .rposition(|&b| b == ESC)
                .filter(|&rel| !escape_complete(&window[rel..]))
        })
        .map_or(data.len(), |rel| from + rel);
    utf8_boundary(&data[..cut])
}

/// OSC, DCS, SOS, PM and APC carry a string up to BEL or ST (ESC \).
fn is_string_intro(b: u8) -> bool {
    matches!(b, b']' | b'P' | b'X' | b'^' | b'_')
}

fn string_terminated(body: &[u8]) -> bool {
    body.contains(&BEL) || body.windows(2).any(|w| w == [ESC, b'\\'])
}

/// Whether `seq` (starting at ESC) holds a whole escape sequence.
fn escape_complete(seq: &[u8]) -> bool {
    let Some(&intro) = seq.get(1) else {
        return false;
    };
    match intro {
        b'[' => {
            for &b in &seq[2..] {
                match b {
                    // parameter and intermediate bytes
                    0x20..=0x3f => continue,
                    // final byte, or garbage that ends the sequence anyway
                    _ => return true,
                }
            }
            false
        }
        b if is_string_intro(b) => string_terminated(&seq[2..]),
        // nF escapes take a final byte after the intermediates
        0x20..=0x2f => seq[2..].iter().any(|b| !(0x20..=0x2f).contains(b)),
        _ => true,
    }
}

/// Trim an incomplete trailing UTF-8 character.
fn utf8_boundary(data: &[u8]) -> usize {
    let len = data.len();
    for back in 1..=len.min(4) {
        let b = data[len - back];
        if b & 0xc0 == 0x80 {
            continue; // continuation byte
        }
        let width = match b {
            0x00..=0x7f => 1,
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => 1,
        };
        return if width > back { len - back } else { len };
    }
    len
}

/// Remove escape sequences and control characters.
///
/// Cursor movements that change rows become `\n` and cursor-forward becomes
/// a space, so full-screen redraws still read as separate lines. Carriage
/// returns are kept for the line splitter.
pub(crate) fn strip(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !c.is_control() || matches!(c, '\n' | '\r' | '\t') {
                out.push(c);
            }
            continue;
        }
        match chars.next() {
            Some('[') => {
                let mut final_char = None;
                for n in chars.by_ref() {
                    if ('\x20'..='\x3f').contains(&n) {
                        continue;
                    }
                    final_char = Some(n);
                    break;
                }
                match final_char {
                    Some('H' | 'f' | 'A' | 'B' | 'E' | 'F' | 'd') => out.push('\n'),
                    Some('C') => out.push(' '),
                    _ => {}
                }
            }
            Some(']' | 'P' | 'X' | '^' | '_') => {
                // string sequence: skip to BEL or ST
                while let Some(n) = chars.next() {
                    if n == '\x07' {
                        break;
                    }
                    if n == '\x1b' {
                        if chars.peek() == Some(&'\\') {
                            chars.next();
                        }
                        break;
                    }
                }
            }
            Some(n) if ('\x20'..='\x2f').contains(&n) => {
                chars.next();
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
#[path = "ansi_tests.rs"]
mod tests;
