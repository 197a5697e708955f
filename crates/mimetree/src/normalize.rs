//! Line ending helpers for callers that hold message files stored with
//! bare LF (or stray CR) line endings.  The parser itself requires CRLF
//! and never rewrites its input.

/// Returns true if `data` contains a CR not followed by LF, or an LF
/// not preceded by CR.
pub fn has_lone_cr_or_lf(data: &[u8]) -> bool {
    memchr::memchr2_iter(b'\r', b'\n', data).any(|i| match data[i] {
        b'\r' => data.get(i + 1) != Some(&b'\n'),
        _ => i == 0 || data[i - 1] != b'\r',
    })
}

/// Produces a copy of `data` where every line ending is CRLF.
/// Returns the input unchanged (without copying it when it is already
/// owned) when no fix-up is needed.
pub fn normalize_crlf(data: Vec<u8>) -> Vec<u8> {
    if !has_lone_cr_or_lf(&data) {
        return data;
    }

    let mut normalized = Vec::with_capacity(data.len() + data.len() / 32);
    let mut copied_to = 0;

    for i in memchr::memchr2_iter(b'\r', b'\n', &data) {
        match data[i] {
            b'\r' => {
                normalized.extend_from_slice(&data[copied_to..=i]);
                if data.get(i + 1) != Some(&b'\n') {
                    normalized.push(b'\n');
                }
            }
            _ => {
                normalized.extend_from_slice(&data[copied_to..i]);
                if i == 0 || data[i - 1] != b'\r' {
                    normalized.push(b'\r');
                }
                normalized.push(b'\n');
            }
        }
        copied_to = i + 1;
    }

    normalized.extend_from_slice(&data[copied_to..]);
    normalized
}
