// Token scanner for incremental HTML rendering

/// Split the next renderable unit off the front of `pending`.
///
/// A unit is a whole tag (`<...>`), a whole entity (`&...;`) or a single
/// character. When a tag or entity is not yet terminated in the buffer, only
/// its opening character is returned so rendering never stalls waiting for
/// the rest of it to arrive.
///
/// The two halves always concatenate back to `pending`.
pub fn next_token(pending: &str) -> (&str, &str) {
    let Some(first) = pending.chars().next() else {
        return ("", "");
    };

    let terminator = match first {
        '<' => Some('>'),
        '&' => Some(';'),
        _ => None,
    };

    let end = terminator
        .and_then(|t| pending.find(t).map(|pos| pos + t.len_utf8()))
        .unwrap_or_else(|| first.len_utf8());

    pending.split_at(end)
}
