//! Name conversion between the server's `snake_case` and client `camelCase`

/// Convert `snake_case` to `camelCase`
///
/// Only an underscore followed by a lowercase ASCII letter is folded, so
/// `track_playback_started` becomes `trackPlaybackStarted` while `foo_1`
/// and `_private` keep their underscores in place (`_private` becomes
/// `Private`, the leading `_p` pair being folded like any other).
///
/// ```rust
/// use mopidy_core::snake_to_camel;
///
/// assert_eq!(snake_to_camel("get_time_position"), "getTimePosition");
/// assert_eq!(snake_to_camel("tracklist"), "tracklist");
/// ```
pub fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '_' {
            if let Some(next) = chars.peek().copied().filter(|n| n.is_ascii_lowercase()) {
                out.push(next.to_ascii_uppercase());
                chars.next();
                continue;
            }
        }
        out.push(c);
    }

    out
}
