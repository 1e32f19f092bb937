use once_cell::sync::Lazy;
use regex::Regex;

static HEADER_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#[ \t]+!(/bin/|/usr/bin/|/usr/local/bin/)?bmake[ \t]*$").unwrap()
});

/// Index of the first line that is the `# !bmake` marker.
pub fn find_header_marker<S: AsRef<str>>(lines: &[S]) -> Option<usize> {
    lines
        .iter()
        .position(|line| HEADER_MARKER.is_match(line.as_ref().trim_end()))
}
