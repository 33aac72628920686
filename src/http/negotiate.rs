//! Accept header negotiation
//!
//! Parses the comma-separated media ranges of an `Accept` header.

/// One media range from an `Accept` header, parameters stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRange<'a> {
    pub kind: &'a str,
    pub subtype: &'a str,
    /// Quality value in thousandths (`q=0.5` is 500)
    pub quality: u16,
}

/// Parse an `Accept` header into media ranges, skipping malformed entries
pub fn parse_accept(header: &str) -> Vec<MediaRange<'_>> {
    header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';').map(str::trim);
            let (kind, subtype) = parts.next()?.split_once('/')?;
            if kind.is_empty() || subtype.is_empty() {
                return None;
            }
            let quality = parts
                .filter_map(|p| p.strip_prefix("q="))
                .find_map(parse_quality)
                .unwrap_or(1000);
            Some(MediaRange {
                kind,
                subtype,
                quality,
            })
        })
        .collect()
}

fn parse_quality(value: &str) -> Option<u16> {
    let q: f32 = value.trim().parse().ok()?;
    if !(0.0..=1.0).contains(&q) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some((q * 1000.0).round() as u16)
}

/// Whether the caller lists any acceptable `image/*` range
///
/// `*/*` does not count: the caller has to ask for an image explicitly.
pub fn accepts_image(header: &str) -> bool {
    parse_accept(header)
        .iter()
        .any(|range| range.kind.eq_ignore_ascii_case("image") && range.quality > 0)
}
