//! Fuzzy track matching for search results.
//!
//! Search metadata rarely matches player metadata byte for byte:
//! remaster years, "(feat. …)" credits and edition suffixes differ
//! between catalogs. Both sides are stripped of that noise, then
//! compared by case-folded containment in either direction.

use regex::Regex;

use crate::models::TrackItem;

const STRIP_SUFFIXES: &str = r"(?i)\s*[\-–—]\s*(single|deluxe|remaster(ed)?(\s*\d{4})?|bonus\s*track|expanded|anniversary|live|remix|version|edition|explicit|clean|mono|stereo|radio\s*edit|acoustic|original\s*mix|extended|instrumental|interlude|skit).*$";

const PAREN_NOISE: &str = r"(?i)\s*[\(\[](?:remaster(ed)?(\s*\d{4})?|deluxe(\s*edition)?|single|bonus|expanded|anniversary(\s*edition)?|live|remix|feat\.?[^)\]]*|ft\.?[^)\]]*|with\s+[^)\]]*|version|edition|explicit|clean|mono|stereo|radio\s*edit|acoustic|original\s*mix|extended|instrumental|from\s+[^)\]]*|prod\.?\s*[^)\]]*)[^)\]]*[\)\]]";

pub struct TitleNormalizer {
    paren_noise: Regex,
    strip_suffixes: Regex,
}

impl TitleNormalizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            paren_noise: Regex::new(PAREN_NOISE)?,
            strip_suffixes: Regex::new(STRIP_SUFFIXES)?,
        })
    }

    /// Strip parenthetical and suffix decorations, then case-fold.
    pub fn normalize(&self, text: &str) -> String {
        let text = self.paren_noise.replace_all(text, "");
        let text = self.strip_suffixes.replace_all(&text, "");
        text.trim().to_lowercase()
    }

    /// First search result whose title and artist both partially match
    /// the input. Titles are compared normalized, containment in either
    /// direction; artists by plain case-folded containment.
    pub fn fuzzy_pick<'a>(
        &self,
        items: &'a [TrackItem],
        track: &str,
        artist: &str,
    ) -> Option<&'a TrackItem> {
        let track_norm = self.normalize(track);
        let artist_low = artist.trim().to_lowercase();
        items.iter().find(|item| {
            let name_norm = self.normalize(&item.name);
            let item_artists = item
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            let title_ok = track_norm.contains(&name_norm) || name_norm.contains(&track_norm);
            let artist_ok = artist_low.is_empty()
                || item_artists.contains(&artist_low)
                || artist_low.contains(&item_artists);
            title_ok && artist_ok
        })
    }
}
