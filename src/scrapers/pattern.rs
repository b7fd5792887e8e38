use crate::error::ScrapeError;

/// Literal markers of the mietspiegel.jena.de page template.
///
/// Extraction relies on these exact strings. When the site changes its
/// template, add a new module next to `v1` instead of editing in place, so a
/// mismatch shows up as `MarkerNotFound` rather than as garbage values.
pub mod markers {
    pub mod v1 {
        /// Landing page: autocomplete list of all street names
        pub const STREETS_START: &str = "<script>$(function() {var availableTags = [";
        pub const STREETS_END: &str = "]; $( \"#strassenliste\" ).autocomplete({";

        /// Lookup endpoint: HTML-escaped `<select>` of house numbers
        pub const HOUSENUMBERS_START: &str =
            "&lt;select class=\"form-control\" name=\"nummer\"&gt;&lt;option&gt;";
        pub const HOUSENUMBERS_END: &str = "&lt;/option&gt;&lt;/select&gt;&lt;/div&gt;";
        pub const HOUSENUMBERS_SEPARATOR: &str = "&lt;/option&gt;&lt;option&gt;";

        /// Result page rows, in page order
        pub const LOCATION_QUALITY_START: &str = "<tr><td><b>Wohnlage</b></td><td>";
        pub const QUALITY_POINTS_START: &str = "<tr><td><b>Wohnwertpunkte</b></td><td>";
        pub const ROW_END: &str = "</td></tr>";
        pub const RENT_RANGE_START: &str = "<tr><td><b>ortsübliche Vergleichsmiete</b></td><td style=\"white-space: nowrap;\">&nbsp;";
        pub const RENT_RANGE_END: &str = "  €/m²</tr>";
        pub const RENT_UNIT: &str = "€/m²";
    }
}

/// Returns the text strictly between the first `start` at or after `from`
/// and the next `end` after it, plus the offset just past that `end`.
pub fn scrape<'a>(
    text: &'a str,
    start: &'static str,
    end: &'static str,
    from: usize,
) -> Result<(&'a str, usize), ScrapeError> {
    let tail = text.get(from..).ok_or(ScrapeError::MarkerNotFound(start))?;
    let content_start = tail
        .find(start)
        .map(|pos| from + pos + start.len())
        .ok_or(ScrapeError::MarkerNotFound(start))?;
    let content_end = text[content_start..]
        .find(end)
        .map(|pos| content_start + pos)
        .ok_or(ScrapeError::MarkerNotFound(end))?;

    Ok((&text[content_start..content_end], content_end + end.len()))
}
