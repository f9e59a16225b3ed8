//! Minimal DASH manifest generation
//!
//! One period, one audio adaptation set, one representation per quality
//! rung. Segment naming follows `$RepresentationID$_$Number$.m4s` over
//! the same fixed-duration layout the HLS side uses.

use std::fmt::Write as _;

use resona_common::ladder::QualityVariant;

/// ISO 8601 duration for the MPD attributes (`PT200.0S`)
fn iso_duration(seconds: f64) -> String {
    format!("PT{seconds:.1}S")
}

/// Build the MPD document for a transcoded song
pub fn build_mpd(ladder: &[QualityVariant], media_seconds: f64, segment_seconds: u32) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        out,
        "<MPD xmlns=\"urn:mpeg:dash:schema:mpd:2011\" type=\"static\" \
         mediaPresentationDuration=\"{}\" profiles=\"urn:mpeg:dash:profile:isoff-main:2011\">",
        iso_duration(media_seconds)
    );
    let _ = writeln!(out, "  <Period duration=\"{}\">", iso_duration(media_seconds));
    out.push_str("    <AdaptationSet mimeType=\"audio/mp4\" segmentAlignment=\"true\">\n");
    let _ = writeln!(
        out,
        "      <SegmentTemplate media=\"$RepresentationID$_$Number$.m4s\" \
         initialization=\"$RepresentationID$_init.mp4\" duration=\"{segment_seconds}\" \
         startNumber=\"0\"/>"
    );
    for variant in ladder {
        let _ = writeln!(
            out,
            "      <Representation id=\"{}\" codecs=\"{}\" bandwidth=\"{}\"/>",
            variant.name,
            variant.format.codec_tag(),
            variant.bitrate
        );
    }
    out.push_str("    </AdaptationSet>\n");
    out.push_str("  </Period>\n");
    out.push_str("</MPD>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use resona_common::ladder::default_ladder;

    #[test]
    fn one_representation_per_rung() {
        let mpd = build_mpd(&default_ladder(), 200.0, 10);
        assert_eq!(mpd.matches("<Representation").count(), 4);
        assert!(mpd.contains("mediaPresentationDuration=\"PT200.0S\""));
        assert!(mpd.contains("media=\"$RepresentationID$_$Number$.m4s\""));
        assert!(mpd.contains("id=\"1411k\" codecs=\"fLaC\" bandwidth=\"1411000\""));
        assert!(mpd.contains("duration=\"10\""));
    }
}
