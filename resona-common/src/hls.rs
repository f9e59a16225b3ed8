//! HLS playlist model: emitted by the transcoder, parsed by the player
//!
//! Both sides share the same line grammar, so the model round-trips:
//!
//! ```text
//! #EXTM3U
//! #EXT-X-VERSION:3
//! #EXT-X-STREAM-INF:BANDWIDTH=320000,CODECS="mp4a.40.2"
//! 320k.m3u8
//! ```

use std::fmt::Write as _;

use thiserror::Error;

/// Errors raised while parsing playlist text
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Playlist does not start with `#EXTM3U`
    #[error("missing #EXTM3U header")]
    MissingHeader,

    /// A tag could not be parsed
    #[error("malformed manifest line: {0}")]
    Malformed(String),

    /// A stream/segment tag was not followed by a URI line
    #[error("dangling tag without URI: {0}")]
    DanglingTag(String),

    /// Master playlist declares no variants
    #[error("master playlist lists no variants")]
    EmptyLadder,
}

/// One variant reference in a master playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRef {
    /// Advertised peak bandwidth in bits per second
    pub bandwidth: u64,
    /// RFC 6381 codec tag
    pub codecs: String,
    /// Relative URI of the variant's media manifest
    pub uri: String,
}

impl VariantRef {
    /// Rung name derived from the media-manifest URI (`320k.m3u8` → `320k`)
    pub fn name(&self) -> &str {
        let base = self.uri.rsplit('/').next().unwrap_or(&self.uri);
        base.strip_suffix(".m3u8").unwrap_or(base)
    }
}

/// Parsed or generated master playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterPlaylist {
    /// Variants in ladder order (the order they appear in the manifest)
    pub variants: Vec<VariantRef>,
}

impl MasterPlaylist {
    /// Parse master playlist text.
    ///
    /// Unknown tags are skipped; `#EXT-X-STREAM-INF` must be immediately
    /// followed by a URI line.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        if lines.next() != Some("#EXTM3U") {
            return Err(ManifestError::MissingHeader);
        }

        let mut variants = Vec::new();
        let mut pending: Option<(u64, String)> = None;

        for line in lines {
            if let Some(attrs) = line.strip_prefix("#EXT-X-STREAM-INF:") {
                if let Some((_, tag)) = pending.take() {
                    return Err(ManifestError::DanglingTag(tag));
                }
                pending = Some(parse_stream_inf(attrs)?);
            } else if line.starts_with('#') {
                continue;
            } else if let Some((bandwidth, codecs)) = pending.take() {
                variants.push(VariantRef {
                    bandwidth,
                    codecs,
                    uri: line.to_string(),
                });
            }
            // Bare URI without a preceding STREAM-INF tag is ignored
        }

        if let Some((_, tag)) = pending {
            return Err(ManifestError::DanglingTag(tag));
        }
        if variants.is_empty() {
            return Err(ManifestError::EmptyLadder);
        }
        Ok(Self { variants })
    }

    /// Emit master playlist text
    pub fn to_m3u8(&self) -> String {
        let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        for v in &self.variants {
            let _ = writeln!(
                out,
                "#EXT-X-STREAM-INF:BANDWIDTH={},CODECS=\"{}\"",
                v.bandwidth, v.codecs
            );
            let _ = writeln!(out, "{}", v.uri);
        }
        out
    }
}

fn parse_stream_inf(attrs: &str) -> Result<(u64, String), ManifestError> {
    let mut bandwidth = None;
    let mut codecs = String::new();
    for attr in split_attributes(attrs) {
        let Some((key, value)) = attr.split_once('=') else {
            return Err(ManifestError::Malformed(attr.to_string()));
        };
        match key {
            "BANDWIDTH" => {
                bandwidth = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| ManifestError::Malformed(attr.to_string()))?,
                );
            }
            "CODECS" => codecs = value.trim_matches('"').to_string(),
            _ => {}
        }
    }
    let bandwidth =
        bandwidth.ok_or_else(|| ManifestError::Malformed("missing BANDWIDTH".to_string()))?;
    Ok((bandwidth, codecs))
}

/// Split an attribute list on commas outside quoted values
fn split_attributes(attrs: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in attrs.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push(attrs[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(attrs[start..].trim());
    out
}

/// One segment entry in a variant's media playlist
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRef {
    /// Segment duration in seconds
    pub duration: f64,
    /// Relative URI of the segment file
    pub uri: String,
}

/// Parsed or generated per-variant media playlist
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    /// Target segment duration in whole seconds
    pub target_duration: u32,
    /// Segments in playback order
    pub segments: Vec<SegmentRef>,
    /// Whether the playlist carries the VOD end marker
    pub end_list: bool,
}

impl MediaPlaylist {
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        if lines.next() != Some("#EXTM3U") {
            return Err(ManifestError::MissingHeader);
        }

        let mut target_duration = 0;
        let mut segments = Vec::new();
        let mut end_list = false;
        let mut pending: Option<f64> = None;

        for line in lines {
            if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                target_duration = value
                    .parse::<u32>()
                    .map_err(|_| ManifestError::Malformed(line.to_string()))?;
            } else if let Some(value) = line.strip_prefix("#EXTINF:") {
                let duration = value
                    .split(',')
                    .next()
                    .and_then(|d| d.parse::<f64>().ok())
                    .ok_or_else(|| ManifestError::Malformed(line.to_string()))?;
                pending = Some(duration);
            } else if line == "#EXT-X-ENDLIST" {
                end_list = true;
            } else if line.starts_with('#') {
                continue;
            } else if let Some(duration) = pending.take() {
                segments.push(SegmentRef {
                    duration,
                    uri: line.to_string(),
                });
            }
        }

        if let Some(d) = pending {
            return Err(ManifestError::DanglingTag(format!("#EXTINF:{d}")));
        }
        Ok(Self {
            target_duration,
            segments,
            end_list,
        })
    }

    pub fn to_m3u8(&self) -> String {
        let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", self.target_duration);
        out.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
        for seg in &self.segments {
            let _ = writeln!(out, "#EXTINF:{:.6},", seg.duration);
            let _ = writeln!(out, "{}", seg.uri);
        }
        if self.end_list {
            out.push_str("#EXT-X-ENDLIST\n");
        }
        out
    }

    /// Total media duration in seconds
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}
