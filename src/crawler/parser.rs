//! Record extraction from Explorer listing pages
//!
//! An Explorer page lists mixes as title links (`/w/YYYY-MM-DD_-_...`), each
//! followed by its metadata and tracklist. The page is flattened to text with
//! line breaks at block elements, remembering where every mix link starts;
//! the text between one mix link and the next is that mix's section.

use crate::crawler::fetcher::{FetchError, RawPage};
use crate::record::{RawRecord, Track, DURATION_KEY};
use crate::CrawlError;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

/// Characters of text scanned after a mix link
const SECTION_WINDOW: usize = 2000;

/// Fallback "Artist - Title" lines kept per mix
const MAX_FALLBACK_TRACKS: usize = 20;

const PLATFORMS: &[&str] = &["SoundCloud", "Mixcloud", "YouTube", "Spotify", "Apple Podcasts"];

/// Whole-entry placeholders that never make a track
const TRACK_PLACEHOLDERS: &[&str] = &[
    "...", "???", "?", "unknown", "n/a", "tba", "tbd", "---", "***", "id", "edit", "remix",
    "mix", "track", "untitled", "noname", "blank",
];

/// Artist or title values that carry no information
const COMPONENT_PLACEHOLDERS: &[&str] = &[
    "?", "??", "???", "...", "unknown", "n/a", "tba", "tbd", "---", "***", "blank",
    "untitled", "noname", "id", "edit", "remix", "mix", "track",
];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "footer", "form",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre",
    "section", "table", "tbody", "td", "th", "thead", "tr", "ul",
];

/// Records found on one page and whether the listing continues
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    pub records: Vec<RawRecord>,
    pub has_next_page: bool,
}

/// Turns a fetched page into raw records. Pure; a parse failure is permanent.
pub trait RecordExtractor: Send + Sync {
    fn extract_records(&self, page: &RawPage) -> Result<ExtractedPage, FetchError>;
}

/// A mix title link and where its section starts in the flattened text
#[derive(Debug)]
struct MixLink {
    href: String,
    title: String,
    start: usize,
}

struct Patterns {
    mix_link: Regex,
    url_date: Regex,
    title_date: Regex,
    leading_date: Regex,
    duration: Regex,
    file_size: Regex,
    bitrate: Regex,
    offset: Regex,
    timestamped: Regex,
    simple_cue: Regex,
    numbered: Regex,
    artist_title: Regex,
    label: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            mix_link: Regex::new(r"^/w/\d{4}-\d{2}-\d{2}_-_")?,
            url_date: Regex::new(r"/w/(\d{4}-\d{2}-\d{2})_")?,
            title_date: Regex::new(r"(\d{4}-\d{2}-\d{2})")?,
            leading_date: Regex::new(r"^\s*\d{4}-\d{2}-\d{2}\s+-\s+")?,
            // Bracketed values are track cues, not the running time
            duration: Regex::new(r"(?:^|[^\[\d:])(\d{1,2}:\d{2}:\d{2})(?:$|[^\]\d:])")?,
            file_size: Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*MB\b")?,
            bitrate: Regex::new(r"(?i)\b(\d{2,3})\s*kbps\b")?,
            offset: Regex::new(r"[?&]offset=(\d+)")?,
            timestamped: Regex::new(r"\[(\d{1,2}:\d{2}(?::\d{2})?)\]\s*([^\[\n]+)")?,
            simple_cue: Regex::new(r"\[([0-9?]+)\]\s*([^\[\n]+)")?,
            numbered: Regex::new(r"(?m)^[ \t]*(\d+)\.?[ \t]+(.+)$")?,
            artist_title: Regex::new(r"(?m)^[ \t]*([A-Za-z0-9][^\n]*?)[ \t]+-[ \t]+(.+)$")?,
            label: Regex::new(r"\s*\[[^\]]+\]")?,
        })
    }
}

/// Extracts mixes from MixesDB Explorer listing pages
pub struct MixesDbExtractor {
    base_url: Url,
    page_size: usize,
    patterns: Patterns,
    anchors: Selector,
    next_control: Selector,
}

impl MixesDbExtractor {
    /// # Arguments
    ///
    /// * `base_url` - Site root used to absolutize mix links
    /// * `page_size` - Records per listing page; a full page implies more may follow
    pub fn new(base_url: &str, page_size: usize) -> Result<Self, CrawlError> {
        let selector = |css: &str| Selector::parse(css).map_err(|e| CrawlError::Selector(format!("{css}: {e}")));

        Ok(Self {
            base_url: Url::parse(base_url)?,
            page_size: page_size.max(1),
            patterns: Patterns::compile()?,
            anchors: selector("a[href]")?,
            next_control: selector("a[rel~=\"next\"], link[rel~=\"next\"]")?,
        })
    }

    /// Flattens the body to text and collects mix links with their offsets
    fn flatten(&self, document: &Html) -> (String, Vec<MixLink>) {
        let mut text = String::new();
        let mut links = Vec::new();
        self.walk(document.root_element(), &mut text, &mut links);
        (text, links)
    }

    fn walk(&self, element: ElementRef<'_>, text: &mut String, links: &mut Vec<MixLink>) {
        for child in element.children() {
            if let Some(fragment) = child.value().as_text() {
                text.push_str(fragment);
                continue;
            }
            let Some(child) = ElementRef::wrap(child) else {
                continue;
            };

            let name = child.value().name();
            if matches!(name, "script" | "style" | "noscript" | "head") {
                continue;
            }
            if name == "br" {
                text.push('\n');
                continue;
            }

            if name == "a" {
                if let Some(href) = child.value().attr("href") {
                    if self.patterns.mix_link.is_match(href) && !links.iter().any(|l: &MixLink| l.href == href) {
                        let title = child.text().collect::<String>().trim().to_string();
                        if !title.is_empty() {
                            links.push(MixLink {
                                href: href.to_string(),
                                title,
                                start: text.len(),
                            });
                        }
                    }
                }
            }

            let block = BLOCK_TAGS.contains(&name);
            if block {
                break_line(text);
            }
            self.walk(child, text, links);
            if block {
                break_line(text);
            }
        }
    }

    fn build_record(&self, link: &MixLink, section: &str) -> Option<RawRecord> {
        let url = match self.base_url.join(&link.href) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::debug!("Skipping mix link {}: {}", link.href, e);
                return None;
            }
        };

        // The section opens with the title itself; details follow it
        let details = section
            .find(link.title.as_str())
            .map(|pos| &section[pos + link.title.len()..])
            .unwrap_or(section);

        let tracks = self.extract_tracklist(details);

        let mut metadata = serde_json::Map::new();
        if let Some(duration) = self.capture(&self.patterns.duration, details) {
            metadata.insert(DURATION_KEY.to_string(), Value::from(duration));
        }
        if let Some(size) = self.capture(&self.patterns.file_size, details) {
            metadata.insert("file_size".to_string(), Value::from(format!("{size} MB")));
        }
        if let Some(bitrate) = self.capture(&self.patterns.bitrate, details) {
            metadata.insert("bitrate".to_string(), Value::from(format!("{bitrate} kbps")));
        }
        let platforms: Vec<Value> = PLATFORMS
            .iter()
            .filter(|p| details.contains(*p))
            .map(|p| Value::from(*p))
            .collect();
        if !platforms.is_empty() {
            metadata.insert("platforms".to_string(), Value::Array(platforms));
        }
        metadata.insert("track_count".to_string(), Value::from(tracks.len()));

        Some(RawRecord {
            title: link.title.clone(),
            url,
            author: self.author_from_title(&link.title),
            date: self.date_from(&link.href, &link.title),
            genres: Default::default(),
            tracks,
            metadata: metadata.into_iter().collect(),
        })
    }

    fn capture(&self, pattern: &Regex, text: &str) -> Option<String> {
        pattern
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn date_from(&self, href: &str, title: &str) -> Option<NaiveDate> {
        self.capture(&self.patterns.url_date, href)
            .or_else(|| self.capture(&self.patterns.title_date, title))
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
    }

    /// "2024-05-01 - Ben Klock @ Berghain" -> "Ben Klock"
    fn author_from_title(&self, title: &str) -> Option<String> {
        let rest = self.patterns.leading_date.replace(title, "");
        let author = rest
            .split(" @ ")
            .next()
            .and_then(|s| s.split(" - ").next())
            .unwrap_or("")
            .trim();
        (!author.is_empty()).then(|| author.to_string())
    }

    /// Tries each tracklist layout in turn; the first that yields tracks wins
    fn extract_tracklist(&self, text: &str) -> Vec<Track> {
        let cued = |pattern: &Regex| -> Vec<(Option<String>, String)> {
            pattern
                .captures_iter(text)
                .map(|c| (Some(c[1].to_string()), c[2].trim().to_string()))
                .collect()
        };

        let layouts: [Vec<(Option<String>, String)>; 4] = [
            cued(&self.patterns.timestamped),
            cued(&self.patterns.simple_cue),
            self.patterns
                .numbered
                .captures_iter(text)
                .map(|c| (None, c[2].trim().to_string()))
                .collect(),
            self.patterns
                .artist_title
                .captures_iter(text)
                .take(MAX_FALLBACK_TRACKS)
                .map(|c| (None, format!("{} - {}", c[1].trim(), c[2].trim())))
                .collect(),
        ];

        for candidates in layouts {
            let mut tracks = Vec::new();
            for (cue, info) in candidates {
                if let Some((artist, title)) = self.parse_track_info(&info) {
                    tracks.push(Track {
                        position: tracks.len() as u32 + 1,
                        title: Some(title),
                        artist,
                        start_time: cue,
                    });
                }
            }
            if !tracks.is_empty() {
                return tracks;
            }
        }
        Vec::new()
    }

    /// Splits one tracklist entry into (artist, title), dropping placeholders
    fn parse_track_info(&self, info: &str) -> Option<(Option<String>, String)> {
        let info = info.trim();
        let lower = info.to_lowercase();

        if TRACK_PLACEHOLDERS.contains(&lower.as_str()) || info.chars().count() < 3 {
            return None;
        }
        if info.chars().all(|c| c.is_ascii_digit() || c.is_whitespace() || ".-_".contains(c))
            || is_repeated_char(info)
        {
            return None;
        }

        match info.split_once(" - ") {
            Some((artist, title)) => {
                let artist = artist.trim();
                let title = self.patterns.label.replace_all(title, "");
                let title = title.trim();
                (is_valid_component(artist) && is_valid_component(title))
                    .then(|| (Some(artist.to_string()), title.to_string()))
            }
            None => is_valid_standalone_title(info).then(|| (None, info.to_string())),
        }
    }

    fn has_next_page(&self, document: &Html, page: &RawPage, mix_links: usize) -> bool {
        if mix_links == 0 {
            return false;
        }
        if mix_links >= self.page_size {
            return true;
        }
        if document.select(&self.next_control).next().is_some() {
            return true;
        }
        document.select(&self.anchors).any(|a| {
            a.value()
                .attr("href")
                .and_then(|href| self.capture(&self.patterns.offset, href))
                .and_then(|offset| offset.parse::<usize>().ok())
                .is_some_and(|offset| offset > page.offset)
        })
    }
}

impl RecordExtractor for MixesDbExtractor {
    fn extract_records(&self, page: &RawPage) -> Result<ExtractedPage, FetchError> {
        if page.body.trim().is_empty() {
            return Err(FetchError::Extraction {
                url: page.url.clone(),
                message: "empty page body".to_string(),
            });
        }

        let document = Html::parse_document(&page.body);
        if document.select(&self.anchors).next().is_none() {
            return Err(FetchError::Extraction {
                url: page.url.clone(),
                message: "no links found; not an Explorer listing".to_string(),
            });
        }

        let (text, links) = self.flatten(&document);

        let records: Vec<RawRecord> = links
            .iter()
            .enumerate()
            .filter_map(|(i, link)| {
                let next_start = links.get(i + 1).map_or(text.len(), |next| next.start);
                let end = floor_char_boundary(&text, (link.start + SECTION_WINDOW).min(next_start));
                self.build_record(link, &text[link.start..end])
            })
            .collect();

        let has_next_page = self.has_next_page(&document, page, links.len());

        tracing::debug!(
            "Page {}: {} mix links, {} records, more pages: {}",
            page.page_number,
            links.len(),
            records.len(),
            has_next_page
        );

        Ok(ExtractedPage {
            records,
            has_next_page,
        })
    }
}

fn break_line(text: &mut String) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn is_repeated_char(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => true,
    }
}

fn is_valid_component(component: &str) -> bool {
    let component = component.trim().to_lowercase();

    if component.chars().count() < 2 || COMPONENT_PLACEHOLDERS.contains(&component.as_str()) {
        return false;
    }
    if component
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace() || ".-_()[]".contains(c))
    {
        return false;
    }
    !is_repeated_char(&component)
}

/// A title with no artist must look like a real title on its own
fn is_valid_standalone_title(title: &str) -> bool {
    let title = title.trim();
    if title.chars().count() < 5 || !is_valid_component(title) {
        return false;
    }
    if !title.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    title.split_whitespace().count() > 1 || title.chars().count() >= 8
}
