use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use thiserror::Error;

use crate::resolver::Candidate;

/// SEC-003: Maximum nesting depth for OPML outline elements.
const MAX_OPML_DEPTH: usize = 50;

#[derive(Debug, Error)]
pub enum OpmlError {
    /// SEC-003
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for OpmlError {
    fn from(e: quick_xml::Error) -> Self {
        OpmlError::XmlParse(e.to_string())
    }
}

/// One `<outline>` carrying an `xmlUrl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpmlFeed {
    /// `title`, else `text`, else the feed URL
    pub title: String,
    pub xml_url: String,
}

impl From<OpmlFeed> for Candidate {
    fn from(feed: OpmlFeed) -> Self {
        Candidate::found(feed.xml_url, Some(feed.title))
    }
}

/// Reads an OPML file and returns its feed outlines in document order.
///
/// Outlines whose `xmlUrl` is not an http(s) URL are skipped with a warning.
pub async fn parse(path: &Path) -> Result<Vec<OpmlFeed>, OpmlError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_opml_content(&content)
}

/// Parses OPML text. Folder outlines (no `xmlUrl`) are walked but not
/// returned, at any depth up to the nesting limit.
///
/// SEC-002: quick-xml 0.37 never expands `<!ENTITY>` declarations; only the
/// five predefined entities are decoded by `decode_and_unescape_value`.
pub fn parse_opml_content(content: &str) -> Result<Vec<OpmlFeed>, OpmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut feeds = Vec::new();
    let mut depth: usize = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                depth += 1;
                if depth > MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                }
                feeds.extend(outline_feed(&e, &reader)?);
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                feeds.extend(outline_feed(&e, &reader)?);
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
    }

    Ok(feeds)
}

fn outline_feed(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Option<OpmlFeed>, OpmlError> {
    let decoder = reader.decoder();
    let mut xml_url = None;
    let mut title = None;
    let mut text = None;

    for attr in e.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let value = || -> Result<String, OpmlError> {
            Ok(attr.decode_and_unescape_value(decoder)?.trim().to_owned())
        };
        match attr.key.as_ref() {
            b"xmlUrl" => xml_url = Some(value()?),
            b"title" => title = Some(value()?),
            b"text" => text = Some(value()?),
            _ => {}
        }
    }

    let Some(xml_url) = xml_url.filter(|u| !u.is_empty()) else {
        return Ok(None);
    };

    if !is_web_url(&xml_url) {
        tracing::warn!(url = %xml_url, "Skipping OPML outline with non-HTTP feed URL");
        return Ok(None);
    }

    let title = title
        .filter(|t| !t.is_empty())
        .or(text.filter(|t| !t.is_empty()))
        .unwrap_or_else(|| xml_url.clone());

    Ok(Some(OpmlFeed {
        title,
        xml_url,
    }))
}

fn is_web_url(s: &str) -> bool {
    url::Url::parse(s).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}
