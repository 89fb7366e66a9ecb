use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::debug;

use super::{FetchError, ItemRecord};

/// Decode an RSS 2.0 / RSS 1.0 / Atom document into items
///
/// Items without a title are dropped. Text and CDATA content are both accepted.
pub fn parse_feed(xml: &[u8]) -> Result<Vec<ItemRecord>, FetchError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut buf = Vec::new();

    let mut saw_root = false;
    let mut current_item: Option<ItemBuilder> = None;
    let mut current_element = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = element_name(&e);
                if is_feed_root(&name) {
                    saw_root = true;
                }

                if name == "item" || name == "entry" {
                    current_item = Some(ItemBuilder::default());
                } else if let Some(ref mut item) = current_item
                    && name == "link"
                {
                    item.take_link_href(&e);
                }
                current_element = name;
            }
            Ok(Event::Empty(e)) => {
                // Atom: <link href="..." rel="alternate"/>
                if let Some(ref mut item) = current_item
                    && element_name(&e) == "link"
                {
                    item.take_link_href(&e);
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if (name == "item" || name == "entry")
                    && let Some(builder) = current_item.take()
                    && let Some(item) = builder.build()
                {
                    items.push(item);
                }
                current_element.clear();
            }
            Ok(Event::Text(e)) => {
                if let Some(ref mut item) = current_item {
                    let text = e
                        .unescape()
                        .map_err(|e| FetchError::Parse(format!("XML parse error: {}", e)))?;
                    item.push_text(&current_element, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(ref mut item) = current_item {
                    let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                    item.push_text(&current_element, &text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FetchError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(FetchError::Parse("not an RSS or Atom document".to_string()));
    }

    debug!(count = items.len(), "parse_feed: decoded items");
    Ok(items)
}

/// Parse a feed publication date
///
/// RFC 2822 (which covers RSS's RFC 1123Z form) is tried first, then RFC 3339
/// as used by Atom. Unparseable text yields `None`.
pub fn parse_published_at(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(text)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

fn is_feed_root(name: &str) -> bool {
    matches!(name, "rss" | "feed" | "rdf:RDF" | "RDF")
}

#[derive(Default)]
struct ItemBuilder {
    title: String,
    link: String,
    description: String,
    /// Element the description text came from
    description_from: String,
    published_at: String,
    updated: String,
}

impl ItemBuilder {
    fn push_text(&mut self, element: &str, text: &str) {
        let field = match element {
            "title" => &mut self.title,
            "link" => &mut self.link,
            "description" | "summary" | "content" | "content:encoded" => {
                // First description-like element wins, except that <description> replaces any other
                if !self.description_from.is_empty() && self.description_from != element {
                    if element != "description" {
                        return;
                    }
                    self.description.clear();
                }
                self.description_from = element.to_string();
                &mut self.description
            }
            "pubDate" | "published" | "dc:date" => &mut self.published_at,
            "updated" => &mut self.updated,
            _ => return,
        };
        field.push_str(text);
    }

    fn take_link_href(&mut self, e: &BytesStart<'_>) {
        if !self.link.is_empty() {
            return;
        }
        let mut href = None;
        let mut rel = None;
        for attr in e.attributes().flatten() {
            let value = String::from_utf8_lossy(&attr.value).to_string();
            match attr.key.as_ref() {
                b"href" => href = Some(value),
                b"rel" => rel = Some(value),
                _ => {}
            }
        }
        if let Some(href) = href
            && rel.as_deref().is_none_or(|r| r == "alternate")
        {
            self.link = href;
        }
    }

    fn build(self) -> Option<ItemRecord> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return None;
        }
        let published_at = if self.published_at.trim().is_empty() {
            self.updated
        } else {
            self.published_at
        };
        Some(ItemRecord {
            title,
            link: self.link.trim().to_string(),
            description: self.description.trim().to_string(),
            published_at_text: published_at.trim().to_string(),
        })
    }
}
