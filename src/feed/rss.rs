use super::discovery::resolve_url;
use super::extract::ItemMap;
use crate::util::strip_control_chars;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;
use url::Url;

/// Default cap on items in a synthesized feed.
pub const DEFAULT_MAX_ITEMS: usize = 10;

/// MIME type declared on every enclosure; the real image type is not probed.
const ENCLOSURE_TYPE: &str = "image/jpeg";

/// Errors that can occur while writing a feed document.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("no items to synthesize")]
    NoItems,
    #[error("failed to write feed XML: {0}")]
    Write(String),
    #[error("feed XML is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Builds an RSS 2.0 document from scraped items.
///
/// The channel title and link carry `source`, the URL exactly as requested.
/// `page_url` is the parsed page address that image paths resolve against.
/// Takes at most `max_items` items in insertion order. Titles and
/// descriptions go in CDATA sections; links, GUIDs and enclosure URLs are
/// entity-escaped. Characters that are illegal in XML are dropped from all
/// scraped text.
///
/// # Errors
///
/// Returns [`SynthesisError::NoItems`] for an empty map, or a write error if
/// the XML writer fails.
pub fn synthesize(
    source: &str,
    page_url: &Url,
    items: &ItemMap,
    max_items: usize,
) -> Result<String, SynthesisError> {
    if items.is_empty() {
        return Err(SynthesisError::NoItems);
    }

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    emit(&mut writer, Event::Start(rss))?;
    emit(&mut writer, Event::Start(BytesStart::new("channel")))?;

    let source = strip_control_chars(source);
    write_text_element(&mut writer, "title", &format!("Generated RSS for {source}"))?;
    write_text_element(&mut writer, "link", &source)?;
    write_text_element(&mut writer, "description", "Auto-generated feed")?;

    for item in items.iter().take(max_items) {
        emit(&mut writer, Event::Start(BytesStart::new("item")))?;
        write_cdata_element(&mut writer, "title", &strip_control_chars(&item.title))?;
        write_text_element(&mut writer, "link", item.link.as_str())?;
        write_text_element(&mut writer, "guid", item.link.as_str())?;
        write_cdata_element(
            &mut writer,
            "description",
            &strip_control_chars(&item.description),
        )?;

        if let Some(image) = item.image.as_deref().and_then(|src| resolve_url(src, page_url)) {
            let mut enclosure = BytesStart::new("enclosure");
            enclosure.push_attribute(("url", image.as_str()));
            enclosure.push_attribute(("type", ENCLOSURE_TYPE));
            emit(&mut writer, Event::Empty(enclosure))?;
        }

        emit(&mut writer, Event::End(BytesEnd::new("item")))?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("channel")))?;
    emit(&mut writer, Event::End(BytesEnd::new("rss")))?;

    let mut document = String::from_utf8(writer.into_inner())?;
    document.push('\n');
    Ok(document)
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), SynthesisError> {
    writer
        .write_event(event)
        .map_err(|e| SynthesisError::Write(e.to_string()))
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
) -> Result<(), SynthesisError> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn write_cdata_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
) -> Result<(), SynthesisError> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    for segment in cdata_segments(text) {
        emit(writer, Event::CData(BytesCData::new(segment)))?;
    }
    emit(writer, Event::End(BytesEnd::new(name)))
}

/// Splits text so that no segment contains `]]>`.
///
/// Each `]]>` is cut after its `]]`, so the `>` opens the next CDATA section.
fn cdata_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find("]]>") {
        segments.push(&rest[..pos + 2]);
        rest = &rest[pos + 2..];
    }
    segments.push(rest);
    segments
}
