//! Grammar B: XML metadata, leaf elements keyed by element path

use quick_xml::events::Event;
use quick_xml::Reader;

use super::value::coerce_value;
use super::MetadataDocument;
use crate::errors::{FormatError, FormatResult};

struct OpenElement {
    name: String,
    has_children: bool,
}

fn element_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn key_for(stack: &[OpenElement], leaf: &str) -> String {
    stack
        .iter()
        .map(|element| element.name.as_str())
        .chain(std::iter::once(leaf))
        .collect::<Vec<_>>()
        .join(".")
}

/// Flatten an XML document into leaf paths
///
/// The root element is part of every path. Namespace prefixes are dropped
/// and elements with children contribute no value of their own.
pub fn parse(content: &str) -> FormatResult<MetadataDocument> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut document = MetadataDocument::new();
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut text = String::new();

    let xml_error = |reader: &Reader<&[u8]>, reason: String| FormatError::Xml {
        position: reader.buffer_position() as u64,
        reason,
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
                stack.push(OpenElement {
                    name: element_name(element.local_name().as_ref()),
                    has_children: false,
                });
                text.clear();
            }
            Ok(Event::Empty(element)) => {
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
                let name = element_name(element.local_name().as_ref());
                document.insert(key_for(&stack, &name), coerce_value(""));
            }
            Ok(Event::Text(content)) => {
                let unescaped = content
                    .unescape()
                    .map_err(|e| xml_error(&reader, e.to_string()))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(content)) => {
                text.push_str(&String::from_utf8_lossy(&content.into_inner()));
            }
            Ok(Event::End(_)) => {
                let Some(element) = stack.pop() else {
                    return Err(xml_error(&reader, "unexpected closing tag".to_string()));
                };
                if !element.has_children {
                    document.insert(key_for(&stack, &element.name), coerce_value(&text));
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_error(&reader, e.to_string())),
        }
    }

    if let Some(open) = stack.last() {
        return Err(xml_error(&reader, format!("unclosed element {}", open.name)));
    }

    Ok(document)
}
