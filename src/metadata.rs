use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::FormatError;
use crate::package::DocumentPackage;

/// Archive member holding user-defined document properties.
pub const CUSTOM_PROPERTIES_SUFFIX: &str = "custom.xml";

/// A single user-defined document property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    pub name: String,
    pub value: String,
}

/// Pulls the custom property pairs out of a document package. Packages
/// without a custom-properties part yield an empty list. Only the first
/// matching archive entry is read.
pub fn extract_properties(
    package: &mut DocumentPackage,
) -> Result<Vec<PropertyEntry>, FormatError> {
    let entry = package.find_entry(CUSTOM_PROPERTIES_SUFFIX)?;
    let Some((path, bytes)) = entry else {
        return Ok(Vec::new());
    };
    log::debug!("Reading document properties from {}", path);
    parse_properties(&bytes)
}

/// Parses a custom-properties XML part. Each `property` element carries
/// the property name in its `name` attribute and wraps a single typed
/// value node whose text is the property value.
pub fn parse_properties(bytes: &[u8]) -> Result<Vec<PropertyEntry>, FormatError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut properties = Vec::new();
    let mut current: Option<PropertyEntry> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref element) if element.local_name().as_ref() == b"property" => {
                current = Some(PropertyEntry {
                    name: attribute_value(element, b"name"),
                    value: String::new(),
                });
            }
            Event::Text(ref text) => {
                if let Some(entry) = current.as_mut() {
                    // First text node inside the property wins.
                    if entry.value.is_empty() {
                        entry.value = text.unescape()?.trim().to_string();
                    }
                }
            }
            Event::End(ref element) if element.local_name().as_ref() == b"property" => {
                if let Some(entry) = current.take() {
                    properties.push(entry);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(properties)
}

fn attribute_value(element: &BytesStart<'_>, name: &[u8]) -> String {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
        .unwrap_or_default()
}
