//! Minimal element tree built from quick-xml events
//!
//! TMX and TSX documents are small, so they are read fully into a tree
//! before being interpreted.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("bad attribute on <{element}>: {message}")]
    Attribute { element: String, message: String },

    #[error("document is not valid UTF-8")]
    Utf8,

    #[error("unexpected closing tag </{0}>")]
    Unbalanced(String),

    #[error("document has no root element")]
    Empty,
}

/// One element with its attributes, child elements and text content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenated text and CDATA directly inside this element, trimmed
    pub text: String,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First child element called `name`
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Parse a whole document and return its root element
pub fn parse_document(text: &str) -> Result<Element, XmlError> {
    // Text is trimmed per element on close; trimming each event would eat
    // the spaces around entity references
    let mut reader = Reader::from_str(text);

    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(open(&start)?),
            Ok(Event::Empty(start)) => {
                let element = open(&start)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(end)) => {
                let Some(element) = stack.pop() else {
                    let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    return Err(XmlError::Unbalanced(name));
                };
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(text)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(utf8(&text)?);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(utf8(&data)?);
                }
            }
            Ok(Event::GeneralRef(reference)) => {
                if let Some(top) = stack.last_mut() {
                    let resolved = resolve_reference(&reference).map_err(|message| {
                        XmlError::Syntax {
                            position: reader.buffer_position() as u64,
                            message,
                        }
                    })?;
                    top.text.push_str(&resolved);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(XmlError::Syntax {
                    position: reader.error_position() as u64,
                    message: e.to_string(),
                })
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Syntax {
            position: text.len() as u64,
            message: format!("<{}> is never closed", open.name),
        });
    }
    root.ok_or(XmlError::Empty)
}

fn open(start: &BytesStart<'_>) -> Result<Element, XmlError> {
    let name = utf8(start.name().as_ref())?.to_string();
    let mut attrs = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Attribute {
            element: name.clone(),
            message: e.to_string(),
        })?;
        let key = utf8(attr.key.as_ref())?.to_string();
        let value = unescape(utf8(&attr.value)?)
            .map_err(|e| XmlError::Attribute {
                element: name.clone(),
                message: format!("{}: {}", key, e),
            })?
            .into_owned();
        attrs.push((key, value));
    }

    Ok(Element {
        name,
        attrs,
        ..Element::default()
    })
}

/// Expand `&name;` or `&#NN;` found in element text
fn resolve_reference(reference: &BytesRef<'_>) -> Result<String, String> {
    let name = std::str::from_utf8(reference).map_err(|e| e.to_string())?;
    unescape(&format!("&{};", name))
        .map(|resolved| resolved.into_owned())
        .map_err(|e| e.to_string())
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, mut element: Element) {
    let trimmed = element.text.trim();
    if trimmed.len() != element.text.len() {
        element.text = trimmed.to_string();
    }
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, XmlError> {
    std::str::from_utf8(bytes).map_err(|_| XmlError::Utf8)
}
