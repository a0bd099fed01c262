use crate::error::{Result, VastError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;

/// Name of the synthetic element every document is wrapped in. Ad servers may
/// append elements such as `MP_TRACKING_URL` as siblings of `<VAST>`.
const ROOT_TAG: &str = "VastDocumentRoot";

/// An element of a parsed XML document.
///
/// Text and CDATA content directly under the element are coalesced into
/// `text`; child elements keep document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

/// Parse a VAST response into a node tree rooted at a synthetic element.
pub fn parse_document(xml: &str) -> Result<XmlNode> {
    let body = strip_processing_instruction(xml);
    let wrapped = format!("<{ROOT_TAG}>{body}</{ROOT_TAG}>");

    let mut reader = Reader::from_str(&wrapped);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                stack.push(node_from_start(e));
            }
            Ok(Event::Empty(ref e)) => {
                let node = node_from_start(e);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Err(VastError::Other("Element outside of document root".to_string())),
                }
            }
            Ok(Event::End(_)) => {
                let mut node = stack
                    .pop()
                    .ok_or_else(|| VastError::Other("Unbalanced end tag".to_string()))?;
                node.text = node.text.trim().to_string();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(current) = stack.last_mut() {
                    let text = e
                        .unescape()
                        .unwrap_or_else(|_| Cow::Owned(String::from_utf8_lossy(e).into_owned()));
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(VastError::XmlParseError(e)),
            _ => (),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(VastError::Other("Unexpected end of file".to_string()));
    }
    root.ok_or_else(|| VastError::MissingField("document root".to_string()))
}

/// Drop a leading `<?xml ...?>` declaration; it breaks parsing once the
/// document is nested inside the synthetic root.
fn strip_processing_instruction(xml: &str) -> Cow<'_, str> {
    if let Some(start) = xml.find("<?") {
        if let Some(len) = xml[start..].find("?>") {
            let mut stripped = String::with_capacity(xml.len());
            stripped.push_str(&xml[..start]);
            stripped.push_str(&xml[start + len + 2..]);
            return Cow::Owned(stripped);
        }
    }
    Cow::Borrowed(xml)
}

fn node_from_start(start: &BytesStart) -> XmlNode {
    let mut node = XmlNode {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..XmlNode::default()
    };

    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        node.attributes.push((key, value));
    }

    node
}

impl XmlNode {
    pub fn first_child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Children named `name` whose `attribute` equals one of `values`.
    pub fn children_with_attribute<'a, 'v>(
        &'a self,
        name: &'v str,
        attribute: &'v str,
        values: &'v [&'v str],
    ) -> impl Iterator<Item = &'a XmlNode> {
        self.children_named(name).filter(move |child| {
            child
                .attribute(attribute)
                .is_some_and(|value| values.contains(&value))
        })
    }

    /// All descendants named `name`, in document order.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a XmlNode> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlNode>) {
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            child.collect_descendants(name, found);
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Integer attribute; absent or malformed values both come back as `None`.
    pub fn attribute_as_int(&self, key: &str) -> Option<i32> {
        let raw = self.attribute(key)?;
        match raw.trim().parse::<i32>() {
            Ok(value) => Some(value),
            Err(_) => {
                log::debug!("Ignoring malformed integer attribute {key}=\"{raw}\"");
                None
            }
        }
    }

    /// Trimmed text content, `None` when empty.
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        if text.is_empty() { None } else { Some(text) }
    }

    /// Text of the first descendant named `name`.
    pub fn first_descendant_text(&self, name: &str) -> Option<&str> {
        self.descendants_named(name).into_iter().find_map(XmlNode::text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraps_siblings_of_vast_in_root() {
        let root = parse_document(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><VAST version=\"3.0\"></VAST><MP_TRACKING_URL>https://mp</MP_TRACKING_URL>",
        )
        .unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].attribute("version"), Some("3.0"));
        assert_eq!(root.children[1].text(), Some("https://mp"));
    }

    #[test]
    fn test_coalesces_cdata_and_trims() {
        let root = parse_document("<Impression>  <![CDATA[ https://a?b=1&c=2 ]]>  </Impression>").unwrap();
        assert_eq!(root.children[0].text(), Some("https://a?b=1&c=2"));
    }

    #[test]
    fn test_malformed_integer_attribute_is_none() {
        let root = parse_document("<Icon width=\"abc\" height=\"12\"/>").unwrap();
        let icon = &root.children[0];
        assert_eq!(icon.attribute_as_int("width"), None);
        assert_eq!(icon.attribute_as_int("height"), Some(12));
        assert_eq!(icon.attribute_as_int("offset"), None);
    }

    #[test]
    fn test_unbalanced_document_fails() {
        assert!(parse_document("<VAST><Ad></VAST>").is_err());
    }

    #[test]
    fn test_descendants_in_document_order() {
        let root = parse_document("<a><Ad id=\"1\"><b><Ad id=\"2\"/></b></Ad><Ad id=\"3\"/></a>").unwrap();
        let ids: Vec<_> = root
            .descendants_named("Ad")
            .into_iter()
            .filter_map(|n| n.attribute("id"))
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
