use crate::dom::{Document, NodeId, SyntheticEvent};
use crate::selector::SelectorError;

/// How an element holds its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditableKind {
    /// `<input>` / `<textarea>`: text lives in the control's value.
    TextControl,
    /// `contenteditable` element: text lives in its text content.
    EditableRegion,
}

/// Destination of simulated keystrokes.
pub trait TypingTarget {
    fn kind(&self) -> EditableKind;

    /// Whether the destination can still receive input (e.g. still attached).
    fn is_available(&self) -> bool;

    fn value(&self) -> String;

    fn set_value(&mut self, value: &str);

    fn append_char(&mut self, c: char);

    fn dispatch(&mut self, event: SyntheticEvent);
}

/// An editable element of a [`Document`].
#[derive(Debug)]
pub struct ElementTarget<'a> {
    doc: &'a mut Document,
    node: NodeId,
    kind: EditableKind,
}

impl<'a> ElementTarget<'a> {
    /// `None` when `node` is neither a text control nor an editable region.
    pub fn new(doc: &'a mut Document, node: NodeId) -> Option<Self> {
        let el = doc.element(node)?;
        let kind = if el.is_text_control() {
            EditableKind::TextControl
        } else if el.is_editable_region() {
            EditableKind::EditableRegion
        } else {
            return None;
        };
        Some(Self { doc, node, kind })
    }

    /// Focus and click the element, as a user would before typing.
    pub fn activate(&mut self) {
        self.dispatch(SyntheticEvent::Focus);
        self.dispatch(SyntheticEvent::Click);
    }
}

impl TypingTarget for ElementTarget<'_> {
    fn kind(&self) -> EditableKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.doc.is_attached(self.node)
    }

    fn value(&self) -> String {
        match self.kind {
            EditableKind::TextControl => self
                .doc
                .element(self.node)
                .and_then(|el| el.value.clone())
                .unwrap_or_default(),
            EditableKind::EditableRegion => self.doc.text_content(self.node),
        }
    }

    fn set_value(&mut self, value: &str) {
        match self.kind {
            EditableKind::TextControl => {
                if let Some(el) = self.doc.element_mut(self.node) {
                    el.value = Some(value.to_string());
                }
            }
            EditableKind::EditableRegion => self.doc.set_text_content(self.node, value),
        }
    }

    fn append_char(&mut self, c: char) {
        match self.kind {
            EditableKind::TextControl => {
                if let Some(el) = self.doc.element_mut(self.node) {
                    el.value.get_or_insert_with(String::new).push(c);
                }
            }
            EditableKind::EditableRegion => {
                let mut buf = [0u8; 4];
                self.doc.append_text(self.node, c.encode_utf8(&mut buf));
            }
        }
    }

    fn dispatch(&mut self, event: SyntheticEvent) {
        self.doc.dispatch(self.node, event);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("Input field not found")]
    NotFound,

    #[error("element is not editable")]
    NotEditable,
}

/// Resolve `selector` to an editable element.
pub fn resolve_target<'a>(
    doc: &'a mut Document,
    selector: &str,
) -> Result<ElementTarget<'a>, ResolveError> {
    let node = doc.query_selector(selector)?.ok_or(ResolveError::NotFound)?;
    ElementTarget::new(doc, node).ok_or(ResolveError::NotEditable)
}

/// `KeyboardEvent.code` for a character on a US layout.
pub fn key_code(c: char) -> String {
    match c {
        ' ' => "Space".to_string(),
        'a'..='z' | 'A'..='Z' => format!("Key{}", c.to_ascii_uppercase()),
        '0'..='9' => format!("Digit{c}"),
        '.' => "Period".to_string(),
        ',' => "Comma".to_string(),
        '!' => "Digit1".to_string(),
        '?' => "Slash".to_string(),
        ':' | ';' => "Semicolon".to_string(),
        '\'' | '"' => "Quote".to_string(),
        '-' | '_' => "Minus".to_string(),
        _ => "Unidentified".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::key_code;

    #[test]
    fn maps_letters_digits_and_punctuation() {
        assert_eq!(key_code('q'), "KeyQ");
        assert_eq!(key_code('Q'), "KeyQ");
        assert_eq!(key_code('7'), "Digit7");
        assert_eq!(key_code('?'), "Slash");
        assert_eq!(key_code('é'), "Unidentified");
    }
}
