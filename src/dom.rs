use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::selector::{SelectorError, SelectorList};

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Explicit computed-style values captured with a snapshot.
///
/// Anything left unset is derived from the inline `style` attribute and
/// user-agent defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StyleOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

impl StyleOverride {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub border: String,
    pub background_color: String,
}

impl ComputedStyle {
    pub fn is_hidden(&self) -> bool {
        self.display == "none" || self.visibility == "hidden"
    }

    pub fn has_border(&self) -> bool {
        !matches!(self.border.as_str(), "" | "none" | "0" | "0px")
            && !self.border.starts_with("none ")
            && !self.border.starts_with("0 ")
            && !self.border.starts_with("0px none")
    }

    pub fn has_background(&self) -> bool {
        !matches!(
            self.background_color.as_str(),
            "" | "transparent" | "none" | "rgba(0, 0, 0, 0)"
        )
    }
}

const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "button", "code", "em", "i", "input", "label", "select", "small", "span",
    "strong", "sub", "sup", "textarea",
];

const TEXT_INPUT_TYPES: &[&str] = &["", "text", "search", "email", "url", "password", "tel", "number"];

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub rect: Rect,
    pub value: Option<String>,
    style_override: StyleOverride,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    pub fn class_name(&self) -> &str {
        self.attr("class").unwrap_or("")
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.class_name().split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// `<textarea>`, or an `<input>` whose type takes free text. A missing or
    /// empty `type` is a text input.
    pub fn is_text_control(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => match self.input_type() {
                None => true,
                Some(t) => TEXT_INPUT_TYPES.contains(&t.as_str()),
            },
            _ => false,
        }
    }

    /// `contenteditable` set to an editing state (`""`, `true`, `plaintext-only`).
    pub fn is_editable_region(&self) -> bool {
        self.attr("contenteditable")
            .map(|v| {
                let v = v.trim().to_ascii_lowercase();
                v.is_empty() || v == "true" || v == "plaintext-only"
            })
            .unwrap_or(false)
    }

    pub fn is_disabled(&self) -> bool {
        self.has_attr("disabled")
    }

    pub fn is_read_only(&self) -> bool {
        self.has_attr("readonly")
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.attr("placeholder")
    }

    pub fn input_type(&self) -> Option<String> {
        self.attr("type").map(|t| t.trim().to_ascii_lowercase())
    }

    fn declared_style(&self) -> StyleOverride {
        let mut declared = StyleOverride::default();

        for declaration in self.attr("style").unwrap_or("").split(';') {
            let Some((name, value)) = declaration.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }

            match name.as_str() {
                "display" => declared.display = Some(value),
                "visibility" => declared.visibility = Some(value),
                "border" => declared.border = Some(value),
                n if n.starts_with("border-") && !n.ends_with("radius") => {
                    if declared.border.is_none() {
                        declared.border = Some(value);
                    }
                }
                "background" | "background-color" => declared.background_color = Some(value),
                _ => {}
            }
        }

        let o = &self.style_override;
        StyleOverride {
            display: o.display.clone().or(declared.display),
            visibility: o.visibility.clone().or(declared.visibility),
            border: o.border.clone().or(declared.border),
            background_color: o.background_color.clone().or(declared.background_color),
        }
    }

    fn default_display(&self) -> &'static str {
        if self.has_attr("hidden") {
            return "none";
        }
        if self.tag == "input" && self.input_type().as_deref() == Some("hidden") {
            return "none";
        }
        if matches!(self.tag.as_str(), "script" | "style" | "noscript" | "template" | "head") {
            return "none";
        }
        if INLINE_TAGS.contains(&self.tag.as_str()) {
            "inline"
        } else {
            "block"
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// Synthetic events the simulator dispatches on elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyntheticEvent {
    Focus,
    Click,
    KeyDown { key: String, code: String },
    Input { input_type: String, data: String },
    KeyUp { key: String, code: String },
    Change,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedEvent {
    pub target: NodeId,
    pub event: SyntheticEvent,
}

/// An in-memory page snapshot: element/text tree rooted at `<body>`, plus an
/// event log of everything dispatched on it.
#[derive(Debug, Clone)]
pub struct Document {
    title: String,
    nodes: Vec<NodeData>,
    body: NodeId,
    events: Vec<DispatchedEvent>,
}

impl Document {
    pub fn new(title: impl Into<String>, body: ElementSpec) -> Self {
        let mut doc = Self {
            title: title.into(),
            nodes: Vec::new(),
            body: NodeId(0),
            events: Vec::new(),
        };
        doc.body = doc.insert_element(None, body);
        doc
    }

    pub fn from_snapshot(snapshot: PageSnapshot) -> Self {
        Self::new(snapshot.title, snapshot.body)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: PageSnapshot =
            serde_json::from_str(json).context("failed to parse page snapshot JSON")?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn to_snapshot(&self) -> PageSnapshot {
        PageSnapshot {
            title: self.title.clone(),
            body: self.element_spec(self.body),
        }
    }

    fn element_spec(&self, id: NodeId) -> ElementSpec {
        let mut spec = ElementSpec::default();
        if let Some(el) = self.element(id) {
            spec.tag = el.tag.clone();
            spec.attrs = el.attrs.iter().cloned().collect();
            spec.rect = Some(el.rect);
            spec.value = el.value.clone();
            spec.style = el.style_override.clone();
        }
        for &child in self.children(id) {
            match &self.nodes[child.0].kind {
                NodeKind::Text(text) => spec.children.push(NodeSpec::Text(text.clone())),
                NodeKind::Element(_) => spec
                    .children
                    .push(NodeSpec::Element(self.element_spec(child))),
            }
        }
        spec
    }

    fn push_node(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    fn insert_element(&mut self, parent: Option<NodeId>, spec: ElementSpec) -> NodeId {
        let tag = spec.tag.to_ascii_lowercase();
        let attrs: Vec<(String, String)> = spec
            .attrs
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();

        let mut value = spec.value;
        if value.is_none() && tag == "input" {
            value = attrs
                .iter()
                .find(|(k, _)| k == "value")
                .map(|(_, v)| v.clone());
        }
        if value.is_none() && tag == "textarea" {
            let text: String = spec
                .children
                .iter()
                .filter_map(|c| match c {
                    NodeSpec::Text(t) => Some(t.as_str()),
                    NodeSpec::Element(_) => None,
                })
                .collect();
            value = Some(text);
        }
        if value.is_none() && tag == "input" {
            value = Some(String::new());
        }

        let element = Element {
            tag,
            attrs,
            rect: spec.rect.unwrap_or_default(),
            value,
            style_override: spec.style,
        };
        let id = self.push_node(parent, NodeKind::Element(element));

        for child in spec.children {
            match child {
                NodeSpec::Text(text) => {
                    self.push_node(Some(id), NodeKind::Text(text));
                }
                NodeSpec::Element(child) => {
                    self.insert_element(Some(id), child);
                }
            }
        }
        id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Element(el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::Element(el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element(_) => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
    }

    /// Descendants of `id` in document (pre-)order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Text nodes under `<body>` in document order.
    pub fn text_nodes(&self) -> Vec<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .filter(|&n| self.text(n).is_some())
            .collect()
    }

    /// Concatenated descendant text, without inserting separators.
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(text) = self.text(id) {
            return text.to_string();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// Replace all children of `id` with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        if !self.is_element(id) {
            if let Some(NodeData {
                kind: NodeKind::Text(existing),
                ..
            }) = self.nodes.get_mut(id.0)
            {
                *existing = text.to_string();
            }
            return;
        }

        let old = std::mem::take(&mut self.nodes[id.0].children);
        for child in old {
            self.nodes[child.0].parent = None;
        }
        if !text.is_empty() {
            self.push_node(Some(id), NodeKind::Text(text.to_string()));
        }
    }

    /// Append to the last text child of `id`, creating one when needed.
    pub fn append_text(&mut self, id: NodeId, text: &str) {
        let last_text = self
            .children(id)
            .last()
            .copied()
            .filter(|&c| self.text(c).is_some());
        match last_text {
            Some(node) => {
                if let NodeKind::Text(existing) = &mut self.nodes[node.0].kind {
                    existing.push_str(text);
                }
            }
            None => {
                self.push_node(Some(id), NodeKind::Text(text.to_string()));
            }
        }
    }

    /// Remove `id` from its parent. The node keeps its own subtree.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        self.nodes[parent.0].children.retain(|&c| c != id);
        self.nodes[id.0].parent = None;
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        if id.0 >= self.nodes.len() {
            return false;
        }
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.body {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == id)?;
        siblings[pos + 1..]
            .iter()
            .copied()
            .find(|&c| self.is_element(c))
    }

    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == id)?;
        siblings[..pos]
            .iter()
            .rev()
            .copied()
            .find(|&c| self.is_element(c))
    }

    /// 1-based position among the parent's element children.
    pub fn element_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.element_children(parent)
            .position(|c| c == id)
            .map(|i| i + 1)
    }

    pub fn computed_style(&self, id: NodeId) -> Option<ComputedStyle> {
        let el = self.element(id)?;
        let declared = el.declared_style();

        let visibility = match declared.visibility {
            Some(v) if v != "inherit" => v,
            _ => self
                .parent(id)
                .and_then(|p| self.computed_style(p))
                .map(|s| s.visibility)
                .unwrap_or_else(|| "visible".to_string()),
        };

        Some(ComputedStyle {
            display: declared
                .display
                .unwrap_or_else(|| el.default_display().to_string()),
            visibility,
            border: declared.border.unwrap_or_else(|| "none".to_string()),
            background_color: declared
                .background_color
                .unwrap_or_else(|| "rgba(0, 0, 0, 0)".to_string()),
        })
    }

    /// Element's own style is not hidden and no ancestor has `display: none`.
    pub fn is_rendered(&self, id: NodeId) -> bool {
        let Some(style) = self.computed_style(id) else {
            return false;
        };
        if style.is_hidden() {
            return false;
        }
        let mut current = self.parent(id);
        while let Some(node) = current {
            if self
                .computed_style(node)
                .map(|s| s.display == "none")
                .unwrap_or(false)
            {
                return false;
            }
            current = self.parent(node);
        }
        true
    }

    /// Short `tag.class#id` description used in traces.
    pub fn describe(&self, id: NodeId) -> String {
        let Some(el) = self.element(id) else {
            return "#text".to_string();
        };
        let mut out = el.tag.to_ascii_uppercase();
        if !el.class_name().is_empty() {
            out.push('.');
            out.push_str(el.class_name());
        }
        if let Some(element_id) = el.id() {
            out.push('#');
            out.push_str(element_id);
        }
        out
    }

    /// Elements (including `<body>`) matching `list`, in document order.
    pub fn select(&self, list: &SelectorList) -> Vec<NodeId> {
        std::iter::once(self.body)
            .chain(self.descendants(self.body))
            .filter(|&n| list.matches(self, n))
            .collect()
    }

    /// Descendant elements of `root` matching `list`, in document order.
    pub fn select_within(&self, root: NodeId, list: &SelectorList) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&n| list.matches(self, n))
            .collect()
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        let list = SelectorList::parse(selector)?;
        Ok(self.select(&list))
    }

    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, SelectorError> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    /// Nearest inclusive ancestor of `id` matching `list`.
    pub fn closest(&self, id: NodeId, list: &SelectorList) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if list.matches(self, node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    pub fn dispatch(&mut self, target: NodeId, event: SyntheticEvent) {
        self.events.push(DispatchedEvent { target, event });
    }

    pub fn events(&self) -> &[DispatchedEvent] {
        &self.events
    }
}

/// Serialized page snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub title: String,
    pub body: ElementSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementSpec {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "StyleOverride::is_empty")]
    pub style: StyleOverride,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Text(String),
    Element(ElementSpec),
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: impl Into<String>) -> Self {
        self.attr("class", class)
    }

    pub fn style(self, style: impl Into<String>) -> Self {
        self.attr("style", style)
    }

    pub fn computed(mut self, style: StyleOverride) -> Self {
        self.style = style;
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Some(Rect::new(x, y, width, height));
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(NodeSpec::Text(text.into()));
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(NodeSpec::Element(child));
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ElementSpec>) -> Self {
        self.children
            .extend(children.into_iter().map(NodeSpec::Element));
        self
    }
}
