//! Mutable document tree.
//!
//! Documents are parsed with `scraper` and copied into a small arena so the
//! inlining phases can rewrite attributes, swap `<link>` elements for
//! `<style>` elements and attach scaffold nodes in place. Detached nodes stay
//! in the arena but are no longer reachable from the root.

use scraper::Html;

/// Index of a node inside its [`Document`].
pub type NodeId = usize;

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["style", "script", "xmp", "iframe", "noembed", "noframes"];

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Document,
    Doctype(String),
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An HTML document that can be mutated in place.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    base_url: Option<String>,
}

impl Document {
    /// Parse a full HTML document.
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut doc = Self::empty();
        doc.import_tree(&parsed, 0, false);
        doc
    }

    /// Parse a full HTML document whose relative references resolve against `base_url`.
    pub fn parse_with_base(html: &str, base_url: &str) -> Self {
        let mut doc = Self::parse(html);
        doc.set_base_url(base_url);
        doc
    }

    fn empty() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
            base_url: None,
        }
    }

    // Copy scraper's tree below `parent`. With `skip_html_wrapper` the
    // synthetic <html> element of a fragment parse is flattened away.
    fn import_tree(&mut self, parsed: &Html, parent: NodeId, skip_html_wrapper: bool) {
        let root = parsed.tree.root();
        let mut stack: Vec<_> = root.children().map(|c| (c, parent)).collect::<Vec<_>>();
        stack.reverse();

        while let Some((node, parent_id)) = stack.pop() {
            let data = match node.value() {
                scraper::Node::Element(el) => {
                    if skip_html_wrapper && el.name() == "html" && parent_id == parent {
                        let children: Vec<_> = node.children().collect();
                        for child in children.into_iter().rev() {
                            stack.push((child, parent_id));
                        }
                        continue;
                    }
                    NodeData::Element {
                        name: el.name().to_string(),
                        attrs: el
                            .attrs()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect(),
                    }
                }
                scraper::Node::Text(text) => NodeData::Text(text.text.to_string()),
                scraper::Node::Comment(comment) => NodeData::Comment(comment.comment.to_string()),
                scraper::Node::Doctype(doctype) => NodeData::Doctype(doctype.name().to_string()),
                _ => continue,
            };
            let id = self.push(data);
            self.append_child(parent_id, id);

            let children: Vec<_> = node.children().collect();
            for child in children.into_iter().rev() {
                stack.push((child, id));
            }
        }
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// The document node.
    pub fn root(&self) -> NodeId {
        0
    }

    /// Explicitly set the document's base URL.
    pub fn set_base_url(&mut self, base_url: &str) {
        self.base_url = Some(base_url.to_string());
    }

    /// The document's own base: an explicit base if one was set, otherwise the
    /// first `<base href>` of the document.
    pub fn base_url(&self) -> Option<String> {
        if let Some(base) = &self.base_url {
            return Some(base.clone());
        }
        self.elements_by_tag_name("base")
            .into_iter()
            .find_map(|id| self.attr(id, "href").map(str::to_string))
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id].data
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Tag name of an element node.
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[id].data {
            match attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                Some((_, v)) => *v = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[id].data {
            attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        }
    }

    /// Every attached element with the given tag name, in document order.
    pub fn elements_by_tag_name(&self, name: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|&id| {
                self.tag_name(id)
                    .map(|tag| tag.eq_ignore_ascii_case(name))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// First attached element whose `id` attribute equals `value`.
    pub fn element_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&id| self.attr(id, "id") == Some(value))
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&id| self.tag_name(id).is_some())
    }

    pub fn head(&self) -> Option<NodeId> {
        self.elements_by_tag_name("head").into_iter().next()
    }

    pub fn body(&self) -> Option<NodeId> {
        self.elements_by_tag_name("body").into_iter().next()
    }

    // Pre-order, excluding `id` itself.
    fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next].children.iter().rev().copied());
        }
        out
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        if let NodeData::Text(text) = &self.nodes[id].data {
            return text.clone();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|n| match &self.nodes[n].data {
                NodeData::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace all children with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        self.clear_children(id);
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(id, text_node);
        }
    }

    /// Create a detached element.
    pub fn create_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.push(NodeData::Element {
            name: name.to_ascii_lowercase(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Insert `child` into `parent` right before `reference`; appends when
    /// `reference` is not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        let siblings = &mut self.nodes[parent].children;
        match siblings.iter().position(|&s| s == reference) {
            Some(pos) => siblings.insert(pos, child),
            None => siblings.push(child),
        }
    }

    /// Detach a node (and its subtree) from the tree.
    pub fn remove(&mut self, id: NodeId) {
        self.detach(id);
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id].children);
        for child in children {
            self.nodes[child].parent = None;
        }
    }

    /// HTML serialization of the children of `id`.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in &self.nodes[id].children {
            self.write_node(&mut out, child, Dialect::Html);
        }
        out
    }

    /// Replace the children of `id` with the parse of an HTML fragment.
    pub fn set_inner_html(&mut self, id: NodeId, html: &str) {
        self.clear_children(id);
        let parsed = Html::parse_fragment(html);
        self.import_tree(&parsed, id, true);
    }

    /// Serialize the whole document as HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for &child in &self.nodes[self.root()].children {
            self.write_node(&mut out, child, Dialect::Html);
        }
        out
    }

    /// Serialize the document element as well-formed XHTML.
    ///
    /// The root element carries the XHTML namespace, void elements are
    /// self-closed and all text is escaped, so the result can be embedded in
    /// an SVG `foreignObject`.
    pub fn to_xhtml(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.document_element() {
            self.write_node(&mut out, root, Dialect::Xhtml { root });
        }
        out
    }

    fn write_node(&self, out: &mut String, id: NodeId, dialect: Dialect) {
        match &self.nodes[id].data {
            NodeData::Document => {
                for &child in &self.nodes[id].children {
                    self.write_node(out, child, dialect);
                }
            }
            NodeData::Doctype(name) => {
                if dialect == Dialect::Html {
                    out.push_str("<!DOCTYPE ");
                    out.push_str(name);
                    out.push('>');
                }
            }
            NodeData::Comment(text) => {
                out.push_str("<!--");
                out.push_str(&text.replace("--", "- -"));
                out.push_str("-->");
            }
            NodeData::Text(text) => {
                let raw = dialect == Dialect::Html
                    && self.nodes[id]
                        .parent
                        .and_then(|p| self.tag_name(p))
                        .map(|tag| RAW_TEXT_ELEMENTS.contains(&tag))
                        .unwrap_or(false);
                if raw {
                    out.push_str(text);
                } else {
                    escape_text(out, text);
                }
            }
            NodeData::Element { name, attrs } => {
                out.push('<');
                out.push_str(name);
                let is_root = matches!(dialect, Dialect::Xhtml { root } if root == id);
                if is_root && !attrs.iter().any(|(k, _)| k == "xmlns") {
                    out.push_str(" xmlns=\"");
                    out.push_str(XHTML_NAMESPACE);
                    out.push('"');
                }
                for (key, value) in attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    escape_attr(out, value);
                    out.push('"');
                }

                let void = VOID_ELEMENTS.contains(&name.as_str());
                if void {
                    out.push_str(if dialect == Dialect::Html { ">" } else { "/>" });
                    return;
                }
                out.push('>');
                for &child in &self.nodes[id].children {
                    self.write_node(out, child, dialect);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Dialect {
    Html,
    Xhtml { root: NodeId },
}

fn escape_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&#160;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&#160;"),
            _ => out.push(ch),
        }
    }
}
