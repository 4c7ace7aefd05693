use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use kuchiki::traits::TendrilSink;
use kuchiki::{ElementData, NodeDataRef, NodeRef, Selectors};
use tracing::warn;

/// Input types that never contribute a field to submitted form data.
const NON_DATA_INPUT_TYPES: &[&str] = &["submit", "button", "reset", "image", "file"];

/// An HTML document the runtime binds to.
///
/// Cloning is cheap and yields another handle onto the same tree.
#[derive(Clone)]
pub struct Document {
    root: NodeRef,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        Self {
            root: kuchiki::parse_html().one(html),
        }
    }

    pub fn query(&self, selector: &str) -> Option<Element> {
        self.root.select_first(selector).ok().map(Element::new)
    }

    pub fn query_all(&self, selector: &str) -> Vec<Element> {
        select_all(&self.root, selector)
    }

    pub fn body(&self) -> Option<Element> {
        self.query("body")
    }

    pub fn to_html(&self) -> String {
        serialize_node(&self.root)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document").finish_non_exhaustive()
    }
}

/// Handle onto a single element node.
///
/// Equality and hashing follow node identity, so handles can key the
/// runtime's per-element bookkeeping.
#[derive(Clone)]
pub struct Element {
    inner: NodeDataRef<ElementData>,
}

impl Element {
    fn new(inner: NodeDataRef<ElementData>) -> Self {
        Self { inner }
    }

    fn node(&self) -> &NodeRef {
        self.inner.as_node()
    }

    /// Upper-cased tag name, matching `Element.tagName` for HTML documents.
    pub fn tag_name(&self) -> String {
        let local: &str = &self.inner.name.local;
        local.to_ascii_uppercase()
    }

    pub fn is_tag(&self, tags: &[&str]) -> bool {
        let tag = self.tag_name();
        tags.iter().any(|candidate| candidate.eq_ignore_ascii_case(&tag))
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.inner
            .attributes
            .borrow()
            .get(name)
            .map(str::to_owned)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.inner.attributes.borrow().contains(name)
    }

    pub fn set_attr(&self, name: &str, value: &str) {
        self.inner
            .attributes
            .borrow_mut()
            .insert(name, value.to_string());
    }

    pub fn remove_attr(&self, name: &str) {
        self.inner.attributes.borrow_mut().remove(name);
    }

    /// All attributes as `(name, value)` pairs in document order of names.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.inner
            .attributes
            .borrow()
            .map
            .iter()
            .map(|(name, attr)| (name.local.to_string(), attr.value.clone()))
            .collect()
    }

    pub fn classes(&self) -> Vec<String> {
        self.attr("class")
            .map(|value| value.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().iter().any(|existing| existing == class)
    }

    pub fn add_class(&self, class: &str) {
        let mut classes = self.classes();
        if classes.iter().any(|existing| existing == class) {
            return;
        }
        classes.push(class.to_string());
        self.set_attr("class", &classes.join(" "));
    }

    pub fn remove_class(&self, class: &str) {
        if !self.has_attr("class") {
            return;
        }
        let classes: Vec<String> = self
            .classes()
            .into_iter()
            .filter(|existing| existing != class)
            .collect();
        self.set_attr("class", &classes.join(" "));
    }

    pub fn is_disabled(&self) -> bool {
        self.has_attr("disabled")
    }

    pub fn set_disabled(&self, disabled: bool) {
        if disabled {
            self.set_attr("disabled", "");
        } else {
            self.remove_attr("disabled");
        }
    }

    pub fn text(&self) -> String {
        self.node().text_contents()
    }

    pub fn set_text(&self, text: &str) {
        self.clear_children();
        self.node().append(NodeRef::new_text(text));
    }

    pub fn inner_html(&self) -> String {
        self.node()
            .children()
            .map(|child| serialize_node(&child))
            .collect()
    }

    /// Replaces the children with `markup` parsed in a body context. The
    /// markup is inserted as-is, without any sanitizing.
    pub fn set_inner_html(&self, markup: &str) {
        self.clear_children();
        let fragment = kuchiki::parse_html().one(format!("<html><body>{markup}</body></html>"));
        let Ok(body) = fragment.select_first("body") else {
            return;
        };
        let children: Vec<NodeRef> = body.as_node().children().collect();
        for child in children {
            child.detach();
            self.node().append(child);
        }
    }

    pub fn outer_html(&self) -> String {
        serialize_node(self.node())
    }

    /// Current value of a form control, mirroring the DOM `value` property.
    pub fn value(&self) -> String {
        if self.is_tag(&["textarea"]) {
            return self.text();
        }
        if self.is_tag(&["select"]) {
            let options = self.query_all("option");
            let chosen = options
                .iter()
                .find(|option| option.has_attr("selected"))
                .or_else(|| options.first());
            return chosen.map(option_value).unwrap_or_default();
        }
        match self.attr("value") {
            Some(value) => value,
            None if self.is_checkable() => "on".to_string(),
            None => String::new(),
        }
    }

    pub fn set_value(&self, value: &str) {
        if self.is_tag(&["textarea"]) {
            self.set_text(value);
        } else if self.is_tag(&["select"]) {
            for option in self.query_all("option") {
                if option_value(&option) == value {
                    option.set_attr("selected", "");
                } else {
                    option.remove_attr("selected");
                }
            }
        } else {
            self.set_attr("value", value);
        }
    }

    /// Nearest inclusive ancestor matching `selector`, like `Element.closest`.
    pub fn closest(&self, selector: &str) -> Option<Element> {
        let selectors = compile(selector)?;
        self.node()
            .inclusive_ancestors()
            .filter_map(NodeRef::into_element_ref)
            .find(|candidate| selectors.matches(candidate))
            .map(Element::new)
    }

    pub fn matches(&self, selector: &str) -> bool {
        compile(selector)
            .map(|selectors| selectors.matches(&self.inner))
            .unwrap_or(false)
    }

    pub fn query(&self, selector: &str) -> Option<Element> {
        self.node().select_first(selector).ok().map(Element::new)
    }

    pub fn query_all(&self, selector: &str) -> Vec<Element> {
        select_all(self.node(), selector)
    }

    /// Successful controls of a form as `(name, value)` pairs, in tree order.
    pub fn form_entries(&self) -> Vec<(String, String)> {
        self.query_all("input[name], select[name], textarea[name]")
            .into_iter()
            .filter(|control| !control.is_disabled())
            .filter_map(|control| {
                let name = control.attr("name").filter(|name| !name.is_empty())?;
                if control.is_tag(&["input"]) {
                    let kind = control.attr("type").unwrap_or_default().to_ascii_lowercase();
                    if NON_DATA_INPUT_TYPES.contains(&kind.as_str()) {
                        return None;
                    }
                    if control.is_checkable() && !control.has_attr("checked") {
                        return None;
                    }
                }
                Some((name, control.value()))
            })
            .collect()
    }

    fn is_checkable(&self) -> bool {
        self.is_tag(&["input"])
            && self
                .attr("type")
                .is_some_and(|kind| kind.eq_ignore_ascii_case("checkbox") || kind.eq_ignore_ascii_case("radio"))
    }

    fn clear_children(&self) {
        let children: Vec<NodeRef> = self.node().children().collect();
        for child in children {
            child.detach();
        }
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node().0, &other.node().0)
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.node().0), state);
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Element");
        debug.field("tag", &self.tag_name());
        if let Some(id) = self.attr("id") {
            debug.field("id", &id);
        }
        debug.finish()
    }
}

fn option_value(option: &Element) -> String {
    option.attr("value").unwrap_or_else(|| option.text())
}

fn compile(selector: &str) -> Option<Selectors> {
    match Selectors::compile(selector) {
        Ok(selectors) => Some(selectors),
        Err(()) => {
            warn!(target = "cake_spa", selector, "invalid CSS selector");
            None
        }
    }
}

fn select_all(node: &NodeRef, selector: &str) -> Vec<Element> {
    match node.select(selector) {
        Ok(matches) => matches.map(Element::new).collect(),
        Err(()) => {
            warn!(target = "cake_spa", selector, "invalid CSS selector");
            Vec::new()
        }
    }
}

fn serialize_node(node: &NodeRef) -> String {
    let mut buffer = Vec::new();
    if let Err(err) = node.serialize(&mut buffer) {
        warn!(target = "cake_spa", error = %err, "failed to serialize node");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
