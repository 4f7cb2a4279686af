//! Generated instance trees
//!
//! A [`Node`] owns its children, so a generated document is a strict tree.
//! Names are stored already prefixed and namespace declarations are plain
//! attributes; the serializer writes them out as they are.

/// An element of a generated instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// Element name as written, possibly prefixed
    pub name: String,
    /// Attributes in emission order, namespace declarations first
    pub attributes: Vec<(String, String)>,
    /// Child elements in generation order
    pub children: Vec<Node>,
    /// Leaf text
    pub text: Option<String>,
}

impl Node {
    /// Create an empty element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append an attribute
    pub fn push_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((name.into(), value.into()));
    }

    /// Value of an attribute by written name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given written name
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Children with the given written name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Check whether the element has neither children nor text
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.text.is_none()
    }

    /// Number of elements in the tree, this one included
    pub fn element_count(&self) -> usize {
        1 + self.children.iter().map(Node::element_count).sum::<usize>()
    }

    /// Nesting depth of the tree; a leaf has depth 1
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Node::depth).max().unwrap_or(0)
    }

    /// Every element of the tree, breadth first
    pub fn descendants(&self) -> Vec<&Node> {
        let mut out = vec![self];
        let mut i = 0;
        while i < out.len() {
            let node = out[i];
            i += 1;
            out.extend(node.children.iter());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        let mut root = Node::new("order");
        root.push_attribute("id", "7");
        let mut line = Node::new("line");
        line.children.push(Node {
            text: Some("3".into()),
            ..Node::new("qty")
        });
        root.children.push(line);
        root.children.push(Node::new("line"));
        root
    }

    #[test]
    fn test_lookup() {
        let root = sample();
        assert_eq!(root.attribute("id"), Some("7"));
        assert_eq!(root.attribute("missing"), None);
        assert_eq!(root.children_named("line").count(), 2);
        assert_eq!(
            root.child("line").and_then(|l| l.child("qty")).and_then(|q| q.text.as_deref()),
            Some("3")
        );
    }

    #[test]
    fn test_shape() {
        let root = sample();
        assert_eq!(root.element_count(), 4);
        assert_eq!(root.depth(), 3);
        assert!(root.children[1].is_empty());
        assert_eq!(root.descendants().len(), 4);
    }
}
