//! Navigation trees
//!
//! Tables of contents, page lists and the figure/illustration/table lists
//! arrive from the native module as trees of two node kinds: tables (named
//! groupings with a source document) and points (titled links into content).

use serde::Serialize;

/// Which navigation table a package exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavKind {
    TableOfContents,
    ListOfFigures,
    ListOfIllustrations,
    ListOfTables,
    PageList,
}

impl NavKind {
    pub const ALL: [NavKind; 5] = [
        NavKind::TableOfContents,
        NavKind::ListOfFigures,
        NavKind::ListOfIllustrations,
        NavKind::ListOfTables,
        NavKind::PageList,
    ];

    /// `epub:type` value of the matching `nav` element
    pub fn epub_type(&self) -> &'static str {
        match self {
            NavKind::TableOfContents => "toc",
            NavKind::ListOfFigures => "lof",
            NavKind::ListOfIllustrations => "loi",
            NavKind::ListOfTables => "lot",
            NavKind::PageList => "page-list",
        }
    }
}

/// Navigation table (root of a navigation tree, or a nested grouping)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavTable {
    /// `epub:type` of the table
    #[serde(rename = "type")]
    pub table_type: String,
    pub title: String,
    /// Document the table was read from
    pub source_href: String,
    pub children: Vec<NavNode>,
}

/// Navigation point (a titled link into content)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NavPoint {
    pub title: String,
    /// Content href, possibly with a fragment
    pub content: String,
    pub children: Vec<NavNode>,
}

/// A node in a navigation tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NavNode {
    Table(NavTable),
    Point(NavPoint),
}

impl NavTable {
    pub fn new(table_type: impl Into<String>, title: impl Into<String>, source_href: impl Into<String>) -> Self {
        Self {
            table_type: table_type.into(),
            title: title.into(),
            source_href: source_href.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: NavNode) -> Self {
        self.children.push(child);
        self
    }

    /// Depth-first iterator over every descendant node
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// Number of descendant nodes
    pub fn len(&self) -> usize {
        self.walk().count()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl NavPoint {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: NavNode) -> Self {
        self.children.push(child);
        self
    }
}

impl NavNode {
    pub fn title(&self) -> &str {
        match self {
            NavNode::Table(t) => &t.title,
            NavNode::Point(p) => &p.title,
        }
    }

    pub fn children(&self) -> &[NavNode] {
        match self {
            NavNode::Table(t) => &t.children,
            NavNode::Point(p) => &p.children,
        }
    }

    pub fn children_mut(&mut self) -> &mut Vec<NavNode> {
        match self {
            NavNode::Table(t) => &mut t.children,
            NavNode::Point(p) => &mut p.children,
        }
    }

    pub fn append_child(&mut self, child: NavNode) {
        self.children_mut().push(child);
    }

    /// Content href of a point; tables have none
    pub fn content(&self) -> Option<&str> {
        match self {
            NavNode::Point(p) => Some(&p.content),
            NavNode::Table(_) => None,
        }
    }
}

impl From<NavPoint> for NavNode {
    fn from(point: NavPoint) -> Self {
        NavNode::Point(point)
    }
}

impl From<NavTable> for NavNode {
    fn from(table: NavTable) -> Self {
        NavNode::Table(table)
    }
}

/// Depth-first traversal over a navigation tree
pub struct Walk<'a> {
    stack: Vec<&'a NavNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a NavNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().iter().rev());
        Some(node)
    }
}
