//! Attribute trees: the column decomposition of complex attributes.

use std::fmt;

use strata_core::{Attribute, EntityType, HostType};

use crate::error::{QueryError, QueryResult};

/// One attribute or component.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeNode {
    name: String,
    column: Option<String>,
    ty: HostType,
    children: Vec<AttributeNode>,
}

impl AttributeNode {
    fn from_attribute(attribute: &Attribute) -> Self {
        Self {
            name: attribute.name().to_owned(),
            column: (!attribute.is_complex()).then(|| attribute.column().to_owned()),
            ty: attribute.ty().clone(),
            children: attribute.components().iter().map(Self::from_attribute).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The mapped column, `None` for complex nodes.
    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub const fn ty(&self) -> &HostType {
        &self.ty
    }

    pub fn children(&self) -> &[AttributeNode] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&AttributeNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn collect_leaves(&self, prefix: &mut Vec<String>, out: &mut Vec<(Vec<String>, String)>) {
        prefix.push(self.name.clone());
        match &self.column {
            Some(column) => out.push((prefix.clone(), column.clone())),
            None => {
                for child in &self.children {
                    child.collect_leaves(prefix, out);
                }
            }
        }
        prefix.pop();
    }
}

/// The decomposition of one attribute into its mapped columns.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTree {
    root: AttributeNode,
}

impl AttributeTree {
    /// Builds the tree of `attribute`.
    #[must_use]
    pub fn new(attribute: &Attribute) -> Self {
        Self { root: AttributeNode::from_attribute(attribute) }
    }

    #[must_use]
    pub const fn root(&self) -> &AttributeNode {
        &self.root
    }

    /// Finds the component at `path` below the root.
    #[must_use]
    pub fn search<S: AsRef<str>>(&self, path: &[S]) -> Option<&AttributeNode> {
        path.iter().try_fold(&self.root, |node, segment| node.child(segment.as_ref()))
    }

    /// Every mapped column with its member path, root name included.
    #[must_use]
    pub fn leaves(&self) -> Vec<(Vec<String>, String)> {
        let mut out = Vec::new();
        self.root.collect_leaves(&mut Vec::new(), &mut out);
        out
    }
}

/// An attribute followed by component names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath {
    attribute: String,
    components: Vec<String>,
}

impl AttributePath {
    /// Resolves `path` against `entity`. The first segment names an
    /// attribute, the remaining segments name nested components.
    pub fn resolve<S: AsRef<str>>(entity: &EntityType, path: &[S]) -> QueryResult<Self> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| QueryError::illegal(entity.name(), "empty attribute path"))?;
        let first = first.as_ref();
        let mut current = entity.attribute(first).ok_or_else(|| {
            QueryError::illegal(first, format!("'{first}' is not an attribute of {}", entity.name()))
        })?;
        for segment in rest {
            let segment = segment.as_ref();
            current = current.component(segment).ok_or_else(|| {
                QueryError::illegal(segment, format!("'{segment}' is not a component of {}", current.name()))
            })?;
        }
        Ok(Self {
            attribute: first.to_owned(),
            components: rest.iter().map(|s| s.as_ref().to_owned()).collect(),
        })
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Looks the path up in `entity` again.
    pub fn target<'e>(&self, entity: &'e EntityType) -> Option<&'e Attribute> {
        self.components
            .iter()
            .try_fold(entity.attribute(&self.attribute)?, |attr, name| attr.component(name))
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.attribute)?;
        for component in &self.components {
            write!(f, ".{component}")?;
        }
        Ok(())
    }
}
