//! Association paths and trees.

use std::fmt;

use strata_core::{DomainModel, Multiplicity, StoreSymbol};

use crate::error::{QueryError, QueryResult};

/// One navigation step of an association path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssociationStep {
    /// Navigation member name.
    pub navigation: String,
    /// Entity the navigation is declared on.
    pub source: String,
    /// Entity the navigation reaches.
    pub target: String,
    /// Multiplicity of the target end.
    pub multiplicity: Multiplicity,
    /// Store of the reached node.
    pub store: StoreSymbol,
    /// Columns of the source table.
    pub source_columns: Vec<String>,
    /// Matching columns of the target table.
    pub target_columns: Vec<String>,
}

/// A chain of navigations from a root entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssociationPath {
    pub(crate) root: String,
    pub(crate) root_store: StoreSymbol,
    pub(crate) steps: Vec<AssociationStep>,
}

impl AssociationPath {
    /// An empty path at `root`.
    #[must_use]
    pub fn empty(model: &dyn DomainModel, root: impl Into<String>) -> Self {
        let root = root.into();
        let root_store = model.store_of(&root);
        Self { root, root_store, steps: Vec::new() }
    }

    /// Resolves every segment as a navigation.
    ///
    /// A segment that is not a navigable member is an illegal expression.
    pub fn resolve<S: AsRef<str>>(model: &dyn DomainModel, root: &str, path: &[S]) -> QueryResult<Self> {
        let mut resolved = Self::empty(model, root);
        for segment in path {
            let segment = segment.as_ref();
            if !resolved.push(model, segment)? {
                return Err(QueryError::illegal(
                    segment,
                    format!("'{segment}' is not a navigable member of {}", resolved.target()),
                ));
            }
        }
        Ok(resolved)
    }

    /// Resolves the longest leading run of navigations in `members`.
    #[must_use]
    pub fn navigation_prefix<S: AsRef<str>>(model: &dyn DomainModel, root: &str, members: &[S]) -> Self {
        let mut resolved = Self::empty(model, root);
        for member in members {
            if !matches!(resolved.push(model, member.as_ref()), Ok(true)) {
                break;
            }
        }
        resolved
    }

    /// Appends a navigation of the current target; returns false when
    /// `segment` is not a navigation.
    fn push(&mut self, model: &dyn DomainModel, segment: &str) -> QueryResult<bool> {
        let source = self.target().to_owned();
        let entity = model.require(&source)?;
        let Some(navigation) = entity.navigation(segment) else {
            return Ok(false);
        };
        self.steps.push(AssociationStep {
            navigation: segment.to_owned(),
            source,
            target: navigation.target().to_owned(),
            multiplicity: navigation.multiplicity(),
            store: model.navigation_store(navigation),
            source_columns: navigation.source_columns().to_vec(),
            target_columns: navigation.target_columns().to_vec(),
        });
        Ok(true)
    }

    /// The root entity.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The store of the root entity.
    #[must_use]
    pub const fn root_store(&self) -> &StoreSymbol {
        &self.root_store
    }

    /// The navigation steps.
    #[must_use]
    pub fn steps(&self) -> &[AssociationStep] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true for a path without steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The entity the path ends at.
    #[must_use]
    pub fn target(&self) -> &str {
        self.steps.last().map_or(self.root.as_str(), |step| step.target.as_str())
    }

    /// Navigation names from the root outwards.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.steps.iter().map(|step| step.navigation.clone()).collect()
    }

    /// The first `len` steps.
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            root: self.root.clone(),
            root_store: self.root_store.clone(),
            steps: self.steps[..len.min(self.steps.len())].to_vec(),
        }
    }

    /// The steps after `index`, rooted at the target of step `index`.
    #[must_use]
    pub fn rest_after(&self, index: usize) -> Option<Self> {
        let pivot = self.steps.get(index)?;
        Some(Self {
            root: pivot.target.clone(),
            root_store: pivot.store.clone(),
            steps: self.steps[index + 1..].to_vec(),
        })
    }
}

impl fmt::Display for AssociationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for step in &self.steps {
            write!(f, ".{}", step.navigation)?;
        }
        Ok(())
    }
}

/// A node of an association tree: one entity reached through one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationNode {
    entity: String,
    via: Option<String>,
    multiplicity: Multiplicity,
    store: StoreSymbol,
    children: Vec<AssociationNode>,
}

impl AssociationNode {
    fn root(model: &dyn DomainModel, entity: &str) -> Self {
        Self {
            entity: entity.to_owned(),
            via: None,
            multiplicity: Multiplicity::One,
            store: model.store_of(entity),
            children: Vec::new(),
        }
    }

    fn from_step(step: &AssociationStep) -> Self {
        Self {
            entity: step.target.clone(),
            via: Some(step.navigation.clone()),
            multiplicity: step.multiplicity,
            store: step.store.clone(),
            children: Vec::new(),
        }
    }

    /// The entity represented by the node.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The navigation that reaches this node, `None` for the root.
    #[must_use]
    pub fn via(&self) -> Option<&str> {
        self.via.as_deref()
    }

    /// Multiplicity of the navigation reaching this node.
    #[must_use]
    pub const fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    /// The store the node's entity is read from.
    #[must_use]
    pub const fn store(&self) -> &StoreSymbol {
        &self.store
    }

    /// Child nodes.
    #[must_use]
    pub fn children(&self) -> &[AssociationNode] {
        &self.children
    }

    /// The child reached through `navigation`.
    #[must_use]
    pub fn child(&self, navigation: &str) -> Option<&AssociationNode> {
        self.children.iter().find(|c| c.via.as_deref() == Some(navigation))
    }

    fn child_mut(&mut self, navigation: &str) -> Option<&mut AssociationNode> {
        self.children.iter_mut().find(|c| c.via.as_deref() == Some(navigation))
    }

    /// Every node below this one, depth first.
    #[must_use]
    pub fn descendants(&self) -> Vec<&AssociationNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&AssociationNode> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    fn merge_children(&mut self, other: &AssociationNode) {
        for theirs in &other.children {
            let Some(via) = theirs.via.as_deref() else { continue };
            match self.child_mut(via) {
                Some(ours) => ours.merge_children(theirs),
                None => self.children.push(theirs.clone()),
            }
        }
    }

    fn collect_paths(&self, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        for child in &self.children {
            if let Some(via) = &child.via {
                prefix.push(via.clone());
                if child.children.is_empty() {
                    out.push(prefix.clone());
                } else {
                    child.collect_paths(prefix, out);
                }
                prefix.pop();
            }
        }
    }
}

/// The navigation paths reachable from a query's element type.
///
/// A tree always has exactly one root. Nodes are only removed by
/// [`AssociationTree::detach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationTree {
    root: AssociationNode,
}

impl AssociationTree {
    /// A tree holding only `entity`.
    #[must_use]
    pub fn new(model: &dyn DomainModel, entity: &str) -> Self {
        Self { root: AssociationNode::root(model, entity) }
    }

    /// The root node.
    #[must_use]
    pub const fn root(&self) -> &AssociationNode {
        &self.root
    }

    /// Returns true when no path has been grown.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Adds the navigation path, reusing nodes that already exist.
    pub fn grow<S: AsRef<str>>(&mut self, model: &dyn DomainModel, path: &[S]) -> QueryResult<()> {
        let resolved = AssociationPath::resolve(model, &self.root.entity, path)?;
        self.grow_path(&resolved);
        Ok(())
    }

    /// Adds an already resolved path rooted at this tree's entity.
    pub fn grow_path(&mut self, path: &AssociationPath) {
        let mut node = &mut self.root;
        for step in path.steps() {
            let index = match node.children.iter().position(|c| c.via.as_deref() == Some(&step.navigation)) {
                Some(index) => index,
                None => {
                    node.children.push(AssociationNode::from_step(step));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[index];
        }
    }

    /// Finds the node at the end of `path`.
    #[must_use]
    pub fn search<S: AsRef<str>>(&self, path: &[S]) -> Option<&AssociationNode> {
        path.iter().try_fold(&self.root, |node, segment| node.child(segment.as_ref()))
    }

    /// Removes and returns the node at the end of `path`.
    pub fn detach<S: AsRef<str>>(&mut self, path: &[S]) -> Option<AssociationNode> {
        let (last, parents) = path.split_last()?;
        let mut node = &mut self.root;
        for segment in parents {
            node = node.child_mut(segment.as_ref())?;
        }
        let index = node.children.iter().position(|c| c.via.as_deref() == Some(last.as_ref()))?;
        Some(node.children.remove(index))
    }

    /// The subtree at `path`, re-rooted.
    #[must_use]
    pub fn subtree<S: AsRef<str>>(&self, path: &[S]) -> Option<AssociationTree> {
        let node = self.search(path)?;
        let mut root = node.clone();
        root.via = None;
        root.multiplicity = Multiplicity::One;
        Some(Self { root })
    }

    /// Adds every path of `other`, which must share this tree's root entity.
    pub fn merge(&mut self, other: &AssociationTree) -> QueryResult<()> {
        if other.root.entity != self.root.entity {
            return Err(QueryError::type_mismatch(&self.root.entity, &other.root.entity));
        }
        self.root.merge_children(&other.root);
        Ok(())
    }

    /// Every root-to-leaf navigation path.
    #[must_use]
    pub fn paths(&self) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        self.root.collect_paths(&mut Vec::new(), &mut out);
        out
    }
}
