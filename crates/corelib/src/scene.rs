//! Scene graph: dense node arrays with parent/child links and name lookup.

use crate::Mat4;
use crate::transform::Transform;

/// Node id (dense, index into the graph arrays).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Hierarchy of named nodes. Nodes are never removed; a loaded model
/// replaces the whole graph.
#[derive(Default, Debug, Clone)]
pub struct SceneGraph {
    names: Vec<Option<String>>,
    transforms: Vec<Transform>,
    parents: Vec<Option<NodeId>>,
    children: Vec<Vec<NodeId>>,
    /// Indices into an external primitive list (owned by the loader/renderer).
    primitives: Vec<Vec<usize>>,
    roots: Vec<NodeId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent` (or as a root).
    ///
    /// # Panics
    /// If `parent` is not a node of this graph.
    pub fn spawn(&mut self, name: Option<&str>, t: Transform, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.names.len() as u32);
        self.names.push(name.map(str::to_owned));
        self.transforms.push(t);
        self.parents.push(parent);
        self.children.push(Vec::new());
        self.primitives.push(Vec::new());

        match parent {
            Some(p) => {
                assert!(self.contains(p), "parent {p:?} is not in the graph");
                self.children[p.index()].push(id);
            }
            None => self.roots.push(id),
        }
        id
    }

    pub fn attach_primitive(&mut self, node: NodeId, primitive: usize) {
        if let Some(list) = self.primitives.get_mut(node.index()) {
            list.push(primitive);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.names.len()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.names.get(id.index())?.as_deref()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(id.index()).copied().flatten()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(id.index()).map_or(&[], Vec::as_slice)
    }

    pub fn primitives(&self, id: NodeId) -> &[usize] {
        self.primitives.get(id.index()).map_or(&[], Vec::as_slice)
    }

    pub fn transform(&self, id: NodeId) -> Option<&Transform> {
        self.transforms.get(id.index())
    }

    /// Mutable access to a local transform (for animation).
    #[inline]
    pub fn transform_mut(&mut self, id: NodeId) -> Option<&mut Transform> {
        self.transforms.get_mut(id.index())
    }

    /// First node named `name`, depth-first pre-order from the roots.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if self.name(id) == Some(name) {
                return Some(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        None
    }

    /// World matrix of one node (walks up the parent chain).
    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        let mut m = self.transform(id)?.matrix();
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            m = self.transforms[p.index()].matrix() * m;
            cur = self.parent(p);
        }
        Some(m)
    }

    /// World matrices for every node, indexed like the graph.
    pub fn world_matrices(&self) -> Vec<Mat4> {
        let mut out = vec![Mat4::IDENTITY; self.len()];
        let mut stack: Vec<(NodeId, Mat4)> =
            self.roots.iter().map(|&r| (r, Mat4::IDENTITY)).collect();
        while let Some((id, parent_world)) = stack.pop() {
            let world = parent_world * self.transforms[id.index()].matrix();
            out[id.index()] = world;
            stack.extend(self.children(id).iter().map(|&c| (c, world)));
        }
        out
    }

    /// Iterate (world matrix, primitive indices) for nodes that carry geometry.
    pub fn drawables(&self) -> impl Iterator<Item = (Mat4, &[usize])> {
        let worlds = self.world_matrices();
        (0..self.len()).filter_map(move |i| {
            let prims = self.primitives[i].as_slice();
            (!prims.is_empty()).then(|| (worlds[i], prims))
        })
    }
}
