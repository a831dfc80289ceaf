/// A dendrogram node. Leaves are the original input points (`left` and
/// `right` both `None`); inner nodes record the two children merged to
/// produce them. `active` means "still a root" — the node has not itself
/// been folded into a later merge.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Node {
    pub(crate) left: Option<usize>,
    pub(crate) right: Option<usize>,
    pub(crate) active: bool,
}

impl Node {
    pub(crate) fn leaf() -> Self {
        Self {
            left: None,
            right: None,
            active: true,
        }
    }

    pub(crate) fn inner(left: usize, right: usize) -> Self {
        Self {
            left: Some(left),
            right: Some(right),
            active: true,
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Collects the leaf ids reachable from `id`, which for a leaf is just `id`
/// itself.
pub(crate) fn collect_ids(nodes: &[Node], id: usize, group: &mut Vec<usize>) {
    let node = &nodes[id];
    if node.is_leaf() {
        group.push(id);
    }
    if let Some(left) = node.left {
        collect_ids(nodes, left, group);
    }
    if let Some(right) = node.right {
        collect_ids(nodes, right, group);
    }
}

/// Every node still at the root of its own subtree is one output group.
pub(crate) fn collect_groups(nodes: &[Node]) -> Vec<Vec<usize>> {
    let mut groups = Vec::new();
    for (id, node) in nodes.iter().enumerate() {
        if node.active {
            let mut group = Vec::new();
            collect_ids(nodes, id, &mut group);
            groups.push(group);
        }
    }
    groups
}
