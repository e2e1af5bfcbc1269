/*!
 * # Permissions Module
 *
 * Permissions form a tree: group nodes (`production`) own leaf permissions
 * (`production:write`). Granting a node grants its whole subtree. The same tree drives the
 * navigation sidebar, so nodes carry an optional route and a sort order.
 */

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::permission;

/// Common permission string constants for compile-time safety
pub mod consts {
    pub const DASHBOARD: &str = "dashboard";

    // Orders
    pub const ORDERS_READ: &str = "orders:read";
    pub const ORDERS_WRITE: &str = "orders:write";
    pub const CUSTOMERS_READ: &str = "customers:read";
    pub const CUSTOMERS_WRITE: &str = "customers:write";

    // Production floor
    pub const PRODUCTION_READ: &str = "production:read";
    pub const PRODUCTION_WRITE: &str = "production:write";
    pub const BATCHES_WRITE: &str = "batches:write";
    pub const QC_READ: &str = "qc:read";
    pub const QC_WRITE: &str = "qc:write";

    // Stores
    pub const INVENTORY_READ: &str = "inventory:read";
    pub const INVENTORY_WRITE: &str = "inventory:write";
    pub const PROCUREMENT_READ: &str = "procurement:read";
    pub const PROCUREMENT_WRITE: &str = "procurement:write";

    // Billing
    pub const INVOICES_READ: &str = "invoices:read";
    pub const INVOICES_WRITE: &str = "invoices:write";

    // Administration
    pub const ADMIN_READ: &str = "admin:read";
    pub const ADMIN_WRITE: &str = "admin:write";

    // Help and files
    pub const TUTORIALS_READ: &str = "tutorials:read";
    pub const TUTORIALS_WRITE: &str = "tutorials:write";
    pub const FILES_READ: &str = "files:read";
    pub const FILES_WRITE: &str = "files:write";
}

/// Seed row for the default permission tree
#[derive(Debug, Clone, Copy)]
pub struct PermissionSeed {
    pub key: &'static str,
    pub label: &'static str,
    pub parent: Option<&'static str>,
    pub route: Option<&'static str>,
    pub sort_order: i32,
}

const fn seed(
    key: &'static str,
    label: &'static str,
    parent: Option<&'static str>,
    route: Option<&'static str>,
    sort_order: i32,
) -> PermissionSeed {
    PermissionSeed {
        key,
        label,
        parent,
        route,
        sort_order,
    }
}

/// Default tree; parents are listed before their children
pub const DEFAULT_PERMISSION_TREE: &[PermissionSeed] = &[
    seed(consts::DASHBOARD, "Dashboard", None, Some("/dashboard"), 0),
    seed("orders", "Orders", None, None, 10),
    seed(consts::ORDERS_READ, "Order list", Some("orders"), Some("/orders"), 1),
    seed(consts::ORDERS_WRITE, "Manage orders", Some("orders"), None, 2),
    seed(consts::CUSTOMERS_READ, "Customers", Some("orders"), Some("/customers"), 3),
    seed(consts::CUSTOMERS_WRITE, "Manage customers", Some("orders"), None, 4),
    seed("production", "Production", None, None, 20),
    seed(consts::PRODUCTION_READ, "Production board", Some("production"), Some("/production"), 1),
    seed(consts::PRODUCTION_WRITE, "Assign cutting and batches", Some("production"), None, 2),
    seed(consts::BATCHES_WRITE, "Batches", Some("production"), Some("/batches"), 3),
    seed(consts::QC_READ, "Quality check", Some("production"), Some("/qc"), 4),
    seed(consts::QC_WRITE, "Record QC", Some("production"), None, 5),
    seed("stores", "Stores", None, None, 30),
    seed(consts::INVENTORY_READ, "Inventory", Some("stores"), Some("/inventory"), 1),
    seed(consts::INVENTORY_WRITE, "Adjust inventory", Some("stores"), None, 2),
    seed(consts::PROCUREMENT_READ, "Purchase orders", Some("stores"), Some("/purchase-orders"), 3),
    seed(consts::PROCUREMENT_WRITE, "Receive goods", Some("stores"), None, 4),
    seed("billing", "Billing", None, None, 40),
    seed(consts::INVOICES_READ, "Invoices", Some("billing"), Some("/invoices"), 1),
    seed(consts::INVOICES_WRITE, "Manage invoices", Some("billing"), None, 2),
    seed("admin", "Administration", None, None, 50),
    seed(consts::ADMIN_READ, "Users and roles", Some("admin"), Some("/admin/users"), 1),
    seed(consts::ADMIN_WRITE, "Manage users and roles", Some("admin"), None, 2),
    seed("help", "Help", None, None, 60),
    seed(consts::TUTORIALS_READ, "Tutorials", Some("help"), Some("/tutorials"), 1),
    seed(consts::TUTORIALS_WRITE, "Manage tutorials", Some("help"), None, 2),
    seed(consts::FILES_READ, "Files", Some("help"), Some("/files"), 3),
    seed(consts::FILES_WRITE, "Upload files", Some("help"), None, 4),
];

/// Whether a granted permission covers the required one.
///
/// Supports exact keys, `resource:*` wildcards and the global `*`.
pub fn permission_matches(granted: &str, required: &str) -> bool {
    if granted == required || granted == "*" {
        return true;
    }
    match granted.strip_suffix(":*") {
        Some(resource) => required
            .split_once(':')
            .map(|(r, _)| r == resource)
            .unwrap_or(required == resource),
        None => false,
    }
}

/// A node of the permission tree, detached from the database row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionNode {
    pub id: Uuid,
    pub key: String,
    pub label: String,
    pub parent_id: Option<Uuid>,
    pub route: Option<String>,
    pub sort_order: i32,
}

impl From<permission::Model> for PermissionNode {
    fn from(model: permission::Model) -> Self {
        Self {
            id: model.id,
            key: model.key,
            label: model.label,
            parent_id: model.parent_id,
            route: model.route,
            sort_order: model.sort_order,
        }
    }
}

/// One visible sidebar row, in display order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SidebarEntry {
    pub key: String,
    pub label: String,
    pub route: Option<String>,
    pub depth: usize,
    pub parent_key: Option<String>,
}

struct Tree<'a> {
    by_id: HashMap<Uuid, &'a PermissionNode>,
    children: HashMap<Uuid, Vec<&'a PermissionNode>>,
    roots: Vec<&'a PermissionNode>,
}

fn display_order(a: &&PermissionNode, b: &&PermissionNode) -> std::cmp::Ordering {
    a.sort_order
        .cmp(&b.sort_order)
        .then_with(|| a.label.cmp(&b.label))
        .then_with(|| a.key.cmp(&b.key))
}

impl<'a> Tree<'a> {
    fn build(nodes: &'a [PermissionNode]) -> Self {
        let by_id: HashMap<Uuid, &PermissionNode> = nodes.iter().map(|n| (n.id, n)).collect();
        let mut children: HashMap<Uuid, Vec<&PermissionNode>> = HashMap::new();
        let mut roots = Vec::new();

        for node in nodes {
            match node.parent_id {
                Some(parent) if parent != node.id && by_id.contains_key(&parent) => {
                    children.entry(parent).or_default().push(node)
                }
                // missing or self parent: treat as a root
                _ => roots.push(node),
            }
        }
        for list in children.values_mut() {
            list.sort_by(display_order);
        }
        roots.sort_by(display_order);

        Self {
            by_id,
            children,
            roots,
        }
    }

    fn children_of(&self, id: Uuid) -> &[&'a PermissionNode] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Walk start points: real roots first, then one node per cycle nobody reached
    fn walk_starts(&self, nodes: &'a [PermissionNode]) -> Vec<&'a PermissionNode> {
        let mut reached: HashSet<Uuid> = HashSet::new();
        let mut stack: Vec<&PermissionNode> = self.roots.clone();
        while let Some(node) = stack.pop() {
            if reached.insert(node.id) {
                stack.extend(self.children_of(node.id).iter().copied());
            }
        }

        let mut starts = self.roots.clone();
        let mut leftovers: Vec<&PermissionNode> =
            nodes.iter().filter(|n| !reached.contains(&n.id)).collect();
        leftovers.sort_by(display_order);
        for node in leftovers {
            if reached.contains(&node.id) {
                continue;
            }
            let mut stack = vec![node];
            while let Some(n) = stack.pop() {
                if reached.insert(n.id) {
                    stack.extend(self.children_of(n.id).iter().copied());
                }
            }
            starts.push(node);
        }
        starts
    }
}

/// Granted keys plus every key below a granted node
pub fn expand_grants(nodes: &[PermissionNode], granted: &[String]) -> BTreeSet<String> {
    let tree = Tree::build(nodes);
    let mut out: BTreeSet<String> = BTreeSet::new();
    let mut visited: HashSet<Uuid> = HashSet::new();

    let mut stack: Vec<&PermissionNode> = nodes
        .iter()
        .filter(|n| granted.iter().any(|g| permission_matches(g, &n.key)))
        .collect();
    while let Some(node) = stack.pop() {
        if !visited.insert(node.id) {
            continue;
        }
        out.insert(node.key.clone());
        stack.extend(tree.children_of(node.id).iter().copied());
    }

    // keys that are not in the tree are kept as granted
    out.extend(granted.iter().cloned());
    out
}

/// Permission keys a user effectively holds
pub fn effective_permissions(
    nodes: &[PermissionNode],
    granted: &[String],
    is_admin: bool,
) -> Vec<String> {
    if is_admin {
        let all: BTreeSet<String> = nodes.iter().map(|n| n.key.clone()).collect();
        return all.into_iter().collect();
    }
    expand_grants(nodes, granted).into_iter().collect()
}

/// Flattens the permission tree into the sidebar rows a user may see.
///
/// Depth-first in `sort_order` (ties by label). A node is shown when the user holds it or when
/// one of its descendants is shown, so ancestors of granted nodes always appear. Admins see
/// every node. Each node is visited at most once, which cuts cycles.
pub fn flatten_sidebar(
    nodes: &[PermissionNode],
    granted: &[String],
    is_admin: bool,
) -> Vec<SidebarEntry> {
    let tree = Tree::build(nodes);
    let held = expand_grants(nodes, granted);
    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut out = Vec::new();

    for start in tree.walk_starts(nodes) {
        let entries = visit(&tree, start, 0, None, &held, is_admin, &mut visited);
        out.extend(entries);
    }
    out
}

fn visit(
    tree: &Tree<'_>,
    node: &PermissionNode,
    depth: usize,
    parent_key: Option<&str>,
    held: &BTreeSet<String>,
    is_admin: bool,
    visited: &mut HashSet<Uuid>,
) -> Vec<SidebarEntry> {
    if !visited.insert(node.id) {
        return Vec::new();
    }

    let mut below = Vec::new();
    for child in tree.children_of(node.id) {
        below.extend(visit(
            tree,
            child,
            depth + 1,
            Some(node.key.as_str()),
            held,
            is_admin,
            visited,
        ));
    }

    let shown = is_admin || held.contains(&node.key) || !below.is_empty();
    if !shown {
        return Vec::new();
    }

    let parent_key = parent_key
        .map(str::to_string)
        .or_else(|| node.parent_id.and_then(|p| tree.by_id.get(&p)).map(|p| p.key.clone()));

    let mut entries = Vec::with_capacity(below.len() + 1);
    entries.push(SidebarEntry {
        key: node.key.clone(),
        label: node.label.clone(),
        route: node.route.clone(),
        depth,
        parent_key: if depth == 0 { None } else { parent_key },
    });
    entries.extend(below);
    entries
}
