// src/project/family.rs
// Parent/child project family graph (spec.md §4.4). A session scoped to a child
// project can recall episodes from its ancestors and siblings; the family is the
// BFS closure of `parent_project` edges, with a visited-set guard against cycles
// that could otherwise arise from manual project edits.

use crate::store::project::all_projects_sync;
use crate::store::DatabasePool;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

/// Switch from an `IN (...)` clause to a temp table join once the family is this
/// large, to keep the query plan from degenerating with a huge parameter list.
pub const SQL_IN_CLAUSE_LIMIT: usize = 100;

#[derive(Default)]
pub struct FamilyCache {
    /// full_path -> sibling/ancestor/descendant full_paths (the family, self excluded).
    family: RwLock<HashMap<String, Vec<String>>>,
}

impl FamilyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rebuild(&self, pool: &DatabasePool) -> anyhow::Result<()> {
        let projects = pool.interact(|conn| all_projects_sync(conn).map_err(anyhow::Error::from)).await?;

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for p in &projects {
            if let Some(parent) = &p.parent_project {
                children.entry(parent.clone()).or_default().push(p.full_path.clone());
            }
        }
        let mut parent_of: HashMap<String, String> = HashMap::new();
        for p in &projects {
            if let Some(parent) = &p.parent_project {
                parent_of.insert(p.full_path.clone(), parent.clone());
            }
        }

        let mut computed = HashMap::new();
        for p in &projects {
            computed.insert(p.full_path.clone(), bfs_family(&p.full_path, &children, &parent_of));
        }

        *self.family.write().unwrap() = computed;
        Ok(())
    }

    /// Family of `full_path`, including itself. Empty if the project is unknown
    /// (caller should then treat the session as having no project scope).
    pub fn family_of(&self, full_path: &str) -> Vec<String> {
        let guard = self.family.read().unwrap();
        match guard.get(full_path) {
            Some(f) => {
                let mut v = f.clone();
                v.push(full_path.to_string());
                v
            }
            None => Vec::new(),
        }
    }

    pub fn invalidate(&self) {
        self.family.write().unwrap().clear();
    }
}

fn bfs_family(
    start: &str,
    children: &HashMap<String, Vec<String>>,
    parent_of: &HashMap<String, String>,
) -> Vec<String> {
    let mut visited = HashSet::new();
    visited.insert(start.to_string());
    let mut queue = VecDeque::new();
    queue.push_back(start.to_string());

    // Walk up to the root ancestor first, then BFS the whole tree down from there.
    let mut root = start.to_string();
    let mut climb_guard = HashSet::new();
    climb_guard.insert(root.clone());
    while let Some(parent) = parent_of.get(&root) {
        if !climb_guard.insert(parent.clone()) {
            break; // cycle guard
        }
        root = parent.clone();
    }

    queue.clear();
    queue.push_back(root.clone());
    visited.clear();
    visited.insert(root.clone());
    let mut result = Vec::new();

    while let Some(node) = queue.pop_front() {
        if node != start {
            result.push(node.clone());
        }
        for child in children.get(&node).into_iter().flatten() {
            if visited.insert(child.clone()) {
                queue.push_back(child.clone());
            }
        }
    }

    result
}

/// Build the SQL fragment and bound values for filtering by project family,
/// switching from an IN clause to a temp-table-driven join past
/// `SQL_IN_CLAUSE_LIMIT` members.
pub fn family_filter_sql(column: &str, family: &[String]) -> (String, bool) {
    if family.len() > SQL_IN_CLAUSE_LIMIT {
        (format!("{column} IN (SELECT full_path FROM temp.family_filter)"), true)
    } else {
        let placeholders = family.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        (format!("{column} IN ({placeholders})"), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bfs_family_includes_siblings_and_ancestors() {
        let mut children = HashMap::new();
        children.insert("root".to_string(), vec!["a".to_string(), "b".to_string()]);
        let mut parent_of = HashMap::new();
        parent_of.insert("a".to_string(), "root".to_string());
        parent_of.insert("b".to_string(), "root".to_string());

        let family = bfs_family("a", &children, &parent_of);
        assert!(family.contains(&"root".to_string()));
        assert!(family.contains(&"b".to_string()));
        assert!(!family.contains(&"a".to_string()));
    }

    #[test]
    fn bfs_family_survives_a_cycle() {
        let mut children = HashMap::new();
        children.insert("a".to_string(), vec!["b".to_string()]);
        children.insert("b".to_string(), vec!["a".to_string()]);
        let mut parent_of = HashMap::new();
        parent_of.insert("a".to_string(), "b".to_string());
        parent_of.insert("b".to_string(), "a".to_string());

        let family = bfs_family("a", &children, &parent_of);
        assert!(family.len() <= 2);
    }

    #[test]
    fn filter_switches_to_temp_table_past_limit() {
        let small = vec!["x".to_string()];
        let (_, uses_temp) = family_filter_sql("project", &small);
        assert!(!uses_temp);

        let large: Vec<String> = (0..200).map(|i| i.to_string()).collect();
        let (_, uses_temp_large) = family_filter_sql("project", &large);
        assert!(uses_temp_large);
    }
}
