//! In-memory graph state and secondary indexes
//!
//! Rebuilt from RocksDB on open. All lookups the store needs for
//! auto-linking and queries go through here, so none of them scan the
//! whole node set pairwise.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::edge::{Edge, EdgeKey};
use crate::node::Node;

type LocationKey = (String, String, String);

#[derive(Debug, Default)]
pub(crate) struct GraphIndex {
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<EdgeKey, Edge>,
    outgoing: HashMap<String, BTreeSet<EdgeKey>>,
    incoming: HashMap<String, BTreeSet<EdgeKey>>,
    by_year: BTreeMap<i32, BTreeSet<String>>,
    by_month_day: HashMap<(u8, u8), BTreeSet<String>>,
    by_location: HashMap<LocationKey, BTreeSet<String>>,
    by_tag: HashMap<String, BTreeSet<String>>,
    public: BTreeSet<String>,
}

fn remove_from<K>(map: &mut HashMap<K, BTreeSet<String>>, key: &K, id: &str)
where
    K: std::hash::Hash + Eq,
{
    if let Some(set) = map.get_mut(key) {
        set.remove(id);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

impl GraphIndex {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes in ascending id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Insert or replace a node, keeping every secondary index in step
    pub fn insert_node(&mut self, node: Node) {
        if let Some(old) = self.nodes.remove(&node.id) {
            self.unindex(&old);
        }
        self.index(&node);
        self.nodes.insert(node.id.clone(), node);
    }

    fn index(&mut self, node: &Node) {
        let id = node.id.clone();
        self.by_year.entry(node.year).or_default().insert(id.clone());
        self.by_month_day
            .entry((node.month_num, node.day))
            .or_default()
            .insert(id.clone());
        self.by_location
            .entry(node.location_key())
            .or_default()
            .insert(id.clone());
        for tag in &node.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(id.clone());
        }
        if node.is_public() {
            self.public.insert(id);
        }
    }

    fn unindex(&mut self, node: &Node) {
        let id = node.id.as_str();
        if let Some(set) = self.by_year.get_mut(&node.year) {
            set.remove(id);
            if set.is_empty() {
                self.by_year.remove(&node.year);
            }
        }
        remove_from(&mut self.by_month_day, &(node.month_num, node.day), id);
        remove_from(&mut self.by_location, &node.location_key(), id);
        for tag in &node.tags {
            remove_from(&mut self.by_tag, tag, id);
        }
        self.public.remove(id);
    }

    pub fn contains_edge(&self, key: &EdgeKey) -> bool {
        self.edges.contains_key(key)
    }

    /// Insert an edge; false if the triple already exists
    pub fn insert_edge(&mut self, edge: Edge) -> bool {
        let key = edge.key();
        if self.edges.contains_key(&key) {
            return false;
        }
        self.outgoing
            .entry(key.source.clone())
            .or_default()
            .insert(key.clone());
        self.incoming
            .entry(key.target.clone())
            .or_default()
            .insert(key.clone());
        self.edges.insert(key, edge);
        true
    }

    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|k| self.edges.get(k))
    }

    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|k| self.edges.get(k))
    }

    /// In-degree plus out-degree
    pub fn degree(&self, id: &str) -> usize {
        self.outgoing.get(id).map_or(0, BTreeSet::len)
            + self.incoming.get(id).map_or(0, BTreeSet::len)
    }

    /// Ids of nodes whose year lies in `lo..=hi`
    pub fn year_range(&self, lo: i32, hi: i32) -> impl Iterator<Item = &String> {
        self.by_year.range(lo..=hi).flat_map(|(_, ids)| ids.iter())
    }

    pub fn at_location(&self, key: &LocationKey) -> impl Iterator<Item = &String> {
        self.by_location.get(key).into_iter().flatten()
    }

    pub fn with_tag(&self, tag: &str) -> impl Iterator<Item = &String> {
        self.by_tag.get(tag).into_iter().flatten()
    }

    pub fn on_month_day(&self, month: u8, day: u8) -> impl Iterator<Item = &String> {
        self.by_month_day.get(&(month, day)).into_iter().flatten()
    }

    /// Public ids in ascending order
    pub fn public_ids(&self) -> impl Iterator<Item = &String> {
        self.public.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeType;
    use crate::node::Visibility;
    use chrono::Utc;

    fn node(year: i32, slug: &str, tags: &[&str]) -> Node {
        Node::builder()
            .date(year, 1, 1)
            .location("france", "ile-de-france", "paris")
            .name(slug)
            .slug(slug)
            .tags(tags.iter().copied())
            .build()
            .unwrap()
            .into_node(Utc::now())
            .unwrap()
    }

    #[test]
    fn test_year_range_lookup() {
        let mut index = GraphIndex::default();
        index.insert_node(node(1788, "a", &[]));
        index.insert_node(node(1789, "b", &[]));
        index.insert_node(node(1791, "c", &[]));

        let hits: Vec<_> = index.year_range(1788, 1790).collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(index.year_range(1791, 1791).count(), 1);
        assert_eq!(index.year_range(1792, 1800).count(), 0);
    }

    #[test]
    fn test_replace_node_reindexes() {
        let mut index = GraphIndex::default();
        let mut n = node(1789, "bastille", &["revolution"]);
        index.insert_node(n.clone());
        assert_eq!(index.with_tag("revolution").count(), 1);
        assert_eq!(index.public_ids().count(), 0);

        n.tags.clear();
        n.tags.insert("paris".into());
        n.visibility = Visibility::Public;
        index.insert_node(n);

        assert_eq!(index.with_tag("revolution").count(), 0);
        assert_eq!(index.with_tag("paris").count(), 1);
        assert_eq!(index.public_ids().count(), 1);
        assert_eq!(index.node_count(), 1);
    }

    #[test]
    fn test_edges_and_degree() {
        let mut index = GraphIndex::default();
        let a = node(1789, "a", &[]);
        let b = node(1789, "b", &[]);
        index.insert_node(a.clone());
        index.insert_node(b.clone());

        assert!(index.insert_edge(Edge::new(&a.id, &b.id, EdgeType::Causes)));
        assert!(!index.insert_edge(Edge::new(&a.id, &b.id, EdgeType::Causes)));
        assert!(index.insert_edge(Edge::new(&a.id, &b.id, EdgeType::Thematic)));
        assert!(index.insert_edge(Edge::new(&b.id, &a.id, EdgeType::Causes)));

        assert_eq!(index.edge_count(), 3);
        assert_eq!(index.degree(&a.id), 3);
        assert_eq!(index.outgoing(&a.id).count(), 2);
        assert_eq!(index.incoming(&a.id).count(), 1);
        assert_eq!(index.degree("/missing"), 0);
    }
}
