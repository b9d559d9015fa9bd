/*
This code is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 09/05/2023
Last Modified: 28/11/2024
License: MIT
*/

use crate::algorithms::net::NodeType;
use std::collections::HashMap;

/// A persisted stream network node, the interface between the network builder
/// and the rain simulator. Junction nodes have no bluespot; their bluespot
/// fields are zero and `bspot_id` is `None`.
#[derive(Clone, Debug)]
pub struct NetworkNode {
    pub node_id: i32,
    pub downstream_id: Option<i32>,
    pub node_type: NodeType,
    pub cell: (isize, isize),
    pub bspot_id: Option<i32>,
    pub bspot_area: f64,
    pub bspot_vol: f64,
    pub wshed_area: f64,
}

/// Event values of one node for one rain incident. Volumes are m3; `fill_pct`
/// is undefined for nodes without storage capacity (junctions).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RainEventValues {
    pub node_id: i32,
    pub rain_vol: f64,
    pub spill_vol: f64,
    pub fill_vol: f64,
    pub fill_pct: Option<f64>,
}

/// The stream network as a forest of nodes.
///
/// Root nodes are the nodes without a downstream node; `upstream_tree` maps a
/// node id to the ids of the nodes one step upstream.
pub struct StreamNetwork {
    nodes: Vec<NetworkNode>,
    nodes_index: HashMap<i32, usize>,
    root_nodes: Vec<i32>,
    upstream_tree: HashMap<i32, Vec<i32>>,
}

impl StreamNetwork {
    pub fn new(nodes: Vec<NetworkNode>) -> StreamNetwork {
        let mut network = StreamNetwork {
            nodes: vec![],
            nodes_index: HashMap::new(),
            root_nodes: vec![],
            upstream_tree: HashMap::new(),
        };
        for node in nodes {
            network.add_node(node);
        }
        network
    }

    fn add_node(&mut self, node: NetworkNode) {
        self.nodes_index.insert(node.node_id, self.nodes.len());
        match node.downstream_id {
            Some(downstream_id) => self
                .upstream_tree
                .entry(downstream_id)
                .or_insert_with(Vec::new)
                .push(node.node_id),
            None => self.root_nodes.push(node.node_id),
        }
        self.nodes.push(node);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Calculates the fill and spill volumes of every node for a rain
    /// incident of `rain_mm` millimetres.
    pub fn rain_event(&self, rain_mm: f64) -> Vec<RainEventValues> {
        let mut values: HashMap<i32, RainEventValues> = HashMap::new();
        let mut ordered = vec![];
        for root in &self.root_nodes {
            self.calc_stream_tree(*root, rain_mm, &mut values, &mut ordered);
        }
        ordered
    }

    fn calc_stream_tree(
        &self,
        root_node_id: i32,
        rain_mm: f64,
        values: &mut HashMap<i32, RainEventValues>,
        ordered: &mut Vec<RainEventValues>,
    ) {
        // Expand the subtree root-first, then process it back to front so
        // every node is calculated after all of its upstream nodes.
        let mut tree = vec![];
        let mut stack = vec![root_node_id];
        while let Some(id) = stack.pop() {
            tree.push(id);
            if let Some(upstream) = self.upstream_tree.get(&id) {
                stack.extend(upstream.iter().copied());
            }
        }
        while let Some(id) = tree.pop() {
            let event = self.calc_node(id, rain_mm, values);
            values.insert(id, event);
            ordered.push(event);
        }
    }

    fn calc_node(
        &self,
        node_id: i32,
        rain_mm: f64,
        values: &HashMap<i32, RainEventValues>,
    ) -> RainEventValues {
        let node = &self.nodes[self.nodes_index[&node_id]];
        let wshed_water_vol = node.wshed_area * rain_mm * 0.001;
        let bspot_capacity = node.bspot_vol;

        // How much is coming from upstream
        let mut upstream_volume = 0f64;
        if let Some(upstream_ids) = self.upstream_tree.get(&node_id) {
            for id in upstream_ids {
                upstream_volume += values[id].spill_vol;
            }
        }

        let total_water_vol = wshed_water_vol + upstream_volume;
        let fill_vol = total_water_vol.min(bspot_capacity);
        let spill_vol = (total_water_vol - bspot_capacity).max(0f64);
        let fill_pct = if bspot_capacity != 0f64 {
            Some(100f64 * fill_vol / bspot_capacity)
        } else {
            None
        };
        RainEventValues {
            node_id: node_id,
            rain_vol: wshed_water_vol,
            spill_vol: spill_vol,
            fill_vol: fill_vol,
            fill_pct: fill_pct,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{NetworkNode, StreamNetwork};
    use crate::algorithms::net::NodeType;

    fn node(
        id: i32,
        downstream: Option<i32>,
        node_type: NodeType,
        bspot_vol: f64,
        wshed_area: f64,
    ) -> NetworkNode {
        NetworkNode {
            node_id: id,
            downstream_id: downstream,
            node_type: node_type,
            cell: (0, 0),
            bspot_id: if node_type == NodeType::PourPoint { Some(id) } else { None },
            bspot_area: 0f64,
            bspot_vol: bspot_vol,
            wshed_area: wshed_area,
        }
    }

    // Leaf bluespot -> junction -> root bluespot.
    fn chain() -> StreamNetwork {
        StreamNetwork::new(vec![
            node(1, Some(3), NodeType::PourPoint, 5.0, 1000.0),
            node(3, Some(2), NodeType::Junction, 0.0, 0.0),
            node(2, None, NodeType::PourPoint, 1000.0, 2000.0),
        ])
    }

    #[test]
    fn test_rain_event_chain() {
        let network = chain();
        let events = network.rain_event(10.0);
        assert_eq!(events.len(), 3);
        let by_id = |id: i32| *events.iter().find(|e| e.node_id == id).unwrap();

        // 1000 m2 * 10 mm = 10 m3 on a 5 m3 bluespot: half stays, half spills.
        let leaf = by_id(1);
        assert_eq!(leaf.rain_vol, 10.0);
        assert_eq!(leaf.fill_vol, 5.0);
        assert_eq!(leaf.spill_vol, 5.0);
        assert_eq!(leaf.fill_pct, Some(100.0));

        // The junction has no capacity and passes spill through untouched.
        let junction = by_id(3);
        assert_eq!(junction.rain_vol, 0.0);
        assert_eq!(junction.fill_vol, 0.0);
        assert_eq!(junction.spill_vol, 5.0);
        assert_eq!(junction.fill_pct, None);

        // The root receives 20 m3 locally plus 5 m3 from upstream.
        let root = by_id(2);
        assert_eq!(root.rain_vol, 20.0);
        assert_eq!(root.fill_vol, 25.0);
        assert_eq!(root.spill_vol, 0.0);
        assert_eq!(root.fill_pct, Some(2.5));
    }

    #[test]
    fn test_rain_event_merging_arms() {
        // Two leaves spilling into a common root.
        let network = StreamNetwork::new(vec![
            node(1, Some(3), NodeType::PourPoint, 1.0, 500.0),
            node(2, Some(3), NodeType::PourPoint, 2.0, 500.0),
            node(3, None, NodeType::PourPoint, 4.0, 100.0),
        ]);
        let events = network.rain_event(20.0);
        let by_id = |id: i32| *events.iter().find(|e| e.node_id == id).unwrap();
        // Each leaf gets 10 m3 and spills all but its capacity.
        assert_eq!(by_id(1).spill_vol, 9.0);
        assert_eq!(by_id(2).spill_vol, 8.0);
        // The root collects 2 m3 locally plus 17 m3 of upstream spill.
        assert_eq!(by_id(3).fill_vol, 4.0);
        assert_eq!(by_id(3).spill_vol, 15.0);
        assert_eq!(by_id(3).fill_pct, Some(100.0));
    }

    #[test]
    fn test_zero_rain_leaves_everything_empty() {
        let network = chain();
        for event in network.rain_event(0.0) {
            assert_eq!(event.rain_vol, 0.0);
            assert_eq!(event.fill_vol, 0.0);
            assert_eq!(event.spill_vol, 0.0);
        }
    }

    #[test]
    fn test_independent_events() {
        let network = chain();
        let first = network.rain_event(10.0);
        let _ = network.rain_event(100.0);
        let again = network.rain_event(10.0);
        assert_eq!(first, again);
    }
}
