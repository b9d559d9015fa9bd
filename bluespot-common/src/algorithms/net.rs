/*
This code is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 02/05/2023
Last Modified: 17/02/2025
License: MIT
*/

use crate::algorithms::flow::trace_downstream;
use crate::structures::Array2D;
use std::collections::BTreeMap;
use std::io::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    PourPoint,
    Junction,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::PourPoint => "pourpoint",
            NodeType::Junction => "junction",
        }
    }

    pub fn from_str(s: &str) -> Result<NodeType, Error> {
        match s {
            "pourpoint" => Ok(NodeType::PourPoint),
            "junction" => Ok(NodeType::Junction),
            _ => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Unknown node type: {}", s),
            )),
        }
    }
}

/// A node of the stream network. Pour-point nodes carry the label of their
/// bluespot as id; junction nodes get fresh ids above the largest label. The
/// geometry is the traced cell path from the node to its downstream node,
/// inclusive of both ends.
#[derive(Clone, Debug)]
pub struct StreamNode {
    pub id: i32,
    pub downstream_id: Option<i32>,
    pub node_type: NodeType,
    pub cell: (isize, isize),
    pub geometry: Vec<(isize, isize)>,
}

/// Finds the next labelled feature downstream from a cell.
///
/// Follows the flow directions from `cell` until a label differing from the
/// source cell's label (and from `background_label`, when given) is met.
/// Returns that label together with the traced cell path, inclusive of both
/// ends. The label is `None` when the trace runs off the raster first.
pub fn next_downstream_label(
    flowdir: &Array2D<u8>,
    labelled: &Array2D<i32>,
    cell: (isize, isize),
    background_label: Option<i32>,
) -> (Option<i32>, Vec<(isize, isize)>) {
    let src_label = labelled.get_value(cell.0, cell.1);
    let mut geom = vec![];
    for c in trace_downstream(flowdir, cell) {
        geom.push(c);
        let lbl = labelled.get_value(c.0, c.1);
        if lbl != src_label {
            if background_label.map_or(true, |bg| lbl != bg) {
                return (Some(lbl), geom);
            }
        }
    }
    (None, geom)
}

/// Builds the stream network between bluespots, including the junction nodes
/// where streams merge on their way to a common downstream bluespot.
///
/// `pour_points` pairs each bluespot label with its pour-point cell. Junction
/// ids are allocated monotonically starting one past the largest label.
pub fn pourpoint_network(
    flowdir: &Array2D<u8>,
    labelled_bluespots: &Array2D<i32>,
    pour_points: &[(i32, (isize, isize))],
    background_label: Option<i32>,
) -> Result<Vec<StreamNode>, Error> {
    // Trace every pour point to its downstream bluespot and bucket the nodes
    // by that downstream label.
    let mut upstream_nodes: BTreeMap<Option<i32>, Vec<StreamNode>> = BTreeMap::new();
    let mut max_id = 0i32;
    for &(pid, pp) in pour_points {
        let (down_lbl, geom) = next_downstream_label(flowdir, labelled_bluespots, pp, background_label);
        let node = StreamNode {
            id: pid,
            downstream_id: down_lbl,
            node_type: NodeType::PourPoint,
            cell: pp,
            geometry: geom,
        };
        upstream_nodes.entry(down_lbl).or_insert_with(Vec::new).push(node);
        if pid > max_id {
            max_id = pid;
        }
    }
    for row in 0..labelled_bluespots.rows {
        for col in 0..labelled_bluespots.columns {
            let lbl = labelled_bluespots.get_value(row, col);
            if lbl > max_id {
                max_id = lbl;
            }
        }
    }

    // Untangle the upstream nodes of each downstream bluespot separately.
    let mut next_available_id = max_id + 1;
    let mut final_nodes = vec![];
    for (_, upstream) in upstream_nodes {
        untangle(upstream, &mut next_available_id, &mut final_nodes)?;
    }
    Ok(final_nodes)
}

// Checks a set of nodes sharing a downstream bluespot for common flow and
// inserts a junction node for every shared reach. Works through an explicit
// work list; peeled groups may still share sub-reaches further upstream.
fn untangle(
    nodes: Vec<StreamNode>,
    next_available_id: &mut i32,
    out: &mut Vec<StreamNode>,
) -> Result<(), Error> {
    let mut worklist = vec![nodes];
    while let Some(group_nodes) = worklist.pop() {
        for group in split_into_common_flow_groups(group_nodes, 2) {
            if group.len() > 1 {
                let (pruned, junction) = prune_common_flow(group, *next_available_id)?;
                *next_available_id += 1;
                out.push(junction);
                worklist.push(pruned);
            } else {
                out.extend(group);
            }
        }
    }
    Ok(())
}

// Splits nodes into groups where all members share at least `min_common_cells`
// trailing cells of their geometry. Two nodes share common flow when the cell
// at the `min_common_cells`-last position is identical.
fn split_into_common_flow_groups(
    nodes: Vec<StreamNode>,
    min_common_cells: usize,
) -> Vec<Vec<StreamNode>> {
    if nodes.len() <= 1 {
        return vec![nodes];
    }
    let mut groups = vec![];
    let mut unhandled: Vec<StreamNode> = nodes;
    while !unhandled.is_empty() {
        let this_n = unhandled.remove(0);
        let mut this_group = vec![];
        if this_n.geometry.len() > min_common_cells {
            let anchor = this_n.geometry[this_n.geometry.len() - min_common_cells];
            let mut i = 0;
            while i < unhandled.len() {
                let other = &unhandled[i];
                if other.geometry.len() > min_common_cells
                    && other.geometry[other.geometry.len() - min_common_cells] == anchor
                {
                    this_group.push(unhandled.remove(i));
                } else {
                    i += 1;
                }
            }
        }
        this_group.insert(0, this_n);
        groups.push(this_group);
    }
    groups
}

// Inserts a new junction node at the flow merge and redirects the existing
// nodes to it. All nodes must share the same downstream id and at least the
// two last geometry cells.
fn prune_common_flow(
    nodes: Vec<StreamNode>,
    new_id: i32,
) -> Result<(Vec<StreamNode>, StreamNode), Error> {
    let downstream_id = nodes[0].downstream_id;
    if nodes.iter().any(|n| n.downstream_id != downstream_id) {
        return Err(Error::new(
            ErrorKind::Other,
            "Inconsistent downstream ids while untangling the stream network.",
        ));
    }
    let mut geoms: Vec<Vec<(isize, isize)>> = nodes.iter().map(|n| n.geometry.clone()).collect();
    if geoms.iter().any(|g| g[g.len() - 2] != geoms[0][geoms[0].len() - 2]) {
        return Err(Error::new(
            ErrorKind::Other,
            "Nodes without common flow while untangling the stream network.",
        ));
    }

    // Peel trailing cells identical across the whole group.
    let mut shared_path = vec![];
    loop {
        if geoms.iter().any(|g| g.is_empty()) {
            break;
        }
        let last = *geoms[0].last().unwrap();
        if !geoms.iter().all(|g| *g.last().unwrap() == last) {
            break;
        }
        shared_path.push(last);
        for g in geoms.iter_mut() {
            g.pop();
        }
    }

    // Reverse the peeled path to flow-forward order; its first cell is the
    // upstream end of the shared reach.
    shared_path.reverse();
    let junction = StreamNode {
        id: new_id,
        downstream_id: downstream_id,
        node_type: NodeType::Junction,
        cell: shared_path[0],
        geometry: shared_path,
    };

    let mut pruned = vec![];
    for (mut node, mut geom) in nodes.into_iter().zip(geoms.into_iter()) {
        geom.push(junction.cell);
        node.geometry = geom;
        node.downstream_id = Some(junction.id);
        pruned.push(node);
    }
    Ok((pruned, junction))
}

#[cfg(test)]
mod test {
    use super::{next_downstream_label, pourpoint_network, NodeType};
    use crate::algorithms::flow::{
        FLOWDIR_DOWN, FLOWDIR_DOWN_LEFT, FLOWDIR_DOWN_RIGHT,
    };
    use crate::structures::Array2D;

    // Two pour points (labels 1 and 2) whose streams merge at (3,3) and run a
    // shared reach into bluespot 3; bluespot 3 and the background pour point
    // drain off the raster.
    fn fixture() -> (Array2D<u8>, Array2D<i32>, Vec<(i32, (isize, isize))>) {
        let mut flowdir: Array2D<u8> = Array2D::new(7, 7, FLOWDIR_DOWN, FLOWDIR_DOWN).unwrap();
        flowdir.set_value(1, 1, FLOWDIR_DOWN_RIGHT);
        flowdir.set_value(2, 2, FLOWDIR_DOWN_RIGHT);
        flowdir.set_value(1, 5, FLOWDIR_DOWN_LEFT);
        flowdir.set_value(2, 4, FLOWDIR_DOWN_LEFT);

        let mut labelled: Array2D<i32> = Array2D::new(7, 7, 0, -1).unwrap();
        labelled.set_value(1, 1, 1);
        labelled.set_value(1, 5, 2);
        labelled.set_value(4, 3, 3);
        labelled.set_value(5, 3, 3);

        let pour_points = vec![(0, (6, 0)), (1, (1, 1)), (2, (1, 5)), (3, (5, 3))];
        (flowdir, labelled, pour_points)
    }

    #[test]
    fn test_next_downstream_label() {
        let (flowdir, labelled, _) = fixture();
        let (lbl, geom) = next_downstream_label(&flowdir, &labelled, (1, 1), Some(0));
        assert_eq!(lbl, Some(3));
        assert_eq!(geom, vec![(1, 1), (2, 2), (3, 3), (4, 3)]);

        // A trace running off the raster yields no downstream label.
        let (lbl, geom) = next_downstream_label(&flowdir, &labelled, (5, 3), Some(0));
        assert_eq!(lbl, None);
        assert_eq!(geom, vec![(5, 3), (6, 3)]);
    }

    #[test]
    fn test_pourpoint_network_inserts_junction() {
        let (flowdir, labelled, pour_points) = fixture();
        let nodes = pourpoint_network(&flowdir, &labelled, &pour_points, Some(0)).unwrap();
        assert_eq!(nodes.len(), 5);

        let junctions: Vec<_> = nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Junction)
            .collect();
        assert_eq!(junctions.len(), 1);
        let junction = junctions[0];
        assert_eq!(junction.id, 4);
        assert_eq!(junction.downstream_id, Some(3));
        assert_eq!(junction.cell, (3, 3));
        assert_eq!(junction.geometry, vec![(3, 3), (4, 3)]);

        let node = |id: i32| nodes.iter().find(|n| n.id == id).unwrap();
        // The merging pour points now flow to the junction with their shared
        // reach replaced by the junction cell.
        assert_eq!(node(1).downstream_id, Some(4));
        assert_eq!(node(1).geometry, vec![(1, 1), (2, 2), (3, 3)]);
        assert_eq!(node(2).downstream_id, Some(4));
        assert_eq!(node(2).geometry, vec![(1, 5), (2, 4), (3, 3)]);
        // Roots keep a null downstream id.
        assert_eq!(node(3).downstream_id, None);
        assert_eq!(node(0).downstream_id, None);
    }

    #[test]
    fn test_pourpoint_network_is_acyclic() {
        let (flowdir, labelled, pour_points) = fixture();
        let nodes = pourpoint_network(&flowdir, &labelled, &pour_points, Some(0)).unwrap();
        for start in &nodes {
            let mut hops = 0;
            let mut current = start.downstream_id;
            while let Some(id) = current {
                let next = nodes.iter().find(|n| n.id == id).unwrap();
                current = next.downstream_id;
                hops += 1;
                assert!(hops <= nodes.len(), "cycle detected in stream network");
            }
        }
    }
}
