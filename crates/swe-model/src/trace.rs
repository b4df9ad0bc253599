//! Trace-side containers: `Interface`, `Boundary`, `DistributedBoundary`.

use crate::edge_data::EdgeData;

/// A reference into one element's `boundary[bound_id]` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Side {
    pub element_id: usize,
    pub local_bound_id: usize,
}

/// One harmonic constituent of a tidal boundary forcing.
#[derive(Debug, Clone, Copy)]
pub struct TidalConstituent {
    pub amplitude: f64,
    pub omega: f64,
    pub eq_arg: f64,
    pub phase: f64,
    pub forcing_fact: f64,
}

/// Which boundary-condition specialization a `Boundary` trace uses.
/// `Land` and `Tide` carry everything the kernel needs inline; `Function`
/// only carries an id, since the actual closure cannot be stored in plain
/// mesh data and is looked up by the driver at kernel time.
#[derive(Debug, Clone)]
pub enum BoundaryKind {
    Land,
    Tide { constituents: Vec<TidalConstituent> },
    Function { function_id: usize },
}

/// Interior edge shared by exactly two elements in the same rank.
///
/// Invariant: `left` and `right` see the same number of quadrature
/// points and opposite normals; gauss-point index `k` on `left`
/// corresponds to gauss-point index `ngp - 1 - k` on `right`.
#[derive(Debug, Clone)]
pub struct Interface {
    pub id: usize,
    pub left: Side,
    pub right: Side,
    pub normal: (f64, f64),
    pub ngp: usize,
    pub edge: EdgeData,
}

impl Interface {
    pub fn reversed_gp_index(&self, k: usize) -> usize {
        self.ngp - 1 - k
    }
}

/// A domain-boundary edge with exactly one adjacent element.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub id: usize,
    pub side: Side,
    pub normal: (f64, f64),
    pub ngp: usize,
    pub edge: EdgeData,
    pub kind: BoundaryKind,
}

/// Tag identifying one directed message exchange: the peer rank, the
/// local edge on this rank, and a per-direction sequence number that
/// strictly increases so retransmits and reorderings cannot be confused
/// with a fresh exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommTag {
    pub peer_rank: usize,
    pub local_edge_id: usize,
    pub sequence: u64,
}

/// Send/receive buffers and the tag under which they are currently posted.
#[derive(Debug, Clone, Default)]
pub struct Exchanger {
    pub send_buffer: Vec<f64>,
    pub recv_buffer: Vec<f64>,
    pub tag: Option<CommTag>,
}

impl Exchanger {
    pub fn with_capacity(len: usize) -> Self {
        Exchanger {
            send_buffer: vec![0.0; len],
            recv_buffer: vec![0.0; len],
            tag: None,
        }
    }

    pub fn advance_sequence(&mut self, peer_rank: usize, local_edge_id: usize) -> CommTag {
        let sequence = match self.tag {
            Some(prev) if prev.peer_rank == peer_rank && prev.local_edge_id == local_edge_id => {
                prev.sequence + 1
            }
            _ => 0,
        };
        let tag = CommTag {
            peer_rank,
            local_edge_id,
            sequence,
        };
        self.tag = Some(tag);
        tag
    }
}

/// A domain-boundary edge whose neighbor lives on another rank.
#[derive(Debug, Clone)]
pub struct DistributedBoundary {
    pub id: usize,
    pub side: Side,
    pub normal: (f64, f64),
    pub ngp: usize,
    pub edge: EdgeData,
    pub peer_rank: usize,
    pub exchanger: Exchanger,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_reverses_gauss_point_index() {
        let side = Side {
            element_id: 0,
            local_bound_id: 0,
        };
        let iface = Interface {
            id: 0,
            left: side,
            right: side,
            normal: (1.0, 0.0),
            ngp: 4,
            edge: EdgeData::zeros(2, 4),
        };
        assert_eq!(iface.reversed_gp_index(0), 3);
        assert_eq!(iface.reversed_gp_index(3), 0);
    }

    #[test]
    fn exchanger_sequence_increments_per_edge_direction() {
        let mut ex = Exchanger::with_capacity(4);
        let t0 = ex.advance_sequence(2, 7);
        let t1 = ex.advance_sequence(2, 7);
        assert_eq!(t0.sequence, 0);
        assert_eq!(t1.sequence, 1);

        // a different local edge restarts the sequence
        let t2 = ex.advance_sequence(2, 8);
        assert_eq!(t2.sequence, 0);
    }
}
