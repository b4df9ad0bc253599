//! Non-blocking message-passing layer.
//!
//! One trait, one trivial single-rank implementation used by most
//! tests, and one multi-unit implementation that exercises ordering and
//! matched-pair semantics without a real network or process boundary.

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};
use swe_io::SolverError;

/// The four message kinds this layer's wire format carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommType {
    BoundState,
    BaryctrCoord,
    InitGlobalProb,
    BaryctrState,
}

/// `(comm_type, timestamp)`, the key a receiver matches sends against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageTag {
    pub comm_type: CommType,
    pub timestamp: u64,
}

/// A single matched exchange: sender and receiver must agree on size.
#[derive(Debug, Clone)]
pub struct Message {
    pub peer_rank: usize,
    pub local_edge_id: usize,
    pub tag: MessageTag,
    pub payload: Vec<f64>,
}

/// The non-blocking message-passing contract every driver variant uses.
/// `send_all`/`receive_all` post operations that `wait_all_sends`/
/// `wait_all_receives` later block on; no other call may block.
pub trait Communicator {
    fn send_all(&mut self, messages: Vec<Message>) -> Result<(), SolverError>;
    fn receive_all(&mut self, tag: MessageTag, count: usize) -> Result<(), SolverError>;
    fn wait_all_sends(&mut self) -> Result<(), SolverError>;
    fn wait_all_receives(&mut self, tag: MessageTag) -> Result<Vec<Message>, SolverError>;
    fn abort(&mut self, code: i32) -> SolverError;
}

/// Single-rank communicator: sends and receives are direct buffer
/// hand-offs with no actual network boundary, used by the default CLI
/// path and any test that does not specifically exercise cross-rank
/// exchange.
#[derive(Debug, Default)]
pub struct LocalCommunicator {
    pending: HashMap<MessageTag, Vec<Message>>,
}

impl Communicator for LocalCommunicator {
    fn send_all(&mut self, messages: Vec<Message>) -> Result<(), SolverError> {
        for msg in messages {
            self.pending.entry(msg.tag).or_default().push(msg);
        }
        Ok(())
    }

    fn receive_all(&mut self, _tag: MessageTag, _count: usize) -> Result<(), SolverError> {
        Ok(())
    }

    fn wait_all_sends(&mut self) -> Result<(), SolverError> {
        Ok(())
    }

    fn wait_all_receives(&mut self, tag: MessageTag) -> Result<Vec<Message>, SolverError> {
        Ok(self.pending.remove(&tag).unwrap_or_default())
    }

    fn abort(&mut self, code: i32) -> SolverError {
        SolverError::CommunicatorFailure(format!("local communicator aborted with code {code}"))
    }
}

/// Multi-unit, same-process communicator built on `crossbeam_channel`,
/// exercising the tag/timestamp-ordering and matched-pair contract for a
/// two-rank interface exchange without a real MPI dependency.
pub struct ChannelCommunicator {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    in_flight_sends: usize,
}

impl ChannelCommunicator {
    /// Build a connected pair: `(rank_a, rank_b)`, each able to send to
    /// and receive from the other.
    pub fn paired() -> (ChannelCommunicator, ChannelCommunicator) {
        let (tx_a, rx_a) = crossbeam_channel::unbounded();
        let (tx_b, rx_b) = crossbeam_channel::unbounded();
        (
            ChannelCommunicator {
                sender: tx_b,
                receiver: rx_a,
                in_flight_sends: 0,
            },
            ChannelCommunicator {
                sender: tx_a,
                receiver: rx_b,
                in_flight_sends: 0,
            },
        )
    }
}

impl Communicator for ChannelCommunicator {
    fn send_all(&mut self, messages: Vec<Message>) -> Result<(), SolverError> {
        for msg in messages {
            self.sender
                .send(msg)
                .map_err(|e| SolverError::CommunicatorFailure(e.to_string()))?;
            self.in_flight_sends += 1;
        }
        Ok(())
    }

    fn receive_all(&mut self, _tag: MessageTag, _count: usize) -> Result<(), SolverError> {
        Ok(())
    }

    fn wait_all_sends(&mut self) -> Result<(), SolverError> {
        self.in_flight_sends = 0;
        Ok(())
    }

    fn wait_all_receives(&mut self, tag: MessageTag) -> Result<Vec<Message>, SolverError> {
        let mut matched = Vec::new();
        let mut deferred = Vec::new();
        while let Ok(msg) = self.receiver.try_recv() {
            if msg.tag == tag {
                matched.push(msg);
            } else {
                deferred.push(msg);
            }
        }
        for msg in deferred {
            self.sender
                .send(msg)
                .map_err(|e| SolverError::CommunicatorFailure(e.to_string()))?;
        }
        Ok(matched)
    }

    fn abort(&mut self, code: i32) -> SolverError {
        SolverError::CommunicatorFailure(format!("channel communicator aborted with code {code}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_communicator_returns_messages_matching_the_waited_tag() {
        let mut comm = LocalCommunicator::default();
        let tag = MessageTag {
            comm_type: CommType::BoundState,
            timestamp: 0,
        };
        comm.send_all(vec![Message {
            peer_rank: 0,
            local_edge_id: 3,
            tag,
            payload: vec![1.0, 2.0, 3.0],
        }])
        .unwrap();
        let received = comm.wait_all_receives(tag).unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn channel_communicator_delivers_across_the_pair_in_send_order() {
        let (mut a, mut b) = ChannelCommunicator::paired();
        let tag = MessageTag {
            comm_type: CommType::BoundState,
            timestamp: 1,
        };
        a.send_all(vec![
            Message {
                peer_rank: 1,
                local_edge_id: 0,
                tag,
                payload: vec![1.0],
            },
            Message {
                peer_rank: 1,
                local_edge_id: 0,
                tag,
                payload: vec![2.0],
            },
        ])
        .unwrap();
        a.wait_all_sends().unwrap();

        let received = b.wait_all_receives(tag).unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].payload, vec![1.0]);
        assert_eq!(received[1].payload, vec![2.0]);
    }

    #[test]
    fn channel_communicator_requeues_messages_with_a_different_tag() {
        let (mut a, mut b) = ChannelCommunicator::paired();
        let tag_a = MessageTag {
            comm_type: CommType::BaryctrCoord,
            timestamp: 0,
        };
        let tag_b = MessageTag {
            comm_type: CommType::BoundState,
            timestamp: 0,
        };
        a.send_all(vec![Message {
            peer_rank: 1,
            local_edge_id: 0,
            tag: tag_b,
            payload: vec![9.0],
        }])
        .unwrap();

        assert!(b.wait_all_receives(tag_a).unwrap().is_empty());
        let matched = b.wait_all_receives(tag_b).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].payload, vec![9.0]);
    }
}
